//! Result sinks: a durable key-value map and a pub/sub topic.
//!
//! Both are in-memory stand-ins for whatever external store and message
//! fabric a deployment wires in; the contracts are the part that matters.
//! Map puts are at-least-once and idempotent per key (replacing), topic
//! delivery is at-least-once per subscriber, and a slow consumer shows up
//! as backpressure rather than data loss.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{anyhow, Result};
use crossbeam_channel::{bounded, Receiver, Sender};

/// A shared, insert-replace key-value store. Clones share the same
/// underlying map, so a pipeline thread can write while a reader holds
/// another handle.
#[derive(Debug, Clone)]
pub struct MapSink<K, V> {
    name: String,
    entries: Arc<Mutex<HashMap<K, V>>>,
}

impl<K: Eq + Hash + Clone, V: Clone> MapSink<K, V> {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            entries: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Insert or replace. Replays of the same (key, value) are harmless.
    pub fn put(&self, key: K, value: V) {
        self.entries
            .lock()
            .expect("map sink lock poisoned")
            .insert(key, value);
    }

    /// Read-modify-write of one entry, entry-processor style: `apply` sees
    /// the current value (if any) and returns the value to store.
    pub fn update(&self, key: K, apply: impl FnOnce(Option<&V>) -> V) {
        let mut entries = self.entries.lock().expect("map sink lock poisoned");
        let next = apply(entries.get(&key));
        entries.insert(key, next);
    }

    /// Mutate an existing entry in place. Returns false (and does nothing)
    /// when the key is absent.
    pub fn update_if_present(&self, key: &K, apply: impl FnOnce(&mut V)) -> bool {
        let mut entries = self.entries.lock().expect("map sink lock poisoned");
        match entries.get_mut(key) {
            Some(value) => {
                apply(value);
                true
            }
            None => false,
        }
    }

    pub fn get(&self, key: &K) -> Option<V> {
        self.entries
            .lock()
            .expect("map sink lock poisoned")
            .get(key)
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().expect("map sink lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Copy of the whole map, for inspection and tests.
    pub fn snapshot(&self) -> HashMap<K, V> {
        self.entries
            .lock()
            .expect("map sink lock poisoned")
            .clone()
    }
}

/// A pub/sub topic with explicit subscriber channels.
///
/// Each subscriber gets its own bounded channel, and `publish` fans a
/// message out to every live subscriber in subscription order. Messages to
/// one subscriber arrive in publish order. A subscriber that fell behind
/// stalls the publisher (bounded backoff, then an error) instead of
/// silently losing messages; a dropped subscriber is pruned.
#[derive(Clone)]
pub struct Topic<T> {
    name: String,
    subscribers: Arc<Mutex<Vec<Sender<T>>>>,
}

const PUBLISH_BACKOFF_ATTEMPTS: u32 = 10;
const PUBLISH_BACKOFF_BASE: Duration = Duration::from_millis(1);

impl<T: Clone> Topic<T> {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            subscribers: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Register a subscriber with its own buffer of `capacity` messages.
    pub fn subscribe(&self, capacity: usize) -> Receiver<T> {
        let (sender, receiver) = bounded(capacity);
        self.subscribers
            .lock()
            .expect("topic lock poisoned")
            .push(sender);
        receiver
    }

    /// Deliver `message` to every live subscriber. Subscribers whose
    /// receiver is gone are dropped from the list.
    pub fn publish(&self, message: T) -> Result<()> {
        let mut subscribers = self.subscribers.lock().expect("topic lock poisoned");
        let mut stalled = false;

        subscribers.retain(|sender| {
            let mut pending = message.clone();
            let mut delay = PUBLISH_BACKOFF_BASE;
            for _ in 0..PUBLISH_BACKOFF_ATTEMPTS {
                match sender.try_send(pending) {
                    Ok(()) => return true,
                    Err(crossbeam_channel::TrySendError::Full(back)) => {
                        pending = back;
                        std::thread::sleep(delay);
                        delay = delay.saturating_mul(2);
                    }
                    Err(crossbeam_channel::TrySendError::Disconnected(_)) => return false,
                }
            }
            stalled = true;
            true
        });

        if stalled {
            return Err(anyhow!(
                "subscriber on topic '{}' still full after backoff",
                self.name
            ));
        }
        Ok(())
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().expect("topic lock poisoned").len()
    }
}
