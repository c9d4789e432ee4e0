//! Local channels for inter-task communication.
//!
//! Bounded crossbeam channels between pipeline tasks running in different
//! threads. A full channel is how backpressure propagates: senders block, or
//! report refusal so the caller can requeue.

use std::time::Duration;

use anyhow::{anyhow, Result};
use crossbeam_channel::{bounded, Receiver, Sender};

use crate::types::StreamElement;

/// Default channel buffer size. Smaller buffers give lower latency, larger
/// ones ride out bursts better.
const DEFAULT_CHANNEL_CAPACITY: usize = 1024;

/// Sender side of a local channel.
pub struct StreamSender<T> {
    sender: Sender<StreamElement<T>>,
}

// Not derived: cloning the sender must not require `T: Clone`.
impl<T> Clone for StreamSender<T> {
    fn clone(&self) -> Self {
        Self {
            sender: self.sender.clone(),
        }
    }
}

impl<T> StreamSender<T> {
    /// Send a stream element, blocking while the channel is full.
    pub fn send(&self, element: StreamElement<T>) -> Result<()> {
        self.sender
            .send(element)
            .map_err(|_| anyhow!("channel closed: receiver dropped"))
    }

    /// Try to send without blocking. `Ok(false)` means the channel was full
    /// and the element was not delivered; the caller owns the retry.
    pub fn try_send(&self, element: StreamElement<T>) -> Result<bool> {
        match self.sender.try_send(element) {
            Ok(()) => Ok(true),
            Err(crossbeam_channel::TrySendError::Full(_)) => Ok(false),
            Err(crossbeam_channel::TrySendError::Disconnected(_)) => {
                Err(anyhow!("channel closed: receiver dropped"))
            }
        }
    }

    /// Send with bounded backoff: retry a full channel `attempts` times,
    /// sleeping `base_delay` doubled per attempt. `Ok(false)` means the
    /// backoff was exhausted with the channel still full — the item was not
    /// delivered and must be requeued by the caller, never dropped.
    pub fn send_with_backoff(
        &self,
        element: StreamElement<T>,
        attempts: u32,
        base_delay: Duration,
    ) -> Result<bool> {
        let mut element = element;
        let mut delay = base_delay;
        for _ in 0..attempts {
            match self.sender.try_send(element) {
                Ok(()) => return Ok(true),
                Err(crossbeam_channel::TrySendError::Full(back)) => {
                    element = back;
                    std::thread::sleep(delay);
                    delay = delay.saturating_mul(2);
                }
                Err(crossbeam_channel::TrySendError::Disconnected(_)) => {
                    return Err(anyhow!("channel closed: receiver dropped"));
                }
            }
        }
        Ok(false)
    }
}

/// Receiver side of a local channel.
pub struct StreamReceiver<T> {
    pub(crate) receiver: Receiver<StreamElement<T>>,
}

impl<T> StreamReceiver<T> {
    /// Receive the next stream element, blocking until one is available.
    pub fn recv(&self) -> Result<StreamElement<T>> {
        self.receiver
            .recv()
            .map_err(|_| anyhow!("channel closed: sender dropped"))
    }

    /// Try to receive without blocking. `Ok(None)` means no element was
    /// available.
    pub fn try_recv(&self) -> Result<Option<StreamElement<T>>> {
        match self.receiver.try_recv() {
            Ok(elem) => Ok(Some(elem)),
            Err(crossbeam_channel::TryRecvError::Empty) => Ok(None),
            Err(crossbeam_channel::TryRecvError::Disconnected) => {
                Err(anyhow!("channel closed: sender dropped"))
            }
        }
    }
}

/// Create a bounded local channel pair. When the channel is full, `send`
/// blocks; that is how backpressure propagates upstream through a pipeline.
pub fn stream_channel<T>(capacity: usize) -> (StreamSender<T>, StreamReceiver<T>) {
    let (sender, receiver) = bounded(capacity);
    (StreamSender { sender }, StreamReceiver { receiver })
}

/// Create a local channel with default capacity.
pub fn stream_channel_default<T>() -> (StreamSender<T>, StreamReceiver<T>) {
    stream_channel(DEFAULT_CHANNEL_CAPACITY)
}
