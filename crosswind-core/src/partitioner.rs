//! Key-based routing of records to parallel workers.
//!
//! All records for one key must land on the same worker, so per-key
//! accumulator state is only ever mutated by a single thread; `combine`
//! exists for the coordinator that merges the workers' partials afterwards.

use std::hash::{Hash, Hasher};
use std::marker::PhantomData;

use ahash::AHasher;

/// Decides which of `num_partitions` workers a value is routed to.
pub trait Partitioner<T>: Send + Sync {
    fn partition(&self, value: &T, num_partitions: usize) -> usize;
}

/// Hash partitioner over a key selector. Deterministic per key, so routing
/// is stable for the lifetime of a job.
pub struct KeyHashPartitioner<K, F> {
    key_selector: F,
    _phantom: PhantomData<K>,
}

impl<K, F> KeyHashPartitioner<K, F> {
    pub fn new(key_selector: F) -> Self {
        Self {
            key_selector,
            _phantom: PhantomData,
        }
    }
}

impl<K, T, F> Partitioner<T> for KeyHashPartitioner<K, F>
where
    K: Hash + Send + Sync,
    F: Fn(&T) -> K + Send + Sync,
{
    fn partition(&self, value: &T, num_partitions: usize) -> usize {
        let key = (self.key_selector)(value);
        let mut hasher = AHasher::default();
        key.hash(&mut hasher);
        (hasher.finish() as usize) % num_partitions
    }
}
