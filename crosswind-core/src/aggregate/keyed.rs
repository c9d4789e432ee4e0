use std::collections::VecDeque;
use std::marker::PhantomData;

use super::*;

/// Count-window driver: exactly one live accumulator per key, asked for a
/// result after every record.
///
/// Emission is transactional against the sink. Each record is accumulated
/// into a scratch copy of the key's state; only once any resulting emission
/// has been accepted downstream is the copy committed. If the sink refuses
/// (backpressure), the committed state is untouched and the record joins a
/// pending queue to be retried at the next scheduling opportunity — the
/// record is neither dropped nor double-applied, and the fill counter never
/// advances for a record the sink has not consumed.
///
/// Records for a key with queued pending work line up behind it, preserving
/// per-key order.
pub struct CountWindowOperator<K, IN, ACC, OUT, A>
where
    K: StreamData,
    IN: StreamData,
    ACC: Clone,
    A: AggregateFunction<IN, ACC, OUT>,
{
    aggregate: A,
    states: HashMap<Vec<u8>, ACC>,
    pending: VecDeque<(Vec<u8>, K, IN)>,
    _phantom: PhantomData<OUT>,
}

impl<K, IN, ACC, OUT, A> CountWindowOperator<K, IN, ACC, OUT, A>
where
    K: StreamData,
    IN: StreamData,
    ACC: Clone,
    A: AggregateFunction<IN, ACC, OUT>,
{
    pub fn new(aggregate: A) -> Self {
        Self {
            aggregate,
            states: HashMap::new(),
            pending: VecDeque::new(),
            _phantom: PhantomData,
        }
    }

    /// Feed one keyed record. `emit` delivers an output downstream and
    /// returns whether it was accepted; refusal leaves this record pending.
    pub fn offer<E>(&mut self, key: K, record: IN, emit: &mut E) -> Result<()>
    where
        E: FnMut(&K, OUT) -> bool,
    {
        let key_bytes = bincode::serialize(&key)?;
        if self.pending.iter().any(|(kb, _, _)| *kb == key_bytes) {
            // Keep per-key order: line up behind the stalled record.
            self.pending.push_back((key_bytes, key, record));
            return Ok(());
        }
        if !self.apply(&key_bytes, &key, &record, emit) {
            self.pending.push_back((key_bytes, key, record));
        }
        Ok(())
    }

    /// Retry records refused earlier. Stops at the first record the sink
    /// still refuses, keeping arrival order intact.
    pub fn retry_pending<E>(&mut self, emit: &mut E)
    where
        E: FnMut(&K, OUT) -> bool,
    {
        while let Some((key_bytes, key, record)) = self.pending.pop_front() {
            if !self.apply(&key_bytes, &key, &record, emit) {
                self.pending.push_front((key_bytes, key, record));
                break;
            }
        }
    }

    /// Number of records waiting on sink backpressure.
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    // Returns true if the record was consumed (committed).
    fn apply<E>(&mut self, key_bytes: &[u8], key: &K, record: &IN, emit: &mut E) -> bool
    where
        E: FnMut(&K, OUT) -> bool,
    {
        let mut trial = self
            .states
            .get(key_bytes)
            .cloned()
            .unwrap_or_else(|| self.aggregate.create());
        self.aggregate.accumulate(&mut trial, record);

        match self.aggregate.finish(&trial) {
            // Nothing to produce yet; just commit the accumulation.
            None => {
                self.states.insert(key_bytes.to_vec(), trial);
                true
            }
            Some(out) => {
                if emit(key, out) {
                    self.states.insert(key_bytes.to_vec(), trial);
                    true
                } else {
                    tracing::trace!("sink refused emission, record queued for retry");
                    false
                }
            }
        }
    }
}
