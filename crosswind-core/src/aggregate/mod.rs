//! The accumulate/combine/finish aggregation protocol and its concrete
//! implementations.
//!
//! Every windowed computation in the engine is expressed against
//! [`AggregateFunction`] (one input stream) or [`AggregateFunction2`] (two
//! input streams co-grouped into one accumulator). The protocol exists so
//! that partial results computed independently on different workers can be
//! merged into a correct final result: `combine` must behave as a
//! commutative monoid over disjoint partials of the same (key, window), and
//! `finish` output must not depend on merge order or grouping.

use std::collections::HashMap;

use anyhow::Result;

use crate::types::StreamData;
use crate::window::TimeWindow;

mod cogroup;
mod counting;
mod cross;
mod gps_speed;
mod keyed;
mod moving_average;

pub use cogroup::*;
pub use counting::*;
pub use cross::*;
pub use gps_speed::*;
pub use keyed::*;
pub use moving_average::*;

#[cfg(test)]
#[path = "tests/aggregate_tests.rs"]
mod tests;

/// Incremental aggregation over a single input stream.
///
/// One accumulator lives per active (key, window). It is created on the
/// first record, mutated by `accumulate` (and `combine` when partials
/// merge), asked for a result by `finish`, and discarded when its window
/// closes.
///
/// None of the operations may fail on well-formed input: malformed records
/// are rejected by source adapters and never reach an aggregator, and
/// insufficient data is expressed as `finish` returning `None`, not as an
/// error.
pub trait AggregateFunction<IN, ACC, OUT>: Send {
    /// Create a zero-value accumulator for a new (key, window).
    fn create(&self) -> ACC;

    /// Absorb one record. Must be correct regardless of the order records
    /// within one window arrive in.
    fn accumulate(&self, acc: &mut ACC, element: &IN);

    /// Merge another accumulator holding a disjoint partial view of the same
    /// (key, window) into `acc`. Must be associative and commutative.
    fn combine(&self, acc: &mut ACC, other: ACC);

    /// The externally visible result, or `None` when not enough data has
    /// accumulated. Calling this on a freshly created accumulator always
    /// returns `None`.
    fn finish(&self, acc: &ACC) -> Option<OUT>;
}

/// Incremental aggregation over two co-grouped input streams.
///
/// Same lifecycle and `combine` contract as [`AggregateFunction`], with one
/// accumulate operation per input ordinal.
pub trait AggregateFunction2<IN0, IN1, ACC, OUT>: Send {
    fn create(&self) -> ACC;

    /// Absorb one record from the first input.
    fn accumulate_first(&self, acc: &mut ACC, element: &IN0);

    /// Absorb one record from the second input.
    fn accumulate_second(&self, acc: &mut ACC, element: &IN1);

    fn combine(&self, acc: &mut ACC, other: ACC);

    fn finish(&self, acc: &ACC) -> Option<OUT>;
}

/// Coordinator-side merge step for parallel window aggregation.
///
/// Workers each process one key partition and emit their accumulator per
/// (key, window) when the window closes; this gathers those partials,
/// merges same-(key, window) ones with `combine`, and applies `finish`.
/// Results are ordered by window start then key bytes so the output is
/// deterministic regardless of the interleaving of worker partials.
pub fn merge_and_finish<K, IN, ACC, OUT, A>(
    aggregate: &A,
    partials: impl IntoIterator<Item = (K, TimeWindow, ACC)>,
) -> Result<Vec<(K, TimeWindow, OUT)>>
where
    K: StreamData,
    A: AggregateFunction<IN, ACC, OUT>,
{
    let mut merged: HashMap<(Vec<u8>, TimeWindow), (K, ACC)> = HashMap::new();
    for (key, window, partial) in partials {
        let key_bytes = bincode::serialize(&key)?;
        match merged.entry((key_bytes, window)) {
            std::collections::hash_map::Entry::Occupied(mut entry) => {
                aggregate.combine(&mut entry.get_mut().1, partial);
            }
            std::collections::hash_map::Entry::Vacant(entry) => {
                entry.insert((key, partial));
            }
        }
    }

    let mut entries: Vec<_> = merged.into_iter().collect();
    entries.sort_by(|a, b| {
        (a.0 .1.start, &a.0 .0)
            .cmp(&(b.0 .1.start, &b.0 .0))
    });

    Ok(entries
        .into_iter()
        .filter_map(|((_bytes, window), (key, acc))| {
            aggregate.finish(&acc).map(|out| (key, window, out))
        })
        .collect())
}
