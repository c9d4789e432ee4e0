use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::model::RatePoint;
use crate::types::EventTime;

use super::AggregateFunction2;

/// Co-groups one window of short-period averages (first input) with the
/// matching window of long-period averages (second input).
///
/// The window is expected to span two emission periods (two days sliding by
/// one, in the price pipeline), so each side should contribute exactly two
/// points. The join is deliberately strict: unless both sides hold two
/// points *and* agree on the newer timestamp, `finish` reports nothing, so
/// downstream never sees a partial comparison. Early in a stream the long
/// side lags the short side by construction and whole windows are dropped
/// here; that is the intended behaviour, not data loss.
#[derive(Debug, Clone, Default)]
pub struct RatePairGrouper;

/// Accumulator for [`RatePairGrouper`]: at most two (timestamp, rate) pairs
/// per input, ascending by timestamp.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RatePairs {
    short: Vec<(EventTime, Decimal)>,
    long: Vec<(EventTime, Decimal)>,
}

/// The aligned output: previous and current rate from each side, stamped
/// with the shared newer timestamp.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlignedRates {
    pub timestamp: EventTime,
    /// `[previous, current]` short-period rates.
    pub short: [Decimal; 2],
    /// `[previous, current]` long-period rates.
    pub long: [Decimal; 2],
}

fn push(side: &mut Vec<(EventTime, Decimal)>, ordinal: usize, point: &RatePoint) {
    if side.len() >= 2 {
        tracing::warn!(
            ordinal,
            timestamp = point.timestamp,
            "window already holds two points, dropping"
        );
        return;
    }
    insert_deduped(side, point.timestamp, point.rate);
}

fn insert_deduped(side: &mut Vec<(EventTime, Decimal)>, timestamp: EventTime, rate: Decimal) {
    // Same timestamp means the same point arrived via another partial.
    if side.iter().any(|(ts, _)| *ts == timestamp) {
        return;
    }
    let pos = side
        .iter()
        .rposition(|(ts, _)| *ts <= timestamp)
        .map(|p| p + 1)
        .unwrap_or(0);
    side.insert(pos, (timestamp, rate));
}

impl AggregateFunction2<RatePoint, RatePoint, RatePairs, AlignedRates> for RatePairGrouper {
    fn create(&self) -> RatePairs {
        RatePairs::default()
    }

    fn accumulate_first(&self, acc: &mut RatePairs, element: &RatePoint) {
        push(&mut acc.short, 0, element);
    }

    fn accumulate_second(&self, acc: &mut RatePairs, element: &RatePoint) {
        push(&mut acc.long, 1, element);
    }

    fn combine(&self, acc: &mut RatePairs, other: RatePairs) {
        for (timestamp, rate) in other.short {
            insert_deduped(&mut acc.short, timestamp, rate);
        }
        for (timestamp, rate) in other.long {
            insert_deduped(&mut acc.long, timestamp, rate);
        }
    }

    fn finish(&self, acc: &RatePairs) -> Option<AlignedRates> {
        if acc.short.len() != 2 || acc.long.len() != 2 {
            return None;
        }
        // Both sides must agree on what "current" means.
        if acc.short[1].0 != acc.long[1].0 {
            return None;
        }
        Some(AlignedRates {
            timestamp: acc.short[1].0,
            short: [acc.short[0].1, acc.short[1].1],
            long: [acc.long[0].1, acc.long[1].1],
        })
    }
}
