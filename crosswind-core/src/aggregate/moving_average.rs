use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

use crate::model::{CurrencyPair, RatePoint};
use crate::types::EventTime;

use super::AggregateFunction;

/// Simple moving average over the last N rates per key, driven by a count
/// window sliding one record at a time.
///
/// The average is the plainest possible one: no weighting towards recent
/// points, recomputed as sum / N on every emission rather than maintained
/// incrementally. Output is rounded to 2 decimal places, half up.
///
/// A size of 1 turns the aggregator into a pass-through that re-emits each
/// rate (at scale 2), which is how a raw price feed is given the same shape
/// as the averaged feeds.
#[derive(Debug, Clone)]
pub struct MovingAverage {
    size: usize,
}

impl MovingAverage {
    /// Average over the last `size` points. `size` of zero is a
    /// construction error.
    pub fn new(size: usize) -> Self {
        assert!(size >= 1, "moving average size must be at least 1");
        Self { size }
    }

    pub fn size(&self) -> usize {
        self.size
    }
}

/// Accumulator for [`MovingAverage`]: the newest `size` points in event-time
/// order, plus a monotone count of everything ever accumulated. The buffer
/// is bounded, so each record after it fills evicts the oldest point and
/// yields one output.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RateWindow {
    /// Up to `size` points, ascending by timestamp.
    points: Vec<(EventTime, Decimal)>,
    /// Total records accumulated, including evicted ones.
    count: u64,
}

impl RateWindow {
    pub fn count(&self) -> u64 {
        self.count
    }

    fn insert_sorted(&mut self, timestamp: EventTime, rate: Decimal) {
        let pos = self
            .points
            .iter()
            .rposition(|(ts, _)| *ts <= timestamp)
            .map(|p| p + 1)
            .unwrap_or(0);
        self.points.insert(pos, (timestamp, rate));
    }
}

impl AggregateFunction<RatePoint, RateWindow, RatePoint> for MovingAverage {
    fn create(&self) -> RateWindow {
        RateWindow::default()
    }

    fn accumulate(&self, acc: &mut RateWindow, element: &RatePoint) {
        acc.insert_sorted(element.timestamp, element.rate);
        acc.count += 1;
        if acc.points.len() > self.size {
            acc.points.remove(0);
        }
    }

    fn combine(&self, acc: &mut RateWindow, other: RateWindow) {
        // Partials hold disjoint record subsets; replaying the other side's
        // retained points in timestamp order keeps the merge insensitive to
        // which side is which.
        for (timestamp, rate) in other.points {
            acc.insert_sorted(timestamp, rate);
            if acc.points.len() > self.size {
                acc.points.remove(0);
            }
        }
        acc.count += other.count;
    }

    fn finish(&self, acc: &RateWindow) -> Option<RatePoint> {
        if acc.count < self.size as u64 || acc.points.len() < self.size {
            return None;
        }
        let sum: Decimal = acc.points.iter().map(|(_, rate)| rate).sum();
        let average = (sum / Decimal::from(self.size as u64))
            .round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero);
        let (latest_ts, _) = acc.points[acc.points.len() - 1];
        Some(RatePoint::new(latest_ts, average))
    }
}

/// [`MovingAverage`] over keyed quote ticks: the pair rides alongside the
/// rate point and the average ignores it, the engine having already
/// partitioned by it.
#[derive(Debug, Clone)]
pub struct TickAverage {
    inner: MovingAverage,
}

impl TickAverage {
    pub fn new(size: usize) -> Self {
        Self {
            inner: MovingAverage::new(size),
        }
    }

    pub fn size(&self) -> usize {
        self.inner.size()
    }
}

impl AggregateFunction<(CurrencyPair, RatePoint), RateWindow, RatePoint> for TickAverage {
    fn create(&self) -> RateWindow {
        self.inner.create()
    }

    fn accumulate(&self, acc: &mut RateWindow, element: &(CurrencyPair, RatePoint)) {
        self.inner.accumulate(acc, &element.1)
    }

    fn combine(&self, acc: &mut RateWindow, other: RateWindow) {
        self.inner.combine(acc, other)
    }

    fn finish(&self, acc: &RateWindow) -> Option<RatePoint> {
        self.inner.finish(acc)
    }
}
