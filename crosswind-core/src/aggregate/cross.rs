use crate::model::{day_of, CrossAlert, TrendDirection};

use super::AlignedRates;

/// Detects the short-period average crossing the long-period one.
///
/// The input already packages the previous and current value of both sides
/// (see [`RatePairGrouper`](super::RatePairGrouper)), so detection is a pure
/// function per record with no carried state.
///
/// A short average rising from below the long average to above it is the
/// "golden cross"; falling from above to below is the "death cross". Whether
/// either actually predicts anything about future prices is a question for
/// someone else — past prices don't predict future ones, and nothing says
/// these two window lengths are the right indicators even if they did.
#[derive(Debug, Clone, Copy, Default)]
pub struct CrossDetector;

impl CrossDetector {
    /// Classify one aligned pair of series. `None` when the series touch or
    /// stay on the same side.
    pub fn detect(input: &AlignedRates) -> Option<CrossAlert> {
        let [short_prev, short_curr] = input.short;
        let [long_prev, long_curr] = input.long;

        let direction = if short_prev < long_prev && short_curr > long_curr {
            TrendDirection::Upward
        } else if short_prev > long_prev && short_curr < long_curr {
            TrendDirection::Downward
        } else {
            return None;
        };

        Some(CrossAlert {
            day: day_of(input.timestamp),
            direction,
            short_rate: short_curr,
            long_rate: long_curr,
        })
    }
}
