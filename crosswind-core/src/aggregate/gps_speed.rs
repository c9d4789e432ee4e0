use serde::{Deserialize, Serialize};

use crate::model::{GpsPoint, SpeedResult};

use super::AggregateFunction;

/// Radius used for great-circle distance, in metres.
const RADIUS_OF_THE_EARTH_M: f64 = 6_371_000.0;

/// Reduces the GPS fixes for one entity within a time window to a speed.
///
/// Only the event-time earliest and latest fixes matter for the distance;
/// intermediate fixes are merely counted, the count being a rough indicator
/// of how trustworthy the window was (more fixes, better coverage).
///
/// The estimate knowingly ignores elevation and the Earth's flattening:
/// haversine great-circle distance between the two fixes, divided by the
/// elapsed seconds between them.
#[derive(Debug, Clone, Default)]
pub struct GpsSpeed;

/// Accumulator for [`GpsSpeed`]: the extreme fixes seen so far in the
/// window, by event time rather than by arrival order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GpsTrack {
    key: Option<String>,
    first: Option<GpsPoint>,
    last: Option<GpsPoint>,
    points: u32,
}

impl GpsTrack {
    pub fn points(&self) -> u32 {
        self.points
    }
}

impl AggregateFunction<(String, GpsPoint), GpsTrack, SpeedResult> for GpsSpeed {
    fn create(&self) -> GpsTrack {
        GpsTrack::default()
    }

    fn accumulate(&self, acc: &mut GpsTrack, element: &(String, GpsPoint)) {
        let (key, fix) = element;
        match (&mut acc.first, &mut acc.last) {
            (Some(first), Some(last)) => {
                debug_assert_eq!(acc.key.as_deref(), Some(key.as_str()));
                acc.points += 1;
                if fix.timestamp < first.timestamp {
                    *first = fix.clone();
                }
                if fix.timestamp > last.timestamp {
                    *last = fix.clone();
                }
            }
            _ => {
                // Initial fix, possibly the only one in the window.
                acc.key = Some(key.clone());
                acc.first = Some(fix.clone());
                acc.last = Some(fix.clone());
                acc.points = 1;
            }
        }
    }

    fn combine(&self, acc: &mut GpsTrack, other: GpsTrack) {
        acc.points += other.points;

        if acc.key.is_none() {
            // Merge destination empty.
            acc.key = other.key;
            acc.first = other.first;
            acc.last = other.last;
            return;
        }
        if other.key.is_none() {
            return;
        }
        debug_assert_eq!(acc.key, other.key, "combine across different keys");

        // Earliest first wins; latest last wins. Either side may supply
        // either extreme, so the merge commutes.
        if let (Some(mine), Some(theirs)) = (&mut acc.first, &other.first) {
            if theirs.timestamp < mine.timestamp {
                *mine = theirs.clone();
            }
        }
        if let (Some(mine), Some(theirs)) = (&mut acc.last, &other.last) {
            if theirs.timestamp > mine.timestamp {
                *mine = theirs.clone();
            }
        }
    }

    fn finish(&self, acc: &GpsTrack) -> Option<SpeedResult> {
        let (key, first, last) = match (&acc.key, &acc.first, &acc.last) {
            (Some(key), Some(first), Some(last)) => (key, first, last),
            _ => return None,
        };

        let metres_per_second = if acc.points > 1 {
            speed_between(first, last)
        } else {
            // A single fix can't move.
            0.0
        };

        Some(SpeedResult {
            key: key.clone(),
            timestamp: last.timestamp,
            metres_per_second,
        })
    }
}

/// Haversine speed between two fixes. Zero when the fixes coincide or when
/// no time elapsed between them, so the division can never blow up.
fn speed_between(first: &GpsPoint, last: &GpsPoint) -> f64 {
    if last.latitude == first.latitude && last.longitude == first.longitude {
        return 0.0;
    }
    // Float division keeps sub-second precision in the elapsed time.
    let seconds = (last.timestamp - first.timestamp) as f64 / 1000.0;
    if seconds <= 0.0 {
        return 0.0;
    }

    let lat1 = last.latitude.to_radians();
    let lat2 = first.latitude.to_radians();
    let long1 = last.longitude.to_radians();
    let long2 = first.longitude.to_radians();

    let lat_diff = lat1 - lat2;
    let long_diff = long1 - long2;

    let h = (lat_diff / 2.0).sin().powi(2)
        + (long_diff / 2.0).sin().powi(2) * lat1.cos() * lat2.cos();
    let metres = 2.0 * RADIUS_OF_THE_EARTH_M * h.sqrt().asin();

    metres / seconds
}
