use super::*;

/// Assigns one or more [`TimeWindow`]s to each stream element based on its
/// event-time timestamp. Window membership depends on the timestamp alone.
pub trait WindowAssigner: Send + Sync {
    /// Return the windows that contain the given timestamp.
    fn assign_windows(&self, timestamp: EventTime) -> Vec<TimeWindow>;
}

/// Fixed-size, possibly overlapping event-time windows.
/// An element belongs to `ceil(length / slide)` windows.
#[derive(Debug, Clone)]
pub struct SlidingEventTimeWindows {
    length_ms: i64,
    slide_ms: i64,
}

impl SlidingEventTimeWindows {
    /// Create sliding windows of the given `length` advancing every `slide`.
    pub fn of(length: Duration, slide: Duration) -> Self {
        Self {
            length_ms: length.as_millis() as i64,
            slide_ms: slide.as_millis() as i64,
        }
    }

    /// Build the assigner described by a [`WindowPolicy::Sliding`].
    pub fn from_policy(policy: &WindowPolicy) -> Result<Self> {
        match policy {
            WindowPolicy::Sliding { length, slide } => Ok(Self::of(*length, *slide)),
            WindowPolicy::Count { .. } => {
                Err(anyhow!("count windows are not event-time windows"))
            }
        }
    }

    /// The slide, as a duration. Used for frame-aligned watermark emission.
    pub fn slide(&self) -> Duration {
        Duration::from_millis(self.slide_ms as u64)
    }
}

impl WindowAssigner for SlidingEventTimeWindows {
    fn assign_windows(&self, timestamp: EventTime) -> Vec<TimeWindow> {
        // Walk back from the last window start by slide until no window
        // covers the timestamp.
        let last_start = timestamp - timestamp.rem_euclid(self.slide_ms);
        let mut windows = Vec::new();
        let mut start = last_start;
        while start > timestamp - self.length_ms {
            windows.push(TimeWindow::new(start, start + self.length_ms));
            start -= self.slide_ms;
        }
        windows
    }
}
