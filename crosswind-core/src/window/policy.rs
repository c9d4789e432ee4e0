use super::*;

/// How a stream is carved into windows. A pure value type: the engine turns
/// it into a ring-buffer operator (count) or a window assigner (sliding).
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum WindowPolicy {
    /// A window over the last `size` records per key, sliding by one record.
    /// The first output appears once `size` records have accumulated, and
    /// every further record produces one output.
    Count { size: usize },
    /// An event-time window `length` long, advancing by `slide`. Windows
    /// overlap whenever `slide < length`, so one record can belong to
    /// several windows.
    Sliding { length: Duration, slide: Duration },
}

impl WindowPolicy {
    /// A count window of `size` records.
    pub fn count(size: usize) -> Result<Self> {
        if size == 0 {
            return Err(anyhow!("count window size must be at least 1"));
        }
        Ok(Self::Count { size })
    }

    /// A sliding event-time window.
    pub fn sliding(length: Duration, slide: Duration) -> Result<Self> {
        if length.is_zero() || slide.is_zero() {
            return Err(anyhow!("window length and slide must be non-zero"));
        }
        if slide > length {
            return Err(anyhow!(
                "window slide {slide:?} must not exceed length {length:?}"
            ));
        }
        Ok(Self::Sliding { length, slide })
    }

    /// A non-overlapping event-time window: sliding with `slide == length`.
    pub fn tumbling(length: Duration) -> Result<Self> {
        Self::sliding(length, length)
    }
}

/// A half-open event-time window `[start, end)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct TimeWindow {
    pub start: EventTime,
    pub end: EventTime,
}

impl TimeWindow {
    pub fn new(start: EventTime, end: EventTime) -> Self {
        Self { start, end }
    }

    /// The maximum timestamp that belongs to this window. A window fires
    /// when the watermark reaches this value.
    pub fn max_timestamp(&self) -> EventTime {
        self.end - 1
    }

    /// Return true if `timestamp` falls inside this window.
    pub fn contains(&self, timestamp: EventTime) -> bool {
        timestamp >= self.start && timestamp < self.end
    }
}

impl std::fmt::Display for TimeWindow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "TimeWindow([{}, {}))", self.start, self.end)
    }
}
