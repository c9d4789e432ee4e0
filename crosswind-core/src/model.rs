//! Domain data model: currency pairs, rate points, GPS fixes, speed and
//! trend-cross results.
//!
//! Parsing lives here too. Sources reject malformed lines before any record
//! reaches an aggregator, so aggregators only ever see well-typed values.

use std::str::FromStr;

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, NaiveDate, NaiveTime};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::types::EventTime;

/// Day (UTC) that an event-time millisecond timestamp falls on.
pub fn day_of(timestamp: EventTime) -> NaiveDate {
    DateTime::from_timestamp_millis(timestamp)
        .map(|dt| dt.date_naive())
        .unwrap_or(NaiveDate::MIN)
}

/// Millisecond timestamp of midnight (UTC) on the given day.
pub fn day_start_millis(day: NaiveDate) -> EventTime {
    day.and_time(NaiveTime::MIN).and_utc().timestamp_millis()
}

// ── Currency pairs ────────────────────────────────────────────────────────────

/// A currency pair. `USD/EUR` converts from US Dollars (the base) to
/// Euros (the quote).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CurrencyPair {
    pub base: String,
    pub quote: String,
}

impl CurrencyPair {
    pub fn new(base: impl Into<String>, quote: impl Into<String>) -> Self {
        Self {
            base: base.into(),
            quote: quote.into(),
        }
    }

    /// Parse the compact six-letter wire form, `"USDEUR"` -> `USD/EUR`.
    pub fn from_compact(s: &str) -> Result<Self> {
        if s.len() != 6 || !s.chars().all(|c| c.is_ascii_alphabetic()) {
            return Err(anyhow!("not a compact currency pair: {s:?}"));
        }
        Ok(Self::new(&s[0..3], &s[3..6]))
    }
}

impl std::fmt::Display for CurrencyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.base, self.quote)
    }
}

// ── Quotes and averages ───────────────────────────────────────────────────────

/// One raw exchange-rate quote: the rate that applied on a given day.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateTick {
    pub day: NaiveDate,
    pub rate: Decimal,
}

impl RateTick {
    /// Event time of the tick, midnight UTC of its day.
    pub fn timestamp(&self) -> EventTime {
        day_start_millis(self.day)
    }
}

impl FromStr for RateTick {
    type Err = anyhow::Error;

    /// Parse the CSV wire form `"2018-11-07,7323.4"`.
    fn from_str(s: &str) -> Result<Self> {
        let (day, rate) = s
            .split_once(',')
            .ok_or_else(|| anyhow!("rate tick has no comma: {s:?}"))?;
        Ok(Self {
            day: day
                .trim()
                .parse()
                .with_context(|| format!("bad day in rate tick {s:?}"))?,
            rate: rate
                .trim()
                .parse()
                .map_err(|e| anyhow!("bad rate in rate tick {s:?}: {e}"))?,
        })
    }
}

/// A rate at a point in time: raw quotes and moving averages share this
/// shape so every branch of a price pipeline emits the same type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RatePoint {
    pub timestamp: EventTime,
    pub rate: Decimal,
}

impl RatePoint {
    pub fn new(timestamp: EventTime, rate: Decimal) -> Self {
        Self { timestamp, rate }
    }

    pub fn day(&self) -> NaiveDate {
        day_of(self.timestamp)
    }
}

// ── GPS ───────────────────────────────────────────────────────────────────────

/// A GPS fix. Latitude and longitude in degrees.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GpsPoint {
    pub timestamp: EventTime,
    pub latitude: f64,
    pub longitude: f64,
}

impl FromStr for GpsPoint {
    type Err = anyhow::Error;

    /// Parse the CSV wire form `"timestamp_ms,latitude,longitude"`.
    fn from_str(s: &str) -> Result<Self> {
        let mut tokens = s.split(',').map(str::trim);
        let mut next = |what: &str| {
            tokens
                .next()
                .ok_or_else(|| anyhow!("gps fix missing {what}: {s:?}"))
        };
        let timestamp = next("timestamp")?
            .parse()
            .with_context(|| format!("bad timestamp in gps fix {s:?}"))?;
        let latitude = next("latitude")?
            .parse()
            .with_context(|| format!("bad latitude in gps fix {s:?}"))?;
        let longitude = next("longitude")?
            .parse()
            .with_context(|| format!("bad longitude in gps fix {s:?}"))?;
        Ok(Self {
            timestamp,
            latitude,
            longitude,
        })
    }
}

/// A speed estimate for one entity over one window, in metres per second.
/// The timestamp is that of the later of the two points it was derived from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpeedResult {
    pub key: String,
    pub timestamp: EventTime,
    pub metres_per_second: f64,
}

impl SpeedResult {
    /// Composite sink key, `"{key},{timestamp}"`. The downstream store keys
    /// speeds by this single string rather than a structured pair.
    pub fn entry_key(&self) -> String {
        format!("{},{}", self.key, self.timestamp)
    }
}

// ── Trend crosses ─────────────────────────────────────────────────────────────

/// Which way the short-period average crossed the long-period one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TrendDirection {
    Upward,
    Downward,
}

impl TrendDirection {
    /// Informal trader name for the cross.
    pub fn cross_name(self) -> &'static str {
        match self {
            TrendDirection::Upward => "Golden Cross",
            TrendDirection::Downward => "Death Cross",
        }
    }
}

impl std::fmt::Display for TrendDirection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TrendDirection::Upward => f.write_str("Upward"),
            TrendDirection::Downward => f.write_str("Downward"),
        }
    }
}

/// An alert produced when the two moving averages cross.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CrossAlert {
    pub day: NaiveDate,
    pub direction: TrendDirection,
    pub short_rate: Decimal,
    pub long_rate: Decimal,
}

impl CrossAlert {
    /// Text published to the alert topic, e.g.
    /// `"Golden Cross at 2018-11-07 (50-point $6400.00, 200-point $6390.10)"`.
    pub fn message(&self, short_points: usize, long_points: usize) -> String {
        format!(
            "{} at {} ({}-point ${}, {}-point ${})",
            self.direction.cross_name(),
            self.day,
            short_points,
            self.short_rate,
            long_points,
            self.long_rate
        )
    }
}
