//! # Crosswind Core
//!
//! Core runtime for the crosswind stream analysis engine: windowed
//! incremental aggregation over keyed, timestamped event streams, built so
//! that partial results computed on different workers merge into a correct
//! final result.
//!
//! - [`types`] — stream elements: [`StreamRecord`](types::StreamRecord),
//!   [`Watermark`](types::Watermark), the [`StreamData`](types::StreamData)
//!   trait bound.
//! - [`model`] — domain records: currency pairs, rate points, GPS fixes,
//!   speeds and trend-cross alerts.
//! - [`aggregate`] — the accumulate/combine/finish protocol
//!   ([`AggregateFunction`](aggregate::AggregateFunction)) and its concrete
//!   implementations: moving average, GPS speed, dual-stream rate grouping,
//!   cross detection, counting.
//! - [`window`] — [`WindowPolicy`](window::WindowPolicy), sliding window
//!   assignment, and the keyed window operators.
//! - [`time`] — event time: watermark strategies and timers.
//! - [`channel`], [`partitioner`], [`sink`] — bounded channels, key-hash
//!   routing, and the map/topic result sinks.
//! - [`ledger`] — account baseline + transaction materialisation.

pub mod aggregate;
pub mod channel;
pub mod ledger;
pub mod model;
pub mod partitioner;
pub mod sink;
pub mod time;
pub mod types;
pub mod window;
