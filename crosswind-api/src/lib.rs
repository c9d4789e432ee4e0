//! # Crosswind API
//!
//! Fluent pipeline construction on top of `crosswind-core`:
//!
//! ```ignore
//! let out = StreamExecutionEnvironment::new("gps-speed")
//!     .from_iter(fixes)
//!     .assign_timestamps_and_watermarks(AscendingTimestamps::new(|f: &(String, GpsPoint)| f.1.timestamp))
//!     .key_by(|f: &(String, GpsPoint)| f.0.clone())
//!     .window(WindowPolicy::sliding(Duration::from_secs(60), Duration::from_secs(10))?)?
//!     .aggregate(GpsSpeed)
//!     .execute()?;
//! ```
//!
//! Jobs run single-threaded with [`execute`](datastream::WindowedJob::execute)
//! or hash-partitioned across workers with
//! [`execute_with_parallelism`](datastream::WindowedJob::execute_with_parallelism),
//! where each worker's partial window states are combined at a collector.

pub mod datastream;
pub mod environment;
