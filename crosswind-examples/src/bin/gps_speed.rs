//! GPS speed demo: a train's position fixes reduced to point-to-point
//! speeds over a one-minute window advancing every ten seconds.

use std::time::Duration;

use anyhow::Result;

use crosswind_api::environment::StreamExecutionEnvironment;
use crosswind_core::aggregate::GpsSpeed;
use crosswind_core::model::GpsPoint;
use crosswind_core::sink::MapSink;
use crosswind_core::time::AscendingTimestamps;
use crosswind_core::window::WindowPolicy;

/// Westbound out of London: one fix every ten seconds, longitude dropping
/// ~0.005 degrees per step (roughly 35 m/s at this latitude).
fn demo_trace() -> Vec<(String, GpsPoint)> {
    (0..18i64)
        .map(|i| {
            (
                "18:48 Departure".to_string(),
                GpsPoint {
                    timestamp: i * 10_000,
                    latitude: 51.5160 - i as f64 * 0.0004,
                    longitude: -0.1770 - i as f64 * 0.0050,
                },
            )
        })
        .collect()
}

fn main() -> Result<()> {
    tracing_subscriber::fmt().init();

    let env = StreamExecutionEnvironment::new("gps-speed");
    let out = env
        .from_iter(demo_trace())
        .assign_timestamps_and_watermarks(AscendingTimestamps::new(
            |f: &(String, GpsPoint)| f.1.timestamp,
        ))
        .key_by(|f: &(String, GpsPoint)| f.0.clone())
        .window(WindowPolicy::sliding(
            Duration::from_secs(60),
            Duration::from_secs(10),
        )?)?
        .aggregate(GpsSpeed)
        // Every fix belongs to one key, but run partitioned anyway to show
        // the combine path: worker partials merge at the collector.
        .execute_with_parallelism(2)?;

    let speeds: MapSink<String, f64> = MapSink::new("speed");
    for record in &out {
        let speed = &record.value;
        if speed.metres_per_second > 0.0 {
            speeds.put(speed.entry_key(), speed.metres_per_second);
            println!(
                "window closing at {:>7}ms: {:.2} m/s",
                record.timestamp.unwrap_or(-1),
                speed.metres_per_second
            );
        }
    }
    println!("{} speed estimates stored", speeds.len());
    Ok(())
}
