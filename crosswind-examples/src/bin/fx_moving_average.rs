//! FX moving-average demo: three averaging branches over one quote feed,
//! then cross analysis between the short and long branches.
//!
//! The quote series falls and then recovers, so the short average crosses
//! below the long average on the way down (death cross) and back above it
//! on the way up (golden cross).

use std::time::Duration;

use anyhow::Result;
use rust_decimal::Decimal;

use crosswind_api::environment::StreamExecutionEnvironment;
use crosswind_core::aggregate::{CrossDetector, RatePairGrouper, TickAverage};
use crosswind_core::model::{CurrencyPair, RatePoint};
use crosswind_core::sink::{MapSink, Topic};
use crosswind_core::time::AscendingTimestamps;
use crosswind_core::window::WindowPolicy;

const ONE_DAY_MS: i64 = 24 * 60 * 60 * 1000;
const SHORT_POINTS: usize = 3;
const LONG_POINTS: usize = 5;

/// Daily closes in hundredths: a slide from 100.00 down to 88.00 and back.
const DAILY_CLOSES: &[i64] = &[
    10000, 9950, 9900, 9800, 9650, 9500, 9300, 9100, 8950, 8850, 8800, 8850, 8950, 9150, 9400,
    9700, 9950, 10150, 10300, 10400,
];

fn demo_ticks() -> Vec<(CurrencyPair, RatePoint)> {
    let pair = CurrencyPair::new("BTC", "USD");
    DAILY_CLOSES
        .iter()
        .enumerate()
        .map(|(day, close)| {
            (
                pair.clone(),
                RatePoint::new(
                    (day as i64 + 1) * ONE_DAY_MS,
                    Decimal::new(*close, 2),
                ),
            )
        })
        .collect()
}

fn averaged(size: usize) -> Result<Vec<RatePoint>> {
    let env = StreamExecutionEnvironment::new(format!("average-of-{size}"));
    let out = env
        .from_iter(demo_ticks())
        .key_by(|t: &(CurrencyPair, RatePoint)| t.0.clone())
        .count_windowed(TickAverage::new(size))
        .execute()?;
    Ok(out.into_iter().map(|(_, point)| point).collect())
}

fn main() -> Result<()> {
    tracing_subscriber::fmt().init();

    // Branch 1: the raw feed, averaged over 1 point so it has the same
    // shape as the real averages.
    let current = averaged(1)?;
    let short = averaged(SHORT_POINTS)?;
    let long = averaged(LONG_POINTS)?;

    let prices: MapSink<String, RatePoint> = MapSink::new("BTC/USD");
    for (label, points) in [
        ("Current", &current),
        ("3 Point", &short),
        ("5 Point", &long),
    ] {
        if let Some(latest) = points.last() {
            prices.put(label.to_string(), latest.clone());
            println!("{label:>8}: {} on {}", latest.rate, latest.day());
        }
    }

    // Cross analysis: align the two averaged feeds on a two-day window
    // advancing daily, then look for sign inversions.
    let env = StreamExecutionEnvironment::new("cross-analysis");
    let short_stream = env
        .from_iter(short)
        .assign_timestamps_and_watermarks(AscendingTimestamps::new(|p: &RatePoint| p.timestamp));
    let long_stream = env
        .from_iter(long)
        .assign_timestamps_and_watermarks(AscendingTimestamps::new(|p: &RatePoint| p.timestamp));

    let aligned = short_stream
        .co_group(
            long_stream,
            |_: &RatePoint| (),
            |_: &RatePoint| (),
            WindowPolicy::sliding(
                Duration::from_millis(2 * ONE_DAY_MS as u64),
                Duration::from_millis(ONE_DAY_MS as u64),
            )?,
            RatePairGrouper,
        )?
        .execute()?;

    let alert_topic: Topic<String> = Topic::new("alert");
    let alerts = alert_topic.subscribe(16);
    for record in &aligned {
        if let Some(alert) = CrossDetector::detect(&record.value) {
            alert_topic.publish(alert.message(SHORT_POINTS, LONG_POINTS))?;
        }
    }

    while let Ok(message) = alerts.try_recv() {
        println!("ALERT: {message}");
    }
    Ok(())
}
