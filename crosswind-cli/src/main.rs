use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use rust_decimal::Decimal;

use crosswind_api::environment::StreamExecutionEnvironment;
use crosswind_core::aggregate::{
    tokenize, Counting, CrossDetector, GpsSpeed, RatePairGrouper, TickAverage,
};
use crosswind_core::model::{CurrencyPair, GpsPoint, RatePoint, RateTick, TrendDirection};
use crosswind_core::sink::{MapSink, Topic};
use crosswind_core::time::AscendingTimestamps;
use crosswind_core::window::WindowPolicy;

const ONE_DAY: Duration = Duration::from_millis(24 * 60 * 60 * 1000);

#[derive(Parser, Debug)]
#[command(name = "crosswind")]
#[command(about = "Run crosswind stream analysis pipelines", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Moving averages over a quote feed, with golden/death cross alerts.
    MovingAverage {
        /// CSV file of `YYYY-MM-DD,rate` lines.
        #[arg(long)]
        input: PathBuf,
        /// Compact currency pair the quotes belong to, e.g. BTCUSD.
        #[arg(long, default_value = "BTCUSD")]
        pair: String,
        /// Short averaging window, in points.
        #[arg(long, default_value_t = 50)]
        short: usize,
        /// Long averaging window, in points.
        #[arg(long, default_value_t = 200)]
        long: usize,
    },
    /// Point-to-point speed estimates from a GPS trace.
    GpsSpeed {
        /// CSV file of `timestamp_ms,latitude,longitude` lines.
        #[arg(long)]
        input: PathBuf,
        /// Key the trace belongs to (one vehicle/journey).
        #[arg(long, default_value = "18:48 Departure")]
        key: String,
        /// Worker threads; partial window states merge at the collector.
        #[arg(long, default_value_t = 1)]
        parallelism: usize,
    },
    /// Count the words of a text file.
    WordCount {
        #[arg(long)]
        input: PathBuf,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::MovingAverage {
            input,
            pair,
            short,
            long,
        } => run_moving_average(&input, &pair, short, long),
        Commands::GpsSpeed {
            input,
            key,
            parallelism,
        } => run_gps_speed(&input, &key, parallelism),
        Commands::WordCount { input } => run_word_count(&input),
    }
}

fn read_lines(path: &Path) -> Result<Vec<String>> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("reading input file {}", path.display()))?;
    Ok(text
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(str::to_string)
        .collect())
}

fn run_moving_average(input: &Path, pair: &str, short: usize, long: usize) -> Result<()> {
    let pair = CurrencyPair::from_compact(pair)?;

    // Malformed lines are rejected here; the aggregators only ever see
    // well-typed ticks.
    let mut ticks: Vec<(CurrencyPair, RatePoint)> = Vec::new();
    for line in read_lines(input)? {
        match line.parse::<RateTick>() {
            Ok(tick) => ticks.push((pair.clone(), RatePoint::new(tick.timestamp(), tick.rate))),
            Err(err) => tracing::warn!(%err, "skipping malformed quote line"),
        }
    }
    tracing::info!(pair = %pair, ticks = ticks.len(), "starting moving average job");

    let prices: MapSink<String, RatePoint> = MapSink::new(pair.to_string());
    let key_fn = |t: &(CurrencyPair, RatePoint)| t.0.clone();

    let mut run_branch = |label: String, size: usize| -> Result<Vec<RatePoint>> {
        let env = StreamExecutionEnvironment::new(format!("average-of-{size}"));
        let out = env
            .from_iter(ticks.clone())
            .key_by(key_fn)
            .count_windowed(TickAverage::new(size))
            .execute()?;
        let points: Vec<RatePoint> = out.into_iter().map(|(_, point)| point).collect();
        if let Some(latest) = points.last() {
            prices.put(label, latest.clone());
        }
        Ok(points)
    };

    let current = run_branch("Current".to_string(), 1)?;
    let short_points = run_branch(format!("{short} Point"), short)?;
    let long_points = run_branch(format!("{long} Point"), long)?;

    for (label, points) in [
        ("current", &current),
        ("short average", &short_points),
        ("long average", &long_points),
    ] {
        match points.last() {
            Some(point) => println!("{label}: {} on {}", point.rate, point.day()),
            None => println!("{label}: not enough data"),
        }
    }

    // Cross analysis: the two averaged feeds co-grouped over a two-day
    // window advancing daily, then scanned for golden/death crosses.
    let alert_topic: Topic<String> = Topic::new("alert");
    let subscriber = alert_topic.subscribe(64);
    let alert_map: MapSink<(NaiveDate, TrendDirection), (Decimal, Decimal)> =
        MapSink::new("alert");

    let env = StreamExecutionEnvironment::new("cross-analysis");
    let short_stream = env
        .from_iter(short_points)
        .assign_timestamps_and_watermarks(AscendingTimestamps::new(|p: &RatePoint| p.timestamp));
    let long_stream = env
        .from_iter(long_points)
        .assign_timestamps_and_watermarks(AscendingTimestamps::new(|p: &RatePoint| p.timestamp));

    let aligned = short_stream
        .co_group(
            long_stream,
            |_: &RatePoint| (),
            |_: &RatePoint| (),
            WindowPolicy::sliding(2 * ONE_DAY, ONE_DAY)?,
            RatePairGrouper,
        )?
        .execute()?;

    for record in &aligned {
        if let Some(alert) = CrossDetector::detect(&record.value) {
            alert_topic.publish(alert.message(short, long))?;
            alert_map.put(
                (alert.day, alert.direction),
                (alert.short_rate, alert.long_rate),
            );
        }
    }

    while let Ok(message) = subscriber.try_recv() {
        println!("ALERT: {message}");
    }
    println!(
        "{} aligned windows, {} alerts recorded",
        aligned.len(),
        alert_map.len()
    );
    Ok(())
}

fn run_gps_speed(input: &Path, key: &str, parallelism: usize) -> Result<()> {
    let mut fixes: Vec<(String, GpsPoint)> = Vec::new();
    for line in read_lines(input)? {
        match line.parse::<GpsPoint>() {
            Ok(fix) => fixes.push((key.to_string(), fix)),
            Err(err) => tracing::warn!(%err, "skipping malformed gps line"),
        }
    }
    tracing::info!(key, fixes = fixes.len(), "starting gps speed job");

    let env = StreamExecutionEnvironment::new("gps-speed");
    let job = env
        .from_iter(fixes)
        .assign_timestamps_and_watermarks(AscendingTimestamps::new(
            |f: &(String, GpsPoint)| f.1.timestamp,
        ))
        .key_by(|f: &(String, GpsPoint)| f.0.clone())
        .window(WindowPolicy::sliding(
            Duration::from_secs(60),
            Duration::from_secs(10),
        )?)?
        .aggregate(GpsSpeed);

    let out = if parallelism > 1 {
        job.execute_with_parallelism(parallelism)?
    } else {
        job.execute()?
    };

    let speeds: MapSink<String, f64> = MapSink::new("speed");
    for record in &out {
        let speed = &record.value;
        // Windows without movement say nothing useful.
        if speed.metres_per_second > 0.0 {
            speeds.put(speed.entry_key(), speed.metres_per_second);
        }
    }

    let top = out
        .iter()
        .map(|r| r.value.metres_per_second)
        .fold(0.0f64, f64::max);
    println!(
        "{} windows evaluated, {} with movement, top speed {:.2} m/s",
        out.len(),
        speeds.len(),
        top
    );
    Ok(())
}

fn run_word_count(input: &Path) -> Result<()> {
    let words: Vec<String> = read_lines(input)?
        .iter()
        .flat_map(|line| tokenize(line))
        .collect();
    tracing::info!(words = words.len(), "starting word count job");

    let env = StreamExecutionEnvironment::new("word-count");
    let out = env
        .from_iter(words)
        .key_by(|w: &String| w.clone())
        .count_windowed(Counting)
        .execute()?;

    // Running counts; keep the last emission per word.
    let words_map: MapSink<String, u64> = MapSink::new("words");
    for (word, count) in out {
        words_map.put(word, count);
    }

    let mut totals: Vec<(String, u64)> = words_map.snapshot().into_iter().collect();
    totals.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    for (word, count) in totals.iter().take(10) {
        println!("{count:>6}  {word}");
    }
    println!("{} distinct words", totals.len());
    Ok(())
}
