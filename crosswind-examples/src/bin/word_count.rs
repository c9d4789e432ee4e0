//! The classic word count, run through the same keyed aggregation
//! machinery as the price pipelines.

use anyhow::Result;

use crosswind_api::environment::StreamExecutionEnvironment;
use crosswind_core::aggregate::{tokenize, Counting};
use crosswind_core::sink::MapSink;

const LINES: &[&str] = &[
    "the stream does not end, the stream only pauses",
    "windows slide over the stream and the stream slides on",
    "every window closes and every window counts",
];

fn main() -> Result<()> {
    tracing_subscriber::fmt().init();

    let words: Vec<String> = LINES.iter().flat_map(|line| tokenize(line)).collect();

    let env = StreamExecutionEnvironment::new("word-count");
    let out = env
        .from_iter(words)
        .key_by(|w: &String| w.clone())
        .count_windowed(Counting)
        .execute()?;

    // Running counts; the last emission per word is its total.
    let words_map: MapSink<String, u64> = MapSink::new("words");
    for (word, count) in out {
        words_map.put(word, count);
    }

    let mut totals: Vec<(String, u64)> = words_map.snapshot().into_iter().collect();
    totals.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    for (word, count) in &totals {
        println!("{count:>4}  {word}");
    }
    Ok(())
}
