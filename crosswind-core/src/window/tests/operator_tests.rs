use super::*;

use rust_decimal_macros::dec;

use crate::aggregate::{merge_and_finish, Counting, MovingAverage, RatePairGrouper};
use crate::model::RatePoint;
use crate::types::Watermark;

type Event = (String, i32);

fn counting_operator() -> WindowedAggregateOperator<
    String,
    Event,
    u64,
    u64,
    impl Fn(&Event) -> String + Send,
    impl Fn(&Event) -> EventTime + Send,
    SlidingEventTimeWindows,
    Counting,
> {
    WindowedAggregateOperator::new(
        |e: &Event| e.0.clone(),
        |_: &Event| 0,
        SlidingEventTimeWindows::of(Duration::from_secs(10), Duration::from_secs(10)),
        Counting,
    )
}

fn records<T: Clone>(out: &[StreamElement<T>]) -> Vec<T> {
    out.iter()
        .filter_map(|e| match e {
            StreamElement::Record(r) => Some(r.value.clone()),
            _ => None,
        })
        .collect()
}

// ── WindowedAggregateOperator ─────────────────────────────────────────────

#[test]
fn test_operator_buffers_records_until_watermark() {
    let mut op = counting_operator();

    let out = op
        .process(StreamElement::timestamped_record(("k".to_string(), 1), 5_000))
        .unwrap();
    assert!(out.is_empty());
    assert_eq!(op.open_window_count(), 1);
}

#[test]
fn test_operator_fires_and_purges_on_watermark() {
    let mut op = counting_operator();
    for ts in [1_000, 3_000, 5_000] {
        op.process(StreamElement::timestamped_record(("k".to_string(), 1), ts))
            .unwrap();
    }

    let out = op
        .process(StreamElement::Watermark(Watermark::new(9_999)))
        .unwrap();
    assert_eq!(records(&out), vec![3u64]);
    assert_eq!(op.open_window_count(), 0);
    assert!(
        out.iter().any(|e| matches!(e, StreamElement::Watermark(w) if w.timestamp == 9_999)),
        "watermark must be re-emitted downstream"
    );
}

#[test]
fn test_operator_not_ready_window_emits_nothing_but_still_purges() {
    let mut op = WindowedAggregateOperator::new(
        |_: &RatePoint| "BTC/USD".to_string(),
        |r: &RatePoint| r.timestamp,
        SlidingEventTimeWindows::of(Duration::from_secs(10), Duration::from_secs(10)),
        MovingAverage::new(2),
    );

    // One point is not enough for an average of two.
    op.process(StreamElement::timestamped_record(
        RatePoint::new(1_000, dec!(10)),
        1_000,
    ))
    .unwrap();
    let out = op
        .process(StreamElement::Watermark(Watermark::new(9_999)))
        .unwrap();

    assert!(records(&out).is_empty());
    assert_eq!(op.open_window_count(), 0);
}

#[test]
fn test_operator_keys_have_separate_windows() {
    let mut op = counting_operator();
    op.process(StreamElement::timestamped_record(("a".to_string(), 1), 1_000))
        .unwrap();
    op.process(StreamElement::timestamped_record(("b".to_string(), 1), 2_000))
        .unwrap();
    op.process(StreamElement::timestamped_record(("a".to_string(), 1), 3_000))
        .unwrap();
    assert_eq!(op.open_window_count(), 2);

    let out = op
        .process(StreamElement::Watermark(Watermark::new(9_999)))
        .unwrap();
    let mut counts = records(&out);
    counts.sort();
    assert_eq!(counts, vec![1u64, 2]);
}

#[test]
fn test_operator_tolerates_out_of_order_within_open_windows() {
    let mut op = WindowedAggregateOperator::new(
        |e: &Event| e.0.clone(),
        |_: &Event| 0,
        SlidingEventTimeWindows::of(Duration::from_millis(5), Duration::from_millis(5)),
        Counting,
    );

    op.process(StreamElement::timestamped_record(("k".to_string(), 1), 1))
        .unwrap();
    op.process(StreamElement::timestamped_record(("k".to_string(), 1), 5))
        .unwrap();
    // Out of order, but its window [0, 5) is still open.
    op.process(StreamElement::timestamped_record(("k".to_string(), 1), 3))
        .unwrap();

    let out = op
        .process(StreamElement::Watermark(Watermark::new(6)))
        .unwrap();
    // Only [0, 5) fires: records at 1 and 3.
    assert_eq!(records(&out), vec![2u64]);
    assert_eq!(op.open_window_count(), 1, "window [5, 10) still open");
}

#[test]
fn test_operator_suppresses_late_records_for_closed_windows() {
    let mut op = WindowedAggregateOperator::new(
        |e: &Event| e.0.clone(),
        |_: &Event| 0,
        SlidingEventTimeWindows::of(Duration::from_millis(5), Duration::from_millis(5)),
        Counting,
    );

    op.process(StreamElement::timestamped_record(("k".to_string(), 1), 1))
        .unwrap();
    let out = op
        .process(StreamElement::Watermark(Watermark::new(6)))
        .unwrap();
    assert_eq!(records(&out), vec![1u64]);

    // Record for the already-closed [0, 5): dropped, no state re-created.
    op.process(StreamElement::timestamped_record(("k".to_string(), 1), 2))
        .unwrap();
    assert_eq!(op.open_window_count(), 0);
    let out = op
        .process(StreamElement::Watermark(Watermark::new(20)))
        .unwrap();
    assert!(records(&out).is_empty(), "closed window must not re-fire");
}

#[test]
fn test_operator_merge_partial_combines_before_finish() {
    let mut op = counting_operator();
    op.process(StreamElement::timestamped_record(("k".to_string(), 1), 1_000))
        .unwrap();

    // A partial for the same (key, window) computed by another worker.
    let window = TimeWindow::new(0, 10_000);
    op.merge_partial("k".to_string(), window.clone(), 4u64)
        .unwrap();
    // And one for a (key, window) this operator has never seen.
    op.merge_partial("fresh".to_string(), window, 2u64).unwrap();

    let out = op
        .process(StreamElement::Watermark(Watermark::new(9_999)))
        .unwrap();
    let mut counts = records(&out);
    counts.sort();
    assert_eq!(counts, vec![2u64, 5]);
}

// ── PartialWindowedAggregateOperator ──────────────────────────────────────

#[test]
fn test_partial_operator_hands_accumulators_to_coordinator() {
    let key_fn: fn(&Event) -> String = |e| e.0.clone();
    let ts_fn: fn(&Event) -> EventTime = |_| 0;
    let mut worker_a = PartialWindowedAggregateOperator::new(
        key_fn,
        ts_fn,
        SlidingEventTimeWindows::of(Duration::from_secs(10), Duration::from_secs(10)),
        Counting,
    );
    let mut worker_b = PartialWindowedAggregateOperator::new(
        key_fn,
        ts_fn,
        SlidingEventTimeWindows::of(Duration::from_secs(10), Duration::from_secs(10)),
        Counting,
    );

    // The same key's records split across two workers.
    let mut partials: Vec<(String, TimeWindow, u64)> = Vec::new();
    for (worker, timestamps) in [(&mut worker_a, [1_000, 2_000]), (&mut worker_b, [3_000, 4_000])]
    {
        for ts in timestamps {
            worker
                .process(StreamElement::timestamped_record(("k".to_string(), 1), ts))
                .unwrap();
        }
        let out = worker
            .process(StreamElement::Watermark(Watermark::new(9_999)))
            .unwrap();
        for partial in records(&out) {
            partials.push((partial.key, partial.window, partial.accumulator));
        }
    }

    let results = merge_and_finish::<String, Event, u64, u64, _>(&Counting, partials).unwrap();
    assert_eq!(
        results,
        vec![("k".to_string(), TimeWindow::new(0, 10_000), 4u64)]
    );
}

// ── TwoInputWindowedAggregateOperator ─────────────────────────────────────

fn cogroup_operator() -> TwoInputWindowedAggregateOperator<
    (),
    RatePoint,
    RatePoint,
    crate::aggregate::RatePairs,
    crate::aggregate::AlignedRates,
    impl Fn(&RatePoint) -> () + Send,
    impl Fn(&RatePoint) -> () + Send,
    SlidingEventTimeWindows,
    RatePairGrouper,
> {
    TwoInputWindowedAggregateOperator::new(
        |_: &RatePoint| (),
        |_: &RatePoint| (),
        SlidingEventTimeWindows::of(Duration::from_millis(20), Duration::from_millis(10)),
        RatePairGrouper,
    )
}

#[test]
fn test_two_input_window_closes_only_when_both_inputs_advance() {
    let mut op = cogroup_operator();

    for ts in [5, 15] {
        op.process_first(StreamElement::timestamped_record(
            RatePoint::new(ts, dec!(1) + rust_decimal::Decimal::from(ts)),
            ts,
        ))
        .unwrap();
        op.process_second(StreamElement::timestamped_record(
            RatePoint::new(ts, dec!(2) + rust_decimal::Decimal::from(ts)),
            ts,
        ))
        .unwrap();
    }

    // Only one input has advanced: nothing may close yet.
    let out = op
        .process_first(StreamElement::Watermark(Watermark::new(19)))
        .unwrap();
    assert!(out.is_empty());

    // Second input catches up: the complete window [0, 20) fires; the
    // partial windows around it hold one point per side and emit nothing.
    let out = op
        .process_second(StreamElement::Watermark(Watermark::new(19)))
        .unwrap();
    let fired = records(&out);
    assert_eq!(fired.len(), 1);
    assert_eq!(fired[0].timestamp, 15);
    assert_eq!(fired[0].short, [dec!(6), dec!(16)]);
    assert_eq!(fired[0].long, [dec!(7), dec!(17)]);
    assert!(out
        .iter()
        .any(|e| matches!(e, StreamElement::Watermark(w) if w.timestamp == 19)));
}

#[test]
fn test_two_input_end_drains_remaining_windows() {
    let mut op = cogroup_operator();
    for ts in [5, 15] {
        op.process_first(StreamElement::timestamped_record(
            RatePoint::new(ts, dec!(1)),
            ts,
        ))
        .unwrap();
        op.process_second(StreamElement::timestamped_record(
            RatePoint::new(ts, dec!(2)),
            ts,
        ))
        .unwrap();
    }

    let out = op.process_first(StreamElement::End).unwrap();
    assert!(
        !out.iter().any(|e| matches!(e, StreamElement::End)),
        "End must wait for both inputs"
    );

    let out = op.process_second(StreamElement::End).unwrap();
    // All three windows close; only the complete one produces output.
    assert_eq!(records(&out).len(), 1);
    assert!(out.iter().any(|e| matches!(e, StreamElement::End)));
    assert_eq!(op.open_window_count(), 0);
}

#[test]
fn test_two_input_record_without_timestamp_is_an_error() {
    let mut op = cogroup_operator();
    let result = op.process_first(StreamElement::record(RatePoint::new(1, dec!(1))));
    assert!(result.is_err());
}
