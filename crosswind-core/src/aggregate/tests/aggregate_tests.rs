use super::*;

use rust_decimal_macros::dec;

use crate::model::{GpsPoint, RatePoint, TrendDirection};
use crate::types::EventTime;

// ── Helpers ───────────────────────────────────────────────────────────────

fn rate(ts: EventTime, rate: rust_decimal::Decimal) -> RatePoint {
    RatePoint::new(ts, rate)
}

fn fix(ts: EventTime, lat: f64, lon: f64) -> (String, GpsPoint) {
    (
        "18:48 Departure".to_string(),
        GpsPoint {
            timestamp: ts,
            latitude: lat,
            longitude: lon,
        },
    )
}

// ── Moving average: ring buffer semantics ─────────────────────────────────

#[test]
fn test_moving_average_fills_then_slides_by_one() {
    let avg = MovingAverage::new(3);
    let mut acc = avg.create();

    avg.accumulate(&mut acc, &rate(1, dec!(10.00)));
    assert_eq!(avg.finish(&acc), None);
    avg.accumulate(&mut acc, &rate(2, dec!(20.00)));
    assert_eq!(avg.finish(&acc), None);

    avg.accumulate(&mut acc, &rate(3, dec!(30.00)));
    assert_eq!(avg.finish(&acc), Some(rate(3, dec!(20.00))));

    // One more record slides the window by one: mean of [20, 30, 40].
    avg.accumulate(&mut acc, &rate(4, dec!(40.00)));
    assert_eq!(avg.finish(&acc), Some(rate(4, dec!(30.00))));
}

#[test]
fn test_moving_average_fresh_state_is_never_ready() {
    let avg = MovingAverage::new(3);
    let acc = avg.create();
    assert_eq!(avg.finish(&acc), None);
}

#[test]
fn test_moving_average_rounds_half_up() {
    let avg = MovingAverage::new(3);
    let mut acc = avg.create();
    for ts in 1..=3 {
        avg.accumulate(&mut acc, &rate(ts, dec!(1.005)));
    }
    // 1.005 half-up is 1.01, not the banker's 1.00.
    assert_eq!(avg.finish(&acc).unwrap().rate, dec!(1.01));

    let avg = MovingAverage::new(3);
    let mut acc = avg.create();
    avg.accumulate(&mut acc, &rate(1, dec!(1)));
    avg.accumulate(&mut acc, &rate(2, dec!(2)));
    avg.accumulate(&mut acc, &rate(3, dec!(2)));
    assert_eq!(avg.finish(&acc).unwrap().rate, dec!(1.67));
}

#[test]
fn test_moving_average_of_one_is_pass_through() {
    let avg = MovingAverage::new(1);
    let mut acc = avg.create();
    avg.accumulate(&mut acc, &rate(7, dec!(6421.48)));
    assert_eq!(avg.finish(&acc), Some(rate(7, dec!(6421.48))));
    avg.accumulate(&mut acc, &rate(8, dec!(6390.00)));
    assert_eq!(avg.finish(&acc), Some(rate(8, dec!(6390.00))));
}

#[test]
fn test_moving_average_combine_is_commutative() {
    let avg = MovingAverage::new(3);
    let records = [
        rate(1, dec!(10)),
        rate(2, dec!(20)),
        rate(3, dec!(30)),
        rate(4, dec!(40)),
        rate(5, dec!(50)),
    ];

    // Disjoint split of the same record set across two workers.
    let mut a = avg.create();
    for r in [&records[0], &records[2]] {
        avg.accumulate(&mut a, r);
    }
    let mut b = avg.create();
    for r in [&records[1], &records[3], &records[4]] {
        avg.accumulate(&mut b, r);
    }

    let mut ab = a.clone();
    avg.combine(&mut ab, b.clone());
    let mut ba = b;
    avg.combine(&mut ba, a);

    let expected = {
        let mut acc = avg.create();
        for r in &records {
            avg.accumulate(&mut acc, r);
        }
        avg.finish(&acc)
    };
    assert_eq!(avg.finish(&ab), expected);
    assert_eq!(avg.finish(&ba), expected);
    assert_eq!(expected.unwrap().rate, dec!(40.00));
}

#[test]
fn test_moving_average_combine_is_associative() {
    let avg = MovingAverage::new(2);
    let splits = [
        vec![rate(1, dec!(10))],
        vec![rate(2, dec!(20)), rate(4, dec!(40))],
        vec![rate(3, dec!(30))],
    ];
    let accs: Vec<RateWindow> = splits
        .iter()
        .map(|records| {
            let mut acc = avg.create();
            for r in records {
                avg.accumulate(&mut acc, r);
            }
            acc
        })
        .collect();

    // (a . b) . c
    let mut left = accs[0].clone();
    avg.combine(&mut left, accs[1].clone());
    avg.combine(&mut left, accs[2].clone());

    // a . (b . c)
    let mut right_inner = accs[1].clone();
    avg.combine(&mut right_inner, accs[2].clone());
    let mut right = accs[0].clone();
    avg.combine(&mut right, right_inner);

    assert_eq!(avg.finish(&left), avg.finish(&right));
    // Newest two records are 30 and 40.
    assert_eq!(avg.finish(&left).unwrap().rate, dec!(35.00));
}

// ── GPS speed ─────────────────────────────────────────────────────────────

#[test]
fn test_gps_fresh_state_is_never_ready() {
    let gps = GpsSpeed;
    assert_eq!(gps.finish(&gps.create()), None);
}

#[test]
fn test_gps_single_fix_is_speed_zero() {
    let gps = GpsSpeed;
    let mut acc = gps.create();
    gps.accumulate(&mut acc, &fix(5_000, 51.47, -0.45));

    let speed = gps.finish(&acc).unwrap();
    assert_eq!(speed.metres_per_second, 0.0);
    assert_eq!(speed.timestamp, 5_000);
    assert_eq!(speed.entry_key(), "18:48 Departure,5000");
}

#[test]
fn test_gps_stationary_fixes_are_speed_zero() {
    let gps = GpsSpeed;
    let mut acc = gps.create();
    gps.accumulate(&mut acc, &fix(0, 51.47, -0.45));
    gps.accumulate(&mut acc, &fix(60_000, 51.47, -0.45));

    let speed = gps.finish(&acc).unwrap();
    assert_eq!(speed.metres_per_second, 0.0);
    assert_eq!(speed.timestamp, 60_000);
}

#[test]
fn test_gps_speed_from_known_distance() {
    // One degree of latitude is about 111,195 m; covered in 1000 seconds.
    let gps = GpsSpeed;
    let mut acc = gps.create();
    gps.accumulate(&mut acc, &fix(0, 51.0, 0.0));
    gps.accumulate(&mut acc, &fix(1_000_000, 52.0, 0.0));

    let speed = gps.finish(&acc).unwrap();
    assert!(
        (speed.metres_per_second - 111.195).abs() < 0.1,
        "got {}",
        speed.metres_per_second
    );
}

#[test]
fn test_gps_sub_second_elapsed_time_is_not_truncated() {
    // 500 ms apart: integer division by 1000 would make this zero seconds.
    let gps = GpsSpeed;
    let mut acc = gps.create();
    gps.accumulate(&mut acc, &fix(0, 51.0, 0.0));
    gps.accumulate(&mut acc, &fix(500, 51.001, 0.0));

    let speed = gps.finish(&acc).unwrap();
    assert!(speed.metres_per_second > 200.0, "got {}", speed.metres_per_second);
    assert!(speed.metres_per_second.is_finite());
}

#[test]
fn test_gps_tracks_event_time_extremes_not_arrival_order() {
    let gps = GpsSpeed;
    let mut acc = gps.create();
    // Latest fix arrives first.
    gps.accumulate(&mut acc, &fix(1_000_000, 52.0, 0.0));
    gps.accumulate(&mut acc, &fix(0, 51.0, 0.0));

    let speed = gps.finish(&acc).unwrap();
    assert_eq!(speed.timestamp, 1_000_000);
    assert!((speed.metres_per_second - 111.195).abs() < 0.1);
}

#[test]
fn test_gps_combine_keeps_larger_last_either_way() {
    let gps = GpsSpeed;

    let mut early = gps.create();
    gps.accumulate(&mut early, &fix(0, 51.0, 0.0));
    gps.accumulate(&mut early, &fix(10_000, 51.01, 0.0));

    let mut late = gps.create();
    gps.accumulate(&mut late, &fix(20_000, 51.02, 0.0));
    gps.accumulate(&mut late, &fix(1_000_000, 52.0, 0.0));

    let mut ab = early.clone();
    gps.combine(&mut ab, late.clone());
    let mut ba = late;
    gps.combine(&mut ba, early);

    let from_ab = gps.finish(&ab).unwrap();
    let from_ba = gps.finish(&ba).unwrap();
    assert_eq!(from_ab, from_ba);
    // The merged window must span fix(0) .. fix(1,000,000).
    assert_eq!(from_ab.timestamp, 1_000_000);
    assert!((from_ab.metres_per_second - 111.195).abs() < 0.1);
}

#[test]
fn test_gps_combine_with_empty_partial() {
    let gps = GpsSpeed;
    let mut filled = gps.create();
    gps.accumulate(&mut filled, &fix(5_000, 51.47, -0.45));

    let mut empty_first = gps.create();
    gps.combine(&mut empty_first, filled.clone());
    assert_eq!(gps.finish(&empty_first), gps.finish(&filled));

    let mut filled_first = filled.clone();
    gps.combine(&mut filled_first, gps.create());
    assert_eq!(gps.finish(&filled_first), gps.finish(&filled));
}

// ── Rate pair co-grouping ─────────────────────────────────────────────────

#[test]
fn test_cogroup_fresh_state_is_never_ready() {
    let grouper = RatePairGrouper;
    assert_eq!(grouper.finish(&grouper.create()), None);
}

#[test]
fn test_cogroup_requires_two_points_per_side() {
    let grouper = RatePairGrouper;
    let mut acc = grouper.create();

    grouper.accumulate_first(&mut acc, &rate(1, dec!(9.50)));
    grouper.accumulate_first(&mut acc, &rate(2, dec!(9.60)));
    grouper.accumulate_second(&mut acc, &rate(2, dec!(9.40)));
    // Long side has only the newer point: strict join yields nothing.
    assert_eq!(grouper.finish(&acc), None);

    // Supplying the missing long-side point flips the result to present.
    grouper.accumulate_second(&mut acc, &rate(1, dec!(9.30)));
    assert_eq!(
        grouper.finish(&acc),
        Some(AlignedRates {
            timestamp: 2,
            short: [dec!(9.50), dec!(9.60)],
            long: [dec!(9.30), dec!(9.40)],
        })
    );
}

#[test]
fn test_cogroup_requires_matching_newer_timestamps() {
    let grouper = RatePairGrouper;
    let mut acc = grouper.create();
    grouper.accumulate_first(&mut acc, &rate(1, dec!(1)));
    grouper.accumulate_first(&mut acc, &rate(2, dec!(2)));
    grouper.accumulate_second(&mut acc, &rate(1, dec!(3)));
    grouper.accumulate_second(&mut acc, &rate(3, dec!(4)));
    assert_eq!(grouper.finish(&acc), None);
}

#[test]
fn test_cogroup_combine_dedupes_by_timestamp() {
    let grouper = RatePairGrouper;

    // Both partials saw the day-2 short point; it must not be counted twice.
    let mut a = grouper.create();
    grouper.accumulate_first(&mut a, &rate(1, dec!(9.50)));
    grouper.accumulate_first(&mut a, &rate(2, dec!(9.60)));
    grouper.accumulate_second(&mut a, &rate(1, dec!(9.30)));

    let mut b = grouper.create();
    grouper.accumulate_first(&mut b, &rate(2, dec!(9.60)));
    grouper.accumulate_second(&mut b, &rate(2, dec!(9.40)));

    let mut ab = a.clone();
    grouper.combine(&mut ab, b.clone());
    let mut ba = b;
    grouper.combine(&mut ba, a);

    let expected = Some(AlignedRates {
        timestamp: 2,
        short: [dec!(9.50), dec!(9.60)],
        long: [dec!(9.30), dec!(9.40)],
    });
    assert_eq!(grouper.finish(&ab), expected);
    assert_eq!(grouper.finish(&ba), expected);
}

// ── Cross detection ───────────────────────────────────────────────────────

fn aligned(short: [rust_decimal::Decimal; 2], long: [rust_decimal::Decimal; 2]) -> AlignedRates {
    AlignedRates {
        timestamp: crate::model::day_start_millis("2018-11-07".parse().unwrap()),
        short,
        long,
    }
}

#[test]
fn test_cross_detects_upward() {
    let alert = CrossDetector::detect(&aligned([dec!(1), dec!(3)], [dec!(2), dec!(2)])).unwrap();
    assert_eq!(alert.direction, TrendDirection::Upward);
    assert_eq!(alert.short_rate, dec!(3));
    assert_eq!(alert.long_rate, dec!(2));
    assert_eq!(alert.day, "2018-11-07".parse().unwrap());
}

#[test]
fn test_cross_detects_downward() {
    let alert = CrossDetector::detect(&aligned([dec!(3), dec!(1)], [dec!(2), dec!(2)])).unwrap();
    assert_eq!(alert.direction, TrendDirection::Downward);
}

#[test]
fn test_no_cross_no_alert() {
    assert_eq!(
        CrossDetector::detect(&aligned([dec!(1), dec!(1)], [dec!(2), dec!(2)])),
        None
    );
    // Touching without crossing is not a cross.
    assert_eq!(
        CrossDetector::detect(&aligned([dec!(1), dec!(2)], [dec!(2), dec!(2)])),
        None
    );
}

// ── Counting ──────────────────────────────────────────────────────────────

#[test]
fn test_counting_accumulates_and_combines() {
    let counting = Counting;
    let mut a: u64 = AggregateFunction::<&str, u64, u64>::create(&counting);
    assert_eq!(AggregateFunction::<&str, u64, u64>::finish(&counting, &a), None);

    counting.accumulate(&mut a, &"word");
    counting.accumulate(&mut a, &"word");
    let mut b: u64 = AggregateFunction::<&str, u64, u64>::create(&counting);
    counting.accumulate(&mut b, &"word");

    AggregateFunction::<&str, u64, u64>::combine(&counting, &mut a, b);
    assert_eq!(AggregateFunction::<&str, u64, u64>::finish(&counting, &a), Some(3));
}

#[test]
fn test_tokenize_lowercases_and_drops_short_words() {
    let tokens: Vec<String> = tokenize("To be, or NOT to be -- that is the Question!").collect();
    assert_eq!(tokens, vec!["not", "that", "the", "question"]);
}

// ── Count-window operator: backpressure ───────────────────────────────────

#[test]
fn test_count_window_operator_emits_once_full() {
    let mut operator = CountWindowOperator::new(MovingAverage::new(2));
    let mut emitted: Vec<(String, RatePoint)> = Vec::new();
    let mut emit = |key: &String, out: RatePoint| {
        emitted.push((key.clone(), out));
        true
    };

    let key = "BTC/USD".to_string();
    operator.offer(key.clone(), rate(1, dec!(10)), &mut emit).unwrap();
    operator.offer(key.clone(), rate(2, dec!(20)), &mut emit).unwrap();
    operator.offer(key.clone(), rate(3, dec!(30)), &mut emit).unwrap();

    assert_eq!(
        emitted,
        vec![
            (key.clone(), rate(2, dec!(15.00))),
            (key, rate(3, dec!(25.00)))
        ]
    );
}

#[test]
fn test_count_window_operator_keys_are_independent() {
    let mut operator = CountWindowOperator::new(MovingAverage::new(2));
    let mut emitted: Vec<(String, RatePoint)> = Vec::new();

    operator
        .offer("BTC/USD".to_string(), rate(1, dec!(10)), &mut |k: &String, out| {
            emitted.push((k.clone(), out));
            true
        })
        .unwrap();
    operator
        .offer("ETH/USD".to_string(), rate(1, dec!(100)), &mut |k: &String, out| {
            emitted.push((k.clone(), out));
            true
        })
        .unwrap();
    // Neither key has two points yet.
    assert!(emitted.is_empty());

    operator
        .offer("BTC/USD".to_string(), rate(2, dec!(20)), &mut |k: &String, out| {
            emitted.push((k.clone(), out));
            true
        })
        .unwrap();
    assert_eq!(emitted, vec![("BTC/USD".to_string(), rate(2, dec!(15.00)))]);
}

#[test]
fn test_count_window_backpressure_does_not_advance_state() {
    let mut operator = CountWindowOperator::new(MovingAverage::new(2));
    let key = "BTC/USD".to_string();

    let mut accepted: Vec<RatePoint> = Vec::new();
    operator
        .offer(key.clone(), rate(1, dec!(10)), &mut |_: &String, out| {
            accepted.push(out);
            true
        })
        .unwrap();

    // Sink refuses: the record must go pending, not into the window.
    operator
        .offer(key.clone(), rate(2, dec!(20)), &mut |_: &String, _| false)
        .unwrap();
    assert_eq!(operator.pending_len(), 1);
    assert!(accepted.is_empty());

    // A later record for the same key queues behind the stalled one.
    operator
        .offer(key.clone(), rate(3, dec!(30)), &mut |_: &String, _| false)
        .unwrap();
    assert_eq!(operator.pending_len(), 2);

    // Sink recovers: the retried records produce exactly the sequence an
    // unobstructed run would have produced.
    operator.retry_pending(&mut |_: &String, out| {
        accepted.push(out);
        true
    });
    assert_eq!(operator.pending_len(), 0);
    assert_eq!(accepted, vec![rate(2, dec!(15.00)), rate(3, dec!(25.00))]);
}

// ── Coordinator merge ─────────────────────────────────────────────────────

#[test]
fn test_merge_and_finish_combines_worker_partials() {
    let gps = GpsSpeed;
    let window = crate::window::TimeWindow::new(0, 60_000);

    let mut worker_a = gps.create();
    gps.accumulate(&mut worker_a, &fix(0, 51.0, 0.0));
    let mut worker_b = gps.create();
    gps.accumulate(&mut worker_b, &fix(50_000, 51.05, 0.0));

    let key = "18:48 Departure".to_string();
    let results = merge_and_finish(
        &gps,
        vec![
            (key.clone(), window.clone(), worker_a),
            (key.clone(), window.clone(), worker_b),
        ],
    )
    .unwrap();

    assert_eq!(results.len(), 1);
    let (out_key, out_window, speed) = &results[0];
    assert_eq!(out_key, &key);
    assert_eq!(out_window, &window);
    assert_eq!(speed.timestamp, 50_000);
    assert!(speed.metres_per_second > 0.0);
}

#[test]
fn test_merge_and_finish_output_is_deterministically_ordered() {
    let counting = Counting;
    let w1 = crate::window::TimeWindow::new(0, 10);
    let w2 = crate::window::TimeWindow::new(10, 20);

    let partials: Vec<(String, crate::window::TimeWindow, u64)> = vec![
        ("b".to_string(), w2.clone(), 1),
        ("a".to_string(), w1.clone(), 2),
        ("b".to_string(), w2.clone(), 3),
    ];
    let results: Vec<(String, crate::window::TimeWindow, u64)> =
        merge_and_finish::<String, (), u64, u64, _>(&counting, partials).unwrap();

    assert_eq!(
        results,
        vec![("a".to_string(), w1, 2), ("b".to_string(), w2, 4)]
    );
}
