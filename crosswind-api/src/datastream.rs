use std::hash::Hash;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use anyhow::{anyhow, Result};

use crosswind_core::aggregate::{
    merge_and_finish, AggregateFunction, AggregateFunction2, CountWindowOperator,
};
use crosswind_core::channel::{stream_channel, StreamSender};
use crosswind_core::partitioner::{KeyHashPartitioner, Partitioner};
use crosswind_core::time::{FrameBoundaryFilter, WatermarkStrategy, EVENT_TIME_MAX};
use crosswind_core::types::{StreamData, StreamElement, StreamRecord};
use crosswind_core::window::{
    PartialWindowedAggregateOperator, SlidingEventTimeWindows, TimeWindow,
    TwoInputWindowedAggregateOperator, WindowPolicy, WindowedAggregateOperator,
};

/// How many drain rounds a bounded job gives a refusing sink before the
/// stall is surfaced as an error. The pending records are still queued at
/// that point, not dropped.
const SINK_DRAIN_ROUNDS: usize = 200;
const SINK_DRAIN_PAUSE: Duration = Duration::from_millis(2);

fn keep_records<OUT>(results: &mut Vec<StreamRecord<OUT>>, elems: Vec<StreamElement<OUT>>) {
    for elem in elems {
        if let StreamElement::Record(rec) = elem {
            results.push(rec);
        }
    }
}

fn is_stopped(stop: &Option<Arc<AtomicBool>>) -> bool {
    stop.as_ref()
        .map(|flag| flag.load(Ordering::Relaxed))
        .unwrap_or(false)
}

// ── DataStream ────────────────────────────────────────────────────────────────

/// A bounded stream of elements of type `T`.
///
/// Created by [`StreamExecutionEnvironment::from_iter`](crate::environment::StreamExecutionEnvironment::from_iter).
pub struct DataStream<T>
where
    T: StreamData,
{
    pub(crate) source_data: Vec<T>,
}

impl<T> DataStream<T>
where
    T: StreamData,
{
    /// Declare event-time semantics for the stream. Required before any
    /// event-time windowing.
    pub fn assign_timestamps_and_watermarks<S>(self, strategy: S) -> TimestampedStream<T, S>
    where
        S: WatermarkStrategy<T>,
    {
        TimestampedStream {
            source_data: self.source_data,
            strategy,
        }
    }

    /// Partition the stream by key for count-window aggregation. Count
    /// windows need no event time: they slide one record at a time.
    pub fn key_by<K, KF>(self, key_fn: KF) -> KeyedStream<K, T, KF>
    where
        K: StreamData,
        KF: Fn(&T) -> K + Send,
    {
        KeyedStream {
            source_data: self.source_data,
            key_fn,
            _phantom: PhantomData,
        }
    }
}

// ── Count windows ─────────────────────────────────────────────────────────────

/// A keyed stream feeding per-key count windows.
pub struct KeyedStream<K, T, KF>
where
    K: StreamData,
    T: StreamData,
    KF: Fn(&T) -> K + Send,
{
    source_data: Vec<T>,
    key_fn: KF,
    _phantom: PhantomData<K>,
}

impl<K, T, KF> KeyedStream<K, T, KF>
where
    K: StreamData,
    T: StreamData,
    KF: Fn(&T) -> K + Send,
{
    /// Run `aggregate` over a per-key count window sliding one record at a
    /// time. The window size lives inside the aggregator (its accumulator
    /// decides when `finish` becomes ready), which is what
    /// [`WindowPolicy::Count`] describes.
    pub fn count_windowed<ACC, OUT, A>(self, aggregate: A) -> CountWindowJob<K, T, KF, ACC, OUT, A>
    where
        ACC: Clone,
        A: AggregateFunction<T, ACC, OUT>,
    {
        CountWindowJob {
            source_data: self.source_data,
            key_fn: self.key_fn,
            aggregate,
            stop: None,
            _phantom: PhantomData,
        }
    }
}

/// A runnable count-window aggregation.
pub struct CountWindowJob<K, T, KF, ACC, OUT, A>
where
    K: StreamData,
    T: StreamData,
    KF: Fn(&T) -> K + Send,
    ACC: Clone,
    A: AggregateFunction<T, ACC, OUT>,
{
    source_data: Vec<T>,
    key_fn: KF,
    aggregate: A,
    stop: Option<Arc<AtomicBool>>,
    _phantom: PhantomData<(K, ACC, OUT)>,
}

impl<K, T, KF, ACC, OUT, A> CountWindowJob<K, T, KF, ACC, OUT, A>
where
    K: StreamData,
    T: StreamData,
    KF: Fn(&T) -> K + Send,
    ACC: Clone,
    OUT: StreamData,
    A: AggregateFunction<T, ACC, OUT>,
{
    /// Install a cancellation flag, checked between records.
    pub fn with_stop_flag(mut self, stop: Arc<AtomicBool>) -> Self {
        self.stop = Some(stop);
        self
    }

    /// Run in-process and collect every emission.
    pub fn execute(self) -> Result<Vec<(K, OUT)>> {
        let mut operator = CountWindowOperator::new(self.aggregate);
        let mut results: Vec<(K, OUT)> = Vec::new();

        for record in self.source_data {
            if is_stopped(&self.stop) {
                tracing::info!("count-window job stopped before end of input");
                break;
            }
            let key = (self.key_fn)(&record);
            operator.offer(key, record, &mut |k: &K, out| {
                results.push((k.clone(), out));
                true
            })?;
        }
        Ok(results)
    }

    /// Run against a bounded channel sink. A full sink is backpressure: the
    /// triggering record stays queued in the operator and is retried, so
    /// the ring buffer never advances past an undelivered emission.
    pub fn execute_with_sink(self, sender: StreamSender<(K, OUT)>) -> Result<()> {
        let mut operator = CountWindowOperator::new(self.aggregate);
        let mut sink_error: Option<anyhow::Error> = None;

        for record in self.source_data {
            if is_stopped(&self.stop) {
                tracing::info!("count-window job stopped before end of input");
                break;
            }
            operator.retry_pending(&mut |k: &K, out| try_emit(&sender, &mut sink_error, k, out));
            if let Some(err) = sink_error.take() {
                return Err(err);
            }

            let key = (self.key_fn)(&record);
            operator.offer(key, record, &mut |k: &K, out| {
                try_emit(&sender, &mut sink_error, k, out)
            })?;
            if let Some(err) = sink_error.take() {
                return Err(err);
            }
        }

        // Drain what backpressure left behind.
        let mut rounds = 0;
        while operator.pending_len() > 0 {
            operator.retry_pending(&mut |k: &K, out| try_emit(&sender, &mut sink_error, k, out));
            if let Some(err) = sink_error.take() {
                return Err(err);
            }
            if operator.pending_len() == 0 {
                break;
            }
            rounds += 1;
            if rounds >= SINK_DRAIN_ROUNDS {
                return Err(anyhow!(
                    "sink still refusing emissions after bounded backoff ({} records pending)",
                    operator.pending_len()
                ));
            }
            thread::sleep(SINK_DRAIN_PAUSE);
        }

        sender.send(StreamElement::End)?;
        Ok(())
    }
}

fn try_emit<K, OUT>(
    sender: &StreamSender<(K, OUT)>,
    sink_error: &mut Option<anyhow::Error>,
    key: &K,
    out: OUT,
) -> bool
where
    K: StreamData,
{
    match sender.try_send(StreamElement::record((key.clone(), out))) {
        Ok(accepted) => accepted,
        Err(err) => {
            *sink_error = Some(err);
            false
        }
    }
}

// ── Event-time windows ────────────────────────────────────────────────────────

/// A stream with event-time semantics attached.
pub struct TimestampedStream<T, S>
where
    T: StreamData,
    S: WatermarkStrategy<T>,
{
    source_data: Vec<T>,
    strategy: S,
}

impl<T, S> TimestampedStream<T, S>
where
    T: StreamData,
    S: WatermarkStrategy<T>,
{
    /// Partition the stream by key for event-time windowing.
    pub fn key_by<K, KF>(self, key_fn: KF) -> TimestampedKeyedStream<K, T, S, KF>
    where
        K: StreamData,
        KF: Fn(&T) -> K + Send,
    {
        TimestampedKeyedStream {
            source_data: self.source_data,
            strategy: self.strategy,
            key_fn,
            _phantom: PhantomData,
        }
    }

    /// Co-group this stream (first input) with `other` (second input) over a
    /// shared sliding window, aggregating both through `aggregate`.
    ///
    /// A window only closes when the watermarks of *both* inputs have passed
    /// it, so one side lagging holds the window open rather than producing a
    /// partial join.
    pub fn co_group<K, IN1, S1, KF0, KF1, ACC, OUT, A>(
        self,
        other: TimestampedStream<IN1, S1>,
        key_fn_first: KF0,
        key_fn_second: KF1,
        policy: WindowPolicy,
        aggregate: A,
    ) -> Result<CoGroupJob<K, T, IN1, S, S1, KF0, KF1, ACC, OUT, A>>
    where
        K: StreamData,
        IN1: StreamData,
        S1: WatermarkStrategy<IN1>,
        KF0: Fn(&T) -> K + Send,
        KF1: Fn(&IN1) -> K + Send,
        OUT: StreamData,
        A: AggregateFunction2<T, IN1, ACC, OUT>,
    {
        let assigner = SlidingEventTimeWindows::from_policy(&policy)?;
        Ok(CoGroupJob {
            first: self.source_data,
            second: other.source_data,
            strategy_first: self.strategy,
            strategy_second: other.strategy,
            key_fn_first,
            key_fn_second,
            assigner,
            aggregate,
            stop: None,
            _phantom: PhantomData,
        })
    }
}

/// A keyed stream with event-time semantics, ready for windowing.
pub struct TimestampedKeyedStream<K, T, S, KF>
where
    K: StreamData,
    T: StreamData,
    S: WatermarkStrategy<T>,
    KF: Fn(&T) -> K + Send,
{
    source_data: Vec<T>,
    strategy: S,
    key_fn: KF,
    _phantom: PhantomData<K>,
}

impl<K, T, S, KF> TimestampedKeyedStream<K, T, S, KF>
where
    K: StreamData,
    T: StreamData,
    S: WatermarkStrategy<T>,
    KF: Fn(&T) -> K + Send,
{
    /// Window the stream. The policy must be a sliding (or tumbling)
    /// event-time window; count windows go through
    /// [`DataStream::key_by`] + [`KeyedStream::count_windowed`].
    pub fn window(self, policy: WindowPolicy) -> Result<WindowedStream<K, T, S, KF>> {
        let assigner = SlidingEventTimeWindows::from_policy(&policy)?;
        Ok(WindowedStream {
            source_data: self.source_data,
            strategy: self.strategy,
            key_fn: self.key_fn,
            assigner,
        })
    }
}

/// A windowed keyed stream awaiting its aggregation.
pub struct WindowedStream<K, T, S, KF>
where
    K: StreamData,
    T: StreamData,
    S: WatermarkStrategy<T>,
    KF: Fn(&T) -> K + Send,
{
    source_data: Vec<T>,
    strategy: S,
    key_fn: KF,
    assigner: SlidingEventTimeWindows,
}

impl<K, T, S, KF> WindowedStream<K, T, S, KF>
where
    K: StreamData,
    T: StreamData,
    S: WatermarkStrategy<T>,
    KF: Fn(&T) -> K + Send,
{
    /// Attach the aggregation to run per (key, window).
    pub fn aggregate<ACC, OUT, A>(self, aggregate: A) -> WindowedJob<K, T, S, KF, ACC, OUT, A>
    where
        A: AggregateFunction<T, ACC, OUT>,
    {
        WindowedJob {
            source_data: self.source_data,
            strategy: self.strategy,
            key_fn: self.key_fn,
            assigner: self.assigner,
            aggregate,
            stop: None,
            _phantom: PhantomData,
        }
    }
}

/// A runnable event-time window aggregation.
pub struct WindowedJob<K, T, S, KF, ACC, OUT, A>
where
    K: StreamData,
    T: StreamData,
    S: WatermarkStrategy<T>,
    KF: Fn(&T) -> K + Send,
    A: AggregateFunction<T, ACC, OUT>,
{
    source_data: Vec<T>,
    strategy: S,
    key_fn: KF,
    assigner: SlidingEventTimeWindows,
    aggregate: A,
    stop: Option<Arc<AtomicBool>>,
    _phantom: PhantomData<(K, ACC, OUT)>,
}

impl<K, T, S, KF, ACC, OUT, A> WindowedJob<K, T, S, KF, ACC, OUT, A>
where
    K: StreamData,
    T: StreamData,
    S: WatermarkStrategy<T> + 'static,
    KF: Fn(&T) -> K + Send,
    OUT: StreamData,
    A: AggregateFunction<T, ACC, OUT>,
{
    /// Install a cancellation flag, checked between records.
    pub fn with_stop_flag(mut self, stop: Arc<AtomicBool>) -> Self {
        self.stop = Some(stop);
        self
    }

    /// Run single-threaded: feed records, advance the watermark per the
    /// strategy (frame-aligned to the window slide), close windows as the
    /// watermark passes them, and finally close everything when the bounded
    /// input ends.
    pub fn execute(self) -> Result<Vec<StreamRecord<OUT>>> {
        let strategy = Arc::new(self.strategy);
        let ts_strategy = Arc::clone(&strategy);
        let mut frame_filter = FrameBoundaryFilter::new(self.assigner.slide());

        let mut operator: WindowedAggregateOperator<K, T, ACC, OUT, KF, _, _, A> =
            WindowedAggregateOperator::new(
                self.key_fn,
                move |e: &T| ts_strategy.extract_timestamp(e),
                self.assigner,
                self.aggregate,
            );
        let mut generator = strategy.create_watermark_generator();

        let mut results = Vec::new();
        for value in self.source_data {
            if is_stopped(&self.stop) {
                tracing::info!("windowed job stopped before end of input");
                return Ok(results);
            }
            let ts = strategy.extract_timestamp(&value);
            keep_records(
                &mut results,
                operator.process(StreamElement::timestamped_record(value, ts))?,
            );
            generator.on_event(ts);
            if let Some(wm) = generator.current_watermark() {
                if let Some(aligned) = frame_filter.observe(wm) {
                    keep_records(&mut results, operator.process(StreamElement::Watermark(aligned))?);
                }
            }
        }

        // Bounded input: everything still open closes now.
        keep_records(&mut results, operator.on_timer(EVENT_TIME_MAX)?);
        Ok(results)
    }
}

impl<K, T, S, KF, ACC, OUT, A> WindowedJob<K, T, S, KF, ACC, OUT, A>
where
    K: StreamData + Hash + Sync,
    T: StreamData,
    S: WatermarkStrategy<T> + 'static,
    KF: Fn(&T) -> K + Send + Sync + Clone + 'static,
    ACC: Send + 'static,
    OUT: StreamData,
    A: AggregateFunction<T, ACC, OUT> + Clone + 'static,
{
    /// Run with `parallelism` worker threads.
    ///
    /// The source thread hash-partitions records by key (all records for a
    /// key land on one worker) and broadcasts watermarks to every worker.
    /// Workers aggregate their partition and emit raw accumulators per
    /// closed (key, window); the collector merges same-(key, window)
    /// partials with `combine` and applies `finish`. Output equals a
    /// single-threaded run, in deterministic (window, key) order.
    pub fn execute_with_parallelism(self, parallelism: usize) -> Result<Vec<StreamRecord<OUT>>> {
        if parallelism == 0 {
            return Err(anyhow!("parallelism must be at least 1"));
        }
        let buffer_size = 1024;
        let slide = self.assigner.slide();
        let strategy = Arc::new(self.strategy);
        let assigner = self.assigner;

        // Channels: source -> workers.
        let mut to_workers = Vec::with_capacity(parallelism);
        for _ in 0..parallelism {
            to_workers.push(stream_channel::<T>(buffer_size));
        }
        let worker_senders: Vec<_> = to_workers.iter().map(|(s, _)| s.clone()).collect();
        let worker_receivers: Vec<_> = to_workers.into_iter().map(|(_, r)| r).collect();

        // Channel: workers -> collector.
        let (partial_sender, partial_receiver) =
            stream_channel::<crosswind_core::window::WindowPartial<K, ACC>>(buffer_size);

        // Source task: partition records, broadcast frame-aligned watermarks.
        let source_key_fn = self.key_fn.clone();
        let source_strategy = Arc::clone(&strategy);
        let stop = self.stop.clone();
        let source_data = self.source_data;
        let source_handle = thread::spawn(move || -> Result<()> {
            let partitioner = KeyHashPartitioner::new(source_key_fn);
            let mut generator = source_strategy.create_watermark_generator();
            let mut frame_filter = FrameBoundaryFilter::new(slide);

            for value in source_data {
                if is_stopped(&stop) {
                    tracing::info!("parallel windowed job stopped before end of input");
                    break;
                }
                let ts = source_strategy.extract_timestamp(&value);
                let partition = partitioner.partition(&value, parallelism);
                worker_senders[partition].send(StreamElement::timestamped_record(value, ts))?;

                generator.on_event(ts);
                if let Some(wm) = generator.current_watermark() {
                    if let Some(aligned) = frame_filter.observe(wm) {
                        for sender in &worker_senders {
                            sender.send(StreamElement::Watermark(aligned))?;
                        }
                    }
                }
            }

            // Close all remaining windows everywhere, then end the inputs.
            for sender in &worker_senders {
                sender.send(StreamElement::watermark(EVENT_TIME_MAX))?;
                sender.send(StreamElement::End)?;
            }
            Ok(())
        });

        // Worker tasks: partial aggregation over one key partition.
        let mut worker_handles = Vec::with_capacity(parallelism);
        for receiver in worker_receivers {
            let key_fn = self.key_fn.clone();
            let worker_assigner = assigner.clone();
            let worker_aggregate = self.aggregate.clone();
            let worker_strategy = Arc::clone(&strategy);
            let to_collector = partial_sender.clone();

            worker_handles.push(thread::spawn(move || -> Result<()> {
                let mut operator: PartialWindowedAggregateOperator<
                    K,
                    T,
                    ACC,
                    OUT,
                    KF,
                    _,
                    SlidingEventTimeWindows,
                    A,
                > = PartialWindowedAggregateOperator::new(
                    key_fn,
                    move |e: &T| worker_strategy.extract_timestamp(e),
                    worker_assigner,
                    worker_aggregate,
                );

                loop {
                    let elem = receiver.recv()?;
                    let at_end = matches!(elem, StreamElement::End);
                    for out in operator.process(elem)? {
                        if let StreamElement::Record(rec) = out {
                            to_collector.send(StreamElement::Record(rec))?;
                        }
                    }
                    if at_end {
                        to_collector.send(StreamElement::End)?;
                        return Ok(());
                    }
                }
            }));
        }
        drop(partial_sender);

        // Collector: gather partials, then combine and finish.
        let mut partials: Vec<(K, TimeWindow, ACC)> = Vec::new();
        let mut ended = 0;
        while ended < parallelism {
            match partial_receiver.recv()? {
                StreamElement::Record(rec) => {
                    let partial = rec.value;
                    partials.push((partial.key, partial.window, partial.accumulator));
                }
                StreamElement::End => ended += 1,
                StreamElement::Watermark(_) => {}
            }
        }

        source_handle
            .join()
            .map_err(|_| anyhow!("source task panicked"))??;
        for handle in worker_handles {
            handle.join().map_err(|_| anyhow!("worker task panicked"))??;
        }

        let merged = merge_and_finish(&self.aggregate, partials)?;
        Ok(merged
            .into_iter()
            .map(|(_key, window, out)| StreamRecord::with_timestamp(out, window.max_timestamp()))
            .collect())
    }
}

// ── Co-grouped windows ────────────────────────────────────────────────────────

/// A runnable two-stream windowed co-group.
pub struct CoGroupJob<K, IN0, IN1, S0, S1, KF0, KF1, ACC, OUT, A>
where
    K: StreamData,
    IN0: StreamData,
    IN1: StreamData,
    S0: WatermarkStrategy<IN0>,
    S1: WatermarkStrategy<IN1>,
    KF0: Fn(&IN0) -> K + Send,
    KF1: Fn(&IN1) -> K + Send,
    A: AggregateFunction2<IN0, IN1, ACC, OUT>,
{
    first: Vec<IN0>,
    second: Vec<IN1>,
    strategy_first: S0,
    strategy_second: S1,
    key_fn_first: KF0,
    key_fn_second: KF1,
    assigner: SlidingEventTimeWindows,
    aggregate: A,
    stop: Option<Arc<AtomicBool>>,
    _phantom: PhantomData<(K, ACC, OUT)>,
}

impl<K, IN0, IN1, S0, S1, KF0, KF1, ACC, OUT, A>
    CoGroupJob<K, IN0, IN1, S0, S1, KF0, KF1, ACC, OUT, A>
where
    K: StreamData,
    IN0: StreamData,
    IN1: StreamData,
    S0: WatermarkStrategy<IN0>,
    S1: WatermarkStrategy<IN1>,
    KF0: Fn(&IN0) -> K + Send,
    KF1: Fn(&IN1) -> K + Send,
    OUT: StreamData,
    A: AggregateFunction2<IN0, IN1, ACC, OUT>,
{
    /// Install a cancellation flag, checked between records.
    pub fn with_stop_flag(mut self, stop: Arc<AtomicBool>) -> Self {
        self.stop = Some(stop);
        self
    }

    /// Run single-threaded. The two inputs are replayed in global event-time
    /// order; each input advances its own watermark and a window closes only
    /// once the slower input has passed it.
    pub fn execute(self) -> Result<Vec<StreamRecord<OUT>>> {
        let slide = self.assigner.slide();
        let mut operator = TwoInputWindowedAggregateOperator::new(
            self.key_fn_first,
            self.key_fn_second,
            self.assigner,
            self.aggregate,
        );
        let mut generator_first = self.strategy_first.create_watermark_generator();
        let mut generator_second = self.strategy_second.create_watermark_generator();
        let mut filter_first = FrameBoundaryFilter::new(slide);
        let mut filter_second = FrameBoundaryFilter::new(slide);

        let mut results = Vec::new();
        let mut iter_first = self.first.into_iter().peekable();
        let mut iter_second = self.second.into_iter().peekable();

        loop {
            if is_stopped(&self.stop) {
                tracing::info!("co-group job stopped before end of input");
                return Ok(results);
            }
            let next_first = iter_first
                .peek()
                .map(|e| self.strategy_first.extract_timestamp(e));
            let next_second = iter_second
                .peek()
                .map(|e| self.strategy_second.extract_timestamp(e));

            let take_first = match (next_first, next_second) {
                (None, None) => break,
                (Some(_), None) => true,
                (None, Some(_)) => false,
                (Some(ts0), Some(ts1)) => ts0 <= ts1,
            };

            if take_first {
                if let Some(value) = iter_first.next() {
                    let ts = self.strategy_first.extract_timestamp(&value);
                    keep_records(
                        &mut results,
                        operator.process_first(StreamElement::timestamped_record(value, ts))?,
                    );
                    generator_first.on_event(ts);
                    if let Some(wm) = generator_first.current_watermark() {
                        if let Some(aligned) = filter_first.observe(wm) {
                            keep_records(
                                &mut results,
                                operator.process_first(StreamElement::Watermark(aligned))?,
                            );
                        }
                    }
                }
            } else if let Some(value) = iter_second.next() {
                let ts = self.strategy_second.extract_timestamp(&value);
                keep_records(
                    &mut results,
                    operator.process_second(StreamElement::timestamped_record(value, ts))?,
                );
                generator_second.on_event(ts);
                if let Some(wm) = generator_second.current_watermark() {
                    if let Some(aligned) = filter_second.observe(wm) {
                        keep_records(
                            &mut results,
                            operator.process_second(StreamElement::Watermark(aligned))?,
                        );
                    }
                }
            }
        }

        // Bounded inputs: ending both sides drains every open window.
        keep_records(&mut results, operator.process_first(StreamElement::End)?);
        keep_records(&mut results, operator.process_second(StreamElement::End)?);
        Ok(results)
    }
}
