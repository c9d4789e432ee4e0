use super::*;

// ── WindowedAggregateOperator ─────────────────────────────────────────────────

/// Keyed, incrementally aggregating window operator.
///
/// Accepts [`StreamElement<IN>`] items (records + watermarks) and emits
/// [`StreamElement<OUT>`] items when windows fire.
///
/// # Processing model
///
/// - **Records**: assigned to one or more windows by the `WindowAssigner`,
///   then folded straight into the accumulator of each `(key, window)` pair,
///   so only accumulator state is kept per window, not the element list.
/// - **Watermarks**: close every window whose `max_timestamp <= watermark`;
///   each closed window's accumulator is finished and its state purged. A
///   `finish` that reports "not ready" emits nothing; the state is purged
///   all the same. The watermark is re-emitted downstream unchanged.
/// - **Late records**: a record aimed at a window that has already closed is
///   dropped with a trace, suppressing that window's contribution rather
///   than corrupting downstream state.
///
/// Overlapping windows per key are concurrently live; count-style windows
/// are a different operator (`CountWindowOperator`) entirely.
pub struct WindowedAggregateOperator<K, IN, ACC, OUT, KF, TF, WA, A>
where
    K: StreamData,
    IN: StreamData,
    OUT: StreamData,
    KF: Fn(&IN) -> K + Send,
    TF: Fn(&IN) -> EventTime + Send,
    WA: WindowAssigner,
    A: AggregateFunction<IN, ACC, OUT>,
{
    key_fn: KF,
    timestamp_fn: TF,
    assigner: WA,
    aggregate: A,
    /// Live accumulators: (key_bytes, window) -> (original key, accumulator).
    /// key_bytes gives O(1) lookup; the original key rides along to avoid
    /// deserialization when emitting.
    states: HashMap<(Vec<u8>, TimeWindow), (K, ACC)>,
    timer_service: TimerService,
    current_watermark: EventTime,
    _phantom: PhantomData<(IN, OUT)>,
}

impl<K, IN, ACC, OUT, KF, TF, WA, A> WindowedAggregateOperator<K, IN, ACC, OUT, KF, TF, WA, A>
where
    K: StreamData,
    IN: StreamData,
    OUT: StreamData,
    KF: Fn(&IN) -> K + Send,
    TF: Fn(&IN) -> EventTime + Send,
    WA: WindowAssigner,
    A: AggregateFunction<IN, ACC, OUT>,
{
    /// Create a new operator.
    ///
    /// - `key_fn`: extracts the grouping key from each element
    /// - `timestamp_fn`: extracts the event time, used when a record carries none
    /// - `assigner`: assigns sliding event-time windows
    /// - `aggregate`: the accumulate/combine/finish aggregation
    pub fn new(key_fn: KF, timestamp_fn: TF, assigner: WA, aggregate: A) -> Self {
        Self {
            key_fn,
            timestamp_fn,
            assigner,
            aggregate,
            states: HashMap::new(),
            timer_service: TimerService::new(),
            current_watermark: EVENT_TIME_MIN,
            _phantom: PhantomData,
        }
    }

    /// Process one stream element and return any window results produced.
    pub fn process(&mut self, elem: StreamElement<IN>) -> Result<Vec<StreamElement<OUT>>> {
        match elem {
            StreamElement::Record(rec) => {
                let key = (self.key_fn)(&rec.value);
                let key_bytes = bincode::serialize(&key)?;
                let ts = rec
                    .timestamp
                    .unwrap_or_else(|| (self.timestamp_fn)(&rec.value));

                for window in self.assigner.assign_windows(ts) {
                    if window.max_timestamp() <= self.current_watermark {
                        tracing::trace!(%window, timestamp = ts, "dropping record for closed window");
                        continue;
                    }
                    let map_key = (key_bytes.clone(), window.clone());
                    let entry = self
                        .states
                        .entry(map_key.clone())
                        .or_insert_with(|| (key.clone(), self.aggregate.create()));
                    self.aggregate.accumulate(&mut entry.1, &rec.value);

                    self.timer_service
                        .register(bincode::serialize(&map_key)?, window.max_timestamp());
                }
                Ok(Vec::new())
            }

            StreamElement::Watermark(wm) => {
                let mut output = self.on_timer(wm.timestamp)?;
                // Re-emit the watermark downstream so the pipeline keeps advancing.
                output.push(StreamElement::Watermark(wm));
                Ok(output)
            }

            StreamElement::End => Ok(vec![StreamElement::End]),
        }
    }

    /// Close every window due at `event_time` and emit its result.
    pub fn on_timer(&mut self, event_time: EventTime) -> Result<Vec<StreamElement<OUT>>> {
        self.current_watermark = self.current_watermark.max(event_time);

        let mut output = Vec::new();
        for (timer_key, _fire_at) in self.timer_service.drain_due(event_time) {
            let map_key: (Vec<u8>, TimeWindow) = bincode::deserialize(&timer_key)?;
            if let Some((_key, acc)) = self.states.remove(&map_key) {
                if let Some(out) = self.aggregate.finish(&acc) {
                    output.push(StreamElement::timestamped_record(
                        out,
                        map_key.1.max_timestamp(),
                    ));
                }
            }
        }
        Ok(output)
    }

    /// Merge a partial accumulator produced elsewhere into this operator's
    /// state for the same `(key, window)`. The merge is `combine`, so it is
    /// insensitive to the order partials arrive in.
    pub fn merge_partial(&mut self, key: K, window: TimeWindow, partial: ACC) -> Result<()> {
        let key_bytes = bincode::serialize(&key)?;
        let map_key = (key_bytes, window.clone());
        match self.states.entry(map_key.clone()) {
            std::collections::hash_map::Entry::Occupied(mut entry) => {
                self.aggregate.combine(&mut entry.get_mut().1, partial);
            }
            std::collections::hash_map::Entry::Vacant(entry) => {
                entry.insert((key, partial));
            }
        }
        self.timer_service
            .register(bincode::serialize(&map_key)?, window.max_timestamp());
        Ok(())
    }

    /// Return the number of currently open (key, window) pairs.
    pub fn open_window_count(&self) -> usize {
        self.states.len()
    }
}

// ── PartialWindowedAggregateOperator ──────────────────────────────────────────

/// A worker-local accumulator for one (key, window) pair, handed to a
/// coordinator for the final `combine`/`finish` step.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct WindowPartial<K, ACC> {
    pub key: K,
    pub window: TimeWindow,
    pub accumulator: ACC,
}

/// The worker half of parallel windowed aggregation.
///
/// Identical record handling to [`WindowedAggregateOperator`], but a closing
/// window emits its raw accumulator as a [`WindowPartial`] instead of
/// finishing it. Each worker only ever sees its own partition's records for a
/// key, so partials for the same (key, window) from different workers must be
/// merged with `combine` before `finish` — see
/// [`merge_and_finish`](crate::aggregate::merge_and_finish).
pub struct PartialWindowedAggregateOperator<K, IN, ACC, OUT, KF, TF, WA, A>
where
    K: StreamData,
    IN: StreamData,
    KF: Fn(&IN) -> K + Send,
    TF: Fn(&IN) -> EventTime + Send,
    WA: WindowAssigner,
    A: AggregateFunction<IN, ACC, OUT>,
{
    key_fn: KF,
    timestamp_fn: TF,
    assigner: WA,
    aggregate: A,
    states: HashMap<(Vec<u8>, TimeWindow), (K, ACC)>,
    timer_service: TimerService,
    current_watermark: EventTime,
    _phantom: PhantomData<(IN, OUT)>,
}

impl<K, IN, ACC, OUT, KF, TF, WA, A>
    PartialWindowedAggregateOperator<K, IN, ACC, OUT, KF, TF, WA, A>
where
    K: StreamData,
    IN: StreamData,
    KF: Fn(&IN) -> K + Send,
    TF: Fn(&IN) -> EventTime + Send,
    WA: WindowAssigner,
    A: AggregateFunction<IN, ACC, OUT>,
{
    pub fn new(key_fn: KF, timestamp_fn: TF, assigner: WA, aggregate: A) -> Self {
        Self {
            key_fn,
            timestamp_fn,
            assigner,
            aggregate,
            states: HashMap::new(),
            timer_service: TimerService::new(),
            current_watermark: EVENT_TIME_MIN,
            _phantom: PhantomData,
        }
    }

    /// Process one stream element, emitting closed windows as partials.
    pub fn process(
        &mut self,
        elem: StreamElement<IN>,
    ) -> Result<Vec<StreamElement<WindowPartial<K, ACC>>>> {
        match elem {
            StreamElement::Record(rec) => {
                let key = (self.key_fn)(&rec.value);
                let key_bytes = bincode::serialize(&key)?;
                let ts = rec
                    .timestamp
                    .unwrap_or_else(|| (self.timestamp_fn)(&rec.value));

                for window in self.assigner.assign_windows(ts) {
                    if window.max_timestamp() <= self.current_watermark {
                        tracing::trace!(%window, timestamp = ts, "dropping record for closed window");
                        continue;
                    }
                    let map_key = (key_bytes.clone(), window.clone());
                    let entry = self
                        .states
                        .entry(map_key.clone())
                        .or_insert_with(|| (key.clone(), self.aggregate.create()));
                    self.aggregate.accumulate(&mut entry.1, &rec.value);

                    self.timer_service
                        .register(bincode::serialize(&map_key)?, window.max_timestamp());
                }
                Ok(Vec::new())
            }

            StreamElement::Watermark(wm) => {
                self.current_watermark = self.current_watermark.max(wm.timestamp);

                let mut output = Vec::new();
                for (timer_key, _fire_at) in self.timer_service.drain_due(wm.timestamp) {
                    let map_key: (Vec<u8>, TimeWindow) = bincode::deserialize(&timer_key)?;
                    if let Some((key, accumulator)) = self.states.remove(&map_key) {
                        output.push(StreamElement::timestamped_record(
                            WindowPartial {
                                key,
                                window: map_key.1.clone(),
                                accumulator,
                            },
                            map_key.1.max_timestamp(),
                        ));
                    }
                }
                output.push(StreamElement::Watermark(wm));
                Ok(output)
            }

            StreamElement::End => Ok(vec![StreamElement::End]),
        }
    }
}

// ── TwoInputWindowedAggregateOperator ─────────────────────────────────────────

/// Windowed co-grouping over two input streams.
///
/// Records from the first and second input are folded into the same
/// per-(key, window) accumulator through `accumulate_first` /
/// `accumulate_second`. The operator's watermark is the minimum of the two
/// input watermarks, so a window only closes once *both* inputs have moved
/// past it. When one input ends, its watermark is treated as unbounded and
/// the other input alone drives window closure.
///
/// Records on either input must carry event-time timestamps.
pub struct TwoInputWindowedAggregateOperator<K, IN0, IN1, ACC, OUT, KF0, KF1, WA, A>
where
    K: StreamData,
    IN0: StreamData,
    IN1: StreamData,
    OUT: StreamData,
    KF0: Fn(&IN0) -> K + Send,
    KF1: Fn(&IN1) -> K + Send,
    WA: WindowAssigner,
    A: AggregateFunction2<IN0, IN1, ACC, OUT>,
{
    key_fn_first: KF0,
    key_fn_second: KF1,
    assigner: WA,
    aggregate: A,
    states: HashMap<(Vec<u8>, TimeWindow), (K, ACC)>,
    timer_service: TimerService,
    current_watermark: EventTime,
    input_watermarks: [EventTime; 2],
    input_ended: [bool; 2],
    _phantom: PhantomData<(IN0, IN1, OUT)>,
}

impl<K, IN0, IN1, ACC, OUT, KF0, KF1, WA, A>
    TwoInputWindowedAggregateOperator<K, IN0, IN1, ACC, OUT, KF0, KF1, WA, A>
where
    K: StreamData,
    IN0: StreamData,
    IN1: StreamData,
    OUT: StreamData,
    KF0: Fn(&IN0) -> K + Send,
    KF1: Fn(&IN1) -> K + Send,
    WA: WindowAssigner,
    A: AggregateFunction2<IN0, IN1, ACC, OUT>,
{
    pub fn new(key_fn_first: KF0, key_fn_second: KF1, assigner: WA, aggregate: A) -> Self {
        Self {
            key_fn_first,
            key_fn_second,
            assigner,
            aggregate,
            states: HashMap::new(),
            timer_service: TimerService::new(),
            current_watermark: EVENT_TIME_MIN,
            input_watermarks: [EVENT_TIME_MIN; 2],
            input_ended: [false; 2],
            _phantom: PhantomData,
        }
    }

    /// Process an element arriving on the first input.
    pub fn process_first(&mut self, elem: StreamElement<IN0>) -> Result<Vec<StreamElement<OUT>>> {
        match elem {
            StreamElement::Record(rec) => {
                let ts = rec
                    .timestamp
                    .ok_or_else(|| anyhow!("co-group input record has no timestamp"))?;
                let key = (self.key_fn_first)(&rec.value);
                let key_bytes = bincode::serialize(&key)?;
                for window in self.assigner.assign_windows(ts) {
                    if window.max_timestamp() <= self.current_watermark {
                        tracing::trace!(%window, timestamp = ts, "dropping record for closed window");
                        continue;
                    }
                    let map_key = (key_bytes.clone(), window.clone());
                    let entry = self
                        .states
                        .entry(map_key.clone())
                        .or_insert_with(|| (key.clone(), self.aggregate.create()));
                    self.aggregate.accumulate_first(&mut entry.1, &rec.value);
                    self.timer_service
                        .register(bincode::serialize(&map_key)?, window.max_timestamp());
                }
                Ok(Vec::new())
            }
            StreamElement::Watermark(wm) => self.advance_input(0, wm.timestamp),
            StreamElement::End => self.end_input(0),
        }
    }

    /// Process an element arriving on the second input.
    pub fn process_second(&mut self, elem: StreamElement<IN1>) -> Result<Vec<StreamElement<OUT>>> {
        match elem {
            StreamElement::Record(rec) => {
                let ts = rec
                    .timestamp
                    .ok_or_else(|| anyhow!("co-group input record has no timestamp"))?;
                let key = (self.key_fn_second)(&rec.value);
                let key_bytes = bincode::serialize(&key)?;
                for window in self.assigner.assign_windows(ts) {
                    if window.max_timestamp() <= self.current_watermark {
                        tracing::trace!(%window, timestamp = ts, "dropping record for closed window");
                        continue;
                    }
                    let map_key = (key_bytes.clone(), window.clone());
                    let entry = self
                        .states
                        .entry(map_key.clone())
                        .or_insert_with(|| (key.clone(), self.aggregate.create()));
                    self.aggregate.accumulate_second(&mut entry.1, &rec.value);
                    self.timer_service
                        .register(bincode::serialize(&map_key)?, window.max_timestamp());
                }
                Ok(Vec::new())
            }
            StreamElement::Watermark(wm) => self.advance_input(1, wm.timestamp),
            StreamElement::End => self.end_input(1),
        }
    }

    fn advance_input(&mut self, input: usize, ts: EventTime) -> Result<Vec<StreamElement<OUT>>> {
        self.input_watermarks[input] = self.input_watermarks[input].max(ts);
        self.advance_combined()
    }

    fn end_input(&mut self, input: usize) -> Result<Vec<StreamElement<OUT>>> {
        self.input_ended[input] = true;
        self.input_watermarks[input] = EVENT_TIME_MAX;
        let mut output = self.advance_combined()?;
        if self.input_ended.iter().all(|ended| *ended) {
            output.push(StreamElement::End);
        }
        Ok(output)
    }

    fn advance_combined(&mut self) -> Result<Vec<StreamElement<OUT>>> {
        let combined = self.input_watermarks[0].min(self.input_watermarks[1]);
        if combined <= self.current_watermark {
            return Ok(Vec::new());
        }
        self.current_watermark = combined;

        let mut output = Vec::new();
        for (timer_key, _fire_at) in self.timer_service.drain_due(combined) {
            let map_key: (Vec<u8>, TimeWindow) = bincode::deserialize(&timer_key)?;
            if let Some((_key, acc)) = self.states.remove(&map_key) {
                if let Some(out) = self.aggregate.finish(&acc) {
                    output.push(StreamElement::timestamped_record(
                        out,
                        map_key.1.max_timestamp(),
                    ));
                }
            }
        }
        if combined != EVENT_TIME_MAX {
            output.push(StreamElement::watermark(combined));
        }
        Ok(output)
    }

    /// Return the number of currently open (key, window) pairs.
    pub fn open_window_count(&self) -> usize {
        self.states.len()
    }
}
