use crate::config::PipelineConfig;
use crate::core::vector::is_negligible;
use crate::data::{EventSink, GasData};
use crate::error::{Error, Result};
use crate::pipeline::render::{render_batch, RenderedBatch, Renderer};
use crate::pipeline::video::StatsSample;
use crate::stats::{Histogram, SpeedHistogram, TdStats};
use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Bound on every condition-variable wait, so completion flags are noticed.
pub(crate) const WAIT_TIMEOUT: Duration = Duration::from_millis(100);

/// Peek leaves a queue untouched, drain empties it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    Peek,
    Drain,
}

#[derive(Debug, Default)]
struct RawQueue {
    events: VecDeque<GasData>,
    last_time: Option<f64>,
    n_particles: Option<usize>,
}

/// Output-side clock. Both the render head (`global_time`) and the caller's
/// frame cursor (`frame_time`) are integer grid indices from `origin`.
#[derive(Debug, Default)]
pub(crate) struct Cursor {
    pub origin: Option<f64>,
    pub render_index: u64,
    pub frame_index: u64,
    pub processed_time: f64,
    pub current: Option<StatsSample>,
}

impl Cursor {
    #[inline]
    pub fn grid_time(&self, index: u64, period: f64) -> Option<f64> {
        self.origin.map(|o| o + index as f64 * period)
    }
}

/// State owned by the thread running `process_data`.
struct Consumer<H: Histogram> {
    origin: Option<f64>,
    next_frame: u64,
    last_stats: Option<TdStats<H>>,
    last_snapshot: Option<GasData>,
}

impl<H: Histogram> Default for Consumer<H> {
    fn default() -> Self {
        Self {
            origin: None,
            next_frame: 0,
            last_stats: None,
            last_snapshot: None,
        }
    }
}

/// Buffers snapshots from the simulation and turns them into statistics
/// samples and resampled render frames.
///
/// One producer calls [`add_data`](Self::add_data) (usually through
/// [`Gas::simulate`](crate::core::Gas::simulate)), one consumer runs
/// [`process_data`](Self::process_data), and any thread may poll
/// [`get_video`](Self::get_video), [`get_stats`](Self::get_stats) and
/// [`get_renders`](Self::get_renders).
///
/// Lock order: consumer, raw, stats, renders, cursor, results.
pub struct SimDataPipeline<F, H: Histogram = SpeedHistogram> {
    pub(crate) config: PipelineConfig,
    pub(crate) frame_period: f64,
    histogram: H,
    raw: Mutex<RawQueue>,
    raw_ready: Condvar,
    raw_space: Condvar,
    pub(crate) stats: Mutex<VecDeque<TdStats<H>>>,
    pub(crate) renders: Mutex<VecDeque<(F, f64)>>,
    pub(crate) cursor: Mutex<Cursor>,
    pub(crate) results: Mutex<u64>,
    pub(crate) results_ready: Condvar,
    consumer: Mutex<Consumer<H>>,
    producer_done: AtomicBool,
    finished: AtomicBool,
    failure: Mutex<Option<String>>,
}

impl<F: Clone + Send + Sync + 'static, H: Histogram> SimDataPipeline<F, H> {
    /// Errors: `Error::Construction` if `config` fails validation.
    pub fn new(config: PipelineConfig, histogram: H) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            frame_period: config.frame_period(),
            config,
            histogram,
            raw: Mutex::new(RawQueue::default()),
            raw_ready: Condvar::new(),
            raw_space: Condvar::new(),
            stats: Mutex::new(VecDeque::new()),
            renders: Mutex::new(VecDeque::new()),
            cursor: Mutex::new(Cursor::default()),
            results: Mutex::new(0),
            results_ready: Condvar::new(),
            consumer: Mutex::new(Consumer::default()),
            producer_done: AtomicBool::new(false),
            finished: AtomicBool::new(false),
            failure: Mutex::new(None),
        })
    }

    #[inline]
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    #[inline]
    pub fn frame_period(&self) -> f64 {
        self.frame_period
    }

    /// Append a time-contiguous batch from the producer.
    ///
    /// Errors: `Error::DataIntegrity` if the batch is not contiguous inside,
    /// does not continue the previously queued data, changes the particle count
    /// or arrives after [`mark_done`](Self::mark_done); `Error::PipelineFatal`
    /// once the consumer has failed. A rejected batch leaves the queue untouched.
    pub fn add_data(&self, batch: Vec<GasData>) -> Result<()> {
        if batch.is_empty() {
            return Ok(());
        }
        if let Some(msg) = self.failure() {
            return Err(Error::PipelineFatal(msg));
        }
        if self.producer_done.load(Ordering::Acquire) {
            return Err(Error::DataIntegrity(
                "data added after the producer was marked done".into(),
            ));
        }
        let n = batch[0].len();
        for (k, pair) in batch.windows(2).enumerate() {
            if !is_negligible(pair[1].t0(), pair[0].time()) {
                warn!(index = k + 1, "rejected batch with a time gap");
                return Err(Error::DataIntegrity(format!(
                    "snapshot {} starts at {} but the previous one ends at {}",
                    k + 1,
                    pair[1].t0(),
                    pair[0].time()
                )));
            }
            if pair[1].len() != n {
                return Err(Error::DataIntegrity(format!(
                    "snapshot {} has {} particles, expected {n}",
                    k + 1,
                    pair[1].len()
                )));
            }
        }

        let mut raw = self.raw.lock();
        if let Some(expected) = raw.n_particles {
            if expected != n {
                return Err(Error::DataIntegrity(format!(
                    "batch has {n} particles, queued data has {expected}"
                )));
            }
        }
        if let Some(last) = raw.last_time {
            if !is_negligible(batch[0].t0(), last) {
                warn!(t0 = batch[0].t0(), last, "rejected discontinuous batch");
                return Err(Error::DataIntegrity(format!(
                    "batch starts at {} but queued data ends at {last}",
                    batch[0].t0()
                )));
            }
        }
        if let Some(max) = self.config.max_pending {
            while raw.events.len() >= max && !self.finished.load(Ordering::Acquire) {
                self.raw_space.wait_for(&mut raw, WAIT_TIMEOUT);
            }
        }

        raw.last_time = batch.last().map(GasData::time);
        raw.n_particles = Some(n);
        raw.events.extend(batch);
        drop(raw);
        self.raw_ready.notify_one();
        Ok(())
    }

    /// Signal that the producer will not add more data.
    pub fn mark_done(&self) {
        self.producer_done.store(true, Ordering::Release);
        let _raw = self.raw.lock();
        self.raw_ready.notify_all();
    }

    /// True once the consumer loop has exited.
    #[inline]
    pub fn is_done(&self) -> bool {
        self.finished.load(Ordering::Acquire)
    }

    #[inline]
    pub fn is_producer_done(&self) -> bool {
        self.producer_done.load(Ordering::Acquire)
    }

    /// Message of the failure that stopped the consumer, if any.
    pub fn failure(&self) -> Option<String> {
        self.failure.lock().clone()
    }

    /// Raw snapshots waiting to be processed.
    pub fn pending(&self) -> usize {
        self.raw.lock().events.len()
    }

    /// Next render instant, `None` before the first batch is processed.
    pub fn global_time(&self) -> Option<f64> {
        let cursor = self.cursor.lock();
        cursor.grid_time(cursor.render_index, self.frame_period)
    }

    /// Next instant `get_video` will emit.
    pub fn frame_time(&self) -> Option<f64> {
        let cursor = self.cursor.lock();
        cursor.grid_time(cursor.frame_index, self.frame_period)
    }

    /// Clock of the last processed snapshot.
    pub fn processed_time(&self) -> f64 {
        self.cursor.lock().processed_time
    }

    pub fn get_stats(&self, access: Access) -> Vec<TdStats<H>> {
        let mut stats = self.stats.lock();
        match access {
            Access::Peek => stats.iter().cloned().collect(),
            Access::Drain => stats.drain(..).collect(),
        }
    }

    pub fn get_renders(&self, access: Access) -> Vec<(F, f64)> {
        let mut renders = self.renders.lock();
        match access {
            Access::Peek => renders.iter().cloned().collect(),
            Access::Drain => renders.drain(..).collect(),
        }
    }

    /// Consumer loop: turn whole batches of raw data into statistics samples
    /// and, with a renderer, into frames on the fixed-period timeline.
    ///
    /// Returns when the producer is done and less than one batch remains, when
    /// `stopper` returns true, or on the first failure. The stopper is checked
    /// between batches; batches already taken but not processed go back to the
    /// raw queue, so a later call resumes where this one stopped. Failures are
    /// returned as `Error::PipelineFatal`; in every case the pipeline is marked
    /// done.
    pub fn process_data(
        &self,
        renderer: Option<&dyn Renderer<F>>,
        mfp_memory: bool,
        stopper: Option<&dyn Fn() -> bool>,
    ) -> Result<()> {
        let mut consumer = self.consumer.lock();
        info!(
            batch_size = self.config.batch_size,
            rendering = renderer.is_some(),
            mfp_memory,
            "pipeline consumer started"
        );
        let result = self.consume(&mut consumer, renderer, mfp_memory, stopper);
        drop(consumer);

        let result = result.map_err(|e| match e {
            Error::PipelineFatal(_) => e,
            other => Error::PipelineFatal(other.to_string()),
        });
        if let Err(e) = &result {
            error!(error = %e, "pipeline consumer failed");
            *self.failure.lock() = Some(e.to_string());
        }
        self.finished.store(true, Ordering::Release);
        {
            let _raw = self.raw.lock();
            self.raw_space.notify_all();
        }
        self.notify_results();
        info!(pending = self.pending(), "pipeline consumer finished");
        result
    }

    fn consume(
        &self,
        consumer: &mut Consumer<H>,
        renderer: Option<&dyn Renderer<F>>,
        mfp_memory: bool,
        stopper: Option<&dyn Fn() -> bool>,
    ) -> Result<()> {
        let stopped = || stopper.is_some_and(|stop| stop());
        while !stopped() {
            let Some(chunk) = self.take_chunk(&stopped) else {
                break;
            };
            let batch_size = self.config.batch_size;
            for (k, batch) in chunk.chunks(batch_size).enumerate() {
                self.process_batch(consumer, batch, renderer, mfp_memory)?;
                let taken = (k + 1) * batch_size;
                if stopped() {
                    if taken < chunk.len() {
                        self.requeue(chunk[taken..].to_vec());
                    }
                    debug!("pipeline consumer stopped by caller");
                    return Ok(());
                }
            }
        }
        Ok(())
    }

    /// Put unprocessed snapshots back at the head of the raw queue, in order.
    fn requeue(&self, tail: Vec<GasData>) {
        let mut raw = self.raw.lock();
        debug!(events = tail.len(), "requeued unprocessed snapshots");
        for data in tail.into_iter().rev() {
            raw.events.push_front(data);
        }
    }

    /// Wait for at least one batch and take a whole number of batches, capped
    /// by `chunk_cap`. `None` when the producer is done with less than a batch
    /// left, or the caller asked to stop.
    fn take_chunk(&self, stopped: &dyn Fn() -> bool) -> Option<Vec<GasData>> {
        let batch_size = self.config.batch_size;
        let mut raw = self.raw.lock();
        while raw.events.len() < batch_size {
            if self.producer_done.load(Ordering::Acquire) || stopped() {
                return None;
            }
            self.raw_ready.wait_for(&mut raw, WAIT_TIMEOUT);
        }
        let available = raw.events.len() / batch_size;
        let batches = self.config.chunk_cap.map_or(available, |cap| available.min(cap));
        let chunk: Vec<GasData> = raw.events.drain(..batches * batch_size).collect();
        drop(raw);
        self.raw_space.notify_all();
        Some(chunk)
    }

    fn process_batch(
        &self,
        consumer: &mut Consumer<H>,
        batch: &[GasData],
        renderer: Option<&dyn Renderer<F>>,
        mfp_memory: bool,
    ) -> Result<()> {
        let (Some(first), Some(last)) = (batch.first(), batch.last()) else {
            return Ok(());
        };
        let origin = match consumer.origin {
            Some(origin) => origin,
            None => {
                let origin = first.t0();
                consumer.origin = Some(origin);
                self.cursor.lock().origin = Some(origin);
                origin
            }
        };

        let prev_stats = if mfp_memory {
            consumer.last_stats.as_ref()
        } else {
            None
        };
        let previous = consumer.last_snapshot.as_ref();
        let first_frame = consumer.next_frame;
        let period = self.frame_period;

        let joined = catch_unwind(AssertUnwindSafe(|| {
            rayon::join(
                || self.batch_stats(prev_stats, batch),
                || render_batch(renderer, batch, previous, origin, period, first_frame),
            )
        }));
        let (stats, rendered) = joined.map_err(|payload| {
            Error::PipelineFatal(format!("batch worker panicked: {}", panic_message(&*payload)))
        })?;
        let stats = stats.map_err(|e| Error::PipelineFatal(format!("statistics worker failed: {e}")))?;
        let RenderedBatch { frames, next_index } =
            rendered.map_err(|e| Error::PipelineFatal(format!("render worker failed: {e}")))?;

        consumer.next_frame = next_index;
        consumer.last_snapshot = Some(last.clone());
        consumer.last_stats = Some(stats.clone());

        debug!(
            t0 = first.t0(),
            t = last.time(),
            frames = frames.len(),
            "batch processed"
        );
        {
            let mut stats_q = self.stats.lock();
            let mut renders_q = self.renders.lock();
            let mut cursor = self.cursor.lock();
            stats_q.push_back(stats);
            renders_q.extend(frames);
            cursor.render_index = next_index;
            cursor.processed_time = last.time();
        }
        self.notify_results();
        Ok(())
    }

    fn batch_stats(&self, prev: Option<&TdStats<H>>, batch: &[GasData]) -> Result<TdStats<H>> {
        let (first, rest) = batch
            .split_first()
            .ok_or_else(|| Error::DataIntegrity("empty batch".into()))?;
        let mut stats = match prev {
            Some(prev) => {
                let fresh = (!self.config.accumulate_histogram).then(|| self.histogram.clone());
                TdStats::chained(prev, first, fresh)?
            }
            None => TdStats::new(first, self.histogram.clone())?,
        };
        for data in rest {
            stats.add_data(data)?;
        }
        Ok(stats)
    }

    fn notify_results(&self) {
        let mut generation = self.results.lock();
        *generation = generation.wrapping_add(1);
        self.results_ready.notify_all();
    }
}

impl<F: Clone + Send + Sync + 'static, H: Histogram> EventSink for SimDataPipeline<F, H> {
    fn batch_size(&self) -> usize {
        self.config.batch_size
    }

    fn add_data(&self, batch: Vec<GasData>) -> Result<()> {
        SimDataPipeline::add_data(self, batch)
    }

    fn mark_done(&self) {
        SimDataPipeline::mark_done(self)
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{Gas, GasConfig};

    fn config(batch_size: usize) -> PipelineConfig {
        PipelineConfig {
            batch_size,
            framerate: 10.0,
            ..PipelineConfig::default()
        }
    }

    fn histogram() -> SpeedHistogram {
        SpeedHistogram::new(16, 10.0).unwrap()
    }

    fn gas() -> Result<Gas> {
        Gas::generate(27, 10.0, 1.0, GasConfig::new(0.2, 1.0)?, Some(5))
    }

    fn events(gas: &mut Gas, n: usize) -> Result<Vec<GasData>> {
        (0..n).map(|_| gas.step()).collect()
    }

    #[test]
    fn invalid_config_rejected() {
        assert!(SimDataPipeline::<(), _>::new(config(0), histogram()).is_err());
        let bad = PipelineConfig {
            framerate: -1.0,
            ..config(4)
        };
        assert!(SimDataPipeline::<(), _>::new(bad, histogram()).is_err());
    }

    #[test]
    fn discontinuous_batch_rejected_without_mutation() -> Result<()> {
        let pipeline = SimDataPipeline::<(), _>::new(config(4), histogram())?;
        let mut gas = gas()?;
        let first = events(&mut gas, 3)?;
        let skipped = gas.step()?;
        let second = events(&mut gas, 2)?;

        pipeline.add_data(first)?;
        let err = pipeline.add_data(second.clone()).unwrap_err();
        assert!(matches!(err, Error::DataIntegrity(_)));
        assert_eq!(pipeline.pending(), 3);

        // the queue still ends where the first batch did
        pipeline.add_data(vec![skipped])?;
        pipeline.add_data(second)?;
        assert_eq!(pipeline.pending(), 6);
        Ok(())
    }

    #[test]
    fn internal_gap_rejected() -> Result<()> {
        let pipeline = SimDataPipeline::<(), _>::new(config(4), histogram())?;
        let mut gas = gas()?;
        let mut batch = events(&mut gas, 2)?;
        let _skipped = gas.step()?;
        batch.extend(events(&mut gas, 1)?);
        assert!(pipeline.add_data(batch).is_err());
        assert_eq!(pipeline.pending(), 0);
        Ok(())
    }

    #[test]
    fn chunk_cap_limits_batches_per_iteration() -> Result<()> {
        let cfg = PipelineConfig {
            chunk_cap: Some(1),
            ..config(3)
        };
        let pipeline = SimDataPipeline::<(), _>::new(cfg, histogram())?;
        let mut gas = gas()?;
        pipeline.add_data(events(&mut gas, 10)?)?;
        let chunk = pipeline.take_chunk(&|| false);
        assert_eq!(chunk.map(|c| c.len()), Some(3));
        assert_eq!(pipeline.pending(), 7);
        Ok(())
    }

    #[test]
    fn renderer_failure_is_pipeline_fatal() -> Result<()> {
        let pipeline = SimDataPipeline::<u32, _>::new(config(2), histogram())?;
        let mut gas = gas()?;
        gas.simulate(40, Some(&pipeline), None)?;
        let failing = |_: &GasData, _: f64| -> Result<u32> {
            Err(Error::Collaborator("no canvas".into()))
        };
        let renderer: &dyn Renderer<u32> = &failing;
        let err = pipeline.process_data(Some(renderer), true, None).unwrap_err();
        assert!(matches!(err, Error::PipelineFatal(_)));
        assert!(pipeline.is_done());
        assert!(pipeline.failure().is_some());
        Ok(())
    }

    #[test]
    fn panicking_renderer_is_pipeline_fatal() -> Result<()> {
        let pipeline = SimDataPipeline::<u32, _>::new(config(2), histogram())?;
        let mut gas = gas()?;
        gas.simulate(40, Some(&pipeline), None)?;
        let panicking = |_: &GasData, _: f64| -> Result<u32> { panic!("renderer exploded") };
        let renderer: &dyn Renderer<u32> = &panicking;
        let err = pipeline.process_data(Some(renderer), false, None).unwrap_err();
        assert!(err.to_string().contains("renderer exploded"));
        Ok(())
    }
}
