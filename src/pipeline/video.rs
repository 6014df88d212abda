//! Caller-paced composition of frames and statistics on the frame grid.

use crate::core::particle::Wall;
use crate::core::vector::is_on_grid;
use crate::error::{Error, Result};
use crate::pipeline::sim_pipeline::{SimDataPipeline, WAIT_TIMEOUT};
use crate::stats::{Histogram, TdStats};
use std::time::Duration;
use tracing::warn;

/// What `get_video` should compose.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VideoMode {
    /// Rendered frames only, up to the latest rendered instant.
    Gas,
    /// Statistics only, fed into the plot series.
    Stats,
    /// Frames and statistics, up to the instant both are available.
    GasStats,
    /// Frames, statistics and plot series, up to the latest processed
    /// statistics; missing frames are replaced by the placeholder.
    Combined,
}

impl VideoMode {
    #[inline]
    fn wants_gas(self) -> bool {
        !matches!(self, VideoMode::Stats)
    }

    #[inline]
    fn wants_stats(self) -> bool {
        !matches!(self, VideoMode::Gas)
    }

    #[inline]
    fn feeds_series(self) -> bool {
        matches!(self, VideoMode::Stats | VideoMode::Combined)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct VideoOptions {
    pub mode: VideoMode,
    /// Maximum number of frames returned by one call.
    pub window_size: usize,
    /// Time span kept in the plot series; older points are trimmed.
    pub plot_window: Option<f64>,
    /// How long to wait for new results when nothing is ready.
    pub wait: Duration,
}

impl Default for VideoOptions {
    fn default() -> Self {
        Self {
            mode: VideoMode::Combined,
            window_size: 64,
            plot_window: None,
            wait: Duration::ZERO,
        }
    }
}

impl VideoOptions {
    fn validate(&self) -> Result<()> {
        if self.window_size == 0 {
            return Err(Error::Collaborator("window size must be > 0".into()));
        }
        if let Some(w) = self.plot_window {
            if !w.is_finite() || w <= 0.0 {
                return Err(Error::Collaborator(
                    "plot window must be finite and > 0".into(),
                ));
            }
        }
        Ok(())
    }
}

/// Readouts of one statistics sample, cheap to copy into every frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StatsSample {
    pub t0: f64,
    pub time: f64,
    pub temperature: f64,
    pub pressure: f64,
    pub wall_pressures: [f64; 6],
    pub ideal_gas_pressure: f64,
    pub mean_free_path: Option<f64>,
    pub collisions: usize,
}

impl<H: Histogram> From<&TdStats<H>> for StatsSample {
    fn from(s: &TdStats<H>) -> Self {
        Self {
            t0: s.t0(),
            time: s.time(),
            temperature: s.temperature(),
            pressure: s.pressure(),
            wall_pressures: Wall::ALL.map(|w| s.pressure_on(w)),
            ideal_gas_pressure: s.ideal_gas_pressure(),
            mean_free_path: s.mean_free_path(),
            collisions: s.collision_count(),
        }
    }
}

/// Quantity plotted by a series.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatQuantity {
    Pressure,
    WallPressure(Wall),
    IdealGasPressure,
    MeanFreePath,
    Temperature,
}

impl StatQuantity {
    pub fn value(self, s: &StatsSample) -> Option<f64> {
        match self {
            StatQuantity::Pressure => Some(s.pressure),
            StatQuantity::WallPressure(w) => Some(s.wall_pressures[w.index()]),
            StatQuantity::IdealGasPressure => Some(s.ideal_gas_pressure),
            StatQuantity::MeanFreePath => s.mean_free_path,
            StatQuantity::Temperature => Some(s.temperature),
        }
    }
}

/// Time series filled from statistics samples and drawn elsewhere.
pub trait PlotSeries {
    fn add_point(&mut self, time: f64, value: f64) -> Result<()>;
    /// Drop points older than `time`.
    fn trim_before(&mut self, time: f64);
    fn last_time(&self) -> Option<f64>;
}

/// In-memory series, enough for tests and simple front ends.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PointSeries {
    pub points: Vec<(f64, f64)>,
}

impl PlotSeries for PointSeries {
    fn add_point(&mut self, time: f64, value: f64) -> Result<()> {
        if !time.is_finite() {
            return Err(Error::Collaborator("plot point time must be finite".into()));
        }
        self.points.push((time, value));
        Ok(())
    }

    fn trim_before(&mut self, time: f64) {
        self.points.retain(|&(t, _)| t >= time);
    }

    fn last_time(&self) -> Option<f64> {
        self.points.last().map(|&(t, _)| t)
    }
}

/// A series bound to the quantity it plots.
pub struct SeriesBinding<'a> {
    pub quantity: StatQuantity,
    pub series: &'a mut dyn PlotSeries,
}

/// One emitted instant on the frame grid.
#[derive(Debug, Clone, PartialEq)]
pub struct VideoFrame<F> {
    pub time: f64,
    /// Rendered or placeholder frame; `None` in statistics-only mode.
    pub gas: Option<F>,
    pub placeholder: bool,
    /// Latest statistics sample ending at or before `time`.
    pub stats: Option<StatsSample>,
}

impl<F: Clone + Send + Sync + 'static, H: Histogram> SimDataPipeline<F, H> {
    /// Pull the next run of frames, advancing the frame cursor one period at a time.
    ///
    /// The returned frames are contiguous on the grid; instants without a
    /// rendered frame get a clone of `placeholder`. Rendered frames older than
    /// the cursor are discarded. Returns an empty vector when nothing is ready
    /// after waiting up to `options.wait`.
    ///
    /// Errors: `Error::Collaborator` for invalid window sizes or a series whose
    /// last point is newer than the statistics about to be added;
    /// `Error::PipelineFatal` if the consumer failed; `Error::DataIntegrity` if a
    /// queued frame is off the grid.
    pub fn get_video(
        &self,
        options: &VideoOptions,
        placeholder: &F,
        series: &mut [SeriesBinding<'_>],
    ) -> Result<Vec<VideoFrame<F>>> {
        options.validate()?;
        if let Some(msg) = self.failure() {
            return Err(Error::PipelineFatal(msg));
        }

        let generation = *self.results.lock();
        if !self.video_ready(options.mode) && !options.wait.is_zero() {
            let mut results = self.results.lock();
            let mut waited = Duration::ZERO;
            while *results == generation && waited < options.wait && !self.is_done() {
                let step = WAIT_TIMEOUT.min(options.wait - waited);
                self.results_ready.wait_for(&mut results, step);
                waited += step;
            }
        }

        let mode = options.mode;
        let period = self.frame_period;
        let tol = 1e-6 * period;
        let mut stats_q = self.stats.lock();
        let mut renders_q = self.renders.lock();
        let mut cursor = self.cursor.lock();
        let Some(origin) = cursor.origin else {
            return Ok(Vec::new());
        };

        let render_horizon = renders_q.back().map(|&(_, t)| t);
        let stats_horizon = stats_q
            .back()
            .map(TdStats::time)
            .or(cursor.current.map(|c| c.time));
        let horizon = match mode {
            VideoMode::Gas => render_horizon,
            VideoMode::Stats | VideoMode::Combined => stats_horizon,
            VideoMode::GasStats => match (render_horizon, stats_horizon) {
                (Some(r), Some(s)) => Some(r.min(s)),
                _ => None,
            },
        };
        let Some(horizon) = horizon else {
            return Ok(Vec::new());
        };

        if mode.feeds_series() {
            if let Some(first) = stats_q.front() {
                for binding in series.iter() {
                    if binding.series.last_time().is_some_and(|t| t > first.time()) {
                        return Err(Error::Collaborator(format!(
                            "plot series for {:?} already has points after {}",
                            binding.quantity,
                            first.time()
                        )));
                    }
                }
            }
        }

        let mut out = Vec::new();
        while out.len() < options.window_size {
            let t = origin + cursor.frame_index as f64 * period;
            if t > horizon + tol {
                break;
            }

            let mut gas = None;
            if mode.wants_gas() {
                while let Some(&(_, ft)) = renders_q.front() {
                    if !is_on_grid(ft, origin, period) {
                        return Err(Error::DataIntegrity(format!(
                            "frame at {ft} is off the {period} grid from {origin}"
                        )));
                    }
                    if ft < t - tol {
                        warn!(frame_time = ft, cursor = t, "dropping stale frame");
                        renders_q.pop_front();
                        continue;
                    }
                    if (ft - t).abs() <= tol {
                        gas = renders_q.pop_front().map(|(f, _)| f);
                    }
                    break;
                }
            }

            if mode.wants_stats() {
                while stats_q.front().is_some_and(|s| s.time() <= t + tol) {
                    let Some(sample) = stats_q.pop_front() else {
                        break;
                    };
                    let sample = StatsSample::from(&sample);
                    if mode.feeds_series() {
                        feed_series(series, &sample, options.plot_window)?;
                    }
                    cursor.current = Some(sample);
                }
            }

            let placeholder_used = mode.wants_gas() && gas.is_none();
            out.push(VideoFrame {
                time: t,
                gas: if placeholder_used {
                    Some(placeholder.clone())
                } else {
                    gas
                },
                placeholder: placeholder_used,
                stats: if mode.wants_stats() { cursor.current } else { None },
            });
            cursor.frame_index += 1;
        }

        if cursor.frame_index > cursor.render_index {
            warn!(
                frame_index = cursor.frame_index,
                render_index = cursor.render_index,
                "frame cursor is ahead of the render head"
            );
        }
        Ok(out)
    }

    /// True when the next grid instant can be emitted for `mode`.
    fn video_ready(&self, mode: VideoMode) -> bool {
        let stats_ready = !self.stats.lock().is_empty();
        let renders_ready = !self.renders.lock().is_empty();
        match mode {
            VideoMode::Gas => renders_ready,
            VideoMode::Stats | VideoMode::Combined => stats_ready,
            VideoMode::GasStats => stats_ready && renders_ready,
        }
    }
}

fn feed_series(
    series: &mut [SeriesBinding<'_>],
    sample: &StatsSample,
    plot_window: Option<f64>,
) -> Result<()> {
    for binding in series.iter_mut() {
        if let Some(value) = binding.quantity.value(sample) {
            binding
                .series
                .add_point(sample.time, value)
                .map_err(|e| Error::Collaborator(format!("{:?}: {e}", binding.quantity)))?;
        }
        if let Some(w) = plot_window {
            binding.series.trim_before(sample.time - w);
        }
    }
    Ok(())
}
