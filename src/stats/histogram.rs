use crate::error::{Error, Result};

/// Accumulator for particle speeds, filled by `TdStats`.
///
/// Implementations are cloned when a statistics sample is chained or peeked,
/// and moved across the pipeline's worker threads.
pub trait Histogram: Clone + Send + Sync + 'static {
    fn fill(&mut self, value: f64);
    fn reset(&mut self);
}

/// Fixed-width bins over `[0, max)` with an overflow counter.
#[derive(Debug, Clone, PartialEq)]
pub struct SpeedHistogram {
    max: f64,
    counts: Vec<u64>,
    overflow: u64,
}

impl SpeedHistogram {
    /// Errors: `Error::Construction` if `bins == 0` or `max` is not positive.
    pub fn new(bins: usize, max: f64) -> Result<Self> {
        if bins == 0 {
            return Err(Error::Construction("histogram needs at least one bin".into()));
        }
        if !max.is_finite() || max <= 0.0 {
            return Err(Error::Construction(
                "histogram range must be finite and > 0".into(),
            ));
        }
        Ok(Self {
            max,
            counts: vec![0; bins],
            overflow: 0,
        })
    }

    #[inline]
    pub fn bins(&self) -> usize {
        self.counts.len()
    }

    #[inline]
    pub fn bin_width(&self) -> f64 {
        self.max / self.counts.len() as f64
    }

    /// Bin edges, `bins + 1` values from 0 to `max`.
    pub fn edges(&self) -> Vec<f64> {
        let w = self.bin_width();
        (0..=self.counts.len()).map(|k| k as f64 * w).collect()
    }

    #[inline]
    pub fn counts(&self) -> &[u64] {
        &self.counts
    }

    /// Samples at or above `max` (and non-finite samples).
    #[inline]
    pub fn overflow(&self) -> u64 {
        self.overflow
    }

    pub fn total(&self) -> u64 {
        self.counts.iter().sum::<u64>() + self.overflow
    }

    /// Counts normalised to a probability density over the binned range.
    pub fn density(&self) -> Vec<f64> {
        let total = self.total();
        if total == 0 {
            return vec![0.0; self.counts.len()];
        }
        let norm = total as f64 * self.bin_width();
        self.counts.iter().map(|&c| c as f64 / norm).collect()
    }
}

impl Histogram for SpeedHistogram {
    fn fill(&mut self, value: f64) {
        if !value.is_finite() || value >= self.max {
            self.overflow += 1;
            return;
        }
        let bin = ((value.max(0.0) / self.bin_width()) as usize).min(self.counts.len() - 1);
        self.counts[bin] += 1;
    }

    fn reset(&mut self) {
        self.counts.iter_mut().for_each(|c| *c = 0);
        self.overflow = 0;
    }
}
