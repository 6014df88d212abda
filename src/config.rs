//! Run settings.
//!
//! Settings are plain serde structs loaded from TOML. Every field has a
//! default, so a file only needs the values it changes:
//!
//! ```toml
//! [gas]
//! particles = 1000
//! temperature = 300.0
//!
//! [pipeline]
//! batch_size = 200
//! framerate = 60.0
//! ```

use crate::core::{Gas, GasConfig};
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Default number of snapshots per pipeline batch.
pub const DEFAULT_BATCH_SIZE: usize = 100;

/// Default output framerate in frames per simulated time unit.
pub const DEFAULT_FRAMERATE: f64 = 30.0;

/// Gas parameters for generative construction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GasSettings {
    pub particles: usize,
    pub box_side: f64,
    pub temperature: f64,
    pub radius: f64,
    pub mass: f64,
    /// RNG seed; `None` draws one from the thread RNG.
    pub seed: Option<u64>,
}

impl Default for GasSettings {
    fn default() -> Self {
        Self {
            particles: 1000,
            box_side: 1.0,
            temperature: 300.0,
            radius: 0.01,
            mass: 1.0,
            seed: None,
        }
    }
}

impl GasSettings {
    pub fn gas_config(&self) -> Result<GasConfig> {
        GasConfig::new(self.radius, self.mass)
    }

    /// Build the lattice gas these settings describe.
    pub fn build(&self) -> Result<Gas> {
        Gas::generate(
            self.particles,
            self.box_side,
            self.temperature,
            self.gas_config()?,
            self.seed,
        )
    }
}

/// Batching and resampling parameters of the pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Snapshots per statistics sample.
    pub batch_size: usize,
    /// Upper bound on batches taken per consumer iteration.
    pub chunk_cap: Option<usize>,
    /// Render frames per simulated time unit.
    pub framerate: f64,
    /// Chain statistics samples so free paths span batch boundaries.
    pub mfp_memory: bool,
    /// Keep one speed histogram across chained samples instead of one per batch.
    pub accumulate_histogram: bool,
    /// Bound on queued raw snapshots; `add_data` waits while it is reached.
    pub max_pending: Option<usize>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            chunk_cap: None,
            framerate: DEFAULT_FRAMERATE,
            mfp_memory: true,
            accumulate_histogram: false,
            max_pending: None,
        }
    }
}

impl PipelineConfig {
    /// Errors: `Error::Construction` for a zero batch size or chunk cap, a
    /// non-positive framerate, or a raw-queue bound smaller than one batch.
    pub fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            return Err(Error::Construction("batch size must be > 0".into()));
        }
        if self.chunk_cap == Some(0) {
            return Err(Error::Construction("chunk cap must be > 0".into()));
        }
        if !self.framerate.is_finite() || self.framerate <= 0.0 {
            return Err(Error::Construction(
                "framerate must be finite and > 0".into(),
            ));
        }
        if let Some(max) = self.max_pending {
            if max < self.batch_size {
                return Err(Error::Construction(format!(
                    "max_pending ({max}) must hold at least one batch ({})",
                    self.batch_size
                )));
            }
        }
        Ok(())
    }

    #[inline]
    pub fn frame_period(&self) -> f64 {
        1.0 / self.framerate
    }
}

/// Logging settings; `RUST_LOG` takes precedence over `filter`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    pub filter: String,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            filter: "info".to_string(),
        }
    }
}

/// Top-level settings file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub gas: GasSettings,
    pub pipeline: PipelineConfig,
    pub logging: LoggingSettings,
}

impl Settings {
    pub fn from_toml_str(s: &str) -> Result<Self> {
        let settings: Settings = toml::from_str(s)?;
        settings.validate()?;
        Ok(settings)
    }

    /// Load and validate a TOML settings file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        let settings = Self::from_toml_str(&text)?;
        tracing::debug!("loaded settings from {:?}", path.as_ref());
        Ok(settings)
    }

    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| Error::Config(e.to_string()))
    }

    /// Check parameter ranges without building anything.
    pub fn validate(&self) -> Result<()> {
        let gas = &self.gas;
        gas.gas_config().map_err(|e| Error::Config(e.to_string()))?;
        if !gas.box_side.is_finite() || gas.box_side <= 0.0 {
            return Err(Error::Config("gas.box_side must be finite and > 0".into()));
        }
        if !gas.temperature.is_finite() || gas.temperature < 0.0 {
            return Err(Error::Config(
                "gas.temperature must be finite and >= 0".into(),
            ));
        }
        self.pipeline
            .validate()
            .map_err(|e| Error::Config(e.to_string()))
    }
}
