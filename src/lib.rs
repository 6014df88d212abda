//! Event-driven hard-sphere gas in a cubic box.
//!
//! [`Gas`] resolves collisions one at a time and emits a [`GasData`] snapshot
//! per event. A [`SimDataPipeline`] consumes those snapshots on another thread,
//! folding them into [`TdStats`] samples and resampling them onto a
//! fixed-framerate timeline for rendering.

pub mod config;
pub mod core;
pub mod data;
pub mod error;
pub mod logging;
pub mod pipeline;
pub mod stats;

#[cfg(feature = "python")]
mod python;

pub use crate::config::{GasSettings, PipelineConfig, Settings};
pub use crate::core::{Collision, CollisionKind, Gas, GasConfig, Particle, Vec3, Wall};
pub use crate::data::{EventSink, GasData};
pub use crate::error::{Error, Result};
pub use crate::pipeline::{Access, Renderer, SimDataPipeline, VideoFrame, VideoMode, VideoOptions};
pub use crate::stats::{Histogram, SpeedHistogram, TdStats};
