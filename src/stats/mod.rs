//! Running thermodynamic statistics over snapshot windows.

pub mod histogram;
pub mod td_stats;

pub use histogram::{Histogram, SpeedHistogram};
pub use td_stats::TdStats;
