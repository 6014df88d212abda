//! Producer/consumer pipeline from raw snapshots to statistics and frames.

pub mod render;
pub mod sim_pipeline;
pub mod video;

pub use render::Renderer;
pub use sim_pipeline::{Access, SimDataPipeline};
pub use video::{
    PlotSeries, PointSeries, SeriesBinding, StatQuantity, StatsSample, VideoFrame, VideoMode,
    VideoOptions,
};
