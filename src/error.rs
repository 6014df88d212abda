use thiserror::Error;

/// Crate-wide result type alias.
pub type Result<T> = std::result::Result<T, Error>;

/// Error type shared by the collision engine, statistics and pipeline.
///
/// Every variant is surfaced at the boundary of the call that detected it and
/// is never retried automatically.
#[derive(Debug, Error)]
pub enum Error {
    /// Invalid physical parameters at construction (`Gas`, `TdStats`, pipeline).
    #[error("construction error: {0}")]
    Construction(String),

    /// Physics or numerical invariant violated while searching/resolving events.
    #[error("simulation fatal: {0}")]
    SimulationFatal(String),

    /// Non-contiguous time, mismatched particle counts or temperature drift.
    #[error("data integrity: {0}")]
    DataIntegrity(String),

    /// Malformed externally supplied plot series or window sizing.
    #[error("collaborator error: {0}")]
    Collaborator(String),

    /// Out-of-range index or an accessor that does not match the event kind.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// A batch worker failed; the pipeline cannot make further progress.
    #[error("pipeline fatal: {0}")]
    PipelineFatal(String),

    /// Settings could not be parsed or failed validation.
    #[error("config error: {0}")]
    Config(String),

    /// Propagated I/O errors (settings files).
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl From<toml::de::Error> for Error {
    fn from(e: toml::de::Error) -> Self {
        Error::Config(e.to_string())
    }
}
