use thiserror::Error;

/// Crate-wide result type alias.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors surfaced by the collision engine and its collaborators.
///
/// Per-cell numerical trouble never shows up here: it is absorbed at the cell
/// boundary and only reported through the diagnostic counters.
#[derive(Debug, Error)]
pub enum Error {
    /// Invalid user or API parameter.
    #[error("invalid parameter: {0}")]
    InvalidParam(String),

    /// Cell body ranges that overlap or run past the body arena.
    #[error("invalid cell partition: {0}")]
    Partition(String),

    /// A peer rank hung up or sent a message of the wrong shape.
    #[error("communicator failure on rank {rank}: {reason}")]
    Comm { rank: usize, reason: String },

    /// The worker pool could not be created.
    #[error(transparent)]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),

    /// Run file could not be decoded.
    #[error(transparent)]
    Config(#[from] toml::de::Error),

    /// Propagated I/O errors from the diagnostic writers.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}
