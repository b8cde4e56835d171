use thiserror::Error;

/// Result type for pipeline operations
pub type Result<T> = std::result::Result<T, PipelineError>;

/// Errors that can occur while building or running a pipeline
#[derive(Error, Debug)]
pub enum PipelineError {
    /// A worker count below one was requested
    #[error("concurrency must be at least 1, got {0}")]
    InvalidConcurrency(usize),

    /// A combinator was built without the stage it wraps
    #[error("{0} requires a stage to wrap")]
    MissingStage(&'static str),

    /// A sharding router was built without a key function
    #[error("shard key function is required")]
    MissingKeyFunction,

    /// Configuration rejected at construction time
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Per-message failure reported by a stage
    #[error("stage error: {0}")]
    Stage(String),

    /// I/O failure inside a stage
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The run context was cancelled
    #[error("context cancelled")]
    Cancelled,

    /// The run context passed its deadline
    #[error("context deadline exceeded")]
    DeadlineExceeded,

    /// A stage thread panicked
    #[error("stage {0} panicked")]
    StagePanicked(String),

    /// A stage thread could not be spawned
    #[error("failed to spawn stage {name}: {source}")]
    Spawn {
        name: String,
        #[source]
        source: std::io::Error,
    },
}

impl PipelineError {
    /// Build a per-message stage error from anything printable
    pub fn stage(msg: impl Into<String>) -> Self {
        PipelineError::Stage(msg.into())
    }

    /// True for the two context termination errors
    pub fn is_cancellation(&self) -> bool {
        matches!(
            self,
            PipelineError::Cancelled | PipelineError::DeadlineExceeded
        )
    }
}
