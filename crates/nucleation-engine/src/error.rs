//! Error types for the nucleation engine binary.
//!
//! [`EngineError`] wraps every failure mode of startup and of the run so
//! that `main` can propagate with `?`. Every variant is fatal.

/// Top-level error for the engine binary.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// Configuration loading or validation failed.
    #[error("config error: {source}")]
    Config {
        /// The underlying config error.
        #[from]
        source: nucleation_core::config::ConfigError,
    },

    /// The configured domain has a dimension the engine does not run.
    #[error("unsupported domain dimension {dimension}; expected 2 or 3")]
    UnsupportedDimension {
        /// Number of extents configured.
        dimension: usize,
    },

    /// Building the channel world failed.
    #[error("communication error: {source}")]
    Comm {
        /// The underlying communicator error.
        #[from]
        source: nucleation_comm::CommError,
    },

    /// Building a worker's mesh failed.
    #[error("mesh error: {source}")]
    Mesh {
        /// The underlying mesh error.
        #[from]
        source: nucleation_core::mesh::MeshError,
    },

    /// A nucleation step failed on some worker.
    #[error("step error: {source}")]
    Step {
        /// The underlying step error.
        #[from]
        source: nucleation_core::step::StepError,
    },

    /// The step clock overflowed.
    #[error("schedule error: {source}")]
    Schedule {
        /// The underlying schedule error.
        #[from]
        source: nucleation_core::schedule::ScheduleError,
    },

    /// The final event log failed an audit.
    #[error("event log error: {source}")]
    Log {
        /// The underlying log error.
        #[from]
        source: nucleation_core::event_log::LogError,
    },

    /// A worker's event log differs from rank 0's after the run.
    #[error("replica of rank {rank} diverged from rank 0 ({len} vs {reference_len} events)")]
    ReplicaMismatch {
        /// The diverging rank.
        rank: usize,
        /// Its log length.
        len: usize,
        /// Rank 0's log length.
        reference_len: usize,
    },

    /// Writing the run report failed.
    #[error("output error: {source}")]
    Output {
        /// The underlying I/O error.
        #[from]
        source: std::io::Error,
    },

    /// Serializing the run report failed.
    #[error("serialization error: {source}")]
    Serialize {
        /// The underlying JSON error.
        #[from]
        source: serde_json::Error,
    },
}
