use std::time::Duration;
use thiserror::Error;

/// Rejected at construction time. Never produced by a running pipeline.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value for `{field}`: {reason}")]
    InvalidBound { field: &'static str, reason: String },

    #[error("missing required collaborator: {0}")]
    MissingCollaborator(&'static str),

    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
}

impl ConfigError {
    pub(crate) fn bound(field: &'static str, reason: impl Into<String>) -> Self {
        ConfigError::InvalidBound { field, reason: reason.into() }
    }
}

#[derive(Debug, Error)]
pub enum MiningError {
    #[error("mining worker {worker} failed: {reason}")]
    WorkerFailed { worker: usize, reason: String },

    #[error("mining task could not be joined: {0}")]
    Join(String),
}

/// Failures of a single pipeline run.
/// Scoring failures are absent on purpose: they degrade the run instead of failing it.
#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("failed to read events: {0}")]
    EventSource(#[source] anyhow::Error),

    #[error("failed to persist patterns: {0}")]
    Persistence(#[source] anyhow::Error),

    #[error(transparent)]
    Mining(#[from] MiningError),

    #[error("analysis cancelled")]
    Cancelled,
}

#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error("analysis loop already running")]
    AlreadyRunning,

    #[error("analysis loop not running")]
    NotRunning,

    #[error("analysis loop did not stop within {0:?}")]
    StopTimeout(Duration),

    #[error("analysis loop task failed: {0}")]
    Join(String),
}
