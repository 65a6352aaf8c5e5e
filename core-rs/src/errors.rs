//! Error types for the simulation orchestrator

use thiserror::Error;

#[derive(Error, Debug)]
pub enum SimError {
    #[error("Malformed input: {0}")]
    MalformedInput(String),

    #[error("Transport failure: {0}")]
    TransportFailure(String),

    #[error("Compute failure: {0}")]
    ComputeFailure(String),

    #[error("Simulation record gone: {0}")]
    RecordGone(String),

    #[error("Partial substrate failure: {0}")]
    PartialSubstrateFailure(String),

    #[error("Simulation not ready: {0}")]
    NotReady(String),

    #[error("Invalid stage transition: {0}")]
    InvalidTransition(String),

    #[error("Store error: {0}")]
    Store(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("File not found: {0}")]
    FileNotFound(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl From<reqwest::Error> for SimError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            SimError::TransportFailure(format!("request timed out: {}", err))
        } else {
            SimError::TransportFailure(err.to_string())
        }
    }
}

impl SimError {
    /// True when the record vanished between read and write.
    pub fn is_record_gone(&self) -> bool {
        matches!(self, SimError::RecordGone(_))
    }

    /// Text persisted into a stage's `*_result` field on failure.
    ///
    /// Transport failures are recorded verbatim, without the variant prefix,
    /// so a polling client sees the upstream status text.
    pub fn stage_text(&self) -> String {
        match self {
            SimError::TransportFailure(msg)
            | SimError::ComputeFailure(msg)
            | SimError::MalformedInput(msg) => msg.clone(),
            other => other.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, SimError>;
