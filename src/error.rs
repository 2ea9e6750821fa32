use std::time::Duration;

use thiserror::Error;

/// Failure of a single acquisition tier.
///
/// These never leave the coordinator: they are logged and the tier counts as empty.
#[derive(Debug, Error)]
pub enum TierError {
    #[error("tier timed out after {0:?}")]
    Timeout(Duration),
    #[error("transport error: {0}")]
    Transport(String),
    #[error("parse error: {0}")]
    Parse(String),
    #[error("tier unavailable: {0}")]
    Unavailable(String),
}

impl From<reqwest::Error> for TierError {
    fn from(err: reqwest::Error) -> Self {
        TierError::Transport(err.to_string())
    }
}

impl From<serde_json::Error> for TierError {
    fn from(err: serde_json::Error) -> Self {
        TierError::Parse(err.to_string())
    }
}

impl From<std::io::Error> for TierError {
    fn from(err: std::io::Error) -> Self {
        TierError::Transport(err.to_string())
    }
}

/// Errors visible to callers of [`crate::acquisition::Acquisition`]
#[derive(Debug, Error)]
pub enum AcquisitionError {
    #[error("destination must not be empty")]
    EmptyDestination,
    #[error("every acquisition tier came back empty for {destination}")]
    Exhausted { destination: String },
}
