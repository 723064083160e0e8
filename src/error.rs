use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ScoringError {
    #[error("Invalid analysis window: {0}")]
    InvalidWindow(String),

    #[error("Invalid stats bundle: {0}")]
    InvalidStatsBundle(String),

    #[error("Incident source is required but was not connected")]
    NoIncidentSource,
}

pub type Result<T> = std::result::Result<T, ScoringError>;
