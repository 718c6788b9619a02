use std::io;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum TributaryError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Decode error: {0}")]
    Decode(String),

    #[error("Unknown operation: {0}")]
    UnknownOperation(String),

    #[error("Store error: {0}")]
    Store(String),

    #[error("Stream error: {0}")]
    Stream(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Dead letter queue error: {0}")]
    DeadLetter(String),

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Other error: {0}")]
    Other(#[from] anyhow::Error),
}

impl TributaryError {
    /// Whether the error comes from the message itself rather than from a
    /// downstream write. Such messages are skipped; everything else is retried.
    pub fn is_decode(&self) -> bool {
        matches!(
            self,
            TributaryError::Decode(_) | TributaryError::UnknownOperation(_)
        )
    }
}

impl From<serde_json::Error> for TributaryError {
    fn from(err: serde_json::Error) -> Self {
        TributaryError::Serialization(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, TributaryError>;
