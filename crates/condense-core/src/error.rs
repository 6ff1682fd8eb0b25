//! Error types for condense-core

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Result type alias using condense-core Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur during compaction operations
#[derive(Error, Debug)]
pub enum Error {
    /// An error from the provider layer
    #[error(transparent)]
    Ai(#[from] condense_ai::Error),

    /// The summarization call succeeded but produced no text
    #[error("Summarization returned an empty summary")]
    EmptySummary,

    /// The summarization call was cancelled by the caller
    #[error("Summarization cancelled")]
    Cancelled,

    /// The summarization call did not finish in time
    #[error("Summarization timed out after {0:?}")]
    Timeout(Duration),

    /// Reading or writing the config file failed
    #[error("Config file {}: {source}", path.display())]
    ConfigIo {
        path: PathBuf,
        source: std::io::Error,
    },

    /// JSON serialization/deserialization failed
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Invalid configuration value
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// A manual compaction was requested without any messages
    #[error("No messages provided")]
    NoMessages,
}

impl Error {
    /// Whether retrying the summarization later could succeed
    pub fn is_transient(&self) -> bool {
        match self {
            Error::Ai(e) => e.is_retryable(),
            Error::Cancelled | Error::Timeout(_) | Error::EmptySummary => true,
            _ => false,
        }
    }
}
