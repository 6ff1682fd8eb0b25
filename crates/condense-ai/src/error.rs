//! Error types for condense-ai

use thiserror::Error;

/// Result type alias using condense-ai Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur when talking to chat-completion providers
#[derive(Error, Debug)]
pub enum Error {
    /// HTTP request failed
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization/deserialization failed
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Reading a catalog file failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// API returned a non-success status
    #[error("API error: {message} (status: {status})")]
    Api { status: u16, message: String },

    /// Invalid API key
    #[error("Invalid or missing API key")]
    InvalidApiKey,

    /// Unexpected response format
    #[error("Unexpected response: {0}")]
    UnexpectedResponse(String),

    /// No provider registered under the requested name
    #[error("Provider not found: {0}")]
    ProviderNotFound(String),

    /// Model lookup failed inside a provider
    #[error("Model not found: {0}")]
    ModelNotFound(String),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl Error {
    /// Create an API error from a status code and response body
    pub fn api(status: u16, message: impl Into<String>) -> Self {
        Self::Api {
            status,
            message: message.into(),
        }
    }

    /// Whether the upstream rejected the request because of rate limiting or overload
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Http(e) => e.is_timeout() || e.is_connect(),
            Error::Api { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }
}
