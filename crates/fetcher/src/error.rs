//! Error types for remote slice retrieval.

use chrono::NaiveDate;
use thiserror::Error;

/// Result type alias using FetchError.
pub type Result<T> = std::result::Result<T, FetchError>;

#[derive(Debug, Error)]
pub enum FetchError {
    /// The provider reports the day as not yet published. Callers may retry later.
    #[error("Data for {day} is not available from the provider yet")]
    Unavailable { day: NaiveDate },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The provider accepted the request but reported a failure.
    #[error("Remote error: {0}")]
    Remote(String),

    #[error("Decode error: {0}")]
    Decode(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl FetchError {
    pub fn remote(msg: impl Into<String>) -> Self {
        Self::Remote(msg.into())
    }

    pub fn decode(msg: impl Into<String>) -> Self {
        Self::Decode(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Whether a later attempt for the same day may succeed.
    pub fn is_unavailable(&self) -> bool {
        matches!(self, Self::Unavailable { .. })
    }
}

impl From<serde_json::Error> for FetchError {
    fn from(err: serde_json::Error) -> Self {
        Self::Remote(format!("malformed response: {err}"))
    }
}
