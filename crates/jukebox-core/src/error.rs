//! Error types for Jukebox.

use thiserror::Error;

use crate::deadline::TimedOut;

/// Result type alias using Jukebox's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Upstream and infrastructure errors shared by every Jukebox crate.
#[derive(Error, Debug)]
pub enum Error {
    // Network errors
    #[error("HTTP request failed: {0}")]
    Http(#[from] HttpError),

    #[error("Network error: {0}")]
    Network(String),

    // Provider errors
    #[error("Provider API error: {0}")]
    Api(String),

    #[error("Failed to parse API response: {0}")]
    Parse(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Provider unavailable: {0}")]
    Unavailable(String),

    #[error("Content not available: {0}")]
    ContentNotAvailable(String),

    #[error("Rate limited, retry after {retry_after_secs:?} seconds")]
    RateLimited { retry_after_secs: Option<u64> },

    // Audio resource errors
    #[error("Extraction failed: {0}")]
    ExtractionFailed(String),

    #[error(transparent)]
    Timeout(#[from] TimedOut),

    // Configuration errors
    #[error("Invalid configuration: {0}")]
    Config(String),

    // IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // Serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    // Generic errors
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// HTTP-specific errors.
#[derive(Error, Debug)]
pub enum HttpError {
    #[error("Request failed with status {status}: {message}")]
    StatusError { status: u16, message: String },

    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Request timeout")]
    Timeout,

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),
}

impl Error {
    /// Returns true if this error is retryable.
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Network(_)
                | Self::RateLimited { .. }
                | Self::Http(
                    HttpError::ConnectionFailed(_)
                        | HttpError::Timeout
                        | HttpError::StatusError {
                            status: 500..=599,
                            ..
                        }
                )
        )
    }

    /// Returns true if this is a rate limit error.
    pub const fn is_rate_limited(&self) -> bool {
        matches!(self, Self::RateLimited { .. })
    }

    /// Returns true if this error should abort a whole resolution rather
    /// than a single item: bad credentials or a provider that is down.
    pub const fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::Unauthorized(_)
                | Self::Unavailable(_)
                | Self::Http(HttpError::StatusError {
                    status: 401 | 403,
                    ..
                })
        )
    }
}
