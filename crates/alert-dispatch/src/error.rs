//! Library-wide error types.

use std::time::Duration;

use thiserror::Error;

/// Library-wide result type.
pub type Result<T> = std::result::Result<T, Error>;

/// Library-wide error type.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("{channel} delivery failed: {message}")]
    Transport { channel: String, message: String },

    #[error("Rate limited for {channel}")]
    RateLimited { channel: String },

    #[error("{channel} delivery timed out after {after:?}")]
    Timeout { channel: String, after: Duration },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Notification dispatch is disabled")]
    Disabled,
}

impl Error {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    pub fn transport(channel: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Transport {
            channel: channel.into(),
            message: msg.into(),
        }
    }

    pub fn rate_limited(channel: impl Into<String>) -> Self {
        Self::RateLimited {
            channel: channel.into(),
        }
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Whether a later attempt could plausibly succeed.
    ///
    /// Network, rate-limit and timeout failures are retried. Configuration
    /// and validation failures are not: the same input fails the same way.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Transport { .. } | Self::RateLimited { .. } | Self::Timeout { .. } | Self::Http(_)
        )
    }
}
