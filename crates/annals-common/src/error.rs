//! Error types shared across Annals crates

use thiserror::Error;

/// Result type alias for shared Annals helpers
pub type Result<T> = std::result::Result<T, AnnalsError>;

/// Errors raised by the shared helpers
#[derive(Error, Debug)]
pub enum AnnalsError {
    #[error("Invalid timestamp '{value}': {reason}")]
    InvalidTimestamp { value: String, reason: String },
}

impl AnnalsError {
    /// Build an invalid timestamp error
    pub fn invalid_timestamp(value: &str, reason: impl Into<String>) -> Self {
        Self::InvalidTimestamp {
            value: value.to_string(),
            reason: reason.into(),
        }
    }
}
