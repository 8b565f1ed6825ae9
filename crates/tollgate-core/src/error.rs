//! Error types for cache and freshness operations.

use thiserror::Error;

/// Core error type.
#[derive(Debug, Error)]
pub enum CoreError {
    /// A date header could not be parsed as an HTTP date.
    #[error("invalid {header} date: {value:?}")]
    InvalidDate {
        /// Header the value came from.
        header: &'static str,
        /// The raw header value.
        value: String,
    },

    /// A `max-age` directive had no value or a non-integer value.
    #[error("invalid max-age directive: {0:?}")]
    InvalidMaxAge(String),

    /// The revalidation request to the origin failed.
    #[error("revalidation failed: {0}")]
    Revalidation(#[from] reqwest::Error),
}

impl CoreError {
    /// Returns true for header parse failures (as opposed to network failures).
    pub fn is_parse(&self) -> bool {
        matches!(
            self,
            CoreError::InvalidDate { .. } | CoreError::InvalidMaxAge(_)
        )
    }
}

/// Result type for core operations.
pub type Result<T> = std::result::Result<T, CoreError>;
