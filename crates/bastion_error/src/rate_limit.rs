//! Error types for rate limiting operations.

use crate::StorageError;

/// Error kinds for rate limiting operations.
#[derive(Debug, Clone, derive_more::Display)]
pub enum RateLimitErrorKind {
    /// A rule's endpoint pattern is not a valid regular expression.
    #[display("Invalid endpoint pattern '{pattern}': {reason}")]
    InvalidPattern {
        /// The offending pattern
        pattern: String,
        /// Why it failed to compile
        reason: String,
    },
    /// Recording a rejection in the event log failed.
    #[display("{_0}")]
    Storage(StorageError),
}

impl From<StorageError> for RateLimitErrorKind {
    fn from(err: StorageError) -> Self {
        Self::Storage(err)
    }
}

/// Rate limiting error with location tracking.
#[derive(Debug, Clone, derive_more::Display, derive_more::Error)]
#[display("Rate Limit Error: {} at line {} in {}", kind, line, file)]
pub struct RateLimitError {
    kind: RateLimitErrorKind,
    line: u32,
    file: &'static str,
}

impl RateLimitError {
    /// Create a new rate limiting error with automatic location tracking.
    #[track_caller]
    pub fn new(kind: RateLimitErrorKind) -> Self {
        let location = std::panic::Location::caller();
        Self {
            kind,
            line: location.line(),
            file: location.file(),
        }
    }

    /// Get the error kind.
    pub fn kind(&self) -> &RateLimitErrorKind {
        &self.kind
    }
}

impl<T> From<T> for RateLimitError
where
    T: Into<RateLimitErrorKind>,
{
    #[track_caller]
    fn from(err: T) -> Self {
        Self::new(err.into())
    }
}

/// Result type for rate limiting operations.
pub type RateLimitResult<T> = Result<T, RateLimitError>;
