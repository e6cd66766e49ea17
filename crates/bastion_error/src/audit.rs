//! Compliance audit error types.

use crate::StorageError;

/// Kinds of audit errors.
#[derive(Debug, Clone, derive_more::Display)]
pub enum AuditErrorKind {
    /// A single compliance rule could not evaluate the state.
    ///
    /// The auditor records this as an `error` finding and keeps going.
    #[display("Compliance check '{rule_id}' failed: {reason}")]
    RuleFailed {
        /// Rule that failed
        rule_id: String,
        /// What went wrong
        reason: String,
    },
    /// Gathering the state snapshot failed.
    #[display("Audit snapshot failed: {_0}")]
    Snapshot(String),
    /// Persisting or loading audits failed.
    #[display("{_0}")]
    Storage(StorageError),
}

impl From<StorageError> for AuditErrorKind {
    fn from(err: StorageError) -> Self {
        Self::Storage(err)
    }
}

/// Audit error with location tracking.
///
/// # Examples
///
/// ```
/// use bastion_error::{AuditError, AuditErrorKind};
///
/// let err = AuditError::rule_failed("api_key_rotation", "clock went backwards");
/// assert!(matches!(err.kind(), AuditErrorKind::RuleFailed { .. }));
/// ```
#[derive(Debug, Clone, derive_more::Display, derive_more::Error)]
#[display("Audit Error: {} at line {} in {}", kind, line, file)]
pub struct AuditError {
    kind: AuditErrorKind,
    line: u32,
    file: &'static str,
}

impl AuditError {
    /// Create a new audit error with automatic location tracking.
    #[track_caller]
    pub fn new(kind: AuditErrorKind) -> Self {
        let location = std::panic::Location::caller();
        Self {
            kind,
            line: location.line(),
            file: location.file(),
        }
    }

    /// Shorthand for a failed compliance check.
    #[track_caller]
    pub fn rule_failed(rule_id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::new(AuditErrorKind::RuleFailed {
            rule_id: rule_id.into(),
            reason: reason.into(),
        })
    }

    /// Get the error kind.
    pub fn kind(&self) -> &AuditErrorKind {
        &self.kind
    }
}

impl<T> From<T> for AuditError
where
    T: Into<AuditErrorKind>,
{
    #[track_caller]
    fn from(err: T) -> Self {
        Self::new(err.into())
    }
}

/// Result type for audit operations.
pub type AuditResult<T> = Result<T, AuditError>;
