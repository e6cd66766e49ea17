//! Credential vault error types.
//!
//! Only infrastructure faults live here. A missing, expired or IP-restricted
//! credential is an ordinary lookup outcome and never surfaces as a
//! [`VaultError`].

use crate::{CryptoError, StorageError};

/// Kinds of vault errors.
#[derive(Debug, Clone, derive_more::Display)]
pub enum VaultErrorKind {
    /// Encryption or decryption failed; decryption failures mean key or data corruption
    #[display("{_0}")]
    Crypto(CryptoError),
    /// The credential table could not be read or written
    #[display("{_0}")]
    Storage(StorageError),
    /// An administrative operation named a credential that does not exist
    #[display("Unknown credential: {_0}")]
    UnknownCredential(String),
    /// The credential payload was rejected before it was stored
    #[display("Invalid credential: {_0}")]
    InvalidCredential(String),
}

impl From<CryptoError> for VaultErrorKind {
    fn from(err: CryptoError) -> Self {
        Self::Crypto(err)
    }
}

impl From<StorageError> for VaultErrorKind {
    fn from(err: StorageError) -> Self {
        Self::Storage(err)
    }
}

/// Vault error with location tracking.
#[derive(Debug, Clone, derive_more::Display, derive_more::Error)]
#[display("Vault Error: {} at line {} in {}", kind, line, file)]
pub struct VaultError {
    kind: VaultErrorKind,
    line: u32,
    file: &'static str,
}

impl VaultError {
    /// Create a new vault error with automatic location tracking.
    #[track_caller]
    pub fn new(kind: VaultErrorKind) -> Self {
        let location = std::panic::Location::caller();
        Self {
            kind,
            line: location.line(),
            file: location.file(),
        }
    }

    /// Get the error kind.
    pub fn kind(&self) -> &VaultErrorKind {
        &self.kind
    }

    /// Whether the underlying fault is a failed decryption.
    pub fn is_decryption_failure(&self) -> bool {
        matches!(&self.kind, VaultErrorKind::Crypto(e) if e.is_decryption_failure())
    }
}

impl<T> From<T> for VaultError
where
    T: Into<VaultErrorKind>,
{
    #[track_caller]
    fn from(err: T) -> Self {
        Self::new(err.into())
    }
}

/// Result type for vault operations.
pub type VaultResult<T> = Result<T, VaultError>;
