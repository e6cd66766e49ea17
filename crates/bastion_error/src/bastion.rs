//! Crate-level error umbrella.

use crate::{
    AuditError, ConfigError, CryptoError, GatewayError, RateLimitError, StorageError, VaultError,
};

/// Crate-level error variants.
#[derive(Debug, derive_more::From)]
pub enum BastionErrorKind {
    /// Configuration error
    Config(ConfigError),
    /// Encryption error
    Crypto(CryptoError),
    /// Storage error
    Storage(StorageError),
    /// Vault error
    Vault(VaultError),
    /// Rate limiter error
    RateLimit(RateLimitError),
    /// Audit error
    Audit(AuditError),
    /// Gateway error
    Gateway(GatewayError),
}

impl std::fmt::Display for BastionErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BastionErrorKind::Config(e) => write!(f, "{}", e),
            BastionErrorKind::Crypto(e) => write!(f, "{}", e),
            BastionErrorKind::Storage(e) => write!(f, "{}", e),
            BastionErrorKind::Vault(e) => write!(f, "{}", e),
            BastionErrorKind::RateLimit(e) => write!(f, "{}", e),
            BastionErrorKind::Audit(e) => write!(f, "{}", e),
            BastionErrorKind::Gateway(e) => write!(f, "{}", e),
        }
    }
}

/// Bastion error with kind discrimination.
#[derive(Debug)]
pub struct BastionError(Box<BastionErrorKind>);

impl BastionError {
    /// Create a new error from a kind.
    pub fn new(kind: BastionErrorKind) -> Self {
        Self(Box::new(kind))
    }

    /// Get the error kind.
    pub fn kind(&self) -> &BastionErrorKind {
        &self.0
    }
}

impl std::fmt::Display for BastionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Bastion Error: {}", self.0)
    }
}

impl std::error::Error for BastionError {}

// Generic From implementation for any type that converts to BastionErrorKind
impl<T> From<T> for BastionError
where
    T: Into<BastionErrorKind>,
{
    fn from(err: T) -> Self {
        Self::new(err.into())
    }
}

/// Result type for Bastion operations.
pub type BastionResult<T> = std::result::Result<T, BastionError>;
