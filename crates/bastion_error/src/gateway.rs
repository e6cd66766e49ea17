//! Security gateway error types.
//!
//! The gateway is the only layer that turns expected outcomes (denied
//! credentials, exhausted rate limits) into errors, because its callers need a
//! single failure channel. Credential failures render identically for
//! not-found, IP-denied and domain-denied cases so that callers cannot probe
//! which credential ids exist; the precise reason lives in the security event.

use crate::{RateLimitError, StorageError, VaultError};
use std::time::Duration;

/// Why a credential could not be released.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CredentialDenial {
    /// No active credential with that id
    NotFound,
    /// The credential is past its expiry
    Expired,
    /// The caller's source IP is outside the credential's allow-list
    AccessDenied {
        /// Source IP that was refused
        source_ip: String,
    },
    /// The target host is outside the credential's domain allow-list
    DomainDenied {
        /// Host that was refused
        host: String,
    },
}

impl std::fmt::Display for CredentialDenial {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CredentialDenial::Expired => write!(f, "Credential expired"),
            CredentialDenial::NotFound
            | CredentialDenial::AccessDenied { .. }
            | CredentialDenial::DomainDenied { .. } => write!(f, "Credential unavailable"),
        }
    }
}

/// Kinds of gateway errors.
#[derive(Debug, Clone, derive_more::Display)]
pub enum GatewayErrorKind {
    /// The credential could not be released to this caller
    #[display("{_0}")]
    CredentialDenied(CredentialDenial),
    /// The caller exhausted a rate-limit window
    #[display("Rate limit exceeded ({}), retry after {}s", exceeded.join(", "), retry_after.as_secs())]
    RateLimited {
        /// How long the caller should wait
        retry_after: Duration,
        /// Windows that were exhausted (`minute`, `hour`, `day`, `burst`)
        exceeded: Vec<String>,
    },
    /// The outbound call did not complete within the configured timeout
    #[display("Outbound request timed out after {}s", _0.as_secs())]
    Timeout(Duration),
    /// The outbound call failed at the network layer (message is redacted)
    #[display("Outbound request failed: {_0}")]
    Transport(String),
    /// The request itself was malformed (bad URL, bad method, bad header)
    #[display("Invalid request: {_0}")]
    InvalidRequest(String),
    /// Fatal vault fault, including decryption failure
    #[display("{_0}")]
    Vault(VaultError),
    /// Fatal storage fault
    #[display("{_0}")]
    Storage(StorageError),
    /// Fatal rate limiter fault
    #[display("{_0}")]
    RateLimit(RateLimitError),
}

impl From<VaultError> for GatewayErrorKind {
    fn from(err: VaultError) -> Self {
        Self::Vault(err)
    }
}

impl From<StorageError> for GatewayErrorKind {
    fn from(err: StorageError) -> Self {
        Self::Storage(err)
    }
}

impl From<RateLimitError> for GatewayErrorKind {
    fn from(err: RateLimitError) -> Self {
        Self::RateLimit(err)
    }
}

impl From<CredentialDenial> for GatewayErrorKind {
    fn from(denial: CredentialDenial) -> Self {
        Self::CredentialDenied(denial)
    }
}

/// Gateway error with location tracking.
///
/// # Examples
///
/// ```
/// use bastion_error::{CredentialDenial, GatewayError, GatewayErrorKind};
///
/// let missing = GatewayError::new(GatewayErrorKind::CredentialDenied(CredentialDenial::NotFound));
/// let denied = GatewayError::new(GatewayErrorKind::CredentialDenied(
///     CredentialDenial::AccessDenied { source_ip: "10.0.0.9".into() },
/// ));
/// assert_eq!(missing.external_message(), denied.external_message());
/// ```
#[derive(Debug, Clone, derive_more::Display, derive_more::Error)]
#[display("Gateway Error: {} at line {} in {}", kind, line, file)]
pub struct GatewayError {
    kind: GatewayErrorKind,
    line: u32,
    file: &'static str,
}

impl GatewayError {
    /// Create a new gateway error with automatic location tracking.
    #[track_caller]
    pub fn new(kind: GatewayErrorKind) -> Self {
        let location = std::panic::Location::caller();
        Self {
            kind,
            line: location.line(),
            file: location.file(),
        }
    }

    /// Get the error kind.
    pub fn kind(&self) -> &GatewayErrorKind {
        &self.kind
    }

    /// Message safe to hand to an external caller.
    pub fn external_message(&self) -> String {
        match &self.kind {
            GatewayErrorKind::CredentialDenied(denial) => denial.to_string(),
            GatewayErrorKind::RateLimited { retry_after, .. } => format!(
                "Rate limit exceeded, retry after {}s",
                retry_after.as_secs()
            ),
            GatewayErrorKind::Timeout(_) => "Upstream request timed out".to_string(),
            GatewayErrorKind::Transport(_) => "Upstream request failed".to_string(),
            GatewayErrorKind::InvalidRequest(msg) => format!("Invalid request: {}", msg),
            GatewayErrorKind::Vault(_)
            | GatewayErrorKind::Storage(_)
            | GatewayErrorKind::RateLimit(_) => "Internal security gateway error".to_string(),
        }
    }

    /// Retry hint for rate-limited callers.
    pub fn retry_after(&self) -> Option<Duration> {
        match &self.kind {
            GatewayErrorKind::RateLimited { retry_after, .. } => Some(*retry_after),
            _ => None,
        }
    }

    /// Whether the error indicates an infrastructure fault rather than a refusal.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self.kind,
            GatewayErrorKind::Vault(_) | GatewayErrorKind::Storage(_) | GatewayErrorKind::RateLimit(_)
        )
    }
}

impl<T> From<T> for GatewayError
where
    T: Into<GatewayErrorKind>,
{
    #[track_caller]
    fn from(err: T) -> Self {
        Self::new(err.into())
    }
}

/// Result type for gateway operations.
pub type GatewayResult<T> = Result<T, GatewayError>;
