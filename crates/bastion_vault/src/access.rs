//! Outcome of a credential release attempt.

use crate::SecretValue;
use bastion_core::Credential;
use bastion_error::CredentialDenial;

/// A released credential and its plaintext.
#[derive(Debug, Clone)]
pub struct GrantedCredential {
    /// Stored record after the usage update
    pub credential: Credential,
    /// Decrypted value
    pub secret: SecretValue,
}

/// Result of [`CredentialVault::get`](crate::CredentialVault::get).
///
/// Denials are ordinary values; only infrastructure faults are errors.
#[derive(Debug, Clone)]
pub enum CredentialAccess {
    /// The caller may use the credential
    Granted(Box<GrantedCredential>),
    /// Unknown or deactivated credential
    NotFound,
    /// The credential is past its expiry
    Expired,
    /// Source IP outside the allow-list
    AccessDenied {
        /// Refused address
        source_ip: String,
    },
    /// Target host outside the domain allow-list
    DomainDenied {
        /// Refused host
        host: String,
    },
}

impl CredentialAccess {
    /// Whether the credential was released.
    pub fn is_granted(&self) -> bool {
        matches!(self, CredentialAccess::Granted(_))
    }

    /// Reason for a denial, if denied.
    pub fn denial(&self) -> Option<CredentialDenial> {
        match self {
            CredentialAccess::Granted(_) => None,
            CredentialAccess::NotFound => Some(CredentialDenial::NotFound),
            CredentialAccess::Expired => Some(CredentialDenial::Expired),
            CredentialAccess::AccessDenied { source_ip } => Some(CredentialDenial::AccessDenied {
                source_ip: source_ip.clone(),
            }),
            CredentialAccess::DomainDenied { host } => {
                Some(CredentialDenial::DomainDenied { host: host.clone() })
            }
        }
    }

    /// Split into the granted credential or the denial reason.
    pub fn into_result(self) -> Result<GrantedCredential, CredentialDenial> {
        match self {
            CredentialAccess::Granted(granted) => Ok(*granted),
            CredentialAccess::NotFound => Err(CredentialDenial::NotFound),
            CredentialAccess::Expired => Err(CredentialDenial::Expired),
            CredentialAccess::AccessDenied { source_ip } => {
                Err(CredentialDenial::AccessDenied { source_ip })
            }
            CredentialAccess::DomainDenied { host } => Err(CredentialDenial::DomainDenied { host }),
        }
    }
}
