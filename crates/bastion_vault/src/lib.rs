//! Credential vault for the Bastion security gateway.
//!
//! The vault seals third-party secrets with the encryption provider, persists
//! them through the security store and releases them only after checking that
//! the credential is active, unexpired and allowed for the caller's source IP
//! and target host. Each release attempt records exactly one security event.

#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod access;
mod request;
mod secret;
mod vault;

pub use access::{CredentialAccess, GrantedCredential};
pub use request::{NewCredential, NewCredentialBuilder, NewCredentialBuilderError};
pub use secret::SecretValue;
pub use vault::CredentialVault;
