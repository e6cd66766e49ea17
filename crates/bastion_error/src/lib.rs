//! Error types for the Bastion security gateway.
//!
//! Every component reports failures through a `*Error` struct that pairs a
//! `*ErrorKind` with the source location where the error was raised. Expected
//! outcomes such as a missing credential or a rate-limit rejection are not
//! errors at the component level; they only become [`GatewayError`] values at
//! the outer boundary.

#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod audit;
mod bastion;
mod config;
mod crypto;
mod gateway;
mod rate_limit;
mod storage;
mod vault;

pub use audit::{AuditError, AuditErrorKind, AuditResult};
pub use bastion::{BastionError, BastionErrorKind, BastionResult};
pub use config::ConfigError;
pub use crypto::{CryptoError, CryptoErrorKind, CryptoResult};
pub use gateway::{CredentialDenial, GatewayError, GatewayErrorKind, GatewayResult};
pub use rate_limit::{RateLimitError, RateLimitErrorKind, RateLimitResult};
pub use storage::{StorageError, StorageErrorKind, StorageResult};
pub use vault::{VaultError, VaultErrorKind, VaultResult};
