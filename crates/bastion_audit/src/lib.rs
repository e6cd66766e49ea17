//! Compliance auditor for the Bastion security gateway.
//!
//! An audit captures an [`AuditState`] snapshot (key file, credentials,
//! persisted rate-limit rules, recent event volume) and evaluates every
//! registered [`ComplianceRule`] against it. Each rule yields one finding.
//! The audit is compliant when at least 90% of the rules pass.

#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod auditor;
mod rule;
mod state;

pub use auditor::Auditor;
pub use rule::{
    ApiKeyRotation, ComplianceRule, CredentialExpiryHygiene, EncryptionAtRest, LoggingEnabled,
    PrivilegedAccessRestriction, RateLimitConfiguration, builtin_rules,
};
pub use state::{AuditState, AuditStateBuilder, AuditStateBuilderError};
