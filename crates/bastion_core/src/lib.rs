//! Core data types for the Bastion security gateway.
//!
//! This crate provides the data model shared by every gateway component:
//! credentials, security events, rate-limit rules and audits, together with
//! configuration loading, the advisory mitigation board, the IP reputation
//! extension point and tracing setup.

#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod audit;
mod config;
mod credential;
mod event;
mod mitigation;
pub mod observability;
mod reputation;
mod rule;

pub use audit::{
    AuditStatus, Finding, FindingStatus, SecurityAudit, SecurityAuditBuilder,
    SecurityAuditBuilderError, Severity,
};
pub use config::{
    BastionConfig, EncryptionConfig, HttpConfig, LogFormat, LoggingConfig, MIN_KDF_ITERATIONS,
    ServiceProfile, ThreatConfig,
};
pub use credential::{
    AccessLevel, Credential, CredentialBuilder, CredentialBuilderError, CredentialSummary,
};
pub use event::{
    EventDraft, EventType, SYSTEM_SOURCE_IP, SecurityEvent, SecurityEventBuilder,
    SecurityEventBuilderError, ThreatLevel,
};
pub use mitigation::{AdvisoryBlock, MitigationBoard, Tightening};
pub use reputation::{IpReputationChecker, Reputation, StaticIpReputation};
pub use rule::{RateLimitRule, Window};

use chrono::{DateTime, TimeDelta, Utc};
use std::time::Duration;

/// Add a std duration to a timestamp, saturating at the maximum representable instant.
pub fn saturating_add(at: DateTime<Utc>, duration: Duration) -> DateTime<Utc> {
    TimeDelta::from_std(duration)
        .ok()
        .and_then(|delta| at.checked_add_signed(delta))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

/// Subtract a std duration from a timestamp, saturating at the minimum representable instant.
pub fn saturating_sub(at: DateTime<Utc>, duration: Duration) -> DateTime<Utc> {
    TimeDelta::from_std(duration)
        .ok()
        .and_then(|delta| at.checked_sub_signed(delta))
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}
