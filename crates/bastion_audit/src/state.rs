//! Read-only state snapshot evaluated by compliance rules.

use bastion_core::{Credential, RateLimitRule};
use bastion_crypto::KeyFileStatus;
use chrono::{DateTime, Utc};
use derive_getters::Getters;
use std::collections::BTreeSet;

/// Everything the compliance rules look at, captured once per audit.
#[derive(Debug, Clone, Getters, derive_builder::Builder)]
#[builder(setter(into))]
pub struct AuditState {
    /// Instant the snapshot represents
    now: DateTime<Utc>,
    /// Encryption key file state
    #[builder(default = "KeyFileStatus::none()")]
    key_file: KeyFileStatus,
    /// Every stored credential, active or retired
    #[builder(default)]
    credentials: Vec<Credential>,
    /// Persisted rate-limit rule snapshot
    #[builder(default)]
    rate_limit_rules: Vec<RateLimitRule>,
    /// Events recorded in the trailing 24 hours
    #[builder(default)]
    events_last_24h: usize,
    /// Maximum credential age before rotation is due
    #[builder(default = "30")]
    rotation_max_age_days: u32,
}

impl AuditState {
    /// Active credentials only.
    pub fn active_credentials(&self) -> impl Iterator<Item = &Credential> {
        self.credentials.iter().filter(|c| *c.active())
    }

    /// Services with at least one active credential.
    pub fn services_in_use(&self) -> BTreeSet<String> {
        self.active_credentials()
            .map(|c| c.service_name().clone())
            .collect()
    }
}
