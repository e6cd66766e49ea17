//! Storage trait.

use async_trait::async_trait;
use bastion_core::{Credential, RateLimitRule, SecurityAudit, SecurityEvent};
use bastion_error::StorageResult;
use chrono::{DateTime, Utc};

/// Durable state behind the gateway.
///
/// Credentials are never deleted, events are append-only apart from
/// retention purges, and audits are insert-only.
#[async_trait]
pub trait SecurityStore: Send + Sync + std::fmt::Debug {
    /// Persist a new credential. Fails if the id is taken.
    async fn insert_credential(&self, credential: &Credential) -> StorageResult<()>;

    /// Overwrite an existing credential. Fails if the id is unknown.
    async fn update_credential(&self, credential: &Credential) -> StorageResult<()>;

    /// Fetch a credential by id, active or not.
    async fn get_credential(&self, id: &str) -> StorageResult<Option<Credential>>;

    /// Every credential, ordered by creation time then id.
    async fn list_credentials(&self) -> StorageResult<Vec<Credential>>;

    /// Append events, preserving slice order.
    async fn append_events(&self, events: &[SecurityEvent]) -> StorageResult<()>;

    /// Events with `timestamp >= since`, in append order.
    async fn events_since(&self, since: DateTime<Utc>) -> StorageResult<Vec<SecurityEvent>>;

    /// Delete events with `timestamp < cutoff`. Returns how many were removed.
    async fn purge_events_before(&self, cutoff: DateTime<Utc>) -> StorageResult<usize>;

    /// Replace the persisted rate-limit rule snapshot.
    async fn replace_rate_limit_rules(&self, rules: &[RateLimitRule]) -> StorageResult<()>;

    /// Load the rate-limit rule snapshot in its original order.
    async fn load_rate_limit_rules(&self) -> StorageResult<Vec<RateLimitRule>>;

    /// Persist a finalized audit.
    async fn insert_audit(&self, audit: &SecurityAudit) -> StorageResult<()>;

    /// Most recently started audit.
    async fn latest_audit(&self) -> StorageResult<Option<SecurityAudit>>;

    /// Every audit, oldest first.
    async fn list_audits(&self) -> StorageResult<Vec<SecurityAudit>>;
}
