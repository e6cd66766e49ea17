//! In-process store.

use crate::SecurityStore;
use async_trait::async_trait;
use bastion_core::{Credential, RateLimitRule, SecurityAudit, SecurityEvent};
use bastion_error::{StorageError, StorageErrorKind, StorageResult};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

/// Store that keeps every table in memory.
///
/// Cloning shares the underlying tables. All data is lost when the last
/// clone is dropped.
#[derive(Debug, Clone, Default)]
pub struct InMemoryStore {
    credentials: Arc<RwLock<HashMap<String, Credential>>>,
    events: Arc<RwLock<Vec<SecurityEvent>>>,
    rules: Arc<RwLock<Vec<RateLimitRule>>>,
    audits: Arc<RwLock<Vec<SecurityAudit>>>,
}

impl InMemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of persisted events.
    pub async fn event_count(&self) -> usize {
        self.events.read().await.len()
    }
}

#[async_trait]
impl SecurityStore for InMemoryStore {
    async fn insert_credential(&self, credential: &Credential) -> StorageResult<()> {
        let mut credentials = self.credentials.write().await;
        if credentials.contains_key(credential.id()) {
            return Err(StorageError::new(StorageErrorKind::Query(format!(
                "Credential {} already exists",
                credential.id()
            ))));
        }
        credentials.insert(credential.id().clone(), credential.clone());
        Ok(())
    }

    async fn update_credential(&self, credential: &Credential) -> StorageResult<()> {
        let mut credentials = self.credentials.write().await;
        match credentials.get_mut(credential.id()) {
            Some(existing) => {
                *existing = credential.clone();
                Ok(())
            }
            None => Err(StorageError::new(StorageErrorKind::Query(format!(
                "Credential {} does not exist",
                credential.id()
            )))),
        }
    }

    async fn get_credential(&self, id: &str) -> StorageResult<Option<Credential>> {
        Ok(self.credentials.read().await.get(id).cloned())
    }

    async fn list_credentials(&self) -> StorageResult<Vec<Credential>> {
        let mut credentials: Vec<Credential> =
            self.credentials.read().await.values().cloned().collect();
        credentials.sort_by(|a, b| {
            a.created_at()
                .cmp(b.created_at())
                .then_with(|| a.id().cmp(b.id()))
        });
        Ok(credentials)
    }

    async fn append_events(&self, events: &[SecurityEvent]) -> StorageResult<()> {
        self.events.write().await.extend_from_slice(events);
        Ok(())
    }

    async fn events_since(&self, since: DateTime<Utc>) -> StorageResult<Vec<SecurityEvent>> {
        Ok(self
            .events
            .read()
            .await
            .iter()
            .filter(|event| *event.timestamp() >= since)
            .cloned()
            .collect())
    }

    async fn purge_events_before(&self, cutoff: DateTime<Utc>) -> StorageResult<usize> {
        let mut events = self.events.write().await;
        let before = events.len();
        events.retain(|event| *event.timestamp() >= cutoff);
        let removed = before - events.len();
        debug!(removed, "Purged events from memory");
        Ok(removed)
    }

    async fn replace_rate_limit_rules(&self, rules: &[RateLimitRule]) -> StorageResult<()> {
        *self.rules.write().await = rules.to_vec();
        Ok(())
    }

    async fn load_rate_limit_rules(&self) -> StorageResult<Vec<RateLimitRule>> {
        Ok(self.rules.read().await.clone())
    }

    async fn insert_audit(&self, audit: &SecurityAudit) -> StorageResult<()> {
        self.audits.write().await.push(audit.clone());
        Ok(())
    }

    async fn latest_audit(&self) -> StorageResult<Option<SecurityAudit>> {
        Ok(self
            .audits
            .read()
            .await
            .iter()
            .max_by_key(|audit| *audit.started_at())
            .cloned())
    }

    async fn list_audits(&self) -> StorageResult<Vec<SecurityAudit>> {
        Ok(self.audits.read().await.clone())
    }
}
