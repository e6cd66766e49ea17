//! Compliance auditor tests.

use bastion_audit::*;
use bastion_core::*;
use bastion_crypto::EncryptionProvider;
use bastion_error::{AuditError, AuditResult};
use bastion_storage::{InMemoryStore, SecurityStore};
use chrono::{DateTime, TimeDelta, Utc};
use std::sync::Arc;

fn credential(id: &str, service: &str, created_at: DateTime<Utc>) -> Credential {
    CredentialBuilder::default()
        .id(id)
        .service_name(service)
        .credential_type("api_key")
        .encrypted_value("c2VhbGVk")
        .created_at(created_at)
        .access_level(AccessLevel::ReadOnly)
        .build()
        .unwrap()
}

async fn record_event(store: &InMemoryStore, at: DateTime<Utc>) {
    let event = SecurityEvent::from_draft(
        EventDraft::new(EventType::ApiRequest, ThreatLevel::Info, "10.0.0.1"),
        format!("evt-{}", at.timestamp_micros()),
        at,
        0.1,
    );
    store.append_events(&[event]).await.unwrap();
}

/// Store with a secure key file, a fresh credential, a rule for its service
/// and recent events: every built-in rule passes.
async fn compliant_setup(dir: &tempfile::TempDir) -> (InMemoryStore, Auditor) {
    let store = InMemoryStore::new();
    let config = BastionConfig::default();
    let encryption = EncryptionConfig::default().with_key_file(dir.path().join("master.key"));
    let crypto = Arc::new(EncryptionProvider::open(&encryption, "correct horse").unwrap());

    let now = Utc::now();
    store
        .insert_credential(&credential("fresh", "openai", now - TimeDelta::days(2)))
        .await
        .unwrap();
    store
        .replace_rate_limit_rules(&[RateLimitRule::new("openai").with_requests_per_minute(60)])
        .await
        .unwrap();
    record_event(&store, now - TimeDelta::minutes(5)).await;

    let auditor = Auditor::new(Arc::new(store.clone()), crypto, &config);
    (store, auditor)
}

// ============================================================================
// Scoring
// ============================================================================

#[cfg(unix)]
#[tokio::test]
async fn test_clean_state_is_compliant() {
    let dir = tempfile::tempdir().unwrap();
    let (_store, auditor) = compliant_setup(&dir).await;

    let audit = auditor.run_audit("manual").await.unwrap();
    assert_eq!(*audit.status(), AuditStatus::Compliant);
    assert_eq!(*audit.compliance_score(), 1.0);
    assert_eq!(*audit.risk_score(), 0.0);
    assert_eq!(audit.findings().len(), 6);
    assert!(audit.recommendations().is_empty());
}

#[cfg(unix)]
#[tokio::test]
async fn test_stale_credential_fails_rotation_rule() {
    let dir = tempfile::tempdir().unwrap();
    let (store, auditor) = compliant_setup(&dir).await;
    store
        .insert_credential(&credential("stale", "openai", Utc::now() - TimeDelta::days(31)))
        .await
        .unwrap();

    let audit = auditor.run_audit("scheduled").await.unwrap();
    let rotation = audit.finding("api_key_rotation").unwrap();
    assert_eq!(*rotation.status(), FindingStatus::NonCompliant);
    assert_eq!(rotation.details().len(), 1);
    assert!(rotation.details()[0].contains("stale"));

    let expected = 5.0 / 6.0;
    assert!((audit.compliance_score() - expected).abs() < 1e-9);
    assert!((audit.risk_score() - (1.0 - expected)).abs() < 1e-9);
    assert_eq!(*audit.status(), AuditStatus::NonCompliant);
    assert_eq!(audit.recommendations(), &vec!["Rotate the listed credentials".to_string()]);
}

#[tokio::test]
async fn test_ephemeral_key_and_silent_pipeline_are_flagged() {
    let store = InMemoryStore::new();
    let auditor = Auditor::new(
        Arc::new(store.clone()),
        Arc::new(EncryptionProvider::ephemeral()),
        &BastionConfig::default(),
    );
    let audit = auditor.run_audit("manual").await.unwrap();

    let failed: Vec<&str> = audit.failures().map(|f| f.rule_id().as_str()).collect();
    assert_eq!(failed, vec!["encryption_at_rest", "logging_enabled"]);
    assert_eq!(
        *audit.finding("encryption_at_rest").unwrap().severity(),
        Severity::Critical
    );
}

#[tokio::test]
async fn test_unconfigured_service_and_expired_credential() {
    let store = InMemoryStore::new();
    let now = Utc::now();
    let expired = CredentialBuilder::default()
        .id("expired")
        .service_name("github")
        .credential_type("api_key")
        .encrypted_value("c2VhbGVk")
        .created_at(now - TimeDelta::days(1))
        .expires_at(Some(now - TimeDelta::hours(3)))
        .access_level(AccessLevel::ReadOnly)
        .build()
        .unwrap();
    store.insert_credential(&expired).await.unwrap();
    record_event(&store, now).await;

    let auditor = Auditor::new(
        Arc::new(store.clone()),
        Arc::new(EncryptionProvider::ephemeral()),
        &BastionConfig::default(),
    );
    let audit = auditor.run_audit("manual").await.unwrap();

    let rate = audit.finding("rate_limit_configuration").unwrap();
    assert_eq!(rate.details(), &vec!["service github has no rate-limit rule".to_string()]);
    let hygiene = audit.finding("credential_expiry_hygiene").unwrap();
    assert!(!hygiene.passed());
    assert!(hygiene.details()[0].contains("expired 3 hours ago"));
}

// ============================================================================
// Failure isolation
// ============================================================================

#[derive(Debug)]
struct BrokenRule;

impl ComplianceRule for BrokenRule {
    fn id(&self) -> &str {
        "broken"
    }

    fn description(&self) -> &str {
        "Always fails to evaluate"
    }

    fn severity(&self) -> Severity {
        Severity::Medium
    }

    fn recommendation(&self) -> &str {
        "n/a"
    }

    fn check(&self, _state: &AuditState) -> AuditResult<Vec<String>> {
        Err(AuditError::rule_failed("broken", "backend unreachable"))
    }
}

#[tokio::test]
async fn test_rule_error_becomes_error_finding() {
    let store = InMemoryStore::new();
    let auditor = Auditor::new(
        Arc::new(store.clone()),
        Arc::new(EncryptionProvider::ephemeral()),
        &BastionConfig::default(),
    )
    .with_rule(Box::new(BrokenRule));

    let audit = auditor.run_audit("manual").await.unwrap();
    assert_eq!(audit.findings().len(), 7);
    let broken = audit.finding("broken").unwrap();
    assert_eq!(*broken.severity(), Severity::Error);
    assert_eq!(*broken.status(), FindingStatus::Error);
    assert!(broken.details()[0].contains("backend unreachable"));
    assert!(audit.finding("credential_expiry_hygiene").is_some());
}

// ============================================================================
// Persistence and scheduling
// ============================================================================

#[tokio::test]
async fn test_rerun_is_idempotent() {
    let store = InMemoryStore::new();
    let now = Utc::now();
    store
        .insert_credential(&credential("stale", "openai", now - TimeDelta::days(45)))
        .await
        .unwrap();
    record_event(&store, now).await;
    let auditor = Auditor::new(
        Arc::new(store.clone()),
        Arc::new(EncryptionProvider::ephemeral()),
        &BastionConfig::default(),
    );

    let first = auditor.run_audit("manual").await.unwrap();
    let second = auditor.run_audit("manual").await.unwrap();
    assert_ne!(first.audit_id(), second.audit_id());
    assert_eq!(first.compliance_score(), second.compliance_score());
    assert_eq!(first.findings(), second.findings());
    assert_eq!(store.event_count().await, 1);
    assert_eq!(auditor.history().await.unwrap().len(), 2);
}

#[tokio::test]
async fn test_next_audit_due_follows_interval() {
    let store = InMemoryStore::new();
    let config = BastionConfig::default().with_audit_interval_days(7u32);
    let auditor = Auditor::new(
        Arc::new(store.clone()),
        Arc::new(EncryptionProvider::ephemeral()),
        &config,
    );

    let now = Utc::now();
    assert!(auditor.is_audit_due(now).await.unwrap());

    let audit = auditor.run_audit_at("scheduled", now).await.unwrap();
    let completed = audit.completed_at().unwrap();
    assert_eq!(*audit.next_audit_due(), completed + TimeDelta::days(7));

    assert!(!auditor.is_audit_due(now + TimeDelta::days(6)).await.unwrap());
    assert!(auditor.is_audit_due(now + TimeDelta::days(8)).await.unwrap());
    assert_eq!(
        auditor.latest().await.unwrap().map(|a| a.audit_id().clone()),
        Some(audit.audit_id().clone())
    );
}
