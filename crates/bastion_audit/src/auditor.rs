//! Compliance auditor.

use crate::{AuditState, AuditStateBuilder, ComplianceRule, builtin_rules};
use bastion_core::{BastionConfig, Finding, FindingStatus, SecurityAudit, Severity, saturating_sub};
use bastion_crypto::EncryptionProvider;
use bastion_error::{AuditError, AuditErrorKind, AuditResult};
use bastion_storage::SecurityStore;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

const LIVENESS_WINDOW: Duration = Duration::from_secs(24 * 60 * 60);

/// Runs the registered compliance rules against a snapshot of gateway state
/// and persists the scored result.
///
/// Audits only read state; running one records no security events.
#[derive(Debug)]
pub struct Auditor {
    rules: Vec<Box<dyn ComplianceRule>>,
    store: Arc<dyn SecurityStore>,
    crypto: Arc<EncryptionProvider>,
    rotation_max_age_days: u32,
    audit_interval: Duration,
}

impl Auditor {
    /// Auditor with the built-in rules.
    pub fn new(
        store: Arc<dyn SecurityStore>,
        crypto: Arc<EncryptionProvider>,
        config: &BastionConfig,
    ) -> Self {
        Self {
            rules: builtin_rules(),
            store,
            crypto,
            rotation_max_age_days: *config.rotation_max_age_days(),
            audit_interval: config.audit_interval(),
        }
    }

    /// Register an additional rule.
    pub fn with_rule(mut self, rule: Box<dyn ComplianceRule>) -> Self {
        self.rules.push(rule);
        self
    }

    /// Ids of the registered rules, in evaluation order.
    pub fn rule_ids(&self) -> Vec<String> {
        self.rules.iter().map(|r| r.id().to_string()).collect()
    }

    /// Capture the state the rules evaluate.
    pub async fn snapshot(&self, now: DateTime<Utc>) -> AuditResult<AuditState> {
        let credentials = self.store.list_credentials().await?;
        let rate_limit_rules = self.store.load_rate_limit_rules().await?;
        let events_last_24h = self
            .store
            .events_since(saturating_sub(now, LIVENESS_WINDOW))
            .await?
            .len();

        AuditStateBuilder::default()
            .now(now)
            .key_file(self.crypto.key_file_status())
            .credentials(credentials)
            .rate_limit_rules(rate_limit_rules)
            .events_last_24h(events_last_24h)
            .rotation_max_age_days(self.rotation_max_age_days)
            .build()
            .map_err(|e| AuditError::new(AuditErrorKind::Snapshot(e.to_string())))
    }

    /// Evaluate every rule. A rule that fails to run becomes an `error`
    /// finding; the remaining rules still run.
    pub fn evaluate(&self, state: &AuditState) -> Vec<Finding> {
        self.rules
            .iter()
            .map(|rule| match rule.check(state) {
                Ok(violations) if violations.is_empty() => {
                    debug!(rule = rule.id(), "Compliance rule passed");
                    Finding::new(
                        rule.id(),
                        rule.description(),
                        rule.severity(),
                        FindingStatus::Compliant,
                        Vec::new(),
                        Vec::new(),
                    )
                }
                Ok(violations) => {
                    debug!(rule = rule.id(), violations = violations.len(), "Compliance rule failed");
                    Finding::new(
                        rule.id(),
                        rule.description(),
                        rule.severity(),
                        FindingStatus::NonCompliant,
                        violations,
                        vec![rule.recommendation().to_string()],
                    )
                }
                Err(e) => {
                    warn!(rule = rule.id(), error = %e, "Compliance check could not run");
                    Finding::new(
                        rule.id(),
                        rule.description(),
                        Severity::Error,
                        FindingStatus::Error,
                        vec![e.kind().to_string()],
                        vec![format!("Investigate why the {} check failed", rule.id())],
                    )
                }
            })
            .collect()
    }

    /// Run and persist an audit.
    pub async fn run_audit(&self, audit_type: &str) -> AuditResult<SecurityAudit> {
        self.run_audit_at(audit_type, Utc::now()).await
    }

    /// Run and persist an audit as of `now`.
    #[instrument(skip(self))]
    pub async fn run_audit_at(
        &self,
        audit_type: &str,
        now: DateTime<Utc>,
    ) -> AuditResult<SecurityAudit> {
        let audit = SecurityAudit::begin(uuid::Uuid::new_v4().to_string(), audit_type, now);
        let state = self.snapshot(now).await?;
        let findings = self.evaluate(&state);
        let audit = audit.finalize(findings, Utc::now().max(now), self.audit_interval);

        self.store.insert_audit(&audit).await?;
        info!(
            audit_id = %audit.audit_id(),
            status = %audit.status(),
            compliance_score = *audit.compliance_score(),
            "Compliance audit completed"
        );
        Ok(audit)
    }

    /// Most recent persisted audit.
    pub async fn latest(&self) -> AuditResult<Option<SecurityAudit>> {
        Ok(self.store.latest_audit().await?)
    }

    /// Every persisted audit, oldest first.
    pub async fn history(&self) -> AuditResult<Vec<SecurityAudit>> {
        Ok(self.store.list_audits().await?)
    }

    /// Whether the next scheduled audit is due at `now`. True when no audit
    /// has run yet.
    pub async fn is_audit_due(&self, now: DateTime<Utc>) -> AuditResult<bool> {
        Ok(self
            .latest()
            .await?
            .is_none_or(|audit| now >= *audit.next_audit_due()))
    }
}
