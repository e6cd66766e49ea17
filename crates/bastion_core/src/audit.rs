//! Compliance audit records.

use crate::saturating_add;
use chrono::{DateTime, Utc};
use derive_getters::Getters;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Threshold at which an audit counts as compliant.
const COMPLIANT_THRESHOLD: f64 = 0.9;

/// Overall outcome of an audit.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum AuditStatus {
    /// Compliance score at or above the threshold
    Compliant,
    /// Compliance score below the threshold
    NonCompliant,
    /// Audit started but not finalized
    Pending,
    /// No rules were evaluated
    Unknown,
}

/// Severity attached to a compliance rule or finding.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Severity {
    /// Informational
    Low,
    /// Should be fixed
    Medium,
    /// Must be fixed soon
    High,
    /// Must be fixed now
    Critical,
    /// The check itself failed to run
    Error,
}

/// Result of one rule within an audit.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum FindingStatus {
    /// Rule passed
    Compliant,
    /// Rule failed
    NonCompliant,
    /// Rule could not be evaluated
    Error,
}

/// What one compliance rule concluded.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Getters)]
pub struct Finding {
    /// Rule id (e.g. `api_key_rotation`)
    rule_id: String,
    /// Rule description
    description: String,
    /// Severity of the rule, or `error` if the check failed
    severity: Severity,
    /// Outcome
    status: FindingStatus,
    /// Specifics, such as the offending credential ids
    details: Vec<String>,
    /// Remediation advice
    recommendations: Vec<String>,
}

impl Finding {
    /// Create a finding.
    pub fn new(
        rule_id: impl Into<String>,
        description: impl Into<String>,
        severity: Severity,
        status: FindingStatus,
        details: Vec<String>,
        recommendations: Vec<String>,
    ) -> Self {
        Self {
            rule_id: rule_id.into(),
            description: description.into(),
            severity,
            status,
            details,
            recommendations,
        }
    }

    /// Whether the rule passed.
    pub fn passed(&self) -> bool {
        self.status == FindingStatus::Compliant
    }
}

/// A scored compliance audit.
///
/// Created in the `pending` state by [`SecurityAudit::begin`] and sealed by
/// [`SecurityAudit::finalize`]; a finalized audit has no mutators.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Getters, derive_builder::Builder)]
#[builder(setter(into))]
pub struct SecurityAudit {
    /// Unique audit id
    audit_id: String,
    /// Caller-supplied audit label (e.g. `scheduled`, `manual`)
    audit_type: String,
    /// When evaluation began
    started_at: DateTime<Utc>,
    /// When evaluation finished
    #[builder(default)]
    completed_at: Option<DateTime<Utc>>,
    /// Overall outcome
    status: AuditStatus,
    /// One finding per evaluated rule
    #[builder(default)]
    findings: Vec<Finding>,
    /// De-duplicated remediation advice
    #[builder(default)]
    recommendations: Vec<String>,
    /// `1 - compliance_score`
    risk_score: f64,
    /// Passed rules over total rules
    compliance_score: f64,
    /// When the next audit should run
    next_audit_due: DateTime<Utc>,
}

impl SecurityAudit {
    /// Open a pending audit.
    pub fn begin(
        audit_id: impl Into<String>,
        audit_type: impl Into<String>,
        started_at: DateTime<Utc>,
    ) -> Self {
        Self {
            audit_id: audit_id.into(),
            audit_type: audit_type.into(),
            started_at,
            completed_at: None,
            status: AuditStatus::Pending,
            findings: Vec::new(),
            recommendations: Vec::new(),
            risk_score: 1.0,
            compliance_score: 0.0,
            next_audit_due: started_at,
        }
    }

    /// Score the findings and seal the audit.
    pub fn finalize(
        self,
        findings: Vec<Finding>,
        completed_at: DateTime<Utc>,
        audit_interval: Duration,
    ) -> Self {
        let total = findings.len();
        let passed = findings.iter().filter(|f| f.passed()).count();
        let (status, compliance_score) = if total == 0 {
            (AuditStatus::Unknown, 0.0)
        } else {
            let score = passed as f64 / total as f64;
            let status = if score >= COMPLIANT_THRESHOLD {
                AuditStatus::Compliant
            } else {
                AuditStatus::NonCompliant
            };
            (status, score)
        };

        let mut recommendations: Vec<String> = Vec::new();
        for finding in findings.iter().filter(|f| !f.passed()) {
            for rec in &finding.recommendations {
                if !recommendations.contains(rec) {
                    recommendations.push(rec.clone());
                }
            }
        }

        Self {
            completed_at: Some(completed_at),
            status,
            findings,
            recommendations,
            risk_score: 1.0 - compliance_score,
            compliance_score,
            next_audit_due: saturating_add(completed_at, audit_interval),
            ..self
        }
    }

    /// Findings for rules that did not pass.
    pub fn failures(&self) -> impl Iterator<Item = &Finding> {
        self.findings.iter().filter(|f| !f.passed())
    }

    /// Finding for a specific rule.
    pub fn finding(&self, rule_id: &str) -> Option<&Finding> {
        self.findings.iter().find(|f| f.rule_id == rule_id)
    }
}
