//! Compliance rules.

use crate::AuditState;
use bastion_core::Severity;
use bastion_error::{AuditError, AuditResult};
use chrono::TimeDelta;
use std::collections::BTreeSet;

/// A single compliance check over an [`AuditState`].
///
/// `check` returns the violations it found; an empty list means the rule
/// passed. An `Err` means the check itself could not run and is recorded as an
/// `error` finding without stopping the other rules.
pub trait ComplianceRule: Send + Sync + std::fmt::Debug {
    /// Stable rule id.
    fn id(&self) -> &str;

    /// What the rule requires.
    fn description(&self) -> &str;

    /// Severity of a violation.
    fn severity(&self) -> Severity;

    /// Remediation advice attached to a failing finding.
    fn recommendation(&self) -> &str;

    /// Evaluate the rule.
    fn check(&self, state: &AuditState) -> AuditResult<Vec<String>>;
}

/// The built-in rule set, in evaluation order.
pub fn builtin_rules() -> Vec<Box<dyn ComplianceRule>> {
    vec![
        Box::new(EncryptionAtRest),
        Box::new(ApiKeyRotation),
        Box::new(LoggingEnabled),
        Box::new(RateLimitConfiguration),
        Box::new(PrivilegedAccessRestriction),
        Box::new(CredentialExpiryHygiene),
    ]
}

/// The encryption key file exists and is readable by its owner only.
#[derive(Debug, Clone, Copy, Default)]
pub struct EncryptionAtRest;

impl ComplianceRule for EncryptionAtRest {
    fn id(&self) -> &str {
        "encryption_at_rest"
    }

    fn description(&self) -> &str {
        "Credentials are encrypted with a key stored in an owner-only key file"
    }

    fn severity(&self) -> Severity {
        Severity::Critical
    }

    fn recommendation(&self) -> &str {
        "Configure a persistent key file and restrict it to mode 0600"
    }

    fn check(&self, state: &AuditState) -> AuditResult<Vec<String>> {
        let key_file = state.key_file();
        let Some(path) = key_file.path() else {
            return Ok(vec!["no encryption key file is configured".to_string()]);
        };
        let path = path.display();
        if !*key_file.exists() {
            Ok(vec![format!("key file {} does not exist", path)])
        } else if !*key_file.owner_only() {
            Ok(vec![format!("key file {} is accessible to group or others", path)])
        } else {
            Ok(Vec::new())
        }
    }
}

/// No active credential has gone unrotated past the maximum age.
#[derive(Debug, Clone, Copy, Default)]
pub struct ApiKeyRotation;

impl ComplianceRule for ApiKeyRotation {
    fn id(&self) -> &str {
        "api_key_rotation"
    }

    fn description(&self) -> &str {
        "Active credentials are rotated within the maximum credential age"
    }

    fn severity(&self) -> Severity {
        Severity::High
    }

    fn recommendation(&self) -> &str {
        "Rotate the listed credentials"
    }

    fn check(&self, state: &AuditState) -> AuditResult<Vec<String>> {
        let max_age = *state.rotation_max_age_days();
        if max_age == 0 {
            return Err(AuditError::rule_failed(
                self.id(),
                "rotation age threshold must be at least one day",
            ));
        }
        Ok(state
            .active_credentials()
            .filter(|c| c.rotation_due_at(*state.now(), max_age))
            .map(|c| {
                let age = (*state.now() - c.age_reference()).num_days();
                if *c.rotation_required() {
                    format!("credential {} ({}) is flagged for rotation", c.id(), c.service_name())
                } else {
                    format!(
                        "credential {} ({}) is {} days old",
                        c.id(),
                        c.service_name(),
                        age
                    )
                }
            })
            .collect())
    }
}

/// The event pipeline recorded something in the last day.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingEnabled;

impl ComplianceRule for LoggingEnabled {
    fn id(&self) -> &str {
        "logging_enabled"
    }

    fn description(&self) -> &str {
        "Security events were recorded in the last 24 hours"
    }

    fn severity(&self) -> Severity {
        Severity::Medium
    }

    fn recommendation(&self) -> &str {
        "Verify that the security event pipeline is running"
    }

    fn check(&self, state: &AuditState) -> AuditResult<Vec<String>> {
        if *state.events_last_24h() == 0 {
            Ok(vec!["no security events in the last 24 hours".to_string()])
        } else {
            Ok(Vec::new())
        }
    }
}

/// Every service with an active credential has a rate-limit rule.
#[derive(Debug, Clone, Copy, Default)]
pub struct RateLimitConfiguration;

impl ComplianceRule for RateLimitConfiguration {
    fn id(&self) -> &str {
        "rate_limit_configuration"
    }

    fn description(&self) -> &str {
        "Every service in use has a rate-limit rule"
    }

    fn severity(&self) -> Severity {
        Severity::Medium
    }

    fn recommendation(&self) -> &str {
        "Add rate-limit rules for the listed services"
    }

    fn check(&self, state: &AuditState) -> AuditResult<Vec<String>> {
        let configured: BTreeSet<&str> = state
            .rate_limit_rules()
            .iter()
            .filter(|r| !r.is_unbounded())
            .map(|r| r.service_name().as_str())
            .collect();
        Ok(state
            .services_in_use()
            .into_iter()
            .filter(|service| !configured.contains(service.as_str()))
            .map(|service| format!("service {} has no rate-limit rule", service))
            .collect())
    }
}

/// Admin-tier credentials carry an IP allow-list.
#[derive(Debug, Clone, Copy, Default)]
pub struct PrivilegedAccessRestriction;

impl ComplianceRule for PrivilegedAccessRestriction {
    fn id(&self) -> &str {
        "privileged_access_restriction"
    }

    fn description(&self) -> &str {
        "Admin and super-admin credentials are restricted to known source IPs"
    }

    fn severity(&self) -> Severity {
        Severity::High
    }

    fn recommendation(&self) -> &str {
        "Add an IP allow-list to privileged credentials"
    }

    fn check(&self, state: &AuditState) -> AuditResult<Vec<String>> {
        Ok(state
            .active_credentials()
            .filter(|c| c.access_level().is_privileged() && c.allowed_ips().is_empty())
            .map(|c| {
                format!(
                    "credential {} ({}) has {} access from any IP",
                    c.id(),
                    c.service_name(),
                    c.access_level()
                )
            })
            .collect())
    }
}

/// Expired credentials have been deactivated.
#[derive(Debug, Clone, Copy, Default)]
pub struct CredentialExpiryHygiene;

impl ComplianceRule for CredentialExpiryHygiene {
    fn id(&self) -> &str {
        "credential_expiry_hygiene"
    }

    fn description(&self) -> &str {
        "No active credential is past its expiry"
    }

    fn severity(&self) -> Severity {
        Severity::Low
    }

    fn recommendation(&self) -> &str {
        "Deactivate or replace expired credentials"
    }

    fn check(&self, state: &AuditState) -> AuditResult<Vec<String>> {
        Ok(state
            .active_credentials()
            .filter(|c| c.is_expired_at(*state.now()))
            .map(|c| {
                let overdue = c
                    .expires_at()
                    .map(|at| *state.now() - at)
                    .unwrap_or(TimeDelta::zero());
                format!(
                    "credential {} ({}) expired {} hours ago",
                    c.id(),
                    c.service_name(),
                    overdue.num_hours()
                )
            })
            .collect())
    }
}
