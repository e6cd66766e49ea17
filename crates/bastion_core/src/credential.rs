//! Stored credentials and their access metadata.

use chrono::{DateTime, TimeDelta, Utc};
use derive_getters::Getters;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Privilege tier attached to a credential.
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
    strum::EnumIter,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum AccessLevel {
    /// May only read from the upstream API
    ReadOnly,
    /// May read and write
    ReadWrite,
    /// Administrative access to the upstream account
    Admin,
    /// Unrestricted access, including account management
    SuperAdmin,
}

impl AccessLevel {
    /// Whether this tier should be fenced by an IP allow-list.
    pub fn is_privileged(self) -> bool {
        matches!(self, AccessLevel::Admin | AccessLevel::SuperAdmin)
    }
}

/// An encrypted third-party secret with its access policy and usage history.
///
/// The plaintext never lives on this type; `encrypted_value` holds the sealed
/// form produced by the encryption provider. Credentials are retired by
/// clearing `active` and are never physically removed.
#[derive(
    Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Getters, derive_builder::Builder,
)]
#[builder(setter(into))]
pub struct Credential {
    /// Unique credential id
    id: String,
    /// Upstream service this secret belongs to (e.g. `openai`)
    service_name: String,
    /// Kind of secret (`api_key`, `bearer_token`, ...)
    credential_type: String,
    /// Base64 ciphertext of the secret
    encrypted_value: String,
    /// When the credential was stored
    created_at: DateTime<Utc>,
    /// Hard expiry, if any
    #[builder(default)]
    expires_at: Option<DateTime<Utc>>,
    /// Last successful release
    #[builder(default)]
    last_used: Option<DateTime<Utc>>,
    /// Number of successful releases
    #[builder(default)]
    usage_count: u64,
    /// Privilege tier
    access_level: AccessLevel,
    /// Source IPs allowed to use the credential; empty means any
    #[builder(default)]
    allowed_ips: BTreeSet<String>,
    /// Upstream hosts the credential may be sent to; empty means any
    #[builder(default)]
    allowed_domains: BTreeSet<String>,
    /// Named rate-limit profile
    #[builder(default = "\"default\".to_string()")]
    rate_limit_profile: String,
    /// Soft-delete flag
    #[builder(default = "true")]
    active: bool,
    /// Set when an operator or audit demands rotation
    #[builder(default)]
    rotation_required: bool,
    /// Last time the secret value was replaced
    #[builder(default)]
    rotated_at: Option<DateTime<Utc>>,
}

impl Credential {
    /// Whether the credential is past its expiry at `now`.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|expires_at| now >= expires_at)
    }

    /// Whether `source_ip` passes the allow-list.
    pub fn permits_ip(&self, source_ip: &str) -> bool {
        self.allowed_ips.is_empty() || self.allowed_ips.contains(source_ip)
    }

    /// Whether the credential may be sent to `host`.
    ///
    /// A domain entry matches itself and any subdomain.
    pub fn permits_host(&self, host: &str) -> bool {
        if self.allowed_domains.is_empty() {
            return true;
        }
        let host = host.to_ascii_lowercase();
        self.allowed_domains.iter().any(|domain| {
            let domain = domain.to_ascii_lowercase();
            host == domain || host.ends_with(&format!(".{}", domain))
        })
    }

    /// Instant from which rotation age is measured.
    pub fn age_reference(&self) -> DateTime<Utc> {
        self.rotated_at.unwrap_or(self.created_at)
    }

    /// Whether the credential needs rotating at `now` given a maximum age.
    pub fn rotation_due_at(&self, now: DateTime<Utc>, max_age_days: u32) -> bool {
        self.rotation_required
            || now - self.age_reference() > TimeDelta::days(i64::from(max_age_days))
    }

    /// Record a successful release.
    pub fn record_use(&mut self, at: DateTime<Utc>) {
        self.usage_count = self.usage_count.saturating_add(1);
        self.last_used = Some(at);
    }

    /// Retire the credential. The record stays for audit history.
    pub fn deactivate(&mut self) {
        self.active = false;
    }

    /// Flag the credential for rotation.
    pub fn require_rotation(&mut self) {
        self.rotation_required = true;
    }

    /// Replace the sealed value after a rotation.
    pub fn replace_value(&mut self, encrypted_value: String, at: DateTime<Utc>) {
        self.encrypted_value = encrypted_value;
        self.rotated_at = Some(at);
        self.rotation_required = false;
    }

    /// Metadata view without the ciphertext.
    pub fn summary(&self) -> CredentialSummary {
        CredentialSummary {
            id: self.id.clone(),
            service_name: self.service_name.clone(),
            credential_type: self.credential_type.clone(),
            access_level: self.access_level,
            created_at: self.created_at,
            expires_at: self.expires_at,
            last_used: self.last_used,
            usage_count: self.usage_count,
            active: self.active,
            rotation_required: self.rotation_required,
            rotated_at: self.rotated_at,
        }
    }
}

/// Credential metadata safe to show on dashboards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Getters)]
pub struct CredentialSummary {
    id: String,
    service_name: String,
    credential_type: String,
    access_level: AccessLevel,
    created_at: DateTime<Utc>,
    expires_at: Option<DateTime<Utc>>,
    last_used: Option<DateTime<Utc>>,
    usage_count: u64,
    active: bool,
    rotation_required: bool,
    rotated_at: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn credential(created_at: DateTime<Utc>) -> Credential {
        CredentialBuilder::default()
            .id("cred-1")
            .service_name("openai")
            .credential_type("api_key")
            .encrypted_value("c2VhbGVk")
            .created_at(created_at)
            .access_level(AccessLevel::ReadOnly)
            .allowed_domains(BTreeSet::from(["openai.com".to_string()]))
            .build()
            .unwrap()
    }

    #[test]
    fn test_builder_defaults() {
        let cred = credential(Utc::now());
        assert!(*cred.active());
        assert_eq!(*cred.usage_count(), 0);
        assert_eq!(cred.rate_limit_profile(), "default");
        assert!(cred.permits_ip("203.0.113.7"));
    }

    #[test]
    fn test_expiry_is_inclusive() {
        let now = Utc::now();
        let mut cred = credential(now);
        cred.expires_at = Some(now);
        assert!(cred.is_expired_at(now));
        assert!(!cred.is_expired_at(now - TimeDelta::seconds(1)));
    }

    #[test]
    fn test_domain_allow_list_matches_subdomains() {
        let cred = credential(Utc::now());
        assert!(cred.permits_host("api.openai.com"));
        assert!(cred.permits_host("OpenAI.com"));
        assert!(!cred.permits_host("notopenai.com"));
    }

    #[test]
    fn test_rotation_age_uses_rotated_at() {
        let now = Utc::now();
        let mut cred = credential(now - TimeDelta::days(40));
        assert!(cred.rotation_due_at(now, 30));
        cred.replace_value("bmV3".to_string(), now - TimeDelta::days(2));
        assert!(!cred.rotation_due_at(now, 30));
        cred.require_rotation();
        assert!(cred.rotation_due_at(now, 30));
    }

    #[test]
    fn test_access_level_strings() {
        assert_eq!(AccessLevel::SuperAdmin.to_string(), "super_admin");
        assert_eq!("read_write".parse::<AccessLevel>().unwrap(), AccessLevel::ReadWrite);
        assert!(AccessLevel::Admin.is_privileged());
        assert!(!AccessLevel::ReadWrite.is_privileged());
    }
}
