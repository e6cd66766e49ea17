//! Credential creation request.

use crate::SecretValue;
use bastion_core::AccessLevel;
use chrono::{DateTime, Utc};
use derive_getters::Getters;
use std::collections::BTreeSet;

/// Everything needed to store a new credential.
///
/// # Examples
///
/// ```
/// use bastion_core::AccessLevel;
/// use bastion_vault::NewCredentialBuilder;
///
/// let request = NewCredentialBuilder::default()
///     .service_name("openai")
///     .secret("sk-live-123")
///     .access_level(AccessLevel::ReadWrite)
///     .build()
///     .unwrap();
/// assert_eq!(request.credential_type(), "api_key");
/// ```
#[derive(Debug, Clone, Getters, derive_builder::Builder)]
#[builder(setter(into), build_fn(validate = "Self::validate"))]
pub struct NewCredential {
    /// Upstream service
    service_name: String,
    /// Kind of secret
    #[builder(default = "\"api_key\".to_string()")]
    credential_type: String,
    /// Plaintext to seal
    secret: SecretValue,
    /// Privilege tier
    #[builder(default = "AccessLevel::ReadOnly")]
    access_level: AccessLevel,
    /// Hard expiry
    #[builder(default, setter(into, strip_option))]
    expires_at: Option<DateTime<Utc>>,
    /// Allowed source IPs; empty means any
    #[builder(default)]
    allowed_ips: BTreeSet<String>,
    /// Allowed upstream hosts; empty means any
    #[builder(default)]
    allowed_domains: BTreeSet<String>,
    /// Rate-limit profile name
    #[builder(default = "\"default\".to_string()")]
    rate_limit_profile: String,
}

impl NewCredentialBuilder {
    fn validate(&self) -> Result<(), String> {
        if self.service_name.as_ref().is_some_and(|s| s.trim().is_empty()) {
            return Err("service_name must not be empty".to_string());
        }
        if self.secret.as_ref().is_some_and(SecretValue::is_empty) {
            return Err("secret must not be empty".to_string());
        }
        Ok(())
    }

    /// Restrict the credential to the given source IPs.
    pub fn allow_ips<I, S>(&mut self, ips: I) -> &mut Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.allowed_ips = Some(ips.into_iter().map(Into::into).collect());
        self
    }

    /// Restrict the credential to the given upstream domains.
    pub fn allow_domains<I, S>(&mut self, domains: I) -> &mut Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.allowed_domains = Some(domains.into_iter().map(Into::into).collect());
        self
    }
}

impl NewCredential {
    pub(crate) fn into_parts(self) -> (SecretValue, NewCredentialMeta) {
        (
            self.secret,
            NewCredentialMeta {
                service_name: self.service_name,
                credential_type: self.credential_type,
                access_level: self.access_level,
                expires_at: self.expires_at,
                allowed_ips: self.allowed_ips,
                allowed_domains: self.allowed_domains,
                rate_limit_profile: self.rate_limit_profile,
            },
        )
    }
}

pub(crate) struct NewCredentialMeta {
    pub(crate) service_name: String,
    pub(crate) credential_type: String,
    pub(crate) access_level: AccessLevel,
    pub(crate) expires_at: Option<DateTime<Utc>>,
    pub(crate) allowed_ips: BTreeSet<String>,
    pub(crate) allowed_domains: BTreeSet<String>,
    pub(crate) rate_limit_profile: String,
}
