//! Diesel rows for the security tables.

use bastion_core::{
    AccessLevel, Credential, CredentialBuilder, EventType, RateLimitRule, SecurityAudit,
    SecurityEvent, SecurityEventBuilder, ThreatLevel,
};
use bastion_error::{StorageError, StorageErrorKind, StorageResult};
use chrono::{DateTime, Utc};
use derive_builder::Builder;
use diesel::prelude::*;
use std::collections::BTreeSet;

fn corrupt(message: impl std::fmt::Display) -> StorageError {
    StorageError::new(StorageErrorKind::Corrupt(message.to_string()))
}

/// Row of the `credentials` table.
#[derive(Debug, Clone, Queryable, Selectable, Insertable, AsChangeset, Identifiable)]
#[diesel(table_name = crate::schema::credentials)]
#[diesel(treat_none_as_null = true)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct CredentialRow {
    /// Credential id
    pub id: String,
    /// Upstream service
    pub service_name: String,
    /// Secret kind
    pub credential_type: String,
    /// Base64 ciphertext
    pub encrypted_value: String,
    /// Creation time
    pub created_at: DateTime<Utc>,
    /// Hard expiry
    pub expires_at: Option<DateTime<Utc>>,
    /// Last release
    pub last_used: Option<DateTime<Utc>>,
    /// Release count
    pub usage_count: i64,
    /// Privilege tier (snake_case)
    pub access_level: String,
    /// JSON array of allowed source IPs
    pub allowed_ips: serde_json::Value,
    /// JSON array of allowed hosts
    pub allowed_domains: serde_json::Value,
    /// Rate-limit profile name
    pub rate_limit_profile: String,
    /// Soft-delete flag
    pub active: bool,
    /// Rotation demanded
    pub rotation_required: bool,
    /// Last rotation
    pub rotated_at: Option<DateTime<Utc>>,
}

impl TryFrom<&Credential> for CredentialRow {
    type Error = StorageError;

    fn try_from(credential: &Credential) -> StorageResult<Self> {
        Ok(Self {
            id: credential.id().clone(),
            service_name: credential.service_name().clone(),
            credential_type: credential.credential_type().clone(),
            encrypted_value: credential.encrypted_value().clone(),
            created_at: *credential.created_at(),
            expires_at: *credential.expires_at(),
            last_used: *credential.last_used(),
            usage_count: i64::try_from(*credential.usage_count()).unwrap_or(i64::MAX),
            access_level: credential.access_level().to_string(),
            allowed_ips: serde_json::to_value(credential.allowed_ips())?,
            allowed_domains: serde_json::to_value(credential.allowed_domains())?,
            rate_limit_profile: credential.rate_limit_profile().clone(),
            active: *credential.active(),
            rotation_required: *credential.rotation_required(),
            rotated_at: *credential.rotated_at(),
        })
    }
}

impl TryFrom<CredentialRow> for Credential {
    type Error = StorageError;

    fn try_from(row: CredentialRow) -> StorageResult<Self> {
        let access_level: AccessLevel = row
            .access_level
            .parse()
            .map_err(|_| corrupt(format!("credential {}: bad access level", row.id)))?;
        let allowed_ips: BTreeSet<String> = serde_json::from_value(row.allowed_ips)?;
        let allowed_domains: BTreeSet<String> = serde_json::from_value(row.allowed_domains)?;
        let usage_count = u64::try_from(row.usage_count)
            .map_err(|_| corrupt(format!("credential {}: negative usage count", row.id)))?;

        CredentialBuilder::default()
            .id(row.id)
            .service_name(row.service_name)
            .credential_type(row.credential_type)
            .encrypted_value(row.encrypted_value)
            .created_at(row.created_at)
            .expires_at(row.expires_at)
            .last_used(row.last_used)
            .usage_count(usage_count)
            .access_level(access_level)
            .allowed_ips(allowed_ips)
            .allowed_domains(allowed_domains)
            .rate_limit_profile(row.rate_limit_profile)
            .active(row.active)
            .rotation_required(row.rotation_required)
            .rotated_at(row.rotated_at)
            .build()
            .map_err(corrupt)
    }
}

/// Row of the `security_events` table.
#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = crate::schema::security_events)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct EventRow {
    /// Insertion sequence
    pub seq: i64,
    /// Event id
    pub id: String,
    /// Event type string
    pub event_type: String,
    /// Threat level string
    pub threat_level: String,
    /// Event timestamp
    pub occurred_at: DateTime<Utc>,
    /// Caller address
    pub source_ip: String,
    /// Endpoint
    pub endpoint: String,
    /// Credential involved
    pub credential_id: Option<String>,
    /// Response code
    pub response_code: Option<i32>,
    /// Redacted error text
    pub error_message: Option<String>,
    /// Risk score
    pub risk_score: f64,
    /// Action taken
    pub action_taken: String,
    /// Metadata object
    pub metadata: serde_json::Value,
}

/// Insertable event row.
#[derive(Debug, Clone, Insertable, Builder)]
#[diesel(table_name = crate::schema::security_events)]
#[builder(setter(into))]
pub struct NewEventRow {
    /// Event id
    pub id: String,
    /// Event type string
    pub event_type: String,
    /// Threat level string
    pub threat_level: String,
    /// Event timestamp
    pub occurred_at: DateTime<Utc>,
    /// Caller address
    pub source_ip: String,
    /// Endpoint
    #[builder(default)]
    pub endpoint: String,
    /// Credential involved
    #[builder(default)]
    pub credential_id: Option<String>,
    /// Response code
    #[builder(default)]
    pub response_code: Option<i32>,
    /// Redacted error text
    #[builder(default)]
    pub error_message: Option<String>,
    /// Risk score
    pub risk_score: f64,
    /// Action taken
    pub action_taken: String,
    /// Metadata object
    pub metadata: serde_json::Value,
}

impl TryFrom<&SecurityEvent> for NewEventRow {
    type Error = StorageError;

    fn try_from(event: &SecurityEvent) -> StorageResult<Self> {
        NewEventRowBuilder::default()
            .id(event.id().clone())
            .event_type(event.event_type().to_string())
            .threat_level(event.threat_level().to_string())
            .occurred_at(*event.timestamp())
            .source_ip(event.source_ip().clone())
            .endpoint(event.endpoint().clone())
            .credential_id(event.credential_id().clone())
            .response_code(event.response_code().map(i32::from))
            .error_message(event.error_message().clone())
            .risk_score(*event.risk_score())
            .action_taken(event.action_taken().clone())
            .metadata(serde_json::Value::Object(event.metadata().clone()))
            .build()
            .map_err(|e| StorageError::new(StorageErrorKind::Serialization(e.to_string())))
    }
}

impl TryFrom<EventRow> for SecurityEvent {
    type Error = StorageError;

    fn try_from(row: EventRow) -> StorageResult<Self> {
        let threat_level: ThreatLevel = row
            .threat_level
            .parse()
            .map_err(|_| corrupt(format!("event {}: bad threat level", row.id)))?;
        let response_code = row
            .response_code
            .map(u16::try_from)
            .transpose()
            .map_err(|_| corrupt(format!("event {}: bad response code", row.id)))?;
        let metadata = match row.metadata {
            serde_json::Value::Object(map) => map,
            serde_json::Value::Null => serde_json::Map::new(),
            _ => return Err(corrupt(format!("event {}: metadata is not an object", row.id))),
        };

        SecurityEventBuilder::default()
            .id(row.id)
            .event_type(EventType::from(row.event_type))
            .threat_level(threat_level)
            .timestamp(row.occurred_at)
            .source_ip(row.source_ip)
            .endpoint(row.endpoint)
            .credential_id(row.credential_id)
            .response_code(response_code)
            .error_message(row.error_message)
            .risk_score(row.risk_score)
            .action_taken(row.action_taken)
            .metadata(metadata)
            .build()
            .map_err(corrupt)
    }
}

/// Row of the `rate_limit_rules` snapshot table.
#[derive(Debug, Clone, Queryable, Selectable, Insertable)]
#[diesel(table_name = crate::schema::rate_limit_rules)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct RuleRow {
    /// Position in the configured list
    pub position: i32,
    /// Service the rule applies to
    pub service_name: String,
    /// Serialized rule
    pub rule: serde_json::Value,
}

impl RuleRow {
    pub(crate) fn from_rule(position: usize, rule: &RateLimitRule) -> StorageResult<Self> {
        Ok(Self {
            position: i32::try_from(position)
                .map_err(|_| corrupt("too many rate-limit rules"))?,
            service_name: rule.service_name().clone(),
            rule: serde_json::to_value(rule)?,
        })
    }

    pub(crate) fn into_rule(self) -> StorageResult<RateLimitRule> {
        Ok(serde_json::from_value(self.rule)?)
    }
}

/// Row of the `security_audits` table.
#[derive(Debug, Clone, Queryable, Selectable, Insertable)]
#[diesel(table_name = crate::schema::security_audits)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct AuditRow {
    /// Audit id
    pub audit_id: String,
    /// Audit label
    pub audit_type: String,
    /// Start time
    pub started_at: DateTime<Utc>,
    /// Completion time
    pub completed_at: Option<DateTime<Utc>>,
    /// Status string
    pub status: String,
    /// Compliance score
    pub compliance_score: f64,
    /// Full serialized audit
    pub record: serde_json::Value,
}

impl TryFrom<&SecurityAudit> for AuditRow {
    type Error = StorageError;

    fn try_from(audit: &SecurityAudit) -> StorageResult<Self> {
        Ok(Self {
            audit_id: audit.audit_id().clone(),
            audit_type: audit.audit_type().clone(),
            started_at: *audit.started_at(),
            completed_at: *audit.completed_at(),
            status: audit.status().to_string(),
            compliance_score: *audit.compliance_score(),
            record: serde_json::to_value(audit)?,
        })
    }
}

impl TryFrom<AuditRow> for SecurityAudit {
    type Error = StorageError;

    fn try_from(row: AuditRow) -> StorageResult<Self> {
        Ok(serde_json::from_value(row.record)?)
    }
}
