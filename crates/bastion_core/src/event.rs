//! Security events and their classification.

use chrono::{DateTime, Utc};
use derive_getters::Getters;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};

/// Source address recorded for events the gateway raises on its own behalf.
pub const SYSTEM_SOURCE_IP: &str = "127.0.0.1";

/// Discrete severity of a security event.
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
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ThreatLevel {
    /// Routine activity
    Info,
    /// Unusual but expected failures
    Warning,
    /// Policy was enforced against the caller
    Moderate,
    /// Likely hostile activity
    High,
    /// Confirmed hostile activity
    Critical,
}

impl ThreatLevel {
    /// Base risk weight used when scoring events.
    pub fn base_risk(self) -> f64 {
        match self {
            ThreatLevel::Info => 0.1,
            ThreatLevel::Warning => 0.3,
            ThreatLevel::Moderate => 0.5,
            ThreatLevel::High => 0.8,
            ThreatLevel::Critical => 1.0,
        }
    }
}

/// Open set of event types.
///
/// Well-known types have their own variant; anything else round-trips through
/// [`EventType::Custom`]. Detector output is [`EventType::ThreatDetected`] and
/// renders as `threat_detected_<pattern>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum EventType {
    /// A credential was sealed and stored
    CredentialStored,
    /// A credential was released to a caller
    CredentialAccessed,
    /// Lookup of an unknown or retired credential
    CredentialNotFound,
    /// Lookup of an expired credential
    CredentialExpired,
    /// A credential was retired
    CredentialDeactivated,
    /// A credential's value was replaced
    CredentialRotated,
    /// Source IP outside the credential allow-list
    IpAccessDenied,
    /// Target host outside the credential domain allow-list
    DomainAccessDenied,
    /// A rate-limit window was exhausted
    RateLimitExceeded,
    /// Outbound call completed
    ApiRequest,
    /// Outbound call failed at the transport layer
    ApiRequestFailed,
    /// Derived event emitted by a threat pattern
    ThreatDetected(String),
    /// Any other event type
    Custom(String),
}

const THREAT_PREFIX: &str = "threat_detected_";

impl EventType {
    /// Whether the event records a failed authentication attempt.
    pub fn is_failed_auth(&self) -> bool {
        match self {
            EventType::CredentialNotFound
            | EventType::CredentialExpired
            | EventType::IpAccessDenied
            | EventType::DomainAccessDenied => true,
            EventType::Custom(name) => {
                matches!(name.as_str(), "authentication_failed" | "auth_failed" | "login_failed")
            }
            _ => false,
        }
    }

    /// Whether the event records a refused credential lookup.
    ///
    /// Successful releases are routine traffic and never count.
    pub fn is_credential_probe(&self) -> bool {
        matches!(
            self,
            EventType::CredentialNotFound
                | EventType::CredentialExpired
                | EventType::IpAccessDenied
                | EventType::DomainAccessDenied
        )
    }

    /// Whether the event was emitted by the threat detector.
    pub fn is_derived(&self) -> bool {
        matches!(self, EventType::ThreatDetected(_))
    }

    /// Multiplier applied to the base risk of this event type.
    pub fn risk_multiplier(&self) -> f64 {
        match self {
            EventType::CredentialAccessed => 0.8,
            EventType::CredentialNotFound => 1.2,
            EventType::RateLimitExceeded => 1.1,
            EventType::IpAccessDenied => 1.5,
            EventType::CredentialExpired => 0.9,
            _ => 1.0,
        }
    }
}

impl std::fmt::Display for EventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EventType::CredentialStored => write!(f, "credential_stored"),
            EventType::CredentialAccessed => write!(f, "credential_accessed"),
            EventType::CredentialNotFound => write!(f, "credential_not_found"),
            EventType::CredentialExpired => write!(f, "credential_expired"),
            EventType::CredentialDeactivated => write!(f, "credential_deactivated"),
            EventType::CredentialRotated => write!(f, "credential_rotated"),
            EventType::IpAccessDenied => write!(f, "ip_access_denied"),
            EventType::DomainAccessDenied => write!(f, "domain_access_denied"),
            EventType::RateLimitExceeded => write!(f, "rate_limit_exceeded"),
            EventType::ApiRequest => write!(f, "api_request"),
            EventType::ApiRequestFailed => write!(f, "api_request_failed"),
            EventType::ThreatDetected(pattern) => write!(f, "{}{}", THREAT_PREFIX, pattern),
            EventType::Custom(name) => write!(f, "{}", name),
        }
    }
}

impl From<&str> for EventType {
    fn from(name: &str) -> Self {
        match name {
            "credential_stored" => EventType::CredentialStored,
            "credential_accessed" => EventType::CredentialAccessed,
            "credential_not_found" => EventType::CredentialNotFound,
            "credential_expired" => EventType::CredentialExpired,
            "credential_deactivated" => EventType::CredentialDeactivated,
            "credential_rotated" => EventType::CredentialRotated,
            "ip_access_denied" => EventType::IpAccessDenied,
            "domain_access_denied" => EventType::DomainAccessDenied,
            "rate_limit_exceeded" => EventType::RateLimitExceeded,
            "api_request" => EventType::ApiRequest,
            "api_request_failed" => EventType::ApiRequestFailed,
            other => match other.strip_prefix(THREAT_PREFIX) {
                Some(pattern) if !pattern.is_empty() => {
                    EventType::ThreatDetected(pattern.to_string())
                }
                _ => EventType::Custom(other.to_string()),
            },
        }
    }
}

impl From<String> for EventType {
    fn from(name: String) -> Self {
        EventType::from(name.as_str())
    }
}

impl From<EventType> for String {
    fn from(event_type: EventType) -> Self {
        event_type.to_string()
    }
}

/// An immutable, scored entry in the security event stream.
///
/// Events are only ever created by the event log, which assigns the id,
/// timestamp and risk score at append time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Getters, derive_builder::Builder)]
#[builder(setter(into))]
pub struct SecurityEvent {
    /// Unique event id
    id: String,
    /// What happened
    event_type: EventType,
    /// How serious it is
    threat_level: ThreatLevel,
    /// When it was recorded
    timestamp: DateTime<Utc>,
    /// Caller address
    source_ip: String,
    /// Endpoint or resource involved
    #[builder(default)]
    endpoint: String,
    /// Credential involved, if any
    #[builder(default)]
    credential_id: Option<String>,
    /// Upstream or synthetic response code
    #[builder(default)]
    response_code: Option<u16>,
    /// Redacted error text
    #[builder(default)]
    error_message: Option<String>,
    /// Risk score in `[0, 1]`
    risk_score: f64,
    /// What the gateway did about it
    #[builder(default)]
    action_taken: String,
    /// Free-form structured context
    #[builder(default)]
    metadata: Map<String, JsonValue>,
}

impl SecurityEvent {
    /// Seal a draft into an event.
    pub fn from_draft(
        draft: EventDraft,
        id: String,
        timestamp: DateTime<Utc>,
        risk_score: f64,
    ) -> Self {
        Self {
            id,
            event_type: draft.event_type,
            threat_level: draft.threat_level,
            timestamp,
            source_ip: draft.source_ip,
            endpoint: draft.endpoint,
            credential_id: draft.credential_id,
            response_code: draft.response_code,
            error_message: draft.error_message,
            risk_score: risk_score.clamp(0.0, 1.0),
            action_taken: draft.action_taken,
            metadata: draft.metadata,
        }
    }
}

/// An event waiting to be appended to the log.
#[derive(Debug, Clone, PartialEq, Getters, derive_setters::Setters)]
#[setters(prefix = "with_", into, strip_option)]
pub struct EventDraft {
    /// What happened
    #[setters(skip)]
    event_type: EventType,
    /// How serious it is
    #[setters(skip)]
    threat_level: ThreatLevel,
    /// Caller address
    #[setters(skip)]
    source_ip: String,
    /// Endpoint or resource involved
    endpoint: String,
    /// Credential involved, if any
    credential_id: Option<String>,
    /// Upstream or synthetic response code
    response_code: Option<u16>,
    /// Redacted error text
    error_message: Option<String>,
    /// What the gateway did about it
    action_taken: String,
    /// Free-form structured context
    metadata: Map<String, JsonValue>,
}

impl EventDraft {
    /// Start a draft for an event of the given type and level.
    pub fn new(
        event_type: EventType,
        threat_level: ThreatLevel,
        source_ip: impl Into<String>,
    ) -> Self {
        Self {
            event_type,
            threat_level,
            source_ip: source_ip.into(),
            endpoint: String::new(),
            credential_id: None,
            response_code: None,
            error_message: None,
            action_taken: "logged".to_string(),
            metadata: Map::new(),
        }
    }

    /// Add one metadata entry.
    pub fn with_detail(mut self, key: impl Into<String>, value: impl Into<JsonValue>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_type_round_trips_through_strings() {
        for name in [
            "credential_accessed",
            "ip_access_denied",
            "threat_detected_brute_force_attack",
            "webhook_replayed",
        ] {
            assert_eq!(EventType::from(name).to_string(), name);
        }
        assert_eq!(
            EventType::from("threat_detected_suspicious_ip"),
            EventType::ThreatDetected("suspicious_ip".to_string())
        );
        assert_eq!(
            EventType::from("threat_detected_"),
            EventType::Custom("threat_detected_".to_string())
        );
    }

    #[test]
    fn test_failed_auth_classification() {
        assert!(EventType::IpAccessDenied.is_failed_auth());
        assert!(EventType::Custom("login_failed".into()).is_failed_auth());
        assert!(!EventType::CredentialAccessed.is_failed_auth());
        assert!(EventType::DomainAccessDenied.is_credential_probe());
        assert!(!EventType::CredentialAccessed.is_credential_probe());
        assert!(!EventType::Custom("login_failed".into()).is_credential_probe());
    }

    #[test]
    fn test_threat_level_serde_is_lowercase() {
        let json = serde_json::to_string(&ThreatLevel::Critical).unwrap();
        assert_eq!(json, "\"critical\"");
        assert!(ThreatLevel::High > ThreatLevel::Moderate);
    }

    #[test]
    fn test_draft_setters() {
        let draft = EventDraft::new(EventType::ApiRequest, ThreatLevel::Info, "198.51.100.4")
            .with_endpoint("https://api.openai.com/v1/models")
            .with_response_code(200u16)
            .with_detail("latency_ms", 12);
        assert_eq!(*draft.response_code(), Some(200));
        assert_eq!(draft.metadata()["latency_ms"], 12);
        assert_eq!(draft.action_taken(), "logged");
    }
}
