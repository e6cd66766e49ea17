//! Threat pattern rules.

use bastion_core::{EventType, IpReputationChecker, Reputation, SecurityEvent, ThreatLevel};
use std::time::Duration;

/// A named rule that fires when enough matching events from one source fall
/// inside a trailing window.
pub trait ThreatPattern: Send + Sync + std::fmt::Debug {
    /// Pattern name, used in `threat_detected_<name>`.
    fn name(&self) -> &str;

    /// Level of the derived event.
    fn threat_level(&self) -> ThreatLevel;

    /// Trailing window the count is taken over.
    fn window(&self) -> Duration;

    /// Matching events needed to fire.
    fn threshold(&self) -> usize;

    /// Whether a single event counts towards this pattern.
    fn matches(&self, event: &SecurityEvent, reputation: &dyn IpReputationChecker) -> bool;
}

/// Which events a [`CountPattern`] counts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventPredicate {
    /// Failed authentication of any kind
    FailedAuth,
    /// Any event from a source the reputation checker calls malicious
    MaliciousSource,
    /// Refused credential lookups
    CredentialProbe,
    /// One specific event type
    Type(EventType),
}

impl EventPredicate {
    fn test(&self, event: &SecurityEvent, reputation: &dyn IpReputationChecker) -> bool {
        match self {
            EventPredicate::FailedAuth => event.event_type().is_failed_auth(),
            EventPredicate::MaliciousSource => {
                reputation.assess(event.source_ip()) == Reputation::Malicious
            }
            EventPredicate::CredentialProbe => event.event_type().is_credential_probe(),
            EventPredicate::Type(event_type) => event.event_type() == event_type,
        }
    }
}

/// Threshold-over-window pattern.
#[derive(Debug, Clone, PartialEq)]
pub struct CountPattern {
    name: String,
    predicate: EventPredicate,
    threshold: usize,
    window: Duration,
    threat_level: ThreatLevel,
}

impl CountPattern {
    /// Build a pattern.
    pub fn new(
        name: impl Into<String>,
        predicate: EventPredicate,
        threshold: usize,
        window: Duration,
        threat_level: ThreatLevel,
    ) -> Self {
        Self {
            name: name.into(),
            predicate,
            threshold: threshold.max(1),
            window,
            threat_level,
        }
    }

    /// Which events are counted.
    pub fn predicate(&self) -> &EventPredicate {
        &self.predicate
    }

    /// Five failed authentications in ten minutes.
    pub fn brute_force_attack() -> Self {
        Self::new(
            "brute_force_attack",
            EventPredicate::FailedAuth,
            5,
            Duration::from_secs(600),
            ThreatLevel::High,
        )
    }

    /// Any activity from a known-malicious address within a minute.
    pub fn suspicious_ip() -> Self {
        Self::new(
            "suspicious_ip",
            EventPredicate::MaliciousSource,
            1,
            Duration::from_secs(60),
            ThreatLevel::Critical,
        )
    }

    /// A hundred rate-limit rejections in a minute.
    pub fn rate_limit_abuse() -> Self {
        Self::new(
            "rate_limit_abuse",
            EventPredicate::Type(EventType::RateLimitExceeded),
            100,
            Duration::from_secs(60),
            ThreatLevel::Moderate,
        )
    }

    /// Ten refused credential lookups in five minutes.
    pub fn credential_stuffing() -> Self {
        Self::new(
            "credential_stuffing",
            EventPredicate::CredentialProbe,
            10,
            Duration::from_secs(300),
            ThreatLevel::High,
        )
    }

    /// The built-in pattern set.
    pub fn builtins() -> Vec<Self> {
        vec![
            Self::brute_force_attack(),
            Self::suspicious_ip(),
            Self::rate_limit_abuse(),
            Self::credential_stuffing(),
        ]
    }
}

impl ThreatPattern for CountPattern {
    fn name(&self) -> &str {
        &self.name
    }

    fn threat_level(&self) -> ThreatLevel {
        self.threat_level
    }

    fn window(&self) -> Duration {
        self.window
    }

    fn threshold(&self) -> usize {
        self.threshold
    }

    fn matches(&self, event: &SecurityEvent, reputation: &dyn IpReputationChecker) -> bool {
        self.predicate.test(event, reputation)
    }
}
