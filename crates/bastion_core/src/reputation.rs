//! Source IP reputation.

use crate::ThreatConfig;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::net::IpAddr;

/// Verdict on a source address.
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
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Reputation {
    /// Nothing known against the address
    Trusted,
    /// Malformed or otherwise questionable address
    Suspicious,
    /// Listed as hostile
    Malicious,
}

impl Reputation {
    /// Risk multiplier applied to events from this source.
    pub fn risk_multiplier(self) -> f64 {
        match self {
            Reputation::Trusted => 1.0,
            Reputation::Suspicious | Reputation::Malicious => 1.5,
        }
    }
}

/// Pluggable reputation lookup.
///
/// Implementations must be cheap: the event log calls this on every append.
pub trait IpReputationChecker: Send + Sync + std::fmt::Debug {
    /// Assess a source address.
    fn assess(&self, source_ip: &str) -> Reputation;
}

/// Reputation from a fixed blocklist plus address syntax checks.
#[derive(Debug, Clone, Default)]
pub struct StaticIpReputation {
    malicious: BTreeSet<String>,
}

impl StaticIpReputation {
    /// Checker with the given blocklist.
    pub fn new<I, S>(malicious: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            malicious: malicious.into_iter().map(Into::into).collect(),
        }
    }

    /// Checker seeded from threat settings.
    pub fn from_config(config: &ThreatConfig) -> Self {
        Self::new(config.known_malicious_ips().iter().cloned())
    }
}

impl IpReputationChecker for StaticIpReputation {
    fn assess(&self, source_ip: &str) -> Reputation {
        if self.malicious.contains(source_ip) {
            return Reputation::Malicious;
        }
        match source_ip.parse::<IpAddr>() {
            Ok(ip) if ip.is_unspecified() => Reputation::Suspicious,
            Ok(_) => Reputation::Trusted,
            Err(_) => Reputation::Suspicious,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_static_reputation() {
        let checker = StaticIpReputation::new(["203.0.113.66"]);
        assert_eq!(checker.assess("203.0.113.66"), Reputation::Malicious);
        assert_eq!(checker.assess("198.51.100.1"), Reputation::Trusted);
        assert_eq!(checker.assess("::1"), Reputation::Trusted);
        assert_eq!(checker.assess("not-an-ip"), Reputation::Suspicious);
        assert_eq!(checker.assess("0.0.0.0"), Reputation::Suspicious);
        assert_eq!(Reputation::Malicious.risk_multiplier(), 1.5);
    }
}
