//! Rate-limit rule configuration.

use derive_getters::Getters;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Sliding windows tracked by the rate limiter.
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
    strum::EnumIter,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Window {
    /// One-second burst window
    Burst,
    /// Trailing minute
    Minute,
    /// Trailing hour
    Hour,
    /// Trailing day
    Day,
}

impl Window {
    /// Length of the window.
    pub fn duration(self) -> Duration {
        match self {
            Window::Burst => Duration::from_secs(1),
            Window::Minute => Duration::from_secs(60),
            Window::Hour => Duration::from_secs(60 * 60),
            Window::Day => Duration::from_secs(24 * 60 * 60),
        }
    }
}

fn default_endpoint_pattern() -> String {
    ".*".to_string()
}

fn default_penalty_secs() -> u64 {
    60
}

/// Thresholds for one service/endpoint combination.
///
/// Any threshold left unset is unbounded.
#[derive(
    Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Getters, derive_setters::Setters,
)]
#[setters(prefix = "with_", strip_option)]
pub struct RateLimitRule {
    /// Service the rule applies to
    #[setters(skip)]
    service_name: String,
    /// Regular expression matched against the request path
    #[serde(default = "default_endpoint_pattern")]
    #[setters(into)]
    endpoint_pattern: String,
    /// Requests allowed in the trailing minute
    #[serde(default)]
    requests_per_minute: Option<u32>,
    /// Requests allowed in the trailing hour
    #[serde(default)]
    requests_per_hour: Option<u32>,
    /// Requests allowed in the trailing day
    #[serde(default)]
    requests_per_day: Option<u32>,
    /// Requests allowed in any one-second span
    #[serde(default)]
    burst_limit: Option<u32>,
    /// How long a rejected caller is told to wait
    #[serde(default = "default_penalty_secs")]
    penalty_duration_secs: u64,
}

impl RateLimitRule {
    /// Create an unbounded rule for a service, matching every endpoint.
    pub fn new(service_name: impl Into<String>) -> Self {
        Self {
            service_name: service_name.into(),
            endpoint_pattern: default_endpoint_pattern(),
            requests_per_minute: None,
            requests_per_hour: None,
            requests_per_day: None,
            burst_limit: None,
            penalty_duration_secs: default_penalty_secs(),
        }
    }

    /// Configured limit for a window, if any.
    pub fn limit(&self, window: Window) -> Option<u32> {
        match window {
            Window::Burst => self.burst_limit,
            Window::Minute => self.requests_per_minute,
            Window::Hour => self.requests_per_hour,
            Window::Day => self.requests_per_day,
        }
    }

    /// Wait time handed to rejected callers.
    pub fn penalty_duration(&self) -> Duration {
        Duration::from_secs(self.penalty_duration_secs)
    }

    /// Whether every threshold is unset.
    pub fn is_unbounded(&self) -> bool {
        self.requests_per_minute.is_none()
            && self.requests_per_hour.is_none()
            && self.requests_per_day.is_none()
            && self.burst_limit.is_none()
    }

    /// Copy of this rule with every limit scaled by `factor`.
    ///
    /// Scaled limits never drop below one request. Unset limits stay
    /// unbounded, so tightening an unbounded rule changes nothing.
    pub fn tightened(&self, factor: f64) -> Self {
        let factor = factor.clamp(0.0, 1.0);
        let scale = |limit: Option<u32>| {
            limit.map(|n| ((f64::from(n) * factor).floor() as u32).max(1))
        };
        Self {
            requests_per_minute: scale(self.requests_per_minute),
            requests_per_hour: scale(self.requests_per_hour),
            requests_per_day: scale(self.requests_per_day),
            burst_limit: scale(self.burst_limit),
            ..self.clone()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unset_limits_are_unbounded() {
        let rule = RateLimitRule::new("openai");
        assert!(rule.is_unbounded());
        assert_eq!(rule.limit(Window::Minute), None);
        assert_eq!(rule.penalty_duration(), Duration::from_secs(60));
    }

    #[test]
    fn test_tightened_halves_and_floors_at_one() {
        let rule = RateLimitRule::new("openai")
            .with_requests_per_minute(10)
            .with_burst_limit(1);
        let tight = rule.tightened(0.5);
        assert_eq!(tight.limit(Window::Minute), Some(5));
        assert_eq!(tight.limit(Window::Burst), Some(1));
        assert_eq!(tight.limit(Window::Day), None);
    }

    #[test]
    fn test_tightened_unbounded_rule_stays_unbounded() {
        let rule = RateLimitRule::new("stripe");
        let tight = rule.tightened(0.1);
        assert!(tight.is_unbounded());
        assert_eq!(tight, rule);
    }

    #[test]
    fn test_rule_from_toml_uses_defaults() {
        let rule: RateLimitRule = toml::from_str(
            r#"
            service_name = "anthropic"
            requests_per_minute = 50
            "#,
        )
        .unwrap();
        assert_eq!(rule.endpoint_pattern(), ".*");
        assert_eq!(rule.limit(Window::Minute), Some(50));
        assert_eq!(*rule.penalty_duration_secs(), 60);
    }
}
