//! Sliding-window rate limiter.

use crate::{RateLimitDecision, RateLimitKey, WindowUsage};
use bastion_core::{
    EventDraft, EventType, MitigationBoard, RateLimitRule, ThreatLevel, Window, saturating_sub,
};
use bastion_error::{RateLimitError, RateLimitErrorKind, RateLimitResult};
use bastion_events::EventLog;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use regex::Regex;
use std::collections::{BTreeSet, VecDeque};
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{debug, instrument, warn};

type Timestamps = Arc<Mutex<VecDeque<DateTime<Utc>>>>;

#[derive(Debug, Clone)]
struct CompiledRule {
    rule: RateLimitRule,
    pattern: Regex,
}

impl CompiledRule {
    fn compile(rule: &RateLimitRule) -> RateLimitResult<Self> {
        let pattern = Regex::new(rule.endpoint_pattern()).map_err(|e| {
            RateLimitError::new(RateLimitErrorKind::InvalidPattern {
                pattern: rule.endpoint_pattern().clone(),
                reason: e.to_string(),
            })
        })?;
        Ok(Self {
            rule: rule.clone(),
            pattern,
        })
    }

    fn applies_to(&self, service_name: &str, endpoint: &str) -> bool {
        self.rule.service_name() == service_name && self.pattern.is_match(endpoint)
    }
}

/// Multi-window admission control keyed by service, endpoint and source IP.
///
/// Each key owns its own lock; the prune, count and record steps for a key
/// happen under that lock and nothing else. Rejections are logged to the event
/// log after the lock is released.
#[derive(Debug)]
pub struct RateLimiter {
    rules: Vec<CompiledRule>,
    windows: DashMap<RateLimitKey, Timestamps>,
    mitigation: Arc<MitigationBoard>,
    events: Arc<EventLog>,
}

impl RateLimiter {
    /// Compile the rules. Fails on an invalid endpoint pattern.
    pub fn new(
        rules: &[RateLimitRule],
        mitigation: Arc<MitigationBoard>,
        events: Arc<EventLog>,
    ) -> RateLimitResult<Self> {
        let rules = rules
            .iter()
            .map(CompiledRule::compile)
            .collect::<RateLimitResult<Vec<_>>>()?;
        debug!(rules = rules.len(), "Rate limiter ready");
        Ok(Self {
            rules,
            windows: DashMap::new(),
            mitigation,
            events,
        })
    }

    /// Configured rules, in evaluation order.
    pub fn rules(&self) -> Vec<RateLimitRule> {
        self.rules.iter().map(|c| c.rule.clone()).collect()
    }

    /// Services with at least one configured rule.
    pub fn configured_services(&self) -> BTreeSet<String> {
        self.rules
            .iter()
            .map(|c| c.rule.service_name().clone())
            .collect()
    }

    /// First rule for the service whose pattern matches the endpoint.
    pub fn rule_for(&self, service_name: &str, endpoint: &str) -> Option<&RateLimitRule> {
        self.rules
            .iter()
            .find(|c| c.applies_to(service_name, endpoint))
            .map(|c| &c.rule)
    }

    /// Admit or refuse a request now.
    pub async fn check(
        &self,
        service_name: &str,
        endpoint: &str,
        source_ip: &str,
    ) -> RateLimitResult<RateLimitDecision> {
        let key = RateLimitKey::new(service_name, endpoint, source_ip);
        self.check_at(&key, Utc::now()).await
    }

    /// Admit or refuse a request at `now`.
    #[instrument(skip(self, key), fields(key = %key))]
    pub async fn check_at(
        &self,
        key: &RateLimitKey,
        now: DateTime<Utc>,
    ) -> RateLimitResult<RateLimitDecision> {
        let limits = self.effective_rule(key, now);
        let decision = self.admit(key, &limits, now);

        if let RateLimitDecision::Rejected {
            exceeded,
            retry_after,
            usage,
        } = &decision
        {
            warn!(?exceeded, retry_after_secs = retry_after.as_secs(), "Rate limit exceeded");
            let exceeded: Vec<String> = exceeded.iter().map(ToString::to_string).collect();
            self.events
                .append(
                    EventDraft::new(
                        EventType::RateLimitExceeded,
                        ThreatLevel::Moderate,
                        key.source_ip().clone(),
                    )
                    .with_endpoint(key.endpoint().clone())
                    .with_response_code(429u16)
                    .with_action_taken("rejected")
                    .with_detail("service_name", key.service_name().clone())
                    .with_detail("exceeded", exceeded)
                    .with_detail("burst", *usage.burst())
                    .with_detail("minute", *usage.minute())
                    .with_detail("hour", *usage.hour())
                    .with_detail("day", *usage.day())
                    .with_detail("retry_after_secs", retry_after.as_secs()),
                )
                .await?;
        }
        Ok(decision)
    }

    fn effective_rule(&self, key: &RateLimitKey, now: DateTime<Utc>) -> RateLimitRule {
        let rule = self
            .rule_for(key.service_name(), key.endpoint())
            .cloned()
            .unwrap_or_else(|| RateLimitRule::new(key.service_name().clone()));
        let factor = self.mitigation.throttle_factor(key.source_ip(), now);
        if factor < 1.0 {
            debug!(factor, "Applying tightened limits");
            rule.tightened(factor)
        } else {
            rule
        }
    }

    fn window(&self, key: &RateLimitKey) -> Timestamps {
        Arc::clone(self.windows.entry(key.clone()).or_default().value())
    }

    fn admit(&self, key: &RateLimitKey, limits: &RateLimitRule, now: DateTime<Utc>) -> RateLimitDecision {
        let window = self.window(key);
        let mut stamps = window.lock().unwrap_or_else(PoisonError::into_inner);

        prune(&mut stamps, now);
        let usage = usage_of(&stamps, now);
        let exceeded: Vec<Window> = [Window::Burst, Window::Minute, Window::Hour, Window::Day]
            .into_iter()
            .filter(|w| limits.limit(*w).is_some_and(|limit| usage.count(*w) >= limit))
            .collect();

        if !exceeded.is_empty() {
            return RateLimitDecision::Rejected {
                exceeded,
                retry_after: limits.penalty_duration(),
                usage,
            };
        }

        let at = stamps.back().map_or(now, |last| (*last).max(now));
        stamps.push_back(at);
        let usage = usage_of(&stamps, now);
        debug!(minute = *usage.minute(), "Request admitted");
        RateLimitDecision::Allowed {
            usage,
            limits: limits.clone(),
        }
    }

    /// Current counts for a key; zero for an unknown key.
    pub fn usage(&self, key: &RateLimitKey) -> WindowUsage {
        self.usage_at(key, Utc::now())
    }

    /// Counts for a key as of `now`.
    pub fn usage_at(&self, key: &RateLimitKey, now: DateTime<Utc>) -> WindowUsage {
        let Some(window) = self.windows.get(key).map(|w| Arc::clone(w.value())) else {
            return WindowUsage::default();
        };
        let mut stamps = window.lock().unwrap_or_else(PoisonError::into_inner);
        prune(&mut stamps, now);
        usage_of(&stamps, now)
    }

    /// Number of tracked keys.
    pub fn key_count(&self) -> usize {
        self.windows.len()
    }

    /// Forget keys with no requests in the last day. Returns how many went.
    pub fn prune_idle(&self, now: DateTime<Utc>) -> usize {
        let before = self.windows.len();
        self.windows.retain(|_, window| {
            // A clone outside the map means a check is in flight.
            if Arc::strong_count(window) > 1 {
                return true;
            }
            let mut stamps = window.lock().unwrap_or_else(PoisonError::into_inner);
            prune(&mut stamps, now);
            !stamps.is_empty()
        });
        let removed = before.saturating_sub(self.windows.len());
        if removed > 0 {
            debug!(removed, "Pruned idle rate-limit keys");
        }
        removed
    }
}

fn prune(stamps: &mut VecDeque<DateTime<Utc>>, now: DateTime<Utc>) {
    let cutoff = saturating_sub(now, Window::Day.duration());
    while stamps.front().is_some_and(|t| *t <= cutoff) {
        stamps.pop_front();
    }
}

fn count_within(stamps: &VecDeque<DateTime<Utc>>, now: DateTime<Utc>, window: Window) -> u32 {
    let cutoff = saturating_sub(now, window.duration());
    let count = stamps.iter().rev().take_while(|t| **t > cutoff).count();
    u32::try_from(count).unwrap_or(u32::MAX)
}

fn usage_of(stamps: &VecDeque<DateTime<Utc>>, now: DateTime<Utc>) -> WindowUsage {
    WindowUsage::new(
        count_within(stamps, now, Window::Burst),
        count_within(stamps, now, Window::Minute),
        count_within(stamps, now, Window::Hour),
        count_within(stamps, now, Window::Day),
    )
}
