//! Threat detector.

use crate::{CountPattern, ThreatPattern};
use bastion_core::{
    EventDraft, EventType, IpReputationChecker, MitigationBoard, SecurityEvent, ThreatConfig,
    ThreatLevel, saturating_sub,
};
use bastion_events::EventObserver;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Evaluates pattern rules against every appended event and applies advisory
/// mitigation when one fires.
///
/// Install it on the event log with
/// [`EventLog::with_observer`](bastion_events::EventLog::with_observer).
/// Evaluation only reads the log's ring buffer.
#[derive(Debug)]
pub struct ThreatDetector {
    patterns: Vec<Arc<dyn ThreatPattern>>,
    reputation: Arc<dyn IpReputationChecker>,
    mitigation: Arc<MitigationBoard>,
    config: ThreatConfig,
}

impl ThreatDetector {
    /// Detector with the built-in patterns.
    pub fn new(
        config: ThreatConfig,
        reputation: Arc<dyn IpReputationChecker>,
        mitigation: Arc<MitigationBoard>,
    ) -> Self {
        let patterns = CountPattern::builtins()
            .into_iter()
            .map(|p| Arc::new(p) as Arc<dyn ThreatPattern>)
            .collect();
        Self {
            patterns,
            reputation,
            mitigation,
            config,
        }
    }

    /// Register an additional pattern.
    pub fn with_pattern(mut self, pattern: Arc<dyn ThreatPattern>) -> Self {
        self.patterns.push(pattern);
        self
    }

    /// Names of the registered patterns.
    pub fn pattern_names(&self) -> Vec<String> {
        self.patterns.iter().map(|p| p.name().to_string()).collect()
    }

    /// Board the detector records mitigations on.
    pub fn mitigation(&self) -> &Arc<MitigationBoard> {
        &self.mitigation
    }

    fn count_matching(
        &self,
        pattern: &dyn ThreatPattern,
        event: &SecurityEvent,
        recent: &VecDeque<SecurityEvent>,
    ) -> usize {
        let since = saturating_sub(*event.timestamp(), pattern.window());
        recent
            .iter()
            .rev()
            .take_while(|e| *e.timestamp() >= since)
            .filter(|e| e.source_ip() == event.source_ip())
            .filter(|e| pattern.matches(e, self.reputation.as_ref()))
            .count()
    }

    fn already_reported(
        &self,
        pattern: &dyn ThreatPattern,
        event: &SecurityEvent,
        recent: &VecDeque<SecurityEvent>,
    ) -> bool {
        let since = saturating_sub(*event.timestamp(), pattern.window());
        recent
            .iter()
            .rev()
            .take_while(|e| *e.timestamp() >= since)
            .any(|e| {
                e.source_ip() == event.source_ip()
                    && matches!(e.event_type(), EventType::ThreatDetected(name) if name == pattern.name())
            })
    }

    fn mitigate(&self, pattern: &dyn ThreatPattern, event: &SecurityEvent) -> &'static str {
        let now = *event.timestamp();
        let ip = event.source_ip();
        match pattern.threat_level() {
            ThreatLevel::Critical => {
                self.mitigation.block(
                    ip,
                    pattern.name(),
                    ThreatLevel::Critical,
                    Duration::from_secs(*self.config.block_duration_secs()),
                    now,
                );
                "blocked"
            }
            ThreatLevel::High => {
                self.mitigation.tighten(
                    ip,
                    *self.config.tighten_factor(),
                    Duration::from_secs(*self.config.tighten_duration_secs()),
                    now,
                );
                self.mitigation.block(
                    ip,
                    pattern.name(),
                    ThreatLevel::High,
                    Duration::from_secs(*self.config.high_block_duration_secs()),
                    now,
                );
                "throttled"
            }
            _ => "logged",
        }
    }
}

impl EventObserver for ThreatDetector {
    fn observe(&self, event: &SecurityEvent, recent: &VecDeque<SecurityEvent>) -> Vec<EventDraft> {
        let mut derived = Vec::new();
        for pattern in &self.patterns {
            let pattern = pattern.as_ref();
            if !pattern.matches(event, self.reputation.as_ref()) {
                continue;
            }
            let count = self.count_matching(pattern, event, recent);
            if count < pattern.threshold() {
                continue;
            }
            if self.already_reported(pattern, event, recent) {
                debug!(pattern = pattern.name(), "Detection already reported in window");
                continue;
            }

            warn!(
                pattern = pattern.name(),
                source_ip = %event.source_ip(),
                count,
                threat_level = %pattern.threat_level(),
                "Threat pattern matched"
            );
            let action = self.mitigate(pattern, event);
            let mut draft = EventDraft::new(
                EventType::ThreatDetected(pattern.name().to_string()),
                pattern.threat_level(),
                event.source_ip().clone(),
            )
            .with_endpoint(event.endpoint().clone())
            .with_action_taken(action)
            .with_detail("pattern", pattern.name())
            .with_detail("count", count)
            .with_detail("window_secs", pattern.window().as_secs())
            .with_detail("trigger_event_id", event.id().clone());
            if let Some(credential_id) = event.credential_id() {
                draft = draft.with_credential_id(credential_id.clone());
            }
            derived.push(draft);
        }
        derived
    }
}
