//! Threat detector tests.

use bastion_core::*;
use bastion_events::EventLog;
use bastion_storage::{InMemoryStore, SecurityStore};
use bastion_threat::*;
use chrono::{DateTime, TimeDelta, Utc};
use std::sync::Arc;
use std::time::Duration;

const ATTACKER: &str = "1.2.3.4";
const MALICIOUS: &str = "203.0.113.66";

struct Harness {
    store: InMemoryStore,
    log: EventLog,
    board: Arc<MitigationBoard>,
    start: DateTime<Utc>,
}

fn harness_with(detector: impl FnOnce(ThreatDetector) -> ThreatDetector) -> Harness {
    let store = InMemoryStore::new();
    let config = ThreatConfig::default()
        .with_known_malicious_ips([MALICIOUS.to_string()].into_iter().collect());
    let reputation: Arc<dyn IpReputationChecker> = Arc::new(StaticIpReputation::from_config(&config));
    let board = Arc::new(MitigationBoard::new());
    let detector = detector(ThreatDetector::new(
        config,
        Arc::clone(&reputation),
        Arc::clone(&board),
    ));
    let log = EventLog::new(Arc::new(store.clone()), reputation, 1000)
        .with_observer(Arc::new(detector));
    Harness {
        store,
        log,
        board,
        start: Utc::now() - TimeDelta::hours(2),
    }
}

fn harness() -> Harness {
    harness_with(|d| d)
}

fn failed_auth(ip: &str) -> EventDraft {
    EventDraft::new(EventType::CredentialNotFound, ThreatLevel::Warning, ip)
}

impl Harness {
    async fn detections(&self, name: &str) -> Vec<SecurityEvent> {
        self.store
            .events_since(self.start - TimeDelta::seconds(1))
            .await
            .unwrap()
            .into_iter()
            .filter(|e| *e.event_type() == EventType::ThreatDetected(name.to_string()))
            .collect()
    }

    fn at(&self, seconds: i64) -> DateTime<Utc> {
        self.start + TimeDelta::seconds(seconds)
    }
}

// ============================================================================
// Brute force
// ============================================================================

#[tokio::test]
async fn test_five_failures_in_ten_minutes_is_brute_force() {
    let h = harness();
    for i in 0..5 {
        h.log.append_at(failed_auth(ATTACKER), h.at(i * 60)).await.unwrap();
    }

    let detections = h.detections("brute_force_attack").await;
    assert_eq!(detections.len(), 1);
    let detection = &detections[0];
    assert_eq!(*detection.threat_level(), ThreatLevel::High);
    assert_eq!(detection.source_ip(), ATTACKER);
    assert_eq!(
        detection.event_type().to_string(),
        "threat_detected_brute_force_attack"
    );
    assert_eq!(detection.metadata()["count"], 5);

    let now = h.at(4 * 60);
    assert!(h.board.is_blocked(ATTACKER, now));
    assert!(h.board.throttle_factor(ATTACKER, now) < 1.0);
}

#[tokio::test]
async fn test_four_failures_do_not_fire() {
    let h = harness();
    for i in 0..4 {
        h.log.append_at(failed_auth(ATTACKER), h.at(i * 60)).await.unwrap();
    }
    assert!(h.detections("brute_force_attack").await.is_empty());
    assert!(!h.board.is_blocked(ATTACKER, h.at(240)));
}

#[tokio::test]
async fn test_failures_spread_beyond_window_do_not_fire() {
    let h = harness();
    for i in 0..5 {
        h.log.append_at(failed_auth(ATTACKER), h.at(i * 180)).await.unwrap();
    }
    assert!(h.detections("brute_force_attack").await.is_empty());
}

#[tokio::test]
async fn test_sources_are_counted_separately() {
    let h = harness();
    for i in 0..5 {
        let ip = if i % 2 == 0 { ATTACKER } else { "5.6.7.8" };
        h.log.append_at(failed_auth(ip), h.at(i * 10)).await.unwrap();
    }
    assert!(h.detections("brute_force_attack").await.is_empty());
}

#[tokio::test]
async fn test_detection_is_not_repeated_within_window() {
    let h = harness();
    for i in 0..8 {
        h.log.append_at(failed_auth(ATTACKER), h.at(i * 30)).await.unwrap();
    }
    assert_eq!(h.detections("brute_force_attack").await.len(), 1);
}

// ============================================================================
// Other built-ins
// ============================================================================

#[tokio::test]
async fn test_known_malicious_source_is_blocked() {
    let h = harness();
    let event = EventDraft::new(EventType::ApiRequest, ThreatLevel::Info, MALICIOUS);
    h.log.append_at(event, h.at(0)).await.unwrap();

    let detections = h.detections("suspicious_ip").await;
    assert_eq!(detections.len(), 1);
    assert_eq!(*detections[0].threat_level(), ThreatLevel::Critical);
    assert_eq!(detections[0].action_taken(), "blocked");

    let block = h.board.block_for(MALICIOUS, h.at(1)).unwrap();
    assert_eq!(block.reason(), "suspicious_ip");
    assert_eq!(*block.expires_at(), h.at(3600));
}

#[tokio::test]
async fn test_credential_stuffing_counts_refused_lookups() {
    let h = harness();
    let refusals = [
        EventType::CredentialNotFound,
        EventType::CredentialExpired,
        EventType::IpAccessDenied,
        EventType::DomainAccessDenied,
    ];
    for i in 0..10 {
        let draft = EventDraft::new(refusals[i % 4].clone(), ThreatLevel::Warning, ATTACKER);
        h.log.append_at(draft, h.at(i as i64 * 20)).await.unwrap();
    }
    assert_eq!(h.detections("credential_stuffing").await.len(), 1);
}

#[tokio::test]
async fn test_successful_credential_access_is_not_stuffing() {
    let h = harness();
    for i in 0..30 {
        let draft = EventDraft::new(EventType::CredentialAccessed, ThreatLevel::Info, ATTACKER);
        h.log.append_at(draft, h.at(i * 5)).await.unwrap();
    }
    assert!(h.detections("credential_stuffing").await.is_empty());
    assert!(!h.board.is_blocked(ATTACKER, h.at(200)));
    assert_eq!(h.board.throttle_factor(ATTACKER, h.at(200)), 1.0);
}

#[tokio::test]
async fn test_moderate_detection_applies_no_mitigation() {
    let h = harness();
    for i in 0..100 {
        let draft = EventDraft::new(EventType::RateLimitExceeded, ThreatLevel::Moderate, ATTACKER);
        h.log
            .append_at(draft, h.at(0) + TimeDelta::milliseconds(i * 100))
            .await
            .unwrap();
    }
    let detections = h.detections("rate_limit_abuse").await;
    assert_eq!(detections.len(), 1);
    assert_eq!(*detections[0].threat_level(), ThreatLevel::Moderate);
    assert!(!h.board.is_blocked(ATTACKER, h.at(10)));
    assert_eq!(h.board.throttle_factor(ATTACKER, h.at(10)), 1.0);
}

#[tokio::test]
async fn test_custom_pattern() {
    let h = harness_with(|d| {
        d.with_pattern(Arc::new(CountPattern::new(
            "webhook_replay",
            EventPredicate::Type(EventType::Custom("webhook_replayed".to_string())),
            2,
            Duration::from_secs(60),
            ThreatLevel::Warning,
        )))
    });
    for i in 0..2 {
        let draft = EventDraft::new(
            EventType::Custom("webhook_replayed".to_string()),
            ThreatLevel::Warning,
            "198.51.100.7",
        );
        h.log.append_at(draft, h.at(i)).await.unwrap();
    }
    assert_eq!(h.detections("webhook_replay").await.len(), 1);
}
