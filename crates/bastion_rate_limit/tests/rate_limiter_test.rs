//! Rate limiter tests.

use bastion_core::*;
use bastion_events::EventLog;
use bastion_rate_limit::*;
use bastion_storage::{InMemoryStore, SecurityStore};
use chrono::{DateTime, TimeDelta, Utc};
use std::sync::Arc;
use std::time::Duration;

struct Harness {
    store: InMemoryStore,
    mitigation: Arc<MitigationBoard>,
    limiter: RateLimiter,
}

fn harness(rules: &[RateLimitRule]) -> Harness {
    let store = InMemoryStore::new();
    let events = Arc::new(EventLog::new(
        Arc::new(store.clone()),
        Arc::new(StaticIpReputation::new(Vec::<String>::new())),
        1000,
    ));
    let mitigation = Arc::new(MitigationBoard::new());
    let limiter = RateLimiter::new(rules, Arc::clone(&mitigation), events).unwrap();
    Harness {
        store,
        mitigation,
        limiter,
    }
}

fn per_minute(limit: u32) -> RateLimitRule {
    RateLimitRule::new("openai")
        .with_requests_per_minute(limit)
        .with_penalty_duration_secs(30)
}

fn key() -> RateLimitKey {
    RateLimitKey::new("openai", "/v1/chat/completions", "10.0.0.1")
}

async fn exceeded_events(store: &InMemoryStore, since: DateTime<Utc>) -> usize {
    store
        .events_since(since)
        .await
        .unwrap()
        .iter()
        .filter(|e| *e.event_type() == EventType::RateLimitExceeded)
        .count()
}

// ============================================================================
// Admission
// ============================================================================

#[tokio::test]
async fn test_fourth_request_in_a_minute_is_rejected() {
    let h = harness(&[per_minute(3)]);
    let start = Utc::now() - TimeDelta::seconds(5);

    let mut decisions = Vec::new();
    for i in 0..4 {
        let at = start + TimeDelta::milliseconds(200 * i);
        decisions.push(h.limiter.check_at(&key(), at).await.unwrap());
    }

    assert!(decisions[..3].iter().all(RateLimitDecision::is_allowed));
    match &decisions[3] {
        RateLimitDecision::Rejected {
            exceeded,
            retry_after,
            usage,
        } => {
            assert_eq!(exceeded, &vec![Window::Minute]);
            assert_eq!(*retry_after, Duration::from_secs(30));
            assert_eq!(*usage.minute(), 3);
        }
        other => panic!("expected rejection, got {:?}", other),
    }
    assert_eq!(exceeded_events(&h.store, start - TimeDelta::seconds(1)).await, 1);

    let event = h
        .store
        .events_since(start - TimeDelta::seconds(1))
        .await
        .unwrap()
        .pop()
        .unwrap();
    assert_eq!(*event.threat_level(), ThreatLevel::Moderate);
    assert_eq!(event.metadata()["minute"], 3);
}

#[tokio::test]
async fn test_rejected_requests_are_not_recorded() {
    let h = harness(&[per_minute(1)]);
    let now = Utc::now();
    assert!(h.limiter.check_at(&key(), now).await.unwrap().is_allowed());
    for _ in 0..3 {
        assert!(!h.limiter.check_at(&key(), now).await.unwrap().is_allowed());
    }
    assert_eq!(*h.limiter.usage_at(&key(), now).minute(), 1);
}

#[tokio::test]
async fn test_entry_exactly_a_minute_old_no_longer_counts() {
    let h = harness(&[per_minute(1)]);
    let first = Utc::now() - TimeDelta::minutes(2);

    assert!(h.limiter.check_at(&key(), first).await.unwrap().is_allowed());
    let just_inside = first + TimeDelta::seconds(59);
    assert!(!h.limiter.check_at(&key(), just_inside).await.unwrap().is_allowed());
    let at_boundary = first + TimeDelta::seconds(60);
    assert!(h.limiter.check_at(&key(), at_boundary).await.unwrap().is_allowed());
}

#[tokio::test]
async fn test_unconfigured_service_is_unbounded() {
    let h = harness(&[per_minute(1)]);
    let other = RateLimitKey::new("github", "/repos", "10.0.0.1");
    let now = Utc::now();
    for _ in 0..50 {
        assert!(h.limiter.check_at(&other, now).await.unwrap().is_allowed());
    }
    assert_eq!(*h.limiter.usage_at(&other, now).day(), 50);
}

#[tokio::test]
async fn test_burst_and_day_limits() {
    let rule = RateLimitRule::new("openai")
        .with_burst_limit(2)
        .with_requests_per_day(3);
    let h = harness(&[rule]);
    let now = Utc::now() - TimeDelta::hours(2);

    assert!(h.limiter.check_at(&key(), now).await.unwrap().is_allowed());
    assert!(h.limiter.check_at(&key(), now).await.unwrap().is_allowed());
    let burst = h.limiter.check_at(&key(), now).await.unwrap();
    assert!(matches!(
        burst,
        RateLimitDecision::Rejected { ref exceeded, .. } if exceeded == &vec![Window::Burst]
    ));

    let later = now + TimeDelta::seconds(10);
    assert!(h.limiter.check_at(&key(), later).await.unwrap().is_allowed());
    let day = h.limiter.check_at(&key(), later + TimeDelta::seconds(10)).await.unwrap();
    assert!(matches!(
        day,
        RateLimitDecision::Rejected { ref exceeded, .. } if exceeded == &vec![Window::Day]
    ));
}

#[tokio::test]
async fn test_endpoint_pattern_selects_rule() {
    let rules = [
        RateLimitRule::new("openai")
            .with_endpoint_pattern("^/v1/images")
            .with_requests_per_minute(1),
        per_minute(100),
    ];
    let h = harness(&rules);
    let images = RateLimitKey::new("openai", "/v1/images/generations", "10.0.0.1");
    let now = Utc::now();

    assert!(h.limiter.check_at(&images, now).await.unwrap().is_allowed());
    assert!(!h.limiter.check_at(&images, now).await.unwrap().is_allowed());
    assert!(h.limiter.check_at(&key(), now).await.unwrap().is_allowed());
    assert_eq!(
        h.limiter
            .rule_for("openai", "/v1/images/edits")
            .and_then(|r| *r.requests_per_minute()),
        Some(1)
    );
    assert_eq!(h.limiter.configured_services().len(), 1);
}

#[test]
fn test_invalid_pattern_fails_construction() {
    let store = InMemoryStore::new();
    let events = Arc::new(EventLog::new(
        Arc::new(store),
        Arc::new(StaticIpReputation::new(Vec::<String>::new())),
        10,
    ));
    let rule = RateLimitRule::new("openai").with_endpoint_pattern("[");
    let result = RateLimiter::new(&[rule], Arc::new(MitigationBoard::new()), events);
    assert!(result.is_err());
}

// ============================================================================
// Mitigation and housekeeping
// ============================================================================

#[tokio::test]
async fn test_tightened_source_gets_scaled_limits() {
    let h = harness(&[per_minute(4)]);
    let now = Utc::now();
    h.mitigation
        .tighten("10.0.0.1", 0.5, Duration::from_secs(900), now);

    let first = h.limiter.check_at(&key(), now).await.unwrap();
    match first {
        RateLimitDecision::Allowed { limits, .. } => {
            assert_eq!(*limits.requests_per_minute(), Some(2));
        }
        other => panic!("expected admission, got {:?}", other),
    }
    assert!(h.limiter.check_at(&key(), now).await.unwrap().is_allowed());
    assert!(!h.limiter.check_at(&key(), now).await.unwrap().is_allowed());

    let elsewhere = RateLimitKey::new("openai", "/v1/chat/completions", "10.0.0.2");
    for _ in 0..4 {
        assert!(h.limiter.check_at(&elsewhere, now).await.unwrap().is_allowed());
    }
}

#[tokio::test]
async fn test_tightening_leaves_unconfigured_service_unbounded() {
    let h = harness(&[per_minute(4)]);
    let now = Utc::now();
    h.mitigation
        .tighten("10.0.0.1", 0.5, Duration::from_secs(900), now);

    let other = RateLimitKey::new("github", "/repos", "10.0.0.1");
    for _ in 0..20 {
        assert!(h.limiter.check_at(&other, now).await.unwrap().is_allowed());
    }
}

#[tokio::test]
async fn test_prune_idle_forgets_stale_keys() {
    let h = harness(&[per_minute(10)]);
    let old = Utc::now() - TimeDelta::days(2);
    h.limiter.check_at(&key(), old).await.unwrap();
    h.limiter.check("openai", "/v1/models", "10.0.0.9").await.unwrap();
    assert_eq!(h.limiter.key_count(), 2);

    assert_eq!(h.limiter.prune_idle(Utc::now()), 1);
    assert_eq!(h.limiter.key_count(), 1);
    assert_eq!(h.limiter.usage(&key()), WindowUsage::default());
}

// ============================================================================
// Concurrency
// ============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_callers_never_over_admit() {
    let h = Arc::new(harness(&[per_minute(10)]));

    let mut handles = Vec::new();
    for _ in 0..64 {
        let h = Arc::clone(&h);
        handles.push(tokio::spawn(async move {
            h.limiter
                .check("openai", "/v1/chat/completions", "10.0.0.1")
                .await
                .unwrap()
                .is_allowed()
        }));
    }

    let mut admitted = 0;
    for handle in handles {
        if handle.await.unwrap() {
            admitted += 1;
        }
    }
    assert_eq!(admitted, 10);
    assert_eq!(*h.limiter.usage(&key()).minute(), 10);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_distinct_keys_are_independent() {
    let h = Arc::new(harness(&[per_minute(5)]));

    let mut handles = Vec::new();
    for n in 0..8 {
        let h = Arc::clone(&h);
        handles.push(tokio::spawn(async move {
            let ip = format!("10.0.1.{}", n);
            let mut admitted = 0;
            for _ in 0..5 {
                if h.limiter
                    .check("openai", "/v1/models", &ip)
                    .await
                    .unwrap()
                    .is_allowed()
                {
                    admitted += 1;
                }
            }
            admitted
        }));
    }
    for handle in handles {
        assert_eq!(handle.await.unwrap(), 5);
    }
    assert_eq!(h.limiter.key_count(), 8);
}
