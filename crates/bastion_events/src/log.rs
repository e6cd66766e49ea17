//! Event log.

use crate::{EventObserver, risk_score};
use bastion_core::{EventDraft, IpReputationChecker, SecurityEvent, saturating_sub};
use bastion_error::StorageResult;
use bastion_storage::SecurityStore;
use chrono::{DateTime, Utc};
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info, instrument};

/// Append-only security event log.
///
/// Appends are serialized by a single gate that covers id and timestamp
/// assignment, the durable write, the ring buffer push and observer
/// evaluation, so the store, the buffer and the detector all see events in
/// the same order. Timestamps never go backwards within one log.
#[derive(Debug)]
pub struct EventLog {
    store: Arc<dyn SecurityStore>,
    reputation: Arc<dyn IpReputationChecker>,
    observers: Vec<Arc<dyn EventObserver>>,
    capacity: usize,
    state: Mutex<Ring>,
}

#[derive(Debug, Default)]
struct Ring {
    events: VecDeque<SecurityEvent>,
    last_timestamp: Option<DateTime<Utc>>,
}

impl Ring {
    fn push(&mut self, event: SecurityEvent, capacity: usize) {
        while self.events.len() >= capacity {
            self.events.pop_front();
        }
        self.events.push_back(event);
    }
}

impl EventLog {
    /// Create a log with a ring buffer of `capacity` events.
    pub fn new(
        store: Arc<dyn SecurityStore>,
        reputation: Arc<dyn IpReputationChecker>,
        capacity: usize,
    ) -> Self {
        Self {
            store,
            reputation,
            observers: Vec::new(),
            capacity: capacity.max(1),
            state: Mutex::new(Ring::default()),
        }
    }

    /// Register an observer evaluated on every non-derived append.
    pub fn with_observer(mut self, observer: Arc<dyn EventObserver>) -> Self {
        self.observers.push(observer);
        self
    }

    /// Stamp, score, persist and publish an event.
    #[instrument(skip(self, draft), fields(event_type = %draft.event_type(), source_ip = %draft.source_ip()))]
    pub async fn append(&self, draft: EventDraft) -> StorageResult<SecurityEvent> {
        let mut ring = self.state.lock().await;
        let now = Utc::now();
        let timestamp = ring.last_timestamp.map_or(now, |last| last.max(now));
        self.append_locked(&mut ring, draft, timestamp).await
    }

    /// Append an event with an explicit timestamp.
    ///
    /// Used for backfilling and deterministic replays; the stored timestamp
    /// is still clamped so it never precedes an earlier append.
    pub async fn append_at(
        &self,
        draft: EventDraft,
        at: DateTime<Utc>,
    ) -> StorageResult<SecurityEvent> {
        let mut ring = self.state.lock().await;
        let timestamp = ring.last_timestamp.map_or(at, |last| last.max(at));
        self.append_locked(&mut ring, draft, timestamp).await
    }

    async fn append_locked(
        &self,
        ring: &mut Ring,
        draft: EventDraft,
        timestamp: DateTime<Utc>,
    ) -> StorageResult<SecurityEvent> {
        let event = self.persist(ring, draft, timestamp).await?;

        if !event.event_type().is_derived() {
            let derived: Vec<EventDraft> = self
                .observers
                .iter()
                .flat_map(|observer| observer.observe(&event, &ring.events))
                .collect();
            for draft in derived {
                self.persist(ring, draft, timestamp).await?;
            }
        }
        Ok(event)
    }

    async fn persist(
        &self,
        ring: &mut Ring,
        draft: EventDraft,
        timestamp: DateTime<Utc>,
    ) -> StorageResult<SecurityEvent> {
        let event = self.seal(draft, timestamp);
        self.store.append_events(std::slice::from_ref(&event)).await?;
        ring.last_timestamp = Some(timestamp);
        ring.push(event.clone(), self.capacity);
        debug!(
            event_id = %event.id(),
            threat_level = %event.threat_level(),
            risk_score = *event.risk_score(),
            "Event appended"
        );
        Ok(event)
    }

    fn seal(&self, draft: EventDraft, timestamp: DateTime<Utc>) -> SecurityEvent {
        let reputation = self.reputation.assess(draft.source_ip());
        let risk = risk_score(*draft.threat_level(), draft.event_type(), reputation);
        SecurityEvent::from_draft(draft, uuid::Uuid::new_v4().to_string(), timestamp, risk)
    }

    /// Buffered events with `timestamp >= since`, oldest first.
    pub async fn recent_since(&self, since: DateTime<Utc>) -> Vec<SecurityEvent> {
        self.state
            .lock()
            .await
            .events
            .iter()
            .filter(|event| *event.timestamp() >= since)
            .cloned()
            .collect()
    }

    /// The newest `limit` buffered events, oldest first.
    pub async fn recent(&self, limit: usize) -> Vec<SecurityEvent> {
        let ring = self.state.lock().await;
        let skip = ring.events.len().saturating_sub(limit);
        ring.events.iter().skip(skip).cloned().collect()
    }

    /// Durable events with `timestamp >= since`, in append order.
    pub async fn events_since(&self, since: DateTime<Utc>) -> StorageResult<Vec<SecurityEvent>> {
        self.store.events_since(since).await
    }

    /// Number of buffered events.
    pub async fn buffered(&self) -> usize {
        self.state.lock().await.events.len()
    }

    /// Ring buffer capacity.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Delete events older than the retention window from the store and the
    /// buffer. Returns how many durable events were removed.
    #[instrument(skip(self))]
    pub async fn purge_expired(&self, retention: Duration) -> StorageResult<usize> {
        let cutoff = saturating_sub(Utc::now(), retention);
        let mut ring = self.state.lock().await;
        let removed = self.store.purge_events_before(cutoff).await?;
        ring.events.retain(|event| *event.timestamp() >= cutoff);
        info!(removed, cutoff = %cutoff, "Purged expired events");
        Ok(removed)
    }
}
