//! Hook for components that react to appended events.

use bastion_core::{EventDraft, SecurityEvent};
use std::collections::VecDeque;

/// Reacts to each appended event.
///
/// Called with the append gate held, so evaluation must be bounded by the ring
/// buffer and must not call back into the log. Drafts returned here are
/// appended as derived events and are not observed again.
pub trait EventObserver: Send + Sync + std::fmt::Debug {
    /// Inspect `event` against the buffered history (oldest first, `event`
    /// included) and return any derived events to record.
    fn observe(&self, event: &SecurityEvent, recent: &VecDeque<SecurityEvent>) -> Vec<EventDraft>;
}
