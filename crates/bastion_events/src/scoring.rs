//! Event risk scoring.

use bastion_core::{EventType, Reputation, ThreatLevel};

/// Risk score for an event, clamped to `[0, 1]`.
///
/// The product of the level's base risk, the event type multiplier and the
/// source reputation multiplier.
pub fn risk_score(level: ThreatLevel, event_type: &EventType, reputation: Reputation) -> f64 {
    (level.base_risk() * event_type.risk_multiplier() * reputation.risk_multiplier())
        .clamp(0.0, 1.0)
}
