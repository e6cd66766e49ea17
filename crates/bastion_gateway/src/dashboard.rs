//! Operational dashboard snapshot.

use bastion_core::{AdvisoryBlock, SYSTEM_SOURCE_IP, SecurityEvent, ThreatLevel};
use chrono::{DateTime, Utc};
use derive_getters::Getters;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// How many source addresses the dashboard ranks.
pub const TOP_SOURCE_LIMIT: usize = 10;

/// Event volume from one source address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Getters)]
pub struct SourceActivity {
    /// Source address
    source_ip: String,
    /// Events recorded from it
    events: usize,
}

/// Point-in-time view of gateway activity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Getters)]
pub struct DashboardSnapshot {
    /// When the snapshot was taken
    generated_at: DateTime<Utc>,
    /// Events recorded in the trailing 24 hours
    recent_events_24h: usize,
    /// Of those, events the gateway raised on its own behalf
    system_events_24h: usize,
    /// Trailing-24h event count per threat level; every level is present
    threat_distribution: BTreeMap<ThreatLevel, usize>,
    /// Busiest caller sources in the trailing 24 hours, busiest first.
    /// Gateway bookkeeping is counted in `system_events_24h` instead.
    top_source_ips: Vec<SourceActivity>,
    /// Credentials currently active
    active_credential_count: usize,
    /// Rate-limit keys currently tracked
    rate_limiter_key_count: usize,
    /// Score of the most recent audit, if any has run
    latest_compliance_score: Option<f64>,
    /// Advisory blocks in force
    active_blocks: Vec<AdvisoryBlock>,
}

impl DashboardSnapshot {
    pub(crate) fn build(
        generated_at: DateTime<Utc>,
        events: &[SecurityEvent],
        active_credential_count: usize,
        rate_limiter_key_count: usize,
        latest_compliance_score: Option<f64>,
        active_blocks: Vec<AdvisoryBlock>,
    ) -> Self {
        use strum::IntoEnumIterator;

        let mut threat_distribution: BTreeMap<ThreatLevel, usize> =
            ThreatLevel::iter().map(|level| (level, 0)).collect();
        let mut per_source: HashMap<&str, usize> = HashMap::new();
        let mut system_events_24h = 0;
        for event in events {
            *threat_distribution.entry(*event.threat_level()).or_default() += 1;
            if event.source_ip() == SYSTEM_SOURCE_IP {
                system_events_24h += 1;
            } else {
                *per_source.entry(event.source_ip().as_str()).or_default() += 1;
            }
        }

        let mut top_source_ips: Vec<SourceActivity> = per_source
            .into_iter()
            .map(|(source_ip, events)| SourceActivity {
                source_ip: source_ip.to_string(),
                events,
            })
            .collect();
        top_source_ips.sort_by(|a, b| {
            b.events
                .cmp(&a.events)
                .then_with(|| a.source_ip.cmp(&b.source_ip))
        });
        top_source_ips.truncate(TOP_SOURCE_LIMIT);

        Self {
            generated_at,
            recent_events_24h: events.len(),
            system_events_24h,
            threat_distribution,
            top_source_ips,
            active_credential_count,
            rate_limiter_key_count,
            latest_compliance_score,
            active_blocks,
        }
    }
}
