//! Advisory mitigation board.
//!
//! The gateway never drops traffic on its own; the threat detector records
//! advisory blocks here for an external enforcer, and records temporary
//! rate-limit tightenings that the limiter applies to the offending source.

use crate::{ThreatLevel, saturating_add};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use derive_getters::Getters;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info};

/// Recommendation to deny traffic from a source until `expires_at`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Getters)]
pub struct AdvisoryBlock {
    /// Source address
    source_ip: String,
    /// Pattern that triggered the block
    reason: String,
    /// Level of the triggering detection
    threat_level: ThreatLevel,
    /// When the block was recorded
    created_at: DateTime<Utc>,
    /// When the recommendation lapses
    expires_at: DateTime<Utc>,
}

impl AdvisoryBlock {
    /// Whether the block is still in force at `now`.
    pub fn is_active_at(&self, now: DateTime<Utc>) -> bool {
        now < self.expires_at
    }
}

/// Temporary scaling of a source's rate limits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Getters)]
pub struct Tightening {
    /// Source address
    source_ip: String,
    /// Multiplier in `(0, 1]` applied to every limit
    factor: f64,
    /// When the tightening lapses
    expires_at: DateTime<Utc>,
}

/// Shared registry of advisory blocks and rate-limit tightenings.
///
/// Expired entries are swept lazily on read.
#[derive(Debug, Default)]
pub struct MitigationBoard {
    blocks: DashMap<String, AdvisoryBlock>,
    tightenings: DashMap<String, Tightening>,
}

impl MitigationBoard {
    /// Create an empty board.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an advisory block, extending any shorter block already in place.
    pub fn block(
        &self,
        source_ip: &str,
        reason: &str,
        threat_level: ThreatLevel,
        duration: Duration,
        now: DateTime<Utc>,
    ) -> AdvisoryBlock {
        let candidate = AdvisoryBlock {
            source_ip: source_ip.to_string(),
            reason: reason.to_string(),
            threat_level,
            created_at: now,
            expires_at: saturating_add(now, duration),
        };
        let mut entry = self
            .blocks
            .entry(source_ip.to_string())
            .or_insert_with(|| candidate.clone());
        if !entry.is_active_at(now) || entry.expires_at < candidate.expires_at {
            *entry = candidate;
        }
        info!(
            source_ip,
            reason = %entry.reason,
            expires_at = %entry.expires_at,
            "Advisory block recorded"
        );
        entry.clone()
    }

    /// Scale a source's limits by `factor` until `now + duration`.
    ///
    /// Only configured thresholds are scaled. A service with no matching
    /// rule, or a rule with no thresholds, stays unbounded for the source.
    pub fn tighten(&self, source_ip: &str, factor: f64, duration: Duration, now: DateTime<Utc>) {
        let tightening = Tightening {
            source_ip: source_ip.to_string(),
            factor: factor.clamp(f64::MIN_POSITIVE, 1.0),
            expires_at: saturating_add(now, duration),
        };
        info!(
            source_ip,
            factor = tightening.factor,
            expires_at = %tightening.expires_at,
            "Rate limits tightened"
        );
        self.tightenings.insert(source_ip.to_string(), tightening);
    }

    /// Whether an advisory block is in force for the source.
    pub fn is_blocked(&self, source_ip: &str, now: DateTime<Utc>) -> bool {
        self.block_for(source_ip, now).is_some()
    }

    /// Active block for the source, if any.
    pub fn block_for(&self, source_ip: &str, now: DateTime<Utc>) -> Option<AdvisoryBlock> {
        let block = self.blocks.get(source_ip).map(|b| b.clone())?;
        if block.is_active_at(now) {
            Some(block)
        } else {
            self.blocks.remove_if(source_ip, |_, b| !b.is_active_at(now));
            None
        }
    }

    /// Blocks in force at `now`, ordered by source address.
    pub fn active_blocks(&self, now: DateTime<Utc>) -> Vec<AdvisoryBlock> {
        self.sweep(now);
        let mut blocks: Vec<AdvisoryBlock> = self.blocks.iter().map(|b| b.clone()).collect();
        blocks.sort_by(|a, b| a.source_ip.cmp(&b.source_ip));
        blocks
    }

    /// Multiplier for the source's limits; `1.0` when not tightened.
    pub fn throttle_factor(&self, source_ip: &str, now: DateTime<Utc>) -> f64 {
        let tightening = self.tightenings.get(source_ip).map(|t| t.clone());
        match tightening {
            Some(t) if now < t.expires_at => t.factor,
            Some(_) => {
                self.tightenings.remove_if(source_ip, |_, t| now >= t.expires_at);
                1.0
            }
            None => 1.0,
        }
    }

    /// Drop lapsed entries. Returns how many were removed.
    pub fn sweep(&self, now: DateTime<Utc>) -> usize {
        let before = self.blocks.len() + self.tightenings.len();
        self.blocks.retain(|_, b| b.is_active_at(now));
        self.tightenings.retain(|_, t| now < t.expires_at);
        let removed = before.saturating_sub(self.blocks.len() + self.tightenings.len());
        if removed > 0 {
            debug!(removed, "Swept lapsed mitigations");
        }
        removed
    }
}
