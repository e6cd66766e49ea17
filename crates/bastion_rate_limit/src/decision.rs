//! Admission decisions.

use bastion_core::{RateLimitRule, Window};
use derive_getters::Getters;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Request counts in each tracked window.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, Getters,
)]
pub struct WindowUsage {
    burst: u32,
    minute: u32,
    hour: u32,
    day: u32,
}

impl WindowUsage {
    pub(crate) fn new(burst: u32, minute: u32, hour: u32, day: u32) -> Self {
        Self {
            burst,
            minute,
            hour,
            day,
        }
    }

    /// Count for a window.
    pub fn count(&self, window: Window) -> u32 {
        match window {
            Window::Burst => self.burst,
            Window::Minute => self.minute,
            Window::Hour => self.hour,
            Window::Day => self.day,
        }
    }
}

/// Outcome of [`RateLimiter::check`](crate::RateLimiter::check).
#[derive(Debug, Clone, PartialEq)]
pub enum RateLimitDecision {
    /// The request was admitted and recorded
    Allowed {
        /// Counts after recording this request
        usage: WindowUsage,
        /// Effective limits, after any tightening
        limits: RateLimitRule,
    },
    /// The request was refused and not recorded
    Rejected {
        /// Windows whose limit was reached
        exceeded: Vec<Window>,
        /// How long the caller should wait
        retry_after: Duration,
        /// Counts at the time of refusal
        usage: WindowUsage,
    },
}

impl RateLimitDecision {
    /// Whether the request was admitted.
    pub fn is_allowed(&self) -> bool {
        matches!(self, RateLimitDecision::Allowed { .. })
    }

    /// Wait time for a rejected request.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            RateLimitDecision::Allowed { .. } => None,
            RateLimitDecision::Rejected { retry_after, .. } => Some(*retry_after),
        }
    }

    /// Window counts carried by either outcome.
    pub fn usage(&self) -> &WindowUsage {
        match self {
            RateLimitDecision::Allowed { usage, .. } | RateLimitDecision::Rejected { usage, .. } => {
                usage
            }
        }
    }
}
