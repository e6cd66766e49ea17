//! Sliding-window rate limiter for the Bastion security gateway.
//!
//! Requests are keyed by service, endpoint and source IP. Each key keeps the
//! timestamps of its admitted requests for the trailing day and is checked
//! against the burst, minute, hour and day thresholds of the first matching
//! [`RateLimitRule`](bastion_core::RateLimitRule). Sources under an active
//! tightening from the mitigation board see their limits scaled down.

#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod decision;
mod key;
mod limiter;

pub use decision::{RateLimitDecision, WindowUsage};
pub use key::RateLimitKey;
pub use limiter::RateLimiter;
