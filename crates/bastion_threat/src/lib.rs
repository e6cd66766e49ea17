//! Threat detection for the Bastion security gateway.
//!
//! The [`ThreatDetector`] observes the event log. Each [`ThreatPattern`] counts
//! matching events from one source address inside a trailing window; when the
//! count reaches the pattern's threshold the detector records a derived
//! `threat_detected_<name>` event and applies advisory mitigation:
//!
//! - critical detections block the source for the configured duration
//! - high detections tighten the source's rate limits and block it briefly
//! - lower levels are only recorded

#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod detector;
mod pattern;

pub use detector::ThreatDetector;
pub use pattern::{CountPattern, EventPredicate, ThreatPattern};
