//! Security event log for the Bastion security gateway.
//!
//! Every component reports what it did by appending an [`EventDraft`] to the
//! [`EventLog`]. The log stamps and scores the draft, persists it, keeps it in
//! a bounded ring buffer for fast queries and hands it to the registered
//! [`EventObserver`]s (the threat detector) before the next append begins.
//!
//! [`EventDraft`]: bastion_core::EventDraft

#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod log;
mod observer;
mod scoring;

pub use log::EventLog;
pub use observer::EventObserver;
pub use scoring::risk_score;
