//! Persistence for the Bastion security gateway.
//!
//! Every component talks to storage through [`SecurityStore`]. The default
//! [`InMemoryStore`] keeps everything in process; enable the `database`
//! feature for [`PgSecurityStore`], which persists credentials, events, the
//! rate-limit rule snapshot and audits to PostgreSQL through diesel.

#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod memory;
mod store;

#[cfg(feature = "database")]
mod models;
#[cfg(feature = "database")]
mod postgres;
#[cfg(feature = "database")]
pub mod schema;

pub use memory::InMemoryStore;
pub use store::SecurityStore;

#[cfg(feature = "database")]
pub use models::{AuditRow, CredentialRow, EventRow, NewEventRow, NewEventRowBuilder, RuleRow};
#[cfg(feature = "database")]
pub use postgres::{MIGRATIONS, PgSecurityStore};
