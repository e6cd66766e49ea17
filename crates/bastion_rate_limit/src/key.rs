//! Rate-limit window keys.

use derive_getters::Getters;
use serde::{Deserialize, Serialize};

/// Identity of one sliding window: service, endpoint and caller.
#[derive(
    Debug,
    Clone,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    Getters,
    derive_more::Display,
)]
#[display("{}:{}:{}", service_name, endpoint, source_ip)]
pub struct RateLimitKey {
    service_name: String,
    endpoint: String,
    source_ip: String,
}

impl RateLimitKey {
    /// Build a key.
    pub fn new(
        service_name: impl Into<String>,
        endpoint: impl Into<String>,
        source_ip: impl Into<String>,
    ) -> Self {
        Self {
            service_name: service_name.into(),
            endpoint: endpoint.into(),
            source_ip: source_ip.into(),
        }
    }
}
