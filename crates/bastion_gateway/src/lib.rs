//! Security gateway for the Bastion workspace.
//!
//! [`SecurityGateway`] is the one object external callers hold. A
//! [`SecureCallRequest`] is served in a fixed order:
//!
//! 1. the vault releases the credential (active, unexpired, source IP and
//!    target host allowed)
//! 2. the service is resolved from the target host
//! 3. the rate limiter admits the call
//! 4. the credential is injected as an auth header and the call is sent
//! 5. the outcome is recorded as an `api_request` or `api_request_failed` event
//!
//! The outbound HTTP client sits behind [`HttpTransport`] so tests can
//! substitute their own.

#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod dashboard;
mod gateway;
mod request;
mod transport;

pub use dashboard::{DashboardSnapshot, SourceActivity, TOP_SOURCE_LIMIT};
pub use gateway::{RetentionSummary, SecurityGateway, SecurityGatewayBuilder};
pub use request::{SecureCallRequest, SecureCallRequestBuilder, SecureCallRequestBuilderError};
pub use transport::{ApiResponse, HttpTransport, OutboundRequest, ReqwestTransport, TransportFailure};
