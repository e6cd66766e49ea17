//! Bastion: a security-compliance gateway for third-party API calls.
//!
//! Callers never hold third-party secrets. They store a credential once,
//! then ask the [`SecurityGateway`] to make calls with it. Each call is
//! checked against the credential's access rules and the caller's rate
//! limits, recorded as a scored security event and fed to the threat
//! detector. Compliance audits score the resulting state on demand.
//!
//! # Example
//!
//! ```no_run
//! use bastion::{NewCredentialBuilder, SecureCallRequestBuilder};
//!
//! # async fn demo() -> Result<(), Box<dyn std::error::Error>> {
//! let gateway = bastion::open("bastion.toml").await?;
//!
//! let id = gateway
//!     .store_credential(
//!         NewCredentialBuilder::default()
//!             .service_name("openai")
//!             .secret("sk-live-123")
//!             .allow_ips(["10.0.0.5"])
//!             .build()?,
//!     )
//!     .await?;
//!
//! let response = gateway
//!     .secure_call(
//!         SecureCallRequestBuilder::default()
//!             .url("https://api.openai.com/v1/models")
//!             .credential_id(id)
//!             .source_ip("10.0.0.5")
//!             .build()?,
//!     )
//!     .await?;
//! println!("{}", response.status());
//!
//! let audit = gateway.run_audit("manual").await?;
//! println!("compliance score {}", audit.compliance_score());
//! # Ok(())
//! # }
//! ```
//!
//! # Features
//!
//! - `database`: PostgreSQL persistence through `PgSecurityStore`

#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub use bastion_audit::{Auditor, AuditState, AuditStateBuilder, ComplianceRule, builtin_rules};
pub use bastion_core::observability::init_tracing;
pub use bastion_core::{
    AccessLevel, AdvisoryBlock, AuditStatus, BastionConfig, Credential, CredentialSummary,
    EncryptionConfig, EventDraft, EventType, Finding, FindingStatus, HttpConfig,
    IpReputationChecker, LogFormat, LoggingConfig, MitigationBoard, RateLimitRule, Reputation,
    SecurityAudit, SecurityEvent, ServiceProfile, Severity, StaticIpReputation, ThreatConfig,
    ThreatLevel, Window,
};
pub use bastion_crypto::{EncryptionProvider, KeyFileStatus};
pub use bastion_error::{
    AuditError, BastionError, BastionErrorKind, BastionResult, ConfigError, CredentialDenial,
    CryptoError, GatewayError, GatewayErrorKind, GatewayResult, RateLimitError, StorageError,
    VaultError,
};
pub use bastion_events::{EventLog, EventObserver};
pub use bastion_gateway::{
    ApiResponse, DashboardSnapshot, HttpTransport, OutboundRequest, ReqwestTransport,
    RetentionSummary, SecureCallRequest, SecureCallRequestBuilder, SecurityGateway,
    SecurityGatewayBuilder, SourceActivity, TransportFailure,
};
pub use bastion_rate_limit::{RateLimitDecision, RateLimitKey, RateLimiter, WindowUsage};
#[cfg(feature = "database")]
pub use bastion_storage::PgSecurityStore;
pub use bastion_storage::{InMemoryStore, SecurityStore};
pub use bastion_threat::{CountPattern, EventPredicate, ThreatDetector, ThreatPattern};
pub use bastion_vault::{
    CredentialAccess, CredentialVault, GrantedCredential, NewCredential, NewCredentialBuilder,
    SecretValue,
};

use std::path::Path;

/// Load configuration from `path`, install tracing and build a gateway with
/// default components.
///
/// The encryption passphrase is read from the variable named by
/// `encryption.passphrase_env`.
#[tracing::instrument(skip(path), fields(path = %path.as_ref().display()))]
pub async fn open(path: impl AsRef<Path>) -> BastionResult<SecurityGateway> {
    let config = BastionConfig::from_file(path)?;
    init_tracing(config.logging());
    SecurityGateway::builder(config).build().await
}
