//! Gateway configuration.
//!
//! Configuration is read from a TOML file with `BASTION__*` environment
//! overrides layered on top, e.g. `BASTION__HTTP__TIMEOUT_SECS=5`.

use crate::RateLimitRule;
use bastion_error::ConfigError;
use derive_getters::Getters;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Lowest PBKDF2 iteration count accepted.
pub const MIN_KDF_ITERATIONS: u32 = 100_000;

/// Top-level gateway configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Getters, derive_setters::Setters)]
#[setters(prefix = "with_")]
pub struct BastionConfig {
    /// Key derivation and key file settings
    #[serde(default)]
    encryption: EncryptionConfig,
    /// Per-service rate-limit rules, first match wins
    #[serde(default)]
    rate_limits: Vec<RateLimitRule>,
    /// Upstream services and how credentials are injected
    #[serde(default)]
    services: Vec<ServiceProfile>,
    /// Maximum credential age before rotation is due
    #[serde(default = "default_rotation_days")]
    rotation_max_age_days: u32,
    /// Days between scheduled audits
    #[serde(default = "default_audit_interval_days")]
    audit_interval_days: u32,
    /// Days security events are retained
    #[serde(default = "default_retention_days")]
    retention_days: u32,
    /// In-memory event buffer size
    #[serde(default = "default_event_buffer_capacity")]
    event_buffer_capacity: usize,
    /// Outbound HTTP settings
    #[serde(default)]
    http: HttpConfig,
    /// Threat detection and mitigation settings
    #[serde(default)]
    threat: ThreatConfig,
    /// Tracing subscriber settings
    #[serde(default)]
    logging: LoggingConfig,
}

fn default_rotation_days() -> u32 {
    30
}

fn default_audit_interval_days() -> u32 {
    30
}

fn default_retention_days() -> u32 {
    90
}

fn default_event_buffer_capacity() -> usize {
    10_000
}

impl Default for BastionConfig {
    fn default() -> Self {
        Self {
            encryption: EncryptionConfig::default(),
            rate_limits: Vec::new(),
            services: Vec::new(),
            rotation_max_age_days: default_rotation_days(),
            audit_interval_days: default_audit_interval_days(),
            retention_days: default_retention_days(),
            event_buffer_capacity: default_event_buffer_capacity(),
            http: HttpConfig::default(),
            threat: ThreatConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl BastionConfig {
    /// Load configuration from a TOML file, applying `BASTION__*` overrides.
    #[tracing::instrument(skip(path), fields(path = %path.as_ref().display()))]
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let settings = config::Config::builder()
            .add_source(
                config::File::from(path.as_ref())
                    .format(config::FileFormat::Toml)
                    .required(true),
            )
            .add_source(
                config::Environment::with_prefix("BASTION")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .map_err(|e| ConfigError::new(format!("Failed to read config: {}", e)))?;

        let config: Self = settings
            .try_deserialize()
            .map_err(|e| ConfigError::new(format!("Failed to parse config: {}", e)))?;
        config.validate()?;
        tracing::debug!(
            rules = config.rate_limits.len(),
            services = config.services.len(),
            "Loaded configuration"
        );
        Ok(config)
    }

    /// Parse configuration from a TOML string.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)
            .map_err(|e| ConfigError::new(format!("Failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values the gateway cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.encryption.iterations < MIN_KDF_ITERATIONS {
            return Err(ConfigError::new(format!(
                "encryption.iterations must be at least {}, got {}",
                MIN_KDF_ITERATIONS, self.encryption.iterations
            )));
        }
        if self.event_buffer_capacity == 0 {
            return Err(ConfigError::new("event_buffer_capacity must be positive"));
        }
        if self.http.timeout_secs == 0 {
            return Err(ConfigError::new("http.timeout_secs must be positive"));
        }
        if !(self.threat.tighten_factor > 0.0 && self.threat.tighten_factor <= 1.0) {
            return Err(ConfigError::new(format!(
                "threat.tighten_factor must be in (0, 1], got {}",
                self.threat.tighten_factor
            )));
        }
        for (index, rule) in self.rate_limits.iter().enumerate() {
            if rule.service_name().is_empty() {
                return Err(ConfigError::new(format!(
                    "rate_limits[{}]: service_name is empty",
                    index
                )));
            }
        }
        for (index, service) in self.services.iter().enumerate() {
            if service.name.is_empty() || service.domains.is_empty() {
                return Err(ConfigError::new(format!(
                    "services[{}]: name and domains are required",
                    index
                )));
            }
        }
        Ok(())
    }

    /// Configured service profiles, or the built-in table when none are set.
    pub fn service_profiles(&self) -> Vec<ServiceProfile> {
        if self.services.is_empty() {
            ServiceProfile::well_known()
        } else {
            self.services.clone()
        }
    }

    /// Maximum credential age as a duration.
    pub fn rotation_max_age(&self) -> Duration {
        days(self.rotation_max_age_days)
    }

    /// Interval between audits.
    pub fn audit_interval(&self) -> Duration {
        days(self.audit_interval_days)
    }

    /// Event retention window.
    pub fn retention(&self) -> Duration {
        days(self.retention_days)
    }
}

fn days(n: u32) -> Duration {
    Duration::from_secs(u64::from(n) * 24 * 60 * 60)
}

/// Key derivation and key file settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Getters, derive_setters::Setters)]
#[setters(prefix = "with_", into)]
pub struct EncryptionConfig {
    /// Where the derived key and salt are persisted
    #[serde(default = "default_key_file")]
    key_file: PathBuf,
    /// Environment variable holding the master passphrase
    #[serde(default = "default_passphrase_env")]
    passphrase_env: String,
    /// PBKDF2 iteration count
    #[serde(default = "default_iterations")]
    iterations: u32,
}

fn default_key_file() -> PathBuf {
    PathBuf::from("bastion.key")
}

fn default_passphrase_env() -> String {
    "BASTION_MASTER_PASSPHRASE".to_string()
}

fn default_iterations() -> u32 {
    MIN_KDF_ITERATIONS
}

impl Default for EncryptionConfig {
    fn default() -> Self {
        Self {
            key_file: default_key_file(),
            passphrase_env: default_passphrase_env(),
            iterations: default_iterations(),
        }
    }
}

/// How a service is recognised and how credentials are injected for it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Getters)]
pub struct ServiceProfile {
    /// Service name used for rate-limit rules
    name: String,
    /// Host suffixes that identify the service
    domains: BTreeSet<String>,
    /// Header carrying the credential
    #[serde(default = "default_auth_header")]
    auth_header: String,
    /// Scheme prefixed to the credential; empty sends the raw value
    #[serde(default = "default_auth_scheme")]
    auth_scheme: String,
}

fn default_auth_header() -> String {
    "Authorization".to_string()
}

fn default_auth_scheme() -> String {
    "Bearer".to_string()
}

impl ServiceProfile {
    /// Profile sending `Authorization: Bearer <value>`.
    pub fn bearer(name: impl Into<String>, domains: &[&str]) -> Self {
        Self {
            name: name.into(),
            domains: domains.iter().map(|d| d.to_string()).collect(),
            auth_header: default_auth_header(),
            auth_scheme: default_auth_scheme(),
        }
    }

    /// Profile sending the raw value in a custom header.
    pub fn header(name: impl Into<String>, domains: &[&str], header: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            domains: domains.iter().map(|d| d.to_string()).collect(),
            auth_header: header.into(),
            auth_scheme: String::new(),
        }
    }

    /// Built-in table of common API hosts.
    pub fn well_known() -> Vec<Self> {
        vec![
            Self::bearer("openai", &["openai.com"]),
            Self::header("anthropic", &["anthropic.com"], "x-api-key"),
            Self::header("gemini", &["generativelanguage.googleapis.com"], "x-goog-api-key"),
            Self::bearer("github", &["github.com", "githubusercontent.com"]),
            Self::bearer("reddit", &["reddit.com"]),
            Self::bearer("twitter", &["twitter.com", "x.com"]),
            Self::bearer("newsapi", &["newsapi.org"]),
            Self::bearer("stripe", &["stripe.com"]),
            Self::header("printful", &["printful.com"], "Authorization"),
            Self::bearer("mailchimp", &["mailchimp.com", "api.mailchimp.com"]),
        ]
    }

    /// Whether `host` belongs to this service.
    pub fn matches_host(&self, host: &str) -> bool {
        let host = host.to_ascii_lowercase();
        self.domains.iter().any(|domain| {
            let domain = domain.to_ascii_lowercase();
            host == domain || host.ends_with(&format!(".{}", domain))
        })
    }

    /// Header value for a credential.
    pub fn header_value(&self, secret: &str) -> String {
        if self.auth_scheme.is_empty() {
            secret.to_string()
        } else {
            format!("{} {}", self.auth_scheme, secret)
        }
    }
}

/// Outbound HTTP settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Getters)]
pub struct HttpConfig {
    /// Whole-request timeout
    #[serde(default = "default_timeout_secs")]
    timeout_secs: u64,
    /// Connection establishment timeout
    #[serde(default = "default_connect_timeout_secs")]
    connect_timeout_secs: u64,
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_connect_timeout_secs() -> u64 {
    10
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
            connect_timeout_secs: default_connect_timeout_secs(),
        }
    }
}

impl HttpConfig {
    /// Whole-request timeout.
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Connect timeout.
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}

/// Threat detection and mitigation settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Getters, derive_setters::Setters)]
#[setters(prefix = "with_")]
pub struct ThreatConfig {
    /// Addresses the reputation checker treats as malicious
    #[serde(default)]
    known_malicious_ips: BTreeSet<String>,
    /// Advisory block length for critical detections
    #[serde(default = "default_block_secs")]
    block_duration_secs: u64,
    /// Advisory block length for high detections
    #[serde(default = "default_high_block_secs")]
    high_block_duration_secs: u64,
    /// Multiplier applied to rate limits of a tightened source
    #[serde(default = "default_tighten_factor")]
    tighten_factor: f64,
    /// How long a tightening lasts
    #[serde(default = "default_tighten_secs")]
    tighten_duration_secs: u64,
}

fn default_block_secs() -> u64 {
    3600
}

fn default_high_block_secs() -> u64 {
    900
}

fn default_tighten_factor() -> f64 {
    0.5
}

fn default_tighten_secs() -> u64 {
    900
}

impl Default for ThreatConfig {
    fn default() -> Self {
        Self {
            known_malicious_ips: BTreeSet::new(),
            block_duration_secs: default_block_secs(),
            high_block_duration_secs: default_high_block_secs(),
            tighten_factor: default_tighten_factor(),
            tighten_duration_secs: default_tighten_secs(),
        }
    }
}

/// Log line format.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable lines
    #[default]
    Plain,
    /// One JSON object per line
    Json,
}

/// Tracing subscriber settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Getters)]
pub struct LoggingConfig {
    /// Output format
    #[serde(default)]
    format: LogFormat,
    /// Filter directive used when `RUST_LOG` is unset
    #[serde(default = "default_filter")]
    filter: String,
}

fn default_filter() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            format: LogFormat::default(),
            filter: default_filter(),
        }
    }
}

impl LoggingConfig {
    /// Settings with an explicit format and filter.
    pub fn new(format: LogFormat, filter: impl Into<String>) -> Self {
        Self {
            format,
            filter: filter.into(),
        }
    }
}
