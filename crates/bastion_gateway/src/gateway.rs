//! Security gateway.

use crate::{
    ApiResponse, DashboardSnapshot, HttpTransport, OutboundRequest, ReqwestTransport,
    SecureCallRequest, TransportFailure,
};
use bastion_audit::Auditor;
use bastion_core::{
    BastionConfig, EventDraft, EventType, IpReputationChecker, MitigationBoard, SecurityAudit,
    ServiceProfile, StaticIpReputation, ThreatLevel, saturating_sub,
};
use bastion_crypto::EncryptionProvider;
use bastion_error::{AuditResult, BastionResult, GatewayError, GatewayErrorKind, GatewayResult};
use bastion_events::EventLog;
use bastion_rate_limit::{RateLimitDecision, RateLimiter};
use bastion_storage::{InMemoryStore, SecurityStore};
use bastion_threat::ThreatDetector;
use bastion_vault::{CredentialVault, GrantedCredential, NewCredential};
use chrono::Utc;
use derive_getters::Getters;
use reqwest::Url;
use reqwest::header::{HeaderName, HeaderValue};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, instrument, warn};

const DASHBOARD_WINDOW: Duration = Duration::from_secs(24 * 60 * 60);

/// What a retention pass removed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, Getters)]
pub struct RetentionSummary {
    /// Durable events older than the retention window
    events_purged: usize,
    /// Rate-limit keys with no activity in the last day
    rate_limit_keys_pruned: usize,
    /// Lapsed advisory blocks and tightenings
    mitigations_swept: usize,
}

/// Builder for [`SecurityGateway`].
///
/// Anything not supplied gets a default: an in-memory store, a key opened
/// from the configured key file and passphrase variable, the configured
/// static IP reputation list and a `reqwest` transport.
#[derive(Debug)]
pub struct SecurityGatewayBuilder {
    config: BastionConfig,
    store: Option<Arc<dyn SecurityStore>>,
    crypto: Option<Arc<EncryptionProvider>>,
    transport: Option<Arc<dyn HttpTransport>>,
    reputation: Option<Arc<dyn IpReputationChecker>>,
}

impl SecurityGatewayBuilder {
    /// Sets the persistence backend.
    pub fn store(mut self, store: Arc<dyn SecurityStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Sets the encryption provider.
    pub fn crypto(mut self, crypto: Arc<EncryptionProvider>) -> Self {
        self.crypto = Some(crypto);
        self
    }

    /// Sets the outbound HTTP transport.
    pub fn transport(mut self, transport: Arc<dyn HttpTransport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Sets the IP reputation checker.
    pub fn reputation(mut self, reputation: Arc<dyn IpReputationChecker>) -> Self {
        self.reputation = Some(reputation);
        self
    }

    /// Wire the components together and persist the rate-limit rule snapshot.
    #[instrument(skip(self))]
    pub async fn build(self) -> BastionResult<SecurityGateway> {
        let config = self.config;
        config.validate()?;

        let store: Arc<dyn SecurityStore> = match self.store {
            Some(store) => store,
            None => Arc::new(InMemoryStore::new()),
        };
        let crypto = match self.crypto {
            Some(crypto) => crypto,
            None => Arc::new(EncryptionProvider::open_from_env(config.encryption())?),
        };
        let reputation: Arc<dyn IpReputationChecker> = match self.reputation {
            Some(reputation) => reputation,
            None => Arc::new(StaticIpReputation::from_config(config.threat())),
        };
        let transport: Arc<dyn HttpTransport> = match self.transport {
            Some(transport) => transport,
            None => Arc::new(ReqwestTransport::new(config.http())?),
        };

        let mitigation = Arc::new(MitigationBoard::new());
        let detector = ThreatDetector::new(
            config.threat().clone(),
            reputation.clone(),
            mitigation.clone(),
        );
        let events = Arc::new(
            EventLog::new(store.clone(), reputation, *config.event_buffer_capacity())
                .with_observer(Arc::new(detector)),
        );
        let vault = Arc::new(CredentialVault::new(
            store.clone(),
            crypto.clone(),
            events.clone(),
        ));
        let limiter = Arc::new(RateLimiter::new(
            config.rate_limits(),
            mitigation.clone(),
            events.clone(),
        )?);
        store.replace_rate_limit_rules(config.rate_limits()).await?;
        let auditor = Auditor::new(store.clone(), crypto, &config);

        info!(
            rules = config.rate_limits().len(),
            services = config.service_profiles().len(),
            "Security gateway ready"
        );
        Ok(SecurityGateway {
            profiles: config.service_profiles(),
            config,
            store,
            events,
            vault,
            limiter,
            mitigation,
            auditor,
            transport,
        })
    }
}

/// Single entry point for credentialed outbound API calls.
///
/// Owns the vault, rate limiter, event log, threat detector and auditor.
/// Every call is checked against the credential's access rules and the
/// caller's rate limits before the credential is injected.
#[derive(Debug)]
pub struct SecurityGateway {
    config: BastionConfig,
    profiles: Vec<ServiceProfile>,
    store: Arc<dyn SecurityStore>,
    events: Arc<EventLog>,
    vault: Arc<CredentialVault>,
    limiter: Arc<RateLimiter>,
    mitigation: Arc<MitigationBoard>,
    auditor: Auditor,
    transport: Arc<dyn HttpTransport>,
}

impl SecurityGateway {
    /// Start building a gateway from configuration.
    pub fn builder(config: BastionConfig) -> SecurityGatewayBuilder {
        SecurityGatewayBuilder {
            config,
            store: None,
            crypto: None,
            transport: None,
            reputation: None,
        }
    }

    /// Seal and store a credential. Returns its id.
    pub async fn store_credential(&self, request: NewCredential) -> GatewayResult<String> {
        Ok(self.vault.store(request).await?)
    }

    /// Forward a request upstream with the stored credential injected.
    ///
    /// The credential is checked first, then the caller's rate limit; only
    /// then is the upstream contacted. Any upstream status is returned as a
    /// response. Timeouts and network failures are errors and are not retried.
    #[instrument(
        skip(self, request),
        fields(method = %request.method(), credential_id = %request.credential_id(), source_ip = %request.source_ip())
    )]
    pub async fn secure_call(&self, request: SecureCallRequest) -> GatewayResult<ApiResponse> {
        let url = parse_url(request.url())?;
        validate_headers(&request)?;
        let host = url.host_str().unwrap_or_default().to_string();
        let endpoint = redacted_endpoint(&url);

        let GrantedCredential { credential, secret } = self
            .vault
            .get_for_host(request.credential_id(), request.source_ip(), &host)
            .await?
            .into_result()
            .inspect_err(|denial| warn!(?denial, "Credential refused"))?;

        let profile = self.profile_for(&host, credential.service_name());
        let service = profile.name().clone();
        debug!(service = %service, host = %host, "Resolved service");

        if self.mitigation.is_blocked(request.source_ip(), Utc::now()) {
            debug!("Source is under an advisory block");
        }

        let decision = self
            .limiter
            .check(&service, url.path(), request.source_ip())
            .await?;
        if let RateLimitDecision::Rejected {
            exceeded,
            retry_after,
            ..
        } = decision
        {
            return Err(GatewayError::new(GatewayErrorKind::RateLimited {
                retry_after,
                exceeded: exceeded.iter().map(ToString::to_string).collect(),
            }));
        }

        let mut headers: Vec<(String, String)> = request
            .headers()
            .iter()
            .filter(|(name, _)| !name.eq_ignore_ascii_case(profile.auth_header()))
            .map(|(name, value)| (name.clone(), value.clone()))
            .collect();
        headers.push((
            profile.auth_header().clone(),
            profile.header_value(secret.expose()),
        ));
        drop(secret);

        let timeout = self.config.http().timeout();
        let outbound = OutboundRequest::new(
            request.method().clone(),
            url,
            headers,
            request.body().clone(),
            timeout,
        );

        let start = Instant::now();
        let result = self.transport.send(outbound).await;
        let latency = start.elapsed();

        let draft_base = |event_type: EventType, level: ThreatLevel| {
            EventDraft::new(event_type, level, request.source_ip().clone())
                .with_endpoint(endpoint.clone())
                .with_credential_id(credential.id().clone())
                .with_detail("service", service.clone())
                .with_detail("method", request.method().as_str())
                .with_detail("latency_ms", latency.as_millis() as u64)
        };

        match result {
            Ok(response) => {
                info!(
                    status = *response.status(),
                    latency_ms = latency.as_millis() as u64,
                    "Upstream call completed"
                );
                self.events
                    .append(
                        draft_base(EventType::ApiRequest, ThreatLevel::Info)
                            .with_response_code(*response.status())
                            .with_action_taken("forwarded"),
                    )
                    .await?;
                Ok(response.with_latency(latency))
            }
            Err(failure) => {
                let (message, kind) = match failure {
                    TransportFailure::Timeout => (
                        format!("request timed out after {}s", timeout.as_secs()),
                        GatewayErrorKind::Timeout(timeout),
                    ),
                    TransportFailure::Network(message) => {
                        (message.clone(), GatewayErrorKind::Transport(message))
                    }
                };
                warn!(error = %message, latency_ms = latency.as_millis() as u64, "Upstream call failed");
                self.events
                    .append(
                        draft_base(EventType::ApiRequestFailed, ThreatLevel::Warning)
                            .with_error_message(message)
                            .with_action_taken("failed"),
                    )
                    .await?;
                Err(GatewayError::new(kind))
            }
        }
    }

    /// Run and persist a compliance audit.
    pub async fn run_audit(&self, audit_type: &str) -> AuditResult<SecurityAudit> {
        self.auditor.run_audit(audit_type).await
    }

    /// Current activity summary.
    #[instrument(skip(self))]
    pub async fn get_dashboard(&self) -> GatewayResult<DashboardSnapshot> {
        let now = Utc::now();
        let recent = self
            .events
            .recent_since(saturating_sub(now, DASHBOARD_WINDOW))
            .await;
        let active_credentials = self.vault.active_count().await?;
        let latest_score = self
            .store
            .latest_audit()
            .await?
            .map(|audit| *audit.compliance_score());

        Ok(DashboardSnapshot::build(
            now,
            &recent,
            active_credentials,
            self.limiter.key_count(),
            latest_score,
            self.mitigation.active_blocks(now),
        ))
    }

    /// Purge events past the retention window and drop idle limiter state
    /// and lapsed mitigations.
    #[instrument(skip(self))]
    pub async fn enforce_retention(&self) -> GatewayResult<RetentionSummary> {
        let now = Utc::now();
        let summary = RetentionSummary {
            events_purged: self.events.purge_expired(self.config.retention()).await?,
            rate_limit_keys_pruned: self.limiter.prune_idle(now),
            mitigations_swept: self.mitigation.sweep(now),
        };
        info!(?summary, "Retention enforced");
        Ok(summary)
    }

    /// Gateway configuration.
    pub fn config(&self) -> &BastionConfig {
        &self.config
    }

    /// Credential vault, for rotation and deactivation.
    pub fn vault(&self) -> &CredentialVault {
        &self.vault
    }

    /// Rate limiter.
    pub fn limiter(&self) -> &RateLimiter {
        &self.limiter
    }

    /// Security event log.
    pub fn events(&self) -> &EventLog {
        &self.events
    }

    /// Advisory mitigation board.
    pub fn mitigation(&self) -> &MitigationBoard {
        &self.mitigation
    }

    /// Compliance auditor.
    pub fn auditor(&self) -> &Auditor {
        &self.auditor
    }

    fn profile_for(&self, host: &str, credential_service: &str) -> ServiceProfile {
        self.profiles
            .iter()
            .find(|profile| profile.matches_host(host))
            .or_else(|| {
                self.profiles
                    .iter()
                    .find(|profile| profile.name() == credential_service)
            })
            .cloned()
            .unwrap_or_else(|| ServiceProfile::bearer(credential_service, &[]))
    }
}

fn invalid(message: impl Into<String>) -> GatewayError {
    GatewayError::new(GatewayErrorKind::InvalidRequest(message.into()))
}

fn parse_url(raw: &str) -> GatewayResult<Url> {
    let url = Url::parse(raw).map_err(|e| invalid(format!("malformed URL: {}", e)))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(invalid(format!("unsupported scheme {}", url.scheme())));
    }
    if url.host_str().is_none_or(str::is_empty) {
        return Err(invalid("URL has no host"));
    }
    Ok(url)
}

fn validate_headers(request: &SecureCallRequest) -> GatewayResult<()> {
    for (name, value) in request.headers() {
        HeaderName::from_bytes(name.as_bytes())
            .map_err(|_| invalid(format!("invalid header name {}", name)))?;
        HeaderValue::from_str(value)
            .map_err(|_| invalid(format!("invalid value for header {}", name)))?;
    }
    Ok(())
}

/// URL as recorded in events: no query string, fragment or userinfo.
fn redacted_endpoint(url: &Url) -> String {
    let mut endpoint = url.clone();
    endpoint.set_query(None);
    endpoint.set_fragment(None);
    let _ = endpoint.set_username("");
    let _ = endpoint.set_password(None);
    endpoint.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_redacted_endpoint_strips_query_and_userinfo() {
        let url = Url::parse("https://user:pw@api.example.com/v1/items?key=sk-123#frag").unwrap();
        assert_eq!(redacted_endpoint(&url), "https://api.example.com/v1/items");
    }

    #[test]
    fn test_parse_url_rejects_non_http() {
        assert!(parse_url("ftp://files.example.com/a").is_err());
        assert!(parse_url("not a url").is_err());
        assert!(parse_url("https://api.github.com/user").is_ok());
    }
}
