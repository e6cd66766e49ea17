//! Security gateway tests.

use async_trait::async_trait;
use bastion_core::*;
use bastion_crypto::EncryptionProvider;
use bastion_error::{CredentialDenial, GatewayErrorKind};
use bastion_gateway::*;
use bastion_storage::{InMemoryStore, SecurityStore};
use bastion_vault::NewCredentialBuilder;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Transport that records what it was asked to send.
#[derive(Debug, Default)]
struct RecordingTransport {
    calls: AtomicUsize,
    last: Mutex<Option<OutboundRequest>>,
    failure: Option<TransportFailure>,
}

impl RecordingTransport {
    fn failing(failure: TransportFailure) -> Self {
        Self {
            failure: Some(failure),
            ..Self::default()
        }
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn last(&self) -> OutboundRequest {
        self.last.lock().unwrap().clone().unwrap()
    }
}

#[async_trait]
impl HttpTransport for RecordingTransport {
    async fn send(&self, request: OutboundRequest) -> Result<ApiResponse, TransportFailure> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.last.lock().unwrap() = Some(request);
        match &self.failure {
            Some(failure) => Err(failure.clone()),
            None => Ok(ApiResponse::new(200, BTreeMap::new(), b"{}".to_vec())),
        }
    }
}

fn config() -> BastionConfig {
    BastionConfig::default().with_rate_limits(vec![
        RateLimitRule::new("openai")
            .with_requests_per_minute(2)
            .with_penalty_duration_secs(45),
    ])
}

async fn gateway_with(
    config: BastionConfig,
    transport: Arc<RecordingTransport>,
) -> (InMemoryStore, SecurityGateway) {
    let store = InMemoryStore::new();
    let gateway = SecurityGateway::builder(config)
        .store(Arc::new(store.clone()))
        .crypto(Arc::new(EncryptionProvider::ephemeral()))
        .transport(transport)
        .build()
        .await
        .unwrap();
    (store, gateway)
}

async fn openai_credential(gateway: &SecurityGateway) -> String {
    gateway
        .store_credential(
            NewCredentialBuilder::default()
                .service_name("openai")
                .secret("sk-live-123")
                .allow_ips(["10.0.0.5"])
                .allow_domains(["openai.com"])
                .build()
                .unwrap(),
        )
        .await
        .unwrap()
}

fn call(url: &str, credential_id: &str, source_ip: &str) -> SecureCallRequest {
    SecureCallRequestBuilder::default()
        .url(url)
        .credential_id(credential_id)
        .source_ip(source_ip)
        .build()
        .unwrap()
}

async fn events_of(gateway: &SecurityGateway, event_type: EventType) -> Vec<SecurityEvent> {
    gateway
        .events()
        .recent(1000)
        .await
        .into_iter()
        .filter(|e| *e.event_type() == event_type)
        .collect()
}

// ============================================================================
// Forwarding
// ============================================================================

#[tokio::test]
async fn test_credential_injected_and_request_logged() {
    let transport = Arc::new(RecordingTransport::default());
    let (_store, gateway) = gateway_with(config(), transport.clone()).await;
    let id = openai_credential(&gateway).await;

    let request = SecureCallRequestBuilder::default()
        .url("https://api.openai.com/v1/models?api_key=leaky")
        .credential_id(id.as_str())
        .source_ip("10.0.0.5")
        .header("authorization", "Bearer forged")
        .header("Accept", "application/json")
        .build()
        .unwrap();
    let response = gateway.secure_call(request).await.unwrap();
    assert_eq!(*response.status(), 200);

    let sent = transport.last();
    let auth: Vec<&(String, String)> = sent
        .headers()
        .iter()
        .filter(|(name, _)| name.eq_ignore_ascii_case("authorization"))
        .collect();
    assert_eq!(auth.len(), 1);
    assert_eq!(auth[0].1, "Bearer sk-live-123");
    assert_eq!(sent.header("accept"), Some("application/json"));

    let logged = events_of(&gateway, EventType::ApiRequest).await;
    assert_eq!(logged.len(), 1);
    assert_eq!(*logged[0].threat_level(), ThreatLevel::Info);
    assert_eq!(*logged[0].response_code(), Some(200));
    assert_eq!(logged[0].endpoint(), "https://api.openai.com/v1/models");
    assert_eq!(logged[0].metadata()["service"], "openai");
    assert!(logged[0].metadata().contains_key("latency_ms"));
}

#[tokio::test]
async fn test_reqwest_transport_against_live_server() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/models"))
        .and(header("Authorization", "Bearer sk-live-123"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"data": []})))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v1/broken"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let store = InMemoryStore::new();
    let gateway = SecurityGateway::builder(config())
        .store(Arc::new(store.clone()))
        .crypto(Arc::new(EncryptionProvider::ephemeral()))
        .build()
        .await
        .unwrap();
    let id = gateway
        .store_credential(
            NewCredentialBuilder::default()
                .service_name("openai")
                .secret("sk-live-123")
                .build()
                .unwrap(),
        )
        .await
        .unwrap();

    let response = gateway
        .secure_call(call(&format!("{}/v1/models", server.uri()), &id, "10.0.0.5"))
        .await
        .unwrap();
    assert!(response.is_success());
    let body: serde_json::Value = response.json().unwrap();
    assert_eq!(body["data"], serde_json::json!([]));

    let failed_upstream = gateway
        .secure_call(call(&format!("{}/v1/broken", server.uri()), &id, "10.0.0.5"))
        .await
        .unwrap();
    assert_eq!(*failed_upstream.status(), 503);

    let logged = events_of(&gateway, EventType::ApiRequest).await;
    let codes: Vec<Option<u16>> = logged.iter().map(|e| *e.response_code()).collect();
    assert_eq!(codes, vec![Some(200), Some(503)]);
}

// ============================================================================
// Refusals
// ============================================================================

#[tokio::test]
async fn test_source_outside_allow_list_never_reaches_upstream() {
    let transport = Arc::new(RecordingTransport::default());
    let (_store, gateway) = gateway_with(config(), transport.clone()).await;
    let id = openai_credential(&gateway).await;

    let err = gateway
        .secure_call(call("https://api.openai.com/v1/models", &id, "10.0.0.9"))
        .await
        .unwrap_err();
    assert!(matches!(
        err.kind(),
        GatewayErrorKind::CredentialDenied(CredentialDenial::AccessDenied { .. })
    ));
    assert_eq!(transport.calls(), 0);

    let denied = events_of(&gateway, EventType::IpAccessDenied).await;
    assert_eq!(denied.len(), 1);
    assert_eq!(*denied[0].threat_level(), ThreatLevel::High);
    assert_eq!(denied[0].source_ip(), "10.0.0.9");
    assert!(events_of(&gateway, EventType::ApiRequest).await.is_empty());
}

#[tokio::test]
async fn test_domain_allow_list_enforced() {
    let transport = Arc::new(RecordingTransport::default());
    let (_store, gateway) = gateway_with(config(), transport.clone()).await;
    let id = openai_credential(&gateway).await;

    let err = gateway
        .secure_call(call("https://collector.example.net/steal", &id, "10.0.0.5"))
        .await
        .unwrap_err();
    assert!(matches!(
        err.kind(),
        GatewayErrorKind::CredentialDenied(CredentialDenial::DomainDenied { .. })
    ));
    assert_eq!(transport.calls(), 0);
    assert_eq!(events_of(&gateway, EventType::DomainAccessDenied).await.len(), 1);
}

#[tokio::test]
async fn test_denials_share_one_external_message() {
    let transport = Arc::new(RecordingTransport::default());
    let (_store, gateway) = gateway_with(config(), transport).await;
    let id = openai_credential(&gateway).await;

    let missing = gateway
        .secure_call(call("https://api.openai.com/v1/models", "no-such-id", "10.0.0.5"))
        .await
        .unwrap_err();
    let wrong_ip = gateway
        .secure_call(call("https://api.openai.com/v1/models", &id, "10.0.0.9"))
        .await
        .unwrap_err();
    let wrong_host = gateway
        .secure_call(call("https://elsewhere.example.org/", &id, "10.0.0.5"))
        .await
        .unwrap_err();

    assert_eq!(missing.external_message(), wrong_ip.external_message());
    assert_eq!(missing.external_message(), wrong_host.external_message());
    assert_eq!(missing.kind().to_string(), wrong_ip.kind().to_string());
    assert!(!missing.is_fatal());
}

#[tokio::test]
async fn test_rate_limited_call_surfaces_retry_after() {
    let transport = Arc::new(RecordingTransport::default());
    let (_store, gateway) = gateway_with(config(), transport.clone()).await;
    let id = openai_credential(&gateway).await;

    for _ in 0..2 {
        gateway
            .secure_call(call("https://api.openai.com/v1/chat", &id, "10.0.0.5"))
            .await
            .unwrap();
    }
    let err = gateway
        .secure_call(call("https://api.openai.com/v1/chat", &id, "10.0.0.5"))
        .await
        .unwrap_err();

    assert_eq!(err.retry_after(), Some(Duration::from_secs(45)));
    match err.kind() {
        GatewayErrorKind::RateLimited { exceeded, .. } => {
            assert_eq!(exceeded, &vec!["minute".to_string()])
        }
        other => panic!("expected rate limit, got {:?}", other),
    }
    assert_eq!(transport.calls(), 2);
    assert_eq!(events_of(&gateway, EventType::RateLimitExceeded).await.len(), 1);
}

#[tokio::test]
async fn test_steady_traffic_under_limit_raises_no_detection() {
    let transport = Arc::new(RecordingTransport::default());
    let config = BastionConfig::default().with_rate_limits(vec![
        RateLimitRule::new("openai").with_requests_per_minute(20),
    ]);
    let (_store, gateway) = gateway_with(config, transport.clone()).await;
    let id = openai_credential(&gateway).await;

    for _ in 0..15 {
        gateway
            .secure_call(call("https://api.openai.com/v1/chat", &id, "10.0.0.5"))
            .await
            .unwrap();
    }

    assert_eq!(transport.calls(), 15);
    let detections: Vec<SecurityEvent> = gateway
        .events()
        .recent(1000)
        .await
        .into_iter()
        .filter(|e| e.event_type().is_derived())
        .collect();
    assert!(detections.is_empty());
    assert!(!gateway.mitigation().is_blocked("10.0.0.5", chrono::Utc::now()));
    assert_eq!(gateway.mitigation().throttle_factor("10.0.0.5", chrono::Utc::now()), 1.0);
}

#[tokio::test]
async fn test_invalid_request_rejected_before_vault() {
    let transport = Arc::new(RecordingTransport::default());
    let (store, gateway) = gateway_with(config(), transport.clone()).await;
    let id = openai_credential(&gateway).await;
    let before = store.event_count().await;

    let err = gateway
        .secure_call(call("ftp://api.openai.com/file", &id, "10.0.0.5"))
        .await
        .unwrap_err();
    assert!(matches!(err.kind(), GatewayErrorKind::InvalidRequest(_)));
    assert_eq!(store.event_count().await, before);
    assert_eq!(transport.calls(), 0);
}

// ============================================================================
// Transport failures
// ============================================================================

#[tokio::test]
async fn test_timeout_is_typed_and_logged() {
    let transport = Arc::new(RecordingTransport::failing(TransportFailure::Timeout));
    let (_store, gateway) = gateway_with(config(), transport.clone()).await;
    let id = openai_credential(&gateway).await;

    let err = gateway
        .secure_call(call("https://api.openai.com/v1/models", &id, "10.0.0.5"))
        .await
        .unwrap_err();
    assert!(matches!(err.kind(), GatewayErrorKind::Timeout(d) if *d == Duration::from_secs(30)));
    assert_eq!(transport.calls(), 1);

    let failed = events_of(&gateway, EventType::ApiRequestFailed).await;
    assert_eq!(failed.len(), 1);
    assert_eq!(*failed[0].threat_level(), ThreatLevel::Warning);
    assert!(failed[0].error_message().as_deref().unwrap().contains("timed out"));
}

#[tokio::test]
async fn test_network_failure_is_redacted() {
    let transport = Arc::new(RecordingTransport::failing(TransportFailure::Network(
        "connection refused".to_string(),
    )));
    let (_store, gateway) = gateway_with(config(), transport).await;
    let id = openai_credential(&gateway).await;

    let err = gateway
        .secure_call(call("https://api.openai.com/v1/models?token=abc", &id, "10.0.0.5"))
        .await
        .unwrap_err();
    assert_eq!(err.external_message(), "Upstream request failed");

    let failed = events_of(&gateway, EventType::ApiRequestFailed).await;
    assert_eq!(failed[0].error_message().as_deref(), Some("connection refused"));
    assert!(!failed[0].endpoint().contains("abc"));
    let rendered = serde_json::to_string(&failed[0]).unwrap();
    assert!(!rendered.contains("sk-live-123"));
}

// ============================================================================
// Dashboard, audit and retention
// ============================================================================

#[tokio::test]
async fn test_dashboard_reflects_activity() {
    let transport = Arc::new(RecordingTransport::default());
    let (_store, gateway) = gateway_with(config(), transport).await;
    let id = openai_credential(&gateway).await;
    gateway
        .secure_call(call("https://api.openai.com/v1/models", &id, "10.0.0.5"))
        .await
        .unwrap();

    let before_audit = gateway.get_dashboard().await.unwrap();
    assert_eq!(*before_audit.active_credential_count(), 1);
    assert_eq!(*before_audit.rate_limiter_key_count(), 1);
    assert_eq!(*before_audit.recent_events_24h(), 3);
    assert_eq!(*before_audit.system_events_24h(), 1);
    assert_eq!(before_audit.top_source_ips().len(), 1);
    assert_eq!(before_audit.top_source_ips()[0].source_ip(), "10.0.0.5");
    assert_eq!(*before_audit.top_source_ips()[0].events(), 2);
    assert!(before_audit.latest_compliance_score().is_none());
    assert!(before_audit.active_blocks().is_empty());

    let audit = gateway.run_audit("manual").await.unwrap();
    let after_audit = gateway.get_dashboard().await.unwrap();
    assert_eq!(
        *after_audit.latest_compliance_score(),
        Some(*audit.compliance_score())
    );
}

#[tokio::test]
async fn test_rule_snapshot_persisted_at_startup() {
    let transport = Arc::new(RecordingTransport::default());
    let (store, gateway) = gateway_with(config(), transport).await;
    assert_eq!(
        store.load_rate_limit_rules().await.unwrap(),
        gateway.config().rate_limits().clone()
    );

    let audit = gateway.run_audit("manual").await.unwrap();
    assert!(audit.finding("rate_limit_configuration").unwrap().passed());
}

#[tokio::test]
async fn test_retention_keeps_fresh_state() {
    let transport = Arc::new(RecordingTransport::default());
    let (store, gateway) = gateway_with(config(), transport).await;
    let id = openai_credential(&gateway).await;
    gateway
        .secure_call(call("https://api.openai.com/v1/models", &id, "10.0.0.5"))
        .await
        .unwrap();

    let summary = gateway.enforce_retention().await.unwrap();
    assert_eq!(*summary.events_purged(), 0);
    assert_eq!(*summary.rate_limit_keys_pruned(), 0);
    assert_eq!(store.event_count().await, 3);
}

#[tokio::test]
async fn test_invalid_config_refused() {
    let bad = BastionConfig::default().with_event_buffer_capacity(0usize);
    let result = SecurityGateway::builder(bad)
        .crypto(Arc::new(EncryptionProvider::ephemeral()))
        .transport(Arc::new(RecordingTransport::default()))
        .build()
        .await;
    assert!(result.is_err());
}
