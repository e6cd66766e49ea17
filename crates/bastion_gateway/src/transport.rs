//! Outbound HTTP transport.

use async_trait::async_trait;
use bastion_core::HttpConfig;
use bastion_error::{GatewayError, GatewayErrorKind, GatewayResult};
use derive_getters::Getters;
use reqwest::{Client, Method, Url};
use serde::de::DeserializeOwned;
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::debug;

/// A fully prepared outbound call, credential header included.
///
/// `Debug` lists header names only.
#[derive(Clone, Getters)]
pub struct OutboundRequest {
    method: Method,
    url: Url,
    headers: Vec<(String, String)>,
    body: Option<Vec<u8>>,
    timeout: Duration,
}

impl OutboundRequest {
    /// Assemble a request.
    pub fn new(
        method: Method,
        url: Url,
        headers: Vec<(String, String)>,
        body: Option<Vec<u8>>,
        timeout: Duration,
    ) -> Self {
        Self {
            method,
            url,
            headers,
            body,
            timeout,
        }
    }

    /// Value of a header, matched case-insensitively.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

impl std::fmt::Debug for OutboundRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: Vec<&str> = self.headers.iter().map(|(n, _)| n.as_str()).collect();
        f.debug_struct("OutboundRequest")
            .field("method", &self.method)
            .field("url", &self.url.as_str())
            .field("headers", &names)
            .field("body_len", &self.body.as_ref().map_or(0, Vec::len))
            .field("timeout", &self.timeout)
            .finish()
    }
}

/// Upstream response.
#[derive(Debug, Clone, PartialEq, Eq, Getters)]
pub struct ApiResponse {
    status: u16,
    headers: BTreeMap<String, String>,
    body: Vec<u8>,
    latency: Duration,
}

impl ApiResponse {
    /// Response as received; latency is stamped by the gateway.
    pub fn new(status: u16, headers: BTreeMap<String, String>, body: Vec<u8>) -> Self {
        Self {
            status,
            headers,
            body,
            latency: Duration::ZERO,
        }
    }

    pub(crate) fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Whether the status is 2xx.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Body as text, replacing invalid UTF-8.
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    /// Body parsed as JSON.
    pub fn json<T: DeserializeOwned>(&self) -> serde_json::Result<T> {
        serde_json::from_slice(&self.body)
    }
}

/// Why an outbound call produced no response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportFailure {
    /// The call exceeded its timeout
    Timeout,
    /// Connection or protocol failure; the message never contains the URL
    Network(String),
}

/// Sends prepared requests upstream.
#[async_trait]
pub trait HttpTransport: Send + Sync + std::fmt::Debug {
    /// Perform the call. Must not retry.
    async fn send(&self, request: OutboundRequest) -> Result<ApiResponse, TransportFailure>;
}

/// [`HttpTransport`] backed by a shared `reqwest` client.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: Client,
}

impl ReqwestTransport {
    /// Client with the configured timeouts.
    pub fn new(config: &HttpConfig) -> GatewayResult<Self> {
        let client = Client::builder()
            .timeout(config.timeout())
            .connect_timeout(config.connect_timeout())
            .build()
            .map_err(|e| GatewayError::new(GatewayErrorKind::Transport(e.without_url().to_string())))?;
        Ok(Self { client })
    }
}

fn classify(err: reqwest::Error) -> TransportFailure {
    if err.is_timeout() {
        TransportFailure::Timeout
    } else {
        TransportFailure::Network(err.without_url().to_string())
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn send(&self, request: OutboundRequest) -> Result<ApiResponse, TransportFailure> {
        let OutboundRequest {
            method,
            url,
            headers,
            body,
            timeout,
        } = request;

        let mut builder = self.client.request(method, url).timeout(timeout);
        for (name, value) in &headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(body) = body {
            builder = builder.body(body);
        }

        let response = builder.send().await.map_err(classify)?;
        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_string(), v.to_string()))
            })
            .collect();
        let body = response.bytes().await.map_err(classify)?.to_vec();
        debug!(status, bytes = body.len(), "Upstream responded");
        Ok(ApiResponse::new(status, headers, body))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_debug_hides_header_values() {
        let request = OutboundRequest::new(
            Method::GET,
            Url::parse("https://api.openai.com/v1/models").unwrap(),
            vec![("Authorization".to_string(), "Bearer sk-live-123".to_string())],
            None,
            Duration::from_secs(5),
        );
        let rendered = format!("{:?}", request);
        assert!(rendered.contains("Authorization"));
        assert!(!rendered.contains("sk-live-123"));
        assert_eq!(request.header("authorization"), Some("Bearer sk-live-123"));
    }

    #[test]
    fn test_response_helpers() {
        let response = ApiResponse::new(201, BTreeMap::new(), br#"{"ok":true}"#.to_vec());
        assert!(response.is_success());
        let value: serde_json::Value = response.json().unwrap();
        assert_eq!(value["ok"], true);
    }
}
