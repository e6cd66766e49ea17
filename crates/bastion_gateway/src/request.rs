//! Secure call request.

use derive_getters::Getters;
use reqwest::Method;
use std::collections::BTreeMap;

/// A caller's request to reach a third-party API with a stored credential.
///
/// # Examples
///
/// ```
/// use bastion_gateway::SecureCallRequestBuilder;
///
/// let request = SecureCallRequestBuilder::default()
///     .url("https://api.openai.com/v1/models")
///     .credential_id("cred-1")
///     .source_ip("10.0.0.5")
///     .header("Accept", "application/json")
///     .build()
///     .unwrap();
/// assert_eq!(request.method(), &reqwest::Method::GET);
/// ```
#[derive(Debug, Clone, Getters, derive_builder::Builder)]
#[builder(setter(into))]
pub struct SecureCallRequest {
    /// HTTP method
    #[builder(default = "Method::GET")]
    method: Method,
    /// Absolute upstream URL
    url: String,
    /// Stored credential to inject
    credential_id: String,
    /// Address of the caller
    source_ip: String,
    /// Request body
    #[builder(default, setter(into, strip_option))]
    body: Option<Vec<u8>>,
    /// Extra request headers
    #[builder(default)]
    headers: BTreeMap<String, String>,
}

impl SecureCallRequestBuilder {
    /// Add one request header.
    pub fn header(&mut self, name: impl Into<String>, value: impl Into<String>) -> &mut Self {
        self.headers
            .get_or_insert_with(BTreeMap::new)
            .insert(name.into(), value.into());
        self
    }

    /// JSON body with a matching content type.
    pub fn json_body(&mut self, value: &serde_json::Value) -> &mut Self {
        self.body = Some(Some(value.to_string().into_bytes()));
        self.header("Content-Type", "application/json")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_credential_rejected() {
        let result = SecureCallRequestBuilder::default()
            .url("https://api.github.com/user")
            .source_ip("10.0.0.5")
            .build();
        assert!(result.is_err());
    }

    #[test]
    fn test_json_body_sets_content_type() {
        let request = SecureCallRequestBuilder::default()
            .method(Method::POST)
            .url("https://api.stripe.com/v1/charges")
            .credential_id("c")
            .source_ip("10.0.0.5")
            .json_body(&serde_json::json!({"amount": 100}))
            .build()
            .unwrap();
        assert_eq!(request.headers().get("Content-Type").unwrap(), "application/json");
        assert_eq!(request.body().as_deref(), Some(br#"{"amount":100}"#.as_slice()));
    }
}
