use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use tracing::debug;

use super::error::ApiError;
use super::request::Params;

/// Base URL for API method calls
pub const API_BASE_URL: &str = "https://api.vk.com/method";

/// HTTP request timeout in seconds.
const REQUEST_TIMEOUT_SECS: u64 = 30;

/// Executes a single remote method call.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn call(&self, method: &str, params: &Params) -> Result<Value, ApiError>;
}

/// Transport over HTTPS.
/// Clone is cheap - reqwest::Client uses Arc internally for connection pooling.
#[derive(Clone)]
pub struct HttpTransport {
    client: Client,
    base_url: String,
    api_version: String,
}

impl HttpTransport {
    pub fn new(api_version: impl Into<String>) -> Result<Self, ApiError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()?;

        Ok(Self {
            client,
            base_url: API_BASE_URL.to_string(),
            api_version: api_version.into(),
        })
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn api_version(&self) -> &str {
        &self.api_version
    }

    fn method_url(&self, method: &str) -> String {
        format!("{}/{}", self.base_url.trim_end_matches('/'), method)
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn call(&self, method: &str, params: &Params) -> Result<Value, ApiError> {
        let url = self.method_url(method);
        debug!(method, params = params.len(), "GET");

        let response = self
            .client
            .get(&url)
            .query(params)
            .query(&[("v", self.api_version.as_str())])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ApiError::from_status(status, &body));
        }

        let body: Value = response.json().await?;
        parse_envelope(body)
    }
}

/// Unwrap `{"response": ...}`, or turn `{"error": {...}}` into an `ApiError`.
pub fn parse_envelope(body: Value) -> Result<Value, ApiError> {
    if let Some(error) = body.get("error") {
        let code = error.get("error_code").and_then(Value::as_i64).unwrap_or(0);
        let message = error
            .get("error_msg")
            .and_then(Value::as_str)
            .unwrap_or("unknown error")
            .to_string();
        return Err(ApiError::from_remote(code, message));
    }

    match body {
        Value::Object(mut map) => map
            .remove("response")
            .ok_or_else(|| ApiError::InvalidResponse("missing `response` field".to_string())),
        other => Err(ApiError::InvalidResponse(format!(
            "expected a JSON object, got {}",
            other
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_envelope_response() {
        let body = json!({"response": [{"id": 1, "first_name": "Pavel"}]});
        assert_eq!(
            parse_envelope(body).unwrap(),
            json!([{"id": 1, "first_name": "Pavel"}])
        );
    }

    #[test]
    fn test_parse_envelope_error() {
        let body = json!({"error": {
            "error_code": 100,
            "error_msg": "One of the parameters specified was missing or invalid"
        }});
        match parse_envelope(body) {
            Err(ApiError::Remote { code, message }) => {
                assert_eq!(code, 100);
                assert!(message.starts_with("One of the parameters"));
            }
            other => panic!("unexpected {:?}", other),
        }

        let auth = json!({"error": {"error_code": 5, "error_msg": "User authorization failed"}});
        assert!(matches!(parse_envelope(auth), Err(ApiError::Unauthorized)));
    }

    #[test]
    fn test_parse_envelope_malformed() {
        assert!(matches!(
            parse_envelope(json!({"result": 1})),
            Err(ApiError::InvalidResponse(_))
        ));
        assert!(matches!(
            parse_envelope(json!([1, 2])),
            Err(ApiError::InvalidResponse(_))
        ));
    }

    #[test]
    fn test_method_url() {
        let transport = HttpTransport::new("5.131")
            .unwrap()
            .with_base_url("http://localhost:8080/method/");
        assert_eq!(
            transport.method_url("users.get"),
            "http://localhost:8080/method/users.get"
        );
        assert_eq!(transport.api_version(), "5.131");
    }
}
