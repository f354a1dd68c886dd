use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::Value;
use tokio::task::JoinHandle;
use tracing::debug;

use super::client::ApiClient;
use super::error::ApiError;
use super::methods::Endpoint;

/// Parameter key the access token travels under
pub const ACCESS_TOKEN_KEY: &str = "access_token";

/// Query parameters of one API call, kept sorted so equal parameter sets
/// produce equal cache keys.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Params(BTreeMap<String, String>);

impl Params {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.insert(key, value);
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl ToString) -> Option<String> {
        self.0.insert(key.into(), value.to_string())
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    pub fn remove(&mut self, key: &str) -> Option<String> {
        self.0.remove(key)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Set the access token, overwriting whatever the caller put there.
    pub fn with_token(mut self, token: &str) -> Self {
        self.0.insert(ACCESS_TOKEN_KEY.to_string(), token.to_string());
        self
    }

    /// Every parameter except the access token.
    pub fn without_token(&self) -> impl Iterator<Item = (&str, &str)> {
        self.iter().filter(|(k, _)| *k != ACCESS_TOKEN_KEY)
    }
}

impl<K: Into<String>, V: ToString> FromIterator<(K, V)> for Params {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut params = Params::new();
        for (k, v) in iter {
            params.insert(k, v);
        }
        params
    }
}

/// Everything needed to execute a call, fixed at construction time.
#[derive(Debug, Clone)]
pub struct PreparedCall {
    user_id: u64,
    endpoint: Endpoint,
    params: Params,
    offline_mode: bool,
    signature: String,
}

impl PreparedCall {
    pub fn new(user_id: u64, endpoint: Endpoint, params: Params, offline_mode: bool) -> Self {
        let signature = endpoint.name().to_string();
        Self {
            user_id,
            endpoint,
            params,
            offline_mode,
            signature,
        }
    }

    pub fn user_id(&self) -> u64 {
        self.user_id
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    pub fn params(&self) -> &Params {
        &self.params
    }

    pub fn offline_mode(&self) -> bool {
        self.offline_mode
    }

    pub fn signature(&self) -> &str {
        &self.signature
    }
}

enum RequestState {
    Dormant,
    Running(JoinHandle<Result<Value, ApiError>>),
    Cancelled,
}

/// A single API call.
///
/// The request owns its completion: await [`Request::response`] for the
/// result. Dropping a running request detaches it; use [`Request::cancel`]
/// to abort.
pub struct Request {
    call: PreparedCall,
    client: ApiClient,
    state: RequestState,
}

impl Request {
    pub fn new(call: PreparedCall, client: ApiClient) -> Self {
        Self {
            call,
            client,
            state: RequestState::Dormant,
        }
    }

    pub fn method(&self) -> &str {
        self.call.endpoint().name()
    }

    pub fn params(&self) -> &Params {
        self.call.params()
    }

    pub fn call(&self) -> &PreparedCall {
        &self.call
    }

    /// Caller-visible label for this request. Defaults to the method name.
    pub fn signature(&self) -> &str {
        self.call.signature()
    }

    pub fn set_signature(&mut self, signature: impl Into<String>) {
        self.call.signature = signature.into();
    }

    pub fn is_started(&self) -> bool {
        matches!(self.state, RequestState::Running(_))
    }

    pub fn is_finished(&self) -> bool {
        match &self.state {
            RequestState::Running(handle) => handle.is_finished(),
            _ => false,
        }
    }

    /// Spawn the call on the current tokio runtime.
    pub fn start(&mut self) -> Result<(), ApiError> {
        match self.state {
            RequestState::Dormant => {}
            RequestState::Running(_) => return Err(ApiError::AlreadyStarted),
            RequestState::Cancelled => return Err(ApiError::Cancelled),
        }

        let runtime = tokio::runtime::Handle::try_current().map_err(|_| ApiError::NoRuntime)?;
        let client = self.client.clone();
        let call = self.call.clone();
        debug!(
            method = call.endpoint().name(),
            signature = call.signature(),
            "Starting request"
        );

        let handle = runtime.spawn(async move { client.execute(&call).await });
        self.state = RequestState::Running(handle);
        Ok(())
    }

    pub fn cancel(&mut self) {
        if let RequestState::Running(handle) = &self.state {
            handle.abort();
        }
        self.state = RequestState::Cancelled;
    }

    /// Wait for the call to complete.
    pub async fn response(self) -> Result<Value, ApiError> {
        match self.state {
            RequestState::Dormant => Err(ApiError::NotStarted),
            RequestState::Cancelled => Err(ApiError::Cancelled),
            RequestState::Running(handle) => match handle.await {
                Ok(result) => result,
                Err(e) if e.is_cancelled() => Err(ApiError::Cancelled),
                Err(e) => Err(ApiError::TaskFailed(e.to_string())),
            },
        }
    }
}

impl std::fmt::Debug for Request {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = match &self.state {
            RequestState::Dormant => "dormant",
            RequestState::Running(_) => "running",
            RequestState::Cancelled => "cancelled",
        };
        f.debug_struct("Request")
            .field("method", &self.method())
            .field("signature", &self.signature())
            .field("user_id", &self.call.user_id())
            .field("state", &state)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_with_token_overwrites() {
        let params = Params::new()
            .with(ACCESS_TOKEN_KEY, "someone-else")
            .with("count", 10);
        let stamped = params.with_token("mine");
        assert_eq!(stamped.get(ACCESS_TOKEN_KEY), Some("mine"));
        assert_eq!(stamped.get("count"), Some("10"));
        assert_eq!(stamped.len(), 2);
    }

    #[test]
    fn test_without_token() {
        let params = Params::new().with("b", 2).with("a", 1).with_token("t");
        let rest: Vec<(&str, &str)> = params.without_token().collect();
        assert_eq!(rest, vec![("a", "1"), ("b", "2")]);
    }

    #[test]
    fn test_from_iter() {
        let params: Params = vec![("owner_id", "1"), ("count", "5")].into_iter().collect();
        assert_eq!(params.get("owner_id"), Some("1"));
        assert_eq!(params.len(), 2);
    }

    #[test]
    fn test_serializes_as_flat_map() {
        let params = Params::new().with("fields", "sex").with("user_ids", 1);
        let json = serde_json::to_value(&params).unwrap();
        assert_eq!(json, serde_json::json!({"fields": "sex", "user_ids": "1"}));
    }

    #[test]
    fn test_signature_defaults_to_method() {
        let call = PreparedCall::new(1, Endpoint::custom("wall.get"), Params::new(), false);
        assert_eq!(call.signature(), "wall.get");
    }
}
