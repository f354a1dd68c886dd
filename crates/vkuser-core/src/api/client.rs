//! Executes prepared calls, consulting the response cache for read methods.
//!
//! Cache policy for cacheable endpoints:
//! - offline: answer from the cache only, expired entries included, and
//!   never touch the network or evict anything
//! - online: go to the network first and store the response; if the network
//!   fails transiently, fall back to an entry that has not expired

use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, warn};

use super::error::ApiError;
use super::request::PreparedCall;
use super::transport::Transport;
use crate::cache::manager::{CacheManager, DEFAULT_LIFETIME_MINUTES};

/// Clone is cheap - the transport and cache are shared.
#[derive(Clone)]
pub struct ApiClient {
    transport: Arc<dyn Transport>,
    cache: Option<Arc<CacheManager>>,
    cache_lifetime_minutes: i64,
}

impl ApiClient {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self {
            transport,
            cache: None,
            cache_lifetime_minutes: DEFAULT_LIFETIME_MINUTES,
        }
    }

    pub fn with_cache(mut self, cache: Arc<CacheManager>, lifetime_minutes: i64) -> Self {
        self.cache = Some(cache);
        self.cache_lifetime_minutes = lifetime_minutes;
        self
    }

    pub fn cache(&self) -> Option<&CacheManager> {
        self.cache.as_deref()
    }

    pub async fn execute(&self, call: &PreparedCall) -> Result<Value, ApiError> {
        let method = call.endpoint().name();

        let cache = match &self.cache {
            Some(cache) if call.endpoint().is_cacheable() => cache,
            _ => return self.transport.call(method, call.params()).await,
        };
        let key = CacheManager::key_for(method, call.params());
        let user_id = call.user_id();

        if call.offline_mode() {
            return match cache.read::<Value>(user_id, &key, true) {
                Ok(Some(cached)) => {
                    debug!(
                        method,
                        user_id,
                        expired = cached.is_expired(),
                        "Served from cache (offline)"
                    );
                    Ok(cached.data)
                }
                Ok(None) => Err(ApiError::OfflineCacheMiss(method.to_string())),
                Err(e) => {
                    warn!(method, user_id, error = %e, "Failed to read cache");
                    Err(ApiError::OfflineCacheMiss(method.to_string()))
                }
            };
        }

        match self.transport.call(method, call.params()).await {
            Ok(value) => {
                if let Err(e) = cache.store(user_id, &key, &value, self.cache_lifetime_minutes) {
                    warn!(method, user_id, error = %e, "Failed to cache response");
                }
                Ok(value)
            }
            Err(err) if err.is_transient() => match cache.read::<Value>(user_id, &key, false) {
                Ok(Some(cached)) => {
                    warn!(method, user_id, error = %err, "Request failed, serving cached response");
                    Ok(cached.data)
                }
                _ => Err(err),
            },
            Err(err) => Err(err),
        }
    }
}
