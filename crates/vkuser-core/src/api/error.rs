use thiserror::Error;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("No active session - authenticate or activate a user first")]
    NoActiveSession,

    #[error("Session store has no API client configured")]
    NoClient,

    #[error("Request has not been started")]
    NotStarted,

    #[error("Request was already started")]
    AlreadyStarted,

    #[error("Request was cancelled")]
    Cancelled,

    #[error("No tokio runtime available to start the request")]
    NoRuntime,

    #[error("Offline mode: no cached response for {0}")]
    OfflineCacheMiss(String),

    #[error("Access denied: {0}")]
    AccessDenied(String),

    #[error("Unauthorized - token may be expired or revoked")]
    Unauthorized,

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Rate limited - please wait before retrying")]
    RateLimited,

    #[error("Server error: {0}")]
    ServerError(String),

    #[error("API error {code}: {message}")]
    Remote { code: i64, message: String },

    #[error("Network error: {0}")]
    NetworkError(#[from] reqwest::Error),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Request task failed: {0}")]
    TaskFailed(String),
}

/// Maximum length for error response bodies in error messages
const MAX_ERROR_BODY_LENGTH: usize = 500;

/// VK error codes with a dedicated variant
const VK_AUTH_FAILED: i64 = 5;
const VK_TOO_MANY_REQUESTS: i64 = 6;
const VK_ACCESS_DENIED: i64 = 15;

impl ApiError {
    /// Truncate a response body to avoid logging excessive data
    fn truncate_body(body: &str) -> String {
        if body.len() <= MAX_ERROR_BODY_LENGTH {
            body.to_string()
        } else {
            let mut end = MAX_ERROR_BODY_LENGTH;
            while !body.is_char_boundary(end) {
                end -= 1;
            }
            format!("{}... (truncated, {} total bytes)", &body[..end], body.len())
        }
    }

    pub fn from_status(status: reqwest::StatusCode, body: &str) -> Self {
        let truncated = Self::truncate_body(body);
        match status.as_u16() {
            401 => ApiError::Unauthorized,
            403 => ApiError::AccessDenied(truncated),
            404 => ApiError::NotFound(truncated),
            429 => ApiError::RateLimited,
            500..=599 => ApiError::ServerError(truncated),
            _ => ApiError::InvalidResponse(format!("Status {}: {}", status, truncated)),
        }
    }

    /// Map an `{"error": {...}}` envelope from the API.
    pub fn from_remote(code: i64, message: String) -> Self {
        match code {
            VK_AUTH_FAILED => ApiError::Unauthorized,
            VK_TOO_MANY_REQUESTS => ApiError::RateLimited,
            VK_ACCESS_DENIED => ApiError::AccessDenied(message),
            _ => ApiError::Remote { code, message },
        }
    }

    /// Failures where a previously cached response is an acceptable answer.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ApiError::NetworkError(_) | ApiError::ServerError(_) | ApiError::RateLimited
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::StatusCode;

    #[test]
    fn test_from_status() {
        assert!(matches!(
            ApiError::from_status(StatusCode::UNAUTHORIZED, ""),
            ApiError::Unauthorized
        ));
        assert!(matches!(
            ApiError::from_status(StatusCode::TOO_MANY_REQUESTS, ""),
            ApiError::RateLimited
        ));
        assert!(matches!(
            ApiError::from_status(StatusCode::BAD_GATEWAY, "upstream"),
            ApiError::ServerError(body) if body == "upstream"
        ));
        assert!(matches!(
            ApiError::from_status(StatusCode::IM_A_TEAPOT, ""),
            ApiError::InvalidResponse(_)
        ));
    }

    #[test]
    fn test_truncate_body() {
        let long = "x".repeat(MAX_ERROR_BODY_LENGTH + 10);
        let truncated = ApiError::truncate_body(&long);
        assert!(truncated.starts_with(&"x".repeat(MAX_ERROR_BODY_LENGTH)));
        assert!(truncated.ends_with("(truncated, 510 total bytes)"));

        // Multi-byte characters straddling the limit
        let cyrillic = "я".repeat(MAX_ERROR_BODY_LENGTH);
        assert!(ApiError::truncate_body(&cyrillic).contains("truncated"));
    }

    #[test]
    fn test_from_remote() {
        assert!(matches!(
            ApiError::from_remote(5, "User authorization failed".into()),
            ApiError::Unauthorized
        ));
        assert!(matches!(ApiError::from_remote(6, String::new()), ApiError::RateLimited));
        assert!(matches!(
            ApiError::from_remote(100, "One of the parameters specified was missing".into()),
            ApiError::Remote { code: 100, .. }
        ));
    }

    #[test]
    fn test_is_transient() {
        assert!(ApiError::RateLimited.is_transient());
        assert!(ApiError::ServerError(String::new()).is_transient());
        assert!(!ApiError::Unauthorized.is_transient());
        assert!(!ApiError::OfflineCacheMiss("users.get".into()).is_transient());
    }
}
