use std::fmt;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// An access token issued to one user.
///
/// Records are never mutated once created: re-authenticating a user produces
/// a new record that replaces the old one in the store.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CredentialRecord {
    user_id: u64,
    token: String,
    issued_at: DateTime<Utc>,
    /// Lifetime in seconds. `None` for tokens issued with the `offline` scope.
    expires_in: Option<i64>,
}

impl CredentialRecord {
    pub fn new(user_id: u64, token: impl Into<String>) -> Self {
        Self {
            user_id,
            token: token.into(),
            issued_at: Utc::now(),
            expires_in: None,
        }
    }

    /// Create a record that stops being valid `expires_in` seconds after now.
    /// A value of zero means the token never expires.
    pub fn with_expiry(user_id: u64, token: impl Into<String>, expires_in: i64) -> Self {
        Self {
            user_id,
            token: token.into(),
            issued_at: Utc::now(),
            expires_in: (expires_in > 0).then_some(expires_in),
        }
    }

    pub(crate) fn from_parts(
        user_id: u64,
        token: String,
        issued_at: DateTime<Utc>,
        expires_in: Option<i64>,
    ) -> Self {
        Self {
            user_id,
            token,
            issued_at,
            expires_in,
        }
    }

    pub fn user_id(&self) -> u64 {
        self.user_id
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    pub fn issued_at(&self) -> DateTime<Utc> {
        self.issued_at
    }

    pub fn expires_in(&self) -> Option<i64> {
        self.expires_in
    }

    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.expires_in
            .map(|secs| self.issued_at + Duration::seconds(secs))
    }

    pub fn is_expired(&self) -> bool {
        self.expires_at()
            .map(|expiry| Utc::now() > expiry)
            .unwrap_or(false)
    }
}

// Tokens stay out of logs.
impl fmt::Debug for CredentialRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialRecord")
            .field("user_id", &self.user_id)
            .field("token", &"<redacted>")
            .field("issued_at", &self.issued_at)
            .field("expires_in", &self.expires_in)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_without_expiry_never_expires() {
        let record = CredentialRecord::new(1, "tok");
        assert_eq!(record.expires_at(), None);
        assert!(!record.is_expired());
    }

    #[test]
    fn test_zero_expiry_means_offline_token() {
        let record = CredentialRecord::with_expiry(1, "tok", 0);
        assert_eq!(record.expires_in(), None);
    }

    #[test]
    fn test_record_expiry() {
        let record = CredentialRecord::from_parts(
            7,
            "tok".to_string(),
            Utc::now() - Duration::hours(2),
            Some(3600),
        );
        assert!(record.is_expired());

        let fresh = CredentialRecord::with_expiry(7, "tok", 86400);
        assert!(!fresh.is_expired());
    }

    #[test]
    fn test_debug_redacts_token() {
        let record = CredentialRecord::new(42, "super-secret");
        let debug = format!("{:?}", record);
        assert!(debug.contains("42"));
        assert!(!debug.contains("super-secret"));
    }
}
