// SPDX-License-Identifier: Apache-2.0

//! Access tokens produced by credential sources.

use chrono::{DateTime, Duration, Utc};
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;

/// Tokens closer than this many seconds to expiry are refreshed instead of reused.
pub const REFRESH_MARGIN_SECS: i64 = 300;

/// An access token and its lifetime.
///
/// The token string is a [`SecretString`] and never appears in `Debug` output.
#[derive(Debug, Clone)]
pub struct AccessToken {
    token: SecretString,
    token_type: String,
    expires_on: DateTime<Utc>,
    refresh_on: Option<DateTime<Utc>>,
}

impl AccessToken {
    /// Create a bearer token.
    pub fn new(token: impl Into<SecretString>, expires_on: DateTime<Utc>) -> Self {
        Self {
            token: token.into(),
            token_type: "Bearer".to_string(),
            expires_on,
            refresh_on: None,
        }
    }

    /// Set the token type reported by the issuer.
    #[must_use]
    pub fn with_token_type(mut self, token_type: impl Into<String>) -> Self {
        self.token_type = token_type.into();
        self
    }

    /// Set the time after which the issuer recommends refreshing.
    #[must_use]
    pub fn with_refresh_on(mut self, refresh_on: DateTime<Utc>) -> Self {
        self.refresh_on = Some(refresh_on);
        self
    }

    /// The secret token value.
    #[must_use]
    pub fn secret(&self) -> &SecretString {
        &self.token
    }

    /// Token type, usually `Bearer`.
    #[must_use]
    pub fn token_type(&self) -> &str {
        &self.token_type
    }

    /// Absolute expiry.
    #[must_use]
    pub fn expires_on(&self) -> DateTime<Utc> {
        self.expires_on
    }

    /// Recommended refresh time, if the issuer sent one.
    #[must_use]
    pub fn refresh_on(&self) -> Option<DateTime<Utc>> {
        self.refresh_on
    }

    /// `true` once the expiry has passed.
    #[must_use]
    pub fn is_expired(&self) -> bool {
        self.expires_on <= Utc::now()
    }

    /// `true` if the token should be replaced rather than reused.
    #[must_use]
    pub fn needs_refresh(&self) -> bool {
        let now = Utc::now();
        if self.refresh_on.is_some_and(|r| r <= now) {
            return true;
        }
        self.expires_on - now <= Duration::seconds(REFRESH_MARGIN_SECS)
    }

    /// `Authorization` header value.
    #[must_use]
    pub fn authorization_header(&self) -> String {
        format!("{} {}", self.token_type, self.token.expose_secret())
    }
}

/// Token metadata safe to print or serialize.
#[derive(Debug, Clone, Serialize)]
pub struct TokenSummary {
    /// Token type.
    pub token_type: String,
    /// Absolute expiry.
    pub expires_on: DateTime<Utc>,
    /// Recommended refresh time.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refresh_on: Option<DateTime<Utc>>,
}

impl From<&AccessToken> for TokenSummary {
    fn from(token: &AccessToken) -> Self {
        Self {
            token_type: token.token_type.clone(),
            expires_on: token.expires_on,
            refresh_on: token.refresh_on,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_debug_redacts_token() {
        let token = AccessToken::new("super-secret", Utc::now() + Duration::hours(1));
        let debug = format!("{token:?}");
        assert!(!debug.contains("super-secret"));
    }

    #[test]
    fn test_fresh_token_does_not_need_refresh() {
        let token = AccessToken::new("t", Utc::now() + Duration::hours(1));
        assert!(!token.is_expired());
        assert!(!token.needs_refresh());
    }

    #[test]
    fn test_token_near_expiry_needs_refresh() {
        let token = AccessToken::new("t", Utc::now() + Duration::minutes(2));
        assert!(!token.is_expired());
        assert!(token.needs_refresh());
    }

    #[test]
    fn test_refresh_on_in_past_needs_refresh() {
        let token = AccessToken::new("t", Utc::now() + Duration::hours(1))
            .with_refresh_on(Utc::now() - Duration::seconds(1));
        assert!(token.needs_refresh());
    }

    #[test]
    fn test_expired_token() {
        let token = AccessToken::new("t", Utc::now() - Duration::seconds(1));
        assert!(token.is_expired());
        assert!(token.needs_refresh());
    }

    #[test]
    fn test_authorization_header() {
        let token = AccessToken::new("abc", Utc::now() + Duration::hours(1));
        assert_eq!(token.authorization_header(), "Bearer abc");
    }

    #[test]
    fn test_summary_omits_secret() {
        let token = AccessToken::new("abc", Utc::now() + Duration::hours(1));
        let json = serde_json::to_string(&TokenSummary::from(&token)).unwrap();
        assert!(!json.contains("abc"));
        assert!(json.contains("Bearer"));
    }
}
