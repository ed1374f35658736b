//! `OAuth2` token types.

mod store;

pub use store::{TokenStore, encode_file_component};

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};

/// A token is considered usable only while more than this many seconds remain.
pub const EXPIRY_MARGIN_SECS: i64 = 60;

/// Lifetime assumed when the server omits `expires_in`.
pub const DEFAULT_LIFETIME_SECS: u32 = 3600;

/// Credentials for one account, persisted and replaced as a unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenSet {
    /// Access token string.
    pub access_token: String,
    /// Refresh token for obtaining new access tokens.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    /// Absolute expiry, epoch seconds.
    pub expires_at: i64,
}

impl TokenSet {
    /// Creates a token set.
    #[must_use]
    pub fn new(access_token: impl Into<String>, expires_at: i64) -> Self {
        Self {
            access_token: access_token.into(),
            refresh_token: None,
            expires_at,
        }
    }

    /// Builds a token set from a token endpoint response received at `now`.
    #[must_use]
    pub fn from_response(response: TokenResponse, now: i64) -> Self {
        let lifetime = response.expires_in.unwrap_or(DEFAULT_LIFETIME_SECS);
        Self {
            access_token: response.access_token,
            refresh_token: response.refresh_token,
            expires_at: now.saturating_add(i64::from(lifetime)),
        }
    }

    /// Sets the refresh token.
    #[must_use]
    pub fn with_refresh_token(mut self, refresh_token: impl Into<String>) -> Self {
        self.refresh_token = Some(refresh_token.into());
        self
    }

    /// True while more than [`EXPIRY_MARGIN_SECS`] remain before expiry.
    #[must_use]
    pub const fn is_usable(&self, now: i64) -> bool {
        match now.checked_add(EXPIRY_MARGIN_SECS) {
            Some(limit) => self.expires_at > limit,
            None => false,
        }
    }

    /// Returns the refresh token if available.
    ///
    /// # Errors
    ///
    /// Returns an error if no refresh token is available.
    pub fn refresh_token(&self) -> Result<&str> {
        self.refresh_token.as_deref().ok_or(Error::NoRefreshToken)
    }
}

/// Token response from `OAuth2` server.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TokenResponse {
    /// Access token.
    pub access_token: String,
    /// Token type.
    #[serde(default)]
    pub token_type: String,
    /// Expires in seconds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_in: Option<u32>,
    /// Refresh token.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    /// Scope.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
}

impl TokenResponse {
    /// Creates a bearer response, mostly useful for fakes.
    #[must_use]
    pub fn bearer(access_token: impl Into<String>, expires_in: u32) -> Self {
        Self {
            access_token: access_token.into(),
            token_type: "Bearer".to_string(),
            expires_in: Some(expires_in),
            refresh_token: None,
            scope: None,
        }
    }
}

/// Error response from `OAuth2` server.
#[derive(Debug, Clone, Deserialize)]
pub struct ErrorResponse {
    /// Error code.
    pub error: String,
    /// Error description.
    #[serde(default)]
    pub error_description: String,
}

impl ErrorResponse {
    /// Converts to an Error.
    #[must_use]
    pub fn into_error(self) -> Error {
        Error::oauth_error(self.error, self.error_description)
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::redundant_clone,
    clippy::unreadable_literal
)]
mod tests {
    use super::*;

    #[test]
    fn test_usable_respects_margin() {
        let now = 1_700_000_000;
        assert!(TokenSet::new("a", now + 3600).is_usable(now));
        assert!(TokenSet::new("a", now + 61).is_usable(now));
        assert!(!TokenSet::new("a", now + 60).is_usable(now));
        assert!(!TokenSet::new("a", now - 10).is_usable(now));
    }

    #[test]
    fn test_usable_with_extreme_expiry() {
        let now = 1_700_000_000;
        assert!(!TokenSet::new("a", i64::MIN).is_usable(now));
        assert!(TokenSet::new("a", i64::MAX).is_usable(now));
        assert!(!TokenSet::new("a", i64::MAX).is_usable(i64::MAX));
    }

    #[test]
    fn test_from_response_computes_absolute_expiry() {
        let response = TokenResponse {
            access_token: "ya29".to_string(),
            token_type: "Bearer".to_string(),
            expires_in: Some(3599),
            refresh_token: Some("1//refresh".to_string()),
            scope: None,
        };

        let token = TokenSet::from_response(response, 100);
        assert_eq!(token.access_token, "ya29");
        assert_eq!(token.expires_at, 3699);
        assert_eq!(token.refresh_token().unwrap(), "1//refresh");
    }

    #[test]
    fn test_missing_expires_in_uses_default_lifetime() {
        let mut response = TokenResponse::bearer("t", 10);
        response.expires_in = None;
        let token = TokenSet::from_response(response, 0);
        assert_eq!(token.expires_at, i64::from(DEFAULT_LIFETIME_SECS));
        assert!(matches!(token.refresh_token(), Err(Error::NoRefreshToken)));
    }

    #[test]
    fn test_token_set_json_shape() {
        let token = TokenSet::new("abc", 42).with_refresh_token("r");
        let json = serde_json::to_value(&token).unwrap();
        assert_eq!(json["access_token"], "abc");
        assert_eq!(json["refresh_token"], "r");
        assert_eq!(json["expires_at"], 42);

        let bare: TokenSet =
            serde_json::from_str(r#"{"access_token":"x","expires_at":7}"#).unwrap();
        assert!(bare.refresh_token.is_none());
    }

    #[test]
    fn test_error_response_into_error() {
        let response: ErrorResponse =
            serde_json::from_str(r#"{"error":"invalid_grant"}"#).unwrap();
        let err = response.into_error();
        assert!(err.to_string().contains("invalid_grant"));
    }
}
