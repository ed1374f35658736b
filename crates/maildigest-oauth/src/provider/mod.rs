//! `OAuth2` provider endpoints.

use crate::error::{Error, Result};
use url::Url;

/// Authorization and token endpoints of an `OAuth2` provider.
#[derive(Debug, Clone)]
pub struct Provider {
    /// Provider name (e.g., "Google").
    pub name: String,
    /// Authorization endpoint URL.
    pub auth_url: Url,
    /// Token endpoint URL.
    pub token_url: Url,
    /// Scopes requested when the caller does not name any.
    pub default_scopes: Vec<String>,
}

impl Provider {
    /// Creates a new provider configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if URLs are invalid.
    pub fn new(
        name: impl Into<String>,
        auth_url: impl AsRef<str>,
        token_url: impl AsRef<str>,
    ) -> Result<Self> {
        Ok(Self {
            name: name.into(),
            auth_url: Url::parse(auth_url.as_ref())?,
            token_url: Url::parse(token_url.as_ref())?,
            default_scopes: Vec::new(),
        })
    }

    /// Sets the default scopes.
    #[must_use]
    pub fn with_default_scopes(mut self, scopes: Vec<String>) -> Self {
        self.default_scopes = scopes;
        self
    }

    /// Google, with the full-mail IMAP scope `https://mail.google.com/`.
    ///
    /// # Errors
    ///
    /// Returns an error if URL parsing fails.
    pub fn google() -> Result<Self> {
        Ok(Self::new(
            "Google",
            "https://accounts.google.com/o/oauth2/v2/auth",
            "https://oauth2.googleapis.com/token",
        )?
        .with_default_scopes(vec!["https://mail.google.com/".to_string()]))
    }

    /// Microsoft 365 / Outlook.com, IMAP access plus `offline_access` for a
    /// refresh token.
    ///
    /// # Errors
    ///
    /// Returns an error if URL parsing fails.
    pub fn microsoft() -> Result<Self> {
        Ok(Self::new(
            "Microsoft",
            "https://login.microsoftonline.com/common/oauth2/v2.0/authorize",
            "https://login.microsoftonline.com/common/oauth2/v2.0/token",
        )?
        .with_default_scopes(vec![
            "https://outlook.office.com/IMAP.AccessAsUser.All".to_string(),
            "offline_access".to_string(),
        ]))
    }

    /// Validates that the endpoints are usable for a loopback flow.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration is invalid.
    pub fn validate(&self) -> Result<()> {
        for (label, url) in [("auth_url", &self.auth_url), ("token_url", &self.token_url)] {
            if !matches!(url.scheme(), "https" | "http") {
                return Err(Error::InvalidConfig(format!(
                    "{label} must be http(s), got {}",
                    url.scheme()
                )));
            }
            if url.host_str().is_none() {
                return Err(Error::InvalidConfig(format!("{label} has no host")));
            }
        }
        Ok(())
    }
}
