//! `OAuth2` authorization code flow.

mod code;

pub use code::{Authorizer, BrowserAuthorizer};

use std::collections::HashMap;
use std::future::Future;

use crate::error::Result;
use crate::provider::Provider;
use crate::token::{ErrorResponse, TokenResponse};
use reqwest::Client;
use tracing::debug;

/// Default loopback redirect target.
pub const DEFAULT_REDIRECT_URI: &str = "http://localhost:8080";

/// The provider's token endpoint as seen by the session engine.
///
/// [`OAuthClient`] is the HTTP implementation; tests substitute counting fakes.
pub trait TokenEndpoint: Send + Sync {
    /// Exchanges an authorization code for tokens.
    fn exchange_code(&self, code: &str) -> impl Future<Output = Result<TokenResponse>> + Send;

    /// Obtains a fresh access token from a refresh token.
    fn refresh(&self, refresh_token: &str) -> impl Future<Output = Result<TokenResponse>> + Send;
}

/// Registered client plus provider endpoints.
#[derive(Debug, Clone)]
pub struct OAuthClient {
    /// Client ID from provider.
    pub client_id: String,
    /// Client secret (optional for public clients).
    pub client_secret: Option<String>,
    /// Loopback redirect URI registered with the provider.
    pub redirect_uri: String,
    /// Provider configuration.
    pub provider: Provider,
    /// HTTP client.
    http_client: Client,
}

impl OAuthClient {
    /// Creates a new OAuth client redirecting to [`DEFAULT_REDIRECT_URI`].
    #[must_use]
    pub fn new(client_id: impl Into<String>, provider: Provider) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: None,
            redirect_uri: DEFAULT_REDIRECT_URI.to_string(),
            provider,
            http_client: Client::new(),
        }
    }

    /// Sets the client secret.
    #[must_use]
    pub fn with_client_secret(mut self, secret: impl Into<String>) -> Self {
        self.client_secret = Some(secret.into());
        self
    }

    /// Sets the redirect URI.
    #[must_use]
    pub fn with_redirect_uri(mut self, uri: impl Into<String>) -> Self {
        self.redirect_uri = uri.into();
        self
    }

    async fn post_form(&self, params: &HashMap<&str, &str>) -> Result<TokenResponse> {
        let response = self
            .http_client
            .post(self.provider.token_url.clone())
            .form(params)
            .send()
            .await?;

        if !response.status().is_success() {
            let error: ErrorResponse = response.json().await?;
            return Err(error.into_error());
        }

        Ok(response.json().await?)
    }
}

impl TokenEndpoint for OAuthClient {
    async fn exchange_code(&self, code: &str) -> Result<TokenResponse> {
        let mut params = HashMap::new();
        params.insert("grant_type", "authorization_code");
        params.insert("code", code);
        params.insert("client_id", self.client_id.as_str());
        params.insert("redirect_uri", self.redirect_uri.as_str());

        if let Some(secret) = &self.client_secret {
            params.insert("client_secret", secret);
        }

        debug!(provider = %self.provider.name, "exchanging authorization code");
        self.post_form(&params).await
    }

    async fn refresh(&self, refresh_token: &str) -> Result<TokenResponse> {
        let mut params = HashMap::new();
        params.insert("grant_type", "refresh_token");
        params.insert("refresh_token", refresh_token);
        params.insert("client_id", self.client_id.as_str());

        if let Some(secret) = &self.client_secret {
            params.insert("client_secret", secret);
        }

        debug!(provider = %self.provider.name, "refreshing access token");
        self.post_form(&params).await
    }
}
