//! Authorization code acquisition through the user's browser.

use std::future::Future;
use std::time::Duration;

use tracing::{info, warn};
use url::Url;

use super::OAuthClient;
use crate::error::{Error, Result};
use crate::listener::AuthorizationListener;

impl OAuthClient {
    /// Builds the authorization URL for user consent.
    ///
    /// Offline access and a forced consent prompt are always requested, so
    /// the provider hands out a refresh token even on repeat authorizations.
    ///
    /// # Arguments
    ///
    /// * `scopes` - Scopes to request (uses provider defaults if None)
    /// * `login_hint` - Account address to preselect on the consent screen
    ///
    /// # Errors
    ///
    /// Returns an error if the URL cannot be constructed.
    pub fn authorization_url(
        &self,
        scopes: Option<&[String]>,
        login_hint: Option<&str>,
    ) -> Result<Url> {
        let mut url = self.provider.auth_url.clone();

        {
            let mut pairs = url.query_pairs_mut();
            pairs
                .append_pair("client_id", &self.client_id)
                .append_pair("redirect_uri", &self.redirect_uri)
                .append_pair("response_type", "code");

            let scope_str = scopes.map_or_else(
                || self.provider.default_scopes.join(" "),
                |s| s.join(" "),
            );
            if !scope_str.is_empty() {
                pairs.append_pair("scope", &scope_str);
            }

            pairs
                .append_pair("access_type", "offline")
                .append_pair("prompt", "consent");

            if let Some(hint) = login_hint {
                pairs.append_pair("login_hint", hint);
            }
        }

        Ok(url)
    }

    /// Port the loopback listener must bind, taken from the redirect URI.
    ///
    /// # Errors
    ///
    /// Returns an error if the redirect URI is not an `http://` loopback URL.
    pub fn redirect_port(&self) -> Result<u16> {
        let uri = Url::parse(&self.redirect_uri)?;
        if uri.scheme() != "http" {
            return Err(Error::InvalidConfig(format!(
                "redirect_uri must use http on loopback, got {}",
                self.redirect_uri
            )));
        }
        uri.port_or_known_default()
            .ok_or_else(|| Error::InvalidConfig("redirect_uri has no port".into()))
    }
}

/// Obtains an authorization code for an account.
pub trait Authorizer: Send + Sync {
    /// Runs one interactive authorization and returns the code.
    fn obtain_code(&self, address: &str) -> impl Future<Output = Result<String>> + Send;
}

/// Opens the consent page in a browser and captures the redirect on loopback.
#[derive(Debug, Clone)]
pub struct BrowserAuthorizer {
    client: OAuthClient,
    scopes: Option<Vec<String>>,
    timeout: Duration,
}

impl BrowserAuthorizer {
    /// Creates an authorizer that waits up to `timeout` for the redirect.
    #[must_use]
    pub const fn new(client: OAuthClient, timeout: Duration) -> Self {
        Self {
            client,
            scopes: None,
            timeout,
        }
    }

    /// Overrides the provider's default scopes.
    #[must_use]
    pub fn with_scopes(mut self, scopes: Vec<String>) -> Self {
        self.scopes = Some(scopes);
        self
    }
}

impl Authorizer for BrowserAuthorizer {
    async fn obtain_code(&self, address: &str) -> Result<String> {
        let url = self
            .client
            .authorization_url(self.scopes.as_deref(), Some(address))?;

        // Bind before the browser can possibly redirect.
        let listener = AuthorizationListener::bind(self.client.redirect_port()?).await?;

        eprintln!("To authorize {address}, open this URL in a browser:\n\n  {url}\n");
        let target = url.to_string();
        match tokio::task::spawn_blocking(move || opener::open(target)).await {
            Ok(Ok(())) => info!(%address, "opened browser for authorization"),
            Ok(Err(e)) => warn!(error = %e, "could not launch browser, open the URL manually"),
            Err(e) => warn!(error = %e, "browser launch task failed"),
        }

        listener
            .wait_for_code(self.timeout)
            .await?
            .ok_or(Error::Timeout(self.timeout.as_secs()))
    }
}
