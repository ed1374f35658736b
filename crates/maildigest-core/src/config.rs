//! Configuration file and derived engine settings.
//!
//! Configuration is a JSON file at, in order of preference:
//! 1. the path given on the command line (or `$MAILDIGEST_CONFIG`)
//! 2. `~/.config/maildigest/config.json` (Linux), the platform config dir elsewhere
//!
//! ```json
//! {
//!   "batch_size": 200,
//!   "oauth": { "provider": "google", "client_id": "...", "client_secret": "..." },
//!   "accounts": [
//!     { "name": "work", "email": "me@example.com", "host": "imap.gmail.com",
//!       "auth": { "method": "oauth2" } }
//!   ]
//! }
//! ```

use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use maildigest_oauth::flow::DEFAULT_REDIRECT_URI;
use maildigest_oauth::{OAuthClient, Provider};
use serde::{Deserialize, Serialize};

use crate::account::{Account, validate_account};
use crate::error::{Error, Result};

/// Messages per fetch request unless configured otherwise.
pub const DEFAULT_BATCH_SIZE: usize = 200;

/// Seconds to wait for the authorization redirect.
pub const DEFAULT_AUTH_TIMEOUT_SECS: u64 = 120;

pub(crate) const DEFAULT_BATCH_SIZE_NONZERO: NonZeroUsize =
    match NonZeroUsize::new(DEFAULT_BATCH_SIZE) {
        Some(v) => v,
        None => panic!("DEFAULT_BATCH_SIZE must be non-zero"),
    };

/// Top-level configuration file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Root for digests and tokens. Defaults to the platform data dir.
    #[serde(default)]
    pub data_dir: Option<PathBuf>,
    /// Messages per fetch request.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Seconds to wait for the authorization redirect.
    #[serde(default = "default_auth_timeout")]
    pub auth_timeout_secs: u64,
    /// OAuth2 client registration, required by OAuth2 accounts.
    #[serde(default)]
    pub oauth: Option<OAuthSettings>,
    /// Configured accounts.
    #[serde(default)]
    pub accounts: Vec<Account>,
}

const fn default_batch_size() -> usize {
    DEFAULT_BATCH_SIZE
}

const fn default_auth_timeout() -> u64 {
    DEFAULT_AUTH_TIMEOUT_SECS
}

/// Which provider endpoints to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    /// Google accounts.
    Google,
    /// Microsoft 365 / Outlook.com.
    Microsoft,
    /// Explicit `auth_url` / `token_url`.
    Custom,
}

/// OAuth2 client registration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OAuthSettings {
    /// Provider preset.
    pub provider: ProviderKind,
    /// Authorization endpoint, custom providers only.
    #[serde(default)]
    pub auth_url: Option<String>,
    /// Token endpoint, custom providers only.
    #[serde(default)]
    pub token_url: Option<String>,
    /// Registered client id.
    pub client_id: String,
    /// Client secret, if the registration has one.
    #[serde(default)]
    pub client_secret: Option<String>,
    /// Loopback redirect URI.
    #[serde(default = "default_redirect_uri")]
    pub redirect_uri: String,
    /// Scopes overriding the provider defaults.
    #[serde(default)]
    pub scopes: Vec<String>,
}

fn default_redirect_uri() -> String {
    DEFAULT_REDIRECT_URI.to_string()
}

impl OAuthSettings {
    /// Resolves the provider endpoints.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if a custom provider lacks endpoints or
    /// any endpoint is invalid.
    pub fn provider(&self) -> Result<Provider> {
        let provider = match self.provider {
            ProviderKind::Google => Provider::google()?,
            ProviderKind::Microsoft => Provider::microsoft()?,
            ProviderKind::Custom => {
                let (Some(auth), Some(token)) = (&self.auth_url, &self.token_url) else {
                    return Err(Error::Config(
                        "custom oauth provider needs auth_url and token_url".into(),
                    ));
                };
                Provider::new("Custom", auth, token)?
            }
        };
        provider
            .validate()
            .map_err(|e| Error::Config(e.to_string()))?;
        Ok(provider)
    }

    /// Builds the token endpoint client.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the provider or redirect URI is unusable.
    pub fn client(&self) -> Result<OAuthClient> {
        let mut client = OAuthClient::new(&self.client_id, self.provider()?)
            .with_redirect_uri(&self.redirect_uri);
        if let Some(secret) = &self.client_secret {
            client = client.with_client_secret(secret);
        }
        client
            .redirect_port()
            .map_err(|e| Error::Config(e.to_string()))?;
        Ok(client)
    }

    /// Scopes to request, or `None` for the provider defaults.
    #[must_use]
    pub fn scopes(&self) -> Option<Vec<String>> {
        (!self.scopes.is_empty()).then(|| self.scopes.clone())
    }
}

impl AppConfig {
    /// Platform default config file location.
    #[must_use]
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("maildigest").join("config.json"))
    }

    /// Loads the file at `explicit`, or at [`Self::default_path`].
    ///
    /// # Errors
    ///
    /// Returns a configuration error if no path can be determined, or the
    /// file is missing or malformed.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let path = match explicit {
            Some(path) => path.to_path_buf(),
            None => Self::default_path()
                .ok_or_else(|| Error::Config("no config directory on this platform".into()))?,
        };

        let text = std::fs::read_to_string(&path).map_err(|e| {
            Error::Config(format!("cannot read config file {}: {e}", path.display()))
        })?;
        Self::from_json(&text)
            .map_err(|e| Error::Config(format!("invalid config file {}: {e}", path.display())))
    }

    /// Parses configuration text.
    ///
    /// # Errors
    ///
    /// Returns an error if the text is not valid configuration JSON.
    pub fn from_json(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    /// Checks everything that must hold before any network I/O.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] describing the first fatal problem.
    pub fn validate(&self) -> Result<()> {
        if self.accounts.is_empty() {
            return Err(Error::Config("no accounts configured".into()));
        }
        if self.batch_size == 0 {
            return Err(Error::Config("batch_size must be at least 1".into()));
        }

        for account in &self.accounts {
            if let Err(errors) = validate_account(account) {
                let detail = errors
                    .iter()
                    .map(|e| format!("{}: {}", e.field(), e.message()))
                    .collect::<Vec<_>>()
                    .join(", ");
                return Err(Error::Config(format!("account '{}': {detail}", account.name)));
            }
        }

        let names = self.accounts.iter().map(|a| a.name.as_str());
        for (i, name) in names.clone().enumerate() {
            if names.clone().skip(i + 1).any(|other| other == name) {
                return Err(Error::Config(format!("duplicate account name '{name}'")));
            }
        }

        if self.accounts.iter().any(Account::uses_oauth) {
            let Some(oauth) = &self.oauth else {
                return Err(Error::Config(
                    "oauth2 accounts configured but no \"oauth\" client registration".into(),
                ));
            };
            oauth.client()?;
        }
        Ok(())
    }

    /// Account by name.
    ///
    /// # Errors
    ///
    /// Returns [`Error::AccountNotFound`] for unknown names.
    pub fn account(&self, name: &str) -> Result<&Account> {
        self.accounts
            .iter()
            .find(|a| a.name == name)
            .ok_or_else(|| Error::AccountNotFound(name.to_string()))
    }

    /// Engine settings derived from this file.
    #[must_use]
    pub fn engine(&self) -> EngineConfig {
        let data_dir = self.data_dir.clone().unwrap_or_else(EngineConfig::default_data_dir);
        let mut engine = EngineConfig::at(data_dir);
        if let Some(size) = NonZeroUsize::new(self.batch_size) {
            engine.batch_size = size;
        }
        engine.auth_timeout = Duration::from_secs(self.auth_timeout_secs);
        engine
    }
}

/// Paths and limits handed to the engine components.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// Digest snapshot directory.
    pub digest_dir: PathBuf,
    /// Token file directory.
    pub token_dir: PathBuf,
    /// Messages per fetch request.
    pub batch_size: NonZeroUsize,
    /// Wait for the authorization redirect.
    pub auth_timeout: Duration,
}

impl EngineConfig {
    /// Defaults rooted at `data_dir`: `digests/` and `tokens/` beneath it.
    #[must_use]
    pub fn at(data_dir: impl AsRef<Path>) -> Self {
        let data_dir = data_dir.as_ref();
        Self {
            digest_dir: data_dir.join("digests"),
            token_dir: data_dir.join("tokens"),
            batch_size: DEFAULT_BATCH_SIZE_NONZERO,
            auth_timeout: Duration::from_secs(DEFAULT_AUTH_TIMEOUT_SECS),
        }
    }

    /// Platform data directory for maildigest.
    #[must_use]
    pub fn default_data_dir() -> PathBuf {
        dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("maildigest")
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"{
        "data_dir": "/tmp/md",
        "accounts": [
            {"name": "home", "email": "me@example.com", "host": "imap.example.com",
             "auth": {"method": "password", "password": "pw"}}
        ]
    }"#;

    #[test]
    fn test_defaults() {
        let config = AppConfig::from_json(MINIMAL).unwrap();
        config.validate().unwrap();

        let engine = config.engine();
        assert_eq!(engine.digest_dir, PathBuf::from("/tmp/md/digests"));
        assert_eq!(engine.token_dir, PathBuf::from("/tmp/md/tokens"));
        assert_eq!(engine.batch_size.get(), 200);
        assert_eq!(engine.auth_timeout, Duration::from_secs(120));
    }

    #[test]
    fn test_no_accounts_is_fatal() {
        let config = AppConfig::from_json("{}").unwrap();
        let err = config.validate().unwrap_err();
        assert!(err.is_fatal());
    }

    #[test]
    fn test_oauth_account_requires_registration() {
        let config = AppConfig::from_json(
            r#"{"accounts": [{"name": "w", "email": "me@example.com", "host": "imap.gmail.com",
                "auth": {"method": "oauth2"}}]}"#,
        )
        .unwrap();
        assert!(matches!(config.validate(), Err(Error::Config(_))));

        let config = AppConfig::from_json(
            r#"{"oauth": {"provider": "google", "client_id": "cid"},
                "accounts": [{"name": "w", "email": "me@example.com", "host": "imap.gmail.com",
                "auth": {"method": "oauth2"}}]}"#,
        )
        .unwrap();
        config.validate().unwrap();
        let client = config.oauth.as_ref().unwrap().client().unwrap();
        assert_eq!(client.redirect_port().unwrap(), 8080);
    }

    #[test]
    fn test_custom_provider_needs_endpoints() {
        let settings: OAuthSettings =
            serde_json::from_str(r#"{"provider": "custom", "client_id": "cid"}"#).unwrap();
        assert!(matches!(settings.provider(), Err(Error::Config(_))));
    }

    #[test]
    fn test_duplicate_names_and_lookup() {
        let mut config = AppConfig::from_json(MINIMAL).unwrap();
        assert_eq!(config.account("home").unwrap().email, "me@example.com");
        assert!(matches!(config.account("nope"), Err(Error::AccountNotFound(_))));

        config.accounts.push(config.accounts[0].clone());
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_missing_file_is_config_error() {
        let err = AppConfig::load(Some(Path::new("/definitely/not/here.json"))).unwrap_err();
        assert!(err.is_fatal());
    }
}
