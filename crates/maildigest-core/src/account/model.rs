//! Account model types.

use serde::{Deserialize, Serialize};

/// Implicit-TLS IMAP port.
pub const DEFAULT_IMAP_PORT: u16 = 993;

/// How the account authenticates to its IMAP server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "method", rename_all = "lowercase")]
pub enum AuthMethod {
    /// `LOGIN` with a stored password.
    Password {
        /// Account password or app password.
        password: String,
    },
    /// `AUTHENTICATE XOAUTH2` with a token from the session engine.
    #[serde(rename = "oauth2")]
    OAuth2,
}

/// One configured mailbox account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    /// Short name used on the command line.
    pub name: String,
    /// Email address; also the key for tokens and digests.
    pub email: String,
    /// IMAP server hostname.
    pub host: String,
    /// IMAP server port (implicit TLS).
    #[serde(default = "default_port")]
    pub port: u16,
    /// Login name. Empty means the email address.
    #[serde(default)]
    pub username: String,
    /// Folders to digest.
    #[serde(default = "default_folders")]
    pub folders: Vec<String>,
    /// Authentication method.
    pub auth: AuthMethod,
}

const fn default_port() -> u16 {
    DEFAULT_IMAP_PORT
}

fn default_folders() -> Vec<String> {
    vec!["INBOX".to_string()]
}

impl Account {
    /// Creates a password account on port 993 digesting `INBOX`.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        email: impl Into<String>,
        host: impl Into<String>,
        auth: AuthMethod,
    ) -> Self {
        Self {
            name: name.into(),
            email: email.into(),
            host: host.into(),
            port: DEFAULT_IMAP_PORT,
            username: String::new(),
            folders: default_folders(),
            auth,
        }
    }

    /// Name sent to the server when authenticating.
    #[must_use]
    pub fn login(&self) -> &str {
        if self.username.trim().is_empty() {
            &self.email
        } else {
            &self.username
        }
    }

    /// True if the account authenticates with `OAuth2`.
    #[must_use]
    pub const fn uses_oauth(&self) -> bool {
        matches!(self.auth, AuthMethod::OAuth2)
    }
}
