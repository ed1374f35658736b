//! # maildigest-oauth
//!
//! `OAuth2` session engine for IMAP accounts.
//!
//! ## Features
//!
//! - **Session engine**: reuse a stored token while it has more than 60s left,
//!   refresh it when expired, fall back to interactive authorization otherwise
//! - **Token store**: one JSON file per account, atomic replace, owner-only
//! - **Loopback authorization**: one-shot listener on the redirect port with
//!   a timeout that always releases the port
//! - **Providers**: Google and Microsoft presets, or custom endpoints
//! - **SASL**: XOAUTH2 payloads for `AUTHENTICATE XOAUTH2`
//!
//! ## Quick Start
//!
//! ```ignore
//! use std::time::Duration;
//! use maildigest_oauth::{BrowserAuthorizer, OAuthClient, Provider, SessionEngine, TokenStore};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = OAuthClient::new("your_client_id", Provider::google()?)
//!         .with_client_secret("your_secret")
//!         .with_redirect_uri("http://localhost:8080");
//!
//!     let authorizer = BrowserAuthorizer::new(client.clone(), Duration::from_secs(120));
//!     let engine = SessionEngine::new(TokenStore::new("/tmp/tokens"), client, authorizer);
//!
//!     let token = engine.session("me@gmail.com").await?;
//!     println!("expires at {}", token.expires_at);
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

mod error;
pub mod flow;
pub mod listener;
pub mod provider;
pub mod sasl;
pub mod session;
pub mod time;
pub mod token;

pub use error::{Error, Result};
pub use flow::{Authorizer, BrowserAuthorizer, OAuthClient, TokenEndpoint};
pub use listener::AuthorizationListener;
pub use provider::Provider;
pub use session::{SessionEngine, SessionState};
pub use token::{TokenSet, TokenStore};
