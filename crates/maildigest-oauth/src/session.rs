//! Expiry-aware `OAuth2` session acquisition.
//!
//! [`SessionEngine::session`] turns "I want to talk to this mailbox" into a
//! usable access token, doing the least work possible:
//!
//! | stored token                      | action                         |
//! |-----------------------------------|--------------------------------|
//! | none                              | full authorization             |
//! | more than 60s left                | return it, no network          |
//! | expired, has refresh token        | one refresh call               |
//! | expired, no refresh token         | full authorization             |
//!
//! A failed refresh falls through to full authorization. Every successful
//! outcome is persisted before it is returned.

use std::fmt;

use tracing::{debug, info, warn};

use crate::error::Result;
use crate::flow::{Authorizer, TokenEndpoint};
use crate::time::{Clock, SystemClock};
use crate::token::{TokenSet, TokenStore};

/// Where an account's session currently stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Nothing stored for the account.
    NoToken,
    /// A stored token with enough lifetime left.
    TokenValid,
    /// A stored token past (or within the margin of) its expiry.
    TokenExpired,
    /// Interactive authorization in progress.
    Authorizing,
    /// Authorization or exchange failed.
    Failed,
}

impl SessionState {
    /// Classifies a stored token at time `now`.
    #[must_use]
    pub fn of(stored: Option<&TokenSet>, now: i64) -> Self {
        match stored {
            None => Self::NoToken,
            Some(token) if token.is_usable(now) => Self::TokenValid,
            Some(_) => Self::TokenExpired,
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::NoToken => "no-token",
            Self::TokenValid => "token-valid",
            Self::TokenExpired => "token-expired",
            Self::Authorizing => "authorizing",
            Self::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Composes the token store, token endpoint and authorizer.
#[derive(Debug)]
pub struct SessionEngine<E, A, C = SystemClock> {
    store: TokenStore,
    endpoint: E,
    authorizer: A,
    clock: C,
}

impl<E, A> SessionEngine<E, A, SystemClock> {
    /// Creates an engine on the system clock.
    #[must_use]
    pub const fn new(store: TokenStore, endpoint: E, authorizer: A) -> Self {
        Self {
            store,
            endpoint,
            authorizer,
            clock: SystemClock,
        }
    }
}

impl<E, A, C> SessionEngine<E, A, C> {
    /// Replaces the clock.
    #[must_use]
    pub fn with_clock<C2: Clock>(self, clock: C2) -> SessionEngine<E, A, C2> {
        SessionEngine {
            store: self.store,
            endpoint: self.endpoint,
            authorizer: self.authorizer,
            clock,
        }
    }

    /// Token store backing this engine.
    #[must_use]
    pub const fn store(&self) -> &TokenStore {
        &self.store
    }

    /// Token endpoint.
    #[must_use]
    pub const fn endpoint(&self) -> &E {
        &self.endpoint
    }

    /// Authorizer.
    #[must_use]
    pub const fn authorizer(&self) -> &A {
        &self.authorizer
    }
}

impl<E: TokenEndpoint, A: Authorizer, C: Clock> SessionEngine<E, A, C> {
    /// Returns a usable token for `address`, refreshing or authorizing as needed.
    ///
    /// # Errors
    ///
    /// Returns an error if full authorization was required and failed, or if
    /// the resulting token could not be persisted.
    pub async fn session(&self, address: &str) -> Result<TokenSet> {
        let now = self.clock.epoch_seconds();
        let stored = match self.store.load(address).await {
            Ok(stored) => stored,
            Err(e) => {
                warn!(%address, error = %e, "stored token unreadable, reauthorizing");
                None
            }
        };

        let state = SessionState::of(stored.as_ref(), now);
        debug!(%address, %state, "evaluated stored session");

        match (state, stored) {
            (SessionState::TokenValid, Some(token)) => Ok(token),
            (SessionState::TokenExpired, Some(token)) if token.refresh_token.is_some() => {
                match self.refresh(address, &token).await {
                    Ok(fresh) => Ok(fresh),
                    Err(e) => {
                        warn!(
                            %address,
                            error = %e,
                            "token refresh failed, falling back to authorization"
                        );
                        self.authorize(address).await
                    }
                }
            }
            _ => self.authorize(address).await,
        }
    }

    async fn refresh(&self, address: &str, token: &TokenSet) -> Result<TokenSet> {
        let refresh_token = token.refresh_token()?;
        let response = self.endpoint.refresh(refresh_token).await?;

        let mut fresh = TokenSet::from_response(response, self.clock.epoch_seconds());
        if fresh.refresh_token.is_none() {
            fresh.refresh_token.clone_from(&token.refresh_token);
        }

        self.store.save(address, &fresh).await?;
        info!(%address, expires_at = fresh.expires_at, "access token refreshed");
        Ok(fresh)
    }

    async fn authorize(&self, address: &str) -> Result<TokenSet> {
        debug!(%address, state = %SessionState::Authorizing, "starting authorization");

        let result = self.exchange_authorization(address).await;
        match &result {
            Ok(token) => info!(%address, expires_at = token.expires_at, "account authorized"),
            Err(e) => {
                warn!(%address, state = %SessionState::Failed, error = %e, "authorization failed");
            }
        }
        result
    }

    async fn exchange_authorization(&self, address: &str) -> Result<TokenSet> {
        let code = self.authorizer.obtain_code(address).await?;
        let response = self.endpoint.exchange_code(&code).await?;
        let token = TokenSet::from_response(response, self.clock.epoch_seconds());
        self.store.save(address, &token).await?;
        Ok(token)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::unreadable_literal)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::time::MockClock;
    use crate::token::TokenResponse;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    const NOW: i64 = 1_700_000_000;
    const ADDRESS: &str = "me@example.com";

    #[derive(Default)]
    struct FakeEndpoint {
        exchanges: AtomicUsize,
        refreshes: AtomicUsize,
        refresh_fails: bool,
        rotate_refresh_token: bool,
    }

    impl TokenEndpoint for FakeEndpoint {
        async fn exchange_code(&self, code: &str) -> Result<TokenResponse> {
            self.exchanges.fetch_add(1, Ordering::SeqCst);
            let mut response = TokenResponse::bearer(format!("access-for-{code}"), 3600);
            response.refresh_token = Some("refresh-initial".into());
            Ok(response)
        }

        async fn refresh(&self, _refresh_token: &str) -> Result<TokenResponse> {
            self.refreshes.fetch_add(1, Ordering::SeqCst);
            if self.refresh_fails {
                return Err(Error::oauth_error("invalid_grant", "revoked"));
            }
            let mut response = TokenResponse::bearer("access-refreshed", 3600);
            if self.rotate_refresh_token {
                response.refresh_token = Some("refresh-rotated".into());
            }
            Ok(response)
        }
    }

    struct FakeAuthorizer {
        calls: AtomicUsize,
        code: Option<&'static str>,
    }

    impl FakeAuthorizer {
        const fn granting(code: &'static str) -> Self {
            Self {
                calls: AtomicUsize::new(0),
                code: Some(code),
            }
        }

        const fn timing_out() -> Self {
            Self {
                calls: AtomicUsize::new(0),
                code: None,
            }
        }
    }

    impl Authorizer for FakeAuthorizer {
        async fn obtain_code(&self, _address: &str) -> Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.code.map(str::to_string).ok_or(Error::Timeout(120))
        }
    }

    fn engine(
        dir: &TempDir,
        endpoint: FakeEndpoint,
        authorizer: FakeAuthorizer,
    ) -> SessionEngine<FakeEndpoint, FakeAuthorizer, MockClock> {
        SessionEngine::new(TokenStore::new(dir.path()), endpoint, authorizer)
            .with_clock(MockClock::at(NOW))
    }

    type FakeEngine = SessionEngine<FakeEndpoint, FakeAuthorizer, MockClock>;

    fn calls(engine: &FakeEngine) -> (usize, usize, usize) {
        (
            engine.authorizer().calls.load(Ordering::SeqCst),
            engine.endpoint().exchanges.load(Ordering::SeqCst),
            engine.endpoint().refreshes.load(Ordering::SeqCst),
        )
    }

    #[test]
    fn test_state_classification() {
        assert_eq!(SessionState::of(None, NOW), SessionState::NoToken);
        let valid = TokenSet::new("a", NOW + 3600);
        assert_eq!(SessionState::of(Some(&valid), NOW), SessionState::TokenValid);
        let stale = TokenSet::new("a", NOW + 30);
        assert_eq!(SessionState::of(Some(&stale), NOW), SessionState::TokenExpired);
    }

    #[tokio::test]
    async fn test_valid_token_makes_no_calls() {
        let dir = TempDir::new().unwrap();
        let engine = engine(&dir, FakeEndpoint::default(), FakeAuthorizer::granting("c"));
        let stored = TokenSet::new("still-good", NOW + 3600).with_refresh_token("r");
        engine.store().save(ADDRESS, &stored).await.unwrap();

        let token = engine.session(ADDRESS).await.unwrap();
        assert_eq!(token, stored);
        assert_eq!(calls(&engine), (0, 0, 0));
    }

    #[tokio::test]
    async fn test_expired_token_refreshes_once_and_keeps_refresh_token() {
        let dir = TempDir::new().unwrap();
        let engine = engine(&dir, FakeEndpoint::default(), FakeAuthorizer::granting("c"));
        let stored = TokenSet::new("stale", NOW - 10).with_refresh_token("refresh-old");
        engine.store().save(ADDRESS, &stored).await.unwrap();

        let token = engine.session(ADDRESS).await.unwrap();
        assert_eq!(token.access_token, "access-refreshed");
        assert_eq!(token.refresh_token.as_deref(), Some("refresh-old"));
        assert_eq!(token.expires_at, NOW + 3600);
        assert_eq!(calls(&engine), (0, 0, 1));

        let persisted = engine.store().load(ADDRESS).await.unwrap().unwrap();
        assert_eq!(persisted, token);
    }

    #[tokio::test]
    async fn test_refresh_adopts_rotated_refresh_token() {
        let dir = TempDir::new().unwrap();
        let endpoint = FakeEndpoint {
            rotate_refresh_token: true,
            ..FakeEndpoint::default()
        };
        let engine = engine(&dir, endpoint, FakeAuthorizer::granting("c"));
        let stored = TokenSet::new("stale", NOW).with_refresh_token("refresh-old");
        engine.store().save(ADDRESS, &stored).await.unwrap();

        let token = engine.session(ADDRESS).await.unwrap();
        assert_eq!(token.refresh_token.as_deref(), Some("refresh-rotated"));
    }

    #[tokio::test]
    async fn test_no_token_runs_one_authorization() {
        let dir = TempDir::new().unwrap();
        let engine = engine(&dir, FakeEndpoint::default(), FakeAuthorizer::granting("xyz"));

        let token = engine.session(ADDRESS).await.unwrap();
        assert_eq!(token.access_token, "access-for-xyz");
        assert_eq!(calls(&engine), (1, 1, 0));
        assert!(engine.store().load(ADDRESS).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_expired_without_refresh_token_authorizes() {
        let dir = TempDir::new().unwrap();
        let engine = engine(&dir, FakeEndpoint::default(), FakeAuthorizer::granting("c"));
        engine
            .store()
            .save(ADDRESS, &TokenSet::new("stale", NOW - 1))
            .await
            .unwrap();

        engine.session(ADDRESS).await.unwrap();
        assert_eq!(calls(&engine), (1, 1, 0));
    }

    #[tokio::test]
    async fn test_failed_refresh_falls_back_to_authorization() {
        let dir = TempDir::new().unwrap();
        let endpoint = FakeEndpoint {
            refresh_fails: true,
            ..FakeEndpoint::default()
        };
        let engine = engine(&dir, endpoint, FakeAuthorizer::granting("c"));
        let stored = TokenSet::new("stale", NOW - 10).with_refresh_token("revoked");
        engine.store().save(ADDRESS, &stored).await.unwrap();

        let token = engine.session(ADDRESS).await.unwrap();
        assert_eq!(token.access_token, "access-for-c");
        assert_eq!(calls(&engine), (1, 1, 1));
    }

    #[tokio::test]
    async fn test_authorization_timeout_fails_without_persisting() {
        let dir = TempDir::new().unwrap();
        let engine = engine(&dir, FakeEndpoint::default(), FakeAuthorizer::timing_out());

        let result = engine.session(ADDRESS).await;
        assert!(matches!(result, Err(Error::Timeout(120))));
        assert!(engine.store().load(ADDRESS).await.unwrap().is_none());
        assert_eq!(calls(&engine), (1, 0, 0));
    }

    #[tokio::test]
    async fn test_corrupt_token_file_reauthorizes() {
        let dir = TempDir::new().unwrap();
        let engine = engine(&dir, FakeEndpoint::default(), FakeAuthorizer::granting("c"));
        std::fs::write(engine.store().path_for(ADDRESS), b"garbage").unwrap();

        engine.session(ADDRESS).await.unwrap();
        assert_eq!(calls(&engine), (1, 1, 0));
    }
}
