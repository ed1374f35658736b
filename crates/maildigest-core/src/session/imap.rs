//! [`MailSession`] over `async-imap` with rustls.

use std::sync::Arc;
use std::time::Duration;

use async_imap::types::{Fetch, Flag as ImapFlag};
use futures::TryStreamExt;
use maildigest_oauth::sasl;
use rustls::pki_types::ServerName;
use tokio::net::TcpStream;
use tokio_rustls::TlsConnector;
use tokio_rustls::client::TlsStream;
use tracing::{debug, info, warn};

use super::{Credentials, DIGEST_FIELDS, MailSession, RawMessage, uid_set};
use crate::account::Account;
use crate::digest::{Flag, FlagOperation, IndexRange};
use crate::error::{Error, Result};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// An authenticated IMAP connection with one folder selected.
pub struct ImapSession {
    session: async_imap::Session<TlsStream<TcpStream>>,
    folder: String,
    exists: u32,
    uid_validity: u32,
}

impl std::fmt::Debug for ImapSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImapSession")
            .field("folder", &self.folder)
            .field("exists", &self.exists)
            .field("uid_validity", &self.uid_validity)
            .finish_non_exhaustive()
    }
}

impl ImapSession {
    /// Connects over implicit TLS, authenticates, and selects `folder`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Connection`] for network and TLS failures,
    /// [`Error::Authentication`] if the server rejects the credentials, and
    /// [`Error::Imap`] if the folder cannot be selected.
    pub async fn connect(
        account: &Account,
        credentials: &Credentials,
        folder: &str,
    ) -> Result<Self> {
        let stream = tls_connect(&account.host, account.port).await?;
        let mut client = async_imap::Client::new(stream);

        // The greeting must be consumed before AUTHENTICATE, or the
        // handshake reads it in place of the continuation.
        let _greeting = client
            .read_response()
            .await
            .transpose()
            .map_err(|e| Error::Connection(format!("reading server greeting: {e}")))?;

        let login = account.login();
        let mut session = match credentials {
            Credentials::Password(password) => client
                .login(login, password)
                .await
                .map_err(|(e, _)| Error::Authentication(format!("LOGIN as {login}: {e}")))?,
            Credentials::OAuth2(token) => client
                .authenticate("XOAUTH2", XOAuth2::new(login, token))
                .await
                .map_err(|(e, _)| Error::Authentication(format!("XOAUTH2 as {login}: {e}")))?,
        };
        debug!(host = %account.host, %login, "authenticated");

        let mailbox = session.select(folder).await?;
        let uid_validity = mailbox.uid_validity.unwrap_or_else(|| {
            warn!(%folder, "server reported no UIDVALIDITY");
            0
        });
        info!(%folder, exists = mailbox.exists, uid_validity, "folder selected");

        Ok(Self {
            session,
            folder: folder.to_string(),
            exists: mailbox.exists,
            uid_validity,
        })
    }

    /// Selected folder name.
    #[must_use]
    pub fn folder(&self) -> &str {
        &self.folder
    }
}

impl MailSession for ImapSession {
    fn message_count(&self) -> u32 {
        self.exists
    }

    fn uid_validity(&self) -> u32 {
        self.uid_validity
    }

    async fn fetch(&mut self, range: IndexRange) -> Result<Vec<RawMessage>> {
        if range.is_empty() {
            return Ok(Vec::new());
        }
        let query = format!(
            "(UID FLAGS BODY.PEEK[HEADER.FIELDS ({})])",
            DIGEST_FIELDS.join(" ")
        );

        let fetches: Vec<Fetch> = self
            .session
            .fetch(range.to_string(), &query)
            .await?
            .try_collect()
            .await?;

        Ok(fetches.iter().map(raw_message).collect())
    }

    async fn store_flags(&mut self, uids: &[u32], op: FlagOperation, flags: &[Flag]) -> Result<()> {
        if uids.is_empty() {
            return Ok(());
        }
        let flag_list = flags.iter().map(Flag::as_str).collect::<Vec<_>>().join(" ");
        let query = format!("{} ({flag_list})", op.store_item());

        let _: Vec<Fetch> = self
            .session
            .uid_store(uid_set(uids), &query)
            .await?
            .try_collect()
            .await?;
        debug!(folder = %self.folder, count = uids.len(), %query, "flags stored");
        Ok(())
    }

    async fn expunge(&mut self) -> Result<u32> {
        let expunged: Vec<u32> = self.session.expunge().await?.try_collect().await?;
        let removed = u32::try_from(expunged.len()).unwrap_or(u32::MAX);
        self.exists = self.exists.saturating_sub(removed);
        debug!(folder = %self.folder, removed, "expunged");
        Ok(removed)
    }

    async fn disconnect(mut self) -> Result<()> {
        self.session.logout().await?;
        Ok(())
    }
}

fn raw_message(fetch: &Fetch) -> RawMessage {
    RawMessage {
        seq: fetch.message,
        uid: fetch.uid,
        flags: fetch.flags().map(|f| flag_name(&f)).collect(),
        header: fetch.header().map(<[u8]>::to_vec).unwrap_or_default(),
    }
}

fn flag_name(flag: &ImapFlag<'_>) -> String {
    match flag {
        ImapFlag::Seen => "\\Seen".to_string(),
        ImapFlag::Answered => "\\Answered".to_string(),
        ImapFlag::Flagged => "\\Flagged".to_string(),
        ImapFlag::Deleted => "\\Deleted".to_string(),
        ImapFlag::Draft => "\\Draft".to_string(),
        ImapFlag::Recent => "\\Recent".to_string(),
        ImapFlag::MayCreate => "\\*".to_string(),
        ImapFlag::Custom(name) => name.to_string(),
        #[allow(unreachable_patterns)]
        other => format!("{other:?}"),
    }
}

async fn tls_connect(host: &str, port: u16) -> Result<TlsStream<TcpStream>> {
    let tcp = tokio::time::timeout(CONNECT_TIMEOUT, TcpStream::connect((host, port)))
        .await
        .map_err(|_| Error::Connection(format!("connect to {host}:{port} timed out")))?
        .map_err(|e| Error::Connection(format!("connect to {host}:{port}: {e}")))?;

    let root_store = rustls::RootCertStore {
        roots: webpki_roots::TLS_SERVER_ROOTS.to_vec(),
    };
    let config = rustls::ClientConfig::builder()
        .with_root_certificates(root_store)
        .with_no_client_auth();
    let connector = TlsConnector::from(Arc::new(config));

    let server_name = ServerName::try_from(host.to_string())
        .map_err(|e| Error::Connection(format!("invalid server name {host}: {e}")))?;

    connector
        .connect(server_name, tcp)
        .await
        .map_err(|e| Error::Connection(format!("TLS handshake with {host}: {e}")))
}

/// `AUTHENTICATE XOAUTH2` exchange. The client library base64-encodes the
/// response, so the raw payload is handed over.
struct XOAuth2 {
    payload: Vec<u8>,
    sent: bool,
}

impl XOAuth2 {
    fn new(user: &str, token: &str) -> Self {
        Self {
            payload: sasl::xoauth2_payload(user, token).into_bytes(),
            sent: false,
        }
    }
}

impl async_imap::Authenticator for XOAuth2 {
    type Response = Vec<u8>;

    fn process(&mut self, challenge: &[u8]) -> Self::Response {
        if !self.sent {
            self.sent = true;
            return self.payload.clone();
        }
        // A second challenge carries the JSON failure; an empty reply lets
        // the server finish with NO.
        if let Ok(failure) = sasl::parse_oauth_error(challenge) {
            warn!(
                status = %failure.status,
                scope = ?failure.scope,
                "server rejected XOAUTH2 token"
            );
        }
        Vec::new()
    }
}
