//! Command implementations.
//!
//! Configuration problems abort before any network I/O. After that, a
//! failing account or folder is logged and the rest carry on; the exit
//! status reports whether anything failed.

use std::path::Path;

use anyhow::{Context, bail};
use chrono::DateTime;
use futures::future::join_all;
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use maildigest_core::{
    Account, AppConfig, AuthMethod, BatchFetcher, Credentials, DigestStore, DigestSync,
    EngineConfig, FetchProgress, ImapSession, MailSession, MailboxDigest, SyncOutcome,
    delete_messages,
};
use maildigest_oauth::{BrowserAuthorizer, OAuthClient, SessionEngine, TokenStore};
use tracing::{error, info, warn};

use crate::cli::{Cli, Command};

type OAuthEngine = SessionEngine<OAuthClient, BrowserAuthorizer>;

const PROGRESS_TEMPLATE: &str = "{prefix:.bold} [{bar:30.cyan/blue}] {pos}/{len} ({percent}%)";

/// Runs one parsed command line.
pub async fn run(cli: Cli) -> anyhow::Result<()> {
    let config = AppConfig::load(cli.config.as_deref())?;
    config.validate()?;
    let app = App::new(&config)?;

    match cli.command {
        Command::Sync { account } => {
            let accounts = match account {
                Some(name) => vec![config.account(&name)?],
                None => config.accounts.iter().collect(),
            };
            app.sync(&accounts).await
        }
        Command::Fetch { account, folder } => app.fetch(config.account(&account)?, &folder).await,
        Command::Auth { account } => app.auth(config.account(&account)?).await,
        Command::Digests { account, folder } => {
            let address = account
                .map(|name| config.account(&name).map(|a| a.email.clone()))
                .transpose()?;
            app.list_digests(address.as_deref(), folder.as_deref()).await
        }
        Command::Delete {
            account,
            folder,
            ids,
            expunge,
        } => app.delete(config.account(&account)?, &folder, &ids, expunge).await,
    }
}

struct App {
    sync: DigestSync,
    oauth: Option<OAuthEngine>,
    progress: MultiProgress,
}

impl App {
    fn new(config: &AppConfig) -> anyhow::Result<Self> {
        let engine = config.engine();
        let oauth = config
            .oauth
            .as_ref()
            .map(|settings| -> anyhow::Result<OAuthEngine> {
                let client = settings.client()?;
                let mut authorizer = BrowserAuthorizer::new(client.clone(), engine.auth_timeout);
                if let Some(scopes) = settings.scopes() {
                    authorizer = authorizer.with_scopes(scopes);
                }
                Ok(SessionEngine::new(TokenStore::new(&engine.token_dir), client, authorizer))
            })
            .transpose()?;

        Ok(Self {
            sync: sync_service(&engine),
            oauth,
            progress: MultiProgress::new(),
        })
    }

    fn store(&self) -> &DigestStore {
        self.sync.store()
    }

    async fn credentials(&self, account: &Account) -> anyhow::Result<Credentials> {
        match &account.auth {
            AuthMethod::Password { password } => Ok(Credentials::Password(password.clone())),
            AuthMethod::OAuth2 => {
                let engine = self
                    .oauth
                    .as_ref()
                    .context("oauth2 account without a client registration")?;
                let token = engine.session(&account.email).await?;
                Ok(Credentials::OAuth2(token.access_token))
            }
        }
    }

    async fn sync(&self, accounts: &[&Account]) -> anyhow::Result<()> {
        // One authorization at a time: every flow listens on the same port.
        let mut ready = Vec::with_capacity(accounts.len());
        let mut failures = 0;
        for &account in accounts {
            match self.credentials(account).await {
                Ok(credentials) => ready.push((account, credentials)),
                Err(e) => {
                    error!(account = %account.name, error = %e, "no credentials, skipping account");
                    failures += account.folders.len();
                }
            }
        }

        let results = join_all(
            ready
                .iter()
                .map(|(account, credentials)| self.sync_account(account, credentials)),
        )
        .await;
        failures += results.into_iter().sum::<usize>();

        if failures > 0 {
            bail!("{failures} folder(s) failed");
        }
        Ok(())
    }

    /// Returns the number of folders that failed.
    async fn sync_account(&self, account: &Account, credentials: &Credentials) -> usize {
        let mut failures = 0;
        for folder in &account.folders {
            if let Err(e) = self.sync_folder(account, credentials, folder).await {
                error!(account = %account.name, %folder, error = %e, "folder sync failed");
                failures += 1;
            }
        }
        failures
    }

    async fn sync_folder(
        &self,
        account: &Account,
        credentials: &Credentials,
        folder: &str,
    ) -> anyhow::Result<()> {
        let mut session = ImapSession::connect(account, credentials, folder).await?;
        let bar = self.bar(account, folder);
        let outcome = self
            .sync
            .update(&mut session, &account.email, folder, |p| advance(&bar, p))
            .await;
        bar.finish_and_clear();
        close(session).await;

        let outcome = outcome?;
        if let SyncOutcome::Merged {
            uid_validity_changed: true,
            ..
        }
        | SyncOutcome::UpToDate {
            uid_validity_changed: true,
            ..
        } = outcome
        {
            println!("{}/{folder}: UIDVALIDITY changed; consider a full fetch", account.name);
        }
        match outcome {
            SyncOutcome::Created { path, headers } => {
                println!(
                    "{}/{folder}: new digest, {headers} headers -> {}",
                    account.name,
                    path.display()
                );
            }
            SyncOutcome::Merged { added, path, .. } => {
                println!("{}/{folder}: {added} new headers -> {}", account.name, path.display());
            }
            SyncOutcome::UpToDate { .. } => println!("{}/{folder}: up to date", account.name),
        }
        Ok(())
    }

    async fn fetch(&self, account: &Account, folder: &str) -> anyhow::Result<()> {
        let credentials = self.credentials(account).await?;
        let mut session = ImapSession::connect(account, &credentials, folder).await?;
        let bar = self.bar(account, folder);
        let result = self
            .sync
            .fetch_full(&mut session, &account.email, folder, |p| advance(&bar, p))
            .await;
        bar.finish_and_clear();
        close(session).await;

        let (path, digest) = result.with_context(|| format!("fetching {}/{folder}", account.name))?;
        println!("{}/{folder}: {} headers -> {}", account.name, digest.len(), path.display());
        Ok(())
    }

    async fn auth(&self, account: &Account) -> anyhow::Result<()> {
        if !account.uses_oauth() {
            bail!("account '{}' uses password authentication", account.name);
        }
        let engine = self
            .oauth
            .as_ref()
            .context("oauth2 account without a client registration")?;
        let token = engine.session(&account.email).await?;
        let expires = DateTime::from_timestamp(token.expires_at, 0)
            .map_or_else(|| token.expires_at.to_string(), |t| t.to_rfc3339());
        println!("{}: access token valid until {expires}", account.email);
        Ok(())
    }

    async fn list_digests(
        &self,
        address: Option<&str>,
        folder: Option<&str>,
    ) -> anyhow::Result<()> {
        for path in self.store().all().await? {
            let digest = match self.store().load(&path).await {
                Ok(digest) => digest,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "unreadable digest skipped");
                    continue;
                }
            };
            if address.is_some_and(|a| a != digest.mail_address())
                || folder.is_some_and(|f| f != digest.folder_name())
            {
                continue;
            }
            println!("{}", describe(&path, &digest));
        }
        Ok(())
    }

    async fn delete(
        &self,
        account: &Account,
        folder: &str,
        ids: &[u32],
        expunge: bool,
    ) -> anyhow::Result<()> {
        let (path, digest) = self
            .store()
            .latest(&account.email, folder)
            .await?
            .with_context(|| format!("no digest for {}/{folder}; run fetch first", account.name))?;

        let credentials = self.credentials(account).await?;
        let mut session = ImapSession::connect(account, &credentials, folder).await?;
        let result =
            delete_messages(&mut session, self.store(), &path, &digest, ids, expunge).await;
        close(session).await;

        let updated = result?;
        info!(
            account = %account.name,
            %folder,
            before = digest.len(),
            after = updated.len(),
            "delete finished"
        );
        println!(
            "{}/{folder}: {} headers remain in {}",
            account.name,
            updated.len(),
            path.display()
        );
        Ok(())
    }

    fn bar(&self, account: &Account, folder: &str) -> ProgressBar {
        let bar = self.progress.add(ProgressBar::new(0));
        bar.set_style(
            ProgressStyle::with_template(PROGRESS_TEMPLATE)
                .map_or_else(|_| ProgressStyle::default_bar(), |s| s.progress_chars("#>-")),
        );
        bar.set_prefix(format!("{}/{folder}", account.name));
        bar
    }
}

fn sync_service(engine: &EngineConfig) -> DigestSync {
    DigestSync::new(DigestStore::new(&engine.digest_dir), BatchFetcher::new(engine.batch_size))
}

fn advance(bar: &ProgressBar, progress: FetchProgress) {
    bar.set_length(progress.total as u64);
    bar.set_position(progress.fetched as u64);
}

async fn close(session: ImapSession) {
    if let Err(e) = session.disconnect().await {
        warn!(error = %e, "logout failed");
    }
}

fn describe(path: &Path, digest: &MailboxDigest) -> String {
    let name = path
        .file_name()
        .map_or_else(|| path.display().to_string(), |n| n.to_string_lossy().into_owned());
    format!(
        "{name}\t{}\t{}\t{} headers\trange {}\tuidvalidity {}",
        digest.mail_address(),
        digest.folder_name(),
        digest.len(),
        digest.index_range(),
        digest.uid_validity(),
    )
}
