//! `maildigest` - incremental header digests of IMAP folders.
//!
//! Thin command-line front-end over `maildigest-core` and `maildigest-oauth`.

#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

mod cli;
mod commands;

use clap::Parser;
use tracing::debug;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const DEFAULT_FILTER: &str = "maildigest=info,maildigest_core=info,maildigest_oauth=info";
const VERBOSE_FILTER: &str = "maildigest=debug,maildigest_core=debug,maildigest_oauth=debug";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = cli::Cli::parse();

    // RUST_LOG wins over -v
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                if cli.verbose { VERBOSE_FILTER } else { DEFAULT_FILTER }.into()
            }),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    debug!(command = ?cli.command, "starting maildigest");
    commands::run(cli).await
}
