//! Command-line arguments.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(name = "maildigest", version, about = "Keep incremental header digests of IMAP folders")]
pub struct Cli {
    /// Configuration file
    #[arg(long, global = true, env = "MAILDIGEST_CONFIG", value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Debug logging (RUST_LOG overrides)
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Update the digest of every configured folder
    Sync {
        /// Only this account
        #[arg(long)]
        account: Option<String>,
    },
    /// Capture a folder into a fresh digest
    Fetch {
        #[arg(long)]
        account: String,
        #[arg(long)]
        folder: String,
    },
    /// Obtain or refresh an OAuth2 session
    Auth {
        #[arg(long)]
        account: String,
    },
    /// List digest files
    Digests {
        #[arg(long)]
        account: Option<String>,
        #[arg(long)]
        folder: Option<String>,
    },
    /// Mark messages deleted and mirror the change into the latest digest
    Delete {
        #[arg(long)]
        account: String,
        #[arg(long)]
        folder: String,
        /// Comma-separated UIDs
        #[arg(long, value_delimiter = ',', required = true)]
        ids: Vec<u32>,
        /// Expunge afterwards and drop the records
        #[arg(long)]
        expunge: bool,
    },
}
