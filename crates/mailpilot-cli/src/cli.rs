//! CLI argument definitions using clap
//!
//! This module contains all the clap structs and enums for parsing CLI arguments.
//! The actual command implementations are in the `commands` module.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Mailpilot - Multi-account mail sync and triage
#[derive(Parser)]
#[command(name = "mailpilot")]
#[command(about = "Self-hosted mail sync, classification, and triage", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Database path
    #[arg(long, default_value = "mailpilot.db", global = true)]
    pub db: PathBuf,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Disable database encryption (not recommended for production)
    ///
    /// By default, the database is encrypted using SQLCipher.
    /// Set MAILPILOT_DB_KEY environment variable with your passphrase.
    /// Use --no-encrypt only for development or testing.
    #[arg(long, global = true)]
    pub no_encrypt: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Initialize the database
    Init,

    /// Show database and classifier status
    Status,

    /// Manage mail source accounts (list, add, credentials, disable)
    Accounts {
        #[command(subcommand)]
        action: Option<AccountsAction>,
    },

    /// Sync new mail from one account or all active accounts
    Sync {
        /// Sync only this account ID (all active accounts if omitted)
        #[arg(long)]
        account: Option<i64>,

        /// Maximum messages to pull per account
        #[arg(short, long, default_value = "50")]
        limit: u32,

        /// Ignore the stored cursor and re-pull from the beginning
        #[arg(long)]
        full: bool,
    },

    /// List synced emails or show one in detail
    Emails {
        #[command(subcommand)]
        action: Option<EmailsAction>,
    },

    /// Classify unclassified emails with the configured backend
    ///
    /// Set CLASSIFIER_BACKEND, CLASSIFIER_HOST, and CLASSIFIER_MODEL to
    /// point at an OpenAI-compatible endpoint, or CLASSIFIER_BACKEND=mock
    /// for the deterministic keyword classifier.
    Classify {
        /// Maximum emails to classify in this run
        #[arg(short, long, default_value = "50")]
        limit: i64,

        /// Explicit email IDs (comma-separated) instead of the unclassified queue
        #[arg(long)]
        ids: Option<String>,
    },

    /// Correct an email's category (feeds the accuracy and reputation loops)
    Correct {
        /// Email ID
        email_id: i64,
        /// Correct category (e.g. "spam", "finance", "work")
        category: String,
    },

    /// Show correction history
    Feedback {
        /// Number of records to show
        #[arg(short, long, default_value = "20")]
        limit: i64,
    },

    /// Show per-category classification accuracy
    Accuracy,

    /// Inspect or adjust sender/domain reputation
    Reputation {
        #[command(subcommand)]
        action: ReputationAction,
    },

    /// Start the web server
    Serve {
        /// Port to listen on
        #[arg(short, long, default_value = "3000")]
        port: u16,

        /// Host to bind to
        #[arg(long, default_value = "127.0.0.1")]
        host: String,

        /// Disable authentication (for local development only)
        ///
        /// WARNING: Do not use this flag when exposing the server to a network.
        /// By default, the server requires an API key from MAILPILOT_API_KEYS.
        #[arg(long)]
        no_auth: bool,
    },
}

#[derive(Subcommand)]
pub enum AccountsAction {
    /// List linked accounts
    List,

    /// Link a new mail source account
    Add {
        /// Mailbox address (e.g. you@example.com)
        #[arg(long)]
        address: String,

        /// Protocol: imap or rest
        #[arg(long)]
        protocol: String,

        /// IMAP username
        #[arg(long)]
        username: Option<String>,

        /// IMAP password (app password recommended)
        #[arg(long)]
        password: Option<String>,

        /// IMAP server host
        #[arg(long)]
        host: Option<String>,

        /// IMAP server port
        #[arg(long, default_value = "993")]
        port: u16,

        /// OAuth client ID (rest protocol)
        #[arg(long)]
        client_id: Option<String>,

        /// OAuth refresh token (rest protocol)
        #[arg(long)]
        refresh_token: Option<String>,

        /// OAuth token endpoint URL (rest protocol)
        #[arg(long)]
        token_uri: Option<String>,

        /// Provider REST API base URL (rest protocol)
        #[arg(long)]
        api_base: Option<String>,
    },

    /// Replace an account's stored credentials (re-activates it)
    Credentials {
        /// Account ID
        id: i64,

        /// IMAP password or OAuth refresh token
        #[arg(long)]
        secret: String,
    },

    /// Disable an account (no further syncs until credentials are updated)
    Disable {
        /// Account ID
        id: i64,
    },
}

#[derive(Subcommand)]
pub enum EmailsAction {
    /// List emails, newest first
    List {
        /// Only this account
        #[arg(long)]
        account: Option<i64>,

        /// Number of emails to show
        #[arg(short, long, default_value = "20")]
        limit: i64,

        /// Skip this many emails
        #[arg(long, default_value = "0")]
        offset: i64,
    },

    /// Show one email in detail
    Show {
        /// Email ID
        id: i64,

        /// Fetch and display the message body (contacts the provider if needed)
        #[arg(long)]
        body: bool,
    },
}

#[derive(Subcommand)]
pub enum ReputationAction {
    /// Look up one sender or domain
    Get {
        /// Sender address
        #[arg(long)]
        sender: Option<String>,

        /// Domain
        #[arg(long)]
        domain: Option<String>,
    },

    /// Set or clear a trust override
    Override {
        /// Sender address
        #[arg(long)]
        sender: Option<String>,

        /// Domain
        #[arg(long)]
        domain: Option<String>,

        /// "trusted", "untrusted", or "clear"
        #[arg(long)]
        value: String,
    },

    /// Recompute all derived reputation scores from the stored counters
    Rebuild,
}
