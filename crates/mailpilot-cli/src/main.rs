//! Mailpilot CLI - Mail sync and triage
//!
//! Usage:
//!   mailpilot init                      Initialize database
//!   mailpilot accounts add --address …  Link a mail account
//!   mailpilot sync                      Pull new mail from all accounts
//!   mailpilot classify                  Classify the unclassified queue
//!   mailpilot serve --port 3000         Start web server

mod cli;
mod commands;


use anyhow::Result;
use clap::Parser;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use cli::*;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Set up logging
    // Priority: RUST_LOG env var > --verbose flag > default (info)
    let filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false).compact())
        .init();

    match cli.command {
        Commands::Init => commands::cmd_init(&cli.db, cli.no_encrypt),
        Commands::Status => commands::cmd_status(&cli.db, cli.no_encrypt),
        Commands::Accounts { action } => {
            let db = commands::open_db(&cli.db, cli.no_encrypt)?;
            match action {
                None | Some(AccountsAction::List) => commands::cmd_accounts_list(&db),
                Some(AccountsAction::Add {
                    address,
                    protocol,
                    username,
                    password,
                    host,
                    port,
                    client_id,
                    refresh_token,
                    token_uri,
                    api_base,
                }) => {
                    let vault = commands::open_vault()?;
                    commands::cmd_accounts_add(
                        &db,
                        &vault,
                        &address,
                        &protocol,
                        commands::ImapArgs {
                            username,
                            password,
                            host,
                            port,
                        },
                        commands::OAuthArgs {
                            client_id,
                            refresh_token,
                            token_uri,
                            api_base,
                        },
                    )
                }
                Some(AccountsAction::Credentials { id, secret }) => {
                    let vault = commands::open_vault()?;
                    commands::cmd_accounts_credentials(&db, &vault, id, &secret)
                }
                Some(AccountsAction::Disable { id }) => commands::cmd_accounts_disable(&db, id),
            }
        }
        Commands::Sync {
            account,
            limit,
            full,
        } => commands::cmd_sync(&cli.db, account, limit, full, cli.no_encrypt).await,
        Commands::Emails { action } => {
            let db = commands::open_db(&cli.db, cli.no_encrypt)?;
            match action {
                None => commands::cmd_emails_list(&db, None, 20, 0),
                Some(EmailsAction::List {
                    account,
                    limit,
                    offset,
                }) => commands::cmd_emails_list(&db, account, limit, offset),
                Some(EmailsAction::Show { id, body }) => {
                    commands::cmd_emails_show(&db, id, body).await
                }
            }
        }
        Commands::Classify { limit, ids } => {
            commands::cmd_classify(&cli.db, limit, ids.as_deref(), cli.no_encrypt).await
        }
        Commands::Correct { email_id, category } => {
            let db = commands::open_db(&cli.db, cli.no_encrypt)?;
            commands::cmd_correct(&db, email_id, &category)
        }
        Commands::Feedback { limit } => {
            let db = commands::open_db(&cli.db, cli.no_encrypt)?;
            commands::cmd_feedback(&db, limit)
        }
        Commands::Accuracy => {
            let db = commands::open_db(&cli.db, cli.no_encrypt)?;
            commands::cmd_accuracy(&db)
        }
        Commands::Reputation { action } => {
            let db = commands::open_db(&cli.db, cli.no_encrypt)?;
            match action {
                ReputationAction::Get { sender, domain } => {
                    commands::cmd_reputation_get(&db, sender.as_deref(), domain.as_deref())
                }
                ReputationAction::Override {
                    sender,
                    domain,
                    value,
                } => commands::cmd_reputation_override(
                    &db,
                    sender.as_deref(),
                    domain.as_deref(),
                    &value,
                ),
                ReputationAction::Rebuild => commands::cmd_reputation_rebuild(&db),
            }
        }
        Commands::Serve {
            port,
            host,
            no_auth,
        } => commands::cmd_serve(&cli.db, &host, port, no_auth, cli.no_encrypt).await,
    }
}
