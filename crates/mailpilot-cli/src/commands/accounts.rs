//! Account management command implementations

use anyhow::{bail, Context, Result};
use mailpilot_core::db::Database;
use mailpilot_core::models::{Credentials, NewSourceAccount, Protocol};
use mailpilot_core::CredentialVault;

use super::truncate;

const DEFAULT_USER: &str = "default";

/// IMAP credential arguments from the command line
pub struct ImapArgs {
    pub username: Option<String>,
    pub password: Option<String>,
    pub host: Option<String>,
    pub port: u16,
}

/// OAuth credential arguments from the command line
pub struct OAuthArgs {
    pub client_id: Option<String>,
    pub refresh_token: Option<String>,
    pub token_uri: Option<String>,
    pub api_base: Option<String>,
}

pub fn cmd_accounts_list(db: &Database) -> Result<()> {
    let accounts = db.list_accounts(None)?;

    if accounts.is_empty() {
        println!("No accounts linked. Add one with:");
        println!("  mailpilot accounts add --address you@example.com --protocol imap \\");
        println!("      --username you --password APP_PASSWORD --host imap.example.com");
        return Ok(());
    }

    println!();
    println!("📬 Accounts");
    println!("   ─────────────────────────────────────────────────────────────");

    for account in accounts {
        let state = if account.active { "active" } else { "disabled" };
        let synced = account
            .last_synced_at
            .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
            .unwrap_or_else(|| "never".to_string());
        println!(
            "   [{}] {} ({}, {}) last sync: {}",
            account.id,
            account.address,
            account.protocol.as_str(),
            state,
            synced
        );
        if let Some(err) = &account.last_error {
            println!("        ⚠️  {}", truncate(err, 70));
        }
    }

    println!();
    Ok(())
}

pub fn cmd_accounts_add(
    db: &Database,
    vault: &CredentialVault,
    address: &str,
    protocol: &str,
    imap: ImapArgs,
    oauth: OAuthArgs,
) -> Result<()> {
    let protocol: Protocol = protocol
        .parse()
        .map_err(|_| anyhow::anyhow!("Unknown protocol: {} (use imap or rest)", protocol))?;
    if !address.contains('@') {
        bail!("Address must be a mailbox address like you@example.com");
    }

    let credentials = match protocol {
        Protocol::Imap => {
            let (username, password, host) = match (imap.username, imap.password, imap.host) {
                (Some(u), Some(p), Some(h)) => (u, p, h),
                _ => bail!("IMAP accounts need --username, --password, and --host"),
            };
            Credentials::Password {
                username,
                password,
                host,
                port: imap.port,
            }
        }
        Protocol::Rest => {
            let (client_id, refresh_token, token_uri, api_base) = match (
                oauth.client_id,
                oauth.refresh_token,
                oauth.token_uri,
                oauth.api_base,
            ) {
                (Some(c), Some(r), Some(t), Some(a)) => (c, r, t, a),
                _ => bail!(
                    "REST accounts need --client-id, --refresh-token, --token-uri, and --api-base"
                ),
            };
            Credentials::OAuth {
                client_id,
                refresh_token,
                access_token: String::new(),
                token_uri,
                api_base,
                expiry: None,
            }
        }
    };

    let blob = vault
        .encrypt(&credentials)
        .context("Failed to encrypt credentials")?;
    let id = db.create_account(&NewSourceAccount {
        user_id: DEFAULT_USER.to_string(),
        address: address.to_string(),
        protocol,
        credentials: blob,
    })?;

    println!("✅ Linked account {} ({})", address.to_lowercase(), id);
    println!("   Pull mail with: mailpilot sync --account {}", id);
    Ok(())
}

pub fn cmd_accounts_credentials(
    db: &Database,
    vault: &CredentialVault,
    id: i64,
    secret: &str,
) -> Result<()> {
    let account = db.get_account(id)?;
    let updated = match vault
        .decrypt(&account.credentials)
        .context("Failed to decrypt stored credentials")?
    {
        Credentials::Password {
            username,
            host,
            port,
            ..
        } => Credentials::Password {
            username,
            password: secret.to_string(),
            host,
            port,
        },
        Credentials::OAuth {
            client_id,
            token_uri,
            api_base,
            ..
        } => Credentials::OAuth {
            client_id,
            refresh_token: secret.to_string(),
            access_token: String::new(),
            token_uri,
            api_base,
            expiry: None,
        },
    };

    let blob = vault
        .encrypt(&updated)
        .context("Failed to encrypt credentials")?;
    db.update_account_credentials(id, &blob)?;

    println!("✅ Updated credentials for {} (re-activated)", account.address);
    Ok(())
}

pub fn cmd_accounts_disable(db: &Database, id: i64) -> Result<()> {
    let account = db.get_account(id)?;
    db.deactivate_account(id, "disabled from the command line")?;
    println!("✅ Disabled {} (update credentials to re-activate)", account.address);
    Ok(())
}
