//! Core command implementations and shared utilities
//!
//! This module contains:
//! - `open_db` / `open_vault` - Shared utilities to open the database and credential vault
//! - `cmd_init` - Initialize the database
//! - `cmd_status` - Show database and classifier status

use std::path::Path;

use anyhow::{Context, Result};
use mailpilot_core::db::{Database, DB_KEY_ENV};
use mailpilot_core::CredentialVault;

/// Open database with encryption by default, or unencrypted if --no-encrypt
pub fn open_db(db_path: &Path, no_encrypt: bool) -> Result<Database> {
    let path_str = db_path
        .to_str()
        .context("Database path is not valid UTF-8")?;
    if no_encrypt {
        Database::new_unencrypted(path_str).context("Failed to open database (unencrypted)")
    } else {
        Database::new(path_str).context("Failed to open database")
    }
}

/// Open the credential vault from the environment passphrase
pub fn open_vault() -> Result<CredentialVault> {
    CredentialVault::from_env().context("Failed to open credential vault")
}

pub fn cmd_init(db_path: &Path, no_encrypt: bool) -> Result<()> {
    println!("🔧 Initializing database at {}...", db_path.display());

    let _db = open_db(db_path, no_encrypt)?;

    if no_encrypt {
        println!("   ⚠️  Encryption: DISABLED (--no-encrypt)");
    } else {
        println!("   🔒 Encryption: ENABLED");
    }

    println!("✅ Database initialized successfully!");
    println!();
    println!("Next steps:");
    println!("  1. Link an account: mailpilot accounts add --address you@example.com --protocol imap ...");
    println!("  2. Pull new mail:   mailpilot sync");
    println!("  3. Start web UI:    mailpilot serve");

    Ok(())
}

pub fn cmd_status(db_path: &Path, no_encrypt: bool) -> Result<()> {
    use std::fs;

    println!();
    println!("📊 Mailpilot Status");
    println!("   ─────────────────────────────────────────────────────────────");

    // Database path
    println!("   Database: {}", db_path.display());

    // Check if database file exists and get size
    if db_path.exists() {
        if let Ok(metadata) = fs::metadata(db_path) {
            let size_kb = metadata.len() as f64 / 1024.0;
            if size_kb < 1024.0 {
                println!("   Size: {:.1} KB", size_kb);
            } else {
                println!("   Size: {:.1} MB", size_kb / 1024.0);
            }
        }
    } else {
        println!("   Size: (database not initialized)");
    }

    // Check encryption status
    let has_key = std::env::var(DB_KEY_ENV).is_ok();
    if no_encrypt {
        println!("   ⚠️  Encryption: DISABLED (--no-encrypt)");
    } else if has_key {
        println!("   🔒 Encryption: ENABLED ({}=***)", DB_KEY_ENV);
    } else {
        println!("   ❌ Encryption: REQUIRED but {} not set", DB_KEY_ENV);
    }

    // Classifier backend configuration
    match std::env::var("CLASSIFIER_BACKEND").ok().as_deref() {
        Some("mock") => println!("   🤖 Classifier: mock (deterministic keyword backend)"),
        Some(backend) => {
            let host = std::env::var("CLASSIFIER_HOST").unwrap_or_default();
            println!("   🤖 Classifier: {} ({})", backend, host);
        }
        None => {
            println!("   💡 Classifier: not configured (set CLASSIFIER_BACKEND and CLASSIFIER_HOST)")
        }
    }

    // Try to open the database and show stats
    if db_path.exists() {
        match open_db(db_path, no_encrypt) {
            Ok(db) => {
                let accounts = db.list_accounts(None)?;
                let active = accounts.iter().filter(|a| a.active).count();
                let unclassified = db.unclassified_email_ids(i64::MAX)?.len();
                println!();
                println!("   Accounts: {} ({} active)", accounts.len(), active);
                println!("   Emails: {}", db.count_emails()?);
                println!("   Unclassified: {}", unclassified);
                for account in accounts.iter().filter(|a| a.last_error.is_some()) {
                    if let Some(err) = &account.last_error {
                        println!("   ⚠️  {} - {}", account.address, err);
                    }
                }
            }
            Err(e) => {
                println!();
                println!("   ❌ Error opening database: {}", e);
                if !no_encrypt && !has_key {
                    println!("      Set {} or use --no-encrypt", DB_KEY_ENV);
                } else if has_key {
                    println!("      (Check if {} is correct)", DB_KEY_ENV);
                }
            }
        }
    }

    println!();
    Ok(())
}
