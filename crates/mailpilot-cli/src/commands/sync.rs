//! Mail sync command implementation

use std::path::Path;

use anyhow::Result;
use mailpilot_core::{CredentialVault, SyncCoordinator, SyncOptions};
use tracing::debug;

use super::{open_db, open_vault};

pub async fn cmd_sync(
    db_path: &Path,
    account: Option<i64>,
    limit: u32,
    full: bool,
    no_encrypt: bool,
) -> Result<()> {
    let db = open_db(db_path, no_encrypt)?;
    let vault: CredentialVault = open_vault()?;
    let coordinator = SyncCoordinator::new(db.clone(), vault);

    let options = SyncOptions {
        limit,
        full_sync: full,
    };
    debug!(limit, full_sync = full, "sync options");

    match account {
        Some(id) => {
            let address = db.get_account(id)?.address;
            println!("📥 Syncing {}...", address);
            let outcome = coordinator.sync_account(id, &options).await?;
            println!("   New messages: {}", outcome.synced);
            if let Some(cursor) = &outcome.cursor {
                println!("   Cursor: {}", cursor);
            }
            for err in &outcome.errors {
                println!("   ⚠️  {}", err);
            }
        }
        None => {
            println!("📥 Syncing all active accounts...");
            let outcome = coordinator.sync_all("default", &options).await?;
            for report in &outcome.per_account {
                match &report.error {
                    None => println!("   {} - {} new", report.address, report.synced),
                    Some(err) => println!("   {} - ⚠️  {}", report.address, err),
                }
            }
            println!();
            println!("✅ {} new messages", outcome.synced);
        }
    }

    let pending = db.unclassified_email_ids(i64::MAX)?.len();
    if pending > 0 {
        println!();
        println!(
            "💡 {} emails awaiting classification. Run 'mailpilot classify'.",
            pending
        );
    }

    Ok(())
}
