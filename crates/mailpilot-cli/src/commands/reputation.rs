//! Reputation command implementations

use anyhow::{bail, Result};
use mailpilot_core::db::Database;
use mailpilot_core::models::TrustOverride;
use mailpilot_core::reputation::ReputationView;
use mailpilot_core::ReputationStore;

const DEFAULT_USER: &str = "default";

fn print_view(view: &ReputationView) {
    println!();
    println!("🔎 {}", view.key);
    println!("   Trust: {}", view.trust_level.as_str());
    if let Some(value) = view.trust_override {
        println!("   Override: {}", value.as_str());
    }
    println!("   Confidence: {:.2}", view.confidence);
    println!(
        "   Received: {}  Opened: {}  Replied: {}",
        view.counters.received, view.counters.opened, view.counters.replied
    );
    println!(
        "   Archived: {}  Deleted: {}  Spam-marked: {}",
        view.counters.archived, view.counters.deleted, view.counters.spam_marked
    );
    println!();
}

pub fn cmd_reputation_get(
    db: &Database,
    sender: Option<&str>,
    domain: Option<&str>,
) -> Result<()> {
    let store = ReputationStore::new(db.clone());

    let view = match (sender, domain) {
        (Some(sender), None) => store.get_sender(DEFAULT_USER, sender)?,
        (None, Some(domain)) => store.get_domain(DEFAULT_USER, domain)?,
        _ => bail!("Provide exactly one of --sender or --domain"),
    };

    match view {
        Some(view) => print_view(&view),
        None => println!("No reputation recorded for that key."),
    }
    Ok(())
}

pub fn cmd_reputation_override(
    db: &Database,
    sender: Option<&str>,
    domain: Option<&str>,
    value: &str,
) -> Result<()> {
    let store = ReputationStore::new(db.clone());

    let parsed = match value {
        "clear" => None,
        other => Some(
            other
                .parse::<TrustOverride>()
                .map_err(|_| anyhow::anyhow!("Use trusted, untrusted, or clear"))?,
        ),
    };

    let key = match (sender, domain) {
        (Some(sender), None) => {
            store.set_sender_override(DEFAULT_USER, sender, parsed)?;
            sender
        }
        (None, Some(domain)) => {
            store.set_domain_override(DEFAULT_USER, domain, parsed)?;
            domain
        }
        _ => bail!("Provide exactly one of --sender or --domain"),
    };

    match parsed {
        Some(value) => println!("✅ {} is now {}", key, value.as_str()),
        None => println!("✅ Cleared override for {}", key),
    }
    Ok(())
}

pub fn cmd_reputation_rebuild(db: &Database) -> Result<()> {
    let store = ReputationStore::new(db.clone());
    let outcome = store.rebuild(DEFAULT_USER)?;
    println!(
        "✅ Rebuilt reputation: {} rows processed, {} changed",
        outcome.processed, outcome.updated
    );
    Ok(())
}
