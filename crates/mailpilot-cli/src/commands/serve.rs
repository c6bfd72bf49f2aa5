//! Server command implementation

use std::path::Path;

use anyhow::Result;
use mailpilot_server::ServerConfig;

use super::{open_db, open_vault};

/// Environment variable holding comma-separated API keys for the server
pub const API_KEYS_ENV: &str = "MAILPILOT_API_KEYS";

pub async fn cmd_serve(
    db_path: &Path,
    host: &str,
    port: u16,
    no_auth: bool,
    no_encrypt: bool,
) -> Result<()> {
    println!("🚀 Starting Mailpilot web server...");
    println!("   Database: {}", db_path.display());
    println!("   Listening: http://{}:{}", host, port);

    // Parse API keys from environment (comma-separated)
    let api_keys: Vec<String> = std::env::var(API_KEYS_ENV)
        .unwrap_or_default()
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect();

    if no_auth {
        println!();
        println!("   ⚠️  Authentication DISABLED - do not expose to network!");
    } else if api_keys.is_empty() {
        println!();
        println!(
            "   ❌ Authentication required but no API keys configured ({})",
            API_KEYS_ENV
        );
        println!("      All requests will be rejected. Set keys or use --no-auth locally.");
    } else {
        println!(
            "   🔑 API keys: {} configured ({})",
            api_keys.len(),
            API_KEYS_ENV
        );
    }

    if std::env::var("CLASSIFIER_BACKEND").is_err() {
        println!("   💡 Tip: Set CLASSIFIER_BACKEND and CLASSIFIER_HOST to enable classification");
    }

    let db = open_db(db_path, no_encrypt)?;
    let vault = open_vault()?;

    let config = ServerConfig {
        require_auth: !no_auth,
        api_keys,
        ..Default::default()
    };

    mailpilot_server::serve_with_config(db, vault, host, port, config).await
}
