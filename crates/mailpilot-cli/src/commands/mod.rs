//! CLI command implementations
//!
//! Commands are organized by domain:
//! - `accounts` - Account management (list, add, credentials, disable)
//! - `classify` - Classification commands (classify, correct, feedback, accuracy)
//! - `core` - Core commands (init, status) and shared utilities (open_db, open_vault)
//! - `emails` - Email listing and detail commands
//! - `reputation` - Reputation inspection and overrides
//! - `serve` - Web server command
//! - `sync` - Mail sync command

pub mod accounts;
pub mod classify;
pub mod core;
pub mod emails;
pub mod reputation;
pub mod serve;
pub mod sync;

// Re-export command functions for main.rs
pub use accounts::*;
pub use classify::*;
pub use core::*;
pub use emails::*;
pub use reputation::*;
pub use serve::*;
pub use sync::*;

/// Truncate a string to a maximum length, adding "..." if truncated
pub fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let cut: String = s.chars().take(max.saturating_sub(3)).collect();
        format!("{}...", cut)
    }
}
