//! HTTP request handlers organized by domain
//!
//! Each submodule contains handlers for a specific API area.

pub mod accounts;
pub mod classify;
pub mod emails;
pub mod feedback;
pub mod reputation;
pub mod status;

// Re-export all handlers for use in router
pub use accounts::*;
pub use classify::*;
pub use emails::*;
pub use feedback::*;
pub use reputation::*;
pub use status::*;
