//! Mailpilot Core Library
//!
//! Shared functionality for the Mailpilot mail pipeline:
//! - Database access and migrations
//! - Encrypted per-account credential vault
//! - Provider adapters (IMAP sessions, token-REST polling)
//! - Incremental sync coordinator with lazy body loading
//! - Deterministic rule pre-filter
//! - External classifier contract with validated fallback
//! - Sender/domain reputation store
//! - Feedback loop for user corrections

pub mod classify;
pub mod db;
pub mod error;
pub mod feedback;
pub mod models;
pub mod prefilter;
pub mod provider;
pub mod reputation;
pub mod sync;
pub mod vault;

/// Test utilities including the mock classifier server
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use classify::{
    ClassificationEngine, ClassifierBackend, ClassifierClient, ClassifyBatchOptions,
    ClassifyBatchOutcome, HttpClassifier, MockClassifier,
};
pub use db::{Database, EmailInsertResult};
pub use error::{Error, Result};
pub use feedback::{CorrectionOutcome, FeedbackLoop};
pub use models::{
    Category, ClassificationResult, Credentials, Direction, Email, KeyEntities, NewEmail,
    NewSourceAccount, Protocol, ReputationEvent, SourceAccount, SuggestedAction, TrustLevel,
    TrustOverride,
};
pub use prefilter::{PreFilter, PrefilterHint, PrefilterOutcome};
pub use provider::{
    BackoffPolicy, FetchedBody, ListOutcome, ProviderAdapter, ProviderError, RawMessage,
};
pub use reputation::{RebuildOutcome, ReputationParams, ReputationStore, ReputationView};
pub use sync::{SyncAllOutcome, SyncCoordinator, SyncOptions, SyncOutcome};
pub use vault::CredentialVault;
