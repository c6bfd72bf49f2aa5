//! Sender and domain reputation
//!
//! Counters live in the database (atomic upserts, see `db::reputation`);
//! this module owns the derived numbers: the confidence score, the trust
//! level mapping, and the batch rebuild job.
//!
//! Confidence is volume times consistency:
//!   volume = n / (n + pivot)            (saturating in observation count)
//!   score  = volume * (floor + (1 - floor) * consistency)
//! where consistency is the share of the key's classified mail in its modal
//! category. An explicit override floors the score near the top. Weights
//! are configuration (`ReputationParams`), not contract.

use tracing::{debug, info};

use crate::db::Database;
use crate::error::Result;
use crate::models::{
    domain_of, normalize_address, ReputationCounters, ReputationEvent, ReputationRow, TrustLevel,
    TrustOverride,
};

/// Tunable weights for the confidence score
#[derive(Debug, Clone)]
pub struct ReputationParams {
    /// Observation count at which volume reaches 0.5
    pub volume_pivot: f64,
    /// Score share granted regardless of category consistency
    pub consistency_floor: f64,
    /// Minimum score for keys with an explicit override
    pub override_floor: f64,
    /// Rows per rebuild batch
    pub rebuild_batch_size: i64,
}

impl Default for ReputationParams {
    fn default() -> Self {
        Self {
            volume_pivot: 10.0,
            consistency_floor: 0.5,
            override_floor: 0.95,
            rebuild_batch_size: 100,
        }
    }
}

/// Compute the derived confidence for one reputation row.
/// Always lands in [0, 1], whatever the inputs.
pub fn confidence_score(
    counters: &ReputationCounters,
    consistency: Option<f64>,
    has_override: bool,
    params: &ReputationParams,
) -> f64 {
    let n = counters.received.max(0) as f64;
    let volume = n / (n + params.volume_pivot);

    // Fewer than two classified messages say nothing about consistency
    let consistency = consistency.unwrap_or(1.0).clamp(0.0, 1.0);
    let mut score =
        volume * (params.consistency_floor + (1.0 - params.consistency_floor) * consistency);

    if has_override {
        score = score.max(params.override_floor);
    }

    score.clamp(0.0, 1.0)
}

/// Map a reputation row to a trust level.
/// Overrides win; otherwise a simple engagement ratio decides.
pub fn trust_level(row: &ReputationRow) -> TrustLevel {
    match row.trust_override {
        Some(TrustOverride::Untrusted) => TrustLevel::Untrusted,
        Some(TrustOverride::Trusted) => {
            if row.confidence >= 0.9 {
                TrustLevel::Verified
            } else {
                TrustLevel::Trusted
            }
        }
        None => {
            let c = &row.counters;
            if c.spam_marked > 0 && c.spam_marked * 2 >= c.received.max(1) {
                return TrustLevel::Untrusted;
            }

            let received = c.received.max(1) as f64;
            let engagement =
                (c.opened + 2 * c.replied - c.archived - 2 * c.deleted - 4 * c.spam_marked) as f64
                    / received;

            if engagement <= -0.5 {
                TrustLevel::Untrusted
            } else if engagement >= 0.5 {
                TrustLevel::Trusted
            } else {
                TrustLevel::Neutral
            }
        }
    }
}

/// Public read shape for a reputation key
#[derive(Debug, Clone, serde::Serialize)]
pub struct ReputationView {
    pub key: String,
    pub trust_level: TrustLevel,
    pub confidence: f64,
    pub counters: ReputationCounters,
    pub trust_override: Option<TrustOverride>,
}

impl ReputationView {
    fn from_row(row: ReputationRow) -> Self {
        Self {
            trust_level: trust_level(&row),
            key: row.key,
            confidence: row.confidence,
            counters: row.counters,
            trust_override: row.trust_override,
        }
    }
}

/// Outcome of a rebuild pass
#[derive(Debug, Clone, Copy, serde::Serialize)]
pub struct RebuildOutcome {
    pub processed: usize,
    pub updated: usize,
}

/// Reputation operations over the database
#[derive(Clone)]
pub struct ReputationStore {
    db: Database,
    params: ReputationParams,
}

impl ReputationStore {
    pub fn new(db: Database) -> Self {
        Self {
            db,
            params: ReputationParams::default(),
        }
    }

    pub fn with_params(db: Database, params: ReputationParams) -> Self {
        Self { db, params }
    }

    /// Record one interaction event for a sender. Increments the sender row
    /// and its domain row, then refreshes both derived scores.
    pub fn record_event(&self, user_id: &str, sender: &str, event: ReputationEvent) -> Result<()> {
        let sender = normalize_address(sender);

        self.db.increment_sender_event(user_id, &sender, event)?;
        self.refresh_sender(user_id, &sender)?;

        if let Some(domain) = domain_of(&sender) {
            self.db.increment_domain_event(user_id, &domain, event)?;
            self.refresh_domain(user_id, &domain)?;
        }

        Ok(())
    }

    pub fn get_sender(&self, user_id: &str, sender: &str) -> Result<Option<ReputationView>> {
        let sender = normalize_address(sender);
        Ok(self
            .db
            .get_sender_reputation(user_id, &sender)?
            .map(ReputationView::from_row))
    }

    pub fn get_domain(&self, user_id: &str, domain: &str) -> Result<Option<ReputationView>> {
        Ok(self
            .db
            .get_domain_reputation(user_id, domain)?
            .map(ReputationView::from_row))
    }

    /// Set or clear an explicit sender override and refresh its score
    pub fn set_sender_override(
        &self,
        user_id: &str,
        sender: &str,
        value: Option<TrustOverride>,
    ) -> Result<()> {
        let sender = normalize_address(sender);
        self.db.set_sender_override(user_id, &sender, value)?;
        self.refresh_sender(user_id, &sender)
    }

    /// Set or clear an explicit domain override and refresh its score
    pub fn set_domain_override(
        &self,
        user_id: &str,
        domain: &str,
        value: Option<TrustOverride>,
    ) -> Result<()> {
        self.db.set_domain_override(user_id, domain, value)?;
        self.refresh_domain(user_id, domain)
    }

    /// Recompute derived confidence for every reputation row of a user.
    /// Walks both tables in id-ordered batches, so an interrupted run can
    /// simply be started again. Counters are never touched.
    pub fn rebuild(&self, user_id: &str) -> Result<RebuildOutcome> {
        let mut processed = 0;
        let mut updated = 0;

        let mut after_id = 0;
        loop {
            let batch = self
                .db
                .sender_rows_after(user_id, after_id, self.params.rebuild_batch_size)?;
            if batch.is_empty() {
                break;
            }
            for row in batch {
                after_id = row.id;
                processed += 1;
                if self.refresh_sender_row(user_id, &row)? {
                    updated += 1;
                }
            }
        }

        let mut after_id = 0;
        loop {
            let batch = self
                .db
                .domain_rows_after(user_id, after_id, self.params.rebuild_batch_size)?;
            if batch.is_empty() {
                break;
            }
            for row in batch {
                after_id = row.id;
                processed += 1;
                if self.refresh_domain_row(user_id, &row)? {
                    updated += 1;
                }
            }
        }

        info!(
            "reputation rebuild for {}: {} rows processed, {} updated",
            user_id, processed, updated
        );
        Ok(RebuildOutcome { processed, updated })
    }

    fn refresh_sender(&self, user_id: &str, sender: &str) -> Result<()> {
        if let Some(row) = self.db.get_sender_reputation(user_id, sender)? {
            self.refresh_sender_row(user_id, &row)?;
        }
        Ok(())
    }

    fn refresh_domain(&self, user_id: &str, domain: &str) -> Result<()> {
        if let Some(row) = self.db.get_domain_reputation(user_id, domain)? {
            self.refresh_domain_row(user_id, &row)?;
        }
        Ok(())
    }

    fn refresh_sender_row(&self, user_id: &str, row: &ReputationRow) -> Result<bool> {
        let counts = self.db.sender_category_counts(user_id, &row.key)?;
        let score = confidence_score(
            &row.counters,
            consistency_from_counts(&counts),
            row.trust_override.is_some(),
            &self.params,
        );
        if (score - row.confidence).abs() < 1e-9 {
            return Ok(false);
        }
        debug!(
            "sender {} confidence {:.3} -> {:.3}",
            row.key, row.confidence, score
        );
        self.db.update_sender_confidence(row.id, score)?;
        Ok(true)
    }

    fn refresh_domain_row(&self, user_id: &str, row: &ReputationRow) -> Result<bool> {
        let counts = self.db.domain_category_counts(user_id, &row.key)?;
        let score = confidence_score(
            &row.counters,
            consistency_from_counts(&counts),
            row.trust_override.is_some(),
            &self.params,
        );
        if (score - row.confidence).abs() < 1e-9 {
            return Ok(false);
        }
        self.db.update_domain_confidence(row.id, score)?;
        Ok(true)
    }
}

/// Modal-category share from a classified-mail histogram.
/// None when there is too little signal to judge.
fn consistency_from_counts(counts: &[(String, i64)]) -> Option<f64> {
    let total: i64 = counts.iter().map(|(_, n)| n).sum();
    if total < 2 {
        return None;
    }
    let modal = counts.iter().map(|(_, n)| *n).max().unwrap_or(0);
    Some(modal as f64 / total as f64)
}
