//! Classification engine
//!
//! Owns the full path from a stored email to a persisted classification:
//! pre-filter, context assembly, classifier call, validation fallback,
//! write-back. Classification is total: whatever the external service
//! does, every email ends up with a persisted result.

use std::time::{Duration, Instant};
use tracing::{debug, warn};

use super::types::{body_excerpt, ClassifierRequest, ReputationContext};
use super::{ClassifierBackend, ClassifierClient};
use crate::db::Database;
use crate::error::Result;
use crate::models::{domain_of, ClassificationResult};
use crate::prefilter::{MessageSignals, PreFilter};
use crate::reputation::trust_level;

/// Default minimum spacing between classifier calls in a batch
pub const MIN_CALL_SPACING: Duration = Duration::from_millis(250);

/// Default wall-clock budget for one batch run
pub const BATCH_TIME_BUDGET: Duration = Duration::from_secs(25);

const MAX_REPORTED_ERRORS: usize = 3;

/// Pacing knobs for batch classification
#[derive(Debug, Clone)]
pub struct ClassifyBatchOptions {
    pub min_spacing: Duration,
    pub time_budget: Duration,
}

impl Default for ClassifyBatchOptions {
    fn default() -> Self {
        Self {
            min_spacing: MIN_CALL_SPACING,
            time_budget: BATCH_TIME_BUDGET,
        }
    }
}

/// Result of one batch run
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct ClassifyBatchOutcome {
    pub classified: usize,
    /// First few infrastructure errors; contract failures are not errors
    pub errors: Vec<String>,
    /// IDs left unprocessed when the time budget ran out
    pub remaining: Vec<i64>,
}

pub struct ClassificationEngine {
    db: Database,
    classifier: ClassifierClient,
    prefilter: PreFilter,
}

impl ClassificationEngine {
    pub fn new(db: Database, classifier: ClassifierClient) -> Result<Self> {
        Ok(Self {
            db,
            classifier,
            prefilter: PreFilter::new()?,
        })
    }

    /// Classify one email and persist the result.
    ///
    /// Contract failures (malformed JSON, out-of-range fields, timeouts)
    /// are logged and resolved to the fallback result; only infrastructure
    /// problems (missing email, database) surface as errors.
    pub async fn classify_email(&self, email_id: i64) -> Result<ClassificationResult> {
        let email = self.db.get_email(email_id)?;
        let account = self.db.get_account(email.account_id)?;

        let user_domain = domain_of(&account.address);
        let sender_domain = domain_of(&email.from_address);

        let domain_override = match sender_domain.as_deref() {
            Some(domain) => self
                .db
                .get_domain_reputation(&account.user_id, domain)?
                .and_then(|row| row.trust_override),
            None => None,
        };

        let signals = MessageSignals {
            from_address: &email.from_address,
            list_unsubscribe: email.list_unsubscribe.as_deref(),
            precedence: email.precedence.as_deref(),
        };
        let prefilter = self
            .prefilter
            .evaluate(signals, user_domain.as_deref(), domain_override);

        if let Some(result) = prefilter.short_circuit {
            debug!("email {} short-circuited by pre-filter", email_id);
            self.db.write_classification(email_id, &result)?;
            return Ok(result);
        }

        let sender_reputation = self
            .db
            .get_sender_reputation(&account.user_id, &email.from_address)?
            .map(|row| ReputationContext {
                trust_level: trust_level(&row),
                confidence: row.confidence,
            });

        let body = email
            .body_text
            .as_deref()
            .or(email.snippet.as_deref())
            .unwrap_or("");

        let request = ClassifierRequest {
            from: email.from_address.clone(),
            subject: email.subject.clone().unwrap_or_default(),
            body_excerpt: body_excerpt(body),
            hints: prefilter.hints.iter().map(|h| h.as_str().to_string()).collect(),
            sender_reputation,
        };

        let result = match self.classifier.classify(&request).await {
            Ok(result) => result,
            Err(e) => {
                warn!(
                    "classifier contract failure for email {}: {}, using fallback",
                    email_id, e
                );
                ClassificationResult::fallback()
            }
        };

        self.db.write_classification(email_id, &result)?;
        Ok(result)
    }

    /// Classify a batch of emails with pacing and a wall-clock budget.
    /// Never aborts the run for a single email.
    pub async fn classify_batch(
        &self,
        ids: &[i64],
        options: &ClassifyBatchOptions,
    ) -> ClassifyBatchOutcome {
        let start = Instant::now();
        let mut outcome = ClassifyBatchOutcome::default();

        for (i, id) in ids.iter().enumerate() {
            if start.elapsed() >= options.time_budget {
                outcome.remaining = ids[i..].to_vec();
                debug!(
                    "batch budget exhausted after {} of {} emails",
                    i,
                    ids.len()
                );
                break;
            }

            if i > 0 {
                tokio::time::sleep(options.min_spacing).await;
            }

            match self.classify_email(*id).await {
                Ok(_) => outcome.classified += 1,
                Err(e) => {
                    if outcome.errors.len() < MAX_REPORTED_ERRORS {
                        outcome.errors.push(format!("email {}: {}", id, e));
                    }
                }
            }
        }

        outcome
    }

    /// Probe the configured classifier backend
    pub async fn classifier_healthy(&self) -> bool {
        self.classifier.health_check().await
    }

    pub fn backend_name(&self) -> &'static str {
        self.classifier.backend_name()
    }
}
