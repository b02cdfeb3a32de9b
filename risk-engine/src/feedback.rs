//! Feedback sink
//!
//! Confirmed outcomes flow off the request path: the API enqueues on a
//! bounded channel and a background task applies them to the consortium,
//! the accuracy statistics and the response cache.

use crate::accuracy::RuleAccuracyTracker;
use crate::audit::TransactionStore;
use crate::cache::IdempotencyCache;
use crate::consortium::ConsortiumIntelligence;
use crate::hashing::IdentifierHasher;
use crate::metrics::Metrics;
use crate::types::{FeedbackRecord, Outcome};
use crate::validation::validate_feedback;
use crate::{Error, Result};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Attempts per record in the background worker
const MAX_ATTEMPTS: u32 = 4;

/// First backoff delay, doubled per attempt
const RETRY_BASE_DELAY: Duration = Duration::from_millis(50);

/// What applying one feedback record did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedbackOutcome {
    /// Applied
    Applied {
        /// Identifier hashes confirmed as fraud
        identifiers: usize,
        /// Rules whose statistics moved
        rules: usize,
    },
    /// Feedback for this transaction was already applied
    Duplicate,
    /// No audit record for the transaction
    UnknownTransaction,
}

/// Applies feedback records
pub struct FeedbackProcessor {
    audit: Arc<dyn TransactionStore>,
    consortium: ConsortiumIntelligence,
    accuracy: Arc<RuleAccuracyTracker>,
    cache: IdempotencyCache,
    hasher: IdentifierHasher,
    metrics: Metrics,
}

impl FeedbackProcessor {
    /// Create new processor
    pub fn new(
        audit: Arc<dyn TransactionStore>,
        consortium: ConsortiumIntelligence,
        accuracy: Arc<RuleAccuracyTracker>,
        cache: IdempotencyCache,
        hasher: IdentifierHasher,
        metrics: Metrics,
    ) -> Self {
        Self {
            audit,
            consortium,
            accuracy,
            cache,
            hasher,
            metrics,
        }
    }

    /// Apply one record.
    ///
    /// The feedback is marked applied only after every consortium write
    /// succeeded. A failed write returns the error and leaves the record
    /// open for a retry; consortium confirmations are keyed by report, so
    /// the identifiers already written are not counted twice.
    pub async fn apply(&self, feedback: &FeedbackRecord) -> Result<FeedbackOutcome> {
        validate_feedback(feedback)?;

        let Some(record) = self.audit.get(&feedback.transaction_id).await? else {
            warn!(transaction_id = %feedback.transaction_id, "feedback for unknown transaction");
            return Ok(FeedbackOutcome::UnknownTransaction);
        };
        if record.feedback.is_some() {
            debug!(transaction_id = %feedback.transaction_id, "duplicate feedback ignored");
            return Ok(FeedbackOutcome::Duplicate);
        }

        let tx = &record.transaction;
        let mut identifiers = 0;
        if feedback.actual_outcome == Outcome::Fraud {
            let report = self.hasher.report_token(&tx.tenant_id, &tx.transaction_id);
            let mut failure = None;
            for (kind, hash) in self.hasher.hash_all(tx) {
                match self
                    .consortium
                    .confirm_fraud(&hash, kind, &report, feedback.fraud_type, tx.amount, feedback.reported_at)
                    .await
                {
                    Ok(_) => identifiers += 1,
                    Err(e) => {
                        self.metrics.record_dependency_failure("consortium");
                        warn!(kind = kind.as_str(), error = %e, "confirm fraud failed");
                        failure.get_or_insert(e);
                    }
                }
            }
            if let Some(e) = failure {
                return Err(e);
            }
        }

        if !self
            .audit
            .mark_feedback(&feedback.transaction_id, feedback.actual_outcome)
            .await?
        {
            debug!(transaction_id = %feedback.transaction_id, "feedback applied concurrently");
            return Ok(FeedbackOutcome::Duplicate);
        }

        if feedback.actual_outcome == Outcome::Fraud {
            if let Err(e) = self.cache.invalidate_user(&tx.tenant_id, &tx.user_id).await {
                self.metrics.record_dependency_failure("cache");
                warn!(tenant = %tx.tenant_id, error = %e, "cache invalidation failed");
            }
        }

        for rule in &record.result.triggered_rules {
            self.accuracy.record(&rule.rule_id, feedback.actual_outcome);
        }

        self.metrics.feedback_processed.inc();
        info!(
            transaction_id = %feedback.transaction_id,
            outcome = ?feedback.actual_outcome,
            identifiers,
            rules = record.result.triggered_rules.len(),
            "feedback applied"
        );
        Ok(FeedbackOutcome::Applied {
            identifiers,
            rules: record.result.triggered_rules.len(),
        })
    }

    /// Apply with bounded retries on dependency failures
    async fn apply_with_retry(&self, feedback: &FeedbackRecord) -> Result<FeedbackOutcome> {
        let mut delay = RETRY_BASE_DELAY;
        let mut attempt = 1;
        loop {
            match self.apply(feedback).await {
                Err(e) if e.is_retryable() && attempt < MAX_ATTEMPTS => {
                    debug!(transaction_id = %feedback.transaction_id, attempt, error = %e, "retrying feedback");
                    tokio::time::sleep(delay).await;
                    delay *= 2;
                    attempt += 1;
                }
                other => return other,
            }
        }
    }
}

/// Sending side of the feedback queue
#[derive(Clone)]
pub struct FeedbackSink {
    sender: mpsc::Sender<FeedbackRecord>,
}

impl FeedbackSink {
    /// Start the worker task. Must be called inside a Tokio runtime.
    pub fn spawn(processor: Arc<FeedbackProcessor>, capacity: usize) -> (Self, JoinHandle<()>) {
        let (sender, mut receiver) = mpsc::channel::<FeedbackRecord>(capacity.max(1));
        let handle = tokio::spawn(async move {
            while let Some(feedback) = receiver.recv().await {
                if let Err(e) = processor.apply_with_retry(&feedback).await {
                    warn!(transaction_id = %feedback.transaction_id, error = %e, "feedback failed");
                }
            }
            debug!("feedback worker stopped");
        });
        (Self { sender }, handle)
    }

    /// Validate and enqueue; waits while the queue is full
    pub async fn submit(&self, feedback: FeedbackRecord) -> Result<()> {
        validate_feedback(&feedback)?;
        self.sender
            .send(feedback)
            .await
            .map_err(|_| Error::ChannelClosed("feedback worker stopped".to_string()))
    }
}
