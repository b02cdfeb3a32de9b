//! Evaluation pipeline
//!
//! Orchestrates one check-transaction request:
//!
//! 1. validate, compute the input hash
//! 2. consult the idempotency cache; a hit is returned verbatim with no
//!    counter or consortium mutation
//! 3. read velocity, consortium and identity concurrently
//! 4. run the rules under the latency budget, then the ML model
//! 5. blend, decide, cache the result
//! 6. only then increment counters and record consortium sightings
//! 7. audit, and notify webhooks off the request path
//!
//! Only validation errors reach the caller. Every dependency failure is
//! absorbed into a result marked degraded.

use crate::accuracy::RuleAccuracyTracker;
use crate::audit::{AuditRecord, InMemoryTransactionStore, TransactionStore};
use crate::cache::{CacheStore, IdempotencyCache, InMemoryCacheStore};
use crate::calibration::{normalize_key, CalibrationStore, VerticalConfig};
use crate::combiner::HybridCombiner;
use crate::config::Config;
use crate::consortium::{ConsortiumIntelligence, ConsortiumStore, InMemoryConsortiumStore};
use crate::engine::{RuleEngine, RuleEvaluation};
use crate::error::{FieldError, ValidationErrors};
use crate::feedback::{FeedbackOutcome, FeedbackProcessor, FeedbackSink};
use crate::hashing::{input_hash, IdentifierHasher};
use crate::identity::{IdentitySignals, IdentityVerifier};
use crate::metrics::Metrics;
use crate::ml::{usable_probability, FeatureVector, MlScorer};
use crate::rules::{RuleContext, RuleRegistry};
use crate::types::{CheckResponse, Decision, EvaluationResult, FeedbackRecord, RiskScore, Transaction, TriggeredRule};
use crate::validation::validate_transaction;
use crate::velocity::{CounterStore, InMemoryCounterStore, VelocityCounters};
use crate::webhook::{should_notify, WebhookDispatcher, WebhookEvent};
use crate::{Error, Result};
use chrono::Utc;
use dashmap::DashMap;
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

/// Reasons listed in an explanation
const EXPLANATION_REASONS: usize = 5;

/// Background task aborted when its owner goes away
struct AbortOnDrop(JoinHandle<()>);

impl Drop for AbortOnDrop {
    fn drop(&mut self) {
        self.0.abort();
    }
}

/// Sweep expired velocity buckets and cache entries on a fixed interval
fn spawn_janitor(
    velocity: VelocityCounters,
    cache: IdempotencyCache,
    metrics: Metrics,
    every: Duration,
) -> AbortOnDrop {
    AbortOnDrop(tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately
        ticker.tick().await;
        loop {
            ticker.tick().await;
            let (counters, entries) = tokio::join!(velocity.purge_expired(), cache.purge_expired());
            match counters {
                Ok(n) if n > 0 => debug!(buckets = n, "expired velocity buckets purged"),
                Ok(_) => {}
                Err(e) => {
                    metrics.record_dependency_failure("velocity");
                    warn!(error = %e, "velocity purge failed");
                }
            }
            match entries {
                Ok(n) if n > 0 => debug!(entries = n, "expired cache entries purged"),
                Ok(_) => {}
                Err(e) => {
                    metrics.record_dependency_failure("cache");
                    warn!(error = %e, "cache purge failed");
                }
            }
        }
    }))
}

/// Holds a per-input-hash slot and releases it on drop, including when the
/// request future is cancelled while waiting
struct InflightSlot<'a> {
    slots: &'a DashMap<String, Arc<Mutex<()>>>,
    key: String,
    slot: Arc<Mutex<()>>,
}

impl<'a> InflightSlot<'a> {
    fn acquire(slots: &'a DashMap<String, Arc<Mutex<()>>>, key: &str) -> Self {
        let slot = slots
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        Self {
            slots,
            key: key.to_string(),
            slot,
        }
    }
}

impl Drop for InflightSlot<'_> {
    fn drop(&mut self) {
        // Only the map and this holder left
        self.slots.remove_if(&self.key, |_, slot| {
            Arc::ptr_eq(slot, &self.slot) && Arc::strong_count(slot) == 2
        });
    }
}

/// Error detail for one failed batch item
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchItemError {
    /// Stable error code
    pub code: String,
    /// Human-readable message
    pub message: String,
    /// Field-level detail for validation failures
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub fields: Vec<FieldError>,
}

impl From<&Error> for BatchItemError {
    fn from(error: &Error) -> Self {
        let fields = match error {
            Error::Validation(errors) => errors.errors.clone(),
            _ => Vec::new(),
        };
        Self {
            code: error.code().to_string(),
            message: error.to_string(),
            fields,
        }
    }
}

/// Outcome of one batch item
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchItemResult {
    /// Position in the submitted batch
    pub index: usize,
    /// Transaction id as submitted
    pub transaction_id: String,
    /// Assessment, when the item succeeded
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response: Option<CheckResponse>,
    /// Failure, when it did not
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<BatchItemError>,
}

/// Aggregate over a batch
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchSummary {
    /// Items submitted
    pub total: usize,
    /// Items assessed
    pub succeeded: usize,
    /// Items rejected
    pub failed: usize,
    /// Approve decisions
    pub approved: usize,
    /// Review decisions
    pub review: usize,
    /// Decline decisions
    pub declined: usize,
    /// Items served from the cache
    pub cached: usize,
    /// Wall-clock time for the whole batch
    pub processing_time_ms: u64,
}

/// Answer to a batch request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchResponse {
    /// Per-item outcomes in submission order
    pub results: Vec<BatchItemResult>,
    /// Aggregate counts
    pub summary: BatchSummary,
}

/// Builder for [`RiskPipeline`]. Collaborators not supplied fall back to
/// in-memory stores; ML, identity and webhooks are simply absent.
pub struct RiskPipelineBuilder {
    config: Config,
    registry: Option<RuleRegistry>,
    calibration: Option<CalibrationStore>,
    counter_store: Option<Arc<dyn CounterStore>>,
    consortium_store: Option<Arc<dyn ConsortiumStore>>,
    cache_store: Option<Arc<dyn CacheStore>>,
    audit_store: Option<Arc<dyn TransactionStore>>,
    ml_scorer: Option<Arc<dyn MlScorer>>,
    identity_verifier: Option<Arc<dyn IdentityVerifier>>,
    webhooks: Option<Arc<dyn WebhookDispatcher>>,
    metrics: Option<Metrics>,
}

impl RiskPipelineBuilder {
    /// Rule registry; defaults to the full catalog
    pub fn registry(mut self, registry: RuleRegistry) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Vertical calibration; defaults to the built-in verticals
    pub fn calibration(mut self, calibration: CalibrationStore) -> Self {
        self.calibration = Some(calibration);
        self
    }

    /// Velocity counter backend
    pub fn counter_store(mut self, store: Arc<dyn CounterStore>) -> Self {
        self.counter_store = Some(store);
        self
    }

    /// Consortium backend
    pub fn consortium_store(mut self, store: Arc<dyn ConsortiumStore>) -> Self {
        self.consortium_store = Some(store);
        self
    }

    /// Idempotency cache backend
    pub fn cache_store(mut self, store: Arc<dyn CacheStore>) -> Self {
        self.cache_store = Some(store);
        self
    }

    /// Audit backend
    pub fn audit_store(mut self, store: Arc<dyn TransactionStore>) -> Self {
        self.audit_store = Some(store);
        self
    }

    /// ML model
    pub fn ml_scorer(mut self, scorer: Arc<dyn MlScorer>) -> Self {
        self.ml_scorer = Some(scorer);
        self
    }

    /// Identity verification service
    pub fn identity_verifier(mut self, verifier: Arc<dyn IdentityVerifier>) -> Self {
        self.identity_verifier = Some(verifier);
        self
    }

    /// Webhook dispatcher
    pub fn webhooks(mut self, dispatcher: Arc<dyn WebhookDispatcher>) -> Self {
        self.webhooks = Some(dispatcher);
        self
    }

    /// Metrics collector
    pub fn metrics(mut self, metrics: Metrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Validate the wiring and start the feedback worker.
    /// Must be called inside a Tokio runtime.
    pub fn build(self) -> Result<RiskPipeline> {
        let config = self.config;
        config.validate()?;

        let registry = match self.registry {
            Some(registry) => registry,
            None => RuleRegistry::with_default_catalog()?,
        };
        let calibration = self
            .calibration
            .unwrap_or_else(CalibrationStore::with_builtin_verticals);
        calibration.validate_against(&registry)?;

        let metrics = match self.metrics {
            Some(metrics) => metrics,
            None => Metrics::new().map_err(|e| Error::Config(format!("Failed to register metrics: {}", e)))?,
        };

        let registry = Arc::new(registry);
        let engine = RuleEngine::new(registry.clone()).with_metrics(metrics.clone());

        let velocity = VelocityCounters::new(
            self.counter_store
                .unwrap_or_else(|| Arc::new(InMemoryCounterStore::new())),
            Duration::from_millis(config.velocity.timeout_ms),
        );
        let consortium = ConsortiumIntelligence::new(
            self.consortium_store
                .unwrap_or_else(|| Arc::new(InMemoryConsortiumStore::new())),
            config.consortium.tenant_window_days,
            Duration::from_millis(config.consortium.timeout_ms),
        );
        let cache = IdempotencyCache::new(
            self.cache_store
                .unwrap_or_else(|| Arc::new(InMemoryCacheStore::new())),
            Duration::from_secs(config.cache.ttl_seconds),
            Duration::from_millis(config.cache.timeout_ms),
        );
        let audit = self
            .audit_store
            .unwrap_or_else(|| Arc::new(InMemoryTransactionStore::new()));
        let hasher = IdentifierHasher::new(&config.hashing.pepper);
        let accuracy = Arc::new(RuleAccuracyTracker::new(config.feedback.min_samples));

        let processor = Arc::new(FeedbackProcessor::new(
            audit.clone(),
            consortium.clone(),
            accuracy.clone(),
            cache.clone(),
            hasher.clone(),
            metrics.clone(),
        ));
        let (feedback, feedback_worker) =
            FeedbackSink::spawn(processor.clone(), config.feedback.channel_capacity);
        let janitor = spawn_janitor(
            velocity.clone(),
            cache.clone(),
            metrics.clone(),
            config.pipeline.purge_interval(),
        );

        info!(
            rules = registry.len(),
            verticals = calibration.verticals().len(),
            budget_ms = config.pipeline.latency_budget_ms,
            ml = self.ml_scorer.is_some(),
            "risk pipeline ready"
        );

        Ok(RiskPipeline {
            combiner: HybridCombiner::new(config.pipeline.default_ml_weight),
            config,
            engine,
            calibration: Arc::new(calibration),
            hasher,
            velocity,
            consortium,
            cache,
            audit,
            accuracy,
            ml_scorer: self.ml_scorer,
            identity_verifier: self.identity_verifier,
            webhooks: self.webhooks,
            feedback,
            feedback_worker,
            _janitor: janitor,
            processor,
            metrics,
            inflight: DashMap::new(),
        })
    }
}

/// Risk scoring pipeline
pub struct RiskPipeline {
    config: Config,
    engine: RuleEngine,
    calibration: Arc<CalibrationStore>,
    combiner: HybridCombiner,
    hasher: IdentifierHasher,
    velocity: VelocityCounters,
    consortium: ConsortiumIntelligence,
    cache: IdempotencyCache,
    audit: Arc<dyn TransactionStore>,
    accuracy: Arc<RuleAccuracyTracker>,
    ml_scorer: Option<Arc<dyn MlScorer>>,
    identity_verifier: Option<Arc<dyn IdentityVerifier>>,
    webhooks: Option<Arc<dyn WebhookDispatcher>>,
    feedback: FeedbackSink,
    feedback_worker: JoinHandle<()>,
    _janitor: AbortOnDrop,
    processor: Arc<FeedbackProcessor>,
    metrics: Metrics,
    inflight: DashMap<String, Arc<Mutex<()>>>,
}

impl RiskPipeline {
    /// Start building a pipeline
    pub fn builder(config: Config) -> RiskPipelineBuilder {
        RiskPipelineBuilder {
            config,
            registry: None,
            calibration: None,
            counter_store: None,
            consortium_store: None,
            cache_store: None,
            audit_store: None,
            ml_scorer: None,
            identity_verifier: None,
            webhooks: None,
            metrics: None,
        }
    }

    /// Pipeline with the full catalog, built-in verticals and in-memory stores
    pub fn from_config(config: Config) -> Result<Self> {
        Self::builder(config).build()
    }

    /// Score one transaction
    pub async fn check_transaction(&self, tx: Transaction) -> Result<CheckResponse> {
        let started = Instant::now();
        self.metrics.evaluations_total.inc();
        validate_transaction(&tx)?;

        let input_hash = input_hash(&tx);

        // Identical inputs racing in this process queue behind one another,
        // so the later one finds the earlier one's cache entry.
        let slot = InflightSlot::acquire(&self.inflight, &input_hash);
        let response = {
            let _guard = slot.slot.lock().await;
            self.check_locked(&tx, &input_hash, started).await
        };
        drop(slot);

        Ok(response)
    }

    async fn check_locked(&self, tx: &Transaction, input_hash: &str, started: Instant) -> CheckResponse {
        let (cached, cache_error) = self.cache.get(input_hash).await;
        if let Some(result) = cached {
            self.metrics.cache_hits.inc();
            let response = CheckResponse {
                transaction_id: tx.transaction_id.clone(),
                result,
                cached: true,
                processing_time_ms: elapsed_ms(started),
            };
            self.audit(tx, &response).await;
            self.finish(&response, started);
            return response;
        }
        self.metrics.cache_misses.inc();
        if cache_error.is_some() {
            self.metrics.record_dependency_failure("cache");
        }

        let response = self
            .evaluate(tx, input_hash, started, cache_error.is_some())
            .await;
        self.audit(tx, &response).await;
        self.notify(tx, &response);
        self.finish(&response, started);
        response
    }

    async fn evaluate(
        &self,
        tx: &Transaction,
        input_hash: &str,
        started: Instant,
        cache_failed: bool,
    ) -> CheckResponse {
        let now = Utc::now();
        let vertical = normalize_key(&tx.vertical);
        let calibration = self.calibration.snapshot(&vertical);
        let hashes = self.hasher.hash_all(tx);
        let tenant_token = self.hasher.tenant_token(&tx.tenant_id);

        let (velocity, consortium, (identity, identity_ok)) = tokio::join!(
            self.velocity.snapshot(tx, &hashes, now),
            self.consortium.snapshot(&tenant_token, &hashes, now),
            self.verify_identity(tx),
        );
        if !velocity.available {
            self.metrics.record_dependency_failure("velocity");
        }
        if !consortium.available {
            self.metrics.record_dependency_failure("consortium");
        }

        let ctx = RuleContext {
            tx,
            vertical: &vertical,
            now,
            identity: identity.as_ref(),
            velocity: &velocity,
            consortium: &consortium,
        };
        let deadline = started + self.config.pipeline.latency_budget();
        let evaluation = self.engine.evaluate(&ctx, &calibration, Some(deadline));

        // A partial rule result is not worth spending more budget on
        let (ml_probability, ml_ok) = if evaluation.degraded {
            (None, true)
        } else {
            self.score_ml(&ctx, &evaluation).await
        };

        let combined = self
            .combiner
            .combine(evaluation.rule_score, ml_probability, &calibration);
        let degraded = evaluation.degraded
            || cache_failed
            || !velocity.available
            || !consortium.available
            || !identity_ok
            || !ml_ok;

        let result = EvaluationResult {
            input_hash: input_hash.to_string(),
            vertical: calibration.key.clone(),
            final_score: combined.final_score,
            rule_score: evaluation.rule_score,
            decision: combined.decision,
            explanation: explain(&evaluation.triggered, combined.decision, combined.final_score),
            triggered_rules: evaluation.triggered,
            ml_component_used: combined.ml_used,
            ml_probability: ml_probability.filter(|_| combined.ml_used),
            aml_review: combined.aml_review,
            degraded,
            errored_rules: evaluation.errored,
            evaluated_at: now,
        };

        // Commit the cache entry before any mutation so a resubmission
        // racing from another process has the smallest possible window.
        if let Err(e) = self.cache.put(&tx.tenant_id, &tx.user_id, &result).await {
            self.metrics.record_dependency_failure("cache");
            warn!(input_hash = %input_hash, error = %e, "cache write failed");
        }

        let (velocity_ok, consortium_ok) = tokio::join!(
            self.velocity.record(tx, &hashes, now),
            self.consortium.observe_all(&tenant_token, &hashes, now),
        );
        if !velocity_ok {
            self.metrics.record_dependency_failure("velocity");
        }
        if !consortium_ok {
            self.metrics.record_dependency_failure("consortium");
        }

        CheckResponse {
            transaction_id: tx.transaction_id.clone(),
            result,
            cached: false,
            processing_time_ms: elapsed_ms(started),
        }
    }

    async fn verify_identity(&self, tx: &Transaction) -> (Option<IdentitySignals>, bool) {
        let Some(verifier) = &self.identity_verifier else {
            return (None, true);
        };
        let timeout = Duration::from_millis(self.config.pipeline.identity_timeout_ms);
        match tokio::time::timeout(timeout, verifier.verify(tx)).await {
            Ok(Ok(signals)) => (Some(signals), true),
            Ok(Err(e)) => {
                self.metrics.record_dependency_failure("identity");
                warn!(tenant = %tx.tenant_id, error = %e, "identity verification failed");
                (None, false)
            }
            Err(_) => {
                self.metrics.record_dependency_failure("identity");
                warn!(tenant = %tx.tenant_id, timeout_ms = timeout.as_millis() as u64, "identity verification timed out");
                (None, false)
            }
        }
    }

    async fn score_ml(&self, ctx: &RuleContext<'_>, evaluation: &RuleEvaluation) -> (Option<f64>, bool) {
        let Some(scorer) = &self.ml_scorer else {
            return (None, true);
        };
        let features = FeatureVector::from_evaluation(ctx, evaluation);
        let timeout = Duration::from_millis(self.config.pipeline.ml_timeout_ms);
        match tokio::time::timeout(timeout, scorer.predict(&features)).await {
            Ok(Ok(p)) => match usable_probability(p) {
                Some(p) => (Some(p), true),
                None => {
                    self.metrics.record_dependency_failure("ml");
                    warn!(model = scorer.model_version(), probability = p, "ml probability out of range, ignored");
                    (None, false)
                }
            },
            Ok(Err(e)) => {
                self.metrics.record_dependency_failure("ml");
                warn!(model = scorer.model_version(), error = %e, "ml scoring failed, rules only");
                (None, false)
            }
            Err(_) => {
                self.metrics.record_dependency_failure("ml");
                warn!(model = scorer.model_version(), timeout_ms = timeout.as_millis() as u64, "ml scoring timed out, rules only");
                (None, false)
            }
        }
    }

    async fn audit(&self, tx: &Transaction, response: &CheckResponse) {
        let record = AuditRecord {
            transaction: tx.clone(),
            result: response.result.clone(),
            cached: response.cached,
            recorded_at: Utc::now(),
            feedback: None,
        };
        if let Err(e) = self.audit.record(record).await {
            self.metrics.record_dependency_failure("audit");
            warn!(transaction_id = %tx.transaction_id, error = %e, "audit write failed");
        }
    }

    fn notify(&self, tx: &Transaction, response: &CheckResponse) {
        let Some(dispatcher) = &self.webhooks else {
            return;
        };
        if !should_notify(&response.result) {
            return;
        }
        let dispatcher = dispatcher.clone();
        let event = WebhookEvent::new(tx.tenant_id.clone(), response.clone());
        tokio::spawn(async move {
            let event_id = event.event_id;
            if let Err(e) = dispatcher.dispatch(event).await {
                warn!(event_id = %event_id, error = %e, "webhook dispatch failed");
            }
        });
    }

    fn finish(&self, response: &CheckResponse, started: Instant) {
        let result = &response.result;
        self.metrics.record_decision(result.decision.as_str());
        self.metrics.record_duration(started.elapsed().as_secs_f64());
        if result.degraded && !response.cached {
            self.metrics.degraded_total.inc();
        }
        info!(
            transaction_id = %response.transaction_id,
            input_hash = %result.input_hash,
            vertical = %result.vertical,
            score = result.final_score.value(),
            decision = result.decision.as_str(),
            triggered = result.triggered_rules.len(),
            cached = response.cached,
            degraded = result.degraded,
            elapsed_ms = response.processing_time_ms,
            "transaction checked"
        );
    }

    /// Score a batch. Items are independent: one failing item never blocks
    /// the others. Empty or oversized batches are rejected outright.
    pub async fn check_batch(&self, transactions: Vec<Transaction>) -> Result<BatchResponse> {
        let started = Instant::now();
        let max = self.config.pipeline.max_batch_size;
        if transactions.is_empty() || transactions.len() > max {
            let mut errors = ValidationErrors::default();
            errors.push(
                "transactions",
                format!("batch must hold between 1 and {} items, got {}", max, transactions.len()),
            );
            return Err(Error::Validation(errors));
        }

        let outcomes = join_all(transactions.into_iter().enumerate().map(|(index, tx)| async move {
            let transaction_id = tx.transaction_id.clone();
            (index, transaction_id, self.check_transaction(tx).await)
        }))
        .await;

        let mut summary = BatchSummary {
            total: outcomes.len(),
            ..BatchSummary::default()
        };
        let mut results = Vec::with_capacity(outcomes.len());
        for (index, transaction_id, outcome) in outcomes {
            match outcome {
                Ok(response) => {
                    summary.succeeded += 1;
                    match response.result.decision {
                        Decision::Approve => summary.approved += 1,
                        Decision::Review => summary.review += 1,
                        Decision::Decline => summary.declined += 1,
                    }
                    if response.cached {
                        summary.cached += 1;
                    }
                    results.push(BatchItemResult {
                        index,
                        transaction_id,
                        response: Some(response),
                        error: None,
                    });
                }
                Err(e) => {
                    summary.failed += 1;
                    debug!(index, transaction_id = %transaction_id, error = %e, "batch item rejected");
                    results.push(BatchItemResult {
                        index,
                        transaction_id,
                        response: None,
                        error: Some(BatchItemError::from(&e)),
                    });
                }
            }
        }
        summary.processing_time_ms = elapsed_ms(started);

        info!(
            total = summary.total,
            failed = summary.failed,
            declined = summary.declined,
            elapsed_ms = summary.processing_time_ms,
            "batch checked"
        );
        Ok(BatchResponse { results, summary })
    }

    /// Queue feedback for the background worker
    pub async fn submit_feedback(&self, feedback: FeedbackRecord) -> Result<()> {
        self.feedback.submit(feedback).await
    }

    /// Apply feedback on the caller's task
    pub async fn apply_feedback_now(&self, feedback: &FeedbackRecord) -> Result<FeedbackOutcome> {
        self.processor.apply(feedback).await
    }

    /// Apply the consortium retention policy
    pub async fn prune_consortium(&self) -> Result<usize> {
        self.consortium
            .prune(self.config.consortium.retention_days, Utc::now())
            .await
    }

    /// Fold current rule trust weights into a vertical's calibration
    pub fn apply_trust_weights(&self, vertical: &str) -> Result<Arc<VerticalConfig>> {
        self.calibration
            .apply_trust_weights(vertical, &self.accuracy.trust_weights())
    }

    /// Stop accepting feedback and wait for the queue to drain
    pub async fn shutdown(self) {
        let RiskPipeline {
            feedback,
            feedback_worker,
            ..
        } = self;
        drop(feedback);
        if let Err(e) = feedback_worker.await {
            warn!(error = %e, "feedback worker ended abnormally");
        }
        info!("risk pipeline stopped");
    }

    /// Configuration in use
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Rule registry in use
    pub fn registry(&self) -> &Arc<RuleRegistry> {
        self.engine.registry()
    }

    /// Vertical calibration store
    pub fn calibration(&self) -> &Arc<CalibrationStore> {
        &self.calibration
    }

    /// Velocity counters
    pub fn velocity(&self) -> &VelocityCounters {
        &self.velocity
    }

    /// Consortium component
    pub fn consortium(&self) -> &ConsortiumIntelligence {
        &self.consortium
    }

    /// Identifier hasher
    pub fn hasher(&self) -> &IdentifierHasher {
        &self.hasher
    }

    /// Idempotency cache
    pub fn cache(&self) -> &IdempotencyCache {
        &self.cache
    }

    /// Audit store
    pub fn audit_store(&self) -> &Arc<dyn TransactionStore> {
        &self.audit
    }

    /// Rule accuracy statistics
    pub fn accuracy(&self) -> &Arc<RuleAccuracyTracker> {
        &self.accuracy
    }

    /// Metrics collector
    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }
}

fn elapsed_ms(started: Instant) -> u64 {
    started.elapsed().as_millis() as u64
}

/// Decision and the strongest reasons behind it
fn explain(triggered: &[TriggeredRule], decision: Decision, score: RiskScore) -> String {
    if triggered.is_empty() {
        return format!("{} at score {}: no risk rules triggered", decision.as_str(), score);
    }
    let mut reasons: Vec<String> = triggered
        .iter()
        .take(EXPLANATION_REASONS)
        .map(|rule| format!("{} {} (+{:.2})", rule.rule_id, rule.message, rule.score))
        .collect();
    if triggered.len() > EXPLANATION_REASONS {
        reasons.push(format!("{} more", triggered.len() - EXPLANATION_REASONS));
    }
    format!("{} at score {}: {}", decision.as_str(), score, reasons.join("; "))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Severity;
    use std::collections::BTreeMap;

    fn hit(id: &str, score: f64) -> TriggeredRule {
        TriggeredRule {
            rule_id: id.to_string(),
            category: "amount".to_string(),
            severity: Severity::Low,
            score,
            base_score: score,
            weight: 1.0,
            confidence: 1.0,
            message: "large amount".to_string(),
            metadata: BTreeMap::new(),
        }
    }

    #[test]
    fn test_explanation() {
        let text = explain(&[], Decision::Approve, RiskScore::ZERO);
        assert!(text.starts_with("approve"));
        assert!(text.contains("no risk rules"));

        let hits: Vec<TriggeredRule> = (0..7).map(|i| hit(&format!("AMT-00{}", i), 5.0)).collect();
        let text = explain(&hits, Decision::Review, RiskScore::new(45.0));
        assert!(text.contains("AMT-000 large amount (+5.00)"));
        assert!(text.contains("2 more"));
        assert!(!text.contains("AMT-006"));
    }

    #[test]
    fn test_batch_item_error_keeps_fields() {
        let mut errors = ValidationErrors::default();
        errors.push("amount", "must be positive");
        let item = BatchItemError::from(&Error::Validation(errors));
        assert_eq!(item.code, "VALIDATION_ERROR");
        assert_eq!(item.fields.len(), 1);
        assert_eq!(item.fields[0].field, "amount");
    }

    #[tokio::test]
    async fn test_inflight_slots_are_released() {
        let pipeline = RiskPipeline::from_config(Config::default()).unwrap();
        let tx = Transaction::new("tx-1", "t1", "u1", rust_decimal::Decimal::from(100), "USD", "ecommerce");
        pipeline.check_transaction(tx).await.unwrap();
        assert!(pipeline.inflight.is_empty());
    }

    #[tokio::test]
    async fn test_cancelled_waiter_releases_slot() {
        let pipeline = RiskPipeline::from_config(Config::default()).unwrap();
        let tx = Transaction::new("tx-1", "t1", "u1", rust_decimal::Decimal::from(100), "USD", "ecommerce");
        let holder = InflightSlot::acquire(&pipeline.inflight, &input_hash(&tx));
        let guard = holder.slot.lock().await;

        let waited = tokio::time::timeout(Duration::from_millis(20), pipeline.check_transaction(tx)).await;
        assert!(waited.is_err());
        assert_eq!(pipeline.inflight.len(), 1);

        drop(guard);
        drop(holder);
        assert!(pipeline.inflight.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_janitor_sweeps_expired_state() {
        let counters = Arc::new(InMemoryCounterStore::new());
        let entries = Arc::new(InMemoryCacheStore::new());
        let mut config = Config::default();
        config.pipeline.purge_interval_seconds = 3_600;
        let pipeline = RiskPipeline::builder(config)
            .counter_store(counters.clone())
            .cache_store(entries.clone())
            .build()
            .unwrap();

        let mut tx = Transaction::new("tx-1", "t1", "u1", rust_decimal::Decimal::from(100), "USD", "ecommerce");
        tx.device_fingerprint = Some("fp-1".to_string());
        pipeline.check_transaction(tx).await.unwrap();
        assert!(!counters.is_empty());
        assert_eq!(entries.len(), 1);

        // Past the longest velocity window, off the sweep boundary
        tokio::time::sleep(Duration::from_secs(8 * 24 * 3_600 + 1_800)).await;
        assert!(counters.is_empty());
        assert!(entries.is_empty());
        assert_eq!(entries.indexed_users(), 0);
    }
}
