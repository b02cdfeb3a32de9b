//! Metrics collection for observability
//!
//! Prometheus metrics for the scoring pipeline, kept in a private registry so
//! several pipelines (and tests) can coexist in one process.
//!
//! # Metrics
//!
//! - `risk_evaluations_total` - Evaluations requested (cache hits included)
//! - `risk_cache_hits_total` / `risk_cache_misses_total` - Idempotency cache outcomes
//! - `risk_rule_errors_total` - Rules that errored or panicked
//! - `risk_degraded_total` - Best-effort results (budget or dependency)
//! - `risk_dependency_failures_total{dependency}` - Store / service failures
//! - `risk_decisions_total{decision}` - Decisions issued
//! - `risk_evaluation_duration_seconds` - Evaluation latency
//! - `risk_feedback_processed_total` - Feedback records applied

use prometheus::{Histogram, HistogramOpts, IntCounter, IntCounterVec, Opts, Registry};
use std::sync::Arc;

/// Metrics collector
#[derive(Clone)]
pub struct Metrics {
    /// Evaluations requested
    pub evaluations_total: IntCounter,

    /// Cache hits
    pub cache_hits: IntCounter,

    /// Cache misses
    pub cache_misses: IntCounter,

    /// Rule execution errors
    pub rule_errors: IntCounter,

    /// Degraded results
    pub degraded_total: IntCounter,

    /// Dependency failures by dependency
    pub dependency_failures: IntCounterVec,

    /// Decisions by bucket
    pub decisions: IntCounterVec,

    /// Evaluation latency
    pub evaluation_duration: Histogram,

    /// Feedback applied
    pub feedback_processed: IntCounter,

    /// Prometheus registry
    pub registry: Arc<Registry>,
}

impl Metrics {
    /// Create new metrics collector
    pub fn new() -> prometheus::Result<Self> {
        let registry = Arc::new(Registry::new());

        let evaluations_total = IntCounter::new(
            "risk_evaluations_total",
            "Evaluations requested, cache hits included",
        )?;
        registry.register(Box::new(evaluations_total.clone()))?;

        let cache_hits = IntCounter::new("risk_cache_hits_total", "Idempotency cache hits")?;
        registry.register(Box::new(cache_hits.clone()))?;

        let cache_misses = IntCounter::new("risk_cache_misses_total", "Idempotency cache misses")?;
        registry.register(Box::new(cache_misses.clone()))?;

        let rule_errors = IntCounter::new("risk_rule_errors_total", "Rules that errored or panicked")?;
        registry.register(Box::new(rule_errors.clone()))?;

        let degraded_total = IntCounter::new("risk_degraded_total", "Best-effort results returned")?;
        registry.register(Box::new(degraded_total.clone()))?;

        let dependency_failures = IntCounterVec::new(
            Opts::new("risk_dependency_failures_total", "External store or service failures"),
            &["dependency"],
        )?;
        registry.register(Box::new(dependency_failures.clone()))?;

        let decisions = IntCounterVec::new(
            Opts::new("risk_decisions_total", "Decisions issued"),
            &["decision"],
        )?;
        registry.register(Box::new(decisions.clone()))?;

        let evaluation_duration = Histogram::with_opts(
            HistogramOpts::new("risk_evaluation_duration_seconds", "Evaluation latency").buckets(
                vec![0.001, 0.005, 0.010, 0.025, 0.050, 0.100, 0.200, 0.500, 1.0],
            ),
        )?;
        registry.register(Box::new(evaluation_duration.clone()))?;

        let feedback_processed =
            IntCounter::new("risk_feedback_processed_total", "Feedback records applied")?;
        registry.register(Box::new(feedback_processed.clone()))?;

        Ok(Self {
            evaluations_total,
            cache_hits,
            cache_misses,
            rule_errors,
            degraded_total,
            dependency_failures,
            decisions,
            evaluation_duration,
            feedback_processed,
            registry,
        })
    }

    /// Record a dependency failure
    pub fn record_dependency_failure(&self, dependency: &str) {
        self.dependency_failures.with_label_values(&[dependency]).inc();
    }

    /// Record an issued decision
    pub fn record_decision(&self, decision: &str) {
        self.decisions.with_label_values(&[decision]).inc();
    }

    /// Record evaluation latency
    pub fn record_duration(&self, duration_seconds: f64) {
        self.evaluation_duration.observe(duration_seconds);
    }

    /// Get metrics registry
    pub fn registry(&self) -> &Registry {
        &self.registry
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new().expect("metric names are static and unique")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_are_isolated_per_instance() {
        let a = Metrics::new().unwrap();
        let b = Metrics::new().unwrap();

        a.cache_hits.inc();
        a.record_dependency_failure("velocity");
        a.record_decision("decline");

        assert_eq!(a.cache_hits.get(), 1);
        assert_eq!(b.cache_hits.get(), 0);
        assert_eq!(a.dependency_failures.with_label_values(&["velocity"]).get(), 1);
        assert!(!a.registry().gather().is_empty());
    }
}
