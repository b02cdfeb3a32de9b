//! Rule evaluation engine
//!
//! Runs every applicable rule against one context, isolating failures, and
//! reduces the hits to a weighted rule score. The reduction sorts by rule id
//! before summing, so execution order never changes the result.

use crate::calibration::VerticalConfig;
use crate::metrics::Metrics;
use crate::rules::{RuleContext, RuleDefinition, RuleOutcome, RuleRegistry};
use crate::types::{RiskScore, TriggeredRule};
use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, warn};

/// Result of running the rule set once
#[derive(Debug, Clone, PartialEq)]
pub struct RuleEvaluation {
    /// Weighted rule score
    pub rule_score: RiskScore,
    /// Rules that fired with a non-zero weight, highest contribution first
    pub triggered: Vec<TriggeredRule>,
    /// Rules that errored or panicked
    pub errored: Vec<String>,
    /// Rules that ran
    pub evaluated: usize,
    /// Rules that reported missing input
    pub inapplicable: usize,
    /// Rules skipped because their weight is 0
    pub excluded: usize,
    /// Deadline passed before every rule ran
    pub degraded: bool,
}

/// Rule evaluation engine
#[derive(Clone)]
pub struct RuleEngine {
    registry: Arc<RuleRegistry>,
    metrics: Option<Metrics>,
}

impl RuleEngine {
    /// Create new engine
    pub fn new(registry: Arc<RuleRegistry>) -> Self {
        Self {
            registry,
            metrics: None,
        }
    }

    /// Count rule errors into `metrics`
    pub fn with_metrics(mut self, metrics: Metrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Registry in use
    pub fn registry(&self) -> &Arc<RuleRegistry> {
        &self.registry
    }

    /// Evaluate the applicable rules for `ctx.vertical`.
    ///
    /// The deadline is checked between rules; once it has passed, the result
    /// is built from the rules completed so far and marked degraded.
    pub fn evaluate(
        &self,
        ctx: &RuleContext<'_>,
        config: &VerticalConfig,
        deadline: Option<Instant>,
    ) -> RuleEvaluation {
        let mut evaluation = RuleEvaluation {
            rule_score: RiskScore::ZERO,
            triggered: Vec::new(),
            errored: Vec::new(),
            evaluated: 0,
            inapplicable: 0,
            excluded: 0,
            degraded: false,
        };

        for rule in self.registry.applicable(ctx.vertical) {
            if deadline.map(|d| Instant::now() >= d).unwrap_or(false) {
                evaluation.degraded = true;
                warn!(
                    vertical = ctx.vertical,
                    completed = evaluation.evaluated,
                    "latency SLA breach, returning partial rule result"
                );
                break;
            }

            let weight = config.weight(rule.id);
            if weight == 0.0 {
                evaluation.excluded += 1;
                continue;
            }

            evaluation.evaluated += 1;
            match run_rule(rule, ctx) {
                Ok(RuleOutcome::Triggered(hit)) => {
                    // Overrides may only raise the score
                    let base_score = hit
                        .score
                        .map(|s| sanitize(s).max(rule.base_score))
                        .unwrap_or(rule.base_score);
                    let confidence = sanitize(hit.confidence).clamp(0.0, 1.0);
                    let severity = hit.severity.map_or(rule.severity, |s| s.max(rule.severity));
                    evaluation.triggered.push(TriggeredRule {
                        rule_id: rule.id.to_string(),
                        category: rule.category.as_str().to_string(),
                        severity,
                        score: base_score * weight * confidence,
                        base_score,
                        weight,
                        confidence,
                        message: hit.message,
                        metadata: hit.metadata,
                    });
                }
                Ok(RuleOutcome::NotTriggered) => {}
                Ok(RuleOutcome::Inapplicable(reason)) => {
                    evaluation.inapplicable += 1;
                    debug!(rule_id = rule.id, reason, "rule inapplicable");
                }
                Err(message) => {
                    warn!(rule_id = rule.id, error = %message, "rule execution failed, scored as not triggered");
                    if let Some(metrics) = &self.metrics {
                        metrics.rule_errors.inc();
                    }
                    evaluation.errored.push(rule.id.to_string());
                }
            }
        }

        evaluation.rule_score = aggregate(&mut evaluation.triggered);
        evaluation
    }
}

/// Sum contributions in rule-id order, then order hits by contribution for display
pub fn aggregate(triggered: &mut [TriggeredRule]) -> RiskScore {
    triggered.sort_by(|a, b| a.rule_id.cmp(&b.rule_id));
    let total = triggered.iter().fold(0.0, |acc, r| acc + r.score);
    triggered.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.rule_id.cmp(&b.rule_id))
    });
    RiskScore::new(total)
}

fn sanitize(value: f64) -> f64 {
    if value.is_finite() {
        value
    } else {
        0.0
    }
}

fn run_rule(rule: &RuleDefinition, ctx: &RuleContext<'_>) -> Result<RuleOutcome, String> {
    match catch_unwind(AssertUnwindSafe(|| (rule.predicate)(ctx))) {
        Ok(Ok(outcome)) => Ok(outcome),
        Ok(Err(e)) => Err(format!("{:#}", e)),
        Err(panic) => Err(format!("panicked: {}", panic_message(panic.as_ref()))),
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::context::fixtures::ContextFixture;
    use crate::rules::{Applicability, RuleCategory, RuleHit};
    use crate::types::Severity;
    use std::time::Duration;

    fn fires(_: &RuleContext<'_>) -> anyhow::Result<RuleOutcome> {
        Ok(RuleOutcome::Triggered(RuleHit::new("fired")))
    }

    fn half_confident(_: &RuleContext<'_>) -> anyhow::Result<RuleOutcome> {
        Ok(RuleOutcome::Triggered(
            RuleHit::new("maybe").with_confidence(0.5).with_severity(Severity::Low),
        ))
    }

    fn errors(_: &RuleContext<'_>) -> anyhow::Result<RuleOutcome> {
        anyhow::bail!("lookup table missing")
    }

    fn panics(_: &RuleContext<'_>) -> anyhow::Result<RuleOutcome> {
        panic!("index out of range")
    }

    fn rule(id: &'static str, base_score: f64, predicate: crate::rules::RulePredicate) -> RuleDefinition {
        RuleDefinition {
            id,
            description: "test",
            base_score,
            severity: Severity::Medium,
            category: RuleCategory::Amount,
            applicability: Applicability::All,
            predicate,
        }
    }

    fn engine(rules: Vec<RuleDefinition>) -> RuleEngine {
        RuleEngine::new(Arc::new(RuleRegistry::new(rules).unwrap()))
    }

    #[test]
    fn test_weighted_sum() {
        let engine = engine(vec![rule("TST-001", 30.0, fires), rule("TST-002", 20.0, half_confident)]);
        let f = ContextFixture::new(100, "lending");
        let config = VerticalConfig::named("lending").with_weight("TST-001", 1.3);

        let evaluation = engine.evaluate(&f.ctx(), &config, None);
        assert_eq!(evaluation.rule_score.value(), 49.0);
        assert_eq!(evaluation.triggered[0].rule_id, "TST-001");
        assert_eq!(evaluation.triggered[0].score, 39.0);
        // Hits cannot lower the rule's severity
        assert_eq!(evaluation.triggered[1].severity, Severity::Medium);
        assert!(!evaluation.degraded);
    }

    #[test]
    fn test_no_hits_scores_positive_zero() {
        let score = aggregate(&mut []);
        assert!(score.value().is_sign_positive());
        assert_eq!(score.to_string(), "0.00");
    }

    #[test]
    fn test_errors_and_panics_are_isolated() {
        let engine = engine(vec![
            rule("TST-001", 30.0, errors),
            rule("TST-002", 30.0, panics),
            rule("TST-003", 25.0, fires),
        ]);
        let f = ContextFixture::new(100, "lending");
        let evaluation = engine.evaluate(&f.ctx(), &VerticalConfig::default(), None);

        assert_eq!(evaluation.rule_score.value(), 25.0);
        assert_eq!(evaluation.errored, vec!["TST-001".to_string(), "TST-002".to_string()]);
        assert_eq!(evaluation.evaluated, 3);
    }

    #[test]
    fn test_zero_weight_excludes_rule() {
        let engine = engine(vec![rule("TST-001", 30.0, fires), rule("TST-002", 10.0, fires)]);
        let f = ContextFixture::new(100, "lending");
        let config = VerticalConfig::named("lending").with_weight("TST-001", 0.0);

        let evaluation = engine.evaluate(&f.ctx(), &config, None);
        assert_eq!(evaluation.rule_score.value(), 10.0);
        assert_eq!(evaluation.excluded, 1);
        assert!(evaluation.triggered.iter().all(|r| r.rule_id != "TST-001"));
    }

    #[test]
    fn test_score_is_clamped() {
        let engine = engine(vec![
            rule("TST-001", 60.0, fires),
            rule("TST-002", 60.0, fires),
        ]);
        let f = ContextFixture::new(100, "lending");
        let evaluation = engine.evaluate(&f.ctx(), &VerticalConfig::default(), None);
        assert_eq!(evaluation.rule_score, RiskScore::MAX);
    }

    #[test]
    fn test_expired_deadline_degrades() {
        let engine = engine(vec![rule("TST-001", 30.0, fires)]);
        let f = ContextFixture::new(100, "lending");
        let past = Instant::now() - Duration::from_millis(1);

        let evaluation = engine.evaluate(&f.ctx(), &VerticalConfig::default(), Some(past));
        assert!(evaluation.degraded);
        assert_eq!(evaluation.evaluated, 0);
        assert_eq!(evaluation.rule_score, RiskScore::ZERO);
    }

    #[test]
    fn test_error_counter() {
        let metrics = Metrics::new().unwrap();
        let engine = engine(vec![rule("TST-001", 30.0, errors)]).with_metrics(metrics.clone());
        let f = ContextFixture::new(100, "lending");
        engine.evaluate(&f.ctx(), &VerticalConfig::default(), None);
        assert_eq!(metrics.rule_errors.get(), 1);
    }
}
