//! Hybrid rule + ML score combiner

use crate::calibration::VerticalConfig;
use crate::types::{Decision, RiskScore};
use serde::{Deserialize, Serialize};

/// Blended score and its decision
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CombinedScore {
    /// Final score
    pub final_score: RiskScore,
    /// Decision bucket
    pub decision: Decision,
    /// An ML probability took part
    pub ml_used: bool,
    /// Rule share actually applied
    pub rules_weight: f64,
    /// ML share actually applied
    pub ml_weight: f64,
    /// Final score reached the AML boundary
    pub aml_review: bool,
}

/// Blends the rule score with an optional model probability
#[derive(Debug, Clone, Copy)]
pub struct HybridCombiner {
    default_ml_weight: f64,
}

impl HybridCombiner {
    /// Create new combiner; `default_ml_weight` applies when a vertical has none
    pub fn new(default_ml_weight: f64) -> Self {
        Self {
            default_ml_weight: default_ml_weight.clamp(0.0, 1.0),
        }
    }

    /// `clamp(w_rules * rule + w_ml * p * 100)`. Without a usable
    /// probability all weight goes to the rules and the final score is the
    /// rule score unchanged.
    pub fn combine(
        &self,
        rule_score: RiskScore,
        ml_probability: Option<f64>,
        config: &VerticalConfig,
    ) -> CombinedScore {
        let probability = ml_probability.filter(|p| p.is_finite() && (0.0..=1.0).contains(p));

        let (final_score, ml_weight) = match probability {
            Some(p) => {
                let w_ml = config.ml_weight.unwrap_or(self.default_ml_weight).clamp(0.0, 1.0);
                let w_rules = 1.0 - w_ml;
                (RiskScore::new(w_rules * rule_score.value() + w_ml * p * 100.0), w_ml)
            }
            None => (rule_score, 0.0),
        };

        CombinedScore {
            final_score,
            decision: config.decision_for(final_score.value()),
            ml_used: probability.is_some() && ml_weight > 0.0,
            rules_weight: 1.0 - ml_weight,
            ml_weight,
            aml_review: final_score.value() >= config.aml_threshold,
        }
    }
}
