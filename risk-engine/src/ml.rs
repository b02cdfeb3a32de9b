//! ML scoring collaborator
//!
//! The model is external. It gets a typed feature vector and answers with a
//! fraud probability; anything outside [0, 1] counts as no answer.

use crate::engine::RuleEvaluation;
use crate::rules::RuleContext;
use crate::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Model input
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureVector {
    /// Vertical key
    pub vertical: String,
    /// Amount in major units
    pub amount: f64,
    /// Account age in days
    pub account_age_days: Option<i64>,
    /// User transactions in the last hour
    pub user_tx_hour: u64,
    /// User transactions in the last day
    pub user_tx_day: u64,
    /// User transactions in the last week
    pub user_tx_week: u64,
    /// Device transactions in the last day
    pub device_tx_day: Option<u64>,
    /// Distinct users on the device today, current one included
    pub device_distinct_users: Option<u64>,
    /// Largest distinct-tenant count across the identifiers
    pub consortium_max_tenants: u64,
    /// Any identifier carries confirmed fraud
    pub consortium_fraud: bool,
    /// Device fingerprint present
    pub has_device: bool,
    /// Weighted rule score
    pub rule_score: f64,
    /// Rules that fired
    pub triggered_count: usize,
}

impl FeatureVector {
    /// Build from an evaluated context
    pub fn from_evaluation(ctx: &RuleContext<'_>, evaluation: &RuleEvaluation) -> Self {
        Self {
            vertical: ctx.vertical.to_string(),
            amount: ctx.amount(),
            account_age_days: ctx.account_age_days(),
            user_tx_hour: ctx.velocity.user.hour.count,
            user_tx_day: ctx.velocity.user.day.count,
            user_tx_week: ctx.velocity.user.week.count,
            device_tx_day: ctx.velocity.device.map(|d| d.day.count),
            device_distinct_users: ctx.velocity.device_users_day.map(|p| p.projected()),
            consortium_max_tenants: ctx.consortium.max_distinct_tenants(),
            consortium_fraud: ctx.consortium.views.values().any(|v| v.has_confirmed_fraud()),
            has_device: ctx.tx.device_fingerprint.is_some(),
            rule_score: evaluation.rule_score.value(),
            triggered_count: evaluation.triggered.len(),
        }
    }
}

/// External fraud model
#[async_trait]
pub trait MlScorer: Send + Sync {
    /// Model version, for logs
    fn model_version(&self) -> &str;

    /// Fraud probability in [0, 1]
    async fn predict(&self, features: &FeatureVector) -> Result<f64>;
}

/// Probability usable by the combiner
pub fn usable_probability(p: f64) -> Option<f64> {
    if p.is_finite() && (0.0..=1.0).contains(&p) {
        Some(p)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::context::fixtures::ContextFixture;
    use crate::types::RiskScore;
    use crate::velocity::{CounterValue, DistinctPeek};

    #[test]
    fn test_usable_probability() {
        assert_eq!(usable_probability(0.0), Some(0.0));
        assert_eq!(usable_probability(1.0), Some(1.0));
        assert_eq!(usable_probability(1.01), None);
        assert_eq!(usable_probability(f64::NAN), None);
    }

    #[test]
    fn test_features_from_context() {
        let mut f = ContextFixture::new(1_500, "lending");
        f.velocity.user.day = CounterValue { count: 4, amount: Default::default() };
        f.velocity.device_users_day = Some(DistinctPeek { count: 2, contains_member: false });

        let evaluation = RuleEvaluation {
            rule_score: RiskScore::new(25.0),
            triggered: Vec::new(),
            errored: Vec::new(),
            evaluated: 10,
            inapplicable: 0,
            excluded: 0,
            degraded: false,
        };
        let features = FeatureVector::from_evaluation(&f.ctx(), &evaluation);
        assert_eq!(features.amount, 1_500.0);
        assert_eq!(features.user_tx_day, 4);
        assert_eq!(features.device_distinct_users, Some(3));
        assert_eq!(features.rule_score, 25.0);
        assert!(!features.has_device);
    }
}
