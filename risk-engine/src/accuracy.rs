//! Per-rule accuracy from confirmed outcomes

use crate::types::Outcome;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

const TRUST_FLOOR: f64 = 0.5;
const TRUST_CEILING: f64 = 1.5;

/// Accuracy of one rule
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RuleAccuracyStat {
    /// Rule id
    pub rule_id: String,
    /// Labelled transactions the rule fired on
    pub triggered: u64,
    /// Fired on confirmed fraud
    pub true_positives: u64,
    /// Fired on confirmed legitimate
    pub false_positives: u64,
    /// `true_positives / triggered`
    pub accuracy: f64,
    /// Weight multiplier derived from accuracy
    pub trust_weight: f64,
}

impl RuleAccuracyStat {
    fn new(rule_id: &str) -> Self {
        Self {
            rule_id: rule_id.to_string(),
            trust_weight: 1.0,
            ..Self::default()
        }
    }

    fn record(&mut self, outcome: Outcome, min_samples: u64) {
        self.triggered += 1;
        match outcome {
            Outcome::Fraud => self.true_positives += 1,
            Outcome::Legitimate => self.false_positives += 1,
        }
        self.accuracy = self.true_positives as f64 / self.triggered as f64;
        self.trust_weight = if self.triggered < min_samples {
            1.0
        } else {
            (TRUST_FLOOR + self.accuracy).clamp(TRUST_FLOOR, TRUST_CEILING)
        };
    }
}

/// Accuracy statistics keyed by rule id
#[derive(Debug, Default)]
pub struct RuleAccuracyTracker {
    stats: DashMap<String, RuleAccuracyStat>,
    min_samples: u64,
}

impl RuleAccuracyTracker {
    /// Create new tracker
    pub fn new(min_samples: u64) -> Self {
        Self {
            stats: DashMap::new(),
            min_samples,
        }
    }

    /// Record that `rule_id` fired on a transaction with this outcome
    pub fn record(&self, rule_id: &str, outcome: Outcome) {
        self.stats
            .entry(rule_id.to_string())
            .or_insert_with(|| RuleAccuracyStat::new(rule_id))
            .record(outcome, self.min_samples);
    }

    /// Stat for one rule
    pub fn get(&self, rule_id: &str) -> Option<RuleAccuracyStat> {
        self.stats.get(rule_id).map(|s| s.clone())
    }

    /// Every stat, sorted by rule id
    pub fn snapshot(&self) -> Vec<RuleAccuracyStat> {
        let mut stats: Vec<RuleAccuracyStat> = self.stats.iter().map(|s| s.clone()).collect();
        stats.sort_by(|a, b| a.rule_id.cmp(&b.rule_id));
        stats
    }

    /// Trust weights of rules past the sample minimum
    pub fn trust_weights(&self) -> HashMap<String, f64> {
        self.stats
            .iter()
            .filter(|s| s.triggered >= self.min_samples)
            .map(|s| (s.rule_id.clone(), s.trust_weight))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trust_weight_needs_samples() {
        let tracker = RuleAccuracyTracker::new(4);
        for _ in 0..3 {
            tracker.record("AMT-001", Outcome::Legitimate);
        }
        let stat = tracker.get("AMT-001").unwrap();
        assert_eq!(stat.accuracy, 0.0);
        assert_eq!(stat.trust_weight, 1.0);
        assert!(tracker.trust_weights().is_empty());

        tracker.record("AMT-001", Outcome::Fraud);
        let stat = tracker.get("AMT-001").unwrap();
        assert_eq!(stat.accuracy, 0.25);
        assert_eq!(stat.trust_weight, 0.75);
        assert_eq!(tracker.trust_weights()["AMT-001"], 0.75);
    }

    #[test]
    fn test_trust_weight_bounds() {
        let tracker = RuleAccuracyTracker::new(1);
        tracker.record("CON-001", Outcome::Fraud);
        tracker.record("NET-003", Outcome::Legitimate);
        assert_eq!(tracker.get("CON-001").unwrap().trust_weight, 1.5);
        assert_eq!(tracker.get("NET-003").unwrap().trust_weight, 0.5);

        let ids: Vec<String> = tracker.snapshot().into_iter().map(|s| s.rule_id).collect();
        assert_eq!(ids, vec!["CON-001", "NET-003"]);
    }
}
