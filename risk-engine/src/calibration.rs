//! Per-vertical calibration
//!
//! Each vertical carries decision thresholds, per-rule weights and an
//! optional ML blend weight. Readers take an `Arc` snapshot; writers build a
//! new map and swap the pointer, so an evaluation never observes a config
//! changing under it.

use crate::rules::RuleRegistry;
use crate::types::Decision;
use crate::{Error, Result};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{error, info};

/// Key of the fallback configuration
pub const DEFAULT_VERTICAL: &str = "default";

/// Calibration of one vertical
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerticalConfig {
    /// Vertical key
    #[serde(default)]
    pub key: String,

    /// Scores at or above this are reviewed
    pub review_threshold: f64,

    /// Scores at or above this are declined
    pub decline_threshold: f64,

    /// Scores at or above this are flagged for AML review
    #[serde(default = "default_aml_threshold")]
    pub aml_threshold: f64,

    /// Weight per rule id; missing rules weigh 1.0
    #[serde(default)]
    pub rule_weights: HashMap<String, f64>,

    /// Multipliers learned from feedback, applied on top of `rule_weights`
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub trust_weights: HashMap<String, f64>,

    /// ML share of the final score; pipeline default when absent
    #[serde(default)]
    pub ml_weight: Option<f64>,
}

fn default_aml_threshold() -> f64 {
    80.0
}

impl Default for VerticalConfig {
    fn default() -> Self {
        Self {
            key: DEFAULT_VERTICAL.to_string(),
            review_threshold: 40.0,
            decline_threshold: 70.0,
            aml_threshold: default_aml_threshold(),
            rule_weights: HashMap::new(),
            trust_weights: HashMap::new(),
            ml_weight: None,
        }
    }
}

impl VerticalConfig {
    /// Config with default thresholds under a new key
    pub fn named(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            ..Self::default()
        }
    }

    /// Set thresholds
    pub fn with_thresholds(mut self, review: f64, decline: f64) -> Self {
        self.review_threshold = review;
        self.decline_threshold = decline;
        self
    }

    /// Set one rule weight
    pub fn with_weight(mut self, rule_id: impl Into<String>, weight: f64) -> Self {
        self.rule_weights.insert(rule_id.into(), weight);
        self
    }

    /// Set the ML blend weight
    pub fn with_ml_weight(mut self, weight: f64) -> Self {
        self.ml_weight = Some(weight);
        self
    }

    /// Effective weight of a rule: configured weight times trust
    pub fn weight(&self, rule_id: &str) -> f64 {
        self.base_weight(rule_id) * self.trust_weights.get(rule_id).copied().unwrap_or(1.0)
    }

    /// Configured weight, ignoring trust
    pub fn base_weight(&self, rule_id: &str) -> f64 {
        self.rule_weights.get(rule_id).copied().unwrap_or(1.0)
    }

    /// Decision bucket; a score on a boundary takes the riskier bucket
    pub fn decision_for(&self, score: f64) -> Decision {
        if score >= self.decline_threshold {
            Decision::Decline
        } else if score >= self.review_threshold {
            Decision::Review
        } else {
            Decision::Approve
        }
    }

    /// Reject configs the combiner cannot use
    pub fn validate(&self) -> Result<()> {
        let in_range = |v: f64| v.is_finite() && (0.0..=100.0).contains(&v);
        if !in_range(self.review_threshold) || !in_range(self.decline_threshold) || !in_range(self.aml_threshold) {
            return Err(Error::Config(format!(
                "vertical {}: thresholds must be within [0, 100]",
                self.key
            )));
        }
        if self.review_threshold > self.decline_threshold {
            return Err(Error::Config(format!(
                "vertical {}: review threshold {} above decline threshold {}",
                self.key, self.review_threshold, self.decline_threshold
            )));
        }
        for (rule_id, weight) in self.rule_weights.iter().chain(&self.trust_weights) {
            if !weight.is_finite() || *weight < 0.0 {
                return Err(Error::Config(format!(
                    "vertical {}: weight for {} must be a non-negative number",
                    self.key, rule_id
                )));
            }
        }
        if let Some(w) = self.ml_weight {
            if !(0.0..=1.0).contains(&w) {
                return Err(Error::Config(format!(
                    "vertical {}: ml_weight must be within [0, 1]",
                    self.key
                )));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Default, Deserialize)]
struct CalibrationFile {
    #[serde(default)]
    default: Option<VerticalConfig>,
    #[serde(default)]
    verticals: HashMap<String, VerticalConfig>,
}

type Snapshot = Arc<HashMap<String, Arc<VerticalConfig>>>;

/// Calibration store with atomically swapped snapshots
pub struct CalibrationStore {
    verticals: RwLock<Snapshot>,
    default: RwLock<Arc<VerticalConfig>>,
}

impl Default for CalibrationStore {
    fn default() -> Self {
        Self {
            verticals: RwLock::new(Arc::new(HashMap::new())),
            default: RwLock::new(Arc::new(VerticalConfig::default())),
        }
    }
}

impl CalibrationStore {
    /// Empty store; every vertical gets the default config
    pub fn new() -> Self {
        Self::default()
    }

    /// Store preloaded with the built-in vertical presets
    pub fn with_builtin_verticals() -> Self {
        let store = Self::new();
        let presets = [
            VerticalConfig::named("lending")
                .with_thresholds(40.0, 65.0)
                .with_weight("ACC-001", 1.3)
                .with_weight("CON-001", 1.0),
            VerticalConfig::named("crypto")
                .with_thresholds(35.0, 60.0)
                .with_weight("NET-001", 1.5)
                .with_weight("CRY-001", 1.2),
            VerticalConfig::named("ecommerce")
                .with_thresholds(45.0, 75.0)
                .with_weight("AMT-006", 1.5)
                .with_weight("BEH-001", 0.5),
            VerticalConfig::named("gaming")
                .with_thresholds(45.0, 75.0)
                .with_weight("GAM-001", 1.3),
            VerticalConfig::named("remittance")
                .with_thresholds(40.0, 70.0)
                .with_weight("AMT-004", 1.5)
                .with_weight("NET-005", 1.5),
        ];
        let map = presets
            .into_iter()
            .map(|c| (c.key.clone(), Arc::new(c)))
            .collect::<HashMap<_, _>>();
        *store.verticals.write() = Arc::new(map);
        store
    }

    /// Parse a calibration file
    ///
    /// ```toml
    /// [default]
    /// review_threshold = 40
    /// decline_threshold = 70
    ///
    /// [verticals.lending]
    /// review_threshold = 40
    /// decline_threshold = 65
    /// rule_weights = { "ACC-001" = 1.3 }
    /// ```
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let file: CalibrationFile = toml::from_str(content)
            .map_err(|e| Error::Config(format!("Failed to parse calibration: {}", e)))?;

        let store = Self::new();
        if let Some(mut default) = file.default {
            default.key = DEFAULT_VERTICAL.to_string();
            store.set_default(default)?;
        }
        let mut map = HashMap::with_capacity(file.verticals.len());
        for (key, mut config) in file.verticals {
            config.key = normalize_key(&key);
            config.validate()?;
            map.insert(config.key.clone(), Arc::new(config));
        }
        *store.verticals.write() = Arc::new(map);
        Ok(store)
    }

    /// Load a calibration file
    pub fn from_file(path: impl AsRef<std::path::Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("Failed to read calibration: {}", e)))?;
        Self::from_toml_str(&content)
    }

    /// Config for a vertical; unknown keys get the default
    pub fn snapshot(&self, vertical: &str) -> Arc<VerticalConfig> {
        let key = normalize_key(vertical);
        let verticals = self.verticals.read().clone();
        match verticals.get(&key) {
            Some(config) => config.clone(),
            None => self.default.read().clone(),
        }
    }

    /// Configured vertical keys
    pub fn verticals(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.verticals.read().keys().cloned().collect();
        keys.sort();
        keys
    }

    /// Insert or replace a vertical
    pub fn upsert(&self, mut config: VerticalConfig) -> Result<()> {
        config.key = normalize_key(&config.key);
        config.validate()?;
        let mut guard = self.verticals.write();
        let mut next = HashMap::clone(&guard);
        info!(vertical = %config.key, "calibration updated");
        next.insert(config.key.clone(), Arc::new(config));
        *guard = Arc::new(next);
        Ok(())
    }

    /// Drop a vertical; it falls back to the default afterwards
    pub fn remove(&self, vertical: &str) -> bool {
        let key = normalize_key(vertical);
        let mut guard = self.verticals.write();
        if !guard.contains_key(&key) {
            return false;
        }
        let mut next = HashMap::clone(&guard);
        next.remove(&key);
        *guard = Arc::new(next);
        true
    }

    /// Replace the fallback config
    pub fn set_default(&self, mut config: VerticalConfig) -> Result<()> {
        config.key = DEFAULT_VERTICAL.to_string();
        config.validate()?;
        *self.default.write() = Arc::new(config);
        Ok(())
    }

    /// Fail when any weight names a rule the registry does not know
    pub fn validate_against(&self, registry: &RuleRegistry) -> Result<()> {
        let verticals = self.verticals.read().clone();
        let default = self.default.read().clone();
        for config in verticals.values().map(|c| c.as_ref()).chain(std::iter::once(default.as_ref())) {
            for rule_id in config.rule_weights.keys() {
                if !registry.contains(rule_id) {
                    error!(vertical = %config.key, rule_id = %rule_id, "weight for unknown rule");
                    return Err(Error::UnknownRule(rule_id.clone()));
                }
            }
        }
        Ok(())
    }

    /// Publish a new snapshot whose trust multipliers are replaced by
    /// `trust_weights`. Configured weights are kept, so applying the same
    /// statistics twice yields the same effective weights.
    pub fn apply_trust_weights(
        &self,
        vertical: &str,
        trust_weights: &HashMap<String, f64>,
    ) -> Result<Arc<VerticalConfig>> {
        let key = normalize_key(vertical);
        let mut guard = self.verticals.write();
        let mut next = match guard.get(&key) {
            Some(current) => VerticalConfig::clone(current),
            None => VerticalConfig::clone(&self.default.read()),
        };
        next.key = key.clone();
        next.trust_weights = trust_weights.clone();
        next.validate()?;

        let published = Arc::new(next);
        let mut map = HashMap::clone(&guard);
        map.insert(key, published.clone());
        *guard = Arc::new(map);
        info!(vertical = %published.key, rules = trust_weights.len(), "trust weights applied");
        Ok(published)
    }
}

/// Vertical keys are compared trimmed and lower-case
pub fn normalize_key(vertical: &str) -> String {
    vertical.trim().to_lowercase()
}
