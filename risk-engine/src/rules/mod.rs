//! Scoring rules as data
//!
//! A rule is a table entry: stable id, metadata and a plain predicate
//! function over a read-only [`RuleContext`]. Adding a rule means adding an
//! entry to the catalog; the engine dispatches by iterating the registry.

pub mod catalog;
pub mod context;
pub mod registry;

pub use context::{RuleContext, CONTEXT_VERSION};
pub use registry::RuleRegistry;

use crate::types::Severity;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Predicate signature. Errors are caught by the engine and scored as "not triggered".
pub type RulePredicate = fn(&RuleContext<'_>) -> anyhow::Result<RuleOutcome>;

/// Grouping used for explanations and reporting
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleCategory {
    /// Transaction amount
    Amount,
    /// Account and identity
    Account,
    /// Email / phone
    Contact,
    /// Frequency
    Velocity,
    /// Device fingerprint
    Device,
    /// Cross-tenant intelligence
    Consortium,
    /// IP and geography
    Network,
    /// Timing and behaviour
    Behavioral,
    /// Lending only
    Lending,
    /// Crypto only
    Crypto,
    /// E-commerce only
    Ecommerce,
    /// Gaming only
    Gaming,
}

impl RuleCategory {
    /// Label
    pub fn as_str(&self) -> &'static str {
        match self {
            RuleCategory::Amount => "amount",
            RuleCategory::Account => "account",
            RuleCategory::Contact => "contact",
            RuleCategory::Velocity => "velocity",
            RuleCategory::Device => "device",
            RuleCategory::Consortium => "consortium",
            RuleCategory::Network => "network",
            RuleCategory::Behavioral => "behavioral",
            RuleCategory::Lending => "lending",
            RuleCategory::Crypto => "crypto",
            RuleCategory::Ecommerce => "ecommerce",
            RuleCategory::Gaming => "gaming",
        }
    }
}

/// Which verticals a rule runs for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Applicability {
    /// Every vertical
    All,
    /// Only the listed vertical keys (lower-case)
    Verticals(&'static [&'static str]),
}

impl Applicability {
    /// Does the rule run for this (normalized) vertical
    pub fn applies_to(&self, vertical: &str) -> bool {
        match self {
            Applicability::All => true,
            Applicability::Verticals(keys) => keys.iter().any(|k| *k == vertical),
        }
    }
}

/// Immutable rule definition
#[derive(Clone)]
pub struct RuleDefinition {
    /// Stable id, never reused; sole key for weight lookup
    pub id: &'static str,
    /// Human description
    pub description: &'static str,
    /// Non-negative base score
    pub base_score: f64,
    /// Default severity
    pub severity: Severity,
    /// Category
    pub category: RuleCategory,
    /// Applicable verticals
    pub applicability: Applicability,
    /// Predicate
    pub predicate: RulePredicate,
}

impl fmt::Debug for RuleDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RuleDefinition")
            .field("id", &self.id)
            .field("base_score", &self.base_score)
            .field("severity", &self.severity)
            .field("category", &self.category)
            .field("applicability", &self.applicability)
            .finish()
    }
}

/// What a rule reports when it fires
#[derive(Debug, Clone, PartialEq)]
pub struct RuleHit {
    /// Confidence in [0, 1]
    pub confidence: f64,
    /// Reason shown to analysts
    pub message: String,
    /// Escalated severity, if any
    pub severity: Option<Severity>,
    /// Score that replaces the base score, if any
    pub score: Option<f64>,
    /// Evidence
    pub metadata: BTreeMap<String, serde_json::Value>,
}

impl RuleHit {
    /// Full-confidence hit at the rule's base score and severity
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            confidence: 1.0,
            message: message.into(),
            severity: None,
            score: None,
            metadata: BTreeMap::new(),
        }
    }

    /// Set confidence
    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.confidence = confidence;
        self
    }

    /// Escalate severity
    pub fn with_severity(mut self, severity: Severity) -> Self {
        self.severity = Some(severity);
        self
    }

    /// Override the base score
    pub fn with_score(mut self, score: f64) -> Self {
        self.score = Some(score);
        self
    }

    /// Attach evidence
    pub fn with_meta(mut self, key: &str, value: impl Into<serde_json::Value>) -> Self {
        self.metadata.insert(key.to_string(), value.into());
        self
    }
}

/// Tri-state rule result
#[derive(Debug, Clone, PartialEq)]
pub enum RuleOutcome {
    /// Fired
    Triggered(RuleHit),
    /// Evaluated, did not fire
    NotTriggered,
    /// Could not be evaluated because an input is absent; scored like `NotTriggered`
    Inapplicable(&'static str),
}

impl RuleOutcome {
    /// `Triggered(hit)` when `condition` holds
    pub fn when(condition: bool, hit: impl FnOnce() -> RuleHit) -> Self {
        if condition {
            RuleOutcome::Triggered(hit())
        } else {
            RuleOutcome::NotTriggered
        }
    }

    /// Did the rule fire
    pub fn is_triggered(&self) -> bool {
        matches!(self, RuleOutcome::Triggered(_))
    }
}
