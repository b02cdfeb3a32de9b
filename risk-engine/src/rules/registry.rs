//! Rule registry

use super::{catalog, RuleDefinition};
use crate::{Error, Result};
use std::collections::HashMap;
use tracing::{error, info};

/// Flat table of rule definitions, keyed by id
#[derive(Debug, Clone, Default)]
pub struct RuleRegistry {
    rules: Vec<RuleDefinition>,
    index: HashMap<&'static str, usize>,
}

impl RuleRegistry {
    /// Build a registry. A duplicate id or an invalid base score is fatal.
    pub fn new(rules: impl IntoIterator<Item = RuleDefinition>) -> Result<Self> {
        let mut registry = Self::default();
        for rule in rules {
            registry.register(rule)?;
        }
        Ok(registry)
    }

    /// Registry holding the full built-in catalog
    pub fn with_default_catalog() -> Result<Self> {
        let registry = Self::new(catalog::all_rules())?;
        info!(rules = registry.len(), "rule registry loaded");
        Ok(registry)
    }

    /// Registry holding only the listed catalog rules
    pub fn from_catalog_ids(ids: &[&str]) -> Result<Self> {
        let all = catalog::all_rules();
        let mut selected = Vec::with_capacity(ids.len());
        for id in ids {
            let rule = all
                .iter()
                .find(|r| r.id == *id)
                .cloned()
                .ok_or_else(|| Error::UnknownRule(id.to_string()))?;
            selected.push(rule);
        }
        Self::new(selected)
    }

    /// Add one rule
    pub fn register(&mut self, rule: RuleDefinition) -> Result<()> {
        if self.index.contains_key(rule.id) {
            error!(rule_id = rule.id, "duplicate rule id");
            return Err(Error::DuplicateRule(rule.id.to_string()));
        }
        if !rule.base_score.is_finite() || rule.base_score < 0.0 {
            error!(rule_id = rule.id, base_score = rule.base_score, "invalid base score");
            return Err(Error::Config(format!(
                "rule {} has invalid base score {}",
                rule.id, rule.base_score
            )));
        }
        self.index.insert(rule.id, self.rules.len());
        self.rules.push(rule);
        Ok(())
    }

    /// Look up by id
    pub fn get(&self, id: &str) -> Option<&RuleDefinition> {
        self.index.get(id).map(|i| &self.rules[*i])
    }

    /// Id is registered
    pub fn contains(&self, id: &str) -> bool {
        self.index.contains_key(id)
    }

    /// Rules that run for a vertical, in registration order
    pub fn applicable<'a>(&'a self, vertical: &'a str) -> impl Iterator<Item = &'a RuleDefinition> + 'a {
        self.rules
            .iter()
            .filter(move |r| r.applicability.applies_to(vertical))
    }

    /// Every rule
    pub fn iter(&self) -> impl Iterator<Item = &RuleDefinition> {
        self.rules.iter()
    }

    /// Number of rules
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    /// No rules
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}
