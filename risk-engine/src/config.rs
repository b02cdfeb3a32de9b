//! Configuration for the risk engine

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Risk engine configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Evaluation pipeline
    pub pipeline: PipelineConfig,

    /// Idempotency cache
    pub cache: CacheConfig,

    /// Velocity counters
    pub velocity: VelocityConfig,

    /// Consortium intelligence
    pub consortium: ConsortiumConfig,

    /// Identifier hashing
    pub hashing: HashingConfig,

    /// Feedback worker
    pub feedback: FeedbackConfig,

    /// Logging
    pub logging: LoggingConfig,
}

/// Pipeline configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Overall latency budget per evaluation (milliseconds)
    pub latency_budget_ms: u64,

    /// ML scoring timeout (milliseconds)
    pub ml_timeout_ms: u64,

    /// Identity verification timeout (milliseconds)
    pub identity_timeout_ms: u64,

    /// Largest accepted batch
    pub max_batch_size: usize,

    /// ML share of the final score when a vertical does not override it
    pub default_ml_weight: f64,

    /// Interval between sweeps of expired counters and cache entries (seconds)
    pub purge_interval_seconds: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            latency_budget_ms: 200,
            ml_timeout_ms: 50,
            identity_timeout_ms: 50,
            max_batch_size: 500,
            default_ml_weight: 0.3,
            purge_interval_seconds: 60,
        }
    }
}

impl PipelineConfig {
    /// Latency budget as a duration
    pub fn latency_budget(&self) -> Duration {
        Duration::from_millis(self.latency_budget_ms)
    }

    /// Purge interval as a duration
    pub fn purge_interval(&self) -> Duration {
        Duration::from_secs(self.purge_interval_seconds)
    }
}

/// Idempotency cache configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Entry lifetime (seconds)
    pub ttl_seconds: u64,

    /// Store call timeout (milliseconds)
    pub timeout_ms: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl_seconds: 300, // 5 minutes
            timeout_ms: 15,
        }
    }
}

/// Velocity counter configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VelocityConfig {
    /// Store call timeout (milliseconds)
    pub timeout_ms: u64,
}

impl Default for VelocityConfig {
    fn default() -> Self {
        Self { timeout_ms: 20 }
    }
}

/// Consortium configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsortiumConfig {
    /// Rolling window for distinct-tenant counts (days)
    pub tenant_window_days: i64,

    /// Store call timeout (milliseconds)
    pub timeout_ms: u64,

    /// Records with no sighting for this long and no confirmed fraud are prunable (days)
    pub retention_days: i64,
}

impl Default for ConsortiumConfig {
    fn default() -> Self {
        Self {
            tenant_window_days: 7,
            timeout_ms: 20,
            retention_days: 365,
        }
    }
}

/// Hashing configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HashingConfig {
    /// Secret mixed into every identifier hash
    pub pepper: String,
}

impl Default for HashingConfig {
    fn default() -> Self {
        Self {
            pepper: "riskrail-dev-pepper".to_string(),
        }
    }
}

/// Feedback worker configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FeedbackConfig {
    /// Bounded queue between the API and the worker
    pub channel_capacity: usize,

    /// Labelled hits needed before a rule's trust weight moves off 1.0
    pub min_samples: u64,
}

impl Default for FeedbackConfig {
    fn default() -> Self {
        Self {
            channel_capacity: 1024,
            min_samples: 20,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter directive, `RUST_LOG` wins when set
    pub filter: String,

    /// Emit JSON lines
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "info".to_string(),
            json: false,
        }
    }
}

impl Config {
    /// Load from file
    pub fn from_file(path: impl AsRef<std::path::Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("Failed to read config: {}", e)))?;
        Self::from_toml_str(&content)
    }

    /// Parse TOML text
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content)
            .map_err(|e| Error::Config(format!("Failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Load from environment variables
    pub fn from_env() -> Result<Self> {
        let mut config = Config::default();

        if let Some(v) = env_parse("RISK_ENGINE_LATENCY_BUDGET_MS")? {
            config.pipeline.latency_budget_ms = v;
        }
        if let Some(v) = env_parse("RISK_ENGINE_ML_TIMEOUT_MS")? {
            config.pipeline.ml_timeout_ms = v;
        }
        if let Some(v) = env_parse("RISK_ENGINE_ML_WEIGHT")? {
            config.pipeline.default_ml_weight = v;
        }
        if let Some(v) = env_parse("RISK_ENGINE_MAX_BATCH_SIZE")? {
            config.pipeline.max_batch_size = v;
        }
        if let Some(v) = env_parse("RISK_ENGINE_PURGE_INTERVAL_SECONDS")? {
            config.pipeline.purge_interval_seconds = v;
        }
        if let Some(v) = env_parse("RISK_ENGINE_CACHE_TTL_SECONDS")? {
            config.cache.ttl_seconds = v;
        }
        if let Some(v) = env_parse("RISK_ENGINE_CONSORTIUM_WINDOW_DAYS")? {
            config.consortium.tenant_window_days = v;
        }
        if let Ok(pepper) = std::env::var("RISK_ENGINE_HASH_PEPPER") {
            config.hashing.pepper = pepper;
        }
        if let Ok(filter) = std::env::var("RISK_ENGINE_LOG") {
            config.logging.filter = filter;
        }
        if let Some(v) = env_parse("RISK_ENGINE_LOG_JSON")? {
            config.logging.json = v;
        }

        config.validate()?;
        Ok(config)
    }

    /// Reject values the pipeline cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.pipeline.latency_budget_ms == 0 {
            return Err(Error::Config("pipeline.latency_budget_ms must be > 0".to_string()));
        }
        if !(0.0..=1.0).contains(&self.pipeline.default_ml_weight) {
            return Err(Error::Config(
                "pipeline.default_ml_weight must be within [0, 1]".to_string(),
            ));
        }
        if self.pipeline.max_batch_size == 0 {
            return Err(Error::Config("pipeline.max_batch_size must be > 0".to_string()));
        }
        if self.pipeline.purge_interval_seconds == 0 {
            return Err(Error::Config("pipeline.purge_interval_seconds must be > 0".to_string()));
        }
        if self.cache.ttl_seconds == 0 {
            return Err(Error::Config("cache.ttl_seconds must be > 0".to_string()));
        }
        if self.consortium.tenant_window_days <= 0 {
            return Err(Error::Config("consortium.tenant_window_days must be > 0".to_string()));
        }
        if self.hashing.pepper.is_empty() {
            return Err(Error::Config("hashing.pepper must not be empty".to_string()));
        }
        if self.feedback.channel_capacity == 0 {
            return Err(Error::Config("feedback.channel_capacity must be > 0".to_string()));
        }
        Ok(())
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Result<Option<T>> {
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|_| Error::Config(format!("{} has an invalid value: {}", key, raw))),
        Err(_) => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.cache.ttl_seconds, 300);
        assert_eq!(config.pipeline.latency_budget_ms, 200);
        assert_eq!(config.consortium.tenant_window_days, 7);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = Config::from_toml_str(
            r#"
            [pipeline]
            latency_budget_ms = 150
            default_ml_weight = 0.4

            [cache]
            ttl_seconds = 60
            "#,
        )
        .unwrap();

        assert_eq!(config.pipeline.latency_budget_ms, 150);
        assert_eq!(config.pipeline.default_ml_weight, 0.4);
        assert_eq!(config.pipeline.ml_timeout_ms, 50);
        assert_eq!(config.cache.ttl_seconds, 60);
        assert_eq!(config.feedback.min_samples, 20);
    }

    #[test]
    fn test_rejects_invalid_values() {
        assert!(Config::from_toml_str("[pipeline]\ndefault_ml_weight = 1.5\n").is_err());
        assert!(Config::from_toml_str("[hashing]\npepper = \"\"\n").is_err());
        assert!(Config::from_toml_str("[pipeline]\nlatency_budget_ms = 0\n").is_err());
        assert!(Config::from_toml_str("not toml at all [").is_err());
    }
}
