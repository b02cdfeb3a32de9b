//! Risk Engine
//!
//! Real-time transaction risk scoring for multi-tenant fraud prevention:
//! a rule engine over velocity counters and cross-tenant consortium
//! intelligence, blended with an optional ML probability, behind an
//! idempotency cache.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod accuracy;
pub mod audit;
pub mod cache;
pub mod calibration;
pub mod combiner;
pub mod config;
pub mod consortium;
pub mod engine;
pub mod error;
pub mod feedback;
pub mod hashing;
pub mod identity;
pub mod metrics;
pub mod ml;
pub mod pipeline;
#[cfg(feature = "redis")]
pub mod redis_store;
pub mod rules;
pub mod telemetry;
pub mod types;
pub mod validation;
pub mod velocity;
pub mod webhook;

pub use accuracy::{RuleAccuracyStat, RuleAccuracyTracker};
pub use cache::IdempotencyCache;
pub use calibration::{CalibrationStore, VerticalConfig};
pub use combiner::{CombinedScore, HybridCombiner};
pub use config::Config;
pub use consortium::ConsortiumIntelligence;
pub use engine::{RuleEngine, RuleEvaluation};
pub use error::{Error, FieldError, Result, ValidationErrors};
pub use feedback::FeedbackOutcome;
pub use hashing::{IdentifierHash, IdentifierHasher};
pub use metrics::Metrics;
pub use pipeline::{BatchResponse, BatchSummary, RiskPipeline};
pub use rules::{RuleContext, RuleDefinition, RuleOutcome, RuleRegistry};
pub use types::*;
pub use velocity::{VelocityCounters, VelocityWindow};
