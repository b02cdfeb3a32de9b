//! Transaction audit store
//!
//! Every answered check is persisted with its result so feedback can later
//! find the identifiers and the rules that fired.

use crate::types::{EvaluationResult, Outcome, Transaction};
use crate::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};

/// One audited check
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditRecord {
    /// Submitted transaction
    pub transaction: Transaction,
    /// Result returned
    pub result: EvaluationResult,
    /// Result came from the cache
    pub cached: bool,
    /// When the record was written
    pub recorded_at: DateTime<Utc>,
    /// Ground truth, once reported
    pub feedback: Option<Outcome>,
}

/// Audit persistence
#[async_trait]
pub trait TransactionStore: Send + Sync {
    /// Persist a record, replacing any with the same transaction id.
    /// Feedback already attached to that id survives the replacement.
    async fn record(&self, record: AuditRecord) -> Result<()>;

    /// Fetch by transaction id
    async fn get(&self, transaction_id: &str) -> Result<Option<AuditRecord>>;

    /// Attach feedback. Returns false when feedback was already applied.
    async fn mark_feedback(&self, transaction_id: &str, outcome: Outcome) -> Result<bool>;
}

/// In-process audit store
#[derive(Default)]
pub struct InMemoryTransactionStore {
    records: DashMap<String, AuditRecord>,
}

impl InMemoryTransactionStore {
    /// Create new store
    pub fn new() -> Self {
        Self::default()
    }

    /// Records held
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// No records held
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[async_trait]
impl TransactionStore for InMemoryTransactionStore {
    async fn record(&self, mut record: AuditRecord) -> Result<()> {
        match self.records.entry(record.transaction.transaction_id.clone()) {
            Entry::Occupied(mut existing) => {
                record.feedback = existing.get().feedback.or(record.feedback);
                existing.insert(record);
            }
            Entry::Vacant(slot) => {
                slot.insert(record);
            }
        }
        Ok(())
    }

    async fn get(&self, transaction_id: &str) -> Result<Option<AuditRecord>> {
        Ok(self.records.get(transaction_id).map(|r| r.clone()))
    }

    async fn mark_feedback(&self, transaction_id: &str, outcome: Outcome) -> Result<bool> {
        match self.records.get_mut(transaction_id) {
            Some(mut record) if record.feedback.is_none() => {
                record.feedback = Some(outcome);
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Decision, RiskScore};
    use rust_decimal::Decimal;

    fn record(id: &str) -> AuditRecord {
        AuditRecord {
            transaction: Transaction::new(id, "t1", "u1", Decimal::from(10), "USD", "lending"),
            result: EvaluationResult {
                input_hash: "h".to_string(),
                vertical: "lending".to_string(),
                final_score: RiskScore::ZERO,
                rule_score: RiskScore::ZERO,
                decision: Decision::Approve,
                triggered_rules: Vec::new(),
                ml_component_used: false,
                ml_probability: None,
                aml_review: false,
                degraded: false,
                errored_rules: Vec::new(),
                explanation: String::new(),
                evaluated_at: Utc::now(),
            },
            cached: false,
            recorded_at: Utc::now(),
            feedback: None,
        }
    }

    #[tokio::test]
    async fn test_feedback_applied_once() {
        let store = InMemoryTransactionStore::new();
        store.record(record("tx-1")).await.unwrap();

        assert!(store.mark_feedback("tx-1", Outcome::Fraud).await.unwrap());
        assert!(!store.mark_feedback("tx-1", Outcome::Legitimate).await.unwrap());
        assert!(!store.mark_feedback("tx-404", Outcome::Fraud).await.unwrap());
        assert_eq!(store.get("tx-1").await.unwrap().unwrap().feedback, Some(Outcome::Fraud));
    }

    #[tokio::test]
    async fn test_rerecord_keeps_feedback() {
        let store = InMemoryTransactionStore::new();
        store.record(record("tx-1")).await.unwrap();
        store.mark_feedback("tx-1", Outcome::Fraud).await.unwrap();

        let mut retry = record("tx-1");
        retry.cached = true;
        store.record(retry).await.unwrap();

        let stored = store.get("tx-1").await.unwrap().unwrap();
        assert!(stored.cached);
        assert_eq!(stored.feedback, Some(Outcome::Fraud));
        assert!(!store.mark_feedback("tx-1", Outcome::Fraud).await.unwrap());
    }
}
