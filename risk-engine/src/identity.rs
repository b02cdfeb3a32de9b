//! Identity verification signals
//!
//! The verifier is an external collaborator (KYC bureau, phone intelligence,
//! sanctions list). Its answer is optional input to the account rules; when it
//! is absent or fails, those rules are inapplicable rather than triggered.

use crate::types::Transaction;
use crate::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Phone line classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PhoneLineType {
    /// Mobile carrier
    Mobile,
    /// Fixed line
    Landline,
    /// Internet telephony
    Voip,
    /// Prepaid mobile
    Prepaid,
    /// Not classified
    Unknown,
}

/// What the verifier knows about the person behind a transaction
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IdentitySignals {
    /// Identity document check passed; `None` when not checked
    #[serde(default)]
    pub identity_verified: Option<bool>,
    /// Similarity between the account name and the verified name, 0-1
    #[serde(default)]
    pub name_match_score: Option<f64>,
    /// Phone line type
    #[serde(default)]
    pub phone_line_type: Option<PhoneLineType>,
    /// Age of the email address in days
    #[serde(default)]
    pub email_age_days: Option<i64>,
    /// Sanctions / PEP / internal watchlist match
    #[serde(default)]
    pub watchlist_hit: bool,
}

/// Identity verification service
#[async_trait]
pub trait IdentityVerifier: Send + Sync {
    /// Look up signals for the transaction's subject
    async fn verify(&self, tx: &Transaction) -> Result<IdentitySignals>;
}

/// Verifier returning fixed signals, for wiring tests and sandboxes
#[derive(Debug, Clone, Default)]
pub struct StaticIdentityVerifier {
    signals: IdentitySignals,
}

impl StaticIdentityVerifier {
    /// Create new static verifier
    pub fn new(signals: IdentitySignals) -> Self {
        Self { signals }
    }
}

#[async_trait]
impl IdentityVerifier for StaticIdentityVerifier {
    async fn verify(&self, _tx: &Transaction) -> Result<IdentitySignals> {
        Ok(self.signals.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signals_deserialize_sparse() {
        let signals: IdentitySignals =
            serde_json::from_str(r#"{"phone_line_type":"voip","watchlist_hit":true}"#).unwrap();
        assert_eq!(signals.phone_line_type, Some(PhoneLineType::Voip));
        assert!(signals.watchlist_hit);
        assert_eq!(signals.identity_verified, None);
    }
}
