//! Core types for risk engine

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Risk score (0-100), rounded to four decimal places
#[derive(Debug, Clone, Copy, Default, PartialEq, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RiskScore(f64);

impl RiskScore {
    /// Lowest possible score
    pub const ZERO: RiskScore = RiskScore(0.0);

    /// Highest possible score
    pub const MAX: RiskScore = RiskScore(100.0);

    /// Create new risk score, clamped to 0-100. Non-finite input maps to 0.
    pub fn new(score: f64) -> Self {
        if !score.is_finite() {
            return Self::ZERO;
        }
        let clamped = score.clamp(0.0, 100.0);
        // + 0.0 folds a negative zero into 0.0
        Self((clamped * 10_000.0).round() / 10_000.0 + 0.0)
    }

    /// Get raw score
    pub fn value(&self) -> f64 {
        self.0
    }
}

impl fmt::Display for RiskScore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.2}", self.0)
    }
}

/// Outcome of scoring a transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Decision {
    /// Let it through
    Approve,
    /// Hold for manual review
    Review,
    /// Block
    Decline,
}

impl Decision {
    /// Lower-case label used in logs and metrics
    pub fn as_str(&self) -> &'static str {
        match self {
            Decision::Approve => "approve",
            Decision::Review => "review",
            Decision::Decline => "decline",
        }
    }
}

/// Coarse risk tier attached to a triggered rule, independent of its score
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    /// Informational signal
    Low,
    /// Worth a look
    Medium,
    /// Strong fraud signal
    High,
    /// Confirmed or near-certain fraud
    Critical,
}

/// Subject a velocity counter is kept for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubjectType {
    /// End user / account holder
    User,
    /// Device fingerprint
    Device,
    /// Phone, email or national id (always hashed)
    Contact,
}

impl SubjectType {
    /// Key segment
    pub fn as_str(&self) -> &'static str {
        match self {
            SubjectType::User => "user",
            SubjectType::Device => "device",
            SubjectType::Contact => "contact",
        }
    }
}

/// Kind of identifier shared through the consortium
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdentifierKind {
    /// Device fingerprint
    Device,
    /// Phone number
    Phone,
    /// Email address
    Email,
    /// National identity number
    NationalId,
}

impl IdentifierKind {
    /// Hash domain tag
    pub fn as_str(&self) -> &'static str {
        match self {
            IdentifierKind::Device => "device",
            IdentifierKind::Phone => "phone",
            IdentifierKind::Email => "email",
            IdentifierKind::NationalId => "national_id",
        }
    }
}

/// Confirmed ground truth for a transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    /// Confirmed fraud
    Fraud,
    /// Confirmed legitimate
    Legitimate,
}

/// Fraud category reported through feedback
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FraudType {
    /// Stolen identity
    IdentityTheft,
    /// Fabricated identity
    SyntheticIdentity,
    /// Compromised account
    AccountTakeover,
    /// Same applicant borrowing from several lenders at once
    LoanStacking,
    /// Applicant never intended to repay
    FirstPartyFraud,
    /// Stolen card / payment instrument
    PaymentFraud,
    /// Laundering or mule activity
    MoneyLaundering,
    /// Promotion or bonus abuse
    BonusAbuse,
    /// Anything else
    Other,
}

/// Enrichment about the device, supplied by the client SDK
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeviceAttributes {
    /// Running in an emulator
    #[serde(default)]
    pub emulator: bool,
    /// Rooted / jailbroken
    #[serde(default)]
    pub rooted: bool,
    /// Headless or automated browser
    #[serde(default)]
    pub headless: bool,
    /// Device clock offset from UTC in minutes
    #[serde(default)]
    pub timezone_offset_minutes: Option<i32>,
    /// Seconds from session start to submission
    #[serde(default)]
    pub session_duration_seconds: Option<u32>,
}

/// Enrichment about the network origin
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NetworkAttributes {
    /// Known VPN exit
    #[serde(default)]
    pub vpn: bool,
    /// Open or anonymous proxy
    #[serde(default)]
    pub proxy: bool,
    /// Tor exit node
    #[serde(default)]
    pub tor: bool,
    /// Datacenter / hosting provider range
    #[serde(default)]
    pub hosting: bool,
}

/// Transaction submitted for scoring
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    /// Caller-supplied transaction id (volatile, not part of the cache key)
    pub transaction_id: String,
    /// Tenant / client id
    pub tenant_id: String,
    /// User id within the tenant
    pub user_id: String,
    /// Amount in major units
    pub amount: Decimal,
    /// ISO 4217 currency code
    pub currency: String,
    /// Industry tag (lending, crypto, ecommerce, ...)
    pub vertical: String,
    /// Device fingerprint
    #[serde(default)]
    pub device_fingerprint: Option<String>,
    /// Client IP address
    #[serde(default)]
    pub ip_address: Option<String>,
    /// Phone number
    #[serde(default)]
    pub phone: Option<String>,
    /// Email address
    #[serde(default)]
    pub email: Option<String>,
    /// National identity number
    #[serde(default)]
    pub national_id: Option<String>,
    /// Account / billing country (ISO 3166 alpha-2)
    #[serde(default)]
    pub country: Option<String>,
    /// Country the IP geolocates to
    #[serde(default)]
    pub ip_country: Option<String>,
    /// card, bank_transfer, wallet, crypto, ...
    #[serde(default)]
    pub payment_method: Option<String>,
    /// Counterparty account, wallet or beneficiary
    #[serde(default)]
    pub beneficiary_id: Option<String>,
    /// When the user's account was opened
    #[serde(default)]
    pub account_created_at: Option<DateTime<Utc>>,
    /// When the transaction happened
    #[serde(default = "Utc::now")]
    pub occurred_at: DateTime<Utc>,
    /// Device enrichment
    #[serde(default)]
    pub device: Option<DeviceAttributes>,
    /// Network enrichment
    #[serde(default)]
    pub network: Option<NetworkAttributes>,
    /// Free-form context kept for audit
    #[serde(default)]
    pub context: BTreeMap<String, serde_json::Value>,
}

impl Transaction {
    /// Minimal transaction; optional fields empty
    pub fn new(
        transaction_id: impl Into<String>,
        tenant_id: impl Into<String>,
        user_id: impl Into<String>,
        amount: Decimal,
        currency: impl Into<String>,
        vertical: impl Into<String>,
    ) -> Self {
        Self {
            transaction_id: transaction_id.into(),
            tenant_id: tenant_id.into(),
            user_id: user_id.into(),
            amount,
            currency: currency.into(),
            vertical: vertical.into(),
            device_fingerprint: None,
            ip_address: None,
            phone: None,
            email: None,
            national_id: None,
            country: None,
            ip_country: None,
            payment_method: None,
            beneficiary_id: None,
            account_created_at: None,
            occurred_at: Utc::now(),
            device: None,
            network: None,
            context: BTreeMap::new(),
        }
    }

    /// Raw identifiers eligible for consortium sharing
    pub fn identifiers(&self) -> Vec<(IdentifierKind, &str)> {
        let mut ids = Vec::with_capacity(4);
        if let Some(device) = self.device_fingerprint.as_deref() {
            ids.push((IdentifierKind::Device, device));
        }
        if let Some(phone) = self.phone.as_deref() {
            ids.push((IdentifierKind::Phone, phone));
        }
        if let Some(email) = self.email.as_deref() {
            ids.push((IdentifierKind::Email, email));
        }
        if let Some(national_id) = self.national_id.as_deref() {
            ids.push((IdentifierKind::NationalId, national_id));
        }
        ids
    }

    /// Wall-clock time on the device, shifted by its reported UTC offset
    pub fn local_time(&self) -> DateTime<Utc> {
        let offset = self
            .device
            .as_ref()
            .and_then(|d| d.timezone_offset_minutes)
            .unwrap_or(0);
        self.occurred_at + Duration::minutes(i64::from(offset))
    }

    /// Account age in whole days at the time of the transaction
    pub fn account_age_days(&self) -> Option<i64> {
        self.account_created_at
            .map(|created| (self.occurred_at - created).num_days().max(0))
    }
}

/// A rule that fired, with its weighted contribution
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TriggeredRule {
    /// Stable rule id
    pub rule_id: String,
    /// Rule category
    pub category: String,
    /// Severity after any escalation
    pub severity: Severity,
    /// Contribution to the rule score: base × weight × confidence
    pub score: f64,
    /// Score the rule asked for before weighting
    pub base_score: f64,
    /// Vertical weight applied
    pub weight: f64,
    /// Rule confidence in [0, 1]
    pub confidence: f64,
    /// Human-readable reason
    pub message: String,
    /// Rule-specific evidence
    #[serde(default)]
    pub metadata: BTreeMap<String, serde_json::Value>,
}

/// Full scoring outcome, the unit the idempotency cache stores
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationResult {
    /// Hash of the normalized scoring input
    pub input_hash: String,
    /// Vertical the result was calibrated for
    pub vertical: String,
    /// Blended final score
    pub final_score: RiskScore,
    /// Weighted rule score before blending
    pub rule_score: RiskScore,
    /// Decision bucket for the final score
    pub decision: Decision,
    /// Rules that fired, highest contribution first
    pub triggered_rules: Vec<TriggeredRule>,
    /// Whether an ML probability took part in the blend
    pub ml_component_used: bool,
    /// ML probability when one was used
    pub ml_probability: Option<f64>,
    /// Final score reached the vertical's AML boundary
    pub aml_review: bool,
    /// Budget exceeded or a dependency failed; result is best-effort
    pub degraded: bool,
    /// Rules that errored and were scored as not triggered
    pub errored_rules: Vec<String>,
    /// Explanation assembled from the triggered rules
    pub explanation: String,
    /// When the evaluation ran
    pub evaluated_at: DateTime<Utc>,
}

impl EvaluationResult {
    /// Highest severity among triggered rules
    pub fn max_severity(&self) -> Option<Severity> {
        self.triggered_rules.iter().map(|r| r.severity).max()
    }
}

/// Answer to a check-transaction request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckResponse {
    /// Transaction id of this request (may differ from the one that populated the cache)
    pub transaction_id: String,
    /// Scoring outcome
    #[serde(flatten)]
    pub result: EvaluationResult,
    /// Served from the idempotency cache
    pub cached: bool,
    /// Wall-clock time spent on this request
    pub processing_time_ms: u64,
}

/// Confirmed ground truth for an earlier transaction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedbackRecord {
    /// Transaction the feedback refers to
    pub transaction_id: String,
    /// What actually happened
    pub actual_outcome: Outcome,
    /// Fraud category when the outcome is fraud
    #[serde(default)]
    pub fraud_type: Option<FraudType>,
    /// When the feedback was reported
    #[serde(default = "Utc::now")]
    pub reported_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_risk_score_clamps_and_rounds() {
        assert_eq!(RiskScore::new(-5.0), RiskScore::ZERO);
        assert_eq!(RiskScore::new(250.0), RiskScore::MAX);
        assert_eq!(RiskScore::new(f64::NAN), RiskScore::ZERO);
        assert_eq!(RiskScore::new(30.0 * 1.3).value(), 39.0);
        assert_eq!(RiskScore::new(12.345_678).value(), 12.3457);
    }

    #[test]
    fn test_risk_score_has_no_negative_zero() {
        let score = RiskScore::new(-0.0);
        assert!(score.value().is_sign_positive());
        assert_eq!(score.to_string(), "0.00");
        assert_eq!(serde_json::to_string(&score).unwrap(), "0.0");
    }

    #[test]
    fn test_severity_ordering() {
        assert!(Severity::Critical > Severity::High);
        assert!(Severity::High > Severity::Medium);
        assert!(Severity::Medium > Severity::Low);
    }

    #[test]
    fn test_account_age_days() {
        let mut tx = Transaction::new("tx-1", "t1", "u1", Decimal::from(10), "USD", "lending");
        assert_eq!(tx.account_age_days(), None);

        tx.account_created_at = Some(tx.occurred_at - Duration::days(7));
        assert_eq!(tx.account_age_days(), Some(7));

        tx.account_created_at = Some(tx.occurred_at + Duration::days(1));
        assert_eq!(tx.account_age_days(), Some(0));
    }

    #[test]
    fn test_identifiers_only_present_fields() {
        let mut tx = Transaction::new("tx-1", "t1", "u1", Decimal::from(10), "USD", "lending");
        assert!(tx.identifiers().is_empty());

        tx.device_fingerprint = Some("fp-1".to_string());
        tx.email = Some("a@b.io".to_string());
        let kinds: Vec<IdentifierKind> = tx.identifiers().into_iter().map(|(k, _)| k).collect();
        assert_eq!(kinds, vec![IdentifierKind::Device, IdentifierKind::Email]);
    }

    #[test]
    fn test_transaction_deserializes_with_defaults() {
        let tx: Transaction = serde_json::from_str(
            r#"{"transaction_id":"t","tenant_id":"a","user_id":"u","amount":"12.50","currency":"EUR","vertical":"ecommerce"}"#,
        )
        .unwrap();
        assert_eq!(tx.amount, Decimal::new(1250, 2));
        assert!(tx.device_fingerprint.is_none());
        assert!(tx.context.is_empty());
    }
}
