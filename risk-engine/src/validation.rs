//! Input validation, run before any rule sees a transaction

use crate::error::{Result, ValidationErrors};
use crate::types::{FeedbackRecord, Outcome, Transaction};
use chrono::{Duration, Utc};
use rust_decimal::Decimal;
use std::net::IpAddr;

/// Upper sanity bound on a single amount
pub const MAX_AMOUNT: i64 = 1_000_000_000_000;

/// Clock skew tolerated on client-supplied timestamps
const MAX_FUTURE_SKEW_MINUTES: i64 = 5;

/// Check every required field, collecting all problems
pub fn validate_transaction(tx: &Transaction) -> Result<()> {
    let mut errors = ValidationErrors::default();

    require_non_empty(&mut errors, "transaction_id", &tx.transaction_id);
    require_non_empty(&mut errors, "tenant_id", &tx.tenant_id);
    require_non_empty(&mut errors, "user_id", &tx.user_id);
    require_non_empty(&mut errors, "vertical", &tx.vertical);

    if tx.amount <= Decimal::ZERO {
        errors.push("amount", "must be greater than zero");
    } else if tx.amount > Decimal::from(MAX_AMOUNT) {
        errors.push("amount", "exceeds maximum limit");
    }

    let currency = tx.currency.trim();
    if currency.len() != 3 || !currency.chars().all(|c| c.is_ascii_alphabetic()) {
        errors.push("currency", "must be a 3-letter ISO 4217 code");
    }

    if let Some(email) = tx.email.as_deref() {
        let email = email.trim();
        let valid = email
            .split_once('@')
            .map(|(local, domain)| !local.is_empty() && domain.contains('.'))
            .unwrap_or(false);
        if !valid {
            errors.push("email", "is not a valid email address");
        }
    }

    if let Some(phone) = tx.phone.as_deref() {
        let digits = phone.chars().filter(|c| c.is_ascii_digit()).count();
        if !(6..=15).contains(&digits) {
            errors.push("phone", "must contain between 6 and 15 digits");
        }
    }

    if let Some(ip) = tx.ip_address.as_deref() {
        if ip.trim().parse::<IpAddr>().is_err() {
            errors.push("ip_address", "is not a valid IP address");
        }
    }

    if let Some(fp) = tx.device_fingerprint.as_deref() {
        if fp.trim().is_empty() {
            errors.push("device_fingerprint", "must not be blank when present");
        }
    }

    for (field, country) in [("country", &tx.country), ("ip_country", &tx.ip_country)] {
        if let Some(code) = country.as_deref() {
            if code.len() != 2 || !code.chars().all(|c| c.is_ascii_alphabetic()) {
                errors.push(field, "must be an ISO 3166 alpha-2 code");
            }
        }
    }

    let latest = Utc::now() + Duration::minutes(MAX_FUTURE_SKEW_MINUTES);
    if let Some(created) = tx.account_created_at {
        if created > latest {
            errors.push("account_created_at", "must not be in the future");
        }
        if created > tx.occurred_at {
            errors.push("account_created_at", "must not be after occurred_at");
        }
    }
    if tx.occurred_at > latest {
        errors.push("occurred_at", "must not be in the future");
    }

    errors.into_result()
}

/// Check a feedback submission
pub fn validate_feedback(feedback: &FeedbackRecord) -> Result<()> {
    let mut errors = ValidationErrors::default();
    require_non_empty(&mut errors, "transaction_id", &feedback.transaction_id);

    if feedback.actual_outcome == Outcome::Legitimate && feedback.fraud_type.is_some() {
        errors.push("fraud_type", "only allowed when actual_outcome is fraud");
    }
    errors.into_result()
}

fn require_non_empty(errors: &mut ValidationErrors, field: &str, value: &str) {
    if value.trim().is_empty() {
        errors.push(field, "is required");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::types::FraudType;

    fn valid_tx() -> Transaction {
        let mut tx = Transaction::new("tx-1", "tenant-a", "user-1", Decimal::from(250), "USD", "ecommerce");
        tx.email = Some("jane@example.com".to_string());
        tx.phone = Some("+1 (415) 555-0100".to_string());
        tx.ip_address = Some("203.0.113.7".to_string());
        tx.country = Some("US".to_string());
        tx
    }

    #[test]
    fn test_valid_transaction_passes() {
        assert!(validate_transaction(&valid_tx()).is_ok());
    }

    #[test]
    fn test_collects_every_field_error() {
        let mut tx = valid_tx();
        tx.user_id = " ".to_string();
        tx.amount = Decimal::ZERO;
        tx.currency = "US".to_string();
        tx.ip_address = Some("not-an-ip".to_string());

        match validate_transaction(&tx) {
            Err(Error::Validation(errors)) => {
                let fields: Vec<&str> = errors.errors.iter().map(|e| e.field.as_str()).collect();
                assert_eq!(fields, vec!["user_id", "amount", "currency", "ip_address"]);
            }
            other => panic!("expected validation error, got {:?}", other),
        }
    }

    #[test]
    fn test_rejects_bad_contacts() {
        let mut tx = valid_tx();
        tx.email = Some("jane.example.com".to_string());
        tx.phone = Some("12".to_string());
        assert!(validate_transaction(&tx).is_err());
    }

    #[test]
    fn test_rejects_account_opened_after_transaction() {
        let mut tx = valid_tx();
        tx.account_created_at = Some(tx.occurred_at + Duration::hours(1));
        assert!(validate_transaction(&tx).is_err());
    }

    #[test]
    fn test_feedback_validation() {
        let ok = FeedbackRecord {
            transaction_id: "tx-1".to_string(),
            actual_outcome: Outcome::Fraud,
            fraud_type: Some(FraudType::LoanStacking),
            reported_at: Utc::now(),
        };
        assert!(validate_feedback(&ok).is_ok());

        let bad = FeedbackRecord {
            transaction_id: String::new(),
            actual_outcome: Outcome::Legitimate,
            fraud_type: Some(FraudType::PaymentFraud),
            reported_at: Utc::now(),
        };
        match validate_feedback(&bad) {
            Err(Error::Validation(errors)) => assert_eq!(errors.errors.len(), 2),
            other => panic!("expected validation error, got {:?}", other),
        }
    }
}
