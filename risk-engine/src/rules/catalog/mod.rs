//! Built-in rule catalog
//!
//! Rule ids are stable: weights and accuracy statistics are keyed by them.
//! Retired rules keep their id reserved; new rules take the next number in
//! their category.

pub mod account;
pub mod amount;
pub mod behavioral;
pub mod consortium;
pub mod contact;
pub mod device;
pub mod network;
pub mod velocity;
pub mod verticals;

use super::{Applicability, RuleCategory, RuleDefinition, RulePredicate};
use crate::types::Severity;

/// Stable rule ids
pub mod ids {
    /// Amount at or above 10,000
    pub const AMT_LARGE: &str = "AMT-001";
    /// Amount at or above 100,000
    pub const AMT_VERY_LARGE: &str = "AMT-002";
    /// Round thousands
    pub const AMT_ROUND: &str = "AMT-003";
    /// Just below the 10,000 reporting threshold
    pub const AMT_STRUCTURING: &str = "AMT-004";
    /// Far above the user's weekly average
    pub const AMT_SPIKE: &str = "AMT-005";
    /// Card testing with tiny amounts
    pub const AMT_MICRO: &str = "AMT-006";
    /// Daily cumulative amount
    pub const AMT_DAILY_CUMULATIVE: &str = "AMT-007";

    /// Young account moving a large amount
    pub const ACC_NEW_ACCOUNT_LARGE_AMOUNT: &str = "ACC-001";
    /// Account opened today
    pub const ACC_BRAND_NEW: &str = "ACC-002";
    /// Identity verification failed
    pub const ACC_UNVERIFIED: &str = "ACC-003";
    /// Name does not match the verified identity
    pub const ACC_NAME_MISMATCH: &str = "ACC-004";
    /// Watchlist hit
    pub const ACC_WATCHLIST: &str = "ACC-005";

    /// Disposable email domain
    pub const CNT_DISPOSABLE_EMAIL: &str = "CNT-001";
    /// Recently created email address
    pub const CNT_YOUNG_EMAIL: &str = "CNT-002";
    /// VoIP or prepaid phone line
    pub const CNT_VIRTUAL_PHONE: &str = "CNT-003";
    /// Machine-generated looking email local part
    pub const CNT_NUMERIC_EMAIL: &str = "CNT-004";

    /// Burst within a minute
    pub const VEL_MINUTE: &str = "VEL-001";
    /// Burst within 10 minutes
    pub const VEL_TEN_MINUTES: &str = "VEL-002";
    /// High hourly count
    pub const VEL_HOURLY: &str = "VEL-003";
    /// High daily count
    pub const VEL_DAILY: &str = "VEL-004";
    /// High weekly count
    pub const VEL_WEEKLY: &str = "VEL-005";
    /// Hourly amount
    pub const VEL_HOURLY_AMOUNT: &str = "VEL-006";
    /// Phone reused across transactions today
    pub const VEL_PHONE: &str = "VEL-007";
    /// Email reused across transactions today
    pub const VEL_EMAIL: &str = "VEL-008";

    /// Many users on one device today
    pub const DEV_SHARED_DEVICE: &str = "DEV-001";
    /// Many users on one device this week
    pub const DEV_SHARED_DEVICE_WEEK: &str = "DEV-002";
    /// Application rate per device per day
    pub const DEV_APPLICATION_RATE: &str = "DEV-003";
    /// Emulator
    pub const DEV_EMULATOR: &str = "DEV-004";
    /// Rooted or jailbroken
    pub const DEV_ROOTED: &str = "DEV-005";
    /// Headless browser
    pub const DEV_HEADLESS: &str = "DEV-006";
    /// Session too short for a human
    pub const DEV_FAST_SESSION: &str = "DEV-007";
    /// No fingerprint where one is expected
    pub const DEV_MISSING_FINGERPRINT: &str = "DEV-008";

    /// Device seen across lenders or tied to fraud
    pub const CON_DEVICE_STACKING: &str = "CON-001";
    /// Contact identifier seen across tenants or tied to fraud
    pub const CON_CONTACT_REUSE: &str = "CON-002";
    /// Large confirmed-fraud amount on an identifier
    pub const CON_AMOUNT_IMPLICATED: &str = "CON-003";
    /// Identifier tagged with identity fraud
    pub const CON_IDENTITY_FRAUD: &str = "CON-004";

    /// Tor exit
    pub const NET_TOR: &str = "NET-001";
    /// VPN or proxy
    pub const NET_ANONYMIZER: &str = "NET-002";
    /// Datacenter IP
    pub const NET_HOSTING: &str = "NET-003";
    /// IP country differs from account country
    pub const NET_COUNTRY_MISMATCH: &str = "NET-004";
    /// High-risk jurisdiction
    pub const NET_HIGH_RISK_COUNTRY: &str = "NET-005";
    /// Non-routable client IP
    pub const NET_NON_PUBLIC_IP: &str = "NET-006";

    /// Local night time
    pub const BEH_NIGHT_TIME: &str = "BEH-001";
    /// First activity is a large amount
    pub const BEH_FIRST_ACTIVITY_LARGE: &str = "BEH-002";
    /// Young account paying out to a beneficiary
    pub const BEH_EARLY_PAYOUT: &str = "BEH-003";

    /// Several loan applications in a day
    pub const LND_APPLICATION_BURST: &str = "LND-001";
    /// Loan application without national id
    pub const LND_MISSING_NATIONAL_ID: &str = "LND-002";
    /// Fresh account withdrawing crypto
    pub const CRY_FRESH_WITHDRAWAL: &str = "CRY-001";
    /// Anonymized large crypto transfer
    pub const CRY_ANONYMIZED_LARGE: &str = "CRY-002";
    /// Card payment from a foreign IP
    pub const ECM_FOREIGN_CARD: &str = "ECM-001";
    /// Checkout bot on one device
    pub const ECM_DEVICE_CHECKOUT_BURST: &str = "ECM-002";
    /// Multi-accounting for bonuses
    pub const GAM_MULTI_ACCOUNT: &str = "GAM-001";
    /// Deposit burst
    pub const GAM_DEPOSIT_BURST: &str = "GAM-002";
}

pub(crate) fn define(
    id: &'static str,
    description: &'static str,
    base_score: f64,
    severity: Severity,
    category: RuleCategory,
    applicability: Applicability,
    predicate: RulePredicate,
) -> RuleDefinition {
    RuleDefinition {
        id,
        description,
        base_score,
        severity,
        category,
        applicability,
        predicate,
    }
}

/// Every built-in rule
pub fn all_rules() -> Vec<RuleDefinition> {
    let mut rules = Vec::new();
    rules.extend(amount::rules());
    rules.extend(account::rules());
    rules.extend(contact::rules());
    rules.extend(velocity::rules());
    rules.extend(device::rules());
    rules.extend(consortium::rules());
    rules.extend(network::rules());
    rules.extend(behavioral::rules());
    rules.extend(verticals::rules());
    rules
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_ids_follow_category_prefix() {
        let mut seen = HashSet::new();
        for rule in all_rules() {
            assert!(seen.insert(rule.id), "duplicate {}", rule.id);
            let (prefix, number) = rule.id.split_once('-').unwrap();
            assert_eq!(prefix.len(), 3, "{}", rule.id);
            assert_eq!(number.len(), 3, "{}", rule.id);
            assert!(number.chars().all(|c| c.is_ascii_digit()), "{}", rule.id);
            assert!(rule.base_score >= 0.0);
            assert!(!rule.description.is_empty());
        }
    }
}
