//! Vertical-specific rules: lending, crypto, e-commerce, gaming

use super::{define, ids};
use crate::rules::{Applicability, RuleCategory, RuleContext, RuleDefinition, RuleHit, RuleOutcome};
use crate::types::Severity;

const LENDING: Applicability = Applicability::Verticals(&["lending"]);
const CRYPTO: Applicability = Applicability::Verticals(&["crypto"]);
const ECOMMERCE: Applicability = Applicability::Verticals(&["ecommerce"]);
const GAMING: Applicability = Applicability::Verticals(&["gaming"]);

const LOAN_APPLICATIONS_PER_DAY: u64 = 2;
const FRESH_WITHDRAWAL_MAX_AGE_DAYS: i64 = 3;
const ANONYMIZED_CRYPTO_AMOUNT: f64 = 10_000.0;
const FOREIGN_CARD_AMOUNT: f64 = 1_000.0;
const DEVICE_CHECKOUTS_PER_HOUR: u64 = 5;
const GAMING_ACCOUNTS_PER_DEVICE: u64 = 3;
const DEPOSITS_PER_TEN_MINUTES: u64 = 3;

/// Vertical rules
pub fn rules() -> Vec<RuleDefinition> {
    vec![
        define(
            ids::LND_APPLICATION_BURST,
            "2 or more prior loan applications today",
            20.0,
            Severity::High,
            RuleCategory::Lending,
            LENDING,
            application_burst,
        ),
        define(
            ids::LND_MISSING_NATIONAL_ID,
            "Loan application without national id",
            10.0,
            Severity::Medium,
            RuleCategory::Lending,
            LENDING,
            missing_national_id,
        ),
        define(
            ids::CRY_FRESH_WITHDRAWAL,
            "Withdrawal from an account younger than 3 days",
            25.0,
            Severity::High,
            RuleCategory::Crypto,
            CRYPTO,
            fresh_withdrawal,
        ),
        define(
            ids::CRY_ANONYMIZED_LARGE,
            "10,000 or more over Tor, VPN or proxy",
            15.0,
            Severity::High,
            RuleCategory::Crypto,
            CRYPTO,
            anonymized_large,
        ),
        define(
            ids::ECM_FOREIGN_CARD,
            "Card payment of 1,000 or more from a foreign IP",
            10.0,
            Severity::Medium,
            RuleCategory::Ecommerce,
            ECOMMERCE,
            foreign_card,
        ),
        define(
            ids::ECM_DEVICE_CHECKOUT_BURST,
            "5 or more checkouts from one device within the hour",
            15.0,
            Severity::Medium,
            RuleCategory::Ecommerce,
            ECOMMERCE,
            device_checkout_burst,
        ),
        define(
            ids::GAM_MULTI_ACCOUNT,
            "3 or more accounts on one device within 7 days",
            20.0,
            Severity::High,
            RuleCategory::Gaming,
            GAMING,
            multi_account,
        ),
        define(
            ids::GAM_DEPOSIT_BURST,
            "3 or more prior deposits in 10 minutes",
            10.0,
            Severity::Medium,
            RuleCategory::Gaming,
            GAMING,
            deposit_burst,
        ),
    ]
}

fn application_burst(ctx: &RuleContext<'_>) -> anyhow::Result<RuleOutcome> {
    let count = ctx.user_velocity().day.count;
    Ok(RuleOutcome::when(count >= LOAN_APPLICATIONS_PER_DAY, || {
        RuleHit::new(format!("{} prior loan applications today", count)).with_meta("count", count)
    }))
}

fn missing_national_id(ctx: &RuleContext<'_>) -> anyhow::Result<RuleOutcome> {
    Ok(RuleOutcome::when(ctx.tx.national_id.is_none(), || {
        RuleHit::new("No national id on loan application")
    }))
}

fn fresh_withdrawal(ctx: &RuleContext<'_>) -> anyhow::Result<RuleOutcome> {
    let is_withdrawal = ctx
        .tx
        .payment_method
        .as_deref()
        .map(|m| m.eq_ignore_ascii_case("withdrawal"))
        .unwrap_or(false);
    if !is_withdrawal {
        return Ok(RuleOutcome::NotTriggered);
    }
    let Some(age) = ctx.account_age_days() else {
        return Ok(RuleOutcome::Inapplicable("no account creation date"));
    };
    Ok(RuleOutcome::when(age < FRESH_WITHDRAWAL_MAX_AGE_DAYS, || {
        RuleHit::new(format!("Withdrawal from a {}-day-old account", age))
    }))
}

fn anonymized_large(ctx: &RuleContext<'_>) -> anyhow::Result<RuleOutcome> {
    let Some(network) = ctx.network() else {
        return Ok(RuleOutcome::Inapplicable("no network attributes"));
    };
    Ok(RuleOutcome::when(
        (network.tor || network.vpn || network.proxy) && ctx.amount() >= ANONYMIZED_CRYPTO_AMOUNT,
        || RuleHit::new(format!("Anonymized transfer of {}", ctx.tx.amount)),
    ))
}

fn foreign_card(ctx: &RuleContext<'_>) -> anyhow::Result<RuleOutcome> {
    let is_card = ctx
        .tx
        .payment_method
        .as_deref()
        .map(|m| m.eq_ignore_ascii_case("card"))
        .unwrap_or(false);
    let (Some(country), Some(ip_country)) = (ctx.tx.country.as_deref(), ctx.tx.ip_country.as_deref()) else {
        return Ok(RuleOutcome::Inapplicable("country or IP country missing"));
    };
    Ok(RuleOutcome::when(
        is_card && ctx.amount() >= FOREIGN_CARD_AMOUNT && !country.eq_ignore_ascii_case(ip_country),
        || RuleHit::new(format!("{} card used from {}", country, ip_country)),
    ))
}

fn device_checkout_burst(ctx: &RuleContext<'_>) -> anyhow::Result<RuleOutcome> {
    let Some(device) = ctx.device_velocity() else {
        return Ok(RuleOutcome::Inapplicable("no device fingerprint"));
    };
    let count = device.hour.count;
    Ok(RuleOutcome::when(count >= DEVICE_CHECKOUTS_PER_HOUR, || {
        RuleHit::new(format!("{} checkouts from this device in the hour", count))
    }))
}

fn multi_account(ctx: &RuleContext<'_>) -> anyhow::Result<RuleOutcome> {
    let Some(peek) = ctx.velocity.device_users_week else {
        return Ok(RuleOutcome::Inapplicable("no device fingerprint"));
    };
    let accounts = peek.projected();
    Ok(RuleOutcome::when(accounts >= GAMING_ACCOUNTS_PER_DEVICE, || {
        RuleHit::new(format!("{} accounts on this device in 7d", accounts))
            .with_meta("accounts", accounts)
    }))
}

fn deposit_burst(ctx: &RuleContext<'_>) -> anyhow::Result<RuleOutcome> {
    let count = ctx.user_velocity().ten_minutes.count;
    Ok(RuleOutcome::when(count >= DEPOSITS_PER_TEN_MINUTES, || {
        RuleHit::new(format!("{} deposits in 10 minutes", count))
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::context::fixtures::ContextFixture;
    use crate::types::NetworkAttributes;
    use crate::velocity::DistinctPeek;
    use chrono::Duration;

    #[test]
    fn test_vertical_applicability() {
        for rule in rules() {
            let prefix = &rule.id[..3];
            let vertical = match prefix {
                "LND" => "lending",
                "CRY" => "crypto",
                "ECM" => "ecommerce",
                "GAM" => "gaming",
                other => panic!("unexpected prefix {}", other),
            };
            assert!(rule.applicability.applies_to(vertical));
            assert!(!rule.applicability.applies_to("remittance"));
        }
    }

    #[test]
    fn test_fresh_withdrawal() {
        let mut f = ContextFixture::new(500, "crypto");
        assert!(!fresh_withdrawal(&f.ctx()).unwrap().is_triggered());
        f.tx.payment_method = Some("withdrawal".to_string());
        assert!(matches!(fresh_withdrawal(&f.ctx()).unwrap(), RuleOutcome::Inapplicable(_)));
        f.tx.account_created_at = Some(f.tx.occurred_at - Duration::days(1));
        assert!(fresh_withdrawal(&f.ctx()).unwrap().is_triggered());
    }

    #[test]
    fn test_anonymized_large() {
        let mut f = ContextFixture::new(12_000, "crypto");
        f.tx.network = Some(NetworkAttributes {
            vpn: true,
            ..NetworkAttributes::default()
        });
        assert!(anonymized_large(&f.ctx()).unwrap().is_triggered());
    }

    #[test]
    fn test_multi_account() {
        let mut f = ContextFixture::new(50, "gaming");
        f.velocity.device_users_week = Some(DistinctPeek { count: 2, contains_member: false });
        assert!(multi_account(&f.ctx()).unwrap().is_triggered());
    }
}
