//! Account and identity rules

use super::{define, ids};
use crate::rules::{Applicability, RuleCategory, RuleContext, RuleDefinition, RuleHit, RuleOutcome};
use crate::types::Severity;

const NEW_ACCOUNT_MAX_AGE_DAYS: i64 = 30;
const NEW_ACCOUNT_LARGE_AMOUNT: f64 = 50_000.0;
const NAME_MATCH_FLOOR: f64 = 0.6;
const NAME_MATCH_STRONG_MISMATCH: f64 = 0.3;

/// Account and identity rules
pub fn rules() -> Vec<RuleDefinition> {
    vec![
        define(
            ids::ACC_NEW_ACCOUNT_LARGE_AMOUNT,
            "Account younger than 30 days moving 50,000 or more",
            30.0,
            Severity::High,
            RuleCategory::Account,
            Applicability::All,
            new_account_large_amount,
        ),
        define(
            ids::ACC_BRAND_NEW,
            "Account opened less than a day ago",
            10.0,
            Severity::Medium,
            RuleCategory::Account,
            Applicability::All,
            brand_new_account,
        ),
        define(
            ids::ACC_UNVERIFIED,
            "Identity verification failed",
            25.0,
            Severity::High,
            RuleCategory::Account,
            Applicability::All,
            unverified_identity,
        ),
        define(
            ids::ACC_NAME_MISMATCH,
            "Account name does not match the verified identity",
            20.0,
            Severity::Medium,
            RuleCategory::Account,
            Applicability::All,
            name_mismatch,
        ),
        define(
            ids::ACC_WATCHLIST,
            "Sanctions, PEP or internal watchlist match",
            60.0,
            Severity::Critical,
            RuleCategory::Account,
            Applicability::All,
            watchlist,
        ),
    ]
}

fn new_account_large_amount(ctx: &RuleContext<'_>) -> anyhow::Result<RuleOutcome> {
    let Some(age) = ctx.account_age_days() else {
        return Ok(RuleOutcome::Inapplicable("no account creation date"));
    };
    Ok(RuleOutcome::when(
        age <= NEW_ACCOUNT_MAX_AGE_DAYS && ctx.amount() >= NEW_ACCOUNT_LARGE_AMOUNT,
        || {
            RuleHit::new(format!("{}-day-old account moving {}", age, ctx.tx.amount))
                .with_meta("account_age_days", age)
        },
    ))
}

fn brand_new_account(ctx: &RuleContext<'_>) -> anyhow::Result<RuleOutcome> {
    let Some(age) = ctx.account_age_days() else {
        return Ok(RuleOutcome::Inapplicable("no account creation date"));
    };
    Ok(RuleOutcome::when(age < 1, || RuleHit::new("Account opened today")))
}

fn unverified_identity(ctx: &RuleContext<'_>) -> anyhow::Result<RuleOutcome> {
    match ctx.identity.and_then(|i| i.identity_verified) {
        None => Ok(RuleOutcome::Inapplicable("identity not checked")),
        Some(verified) => Ok(RuleOutcome::when(!verified, || {
            RuleHit::new("Identity verification failed")
        })),
    }
}

fn name_mismatch(ctx: &RuleContext<'_>) -> anyhow::Result<RuleOutcome> {
    let Some(score) = ctx.identity.and_then(|i| i.name_match_score) else {
        return Ok(RuleOutcome::Inapplicable("no name match score"));
    };
    if !score.is_finite() {
        anyhow::bail!("name match score is not finite: {}", score);
    }
    Ok(RuleOutcome::when(score < NAME_MATCH_FLOOR, || {
        let confidence = if score < NAME_MATCH_STRONG_MISMATCH { 1.0 } else { 0.7 };
        RuleHit::new(format!("Name match score {:.2}", score))
            .with_confidence(confidence)
            .with_meta("name_match_score", score)
    }))
}

fn watchlist(ctx: &RuleContext<'_>) -> anyhow::Result<RuleOutcome> {
    let Some(identity) = ctx.identity else {
        return Ok(RuleOutcome::Inapplicable("identity not checked"));
    };
    Ok(RuleOutcome::when(identity.watchlist_hit, || {
        RuleHit::new("Watchlist match")
    }))
}
