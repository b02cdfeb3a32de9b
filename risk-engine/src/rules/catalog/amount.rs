//! Amount rules

use super::{define, ids};
use crate::rules::{Applicability, RuleCategory, RuleContext, RuleDefinition, RuleHit, RuleOutcome};
use crate::types::Severity;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;

const LARGE_AMOUNT: f64 = 10_000.0;
const VERY_LARGE_AMOUNT: f64 = 100_000.0;
const ROUND_AMOUNT_MIN: i64 = 1_000;
const STRUCTURING_FLOOR: f64 = 9_000.0;
const SPIKE_MULTIPLIER: f64 = 5.0;
const SPIKE_MIN_HISTORY: u64 = 3;
const MICRO_AMOUNT: f64 = 2.0;
const DAILY_CUMULATIVE_LIMIT: f64 = 50_000.0;

/// Amount rules
pub fn rules() -> Vec<RuleDefinition> {
    vec![
        define(
            ids::AMT_LARGE,
            "Amount at or above 10,000",
            10.0,
            Severity::Low,
            RuleCategory::Amount,
            Applicability::All,
            large_amount,
        ),
        define(
            ids::AMT_VERY_LARGE,
            "Amount at or above 100,000",
            20.0,
            Severity::Medium,
            RuleCategory::Amount,
            Applicability::All,
            very_large_amount,
        ),
        define(
            ids::AMT_ROUND,
            "Round amount in whole thousands",
            5.0,
            Severity::Low,
            RuleCategory::Amount,
            Applicability::All,
            round_amount,
        ),
        define(
            ids::AMT_STRUCTURING,
            "Amount just below the 10,000 reporting threshold",
            15.0,
            Severity::Medium,
            RuleCategory::Amount,
            Applicability::All,
            structuring,
        ),
        define(
            ids::AMT_SPIKE,
            "Amount far above the user's weekly average",
            15.0,
            Severity::Medium,
            RuleCategory::Amount,
            Applicability::All,
            amount_spike,
        ),
        define(
            ids::AMT_MICRO,
            "Tiny card payment, typical of card testing",
            8.0,
            Severity::Low,
            RuleCategory::Amount,
            Applicability::All,
            micro_amount,
        ),
        define(
            ids::AMT_DAILY_CUMULATIVE,
            "Cumulative daily amount at or above 50,000",
            15.0,
            Severity::Medium,
            RuleCategory::Amount,
            Applicability::All,
            daily_cumulative,
        ),
    ]
}

fn large_amount(ctx: &RuleContext<'_>) -> anyhow::Result<RuleOutcome> {
    let amount = ctx.amount();
    Ok(RuleOutcome::when(
        (LARGE_AMOUNT..VERY_LARGE_AMOUNT).contains(&amount),
        || RuleHit::new(format!("Large amount {}", ctx.tx.amount)).with_meta("amount", amount),
    ))
}

fn very_large_amount(ctx: &RuleContext<'_>) -> anyhow::Result<RuleOutcome> {
    let amount = ctx.amount();
    Ok(RuleOutcome::when(amount >= VERY_LARGE_AMOUNT, || {
        RuleHit::new(format!("Very large amount {}", ctx.tx.amount)).with_meta("amount", amount)
    }))
}

fn round_amount(ctx: &RuleContext<'_>) -> anyhow::Result<RuleOutcome> {
    let amount = ctx.tx.amount;
    let thousand = Decimal::from(ROUND_AMOUNT_MIN);
    Ok(RuleOutcome::when(
        amount >= thousand && (amount % thousand).is_zero(),
        || RuleHit::new(format!("Round amount {}", amount.normalize())).with_confidence(0.5),
    ))
}

fn structuring(ctx: &RuleContext<'_>) -> anyhow::Result<RuleOutcome> {
    let amount = ctx.amount();
    if !(STRUCTURING_FLOOR..LARGE_AMOUNT).contains(&amount) {
        return Ok(RuleOutcome::NotTriggered);
    }
    let prior_today = ctx.user_velocity().day.count;
    // A single sub-threshold amount is weak; repeats the same day are not
    let confidence = if prior_today >= 2 { 1.0 } else { 0.6 };
    Ok(RuleOutcome::Triggered(
        RuleHit::new(format!(
            "Amount {} just below reporting threshold, {} prior today",
            ctx.tx.amount, prior_today
        ))
        .with_confidence(confidence)
        .with_meta("prior_today", prior_today),
    ))
}

fn amount_spike(ctx: &RuleContext<'_>) -> anyhow::Result<RuleOutcome> {
    let week = ctx.user_velocity().week;
    if week.count < SPIKE_MIN_HISTORY {
        return Ok(RuleOutcome::Inapplicable("not enough history"));
    }
    let average = (week.amount / Decimal::from(week.count)).to_f64().unwrap_or(0.0);
    if average <= 0.0 {
        return Ok(RuleOutcome::Inapplicable("no positive history"));
    }
    let ratio = ctx.amount() / average;
    Ok(RuleOutcome::when(ratio >= SPIKE_MULTIPLIER, || {
        RuleHit::new(format!("Amount is {:.1}x the weekly average", ratio))
            .with_meta("weekly_average", average)
            .with_meta("ratio", ratio)
    }))
}

fn micro_amount(ctx: &RuleContext<'_>) -> anyhow::Result<RuleOutcome> {
    let Some(method) = ctx.tx.payment_method.as_deref() else {
        return Ok(RuleOutcome::Inapplicable("no payment method"));
    };
    Ok(RuleOutcome::when(
        method.eq_ignore_ascii_case("card") && ctx.amount() < MICRO_AMOUNT,
        || RuleHit::new(format!("Card payment of {}", ctx.tx.amount)),
    ))
}

fn daily_cumulative(ctx: &RuleContext<'_>) -> anyhow::Result<RuleOutcome> {
    let total = ctx.user_velocity().day.amount + ctx.tx.amount;
    let total_f = total.to_f64().unwrap_or(0.0);
    Ok(RuleOutcome::when(
        total_f >= DAILY_CUMULATIVE_LIMIT && ctx.user_velocity().day.count > 0,
        || RuleHit::new(format!("Cumulative amount today {}", total)).with_meta("total_today", total_f),
    ))
}
