//! Frequency rules over prior activity

use super::{define, ids};
use crate::rules::{Applicability, RuleCategory, RuleContext, RuleDefinition, RuleHit, RuleOutcome};
use crate::types::{IdentifierKind, Severity};
use crate::velocity::VelocityWindow;
use rust_decimal::prelude::ToPrimitive;

// Prior transactions in the window, the current one not included
const MINUTE_LIMIT: u64 = 3;
const TEN_MINUTE_LIMIT: u64 = 5;
const HOURLY_LIMIT: u64 = 10;
const DAILY_LIMIT: u64 = 20;
const WEEKLY_LIMIT: u64 = 50;
const HOURLY_AMOUNT_LIMIT: f64 = 25_000.0;
const CONTACT_DAILY_LIMIT: u64 = 5;

/// Velocity rules
pub fn rules() -> Vec<RuleDefinition> {
    vec![
        define(
            ids::VEL_MINUTE,
            "3 or more prior transactions in the last minute",
            20.0,
            Severity::High,
            RuleCategory::Velocity,
            Applicability::All,
            minute_burst,
        ),
        define(
            ids::VEL_TEN_MINUTES,
            "5 or more prior transactions in 10 minutes",
            15.0,
            Severity::Medium,
            RuleCategory::Velocity,
            Applicability::All,
            ten_minute_burst,
        ),
        define(
            ids::VEL_HOURLY,
            "10 or more prior transactions in the hour",
            15.0,
            Severity::Medium,
            RuleCategory::Velocity,
            Applicability::All,
            hourly_count,
        ),
        define(
            ids::VEL_DAILY,
            "20 or more prior transactions in the day",
            10.0,
            Severity::Medium,
            RuleCategory::Velocity,
            Applicability::All,
            daily_count,
        ),
        define(
            ids::VEL_WEEKLY,
            "50 or more prior transactions in the week",
            10.0,
            Severity::Low,
            RuleCategory::Velocity,
            Applicability::All,
            weekly_count,
        ),
        define(
            ids::VEL_HOURLY_AMOUNT,
            "25,000 or more moved within the hour",
            15.0,
            Severity::Medium,
            RuleCategory::Velocity,
            Applicability::All,
            hourly_amount,
        ),
        define(
            ids::VEL_PHONE,
            "Phone number on 5 or more transactions today",
            15.0,
            Severity::Medium,
            RuleCategory::Velocity,
            Applicability::All,
            phone_reuse,
        ),
        define(
            ids::VEL_EMAIL,
            "Email address on 5 or more transactions today",
            15.0,
            Severity::Medium,
            RuleCategory::Velocity,
            Applicability::All,
            email_reuse,
        ),
    ]
}

fn user_count_over(ctx: &RuleContext<'_>, window: VelocityWindow, limit: u64) -> RuleOutcome {
    let count = ctx.user_velocity().get(window).count;
    RuleOutcome::when(count >= limit, || {
        RuleHit::new(format!("{} prior transactions in {}", count, window.label()))
            .with_meta("count", count)
            .with_meta("window", window.label())
    })
}

fn minute_burst(ctx: &RuleContext<'_>) -> anyhow::Result<RuleOutcome> {
    Ok(user_count_over(ctx, VelocityWindow::Minute, MINUTE_LIMIT))
}

fn ten_minute_burst(ctx: &RuleContext<'_>) -> anyhow::Result<RuleOutcome> {
    Ok(user_count_over(ctx, VelocityWindow::TenMinutes, TEN_MINUTE_LIMIT))
}

fn hourly_count(ctx: &RuleContext<'_>) -> anyhow::Result<RuleOutcome> {
    Ok(user_count_over(ctx, VelocityWindow::Hour, HOURLY_LIMIT))
}

fn daily_count(ctx: &RuleContext<'_>) -> anyhow::Result<RuleOutcome> {
    Ok(user_count_over(ctx, VelocityWindow::Day, DAILY_LIMIT))
}

fn weekly_count(ctx: &RuleContext<'_>) -> anyhow::Result<RuleOutcome> {
    Ok(user_count_over(ctx, VelocityWindow::Week, WEEKLY_LIMIT))
}

fn hourly_amount(ctx: &RuleContext<'_>) -> anyhow::Result<RuleOutcome> {
    let hour = ctx.user_velocity().hour;
    if hour.count == 0 {
        return Ok(RuleOutcome::NotTriggered);
    }
    let total = (hour.amount + ctx.tx.amount).to_f64().unwrap_or(0.0);
    Ok(RuleOutcome::when(total >= HOURLY_AMOUNT_LIMIT, || {
        RuleHit::new(format!("{:.2} moved within the hour", total)).with_meta("total_hour", total)
    }))
}

fn contact_reuse(ctx: &RuleContext<'_>, kind: IdentifierKind) -> RuleOutcome {
    let Some(velocity) = ctx.velocity.contact(kind) else {
        return RuleOutcome::Inapplicable("identifier not supplied");
    };
    let count = velocity.day.count;
    RuleOutcome::when(count >= CONTACT_DAILY_LIMIT, || {
        RuleHit::new(format!("{} used on {} prior transactions today", kind.as_str(), count))
            .with_meta("count", count)
    })
}

fn phone_reuse(ctx: &RuleContext<'_>) -> anyhow::Result<RuleOutcome> {
    Ok(contact_reuse(ctx, IdentifierKind::Phone))
}

fn email_reuse(ctx: &RuleContext<'_>) -> anyhow::Result<RuleOutcome> {
    Ok(contact_reuse(ctx, IdentifierKind::Email))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::context::fixtures::ContextFixture;
    use crate::velocity::{CounterValue, SubjectVelocity};
    use rust_decimal::Decimal;

    fn count(n: u64) -> CounterValue {
        CounterValue { count: n, amount: Decimal::ZERO }
    }

    #[test]
    fn test_limits_are_inclusive() {
        let mut f = ContextFixture::new(100, "ecommerce");
        f.velocity.user.minute = count(2);
        assert!(!minute_burst(&f.ctx()).unwrap().is_triggered());
        f.velocity.user.minute = count(3);
        assert!(minute_burst(&f.ctx()).unwrap().is_triggered());

        f.velocity.user.week = count(50);
        assert!(weekly_count(&f.ctx()).unwrap().is_triggered());
    }

    #[test]
    fn test_hourly_amount_includes_current() {
        let mut f = ContextFixture::new(15_000, "ecommerce");
        assert!(!hourly_amount(&f.ctx()).unwrap().is_triggered());
        f.velocity.user.hour = CounterValue { count: 1, amount: Decimal::from(10_000) };
        assert!(hourly_amount(&f.ctx()).unwrap().is_triggered());
    }

    #[test]
    fn test_contact_reuse() {
        let mut f = ContextFixture::new(100, "ecommerce");
        assert!(matches!(phone_reuse(&f.ctx()).unwrap(), RuleOutcome::Inapplicable(_)));
        f.velocity.email = Some(SubjectVelocity { day: count(7), ..SubjectVelocity::default() });
        assert!(email_reuse(&f.ctx()).unwrap().is_triggered());
    }
}
