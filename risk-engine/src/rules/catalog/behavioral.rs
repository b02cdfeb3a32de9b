//! Timing and behaviour rules

use super::{define, ids};
use crate::rules::{Applicability, RuleCategory, RuleContext, RuleDefinition, RuleHit, RuleOutcome};
use crate::types::Severity;
use chrono::Timelike;

const NIGHT_START_HOUR: u32 = 1;
const NIGHT_END_HOUR: u32 = 5;
const FIRST_ACTIVITY_LARGE: f64 = 5_000.0;
const EARLY_PAYOUT_MAX_AGE_DAYS: i64 = 7;
const EARLY_PAYOUT_AMOUNT: f64 = 1_000.0;

/// Behavioural rules
pub fn rules() -> Vec<RuleDefinition> {
    vec![
        define(
            ids::BEH_NIGHT_TIME,
            "Transaction between 01:00 and 05:00 device-local time",
            5.0,
            Severity::Low,
            RuleCategory::Behavioral,
            Applicability::All,
            night_time,
        ),
        define(
            ids::BEH_FIRST_ACTIVITY_LARGE,
            "First transaction this week is 5,000 or more",
            10.0,
            Severity::Medium,
            RuleCategory::Behavioral,
            Applicability::All,
            first_activity_large,
        ),
        define(
            ids::BEH_EARLY_PAYOUT,
            "Account younger than 7 days paying 1,000 or more to a beneficiary",
            15.0,
            Severity::Medium,
            RuleCategory::Behavioral,
            Applicability::All,
            early_payout,
        ),
    ]
}

fn night_time(ctx: &RuleContext<'_>) -> anyhow::Result<RuleOutcome> {
    let local = ctx.tx.local_time();
    let hour = local.hour();
    Ok(RuleOutcome::when(
        (NIGHT_START_HOUR..NIGHT_END_HOUR).contains(&hour),
        || {
            RuleHit::new(format!("Local time {:02}:{:02}", hour, local.minute()))
                .with_confidence(0.5)
                .with_meta("local_hour", hour)
        },
    ))
}

fn first_activity_large(ctx: &RuleContext<'_>) -> anyhow::Result<RuleOutcome> {
    Ok(RuleOutcome::when(
        ctx.user_velocity().week.count == 0 && ctx.amount() >= FIRST_ACTIVITY_LARGE,
        || RuleHit::new(format!("First activity this week is {}", ctx.tx.amount)),
    ))
}

fn early_payout(ctx: &RuleContext<'_>) -> anyhow::Result<RuleOutcome> {
    if ctx.tx.beneficiary_id.is_none() {
        return Ok(RuleOutcome::Inapplicable("no beneficiary"));
    }
    let Some(age) = ctx.account_age_days() else {
        return Ok(RuleOutcome::Inapplicable("no account creation date"));
    };
    Ok(RuleOutcome::when(
        age < EARLY_PAYOUT_MAX_AGE_DAYS && ctx.amount() >= EARLY_PAYOUT_AMOUNT,
        || RuleHit::new(format!("{}-day-old account paying out {}", age, ctx.tx.amount)),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::context::fixtures::ContextFixture;
    use crate::types::DeviceAttributes;
    use chrono::{Duration, TimeZone, Utc};

    #[test]
    fn test_night_time_uses_device_offset() {
        let mut f = ContextFixture::new(100, "ecommerce");
        f.tx.occurred_at = Utc.with_ymd_and_hms(2024, 5, 1, 23, 30, 0).unwrap();
        assert!(!night_time(&f.ctx()).unwrap().is_triggered());

        // UTC+3 puts 23:30 UTC at 02:30 local
        f.tx.device = Some(DeviceAttributes {
            timezone_offset_minutes: Some(180),
            ..DeviceAttributes::default()
        });
        assert!(night_time(&f.ctx()).unwrap().is_triggered());
    }

    #[test]
    fn test_early_payout() {
        let mut f = ContextFixture::new(2_000, "remittance");
        assert!(matches!(early_payout(&f.ctx()).unwrap(), RuleOutcome::Inapplicable(_)));
        f.tx.beneficiary_id = Some("ben-1".to_string());
        f.tx.account_created_at = Some(f.tx.occurred_at - Duration::days(2));
        assert!(early_payout(&f.ctx()).unwrap().is_triggered());
    }

    #[test]
    fn test_first_activity_large() {
        let f = ContextFixture::new(6_000, "ecommerce");
        assert!(first_activity_large(&f.ctx()).unwrap().is_triggered());
        let f = ContextFixture::new(60, "ecommerce");
        assert!(!first_activity_large(&f.ctx()).unwrap().is_triggered());
    }
}
