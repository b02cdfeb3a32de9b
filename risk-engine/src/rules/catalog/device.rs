//! Device fingerprint rules
//!
//! Distinct-user counts are per `(tenant, device)` and projected to include
//! the current user, so the third user on a device reads as 3.

use super::{define, ids};
use crate::rules::{Applicability, RuleCategory, RuleContext, RuleDefinition, RuleHit, RuleOutcome};
use crate::types::Severity;

const SHARED_DEVICE_USERS: u64 = 3;
const SHARED_DEVICE_HIGH: u64 = 5;
const SHARED_DEVICE_CRITICAL: u64 = 8;
const SHARED_DEVICE_BASE: f64 = 25.0;
const SHARED_DEVICE_STEP: f64 = 5.0;
const SHARED_DEVICE_CAP: f64 = 50.0;
const SHARED_DEVICE_WEEK_USERS: u64 = 5;
const DEVICE_DAILY_APPLICATIONS: u64 = 10;
const FAST_SESSION_SECONDS: u32 = 10;

/// Device rules
pub fn rules() -> Vec<RuleDefinition> {
    vec![
        define(
            ids::DEV_SHARED_DEVICE,
            "3 or more users on one device within 24 hours",
            SHARED_DEVICE_BASE,
            Severity::Medium,
            RuleCategory::Device,
            Applicability::All,
            shared_device,
        ),
        define(
            ids::DEV_SHARED_DEVICE_WEEK,
            "5 or more users on one device within 7 days",
            20.0,
            Severity::Medium,
            RuleCategory::Device,
            Applicability::All,
            shared_device_week,
        ),
        define(
            ids::DEV_APPLICATION_RATE,
            "10 or more prior transactions from one device today",
            20.0,
            Severity::High,
            RuleCategory::Device,
            Applicability::All,
            application_rate,
        ),
        define(
            ids::DEV_EMULATOR,
            "Emulated device",
            25.0,
            Severity::High,
            RuleCategory::Device,
            Applicability::All,
            emulator,
        ),
        define(
            ids::DEV_ROOTED,
            "Rooted or jailbroken device",
            10.0,
            Severity::Medium,
            RuleCategory::Device,
            Applicability::All,
            rooted,
        ),
        define(
            ids::DEV_HEADLESS,
            "Headless or automated browser",
            30.0,
            Severity::High,
            RuleCategory::Device,
            Applicability::All,
            headless,
        ),
        define(
            ids::DEV_FAST_SESSION,
            "Submitted less than 10 seconds after session start",
            15.0,
            Severity::Medium,
            RuleCategory::Device,
            Applicability::All,
            fast_session,
        ),
        define(
            ids::DEV_MISSING_FINGERPRINT,
            "No device fingerprint on a lending or crypto transaction",
            10.0,
            Severity::Low,
            RuleCategory::Device,
            Applicability::Verticals(&["lending", "crypto"]),
            missing_fingerprint,
        ),
    ]
}

/// Severity tier for a distinct-user count
pub fn shared_device_severity(users: u64) -> Severity {
    if users >= SHARED_DEVICE_CRITICAL {
        Severity::Critical
    } else if users >= SHARED_DEVICE_HIGH {
        Severity::High
    } else {
        Severity::Medium
    }
}

fn shared_device(ctx: &RuleContext<'_>) -> anyhow::Result<RuleOutcome> {
    let Some(peek) = ctx.velocity.device_users_day else {
        return Ok(RuleOutcome::Inapplicable("no device fingerprint"));
    };
    let users = peek.projected();
    if users < SHARED_DEVICE_USERS {
        return Ok(RuleOutcome::NotTriggered);
    }
    let score = (SHARED_DEVICE_BASE + SHARED_DEVICE_STEP * (users - SHARED_DEVICE_USERS) as f64)
        .min(SHARED_DEVICE_CAP);
    Ok(RuleOutcome::Triggered(
        RuleHit::new(format!("{} distinct users on this device in 24h", users))
            .with_score(score)
            .with_severity(shared_device_severity(users))
            .with_meta("distinct_users", users),
    ))
}

fn shared_device_week(ctx: &RuleContext<'_>) -> anyhow::Result<RuleOutcome> {
    let Some(peek) = ctx.velocity.device_users_week else {
        return Ok(RuleOutcome::Inapplicable("no device fingerprint"));
    };
    let users = peek.projected();
    Ok(RuleOutcome::when(users >= SHARED_DEVICE_WEEK_USERS, || {
        RuleHit::new(format!("{} distinct users on this device in 7d", users))
            .with_meta("distinct_users", users)
    }))
}

fn application_rate(ctx: &RuleContext<'_>) -> anyhow::Result<RuleOutcome> {
    let Some(device) = ctx.device_velocity() else {
        return Ok(RuleOutcome::Inapplicable("no device fingerprint"));
    };
    let count = device.day.count;
    Ok(RuleOutcome::when(count >= DEVICE_DAILY_APPLICATIONS, || {
        RuleHit::new(format!("{} prior transactions from this device today", count))
            .with_meta("count", count)
    }))
}

fn emulator(ctx: &RuleContext<'_>) -> anyhow::Result<RuleOutcome> {
    let Some(device) = ctx.device() else {
        return Ok(RuleOutcome::Inapplicable("no device attributes"));
    };
    Ok(RuleOutcome::when(device.emulator, || RuleHit::new("Emulator detected")))
}

fn rooted(ctx: &RuleContext<'_>) -> anyhow::Result<RuleOutcome> {
    let Some(device) = ctx.device() else {
        return Ok(RuleOutcome::Inapplicable("no device attributes"));
    };
    Ok(RuleOutcome::when(device.rooted, || RuleHit::new("Rooted device")))
}

fn headless(ctx: &RuleContext<'_>) -> anyhow::Result<RuleOutcome> {
    let Some(device) = ctx.device() else {
        return Ok(RuleOutcome::Inapplicable("no device attributes"));
    };
    Ok(RuleOutcome::when(device.headless, || RuleHit::new("Headless browser")))
}

fn fast_session(ctx: &RuleContext<'_>) -> anyhow::Result<RuleOutcome> {
    let Some(seconds) = ctx.device().and_then(|d| d.session_duration_seconds) else {
        return Ok(RuleOutcome::Inapplicable("no session duration"));
    };
    Ok(RuleOutcome::when(seconds < FAST_SESSION_SECONDS, || {
        RuleHit::new(format!("Session lasted {}s", seconds)).with_meta("session_seconds", seconds)
    }))
}

fn missing_fingerprint(ctx: &RuleContext<'_>) -> anyhow::Result<RuleOutcome> {
    Ok(RuleOutcome::when(ctx.tx.device_fingerprint.is_none(), || {
        RuleHit::new("No device fingerprint supplied")
    }))
}
