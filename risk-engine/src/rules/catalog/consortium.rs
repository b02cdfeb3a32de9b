//! Consortium rules
//!
//! Any confirmed fraud on the device or a contact identifier forces
//! `Critical`, whatever the tenant count.

use super::{define, ids};
use crate::consortium::ConsortiumView;
use crate::rules::{Applicability, RuleCategory, RuleContext, RuleDefinition, RuleHit, RuleOutcome};
use crate::types::{FraudType, IdentifierKind, Severity};
use rust_decimal::prelude::ToPrimitive;

const STACKING_TENANTS: u64 = 3;
const IMPLICATED_AMOUNT: f64 = 50_000.0;

/// Consortium rules
pub fn rules() -> Vec<RuleDefinition> {
    vec![
        define(
            ids::CON_DEVICE_STACKING,
            "Device seen at 3 or more tenants within the window, or tied to confirmed fraud",
            40.0,
            Severity::High,
            RuleCategory::Consortium,
            Applicability::All,
            device_stacking,
        ),
        define(
            ids::CON_CONTACT_REUSE,
            "Phone, email or national id seen at 3 or more tenants, or tied to confirmed fraud",
            35.0,
            Severity::High,
            RuleCategory::Consortium,
            Applicability::All,
            contact_reuse,
        ),
        define(
            ids::CON_AMOUNT_IMPLICATED,
            "Identifier implicated in 50,000 or more of confirmed fraud",
            15.0,
            Severity::High,
            RuleCategory::Consortium,
            Applicability::All,
            amount_implicated,
        ),
        define(
            ids::CON_IDENTITY_FRAUD,
            "Identifier tagged with identity theft or synthetic identity",
            20.0,
            Severity::Critical,
            RuleCategory::Consortium,
            Applicability::All,
            identity_fraud,
        ),
    ]
}

fn cross_tenant_hit(view: &ConsortiumView, label: &str) -> Option<RuleHit> {
    if view.has_confirmed_fraud() {
        return Some(
            RuleHit::new(format!(
                "{} tied to {} confirmed fraud report(s)",
                label, view.confirmed_fraud_count
            ))
            .with_severity(Severity::Critical)
            .with_meta("confirmed_fraud_count", view.confirmed_fraud_count)
            .with_meta("distinct_tenants", view.distinct_tenants),
        );
    }
    if view.distinct_tenants >= STACKING_TENANTS {
        return Some(
            RuleHit::new(format!("{} seen at {} tenants", label, view.distinct_tenants))
                .with_meta("distinct_tenants", view.distinct_tenants),
        );
    }
    None
}

fn device_stacking(ctx: &RuleContext<'_>) -> anyhow::Result<RuleOutcome> {
    if ctx.tx.device_fingerprint.is_none() {
        return Ok(RuleOutcome::Inapplicable("no device fingerprint"));
    }
    let hit = ctx
        .consortium_view(IdentifierKind::Device)
        .and_then(|view| cross_tenant_hit(view, "Device"));
    Ok(hit.map(RuleOutcome::Triggered).unwrap_or(RuleOutcome::NotTriggered))
}

fn contact_reuse(ctx: &RuleContext<'_>) -> anyhow::Result<RuleOutcome> {
    // Strongest contact wins: fraud first, then the widest spread
    let worst = ctx.consortium.contacts().max_by_key(|v| (v.confirmed_fraud_count > 0, v.distinct_tenants));
    let hit = worst.and_then(|view| {
        cross_tenant_hit(view, view.kind.as_str())
            .map(|hit| hit.with_meta("identifier", view.kind.as_str()))
    });
    Ok(hit.map(RuleOutcome::Triggered).unwrap_or(RuleOutcome::NotTriggered))
}

fn amount_implicated(ctx: &RuleContext<'_>) -> anyhow::Result<RuleOutcome> {
    let max = ctx
        .consortium
        .views
        .values()
        .map(|v| v.total_amount_implicated.to_f64().unwrap_or(0.0))
        .fold(0.0_f64, f64::max);
    Ok(RuleOutcome::when(max >= IMPLICATED_AMOUNT, || {
        RuleHit::new(format!("Identifier implicated in {:.2} of confirmed fraud", max))
            .with_meta("amount_implicated", max)
    }))
}

fn identity_fraud(ctx: &RuleContext<'_>) -> anyhow::Result<RuleOutcome> {
    let tagged = ctx.consortium.views.values().find(|v| {
        v.fraud_types
            .iter()
            .any(|t| matches!(t, FraudType::IdentityTheft | FraudType::SyntheticIdentity))
    });
    Ok(match tagged {
        Some(view) => RuleOutcome::Triggered(
            RuleHit::new(format!("{} tagged with identity fraud", view.kind.as_str()))
                .with_meta("identifier", view.kind.as_str()),
        ),
        None => RuleOutcome::NotTriggered,
    })
}
