//! Email and phone rules

use super::{define, ids};
use crate::identity::PhoneLineType;
use crate::rules::{Applicability, RuleCategory, RuleContext, RuleDefinition, RuleHit, RuleOutcome};
use crate::types::Severity;

const DISPOSABLE_DOMAINS: &[&str] = &[
    "mailinator.com",
    "guerrillamail.com",
    "10minutemail.com",
    "tempmail.com",
    "temp-mail.org",
    "yopmail.com",
    "trashmail.com",
    "sharklasers.com",
    "getnada.com",
    "dispostable.com",
    "throwawaymail.com",
    "maildrop.cc",
];

const YOUNG_EMAIL_DAYS: i64 = 30;
const NUMERIC_LOCAL_MIN_DIGITS: usize = 6;

/// Contact rules
pub fn rules() -> Vec<RuleDefinition> {
    vec![
        define(
            ids::CNT_DISPOSABLE_EMAIL,
            "Disposable email domain",
            20.0,
            Severity::Medium,
            RuleCategory::Contact,
            Applicability::All,
            disposable_email,
        ),
        define(
            ids::CNT_YOUNG_EMAIL,
            "Email address created within the last 30 days",
            15.0,
            Severity::Medium,
            RuleCategory::Contact,
            Applicability::All,
            young_email,
        ),
        define(
            ids::CNT_VIRTUAL_PHONE,
            "VoIP or prepaid phone line",
            15.0,
            Severity::Medium,
            RuleCategory::Contact,
            Applicability::All,
            virtual_phone,
        ),
        define(
            ids::CNT_NUMERIC_EMAIL,
            "Email local part dominated by digits",
            5.0,
            Severity::Low,
            RuleCategory::Contact,
            Applicability::All,
            numeric_email,
        ),
    ]
}

fn email_parts(email: &str) -> Option<(&str, &str)> {
    email.trim().rsplit_once('@')
}

fn disposable_email(ctx: &RuleContext<'_>) -> anyhow::Result<RuleOutcome> {
    let Some((_, domain)) = ctx.tx.email.as_deref().and_then(email_parts) else {
        return Ok(RuleOutcome::Inapplicable("no email"));
    };
    let domain = domain.to_ascii_lowercase();
    Ok(RuleOutcome::when(
        DISPOSABLE_DOMAINS.iter().any(|d| *d == domain),
        || RuleHit::new(format!("Disposable email domain {}", domain)).with_meta("domain", domain.clone()),
    ))
}

fn young_email(ctx: &RuleContext<'_>) -> anyhow::Result<RuleOutcome> {
    let Some(age) = ctx.identity.and_then(|i| i.email_age_days) else {
        return Ok(RuleOutcome::Inapplicable("no email age"));
    };
    Ok(RuleOutcome::when(age < YOUNG_EMAIL_DAYS, || {
        RuleHit::new(format!("Email address is {} days old", age)).with_meta("email_age_days", age)
    }))
}

fn virtual_phone(ctx: &RuleContext<'_>) -> anyhow::Result<RuleOutcome> {
    let Some(line) = ctx.identity.and_then(|i| i.phone_line_type) else {
        return Ok(RuleOutcome::Inapplicable("no phone line type"));
    };
    Ok(match line {
        PhoneLineType::Voip => RuleOutcome::Triggered(RuleHit::new("VoIP phone line")),
        PhoneLineType::Prepaid => {
            RuleOutcome::Triggered(RuleHit::new("Prepaid phone line").with_confidence(0.5))
        }
        _ => RuleOutcome::NotTriggered,
    })
}

fn numeric_email(ctx: &RuleContext<'_>) -> anyhow::Result<RuleOutcome> {
    let Some((local, _)) = ctx.tx.email.as_deref().and_then(email_parts) else {
        return Ok(RuleOutcome::Inapplicable("no email"));
    };
    let digits = local.chars().filter(|c| c.is_ascii_digit()).count();
    Ok(RuleOutcome::when(
        digits >= NUMERIC_LOCAL_MIN_DIGITS && digits * 2 > local.len(),
        || RuleHit::new("Email local part is mostly digits").with_confidence(0.6),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::IdentitySignals;
    use crate::rules::context::fixtures::ContextFixture;

    #[test]
    fn test_disposable_domain_case_insensitive() {
        let mut f = ContextFixture::new(100, "ecommerce");
        f.tx.email = Some("Someone@Mailinator.COM".to_string());
        assert!(disposable_email(&f.ctx()).unwrap().is_triggered());
        f.tx.email = Some("someone@example.com".to_string());
        assert!(!disposable_email(&f.ctx()).unwrap().is_triggered());
    }

    #[test]
    fn test_numeric_email() {
        let mut f = ContextFixture::new(100, "ecommerce");
        f.tx.email = Some("a83920174@example.com".to_string());
        assert!(numeric_email(&f.ctx()).unwrap().is_triggered());
        f.tx.email = Some("jane.doe1984@example.com".to_string());
        assert!(!numeric_email(&f.ctx()).unwrap().is_triggered());
    }

    #[test]
    fn test_phone_line_types() {
        let mut f = ContextFixture::new(100, "ecommerce");
        assert!(matches!(virtual_phone(&f.ctx()).unwrap(), RuleOutcome::Inapplicable(_)));

        f.identity = Some(IdentitySignals {
            phone_line_type: Some(PhoneLineType::Prepaid),
            email_age_days: Some(3),
            ..IdentitySignals::default()
        });
        let RuleOutcome::Triggered(hit) = virtual_phone(&f.ctx()).unwrap() else {
            panic!("expected trigger");
        };
        assert_eq!(hit.confidence, 0.5);
        assert!(young_email(&f.ctx()).unwrap().is_triggered());
    }
}
