//! Network and geography rules

use super::{define, ids};
use crate::rules::{Applicability, RuleCategory, RuleContext, RuleDefinition, RuleHit, RuleOutcome};
use crate::types::Severity;
use std::net::IpAddr;

/// FATF call-for-action and increased-monitoring jurisdictions most tenants block
const HIGH_RISK_COUNTRIES: &[&str] = &["KP", "IR", "MM", "SY", "YE", "AF", "SS", "VE"];

/// Network rules
pub fn rules() -> Vec<RuleDefinition> {
    vec![
        define(
            ids::NET_TOR,
            "Tor exit node",
            30.0,
            Severity::High,
            RuleCategory::Network,
            Applicability::All,
            tor,
        ),
        define(
            ids::NET_ANONYMIZER,
            "VPN or proxy",
            10.0,
            Severity::Medium,
            RuleCategory::Network,
            Applicability::All,
            anonymizer,
        ),
        define(
            ids::NET_HOSTING,
            "Datacenter or hosting provider IP",
            15.0,
            Severity::Medium,
            RuleCategory::Network,
            Applicability::All,
            hosting,
        ),
        define(
            ids::NET_COUNTRY_MISMATCH,
            "IP country differs from account country",
            10.0,
            Severity::Medium,
            RuleCategory::Network,
            Applicability::All,
            country_mismatch,
        ),
        define(
            ids::NET_HIGH_RISK_COUNTRY,
            "High-risk jurisdiction",
            25.0,
            Severity::High,
            RuleCategory::Network,
            Applicability::All,
            high_risk_country,
        ),
        define(
            ids::NET_NON_PUBLIC_IP,
            "Client IP is private, loopback or unspecified",
            5.0,
            Severity::Low,
            RuleCategory::Network,
            Applicability::All,
            non_public_ip,
        ),
    ]
}

fn tor(ctx: &RuleContext<'_>) -> anyhow::Result<RuleOutcome> {
    let Some(network) = ctx.network() else {
        return Ok(RuleOutcome::Inapplicable("no network attributes"));
    };
    Ok(RuleOutcome::when(network.tor, || RuleHit::new("Tor exit node")))
}

fn anonymizer(ctx: &RuleContext<'_>) -> anyhow::Result<RuleOutcome> {
    let Some(network) = ctx.network() else {
        return Ok(RuleOutcome::Inapplicable("no network attributes"));
    };
    Ok(RuleOutcome::when(network.vpn || network.proxy, || {
        RuleHit::new(if network.vpn { "VPN connection" } else { "Proxy connection" })
    }))
}

fn hosting(ctx: &RuleContext<'_>) -> anyhow::Result<RuleOutcome> {
    let Some(network) = ctx.network() else {
        return Ok(RuleOutcome::Inapplicable("no network attributes"));
    };
    Ok(RuleOutcome::when(network.hosting, || RuleHit::new("Hosting provider IP")))
}

fn country_mismatch(ctx: &RuleContext<'_>) -> anyhow::Result<RuleOutcome> {
    let (Some(country), Some(ip_country)) = (ctx.tx.country.as_deref(), ctx.tx.ip_country.as_deref()) else {
        return Ok(RuleOutcome::Inapplicable("country or IP country missing"));
    };
    Ok(RuleOutcome::when(!country.trim().eq_ignore_ascii_case(ip_country.trim()), || {
        RuleHit::new(format!("Account country {} but IP in {}", country, ip_country))
            .with_meta("country", country)
            .with_meta("ip_country", ip_country)
    }))
}

fn high_risk_country(ctx: &RuleContext<'_>) -> anyhow::Result<RuleOutcome> {
    let flagged = [ctx.tx.country.as_deref(), ctx.tx.ip_country.as_deref()]
        .into_iter()
        .flatten()
        .map(|c| c.trim().to_ascii_uppercase())
        .find(|c| HIGH_RISK_COUNTRIES.contains(&c.as_str()));
    Ok(match flagged {
        Some(country) => RuleOutcome::Triggered(
            RuleHit::new(format!("High-risk jurisdiction {}", country)).with_meta("country", country),
        ),
        None => RuleOutcome::NotTriggered,
    })
}

fn non_public_ip(ctx: &RuleContext<'_>) -> anyhow::Result<RuleOutcome> {
    let Some(raw) = ctx.tx.ip_address.as_deref() else {
        return Ok(RuleOutcome::Inapplicable("no IP address"));
    };
    let ip: IpAddr = raw.trim().parse()?;
    let non_public = match ip {
        IpAddr::V4(v4) => v4.is_private() || v4.is_loopback() || v4.is_unspecified() || v4.is_link_local(),
        IpAddr::V6(v6) => v6.is_loopback() || v6.is_unspecified(),
    };
    Ok(RuleOutcome::when(non_public, || {
        RuleHit::new(format!("Non-routable client IP {}", ip))
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::context::fixtures::ContextFixture;
    use crate::types::NetworkAttributes;

    #[test]
    fn test_anonymizers() {
        let mut f = ContextFixture::new(100, "crypto");
        assert!(matches!(tor(&f.ctx()).unwrap(), RuleOutcome::Inapplicable(_)));
        f.tx.network = Some(NetworkAttributes {
            proxy: true,
            ..NetworkAttributes::default()
        });
        assert!(!tor(&f.ctx()).unwrap().is_triggered());
        assert!(anonymizer(&f.ctx()).unwrap().is_triggered());
    }

    #[test]
    fn test_country_rules() {
        let mut f = ContextFixture::new(100, "ecommerce");
        assert!(matches!(country_mismatch(&f.ctx()).unwrap(), RuleOutcome::Inapplicable(_)));
        f.tx.country = Some("NG".to_string());
        f.tx.ip_country = Some("ng".to_string());
        assert!(!country_mismatch(&f.ctx()).unwrap().is_triggered());
        f.tx.ip_country = Some("ir".to_string());
        assert!(country_mismatch(&f.ctx()).unwrap().is_triggered());
        assert!(high_risk_country(&f.ctx()).unwrap().is_triggered());
    }

    #[test]
    fn test_non_public_ip() {
        let mut f = ContextFixture::new(100, "ecommerce");
        f.tx.ip_address = Some("10.1.2.3".to_string());
        assert!(non_public_ip(&f.ctx()).unwrap().is_triggered());
        f.tx.ip_address = Some("203.0.113.9".to_string());
        assert!(!non_public_ip(&f.ctx()).unwrap().is_triggered());
        f.tx.ip_address = Some("not-an-ip".to_string());
        assert!(non_public_ip(&f.ctx()).is_err());
    }
}
