//! Evaluation context handed to every rule predicate

use crate::consortium::{ConsortiumSnapshot, ConsortiumView};
use crate::identity::IdentitySignals;
use crate::types::{DeviceAttributes, IdentifierKind, NetworkAttributes, Transaction};
use crate::velocity::{SubjectVelocity, VelocitySnapshot};
use chrono::{DateTime, Utc};
use rust_decimal::prelude::ToPrimitive;

/// Bumped whenever a field is added to or removed from [`RuleContext`]
pub const CONTEXT_VERSION: u32 = 1;

/// Read-only view a rule evaluates against.
///
/// Counters and consortium views were read before this transaction was
/// recorded, so they describe prior activity. Optional inputs are explicit:
/// a rule that needs one that is absent returns `Inapplicable`.
#[derive(Debug, Clone, Copy)]
pub struct RuleContext<'a> {
    /// Transaction under evaluation
    pub tx: &'a Transaction,
    /// Normalized vertical key
    pub vertical: &'a str,
    /// Evaluation clock
    pub now: DateTime<Utc>,
    /// Identity verification answer, when one was obtained
    pub identity: Option<&'a IdentitySignals>,
    /// Velocity counters
    pub velocity: &'a VelocitySnapshot,
    /// Consortium views
    pub consortium: &'a ConsortiumSnapshot,
}

impl<'a> RuleContext<'a> {
    /// Amount as f64 for threshold arithmetic
    pub fn amount(&self) -> f64 {
        self.tx.amount.to_f64().unwrap_or(0.0)
    }

    /// Account age in days
    pub fn account_age_days(&self) -> Option<i64> {
        self.tx.account_age_days()
    }

    /// Device enrichment
    pub fn device(&self) -> Option<&'a DeviceAttributes> {
        self.tx.device.as_ref()
    }

    /// Network enrichment
    pub fn network(&self) -> Option<&'a NetworkAttributes> {
        self.tx.network.as_ref()
    }

    /// User counters
    pub fn user_velocity(&self) -> &'a SubjectVelocity {
        &self.velocity.user
    }

    /// Device counters, when a fingerprint was supplied
    pub fn device_velocity(&self) -> Option<&'a SubjectVelocity> {
        self.velocity.device.as_ref()
    }

    /// Consortium view for one identifier kind
    pub fn consortium_view(&self, kind: IdentifierKind) -> Option<&'a ConsortiumView> {
        self.consortium.get(kind)
    }

    /// Vertical is one of `keys`
    pub fn is_vertical(&self, keys: &[&str]) -> bool {
        keys.iter().any(|k| *k == self.vertical)
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;
    use rust_decimal::Decimal;

    /// Owned inputs a test builds a context from
    pub struct ContextFixture {
        pub tx: Transaction,
        pub identity: Option<IdentitySignals>,
        pub velocity: VelocitySnapshot,
        pub consortium: ConsortiumSnapshot,
    }

    impl ContextFixture {
        pub fn new(amount: i64, vertical: &str) -> Self {
            Self {
                tx: Transaction::new("tx-1", "tenant-1", "user-1", Decimal::from(amount), "USD", vertical),
                identity: None,
                velocity: VelocitySnapshot {
                    available: true,
                    ..VelocitySnapshot::default()
                },
                consortium: ConsortiumSnapshot {
                    available: true,
                    ..ConsortiumSnapshot::default()
                },
            }
        }

        pub fn ctx(&self) -> RuleContext<'_> {
            RuleContext {
                tx: &self.tx,
                vertical: &self.tx.vertical,
                now: self.tx.occurred_at,
                identity: self.identity.as_ref(),
                velocity: &self.velocity,
                consortium: &self.consortium,
            }
        }
    }
}
