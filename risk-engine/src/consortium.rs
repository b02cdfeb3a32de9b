//! Cross-tenant consortium intelligence
//!
//! Records are keyed by one-way identifier hashes and carry opaque tenant
//! tokens, never raw identifiers or tenant ids. Sightings and fraud
//! confirmations are single-key upserts.

use crate::hashing::IdentifierHash;
use crate::types::{FraudType, IdentifierKind};
use crate::{Error, Result};
use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use dashmap::DashMap;
use futures::future::join_all;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Aggregate knowledge about one hashed identifier
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsortiumRecord {
    /// Record key
    pub identifier_hash: IdentifierHash,
    /// Identifier kind
    pub kind: IdentifierKind,
    /// Last sighting per tenant token
    pub tenant_last_seen: BTreeMap<String, DateTime<Utc>>,
    /// Sightings across all tenants
    pub sightings: u64,
    /// Confirmed fraud reports
    pub confirmed_fraud_count: u64,
    /// Sum of amounts on confirmed fraud
    pub total_amount_implicated: Decimal,
    /// Fraud categories reported
    pub fraud_types: BTreeSet<FraudType>,
    /// Opaque tokens of the reports already counted
    #[serde(default)]
    pub fraud_reports: BTreeSet<String>,
    /// First sighting
    pub first_seen: DateTime<Utc>,
    /// Latest sighting or confirmation
    pub last_seen: DateTime<Utc>,
}

impl ConsortiumRecord {
    /// Empty record created on first contact
    pub fn new(identifier_hash: IdentifierHash, kind: IdentifierKind, at: DateTime<Utc>) -> Self {
        Self {
            identifier_hash,
            kind,
            tenant_last_seen: BTreeMap::new(),
            sightings: 0,
            confirmed_fraud_count: 0,
            total_amount_implicated: Decimal::ZERO,
            fraud_types: BTreeSet::new(),
            fraud_reports: BTreeSet::new(),
            first_seen: at,
            last_seen: at,
        }
    }

    /// Record a sighting by a tenant
    pub fn observe(&mut self, tenant_token: &str, at: DateTime<Utc>) {
        let seen = self.tenant_last_seen.entry(tenant_token.to_string()).or_insert(at);
        if at > *seen {
            *seen = at;
        }
        self.sightings += 1;
        self.first_seen = self.first_seen.min(at);
        self.last_seen = self.last_seen.max(at);
    }

    /// Record a confirmed fraud. A report already counted is ignored and
    /// returns false.
    pub fn confirm_fraud(
        &mut self,
        report: &str,
        fraud_type: Option<FraudType>,
        amount: Decimal,
        at: DateTime<Utc>,
    ) -> bool {
        if !self.fraud_reports.insert(report.to_string()) {
            return false;
        }
        self.confirmed_fraud_count += 1;
        self.total_amount_implicated += amount.max(Decimal::ZERO);
        if let Some(fraud_type) = fraud_type {
            self.fraud_types.insert(fraud_type);
        }
        self.last_seen = self.last_seen.max(at);
        true
    }

    /// Tenants with a sighting at or after `since`
    pub fn distinct_tenants_since(&self, since: DateTime<Utc>) -> usize {
        self.tenant_last_seen.values().filter(|t| **t >= since).count()
    }

    /// What a rule evaluating for `tenant_token` may see
    pub fn view(&self, tenant_token: &str, window: ChronoDuration, now: DateTime<Utc>) -> ConsortiumView {
        let since = now - window;
        let current_in_window = self
            .tenant_last_seen
            .get(tenant_token)
            .map(|t| *t >= since)
            .unwrap_or(false);
        let others = self.distinct_tenants_since(since) - usize::from(current_in_window);
        ConsortiumView {
            kind: self.kind,
            distinct_tenants: others as u64 + 1,
            seen_by_current_tenant: self.tenant_last_seen.contains_key(tenant_token),
            confirmed_fraud_count: self.confirmed_fraud_count,
            total_amount_implicated: self.total_amount_implicated,
            fraud_types: self.fraud_types.iter().copied().collect(),
            sightings: self.sightings,
            first_seen: self.first_seen,
            last_seen: self.last_seen,
        }
    }

    /// Nothing worth keeping past the retention horizon
    pub fn is_prunable(&self, older_than: DateTime<Utc>) -> bool {
        self.confirmed_fraud_count == 0 && self.last_seen < older_than
    }
}

/// Read-only projection of a record for the rules
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsortiumView {
    /// Identifier kind
    pub kind: IdentifierKind,
    /// Distinct tenants within the window, the current one included
    pub distinct_tenants: u64,
    /// The current tenant has seen this identifier before
    pub seen_by_current_tenant: bool,
    /// Confirmed fraud reports
    pub confirmed_fraud_count: u64,
    /// Sum of amounts on confirmed fraud
    pub total_amount_implicated: Decimal,
    /// Fraud categories reported
    pub fraud_types: Vec<FraudType>,
    /// Sightings across all tenants
    pub sightings: u64,
    /// First sighting
    pub first_seen: DateTime<Utc>,
    /// Latest sighting or confirmation
    pub last_seen: DateTime<Utc>,
}

impl ConsortiumView {
    /// Any confirmed fraud on record
    pub fn has_confirmed_fraud(&self) -> bool {
        self.confirmed_fraud_count > 0
    }
}

/// Consortium views for the identifiers on one transaction
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConsortiumSnapshot {
    /// False when any lookup failed
    pub available: bool,
    /// Views for identifiers with a record
    pub views: BTreeMap<IdentifierKind, ConsortiumView>,
}

impl ConsortiumSnapshot {
    /// View for a kind
    pub fn get(&self, kind: IdentifierKind) -> Option<&ConsortiumView> {
        self.views.get(&kind)
    }

    /// Phone, email and national id views
    pub fn contacts(&self) -> impl Iterator<Item = &ConsortiumView> {
        self.views
            .iter()
            .filter(|(kind, _)| **kind != IdentifierKind::Device)
            .map(|(_, view)| view)
    }

    /// Largest distinct-tenant count across all identifiers
    pub fn max_distinct_tenants(&self) -> u64 {
        self.views.values().map(|v| v.distinct_tenants).max().unwrap_or(0)
    }
}

/// Consortium record store. Each operation touches exactly one key.
#[async_trait]
pub trait ConsortiumStore: Send + Sync {
    /// Fetch a record
    async fn lookup(&self, hash: &IdentifierHash) -> Result<Option<ConsortiumRecord>>;

    /// Upsert a sighting
    async fn observe(
        &self,
        hash: &IdentifierHash,
        kind: IdentifierKind,
        tenant_token: &str,
        at: DateTime<Utc>,
    ) -> Result<()>;

    /// Upsert a fraud confirmation, at most once per report token.
    /// Returns false when the report was already counted.
    async fn confirm_fraud(
        &self,
        hash: &IdentifierHash,
        kind: IdentifierKind,
        report: &str,
        fraud_type: Option<FraudType>,
        amount: Decimal,
        at: DateTime<Utc>,
    ) -> Result<bool>;

    /// Remove prunable records, returning how many went
    async fn prune(&self, older_than: DateTime<Utc>) -> Result<usize>;
}

/// In-process consortium store
#[derive(Default)]
pub struct InMemoryConsortiumStore {
    records: DashMap<IdentifierHash, ConsortiumRecord>,
}

impl InMemoryConsortiumStore {
    /// Create new store
    pub fn new() -> Self {
        Self::default()
    }

    /// Records held
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// No records held
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[async_trait]
impl ConsortiumStore for InMemoryConsortiumStore {
    async fn lookup(&self, hash: &IdentifierHash) -> Result<Option<ConsortiumRecord>> {
        Ok(self.records.get(hash).map(|r| r.clone()))
    }

    async fn observe(
        &self,
        hash: &IdentifierHash,
        kind: IdentifierKind,
        tenant_token: &str,
        at: DateTime<Utc>,
    ) -> Result<()> {
        self.records
            .entry(hash.clone())
            .or_insert_with(|| ConsortiumRecord::new(hash.clone(), kind, at))
            .observe(tenant_token, at);
        Ok(())
    }

    async fn confirm_fraud(
        &self,
        hash: &IdentifierHash,
        kind: IdentifierKind,
        report: &str,
        fraud_type: Option<FraudType>,
        amount: Decimal,
        at: DateTime<Utc>,
    ) -> Result<bool> {
        Ok(self
            .records
            .entry(hash.clone())
            .or_insert_with(|| ConsortiumRecord::new(hash.clone(), kind, at))
            .confirm_fraud(report, fraud_type, amount, at))
    }

    async fn prune(&self, older_than: DateTime<Utc>) -> Result<usize> {
        let before = self.records.len();
        self.records.retain(|_, record| !record.is_prunable(older_than));
        Ok(before - self.records.len())
    }
}

/// Consortium component: tenant window, timeouts, fail-open reads
#[derive(Clone)]
pub struct ConsortiumIntelligence {
    store: Arc<dyn ConsortiumStore>,
    window: ChronoDuration,
    timeout: Duration,
}

impl ConsortiumIntelligence {
    /// Create new consortium component
    pub fn new(store: Arc<dyn ConsortiumStore>, window_days: i64, timeout: Duration) -> Self {
        Self {
            store,
            window: ChronoDuration::days(window_days),
            timeout,
        }
    }

    /// Distinct-tenant window
    pub fn window(&self) -> ChronoDuration {
        self.window
    }

    async fn guarded<T>(&self, fut: impl Future<Output = Result<T>>) -> Result<T> {
        match tokio::time::timeout(self.timeout, fut).await {
            Ok(result) => result,
            Err(_) => Err(Error::Timeout {
                dependency: "consortium",
                ms: self.timeout.as_millis() as u64,
            }),
        }
    }

    /// Fetch one record
    pub async fn lookup(&self, hash: &IdentifierHash) -> Result<Option<ConsortiumRecord>> {
        self.guarded(self.store.lookup(hash)).await
    }

    /// Views for every identifier on a transaction. Non-mutating, fails open.
    pub async fn snapshot(
        &self,
        tenant_token: &str,
        hashes: &[(IdentifierKind, IdentifierHash)],
        now: DateTime<Utc>,
    ) -> ConsortiumSnapshot {
        let lookups = join_all(hashes.iter().map(|(_, hash)| self.lookup(hash))).await;

        let mut snapshot = ConsortiumSnapshot {
            available: true,
            views: BTreeMap::new(),
        };
        for ((kind, hash), lookup) in hashes.iter().zip(lookups) {
            match lookup {
                Ok(Some(record)) => {
                    snapshot.views.insert(*kind, record.view(tenant_token, self.window, now));
                }
                Ok(None) => {}
                Err(e) => {
                    snapshot.available = false;
                    warn!(kind = kind.as_str(), hash = %hash, error = %e, "consortium lookup failed");
                }
            }
        }
        snapshot
    }

    /// Record sightings for every identifier. Returns false when any write failed.
    pub async fn observe_all(
        &self,
        tenant_token: &str,
        hashes: &[(IdentifierKind, IdentifierHash)],
        at: DateTime<Utc>,
    ) -> bool {
        let writes = join_all(
            hashes
                .iter()
                .map(|(kind, hash)| self.guarded(self.store.observe(hash, *kind, tenant_token, at))),
        )
        .await;

        let mut ok = true;
        for ((kind, hash), write) in hashes.iter().zip(writes) {
            if let Err(e) = write {
                ok = false;
                warn!(kind = kind.as_str(), hash = %hash, error = %e, "consortium observe failed");
            }
        }
        debug!(identifiers = hashes.len(), ok, "consortium observed");
        ok
    }

    /// Record confirmed fraud on one identifier. Replaying the same report
    /// is a no-op returning false.
    pub async fn confirm_fraud(
        &self,
        hash: &IdentifierHash,
        kind: IdentifierKind,
        report: &str,
        fraud_type: Option<FraudType>,
        amount: Decimal,
        at: DateTime<Utc>,
    ) -> Result<bool> {
        self.guarded(self.store.confirm_fraud(hash, kind, report, fraud_type, amount, at))
            .await
    }

    /// Apply the retention policy
    pub async fn prune(&self, retention_days: i64, now: DateTime<Utc>) -> Result<usize> {
        let removed = self.store.prune(now - ChronoDuration::days(retention_days)).await?;
        info!(removed, retention_days, "consortium pruned");
        Ok(removed)
    }
}
