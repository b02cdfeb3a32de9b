//! Velocity counters for transaction monitoring
//!
//! Counters are fixed, self-expiring buckets keyed by
//! `(tenant, subject type, subject id, window, bucket)`, where
//! `bucket = epoch_seconds / window_seconds` and the TTL equals the window
//! length. Every mutation is a single-key atomic read-modify-write in the
//! backing store. Store failures degrade to "no signal".

use crate::hashing::IdentifierHash;
use crate::types::{IdentifierKind, SubjectType, Transaction};
use crate::{Error, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use futures::future::join_all;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, warn};

/// Counting window
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VelocityWindow {
    /// 1 minute
    Minute,
    /// 10 minutes
    TenMinutes,
    /// 1 hour
    Hour,
    /// 24 hours
    Day,
    /// 7 days
    Week,
}

impl VelocityWindow {
    /// Every window, shortest first
    pub const ALL: [VelocityWindow; 5] = [
        VelocityWindow::Minute,
        VelocityWindow::TenMinutes,
        VelocityWindow::Hour,
        VelocityWindow::Day,
        VelocityWindow::Week,
    ];

    /// Window length in seconds
    pub fn seconds(&self) -> i64 {
        match self {
            VelocityWindow::Minute => 60,
            VelocityWindow::TenMinutes => 600,
            VelocityWindow::Hour => 3_600,
            VelocityWindow::Day => 86_400,
            VelocityWindow::Week => 604_800,
        }
    }

    /// Key segment
    pub fn label(&self) -> &'static str {
        match self {
            VelocityWindow::Minute => "1m",
            VelocityWindow::TenMinutes => "10m",
            VelocityWindow::Hour => "1h",
            VelocityWindow::Day => "24h",
            VelocityWindow::Week => "7d",
        }
    }

    /// TTL of a bucket
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.seconds() as u64)
    }

    /// Bucket id containing `at`
    pub fn bucket(&self, at: DateTime<Utc>) -> i64 {
        at.timestamp().div_euclid(self.seconds())
    }
}

/// Store key of a counter bucket
pub fn counter_key(
    tenant: &str,
    subject_type: SubjectType,
    subject_id: &str,
    window: VelocityWindow,
    at: DateTime<Utc>,
) -> String {
    format!(
        "vel:{}:{}:{}:{}:{}",
        tenant,
        subject_type.as_str(),
        subject_id,
        window.label(),
        window.bucket(at)
    )
}

/// Store key of the distinct-user set of a device
pub fn device_users_key(tenant: &str, device: &IdentifierHash, window: VelocityWindow, at: DateTime<Utc>) -> String {
    format!(
        "vel:{}:device_users:{}:{}:{}",
        tenant,
        device,
        window.label(),
        window.bucket(at)
    )
}

/// Count and summed amount of one bucket
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CounterValue {
    /// Transactions counted
    pub count: u64,
    /// Amount summed
    pub amount: Decimal,
}

/// Result of peeking a distinct-member set
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DistinctPeek {
    /// Members currently in the set
    pub count: u64,
    /// The member asked about is already in the set
    pub contains_member: bool,
}

impl DistinctPeek {
    /// Set size once the current member is added
    pub fn projected(&self) -> u64 {
        if self.contains_member {
            self.count
        } else {
            self.count + 1
        }
    }
}

/// Backing store for counters. Every operation is single-key and atomic.
#[async_trait]
pub trait CounterStore: Send + Sync {
    /// Add one occurrence and `amount`; create the bucket with `ttl` if absent
    async fn increment(&self, key: &str, amount: Decimal, ttl: Duration) -> Result<CounterValue>;

    /// Read without mutating; absent or expired reads as zero
    async fn get(&self, key: &str) -> Result<CounterValue>;

    /// Add `member` to a distinct set, returning the set size
    async fn add_distinct(&self, key: &str, member: &str, ttl: Duration) -> Result<u64>;

    /// Read a distinct set without mutating
    async fn peek_distinct(&self, key: &str, member: &str) -> Result<DistinctPeek>;

    /// Drop expired buckets, returning how many went. Stores with native
    /// expiry have nothing to do.
    async fn purge_expired(&self) -> Result<usize> {
        Ok(0)
    }
}

struct CounterEntry {
    value: CounterValue,
    expires_at: Instant,
}

struct DistinctEntry {
    members: HashSet<String>,
    expires_at: Instant,
}

/// In-process counter store
#[derive(Default)]
pub struct InMemoryCounterStore {
    counters: DashMap<String, CounterEntry>,
    sets: DashMap<String, DistinctEntry>,
}

impl InMemoryCounterStore {
    /// Create new store
    pub fn new() -> Self {
        Self::default()
    }

    /// Live bucket count
    pub fn len(&self) -> usize {
        self.counters.len() + self.sets.len()
    }

    /// No live buckets
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl CounterStore for InMemoryCounterStore {
    async fn increment(&self, key: &str, amount: Decimal, ttl: Duration) -> Result<CounterValue> {
        let now = Instant::now();
        let mut entry = self.counters.entry(key.to_string()).or_insert_with(|| CounterEntry {
            value: CounterValue::default(),
            expires_at: now + ttl,
        });
        if entry.expires_at <= now {
            entry.value = CounterValue::default();
            entry.expires_at = now + ttl;
        }
        entry.value.count += 1;
        entry.value.amount += amount;
        Ok(entry.value)
    }

    async fn get(&self, key: &str) -> Result<CounterValue> {
        let now = Instant::now();
        Ok(self
            .counters
            .get(key)
            .filter(|e| e.expires_at > now)
            .map(|e| e.value)
            .unwrap_or_default())
    }

    async fn add_distinct(&self, key: &str, member: &str, ttl: Duration) -> Result<u64> {
        let now = Instant::now();
        let mut entry = self.sets.entry(key.to_string()).or_insert_with(|| DistinctEntry {
            members: HashSet::new(),
            expires_at: now + ttl,
        });
        if entry.expires_at <= now {
            entry.members.clear();
            entry.expires_at = now + ttl;
        }
        entry.members.insert(member.to_string());
        Ok(entry.members.len() as u64)
    }

    async fn peek_distinct(&self, key: &str, member: &str) -> Result<DistinctPeek> {
        let now = Instant::now();
        Ok(self
            .sets
            .get(key)
            .filter(|e| e.expires_at > now)
            .map(|e| DistinctPeek {
                count: e.members.len() as u64,
                contains_member: e.members.contains(member),
            })
            .unwrap_or_default())
    }

    async fn purge_expired(&self) -> Result<usize> {
        let now = Instant::now();
        let before = self.len();
        self.counters.retain(|_, e| e.expires_at > now);
        self.sets.retain(|_, e| e.expires_at > now);
        Ok(before - self.len())
    }
}

/// Counts for one subject across every window
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubjectVelocity {
    /// Last minute bucket
    pub minute: CounterValue,
    /// 10-minute bucket
    pub ten_minutes: CounterValue,
    /// Hour bucket
    pub hour: CounterValue,
    /// Day bucket
    pub day: CounterValue,
    /// Week bucket
    pub week: CounterValue,
}

impl SubjectVelocity {
    /// Value for a window
    pub fn get(&self, window: VelocityWindow) -> CounterValue {
        match window {
            VelocityWindow::Minute => self.minute,
            VelocityWindow::TenMinutes => self.ten_minutes,
            VelocityWindow::Hour => self.hour,
            VelocityWindow::Day => self.day,
            VelocityWindow::Week => self.week,
        }
    }

    fn set(&mut self, window: VelocityWindow, value: CounterValue) {
        match window {
            VelocityWindow::Minute => self.minute = value,
            VelocityWindow::TenMinutes => self.ten_minutes = value,
            VelocityWindow::Hour => self.hour = value,
            VelocityWindow::Day => self.day = value,
            VelocityWindow::Week => self.week = value,
        }
    }
}

/// Everything frequency-based rules may read, observed before this transaction
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VelocitySnapshot {
    /// False when any read failed; counts then under-report
    pub available: bool,
    /// The user
    pub user: SubjectVelocity,
    /// The device, when a fingerprint was supplied
    pub device: Option<SubjectVelocity>,
    /// The phone number
    pub phone: Option<SubjectVelocity>,
    /// The email address
    pub email: Option<SubjectVelocity>,
    /// The national id
    pub national_id: Option<SubjectVelocity>,
    /// Distinct users on this device within the tenant, last 24h bucket
    pub device_users_day: Option<DistinctPeek>,
    /// Distinct users on this device within the tenant, 7-day bucket
    pub device_users_week: Option<DistinctPeek>,
}

impl VelocitySnapshot {
    /// Counters for a contact identifier
    pub fn contact(&self, kind: IdentifierKind) -> Option<&SubjectVelocity> {
        match kind {
            IdentifierKind::Phone => self.phone.as_ref(),
            IdentifierKind::Email => self.email.as_ref(),
            IdentifierKind::NationalId => self.national_id.as_ref(),
            IdentifierKind::Device => self.device.as_ref(),
        }
    }
}

/// Velocity counter component: timeouts, fail-open, key layout
#[derive(Clone)]
pub struct VelocityCounters {
    store: Arc<dyn CounterStore>,
    timeout: Duration,
}

impl VelocityCounters {
    /// Create new velocity counters
    pub fn new(store: Arc<dyn CounterStore>, timeout: Duration) -> Self {
        Self { store, timeout }
    }

    async fn guarded<T>(&self, fut: impl Future<Output = Result<T>>) -> Result<T> {
        match tokio::time::timeout(self.timeout, fut).await {
            Ok(result) => result,
            Err(_) => Err(Error::Timeout {
                dependency: "velocity",
                ms: self.timeout.as_millis() as u64,
            }),
        }
    }

    /// Drop expired buckets from stores without native expiry
    pub async fn purge_expired(&self) -> Result<usize> {
        self.guarded(self.store.purge_expired()).await
    }

    /// Add one occurrence to a single window, returning the new count.
    /// Best-effort: failures are logged and reported as 0.
    pub async fn increment(
        &self,
        tenant: &str,
        subject_type: SubjectType,
        subject_id: &str,
        window: VelocityWindow,
        amount: Decimal,
        at: DateTime<Utc>,
    ) -> u64 {
        let key = counter_key(tenant, subject_type, subject_id, window, at);
        match self.guarded(self.store.increment(&key, amount, window.ttl())).await {
            Ok(value) => value.count,
            Err(e) => {
                warn!(key = %key, error = %e, "velocity increment failed");
                0
            }
        }
    }

    /// Read a single window without mutating. Failures read as 0.
    pub async fn peek(
        &self,
        tenant: &str,
        subject_type: SubjectType,
        subject_id: &str,
        window: VelocityWindow,
        at: DateTime<Utc>,
    ) -> u64 {
        let key = counter_key(tenant, subject_type, subject_id, window, at);
        match self.guarded(self.store.get(&key)).await {
            Ok(value) => value.count,
            Err(e) => {
                warn!(key = %key, error = %e, "velocity peek failed");
                0
            }
        }
    }

    async fn peek_subject(
        &self,
        tenant: &str,
        subject_type: SubjectType,
        subject_id: &str,
        at: DateTime<Utc>,
    ) -> (SubjectVelocity, bool) {
        let keys: Vec<(VelocityWindow, String)> = VelocityWindow::ALL
            .iter()
            .map(|w| (*w, counter_key(tenant, subject_type, subject_id, *w, at)))
            .collect();
        let reads = join_all(keys.iter().map(|(_, key)| self.guarded(self.store.get(key)))).await;

        let mut velocity = SubjectVelocity::default();
        let mut ok = true;
        for ((window, key), read) in keys.iter().zip(reads) {
            match read {
                Ok(value) => velocity.set(*window, value),
                Err(e) => {
                    ok = false;
                    warn!(key = %key, error = %e, "velocity peek failed");
                }
            }
        }
        (velocity, ok)
    }

    async fn peek_optional(
        &self,
        tenant: &str,
        subject_type: SubjectType,
        subject_id: Option<&IdentifierHash>,
        at: DateTime<Utc>,
    ) -> (Option<SubjectVelocity>, bool) {
        match subject_id {
            Some(hash) => {
                let (velocity, ok) = self.peek_subject(tenant, subject_type, hash.as_str(), at).await;
                (Some(velocity), ok)
            }
            None => (None, true),
        }
    }

    async fn peek_device_users(
        &self,
        tenant: &str,
        device: Option<&IdentifierHash>,
        user_id: &str,
        window: VelocityWindow,
        at: DateTime<Utc>,
    ) -> (Option<DistinctPeek>, bool) {
        let Some(device) = device else {
            return (None, true);
        };
        let key = device_users_key(tenant, device, window, at);
        match self.guarded(self.store.peek_distinct(&key, user_id)).await {
            Ok(peek) => (Some(peek), true),
            Err(e) => {
                warn!(key = %key, error = %e, "distinct peek failed");
                (None, false)
            }
        }
    }

    /// Read every counter the rules need. Non-mutating.
    pub async fn snapshot(
        &self,
        tx: &Transaction,
        hashes: &[(IdentifierKind, IdentifierHash)],
        at: DateTime<Utc>,
    ) -> VelocitySnapshot {
        let tenant = tx.tenant_id.as_str();
        let find = |kind: IdentifierKind| hashes.iter().find(|(k, _)| *k == kind).map(|(_, h)| h);

        let device_hash = find(IdentifierKind::Device);

        let user = self.peek_subject(tenant, SubjectType::User, &tx.user_id, at);
        let device = self.peek_optional(tenant, SubjectType::Device, device_hash, at);
        let phone = self.peek_optional(tenant, SubjectType::Contact, find(IdentifierKind::Phone), at);
        let email = self.peek_optional(tenant, SubjectType::Contact, find(IdentifierKind::Email), at);
        let national_id =
            self.peek_optional(tenant, SubjectType::Contact, find(IdentifierKind::NationalId), at);
        let users_day = self.peek_device_users(tenant, device_hash, &tx.user_id, VelocityWindow::Day, at);
        let users_week =
            self.peek_device_users(tenant, device_hash, &tx.user_id, VelocityWindow::Week, at);

        let (
            (user, user_ok),
            (device, device_ok),
            (phone, phone_ok),
            (email, email_ok),
            (national_id, nid_ok),
            (users_day, day_ok),
            (users_week, week_ok),
        ) = tokio::join!(user, device, phone, email, national_id, users_day, users_week);

        VelocitySnapshot {
            available: user_ok && device_ok && phone_ok && email_ok && nid_ok && day_ok && week_ok,
            user,
            device,
            phone,
            email,
            national_id,
            device_users_day: users_day,
            device_users_week: users_week,
        }
    }

    /// Post-scoring writes for one evaluated (non-cached) transaction.
    /// Returns false when any write failed.
    pub async fn record(
        &self,
        tx: &Transaction,
        hashes: &[(IdentifierKind, IdentifierHash)],
        at: DateTime<Utc>,
    ) -> bool {
        let tenant = tx.tenant_id.as_str();
        let mut subjects: Vec<(SubjectType, &str)> = vec![(SubjectType::User, tx.user_id.as_str())];
        for (kind, hash) in hashes {
            let subject_type = match kind {
                IdentifierKind::Device => SubjectType::Device,
                _ => SubjectType::Contact,
            };
            subjects.push((subject_type, hash.as_str()));
        }

        let mut keys = Vec::with_capacity(subjects.len() * VelocityWindow::ALL.len());
        for (subject_type, subject_id) in &subjects {
            for window in VelocityWindow::ALL {
                keys.push((counter_key(tenant, *subject_type, subject_id, window, at), window.ttl()));
            }
        }
        let increments = join_all(
            keys.iter()
                .map(|(key, ttl)| self.guarded(self.store.increment(key, tx.amount, *ttl))),
        );

        let mut set_keys = Vec::new();
        if let Some((_, device)) = hashes.iter().find(|(k, _)| *k == IdentifierKind::Device) {
            for window in [VelocityWindow::Day, VelocityWindow::Week] {
                set_keys.push((device_users_key(tenant, device, window, at), window.ttl()));
            }
        }
        let additions = join_all(
            set_keys
                .iter()
                .map(|(key, ttl)| self.guarded(self.store.add_distinct(key, &tx.user_id, *ttl))),
        );

        let (increments, additions) = tokio::join!(increments, additions);

        let mut ok = true;
        for ((key, _), result) in keys.iter().zip(increments) {
            if let Err(e) = result {
                ok = false;
                warn!(key = %key, error = %e, "velocity increment failed");
            }
        }
        for ((key, _), result) in set_keys.iter().zip(additions) {
            if let Err(e) = result {
                ok = false;
                warn!(key = %key, error = %e, "distinct add failed");
            }
        }
        debug!(tenant = %tenant, writes = keys.len() + set_keys.len(), ok, "velocity recorded");
        ok
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hashing::IdentifierHasher;

    fn counters(store: Arc<dyn CounterStore>) -> VelocityCounters {
        VelocityCounters::new(store, Duration::from_millis(50))
    }

    struct FailingStore;

    #[async_trait]
    impl CounterStore for FailingStore {
        async fn increment(&self, _: &str, _: Decimal, _: Duration) -> Result<CounterValue> {
            Err(Error::dependency("velocity", "connection refused"))
        }
        async fn get(&self, _: &str) -> Result<CounterValue> {
            Err(Error::dependency("velocity", "connection refused"))
        }
        async fn add_distinct(&self, _: &str, _: &str, _: Duration) -> Result<u64> {
            Err(Error::dependency("velocity", "connection refused"))
        }
        async fn peek_distinct(&self, _: &str, _: &str) -> Result<DistinctPeek> {
            Err(Error::dependency("velocity", "connection refused"))
        }
    }

    struct SlowStore;

    #[async_trait]
    impl CounterStore for SlowStore {
        async fn increment(&self, _: &str, _: Decimal, _: Duration) -> Result<CounterValue> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(CounterValue::default())
        }
        async fn get(&self, _: &str) -> Result<CounterValue> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(CounterValue { count: 99, amount: Decimal::ZERO })
        }
        async fn add_distinct(&self, _: &str, _: &str, _: Duration) -> Result<u64> {
            Ok(0)
        }
        async fn peek_distinct(&self, _: &str, _: &str) -> Result<DistinctPeek> {
            Ok(DistinctPeek::default())
        }
    }

    #[test]
    fn test_fixed_buckets() {
        let at = DateTime::parse_from_rfc3339("2024-03-01T10:00:59Z").unwrap().with_timezone(&Utc);
        let next = at + chrono::Duration::seconds(1);
        assert_ne!(VelocityWindow::Minute.bucket(at), VelocityWindow::Minute.bucket(next));
        assert_eq!(VelocityWindow::Hour.bucket(at), VelocityWindow::Hour.bucket(next));
        assert_eq!(
            counter_key("t1", SubjectType::User, "u1", VelocityWindow::Day, at),
            format!("vel:t1:user:u1:24h:{}", at.timestamp() / 86_400)
        );
    }

    #[tokio::test]
    async fn test_increment_and_peek() {
        let velocity = counters(Arc::new(InMemoryCounterStore::new()));
        let now = Utc::now();

        assert_eq!(velocity.peek("t1", SubjectType::User, "u1", VelocityWindow::Hour, now).await, 0);
        for expected in 1..=3 {
            let count = velocity
                .increment("t1", SubjectType::User, "u1", VelocityWindow::Hour, Decimal::from(10), now)
                .await;
            assert_eq!(count, expected);
        }
        assert_eq!(velocity.peek("t1", SubjectType::User, "u1", VelocityWindow::Hour, now).await, 3);
        // Tenants are isolated
        assert_eq!(velocity.peek("t2", SubjectType::User, "u1", VelocityWindow::Hour, now).await, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_bucket_expires_after_ttl() {
        let store = InMemoryCounterStore::new();
        store.increment("k", Decimal::ONE, Duration::from_secs(60)).await.unwrap();
        store.add_distinct("s", "u1", Duration::from_secs(60)).await.unwrap();
        assert_eq!(store.get("k").await.unwrap().count, 1);

        tokio::time::advance(Duration::from_secs(61)).await;
        assert_eq!(store.get("k").await.unwrap().count, 0);
        assert_eq!(store.peek_distinct("s", "u1").await.unwrap(), DistinctPeek::default());
        assert_eq!(store.purge_expired().await.unwrap(), 2);
        assert!(store.is_empty());

        // A fresh increment on an expired key starts over
        let value = store.increment("k", Decimal::ONE, Duration::from_secs(60)).await.unwrap();
        assert_eq!(value.count, 1);
    }

    #[tokio::test]
    async fn test_distinct_members() {
        let store = InMemoryCounterStore::new();
        let ttl = Duration::from_secs(60);
        assert_eq!(store.add_distinct("d", "u1", ttl).await.unwrap(), 1);
        assert_eq!(store.add_distinct("d", "u1", ttl).await.unwrap(), 1);
        assert_eq!(store.add_distinct("d", "u2", ttl).await.unwrap(), 2);

        let peek = store.peek_distinct("d", "u3").await.unwrap();
        assert_eq!(peek.count, 2);
        assert!(!peek.contains_member);
        assert_eq!(peek.projected(), 3);
        assert_eq!(store.peek_distinct("d", "u2").await.unwrap().projected(), 2);
    }

    #[tokio::test]
    async fn test_record_then_snapshot() {
        let velocity = counters(Arc::new(InMemoryCounterStore::new()));
        let hasher = IdentifierHasher::new("pepper");
        let now = Utc::now();

        let mut tx = Transaction::new("tx-1", "t1", "u1", Decimal::from(100), "USD", "ecommerce");
        tx.device_fingerprint = Some("fp-1".to_string());
        tx.email = Some("a@b.io".to_string());
        let hashes = hasher.hash_all(&tx);

        let before = velocity.snapshot(&tx, &hashes, now).await;
        assert!(before.available);
        assert_eq!(before.user.day.count, 0);
        assert_eq!(before.device_users_day.unwrap().projected(), 1);
        assert!(before.phone.is_none());

        assert!(velocity.record(&tx, &hashes, now).await);

        let mut other_user = tx.clone();
        other_user.user_id = "u2".to_string();
        let after = velocity.snapshot(&other_user, &hashes, now).await;
        assert_eq!(after.user.day.count, 0);
        assert_eq!(after.device.unwrap().day.count, 1);
        assert_eq!(after.device.unwrap().day.amount, Decimal::from(100));
        assert_eq!(after.email.unwrap().week.count, 1);
        assert_eq!(after.device_users_week.unwrap().projected(), 2);

        let same_user = velocity.snapshot(&tx, &hashes, now).await;
        assert_eq!(same_user.user.minute.count, 1);
        assert_eq!(same_user.device_users_day.unwrap().projected(), 1);
    }

    #[tokio::test]
    async fn test_store_failure_reads_as_no_signal() {
        let velocity = counters(Arc::new(FailingStore));
        let now = Utc::now();
        let tx = Transaction::new("tx-1", "t1", "u1", Decimal::from(100), "USD", "ecommerce");

        assert_eq!(velocity.peek("t1", SubjectType::User, "u1", VelocityWindow::Day, now).await, 0);
        assert_eq!(
            velocity.increment("t1", SubjectType::User, "u1", VelocityWindow::Day, Decimal::ONE, now).await,
            0
        );

        let snapshot = velocity.snapshot(&tx, &[], now).await;
        assert!(!snapshot.available);
        assert_eq!(snapshot.user, SubjectVelocity::default());
        assert!(!velocity.record(&tx, &[], now).await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_store_times_out() {
        let velocity = counters(Arc::new(SlowStore));
        let now = Utc::now();
        let tx = Transaction::new("tx-1", "t1", "u1", Decimal::from(100), "USD", "ecommerce");

        let snapshot = velocity.snapshot(&tx, &[], now).await;
        assert!(!snapshot.available);
        assert_eq!(snapshot.user.day.count, 0);
    }
}
