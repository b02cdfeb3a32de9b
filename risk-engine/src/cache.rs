//! Idempotency and response cache
//!
//! Keyed by the canonical input hash. A hit returns the stored evaluation
//! verbatim; the pipeline skips every counter and consortium write on a hit.

use crate::types::EvaluationResult;
use crate::{Error, Result};
use async_trait::async_trait;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Cache key prefixes
pub mod keys {
    /// Stored evaluations
    pub const EVALUATION: &str = "risk:eval";
    /// Per-user index of evaluation keys
    pub const USER_INDEX: &str = "risk:eval:user";
}

/// What the cache stores per input hash
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    /// Tenant of the evaluated transaction
    pub tenant_id: String,
    /// User of the evaluated transaction
    pub user_id: String,
    /// Stored evaluation
    pub result: EvaluationResult,
}

/// Backing store for the response cache
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Fetch a live entry
    async fn get(&self, input_hash: &str) -> Result<Option<CacheEntry>>;

    /// Store an entry for `ttl`
    async fn put(&self, input_hash: &str, entry: &CacheEntry, ttl: Duration) -> Result<()>;

    /// Drop every entry of one user, returning how many went
    async fn invalidate_user(&self, tenant_id: &str, user_id: &str) -> Result<u64>;

    /// Drop everything
    async fn clear(&self) -> Result<()>;

    /// Drop expired entries, returning how many went. Stores with native
    /// expiry have nothing to do.
    async fn purge_expired(&self) -> Result<usize> {
        Ok(0)
    }
}

struct StoredEntry {
    entry: CacheEntry,
    expires_at: Instant,
}

/// In-process cache store
#[derive(Default)]
pub struct InMemoryCacheStore {
    entries: DashMap<String, StoredEntry>,
    users: DashMap<(String, String), HashSet<String>>,
}

impl InMemoryCacheStore {
    /// Create new store
    pub fn new() -> Self {
        Self::default()
    }

    /// Entries held, expired ones included until touched
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// No entries held
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Users with at least one indexed entry
    pub fn indexed_users(&self) -> usize {
        self.users.len()
    }

    fn unindex(&self, entry: &CacheEntry, input_hash: &str) {
        let key = (entry.tenant_id.clone(), entry.user_id.clone());
        if let Some(mut hashes) = self.users.get_mut(&key) {
            // A concurrent put may have stored the hash again
            if !self.entries.contains_key(input_hash) {
                hashes.remove(input_hash);
            }
        }
        self.users.remove_if(&key, |_, hashes| hashes.is_empty());
    }
}

#[async_trait]
impl CacheStore for InMemoryCacheStore {
    async fn get(&self, input_hash: &str) -> Result<Option<CacheEntry>> {
        let now = Instant::now();
        let expired = match self.entries.get(input_hash) {
            Some(stored) if stored.expires_at > now => return Ok(Some(stored.entry.clone())),
            Some(_) => true,
            None => false,
        };
        if expired {
            if let Some((_, stored)) = self.entries.remove_if(input_hash, |_, stored| stored.expires_at <= now) {
                self.unindex(&stored.entry, input_hash);
            }
        }
        Ok(None)
    }

    async fn put(&self, input_hash: &str, entry: &CacheEntry, ttl: Duration) -> Result<()> {
        self.users
            .entry((entry.tenant_id.clone(), entry.user_id.clone()))
            .or_default()
            .insert(input_hash.to_string());
        self.entries.insert(
            input_hash.to_string(),
            StoredEntry {
                entry: entry.clone(),
                expires_at: Instant::now() + ttl,
            },
        );
        Ok(())
    }

    async fn invalidate_user(&self, tenant_id: &str, user_id: &str) -> Result<u64> {
        let Some((_, hashes)) = self.users.remove(&(tenant_id.to_string(), user_id.to_string())) else {
            return Ok(0);
        };
        let mut removed = 0;
        for hash in hashes {
            if self.entries.remove(&hash).is_some() {
                removed += 1;
            }
        }
        Ok(removed)
    }

    async fn clear(&self) -> Result<()> {
        self.entries.clear();
        self.users.clear();
        Ok(())
    }

    async fn purge_expired(&self) -> Result<usize> {
        let now = Instant::now();
        let expired: Vec<String> = self
            .entries
            .iter()
            .filter(|e| e.expires_at <= now)
            .map(|e| e.key().clone())
            .collect();
        let mut removed = 0;
        for hash in expired {
            if let Some((_, stored)) = self.entries.remove_if(&hash, |_, stored| stored.expires_at <= now) {
                self.unindex(&stored.entry, &hash);
                removed += 1;
            }
        }
        Ok(removed)
    }
}

/// Hit / miss bookkeeping
#[derive(Default, Debug, Clone, PartialEq)]
pub struct CacheMetrics {
    /// Lookups answered from the cache
    pub hits: u64,
    /// Lookups that missed or failed
    pub misses: u64,
    /// Entries written
    pub sets: u64,
    /// Entries invalidated
    pub deletes: u64,
}

impl CacheMetrics {
    /// Hit rate in percent
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            (self.hits as f64) / (total as f64) * 100.0
        }
    }
}

/// Idempotency cache: timeouts, fail-open, bookkeeping
#[derive(Clone)]
pub struct IdempotencyCache {
    store: Arc<dyn CacheStore>,
    ttl: Duration,
    timeout: Duration,
    metrics: Arc<RwLock<CacheMetrics>>,
}

impl IdempotencyCache {
    /// Create new cache
    pub fn new(store: Arc<dyn CacheStore>, ttl: Duration, timeout: Duration) -> Self {
        Self {
            store,
            ttl,
            timeout,
            metrics: Arc::new(RwLock::new(CacheMetrics::default())),
        }
    }

    /// Entry lifetime
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    async fn guarded<T>(&self, fut: impl Future<Output = Result<T>>) -> Result<T> {
        match tokio::time::timeout(self.timeout, fut).await {
            Ok(result) => result,
            Err(_) => Err(Error::Timeout {
                dependency: "cache",
                ms: self.timeout.as_millis() as u64,
            }),
        }
    }

    /// Look up a stored evaluation. Store failures read as a miss; the error
    /// is returned alongside so the caller can mark the result degraded.
    pub async fn get(&self, input_hash: &str) -> (Option<EvaluationResult>, Option<Error>) {
        match self.guarded(self.store.get(input_hash)).await {
            Ok(Some(entry)) => {
                self.record_hit().await;
                debug!(input_hash = %input_hash, "cache hit");
                (Some(entry.result), None)
            }
            Ok(None) => {
                self.record_miss().await;
                (None, None)
            }
            Err(e) => {
                warn!(input_hash = %input_hash, error = %e, "cache lookup failed, treating as miss");
                self.record_miss().await;
                (None, Some(e))
            }
        }
    }

    /// Store an evaluation
    pub async fn put(&self, tenant_id: &str, user_id: &str, result: &EvaluationResult) -> Result<()> {
        let entry = CacheEntry {
            tenant_id: tenant_id.to_string(),
            user_id: user_id.to_string(),
            result: result.clone(),
        };
        self.guarded(self.store.put(&result.input_hash, &entry, self.ttl)).await?;
        self.record_set().await;
        Ok(())
    }

    /// Drop a user's entries
    pub async fn invalidate_user(&self, tenant_id: &str, user_id: &str) -> Result<u64> {
        let removed = self.guarded(self.store.invalidate_user(tenant_id, user_id)).await?;
        {
            let mut metrics = self.metrics.write().await;
            metrics.deletes += removed;
        }
        info!(tenant = %tenant_id, user = %user_id, removed, "cache invalidated for user");
        Ok(removed)
    }

    /// Drop expired entries from stores without native expiry
    pub async fn purge_expired(&self) -> Result<usize> {
        self.guarded(self.store.purge_expired()).await
    }

    /// Drop everything, e.g. after a rule catalog change
    pub async fn clear(&self) -> Result<()> {
        self.guarded(self.store.clear()).await?;
        info!("cache cleared");
        Ok(())
    }

    async fn record_hit(&self) {
        let mut metrics = self.metrics.write().await;
        metrics.hits += 1;
    }

    async fn record_miss(&self) {
        let mut metrics = self.metrics.write().await;
        metrics.misses += 1;
    }

    async fn record_set(&self) {
        let mut metrics = self.metrics.write().await;
        metrics.sets += 1;
    }

    /// Get current cache metrics
    pub async fn get_metrics(&self) -> CacheMetrics {
        self.metrics.read().await.clone()
    }

    /// Reset cache metrics
    pub async fn reset_metrics(&self) {
        let mut metrics = self.metrics.write().await;
        *metrics = CacheMetrics::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Decision, RiskScore};
    use chrono::Utc;

    fn result(input_hash: &str) -> EvaluationResult {
        EvaluationResult {
            input_hash: input_hash.to_string(),
            vertical: "lending".to_string(),
            final_score: RiskScore::new(39.0),
            rule_score: RiskScore::new(39.0),
            decision: Decision::Approve,
            triggered_rules: Vec::new(),
            ml_component_used: false,
            ml_probability: None,
            aml_review: false,
            degraded: false,
            errored_rules: Vec::new(),
            explanation: "Approved".to_string(),
            evaluated_at: Utc::now(),
        }
    }

    fn cache(store: Arc<dyn CacheStore>) -> IdempotencyCache {
        IdempotencyCache::new(store, Duration::from_secs(300), Duration::from_millis(50))
    }

    struct BrokenStore;

    #[async_trait]
    impl CacheStore for BrokenStore {
        async fn get(&self, _: &str) -> Result<Option<CacheEntry>> {
            Err(Error::dependency("cache", "connection reset"))
        }
        async fn put(&self, _: &str, _: &CacheEntry, _: Duration) -> Result<()> {
            Err(Error::dependency("cache", "connection reset"))
        }
        async fn invalidate_user(&self, _: &str, _: &str) -> Result<u64> {
            Err(Error::dependency("cache", "connection reset"))
        }
        async fn clear(&self) -> Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_cache_metrics_hit_rate() {
        let mut metrics = CacheMetrics::default();
        assert_eq!(metrics.hit_rate(), 0.0);

        metrics.hits = 8;
        metrics.misses = 2;
        assert_eq!(metrics.hit_rate(), 80.0);
    }

    #[tokio::test]
    async fn test_put_then_get() {
        let cache = cache(Arc::new(InMemoryCacheStore::new()));
        assert!(cache.get("h1").await.0.is_none());

        cache.put("t1", "u1", &result("h1")).await.unwrap();
        let (hit, error) = cache.get("h1").await;
        assert_eq!(hit.unwrap().input_hash, "h1");
        assert!(error.is_none());

        let metrics = cache.get_metrics().await;
        assert_eq!((metrics.hits, metrics.misses, metrics.sets), (1, 1, 1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_entries_expire() {
        let store = Arc::new(InMemoryCacheStore::new());
        let cache = IdempotencyCache::new(store.clone(), Duration::from_secs(5), Duration::from_millis(50));
        cache.put("t1", "u1", &result("h1")).await.unwrap();

        tokio::time::advance(Duration::from_secs(6)).await;
        assert!(cache.get("h1").await.0.is_none());
        assert!(store.is_empty());
        assert_eq!(store.indexed_users(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_purge_drops_unread_expired_entries() {
        let store = Arc::new(InMemoryCacheStore::new());
        let cache = IdempotencyCache::new(store.clone(), Duration::from_secs(5), Duration::from_millis(50));
        cache.put("t1", "u1", &result("h1")).await.unwrap();
        cache.put("t1", "u2", &result("h2")).await.unwrap();
        tokio::time::advance(Duration::from_secs(3)).await;
        cache.put("t1", "u2", &result("h3")).await.unwrap();

        tokio::time::advance(Duration::from_secs(3)).await;
        assert_eq!(cache.purge_expired().await.unwrap(), 2);
        assert_eq!(store.len(), 1);
        assert_eq!(store.indexed_users(), 1);
        assert!(cache.get("h3").await.0.is_some());
        assert_eq!(cache.purge_expired().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_invalidate_user_and_clear() {
        let cache = cache(Arc::new(InMemoryCacheStore::new()));
        cache.put("t1", "u1", &result("h1")).await.unwrap();
        cache.put("t1", "u1", &result("h2")).await.unwrap();
        cache.put("t1", "u2", &result("h3")).await.unwrap();

        assert_eq!(cache.invalidate_user("t1", "u1").await.unwrap(), 2);
        assert!(cache.get("h1").await.0.is_none());
        assert!(cache.get("h3").await.0.is_some());
        assert_eq!(cache.invalidate_user("t1", "u1").await.unwrap(), 0);

        cache.clear().await.unwrap();
        assert!(cache.get("h3").await.0.is_none());
    }

    #[tokio::test]
    async fn test_store_failure_is_a_miss() {
        let cache = cache(Arc::new(BrokenStore));
        let (hit, error) = cache.get("h1").await;
        assert!(hit.is_none());
        assert!(matches!(error, Some(Error::Dependency { dependency: "cache", .. })));
        assert!(cache.put("t1", "u1", &result("h1")).await.is_err());
    }
}
