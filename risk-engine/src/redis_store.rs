//! Redis backends for the velocity counters and the response cache
//!
//! Counters are hashes (`count`, `amount_minor`) updated with two `HINCRBY`
//! in one MULTI block, so every increment is a single-key atomic
//! read-modify-write. Amounts are stored as integers scaled by
//! 10^[`AMOUNT_SCALE`], so sums stay exact. Expiry is set with
//! `EXPIRE .. NX` (Redis 7+) so the first writer fixes the bucket's lifetime.

use crate::cache::{keys, CacheEntry, CacheStore};
use crate::velocity::{CounterStore, CounterValue, DistinctPeek};
use crate::{Error, Result};
use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use rust_decimal::Decimal;
use std::time::Duration;
use tracing::{info, warn};

/// Decimal places kept for counter amounts
pub const AMOUNT_SCALE: u32 = 4;

fn redis_error(e: redis::RedisError) -> Error {
    Error::dependency("redis", e)
}

/// Open a managed connection
pub async fn connect(url: &str) -> Result<ConnectionManager> {
    let client = redis::Client::open(url).map_err(redis_error)?;
    let manager = ConnectionManager::new(client).await.map_err(redis_error)?;
    info!(url = %url, "connected to redis");
    Ok(manager)
}

fn ttl_seconds(ttl: Duration) -> u64 {
    ttl.as_secs().max(1)
}

/// Amount as an integer count of 10^-AMOUNT_SCALE units
fn to_minor_units(amount: Decimal) -> Result<i64> {
    let mut scaled = amount.round_dp(AMOUNT_SCALE);
    scaled.rescale(AMOUNT_SCALE);
    i64::try_from(scaled.mantissa())
        .map_err(|_| Error::dependency("redis", format!("counter amount {} out of range", amount)))
}

fn from_minor_units(minor: i64) -> Decimal {
    Decimal::new(minor, AMOUNT_SCALE).normalize()
}

/// Velocity counters in Redis
#[derive(Clone)]
pub struct RedisCounterStore {
    redis: ConnectionManager,
}

impl RedisCounterStore {
    /// Create new store
    pub fn new(redis: ConnectionManager) -> Self {
        Self { redis }
    }
}

#[async_trait]
impl CounterStore for RedisCounterStore {
    async fn increment(&self, key: &str, amount: Decimal, ttl: Duration) -> Result<CounterValue> {
        let minor = to_minor_units(amount)?;
        let mut conn = self.redis.clone();
        let (count, total): (u64, i64) = redis::pipe()
            .atomic()
            .cmd("HINCRBY")
            .arg(key)
            .arg("count")
            .arg(1)
            .cmd("HINCRBY")
            .arg(key)
            .arg("amount_minor")
            .arg(minor)
            .cmd("EXPIRE")
            .arg(key)
            .arg(ttl_seconds(ttl))
            .arg("NX")
            .ignore()
            .query_async(&mut conn)
            .await
            .map_err(redis_error)?;
        Ok(CounterValue {
            count,
            amount: from_minor_units(total),
        })
    }

    async fn get(&self, key: &str) -> Result<CounterValue> {
        let mut conn = self.redis.clone();
        let (count, total): (Option<u64>, Option<i64>) = redis::cmd("HMGET")
            .arg(key)
            .arg("count")
            .arg("amount_minor")
            .query_async(&mut conn)
            .await
            .map_err(redis_error)?;
        Ok(CounterValue {
            count: count.unwrap_or(0),
            amount: total.map(from_minor_units).unwrap_or(Decimal::ZERO),
        })
    }

    async fn add_distinct(&self, key: &str, member: &str, ttl: Duration) -> Result<u64> {
        let mut conn = self.redis.clone();
        let (size,): (u64,) = redis::pipe()
            .atomic()
            .sadd(key, member)
            .ignore()
            .scard(key)
            .cmd("EXPIRE")
            .arg(key)
            .arg(ttl_seconds(ttl))
            .arg("NX")
            .ignore()
            .query_async(&mut conn)
            .await
            .map_err(redis_error)?;
        Ok(size)
    }

    async fn peek_distinct(&self, key: &str, member: &str) -> Result<DistinctPeek> {
        let mut conn = self.redis.clone();
        let (count, contains_member): (u64, bool) = redis::pipe()
            .scard(key)
            .sismember(key, member)
            .query_async(&mut conn)
            .await
            .map_err(redis_error)?;
        Ok(DistinctPeek { count, contains_member })
    }
}

fn evaluation_key(input_hash: &str) -> String {
    format!("{}:{}", keys::EVALUATION, input_hash)
}

fn user_index_key(tenant_id: &str, user_id: &str) -> String {
    format!("{}:{}:{}", keys::USER_INDEX, tenant_id, user_id)
}

/// Response cache in Redis: JSON values under `SET .. EX`, plus a per-user
/// set of keys for invalidation
#[derive(Clone)]
pub struct RedisCacheStore {
    redis: ConnectionManager,
}

impl RedisCacheStore {
    /// Create new store
    pub fn new(redis: ConnectionManager) -> Self {
        Self { redis }
    }
}

#[async_trait]
impl CacheStore for RedisCacheStore {
    async fn get(&self, input_hash: &str) -> Result<Option<CacheEntry>> {
        let json: Option<String> = self
            .redis
            .clone()
            .get::<_, Option<String>>(evaluation_key(input_hash))
            .await
            .map_err(redis_error)?;
        match json {
            Some(json) => match serde_json::from_str(&json) {
                Ok(entry) => Ok(Some(entry)),
                Err(e) => {
                    warn!(input_hash = %input_hash, error = %e, "failed to deserialize cached evaluation");
                    Ok(None)
                }
            },
            None => Ok(None),
        }
    }

    async fn put(&self, input_hash: &str, entry: &CacheEntry, ttl: Duration) -> Result<()> {
        let json = serde_json::to_string(entry)?;
        let key = evaluation_key(input_hash);
        let index = user_index_key(&entry.tenant_id, &entry.user_id);
        let secs = ttl_seconds(ttl);

        let mut conn = self.redis.clone();
        let _: () = redis::pipe()
            .atomic()
            .cmd("SET")
            .arg(&key)
            .arg(json)
            .arg("EX")
            .arg(secs)
            .ignore()
            .sadd(&index, &key)
            .ignore()
            .cmd("EXPIRE")
            .arg(&index)
            .arg(secs)
            .ignore()
            .query_async(&mut conn)
            .await
            .map_err(redis_error)?;
        Ok(())
    }

    async fn invalidate_user(&self, tenant_id: &str, user_id: &str) -> Result<u64> {
        let index = user_index_key(tenant_id, user_id);
        let mut conn = self.redis.clone();
        let members: Vec<String> = conn.smembers::<_, Vec<String>>(&index).await.map_err(redis_error)?;
        let removed: u64 = if members.is_empty() {
            0
        } else {
            conn.del::<_, u64>(&members).await.map_err(redis_error)?
        };
        let _: () = conn.del(&index).await.map_err(redis_error)?;
        Ok(removed)
    }

    async fn clear(&self) -> Result<()> {
        let pattern = format!("{}*", keys::EVALUATION);
        let mut scan = self.redis.clone();
        let mut found = Vec::new();
        {
            let mut iter = scan
                .scan_match::<_, String>(&pattern)
                .await
                .map_err(redis_error)?;
            while let Some(key) = iter.next_item().await {
                found.push(key);
            }
        }
        if !found.is_empty() {
            let mut conn = self.redis.clone();
            let _: () = conn.del(&found).await.map_err(redis_error)?;
        }
        info!(keys = found.len(), "redis cache cleared");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_layout() {
        assert_eq!(evaluation_key("abc"), "risk:eval:abc");
        assert_eq!(user_index_key("t1", "u1"), "risk:eval:user:t1:u1");
    }

    #[test]
    fn test_amounts_sum_exactly_in_minor_units() {
        assert_eq!(to_minor_units(Decimal::new(150025, 2)).unwrap(), 15_002_500);
        assert_eq!(from_minor_units(15_002_500), Decimal::new(150025, 2));

        // Ten payments of 0.1 sum to exactly 1
        let tenth = to_minor_units(Decimal::new(1, 1)).unwrap();
        assert_eq!(from_minor_units(tenth * 10), Decimal::ONE);

        let large = Decimal::new(999_999_999_999_99, 2);
        assert_eq!(from_minor_units(to_minor_units(large).unwrap()), large);
        assert!(to_minor_units(Decimal::MAX).is_err());
    }

    #[test]
    fn test_ttl_never_zero() {
        assert_eq!(ttl_seconds(Duration::from_millis(10)), 1);
        assert_eq!(ttl_seconds(Duration::from_secs(300)), 300);
    }
}
