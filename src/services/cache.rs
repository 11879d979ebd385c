use redis::aio::ConnectionManager;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use crate::models::UserId;

/// Errors that can occur with cache operations
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("Redis error: {0}")]
    RedisError(#[from] redis::RedisError),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Cache miss: {0}")]
    CacheMiss(String),
}

/// Two-tier cache for entitlement lookups
///
/// L1 is a per-process moka cache, L2 is Redis shared across instances.
/// Both tiers expire entries after the configured TTL, which bounds how long
/// a lapsed subscription can keep its perks.
pub struct CacheManager {
    redis: Arc<tokio::sync::Mutex<ConnectionManager>>,
    l1_cache: moka::future::Cache<String, Vec<u8>>,
    ttl_secs: u64,
}

impl CacheManager {
    pub async fn new(redis_url: &str, l1_size: u64, ttl_secs: u64) -> Result<Self, CacheError> {
        let client = redis::Client::open(redis_url)?;
        let redis = ConnectionManager::new(client).await?;

        let l1_cache = moka::future::CacheBuilder::new(l1_size)
            .time_to_live(Duration::from_secs(ttl_secs))
            .build();

        Ok(Self {
            redis: Arc::new(tokio::sync::Mutex::new(redis)),
            l1_cache,
            ttl_secs,
        })
    }

    /// Look up L1, then L2; an L2 hit repopulates L1
    pub async fn get<T>(&self, key: &str) -> Result<T, CacheError>
    where
        T: for<'de> Deserialize<'de>,
    {
        if let Some(bytes) = self.l1_cache.get(key).await {
            tracing::trace!("L1 cache hit: {}", key);
            return Ok(serde_json::from_slice(&bytes)?);
        }

        let value: Option<String> = {
            let mut conn = self.redis.lock().await;
            redis::cmd("GET").arg(key).query_async(&mut *conn).await?
        };

        match value {
            Some(json) => {
                tracing::trace!("L2 cache hit: {}", key);
                let parsed = serde_json::from_str(&json)?;
                self.l1_cache
                    .insert(key.to_string(), json.into_bytes())
                    .await;
                Ok(parsed)
            }
            None => Err(CacheError::CacheMiss(key.to_string())),
        }
    }

    pub async fn set<T>(&self, key: &str, value: &T) -> Result<(), CacheError>
    where
        T: Serialize,
    {
        let json = serde_json::to_string(value)?;
        self.l1_cache
            .insert(key.to_string(), json.as_bytes().to_vec())
            .await;

        let mut conn = self.redis.lock().await;
        redis::cmd("SETEX")
            .arg(key)
            .arg(self.ttl_secs)
            .arg(json)
            .query_async::<()>(&mut *conn)
            .await?;

        tracing::trace!("Cache set: {}", key);
        Ok(())
    }

    /// Drop a key from both tiers
    pub async fn invalidate(&self, key: &str) -> Result<(), CacheError> {
        self.l1_cache.invalidate(key).await;

        let mut conn = self.redis.lock().await;
        redis::cmd("DEL")
            .arg(key)
            .query_async::<()>(&mut *conn)
            .await?;
        Ok(())
    }
}

pub struct CacheKey;

impl CacheKey {
    /// Active tier ids for a user
    pub fn entitlements(user_id: UserId) -> String {
        format!("entitlements:{}", user_id)
    }
}
