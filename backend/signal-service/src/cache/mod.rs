// ============================================
// Transient cache
// ============================================
//
// Short-lived key/value entries with a TTL. Backs the affinity profile
// cache. Redis in production, an in-process map for tests.
//
// Redis keys:
// - {prefix}:affinity:{visitor_hash} - AffinityProfile JSON

use crate::error::Result;
use crate::models::AffinityProfile;
use async_trait::async_trait;
use dashmap::DashMap;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

#[async_trait]
pub trait TransientCache: Send + Sync {
    async fn set(&self, key: &str, value: String, ttl: Duration) -> Result<()>;

    /// None when absent or expired
    async fn get(&self, key: &str) -> Result<Option<String>>;

    async fn delete(&self, key: &str) -> Result<()>;
}

#[derive(Clone)]
pub struct RedisTransientCache {
    conn: ConnectionManager,
}

impl RedisTransientCache {
    pub fn new(conn: ConnectionManager) -> Self {
        Self { conn }
    }
}

#[async_trait]
impl TransientCache for RedisTransientCache {
    async fn set(&self, key: &str, value: String, ttl: Duration) -> Result<()> {
        let mut conn = self.conn.clone();
        let ttl_secs = ttl.as_secs().max(1);
        conn.set_ex::<_, _, ()>(key, value, ttl_secs).await?;
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<String>> {
        let mut conn = self.conn.clone();
        let value: Option<String> = conn.get(key).await?;
        Ok(value)
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let mut conn = self.conn.clone();
        conn.del::<_, ()>(key).await?;
        Ok(())
    }
}

#[derive(Default)]
pub struct InMemoryTransientCache {
    entries: DashMap<String, (String, Instant)>,
}

impl InMemoryTransientCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[async_trait]
impl TransientCache for InMemoryTransientCache {
    async fn set(&self, key: &str, value: String, ttl: Duration) -> Result<()> {
        self.entries
            .insert(key.to_string(), (value, Instant::now() + ttl));
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<String>> {
        let expired = match self.entries.get(key) {
            Some(entry) if entry.1 > Instant::now() => return Ok(Some(entry.0.clone())),
            Some(_) => true,
            None => false,
        };

        if expired {
            self.entries.remove(key);
        }
        Ok(None)
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.entries.remove(key);
        Ok(())
    }
}

/// Typed view over the transient cache for affinity profiles
#[derive(Clone)]
pub struct AffinityCache {
    cache: Arc<dyn TransientCache>,
    key_prefix: String,
    ttl: Duration,
}

impl AffinityCache {
    pub fn new(cache: Arc<dyn TransientCache>, key_prefix: impl Into<String>, ttl: Duration) -> Self {
        Self {
            cache,
            key_prefix: key_prefix.into(),
            ttl,
        }
    }

    fn key(&self, visitor_hash: &str) -> String {
        format!("{}:affinity:{}", self.key_prefix, visitor_hash)
    }

    /// Overwrites any previous entry for the visitor
    pub async fn store(&self, profile: &AffinityProfile) -> Result<()> {
        let json = serde_json::to_string(profile)?;
        self.cache
            .set(&self.key(&profile.visitor_hash), json, self.ttl)
            .await
    }

    /// None means no affinity data yet
    pub async fn load(&self, visitor_hash: &str) -> Result<Option<AffinityProfile>> {
        let Some(json) = self.cache.get(&self.key(visitor_hash)).await? else {
            return Ok(None);
        };

        match serde_json::from_str(&json) {
            Ok(profile) => Ok(Some(profile)),
            Err(e) => {
                warn!(visitor_hash = %visitor_hash, error = %e, "Discarding unreadable affinity entry");
                self.cache.delete(&self.key(visitor_hash)).await?;
                Ok(None)
            }
        }
    }

    pub async fn invalidate(&self, visitor_hash: &str) -> Result<()> {
        debug!(visitor_hash = %visitor_hash, "Invalidating affinity cache entry");
        self.cache.delete(&self.key(visitor_hash)).await
    }
}
