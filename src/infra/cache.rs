//! Result cache adapters: Redis for deployments, an in-process map for tests
//! and local runs without a Redis server.

use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;
use redis::{AsyncCommands, Client, IntoConnectionInfo, aio::ConnectionManager};
use tokio::sync::RwLock;

use crate::{
    application::repos::{CacheError, ResultCache},
    config::connections::CacheConnection,
    domain::calculation::canonical_number,
};

/// Sums stored as plain Redis strings, one key per input pair, without expiry.
#[derive(Clone)]
pub struct RedisResultCache {
    connection: ConnectionManager,
}

impl RedisResultCache {
    /// Open a managed connection; the manager reconnects on its own after
    /// transient failures.
    pub async fn connect(settings: &CacheConnection) -> Result<Self, CacheError> {
        let mut info = (settings.host.clone(), settings.port)
            .into_connection_info()
            .map_err(CacheError::unavailable)?;
        info.redis.password = Some(settings.password.clone());

        let client = Client::open(info).map_err(CacheError::unavailable)?;
        let connection = ConnectionManager::new(client)
            .await
            .map_err(CacheError::unavailable)?;

        Ok(Self { connection })
    }
}

#[async_trait]
impl ResultCache for RedisResultCache {
    async fn lookup(&self, key: &str) -> Result<Option<f64>, CacheError> {
        let mut connection = self.connection.clone();
        let raw: Option<String> = connection
            .get(key)
            .await
            .map_err(CacheError::unavailable)?;
        raw.map(|raw| decode_value(key, raw)).transpose()
    }

    async fn store(&self, key: &str, value: f64) -> Result<(), CacheError> {
        let mut connection = self.connection.clone();
        connection
            .set::<_, _, ()>(key, canonical_number(value))
            .await
            .map_err(CacheError::unavailable)
    }

    async fn ping(&self) -> Result<(), CacheError> {
        let mut connection = self.connection.clone();
        let _: String = redis::cmd("PING")
            .query_async(&mut connection)
            .await
            .map_err(CacheError::unavailable)?;
        Ok(())
    }
}

/// In-process cache with the same encoding as [`RedisResultCache`].
#[derive(Clone, Default)]
pub struct MemoryResultCache {
    entries: Arc<RwLock<HashMap<String, String>>>,
}

impl MemoryResultCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    /// Write a raw entry, bypassing encoding.
    pub async fn insert_raw(&self, key: impl Into<String>, raw: impl Into<String>) {
        let mut guard = self.entries.write().await;
        guard.insert(key.into(), raw.into());
    }
}

#[async_trait]
impl ResultCache for MemoryResultCache {
    async fn lookup(&self, key: &str) -> Result<Option<f64>, CacheError> {
        let guard = self.entries.read().await;
        guard
            .get(key)
            .cloned()
            .map(|raw| decode_value(key, raw))
            .transpose()
    }

    async fn store(&self, key: &str, value: f64) -> Result<(), CacheError> {
        let mut guard = self.entries.write().await;
        guard.insert(key.to_string(), canonical_number(value));
        Ok(())
    }

    async fn ping(&self) -> Result<(), CacheError> {
        Ok(())
    }
}

fn decode_value(key: &str, raw: String) -> Result<f64, CacheError> {
    match raw.trim().parse::<f64>() {
        Ok(value) if value.is_finite() => Ok(value),
        _ => Err(CacheError::Corrupt {
            key: key.to_string(),
            value: raw,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn memory_cache_round_trips_values() {
        let cache = MemoryResultCache::new();
        assert!(cache.is_empty().await);
        assert_eq!(cache.lookup("2:3").await.expect("lookup"), None);

        cache.store("2:3", 5.0).await.expect("store");
        cache.store("0.1:0.2", 0.1 + 0.2).await.expect("store");

        assert_eq!(cache.lookup("2:3").await.expect("lookup"), Some(5.0));
        assert_eq!(
            cache.lookup("0.1:0.2").await.expect("lookup"),
            Some(0.1 + 0.2)
        );
        assert_eq!(cache.len().await, 2);
    }

    #[tokio::test]
    async fn store_overwrites_previous_value() {
        let cache = MemoryResultCache::new();
        cache.store("1:1", 3.0).await.expect("store");
        cache.store("1:1", 2.0).await.expect("store");
        assert_eq!(cache.lookup("1:1").await.expect("lookup"), Some(2.0));
    }

    #[tokio::test]
    async fn corrupt_entries_surface_as_errors() {
        let cache = MemoryResultCache::new();
        cache.insert_raw("2:3", "five").await;

        let err = cache.lookup("2:3").await.unwrap_err();
        assert!(matches!(err, CacheError::Corrupt { ref key, .. } if key == "2:3"));
    }

    #[test]
    fn decode_accepts_integral_and_exponent_forms() {
        assert_eq!(decode_value("k", "5".to_string()).expect("int"), 5.0);
        assert_eq!(decode_value("k", "1e300".to_string()).expect("exp"), 1e300);
        assert!(decode_value("k", "inf".to_string()).is_err());
    }
}
