//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了进程内缓存存储的实现，基于 Moka。

use super::{glob_to_regex, ratio, CacheStore, StoreInfo, StoreStats};
use crate::error::Result;
use async_trait::async_trait;
use moka::future::Cache;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, instrument};

/// 进程内缓存存储
///
/// 过期时间随值一起保存，读取时惰性检查；时间取自 tokio 时钟，
/// 因此暂停时间的测试可以直接推进过期。
pub struct MemoryStore {
    // 值: (数据, 过期时间)
    cache: Cache<String, (Vec<u8>, Option<Instant>)>,
    max_capacity: u64,
    hits: AtomicU64,
    misses: AtomicU64,
    sets: AtomicU64,
    operations: AtomicU64,
}

impl MemoryStore {
    /// 创建新的内存存储
    ///
    /// # 参数
    ///
    /// * `capacity` - 最大条目数，超出后由 Moka 负责淘汰
    pub fn new(capacity: u64) -> Self {
        Self {
            cache: Cache::builder().max_capacity(capacity).build(),
            max_capacity: capacity,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            sets: AtomicU64::new(0),
            operations: AtomicU64::new(0),
        }
    }

    fn is_expired(expire_at: Option<Instant>) -> bool {
        matches!(expire_at, Some(at) if Instant::now() >= at)
    }

    /// 读取未过期的条目，过期条目顺便移除
    async fn live_entry(&self, key: &str) -> Option<(Vec<u8>, Option<Instant>)> {
        self.operations.fetch_add(1, Ordering::Relaxed);
        let (bytes, expire_at) = self.cache.get(key).await?;
        if Self::is_expired(expire_at) {
            self.cache.remove(key).await;
            debug!("memory store: key={} expired, removed", key);
            return None;
        }
        Some((bytes, expire_at))
    }
}

#[async_trait]
impl CacheStore for MemoryStore {
    #[instrument(skip(self), level = "debug")]
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        match self.live_entry(key).await {
            Some((bytes, _)) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                Ok(Some(bytes))
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                Ok(None)
            }
        }
    }

    #[instrument(skip(self, value), level = "debug", fields(value_len = value.len()))]
    async fn set(&self, key: &str, value: Vec<u8>, ttl: Option<u64>) -> Result<bool> {
        self.operations.fetch_add(1, Ordering::Relaxed);
        self.sets.fetch_add(1, Ordering::Relaxed);
        let expire_at = match ttl {
            Some(secs) if secs > 0 => Some(Instant::now() + Duration::from_secs(secs)),
            _ => None,
        };
        self.cache.insert(key.to_string(), (value, expire_at)).await;
        Ok(true)
    }

    #[instrument(skip(self), level = "debug")]
    async fn delete(&self, key: &str) -> Result<bool> {
        self.operations.fetch_add(1, Ordering::Relaxed);
        match self.cache.remove(key).await {
            Some((_, expire_at)) => Ok(!Self::is_expired(expire_at)),
            None => Ok(false),
        }
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        Ok(self.live_entry(key).await.is_some())
    }

    #[instrument(skip(self), level = "debug")]
    async fn keys(&self, pattern: &str) -> Result<Vec<String>> {
        self.operations.fetch_add(1, Ordering::Relaxed);
        let matcher = glob_to_regex(pattern)?;
        let keys = self
            .cache
            .iter()
            .filter(|(key, (_, expire_at))| !Self::is_expired(*expire_at) && matcher.is_match(key))
            .map(|(key, _)| key.as_ref().clone())
            .collect();
        Ok(keys)
    }

    async fn ttl(&self, key: &str) -> Result<Option<Duration>> {
        Ok(self
            .live_entry(key)
            .await
            .and_then(|(_, expire_at)| expire_at)
            .map(|at| at.saturating_duration_since(Instant::now())))
    }

    async fn clear(&self) -> Result<()> {
        debug!("memory store: 清空所有缓存项");
        self.cache.invalidate_all();
        Ok(())
    }

    async fn stats(&self) -> Result<StoreStats> {
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        Ok(StoreStats {
            hits,
            misses,
            hit_rate: ratio(hits, hits + misses),
            total_operations: self.operations.load(Ordering::Relaxed),
            sets: self.sets.load(Ordering::Relaxed),
        })
    }

    fn config(&self) -> StoreInfo {
        StoreInfo {
            backend: "memory",
            max_memory_usage: Some(self.max_capacity),
            default_ttl: None,
        }
    }

    async fn close(&self) -> Result<()> {
        self.cache.invalidate_all();
        self.cache.run_pending_tasks().await;
        Ok(())
    }
}
