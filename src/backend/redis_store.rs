//! Copyright (c) 2025, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了基于 Redis 的缓存存储实现（单机模式）。

use super::{ratio, CacheStore, StoreInfo, StoreStats};
use crate::config::RedisStoreConfig;
use crate::error::{CacheError, Result};
use async_trait::async_trait;
use redis::{aio::ConnectionManager, AsyncCommands, Client};
use secrecy::ExposeSecret;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::time::timeout;
use tracing::{debug, instrument};

/// Redis 缓存存储
///
/// 通过 `ConnectionManager` 复用连接，每条命令都受 `command_timeout_ms` 限制。
pub struct RedisStore {
    client: Client,
    manager: ConnectionManager,
    command_timeout: Duration,
    key_prefix: Option<String>,
    hits: AtomicU64,
    misses: AtomicU64,
    sets: AtomicU64,
    operations: AtomicU64,
}

impl std::fmt::Debug for RedisStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisStore")
            .field("command_timeout", &self.command_timeout)
            .field("key_prefix", &self.key_prefix)
            .finish()
    }
}

/// 根据 TLS 开关改写连接串的协议部分
pub(crate) fn resolve_connection_string(config: &RedisStoreConfig) -> String {
    let raw = config.connection_string.expose_secret();
    if config.enable_tls && !raw.starts_with("rediss://") {
        raw.replace("redis://", "rediss://")
    } else {
        raw.to_string()
    }
}

impl RedisStore {
    /// 连接 Redis 并创建存储
    ///
    /// # 参数
    ///
    /// * `config` - Redis 存储配置
    ///
    /// # 返回值
    ///
    /// 返回新的 RedisStore 实例或错误
    #[instrument(skip(config), level = "info", name = "init_redis_store")]
    pub async fn new(config: &RedisStoreConfig) -> Result<Self> {
        let connection_string = resolve_connection_string(config);
        let client = Client::open(connection_string.as_str())?;

        let manager = match timeout(
            Duration::from_millis(config.connection_timeout_ms),
            client.get_connection_manager(),
        )
        .await
        {
            Ok(res) => res?,
            Err(_) => {
                return Err(CacheError::StoreError(format!(
                    "Connection timed out after {}ms",
                    config.connection_timeout_ms
                )));
            }
        };

        debug!("RedisStore connected");
        Ok(Self {
            client,
            manager,
            command_timeout: Duration::from_millis(config.command_timeout_ms),
            key_prefix: config.key_prefix.clone(),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            sets: AtomicU64::new(0),
            operations: AtomicU64::new(0),
        })
    }

    /// 原始 Redis 客户端，发布订阅中继需要独立连接
    pub fn raw_client(&self) -> Client {
        self.client.clone()
    }

    /// 检查连接是否正常
    pub async fn ping(&self) -> Result<()> {
        let mut conn = self.manager.clone();
        self.bounded(async move { redis::cmd("PING").query_async::<String>(&mut conn).await })
            .await?;
        Ok(())
    }

    /// 给命令加上超时
    async fn bounded<T, F>(&self, fut: F) -> Result<T>
    where
        F: std::future::Future<Output = redis::RedisResult<T>>,
    {
        self.operations.fetch_add(1, Ordering::Relaxed);
        match timeout(self.command_timeout, fut).await {
            Ok(res) => Ok(res?),
            Err(_) => Err(CacheError::Timeout(format!(
                "Redis command exceeded {:?}",
                self.command_timeout
            ))),
        }
    }

    /// 用 SCAN MATCH 遍历匹配的键
    async fn scan(&self, pattern: &str) -> Result<Vec<String>> {
        let mut conn = self.manager.clone();
        let mut cursor = 0u64;
        let mut keys = Vec::new();
        loop {
            let (next_cursor, batch): (u64, Vec<String>) = self
                .bounded(
                    redis::cmd("SCAN")
                        .arg(cursor)
                        .arg("MATCH")
                        .arg(pattern)
                        .arg("COUNT")
                        .arg(1000)
                        .query_async(&mut conn),
                )
                .await?;
            keys.extend(batch);
            cursor = next_cursor;
            if cursor == 0 {
                break;
            }
        }
        Ok(keys)
    }
}

#[async_trait]
impl CacheStore for RedisStore {
    #[instrument(skip(self), level = "debug")]
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let mut conn = self.manager.clone();
        let value: Option<Vec<u8>> = self.bounded(conn.get(key)).await?;
        if value.is_some() {
            self.hits.fetch_add(1, Ordering::Relaxed);
        } else {
            self.misses.fetch_add(1, Ordering::Relaxed);
        }
        Ok(value)
    }

    #[instrument(skip(self, value), level = "debug", fields(value_len = value.len()))]
    async fn set(&self, key: &str, value: Vec<u8>, ttl: Option<u64>) -> Result<bool> {
        let mut conn = self.manager.clone();
        match ttl {
            Some(secs) if secs > 0 => {
                let _: () = self.bounded(conn.set_ex(key, value, secs)).await?;
            }
            _ => {
                let _: () = self.bounded(conn.set(key, value)).await?;
            }
        }
        self.sets.fetch_add(1, Ordering::Relaxed);
        Ok(true)
    }

    #[instrument(skip(self), level = "debug")]
    async fn delete(&self, key: &str) -> Result<bool> {
        let mut conn = self.manager.clone();
        let removed: u64 = self.bounded(conn.del(key)).await?;
        Ok(removed > 0)
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        let mut conn = self.manager.clone();
        self.bounded(conn.exists(key)).await
    }

    #[instrument(skip(self), level = "debug")]
    async fn keys(&self, pattern: &str) -> Result<Vec<String>> {
        self.scan(pattern).await
    }

    async fn ttl(&self, key: &str) -> Result<Option<Duration>> {
        let mut conn = self.manager.clone();
        // -2: 键不存在, -1: 不过期
        let millis: i64 = self.bounded(conn.pttl(key)).await?;
        if millis > 0 {
            Ok(Some(Duration::from_millis(millis as u64)))
        } else {
            Ok(None)
        }
    }

    /// 清空存储
    ///
    /// 配置了 key_prefix 时只删除带该前缀的键，否则执行 FLUSHDB
    async fn clear(&self) -> Result<()> {
        let mut conn = self.manager.clone();
        match &self.key_prefix {
            Some(prefix) => {
                let keys = self.scan(&format!("{}*", prefix)).await?;
                debug!("RedisStore clear: 删除 {} 个键", keys.len());
                for chunk in keys.chunks(500) {
                    let mut pipe = redis::pipe();
                    for key in chunk {
                        pipe.del(key).ignore();
                    }
                    self.bounded(pipe.query_async::<()>(&mut conn)).await?;
                }
            }
            None => {
                self.bounded(redis::cmd("FLUSHDB").query_async::<()>(&mut conn))
                    .await?;
            }
        }
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
            backend: "redis",
            max_memory_usage: None,
            default_ttl: None,
        }
    }

    async fn close(&self) -> Result<()> {
        // ConnectionManager 在最后一个克隆被释放时断开
        debug!("RedisStore closed");
        Ok(())
    }
}
