//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了缓存存储契约以及内置的内存、Redis 两种存储实现。
//!
//! 协调层只依赖 [`CacheStore`]，淘汰策略和过期清理完全由存储自身负责。

pub mod memory;
pub mod redis_store;

use crate::config::{Config, StoreBackend};
use crate::error::{CacheError, Result};
use async_trait::async_trait;
use regex::Regex;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;

pub use self::memory::MemoryStore;
pub use self::redis_store::RedisStore;

/// 存储统计信息
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct StoreStats {
    pub hits: u64,
    pub misses: u64,
    pub hit_rate: f64,
    pub total_operations: u64,
    pub sets: u64,
}

/// 存储自身的配置描述
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StoreInfo {
    /// 后端名称（memory / redis）
    pub backend: &'static str,
    /// 最大容量，无上限时为 None
    pub max_memory_usage: Option<u64>,
    /// 默认过期时间（秒）
    pub default_ttl: Option<u64>,
}

/// 缓存存储契约
///
/// 所有操作都是异步的；`ttl` 为 None 或 0 表示不过期。
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// 读取缓存值，不存在时返回 None
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;

    /// 写入缓存值，ttl 单位为秒
    async fn set(&self, key: &str, value: Vec<u8>, ttl: Option<u64>) -> Result<bool>;

    /// 删除缓存项，返回是否真的删除了一个存在的键
    async fn delete(&self, key: &str) -> Result<bool>;

    /// 检查键是否存在
    async fn exists(&self, key: &str) -> Result<bool>;

    /// 按 glob 模式列出键（支持 `*` 和 `?`）
    async fn keys(&self, pattern: &str) -> Result<Vec<String>>;

    /// 剩余生存时间，键不存在或不过期时返回 None
    async fn ttl(&self, key: &str) -> Result<Option<Duration>>;

    /// 清空存储
    async fn clear(&self) -> Result<()>;

    /// 获取统计信息
    async fn stats(&self) -> Result<StoreStats>;

    /// 获取存储配置描述
    fn config(&self) -> StoreInfo;

    /// 关闭存储，释放连接
    async fn close(&self) -> Result<()>;
}

/// 共享的存储句柄
pub type SharedStore = Arc<dyn CacheStore>;

/// 根据配置创建存储
pub async fn connect(config: &Config) -> Result<SharedStore> {
    match config.store.backend {
        StoreBackend::Memory => Ok(Arc::new(MemoryStore::new(
            config.store.memory.max_capacity,
        ))),
        StoreBackend::Redis => {
            let redis_config = config.store.redis.as_ref().ok_or_else(|| {
                CacheError::ConfigError("Redis store selected but [store.redis] is missing".into())
            })?;
            Ok(Arc::new(RedisStore::new(redis_config).await?))
        }
    }
}

/// 把 glob 模式转换为锚定的正则表达式
pub fn glob_to_regex(pattern: &str) -> Result<Regex> {
    let mut expr = String::with_capacity(pattern.len() + 8);
    expr.push('^');
    for c in pattern.chars() {
        match c {
            '*' => expr.push_str(".*"),
            '?' => expr.push('.'),
            other => expr.push_str(&regex::escape(&other.to_string())),
        }
    }
    expr.push('$');
    Regex::new(&expr).map_err(|e| CacheError::InvalidInput(format!("bad pattern {}: {}", pattern, e)))
}

/// 命中率计算，无请求时为 0
pub(crate) fn ratio(part: u64, total: u64) -> f64 {
    if total == 0 {
        0.0
    } else {
        part as f64 / total as f64
    }
}
