//! Copyright (c) 2025, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了缓存协调层的配置结构和解析逻辑。

use crate::error::{CacheError, Result};
use secrecy::SecretString;
use serde::Deserialize;
use std::path::Path;

pub const CONFIG_VERSION: u32 = 1;
pub const CONFIG_VERSION_FIELD: &str = "config_version";

/// 顶层配置
#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config_version: Option<u32>,
    #[serde(default)]
    pub global: GlobalConfig,
    #[serde(default)]
    pub write_behind: WriteBehindConfig,
    #[serde(default)]
    pub store: StoreConfig,
    /// 跨实例同步配置（可选）
    #[serde(default)]
    pub sync: Option<SyncConfig>,
}

/// 全局配置
///
/// 定义所有缓存模式共享的默认行为
#[derive(Deserialize, Clone, Debug)]
#[serde(default)]
pub struct GlobalConfig {
    /// 默认的缓存过期时间（秒）
    pub default_ttl: u64,
    /// 热点键阈值（访问次数）
    pub hot_key_threshold: u64,
    /// 访问计数表最多跟踪的键数量
    pub max_tracked_keys: usize,
    /// 提前刷新阈值（剩余TTL比例）
    pub refresh_threshold: f64,
    /// 事件通道容量
    pub event_channel_capacity: usize,
    /// 序列化类型
    pub serialization: SerializationType,
    /// 是否压缩序列化后的数据
    pub enable_compression: bool,
    /// 键的最大长度
    pub max_key_length: usize,
}

impl Default for GlobalConfig {
    fn default() -> Self {
        Self {
            default_ttl: 300,
            hot_key_threshold: 5,
            max_tracked_keys: 10_000,
            refresh_threshold: 0.8,
            event_channel_capacity: 1024,
            serialization: SerializationType::Json,
            enable_compression: false,
            max_key_length: 256,
        }
    }
}

/// 序列化类型枚举
#[derive(Deserialize, Clone, Debug, PartialEq, Default)]
#[serde(rename_all = "lowercase")]
pub enum SerializationType {
    /// JSON序列化
    #[default]
    Json,
}

/// 延迟写入配置
#[derive(Deserialize, Clone, Debug)]
#[serde(default)]
pub struct WriteBehindConfig {
    /// 默认延迟（毫秒）
    pub default_delay_ms: u64,
    /// 同时挂起的延迟写入上限
    pub max_pending_writes: usize,
}

impl Default for WriteBehindConfig {
    fn default() -> Self {
        Self {
            default_delay_ms: 0,
            max_pending_writes: 10_000,
        }
    }
}

/// 存储后端类型
#[derive(Deserialize, Clone, Copy, Debug, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    /// 进程内存储
    #[default]
    Memory,
    /// Redis存储
    Redis,
}

/// 缓存存储配置
#[derive(Deserialize, Clone, Debug, Default)]
#[serde(default)]
pub struct StoreConfig {
    /// 后端类型
    pub backend: StoreBackend,
    /// 内存存储配置
    pub memory: MemoryStoreConfig,
    /// Redis存储配置
    pub redis: Option<RedisStoreConfig>,
}

/// 内存存储配置
#[derive(Deserialize, Clone, Debug)]
#[serde(default)]
pub struct MemoryStoreConfig {
    /// 最大条目数
    pub max_capacity: u64,
}

impl Default for MemoryStoreConfig {
    fn default() -> Self {
        Self {
            max_capacity: 10_000,
        }
    }
}

/// Redis存储配置
#[derive(Deserialize, Clone, Debug)]
#[serde(default)]
pub struct RedisStoreConfig {
    /// 连接字符串
    pub connection_string: SecretString,
    /// 连接超时时间（毫秒）
    pub connection_timeout_ms: u64,
    /// 命令执行超时时间（毫秒）
    pub command_timeout_ms: u64,
    /// 是否启用 TLS
    pub enable_tls: bool,
    /// 键前缀，clear 只清理带此前缀的键
    pub key_prefix: Option<String>,
}

impl Default for RedisStoreConfig {
    fn default() -> Self {
        Self {
            connection_string: SecretString::new("redis://localhost:6379".to_string().into()),
            connection_timeout_ms: 5000,
            command_timeout_ms: 3000,
            enable_tls: false,
            key_prefix: None,
        }
    }
}

/// 跨实例同步配置
#[derive(Deserialize, Clone, Debug)]
pub struct SyncConfig {
    /// 是否启用 Redis 发布订阅中继
    #[serde(default)]
    pub enabled: bool,
    /// 发布订阅频道名称
    #[serde(default = "default_sync_channel")]
    pub channel: String,
}

fn default_sync_channel() -> String {
    "cache:sync".to_string()
}

impl Config {
    /// 从 TOML 文件加载配置
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            CacheError::ConfigError(format!("Failed to read {}: {}", path.display(), e))
        })?;
        Self::from_toml_str(&content)
    }

    /// 从 TOML 字符串解析并校验配置
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Config =
            toml::from_str(content).map_err(|e| CacheError::ConfigError(e.to_string()))?;
        config.validate().map_err(CacheError::ConfigError)?;
        Ok(config)
    }

    /// 验证配置
    ///
    /// 检查配置的有效性，确保所有值在合理范围内
    pub fn validate(&self) -> std::result::Result<(), String> {
        if let Some(version) = &self.config_version {
            if *version > CONFIG_VERSION {
                return Err(format!(
                    "Configuration version {} is not supported. Current version is {}.",
                    version, CONFIG_VERSION
                ));
            }
        }

        let global = &self.global;
        if global.default_ttl == 0 {
            return Err("Global default_ttl cannot be zero".to_string());
        }

        if global.default_ttl > 86400 * 30 {
            return Err("Global default_ttl cannot exceed 30 days (2592000 seconds)".to_string());
        }

        if global.hot_key_threshold == 0 {
            return Err("Global hot_key_threshold cannot be zero".to_string());
        }

        if global.max_tracked_keys == 0 || global.max_tracked_keys > 10_000_000 {
            return Err("Global max_tracked_keys must be between 1 and 10,000,000".to_string());
        }

        if !(global.refresh_threshold > 0.0 && global.refresh_threshold < 1.0) {
            return Err("Global refresh_threshold must be between 0 and 1 (exclusive)".to_string());
        }

        if global.event_channel_capacity == 0 || global.event_channel_capacity > 1_000_000 {
            return Err(
                "Global event_channel_capacity must be between 1 and 1,000,000".to_string(),
            );
        }

        if global.max_key_length == 0 || global.max_key_length > 1024 {
            return Err("Global max_key_length must be between 1 and 1024".to_string());
        }

        if self.write_behind.max_pending_writes == 0 {
            return Err("write_behind max_pending_writes cannot be zero".to_string());
        }

        if self.write_behind.default_delay_ms > 3_600_000 {
            return Err("write_behind default_delay_ms cannot exceed 1 hour".to_string());
        }

        match self.store.backend {
            StoreBackend::Memory => {
                let capacity = self.store.memory.max_capacity;
                if capacity == 0 {
                    return Err("Memory store max_capacity cannot be zero".to_string());
                }
                if capacity > 10_000_000 {
                    return Err("Memory store max_capacity cannot exceed 10,000,000".to_string());
                }
            }
            StoreBackend::Redis => {
                let redis = self
                    .store
                    .redis
                    .as_ref()
                    .ok_or_else(|| "Redis store selected but [store.redis] is missing".to_string())?;

                if !(100..=30000).contains(&redis.connection_timeout_ms) {
                    return Err(
                        "Redis connection_timeout_ms must be between 100 and 30000 ms".to_string(),
                    );
                }

                if !(100..=60000).contains(&redis.command_timeout_ms) {
                    return Err(
                        "Redis command_timeout_ms must be between 100 and 60000 ms".to_string(),
                    );
                }
            }
        }

        if let Some(sync) = &self.sync {
            if sync.enabled && sync.channel.is_empty() {
                return Err("Sync channel cannot be empty when sync is enabled".to_string());
            }
            if sync.enabled && self.store.redis.is_none() {
                return Err("Sync relay requires a [store.redis] section".to_string());
            }
        }

        Ok(())
    }
}
