//! cachecoord - 缓存协调层
//!
//! 在任意键值存储之上提供 cache-aside、write-through、write-behind、
//! refresh-ahead、批量加载、缓存预热和基于标签的失效，
//! 并内置请求合并、命中率与热点键统计以及跨实例同步。

#![doc(html_root_url = "https://docs.rs/cachecoord/0.1.0")]

pub use serde;
pub use serde::{Deserialize, Serialize};
pub use serde_json;
pub use tokio;

pub mod backend;
pub mod cli;
pub mod client;
pub mod config;
pub mod error;
pub mod events;
pub mod metrics;
pub mod serialization;
pub mod sync;
pub mod tags;
pub mod telemetry;
pub mod utils;

// Re-export commonly used items
pub use backend::{CacheStore, MemoryStore, RedisStore, SharedStore};
pub use client::{CacheCoordinator, CacheOptions};
pub use config::Config;
pub use error::{CacheError, Result};
pub use events::{CacheEvent, CacheEventKind};
pub use metrics::{MetricsSnapshot, PatternStats};
pub use sync::invalidation::{CacheSyncMessage, SyncAction, SyncRelay};
pub use sync::warmup::{WarmupResult, WarmupStatus};

/// cachecoord 版本号
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
