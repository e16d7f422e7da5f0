//! Copyright (c) 2025, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了缓存协调器及其访问模式执行器。
//!
//! - `coordinator`：协调器的构造、基础读写和运维接口
//! - `patterns`：cache-aside、write-through、write-behind、refresh-ahead、批量加载与预热
//! - `invalidation`：标签失效、模式失效和跨实例同步

pub mod coordinator;
mod invalidation;
mod patterns;

pub use coordinator::CacheCoordinator;

use std::time::Duration;

/// 单次调用的缓存选项
///
/// 所有字段都是可选的，未设置时使用协调器的全局配置。
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CacheOptions {
    /// 键的命名空间，实际键为 `"<namespace>:<key>"`
    pub namespace: Option<String>,
    /// 过期时间（秒）
    pub ttl: Option<u64>,
    /// 提前刷新阈值（剩余TTL比例）
    pub refresh_threshold: Option<f64>,
    /// 延迟写入的延迟
    pub delay: Option<Duration>,
    /// 写入成功后删除同命名空间下的其他键
    pub invalidate_on_write: bool,
    /// 写入后向其他实例广播
    pub broadcast: bool,
}

impl CacheOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = Some(namespace.into());
        self
    }

    pub fn ttl(mut self, seconds: u64) -> Self {
        self.ttl = Some(seconds);
        self
    }

    pub fn refresh_threshold(mut self, ratio: f64) -> Self {
        self.refresh_threshold = Some(ratio);
        self
    }

    pub fn delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn invalidate_on_write(mut self, enabled: bool) -> Self {
        self.invalidate_on_write = enabled;
        self
    }

    pub fn broadcast(mut self, enabled: bool) -> Self {
        self.broadcast = enabled;
        self
    }
}
