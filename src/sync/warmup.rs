//! Copyright (c) 2025, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了缓存预热的结果统计和状态跟踪。

use serde::Serialize;
use std::sync::Arc;
use tokio::sync::RwLock;

/// 预热状态
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum WarmupStatus {
    Pending,
    InProgress { total: usize },
    Completed { loaded: usize, failed: usize },
    Failed { error: String },
}

/// 预热结果
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct WarmupResult {
    /// 成功写入缓存的条目数
    pub loaded: usize,
    /// 写入失败（或加载器失败时全部请求）的条目数
    pub failed: usize,
    /// 加载器没有返回的请求键数量
    pub skipped: usize,
}

impl WarmupResult {
    /// 加载器整体失败
    pub fn loader_failed(requested: usize) -> Self {
        Self {
            loaded: 0,
            failed: requested,
            skipped: 0,
        }
    }

    pub fn is_success(&self) -> bool {
        self.failed == 0
    }
}

/// 最近一次预热的状态
#[derive(Debug, Clone)]
pub struct WarmupTracker {
    status: Arc<RwLock<WarmupStatus>>,
}

impl Default for WarmupTracker {
    fn default() -> Self {
        Self {
            status: Arc::new(RwLock::new(WarmupStatus::Pending)),
        }
    }
}

impl WarmupTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn begin(&self, total: usize) {
        *self.status.write().await = WarmupStatus::InProgress { total };
    }

    pub async fn finish(&self, result: &WarmupResult) {
        *self.status.write().await = WarmupStatus::Completed {
            loaded: result.loaded,
            failed: result.failed,
        };
    }

    pub async fn fail(&self, error: String) {
        *self.status.write().await = WarmupStatus::Failed { error };
    }

    pub async fn status(&self) -> WarmupStatus {
        self.status.read().await.clone()
    }
}
