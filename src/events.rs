//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了缓存事件及其广播通道。
//!
//! 事件通过有界的 `tokio::sync::broadcast` 通道分发，发送方永不阻塞；
//! 处理过慢的订阅者会收到 `Lagged` 并丢失最旧的事件。

use crate::sync::invalidation::CacheSyncMessage;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::broadcast;
use tracing::trace;

/// 缓存事件负载
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "kebab-case")]
pub enum CacheEventKind {
    Hit {
        key: String,
        latency_ms: f64,
    },
    Miss {
        key: String,
    },
    Loaded {
        key: String,
        latency_ms: f64,
    },
    Error {
        key: String,
        operation: &'static str,
        error: String,
    },
    WriteThrough {
        key: String,
        latency_ms: f64,
    },
    WriteBehindCached {
        key: String,
        delay_ms: u64,
    },
    WriteBehindPersisted {
        key: String,
        latency_ms: f64,
    },
    RefreshAheadTriggered {
        key: String,
        remaining_ratio: f64,
    },
    RefreshAheadCompleted {
        key: String,
        latency_ms: f64,
    },
    Invalidated {
        pattern: String,
        count: usize,
    },
    BatchResult {
        requested: usize,
        hits: usize,
        misses: usize,
        latency_ms: f64,
    },
    Warmed {
        loaded: usize,
        failed: usize,
        latency_ms: f64,
    },
    Sync {
        message: CacheSyncMessage,
    },
    Broadcast {
        message: CacheSyncMessage,
    },
}

impl CacheEventKind {
    /// 事件名称，与对外约定的事件名一致
    pub fn name(&self) -> &'static str {
        match self {
            CacheEventKind::Hit { .. } => "cache:hit",
            CacheEventKind::Miss { .. } => "cache:miss",
            CacheEventKind::Loaded { .. } => "cache:loaded",
            CacheEventKind::Error { .. } => "cache:error",
            CacheEventKind::WriteThrough { .. } => "cache:write-through",
            CacheEventKind::WriteBehindCached { .. } => "cache:write-behind:cached",
            CacheEventKind::WriteBehindPersisted { .. } => "cache:write-behind:persisted",
            CacheEventKind::RefreshAheadTriggered { .. } => "cache:refresh-ahead:triggered",
            CacheEventKind::RefreshAheadCompleted { .. } => "cache:refresh-ahead:completed",
            CacheEventKind::Invalidated { .. } => "cache:invalidated",
            CacheEventKind::BatchResult { .. } => "cache:batch-result",
            CacheEventKind::Warmed { .. } => "cache:warmed",
            CacheEventKind::Sync { .. } => "cache:sync",
            CacheEventKind::Broadcast { .. } => "cache:broadcast",
        }
    }
}

/// 带时间戳的缓存事件
#[derive(Debug, Clone, Serialize)]
pub struct CacheEvent {
    pub at: DateTime<Utc>,
    #[serde(flatten)]
    pub kind: CacheEventKind,
}

impl CacheEvent {
    pub fn name(&self) -> &'static str {
        self.kind.name()
    }
}

/// 事件发射器
#[derive(Clone, Debug)]
pub struct EventEmitter {
    sender: broadcast::Sender<CacheEvent>,
}

impl EventEmitter {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// 发送事件；没有订阅者时直接丢弃
    pub fn emit(&self, kind: CacheEventKind) {
        trace!(event = kind.name(), "emit");
        let _ = self.sender.send(CacheEvent {
            at: Utc::now(),
            kind,
        });
    }

    pub fn subscribe(&self) -> broadcast::Receiver<CacheEvent> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

/// 毫秒耗时
pub(crate) fn elapsed_ms(start: std::time::Instant) -> f64 {
    start.elapsed().as_secs_f64() * 1000.0
}
