//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了请求合并器：同一个键在任意时刻至多只有一次正在进行的加载。

use super::write_behind::TaskSupervisor;
use crate::error::{CacheError, Result};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use futures::future::{BoxFuture, FutureExt, Shared};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tracing::debug;

/// 一次加载的结果：序列化后的值
pub type LoadOutcome = Result<Vec<u8>>;

/// 可被多个调用方共同等待的加载
pub type SharedLoad = Shared<BoxFuture<'static, LoadOutcome>>;

/// 调用方在一次加载中的角色
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// 发起了这次加载
    Leader,
    /// 加入了已经在进行的加载
    Follower,
}

/// 请求合并器
///
/// 正在进行的加载保存在表中。加载派生在后台任务上运行，
/// 即使所有调用方都放弃等待也会执行到底，结束时（无论成功、失败还是 panic）
/// 由加载任务本身把条目移除。后到的调用方要么加入同一次加载，
/// 要么在其结束之后发起新的加载。
#[derive(Clone, Default)]
pub struct RequestCoalescer {
    in_flight: Arc<DashMap<String, SharedLoad>>,
    supervisor: TaskSupervisor,
}

impl std::fmt::Debug for RequestCoalescer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestCoalescer")
            .field("in_flight", &self.in_flight.len())
            .finish()
    }
}

impl RequestCoalescer {
    pub fn new() -> Self {
        Self::default()
    }

    /// 在指定的监管器上运行加载，关闭时会一并等待
    pub fn with_supervisor(supervisor: TaskSupervisor) -> Self {
        Self {
            in_flight: Arc::new(DashMap::new()),
            supervisor,
        }
    }

    /// 加入或发起一次加载
    ///
    /// 只有在没有正在进行的加载时才会调用 `start` 创建新的加载，
    /// 新的加载立即在后台开始执行，不依赖返回的 future 被轮询。
    pub fn join_or_start<F>(&self, key: &str, start: F) -> (SharedLoad, Role)
    where
        F: FnOnce() -> BoxFuture<'static, LoadOutcome>,
    {
        match self.in_flight.entry(key.to_string()) {
            Entry::Occupied(entry) => {
                debug!("coalescer: joining in-flight load for key={}", key);
                (entry.get().clone(), Role::Follower)
            }
            Entry::Vacant(entry) => {
                let table = Arc::clone(&self.in_flight);
                let owned_key = key.to_string();
                let load = start();
                // 条目在 entry 锁释放之前插入，任务的移除不会早于插入
                let handle = self.supervisor.spawn(async move {
                    // release 配置使用 panic = "abort"，panic 捕获只在 unwind 构建中生效
                    let outcome = AssertUnwindSafe(load)
                        .catch_unwind()
                        .await
                        .unwrap_or_else(|_| {
                            Err(CacheError::LoaderError(format!(
                                "loader for {} panicked",
                                owned_key
                            )))
                        });
                    table.remove(&owned_key);
                    outcome
                });
                let task_key = key.to_string();
                let shared = async move {
                    handle.await.unwrap_or_else(|e| {
                        Err(CacheError::LoaderError(format!(
                            "load task for {} did not finish: {}",
                            task_key, e
                        )))
                    })
                }
                .boxed()
                .shared();
                entry.insert(shared.clone());
                (shared, Role::Leader)
            }
        }
    }

    /// 加入或发起一次加载并等待其结果
    pub async fn run<F>(&self, key: &str, start: F) -> (LoadOutcome, Role)
    where
        F: FnOnce() -> BoxFuture<'static, LoadOutcome>,
    {
        let (load, role) = self.join_or_start(key, start);
        (load.await, role)
    }

    pub fn is_in_flight(&self, key: &str) -> bool {
        self.in_flight.contains_key(key)
    }

    pub fn in_flight_count(&self) -> usize {
        self.in_flight.len()
    }
}
