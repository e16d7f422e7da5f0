//! Copyright (c) 2025, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了后台任务监管器和延迟写入队列。

use crate::error::{CacheError, Result};
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info};

/// 后台任务监管器
///
/// 刷新、延迟写入和同步中继都在这里派生，关闭时统一取消并等待。
#[derive(Clone, Debug, Default)]
pub struct TaskSupervisor {
    tracker: TaskTracker,
    cancel: CancellationToken,
}

impl TaskSupervisor {
    pub fn new() -> Self {
        Self::default()
    }

    /// 派生受监管的后台任务
    pub fn spawn<F>(&self, task: F) -> JoinHandle<F::Output>
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        self.tracker.spawn(task)
    }

    /// 关闭信号
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn is_shutting_down(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub fn active_tasks(&self) -> usize {
        self.tracker.len()
    }

    /// 发出取消信号并等待所有任务结束
    pub async fn shutdown(&self) {
        info!(
            "TaskSupervisor: shutting down, {} task(s) outstanding",
            self.tracker.len()
        );
        self.cancel.cancel();
        self.tracker.close();
        self.tracker.wait().await;
        debug!("TaskSupervisor: all tasks finished");
    }
}

/// 延迟写入队列中的一个名额
///
/// 释放时归还名额，因此提前返回的调用不会泄漏队列深度。
#[derive(Debug)]
pub struct PendingSlot {
    pending: Arc<AtomicUsize>,
}

impl Drop for PendingSlot {
    fn drop(&mut self) {
        self.pending.fetch_sub(1, Ordering::AcqRel);
    }
}

/// 延迟写入队列
///
/// 深度受 `max_pending` 限制；延迟在关闭时被取消，挂起的写入立即落库。
#[derive(Clone, Debug)]
pub struct WriteBehindQueue {
    supervisor: TaskSupervisor,
    pending: Arc<AtomicUsize>,
    max_pending: usize,
}

impl WriteBehindQueue {
    pub fn new(supervisor: TaskSupervisor, max_pending: usize) -> Self {
        Self {
            supervisor,
            pending: Arc::new(AtomicUsize::new(0)),
            max_pending: max_pending.max(1),
        }
    }

    /// 预留一个名额，超过上限时返回 Backpressure
    pub fn reserve(&self) -> Result<PendingSlot> {
        if self.supervisor.is_shutting_down() {
            return Err(CacheError::ShutdownError(
                "write-behind queue is shutting down".to_string(),
            ));
        }
        let max = self.max_pending;
        self.pending
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| {
                (n < max).then_some(n + 1)
            })
            .map_err(|n| {
                CacheError::Backpressure(format!("{} write-behind operations already pending", n))
            })?;
        Ok(PendingSlot {
            pending: Arc::clone(&self.pending),
        })
    }

    /// 在延迟之后执行写入任务
    pub fn schedule<F>(&self, slot: PendingSlot, delay: Duration, write: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let cancel = self.supervisor.cancellation_token();
        self.supervisor.spawn(async move {
            if !delay.is_zero() {
                tokio::select! {
                    _ = tokio::time::sleep(delay) => {}
                    _ = cancel.cancelled() => {
                        debug!("WriteBehindQueue: shutdown requested, flushing now");
                    }
                }
            }
            write.await;
            drop(slot);
        });
    }

    pub fn pending(&self) -> usize {
        self.pending.load(Ordering::Acquire)
    }
}
