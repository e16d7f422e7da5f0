//! Copyright (c) 2025, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了测试的通用工具函数和设置。

#![allow(dead_code)]

use async_trait::async_trait;
use cachecoord::backend::{CacheStore, MemoryStore, StoreInfo, StoreStats};
use cachecoord::{CacheCoordinator, CacheError, CacheEvent, Config, Result};
use futures::future::BoxFuture;
use futures::FutureExt;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Once};
use std::time::Duration;
use tokio::sync::broadcast::{self, error::RecvError};
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::EnvFilter;

static INIT: Once = Once::new();

pub fn setup_logging() {
    INIT.call_once(|| {
        tracing_subscriber::fmt()
            .with_span_events(FmtSpan::CLOSE)
            .with_env_filter(EnvFilter::new("debug"))
            .try_init()
            .ok();
    });
}

/// 使用内存存储和默认配置的协调器
pub fn memory_coordinator() -> CacheCoordinator {
    coordinator_with(Config::default())
}

pub fn coordinator_with(config: Config) -> CacheCoordinator {
    setup_logging();
    CacheCoordinator::new(Arc::new(MemoryStore::new(10_000)), &config)
}

/// 记录调用次数的加载器
///
/// 每次调用等待 `delay` 后返回 `value`
pub fn counting_loader<T>(
    calls: Arc<AtomicUsize>,
    value: T,
    delay: Duration,
) -> impl FnOnce(String) -> BoxFuture<'static, Result<T>> + Send + 'static
where
    T: Send + 'static,
{
    move |_key: String| {
        async move {
            calls.fetch_add(1, Ordering::SeqCst);
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            Ok(value)
        }
        .boxed()
    }
}

/// 总是失败的加载器
pub fn failing_loader<T>(
    calls: Arc<AtomicUsize>,
    delay: Duration,
) -> impl FnOnce(String) -> BoxFuture<'static, Result<T>> + Send + 'static
where
    T: Send + 'static,
{
    move |key: String| {
        async move {
            calls.fetch_add(1, Ordering::SeqCst);
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            Err(CacheError::LoaderError(format!("source unavailable for {}", key)))
        }
        .boxed()
    }
}

/// 等待指定名称的事件，5 秒超时
pub async fn wait_for_event(rx: &mut broadcast::Receiver<CacheEvent>, name: &str) -> CacheEvent {
    let wait = async {
        loop {
            match rx.recv().await {
                Ok(event) if event.name() == name => return event,
                Ok(_) | Err(RecvError::Lagged(_)) => continue,
                Err(RecvError::Closed) => panic!("event channel closed while waiting for {}", name),
            }
        }
    };
    tokio::time::timeout(Duration::from_secs(5), wait)
        .await
        .unwrap_or_else(|_| panic!("timed out waiting for {}", name))
}

/// 可按开关注入故障的内存存储
pub struct FailingStore {
    inner: MemoryStore,
    pub fail_get: AtomicBool,
    pub fail_set: AtomicBool,
    pub fail_delete: AtomicBool,
}

impl FailingStore {
    pub fn new() -> Self {
        Self {
            inner: MemoryStore::new(10_000),
            fail_get: AtomicBool::new(false),
            fail_set: AtomicBool::new(false),
            fail_delete: AtomicBool::new(false),
        }
    }

    fn check(flag: &AtomicBool, op: &str) -> Result<()> {
        if flag.load(Ordering::SeqCst) {
            Err(CacheError::StoreError(format!("injected {} failure", op)))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl CacheStore for FailingStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        Self::check(&self.fail_get, "get")?;
        self.inner.get(key).await
    }

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Option<u64>) -> Result<bool> {
        Self::check(&self.fail_set, "set")?;
        self.inner.set(key, value, ttl).await
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        Self::check(&self.fail_delete, "delete")?;
        self.inner.delete(key).await
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        self.inner.exists(key).await
    }

    async fn keys(&self, pattern: &str) -> Result<Vec<String>> {
        self.inner.keys(pattern).await
    }

    async fn ttl(&self, key: &str) -> Result<Option<Duration>> {
        self.inner.ttl(key).await
    }

    async fn clear(&self) -> Result<()> {
        self.inner.clear().await
    }

    async fn stats(&self) -> Result<StoreStats> {
        self.inner.stats().await
    }

    fn config(&self) -> StoreInfo {
        StoreInfo {
            backend: "failing-memory",
            ..self.inner.config()
        }
    }

    async fn close(&self) -> Result<()> {
        self.inner.close().await
    }
}

/// 使用故障注入存储的协调器，同时返回存储句柄
pub fn failing_coordinator() -> (CacheCoordinator, Arc<FailingStore>) {
    setup_logging();
    let store = Arc::new(FailingStore::new());
    let coordinator = CacheCoordinator::new(store.clone(), &Config::default());
    (coordinator, store)
}
