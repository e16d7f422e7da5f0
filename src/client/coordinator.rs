//! Copyright (c) 2025, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了缓存协调器的构造、基础读写和运维接口。

use super::CacheOptions;
use crate::backend::{self, redis_store::resolve_connection_string, SharedStore, StoreStats};
use crate::config::{Config, GlobalConfig};
use crate::error::{CacheError, Result};
use crate::events::{CacheEvent, CacheEventKind, EventEmitter};
use crate::metrics::{Metrics, MetricsSnapshot, PatternStats};
use crate::serialization::{Serializer, SerializerEnum};
use crate::sync::coalescer::RequestCoalescer;
use crate::sync::invalidation::SyncRelay;
use crate::sync::warmup::{WarmupStatus, WarmupTracker};
use crate::sync::write_behind::{TaskSupervisor, WriteBehindQueue};
use crate::tags::TagIndex;
use crate::utils::{namespaced_key, validate_key_length};
use serde::{de::DeserializeOwned, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

const DEFAULT_SERVICE_NAME: &str = "cachecoord";

/// 缓存协调器
///
/// 持有请求合并表、标签索引、指标和后台任务，所有访问模式都通过它执行。
/// 克隆开销很小，克隆体共享同一份状态。
#[derive(Clone)]
pub struct CacheCoordinator {
    pub(super) instance_id: Uuid,
    pub(super) service_name: Arc<str>,
    pub(super) global: Arc<GlobalConfig>,
    pub(super) default_delay: Duration,
    pub(super) store: SharedStore,
    pub(super) serializer: SerializerEnum,
    pub(super) events: EventEmitter,
    pub(super) coalescer: RequestCoalescer,
    pub(super) tags: Arc<TagIndex>,
    pub(super) metrics: Arc<Metrics>,
    pub(super) supervisor: TaskSupervisor,
    pub(super) write_behind: WriteBehindQueue,
    pub(super) warmup: WarmupTracker,
}

impl std::fmt::Debug for CacheCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheCoordinator")
            .field("service_name", &self.service_name)
            .field("instance_id", &self.instance_id)
            .field("backend", &self.store.config().backend)
            .finish()
    }
}

impl CacheCoordinator {
    /// 基于已有存储创建协调器
    ///
    /// # 参数
    ///
    /// * `store` - 缓存存储
    /// * `config` - 配置，只使用 `[global]` 和 `[write_behind]` 部分
    pub fn new(store: SharedStore, config: &Config) -> Self {
        let global = config.global.clone();
        let supervisor = TaskSupervisor::new();
        let write_behind =
            WriteBehindQueue::new(supervisor.clone(), config.write_behind.max_pending_writes);
        Self {
            instance_id: Uuid::new_v4(),
            service_name: Arc::from(DEFAULT_SERVICE_NAME),
            serializer: SerializerEnum::from_config(&global),
            events: EventEmitter::new(global.event_channel_capacity),
            metrics: Arc::new(Metrics::new(
                global.hot_key_threshold,
                global.max_tracked_keys,
            )),
            global: Arc::new(global),
            default_delay: Duration::from_millis(config.write_behind.default_delay_ms),
            store,
            coalescer: RequestCoalescer::with_supervisor(supervisor.clone()),
            tags: Arc::new(TagIndex::new()),
            supervisor,
            write_behind,
            warmup: WarmupTracker::new(),
        }
    }

    /// 根据配置连接存储并创建协调器
    ///
    /// 启用 `[sync]` 时同时启动 Redis 同步中继。
    #[instrument(skip(config), level = "info")]
    pub async fn from_config(config: &Config) -> Result<Self> {
        config.validate().map_err(CacheError::ConfigError)?;
        let store = backend::connect(config).await?;
        let coordinator = Self::new(store, config);

        if let Some(sync) = config.sync.as_ref().filter(|s| s.enabled) {
            let redis_config = config.store.redis.as_ref().ok_or_else(|| {
                CacheError::ConfigError("Sync relay requires a [store.redis] section".into())
            })?;
            let client = redis::Client::open(resolve_connection_string(redis_config))?;
            SyncRelay::new(client, sync.channel.clone())
                .start(&coordinator)
                .await?;
        }

        info!(
            "CacheCoordinator ready: backend={}, instance={}",
            coordinator.store.config().backend,
            coordinator.instance_id
        );
        Ok(coordinator)
    }

    /// 设置服务名称，用于日志字段和指标标签
    pub fn with_service_name(mut self, name: impl Into<String>) -> Self {
        self.service_name = Arc::from(name.into());
        self
    }

    pub fn service_name(&self) -> &str {
        &self.service_name
    }

    pub fn instance_id(&self) -> Uuid {
        self.instance_id
    }

    pub fn store(&self) -> &SharedStore {
        &self.store
    }

    pub(crate) fn supervisor(&self) -> &TaskSupervisor {
        &self.supervisor
    }

    /// 构造实际存储键并检查长度
    pub(super) fn cache_key(&self, key: &str, options: &CacheOptions) -> Result<String> {
        let cache_key = namespaced_key(options.namespace.as_deref(), key);
        validate_key_length(&cache_key, self.global.max_key_length)?;
        Ok(cache_key)
    }

    pub(super) fn ttl_for(&self, options: &CacheOptions) -> u64 {
        options.ttl.unwrap_or(self.global.default_ttl)
    }

    pub(super) fn emit_error(&self, key: &str, operation: &'static str, error: &CacheError) {
        self.events.emit(CacheEventKind::Error {
            key: key.to_string(),
            operation,
            error: error.to_string(),
        });
    }

    /// 删除缓存项并把它移出标签索引，失败只记录日志
    pub(super) async fn evict(&self, cache_key: &str) -> bool {
        match self.store.delete(cache_key).await {
            Ok(removed) => {
                self.tags.remove_key(cache_key).await;
                removed
            }
            Err(e) => {
                warn!("failed to evict {}: {}", cache_key, e);
                false
            }
        }
    }

    /// 序列化并写入存储，返回实际存储键
    pub(super) async fn put<T: Serialize>(
        &self,
        key: &str,
        value: &T,
        options: &CacheOptions,
    ) -> Result<String> {
        let cache_key = self.cache_key(key, options)?;
        let bytes = self.serializer.serialize(value)?;
        if let Err(e) = self
            .store
            .set(&cache_key, bytes, Some(self.ttl_for(options)))
            .await
        {
            self.emit_error(&cache_key, "set", &e);
            return Err(e);
        }
        Ok(cache_key)
    }

    /// 直接读取缓存，不触发加载，也不计入命中率
    #[instrument(skip(self, options), level = "debug", fields(service = %self.service_name))]
    pub async fn get<T: DeserializeOwned>(
        &self,
        key: &str,
        options: &CacheOptions,
    ) -> Result<Option<T>> {
        let cache_key = self.cache_key(key, options)?;
        match self.store.get(&cache_key).await? {
            Some(bytes) => Ok(Some(self.serializer.deserialize(&bytes)?)),
            None => Ok(None),
        }
    }

    /// 直接写入缓存
    #[instrument(skip(self, value, options), level = "debug", fields(service = %self.service_name))]
    pub async fn set<T: Serialize + Sync>(
        &self,
        key: &str,
        value: &T,
        options: &CacheOptions,
    ) -> Result<bool> {
        self.put(key, value, options).await?;
        Ok(true)
    }

    /// 删除缓存项，返回键是否存在
    #[instrument(skip(self, options), level = "debug", fields(service = %self.service_name))]
    pub async fn delete(&self, key: &str, options: &CacheOptions) -> Result<bool> {
        let cache_key = self.cache_key(key, options)?;
        let removed = self.store.delete(&cache_key).await?;
        self.tags.remove_key(&cache_key).await;
        Ok(removed)
    }

    /// 清空存储和标签索引
    #[instrument(skip(self), level = "info", fields(service = %self.service_name))]
    pub async fn clear(&self) -> Result<()> {
        self.store.clear().await?;
        let dropped = self.tags.tag_count().await;
        self.tags.clear().await;
        info!("Cache cleared, dropped {} tag(s)", dropped);
        Ok(())
    }

    /// 订阅缓存事件
    pub fn subscribe(&self) -> broadcast::Receiver<CacheEvent> {
        self.events.subscribe()
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    pub fn pattern_stats(&self) -> PatternStats {
        self.metrics.patterns.snapshot()
    }

    /// 访问次数达到阈值的键，按次数降序
    pub fn hot_keys(&self) -> Vec<(String, u64)> {
        self.metrics.hot_keys()
    }

    pub fn reset_metrics(&self) {
        debug!("resetting metrics for {}", self.service_name);
        self.metrics.reset();
    }

    /// 以 Prometheus 文本格式导出指标
    pub fn render_metrics(&self) -> String {
        self.metrics.render(&self.service_name)
    }

    pub async fn store_stats(&self) -> Result<StoreStats> {
        self.store.stats().await
    }

    pub async fn has_tag(&self, tag: &str) -> bool {
        self.tags.contains_tag(tag).await
    }

    pub async fn tags_of(&self, key: &str, options: &CacheOptions) -> Result<Vec<String>> {
        let cache_key = self.cache_key(key, options)?;
        let mut tags: Vec<String> = self.tags.tags_of(&cache_key).await.into_iter().collect();
        tags.sort();
        Ok(tags)
    }

    pub async fn warmup_status(&self) -> WarmupStatus {
        self.warmup.status().await
    }

    /// 尚未落库的延迟写入数量
    pub fn pending_writes(&self) -> usize {
        self.write_behind.pending()
    }

    /// 正在进行的加载数量
    pub fn in_flight_loads(&self) -> usize {
        self.coalescer.in_flight_count()
    }

    /// 关闭协调器
    ///
    /// 取消挂起写入的延迟使其立即落库，等待所有后台任务结束，然后关闭存储。
    #[instrument(skip(self), level = "info", fields(service = %self.service_name))]
    pub async fn shutdown(&self) -> Result<()> {
        info!(
            "Shutting down coordinator, {} pending write(s)",
            self.write_behind.pending()
        );
        self.supervisor.shutdown().await;
        self.store.close().await?;
        info!("Coordinator shut down");
        Ok(())
    }
}
