//! Copyright (c) 2025, Kirky.X
//!
//! MIT License
//!
//! 该模块实现了协调器的失效接口：标签失效、模式失效以及跨实例同步。

use super::{CacheCoordinator, CacheOptions};
use crate::error::{CacheError, Result};
use crate::events::CacheEventKind;
use crate::metrics::bump;
use crate::serialization::Serializer;
use crate::sync::invalidation::{CacheSyncMessage, SyncAction};
use crate::utils::validate_tags;
use serde::Serialize;
use std::sync::atomic::Ordering;
use tracing::{debug, info, instrument, warn};

impl CacheCoordinator {
    /// 删除一组键并把它们移出标签索引
    ///
    /// 返回真正删除的数量；已经不存在的键不计数，但仍会从索引中移除。
    /// 任意一次删除失败时继续处理其余键，最后返回第一个错误。
    pub(super) async fn delete_keys<I>(&self, keys: I, label: String) -> Result<usize>
    where
        I: IntoIterator<Item = String>,
    {
        let mut deleted = 0usize;
        let mut first_error: Option<CacheError> = None;
        for key in keys {
            match self.store.delete(&key).await {
                Ok(removed) => {
                    self.tags.remove_key(&key).await;
                    if removed {
                        deleted += 1;
                    }
                }
                Err(e) => {
                    warn!("invalidate: failed to delete {}: {}", key, e);
                    self.emit_error(&key, "invalidate", &e);
                    first_error.get_or_insert(e);
                }
            }
        }

        self.metrics
            .patterns
            .invalidated_keys
            .fetch_add(deleted as u64, Ordering::Relaxed);
        debug!("invalidated {} key(s) for {}", deleted, label);
        self.events.emit(CacheEventKind::Invalidated {
            pattern: label,
            count: deleted,
        });

        match first_error {
            Some(e) => Err(e),
            None => Ok(deleted),
        }
    }

    /// 写入值并把键登记到每个标签下
    #[instrument(skip(self, value, options), level = "debug", fields(service = %self.service_name))]
    pub async fn set_with_tags<T, S>(
        &self,
        key: &str,
        value: &T,
        tags: &[S],
        options: &CacheOptions,
    ) -> Result<bool>
    where
        T: Serialize + Sync,
        S: AsRef<str> + Sync + std::fmt::Debug,
    {
        validate_tags(tags)?;
        let cache_key = self.put(key, value, options).await?;
        let tags: Vec<String> = tags.iter().map(|t| t.as_ref().to_string()).collect();
        self.tags.tag(&cache_key, &tags).await;
        Ok(true)
    }

    /// 按单个标签失效
    pub async fn invalidate_by_tag(&self, tag: &str) -> Result<usize> {
        self.invalidate_by_tags(&[tag]).await
    }

    /// 按标签失效
    ///
    /// 删除所有标签下的键并把它们移出索引，变空的标签随之剪除。
    /// 返回真正删除的键数量，重复调用返回 0。
    #[instrument(skip(self), level = "info", fields(service = %self.service_name))]
    pub async fn invalidate_by_tags<S>(&self, tags: &[S]) -> Result<usize>
    where
        S: AsRef<str> + Sync + std::fmt::Debug,
    {
        let tags: Vec<String> = tags.iter().map(|t| t.as_ref().to_string()).collect();
        let keys = self.tags.keys_for(&tags).await;
        let label = format!("tags:{}", tags.join(","));
        let deleted = self.delete_keys(keys, label).await?;
        info!("Invalidated {} key(s) tagged {:?}", deleted, tags);
        Ok(deleted)
    }

    /// 按 glob 模式失效（`*` 和 `?`），模式作用于实际存储键
    #[instrument(skip(self), level = "info", fields(service = %self.service_name))]
    pub async fn invalidate_pattern(&self, pattern: &str) -> Result<usize> {
        let keys = self.store.keys(pattern).await?;
        let deleted = self.delete_keys(keys, pattern.to_string()).await?;
        info!("Invalidated {} key(s) matching {}", deleted, pattern);
        Ok(deleted)
    }

    /// 应用来自其他实例的同步消息
    ///
    /// 本实例发出的消息被忽略并返回 0，否则返回受影响的键数量。
    #[instrument(skip(self, message), level = "debug", fields(service = %self.service_name, origin = %message.origin))]
    pub async fn handle_cache_sync(&self, message: CacheSyncMessage) -> Result<usize> {
        if message.origin == self.instance_id {
            debug!("sync: ignoring own message");
            return Ok(0);
        }

        let affected = match &message.action {
            SyncAction::Invalidate { key } => {
                self.delete_keys([key.clone()], key.clone()).await?
            }
            SyncAction::InvalidatePattern { pattern } => self.invalidate_pattern(pattern).await?,
            SyncAction::InvalidateTags { tags } => self.invalidate_by_tags(tags).await?,
            SyncAction::Set { key, value, ttl } => {
                self.store.set(key, value.clone(), *ttl).await?;
                1
            }
        };

        bump(&self.metrics.patterns.sync_applied);
        self.events.emit(CacheEventKind::Sync { message });
        Ok(affected)
    }

    /// 写入本地缓存，`options.broadcast` 为真时发出 `cache:broadcast`
    #[instrument(skip(self, value, options), level = "debug", fields(service = %self.service_name))]
    pub async fn distributed_set<T: Serialize + Sync>(
        &self,
        key: &str,
        value: &T,
        options: &CacheOptions,
    ) -> Result<bool> {
        let cache_key = self.cache_key(key, options)?;
        let ttl = self.ttl_for(options);
        let bytes = self.serializer.serialize(value)?;
        self.store.set(&cache_key, bytes.clone(), Some(ttl)).await?;

        if options.broadcast {
            self.broadcast(SyncAction::Set {
                key: cache_key,
                value: bytes,
                ttl: Some(ttl),
            });
        }
        Ok(true)
    }

    /// 删除本地缓存项，`options.broadcast` 为真时通知其他实例一起删除
    #[instrument(skip(self, options), level = "debug", fields(service = %self.service_name))]
    pub async fn distributed_delete(&self, key: &str, options: &CacheOptions) -> Result<bool> {
        let cache_key = self.cache_key(key, options)?;
        let removed = self.store.delete(&cache_key).await?;
        self.tags.remove_key(&cache_key).await;

        if options.broadcast {
            self.broadcast(SyncAction::Invalidate { key: cache_key });
        }
        Ok(removed)
    }

    fn broadcast(&self, action: SyncAction) {
        bump(&self.metrics.patterns.broadcasts);
        if self.events.subscriber_count() == 0 {
            warn!("broadcast requested but nothing is relaying events");
        }
        self.events.emit(CacheEventKind::Broadcast {
            message: CacheSyncMessage::new(self.instance_id, action),
        });
    }
}
