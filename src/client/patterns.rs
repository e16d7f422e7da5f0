//! Copyright (c) 2025, Kirky.X
//!
//! MIT License
//!
//! 该模块实现了协调器的访问模式：cache-aside、write-through、write-behind、
//! refresh-ahead、批量 cache-aside 和缓存预热。

use super::{CacheCoordinator, CacheOptions};
use crate::error::Result;
use crate::events::{elapsed_ms, CacheEventKind};
use crate::metrics::bump;
use crate::serialization::Serializer;
use crate::sync::coalescer::{LoadOutcome, Role};
use crate::sync::warmup::WarmupResult;
use futures::FutureExt;
use serde::{de::DeserializeOwned, Serialize};
use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::time::Instant;
use tracing::{debug, info, instrument, warn};

impl CacheCoordinator {
    /// Cache-aside 读取
    ///
    /// 命中直接返回；未命中时同一个键只会调用一次 `loader`，
    /// 并发到达的调用方共享这次加载的结果（包括错误）。
    ///
    /// # 参数
    ///
    /// * `key` - 调用方的键（不含命名空间），原样传给 `loader`
    /// * `loader` - 从数据源加载值
    /// * `options` - 命名空间和 TTL
    #[instrument(skip(self, loader, options), level = "debug", fields(service = %self.service_name))]
    pub async fn cache_aside<T, F, Fut>(
        &self,
        key: &str,
        loader: F,
        options: &CacheOptions,
    ) -> Result<T>
    where
        T: Serialize + DeserializeOwned + Send + 'static,
        F: FnOnce(String) -> Fut + Send + 'static,
        Fut: Future<Output = Result<T>> + Send + 'static,
    {
        bump(&self.metrics.patterns.cache_aside_calls);
        let cache_key = self.cache_key(key, options)?;
        self.read_or_load(key, cache_key, loader, options).await
    }

    async fn read_or_load<T, F, Fut>(
        &self,
        key: &str,
        cache_key: String,
        loader: F,
        options: &CacheOptions,
    ) -> Result<T>
    where
        T: Serialize + DeserializeOwned + Send + 'static,
        F: FnOnce(String) -> Fut + Send + 'static,
        Fut: Future<Output = Result<T>> + Send + 'static,
    {
        let start = Instant::now();
        let cached = match self.store.get(&cache_key).await {
            Ok(cached) => cached,
            Err(e) => {
                self.emit_error(&cache_key, "get", &e);
                return Err(e);
            }
        };

        if let Some(bytes) = cached {
            self.metrics.record_access(&cache_key, true);
            self.events.emit(CacheEventKind::Hit {
                key: cache_key,
                latency_ms: elapsed_ms(start),
            });
            return self.serializer.deserialize(&bytes);
        }

        self.metrics.record_access(&cache_key, false);
        self.events.emit(CacheEventKind::Miss {
            key: cache_key.clone(),
        });

        let ttl = self.ttl_for(options);
        let this = self.clone();
        let source_key = key.to_string();
        let load_key = cache_key.clone();
        let (outcome, role) = self
            .coalescer
            .run(&cache_key, move || {
                this.load_into_store(source_key, load_key, loader, ttl)
                    .boxed()
            })
            .await;
        if role == Role::Follower {
            bump(&self.metrics.patterns.coalesced_joins);
        }
        let bytes = outcome?;
        self.serializer.deserialize(&bytes)
    }

    /// 调用 loader 并把结果写入存储，返回序列化后的值
    async fn load_into_store<T, F, Fut>(
        self,
        key: String,
        cache_key: String,
        loader: F,
        ttl: u64,
    ) -> LoadOutcome
    where
        T: Serialize + Send + 'static,
        F: FnOnce(String) -> Fut + Send + 'static,
        Fut: Future<Output = Result<T>> + Send + 'static,
    {
        let start = Instant::now();
        let stored = match loader(key).await {
            Ok(value) => match self.serializer.serialize(&value) {
                Ok(bytes) => self
                    .store
                    .set(&cache_key, bytes.clone(), Some(ttl))
                    .await
                    .map(|_| bytes),
                Err(e) => Err(e),
            },
            Err(e) => Err(e),
        };

        match stored {
            Ok(bytes) => {
                bump(&self.metrics.patterns.loads_succeeded);
                debug!("loaded {} ({} bytes)", cache_key, bytes.len());
                self.events.emit(CacheEventKind::Loaded {
                    key: cache_key,
                    latency_ms: elapsed_ms(start),
                });
                Ok(bytes)
            }
            Err(e) => {
                bump(&self.metrics.patterns.loads_failed);
                warn!("load failed for {}: {}", cache_key, e);
                self.emit_error(&cache_key, "load", &e);
                Err(e)
            }
        }
    }

    /// Write-through 写入
    ///
    /// 先写数据源，成功后再写缓存。数据源写入失败时删除旧缓存并返回错误；
    /// 缓存写入失败只发出 `cache:error`，调用仍然成功。
    #[instrument(skip(self, value, writer, options), level = "debug", fields(service = %self.service_name))]
    pub async fn write_through<T, W, Fut>(
        &self,
        key: &str,
        value: T,
        writer: W,
        options: &CacheOptions,
    ) -> Result<bool>
    where
        T: Serialize + Send,
        W: FnOnce(String, T) -> Fut + Send,
        Fut: Future<Output = Result<()>> + Send,
    {
        let start = Instant::now();
        let cache_key = self.cache_key(key, options)?;
        let bytes = self.serializer.serialize(&value)?;

        if let Err(e) = writer(key.to_string(), value).await {
            bump(&self.metrics.patterns.write_through_failed);
            warn!("write-through: writer failed for {}: {}", cache_key, e);
            self.evict(&cache_key).await;
            self.emit_error(&cache_key, "write-through", &e);
            return Err(e);
        }

        if let Err(e) = self
            .store
            .set(&cache_key, bytes, Some(self.ttl_for(options)))
            .await
        {
            bump(&self.metrics.patterns.write_through_cache_errors);
            warn!(
                "write-through: persisted {} but cache write failed: {}",
                cache_key, e
            );
            self.emit_error(&cache_key, "write-through:cache", &e);
        }

        if options.invalidate_on_write {
            if let Some(namespace) = options.namespace.as_deref() {
                self.invalidate_namespace_siblings(namespace, &cache_key)
                    .await;
            }
        }

        bump(&self.metrics.patterns.write_through_ok);
        self.events.emit(CacheEventKind::WriteThrough {
            key: cache_key,
            latency_ms: elapsed_ms(start),
        });
        Ok(true)
    }

    /// 删除同命名空间下除 `keep` 以外的键
    async fn invalidate_namespace_siblings(&self, namespace: &str, keep: &str) {
        let pattern = format!("{}:*", namespace);
        let keys = match self.store.keys(&pattern).await {
            Ok(keys) => keys,
            Err(e) => {
                warn!("invalidate-on-write: cannot list {}: {}", pattern, e);
                return;
            }
        };
        let siblings: Vec<String> = keys.into_iter().filter(|k| k != keep).collect();
        if let Err(e) = self.delete_keys(siblings, pattern).await {
            warn!("invalidate-on-write: {}", e);
        }
    }

    /// Write-behind 写入
    ///
    /// 立即写缓存并返回，数据源写入在 `options.delay` 之后由后台任务执行。
    /// 后台写入失败时发出 `cache:error`，缓存中仍是本次写入的值时将其删除。
    /// 挂起写入超过 `max_pending_writes` 时直接返回 Backpressure，不触碰缓存。
    #[instrument(skip(self, value, writer, options), level = "debug", fields(service = %self.service_name))]
    pub async fn write_behind<T, W, Fut>(
        &self,
        key: &str,
        value: T,
        writer: W,
        options: &CacheOptions,
    ) -> Result<bool>
    where
        T: Serialize + Send + 'static,
        W: FnOnce(String, T) -> Fut + Send + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        let cache_key = self.cache_key(key, options)?;
        let slot = self.write_behind.reserve()?;
        let bytes = self.serializer.serialize(&value)?;
        let cached = bytes.clone();

        if let Err(e) = self
            .store
            .set(&cache_key, bytes, Some(self.ttl_for(options)))
            .await
        {
            self.emit_error(&cache_key, "write-behind:cache", &e);
            return Err(e);
        }

        let delay = options.delay.unwrap_or(self.default_delay);
        bump(&self.metrics.patterns.write_behind_queued);
        self.events.emit(CacheEventKind::WriteBehindCached {
            key: cache_key.clone(),
            delay_ms: u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
        });

        let this = self.clone();
        let source_key = key.to_string();
        self.write_behind.schedule(slot, delay, async move {
            let start = Instant::now();
            match writer(source_key, value).await {
                Ok(()) => {
                    bump(&this.metrics.patterns.write_behind_persisted);
                    debug!("write-behind: persisted {}", cache_key);
                    this.events.emit(CacheEventKind::WriteBehindPersisted {
                        key: cache_key,
                        latency_ms: elapsed_ms(start),
                    });
                }
                Err(e) => {
                    bump(&this.metrics.patterns.write_behind_failed);
                    warn!("write-behind: writer failed for {}: {}", cache_key, e);
                    // 只撤销本次写入的值，之后的写入已经覆盖时保留新值
                    match this.store.get(&cache_key).await {
                        Ok(Some(current)) if current == cached => {
                            this.evict(&cache_key).await;
                        }
                        Ok(_) => {
                            debug!("write-behind: {} was overwritten, keeping newer value", cache_key);
                        }
                        Err(read_err) => {
                            warn!("write-behind: cannot re-read {}: {}", cache_key, read_err);
                            this.evict(&cache_key).await;
                        }
                    }
                    this.emit_error(&cache_key, "write-behind", &e);
                }
            }
        });
        Ok(true)
    }

    /// Refresh-ahead 读取
    ///
    /// 有值时总是立即返回当前值；剩余 TTL 比例低于阈值时在后台刷新，
    /// 同一个键同时至多只有一次刷新。没有值时退化为 cache-aside。
    #[instrument(skip(self, loader, options), level = "debug", fields(service = %self.service_name))]
    pub async fn refresh_ahead<T, F, Fut>(
        &self,
        key: &str,
        loader: F,
        options: &CacheOptions,
    ) -> Result<T>
    where
        T: Serialize + DeserializeOwned + Send + 'static,
        F: FnOnce(String) -> Fut + Send + 'static,
        Fut: Future<Output = Result<T>> + Send + 'static,
    {
        let start = Instant::now();
        let cache_key = self.cache_key(key, options)?;
        let cached = match self.store.get(&cache_key).await {
            Ok(cached) => cached,
            Err(e) => {
                self.emit_error(&cache_key, "get", &e);
                return Err(e);
            }
        };

        let Some(bytes) = cached else {
            debug!("refresh-ahead: {} not cached, loading", cache_key);
            return self.read_or_load(key, cache_key, loader, options).await;
        };

        self.metrics.record_access(&cache_key, true);
        self.events.emit(CacheEventKind::Hit {
            key: cache_key.clone(),
            latency_ms: elapsed_ms(start),
        });
        let value: T = self.serializer.deserialize(&bytes)?;

        let original_ttl = self.ttl_for(options);
        let threshold = options
            .refresh_threshold
            .unwrap_or(self.global.refresh_threshold);
        let remaining = match self.store.ttl(&cache_key).await {
            Ok(remaining) => remaining,
            Err(e) => {
                self.emit_error(&cache_key, "ttl", &e);
                return Err(e);
            }
        };

        if let Some(remaining) = remaining {
            if original_ttl > 0 {
                let ratio = remaining.as_secs_f64() / original_ttl as f64;
                if ratio > 0.0 && ratio < threshold {
                    self.spawn_refresh(key, cache_key, loader, original_ttl, ratio);
                }
            }
        }
        Ok(value)
    }

    /// 派生后台刷新；已有同键加载在进行时什么也不做
    fn spawn_refresh<T, F, Fut>(
        &self,
        key: &str,
        cache_key: String,
        loader: F,
        ttl: u64,
        remaining_ratio: f64,
    ) where
        T: Serialize + Send + 'static,
        F: FnOnce(String) -> Fut + Send + 'static,
        Fut: Future<Output = Result<T>> + Send + 'static,
    {
        let this = self.clone();
        let source_key = key.to_string();
        let load_key = cache_key.clone();
        let (load, role) = self.coalescer.join_or_start(&cache_key, move || {
            this.load_into_store(source_key, load_key, loader, ttl)
                .boxed()
        });
        if role == Role::Follower {
            debug!("refresh-ahead: reload for {} already in flight", cache_key);
            return;
        }

        bump(&self.metrics.patterns.refresh_triggered);
        self.events.emit(CacheEventKind::RefreshAheadTriggered {
            key: cache_key.clone(),
            remaining_ratio,
        });

        let this = self.clone();
        self.supervisor.spawn(async move {
            let start = Instant::now();
            match load.await {
                Ok(_) => {
                    bump(&this.metrics.patterns.refresh_completed);
                    this.events.emit(CacheEventKind::RefreshAheadCompleted {
                        key: cache_key,
                        latency_ms: elapsed_ms(start),
                    });
                }
                Err(e) => {
                    bump(&this.metrics.patterns.refresh_failed);
                    warn!("refresh-ahead: reload failed for {}: {}", cache_key, e);
                }
            }
        });
    }

    /// 批量 cache-aside
    ///
    /// 逐个读取缓存，未命中的键一次性交给 `batch_loader`，返回的每一项都写回缓存。
    /// 结果以调用方的键（不含命名空间）为键。加载失败时整个调用失败。
    #[instrument(skip_all, level = "debug", fields(service = %self.service_name, key_count = keys.len()))]
    pub async fn batch_cache_aside<K, T, B, Fut>(
        &self,
        keys: &[K],
        batch_loader: B,
        options: &CacheOptions,
    ) -> Result<HashMap<String, T>>
    where
        K: AsRef<str> + Sync,
        T: Serialize + DeserializeOwned + Send + Sync,
        B: FnOnce(Vec<String>) -> Fut + Send,
        Fut: Future<Output = Result<HashMap<String, T>>> + Send,
    {
        bump(&self.metrics.patterns.batch_calls);
        let start = Instant::now();
        let mut seen = HashSet::with_capacity(keys.len());
        let mut results = HashMap::with_capacity(keys.len());
        let mut missing = Vec::new();
        let mut hits = 0usize;

        for key in keys {
            let key = key.as_ref();
            if !seen.insert(key.to_string()) {
                continue;
            }
            let cache_key = self.cache_key(key, options)?;
            let cached = match self.store.get(&cache_key).await {
                Ok(cached) => cached,
                Err(e) => {
                    self.emit_error(&cache_key, "get", &e);
                    return Err(e);
                }
            };
            match cached {
                Some(bytes) => {
                    self.metrics.record_access(&cache_key, true);
                    results.insert(key.to_string(), self.serializer.deserialize(&bytes)?);
                    hits += 1;
                }
                None => {
                    self.metrics.record_access(&cache_key, false);
                    missing.push(key.to_string());
                }
            }
        }

        let misses = missing.len();
        if !missing.is_empty() {
            debug!("batch: loading {} missing key(s)", misses);
            let loaded = match batch_loader(missing).await {
                Ok(loaded) => loaded,
                Err(e) => {
                    self.emit_error("batch", "batch-load", &e);
                    return Err(e);
                }
            };
            for (key, value) in loaded {
                self.put(&key, &value, options).await?;
                results.insert(key, value);
            }
        }

        self.events.emit(CacheEventKind::BatchResult {
            requested: seen.len(),
            hits,
            misses,
            latency_ms: elapsed_ms(start),
        });
        Ok(results)
    }

    /// 缓存预热
    ///
    /// 调用一次 `batch_loader` 并写入返回的每一项。写入失败的项计为 failed，
    /// 加载器没有返回的键计为 skipped；加载器失败时所有键计为 failed。从不返回错误。
    #[instrument(skip_all, level = "info", fields(service = %self.service_name, key_count = keys.len()))]
    pub async fn warm_cache<T, B, Fut>(
        &self,
        keys: Vec<String>,
        batch_loader: B,
        options: &CacheOptions,
    ) -> WarmupResult
    where
        T: Serialize + Send + Sync,
        B: FnOnce(Vec<String>) -> Fut + Send,
        Fut: Future<Output = Result<HashMap<String, T>>> + Send,
    {
        bump(&self.metrics.patterns.warm_runs);
        let start = Instant::now();
        let requested: HashSet<String> = keys.iter().cloned().collect();
        self.warmup.begin(requested.len()).await;

        let result = if requested.is_empty() {
            WarmupResult::default()
        } else {
            match batch_loader(keys).await {
                Ok(entries) => {
                    let mut result = WarmupResult::default();
                    let mut returned = HashSet::with_capacity(entries.len());
                    for (key, value) in &entries {
                        match self.put(key, value, options).await {
                            Ok(_) => result.loaded += 1,
                            Err(e) => {
                                warn!("warmup: failed to store {}: {}", key, e);
                                result.failed += 1;
                            }
                        }
                        returned.insert(key.as_str());
                    }
                    result.skipped = requested
                        .iter()
                        .filter(|k| !returned.contains(k.as_str()))
                        .count();
                    result
                }
                Err(e) => {
                    warn!("warmup: batch loader failed: {}", e);
                    self.emit_error("warmup", "warm", &e);
                    self.warmup.fail(e.to_string()).await;
                    let result = WarmupResult::loader_failed(requested.len());
                    self.emit_warmed(&result, start);
                    return result;
                }
            }
        };

        self.warmup.finish(&result).await;
        self.emit_warmed(&result, start);
        result
    }

    fn emit_warmed(&self, result: &WarmupResult, start: Instant) {
        info!(
            "Cache warmup finished: loaded={}, failed={}, skipped={}",
            result.loaded, result.failed, result.skipped
        );
        self.events.emit(CacheEventKind::Warmed {
            loaded: result.loaded,
            failed: result.failed,
            latency_ms: elapsed_ms(start),
        });
    }
}
