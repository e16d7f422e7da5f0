//! Copyright (c) 2025, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了协调层的指标收集：命中率、各模式计数以及热点键跟踪。

use dashmap::DashMap;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::debug;

/// 命中率指标快照
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct MetricsSnapshot {
    pub total_requests: u64,
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub hit_rate: f64,
}

/// 各访问模式的计数快照
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PatternStats {
    pub cache_aside_calls: u64,
    pub coalesced_joins: u64,
    pub loads_succeeded: u64,
    pub loads_failed: u64,
    pub write_through_ok: u64,
    pub write_through_failed: u64,
    pub write_through_cache_errors: u64,
    pub write_behind_queued: u64,
    pub write_behind_persisted: u64,
    pub write_behind_failed: u64,
    pub refresh_triggered: u64,
    pub refresh_completed: u64,
    pub refresh_failed: u64,
    pub batch_calls: u64,
    pub warm_runs: u64,
    pub invalidated_keys: u64,
    pub sync_applied: u64,
    pub broadcasts: u64,
}

/// 模式计数器
#[derive(Debug, Default)]
pub struct PatternCounters {
    pub cache_aside_calls: AtomicU64,
    pub coalesced_joins: AtomicU64,
    pub loads_succeeded: AtomicU64,
    pub loads_failed: AtomicU64,
    pub write_through_ok: AtomicU64,
    pub write_through_failed: AtomicU64,
    pub write_through_cache_errors: AtomicU64,
    pub write_behind_queued: AtomicU64,
    pub write_behind_persisted: AtomicU64,
    pub write_behind_failed: AtomicU64,
    pub refresh_triggered: AtomicU64,
    pub refresh_completed: AtomicU64,
    pub refresh_failed: AtomicU64,
    pub batch_calls: AtomicU64,
    pub warm_runs: AtomicU64,
    pub invalidated_keys: AtomicU64,
    pub sync_applied: AtomicU64,
    pub broadcasts: AtomicU64,
}

/// 计数加一
#[inline]
pub fn bump(counter: &AtomicU64) {
    counter.fetch_add(1, Ordering::Relaxed);
}

impl PatternCounters {
    pub fn snapshot(&self) -> PatternStats {
        let load = |c: &AtomicU64| c.load(Ordering::Relaxed);
        PatternStats {
            cache_aside_calls: load(&self.cache_aside_calls),
            coalesced_joins: load(&self.coalesced_joins),
            loads_succeeded: load(&self.loads_succeeded),
            loads_failed: load(&self.loads_failed),
            write_through_ok: load(&self.write_through_ok),
            write_through_failed: load(&self.write_through_failed),
            write_through_cache_errors: load(&self.write_through_cache_errors),
            write_behind_queued: load(&self.write_behind_queued),
            write_behind_persisted: load(&self.write_behind_persisted),
            write_behind_failed: load(&self.write_behind_failed),
            refresh_triggered: load(&self.refresh_triggered),
            refresh_completed: load(&self.refresh_completed),
            refresh_failed: load(&self.refresh_failed),
            batch_calls: load(&self.batch_calls),
            warm_runs: load(&self.warm_runs),
            invalidated_keys: load(&self.invalidated_keys),
            sync_applied: load(&self.sync_applied),
            broadcasts: load(&self.broadcasts),
        }
    }

    fn reset(&self) {
        for counter in [
            &self.cache_aside_calls,
            &self.coalesced_joins,
            &self.loads_succeeded,
            &self.loads_failed,
            &self.write_through_ok,
            &self.write_through_failed,
            &self.write_through_cache_errors,
            &self.write_behind_queued,
            &self.write_behind_persisted,
            &self.write_behind_failed,
            &self.refresh_triggered,
            &self.refresh_completed,
            &self.refresh_failed,
            &self.batch_calls,
            &self.warm_runs,
            &self.invalidated_keys,
            &self.sync_applied,
            &self.broadcasts,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
    }
}

/// 协调层指标
///
/// `cache_hits + cache_misses == total_requests` 始终成立：
/// 请求数与命中/未命中在同一把锁内更新。
#[derive(Debug)]
pub struct Metrics {
    requests: std::sync::Mutex<(u64, u64, u64)>,
    pub patterns: PatternCounters,
    access: DashMap<String, u64>,
    hot_key_threshold: u64,
    max_tracked_keys: usize,
}

impl Metrics {
    pub fn new(hot_key_threshold: u64, max_tracked_keys: usize) -> Self {
        Self {
            requests: std::sync::Mutex::new((0, 0, 0)),
            patterns: PatternCounters::default(),
            access: DashMap::new(),
            hot_key_threshold,
            max_tracked_keys: max_tracked_keys.max(1),
        }
    }

    fn with_requests<R>(&self, f: impl FnOnce(&mut (u64, u64, u64)) -> R) -> R {
        let mut guard = self
            .requests
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        f(&mut guard)
    }

    /// 记录一次访问并判定命中与否
    pub fn record_access(&self, key: &str, hit: bool) {
        self.with_requests(|(total, hits, misses)| {
            *total += 1;
            if hit {
                *hits += 1;
            } else {
                *misses += 1;
            }
        });
        self.touch(key);
    }

    /// 访问计数加一，超过上限时淘汰最冷的一批键
    fn touch(&self, key: &str) {
        if let Some(mut count) = self.access.get_mut(key) {
            *count += 1;
            return;
        }
        self.access
            .entry(key.to_string())
            .and_modify(|c| *c += 1)
            .or_insert(1);
        if self.access.len() > self.max_tracked_keys {
            self.evict_cold_keys();
        }
    }

    fn evict_cold_keys(&self) {
        let mut counts: Vec<(String, u64)> = self
            .access
            .iter()
            .map(|e| (e.key().clone(), *e.value()))
            .collect();
        counts.sort_by_key(|(_, c)| *c);
        let target = self.max_tracked_keys - self.max_tracked_keys / 10;
        let excess = counts.len().saturating_sub(target);
        for (key, _) in counts.into_iter().take(excess) {
            self.access.remove(&key);
        }
        debug!("metrics: evicted {} cold access counters", excess);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let (total, hits, misses) = self.with_requests(|r| *r);
        MetricsSnapshot {
            total_requests: total,
            cache_hits: hits,
            cache_misses: misses,
            hit_rate: crate::backend::ratio(hits, total),
        }
    }

    pub fn access_count(&self, key: &str) -> u64 {
        self.access.get(key).map(|c| *c).unwrap_or(0)
    }

    /// 访问次数达到阈值的键，按次数降序
    pub fn hot_keys(&self) -> Vec<(String, u64)> {
        let mut hot: Vec<(String, u64)> = self
            .access
            .iter()
            .filter(|e| *e.value() >= self.hot_key_threshold)
            .map(|e| (e.key().clone(), *e.value()))
            .collect();
        hot.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        hot
    }

    pub fn tracked_keys(&self) -> usize {
        self.access.len()
    }

    pub fn reset(&self) {
        self.with_requests(|r| *r = (0, 0, 0));
        self.patterns.reset();
        self.access.clear();
    }

    /// 以 Prometheus 文本格式导出指标
    pub fn render(&self, service: &str) -> String {
        let snapshot = self.snapshot();
        let stats = self.patterns.snapshot();
        let mut output = String::new();
        output.push_str(&format!(
            "cache_requests_total{{service=\"{}\"}} {}\n",
            service, snapshot.total_requests
        ));
        output.push_str(&format!(
            "cache_hits_total{{service=\"{}\"}} {}\n",
            service, snapshot.cache_hits
        ));
        output.push_str(&format!(
            "cache_misses_total{{service=\"{}\"}} {}\n",
            service, snapshot.cache_misses
        ));
        output.push_str(&format!(
            "cache_hit_rate{{service=\"{}\"}} {}\n",
            service, snapshot.hit_rate
        ));
        if let Ok(serde_json::Value::Object(fields)) = serde_json::to_value(&stats) {
            for (name, value) in fields {
                output.push_str(&format!(
                    "cache_pattern_total{{service=\"{}\", counter=\"{}\"}} {}\n",
                    service, name, value
                ));
            }
        }
        output.push_str(&format!(
            "cache_hot_keys{{service=\"{}\"}} {}\n",
            service,
            self.hot_keys().len()
        ));
        output
    }
}
