//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了标签索引，用于按标签批量失效缓存。

use std::collections::{HashMap, HashSet};
use tokio::sync::RwLock;
use tracing::debug;

#[derive(Default, Debug)]
struct TagTables {
    /// 标签 -> 键集合
    by_tag: HashMap<String, HashSet<String>>,
    /// 键 -> 标签集合
    by_key: HashMap<String, HashSet<String>>,
}

/// 标签索引
///
/// 正反两张表在同一把锁下维护；空集合随时剪除。
#[derive(Default, Debug)]
pub struct TagIndex {
    tables: RwLock<TagTables>,
}

impl TagIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// 把键登记到每个标签下
    pub async fn tag(&self, key: &str, tags: &[String]) {
        if tags.is_empty() {
            return;
        }
        let mut tables = self.tables.write().await;
        for tag in tags {
            tables
                .by_tag
                .entry(tag.clone())
                .or_default()
                .insert(key.to_string());
        }
        tables
            .by_key
            .entry(key.to_string())
            .or_default()
            .extend(tags.iter().cloned());
    }

    /// 合并多个标签下的键
    pub async fn keys_for(&self, tags: &[String]) -> HashSet<String> {
        let tables = self.tables.read().await;
        tags.iter()
            .filter_map(|tag| tables.by_tag.get(tag))
            .flat_map(|keys| keys.iter().cloned())
            .collect()
    }

    /// 从所有引用该键的标签中移除它，并剪除变空的标签
    pub async fn remove_key(&self, key: &str) {
        let mut tables = self.tables.write().await;
        let Some(tags) = tables.by_key.remove(key) else {
            return;
        };
        for tag in tags {
            let now_empty = match tables.by_tag.get_mut(&tag) {
                Some(keys) => {
                    keys.remove(key);
                    keys.is_empty()
                }
                None => false,
            };
            if now_empty {
                tables.by_tag.remove(&tag);
                debug!("tag index: pruned empty tag {}", tag);
            }
        }
    }

    pub async fn contains_tag(&self, tag: &str) -> bool {
        self.tables.read().await.by_tag.contains_key(tag)
    }

    pub async fn tags_of(&self, key: &str) -> HashSet<String> {
        self.tables
            .read()
            .await
            .by_key
            .get(key)
            .cloned()
            .unwrap_or_default()
    }

    pub async fn tag_count(&self) -> usize {
        self.tables.read().await.by_tag.len()
    }

    pub async fn clear(&self) {
        let mut tables = self.tables.write().await;
        tables.by_tag.clear();
        tables.by_key.clear();
    }
}
