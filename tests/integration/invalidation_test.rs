//! Copyright (c) 2025, Kirky.X
//!
//! MIT License
//!
//! 标签失效与模式失效集成测试

#[path = "../common/mod.rs"]
mod common;

use cachecoord::{CacheError, CacheEventKind, CacheOptions};
use common::{failing_coordinator, memory_coordinator, wait_for_event};
use std::sync::atomic::Ordering;
use std::time::Duration;

#[tokio::test]
async fn test_invalidate_by_tags_removes_every_tagged_key() {
    let coordinator = memory_coordinator();
    let options = CacheOptions::new();
    coordinator
        .set_with_tags("a", &1u8, &["t1"], &options)
        .await
        .unwrap();
    coordinator
        .set_with_tags("b", &2u8, &["t1", "t2"], &options)
        .await
        .unwrap();
    coordinator
        .set_with_tags("c", &3u8, &["t2"], &options)
        .await
        .unwrap();
    coordinator.set("untagged", &4u8, &options).await.unwrap();

    let deleted = coordinator.invalidate_by_tags(&["t1"]).await.unwrap();
    assert_eq!(deleted, 2);

    let store = coordinator.store();
    assert!(!store.exists("a").await.unwrap());
    assert!(!store.exists("b").await.unwrap());
    assert!(store.exists("c").await.unwrap());
    assert!(store.exists("untagged").await.unwrap());

    // t1 被剪除，t2 只剩 c
    assert!(!coordinator.has_tag("t1").await);
    assert!(coordinator.has_tag("t2").await);
    assert!(coordinator.tags_of("b", &options).await.unwrap().is_empty());
    assert_eq!(
        coordinator.tags_of("c", &options).await.unwrap(),
        vec!["t2".to_string()]
    );

    assert_eq!(coordinator.invalidate_by_tags(&["t1"]).await.unwrap(), 0);
}

#[tokio::test]
async fn test_invalidate_multiple_tags_prunes_all() {
    let coordinator = memory_coordinator();
    let options = CacheOptions::new().namespace("p");
    coordinator
        .set_with_tags("1", &"x", &["red", "big"], &options)
        .await
        .unwrap();
    coordinator
        .set_with_tags("2", &"y", &["blue"], &options)
        .await
        .unwrap();

    let deleted = coordinator
        .invalidate_by_tags(&["red".to_string(), "blue".to_string()])
        .await
        .unwrap();
    assert_eq!(deleted, 2);
    for tag in ["red", "big", "blue"] {
        assert!(!coordinator.has_tag(tag).await, "tag {} should be pruned", tag);
    }
    assert_eq!(coordinator.pattern_stats().invalidated_keys, 2);
}

#[tokio::test]
async fn test_invalidate_by_tag_emits_event() {
    let coordinator = memory_coordinator();
    let options = CacheOptions::new();
    coordinator
        .set_with_tags("order:1", &10u32, &["orders"], &options)
        .await
        .unwrap();
    let mut events = coordinator.subscribe();

    assert_eq!(coordinator.invalidate_by_tag("orders").await.unwrap(), 1);

    let event = wait_for_event(&mut events, "cache:invalidated").await;
    assert_eq!(
        event.kind,
        CacheEventKind::Invalidated {
            pattern: "tags:orders".into(),
            count: 1
        }
    );
}

#[tokio::test(start_paused = true)]
async fn test_expired_key_counts_zero_but_tag_is_pruned() {
    let coordinator = memory_coordinator();
    let options = CacheOptions::new().ttl(1);
    coordinator
        .set_with_tags("short", &1u8, &["session"], &options)
        .await
        .unwrap();

    tokio::time::advance(Duration::from_secs(2)).await;

    assert_eq!(coordinator.invalidate_by_tag("session").await.unwrap(), 0);
    assert!(!coordinator.has_tag("session").await);
}

#[tokio::test]
async fn test_unknown_tag_is_a_noop() {
    let coordinator = memory_coordinator();
    assert_eq!(coordinator.invalidate_by_tag("nothing").await.unwrap(), 0);
}

#[tokio::test]
async fn test_invalid_tag_rejected() {
    let coordinator = memory_coordinator();
    let err = coordinator
        .set_with_tags("k", &1u8, &[""], &CacheOptions::new())
        .await
        .unwrap_err();
    assert!(matches!(err, CacheError::InvalidInput(_)));
    assert!(!coordinator.store().exists("k").await.unwrap());
}

#[tokio::test]
async fn test_delete_keeps_tag_index_consistent() {
    let coordinator = memory_coordinator();
    let options = CacheOptions::new();
    coordinator
        .set_with_tags("k", &1u8, &["solo"], &options)
        .await
        .unwrap();

    assert!(coordinator.delete("k", &options).await.unwrap());
    assert!(!coordinator.has_tag("solo").await);
}

#[tokio::test]
async fn test_invalidate_pattern_counts_and_is_idempotent() {
    let coordinator = memory_coordinator();
    let users = CacheOptions::new().namespace("user");
    for id in ["1", "2", "3"] {
        coordinator.set(id, &id, &users).await.unwrap();
    }
    coordinator
        .set("1", &"keep", &CacheOptions::new().namespace("order"))
        .await
        .unwrap();
    let mut events = coordinator.subscribe();

    assert_eq!(coordinator.invalidate_pattern("user:*").await.unwrap(), 3);
    assert!(coordinator.store().exists("order:1").await.unwrap());

    let event = wait_for_event(&mut events, "cache:invalidated").await;
    assert_eq!(
        event.kind,
        CacheEventKind::Invalidated {
            pattern: "user:*".into(),
            count: 3
        }
    );

    assert_eq!(coordinator.invalidate_pattern("user:*").await.unwrap(), 0);
}

#[tokio::test]
async fn test_invalidate_pattern_single_char_wildcard() {
    let coordinator = memory_coordinator();
    let options = CacheOptions::new();
    for key in ["v1", "v2", "v10"] {
        coordinator.set(key, &0u8, &options).await.unwrap();
    }

    assert_eq!(coordinator.invalidate_pattern("v?").await.unwrap(), 2);
    assert!(coordinator.store().exists("v10").await.unwrap());
}

#[tokio::test]
async fn test_delete_failure_reports_error_but_continues() {
    let (coordinator, store) = failing_coordinator();
    let options = CacheOptions::new();
    coordinator
        .set_with_tags("a", &1u8, &["t"], &options)
        .await
        .unwrap();
    store.fail_delete.store(true, Ordering::SeqCst);

    let err = coordinator.invalidate_by_tag("t").await.unwrap_err();
    assert!(matches!(err, CacheError::StoreError(_)));
    // 删除失败的键保留在索引中，下次失效可以重试
    assert!(coordinator.has_tag("t").await);

    store.fail_delete.store(false, Ordering::SeqCst);
    assert_eq!(coordinator.invalidate_by_tag("t").await.unwrap(), 1);
}

#[tokio::test]
async fn test_clear_empties_store_and_tag_index() {
    let coordinator = memory_coordinator();
    let options = CacheOptions::new();
    coordinator
        .set_with_tags("a", &1u8, &["t1", "t2"], &options)
        .await
        .unwrap();
    coordinator.set("b", &2u8, &options).await.unwrap();

    coordinator.clear().await.unwrap();

    assert!(!coordinator.store().exists("a").await.unwrap());
    assert!(!coordinator.store().exists("b").await.unwrap());
    assert!(!coordinator.has_tag("t1").await);
    assert!(coordinator.tags_of("a", &options).await.unwrap().is_empty());
    assert_eq!(coordinator.invalidate_by_tag("t2").await.unwrap(), 0);
}

#[tokio::test]
async fn test_tags_usable_after_clear() {
    let coordinator = memory_coordinator();
    let options = CacheOptions::new();
    coordinator
        .set_with_tags("a", &1u8, &["t"], &options)
        .await
        .unwrap();
    coordinator.clear().await.unwrap();

    coordinator
        .set_with_tags("b", &2u8, &["t"], &options)
        .await
        .unwrap();
    assert_eq!(
        coordinator.tags_of("b", &options).await.unwrap(),
        vec!["t".to_string()]
    );
    assert_eq!(coordinator.invalidate_by_tag("t").await.unwrap(), 1);
}
