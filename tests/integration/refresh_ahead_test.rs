//! Copyright (c) 2025, Kirky.X
//!
//! MIT License
//!
//! Refresh-ahead 集成测试（暂停时钟）

#[path = "../common/mod.rs"]
mod common;

use cachecoord::{CacheEventKind, CacheOptions};
use common::{counting_loader, failing_loader, memory_coordinator, wait_for_event};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

#[tokio::test(start_paused = true)]
async fn test_refresh_near_expiry_returns_current_value() {
    let coordinator = memory_coordinator();
    let mut events = coordinator.subscribe();
    let ttl100 = CacheOptions::new().ttl(100);
    coordinator.set("u:1", &"A".to_string(), &ttl100).await.unwrap();

    tokio::time::advance(Duration::from_secs(90)).await;

    let calls = Arc::new(AtomicUsize::new(0));
    let options = CacheOptions::new().ttl(100).refresh_threshold(0.2);
    let value: String = coordinator
        .refresh_ahead(
            "u:1",
            counting_loader(calls.clone(), "B".to_string(), Duration::from_millis(20)),
            &options,
        )
        .await
        .unwrap();
    assert_eq!(value, "A");

    let triggered = wait_for_event(&mut events, "cache:refresh-ahead:triggered").await;
    match triggered.kind {
        CacheEventKind::RefreshAheadTriggered { remaining_ratio, .. } => {
            assert!((remaining_ratio - 0.1).abs() < 0.01);
        }
        other => panic!("unexpected event {:?}", other),
    }
    wait_for_event(&mut events, "cache:refresh-ahead:completed").await;

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    let refreshed: Option<String> = coordinator.get("u:1", &options).await.unwrap();
    assert_eq!(refreshed.as_deref(), Some("B"));
    let remaining = coordinator.store().ttl("u:1").await.unwrap().unwrap();
    assert!(remaining > Duration::from_secs(99));
}

#[tokio::test(start_paused = true)]
async fn test_no_refresh_above_threshold() {
    let coordinator = memory_coordinator();
    let options = CacheOptions::new().ttl(100);
    coordinator.set("fresh", &1u32, &options).await.unwrap();

    tokio::time::advance(Duration::from_secs(10)).await;

    let calls = Arc::new(AtomicUsize::new(0));
    let value: u32 = coordinator
        .refresh_ahead("fresh", counting_loader(calls.clone(), 2u32, Duration::ZERO), &options)
        .await
        .unwrap();
    assert_eq!(value, 1);

    tokio::time::sleep(Duration::from_millis(10)).await;
    assert_eq!(calls.load(Ordering::SeqCst), 0);
    assert_eq!(coordinator.pattern_stats().refresh_triggered, 0);
}

#[tokio::test(start_paused = true)]
async fn test_missing_value_falls_back_to_cache_aside() {
    let coordinator = memory_coordinator();
    let calls = Arc::new(AtomicUsize::new(0));

    let value: u32 = coordinator
        .refresh_ahead(
            "absent",
            counting_loader(calls.clone(), 3u32, Duration::from_millis(5)),
            &CacheOptions::new(),
        )
        .await
        .unwrap();

    assert_eq!(value, 3);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert!(coordinator.store().exists("absent").await.unwrap());
    assert_eq!(coordinator.pattern_stats().refresh_triggered, 0);
}

#[tokio::test(start_paused = true)]
async fn test_concurrent_refreshes_fire_one_reload() {
    let coordinator = memory_coordinator();
    let mut events = coordinator.subscribe();
    let options = CacheOptions::new().ttl(100).refresh_threshold(0.5);
    coordinator.set("shared", &0u32, &options).await.unwrap();

    tokio::time::advance(Duration::from_secs(80)).await;

    let calls = Arc::new(AtomicUsize::new(0));
    for _ in 0..3 {
        let value: u32 = coordinator
            .refresh_ahead(
                "shared",
                counting_loader(calls.clone(), 1u32, Duration::from_secs(1)),
                &options,
            )
            .await
            .unwrap();
        assert_eq!(value, 0);
    }

    wait_for_event(&mut events, "cache:refresh-ahead:completed").await;
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(coordinator.pattern_stats().refresh_triggered, 1);
    assert_eq!(coordinator.pattern_stats().refresh_completed, 1);
}

#[tokio::test(start_paused = true)]
async fn test_failed_refresh_keeps_old_value() {
    let coordinator = memory_coordinator();
    let mut events = coordinator.subscribe();
    let options = CacheOptions::new().ttl(100);
    coordinator.set("k", &"old".to_string(), &options).await.unwrap();

    tokio::time::advance(Duration::from_secs(50)).await;

    let calls = Arc::new(AtomicUsize::new(0));
    let value: String = coordinator
        .refresh_ahead("k", failing_loader(calls.clone(), Duration::ZERO), &options)
        .await
        .unwrap();
    assert_eq!(value, "old");

    let error = wait_for_event(&mut events, "cache:error").await;
    assert!(matches!(error.kind, CacheEventKind::Error { operation: "load", .. }));
    let still: Option<String> = coordinator.get("k", &options).await.unwrap();
    assert_eq!(still.as_deref(), Some("old"));

    // 关闭会等待刷新任务结束
    coordinator.shutdown().await.unwrap();
    assert_eq!(coordinator.pattern_stats().refresh_failed, 1);
}
