//! Copyright (c) 2025, Kirky.X
//!
//! MIT License
//!
//! 协调器构造、配置加载与关闭流程集成测试

#[path = "../common/mod.rs"]
mod common;

use cachecoord::config::{GlobalConfig, WriteBehindConfig};
use cachecoord::{CacheCoordinator, CacheError, CacheOptions, Config, WarmupStatus};
use common::{coordinator_with, counting_loader, memory_coordinator, setup_logging};
use std::io::Write;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

#[tokio::test]
async fn test_shutdown_flushes_delayed_writes() {
    let coordinator = coordinator_with(Config {
        write_behind: WriteBehindConfig {
            default_delay_ms: 3_600_000,
            max_pending_writes: 100,
        },
        ..Default::default()
    });
    let persisted = Arc::new(AtomicUsize::new(0));

    for i in 0..3u32 {
        let counter = persisted.clone();
        coordinator
            .write_behind(
                &format!("order:{}", i),
                i,
                move |_, _| async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                },
                &CacheOptions::new(),
            )
            .await
            .unwrap();
    }
    assert_eq!(coordinator.pending_writes(), 3);
    assert_eq!(persisted.load(Ordering::SeqCst), 0);

    tokio::time::timeout(Duration::from_secs(5), coordinator.shutdown())
        .await
        .expect("shutdown must not wait for the full delay")
        .unwrap();

    assert_eq!(persisted.load(Ordering::SeqCst), 3);
    assert_eq!(coordinator.pending_writes(), 0);
    assert_eq!(coordinator.pattern_stats().write_behind_persisted, 3);
}

#[tokio::test]
async fn test_write_behind_after_shutdown_is_rejected() {
    let coordinator = memory_coordinator();
    coordinator.shutdown().await.unwrap();
    let called = Arc::new(AtomicBool::new(false));

    let flag = called.clone();
    let err = coordinator
        .write_behind(
            "late",
            1u8,
            move |_, _| async move {
                flag.store(true, Ordering::SeqCst);
                Ok(())
            },
            &CacheOptions::new(),
        )
        .await
        .unwrap_err();

    assert!(matches!(err, CacheError::ShutdownError(_)));
    assert!(!called.load(Ordering::SeqCst));
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_waits_for_background_refresh() {
    let coordinator = memory_coordinator();
    let options = CacheOptions::new().ttl(10).refresh_threshold(0.5);
    coordinator.set("r", &1u32, &options).await.unwrap();
    tokio::time::advance(Duration::from_secs(8)).await;

    let calls = Arc::new(AtomicUsize::new(0));
    let value: u32 = coordinator
        .refresh_ahead("r", counting_loader(calls.clone(), 2u32, Duration::from_secs(3)), &options)
        .await
        .unwrap();
    assert_eq!(value, 1);

    coordinator.shutdown().await.unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(coordinator.pattern_stats().refresh_completed, 1);
    assert_eq!(coordinator.in_flight_loads(), 0);
}

#[tokio::test]
async fn test_from_config_memory_backend() {
    setup_logging();
    let coordinator = CacheCoordinator::from_config(&Config::default())
        .await
        .unwrap()
        .with_service_name("catalog");

    assert_eq!(coordinator.service_name(), "catalog");
    assert_eq!(coordinator.store().config().backend, "memory");
    assert_eq!(coordinator.warmup_status().await, WarmupStatus::Pending);

    coordinator.set("k", &"v", &CacheOptions::new()).await.unwrap();
    let stats = coordinator.store_stats().await.unwrap();
    assert_eq!(stats.sets, 1);
}

#[tokio::test]
async fn test_from_config_rejects_invalid_settings() {
    let config = Config {
        global: GlobalConfig {
            refresh_threshold: 1.5,
            ..Default::default()
        },
        ..Default::default()
    };
    let err = CacheCoordinator::from_config(&config).await.unwrap_err();
    assert!(matches!(err, CacheError::ConfigError(_)));
}

#[tokio::test]
async fn test_config_file_drives_defaults() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(
        file,
        r#"
config_version = 1

[global]
default_ttl = 42
event_channel_capacity = 4

[write_behind]
default_delay_ms = 10

[store]
backend = "memory"

[store.memory]
max_capacity = 100
"#
    )
    .unwrap();

    let config = Config::from_file(file.path()).unwrap();
    assert_eq!(config.global.default_ttl, 42);
    let coordinator = CacheCoordinator::from_config(&config).await.unwrap();

    coordinator.set("t", &1u8, &CacheOptions::new()).await.unwrap();
    let remaining = coordinator.store().ttl("t").await.unwrap().unwrap();
    assert!(remaining <= Duration::from_secs(42) && remaining > Duration::from_secs(40));
}

#[tokio::test]
async fn test_slow_subscriber_never_blocks_operations() {
    let coordinator = coordinator_with(Config {
        global: GlobalConfig {
            event_channel_capacity: 2,
            ..Default::default()
        },
        ..Default::default()
    });
    // 订阅后从不读取
    let _idle = coordinator.subscribe();

    let options = CacheOptions::new();
    for i in 0..50u32 {
        let calls = Arc::new(AtomicUsize::new(0));
        let value: u32 = coordinator
            .cache_aside(&format!("k{}", i), counting_loader(calls, i, Duration::ZERO), &options)
            .await
            .unwrap();
        assert_eq!(value, i);
    }
    assert_eq!(coordinator.metrics().total_requests, 50);
}
