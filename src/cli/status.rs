//! Copyright (c) 2025, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了配置检查和存储统计命令的实现。

use super::{CheckConfigArgs, StatsArgs};
use crate::backend::{StoreInfo, StoreStats};
use crate::config::{Config, StoreBackend};
use anyhow::{Context, Result};
use serde::Serialize;
use std::path::Path;

pub(super) fn check_config(default_path: &Path, args: &CheckConfigArgs) -> Result<()> {
    let path = args.file.as_deref().unwrap_or(default_path);
    let config =
        Config::from_file(path).with_context(|| format!("Invalid configuration {}", path.display()))?;

    println!("✅ {} is valid", path.display());
    println!("Default TTL:      {}s", config.global.default_ttl);
    println!("Refresh at:       {:.0}% TTL left", config.global.refresh_threshold * 100.0);
    println!("Hot key at:       {} accesses", config.global.hot_key_threshold);
    println!("Max pending:      {} writes", config.write_behind.max_pending_writes);
    match config.store.backend {
        StoreBackend::Memory => println!(
            "Store:            memory ({} entries)",
            config.store.memory.max_capacity
        ),
        StoreBackend::Redis => println!("Store:            redis"),
    }
    if let Some(sync) = config.sync.as_ref().filter(|s| s.enabled) {
        println!("Sync channel:     {}", sync.channel);
    }
    Ok(())
}

#[derive(Serialize)]
struct StatsReport {
    store: StoreInfo,
    stats: StoreStats,
}

pub(super) async fn stats(config_path: &Path, args: &StatsArgs) -> Result<()> {
    let coordinator = super::admin::connect(config_path).await?;
    let report = StatsReport {
        store: coordinator.store().config(),
        stats: coordinator.store_stats().await?,
    };

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else if args.prometheus {
        print!("{}", render_prometheus(&report));
    } else {
        println!("=== Store Statistics ({}) ===\n", report.store.backend);
        println!("Hits:             {}", report.stats.hits);
        println!("Misses:           {}", report.stats.misses);
        println!("Hit Rate:         {:.1}%", report.stats.hit_rate * 100.0);
        println!("Sets:             {}", report.stats.sets);
        println!("Operations:       {}", report.stats.total_operations);
    }

    coordinator.shutdown().await?;
    Ok(())
}

fn render_prometheus(report: &StatsReport) -> String {
    let backend = report.store.backend;
    let stats = &report.stats;
    [
        ("store_hits_total", stats.hits as f64),
        ("store_misses_total", stats.misses as f64),
        ("store_sets_total", stats.sets as f64),
        ("store_operations_total", stats.total_operations as f64),
        ("store_hit_rate", stats.hit_rate),
    ]
    .iter()
    .map(|(name, value)| format!("{}{{backend=\"{}\"}} {}\n", name, backend, value))
    .collect()
}
