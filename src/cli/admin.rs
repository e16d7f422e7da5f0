//! Copyright (c) 2025, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了管理员操作命令的实现。

use super::{InvalidateArgs, KeysArgs};
use crate::client::CacheCoordinator;
use crate::config::Config;
use anyhow::{Context, Result};
use std::io::Write;
use std::path::Path;

/// 加载配置并连接存储
pub(super) async fn connect(config_path: &Path) -> Result<CacheCoordinator> {
    let config = Config::from_file(config_path)
        .with_context(|| format!("Failed to load {}", config_path.display()))?;
    // 命令行只做一次性操作，不启动同步中继
    let config = Config {
        sync: None,
        ..config
    };
    CacheCoordinator::from_config(&config)
        .await
        .context("Failed to connect to the configured store")
}

pub(super) async fn keys(config_path: &Path, args: &KeysArgs) -> Result<()> {
    let coordinator = connect(config_path).await?;
    let mut keys = coordinator.store().keys(&args.pattern).await?;
    keys.sort();

    let total = keys.len();
    let shown = args.limit.unwrap_or(total).min(total);
    for key in keys.iter().take(shown) {
        println!("{}", key);
    }
    if shown < total {
        println!("... {} more", total - shown);
    }
    println!("\n{} key(s) match '{}'", total, args.pattern);

    coordinator.shutdown().await?;
    Ok(())
}

pub(super) async fn invalidate(config_path: &Path, args: &InvalidateArgs) -> Result<()> {
    let coordinator = connect(config_path).await?;

    if !args.yes {
        let matching = coordinator.store().keys(&args.pattern).await?.len();
        print!(
            "About to delete {} key(s) matching '{}'. Continue? [y/N]: ",
            matching, args.pattern
        );
        std::io::stdout().flush()?;

        let mut input = String::new();
        std::io::stdin().read_line(&mut input)?;

        if input.trim().to_lowercase() != "y" {
            println!("Operation cancelled.");
            coordinator.shutdown().await?;
            return Ok(());
        }
    }

    let deleted = coordinator
        .invalidate_pattern(&args.pattern)
        .await
        .with_context(|| format!("Failed to invalidate '{}'", args.pattern))?;
    println!("Deleted {} key(s).", deleted);

    coordinator.shutdown().await?;
    Ok(())
}
