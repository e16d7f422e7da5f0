//! Copyright (c) 2025, Kirky.X
//!
//! MIT License
//!
//! 统一工具模块
//!
//! 提供库、命令行和测试共用的工具函数，包括：
//! - 日志设置工具
//! - 键构造与输入验证工具
//! - Redis连接检查工具

use crate::error::CacheError;
use std::sync::Once;
use std::time::Duration;
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::EnvFilter;

static INIT: Once = Once::new();

/// 初始化控制台日志（只生效一次）
///
/// 优先使用 `RUST_LOG`，未设置时使用 `default_directive`。
pub fn setup_logging_with(default_directive: &str) {
    INIT.call_once(|| {
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(default_directive));
        tracing_subscriber::fmt()
            .with_span_events(FmtSpan::CLOSE)
            .with_env_filter(filter)
            .try_init()
            .ok();
    });
}

pub fn setup_logging() {
    setup_logging_with("debug");
}

/// 拼接命名空间和键
pub fn namespaced_key(namespace: Option<&str>, key: &str) -> String {
    match namespace {
        Some(ns) if !ns.is_empty() => format!("{}:{}", ns, key),
        _ => key.to_string(),
    }
}

pub fn validate_key_length(key: &str, max_length: usize) -> Result<(), CacheError> {
    if key.is_empty() {
        return Err(CacheError::InvalidInput(
            "Cache key cannot be empty".to_string(),
        ));
    }
    if key.len() > max_length {
        return Err(CacheError::InvalidInput(format!(
            "Cache key exceeds maximum length of {} bytes (got {} bytes)",
            max_length,
            key.len()
        )));
    }
    Ok(())
}

pub fn validate_tags<S: AsRef<str>>(tags: &[S]) -> Result<(), CacheError> {
    if tags.iter().any(|t| t.as_ref().is_empty()) {
        return Err(CacheError::InvalidInput("Tag cannot be empty".to_string()));
    }
    Ok(())
}

/// 检查Redis测试是否被显式跳过
pub fn is_redis_available() -> bool {
    std::env::var("CACHECOORD_SKIP_REDIS_TESTS").is_err()
}

/// 检查指定URL的Redis是否可用
pub async fn is_redis_available_url(url: &str) -> bool {
    let client = match redis::Client::open(url) {
        Ok(c) => c,
        Err(_) => return false,
    };

    match tokio::time::timeout(
        Duration::from_secs(1),
        client.get_multiplexed_async_connection(),
    )
    .await
    {
        Ok(Ok(_)) => true,
        _ => false,
    }
}

/// 生成唯一的命名空间，测试之间互不干扰
pub fn generate_unique_namespace(base: &str) -> String {
    format!("{}_{}", base, uuid::Uuid::new_v4().simple())
}
