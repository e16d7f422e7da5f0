//! Copyright (c) 2025, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了缓存协调层的错误类型和处理机制。

use thiserror::Error;

/// 缓存协调层错误类型枚举
///
/// 所有变体只携带字符串信息，因此错误可以被克隆，
/// 合并加载时同一个错误会被分发给所有等待中的调用方。
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CacheError {
    /// 序列化错误
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// 缓存存储操作失败
    #[error("Store operation failed: {0}")]
    StoreError(String),

    /// Redis错误
    #[error("Redis error: {0}")]
    RedisError(String),

    /// 调用方提供的加载函数失败
    #[error("Loader failed: {0}")]
    LoaderError(String),

    /// 调用方提供的写入函数失败
    #[error("Writer failed: {0}")]
    WriterError(String),

    /// 配置错误
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// 输入校验失败
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// 延迟写入队列已满
    #[error("Write-behind queue is full: {0}")]
    Backpressure(String),

    /// 操作不支持
    #[error("Operation not supported: {0}")]
    NotSupported(String),

    /// 超时错误
    #[error("Timeout error: {0}")]
    Timeout(String),

    /// 关闭错误
    #[error("Shutdown error: {0}")]
    ShutdownError(String),
}

impl From<redis::RedisError> for CacheError {
    fn from(e: redis::RedisError) -> Self {
        CacheError::RedisError(e.to_string())
    }
}

impl From<serde_json::Error> for CacheError {
    fn from(e: serde_json::Error) -> Self {
        CacheError::Serialization(e.to_string())
    }
}

impl From<std::io::Error> for CacheError {
    fn from(e: std::io::Error) -> Self {
        CacheError::StoreError(e.to_string())
    }
}

/// 缓存操作结果类型别名
pub type Result<T> = std::result::Result<T, CacheError>;
