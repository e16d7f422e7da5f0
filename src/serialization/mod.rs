//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了缓存值的序列化机制，模式执行器通过它在泛型值和存储字节之间转换。

pub mod json;

use crate::config::{GlobalConfig, SerializationType};
use crate::error::Result;
use serde::{de::DeserializeOwned, Serialize};

pub use json::JsonSerializer;

/// 序列化器特征
pub trait Serializer: Send + Sync {
    /// 序列化值为字节数组
    fn serialize<T: Serialize>(&self, value: &T) -> Result<Vec<u8>>;

    /// 从字节数组反序列化值
    fn deserialize<T: DeserializeOwned>(&self, data: &[u8]) -> Result<T>;
}

/// 序列化器枚举
///
/// 泛型方法无法放进 trait object，协调器持有该枚举
#[derive(Clone, Debug)]
pub enum SerializerEnum {
    Json(JsonSerializer),
}

impl SerializerEnum {
    /// 根据全局配置选择序列化器
    pub fn from_config(global: &GlobalConfig) -> Self {
        match global.serialization {
            SerializationType::Json if global.enable_compression => {
                SerializerEnum::Json(JsonSerializer::with_compression())
            }
            SerializationType::Json => SerializerEnum::Json(JsonSerializer::new()),
        }
    }
}

impl Default for SerializerEnum {
    fn default() -> Self {
        SerializerEnum::Json(JsonSerializer::new())
    }
}

impl Serializer for SerializerEnum {
    fn serialize<T: Serialize>(&self, value: &T) -> Result<Vec<u8>> {
        match self {
            SerializerEnum::Json(s) => s.serialize(value),
        }
    }

    fn deserialize<T: DeserializeOwned>(&self, data: &[u8]) -> Result<T> {
        match self {
            SerializerEnum::Json(s) => s.deserialize(data),
        }
    }
}
