//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了JSON序列化器的实现，可选 gzip 压缩。

use super::Serializer;
use crate::error::{CacheError, Result};
use serde::{de::DeserializeOwned, Serialize};

/// JSON序列化器
#[derive(Clone, Debug, Default)]
pub struct JsonSerializer {
    /// 是否启用压缩
    compress: bool,
}

impl JsonSerializer {
    pub fn new() -> Self {
        Self { compress: false }
    }

    /// 创建启用压缩的JSON序列化器
    ///
    /// 未启用 `flate2` 特性时压缩开关不生效
    pub fn with_compression() -> Self {
        Self { compress: true }
    }

    pub fn is_compressed(&self) -> bool {
        self.compress && cfg!(feature = "flate2")
    }
}

#[cfg(feature = "flate2")]
fn gzip(data: &[u8]) -> Result<Vec<u8>> {
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use std::io::Write;

    let mut encoder = GzEncoder::new(Vec::with_capacity(data.len() / 2), Compression::fast());
    encoder
        .write_all(data)
        .map_err(|e| CacheError::Serialization(e.to_string()))?;
    encoder
        .finish()
        .map_err(|e| CacheError::Serialization(e.to_string()))
}

#[cfg(feature = "flate2")]
fn gunzip(data: &[u8]) -> Result<Vec<u8>> {
    use flate2::read::GzDecoder;
    use std::io::Read;

    let mut decoded = Vec::new();
    GzDecoder::new(data)
        .read_to_end(&mut decoded)
        .map_err(|e| CacheError::Serialization(e.to_string()))?;
    Ok(decoded)
}

impl Serializer for JsonSerializer {
    fn serialize<T: Serialize>(&self, value: &T) -> Result<Vec<u8>> {
        let bytes = serde_json::to_vec(value)?;

        #[cfg(feature = "flate2")]
        if self.compress {
            return gzip(&bytes);
        }

        Ok(bytes)
    }

    fn deserialize<T: DeserializeOwned>(&self, data: &[u8]) -> Result<T> {
        #[cfg(feature = "flate2")]
        if self.compress {
            let decoded = gunzip(data)?;
            return Ok(serde_json::from_slice(&decoded)?);
        }

        Ok(serde_json::from_slice(data)?)
    }
}
