//! Copyright (c) 2025, Kirky.X
//!
//! MIT License
//!
//! 序列化单元测试

use cachecoord::config::GlobalConfig;
use cachecoord::serialization::{json::JsonSerializer, Serializer, SerializerEnum};
use serde::{Deserialize, Serialize};

#[derive(Serialize, Deserialize, PartialEq, Debug)]
struct Review {
    id: u64,
    text: String,
    tags: Vec<String>,
}

fn sample() -> Review {
    Review {
        id: 7,
        text: "great product ".repeat(20),
        tags: vec!["positive".into(), "electronics".into()],
    }
}

#[test]
fn test_json_serializer_restores_value() {
    let serializer = JsonSerializer::new();
    let bytes = serializer.serialize(&sample()).unwrap();
    let restored: Review = serializer.deserialize(&bytes).unwrap();
    assert_eq!(restored, sample());
}

/// 压缩后的数据应比原始 JSON 小，且能够还原
#[test]
fn test_compressed_serializer_shrinks_repetitive_payload() {
    let plain = JsonSerializer::new();
    let compressed = JsonSerializer::with_compression();

    let plain_bytes = plain.serialize(&sample()).unwrap();
    let compressed_bytes = compressed.serialize(&sample()).unwrap();

    if compressed.is_compressed() {
        assert!(compressed_bytes.len() < plain_bytes.len());
    }
    let restored: Review = compressed.deserialize(&compressed_bytes).unwrap();
    assert_eq!(restored, sample());
}

#[test]
fn test_garbage_input_is_serialization_error() {
    let serializer = SerializerEnum::default();
    let err = serializer.deserialize::<Review>(b"not json").unwrap_err();
    assert!(matches!(
        err,
        cachecoord::error::CacheError::Serialization(_)
    ));
}

#[test]
fn test_serializer_follows_global_config() {
    let global = GlobalConfig {
        enable_compression: true,
        ..Default::default()
    };
    let SerializerEnum::Json(json) = SerializerEnum::from_config(&global);
    assert_eq!(json.is_compressed(), cfg!(feature = "flate2"));
}
