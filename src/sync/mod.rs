//! Copyright (c) 2025, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了协调层的并发机制：请求合并、延迟写入、预热和跨实例同步。

pub mod coalescer;
pub mod invalidation;
pub mod warmup;
pub mod write_behind;
