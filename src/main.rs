//! Copyright (c) 2025, Kirky.X
//!
//! MIT License
//!
//! 该模块是缓存协调层命令行工具的入口点。

use anyhow::Result;

#[tokio::main]
async fn main() -> Result<()> {
    cachecoord::cli::run().await
}
