//! Copyright (c) 2025, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了CLI命令行接口。

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "cachecoord")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[arg(
        short,
        long,
        global = true,
        default_value = "cachecoord.toml",
        help = "Configuration file"
    )]
    pub config: PathBuf,

    #[arg(long, global = true, default_value = "warn", help = "Default log filter")]
    pub log: String,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    #[command(name = "check-config", about = "Validate a configuration file")]
    CheckConfig(CheckConfigArgs),

    #[command(name = "keys", about = "List keys in the configured store")]
    Keys(KeysArgs),

    #[command(name = "invalidate", about = "Delete keys matching a pattern")]
    Invalidate(InvalidateArgs),

    #[command(name = "stats", about = "Show store statistics")]
    Stats(StatsArgs),
}

#[derive(Parser, Debug)]
pub struct CheckConfigArgs {
    #[arg(help = "File to check, defaults to --config")]
    pub file: Option<PathBuf>,
}

#[derive(Parser, Debug)]
pub struct KeysArgs {
    #[arg(short, long, default_value = "*", help = "Glob pattern (* and ?)")]
    pub pattern: String,

    #[arg(short, long, help = "Print at most this many keys")]
    pub limit: Option<usize>,
}

#[derive(Parser, Debug)]
pub struct InvalidateArgs {
    #[arg(short, long, help = "Glob pattern (* and ?)")]
    pub pattern: String,

    #[arg(short = 'y', long, help = "Skip the confirmation prompt")]
    pub yes: bool,
}

#[derive(Parser, Debug)]
pub struct StatsArgs {
    #[arg(short, long, help = "Output in Prometheus format")]
    pub prometheus: bool,

    #[arg(short, long, help = "Output in JSON format")]
    pub json: bool,
}

mod admin;
mod status;

pub async fn run() -> Result<()> {
    let cli = Cli::parse();
    crate::telemetry::init_tracing("cachecoord", &cli.log);

    match &cli.command {
        Commands::CheckConfig(args) => status::check_config(&cli.config, args),
        Commands::Keys(args) => admin::keys(&cli.config, args).await,
        Commands::Invalidate(args) => admin::invalidate(&cli.config, args).await,
        Commands::Stats(args) => status::stats(&cli.config, args).await,
    }
}
