//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了CLI命令行接口，用于直接操作已配置的缓存。

use crate::client::{CacheFacade, CacheStore};
use crate::config::Config;
use crate::metrics::get_metrics_string;
use crate::telemetry::init_tracing;
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "tagcache")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[arg(short, long, default_value = "tagcache.toml", help = "Path to the TOML config file")]
    pub config: PathBuf,

    #[arg(long, default_value = "warn", help = "Log filter used when RUST_LOG is unset")]
    pub log: String,

    #[arg(long, help = "Print request metrics after the command")]
    pub metrics: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    #[command(name = "get", about = "Read a key through the cache facade")]
    Get(KeyArgs),

    #[command(name = "set", about = "Write a key to both tiers")]
    Set(SetArgs),

    #[command(name = "clear", about = "Remove a key from both tiers")]
    Clear(KeyArgs),

    #[command(name = "invalidate", about = "Invalidate every key carrying any of the tags")]
    Invalidate(InvalidateArgs),

    #[command(name = "ping", about = "Check slow tier connectivity")]
    Ping,
}

#[derive(Parser, Debug)]
pub struct KeyArgs {
    #[arg(help = "Cache key")]
    pub key: String,
}

#[derive(Parser, Debug)]
pub struct SetArgs {
    #[arg(help = "Cache key")]
    pub key: String,

    #[arg(help = "Value stored as UTF-8 bytes")]
    pub value: String,

    #[arg(short, long, help = "TTL in seconds (slow tier default when omitted or 0)")]
    pub ttl: Option<u64>,

    #[arg(short = 'g', long = "tag", help = "Tag label, repeatable")]
    pub tags: Vec<String>,
}

#[derive(Parser, Debug)]
pub struct InvalidateArgs {
    #[arg(required = true, help = "Tag labels")]
    pub tags: Vec<String>,
}

pub async fn run() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(&cli.log);

    let config = Config::from_file(&cli.config)
        .with_context(|| format!("Failed to load config {}", cli.config.display()))?;
    let facade = CacheFacade::connect(&config)
        .await
        .context("Failed to connect cache facade")?;

    execute(&facade, &cli.command).await?;
    if cli.metrics {
        print!("{}", get_metrics_string());
    }
    Ok(())
}

/// 对给定门面执行一条命令
pub async fn execute(facade: &CacheFacade, command: &Commands) -> Result<()> {
    match command {
        Commands::Get(args) => match facade.get(&args.key).await {
            Some(value) => println!("{}", String::from_utf8_lossy(&value)),
            None => println!("(absent)"),
        },
        Commands::Set(args) => {
            facade
                .set(&args.key, args.value.as_bytes().to_vec(), args.ttl, &args.tags)
                .await
                .with_context(|| format!("Failed to set key '{}'", args.key))?;
            println!("OK");
        }
        Commands::Clear(args) => {
            facade
                .clear(&args.key)
                .await
                .with_context(|| format!("Failed to clear key '{}'", args.key))?;
            println!("OK");
        }
        Commands::Invalidate(args) => {
            facade
                .invalidate_by_tags(&args.tags)
                .await
                .with_context(|| format!("Failed to invalidate tags {:?}", args.tags))?;
            println!("OK");
        }
        Commands::Ping => {
            facade.slow().ping().await.context("Slow tier ping failed")?;
            println!("PONG");
        }
    }
    Ok(())
}
