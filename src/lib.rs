//! tagcache - 分层、基于标签失效的缓存库
//!
//! 提供进程内快层、基于Redis的慢层以及协调两者的缓存门面。
//! 调用方只面对统一的 [`CacheStore`] 契约：
//!
//! * 读先查快层，未命中时回落慢层并提升到快层
//! * 写同时作用于两层，先慢层后快层
//! * 按标签失效先慢层后快层，避免并发读把旧值重新提升到快层

#![doc(html_root_url = "https://docs.rs/tagcache/0.1.0")]

pub use serde;
pub use serde::{Deserialize, Serialize};
pub use tokio;

pub mod backend;
pub mod cli;
pub mod client;
pub mod config;
pub mod error;
pub mod metrics;
pub mod serialization;
pub mod telemetry;

// Re-export commonly used items
pub use backend::{CleaningMode, TagBackend};
pub use client::{tags, CacheExt, CacheFacade, CacheStore, FastCache, SlowCache};
pub use config::{Config, ConfigSource};
pub use error::{CacheError, Result};

/// tagcache 版本号
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
