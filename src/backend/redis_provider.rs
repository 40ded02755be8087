//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了Redis连接提供者接口和默认实现。

use crate::{
    config::{RedisMode, SlowConfig},
    error::{CacheError, Result},
};
use async_trait::async_trait;
use redis::{aio::ConnectionManager, Client};
use secrecy::ExposeSecret;
use tokio::time::{timeout, Duration};
use tracing::{debug, instrument};

/// Redis连接提供者
///
/// 抽象出连接建立过程，便于测试替换
#[async_trait]
pub trait RedisProvider: Send + Sync {
    async fn connect(&self, config: &SlowConfig) -> Result<(Client, ConnectionManager)>;
}

pub struct DefaultRedisProvider;

impl DefaultRedisProvider {
    /// 根据TLS配置规范化连接字符串
    pub fn connection_url(config: &SlowConfig) -> String {
        let raw = config.connection_string.expose_secret();
        if config.enable_tls && !raw.starts_with("rediss://") {
            raw.replacen("redis://", "rediss://", 1)
        } else {
            raw.to_string()
        }
    }
}

/// 脱敏连接字符串中的密码，用于日志输出
pub fn redact_url(url: &str) -> String {
    let Some(scheme_end) = url.find("://") else {
        return url.to_string();
    };
    let rest = &url[scheme_end + 3..];
    match (rest.rfind('@'), rest.find(':')) {
        (Some(at), Some(colon)) if colon < at => format!(
            "{}{}:****{}",
            &url[..scheme_end + 3],
            &rest[..colon],
            &rest[at..]
        ),
        _ => url.to_string(),
    }
}

#[async_trait]
impl RedisProvider for DefaultRedisProvider {
    #[instrument(skip(self, config), level = "info", fields(mode = ?config.mode))]
    async fn connect(&self, config: &SlowConfig) -> Result<(Client, ConnectionManager)> {
        match config.mode {
            RedisMode::Standalone => {
                let url = Self::connection_url(config);
                let client = Client::open(url.as_str())?;
                let manager = match timeout(
                    Duration::from_millis(config.connection_timeout_ms),
                    client.get_connection_manager(),
                )
                .await
                {
                    Ok(res) => res?,
                    Err(_) => {
                        return Err(CacheError::Timeout(format!(
                            "Redis connection timed out after {}ms",
                            config.connection_timeout_ms
                        )));
                    }
                };
                debug!("Redis connection manager established: {}", redact_url(&url));
                Ok((client, manager))
            }
        }
    }
}
