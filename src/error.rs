//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了缓存系统的错误类型和处理机制。

use thiserror::Error;

/// 缓存系统错误类型枚举
///
/// 读路径（`get`）从不返回错误：未命中与慢层故障对调用方不可区分。
/// 写路径（`set` / `clear` / `invalidate_by_tags`）的慢层故障会以
/// [`CacheError::SlowTier`] 的形式上报，由调用方决定记录或忽略。
#[derive(Error, Debug)]
pub enum CacheError {
    /// 序列化错误
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// 非法的缓存键（空键或超长）
    #[error("Invalid cache key: {0}")]
    InvalidKey(String),

    /// 慢层（网络后端）写操作失败
    #[error("Slow tier operation failed: {0}")]
    SlowTier(String),

    /// 配置错误
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// 配置文件解析错误
    #[error("Configuration parse error: {0}")]
    TomlError(#[from] toml::de::Error),

    /// Redis错误
    #[error("Redis error: {0}")]
    RedisError(#[from] redis::RedisError),

    /// IO错误
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    /// 超时错误
    #[error("Timeout error: {0}")]
    Timeout(String),
}

impl CacheError {
    /// 是否为慢层故障（包括超时与Redis错误）
    pub fn is_slow_tier_failure(&self) -> bool {
        matches!(
            self,
            CacheError::SlowTier(_) | CacheError::Timeout(_) | CacheError::RedisError(_)
        )
    }
}

/// 缓存操作结果类型别名
///
/// 简化错误处理，所有缓存写操作都返回此类型
pub type Result<T> = std::result::Result<T, CacheError>;
