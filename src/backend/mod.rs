//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了慢层后端的能力集合及其Redis实现。
//!
//! 慢层被建模为不透明的网络化键值服务，只要求支持
//! `load` / `save` / `remove` / `clean` 四个原语。

pub mod redis_backend;
pub mod redis_provider;

use crate::error::Result;
use async_trait::async_trait;

/// 标签清理模式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CleaningMode {
    /// 清理带有任意一个给定标签的条目（并集）
    MatchingAnyTag,
    /// 仅清理同时带有全部给定标签的条目（交集）
    MatchingAllTags,
}

impl CleaningMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            CleaningMode::MatchingAnyTag => "any",
            CleaningMode::MatchingAllTags => "all",
        }
    }
}

/// 慢层后端特征
///
/// 所有调用都可能产生网络延迟或失败；超时由后端自身负责。
#[async_trait]
pub trait TagBackend: Send + Sync {
    /// 读取缓存值，不存在时返回None
    async fn load(&self, key: &str) -> Result<Option<Vec<u8>>>;

    /// 写入缓存值，覆盖旧值并把键加入每个标签
    ///
    /// # 参数
    ///
    /// * `key` - 缓存键
    /// * `value` - 缓存值（字节数组）
    /// * `tags` - 标签列表
    /// * `ttl` - 过期时间（秒）
    async fn save(&self, key: &str, value: &[u8], tags: &[String], ttl: u64) -> Result<()>;

    /// 删除缓存项，键不存在时不报错
    async fn remove(&self, key: &str) -> Result<()>;

    /// 按标签清理缓存项，返回被删除的条目数
    async fn clean(&self, mode: CleaningMode, tags: &[String]) -> Result<u64>;

    /// 检查后端连通性
    async fn ping(&self) -> Result<()> {
        Ok(())
    }
}
