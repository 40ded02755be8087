//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了统一的缓存契约以及快层、慢层和门面三种实现。

pub mod facade;
pub mod fast;
pub mod slow;

use crate::error::{CacheError, Result};
use crate::serialization::{Serializer, SerializerEnum};
use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};
use std::collections::HashSet;
use tracing::{instrument, warn};

pub use facade::CacheFacade;
pub use fast::{FastCache, PromotionTicket};
pub use slow::SlowCache;

/// 默认的键最大长度
pub const DEFAULT_MAX_KEY_LENGTH: usize = 256;

/// 缓存契约
///
/// 快层、慢层和门面都实现同一组操作：
///
/// * `get` 从不失败，未命中和后端故障都表现为 `None`
/// * `set` 覆盖已有条目，标签顺序无关、重复标签合并
/// * `clear` 幂等，清除不存在的键不是错误
/// * `invalidate_by_tags` 删除带有任意一个给定标签的条目（并集）
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// 获取缓存值
    async fn get(&self, key: &str) -> Option<Vec<u8>>;

    /// 设置缓存值
    ///
    /// # 参数
    ///
    /// * `key` - 缓存键
    /// * `value` - 缓存值
    /// * `ttl` - 过期时间（秒），具体含义由各层决定
    /// * `tags` - 标签列表
    async fn set(&self, key: &str, value: Vec<u8>, ttl: Option<u64>, tags: &[String])
        -> Result<()>;

    /// 删除缓存项
    async fn clear(&self, key: &str) -> Result<()>;

    /// 按标签失效缓存项
    async fn invalidate_by_tags(&self, tags: &[String]) -> Result<()>;

    /// 获取序列化器
    fn serializer(&self) -> &SerializerEnum;
}

/// 缓存扩展特征
///
/// 为所有 [`CacheStore`] 提供类型安全的读写接口
#[async_trait]
pub trait CacheExt: CacheStore {
    /// 获取缓存值（反序列化）
    ///
    /// 反序列化失败按未命中处理并记录警告
    #[instrument(skip(self), level = "debug")]
    async fn get_value<T: DeserializeOwned + Send>(&self, key: &str) -> Option<T> {
        let bytes = self.get(key).await?;
        match self.serializer().deserialize(&bytes) {
            Ok(value) => Some(value),
            Err(e) => {
                warn!("Cached value for key {} could not be decoded: {}", key, e);
                None
            }
        }
    }

    /// 设置缓存值（序列化）
    #[instrument(skip(self, value), level = "debug")]
    async fn set_value<T: Serialize + Send + Sync>(
        &self,
        key: &str,
        value: &T,
        ttl: Option<u64>,
        tags: &[String],
    ) -> Result<()> {
        let bytes = self.serializer().serialize(value)?;
        self.set(key, bytes, ttl, tags).await
    }
}

impl<T: CacheStore + ?Sized> CacheExt for T {}

/// 校验缓存键：非空且不超过最大长度
pub fn validate_key(key: &str, max_len: usize) -> Result<()> {
    if key.is_empty() {
        return Err(CacheError::InvalidKey("key cannot be empty".to_string()));
    }
    if key.len() > max_len {
        return Err(CacheError::InvalidKey(format!(
            "key length {} exceeds maximum of {}",
            key.len(),
            max_len
        )));
    }
    Ok(())
}

/// 标签去重，保持首次出现的顺序
pub fn normalize_tags(tags: &[String]) -> Vec<String> {
    let mut seen = HashSet::with_capacity(tags.len());
    tags.iter()
        .filter(|tag| seen.insert(tag.as_str()))
        .cloned()
        .collect()
}

/// 由字符串字面量构造标签列表
pub fn tags<I, S>(items: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    items.into_iter().map(Into::into).collect()
}
