//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了慢层缓存：网络后端之上的薄适配层。

use super::{normalize_tags, validate_key, CacheStore, DEFAULT_MAX_KEY_LENGTH};
use crate::backend::{CleaningMode, TagBackend};
use crate::config::{ConfigSource, DEFAULT_SLOW_TTL_SECS, SLOW_DEFAULT_TTL_PATH};
use crate::error::{CacheError, Result};
use crate::metrics::GLOBAL_METRICS;
use crate::serialization::SerializerEnum;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, instrument, warn};

/// 慢层缓存
///
/// 读操作把后端故障当作未命中处理，缓存层自身的故障不能让调用方的业务失败；
/// 写操作的后端故障以 [`CacheError::SlowTier`] 返回。
pub struct SlowCache {
    service_name: String,
    backend: Arc<dyn TagBackend>,
    default_ttl: u64,
    max_key_length: usize,
    serializer: SerializerEnum,
}

impl SlowCache {
    /// 创建新的慢层缓存，使用默认TTL 3600 秒
    pub fn new(service_name: impl Into<String>, backend: Arc<dyn TagBackend>) -> Self {
        Self {
            service_name: service_name.into(),
            backend,
            default_ttl: DEFAULT_SLOW_TTL_SECS,
            max_key_length: DEFAULT_MAX_KEY_LENGTH,
            serializer: SerializerEnum::default(),
        }
    }

    /// 从配置源读取默认TTL，缺失、无法解析或为零时回退到 3600 秒
    pub fn with_config_source(mut self, source: &dyn ConfigSource) -> Self {
        self.default_ttl = source
            .u64_value(SLOW_DEFAULT_TTL_PATH)
            .filter(|ttl| *ttl > 0)
            .unwrap_or(DEFAULT_SLOW_TTL_SECS);
        self
    }

    pub fn with_max_key_length(mut self, max_key_length: usize) -> Self {
        self.max_key_length = max_key_length;
        self
    }

    pub fn with_serializer(mut self, serializer: SerializerEnum) -> Self {
        self.serializer = serializer;
        self
    }

    pub fn default_ttl(&self) -> u64 {
        self.default_ttl
    }

    pub fn backend(&self) -> &Arc<dyn TagBackend> {
        &self.backend
    }

    /// 检查后端连通性
    pub async fn ping(&self) -> Result<()> {
        self.backend.ping().await
    }

    fn write_failure(&self, op: &str, key_or_tags: &str, err: CacheError) -> CacheError {
        warn!(
            "Slow tier {} failed for {}: {}, service={}",
            op, key_or_tags, err, self.service_name
        );
        GLOBAL_METRICS.record_request(&self.service_name, "Slow", op, "error");
        match err {
            CacheError::SlowTier(_) => err,
            other => CacheError::SlowTier(format!("{} {}: {}", op, key_or_tags, other)),
        }
    }
}

#[async_trait]
impl CacheStore for SlowCache {
    #[instrument(skip(self), level = "debug", fields(service = %self.service_name))]
    async fn get(&self, key: &str) -> Option<Vec<u8>> {
        let start = Instant::now();
        let result = self.backend.load(key).await;
        GLOBAL_METRICS.record_duration(
            &self.service_name,
            "Slow",
            "get",
            start.elapsed().as_secs_f64(),
        );
        match result {
            Ok(Some(value)) => {
                GLOBAL_METRICS.record_request(&self.service_name, "Slow", "get", "hit");
                Some(value)
            }
            Ok(None) => {
                GLOBAL_METRICS.record_request(&self.service_name, "Slow", "get", "miss");
                None
            }
            Err(e) => {
                warn!("Slow tier read failed for key {}, treating as miss: {}", key, e);
                GLOBAL_METRICS.record_request(&self.service_name, "Slow", "get", "error");
                None
            }
        }
    }

    #[instrument(skip(self, value), level = "debug", fields(service = %self.service_name))]
    async fn set(
        &self,
        key: &str,
        value: Vec<u8>,
        ttl: Option<u64>,
        tags: &[String],
    ) -> Result<()> {
        validate_key(key, self.max_key_length)?;
        // 0 表示未指定，后端不接受零过期时间
        let ttl = ttl.filter(|ttl| *ttl > 0).unwrap_or(self.default_ttl);
        let tags = normalize_tags(tags);
        let start = Instant::now();
        let result = self.backend.save(key, &value, &tags, ttl).await;
        GLOBAL_METRICS.record_duration(
            &self.service_name,
            "Slow",
            "set",
            start.elapsed().as_secs_f64(),
        );
        match result {
            Ok(()) => {
                debug!("Slow set: key={}, ttl={}, tags={:?}", key, ttl, tags);
                GLOBAL_METRICS.record_request(&self.service_name, "Slow", "set", "success");
                Ok(())
            }
            Err(e) => Err(self.write_failure("set", key, e)),
        }
    }

    #[instrument(skip(self), level = "debug", fields(service = %self.service_name))]
    async fn clear(&self, key: &str) -> Result<()> {
        match self.backend.remove(key).await {
            Ok(()) => {
                GLOBAL_METRICS.record_request(&self.service_name, "Slow", "clear", "success");
                Ok(())
            }
            Err(e) => Err(self.write_failure("clear", key, e)),
        }
    }

    #[instrument(skip(self), level = "debug", fields(service = %self.service_name))]
    async fn invalidate_by_tags(&self, tags: &[String]) -> Result<()> {
        let tags = normalize_tags(tags);
        if tags.is_empty() {
            return Ok(());
        }
        match self.backend.clean(CleaningMode::MatchingAnyTag, &tags).await {
            Ok(removed) => {
                debug!("Slow invalidate_by_tags: tags={:?}, removed={}", tags, removed);
                GLOBAL_METRICS.record_request(
                    &self.service_name,
                    "Slow",
                    "invalidate",
                    "success",
                );
                Ok(())
            }
            Err(e) => Err(self.write_failure("invalidate", &tags.join(","), e)),
        }
    }

    fn serializer(&self) -> &SerializerEnum {
        &self.serializer
    }
}
