//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了缓存门面，协调快层与慢层。
//!
//! * 读：先查快层；未命中再查慢层，命中后提升到快层
//! * 写：先写慢层再写快层
//! * 按标签失效：必须先失效慢层再失效快层

use super::{validate_key, CacheStore, FastCache, SlowCache};
use crate::backend::redis_backend::RedisTagBackend;
use crate::config::Config;
use crate::error::Result;
use crate::metrics::GLOBAL_METRICS;
use crate::serialization::SerializerEnum;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

/// 缓存门面
///
/// 无状态协调者，持有两层的共享引用。不会在等待慢层时持有快层的锁。
#[derive(Clone)]
pub struct CacheFacade {
    service_name: String,
    fast: Arc<FastCache>,
    slow: Arc<SlowCache>,
}

impl CacheFacade {
    /// 使用显式传入的两层创建门面
    pub fn new(fast: Arc<FastCache>, slow: Arc<SlowCache>) -> Self {
        Self {
            service_name: fast.service_name().to_string(),
            fast,
            slow,
        }
    }

    /// 根据配置连接Redis并组装两层
    #[instrument(skip(config), level = "info", name = "init_cache_facade")]
    pub async fn connect(config: &Config) -> Result<Self> {
        let serializer = SerializerEnum::from_config(&config.global);
        let fast = Arc::new(FastCache::from_config(config));
        let backend = Arc::new(RedisTagBackend::new(&config.slow).await?);
        let slow = Arc::new(
            SlowCache::new(config.global.service_name.clone(), backend)
                .with_config_source(config)
                .with_max_key_length(config.global.max_key_length)
                .with_serializer(serializer),
        );
        info!(
            "Cache facade ready: service={}, slow default ttl={}s",
            config.global.service_name,
            slow.default_ttl()
        );
        Ok(Self::new(fast, slow))
    }

    pub fn fast(&self) -> &Arc<FastCache> {
        &self.fast
    }

    pub fn slow(&self) -> &Arc<SlowCache> {
        &self.slow
    }
}

#[async_trait]
impl CacheStore for CacheFacade {
    #[instrument(skip(self), level = "debug", fields(service = %self.service_name))]
    async fn get(&self, key: &str) -> Option<Vec<u8>> {
        if validate_key(key, self.fast.max_key_length()).is_err() {
            return None;
        }
        if let Some(value) = self.fast.get(key).await {
            GLOBAL_METRICS.record_request(&self.service_name, "Facade", "get", "fast_hit");
            return Some(value);
        }

        // 在读慢层之前登记；期间该键被写入或清除、或发生失效时，放弃提升
        let ticket = self.fast.begin_promotion(key).await;
        match self.slow.get(key).await {
            Some(value) => {
                if self.fast.promote(key, value.clone(), ticket).await {
                    debug!("Promoted key={} from slow tier", key);
                }
                GLOBAL_METRICS.record_request(&self.service_name, "Facade", "get", "slow_hit");
                Some(value)
            }
            None => {
                self.fast.cancel_promotion(ticket).await;
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
        validate_key(key, self.fast.max_key_length())?;
        if let Err(e) = self.slow.set(key, value.clone(), ttl, tags).await {
            // 快层不能比慢层更新：丢弃快层旧副本并上报错误
            warn!(
                "Slow tier write failed for key {}, evicting fast copy: {}",
                key, e
            );
            self.fast.clear(key).await?;
            return Err(e);
        }
        self.fast.set(key, value, ttl, tags).await
    }

    #[instrument(skip(self), level = "debug", fields(service = %self.service_name))]
    async fn clear(&self, key: &str) -> Result<()> {
        let slow_result = self.slow.clear(key).await;
        self.fast.clear(key).await?;
        slow_result
    }

    #[instrument(skip(self), level = "debug", fields(service = %self.service_name))]
    async fn invalidate_by_tags(&self, tags: &[String]) -> Result<()> {
        // 顺序不可调换：慢层先于快层
        let slow_result = self.slow.invalidate_by_tags(tags).await;
        self.fast.invalidate_by_tags(tags).await?;
        slow_result
    }

    fn serializer(&self) -> &SerializerEnum {
        self.slow.serializer()
    }
}
