//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了基于Redis的慢层后端，支持标签索引与按标签清理。
//!
//! 键布局（`p` 为配置的键前缀）：
//!
//! * `p:d:{key}` - 数据，`SET EX`
//! * `p:t:{tag}` - 带有该标签的键集合
//! * `p:k:{key}` - 该键携带的标签集合
//!
//! 写入、删除和清理都通过Lua脚本原子执行。

use super::redis_provider::{DefaultRedisProvider, RedisProvider};
use super::{CleaningMode, TagBackend};
use crate::config::SlowConfig;
use crate::error::{CacheError, Result};
use async_trait::async_trait;
use lazy_static::lazy_static;
use redis::{aio::ConnectionManager, AsyncCommands, Client, RedisResult, Script};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, instrument};

lazy_static! {
    // 标签集合的过期时间不早于写入其中的最长TTL
    static ref SAVE_SCRIPT: Script = Script::new(
        r#"
        local ttl = tonumber(ARGV[2])
        redis.call('SET', KEYS[1], ARGV[1], 'EX', ttl)
        for i = 5, #ARGV do
            local tag_key = ARGV[3] .. ARGV[i]
            redis.call('SADD', tag_key, ARGV[4])
            if redis.call('TTL', tag_key) < ttl then
                redis.call('EXPIRE', tag_key, ttl)
            end
            redis.call('SADD', KEYS[2], ARGV[i])
        end
        if redis.call('EXISTS', KEYS[2]) == 1 and redis.call('TTL', KEYS[2]) < ttl then
            redis.call('EXPIRE', KEYS[2], ttl)
        end
        return 1
        "#,
    );

    static ref REMOVE_SCRIPT: Script = Script::new(
        r#"
        for _, tag in ipairs(redis.call('SMEMBERS', KEYS[2])) do
            redis.call('SREM', ARGV[1] .. tag, ARGV[2])
        end
        local removed = redis.call('DEL', KEYS[1])
        redis.call('DEL', KEYS[2])
        return removed
        "#,
    );

    static ref CLEAN_SCRIPT: Script = Script::new(
        r#"
        local tag_keys = {}
        for i = 5, #ARGV do
            tag_keys[#tag_keys + 1] = ARGV[3] .. ARGV[i]
        end
        if #tag_keys == 0 then
            return 0
        end
        local members
        if ARGV[1] == 'all' then
            members = redis.call('SINTER', unpack(tag_keys))
        else
            members = redis.call('SUNION', unpack(tag_keys))
        end
        local removed = 0
        for _, key in ipairs(members) do
            local key_tags = ARGV[4] .. key
            for _, tag in ipairs(redis.call('SMEMBERS', key_tags)) do
                redis.call('SREM', ARGV[3] .. tag, key)
            end
            redis.call('DEL', key_tags)
            removed = removed + redis.call('DEL', ARGV[2] .. key)
        end
        return removed
        "#,
    );
}

/// Redis慢层后端
#[derive(Clone)]
pub struct RedisTagBackend {
    client: Client,
    manager: ConnectionManager,
    prefix: String,
    command_timeout_ms: u64,
}

impl std::fmt::Debug for RedisTagBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisTagBackend")
            .field("prefix", &self.prefix)
            .field("command_timeout_ms", &self.command_timeout_ms)
            .finish()
    }
}

impl RedisTagBackend {
    /// 创建新的Redis慢层后端
    #[instrument(skip(config), level = "info", name = "init_redis_tag_backend")]
    pub async fn new(config: &SlowConfig) -> Result<Self> {
        Self::new_with_provider(config, Arc::new(DefaultRedisProvider)).await
    }

    /// 使用指定的连接提供者创建后端
    pub async fn new_with_provider(
        config: &SlowConfig,
        provider: Arc<dyn RedisProvider>,
    ) -> Result<Self> {
        let (client, manager) = provider.connect(config).await?;
        Ok(Self {
            client,
            manager,
            prefix: config.key_prefix.clone(),
            command_timeout_ms: config.command_timeout_ms,
        })
    }

    /// 获取原始Redis客户端
    pub fn raw_client(&self) -> &Client {
        &self.client
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn data_key(&self, key: &str) -> String {
        format!("{}:d:{}", self.prefix, key)
    }

    pub fn tag_key(&self, tag: &str) -> String {
        format!("{}:t:{}", self.prefix, tag)
    }

    pub fn key_tags_key(&self, key: &str) -> String {
        format!("{}:k:{}", self.prefix, key)
    }

    fn tag_prefix(&self) -> String {
        format!("{}:t:", self.prefix)
    }

    /// 为单个命令施加超时
    async fn timed<T, F>(&self, op: &str, fut: F) -> Result<T>
    where
        F: Future<Output = RedisResult<T>>,
    {
        match tokio::time::timeout(Duration::from_millis(self.command_timeout_ms), fut).await {
            Ok(res) => Ok(res?),
            Err(_) => Err(CacheError::Timeout(format!(
                "Redis {} exceeded {}ms",
                op, self.command_timeout_ms
            ))),
        }
    }

    /// 读取标签当前关联的键（用于诊断和测试）
    #[instrument(skip(self), level = "debug")]
    pub async fn tag_members(&self, tag: &str) -> Result<Vec<String>> {
        let mut conn = self.manager.clone();
        let members: Vec<String> = self
            .timed("smembers", conn.smembers(self.tag_key(tag)))
            .await?;
        Ok(members)
    }

    /// 获取数据项的剩余生存时间（秒）
    #[instrument(skip(self), level = "debug")]
    pub async fn ttl(&self, key: &str) -> Result<Option<u64>> {
        let mut conn = self.manager.clone();
        let ttl: i64 = self.timed("ttl", conn.ttl(self.data_key(key))).await?;
        Ok((ttl > 0).then_some(ttl as u64))
    }
}

#[async_trait]
impl TagBackend for RedisTagBackend {
    #[instrument(skip(self), level = "debug")]
    async fn load(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let mut conn = self.manager.clone();
        let value: Option<Vec<u8>> = self.timed("get", conn.get(self.data_key(key))).await?;
        debug!("Redis load: key={}, found={}", key, value.is_some());
        Ok(value)
    }

    #[instrument(skip(self, value), level = "debug", fields(value_len = value.len()))]
    async fn save(&self, key: &str, value: &[u8], tags: &[String], ttl: u64) -> Result<()> {
        let mut conn = self.manager.clone();
        let _: i32 = self
            .timed(
                "save",
                SAVE_SCRIPT
                    .key(self.data_key(key))
                    .key(self.key_tags_key(key))
                    .arg(value)
                    .arg(ttl)
                    .arg(self.tag_prefix())
                    .arg(key)
                    .arg(tags)
                    .invoke_async(&mut conn),
            )
            .await?;
        debug!("Redis save: key={}, ttl={}, tags={:?}", key, ttl, tags);
        Ok(())
    }

    #[instrument(skip(self), level = "debug")]
    async fn remove(&self, key: &str) -> Result<()> {
        let mut conn = self.manager.clone();
        let removed: i64 = self
            .timed(
                "remove",
                REMOVE_SCRIPT
                    .key(self.data_key(key))
                    .key(self.key_tags_key(key))
                    .arg(self.tag_prefix())
                    .arg(key)
                    .invoke_async(&mut conn),
            )
            .await?;
        debug!("Redis remove: key={}, removed={}", key, removed);
        Ok(())
    }

    #[instrument(skip(self), level = "debug")]
    async fn clean(&self, mode: CleaningMode, tags: &[String]) -> Result<u64> {
        if tags.is_empty() {
            return Ok(0);
        }
        let mut conn = self.manager.clone();
        let removed: u64 = self
            .timed(
                "clean",
                CLEAN_SCRIPT
                    .arg(mode.as_str())
                    .arg(format!("{}:d:", self.prefix))
                    .arg(self.tag_prefix())
                    .arg(format!("{}:k:", self.prefix))
                    .arg(tags)
                    .invoke_async(&mut conn),
            )
            .await?;
        debug!("Redis clean: mode={:?}, tags={:?}, removed={}", mode, tags, removed);
        Ok(removed)
    }

    #[instrument(skip(self), level = "debug")]
    async fn ping(&self) -> Result<()> {
        let mut conn = self.manager.clone();
        let pong: String = self
            .timed("ping", redis::cmd("PING").query_async(&mut conn))
            .await?;
        debug!("Redis ping: {}", pong);
        Ok(())
    }
}
