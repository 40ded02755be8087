//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了测试的通用工具函数和设置。

#![allow(dead_code)]

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, Once};
use std::time::Duration;
use tagcache::backend::{CleaningMode, TagBackend};
use tagcache::config::SlowConfig;
use tagcache::{CacheError, CacheFacade, FastCache, SlowCache};
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::EnvFilter;

static INIT: Once = Once::new();

pub fn setup_logging() {
    INIT.call_once(|| {
        tracing_subscriber::fmt()
            .with_span_events(FmtSpan::CLOSE)
            .with_env_filter(EnvFilter::new("debug"))
            .try_init()
            .ok();
    });
}

/// 生成唯一的服务名称
pub fn generate_unique_service_name(base: &str) -> String {
    format!("{}_{}", base, uuid::Uuid::new_v4().simple())
}

pub fn bytes(s: &str) -> Vec<u8> {
    s.as_bytes().to_vec()
}

/// 后端调用记录
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendCall {
    Load(String),
    Save(String),
    Remove(String),
    Clean(Vec<String>),
}

#[derive(Default)]
struct MemoryState {
    values: HashMap<String, Vec<u8>>,
    ttls: HashMap<String, u64>,
    tags: HashMap<String, HashSet<String>>,
    key_tags: HashMap<String, HashSet<String>>,
    calls: Vec<BackendCall>,
}

impl MemoryState {
    fn remove_key(&mut self, key: &str) -> bool {
        let existed = self.values.remove(key).is_some();
        self.ttls.remove(key);
        if let Some(tags) = self.key_tags.remove(key) {
            for tag in tags {
                if let Some(keys) = self.tags.get_mut(&tag) {
                    keys.remove(key);
                    if keys.is_empty() {
                        self.tags.remove(&tag);
                    }
                }
            }
        }
        existed
    }
}

/// 内存版慢层后端
///
/// 与Redis后端保持相同的标签语义，可以注入读写故障和延迟
#[derive(Default)]
pub struct MemoryTagBackend {
    state: Mutex<MemoryState>,
    fail_reads: AtomicBool,
    fail_writes: AtomicBool,
    delay: Mutex<Option<Duration>>,
}

impl MemoryTagBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// 每次调用前的人为延迟
    pub fn set_delay(&self, delay: Option<Duration>) {
        *self.delay.lock().unwrap() = delay;
    }

    pub fn calls(&self) -> Vec<BackendCall> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.state.lock().unwrap().values.contains_key(key)
    }

    pub fn ttl_of(&self, key: &str) -> Option<u64> {
        self.state.lock().unwrap().ttls.get(key).copied()
    }

    async fn pause(&self) {
        let delay = *self.delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
    }

    fn check_write(&self) -> tagcache::Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(CacheError::Timeout("memory backend write".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl TagBackend for MemoryTagBackend {
    async fn load(&self, key: &str) -> tagcache::Result<Option<Vec<u8>>> {
        self.pause().await;
        let mut state = self.state.lock().unwrap();
        state.calls.push(BackendCall::Load(key.to_string()));
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(CacheError::Timeout("memory backend read".to_string()));
        }
        Ok(state.values.get(key).cloned())
    }

    async fn save(
        &self,
        key: &str,
        value: &[u8],
        tags: &[String],
        ttl: u64,
    ) -> tagcache::Result<()> {
        self.pause().await;
        let mut state = self.state.lock().unwrap();
        state.calls.push(BackendCall::Save(key.to_string()));
        self.check_write()?;
        state.values.insert(key.to_string(), value.to_vec());
        state.ttls.insert(key.to_string(), ttl);
        for tag in tags {
            state
                .tags
                .entry(tag.clone())
                .or_default()
                .insert(key.to_string());
            state
                .key_tags
                .entry(key.to_string())
                .or_default()
                .insert(tag.clone());
        }
        Ok(())
    }

    async fn remove(&self, key: &str) -> tagcache::Result<()> {
        self.pause().await;
        let mut state = self.state.lock().unwrap();
        state.calls.push(BackendCall::Remove(key.to_string()));
        self.check_write()?;
        state.remove_key(key);
        Ok(())
    }

    async fn clean(&self, mode: CleaningMode, tags: &[String]) -> tagcache::Result<u64> {
        self.pause().await;
        let mut state = self.state.lock().unwrap();
        state.calls.push(BackendCall::Clean(tags.to_vec()));
        self.check_write()?;
        let sets: Vec<HashSet<String>> = tags
            .iter()
            .map(|tag| state.tags.get(tag).cloned().unwrap_or_default())
            .collect();
        let matched: HashSet<String> = match mode {
            CleaningMode::MatchingAnyTag => sets.into_iter().flatten().collect(),
            CleaningMode::MatchingAllTags => {
                let mut iter = sets.into_iter();
                match iter.next() {
                    Some(first) => iter.fold(first, |acc, set| &acc & &set),
                    None => HashSet::new(),
                }
            }
        };
        let mut removed = 0;
        for key in matched {
            if state.remove_key(&key) {
                removed += 1;
            }
        }
        Ok(removed)
    }
}

/// 组装一个基于内存后端的门面
pub fn memory_facade(service_name: &str) -> (CacheFacade, Arc<MemoryTagBackend>) {
    let backend = Arc::new(MemoryTagBackend::new());
    let fast = Arc::new(FastCache::new(service_name));
    let slow = Arc::new(SlowCache::new(service_name, backend.clone()));
    (CacheFacade::new(fast, slow), backend)
}

/// 测试用Redis连接配置，`REDIS_URL` 可覆盖默认地址
pub fn redis_slow_config(key_prefix: &str) -> SlowConfig {
    let url =
        std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://127.0.0.1:6379".to_string());
    SlowConfig {
        connection_string: SecretString::new(url.into()),
        connection_timeout_ms: 1000,
        command_timeout_ms: 2000,
        key_prefix: key_prefix.to_string(),
        ..Default::default()
    }
}

/// 检查Redis是否可用
pub async fn is_redis_available(config: &SlowConfig) -> bool {
    let client = match redis::Client::open(config.connection_string.expose_secret()) {
        Ok(client) => client,
        Err(_) => return false,
    };
    let ping = async {
        let mut conn = client.get_multiplexed_async_connection().await?;
        let pong: redis::RedisResult<String> = redis::cmd("PING").query_async(&mut conn).await;
        pong
    };
    matches!(
        tokio::time::timeout(Duration::from_secs(2), ping).await,
        Ok(Ok(_))
    )
}
