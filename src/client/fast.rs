//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了快层缓存：进程内键值存储加标签索引。
//!
//! 值表、标签索引和待提升登记放在同一把锁下，清除时的索引清理和
//! 按标签失效时的扫描都不会被其他任务观察到中间状态。

use super::{normalize_tags, validate_key, CacheStore, DEFAULT_MAX_KEY_LENGTH};
use crate::config::Config;
use crate::error::Result;
use crate::metrics::GLOBAL_METRICS;
use crate::serialization::SerializerEnum;
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::{debug, instrument};

/// 快层条目
#[derive(Debug, Clone)]
struct Entry {
    value: Vec<u8>,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_expired(&self, now: Instant) -> bool {
        matches!(self.expires_at, Some(at) if now >= at)
    }
}

/// 待提升登记
///
/// 在读取慢层之前取得，同一个键的写入或清除以及任何一次按标签失效
/// 都会使其作废。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PromotionTicket(u64);

#[derive(Debug, Default)]
struct FastState {
    values: HashMap<String, Entry>,
    /// 标签 -> 当前带有该标签的键
    tags: HashMap<String, HashSet<String>>,
    /// 由慢层提升、不带标签的键
    promoted: HashSet<String>,
    /// 仍然有效的待提升登记
    pending: HashMap<PromotionTicket, String>,
    next_ticket: u64,
}

impl FastState {
    /// 从所有标签集合中移除给定键，并丢弃空集合
    fn scrub(&mut self, removed: &HashSet<String>) {
        if removed.is_empty() {
            return;
        }
        self.tags.retain(|_, keys| {
            keys.retain(|k| !removed.contains(k));
            !keys.is_empty()
        });
    }

    fn remove_key(&mut self, key: &str) -> bool {
        let existed = self.values.remove(key).is_some();
        self.promoted.remove(key);
        let mut removed = HashSet::with_capacity(1);
        removed.insert(key.to_string());
        self.scrub(&removed);
        existed
    }

    /// 作废该键的所有待提升登记
    fn revoke_pending(&mut self, key: &str) {
        self.pending.retain(|_, pending_key| pending_key != key);
    }

    /// 移除所有已过期的条目，返回被移除的键（索引由调用方清理）
    fn take_expired(&mut self, now: Instant) -> HashSet<String> {
        let expired: HashSet<String> = self
            .values
            .iter()
            .filter(|(_, entry)| entry.is_expired(now))
            .map(|(key, _)| key.clone())
            .collect();
        for key in &expired {
            self.values.remove(key);
            self.promoted.remove(key);
        }
        expired
    }
}

/// 快层缓存
///
/// 进程内、易失的键值存储，不做网络I/O，也不持久化。
/// 标签成员关系只增不减：对同一个键重复 `set` 不会移除之前的标签，
/// 只有 `clear` 或标签失效会清理索引。
///
/// 由慢层提升的副本不带标签，无法按标签匹配。任何一次非空的按标签失效
/// 都会将其一并清除，即使失效的标签与它无关：这样提升的副本不会在其
/// 真实标签失效后继续返回旧值，代价是无关的失效也会让快层重新从慢层预热。
///
/// TTL默认不生效；开启 `honor_ttl` 后在读取时惰性过期，`clear` 和
/// 按标签失效在持有写锁时也会顺带清理所有已过期的条目。
pub struct FastCache {
    service_name: String,
    state: RwLock<FastState>,
    honor_ttl: bool,
    max_key_length: usize,
    serializer: SerializerEnum,
}

impl Default for FastCache {
    fn default() -> Self {
        Self::new("default")
    }
}

impl FastCache {
    /// 创建新的快层缓存
    pub fn new(service_name: impl Into<String>) -> Self {
        Self {
            service_name: service_name.into(),
            state: RwLock::new(FastState::default()),
            honor_ttl: false,
            max_key_length: DEFAULT_MAX_KEY_LENGTH,
            serializer: SerializerEnum::default(),
        }
    }

    /// 根据配置创建快层缓存
    pub fn from_config(config: &Config) -> Self {
        Self::new(config.global.service_name.clone())
            .with_honor_ttl(config.fast.honor_ttl)
            .with_max_key_length(config.global.max_key_length)
            .with_serializer(SerializerEnum::from_config(&config.global))
    }

    pub fn with_honor_ttl(mut self, honor_ttl: bool) -> Self {
        self.honor_ttl = honor_ttl;
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

    pub fn service_name(&self) -> &str {
        &self.service_name
    }

    pub fn max_key_length(&self) -> usize {
        self.max_key_length
    }

    /// 登记一次即将进行的提升，必须在读取慢层之前调用
    pub async fn begin_promotion(&self, key: &str) -> PromotionTicket {
        let mut state = self.state.write().await;
        let ticket = PromotionTicket(state.next_ticket);
        state.next_ticket += 1;
        state.pending.insert(ticket, key.to_string());
        ticket
    }

    /// 放弃一次登记（慢层未命中时）
    pub async fn cancel_promotion(&self, ticket: PromotionTicket) {
        self.state.write().await.pending.remove(&ticket);
    }

    /// 当前仍有效的登记数量
    pub async fn pending_promotions(&self) -> usize {
        self.state.read().await.pending.len()
    }

    /// 提升慢层命中的值
    ///
    /// 写入的副本不带标签也不带TTL，存活到下一次按标签失效或清除。
    /// 登记之后该键被写入或清除、或发生过按标签失效时放弃写入；
    /// 键已存在时同样放弃，已有条目不会比慢层读到的值更旧。返回是否写入成功。
    #[instrument(skip(self, value), level = "debug", fields(service = %self.service_name))]
    pub async fn promote(&self, key: &str, value: Vec<u8>, ticket: PromotionTicket) -> bool {
        let mut state = self.state.write().await;
        let valid = state.pending.remove(&ticket).is_some_and(|k| k == key);
        if !valid || state.values.contains_key(key) {
            debug!(
                "Fast promote skipped: key={}, ticket_valid={}",
                key, valid
            );
            GLOBAL_METRICS.record_request(&self.service_name, "Fast", "promote", "skipped");
            return false;
        }
        state.values.insert(
            key.to_string(),
            Entry {
                value,
                expires_at: None,
            },
        );
        state.promoted.insert(key.to_string());
        GLOBAL_METRICS.record_request(&self.service_name, "Fast", "promote", "success");
        true
    }

    /// 条目数量
    pub async fn len(&self) -> usize {
        self.state.read().await.values.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.state.read().await.values.is_empty()
    }

    pub async fn contains_key(&self, key: &str) -> bool {
        self.state.read().await.values.contains_key(key)
    }

    /// 标签当前关联的键（已排序）
    pub async fn tag_keys(&self, tag: &str) -> Vec<String> {
        let state = self.state.read().await;
        let mut keys: Vec<String> = state
            .tags
            .get(tag)
            .map(|keys| keys.iter().cloned().collect())
            .unwrap_or_default();
        keys.sort();
        keys
    }

    /// 索引中的标签数量
    pub async fn tag_count(&self) -> usize {
        self.state.read().await.tags.len()
    }

    /// 检查索引中的每个键都有对应的值
    pub async fn index_is_consistent(&self) -> bool {
        let state = self.state.read().await;
        state
            .tags
            .values()
            .all(|keys| !keys.is_empty() && keys.iter().all(|k| state.values.contains_key(k)))
    }

    /// 读取时惰性清理过期条目
    async fn purge_expired(&self, key: &str) {
        let mut state = self.state.write().await;
        let expired = state
            .values
            .get(key)
            .is_some_and(|entry| entry.is_expired(Instant::now()));
        if expired {
            state.remove_key(key);
            debug!("Fast get: key={}, expired=true, removed", key);
        }
    }

    /// 在已持有写锁时清理全部过期条目
    fn sweep_expired(&self, state: &mut FastState) -> usize {
        if !self.honor_ttl {
            return 0;
        }
        let expired = state.take_expired(Instant::now());
        state.scrub(&expired);
        expired.len()
    }
}

#[async_trait]
impl CacheStore for FastCache {
    #[instrument(skip(self), level = "debug", fields(service = %self.service_name))]
    async fn get(&self, key: &str) -> Option<Vec<u8>> {
        let lookup = {
            let state = self.state.read().await;
            state.values.get(key).map(|entry| {
                if self.honor_ttl && entry.is_expired(Instant::now()) {
                    None
                } else {
                    Some(entry.value.clone())
                }
            })
        };

        match lookup {
            Some(Some(value)) => {
                GLOBAL_METRICS.record_request(&self.service_name, "Fast", "get", "hit");
                Some(value)
            }
            Some(None) => {
                self.purge_expired(key).await;
                GLOBAL_METRICS.record_request(&self.service_name, "Fast", "get", "miss");
                None
            }
            None => {
                GLOBAL_METRICS.record_request(&self.service_name, "Fast", "get", "miss");
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
        let expires_at = match ttl {
            Some(secs) if self.honor_ttl && secs > 0 => {
                Some(Instant::now() + Duration::from_secs(secs))
            }
            _ => None,
        };

        let mut state = self.state.write().await;
        state
            .values
            .insert(key.to_string(), Entry { value, expires_at });
        state.promoted.remove(key);
        state.revoke_pending(key);
        for tag in normalize_tags(tags) {
            state.tags.entry(tag).or_default().insert(key.to_string());
        }
        drop(state);

        debug!("Fast set: key={}, ttl={:?}, tags={:?}", key, ttl, tags);
        GLOBAL_METRICS.record_request(&self.service_name, "Fast", "set", "success");
        Ok(())
    }

    #[instrument(skip(self), level = "debug", fields(service = %self.service_name))]
    async fn clear(&self, key: &str) -> Result<()> {
        let mut state = self.state.write().await;
        let existed = state.remove_key(key);
        state.revoke_pending(key);
        let expired = self.sweep_expired(&mut state);
        drop(state);

        debug!(
            "Fast clear: key={}, existed={}, expired_swept={}",
            key, existed, expired
        );
        GLOBAL_METRICS.record_request(&self.service_name, "Fast", "clear", "success");
        Ok(())
    }

    #[instrument(skip(self), level = "debug", fields(service = %self.service_name))]
    async fn invalidate_by_tags(&self, tags: &[String]) -> Result<()> {
        let tags = normalize_tags(tags);
        if tags.is_empty() {
            return Ok(());
        }

        let mut state = self.state.write().await;
        let mut removed = HashSet::new();
        for tag in &tags {
            if let Some(keys) = state.tags.remove(tag) {
                for key in keys {
                    state.values.remove(&key);
                    removed.insert(key);
                }
            }
        }
        // 提升的副本标签未知
        for key in std::mem::take(&mut state.promoted) {
            state.values.remove(&key);
            removed.insert(key);
        }
        // 被删除的键可能还挂在其他标签下
        state.scrub(&removed);
        // 进行中的读取可能拿到了失效前的慢层值
        state.pending.clear();
        let expired = self.sweep_expired(&mut state);
        drop(state);

        debug!(
            "Fast invalidate_by_tags: tags={:?}, removed={}, expired_swept={}",
            tags,
            removed.len(),
            expired
        );
        GLOBAL_METRICS.record_request(&self.service_name, "Fast", "invalidate", "success");
        Ok(())
    }

    fn serializer(&self) -> &SerializerEnum {
        &self.serializer
    }
}
