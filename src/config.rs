//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了缓存系统的配置结构、解析逻辑和通用配置取值接口。

use crate::error::{CacheError, Result};
use secrecy::SecretString;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;

pub const CONFIG_VERSION: u32 = 1;

/// 慢层默认TTL（秒），仅在慢层适配器边界生效
pub const DEFAULT_SLOW_TTL_SECS: u64 = 3600;

/// 慢层默认TTL在配置树中的路径
pub const SLOW_DEFAULT_TTL_PATH: &str = "slow.default_ttl";

/// 通用配置取值接口
///
/// 缓存核心只通过该接口读取默认值，不关心配置的来源与加载方式。
pub trait ConfigSource: Send + Sync {
    /// 按路径读取配置值，路径以 `.` 分隔
    fn value(&self, path: &str) -> Option<String>;

    /// 按路径读取布尔标志，`1`/`true`/`yes`/`on` 视为已设置
    fn is_set_flag(&self, path: &str) -> bool {
        matches!(
            self.value(path).as_deref().map(str::trim),
            Some("1") | Some("true") | Some("yes") | Some("on")
        )
    }

    /// 按路径读取无符号整数，解析失败视为未设置
    fn u64_value(&self, path: &str) -> Option<u64> {
        self.value(path).and_then(|v| v.trim().parse().ok())
    }
}

impl ConfigSource for HashMap<String, String> {
    fn value(&self, path: &str) -> Option<String> {
        self.get(path).cloned()
    }
}

/// 基于TOML树的配置源
///
/// 保留原始TOML文档，使未映射到强类型结构的键也能被 [`ConfigSource`] 读取。
#[derive(Debug, Clone, Default)]
pub struct TomlSource {
    root: Option<toml::Value>,
}

impl TomlSource {
    pub fn new(root: toml::Value) -> Self {
        Self { root: Some(root) }
    }
}

impl ConfigSource for TomlSource {
    fn value(&self, path: &str) -> Option<String> {
        let mut node = self.root.as_ref()?;
        for segment in path.split('.') {
            node = node.as_table()?.get(segment)?;
        }
        match node {
            toml::Value::String(s) => Some(s.clone()),
            toml::Value::Integer(i) => Some(i.to_string()),
            toml::Value::Float(f) => Some(f.to_string()),
            toml::Value::Boolean(b) => Some(b.to_string()),
            toml::Value::Datetime(d) => Some(d.to_string()),
            toml::Value::Array(_) | toml::Value::Table(_) => None,
        }
    }
}

/// 缓存系统配置
#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub config_version: Option<u32>,
    #[serde(default)]
    pub global: GlobalConfig,
    #[serde(default)]
    pub fast: FastConfig,
    #[serde(default)]
    pub slow: SlowConfig,
    /// 原始配置树，供 [`ConfigSource`] 使用
    #[serde(skip)]
    pub source: TomlSource,
}

/// 全局配置
#[derive(Deserialize, Clone, Debug)]
#[serde(default)]
pub struct GlobalConfig {
    /// 服务名称，用于日志与指标标签
    pub service_name: String,
    /// 序列化类型
    pub serialization: SerializationType,
    /// 是否启用压缩（仅JSON）
    pub compress: bool,
    /// 键的最大长度
    pub max_key_length: usize,
}

impl Default for GlobalConfig {
    fn default() -> Self {
        Self {
            service_name: "default".to_string(),
            serialization: SerializationType::Json,
            compress: false,
            max_key_length: 256,
        }
    }
}

/// 序列化类型枚举
#[derive(Deserialize, Clone, Debug, PartialEq, Default)]
#[serde(rename_all = "lowercase")]
pub enum SerializationType {
    /// JSON序列化
    #[default]
    Json,
}

/// 快层（进程内）配置
#[derive(Deserialize, Clone, Debug, Default)]
#[serde(default)]
pub struct FastConfig {
    /// 是否在快层执行惰性TTL过期，默认关闭（TTL仅由慢层执行）
    pub honor_ttl: bool,
}

/// 慢层（Redis）配置
#[derive(Deserialize, Clone, Debug)]
#[serde(default)]
pub struct SlowConfig {
    /// Redis模式
    pub mode: RedisMode,
    /// 连接字符串
    pub connection_string: SecretString,
    /// 连接超时时间（毫秒）
    pub connection_timeout_ms: u64,
    /// 命令执行超时时间（毫秒）
    pub command_timeout_ms: u64,
    /// 是否启用 TLS
    pub enable_tls: bool,
    /// 调用方未指定TTL时使用的默认值（秒）
    pub default_ttl: u64,
    /// Redis 键前缀
    pub key_prefix: String,
}

impl Default for SlowConfig {
    fn default() -> Self {
        Self {
            mode: RedisMode::Standalone,
            connection_string: SecretString::new("redis://localhost:6379".to_string().into()),
            connection_timeout_ms: 5000,
            command_timeout_ms: 3000,
            enable_tls: false,
            default_ttl: DEFAULT_SLOW_TTL_SECS,
            key_prefix: "tagcache".to_string(),
        }
    }
}

/// Redis模式枚举
///
/// 集群协议不在支持范围内
#[derive(Deserialize, Clone, Copy, Debug, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum RedisMode {
    /// 单机模式
    #[default]
    Standalone,
}

impl Config {
    /// 从TOML字符串解析配置
    pub fn from_toml_str(input: &str) -> Result<Self> {
        let root: toml::Value = toml::from_str(input)?;
        let mut config = Config::deserialize(root.clone())?;
        config.source = TomlSource::new(root);
        Ok(config)
    }

    /// 从文件加载配置并校验
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        let config = Self::from_toml_str(&content)?;
        config.validate().map_err(CacheError::ConfigError)?;
        Ok(config)
    }

    /// 验证配置
    ///
    /// 检查配置的有效性，确保所有值在合理范围内
    pub fn validate(&self) -> std::result::Result<(), String> {
        if let Some(version) = self.config_version {
            if version > CONFIG_VERSION {
                return Err(format!(
                    "Configuration version {} is not supported. Current version is {}.",
                    version, CONFIG_VERSION
                ));
            }
        }

        if self.global.service_name.is_empty() {
            return Err("Service name cannot be empty".to_string());
        }

        if self.global.service_name.len() > 64 {
            return Err(format!(
                "Service name '{}' exceeds maximum length of 64 characters",
                self.global.service_name
            ));
        }

        if self.global.max_key_length == 0 || self.global.max_key_length > 1024 {
            return Err("max_key_length must be between 1 and 1024".to_string());
        }

        if self.slow.default_ttl == 0 {
            return Err("Slow tier default_ttl cannot be zero".to_string());
        }

        if self.slow.default_ttl > 86400 * 30 {
            return Err("Slow tier default_ttl cannot exceed 30 days (2592000 seconds)".to_string());
        }

        if !(100..=30000).contains(&self.slow.connection_timeout_ms) {
            return Err("connection_timeout_ms must be between 100 and 30000 ms".to_string());
        }

        if !(100..=60000).contains(&self.slow.command_timeout_ms) {
            return Err("command_timeout_ms must be between 100 and 60000 ms".to_string());
        }

        if self.slow.key_prefix.is_empty() || self.slow.key_prefix.contains(char::is_whitespace)
        {
            return Err("key_prefix must be non-empty and contain no whitespace".to_string());
        }

        Ok(())
    }
}

impl ConfigSource for Config {
    fn value(&self, path: &str) -> Option<String> {
        if let Some(v) = self.source.value(path) {
            return Some(v);
        }
        // 未从文件加载时回退到强类型字段
        match path {
            SLOW_DEFAULT_TTL_PATH => Some(self.slow.default_ttl.to_string()),
            "fast.honor_ttl" => Some(self.fast.honor_ttl.to_string()),
            "global.service_name" => Some(self.global.service_name.clone()),
            "global.max_key_length" => Some(self.global.max_key_length.to_string()),
            _ => None,
        }
    }
}
