//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了缓存系统的指标收集功能。

use dashmap::DashMap;
use lazy_static::lazy_static;
use std::fmt::Write;
use std::sync::Arc;
use tracing::{span, Level};

/// 指标收集器
#[derive(Clone, Debug, Default)]
pub struct Metrics {
    /// 请求总数统计
    /// key: "service:tier:op:result"
    pub requests_total: Arc<DashMap<String, u64>>,
    /// 操作耗时累计
    /// key: "service:tier:op" -> (total_duration_secs, count)
    pub operation_duration: Arc<DashMap<String, (f64, u64)>>,
}

lazy_static! {
    /// 全局指标实例
    pub static ref GLOBAL_METRICS: Metrics = Metrics::default();
}

impl Metrics {
    /// 记录请求指标
    ///
    /// # 参数
    ///
    /// * `service` - 服务名称
    /// * `tier` - 缓存层（Fast/Slow/Facade）
    /// * `op` - 操作类型（get/set/clear/invalidate/promote）
    /// * `result` - 操作结果（hit/miss/success/error/skipped）
    pub fn record_request(&self, service: &str, tier: &str, op: &str, result: &str) {
        let span = span!(Level::TRACE, "cache_request", service, tier, op, result);
        let _enter = span.enter();
        let key = format!("{}:{}:{}:{}", service, tier, op, result);
        *self.requests_total.entry(key).or_insert(0) += 1;
    }

    /// 记录操作耗时
    pub fn record_duration(&self, service: &str, tier: &str, op: &str, duration_secs: f64) {
        let key = format!("{}:{}:{}", service, tier, op);
        let mut entry = self.operation_duration.entry(key).or_insert((0.0, 0));
        entry.0 += duration_secs;
        entry.1 += 1;
    }

    /// 读取请求计数
    pub fn request_count(&self, service: &str, tier: &str, op: &str, result: &str) -> u64 {
        let key = format!("{}:{}:{}:{}", service, tier, op, result);
        self.requests_total.get(&key).map(|v| *v).unwrap_or(0)
    }
}

/// 获取指标字符串
///
/// 将所有指标格式化为Prometheus文本格式
pub fn get_metrics_string() -> String {
    let metrics = &GLOBAL_METRICS;
    let mut output = String::new();
    for entry in metrics.requests_total.iter() {
        let _ = writeln!(
            output,
            "cache_requests_total{{labels=\"{}\"}} {}",
            entry.key(),
            entry.value()
        );
    }
    for entry in metrics.operation_duration.iter() {
        let parts: Vec<&str> = entry.key().split(':').collect();
        if parts.len() == 3 {
            let (total, count) = *entry.value();
            let _ = writeln!(
                output,
                "cache_operation_duration_seconds_sum{{service=\"{}\", tier=\"{}\", operation=\"{}\"}} {}",
                parts[0], parts[1], parts[2], total
            );
            let _ = writeln!(
                output,
                "cache_operation_duration_seconds_count{{service=\"{}\", tier=\"{}\", operation=\"{}\"}} {}",
                parts[0], parts[1], parts[2], count
            );
        }
    }
    output
}
