//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 该模块提供日志与链路追踪的初始化辅助函数。

use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::EnvFilter;

/// 初始化全局 tracing subscriber
///
/// 优先使用 `RUST_LOG` 环境变量，否则使用 `default_directive`。
/// 重复调用是安全的，已存在的全局 subscriber 不会被替换。
pub fn init_tracing(default_directive: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive));
    let _ = tracing_subscriber::fmt()
        .with_span_events(FmtSpan::CLOSE)
        .with_env_filter(filter)
        .try_init();
}
