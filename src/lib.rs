//! Probe Vitals - HTTP 端点持续探测与告警工具
//!
//! 这是一个用Rust编写的端点监控引擎，支持：
//! - 带重试与指数退避的 HTTP 探测
//! - 状态码、响应时间和响应体（JSON路径、正则）校验
//! - 滑动时间窗口内的失败计数与告警升级
//! - 带冷却时间和小时上限的告警限流
//! - Slack、飞书和日志通知渠道
//! - 可选的状态查询 API

pub mod cli;
pub mod config;
pub mod error;
pub mod health;
pub mod logging;
pub mod notification;
pub mod signal;
pub mod status;
pub mod web;

// 重新导出主要类型
pub use config::{Config, EndpointConfig, GlobalConfig};
pub use error::ProbeVitalsError;
pub use health::{CheckOutcome, EndpointProber, TaskScheduler, Verdict};

/// 应用程序版本信息
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// 应用程序名称
pub const APP_NAME: &str = env!("CARGO_PKG_NAME");

/// 应用程序描述
pub const APP_DESCRIPTION: &str = env!("CARGO_PKG_DESCRIPTION");
