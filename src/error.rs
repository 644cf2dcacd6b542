//! 错误处理模块
//!
//! 定义应用程序的统一错误类型

use std::time::Duration;
use thiserror::Error;

/// Probe Vitals 应用程序的主要错误类型
#[derive(Error, Debug)]
pub enum ProbeVitalsError {
    /// 配置相关错误
    #[error("配置错误: {0}")]
    Config(#[from] ConfigError),

    /// 探测传输层错误
    #[error("探测错误: {0}")]
    Transport(#[from] TransportError),

    /// 通知相关错误
    #[error("通知错误: {0}")]
    Notification(#[from] NotificationError),

    /// IO错误
    #[error("IO错误: {0}")]
    Io(#[from] std::io::Error),

    /// JSON序列化/反序列化错误
    #[error("JSON错误: {0}")]
    Json(#[from] serde_json::Error),

    /// 其他错误
    #[error("其他错误: {0}")]
    Other(#[from] anyhow::Error),
}

/// 配置错误类型
///
/// 只会在加载阶段出现，调度器启动前即被拒绝
#[derive(Error, Debug)]
pub enum ConfigError {
    /// 配置文件解析错误
    #[error("配置文件解析失败: {0}")]
    ParseError(String),

    /// 配置验证错误
    #[error("配置验证失败: {0}")]
    ValidationError(String),

    /// 配置文件不存在
    #[error("配置文件不存在: {path}")]
    FileNotFound { path: String },

    /// 环境变量替换错误
    #[error("环境变量替换失败: {var}")]
    EnvVarError { var: String },
}

/// 传输层错误类型（连接失败、DNS失败、超时）
///
/// 按重试策略重试，最终失败转换为 Unhealthy 结果，不会向上传播为进程级故障
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TransportError {
    /// 请求超时
    #[error("Request timed out after {}s", .0.as_secs_f64())]
    Timeout(Duration),

    /// 连接失败（拒绝连接、DNS解析失败等）
    #[error("Connection failed: {0}")]
    Connect(String),

    /// 其他请求错误（构建请求、读取响应体等）
    #[error("Request failed: {0}")]
    Request(String),
}

impl TransportError {
    /// 错误类别标签，写入结果详情的 `error_type` 字段
    pub fn kind(&self) -> &'static str {
        match self {
            TransportError::Timeout(_) => "timeout",
            TransportError::Connect(_) => "connect",
            TransportError::Request(_) => "request",
        }
    }

    /// 从 reqwest 错误分类
    pub fn from_reqwest(error: &reqwest::Error, timeout: Duration) -> Self {
        if error.is_timeout() {
            TransportError::Timeout(timeout)
        } else if error.is_connect() {
            TransportError::Connect(error.to_string())
        } else {
            TransportError::Request(error.to_string())
        }
    }
}

/// 通知错误类型
#[derive(Error, Debug)]
pub enum NotificationError {
    /// 发送失败
    #[error("通知发送失败: {0}")]
    SendError(String),

    /// 模板渲染错误
    #[error("模板渲染失败: {0}")]
    TemplateError(String),

    /// 配置错误
    #[error("通知配置错误: {0}")]
    ConfigError(String),
}

/// 结果类型别名
pub type Result<T> = std::result::Result<T, ProbeVitalsError>;
