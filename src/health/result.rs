//! 探测结果数据结构
//!
//! 定义单次探测的结果类型和判定枚举

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::time::Duration;
use uuid::Uuid;

/// 详情键：是否达到升级告警条件
pub const DETAIL_ALERT_REQUIRED: &str = "alert_required";
/// 详情键：窗口内失败次数
pub const DETAIL_FAILURE_COUNT: &str = "failure_count";
/// 详情键：失败统计窗口
pub const DETAIL_FAILURE_WINDOW: &str = "failure_window";

/// 探测判定
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Verdict {
    /// 端点健康
    Healthy,
    /// 端点异常
    Unhealthy,
}

impl std::fmt::Display for Verdict {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Verdict::Healthy => write!(f, "healthy"),
            Verdict::Unhealthy => write!(f, "unhealthy"),
        }
    }
}

impl Verdict {
    /// 判断是否健康
    pub fn is_healthy(&self) -> bool {
        matches!(self, Verdict::Healthy)
    }
}

/// 单次探测结果，返回后不可变
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckOutcome {
    /// 结果ID
    pub id: Uuid,
    /// 端点名称
    pub endpoint_name: String,
    /// 端点URL
    pub url: String,
    /// 判定
    pub verdict: Verdict,
    /// 测得的响应时间
    #[serde(with = "duration_serde")]
    pub response_time: Duration,
    /// HTTP状态码，传输失败时为空
    pub status_code: Option<u16>,
    /// 可读的结果描述
    pub message: String,
    /// 结构化详情（校验子结果、错误原因、升级标记）
    #[serde(default)]
    pub details: Map<String, Value>,
    /// 采集时间
    pub timestamp: DateTime<Utc>,
}

impl CheckOutcome {
    /// 创建新的探测结果
    pub fn new(
        endpoint_name: impl Into<String>,
        url: impl Into<String>,
        verdict: Verdict,
        message: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            endpoint_name: endpoint_name.into(),
            url: url.into(),
            verdict,
            response_time: Duration::ZERO,
            status_code: None,
            message: message.into(),
            details: Map::new(),
            timestamp: Utc::now(),
        }
    }

    /// 设置HTTP状态码
    pub fn with_status_code(mut self, status_code: u16) -> Self {
        self.status_code = Some(status_code);
        self
    }

    /// 设置响应时间
    pub fn with_response_time(mut self, response_time: Duration) -> Self {
        self.response_time = response_time;
        self
    }

    /// 设置详情
    pub fn with_details(mut self, details: Map<String, Value>) -> Self {
        self.details = details;
        self
    }

    /// 设置采集时间
    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    /// 标记升级告警，附带窗口内失败次数
    pub fn with_escalation(mut self, failure_count: usize, failure_window: Duration) -> Self {
        self.details
            .insert(DETAIL_ALERT_REQUIRED.to_string(), Value::Bool(true));
        self.details
            .insert(DETAIL_FAILURE_COUNT.to_string(), Value::from(failure_count));
        self.details.insert(
            DETAIL_FAILURE_WINDOW.to_string(),
            Value::String(format!("{}s", failure_window.as_secs_f64())),
        );
        self
    }

    /// 是否达到升级告警条件
    pub fn is_escalated(&self) -> bool {
        !self.verdict.is_healthy()
            && self
                .details
                .get(DETAIL_ALERT_REQUIRED)
                .and_then(Value::as_bool)
                .unwrap_or(false)
    }

    /// 窗口内失败次数（仅升级结果携带）
    pub fn failure_count(&self) -> Option<u64> {
        self.details.get(DETAIL_FAILURE_COUNT).and_then(Value::as_u64)
    }

    /// 获取响应时间（毫秒）
    pub fn response_time_ms(&self) -> u64 {
        self.response_time.as_millis() as u64
    }

    /// 转换为JSON字符串
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

/// Duration序列化模块
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        duration.as_secs_f64().serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = f64::deserialize(deserializer)?;
        Duration::try_from_secs_f64(secs).map_err(serde::de::Error::custom)
    }
}
