//! 消息模板模块
//!
//! 使用 Handlebars 渲染告警消息

use crate::error::NotificationError;
use crate::health::result::CheckOutcome;
use handlebars::Handlebars;
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;

/// 模板上下文数据
#[derive(Debug, Clone, Serialize)]
pub struct TemplateContext {
    /// 端点名称
    pub endpoint_name: String,
    /// 端点URL
    pub url: String,
    /// 判定
    pub status: String,
    /// 结果描述
    pub message: String,
    /// HTTP状态码
    pub status_code: Option<u16>,
    /// 响应时间，如 "0.25s"
    pub response_time: String,
    /// 采集时间（RFC 3339）
    pub timestamp: String,
    /// 窗口内失败次数
    pub failure_count: Option<u64>,
    /// 展平后的详情行
    pub details: Vec<String>,
}

impl TemplateContext {
    /// 从探测结果构建上下文
    pub fn from_outcome(outcome: &CheckOutcome) -> Self {
        let mut details = Vec::new();
        for (key, value) in &outcome.details {
            flatten_detail(key, value, &mut details);
        }

        Self {
            endpoint_name: outcome.endpoint_name.clone(),
            url: outcome.url.clone(),
            status: outcome.verdict.to_string(),
            message: outcome.message.clone(),
            status_code: outcome.status_code,
            response_time: format!("{:.2}s", outcome.response_time.as_secs_f64()),
            timestamp: outcome.timestamp.to_rfc3339(),
            failure_count: outcome.failure_count(),
            details,
        }
    }
}

fn flatten_detail(key: &str, value: &Value, lines: &mut Vec<String>) {
    match value {
        Value::Object(map) if map.is_empty() => {}
        Value::Object(map) => {
            for (child, value) in map {
                flatten_detail(&format!("{key}.{child}"), value, lines);
            }
        }
        Value::Bool(passed) => {
            let mark = if *passed { "✓" } else { "✗" };
            lines.push(format!("{key}: {mark}"));
        }
        Value::String(text) => lines.push(format!("{key}: {text}")),
        other => lines.push(format!("{key}: {other}")),
    }
}

/// 模板在注册表中的名称
const ALERT_TEMPLATE_NAME: &str = "alert";

/// 已编译的告警模板
///
/// 构建时解析一次，之后每次发送只做渲染；克隆共享同一个注册表
#[derive(Debug, Clone)]
pub struct AlertTemplate {
    source: Arc<str>,
    registry: Arc<Handlebars<'static>>,
}

impl AlertTemplate {
    /// 编译模板文本，语法错误返回 `TemplateError`
    pub fn compile(source: &str) -> Result<Self, NotificationError> {
        let mut registry = Handlebars::new();
        registry.register_escape_fn(handlebars::no_escape);
        registry
            .register_template_string(ALERT_TEMPLATE_NAME, source)
            .map_err(|e| NotificationError::TemplateError(e.to_string()))?;

        Ok(Self {
            source: Arc::from(source),
            registry: Arc::new(registry),
        })
    }

    /// 内置默认告警模板
    pub fn builtin() -> Result<Self, NotificationError> {
        Self::compile(&default_alert_template())
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// 按探测结果渲染消息
    pub fn render(&self, outcome: &CheckOutcome) -> Result<String, NotificationError> {
        self.registry
            .render(ALERT_TEMPLATE_NAME, &TemplateContext::from_outcome(outcome))
            .map_err(|e| NotificationError::TemplateError(e.to_string()))
    }
}

/// 检查模板语法
pub fn validate_template(template: &str) -> Result<(), NotificationError> {
    AlertTemplate::compile(template).map(|_| ())
}

/// 默认的告警消息模板
pub fn default_alert_template() -> String {
    r#"❌ Health check failed for {{endpoint_name}}
URL: {{url}}
Status: {{status}}
Message: {{message}}
{{#if status_code}}Status code: {{status_code}}
{{/if}}Response time: {{response_time}}
Time: {{timestamp}}
{{#if details}}
Details:
{{#each details}}- {{this}}
{{/each}}{{/if}}"#
        .to_string()
}
