//! 飞书通知渠道模块
//!
//! 实现飞书webhook卡片消息，支持签名校验

use crate::config::ProviderConfig;
use crate::error::NotificationError;
use crate::health::result::CheckOutcome;
use crate::notification::sender::NotificationSink;
use crate::notification::template::AlertTemplate;
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use hmac::{Hmac, Mac};
use reqwest::Client;
use serde_json::{json, Value};
use sha2::Sha256;
use std::time::Duration;
use tracing::{debug, error, info};

/// webhook请求超时
pub const WEBHOOK_TIMEOUT: Duration = Duration::from_secs(10);

/// 飞书通知渠道
pub struct FeishuSink {
    name: String,
    /// HTTP客户端
    client: Client,
    webhook_url: String,
    /// 签名密钥
    secret: Option<String>,
}

impl FeishuSink {
    /// 创建新的飞书渠道
    ///
    /// # 参数
    /// * `name` - 渠道名称
    /// * `webhook_url` - 机器人webhook地址
    /// * `secret` - 签名密钥，机器人开启签名校验时必填
    pub fn new(
        name: impl Into<String>,
        webhook_url: impl Into<String>,
        secret: Option<String>,
    ) -> Result<Self, NotificationError> {
        let client = Client::builder()
            .timeout(WEBHOOK_TIMEOUT)
            .build()
            .map_err(|e| NotificationError::ConfigError(format!("创建HTTP客户端失败: {e}")))?;

        Ok(Self {
            name: name.into(),
            client,
            webhook_url: webhook_url.into(),
            secret,
        })
    }

    /// 从渠道配置创建
    pub fn from_provider(name: &str, provider: &ProviderConfig) -> Result<Self, NotificationError> {
        let webhook_url = provider.get_str("webhook_url").ok_or_else(|| {
            NotificationError::ConfigError(format!("飞书渠道 {name} 缺少 webhook_url"))
        })?;
        Self::new(
            name,
            webhook_url,
            provider.get_str("secret").map(str::to_string),
        )
    }

    /// 构建飞书消息体
    fn build_message_body(&self, outcome: &CheckOutcome, content: &str) -> Value {
        let color = if outcome.verdict.is_healthy() {
            "green"
        } else {
            "red"
        };

        json!({
            "msg_type": "interactive",
            "card": {
                "elements": [
                    {
                        "tag": "div",
                        "text": {
                            "content": content,
                            "tag": "lark_md"
                        }
                    }
                ],
                "header": {
                    "title": {
                        "content": format!("🚨 端点告警 - {}", outcome.endpoint_name),
                        "tag": "plain_text"
                    },
                    "template": color
                }
            }
        })
    }

    /// 为消息体附加签名字段
    fn sign_body(&self, body: &mut Value, timestamp: i64) -> Result<(), NotificationError> {
        let Some(ref secret) = self.secret else {
            return Ok(());
        };

        let sign = sign(secret, timestamp)?;
        if let Value::Object(map) = body {
            map.insert("timestamp".to_string(), Value::String(timestamp.to_string()));
            map.insert("sign".to_string(), Value::String(sign));
        }
        Ok(())
    }

    /// 发送消息到飞书
    async fn send_to_webhook(&self, body: &Value) -> Result<(), NotificationError> {
        debug!("发送消息到飞书webhook: {}", self.webhook_url);

        let response = self
            .client
            .post(&self.webhook_url)
            .json(body)
            .send()
            .await
            .map_err(|e| NotificationError::SendError(format!("发送飞书消息失败: {e}")))?;

        let status = response.status();
        let text = response.text().await.unwrap_or_default();
        if !status.is_success() {
            error!("飞书消息发送失败: {} - {}", status, text);
            return Err(NotificationError::SendError(format!(
                "飞书消息发送失败: {status}"
            )));
        }

        // 飞书在 HTTP 200 中用非零 code 表示业务失败
        if let Ok(reply) = serde_json::from_str::<Value>(&text) {
            if let Some(code) = reply.get("code").and_then(Value::as_i64) {
                if code != 0 {
                    let msg = reply.get("msg").and_then(Value::as_str).unwrap_or_default();
                    error!("飞书消息被拒绝: {} - {}", code, msg);
                    return Err(NotificationError::SendError(format!(
                        "飞书消息被拒绝: {code} {msg}"
                    )));
                }
            }
        }

        info!("飞书消息发送成功");
        Ok(())
    }
}

/// 飞书签名：以 "timestamp\nsecret" 为密钥对空串做 HMAC-SHA256，再 base64
pub fn sign(secret: &str, timestamp: i64) -> Result<String, NotificationError> {
    let key = format!("{timestamp}\n{secret}");
    let mac = Hmac::<Sha256>::new_from_slice(key.as_bytes())
        .map_err(|e| NotificationError::ConfigError(format!("签名密钥无效: {e}")))?;
    Ok(STANDARD.encode(mac.finalize().into_bytes()))
}

#[async_trait]
impl NotificationSink for FeishuSink {
    fn name(&self) -> &str {
        &self.name
    }

    async fn send(
        &self,
        outcome: &CheckOutcome,
        template: &AlertTemplate,
    ) -> Result<(), NotificationError> {
        let content = template.render(outcome)?;
        let mut body = self.build_message_body(outcome, &content);
        self.sign_body(&mut body, chrono::Utc::now().timestamp())?;
        self.send_to_webhook(&body).await
    }
}
