//! Slack 通知渠道模块
//!
//! 通过 incoming webhook 发送文本消息

use crate::config::ProviderConfig;
use crate::error::NotificationError;
use crate::health::result::CheckOutcome;
use crate::notification::feishu::WEBHOOK_TIMEOUT;
use crate::notification::sender::NotificationSink;
use crate::notification::template::AlertTemplate;
use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};
use tracing::{debug, error, info};

const DEFAULT_USERNAME: &str = "Health Monitor";
const DEFAULT_ICON_EMOJI: &str = ":warning:";

/// Slack 通知渠道
pub struct SlackSink {
    name: String,
    client: Client,
    webhook_url: String,
    username: String,
    icon_emoji: String,
    channel: Option<String>,
}

impl SlackSink {
    /// 创建新的 Slack 渠道
    pub fn new(
        name: impl Into<String>,
        webhook_url: impl Into<String>,
    ) -> Result<Self, NotificationError> {
        let client = Client::builder()
            .timeout(WEBHOOK_TIMEOUT)
            .build()
            .map_err(|e| NotificationError::ConfigError(format!("创建HTTP客户端失败: {e}")))?;

        Ok(Self {
            name: name.into(),
            client,
            webhook_url: webhook_url.into(),
            username: DEFAULT_USERNAME.to_string(),
            icon_emoji: DEFAULT_ICON_EMOJI.to_string(),
            channel: None,
        })
    }

    /// 从渠道配置创建
    ///
    /// 支持的键：`webhook_url`（必填）、`username`、`icon_emoji`、`channel`
    pub fn from_provider(name: &str, provider: &ProviderConfig) -> Result<Self, NotificationError> {
        let webhook_url = provider.get_str("webhook_url").ok_or_else(|| {
            NotificationError::ConfigError(format!("Slack渠道 {name} 缺少 webhook_url"))
        })?;

        let mut sink = Self::new(name, webhook_url)?;
        if let Some(username) = provider.get_str("username") {
            sink.username = username.to_string();
        }
        if let Some(icon_emoji) = provider.get_str("icon_emoji") {
            sink.icon_emoji = icon_emoji.to_string();
        }
        sink.channel = provider.get_str("channel").map(str::to_string);
        Ok(sink)
    }

    fn build_payload(&self, text: &str) -> Value {
        let mut payload = json!({
            "text": text,
            "username": self.username,
            "icon_emoji": self.icon_emoji,
        });
        if let (Some(channel), Value::Object(map)) = (&self.channel, &mut payload) {
            map.insert("channel".to_string(), Value::String(channel.clone()));
        }
        payload
    }
}

#[async_trait]
impl NotificationSink for SlackSink {
    fn name(&self) -> &str {
        &self.name
    }

    async fn send(
        &self,
        outcome: &CheckOutcome,
        template: &AlertTemplate,
    ) -> Result<(), NotificationError> {
        let text = template.render(outcome)?;
        let payload = self.build_payload(&text);
        debug!("发送消息到Slack webhook: {}", self.webhook_url);

        let response = self
            .client
            .post(&self.webhook_url)
            .json(&payload)
            .send()
            .await
            .map_err(|e| NotificationError::SendError(format!("发送Slack消息失败: {e}")))?;

        let status = response.status();
        if status.is_success() {
            info!(endpoint = %outcome.endpoint_name, "Slack消息发送成功");
            Ok(())
        } else {
            let text = response.text().await.unwrap_or_default();
            error!("Slack消息发送失败: {} - {}", status, text);
            Err(NotificationError::SendError(format!(
                "Slack消息发送失败: {status}"
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::health::result::Verdict;

    fn provider(config: Value) -> ProviderConfig {
        ProviderConfig {
            kind: "slack".to_string(),
            enabled: true,
            template: None,
            config: config.as_object().cloned().unwrap_or_default(),
        }
    }

    #[test]
    fn test_payload_defaults() {
        let sink = SlackSink::new("ops", "https://hooks.slack.com/x").unwrap();
        let payload = sink.build_payload("hi");
        assert_eq!(payload["username"], "Health Monitor");
        assert_eq!(payload["icon_emoji"], ":warning:");
        assert!(payload.get("channel").is_none());
    }

    #[test]
    fn test_from_provider_overrides() {
        let sink = SlackSink::from_provider(
            "ops",
            &provider(json!({
                "webhook_url": "https://hooks.slack.com/x",
                "username": "bot",
                "channel": "#alerts"
            })),
        )
        .unwrap();
        let payload = sink.build_payload("hi");
        assert_eq!(payload["username"], "bot");
        assert_eq!(payload["channel"], "#alerts");
    }

    #[test]
    fn test_missing_webhook_url_is_rejected() {
        assert!(SlackSink::from_provider("ops", &provider(json!({}))).is_err());
    }

    #[tokio::test]
    async fn test_send_reports_http_failure() {
        let mut server = mockito::Server::new_async().await;
        let _ok = server
            .mock("POST", "/ok")
            .with_status(200)
            .with_body("ok")
            .create_async()
            .await;
        let _bad = server
            .mock("POST", "/bad")
            .with_status(500)
            .create_async()
            .await;

        let outcome = CheckOutcome::new("api", "u", Verdict::Unhealthy, "down");
        let template = AlertTemplate::compile("{{endpoint_name}} down").unwrap();
        let ok = SlackSink::new("ops", format!("{}/ok", server.url())).unwrap();
        let bad = SlackSink::new("ops", format!("{}/bad", server.url())).unwrap();

        assert!(ok.send(&outcome, &template).await.is_ok());
        assert!(matches!(
            bad.send(&outcome, &template).await,
            Err(NotificationError::SendError(_))
        ));
    }
}
