//! 通知渠道模块
//!
//! 定义通知渠道的trait和日志渠道实现

use crate::error::NotificationError;
use crate::health::result::CheckOutcome;
use crate::notification::template::AlertTemplate;
use async_trait::async_trait;
use tracing::warn;

/// 通知渠道trait
#[async_trait]
pub trait NotificationSink: Send + Sync {
    /// 渠道名称（配置中的键）
    fn name(&self) -> &str;

    /// 发送告警
    ///
    /// # 参数
    /// * `outcome` - 升级的探测结果
    /// * `template` - 分发器为该渠道选定的已编译模板
    ///
    /// # 返回
    /// * `Result<(), NotificationError>` - 发送结果
    async fn send(
        &self,
        outcome: &CheckOutcome,
        template: &AlertTemplate,
    ) -> Result<(), NotificationError>;
}

/// 日志渠道，把渲染后的告警写入日志
pub struct LogSink {
    name: String,
}

impl LogSink {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

#[async_trait]
impl NotificationSink for LogSink {
    fn name(&self) -> &str {
        &self.name
    }

    async fn send(
        &self,
        outcome: &CheckOutcome,
        template: &AlertTemplate,
    ) -> Result<(), NotificationError> {
        let message = template.render(outcome)?;
        warn!(
            sink = %self.name,
            endpoint = %outcome.endpoint_name,
            "告警通知:\n{}",
            message
        );
        Ok(())
    }
}
