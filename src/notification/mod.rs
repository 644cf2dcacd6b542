//! 通知模块
//!
//! 提供告警闸门、通知渠道（Slack、飞书、日志）、消息模板和分发器

pub mod dispatcher;
pub mod feishu;
pub mod gate;
pub mod sender;
pub mod slack;
pub mod template;

// 重新导出主要类型
pub use dispatcher::{DispatchReport, Dispatcher};
pub use feishu::FeishuSink;
pub use gate::{AlertGate, AlertPolicy, GateDecision};
pub use sender::{LogSink, NotificationSink};
pub use slack::SlackSink;
pub use template::{AlertTemplate, TemplateContext};
