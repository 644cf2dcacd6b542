//! 通知分发器
//!
//! 启动时按渠道类型从注册表构建全部渠道，运行时把升级结果并发投递到每个渠道。
//! 单个渠道失败只记录日志，不影响其他渠道，也不重试

use crate::config::{AlertingConfig, ProviderConfig};
use crate::error::NotificationError;
use crate::health::result::CheckOutcome;
use crate::notification::feishu::FeishuSink;
use crate::notification::sender::{LogSink, NotificationSink};
use crate::notification::slack::SlackSink;
use crate::notification::template::AlertTemplate;
use futures::future::join_all;
use futures::FutureExt;
use std::collections::BTreeMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tracing::{error, info, warn};

/// 渠道构造函数
pub type SinkConstructor =
    fn(&str, &ProviderConfig) -> Result<Arc<dyn NotificationSink>, NotificationError>;

/// 模板名：渠道未指定时回退到此名称
pub const DEFAULT_TEMPLATE_NAME: &str = "default";

fn build_slack(name: &str, provider: &ProviderConfig) -> Result<Arc<dyn NotificationSink>, NotificationError> {
    Ok(Arc::new(SlackSink::from_provider(name, provider)?))
}

fn build_feishu(name: &str, provider: &ProviderConfig) -> Result<Arc<dyn NotificationSink>, NotificationError> {
    Ok(Arc::new(FeishuSink::from_provider(name, provider)?))
}

fn build_log(name: &str, _provider: &ProviderConfig) -> Result<Arc<dyn NotificationSink>, NotificationError> {
    Ok(Arc::new(LogSink::new(name)))
}

/// 渠道类型到构造函数的注册表
const SINK_REGISTRY: [(&str, SinkConstructor); 3] = [
    ("slack", build_slack),
    ("feishu", build_feishu),
    ("log", build_log),
];

/// 按渠道类型查找构造函数
pub fn sink_constructor(kind: &str) -> Option<SinkConstructor> {
    SINK_REGISTRY
        .iter()
        .find(|(name, _)| *name == kind)
        .map(|(_, constructor)| *constructor)
}

struct Route {
    sink: Arc<dyn NotificationSink>,
    template: AlertTemplate,
}

/// 单次分发的结果，每个渠道一个布尔值
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DispatchReport {
    pub results: Vec<(String, bool)>,
}

impl DispatchReport {
    /// 成功的渠道数
    pub fn succeeded(&self) -> usize {
        self.results.iter().filter(|(_, ok)| *ok).count()
    }

    /// 失败的渠道数
    pub fn failed(&self) -> usize {
        self.results.len() - self.succeeded()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }
}

/// 通知分发器
#[derive(Default)]
pub struct Dispatcher {
    routes: Vec<Route>,
}

impl Dispatcher {
    /// 创建空的分发器
    pub fn new() -> Self {
        Self::default()
    }

    /// 从告警配置构建
    ///
    /// # 参数
    /// * `config` - 告警配置
    /// * `mock_alerts` - 为 true 时忽略配置的渠道，只使用一个日志渠道
    ///
    /// # 返回
    /// * `Result<Self, NotificationError>` - 未知渠道类型或缺少必填项时返回错误
    pub fn from_config(config: &AlertingConfig, mock_alerts: bool) -> Result<Self, NotificationError> {
        // 每个命名模板只编译一次，引用同一模板的渠道共享注册表
        let mut templates = BTreeMap::new();
        for (name, source) in &config.templates {
            let template = AlertTemplate::compile(source).map_err(|e| {
                NotificationError::ConfigError(format!("模板 {name} 无效: {e}"))
            })?;
            templates.insert(name.as_str(), template);
        }
        let fallback_template = match templates.get(DEFAULT_TEMPLATE_NAME) {
            Some(template) => template.clone(),
            None => AlertTemplate::builtin()?,
        };

        let mut dispatcher = Self::new();

        if mock_alerts {
            info!("模拟告警模式：所有通知写入日志");
            dispatcher.add_sink(Arc::new(LogSink::new("mock")), fallback_template);
            return Ok(dispatcher);
        }

        for (name, provider) in &config.providers {
            if !provider.enabled {
                info!("通知渠道 {} 已禁用，跳过", name);
                continue;
            }

            let constructor = sink_constructor(&provider.kind).ok_or_else(|| {
                NotificationError::ConfigError(format!(
                    "通知渠道 {} 的类型 {} 未知",
                    name, provider.kind
                ))
            })?;
            let sink = constructor(name, provider)?;

            let template = match provider.template {
                Some(ref template_name) => templates
                    .get(template_name.as_str())
                    .cloned()
                    .ok_or_else(|| {
                        NotificationError::ConfigError(format!(
                            "通知渠道 {name} 引用了不存在的模板 {template_name}"
                        ))
                    })?,
                None => fallback_template.clone(),
            };

            info!("已加载通知渠道: {} ({})", name, provider.kind);
            dispatcher.add_sink(sink, template);
        }

        Ok(dispatcher)
    }

    /// 添加渠道
    pub fn add_sink(&mut self, sink: Arc<dyn NotificationSink>, template: AlertTemplate) {
        self.routes.push(Route { sink, template });
    }

    /// 已加载的渠道名
    pub fn sink_names(&self) -> Vec<String> {
        self.routes
            .iter()
            .map(|route| route.sink.name().to_string())
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    /// 把结果并发投递到每个渠道
    pub async fn dispatch(&self, outcome: &CheckOutcome) -> DispatchReport {
        if self.routes.is_empty() {
            warn!(endpoint = %outcome.endpoint_name, "没有可用的通知渠道");
            return DispatchReport::default();
        }

        let sends = self.routes.iter().map(|route| async move {
            let name = route.sink.name().to_string();
            let send = route.sink.send(outcome, &route.template);

            let ok = match AssertUnwindSafe(send).catch_unwind().await {
                Ok(Ok(())) => true,
                Ok(Err(e)) => {
                    error!(sink = %name, endpoint = %outcome.endpoint_name, "通知发送失败: {}", e);
                    false
                }
                Err(_) => {
                    error!(sink = %name, endpoint = %outcome.endpoint_name, "通知渠道发生panic");
                    false
                }
            };
            (name, ok)
        });

        let report = DispatchReport {
            results: join_all(sends).await,
        };
        info!(
            endpoint = %outcome.endpoint_name,
            succeeded = report.succeeded(),
            failed = report.failed(),
            "告警分发完成"
        );
        report
    }
}
