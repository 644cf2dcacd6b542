//! 命令处理逻辑
//!
//! 实现各种CLI命令的处理逻辑

use crate::cli::args::{Args, Commands, OutputFormat};
use crate::config::{Config, EndpointConfig};
use crate::error::{ProbeVitalsError, Result};
use crate::health::{
    CheckOutcome, EndpointProber, ReqwestTransport, RequestExecutor, Scheduler, TaskScheduler,
};
use crate::notification::{AlertPolicy, Dispatcher};
use crate::signal;
use async_trait::async_trait;
use futures::future::join_all;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

/// 命令处理器trait
#[async_trait]
pub trait Command: Send + Sync {
    /// 执行命令
    ///
    /// # 参数
    /// * `args` - 命令行参数
    /// * `config` - 已通过验证的配置
    async fn execute(&self, args: &Args, config: Config) -> Result<()>;
}

/// 打印版本信息
pub fn print_version(format: &OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Json => {
            let version_info = serde_json::json!({
                "name": crate::APP_NAME,
                "version": crate::VERSION,
                "description": crate::APP_DESCRIPTION
            });
            println!("{}", serde_json::to_string_pretty(&version_info)?);
        }
        OutputFormat::Text => {
            println!("{} v{}", crate::APP_NAME, crate::VERSION);
            println!("{}", crate::APP_DESCRIPTION);
        }
    }
    Ok(())
}

/// 验证命令
pub struct ValidateCommand;

#[async_trait]
impl Command for ValidateCommand {
    async fn execute(&self, args: &Args, config: Config) -> Result<()> {
        let verbose = matches!(args.command, Commands::Validate { verbose: true });

        // 渠道能否构建也属于启动前检查
        let dispatcher = Dispatcher::from_config(&config.alerting, false)?;

        println!("✓ 配置文件验证通过: {}", args.get_config_path().display());
        println!("✓ 找到 {} 个端点配置", config.endpoints.len());
        println!("✓ 已加载 {} 个通知渠道", dispatcher.sink_names().len());

        if verbose {
            println!("全局配置:");
            println!("  并发上限: {}", config.global.concurrency_limit);
            println!("  日志级别: {}", config.global.log_level);
            println!("  告警冷却: {}秒", config.alerting.cooldown_period_seconds);
            println!("  每小时告警上限: {}", config.alerting.max_alerts_per_hour);

            println!("端点配置:");
            for (i, endpoint) in config.endpoints.iter().enumerate() {
                println!("  {}. {} ({} {})", i + 1, endpoint.name, endpoint.method, endpoint.url);
                println!("     期望状态码: {:?}", endpoint.expected_status_codes);
                if !endpoint.expected_status_ranges.is_empty() {
                    let ranges: Vec<String> = endpoint
                        .expected_status_ranges
                        .iter()
                        .map(ToString::to_string)
                        .collect();
                    println!("     期望状态码区间: {}", ranges.join(", "));
                }
                println!(
                    "     间隔/超时: {}秒 / {}秒",
                    endpoint.interval_seconds, endpoint.timeout_seconds
                );
                println!(
                    "     失败阈值: {} 次 / {}秒",
                    endpoint.failure_threshold, endpoint.failure_window_seconds
                );
            }

            if !dispatcher.is_empty() {
                println!("通知渠道: {}", dispatcher.sink_names().join(", "));
            }
        }

        Ok(())
    }
}

/// 一次性探测命令
pub struct CheckCommand;

impl CheckCommand {
    /// 选择要探测的端点
    fn select_endpoints(config: Config, name: Option<&str>) -> Result<Vec<EndpointConfig>> {
        match name {
            Some(name) => {
                let selected: Vec<_> = config
                    .endpoints
                    .into_iter()
                    .filter(|endpoint| endpoint.name == name)
                    .collect();
                if selected.is_empty() {
                    return Err(ProbeVitalsError::Other(anyhow::anyhow!(
                        "未找到名为 '{name}' 的端点"
                    )));
                }
                Ok(selected)
            }
            None => Ok(config.endpoints),
        }
    }

    /// 并发探测每个端点一次
    pub async fn run(endpoints: Vec<EndpointConfig>) -> Result<Vec<CheckOutcome>> {
        let executor = RequestExecutor::new(Arc::new(ReqwestTransport::new()?));

        let mut probers = Vec::with_capacity(endpoints.len());
        for endpoint in endpoints {
            let prober = EndpointProber::new(Arc::new(endpoint), executor.clone())
                .map_err(|e| ProbeVitalsError::Other(anyhow::anyhow!(e)))?;
            probers.push(prober);
        }

        Ok(join_all(probers.iter_mut().map(|prober| prober.check())).await)
    }
}

#[async_trait]
impl Command for CheckCommand {
    async fn execute(&self, args: &Args, config: Config) -> Result<()> {
        let name = match &args.command {
            Commands::Check { endpoint } => endpoint.clone(),
            _ => None,
        };

        let endpoints = Self::select_endpoints(config, name.as_deref())?;
        info!("开始探测 {} 个端点", endpoints.len());

        let outcomes = Self::run(endpoints).await?;
        println!("{}", serde_json::to_string_pretty(&outcomes)?);

        let unhealthy = outcomes.iter().filter(|o| !o.verdict.is_healthy()).count();
        if unhealthy > 0 {
            warn!("{} 个端点探测失败", unhealthy);
        }
        Ok(())
    }
}

/// 启动命令
pub struct StartCommand;

#[async_trait]
impl Command for StartCommand {
    async fn execute(&self, args: &Args, mut config: Config) -> Result<()> {
        let mock_alerts = match args.command {
            Commands::Start {
                max_concurrent,
                mock_alerts,
            } => {
                if let Some(limit) = max_concurrent {
                    config.global.concurrency_limit = limit.max(1);
                }
                mock_alerts
            }
            _ => false,
        };

        let dispatcher = Dispatcher::from_config(&config.alerting, mock_alerts)?;
        if dispatcher.is_empty() {
            warn!("未配置任何通知渠道，升级告警只会计数");
        }

        let executor = RequestExecutor::new(Arc::new(ReqwestTransport::new()?));
        let scheduler = TaskScheduler::new(
            executor,
            Arc::new(dispatcher),
            AlertPolicy::from(&config.alerting),
            config.global.concurrency_limit,
        );
        scheduler
            .set_observer(Arc::new(|outcome: &CheckOutcome| {
                debug!(
                    endpoint = %outcome.endpoint_name,
                    verdict = %outcome.verdict,
                    response_time_ms = outcome.response_time_ms(),
                    "探测完成"
                );
            }))
            .await;

        scheduler.start(config.endpoints.clone()).await?;

        let web_task = match config.global.web {
            Some(ref web) if web.enabled => {
                let web = web.clone();
                let status_store = scheduler.status_store();
                let stop_rx = scheduler.subscribe_stop();
                Some(tokio::spawn(async move {
                    if let Err(e) = crate::web::serve(&web, status_store, stop_rx).await {
                        error!("状态API异常退出: {:#}", e);
                    }
                }))
            }
            _ => None,
        };

        info!(
            "{} 已启动，监控 {} 个端点，并发上限 {}",
            crate::APP_NAME,
            config.endpoints.len(),
            config.global.concurrency_limit
        );

        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        signal::setup_signal_handlers(shutdown_tx)?;
        signal::wait_for_shutdown(shutdown_rx).await;

        scheduler.stop().await?;
        if let Some(task) = web_task {
            if let Err(e) = task.await {
                error!("状态API任务异常结束: {}", e);
            }
        }

        let status = scheduler.status().await;
        info!(
            alerts_sent = status.alert_stats.sent,
            alerts_suppressed = status.alert_stats.suppressed,
            "{} 已停止",
            crate::APP_NAME
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> Config {
        Config {
            global: Default::default(),
            alerting: Default::default(),
            endpoints: vec![
                EndpointConfig::new("api", "https://example.com/health"),
                EndpointConfig::new("web", "https://example.org/"),
            ],
        }
    }

    #[test]
    fn test_select_all_endpoints() {
        let selected = CheckCommand::select_endpoints(config(), None).unwrap();
        assert_eq!(selected.len(), 2);
    }

    #[test]
    fn test_select_named_endpoint() {
        let selected = CheckCommand::select_endpoints(config(), Some("web")).unwrap();
        assert_eq!(selected.len(), 1);
        assert_eq!(selected[0].name, "web");

        assert!(CheckCommand::select_endpoints(config(), Some("missing")).is_err());
    }

    #[tokio::test]
    async fn test_check_run_against_mock_server() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/health")
            .with_status(200)
            .with_body(r#"{"ok": true}"#)
            .create_async()
            .await;

        let mut endpoint = EndpointConfig::new("api", format!("{}/health", server.url()));
        endpoint
            .json_path_checks
            .insert("$.ok".to_string(), serde_json::json!(true));

        let outcomes = CheckCommand::run(vec![endpoint]).await.unwrap();
        assert_eq!(outcomes.len(), 1);
        assert!(outcomes[0].verdict.is_healthy());
        assert_eq!(outcomes[0].status_code, Some(200));
    }
}
