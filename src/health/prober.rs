//! 端点探测器
//!
//! 每个端点一个探测器，持有端点配置与失败窗口。每次 `check` 都是一次完整的
//! Idle → Checking → Idle 转换，产出一个新的 `CheckOutcome`

use crate::config::EndpointConfig;
use crate::error::TransportError;
use crate::health::executor::RequestExecutor;
use crate::health::result::{CheckOutcome, Verdict};
use crate::health::validator::ResponseValidator;
use crate::health::window::FailureWindow;
use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, warn};

/// 探测器状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProberState {
    Idle,
    Checking,
}

/// 单个端点的探测器
pub struct EndpointProber {
    endpoint: Arc<EndpointConfig>,
    executor: RequestExecutor,
    validator: ResponseValidator,
    failures: FailureWindow,
    state: ProberState,
}

impl EndpointProber {
    /// 创建探测器
    ///
    /// # 参数
    /// * `endpoint` - 端点配置
    /// * `executor` - 请求执行器
    ///
    /// # 返回
    /// * `Result<Self, String>` - 规则无法编译时返回错误
    pub fn new(endpoint: Arc<EndpointConfig>, executor: RequestExecutor) -> Result<Self, String> {
        let validator = ResponseValidator::from_endpoint(&endpoint)?;
        let failures = FailureWindow::new(endpoint.failure_window());

        Ok(Self {
            endpoint,
            executor,
            validator,
            failures,
            state: ProberState::Idle,
        })
    }

    pub fn endpoint(&self) -> &EndpointConfig {
        &self.endpoint
    }

    pub fn state(&self) -> ProberState {
        self.state
    }

    /// 失败窗口中的记录数
    pub fn recorded_failures(&self) -> usize {
        self.failures.recorded()
    }

    /// 执行一次探测
    pub async fn check(&mut self) -> CheckOutcome {
        self.state = ProberState::Checking;
        let outcome = self.probe().await;
        let outcome = self.finish(outcome, Utc::now());
        self.state = ProberState::Idle;
        outcome
    }

    async fn probe(&self) -> CheckOutcome {
        let start = Instant::now();

        // 外层超时兜底：覆盖全部重试和退避，保证不会无限阻塞
        let budget = self.total_budget();
        let result = match tokio::time::timeout(budget, self.executor.execute(&self.endpoint)).await
        {
            Ok(result) => result,
            Err(_) => Err(TransportError::Timeout(budget)),
        };

        match result {
            Ok(response) => {
                let report = self.validator.validate(&response);
                let (verdict, message) = if report.passed() {
                    (Verdict::Healthy, "Health check passed".to_string())
                } else {
                    (Verdict::Unhealthy, report.failure_message())
                };

                CheckOutcome::new(&self.endpoint.name, &self.endpoint.url, verdict, message)
                    .with_status_code(response.status_code)
                    .with_response_time(response.elapsed)
                    .with_details(report.details())
            }
            Err(e) => {
                let mut details = Map::new();
                details.insert("error".to_string(), Value::String(e.to_string()));
                details.insert("error_type".to_string(), Value::String(e.kind().to_string()));

                CheckOutcome::new(
                    &self.endpoint.name,
                    &self.endpoint.url,
                    Verdict::Unhealthy,
                    e.to_string(),
                )
                .with_response_time(start.elapsed())
                .with_details(details)
            }
        }
    }

    /// 所有尝试的超时之和加上全部退避时间
    fn total_budget(&self) -> Duration {
        let attempts = self.endpoint.retry.attempts.max(1);
        let backoff: Duration = (0..attempts.saturating_sub(1))
            .map(|i| RequestExecutor::backoff_delay(&self.endpoint.retry, i))
            .sum();
        self.endpoint
            .timeout()
            .saturating_mul(attempts)
            .saturating_add(backoff)
            .saturating_add(Duration::from_secs(1))
    }

    /// 记录失败并判断是否升级
    ///
    /// 健康结果不触碰失败窗口：窗口只统计失败，成功不会清零
    fn finish(&mut self, outcome: CheckOutcome, now: DateTime<Utc>) -> CheckOutcome {
        let outcome = outcome.with_timestamp(now);
        if outcome.verdict.is_healthy() {
            debug!(endpoint = %self.endpoint.name, "探测正常");
            return outcome;
        }

        let failure_count = self.failures.record_failure(now);
        if failure_count >= self.endpoint.failure_threshold as usize {
            warn!(
                endpoint = %self.endpoint.name,
                failures = failure_count,
                threshold = self.endpoint.failure_threshold,
                "失败次数达到阈值，升级告警"
            );
            return outcome.with_escalation(failure_count, self.failures.span());
        }

        outcome
    }
}
