//! HTTP请求执行器
//!
//! 发送单次探测请求并按重试策略处理传输层失败。
//! 只对连接失败和超时重试，带 4xx/5xx 的完整 HTTP 交换直接返回

use crate::config::{EndpointConfig, RetryConfig};
use crate::error::TransportError;
use async_trait::async_trait;
use reqwest::{Client, Method};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

/// 完成的HTTP交换
#[derive(Debug, Clone, PartialEq)]
pub struct ProbeResponse {
    /// HTTP状态码
    pub status_code: u16,
    /// 原始响应体
    pub body: String,
    /// 从首次尝试开始的耗时（含重试）
    pub elapsed: Duration,
}

impl ProbeResponse {
    pub fn new(status_code: u16, body: impl Into<String>, elapsed: Duration) -> Self {
        Self {
            status_code,
            body: body.into(),
            elapsed,
        }
    }
}

/// 传输层trait，发出单次请求
#[async_trait]
pub trait Transport: Send + Sync {
    /// 发送一次请求
    ///
    /// # 参数
    /// * `endpoint` - 端点配置
    ///
    /// # 返回
    /// * `(状态码, 响应体)` 或传输错误
    async fn send(&self, endpoint: &EndpointConfig) -> Result<(u16, String), TransportError>;
}

/// 基于 reqwest 的传输层实现，全部端点共享一个客户端
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: Client,
}

impl ReqwestTransport {
    /// 创建新的传输层
    pub fn new() -> Result<Self, TransportError> {
        let client = Client::builder()
            .user_agent(format!("{}/{}", crate::APP_NAME, crate::VERSION))
            .build()
            .map_err(|e| TransportError::Request(format!("创建HTTP客户端失败: {e}")))?;

        Ok(Self { client })
    }

    /// 构建HTTP请求
    fn build_request(
        &self,
        endpoint: &EndpointConfig,
    ) -> Result<reqwest::RequestBuilder, TransportError> {
        let method = Method::from_str(&endpoint.method.to_uppercase()).map_err(|_| {
            TransportError::Request(format!("无效的HTTP方法: {}", endpoint.method))
        })?;

        let mut request = self
            .client
            .request(method, &endpoint.url)
            .timeout(endpoint.timeout());

        for (key, value) in &endpoint.headers {
            request = request.header(key, value);
        }

        match &endpoint.body {
            Some(serde_json::Value::String(text)) => request = request.body(text.clone()),
            Some(body) => request = request.json(body),
            None => {}
        }

        Ok(request)
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn send(&self, endpoint: &EndpointConfig) -> Result<(u16, String), TransportError> {
        let timeout = endpoint.timeout();
        let request = self.build_request(endpoint)?;

        let response = request
            .send()
            .await
            .map_err(|e| TransportError::from_reqwest(&e, timeout))?;

        let status_code = response.status().as_u16();
        let body = response
            .text()
            .await
            .map_err(|e| TransportError::from_reqwest(&e, timeout))?;

        Ok((status_code, body))
    }
}

/// 带重试的请求执行器
#[derive(Clone)]
pub struct RequestExecutor {
    transport: Arc<dyn Transport>,
}

impl RequestExecutor {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self { transport }
    }

    /// 第 `attempt_index` 次（从0开始）尝试失败后的退避时间
    pub fn backoff_delay(retry: &RetryConfig, attempt_index: u32) -> Duration {
        retry
            .backoff_base()
            .saturating_mul(2u32.saturating_pow(attempt_index))
    }

    /// 执行请求
    ///
    /// 最多尝试 `retry.attempts` 次；非最后一次的传输失败后等待
    /// `backoff_base * 2^attempt_index` 再重试，最后一次失败直接返回错误
    pub async fn execute(&self, endpoint: &EndpointConfig) -> Result<ProbeResponse, TransportError> {
        let start = Instant::now();
        let attempts = endpoint.retry.attempts.max(1);

        let mut attempt = 0;
        loop {
            match self.transport.send(endpoint).await {
                Ok((status_code, body)) => {
                    return Ok(ProbeResponse::new(status_code, body, start.elapsed()));
                }
                Err(e) if attempt + 1 >= attempts => return Err(e),
                Err(e) => {
                    let delay = Self::backoff_delay(&endpoint.retry, attempt);
                    debug!(
                        endpoint = %endpoint.name,
                        attempt = attempt + 1,
                        delay_ms = delay.as_millis() as u64,
                        "请求失败，稍后重试: {}",
                        e
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }
}
