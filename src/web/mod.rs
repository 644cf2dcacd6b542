//! 状态 API 模块
//!
//! 通过 HTTP 暴露各端点的最新探测结果

use crate::config::WebConfig;
use crate::status::StatusStore;
use anyhow::{Context, Result};
use axum::routing::get;
use axum::Router;
use serde::Serialize;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::broadcast;
use tower_http::trace::TraceLayer;
use tracing::info;

pub mod handlers;

/// 状态 API 共享状态
#[derive(Debug, Clone)]
pub struct WebState {
    /// 最新结果存储
    pub status_store: Arc<StatusStore>,
    /// 启动时间
    pub start_time: chrono::DateTime<chrono::Utc>,
}

impl WebState {
    pub fn new(status_store: Arc<StatusStore>) -> Self {
        Self {
            status_store,
            start_time: chrono::Utc::now(),
        }
    }
}

/// API响应包装器
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    /// 是否成功
    pub success: bool,
    /// 响应数据
    pub data: Option<T>,
    /// 错误信息
    pub error: Option<String>,
    /// 时间戳
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

impl<T> ApiResponse<T> {
    /// 创建成功响应
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
            timestamp: chrono::Utc::now(),
        }
    }

    /// 创建错误响应
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message.into()),
            timestamp: chrono::Utc::now(),
        }
    }
}

/// 进程存活响应
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// 服务状态
    pub status: String,
    /// 版本
    pub version: String,
    /// 运行时长（秒）
    pub uptime_seconds: i64,
}

/// 构建路由
pub fn build_router(state: WebState) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .route("/api/v1/status", get(handlers::all_status))
        .route("/api/v1/status/{name}", get(handlers::endpoint_status))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// 解析监听地址
pub fn socket_addr(config: &WebConfig) -> Result<SocketAddr> {
    format!("{}:{}", config.bind_address, config.port)
        .parse()
        .with_context(|| format!("无效的监听地址: {}:{}", config.bind_address, config.port))
}

/// 启动状态 API，收到停止信号后优雅退出
pub async fn serve(
    config: &WebConfig,
    status_store: Arc<StatusStore>,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> Result<()> {
    let addr = socket_addr(config)?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("绑定状态API地址失败: {addr}"))?;

    info!("状态API已启动，监听地址: {}", addr);
    let router = build_router(WebState::new(status_store));
    axum::serve(listener, router)
        .with_graceful_shutdown(async move {
            let _ = shutdown_rx.recv().await;
            info!("状态API收到停止信号");
        })
        .await
        .context("状态API运行失败")?;

    info!("状态API已停止");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_socket_addr() {
        let config = WebConfig::default();
        assert_eq!(socket_addr(&config).unwrap().to_string(), "127.0.0.1:8080");

        let config = WebConfig {
            bind_address: "not an address".to_string(),
            ..WebConfig::default()
        };
        assert!(socket_addr(&config).is_err());
    }

    #[test]
    fn test_api_response_success() {
        let response = ApiResponse::success("test data");
        assert!(response.success);
        assert_eq!(response.data, Some("test data"));
        assert!(response.error.is_none());
    }

    #[test]
    fn test_api_response_error() {
        let response: ApiResponse<()> = ApiResponse::error("test error");
        assert!(!response.success);
        assert!(response.data.is_none());
        assert_eq!(response.error.as_deref(), Some("test error"));
    }
}
