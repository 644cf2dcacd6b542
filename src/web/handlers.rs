//! 状态 API 路由处理函数

use super::{ApiResponse, HealthResponse, WebState};
use crate::status::{EndpointStatus, StatusSummary};
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json};

/// 进程存活检查
pub async fn health(State(state): State<WebState>) -> Json<ApiResponse<HealthResponse>> {
    let uptime = chrono::Utc::now() - state.start_time;
    Json(ApiResponse::success(HealthResponse {
        status: "ok".to_string(),
        version: crate::VERSION.to_string(),
        uptime_seconds: uptime.num_seconds(),
    }))
}

/// 全部端点状态
pub async fn all_status(State(state): State<WebState>) -> Json<ApiResponse<StatusSummary>> {
    Json(ApiResponse::success(state.status_store.summary().await))
}

/// 单个端点状态，未知端点返回 404
pub async fn endpoint_status(
    State(state): State<WebState>,
    Path(name): Path<String>,
) -> impl IntoResponse {
    match state.status_store.get(&name).await {
        Some(status) => (StatusCode::OK, Json(ApiResponse::success(status))),
        None => (
            StatusCode::NOT_FOUND,
            Json(ApiResponse::<EndpointStatus>::error(format!(
                "端点不存在: {name}"
            ))),
        ),
    }
}
