//! 端点状态存储模块
//!
//! 保存每个端点最近一次探测结果，供状态 API 和命令行查询。
//! 写入方是各端点任务，读取方可能并发，因此使用读写锁

use crate::health::result::{CheckOutcome, Verdict};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tokio::sync::RwLock;

/// 单个端点的当前状态
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EndpointStatus {
    /// 端点名称
    pub name: String,
    /// 端点URL
    pub url: String,
    /// 最近一次判定，尚未探测时为空
    pub verdict: Option<Verdict>,
    /// 最后探测时间
    pub last_check: Option<DateTime<Utc>>,
    /// 状态码
    pub status_code: Option<u16>,
    /// 响应时间（毫秒）
    pub response_time_ms: Option<u64>,
    /// 结果描述
    pub message: Option<String>,
    /// 最近一次结果是否升级告警
    pub escalated: bool,
}

impl EndpointStatus {
    fn unknown(name: String, url: String) -> Self {
        Self {
            name,
            url,
            verdict: None,
            last_check: None,
            status_code: None,
            response_time_ms: None,
            message: None,
            escalated: false,
        }
    }

    fn from_outcome(outcome: &CheckOutcome) -> Self {
        Self {
            name: outcome.endpoint_name.clone(),
            url: outcome.url.clone(),
            verdict: Some(outcome.verdict),
            last_check: Some(outcome.timestamp),
            status_code: outcome.status_code,
            response_time_ms: Some(outcome.response_time_ms()),
            message: Some(outcome.message.clone()),
            escalated: outcome.is_escalated(),
        }
    }
}

/// 整体状态
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusSummary {
    /// 启动时间
    pub start_time: DateTime<Utc>,
    /// 端点总数
    pub total_endpoints: usize,
    /// 健康端点数
    pub healthy_endpoints: usize,
    /// 异常端点数
    pub unhealthy_endpoints: usize,
    /// 尚未探测的端点数
    pub unknown_endpoints: usize,
    /// 端点详细状态，按名称排序
    pub endpoints: Vec<EndpointStatus>,
}

/// 状态存储
#[derive(Debug)]
pub struct StatusStore {
    endpoints: RwLock<HashMap<String, EndpointStatus>>,
    start_time: DateTime<Utc>,
}

impl Default for StatusStore {
    fn default() -> Self {
        Self::new()
    }
}

impl StatusStore {
    pub fn new() -> Self {
        Self {
            endpoints: RwLock::new(HashMap::new()),
            start_time: Utc::now(),
        }
    }

    /// 登记端点（初始状态为未知）
    pub async fn register(&self, name: impl Into<String>, url: impl Into<String>) {
        let name = name.into();
        let mut endpoints = self.endpoints.write().await;
        endpoints
            .entry(name.clone())
            .or_insert_with(|| EndpointStatus::unknown(name, url.into()));
    }

    /// 记录最新结果
    pub async fn record(&self, outcome: &CheckOutcome) {
        let mut endpoints = self.endpoints.write().await;
        endpoints.insert(
            outcome.endpoint_name.clone(),
            EndpointStatus::from_outcome(outcome),
        );
    }

    /// 获取特定端点状态
    pub async fn get(&self, name: &str) -> Option<EndpointStatus> {
        self.endpoints.read().await.get(name).cloned()
    }

    /// 获取整体状态
    pub async fn summary(&self) -> StatusSummary {
        let endpoints = self.endpoints.read().await;
        let mut statuses: Vec<EndpointStatus> = endpoints.values().cloned().collect();
        statuses.sort_by(|a, b| a.name.cmp(&b.name));

        let count = |verdict: Option<Verdict>| statuses.iter().filter(|s| s.verdict == verdict).count();

        StatusSummary {
            start_time: self.start_time,
            total_endpoints: statuses.len(),
            healthy_endpoints: count(Some(Verdict::Healthy)),
            unhealthy_endpoints: count(Some(Verdict::Unhealthy)),
            unknown_endpoints: count(None),
            endpoints: statuses,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_register_then_record() {
        let store = StatusStore::new();
        store.register("api", "https://example.com").await;
        store.register("web", "https://example.org").await;

        let summary = store.summary().await;
        assert_eq!(summary.total_endpoints, 2);
        assert_eq!(summary.unknown_endpoints, 2);

        let outcome = CheckOutcome::new("api", "https://example.com", Verdict::Unhealthy, "down")
            .with_status_code(503);
        store.record(&outcome).await;

        let status = store.get("api").await.unwrap();
        assert_eq!(status.verdict, Some(Verdict::Unhealthy));
        assert_eq!(status.status_code, Some(503));

        let summary = store.summary().await;
        assert_eq!(summary.unhealthy_endpoints, 1);
        assert_eq!(summary.unknown_endpoints, 1);
        assert_eq!(summary.endpoints[0].name, "api");
    }

    #[tokio::test]
    async fn test_register_keeps_existing_result() {
        let store = StatusStore::new();
        store
            .record(&CheckOutcome::new("api", "u", Verdict::Healthy, "ok"))
            .await;
        store.register("api", "u").await;

        assert_eq!(store.get("api").await.unwrap().verdict, Some(Verdict::Healthy));
        assert!(store.get("missing").await.is_none());
    }
}
