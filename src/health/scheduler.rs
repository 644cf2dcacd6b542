//! 任务调度器模块
//!
//! 每个端点一个常驻任务，全部任务共享一个信号量作为准入限流器。
//! 任务独占自己的探测器和告警闸门，窗口状态无需加锁

use crate::config::EndpointConfig;
use crate::health::executor::RequestExecutor;
use crate::health::prober::EndpointProber;
use crate::health::result::CheckOutcome;
use crate::notification::{AlertGate, AlertPolicy, Dispatcher};
use crate::status::StatusStore;
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use futures::FutureExt;
use serde::Serialize;
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast::error::TryRecvError;
use tokio::sync::{broadcast, RwLock, Semaphore};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

/// 两次探测之间的最短休眠
pub const MIN_TICK: Duration = Duration::from_millis(100);

/// 探测结果回调函数类型
pub type CheckOutcomeObserver = Arc<dyn Fn(&CheckOutcome) + Send + Sync>;

/// 调度器状态
#[derive(Debug, Clone, Serialize)]
pub struct SchedulerStatus {
    /// 运行中的任务数量
    pub running_tasks: usize,
    /// 端点数量
    pub total_endpoints: usize,
    /// 调度器是否运行中
    pub is_running: bool,
    /// 告警统计
    pub alert_stats: AlertStats,
}

/// 告警统计信息
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AlertStats {
    /// 闸门放行的告警数
    pub sent: u64,
    /// 被冷却或小时上限抑制的告警数
    pub suppressed: u64,
    /// 投递失败的渠道次数
    pub delivery_failures: u64,
}

#[derive(Debug, Default)]
struct AlertCounters {
    sent: AtomicU64,
    suppressed: AtomicU64,
    delivery_failures: AtomicU64,
}

impl AlertCounters {
    fn snapshot(&self) -> AlertStats {
        AlertStats {
            sent: self.sent.load(Ordering::Relaxed),
            suppressed: self.suppressed.load(Ordering::Relaxed),
            delivery_failures: self.delivery_failures.load(Ordering::Relaxed),
        }
    }
}

/// 调度器trait
#[async_trait]
pub trait Scheduler: Send + Sync {
    /// 启动调度器
    ///
    /// # 参数
    /// * `endpoints` - 端点配置列表
    ///
    /// # 返回
    /// * `Result<()>` - 启动结果
    async fn start(&self, endpoints: Vec<EndpointConfig>) -> Result<()>;

    /// 停止调度器，等待所有任务结束当前轮次
    async fn stop(&self) -> Result<()>;

    /// 获取调度器状态
    async fn status(&self) -> SchedulerStatus;
}

/// 各端点任务共享的上下文
struct TaskContext {
    semaphore: Arc<Semaphore>,
    dispatcher: Arc<Dispatcher>,
    status_store: Arc<StatusStore>,
    observer: Arc<RwLock<Option<CheckOutcomeObserver>>>,
    counters: Arc<AlertCounters>,
}

impl TaskContext {
    /// 单轮探测：取许可、探测、释放许可，然后记录结果并按需告警
    ///
    /// 等待许可期间收到停止信号时不再探测，返回 `IterationFlow::Stop`
    async fn run_iteration(
        &self,
        prober: &mut EndpointProber,
        gate: &mut AlertGate,
        stop: &mut broadcast::Receiver<()>,
    ) -> IterationFlow {
        let outcome = {
            let _permit = tokio::select! {
                permit = self.semaphore.acquire() => match permit {
                    Ok(permit) => permit,
                    Err(_) => {
                        warn!("获取并发许可失败，跳过本次探测: {}", prober.endpoint().name);
                        return IterationFlow::Continue;
                    }
                },
                _ = stop.recv() => {
                    debug!("等待并发许可时收到停止信号: {}", prober.endpoint().name);
                    return IterationFlow::Stop;
                }
            };
            prober.check().await
        };

        if outcome.verdict.is_healthy() {
            debug!(endpoint = %outcome.endpoint_name, "端点探测正常");
        } else {
            warn!(
                endpoint = %outcome.endpoint_name,
                status_code = ?outcome.status_code,
                "端点探测失败: {}",
                outcome.message
            );
        }

        self.status_store.record(&outcome).await;
        {
            let observer = self.observer.read().await;
            if let Some(ref observer) = *observer {
                observer(&outcome);
            }
        }

        if !outcome.is_escalated() {
            return IterationFlow::Continue;
        }

        if gate.should_notify(&outcome) {
            self.counters.sent.fetch_add(1, Ordering::Relaxed);
            let report = self.dispatcher.dispatch(&outcome).await;
            self.counters
                .delivery_failures
                .fetch_add(report.failed() as u64, Ordering::Relaxed);
        } else {
            self.counters.suppressed.fetch_add(1, Ordering::Relaxed);
        }
        IterationFlow::Continue
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum IterationFlow {
    Continue,
    Stop,
}

/// 端点任务主循环
async fn run_endpoint_task(
    mut prober: EndpointProber,
    mut gate: AlertGate,
    context: Arc<TaskContext>,
    mut stop: broadcast::Receiver<()>,
) {
    let name = prober.endpoint().name.clone();
    let interval = prober.endpoint().interval();
    info!("启动端点探测任务: {} (间隔 {:?})", name, interval);

    loop {
        if !matches!(stop.try_recv(), Err(TryRecvError::Empty)) {
            break;
        }

        let started = Instant::now();
        let iteration = context.run_iteration(&mut prober, &mut gate, &mut stop);
        match AssertUnwindSafe(iteration).catch_unwind().await {
            Ok(IterationFlow::Stop) => break,
            Ok(IterationFlow::Continue) => {}
            Err(_) => error!("端点 {} 的本轮探测发生panic，继续下一轮", name),
        }

        let pause = interval.saturating_sub(started.elapsed()).max(MIN_TICK);
        tokio::select! {
            _ = tokio::time::sleep(pause) => {}
            _ = stop.recv() => break,
        }
    }

    info!("端点探测任务已停止: {}", name);
}

/// 任务调度器实现
pub struct TaskScheduler {
    /// 请求执行器
    executor: RequestExecutor,
    /// 告警限流策略
    policy: AlertPolicy,
    context: Arc<TaskContext>,
    /// 运行中的任务
    tasks: Arc<RwLock<HashMap<String, JoinHandle<()>>>>,
    /// 停止信号
    stop_tx: broadcast::Sender<()>,
    total_endpoints: Arc<RwLock<usize>>,
}

impl TaskScheduler {
    /// 创建新的任务调度器
    ///
    /// # 参数
    /// * `executor` - 请求执行器
    /// * `dispatcher` - 通知分发器
    /// * `policy` - 告警限流策略
    /// * `concurrency_limit` - 全部端点共享的最大在途请求数
    pub fn new(
        executor: RequestExecutor,
        dispatcher: Arc<Dispatcher>,
        policy: AlertPolicy,
        concurrency_limit: usize,
    ) -> Self {
        let (stop_tx, _) = broadcast::channel(1);
        let context = TaskContext {
            semaphore: Arc::new(Semaphore::new(concurrency_limit.max(1))),
            dispatcher,
            status_store: Arc::new(StatusStore::new()),
            observer: Arc::new(RwLock::new(None)),
            counters: Arc::new(AlertCounters::default()),
        };

        Self {
            executor,
            policy,
            context: Arc::new(context),
            tasks: Arc::new(RwLock::new(HashMap::new())),
            stop_tx,
            total_endpoints: Arc::new(RwLock::new(0)),
        }
    }

    /// 设置探测结果回调
    pub async fn set_observer(&self, observer: CheckOutcomeObserver) {
        let mut guard = self.context.observer.write().await;
        *guard = Some(observer);
    }

    /// 最新结果存储
    pub fn status_store(&self) -> Arc<StatusStore> {
        Arc::clone(&self.context.status_store)
    }

    /// 停止信号的订阅端，供其他组件随调度器一起退出
    pub fn subscribe_stop(&self) -> broadcast::Receiver<()> {
        self.stop_tx.subscribe()
    }
}

#[async_trait]
impl Scheduler for TaskScheduler {
    async fn start(&self, endpoints: Vec<EndpointConfig>) -> Result<()> {
        let mut tasks = self.tasks.write().await;
        if !tasks.is_empty() {
            return Err(anyhow!("调度器已在运行"));
        }

        info!("启动任务调度器，端点数量: {}", endpoints.len());

        // 先全部构建，任何端点规则无效都不启动任务
        let mut workers = Vec::with_capacity(endpoints.len());
        for endpoint in endpoints {
            let name = endpoint.name.clone();
            let prober = EndpointProber::new(Arc::new(endpoint), self.executor.clone())
                .map_err(|e| anyhow!(e))
                .with_context(|| format!("创建端点探测器失败: {name}"))?;
            workers.push(prober);
        }

        for prober in workers {
            let endpoint = prober.endpoint();
            let name = endpoint.name.clone();
            self.context
                .status_store
                .register(name.clone(), endpoint.url.clone())
                .await;

            let task = tokio::spawn(run_endpoint_task(
                prober,
                AlertGate::new(self.policy),
                Arc::clone(&self.context),
                self.stop_tx.subscribe(),
            ));
            tasks.insert(name, task);
        }

        *self.total_endpoints.write().await = tasks.len();
        info!("任务调度器启动完成");
        Ok(())
    }

    async fn stop(&self) -> Result<()> {
        info!("停止任务调度器");
        // 没有订阅者时发送会失败，此时也没有任务需要停止
        let _ = self.stop_tx.send(());

        let handles: Vec<(String, JoinHandle<()>)> = self.tasks.write().await.drain().collect();
        for (name, handle) in handles {
            if let Err(e) = handle.await {
                error!("端点任务 {} 异常结束: {}", name, e);
            } else {
                debug!("端点任务已结束: {}", name);
            }
        }

        info!("任务调度器已停止");
        Ok(())
    }

    async fn status(&self) -> SchedulerStatus {
        let tasks = self.tasks.read().await;
        let running_tasks = tasks.values().filter(|task| !task.is_finished()).count();

        SchedulerStatus {
            running_tasks,
            total_endpoints: *self.total_endpoints.read().await,
            is_running: !tasks.is_empty(),
            alert_stats: self.context.counters.snapshot(),
        }
    }
}
