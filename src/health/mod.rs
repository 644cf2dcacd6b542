//! 健康检测模块
//!
//! 提供请求执行、响应校验、端点探测、失败窗口和任务调度功能

pub mod executor;
pub mod jsonpath;
pub mod prober;
pub mod result;
pub mod scheduler;
pub mod validator;
pub mod window;

// 重新导出主要类型
pub use executor::{ProbeResponse, ReqwestTransport, RequestExecutor, Transport};
pub use prober::{EndpointProber, ProberState};
pub use result::{CheckOutcome, Verdict};
pub use scheduler::{CheckOutcomeObserver, Scheduler, SchedulerStatus, TaskScheduler};
pub use validator::{ResponseValidator, ValidationReport};
pub use window::{AlertWindow, FailureWindow};
