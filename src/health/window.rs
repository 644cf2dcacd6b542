//! 滑动时间窗口
//!
//! 失败历史和告警历史共用的有序时间戳序列：只在尾部追加，
//! 按容量上限或时间从头部淘汰

use chrono::{DateTime, Utc};
use std::collections::VecDeque;
use std::time::Duration;

/// 失败窗口的容量上限
pub const FAILURE_WINDOW_CAPACITY: usize = 100;

/// 告警历史保留时长
pub const ALERT_RETENTION: Duration = Duration::from_secs(24 * 60 * 60);

/// 按插入顺序排列的时间戳窗口
#[derive(Debug, Clone, Default)]
pub struct TimeWindow {
    entries: VecDeque<DateTime<Utc>>,
    capacity: Option<usize>,
}

impl TimeWindow {
    /// 无容量上限的窗口
    pub fn unbounded() -> Self {
        Self::default()
    }

    /// 超出容量时淘汰最早的条目
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity: Some(capacity),
        }
    }

    /// 追加时间戳
    pub fn push(&mut self, at: DateTime<Utc>) {
        self.entries.push_back(at);
        if let Some(capacity) = self.capacity {
            while self.entries.len() > capacity {
                self.entries.pop_front();
            }
        }
    }

    /// 淘汰早于 `cutoff` 的条目
    pub fn prune_before(&mut self, cutoff: DateTime<Utc>) {
        while self.entries.front().is_some_and(|&at| at < cutoff) {
            self.entries.pop_front();
        }
    }

    /// 统计 `[now - span, now]` 内的条目数
    pub fn count_within(&self, span: Duration, now: DateTime<Utc>) -> usize {
        let cutoff = cutoff(now, span);
        self.entries
            .iter()
            .filter(|&&at| at >= cutoff && at <= now)
            .count()
    }

    /// 最近一次的时间戳
    pub fn latest(&self) -> Option<DateTime<Utc>> {
        self.entries.back().copied()
    }

    /// 当前保留的记录数
    pub fn count(&self) -> usize {
        self.entries.len()
    }
}

/// `now - span`，溢出时取最早可表示时间
pub fn cutoff(now: DateTime<Utc>, span: Duration) -> DateTime<Utc> {
    chrono::Duration::from_std(span)
        .ok()
        .and_then(|span| now.checked_sub_signed(span))
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}

/// 单个端点的失败历史，归探测器所有
#[derive(Debug, Clone)]
pub struct FailureWindow {
    window: TimeWindow,
    span: Duration,
}

impl FailureWindow {
    pub fn new(span: Duration) -> Self {
        Self {
            window: TimeWindow::with_capacity(FAILURE_WINDOW_CAPACITY),
            span,
        }
    }

    /// 记录一次失败，返回统计窗口内的失败次数
    pub fn record_failure(&mut self, now: DateTime<Utc>) -> usize {
        self.window.push(now);
        self.window.count_within(self.span, now)
    }

    pub fn span(&self) -> Duration {
        self.span
    }

    pub fn recorded(&self) -> usize {
        self.window.count()
    }
}

/// 单个端点的告警历史，归告警闸门所有
#[derive(Debug, Clone, Default)]
pub struct AlertWindow {
    window: TimeWindow,
}

impl AlertWindow {
    pub fn new() -> Self {
        Self::default()
    }

    /// 记录一次告警，并清理 24 小时之前的记录
    pub fn record(&mut self, now: DateTime<Utc>) {
        self.window.push(now);
        self.window.prune_before(cutoff(now, ALERT_RETENTION));
    }

    pub fn latest(&self) -> Option<DateTime<Utc>> {
        self.window.latest()
    }

    /// 滚动 `span` 内的告警数
    pub fn count_within(&self, span: Duration, now: DateTime<Utc>) -> usize {
        self.window.count_within(span, now)
    }

    pub fn recorded(&self) -> usize {
        self.window.count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    #[test]
    fn test_capacity_evicts_oldest() {
        let mut window = TimeWindow::with_capacity(3);
        for i in 0..5 {
            window.push(at(i));
        }
        assert_eq!(window.count(), 3);
        assert_eq!(window.latest(), Some(at(4)));
        assert_eq!(window.count_within(Duration::from_secs(100), at(4)), 3);
    }

    #[test]
    fn test_count_within_is_inclusive() {
        let mut window = TimeWindow::unbounded();
        window.push(at(0));
        window.push(at(100));
        window.push(at(300));

        assert_eq!(window.count_within(Duration::from_secs(300), at(300)), 3);
        assert_eq!(window.count_within(Duration::from_secs(299), at(300)), 2);
    }

    #[test]
    fn test_failure_window_threshold_arithmetic() {
        let mut failures = FailureWindow::new(Duration::from_secs(300));
        assert_eq!(failures.record_failure(at(0)), 1);
        assert_eq!(failures.record_failure(at(100)), 2);
        assert_eq!(failures.record_failure(at(200)), 3);

        let mut spread = FailureWindow::new(Duration::from_secs(300));
        spread.record_failure(at(0));
        spread.record_failure(at(200));
        assert_eq!(spread.record_failure(at(400)), 2);
    }

    #[test]
    fn test_failure_window_capacity() {
        let mut failures = FailureWindow::new(Duration::from_secs(3600));
        for i in 0..(FAILURE_WINDOW_CAPACITY as i64 + 20) {
            failures.record_failure(at(i));
        }
        assert_eq!(failures.recorded(), FAILURE_WINDOW_CAPACITY);
    }

    #[test]
    fn test_alert_window_prunes_after_a_day() {
        let mut alerts = AlertWindow::new();
        alerts.record(at(0));
        alerts.record(at(3600));
        assert_eq!(alerts.recorded(), 2);

        alerts.record(at(24 * 3600 + 10));
        assert_eq!(alerts.recorded(), 2);
        assert_eq!(alerts.latest(), Some(at(24 * 3600 + 10)));
    }
}
