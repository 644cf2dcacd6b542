//! 告警闸门
//!
//! 根据告警历史决定升级结果是否真正发送通知：冷却时间内抑制，
//! 滚动一小时内达到上限也抑制。每个端点一个闸门，归该端点的任务所有

use crate::config::AlertingConfig;
use crate::health::result::CheckOutcome;
use crate::health::window::AlertWindow;
use chrono::{DateTime, Utc};
use std::time::Duration;
use tracing::debug;

const HOUR: Duration = Duration::from_secs(60 * 60);

/// 告警限流策略
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AlertPolicy {
    /// 同一端点两次告警的最小间隔
    pub cooldown: Duration,
    /// 任意滚动 60 分钟内的最大告警数
    pub max_alerts_per_hour: u32,
}

impl From<&AlertingConfig> for AlertPolicy {
    fn from(config: &AlertingConfig) -> Self {
        Self {
            cooldown: config.cooldown_period(),
            max_alerts_per_hour: config.max_alerts_per_hour,
        }
    }
}

/// 闸门判定
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateDecision {
    /// 放行，已记录到告警历史
    Allow,
    /// 结果未升级
    NotEscalated,
    /// 距上次告警不足冷却时间
    Cooldown,
    /// 滚动一小时内告警数已达上限
    HourlyCap,
}

impl GateDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, GateDecision::Allow)
    }
}

/// 单个端点的告警闸门
#[derive(Debug, Clone)]
pub struct AlertGate {
    policy: AlertPolicy,
    history: AlertWindow,
}

impl AlertGate {
    pub fn new(policy: AlertPolicy) -> Self {
        Self {
            policy,
            history: AlertWindow::new(),
        }
    }

    /// 是否应当发送通知
    pub fn should_notify(&mut self, outcome: &CheckOutcome) -> bool {
        self.decide(outcome, Utc::now()).is_allowed()
    }

    /// 在给定时刻做出判定
    ///
    /// 放行时立即记录告警时间，早于实际投递；记录的是发送意图而非投递结果
    pub fn decide(&mut self, outcome: &CheckOutcome, now: DateTime<Utc>) -> GateDecision {
        if !outcome.is_escalated() {
            return GateDecision::NotEscalated;
        }

        let decision = self.evaluate(now);
        if decision.is_allowed() {
            self.history.record(now);
        } else {
            debug!(
                endpoint = %outcome.endpoint_name,
                decision = ?decision,
                "告警被抑制"
            );
        }
        decision
    }

    fn evaluate(&self, now: DateTime<Utc>) -> GateDecision {
        let Some(latest) = self.history.latest() else {
            return GateDecision::Allow;
        };

        let since_latest = (now - latest).to_std().unwrap_or(Duration::ZERO);
        if since_latest < self.policy.cooldown {
            return GateDecision::Cooldown;
        }

        if self.history.count_within(HOUR, now) >= self.policy.max_alerts_per_hour as usize {
            return GateDecision::HourlyCap;
        }

        GateDecision::Allow
    }

    /// 告警历史条数（24 小时内）
    pub fn recorded_alerts(&self) -> usize {
        self.history.recorded()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::health::result::Verdict;
    use chrono::TimeZone;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    fn escalated() -> CheckOutcome {
        CheckOutcome::new("api", "https://example.com", Verdict::Unhealthy, "down")
            .with_escalation(3, Duration::from_secs(300))
    }

    fn gate(cooldown_secs: u64, max_per_hour: u32) -> AlertGate {
        AlertGate::new(AlertPolicy {
            cooldown: Duration::from_secs(cooldown_secs),
            max_alerts_per_hour: max_per_hour,
        })
    }

    #[test]
    fn test_non_escalated_outcome_is_ignored() {
        let mut gate = gate(600, 10);
        let outcome = CheckOutcome::new("api", "u", Verdict::Unhealthy, "down");
        assert_eq!(gate.decide(&outcome, at(0)), GateDecision::NotEscalated);
        assert_eq!(gate.recorded_alerts(), 0);
    }

    #[test]
    fn test_first_alert_is_allowed_and_recorded() {
        let mut gate = gate(600, 10);
        assert_eq!(gate.decide(&escalated(), at(0)), GateDecision::Allow);
        assert_eq!(gate.recorded_alerts(), 1);
    }

    #[test]
    fn test_cooldown_suppresses_then_allows() {
        let mut gate = gate(600, 10);
        assert!(gate.decide(&escalated(), at(0)).is_allowed());
        assert_eq!(gate.decide(&escalated(), at(599)), GateDecision::Cooldown);
        assert_eq!(gate.decide(&escalated(), at(600)), GateDecision::Allow);
        assert_eq!(gate.recorded_alerts(), 2);
    }

    #[test]
    fn test_hourly_cap_suppresses_sixth_alert() {
        let mut gate = gate(60, 5);
        for i in 0..5 {
            assert!(gate.decide(&escalated(), at(i * 120)).is_allowed());
        }
        assert_eq!(gate.decide(&escalated(), at(600)), GateDecision::HourlyCap);
        assert_eq!(gate.decide(&escalated(), at(3599)), GateDecision::HourlyCap);

        // 第一条告警滑出一小时窗口后恢复
        assert_eq!(gate.decide(&escalated(), at(3601)), GateDecision::Allow);
    }

    #[test]
    fn test_suppressed_decisions_are_not_recorded() {
        let mut gate = gate(600, 10);
        gate.decide(&escalated(), at(0));
        gate.decide(&escalated(), at(10));
        gate.decide(&escalated(), at(20));
        assert_eq!(gate.recorded_alerts(), 1);
    }
}
