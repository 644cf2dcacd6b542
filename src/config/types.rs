//! 配置数据结构定义
//!
//! 定义应用程序的配置结构体和验证逻辑

use crate::health::jsonpath::JsonPath;
use crate::notification::template::validate_template;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;
use std::time::Duration;

/// 主配置结构，包含全局配置、告警配置和端点列表
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// 全局配置项
    #[serde(default)]
    pub global: GlobalConfig,
    /// 告警配置
    #[serde(default)]
    pub alerting: AlertingConfig,
    /// 端点配置列表
    pub endpoints: Vec<EndpointConfig>,
}

/// 全局配置结构
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GlobalConfig {
    /// 准入限流器容量（全部端点共享的最大在途请求数）
    #[serde(default = "default_concurrency_limit")]
    pub concurrency_limit: usize,
    /// 日志级别
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// 日志格式（text / json）
    #[serde(default = "default_log_format")]
    pub log_format: String,
    /// 日志输出（stdout / stderr / 文件路径）
    #[serde(default = "default_log_output")]
    pub log_output: String,
    /// 状态 API 配置
    pub web: Option<WebConfig>,
}

impl Default for GlobalConfig {
    fn default() -> Self {
        Self {
            concurrency_limit: default_concurrency_limit(),
            log_level: default_log_level(),
            log_format: default_log_format(),
            log_output: default_log_output(),
            web: None,
        }
    }
}

/// 状态 API 配置结构
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WebConfig {
    /// 是否启用
    #[serde(default)]
    pub enabled: bool,
    /// 绑定地址
    #[serde(default = "default_web_bind_address")]
    pub bind_address: String,
    /// 监听端口
    #[serde(default = "default_web_port")]
    pub port: u16,
}

impl Default for WebConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            bind_address: default_web_bind_address(),
            port: default_web_port(),
        }
    }
}

/// 告警配置结构
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AlertingConfig {
    /// 同一端点两次告警之间的最小间隔（秒）
    #[serde(default = "default_cooldown_period")]
    pub cooldown_period_seconds: f64,
    /// 任意滚动 60 分钟内的最大告警数
    #[serde(default = "default_max_alerts_per_hour")]
    pub max_alerts_per_hour: u32,
    /// 命名消息模板
    #[serde(default)]
    pub templates: BTreeMap<String, String>,
    /// 通知渠道，按配置名索引
    #[serde(default)]
    pub providers: BTreeMap<String, ProviderConfig>,
}

impl Default for AlertingConfig {
    fn default() -> Self {
        Self {
            cooldown_period_seconds: default_cooldown_period(),
            max_alerts_per_hour: default_max_alerts_per_hour(),
            templates: BTreeMap::new(),
            providers: BTreeMap::new(),
        }
    }
}

impl AlertingConfig {
    /// 告警冷却时间
    pub fn cooldown_period(&self) -> Duration {
        seconds(self.cooldown_period_seconds)
    }
}

/// 通知渠道配置
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProviderConfig {
    /// 渠道类型（slack / feishu / log）
    #[serde(rename = "type")]
    pub kind: String,
    /// 是否启用
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// 使用的模板名
    pub template: Option<String>,
    /// 渠道特定配置
    #[serde(default)]
    pub config: serde_json::Map<String, Value>,
}

impl ProviderConfig {
    /// 读取字符串类型的渠道配置项
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.config
            .get(key)
            .and_then(Value::as_str)
            .filter(|s| !s.trim().is_empty())
    }
}

/// 重试策略
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RetryConfig {
    /// 最大尝试次数（含首次）
    #[serde(default = "default_retry_attempts")]
    pub attempts: u32,
    /// 退避基数（秒），第 n 次失败后等待 base * 2^n
    #[serde(default = "default_backoff_factor")]
    pub backoff_factor_seconds: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            attempts: default_retry_attempts(),
            backoff_factor_seconds: default_backoff_factor(),
        }
    }
}

impl RetryConfig {
    /// 退避基数
    pub fn backoff_base(&self) -> Duration {
        seconds(self.backoff_factor_seconds)
    }
}

/// 闭区间状态码范围，配置形式为 `"500-599"`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct StatusRange {
    pub start: u16,
    pub end: u16,
}

impl StatusRange {
    /// 状态码是否落在区间内（含端点）
    pub fn contains(&self, code: u16) -> bool {
        (self.start..=self.end).contains(&code)
    }
}

impl TryFrom<String> for StatusRange {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        let invalid = || format!("状态码范围格式必须为 '100-199'，实际为 {value}");

        let (start, end) = value.split_once('-').ok_or_else(invalid)?;
        let is_code = |s: &str| s.len() == 3 && s.bytes().all(|b| b.is_ascii_digit());
        if !is_code(start) || !is_code(end) {
            return Err(invalid());
        }

        let start: u16 = start.parse().map_err(|_| invalid())?;
        let end: u16 = end.parse().map_err(|_| invalid())?;
        if !(100..=599).contains(&start) || !(100..=599).contains(&end) || start > end {
            return Err(format!("无效的状态码范围: {value}"));
        }

        Ok(Self { start, end })
    }
}

impl From<StatusRange> for String {
    fn from(range: StatusRange) -> Self {
        range.to_string()
    }
}

impl fmt::Display for StatusRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.start, self.end)
    }
}

/// 端点配置结构，加载后不可变
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EndpointConfig {
    /// 端点名称（唯一），缺省时取 URL 主机名
    #[serde(default)]
    pub name: String,
    /// 目标URL
    pub url: String,
    /// HTTP方法
    #[serde(default = "default_method")]
    pub method: String,
    /// 请求头
    #[serde(default)]
    pub headers: HashMap<String, String>,
    /// 请求体；字符串原样发送，其它值按 JSON 发送
    pub body: Option<Value>,
    /// 精确匹配的期望状态码
    #[serde(default = "default_expected_status_codes")]
    pub expected_status_codes: Vec<u16>,
    /// 期望状态码范围
    #[serde(default)]
    pub expected_status_ranges: Vec<StatusRange>,
    /// 响应时间阈值（秒）
    #[serde(default = "default_response_time_threshold")]
    pub response_time_threshold_seconds: f64,
    /// 单次请求超时（秒）
    #[serde(default = "default_timeout")]
    pub timeout_seconds: f64,
    /// 探测间隔（秒）
    #[serde(default = "default_interval")]
    pub interval_seconds: f64,
    /// 重试策略
    #[serde(default)]
    pub retry: RetryConfig,
    /// JSON 路径检查：路径 -> 期望值
    #[serde(default)]
    pub json_path_checks: BTreeMap<String, Value>,
    /// 正则检查：名称 -> 模式
    #[serde(default)]
    pub regex_checks: BTreeMap<String, String>,
    /// 窗口内失败次数阈值
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u32,
    /// 失败统计窗口（秒）
    #[serde(default = "default_failure_window")]
    pub failure_window_seconds: f64,
}

impl EndpointConfig {
    /// 以默认值创建端点配置
    pub fn new(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
            method: default_method(),
            headers: HashMap::new(),
            body: None,
            expected_status_codes: default_expected_status_codes(),
            expected_status_ranges: Vec::new(),
            response_time_threshold_seconds: default_response_time_threshold(),
            timeout_seconds: default_timeout(),
            interval_seconds: default_interval(),
            retry: RetryConfig::default(),
            json_path_checks: BTreeMap::new(),
            regex_checks: BTreeMap::new(),
            failure_threshold: default_failure_threshold(),
            failure_window_seconds: default_failure_window(),
        }
    }

    pub fn timeout(&self) -> Duration {
        seconds(self.timeout_seconds)
    }

    pub fn interval(&self) -> Duration {
        seconds(self.interval_seconds)
    }

    pub fn response_time_threshold(&self) -> Duration {
        seconds(self.response_time_threshold_seconds)
    }

    pub fn failure_window(&self) -> Duration {
        seconds(self.failure_window_seconds)
    }
}

impl Config {
    /// 补全缺省的端点名称（取 URL 主机名，无法解析时使用完整 URL）
    pub fn normalize(&mut self) {
        for endpoint in &mut self.endpoints {
            if endpoint.name.trim().is_empty() {
                endpoint.name = reqwest::Url::parse(&endpoint.url)
                    .ok()
                    .and_then(|url| url.host_str().map(str::to_string))
                    .unwrap_or_else(|| endpoint.url.clone());
            }
        }
    }
}

/// 秒数转换为 Duration，非法值（负数、NaN）归零
fn seconds(value: f64) -> Duration {
    Duration::try_from_secs_f64(value).unwrap_or_default()
}

// 默认值函数
fn default_concurrency_limit() -> usize {
    100
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_log_format() -> String {
    "text".to_string()
}
fn default_log_output() -> String {
    "stdout".to_string()
}
fn default_web_bind_address() -> String {
    "127.0.0.1".to_string()
}
fn default_web_port() -> u16 {
    8080
}
fn default_cooldown_period() -> f64 {
    600.0
}
fn default_max_alerts_per_hour() -> u32 {
    10
}
fn default_enabled() -> bool {
    true
}
fn default_retry_attempts() -> u32 {
    3
}
fn default_backoff_factor() -> f64 {
    0.3
}
fn default_method() -> String {
    "GET".to_string()
}
fn default_expected_status_codes() -> Vec<u16> {
    vec![200]
}
fn default_response_time_threshold() -> f64 {
    5.0
}
fn default_timeout() -> f64 {
    10.0
}
fn default_interval() -> f64 {
    60.0
}
fn default_failure_threshold() -> u32 {
    3
}
fn default_failure_window() -> f64 {
    300.0
}

/// 已知的通知渠道类型
pub const PROVIDER_TYPES: [&str; 3] = ["slack", "feishu", "log"];

fn check_positive(name: &str, field: &str, value: f64) -> Result<(), String> {
    if !value.is_finite() || value <= 0.0 {
        return Err(format!("端点 {name} 的 {field} 必须为正数，实际为 {value}"));
    }
    check_duration(&format!("端点 {name} 的 {field}"), value)
}

/// 秒数必须能表示为 `Duration`，否则换算时会被归零
fn check_duration(label: &str, value: f64) -> Result<(), String> {
    Duration::try_from_secs_f64(value)
        .map(|_| ())
        .map_err(|_| format!("{label} 超出可表示的时长范围: {value}"))
}

/// 配置验证函数
///
/// # 参数
/// * `config` - 要验证的配置（名称应已补全）
///
/// # 返回
/// * `Result<(), String>` - 验证结果，错误时返回错误信息
pub fn validate_config(config: &Config) -> Result<(), String> {
    // 验证全局配置
    if config.global.concurrency_limit == 0 {
        return Err("并发限制不能为0".to_string());
    }

    let valid_log_levels = ["trace", "debug", "info", "warn", "error"];
    if !valid_log_levels.contains(&config.global.log_level.as_str()) {
        return Err(format!(
            "无效的日志级别: {}，支持的级别: {:?}",
            config.global.log_level, valid_log_levels
        ));
    }

    let valid_log_formats = ["text", "json"];
    if !valid_log_formats.contains(&config.global.log_format.as_str()) {
        return Err(format!(
            "无效的日志格式: {}，支持的格式: {:?}",
            config.global.log_format, valid_log_formats
        ));
    }

    if let Some(ref web) = config.global.web {
        if web.enabled && web.port == 0 {
            return Err("状态API端口不能为0".to_string());
        }
    }

    // 验证告警配置
    let alerting = &config.alerting;
    if !alerting.cooldown_period_seconds.is_finite() || alerting.cooldown_period_seconds < 0.0 {
        return Err("告警冷却时间不能为负数".to_string());
    }
    check_duration("告警冷却时间", alerting.cooldown_period_seconds)?;
    if alerting.max_alerts_per_hour == 0 {
        return Err("每小时最大告警数不能为0".to_string());
    }

    for (name, template) in &alerting.templates {
        validate_template(template).map_err(|e| format!("告警模板 {name} 无效: {e}"))?;
    }

    for (name, provider) in &alerting.providers {
        if !PROVIDER_TYPES.contains(&provider.kind.as_str()) {
            return Err(format!(
                "通知渠道 {} 的类型 {} 未知，支持的类型: {:?}",
                name, provider.kind, PROVIDER_TYPES
            ));
        }
        if provider.enabled
            && provider.kind != "log"
            && provider.get_str("webhook_url").map_or(true, str::is_empty)
        {
            return Err(format!("通知渠道 {name} 缺少 webhook_url"));
        }
        if let Some(ref template) = provider.template {
            if !alerting.templates.contains_key(template) {
                return Err(format!("通知渠道 {name} 引用了不存在的模板 {template}"));
            }
        }
    }

    // 验证端点配置
    if config.endpoints.is_empty() {
        return Err("至少需要配置一个端点".to_string());
    }

    let mut names = HashSet::new();
    for endpoint in &config.endpoints {
        let name = endpoint.name.as_str();

        if name.trim().is_empty() {
            return Err("端点名称不能为空".to_string());
        }
        if !names.insert(name) {
            return Err(format!("端点名称必须唯一，重复的名称: {name}"));
        }

        if !endpoint.url.starts_with("http://") && !endpoint.url.starts_with("https://") {
            return Err(format!("端点 {name} 的URL格式无效"));
        }

        let valid_methods = ["GET", "POST", "PUT", "DELETE", "HEAD", "OPTIONS", "PATCH"];
        if !valid_methods.contains(&endpoint.method.to_uppercase().as_str()) {
            return Err(format!(
                "端点 {} 的HTTP方法 {} 无效，支持的方法: {:?}",
                name, endpoint.method, valid_methods
            ));
        }

        if endpoint.expected_status_codes.is_empty() && endpoint.expected_status_ranges.is_empty() {
            return Err(format!("端点 {name} 必须指定期望的状态码或状态码范围"));
        }
        for &code in &endpoint.expected_status_codes {
            if !(100..=599).contains(&code) {
                return Err(format!("端点 {name} 的状态码 {code} 无效"));
            }
        }

        check_positive(name, "response_time_threshold_seconds", endpoint.response_time_threshold_seconds)?;
        check_positive(name, "timeout_seconds", endpoint.timeout_seconds)?;
        check_positive(name, "interval_seconds", endpoint.interval_seconds)?;
        check_positive(name, "failure_window_seconds", endpoint.failure_window_seconds)?;

        if endpoint.retry.attempts == 0 {
            return Err(format!("端点 {name} 的重试次数至少为1"));
        }
        if !endpoint.retry.backoff_factor_seconds.is_finite()
            || endpoint.retry.backoff_factor_seconds < 0.0
        {
            return Err(format!("端点 {name} 的退避基数不能为负数"));
        }
        check_duration(
            &format!("端点 {name} 的 backoff_factor_seconds"),
            endpoint.retry.backoff_factor_seconds,
        )?;

        if endpoint.failure_threshold == 0 {
            return Err(format!("端点 {name} 的失败阈值不能为0"));
        }

        for path in endpoint.json_path_checks.keys() {
            JsonPath::parse(path)
                .map_err(|e| format!("端点 {name} 的JSON路径 {path} 无效: {e}"))?;
        }
        for (rule, pattern) in &endpoint.regex_checks {
            Regex::new(pattern)
                .map_err(|e| format!("端点 {name} 的正则检查 {rule} 无效: {e}"))?;
        }
    }

    Ok(())
}
