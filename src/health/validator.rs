//! 响应校验器
//!
//! 对单个响应做三项独立检查：状态码、响应时间、响应体。
//! 校验是 (响应, 规则) 的纯函数，不持有任何可变状态

use crate::config::{EndpointConfig, StatusRange};
use crate::health::executor::ProbeResponse;
use crate::health::jsonpath::{values_equal, JsonPath};
use regex::Regex;
use serde_json::{Map, Value};
use std::time::Duration;

/// 校验详情键
pub const DETAIL_STATUS_CODE_VALID: &str = "status_code_valid";
pub const DETAIL_RESPONSE_TIME_VALID: &str = "response_time_valid";
pub const DETAIL_BODY_VALID: &str = "body_valid";
pub const DETAIL_BODY_DETAILS: &str = "body_details";
pub const DETAIL_BODY_CHECKS: &str = "body_checks";

/// 单项JSON路径检查
#[derive(Debug, Clone)]
struct JsonPathRule {
    path: JsonPath,
    expected: Value,
}

/// 单项正则检查
#[derive(Debug, Clone)]
struct RegexRule {
    name: String,
    pattern: Regex,
}

/// 响应体检查结果
#[derive(Debug, Clone, PartialEq)]
pub struct BodyCheck {
    pub passed: bool,
    pub details: Map<String, Value>,
}

/// 一次校验的完整报告
#[derive(Debug, Clone, PartialEq)]
pub struct ValidationReport {
    pub status_ok: bool,
    pub latency_ok: bool,
    pub body: BodyCheck,
    latency_threshold: Duration,
}

impl ValidationReport {
    /// 三项全部通过
    pub fn passed(&self) -> bool {
        self.status_ok && self.latency_ok && self.body.passed
    }

    /// 详情映射；失败时明确给出每一项的结论
    pub fn details(&self) -> Map<String, Value> {
        let mut details = Map::new();
        if self.passed() {
            details.insert(
                DETAIL_BODY_CHECKS.to_string(),
                Value::Object(self.body.details.clone()),
            );
        } else {
            details.insert(DETAIL_STATUS_CODE_VALID.to_string(), Value::Bool(self.status_ok));
            details.insert(DETAIL_RESPONSE_TIME_VALID.to_string(), Value::Bool(self.latency_ok));
            details.insert(DETAIL_BODY_VALID.to_string(), Value::Bool(self.body.passed));
            details.insert(
                DETAIL_BODY_DETAILS.to_string(),
                Value::Object(self.body.details.clone()),
            );
        }
        details
    }

    /// 失败描述，按失败维度拼接
    pub fn failure_message(&self) -> String {
        let mut messages = Vec::new();

        if !self.status_ok {
            messages.push("Unexpected status code".to_string());
        }
        if !self.latency_ok {
            messages.push(format!(
                "Response time exceeded threshold of {}s",
                self.latency_threshold.as_secs_f64()
            ));
        }
        if !self.body.passed {
            messages.push("Response body validation failed".to_string());
        }

        if messages.is_empty() {
            "Health check failed".to_string()
        } else {
            messages.join(", ")
        }
    }
}

/// 响应校验器，规则在构造时编译
#[derive(Debug, Clone)]
pub struct ResponseValidator {
    expected_status_codes: Vec<u16>,
    expected_status_ranges: Vec<StatusRange>,
    latency_threshold: Duration,
    json_rules: Vec<JsonPathRule>,
    regex_rules: Vec<RegexRule>,
}

impl ResponseValidator {
    /// 从端点配置构建校验器
    ///
    /// 非法的路径或正则在加载配置时已被拒绝，这里再次出现时返回错误说明
    pub fn from_endpoint(endpoint: &EndpointConfig) -> Result<Self, String> {
        let json_rules = endpoint
            .json_path_checks
            .iter()
            .map(|(path, expected)| {
                JsonPath::parse(path)
                    .map(|path| JsonPathRule {
                        path,
                        expected: expected.clone(),
                    })
                    .map_err(|e| format!("JSON路径 {path} 无效: {e}"))
            })
            .collect::<Result<Vec<_>, _>>()?;

        let regex_rules = endpoint
            .regex_checks
            .iter()
            .map(|(name, pattern)| {
                // 与 DOTALL 语义一致：. 匹配换行
                Regex::new(&format!("(?s){pattern}"))
                    .map(|pattern| RegexRule {
                        name: name.clone(),
                        pattern,
                    })
                    .map_err(|e| format!("正则检查 {name} 无效: {e}"))
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            expected_status_codes: endpoint.expected_status_codes.clone(),
            expected_status_ranges: endpoint.expected_status_ranges.clone(),
            latency_threshold: endpoint.response_time_threshold(),
            json_rules,
            regex_rules,
        })
    }

    /// 状态码在精确集合中，或落在任一闭区间内
    pub fn validate_status(&self, status_code: u16) -> bool {
        self.expected_status_codes.contains(&status_code)
            || self
                .expected_status_ranges
                .iter()
                .any(|range| range.contains(status_code))
    }

    /// 耗时不超过阈值
    pub fn validate_latency(&self, elapsed: Duration) -> bool {
        elapsed <= self.latency_threshold
    }

    /// 响应体检查；没有规则时直接通过
    pub fn validate_body(&self, body: &str) -> BodyCheck {
        let mut details = Map::new();
        if self.json_rules.is_empty() && self.regex_rules.is_empty() {
            return BodyCheck {
                passed: true,
                details,
            };
        }

        let mut passed = true;

        if !self.json_rules.is_empty() {
            match serde_json::from_str::<Value>(body) {
                Ok(document) => {
                    let results: Map<String, Value> = self
                        .json_rules
                        .iter()
                        .map(|rule| {
                            let matched = rule
                                .path
                                .first(&document)
                                .is_some_and(|actual| values_equal(actual, &rule.expected));
                            (rule.path.as_str().to_string(), Value::Bool(matched))
                        })
                        .collect();
                    passed &= results.values().all(|v| v.as_bool().unwrap_or(false));
                    details.insert("json_checks".to_string(), Value::Object(results));
                }
                Err(_) => {
                    passed = false;
                    details.insert("json_parse_error".to_string(), Value::Bool(true));
                }
            }
        }

        if !self.regex_rules.is_empty() {
            let results: Map<String, Value> = self
                .regex_rules
                .iter()
                .map(|rule| (rule.name.clone(), Value::Bool(rule.pattern.is_match(body))))
                .collect();
            passed &= results.values().all(|v| v.as_bool().unwrap_or(false));
            details.insert("regex_checks".to_string(), Value::Object(results));
        }

        BodyCheck { passed, details }
    }

    /// 校验一次完整响应
    pub fn validate(&self, response: &ProbeResponse) -> ValidationReport {
        ValidationReport {
            status_ok: self.validate_status(response.status_code),
            latency_ok: self.validate_latency(response.elapsed),
            body: self.validate_body(&response.body),
            latency_threshold: self.latency_threshold,
        }
    }
}
