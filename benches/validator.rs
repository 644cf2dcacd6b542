//! 响应校验基准测试
//!
//! 测试状态码、JSON路径和正则校验的性能

use criterion::{criterion_group, criterion_main, Criterion};
use probe_vitals::config::{EndpointConfig, StatusRange};
use probe_vitals::health::jsonpath::JsonPath;
use probe_vitals::health::{ProbeResponse, ResponseValidator};
use serde_json::json;
use std::hint::black_box;
use std::time::Duration;

fn validator() -> ResponseValidator {
    let mut endpoint = EndpointConfig::new("api", "https://api.example.com/health");
    endpoint.expected_status_ranges = vec![StatusRange::try_from("200-299".to_string()).unwrap()];
    endpoint
        .json_path_checks
        .insert("$.status".to_string(), json!("up"));
    endpoint
        .json_path_checks
        .insert("$.checks[*].healthy".to_string(), json!(true));
    endpoint
        .regex_checks
        .insert("version".to_string(), r#""version":\s*"\d+\.\d+""#.to_string());
    ResponseValidator::from_endpoint(&endpoint).unwrap()
}

fn body() -> String {
    let checks: Vec<_> = (0..50)
        .map(|i| json!({"name": format!("dep-{i}"), "healthy": true, "latency_ms": i}))
        .collect();
    json!({"status": "up", "version": "2.4", "checks": checks}).to_string()
}

/// 响应校验基准测试
fn validator_benchmark(c: &mut Criterion) {
    let validator = validator();
    let response = ProbeResponse::new(200, body(), Duration::from_millis(40));

    c.bench_function("validate_full_response", |b| {
        b.iter(|| black_box(validator.validate(black_box(&response))));
    });

    c.bench_function("validate_status", |b| {
        b.iter(|| black_box(validator.validate_status(black_box(204))));
    });

    c.bench_function("jsonpath_parse", |b| {
        b.iter(|| black_box(JsonPath::parse(black_box("$.data['items'][*].meta.tags[0]"))));
    });
}

criterion_group!(benches, validator_benchmark);
criterion_main!(benches);
