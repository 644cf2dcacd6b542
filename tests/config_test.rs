//! 配置加载集成测试

use probe_vitals::config::{ConfigLoader, TomlConfigLoader};
use probe_vitals::error::{ConfigError, ProbeVitalsError};
use probe_vitals::notification::{AlertPolicy, Dispatcher};
use serial_test::serial;
use std::io::Write;
use std::time::Duration;
use tempfile::NamedTempFile;

const FULL_CONFIG: &str = r#"
[global]
concurrency_limit = 8
log_format = "json"
log_output = "stderr"

[global.web]
enabled = true
port = 9090

[alerting]
cooldown_period_seconds = 120
max_alerts_per_hour = 4

[alerting.templates]
default = "{{endpoint_name}}: {{message}}"
short = "{{endpoint_name}} down"

[alerting.providers.console]
type = "log"
template = "short"

[alerting.providers.ops]
type = "slack"
enabled = false

[alerting.providers.lark]
type = "feishu"
config = { webhook_url = "${PV_IT_FEISHU_URL:-https://open.feishu.cn/hook/default}", secret = "s3cret" }

[[endpoints]]
name = "api"
url = "https://api.example.com/health"
method = "post"
body = "ping"
expected_status_ranges = ["200-299"]
regex_checks = { up = "status.*up" }
retry = { attempts = 5, backoff_factor_seconds = 0.5 }

[[endpoints]]
url = "https://www.example.org/"
"#;

fn write_config(content: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(content.as_bytes()).unwrap();
    file
}

#[tokio::test]
#[serial]
async fn test_load_full_config_and_build_dispatcher() {
    std::env::remove_var("PV_IT_FEISHU_URL");
    let file = write_config(FULL_CONFIG);

    let config = TomlConfigLoader::new(true)
        .load_from_file(file.path())
        .await
        .unwrap();

    assert_eq!(config.global.concurrency_limit, 8);
    assert_eq!(config.global.web.as_ref().map(|w| w.port), Some(9090));
    assert_eq!(config.endpoints.len(), 2);
    assert_eq!(config.endpoints[1].name, "www.example.org");
    assert_eq!(config.endpoints[0].retry.attempts, 5);

    let policy = AlertPolicy::from(&config.alerting);
    assert_eq!(policy.cooldown, Duration::from_secs(120));
    assert_eq!(policy.max_alerts_per_hour, 4);

    let dispatcher = Dispatcher::from_config(&config.alerting, false).unwrap();
    assert_eq!(dispatcher.sink_names(), vec!["console", "lark"]);
}

#[tokio::test]
#[serial]
async fn test_invalid_status_range_is_rejected() {
    let file = write_config(
        r#"
[[endpoints]]
name = "api"
url = "https://api.example.com/health"
expected_status_ranges = ["599-500"]
"#,
    );

    let result = TomlConfigLoader::new(true).load_from_file(file.path()).await;
    assert!(matches!(
        result,
        Err(ProbeVitalsError::Config(ConfigError::ParseError(_)))
            | Err(ProbeVitalsError::Config(ConfigError::ValidationError(_)))
    ));
}

#[tokio::test]
#[serial]
async fn test_unknown_provider_type_is_rejected() {
    let file = write_config(
        r#"
[alerting.providers.mail]
type = "email"

[[endpoints]]
url = "https://api.example.com/health"
"#,
    );

    let result = TomlConfigLoader::new(true).load_from_file(file.path()).await;
    assert!(matches!(
        result,
        Err(ProbeVitalsError::Config(ConfigError::ValidationError(_)))
    ));
}
