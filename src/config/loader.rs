//! 配置加载
//!
//! 读取 TOML 文件，展开 `${VAR}` 形式的环境变量，补全端点名称后做一次完整校验。
//! 任何一步失败都在探测开始前返回错误。

use crate::config::types::{validate_config, Config};
use crate::error::{ConfigError, Result};
use async_trait::async_trait;
use regex::{Captures, Regex};
use std::path::{Path, PathBuf};

/// 环境变量占位符：`${NAME}` 或 `${NAME:-fallback}`
const ENV_PLACEHOLDER: &str = r"\$\{([A-Za-z_][A-Za-z0-9_]*)(?::-([^}]*))?\}";

#[async_trait]
pub trait ConfigLoader: Send + Sync {
    /// 读取并校验配置文件
    async fn load_from_file<P: AsRef<Path> + Send>(&self, path: P) -> Result<Config>;

    /// 从内存中的 TOML 文本加载
    async fn load_from_string(&self, content: &str) -> Result<Config>;

    fn validate(&self, config: &Config) -> Result<()>;
}

/// TOML 格式的配置加载器
#[derive(Debug, Clone)]
pub struct TomlConfigLoader {
    expand_env: bool,
}

impl TomlConfigLoader {
    /// `expand_env` 为 false 时占位符原样保留
    pub fn new(expand_env: bool) -> Self {
        Self { expand_env }
    }

    /// 展开文本中的环境变量占位符
    ///
    /// 变量未设置且占位符没有给出默认值时返回 `EnvVarError`
    fn substitute_env_vars(&self, content: &str) -> Result<String> {
        if !self.expand_env {
            return Ok(content.to_string());
        }

        let placeholder = Regex::new(ENV_PLACEHOLDER)
            .map_err(|e| ConfigError::ParseError(format!("环境变量占位符规则无效: {e}")))?;

        let mut expanded = String::with_capacity(content.len());
        let mut cursor = 0;
        for captures in placeholder.captures_iter(content) {
            let Some(whole) = captures.get(0) else {
                continue;
            };
            expanded.push_str(&content[cursor..whole.start()]);
            expanded.push_str(&Self::resolve_var(&captures)?);
            cursor = whole.end();
        }
        expanded.push_str(&content[cursor..]);

        Ok(expanded)
    }

    fn resolve_var(captures: &Captures<'_>) -> Result<String> {
        let name = &captures[1];
        if let Ok(value) = std::env::var(name) {
            return Ok(value);
        }
        captures
            .get(2)
            .map(|fallback| fallback.as_str().to_string())
            .ok_or_else(|| ConfigError::EnvVarError { var: name.to_string() }.into())
    }

    /// 展开变量、反序列化并补全缺省端点名称
    fn parse_toml(&self, content: &str) -> Result<Config> {
        let expanded = self.substitute_env_vars(content)?;
        let mut config: Config = toml::from_str(&expanded)
            .map_err(|e| ConfigError::ParseError(format!("TOML解析失败: {e}")))?;
        config.normalize();
        Ok(config)
    }
}

impl Default for TomlConfigLoader {
    fn default() -> Self {
        Self::new(true)
    }
}

#[async_trait]
impl ConfigLoader for TomlConfigLoader {
    async fn load_from_file<P: AsRef<Path> + Send>(&self, path: P) -> Result<Config> {
        let path = path.as_ref();
        let content = match tokio::fs::read_to_string(path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(ConfigError::FileNotFound {
                    path: path.display().to_string(),
                }
                .into());
            }
            Err(e) => {
                return Err(ConfigError::ParseError(format!("读取 {} 失败: {e}", path.display())).into())
            }
        };

        let config = self.load_from_string(&content).await?;
        log::info!(
            "已加载配置文件 {}，共 {} 个端点",
            path.display(),
            config.endpoints.len()
        );
        Ok(config)
    }

    async fn load_from_string(&self, content: &str) -> Result<Config> {
        let config = self.parse_toml(content)?;
        self.validate(&config)?;
        log::debug!(
            "配置校验通过: {} 个端点, {} 个通知渠道",
            config.endpoints.len(),
            config.alerting.providers.len()
        );
        Ok(config)
    }

    fn validate(&self, config: &Config) -> Result<()> {
        validate_config(config).map_err(|e| ConfigError::ValidationError(e).into())
    }
}

/// 默认配置文件位置
///
/// 工作目录下的 `config.toml` 优先，其次是 `<用户配置目录>/probe-vitals/config.toml`
pub fn get_default_config_path() -> PathBuf {
    let local = PathBuf::from("config.toml");
    if local.exists() {
        return local;
    }
    dirs::config_dir()
        .map(|dir| dir.join("probe-vitals").join("config.toml"))
        .unwrap_or(local)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::env;
    use std::io::Write;

    const TEST_CONFIG_TOML: &str = r#"
[global]
concurrency_limit = 20
log_level = "info"

[alerting]
cooldown_period_seconds = 300.0
max_alerts_per_hour = 5

[alerting.providers.ops]
type = "log"

[[endpoints]]
name = "api"
url = "https://example.com/health"
expected_status_codes = [200, 201]
expected_status_ranges = ["500-599"]
json_path_checks = { "$.ok" = true }

[[endpoints]]
url = "https://status.example.org/ping"
"#;

    const TEST_CONFIG_WITH_ENV_VARS: &str = r#"
[alerting.providers.slack]
type = "slack"
config = { webhook_url = "${PV_TEST_WEBHOOK_URL}" }

[[endpoints]]
name = "api"
url = "https://example.com/health"
headers = { Authorization = "Bearer ${PV_TEST_API_TOKEN}", X-Env = "${PV_TEST_MISSING:-staging}" }
"#;

    #[tokio::test]
    async fn test_toml_parsing() {
        let loader = TomlConfigLoader::new(false);
        let config = loader.load_from_string(TEST_CONFIG_TOML).await.unwrap();

        assert_eq!(config.global.concurrency_limit, 20);
        assert_eq!(config.alerting.max_alerts_per_hour, 5);
        assert_eq!(config.alerting.providers["ops"].kind, "log");
        assert_eq!(config.endpoints.len(), 2);
        assert_eq!(config.endpoints[0].expected_status_codes, vec![200, 201]);
        assert_eq!(config.endpoints[0].expected_status_ranges[0].start, 500);
        assert_eq!(
            config.endpoints[0].json_path_checks.get("$.ok"),
            Some(&serde_json::Value::Bool(true))
        );
        // 缺省名称取主机名
        assert_eq!(config.endpoints[1].name, "status.example.org");
    }

    #[tokio::test]
    #[serial]
    async fn test_env_var_substitution() {
        env::set_var("PV_TEST_WEBHOOK_URL", "https://hooks.example.com/T000");
        env::set_var("PV_TEST_API_TOKEN", "test-token-123");
        env::remove_var("PV_TEST_MISSING");

        let loader = TomlConfigLoader::new(true);
        let config = loader
            .load_from_string(TEST_CONFIG_WITH_ENV_VARS)
            .await
            .unwrap();

        assert_eq!(
            config.alerting.providers["slack"].get_str("webhook_url"),
            Some("https://hooks.example.com/T000")
        );
        assert_eq!(
            config.endpoints[0].headers.get("Authorization"),
            Some(&"Bearer test-token-123".to_string())
        );
        assert_eq!(
            config.endpoints[0].headers.get("X-Env"),
            Some(&"staging".to_string())
        );

        env::remove_var("PV_TEST_WEBHOOK_URL");
        env::remove_var("PV_TEST_API_TOKEN");
    }

    #[tokio::test]
    #[serial]
    async fn test_env_var_substitution_missing_var() {
        env::remove_var("PV_TEST_NOT_SET");
        let config_with_missing_var = r#"
[[endpoints]]
url = "https://example.com"
headers = { Authorization = "${PV_TEST_NOT_SET}" }
"#;

        let loader = TomlConfigLoader::new(true);
        let result = loader.load_from_string(config_with_missing_var).await;

        let err = result.unwrap_err();
        assert!(err.to_string().contains("PV_TEST_NOT_SET"));
    }

    #[tokio::test]
    async fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(TEST_CONFIG_TOML.as_bytes()).unwrap();

        let loader = TomlConfigLoader::new(false);
        let config = loader.load_from_file(file.path()).await.unwrap();
        assert_eq!(config.endpoints[0].name, "api");
    }

    #[tokio::test]
    async fn test_load_missing_file() {
        let loader = TomlConfigLoader::new(false);
        let result = loader.load_from_file("/nonexistent/probe-vitals.toml").await;
        assert!(result.unwrap_err().to_string().contains("配置文件不存在"));
    }

    #[tokio::test]
    async fn test_duplicate_names_rejected_at_load() {
        let content = r#"
[[endpoints]]
url = "https://example.com/a"

[[endpoints]]
url = "https://example.com/b"
"#;
        let loader = TomlConfigLoader::new(false);
        let err = loader.load_from_string(content).await.unwrap_err();
        assert!(err.to_string().contains("唯一"));
    }

    #[test]
    fn test_substitute_env_vars_disabled() {
        let loader = TomlConfigLoader::new(false);
        let content = "test ${VAR} content";
        let result = loader.substitute_env_vars(content).unwrap();
        assert_eq!(result, content);
    }

    #[test]
    fn test_get_default_config_path() {
        let path = get_default_config_path();
        assert!(path.to_string_lossy().contains("config.toml"));
    }
}
