//! 日志系统模块
//!
//! 初始化 tracing 订阅器，桥接 log 宏，支持文本/JSON 格式与 stdout/stderr/文件输出

use crate::config::GlobalConfig;
use anyhow::{anyhow, Context};
use log::LevelFilter;
use std::fs::OpenOptions;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::{Arc, Mutex, OnceLock};
use tracing_subscriber::fmt::time::ChronoUtc;
use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::{fmt, prelude::*, registry, EnvFilter};

/// 日志格式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Text,
    Json,
}

impl FromStr for LogFormat {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" => Ok(LogFormat::Text),
            "json" => Ok(LogFormat::Json),
            other => Err(anyhow!("无效的日志格式: {other}")),
        }
    }
}

/// 日志输出目标
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogOutput {
    Stdout,
    Stderr,
    File(PathBuf),
}

impl From<&str> for LogOutput {
    fn from(s: &str) -> Self {
        match s {
            "stdout" => LogOutput::Stdout,
            "stderr" => LogOutput::Stderr,
            path => LogOutput::File(PathBuf::from(path)),
        }
    }
}

/// 日志配置结构
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogConfig {
    /// 日志级别
    pub level: LevelFilter,
    /// 输出格式
    pub format: LogFormat,
    /// 输出目标
    pub output: LogOutput,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: LevelFilter::Info,
            format: LogFormat::Text,
            output: LogOutput::Stdout,
        }
    }
}

impl LogConfig {
    /// 从全局配置构建，命令行指定的级别优先
    pub fn from_global(global: &GlobalConfig, level_override: Option<&str>) -> anyhow::Result<Self> {
        let level_name = level_override.unwrap_or(&global.log_level);
        let level = LevelFilter::from_str(level_name)
            .with_context(|| format!("无效的日志级别: {level_name}"))?;

        Ok(Self {
            level,
            format: global.log_format.parse()?,
            output: LogOutput::from(global.log_output.as_str()),
        })
    }
}

/// 全局日志初始化状态
static GLOBAL_LOGGING_STATE: OnceLock<Mutex<Option<LogConfig>>> = OnceLock::new();

/// 日志系统
#[derive(Debug)]
pub struct LoggingSystem {
    config: LogConfig,
}

impl LoggingSystem {
    /// 初始化日志系统
    ///
    /// 进程内只初始化一次，重复调用返回使用首次配置的实例
    pub fn setup_logging(config: LogConfig) -> anyhow::Result<Self> {
        let state = GLOBAL_LOGGING_STATE.get_or_init(|| Mutex::new(None));
        let mut current = state
            .lock()
            .map_err(|_| anyhow!("日志系统状态锁已损坏"))?;

        if let Some(ref existing) = *current {
            return Ok(Self {
                config: existing.clone(),
            });
        }

        Self::init_log_tracer()?;
        Self::init_tracing_subscriber(&config)?;
        *current = Some(config.clone());

        Ok(Self { config })
    }

    /// 当前生效的配置
    pub fn config(&self) -> &LogConfig {
        &self.config
    }

    /// 初始化 LogTracer（log crate 到 tracing 的桥接）
    fn init_log_tracer() -> anyhow::Result<()> {
        use tracing_log::LogTracer;

        static LOG_TRACER_INIT: OnceLock<Result<(), String>> = OnceLock::new();

        let result = LOG_TRACER_INIT.get_or_init(|| LogTracer::init().map_err(|e| e.to_string()));

        result
            .as_ref()
            .map_err(|e| anyhow!("LogTracer初始化失败: {}", e))?;
        Ok(())
    }

    fn make_writer(output: &LogOutput) -> anyhow::Result<BoxMakeWriter> {
        Ok(match output {
            LogOutput::Stdout => BoxMakeWriter::new(std::io::stdout),
            LogOutput::Stderr => BoxMakeWriter::new(std::io::stderr),
            LogOutput::File(path) => {
                if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                    std::fs::create_dir_all(parent)
                        .with_context(|| format!("创建日志目录失败: {}", parent.display()))?;
                }
                let file = OpenOptions::new()
                    .create(true)
                    .append(true)
                    .open(path)
                    .with_context(|| format!("打开日志文件失败: {}", path.display()))?;
                BoxMakeWriter::new(Arc::new(file))
            }
        })
    }

    /// 初始化 tracing subscriber
    fn init_tracing_subscriber(config: &LogConfig) -> anyhow::Result<()> {
        // RUST_LOG 中的指令叠加在配置级别之上
        let env_filter = EnvFilter::from_default_env().add_directive(
            config
                .level
                .as_str()
                .to_lowercase()
                .parse()
                .context("无效的日志级别指令")?,
        );

        let ansi = !matches!(config.output, LogOutput::File(_));
        let fmt_layer = fmt::layer()
            .with_writer(Self::make_writer(&config.output)?)
            .with_timer(ChronoUtc::rfc_3339())
            .with_ansi(ansi)
            .with_target(true);

        let result = match config.format {
            LogFormat::Json => registry().with(env_filter).with(fmt_layer.json()).try_init(),
            LogFormat::Text => registry().with(env_filter).with(fmt_layer).try_init(),
        };

        match result {
            Ok(()) => {
                tracing::info!("日志系统初始化完成");
                tracing::debug!("日志配置: {:?}", config);
                Ok(())
            }
            Err(e) => {
                let error_msg = e.to_string();
                if error_msg.contains("a global default trace dispatcher has already been set") {
                    tracing::debug!("日志系统已经初始化过了");
                    Ok(())
                } else {
                    Err(anyhow!("tracing subscriber初始化失败: {}", error_msg))
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_log_config_from_global() {
        let global = GlobalConfig {
            log_level: "warn".to_string(),
            log_format: "json".to_string(),
            log_output: "/var/log/probe-vitals.log".to_string(),
            ..GlobalConfig::default()
        };

        let config = LogConfig::from_global(&global, None).unwrap();
        assert_eq!(config.level, LevelFilter::Warn);
        assert_eq!(config.format, LogFormat::Json);
        assert_eq!(
            config.output,
            LogOutput::File(PathBuf::from("/var/log/probe-vitals.log"))
        );

        let config = LogConfig::from_global(&global, Some("debug")).unwrap();
        assert_eq!(config.level, LevelFilter::Debug);
    }

    #[test]
    fn test_log_config_rejects_unknown_values() {
        let global = GlobalConfig {
            log_level: "loud".to_string(),
            ..GlobalConfig::default()
        };
        assert!(LogConfig::from_global(&global, None).is_err());

        let global = GlobalConfig {
            log_format: "xml".to_string(),
            ..GlobalConfig::default()
        };
        assert!(LogConfig::from_global(&global, None).is_err());
    }

    #[test]
    fn test_log_output_parsing() {
        assert_eq!(LogOutput::from("stdout"), LogOutput::Stdout);
        assert_eq!(LogOutput::from("stderr"), LogOutput::Stderr);
        assert_eq!(
            LogOutput::from("logs/app.log"),
            LogOutput::File(PathBuf::from("logs/app.log"))
        );
    }

    #[test]
    fn test_setup_logging_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let config = LogConfig {
            output: LogOutput::File(dir.path().join("nested").join("app.log")),
            ..LogConfig::default()
        };

        let first = LoggingSystem::setup_logging(config.clone()).unwrap();
        let second = LoggingSystem::setup_logging(LogConfig {
            level: LevelFilter::Trace,
            ..config
        })
        .unwrap();
        assert_eq!(first.config(), second.config());
    }
}
