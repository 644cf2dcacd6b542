//! Probe Vitals 主程序入口
//!
//! HTTP 端点持续探测与告警工具

use anyhow::{Context, Result};
use clap::Parser;
use probe_vitals::cli::args::{Args, Commands};
use probe_vitals::cli::commands::{
    print_version, CheckCommand, Command, StartCommand, ValidateCommand,
};
use probe_vitals::config::{ConfigLoader, TomlConfigLoader};
use probe_vitals::logging::{LogConfig, LoggingSystem};
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<()> {
    // 解析命令行参数
    let args = Args::parse();

    if let Commands::Version { format } = &args.command {
        print_version(format)?;
        return Ok(());
    }

    // 配置错误在任何探测开始前终止进程
    let config_path = args.get_config_path();
    let loader = TomlConfigLoader::new(true);
    let config = match loader.load_from_file(&config_path).await {
        Ok(config) => config,
        Err(e) => {
            eprintln!("加载配置文件失败 {}: {}", config_path.display(), e);
            std::process::exit(1);
        }
    };

    // 初始化日志系统
    let log_config = LogConfig::from_global(&config.global, args.log_level_override())
        .context("解析日志配置失败")?;
    let _logging_system = LoggingSystem::setup_logging(log_config).context("初始化日志系统失败")?;

    info!("{} v{} 启动", probe_vitals::APP_NAME, probe_vitals::VERSION);

    let command: Box<dyn Command> = match &args.command {
        Commands::Start { .. } => Box::new(StartCommand),
        Commands::Validate { .. } => Box::new(ValidateCommand),
        Commands::Check { .. } => Box::new(CheckCommand),
        Commands::Version { .. } => return Ok(()),
    };

    if let Err(e) = command.execute(&args, config).await {
        error!("命令执行失败: {}", e);
        eprintln!("命令执行失败: {e}");
        std::process::exit(1);
    }

    Ok(())
}
