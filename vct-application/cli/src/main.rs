//! VCT CLI 应用

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

mod commands;

#[derive(Parser)]
#[command(name = "vct")]
#[command(about = "VCT - 重型车辆诊断总线合规测试", long_about = None)]
#[command(version)]
struct Cli {
    /// 日志级别 (未指定时使用配置文件中的级别)
    #[arg(short, long, global = true)]
    log_level: Option<String>,

    /// 配置文件路径
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// 对模拟总线运行演示流程
    Run {
        /// 输出报告格式 (text/json/yaml)
        #[arg(long, default_value = "text")]
        format: String,
    },

    /// 配置管理
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
pub enum ConfigAction {
    /// 显示生效的配置
    Show,
}

/// 安装日志订阅器，`RUST_LOG` 优先于命令行级别
fn init_logging(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = commands::config::load(cli.config.as_deref())?;
    let level = cli
        .log_level
        .clone()
        .unwrap_or_else(|| config.logging.level.clone());
    init_logging(&level);

    info!("VCT CLI 启动");

    match cli.command {
        Commands::Run { format } => commands::run::handle(config, &format).await?,
        Commands::Config { action } => commands::config::handle(action, &config)?,
    }

    Ok(())
}
