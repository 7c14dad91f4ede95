//! Config 命令处理

use anyhow::{Context, Result};
use std::path::Path;

use vct_executor::EngineConfig;

use crate::ConfigAction;

/// 加载配置：指定了文件时只读该文件，否则按默认搜索路径与环境变量
pub fn load(path: Option<&Path>) -> Result<EngineConfig> {
    match path {
        Some(path) => {
            let config = EngineConfig::load_from_file(path)?;
            config
                .validate()
                .with_context(|| format!("配置文件校验失败: {}", path.display()))?;
            Ok(config)
        }
        None => EngineConfig::load().context("加载配置失败"),
    }
}

pub fn handle(action: ConfigAction, config: &EngineConfig) -> Result<()> {
    match action {
        ConfigAction::Show => show(config),
    }
}

fn show(config: &EngineConfig) -> Result<()> {
    print!("{}", config.to_toml()?);
    Ok(())
}
