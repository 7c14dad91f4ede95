//! 引擎配置管理
//!
//! 支持从多个源加载配置:
//! - 环境变量 (优先级最高)
//! - 配置文件 (TOML)
//! - 默认值 (优先级最低)
//!
//! 配置文件搜索路径 (按优先级):
//! 1. `VCT_CONFIG` 环境变量指定的路径
//! 2. `./vct.toml` (当前目录)
//! 3. `~/.config/vct/vct.toml` (用户配置目录)
//! 4. `/etc/vct/vct.toml` (系统配置目录)

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use vct_transport::BusConfig;

// ============================================
// 核心配置结构
// ============================================

/// 引擎配置 (顶层)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EngineConfig {
    /// 总线配置
    #[serde(default)]
    pub bus: BusConfig,

    /// 重试配置
    #[serde(default)]
    pub retry: RetryConfig,

    /// 环境等待配置
    #[serde(default)]
    pub wait: WaitConfig,

    /// 车辆信息
    #[serde(default)]
    pub vehicle: VehicleConfig,

    /// 日志配置
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// 有界重试配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// 单阶段最大尝试次数
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// 两次尝试之间的间隔（毫秒）
    #[serde(default = "default_retry_interval_ms")]
    pub interval_ms: u64,
}

/// 环境等待配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WaitConfig {
    /// 钥匙/发动机状态轮询间隔（毫秒）
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// 长时间等待时状态行的输出周期（秒）
    #[serde(default = "default_status_period_secs")]
    pub status_period_secs: u64,
}

/// 车辆配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VehicleConfig {
    /// 受法规约束的 (OBD) ECU 地址
    #[serde(default)]
    pub obd_addresses: Vec<u8>,

    /// 制造商声明的熄火等待时长（秒）
    #[serde(default = "default_key_off_interval_secs")]
    pub key_off_interval_secs: u64,
}

/// 日志配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// 日志级别 (debug/info/warn/error)
    #[serde(default = "default_log_level")]
    pub level: String,
}

// ============================================
// 默认值函数
// ============================================

fn default_max_attempts() -> u32 {
    300
}
fn default_retry_interval_ms() -> u64 {
    1000
}
fn default_poll_interval_ms() -> u64 {
    500
}
fn default_status_period_secs() -> u64 {
    60
}
fn default_key_off_interval_secs() -> u64 {
    60
}
fn default_log_level() -> String {
    "info".to_string()
}

// ============================================
// Default 实现
// ============================================

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            interval_ms: default_retry_interval_ms(),
        }
    }
}

impl Default for WaitConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
            status_period_secs: default_status_period_secs(),
        }
    }
}

impl Default for VehicleConfig {
    fn default() -> Self {
        Self {
            obd_addresses: Vec::new(),
            key_off_interval_secs: default_key_off_interval_secs(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl RetryConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }
}

impl WaitConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn status_period(&self) -> Duration {
        Duration::from_secs(self.status_period_secs)
    }
}

// ============================================
// 配置加载实现
// ============================================

impl EngineConfig {
    /// 从多个源加载配置 (优先级: 环境变量 > 配置文件 > 默认值)
    pub fn load() -> Result<Self> {
        let mut config = if let Some(path) = Self::find_config_file() {
            tracing::debug!("Loading config from: {:?}", path);
            Self::load_from_file(&path)?
        } else {
            tracing::debug!("No config file found, using defaults");
            Self::default()
        };

        config.apply_env_vars()?;
        config.validate()?;

        Ok(config)
    }

    /// 从指定文件加载配置
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;

        Self::from_toml_str(&content)
            .with_context(|| format!("Failed to parse TOML config: {:?}", path))
    }

    /// 从 TOML 字符串解析
    pub fn from_toml_str(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// 导出为 TOML
    pub fn to_toml(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// 查找配置文件 (按优先级搜索)
    fn find_config_file() -> Option<PathBuf> {
        if let Ok(path) = env::var("VCT_CONFIG") {
            let p = PathBuf::from(path);
            if p.exists() {
                return Some(p);
            }
        }

        let local = PathBuf::from("./vct.toml");
        if local.exists() {
            return Some(local);
        }

        if let Some(home) = dirs::home_dir() {
            let user = home.join(".config/vct/vct.toml");
            if user.exists() {
                return Some(user);
            }
        }

        #[cfg(target_os = "linux")]
        {
            let system = PathBuf::from("/etc/vct/vct.toml");
            if system.exists() {
                return Some(system);
            }
        }

        None
    }

    /// 从环境变量覆盖配置
    fn apply_env_vars(&mut self) -> Result<()> {
        if let Ok(level) = env::var("VCT_LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Ok(attempts) = env::var("VCT_RETRY_MAX_ATTEMPTS") {
            self.retry.max_attempts = attempts
                .parse()
                .context("Invalid VCT_RETRY_MAX_ATTEMPTS value")?;
        }
        if let Ok(interval) = env::var("VCT_RETRY_INTERVAL_MS") {
            self.retry.interval_ms = interval
                .parse()
                .context("Invalid VCT_RETRY_INTERVAL_MS value")?;
        }
        if let Ok(addresses) = env::var("VCT_OBD_ADDRESSES") {
            self.vehicle.obd_addresses = parse_address_list(&addresses)?;
        }
        Ok(())
    }

    /// 校验配置
    pub fn validate(&self) -> Result<()> {
        if self.retry.max_attempts == 0 {
            anyhow::bail!("retry.max_attempts must be greater than 0");
        }
        if self.wait.poll_interval_ms == 0 {
            anyhow::bail!("wait.poll_interval_ms must be greater than 0");
        }
        if self.bus.listen_window_ms == 0 {
            anyhow::bail!("bus.listen_window_ms must be greater than 0");
        }
        if self.bus.keep_alive_interval_secs == 0 {
            anyhow::bail!("bus.keep_alive_interval_secs must be greater than 0");
        }
        if self.wait.status_period_secs == 0 {
            anyhow::bail!("wait.status_period_secs must be greater than 0");
        }
        Ok(())
    }
}

/// 解析逗号分隔的地址列表，支持十进制与 0x 前缀的十六进制
fn parse_address_list(text: &str) -> Result<Vec<u8>> {
    text.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            let parsed = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
                Some(hex) => u8::from_str_radix(hex, 16),
                None => s.parse::<u8>(),
            };
            parsed.with_context(|| format!("Invalid ECU address: {}", s))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = EngineConfig::default();
        assert_eq!(config.retry.max_attempts, 300);
        assert_eq!(config.retry.interval(), Duration::from_secs(1));
        assert_eq!(config.wait.poll_interval(), Duration::from_millis(500));
        assert_eq!(config.vehicle.key_off_interval_secs, 60);
        assert_eq!(config.logging.level, "info");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config = EngineConfig::from_toml_str(
            r#"
            [vehicle]
            obd_addresses = [0, 61]

            [retry]
            max_attempts = 5
            "#,
        )
        .unwrap();

        assert_eq!(config.vehicle.obd_addresses, vec![0, 61]);
        assert_eq!(config.vehicle.key_off_interval_secs, 60);
        assert_eq!(config.retry.max_attempts, 5);
        assert_eq!(config.retry.interval_ms, 1000);
        assert_eq!(config.bus.listen_window_ms, 600);
    }

    #[test]
    fn test_toml_roundtrip_keeps_sections() {
        let config = EngineConfig::default();
        let text = config.to_toml().unwrap();
        assert!(text.contains("[retry]"));
        assert!(text.contains("max_attempts = 300"));
    }

    #[test]
    fn test_config_validation() {
        let mut config = EngineConfig::default();
        config.retry.max_attempts = 0;
        assert!(config.validate().is_err());

        let mut config = EngineConfig::default();
        config.wait.poll_interval_ms = 0;
        assert!(config.validate().is_err());

        let mut config = EngineConfig::default();
        config.bus.listen_window_ms = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_zero_background_periods_rejected() {
        let mut config = EngineConfig::default();
        config.bus.keep_alive_interval_secs = 0;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("keep_alive_interval_secs"));

        let mut config = EngineConfig::default();
        config.wait.status_period_secs = 0;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("status_period_secs"));

        let config = EngineConfig::from_toml_str("[bus]\nkeep_alive_interval_secs = 0\n").unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_parse_address_list() {
        assert_eq!(parse_address_list("0, 0x3D,23").unwrap(), vec![0, 61, 23]);
        assert!(parse_address_list("0,300").is_err());
        assert!(parse_address_list("").unwrap().is_empty());
    }
}
