//! 总线配置

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// 总线配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BusConfig {
    /// 每轮请求的监听窗口（毫秒）
    #[serde(default = "default_listen_window_ms")]
    pub listen_window_ms: u64,

    /// 保活报文间隔（秒）
    #[serde(default = "default_keep_alive_interval_secs")]
    pub keep_alive_interval_secs: u64,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            listen_window_ms: default_listen_window_ms(),
            keep_alive_interval_secs: default_keep_alive_interval_secs(),
        }
    }
}

impl BusConfig {
    pub fn listen_window(&self) -> Duration {
        Duration::from_millis(self.listen_window_ms)
    }

    pub fn keep_alive_interval(&self) -> Duration {
        Duration::from_secs(self.keep_alive_interval_secs)
    }
}

// 默认值函数
fn default_listen_window_ms() -> u64 {
    600
}

fn default_keep_alive_interval_secs() -> u64 {
    1
}
