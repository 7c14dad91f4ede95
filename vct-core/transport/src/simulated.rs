//! 模拟总线
//!
//! 按消息类型注册应答脚本，记录收到的每一次请求。
//! 用于测试与命令行演示，监听窗口不消耗真实时间。

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, RwLock};
use std::time::Duration;
use tracing::debug;

use crate::{BusConfig, Destination, Packet, Result, Transport, TransportError};

/// 模拟总线收到的一次请求
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SimRequest {
    /// 请求的消息类型
    pub pgn: u32,

    /// 目的地
    pub destination: Destination,

    /// 同一 (消息类型, 目的地) 的第几次请求，从 1 开始
    pub round: usize,
}

type Responder = Box<dyn Fn(&SimRequest) -> Vec<Packet> + Send + Sync>;

/// 模拟总线
pub struct SimulatedBus {
    config: BusConfig,
    responders: RwLock<HashMap<u32, Responder>>,
    history: Mutex<Vec<SimRequest>>,
    keep_alives: AtomicUsize,
    connected: AtomicBool,
}

impl SimulatedBus {
    pub fn new() -> Self {
        Self::with_config(BusConfig::default())
    }

    pub fn with_config(config: BusConfig) -> Self {
        Self {
            config,
            responders: RwLock::new(HashMap::new()),
            history: Mutex::new(Vec::new()),
            keep_alives: AtomicUsize::new(0),
            connected: AtomicBool::new(true),
        }
    }

    /// 为某个消息类型注册应答脚本（覆盖已有脚本）
    pub fn respond<F>(&self, pgn: u32, responder: F)
    where
        F: Fn(&SimRequest) -> Vec<Packet> + Send + Sync + 'static,
    {
        self.responders
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(pgn, Box::new(responder));
    }

    /// 收到的全部请求（按时间顺序）
    pub fn requests(&self) -> Vec<SimRequest> {
        self.history
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// 某消息类型发往某目的地的请求次数
    pub fn request_count(&self, pgn: u32, destination: Destination) -> usize {
        self.history
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .filter(|r| r.pgn == pgn && r.destination == destination)
            .count()
    }

    /// 已发送的保活报文数
    pub fn keep_alive_count(&self) -> usize {
        self.keep_alives.load(Ordering::SeqCst)
    }

    /// 模拟适配器掉线，之后的请求全部失败
    pub fn disconnect(&self) {
        self.connected.store(false, Ordering::SeqCst);
    }

    fn ensure_connected(&self) -> Result<()> {
        if self.connected.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(TransportError::Disconnected)
        }
    }
}

impl Default for SimulatedBus {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Transport for SimulatedBus {
    async fn request(&self, pgn: u32, destination: Destination) -> Result<Vec<Packet>> {
        self.ensure_connected()?;

        let request = {
            let mut history = self.history.lock().unwrap_or_else(|e| e.into_inner());
            let round = history
                .iter()
                .filter(|r| r.pgn == pgn && r.destination == destination)
                .count()
                + 1;
            let request = SimRequest {
                pgn,
                destination,
                round,
            };
            history.push(request);
            request
        };

        let packets = self
            .responders
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(&pgn)
            .map(|responder| responder(&request))
            .unwrap_or_default();

        debug!(
            "模拟总线: PGN {} -> {} 第 {} 次, 应答 {} 条",
            pgn,
            destination,
            request.round,
            packets.len()
        );

        Ok(packets)
    }

    async fn send_keep_alive(&self) -> Result<()> {
        self.ensure_connected()?;
        self.keep_alives.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn listen_window(&self) -> Duration {
        self.config.listen_window()
    }
}
