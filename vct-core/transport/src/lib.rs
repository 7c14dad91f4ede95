//! VCT 传输层
//!
//! 负责诊断总线上的请求/响应往返，对上层屏蔽物理帧、仲裁与分包细节。
//! 上层只看到在固定监听窗口内收到的完整报文。

pub mod bus;
pub mod config;
pub mod simulated;

pub use bus::{Destination, Transport};
pub use config::BusConfig;
pub use simulated::{SimRequest, SimulatedBus};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// 全局（广播）目的地址
pub const GLOBAL_ADDRESS: u8 = 0xFF;

/// 传输层错误
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("总线未连接")]
    Disconnected,

    #[error("发送请求失败: {0}")]
    SendFailed(String),

    #[error("总线适配器错误: {0}")]
    AdapterError(String),

    #[error("配置错误: {0}")]
    ConfigError(String),

    #[error("IO 错误: {0}")]
    IoError(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, TransportError>;

/// 总线报文
///
/// 已由底层完成重组的一条完整报文。消息类型即参数组编号 (PGN)。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Packet {
    /// 参数组编号
    pub pgn: u32,

    /// 源地址
    pub source: u8,

    /// 目的地址 (0xFF 表示广播)
    pub destination: u8,

    /// 优先级
    pub priority: u8,

    /// 数据载荷
    pub data: Vec<u8>,
}

impl Packet {
    pub fn new(pgn: u32, source: u8, data: Vec<u8>) -> Self {
        Self {
            pgn,
            source,
            destination: GLOBAL_ADDRESS,
            priority: 6,
            data,
        }
    }

    pub fn with_destination(mut self, destination: u8) -> Self {
        self.destination = destination;
        self
    }

    pub fn with_priority(mut self, priority: u8) -> Self {
        self.priority = priority;
        self
    }

    /// 载荷长度
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// 读取单字节
    pub fn get_u8(&self, index: usize) -> Option<u8> {
        self.data.get(index).copied()
    }

    /// 读取小端 16 位
    pub fn get_u16(&self, index: usize) -> Option<u16> {
        let bytes = self.data.get(index..index + 2)?;
        Some(u16::from_le_bytes([bytes[0], bytes[1]]))
    }

    /// 读取小端 24 位
    pub fn get_u24(&self, index: usize) -> Option<u32> {
        let bytes = self.data.get(index..index + 3)?;
        Some(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], 0]))
    }
}

impl std::fmt::Display for Packet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{:02X}{:04X}{:02X} [{}]",
            self.priority << 2,
            self.pgn & 0xFFFF,
            self.source,
            self.data.len()
        )?;
        for byte in &self.data {
            write!(f, " {:02X}", byte)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_packet_defaults_to_global() {
        let packet = Packet::new(0xFED4, 0x00, vec![1, 2, 3]);
        assert_eq!(packet.destination, GLOBAL_ADDRESS);
        assert_eq!(packet.priority, 6);
        assert_eq!(packet.len(), 3);
    }

    #[test]
    fn test_packet_field_access() {
        let packet = Packet::new(0xE800, 0x17, vec![0x01, 0xFF, 0xFF, 0xFF, 0xF9, 0xD4, 0xFE, 0x00]);
        assert_eq!(packet.get_u8(0), Some(0x01));
        assert_eq!(packet.get_u16(1), Some(0xFFFF));
        assert_eq!(packet.get_u24(5), Some(0x00FED4));
        assert_eq!(packet.get_u24(6), None);
        assert_eq!(packet.get_u8(8), None);
    }

    #[test]
    fn test_packet_display() {
        let packet = Packet::new(0xFED4, 0x00, vec![0x40, 0xFF]);
        let text = packet.to_string();
        assert!(text.ends_with("00 [2] 40 FF"), "unexpected: {}", text);
    }
}
