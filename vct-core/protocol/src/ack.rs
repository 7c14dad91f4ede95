//! 确认报文解码
//!
//! 布局: 字节 0 控制字节, 字节 1 组功能值, 字节 2-3 保留,
//! 字节 4 被确认的地址, 字节 5-7 被确认的 PGN (小端)。

use serde::{Deserialize, Serialize};
use vct_transport::Packet;

use crate::{pgn, ProtocolError, Result};

/// 确认类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AckKind {
    /// 肯定确认
    Ack,
    /// 否定确认 (不支持)
    Nack,
    /// 拒绝访问
    Denied,
    /// 暂时无法响应
    Busy,
}

impl AckKind {
    pub fn from_control_byte(byte: u8) -> Result<Self> {
        match byte {
            0 => Ok(AckKind::Ack),
            1 => Ok(AckKind::Nack),
            2 => Ok(AckKind::Denied),
            3 => Ok(AckKind::Busy),
            other => Err(ProtocolError::InvalidControlByte(other)),
        }
    }

    pub fn control_byte(&self) -> u8 {
        match self {
            AckKind::Ack => 0,
            AckKind::Nack => 1,
            AckKind::Denied => 2,
            AckKind::Busy => 3,
        }
    }

    /// 全部确认类型
    pub fn all() -> [AckKind; 4] {
        [AckKind::Ack, AckKind::Nack, AckKind::Denied, AckKind::Busy]
    }
}

impl std::fmt::Display for AckKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let text = match self {
            AckKind::Ack => "ACK",
            AckKind::Nack => "NACK",
            AckKind::Denied => "DENIED",
            AckKind::Busy => "BUSY",
        };
        f.write_str(text)
    }
}

/// 已解码的确认报文
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AcknowledgmentPacket {
    /// 发出确认的 ECU
    pub source: u8,

    /// 确认类型
    pub kind: AckKind,

    /// 组功能值
    pub group_function: u8,

    /// 被确认的地址
    pub address: u8,

    /// 被确认的消息类型
    pub acknowledged_pgn: u32,
}

impl AcknowledgmentPacket {
    const LENGTH: usize = 8;

    /// 从原始报文解码
    pub fn from_packet(packet: &Packet) -> Result<Self> {
        if packet.pgn != pgn::ACKNOWLEDGMENT {
            return Err(ProtocolError::UnexpectedPgn {
                expected: pgn::ACKNOWLEDGMENT,
                actual: packet.pgn,
            });
        }
        if packet.len() < Self::LENGTH {
            return Err(ProtocolError::Truncated {
                pgn: packet.pgn,
                expected: Self::LENGTH,
                actual: packet.len(),
            });
        }

        let truncated = || ProtocolError::Truncated {
            pgn: packet.pgn,
            expected: Self::LENGTH,
            actual: packet.len(),
        };

        Ok(Self {
            source: packet.source,
            kind: AckKind::from_control_byte(packet.get_u8(0).ok_or_else(truncated)?)?,
            group_function: packet.get_u8(1).ok_or_else(truncated)?,
            address: packet.get_u8(4).ok_or_else(truncated)?,
            acknowledged_pgn: packet.get_u24(5).ok_or_else(truncated)?,
        })
    }

    /// 构造确认报文（模拟 ECU 使用）
    pub fn encode(source: u8, kind: AckKind, acknowledged_pgn: u32, address: u8) -> Packet {
        let pgn_bytes = acknowledged_pgn.to_le_bytes();
        Packet::new(
            pgn::ACKNOWLEDGMENT,
            source,
            vec![
                kind.control_byte(),
                0xFF,
                0xFF,
                0xFF,
                address,
                pgn_bytes[0],
                pgn_bytes[1],
                pgn_bytes[2],
            ],
        )
        .with_destination(address)
    }
}

impl std::fmt::Display for AcknowledgmentPacket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} from {} for PGN {}",
            self.kind, self.source, self.acknowledged_pgn
        )
    }
}
