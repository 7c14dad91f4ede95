//! 故障码报文解码 (DM1/DM2/DM6/DM12/DM23/DM28 共用布局)
//!
//! 字节 0: 故障灯状态 (MIL 7-6, RSL 5-4, AWL 3-2, PL 1-0)
//! 字节 1: 故障灯闪烁状态 (同样的位布局)
//! 之后每 4 字节一个故障码。

use serde::{Deserialize, Serialize};
use vct_transport::Packet;

use crate::{ProtocolError, Result};

/// 故障灯状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LampStatus {
    Off,
    On,
    SlowFlash,
    FastFlash,
    Other,
    NotSupported,
}

impl LampStatus {
    /// 由状态位与闪烁位组合得到灯状态
    pub fn from_bits(status: u8, flash: u8) -> Self {
        match status & 0x03 {
            0 => LampStatus::Off,
            1 => match flash & 0x03 {
                0 => LampStatus::SlowFlash,
                1 => LampStatus::FastFlash,
                _ => LampStatus::On,
            },
            2 => LampStatus::Other,
            _ => LampStatus::NotSupported,
        }
    }

    /// 编码为 (状态位, 闪烁位)
    pub fn to_bits(&self) -> (u8, u8) {
        match self {
            LampStatus::Off => (0, 3),
            LampStatus::On => (1, 3),
            LampStatus::SlowFlash => (1, 0),
            LampStatus::FastFlash => (1, 1),
            LampStatus::Other => (2, 3),
            LampStatus::NotSupported => (3, 3),
        }
    }

    /// 点亮（含闪烁）
    pub fn is_on(&self) -> bool {
        matches!(
            self,
            LampStatus::On | LampStatus::SlowFlash | LampStatus::FastFlash
        )
    }
}

impl std::fmt::Display for LampStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let text = match self {
            LampStatus::Off => "off",
            LampStatus::On => "on",
            LampStatus::SlowFlash => "slow flash",
            LampStatus::FastFlash => "fast flash",
            LampStatus::Other => "other",
            LampStatus::NotSupported => "not supported",
        };
        f.write_str(text)
    }
}

/// 故障码 (SPN/FMI)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DiagnosticTroubleCode {
    /// 可疑参数编号
    pub spn: u32,

    /// 故障模式标识
    pub fmi: u8,

    /// 发生次数
    pub occurrence_count: u8,
}

impl DiagnosticTroubleCode {
    pub fn new(spn: u32, fmi: u8, occurrence_count: u8) -> Self {
        Self {
            spn,
            fmi,
            occurrence_count,
        }
    }

    fn decode(bytes: &[u8]) -> Option<Self> {
        if bytes.len() < 4 {
            return None;
        }
        // 全 0 或全 FF 表示占位，不是故障码
        if bytes[..4].iter().all(|b| *b == 0x00) || bytes[..4].iter().all(|b| *b == 0xFF) {
            return None;
        }
        let spn = u32::from(bytes[0]) | (u32::from(bytes[1]) << 8) | (u32::from(bytes[2] >> 5) << 16);
        Some(Self {
            spn,
            fmi: bytes[2] & 0x1F,
            occurrence_count: bytes[3] & 0x7F,
        })
    }

    fn encode(&self) -> [u8; 4] {
        [
            (self.spn & 0xFF) as u8,
            ((self.spn >> 8) & 0xFF) as u8,
            ((((self.spn >> 16) & 0x07) as u8) << 5) | (self.fmi & 0x1F),
            self.occurrence_count & 0x7F,
        ]
    }
}

impl std::fmt::Display for DiagnosticTroubleCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "DTC {}:{} - {} times",
            self.spn, self.fmi, self.occurrence_count
        )
    }
}

/// 已解码的故障码报文
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiagnosticTroubleCodePacket {
    pub pgn: u32,
    pub source: u8,
    pub mil_status: LampStatus,
    pub dtcs: Vec<DiagnosticTroubleCode>,
}

impl DiagnosticTroubleCodePacket {
    const HEADER: usize = 2;

    /// 从原始报文解码
    pub fn from_packet(packet: &Packet) -> Result<Self> {
        let (status, flash) = match (packet.get_u8(0), packet.get_u8(1)) {
            (Some(status), Some(flash)) => (status, flash),
            _ => {
                return Err(ProtocolError::Truncated {
                    pgn: packet.pgn,
                    expected: Self::HEADER,
                    actual: packet.len(),
                })
            }
        };

        let dtcs = packet.data[Self::HEADER..]
            .chunks(4)
            .filter_map(DiagnosticTroubleCode::decode)
            .collect();

        Ok(Self {
            pgn: packet.pgn,
            source: packet.source,
            mil_status: LampStatus::from_bits(status >> 6, flash >> 6),
            dtcs,
        })
    }

    /// 构造故障码报文（模拟 ECU 使用）
    pub fn encode(
        pgn: u32,
        source: u8,
        mil_status: LampStatus,
        dtcs: &[DiagnosticTroubleCode],
    ) -> Packet {
        let (status, flash) = mil_status.to_bits();
        // 其余灯位填 0 (熄灭)，闪烁位填 3 (不闪烁)
        let mut data = vec![status << 6, (flash << 6) | 0x3F];
        if dtcs.is_empty() {
            data.extend_from_slice(&[0x00, 0x00, 0x00, 0x00, 0xFF, 0xFF]);
        } else {
            for dtc in dtcs {
                data.extend_from_slice(&dtc.encode());
            }
        }
        Packet::new(pgn, source, data)
    }

    /// 是否存在激活故障码
    pub fn has_dtcs(&self) -> bool {
        !self.dtcs.is_empty()
    }

    /// 内容是否一致（忽略来源）
    pub fn same_content(&self, other: &Self) -> bool {
        self.pgn == other.pgn && self.mil_status == other.mil_status && self.dtcs == other.dtcs
    }
}
