//! VCT 协议层
//!
//! 诊断消息类型 (PGN) 常量、确认报文与故障码报文的解码。
//! 只覆盖执行引擎和内置步骤需要的部分，完整的报文库由下层提供。

pub mod ack;
pub mod address;
pub mod dtc;
pub mod pgn;

pub use ack::{AckKind, AcknowledgmentPacket};
pub use address::address_name;
pub use dtc::{DiagnosticTroubleCode, DiagnosticTroubleCodePacket, LampStatus};

use thiserror::Error;

/// 协议层错误
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("报文长度不足: PGN {pgn} 需要 {expected} 字节, 实际 {actual} 字节")]
    Truncated {
        pgn: u32,
        expected: usize,
        actual: usize,
    },

    #[error("报文类型不匹配: 期望 PGN {expected}, 实际 PGN {actual}")]
    UnexpectedPgn { expected: u32, actual: u32 },

    #[error("非法的确认控制字节: {0}")]
    InvalidControlByte(u8),
}

pub type Result<T> = std::result::Result<T, ProtocolError>;
