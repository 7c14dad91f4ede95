//! 总线传输抽象接口

use async_trait::async_trait;
use std::time::Duration;

use crate::{Packet, Result, GLOBAL_ADDRESS};

/// 请求目的地
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Destination {
    /// 全局广播，任意数量的 ECU 都可能应答
    Global,

    /// 定向请求 (DS)，只发给一个 ECU
    Specific(u8),
}

impl Destination {
    /// 总线上的目的地址
    pub fn address(&self) -> u8 {
        match self {
            Destination::Global => GLOBAL_ADDRESS,
            Destination::Specific(address) => *address,
        }
    }

    pub fn is_global(&self) -> bool {
        matches!(self, Destination::Global)
    }
}

impl std::fmt::Display for Destination {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Destination::Global => write!(f, "Global"),
            Destination::Specific(address) => write!(f, "DS({})", address),
        }
    }
}

/// 传输 trait
///
/// 实现必须遵守固定的监听窗口：`request` 在窗口结束后返回，
/// 不允许无限期阻塞。未应答的 ECU 只是不出现在结果里。
#[async_trait]
pub trait Transport: Send + Sync {
    /// 发送一次请求，返回监听窗口内收到的全部报文
    async fn request(&self, pgn: u32, destination: Destination) -> Result<Vec<Packet>>;

    /// 发送一条低速率保活报文，维持诊断会话
    async fn send_keep_alive(&self) -> Result<()>;

    /// 每轮请求的监听窗口
    fn listen_window(&self) -> Duration;
}
