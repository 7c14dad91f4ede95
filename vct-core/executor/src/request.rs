//! 请求与应答分类
//!
//! 传输层只返回监听窗口内听到的原始报文，这里把它们划分为数据报文与确认报文：
//!
//! - PGN 等于请求的 PGN：数据
//! - 确认报文且被确认的 PGN 等于请求的 PGN：确认
//! - 其余报文忽略
//!
//! 同一轮中同一地址既有数据又有确认时保留数据、丢弃确认，
//! 因此一个请求结果永远不会把同一地址同时列为"数据"和"确认"。

use std::collections::BTreeSet;
use tracing::{debug, warn};

use vct_protocol::{address_name, pgn, AckKind, AcknowledgmentPacket};
use vct_transport::{Destination, Packet};

use crate::outcome::Finding;
use crate::{Result, Session};

/// 全局请求的结果
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GlobalResult {
    /// 请求的消息类型
    pub pgn: u32,

    /// 数据报文，每个应答地址一条
    pub packets: Vec<Packet>,

    /// 明确拒绝的 ECU 发来的确认
    pub acks: Vec<AcknowledgmentPacket>,
}

impl GlobalResult {
    pub fn data_addresses(&self) -> BTreeSet<u8> {
        self.packets.iter().map(|p| p.source).collect()
    }

    pub fn ack_addresses(&self) -> BTreeSet<u8> {
        self.acks.iter().map(|a| a.source).collect()
    }

    /// 某地址的数据报文
    pub fn packet_from(&self, address: u8) -> Option<&Packet> {
        self.packets.iter().find(|p| p.source == address)
    }

    pub fn is_empty(&self) -> bool {
        self.packets.is_empty() && self.acks.is_empty()
    }
}

/// 定向请求的结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DsResult {
    Data(Packet),
    Ack(AcknowledgmentPacket),
    /// 监听窗口内没有应答
    NoResponse,
}

impl DsResult {
    pub fn packet(&self) -> Option<&Packet> {
        match self {
            DsResult::Data(packet) => Some(packet),
            _ => None,
        }
    }

    pub fn ack(&self) -> Option<&AcknowledgmentPacket> {
        match self {
            DsResult::Ack(ack) => Some(ack),
            _ => None,
        }
    }

    /// 是否为 `kinds` 中的某种确认
    pub fn is_ack_of(&self, kinds: &[AckKind]) -> bool {
        self.ack().map(|a| kinds.contains(&a.kind)).unwrap_or(false)
    }

    pub fn is_no_response(&self) -> bool {
        matches!(self, DsResult::NoResponse)
    }
}

impl std::fmt::Display for DsResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DsResult::Data(packet) => write!(f, "{}", packet),
            DsResult::Ack(ack) => write!(f, "{}", ack),
            DsResult::NoResponse => write!(f, "Timeout - No Response"),
        }
    }
}

/// 把一轮内听到的原始报文分类
pub(crate) fn classify(requested: u32, raw: Vec<Packet>) -> GlobalResult {
    let mut packets: Vec<Packet> = Vec::new();
    let mut acks: Vec<AcknowledgmentPacket> = Vec::new();

    for packet in raw {
        if packet.pgn == requested {
            if packets.iter().any(|p| p.source == packet.source) {
                debug!("忽略来自 {} 的重复数据报文", packet.source);
                continue;
            }
            packets.push(packet);
        } else if packet.pgn == pgn::ACKNOWLEDGMENT {
            match AcknowledgmentPacket::from_packet(&packet) {
                Ok(ack) if ack.acknowledged_pgn == requested => {
                    if !acks.iter().any(|a| a.source == ack.source) {
                        acks.push(ack);
                    }
                }
                Ok(ack) => debug!("忽略针对其他 PGN 的确认: {}", ack),
                Err(e) => warn!("无法解码来自 {} 的确认报文: {}", packet.source, e),
            }
        } else {
            debug!("忽略无关报文: PGN {} 来自 {}", packet.pgn, packet.source);
        }
    }

    acks.retain(|ack| {
        let has_data = packets.iter().any(|p| p.source == ack.source);
        if has_data {
            warn!(
                "{} 同时返回了数据和 {}，丢弃确认",
                address_name(ack.source),
                ack.kind
            );
        }
        !has_data
    });

    GlobalResult {
        pgn: requested,
        packets,
        acks,
    }
}

/// 定向请求只考虑被寻址 ECU 的报文
pub(crate) fn classify_ds(requested: u32, address: u8, raw: Vec<Packet>) -> DsResult {
    let from_target: Vec<Packet> = raw.into_iter().filter(|p| p.source == address).collect();
    let mut result = classify(requested, from_target);

    if !result.packets.is_empty() {
        DsResult::Data(result.packets.swap_remove(0))
    } else if !result.acks.is_empty() {
        DsResult::Ack(result.acks.swap_remove(0))
    } else {
        DsResult::NoResponse
    }
}

/// 确认完整性检查
///
/// `expected` 中既没有返回数据、也没有返回确认的每个地址产生一条 FAIL。
pub fn check_nack_completeness(
    expected: &BTreeSet<u8>,
    data: &BTreeSet<u8>,
    acks: &BTreeSet<u8>,
    rule_id: &str,
) -> Vec<Finding> {
    expected
        .iter()
        .filter(|address| !data.contains(address) && !acks.contains(address))
        .map(|&address| {
            Finding::fail(
                rule_id,
                format!(
                    "OBD ECU {} did not provide a response to Global query and did not provide a NACK for the DS query",
                    address_name(address)
                ),
            )
        })
        .collect()
}

/// 定向请求结果中返回数据的地址
pub fn ds_data_addresses(results: &[(u8, DsResult)]) -> BTreeSet<u8> {
    results
        .iter()
        .filter(|(_, r)| r.packet().is_some())
        .map(|(address, _)| *address)
        .collect()
}

/// 定向请求结果中返回了 `kinds` 之一的地址
pub fn ds_ack_addresses(results: &[(u8, DsResult)], kinds: &[AckKind]) -> BTreeSet<u8> {
    results
        .iter()
        .filter(|(_, r)| r.is_ack_of(kinds))
        .map(|(address, _)| *address)
        .collect()
}

impl Session {
    /// 全局请求
    pub async fn request_global(&mut self, pgn: u32) -> Result<GlobalResult> {
        debug!("全局请求 {}", pgn::name(pgn));
        let raw = self
            .until_cancelled(self.transport.request(pgn, Destination::Global))
            .await??;

        let result = classify(pgn, raw);
        debug!(
            "{}: {} 条数据, {} 条确认",
            pgn::name(pgn),
            result.packets.len(),
            result.acks.len()
        );

        let part = self.part();
        for packet in &result.packets {
            self.repository_mut().observe(packet, part);
        }
        Ok(result)
    }

    /// 定向请求
    pub async fn request_ds(&mut self, pgn: u32, address: u8) -> Result<DsResult> {
        debug!("定向请求 {} -> {}", pgn::name(pgn), address_name(address));
        let raw = self
            .until_cancelled(self.transport.request(pgn, Destination::Specific(address)))
            .await??;

        let result = classify_ds(pgn, address, raw);
        debug!("{} 应答: {}", address_name(address), result);

        if let DsResult::Data(packet) = &result {
            let part = self.part();
            self.repository_mut().observe(packet, part);
        }
        Ok(result)
    }

    /// 依次向每个地址发定向请求
    pub async fn request_ds_each(
        &mut self,
        pgn: u32,
        addresses: &[u8],
    ) -> Result<Vec<(u8, DsResult)>> {
        let mut results = Vec::with_capacity(addresses.len());
        for &address in addresses {
            let result = self.request_ds(pgn, address).await?;
            results.push((address, result));
        }
        Ok(results)
    }
}
