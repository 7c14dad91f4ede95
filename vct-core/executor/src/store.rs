//! 跨部分数据存储
//!
//! 按 (消息类型, ECU 地址, 部分编号) 保存最近一次的报文，供后续部分比对
//! "第 K 部分记录的值"。同一键的后写覆盖前写，不同部分的写入互不影响。
//! 存储随运行创建、随运行丢弃，只由当前执行的步骤访问，因此不需要加锁。

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use tracing::debug;

use vct_transport::Packet;

use crate::config::VehicleConfig;

/// 存储键
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct PacketKey {
    pgn: u32,
    address: u8,
    part: u8,
}

/// 监控项标识 (SPN + FMI)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TestIdentifier {
    pub spn: u32,
    pub fmi: u8,
}

/// 单个 ECU 的记录
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EcuRecord {
    /// 源地址
    pub address: u8,

    /// 是否为受法规约束的 OBD ECU
    pub obd_module: bool,

    /// 首次观察到该地址的部分；0 表示运行开始前由车辆信息建立
    pub first_seen_part: u8,

    /// 点火循环计数
    pub ignition_cycle_counter: Option<u32>,

    /// 已满足监控条件的次数
    pub monitoring_conditions_encountered: Option<u32>,

    /// 尚未初始化的测试
    pub non_initialized_tests: Vec<TestIdentifier>,
}

impl EcuRecord {
    fn new(address: u8, obd_module: bool, first_seen_part: u8) -> Self {
        Self {
            address,
            obd_module,
            first_seen_part,
            ignition_cycle_counter: None,
            monitoring_conditions_encountered: None,
            non_initialized_tests: Vec::new(),
        }
    }
}

/// 车辆信息
///
/// 提供本次运行中被视为 OBD ECU 的地址集合等制造商声明数据。
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VehicleInformation {
    pub obd_addresses: BTreeSet<u8>,
    pub key_off_interval_secs: u64,
}

impl VehicleInformation {
    pub fn new(obd_addresses: impl IntoIterator<Item = u8>) -> Self {
        Self {
            obd_addresses: obd_addresses.into_iter().collect(),
            key_off_interval_secs: 60,
        }
    }

    pub fn with_key_off_interval(mut self, secs: u64) -> Self {
        self.key_off_interval_secs = secs;
        self
    }
}

impl From<&VehicleConfig> for VehicleInformation {
    fn from(config: &VehicleConfig) -> Self {
        Self::new(config.obd_addresses.iter().copied())
            .with_key_off_interval(config.key_off_interval_secs)
    }
}

/// 数据仓库
#[derive(Debug, Default)]
pub struct DataRepository {
    packets: HashMap<PacketKey, Packet>,
    ecus: BTreeMap<u8, EcuRecord>,
    vehicle: VehicleInformation,
}

impl DataRepository {
    pub fn new(vehicle: VehicleInformation) -> Self {
        let mut repository = Self {
            packets: HashMap::new(),
            ecus: BTreeMap::new(),
            vehicle,
        };
        repository.seed_obd_modules();
        repository
    }

    fn seed_obd_modules(&mut self) {
        let addresses: Vec<u8> = self.vehicle.obd_addresses.iter().copied().collect();
        for address in addresses {
            self.ecus
                .entry(address)
                .or_insert_with(|| EcuRecord::new(address, true, 0));
        }
    }

    /// 保存报文，覆盖同一 (消息类型, 地址, 部分) 的旧值
    pub fn save(&mut self, packet: Packet, part: u8) {
        self.ecu_mut(packet.source, part);
        let key = PacketKey {
            pgn: packet.pgn,
            address: packet.source,
            part,
        };
        debug!(
            "保存报文: PGN {} 来自 {} (Part {})",
            packet.pgn, packet.source, part
        );
        self.packets.insert(key, packet);
    }

    /// 查询第 `part` 部分记录的报文；未记录返回 `None`
    pub fn get(&self, pgn: u32, address: u8, part: u8) -> Option<&Packet> {
        self.packets.get(&PacketKey { pgn, address, part })
    }

    /// 某部分记录了该消息类型的全部地址
    pub fn addresses_with(&self, pgn: u32, part: u8) -> BTreeSet<u8> {
        self.packets
            .keys()
            .filter(|k| k.pgn == pgn && k.part == part)
            .map(|k| k.address)
            .collect()
    }

    /// 记录一次观察到的报文来源，首次出现时创建 ECU 记录
    pub fn observe(&mut self, packet: &Packet, part: u8) {
        self.ecu_mut(packet.source, part);
    }

    /// 获取可变的 ECU 记录，首次访问时以 `part` 作为首次出现的部分创建
    pub fn get_ecu(&mut self, address: u8, part: u8) -> &mut EcuRecord {
        self.ecu_mut(address, part)
    }

    fn ecu_mut(&mut self, address: u8, part: u8) -> &mut EcuRecord {
        let obd = self.vehicle.obd_addresses.contains(&address);
        self.ecus
            .entry(address)
            .or_insert_with(|| EcuRecord::new(address, obd, part))
    }

    /// 只读查询 ECU 记录
    pub fn ecu(&self, address: u8) -> Option<&EcuRecord> {
        self.ecus.get(&address)
    }

    /// 已知的全部 ECU 地址
    pub fn ecu_addresses(&self) -> BTreeSet<u8> {
        self.ecus.keys().copied().collect()
    }

    /// OBD ECU 地址集合（车辆信息 + 运行中标记为 OBD 的记录）
    pub fn obd_module_addresses(&self) -> BTreeSet<u8> {
        self.ecus
            .values()
            .filter(|ecu| ecu.obd_module)
            .map(|ecu| ecu.address)
            .chain(self.vehicle.obd_addresses.iter().copied())
            .collect()
    }

    pub fn is_obd_module(&self, address: u8) -> bool {
        self.ecus
            .get(&address)
            .map(|ecu| ecu.obd_module)
            .unwrap_or_else(|| self.vehicle.obd_addresses.contains(&address))
    }

    pub fn vehicle(&self) -> &VehicleInformation {
        &self.vehicle
    }

    /// 已保存的报文数
    pub fn len(&self) -> usize {
        self.packets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.packets.is_empty()
    }

    /// 清空全部数据，重新按车辆信息建立 OBD 记录
    pub fn reset(&mut self) {
        self.packets.clear();
        self.ecus.clear();
        self.seed_obd_modules();
    }
}
