//! 消息类型常量

/// 确认报文 (ACK/NACK/拒绝/忙)
pub const ACKNOWLEDGMENT: u32 = 0xE800;

/// 请求报文
pub const REQUEST: u32 = 0xEA00;

/// 地址声明
pub const ADDRESS_CLAIM: u32 = 0xEE00;

/// DM1 - 当前激活故障码
pub const DM1: u32 = 0xFECA;

/// DM2 - 历史故障码
pub const DM2: u32 = 0xFECB;

/// DM5 - 诊断就绪状态
pub const DM5: u32 = 0xFECE;

/// DM6 - 待定故障码
pub const DM6: u32 = 0xFECF;

/// DM12 - 排放相关的激活故障码
pub const DM12: u32 = 0xFED4;

/// DM20 - 监控器性能比
pub const DM20: u32 = 0xC200;

/// DM21 - 故障灯点亮后的距离与时间
pub const DM21: u32 = 0xC100;

/// DM23 - 排放相关的已清除故障码
pub const DM23: u32 = 0xFDB5;

/// DM26 - 本次驾驶循环的就绪状态
pub const DM26: u32 = 0xFDB8;

/// DM28 - 永久故障码
pub const DM28: u32 = 0xFD80;

/// 组件识别
pub const COMPONENT_ID: u32 = 0xFEEB;

/// 发动机转速等运行参数 (EEC1)
pub const ENGINE_SPEED: u32 = 0xF004;

/// 消息类型的简短名称
pub fn name(pgn: u32) -> &'static str {
    match pgn {
        ACKNOWLEDGMENT => "Acknowledgment",
        REQUEST => "Request",
        ADDRESS_CLAIM => "Address Claim",
        DM1 => "DM1",
        DM2 => "DM2",
        DM5 => "DM5",
        DM6 => "DM6",
        DM12 => "DM12",
        DM20 => "DM20",
        DM21 => "DM21",
        DM23 => "DM23",
        DM26 => "DM26",
        DM28 => "DM28",
        COMPONENT_ID => "Component Identification",
        ENGINE_SPEED => "EEC1",
        _ => "Unknown",
    }
}
