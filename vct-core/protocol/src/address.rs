//! 常用源地址名称

/// ECU 地址的显示名称，例如 `Engine #1 (0)`
pub fn address_name(address: u8) -> String {
    let name = match address {
        0x00 => "Engine #1",
        0x01 => "Engine #2",
        0x03 => "Transmission #1",
        0x0B => "Brakes - System Controller",
        0x0F => "Retarder, Engine",
        0x11 => "Cruise Control",
        0x17 => "Instrument Cluster #1",
        0x21 => "Body Controller",
        0x3D => "Exhaust Emission Controller",
        0x55 => "Engine Valve Controller",
        0xF9 => "Off Board Diagnostic-Service Tool #1",
        0xFA => "Off Board Diagnostic-Service Tool #2",
        0xFE => "Null Address",
        0xFF => "Global",
        _ => "Unknown",
    };
    format!("{} ({})", name, address)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_address_name() {
        assert_eq!(address_name(0), "Engine #1 (0)");
        assert_eq!(address_name(0x3D), "Exhaust Emission Controller (61)");
        assert_eq!(address_name(0x80), "Unknown (128)");
    }
}
