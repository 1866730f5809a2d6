//! Registry of well-known OBIS codes.
//!
//! The constants cover every code the gateway stack dispatches on:
//! parameter-tree roots, device identification, the operation log profile
//! and the attention codes carried by SML attention responses.

use super::Obis;

/// Well-known OBIS constants.
pub mod codes {
    use super::Obis;

    /// IP-T parameter tree root.
    pub const ROOT_IPT_PARAM: Obis = Obis::new(0x81, 0x49, 0x0D, 0x07, 0x00, 0xFF);
    /// IP-T connection state root.
    pub const ROOT_IPT_STATE: Obis = Obis::new(0x81, 0x49, 0x0D, 0x06, 0x00, 0xFF);
    /// Device identification root.
    pub const ROOT_DEVICE_IDENT: Obis = Obis::new(0x81, 0x81, 0xC7, 0x82, 0x01, 0xFF);
    /// Device class entry below the identification root.
    pub const DEVICE_CLASS: Obis = Obis::new(0x81, 0x81, 0xC7, 0x82, 0x02, 0xFF);
    /// Manufacturer name entry below the identification root.
    pub const DATA_MANUFACTURER: Obis = Obis::new(0x81, 0x81, 0xC7, 0x82, 0x03, 0xFF);
    /// Server id / serial number entry.
    pub const SERIAL_NR: Obis = Obis::new(0x81, 0x81, 0xC7, 0x82, 0x04, 0xFF);
    /// Firmware section below the identification root.
    pub const ROOT_FIRMWARE: Obis = Obis::new(0x81, 0x81, 0xC7, 0x82, 0x05, 0xFF);
    /// Firmware version entry.
    pub const DATA_FIRMWARE_VERSION: Obis = Obis::new(0x81, 0x81, 0xC7, 0x82, 0x08, 0xFF);
    /// Activation state of a firmware section.
    pub const DATA_FIRMWARE_ACTIVE: Obis = Obis::new(0x81, 0x81, 0xC7, 0x82, 0x0E, 0xFF);

    /// Memory usage root (mirror and tmp percentages).
    pub const ROOT_MEMORY_USAGE: Obis = Obis::new(0x00, 0x80, 0x80, 0x00, 0x10, 0xFF);
    /// Mirror partition usage entry.
    pub const MEMORY_USAGE_MIRROR: Obis = Obis::new(0x00, 0x80, 0x80, 0x00, 0x11, 0xFF);
    /// Tmp partition usage entry.
    pub const MEMORY_USAGE_TMP: Obis = Obis::new(0x00, 0x80, 0x80, 0x00, 0x12, 0xFF);

    /// Root of the active device list.
    pub const ROOT_ACTIVE_DEVICES: Obis = Obis::new(0x81, 0x81, 0x11, 0x06, 0x01, 0xFF);
    /// Root of the visible device list.
    pub const ROOT_VISIBLE_DEVICES: Obis = Obis::new(0x81, 0x81, 0x10, 0x06, 0x01, 0xFF);
    /// Access rights root.
    pub const ROOT_ACCESS_RIGHTS: Obis = Obis::new(0x81, 0x81, 0x81, 0x60, 0xFF, 0xFF);
    /// Wireless M-Bus adapter status root.
    pub const ROOT_WMBUS_STATUS: Obis = Obis::new(0x81, 0x06, 0x0F, 0x06, 0x00, 0xFF);
    /// Wireless M-Bus interface configuration root.
    pub const IF_WMBUS: Obis = Obis::new(0x81, 0x06, 0x19, 0x07, 0x00, 0xFF);
    /// Wireless M-Bus protocol selector below [`IF_WMBUS`].
    pub const W_MBUS_PROTOCOL: Obis = Obis::new(0x81, 0x06, 0x19, 0x07, 0x01, 0xFF);
    /// Reboot trigger.
    pub const REBOOT: Obis = Obis::new(0x81, 0x81, 0xC7, 0x83, 0x82, 0x01);

    /// Operation log profile class.
    pub const CLASS_OP_LOG: Obis = Obis::new(0x81, 0x81, 0xC7, 0x89, 0xE1, 0xFF);
    /// Event class entry of an op-log record.
    pub const CLASS_EVENT: Obis = Obis::new(0x81, 0x81, 0xC7, 0x89, 0xE2, 0xFF);
    /// Peer address entry of an op-log record.
    pub const OP_LOG_PEER_ADDRESS: Obis = Obis::new(0x81, 0x81, 0x00, 0x00, 0x00, 0xFF);
    /// Radio field strength entry of an op-log record.
    pub const OP_LOG_FIELD_STRENGTH: Obis = Obis::new(0x81, 0x04, 0x2B, 0x07, 0x00, 0x00);
    /// Cell id entry of an op-log record.
    pub const OP_LOG_CELL: Obis = Obis::new(0x81, 0x04, 0x17, 0x07, 0x00, 0x00);
    /// Area code entry of an op-log record.
    pub const OP_LOG_AREA_CODE: Obis = Obis::new(0x81, 0x04, 0x18, 0x07, 0x00, 0x00);
    /// Network provider entry of an op-log record.
    pub const OP_LOG_PROVIDER: Obis = Obis::new(0x81, 0x04, 0x0D, 0x06, 0x00, 0xFF);
    /// Current UTC timestamp entry.
    pub const CURRENT_UTC: Obis = Obis::new(0x01, 0x00, 0x00, 0x09, 0x0B, 0x00);
    /// Push target name entry.
    pub const PUSH_TARGET: Obis = Obis::new(0x81, 0x47, 0x17, 0x07, 0x00, 0xFF);
    /// Push operations counter entry.
    pub const PUSH_OPERATIONS: Obis = Obis::new(0x81, 0x81, 0xC7, 0x8A, 0x21, 0xFF);
    /// Free-text details entry of an op-log record.
    pub const OP_LOG_DETAILS: Obis = Obis::new(0x81, 0x81, 0xC7, 0x81, 0x23, 0xFF);

    /// Attention: request executed.
    pub const ATTENTION_OK: Obis = Obis::new(0x81, 0x81, 0xC7, 0xC7, 0xFD, 0x00);
    /// Attention: request accepted, execution pending.
    pub const ATTENTION_JOB_IS_RUNNING: Obis = Obis::new(0x81, 0x81, 0xC7, 0xC7, 0xFD, 0x01);
    /// Attention: unspecified error.
    pub const ATTENTION_UNKNOWN_ERROR: Obis = Obis::new(0x81, 0x81, 0xC7, 0xC7, 0xFE, 0x00);
    /// Attention: unknown SML id.
    pub const ATTENTION_UNKNOWN_SML_ID: Obis = Obis::new(0x81, 0x81, 0xC7, 0xC7, 0xFE, 0x01);
    /// Attention: request not authorised.
    pub const ATTENTION_NOT_AUTHORIZED: Obis = Obis::new(0x81, 0x81, 0xC7, 0xC7, 0xFE, 0x02);
    /// Attention: no server id in request.
    pub const ATTENTION_NO_SERVER_ID: Obis = Obis::new(0x81, 0x81, 0xC7, 0xC7, 0xFE, 0x04);
    /// Attention: OBIS code not known to the responder.
    pub const ATTENTION_UNKNOWN_OBIS_CODE: Obis = Obis::new(0x81, 0x81, 0xC7, 0xC7, 0xFE, 0x06);
    /// Attention: value type not supported by the addressed parameter.
    pub const ATTENTION_UNSUPPORTED_DATA_TYPE: Obis = Obis::new(0x81, 0x81, 0xC7, 0xC7, 0xFE, 0x07);

    /// Total active energy register.
    pub const REG_ENERGY_TOTAL: Obis = Obis::new(0x01, 0x00, 0x01, 0x08, 0x00, 0xFF);
    /// Active energy register, tariff 1.
    pub const REG_ENERGY_T1: Obis = Obis::new(0x01, 0x00, 0x01, 0x08, 0x01, 0xFF);
    /// Active energy register, tariff 2.
    pub const REG_ENERGY_T2: Obis = Obis::new(0x01, 0x00, 0x01, 0x08, 0x02, 0xFF);
    /// Instantaneous active power.
    pub const REG_CURRENT_POWER: Obis = Obis::new(0x01, 0x00, 0x10, 0x07, 0x00, 0xFF);
}

/// Human-readable name of a well-known code, if registered.
#[must_use]
pub fn name(code: Obis) -> Option<&'static str> {
    use codes as c;
    Some(match code {
        _ if code == c::ROOT_IPT_PARAM => "ROOT_IPT_PARAM",
        _ if code == c::ROOT_IPT_STATE => "ROOT_IPT_STATE",
        _ if code == c::ROOT_DEVICE_IDENT => "ROOT_DEVICE_IDENT",
        _ if code == c::DEVICE_CLASS => "DEVICE_CLASS",
        _ if code == c::DATA_MANUFACTURER => "DATA_MANUFACTURER",
        _ if code == c::SERIAL_NR => "SERIAL_NR",
        _ if code == c::ROOT_FIRMWARE => "ROOT_FIRMWARE",
        _ if code == c::DATA_FIRMWARE_VERSION => "DATA_FIRMWARE_VERSION",
        _ if code == c::DATA_FIRMWARE_ACTIVE => "DATA_FIRMWARE_ACTIVE",
        _ if code == c::ROOT_MEMORY_USAGE => "ROOT_MEMORY_USAGE",
        _ if code == c::MEMORY_USAGE_MIRROR => "MEMORY_USAGE_MIRROR",
        _ if code == c::MEMORY_USAGE_TMP => "MEMORY_USAGE_TMP",
        _ if code == c::ROOT_ACTIVE_DEVICES => "ROOT_ACTIVE_DEVICES",
        _ if code == c::ROOT_VISIBLE_DEVICES => "ROOT_VISIBLE_DEVICES",
        _ if code == c::ROOT_ACCESS_RIGHTS => "ROOT_ACCESS_RIGHTS",
        _ if code == c::ROOT_WMBUS_STATUS => "ROOT_WMBUS_STATUS",
        _ if code == c::IF_WMBUS => "IF_WMBUS",
        _ if code == c::W_MBUS_PROTOCOL => "W_MBUS_PROTOCOL",
        _ if code == c::REBOOT => "REBOOT",
        _ if code == c::CLASS_OP_LOG => "CLASS_OP_LOG",
        _ if code == c::CLASS_EVENT => "CLASS_EVENT",
        _ if code == c::OP_LOG_PEER_ADDRESS => "OP_LOG_PEER_ADDRESS",
        _ if code == c::OP_LOG_FIELD_STRENGTH => "OP_LOG_FIELD_STRENGTH",
        _ if code == c::OP_LOG_CELL => "OP_LOG_CELL",
        _ if code == c::OP_LOG_AREA_CODE => "OP_LOG_AREA_CODE",
        _ if code == c::OP_LOG_PROVIDER => "OP_LOG_PROVIDER",
        _ if code == c::CURRENT_UTC => "CURRENT_UTC",
        _ if code == c::PUSH_TARGET => "PUSH_TARGET",
        _ if code == c::PUSH_OPERATIONS => "PUSH_OPERATIONS",
        _ if code == c::OP_LOG_DETAILS => "OP_LOG_DETAILS",
        _ if code == c::ATTENTION_OK => "ATTENTION_OK",
        _ if code == c::ATTENTION_JOB_IS_RUNNING => "ATTENTION_JOB_IS_RUNNING",
        _ if code == c::ATTENTION_UNKNOWN_ERROR => "ATTENTION_UNKNOWN_ERROR",
        _ if code == c::ATTENTION_UNKNOWN_SML_ID => "ATTENTION_UNKNOWN_SML_ID",
        _ if code == c::ATTENTION_NOT_AUTHORIZED => "ATTENTION_NOT_AUTHORIZED",
        _ if code == c::ATTENTION_NO_SERVER_ID => "ATTENTION_NO_SERVER_ID",
        _ if code == c::ATTENTION_UNKNOWN_OBIS_CODE => "ATTENTION_UNKNOWN_OBIS_CODE",
        _ if code == c::ATTENTION_UNSUPPORTED_DATA_TYPE => "ATTENTION_UNSUPPORTED_DATA_TYPE",
        _ if code == c::REG_ENERGY_TOTAL => "REG_ENERGY_TOTAL",
        _ if code == c::REG_ENERGY_T1 => "REG_ENERGY_T1",
        _ if code == c::REG_ENERGY_T2 => "REG_ENERGY_T2",
        _ if code == c::REG_CURRENT_POWER => "REG_CURRENT_POWER",
        _ => return None,
    })
}
