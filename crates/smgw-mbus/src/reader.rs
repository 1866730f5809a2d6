//! DIF/VIF data record reader.
//!
//! Walks the record structure of a clear M-Bus payload: DIF with its
//! DIFE chain (data field code, function field, storage and tariff
//! bits), VIF with its VIFE chain (measurand, unit, decimal scaler),
//! then the value bytes. Integers and floats are little-endian; BCD is
//! packed least significant byte first; variable-length strings arrive
//! reversed.

use chrono::{NaiveDate, NaiveDateTime};
use smgw_proto::obis::{Obis, codes};

use crate::bcd::bcd_to_n;
use crate::time::{type_f_datetime, type_g_date};
use crate::unit::Unit;
use crate::MbusError;

/// Fill byte padding encrypted payloads.
const FILL: u8 = 0x2F;

/// Data field code of a DIF byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataFieldCode {
    /// No data.
    None,
    /// 8-bit integer.
    Int8,
    /// 16-bit integer.
    Int16,
    /// 24-bit integer.
    Int24,
    /// 32-bit integer.
    Int32,
    /// 32-bit IEEE float.
    Real32,
    /// 48-bit integer.
    Int48,
    /// 64-bit integer.
    Int64,
    /// Selection for readout.
    Selection,
    /// 2-digit packed BCD.
    Bcd2,
    /// 4-digit packed BCD.
    Bcd4,
    /// 6-digit packed BCD.
    Bcd6,
    /// 8-digit packed BCD.
    Bcd8,
    /// Variable length.
    Variable,
    /// 12-digit packed BCD.
    Bcd12,
    /// Manufacturer specific.
    Special,
}

impl DataFieldCode {
    fn from_nibble(nibble: u8) -> Self {
        match nibble {
            0x1 => Self::Int8,
            0x2 => Self::Int16,
            0x3 => Self::Int24,
            0x4 => Self::Int32,
            0x5 => Self::Real32,
            0x6 => Self::Int48,
            0x7 => Self::Int64,
            0x8 => Self::Selection,
            0x9 => Self::Bcd2,
            0xA => Self::Bcd4,
            0xB => Self::Bcd6,
            0xC => Self::Bcd8,
            0xD => Self::Variable,
            0xE => Self::Bcd12,
            0xF => Self::Special,
            _ => Self::None,
        }
    }

    /// Fixed data size, `None` for variable-length records.
    fn size(self) -> Option<usize> {
        Some(match self {
            Self::None | Self::Selection | Self::Special => 0,
            Self::Int8 | Self::Bcd2 => 1,
            Self::Int16 | Self::Bcd4 => 2,
            Self::Int24 | Self::Bcd6 => 3,
            Self::Int32 | Self::Real32 | Self::Bcd8 => 4,
            Self::Int48 | Self::Bcd12 => 6,
            Self::Int64 => 8,
            Self::Variable => return None,
        })
    }
}

/// Function field of a DIF byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FunctionField {
    /// Instantaneous value.
    Instant,
    /// Maximum value.
    Max,
    /// Minimum value.
    Min,
    /// Value during error state.
    Error,
}

/// Decoded DIF byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Dif(u8);

impl Dif {
    /// Wrap a raw DIF byte.
    #[must_use]
    pub const fn new(byte: u8) -> Self {
        Self(byte)
    }

    /// Data field code.
    #[must_use]
    pub fn data_field_code(self) -> DataFieldCode {
        DataFieldCode::from_nibble(self.0 & 0x0F)
    }

    /// Function field code.
    #[must_use]
    pub fn function_field(self) -> FunctionField {
        match (self.0 >> 4) & 0x03 {
            0 => FunctionField::Instant,
            1 => FunctionField::Max,
            2 => FunctionField::Min,
            _ => FunctionField::Error,
        }
    }

    /// Storage bit (LSB of the storage number).
    #[must_use]
    pub fn is_storage(self) -> bool {
        self.0 & 0x40 != 0
    }

    /// Extension bit: DIFE bytes follow.
    #[must_use]
    pub fn is_extended(self) -> bool {
        self.0 & 0x80 != 0
    }
}

/// Measurand classified from the VIF chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Measurand {
    Energy,
    Volume,
    Mass,
    OnTime,
    OperatingTime,
    Power,
    VolumeFlow,
    MassFlow,
    FlowTemperature,
    ReturnTemperature,
    TemperatureDifference,
    ExternalTemperature,
    Pressure,
    Date,
    DateTime,
    HcaUnits,
    AveragingDuration,
    ActualityDuration,
    FabricationNo,
    ErrorFlags,
    PlainText,
    Unknown,
}

/// VIF classification: measurand, unit, decimal scaler, validity.
#[derive(Debug, Clone, Copy)]
struct VifInfo {
    measurand: Measurand,
    unit: Unit,
    scaler: i8,
    valid: bool,
}

impl VifInfo {
    fn unknown() -> Self {
        Self { measurand: Measurand::Unknown, unit: Unit::Undefined, scaler: 0, valid: false }
    }
}

/// Classify a primary-table VIF (extension bit already stripped).
fn classify_primary(vif: u8) -> VifInfo {
    let n = i8::try_from(vif & 0x07).unwrap_or(0);
    let nn = i8::try_from(vif & 0x03).unwrap_or(0);
    let ok = |measurand, unit, scaler| VifInfo { measurand, unit, scaler, valid: true };
    match vif {
        0x00..=0x07 => ok(Measurand::Energy, Unit::WattHour, n - 3),
        0x08..=0x0F => ok(Measurand::Energy, Unit::Joule, n),
        0x10..=0x17 => ok(Measurand::Volume, Unit::CubicMetre, n - 6),
        0x18..=0x1F => ok(Measurand::Mass, Unit::Kilogram, n - 3),
        0x20..=0x23 => ok(Measurand::OnTime, duration_unit(nn), 0),
        0x24..=0x27 => ok(Measurand::OperatingTime, duration_unit(nn), 0),
        0x28..=0x2F => ok(Measurand::Power, Unit::Watt, n - 3),
        0x30..=0x37 => ok(Measurand::Power, Unit::JoulePerHour, n),
        0x38..=0x3F => ok(Measurand::VolumeFlow, Unit::CubicMetrePerHour, n - 6),
        0x40..=0x47 => ok(Measurand::VolumeFlow, Unit::CubicMetrePerHour, n - 7),
        0x48..=0x4F => ok(Measurand::VolumeFlow, Unit::CubicMetrePerHour, n - 9),
        0x50..=0x57 => ok(Measurand::MassFlow, Unit::KilogramPerHour, n - 3),
        0x58..=0x5B => ok(Measurand::FlowTemperature, Unit::DegreeCelsius, nn - 3),
        0x5C..=0x5F => ok(Measurand::ReturnTemperature, Unit::DegreeCelsius, nn - 3),
        0x60..=0x63 => ok(Measurand::TemperatureDifference, Unit::Kelvin, nn - 3),
        0x64..=0x67 => ok(Measurand::ExternalTemperature, Unit::DegreeCelsius, nn - 3),
        0x68..=0x6B => ok(Measurand::Pressure, Unit::Bar, nn - 3),
        0x6C => ok(Measurand::Date, Unit::Undefined, 0),
        0x6D => ok(Measurand::DateTime, Unit::Undefined, 0),
        0x6E => ok(Measurand::HcaUnits, Unit::Count, 0),
        0x70..=0x73 => ok(Measurand::AveragingDuration, duration_unit(nn), 0),
        0x74..=0x77 => ok(Measurand::ActualityDuration, duration_unit(nn), 0),
        0x78 => ok(Measurand::FabricationNo, Unit::Undefined, 0),
        _ => VifInfo::unknown(),
    }
}

/// Classify an FD-table VIF (prefix `0xFD`).
fn classify_fd(code: u8) -> VifInfo {
    match code & 0x7F {
        // Customer location / customer
        0x10 | 0x11 => VifInfo { measurand: Measurand::PlainText, unit: Unit::Undefined, scaler: 0, valid: true },
        // Error flags
        0x17 => VifInfo { measurand: Measurand::ErrorFlags, unit: Unit::Undefined, scaler: 0, valid: true },
        // Remaining battery in days
        0x74 => VifInfo { measurand: Measurand::ActualityDuration, unit: Unit::Day, scaler: 0, valid: true },
        _ => VifInfo::unknown(),
    }
}

fn duration_unit(nn: i8) -> Unit {
    match nn {
        0 => Unit::Second,
        1 => Unit::Min,
        2 => Unit::Hour,
        _ => Unit::Day,
    }
}

/// Build the record's OBIS-style code from the measurand.
fn obis_for(measurand: Measurand, channel: u8, tariff: u8) -> Obis {
    match measurand {
        Measurand::Energy => Obis::new(1, channel, 1, 8, tariff, 0xFF),
        Measurand::Power => Obis::new(1, channel, 16, 7, 0, 0xFF),
        Measurand::Volume => Obis::new(8, channel, 1, 0, 0, 0xFF),
        Measurand::VolumeFlow => Obis::new(8, channel, 2, 0, 0, 0xFF),
        Measurand::Mass => Obis::new(8, channel, 3, 0, 0, 0xFF),
        Measurand::MassFlow => Obis::new(8, channel, 4, 0, 0, 0xFF),
        Measurand::FlowTemperature => Obis::new(6, channel, 10, 0, 0, 0xFF),
        Measurand::ReturnTemperature => Obis::new(6, channel, 11, 0, 0, 0xFF),
        Measurand::TemperatureDifference => Obis::new(6, channel, 12, 0, 0, 0xFF),
        Measurand::ExternalTemperature => Obis::new(6, channel, 13, 0, 0, 0xFF),
        Measurand::Pressure => Obis::new(6, channel, 14, 0, 0, 0xFF),
        Measurand::Date | Measurand::DateTime => codes::CURRENT_UTC,
        Measurand::ErrorFlags => Obis::new(0, channel, 97, 97, 0, 0xFF),
        Measurand::FabricationNo => Obis::new(0, channel, 96, 1, 0, 0xFF),
        Measurand::OnTime | Measurand::OperatingTime => Obis::new(0, channel, 96, 8, 0, 0xFF),
        Measurand::HcaUnits => Obis::new(4, channel, 1, 0, 0, 0xFF),
        Measurand::AveragingDuration | Measurand::ActualityDuration => {
            Obis::new(0, channel, 96, 9, 0, 0xFF)
        },
        Measurand::PlainText | Measurand::Unknown => Obis::new(0, channel, 96, 99, 0, 0xFF),
    }
}

/// Decoded record value.
#[derive(Debug, Clone, PartialEq)]
pub enum MbusValue {
    /// No value (fill, selection, special function).
    None,
    /// Unsigned value (BCD fields).
    Unsigned(u64),
    /// Signed value (integer fields).
    Signed(i64),
    /// 32-bit float.
    Real(f32),
    /// Text (variable-length records, un-reversed).
    Text(String),
    /// Calendar date (type G).
    Date(NaiveDate),
    /// Timestamp (type F).
    DateTime(NaiveDateTime),
}

/// One decoded data record.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    /// OBIS-style code synthesised from the VIF.
    pub code: Obis,
    /// Decoded value.
    pub value: MbusValue,
    /// Decimal scaler: the numeric value scales by `10^scaler`.
    pub scaler: i8,
    /// Unit of the value.
    pub unit: Unit,
    /// Function field of the record.
    pub function: FunctionField,
    /// Storage number (0 for the current value).
    pub storage: u8,
    /// Whether the VIF chain was fully understood.
    pub valid: bool,
}

/// Read one record at `offset`.
///
/// Returns the offset after the record and the record itself; fill bytes
/// yield `None` and the end offset. `channel` becomes value group B of
/// the synthesised code.
pub fn read_record(
    buf: &[u8],
    mut offset: usize,
    channel: u8,
) -> Result<(usize, Option<Record>), MbusError> {
    // Fill bytes between records and at the payload end
    while buf.get(offset) == Some(&FILL) {
        offset += 1;
    }
    let Some(&dif_byte) = buf.get(offset) else {
        return Ok((offset, None));
    };
    let start = offset;
    offset += 1;

    let dif = Dif::new(dif_byte);
    let mut storage = u8::from(dif.is_storage());
    let mut tariff = 0u8;

    // DIFE chain
    let mut extended = dif.is_extended();
    while extended {
        let &dife = buf
            .get(offset)
            .ok_or(MbusError::MalformedRecord { offset: start, detail: "missing DIFE" })?;
        offset += 1;
        storage = storage.wrapping_add((dife & 0x0F) << 1);
        tariff = tariff.wrapping_add((dife >> 4) & 0x03);
        extended = dife & 0x80 != 0;
    }

    // VIF and its chain
    let &vif_byte = buf
        .get(offset)
        .ok_or(MbusError::MalformedRecord { offset: start, detail: "missing VIF" })?;
    offset += 1;

    let mut info;
    match vif_byte {
        0xFD => {
            let &code = buf
                .get(offset)
                .ok_or(MbusError::MalformedRecord { offset: start, detail: "missing FD VIFE" })?;
            offset += 1;
            info = classify_fd(code);
            let mut extended = code & 0x80 != 0;
            while extended {
                let &vife = buf.get(offset).ok_or(MbusError::MalformedRecord {
                    offset: start,
                    detail: "missing VIFE",
                })?;
                offset += 1;
                extended = vife & 0x80 != 0;
            }
        },
        0xFB => {
            // FB table: rarely used; consume the chain, report unknown
            let mut extended = true;
            while extended {
                let &vife = buf.get(offset).ok_or(MbusError::MalformedRecord {
                    offset: start,
                    detail: "missing FB VIFE",
                })?;
                offset += 1;
                extended = vife & 0x80 != 0;
            }
            info = VifInfo::unknown();
        },
        0x7C => {
            // Custom VIF: length-prefixed ASCII unit text
            let &len = buf.get(offset).ok_or(MbusError::MalformedRecord {
                offset: start,
                detail: "missing custom VIF length",
            })?;
            offset += 1;
            let end = offset + usize::from(len);
            if buf.len() < end {
                return Err(MbusError::MalformedRecord { offset: start, detail: "truncated custom VIF" });
            }
            offset = end;
            info = VifInfo { measurand: Measurand::PlainText, unit: Unit::Undefined, scaler: 0, valid: true };
        },
        _ => {
            info = classify_primary(vif_byte & 0x7F);
            let mut extended = vif_byte & 0x80 != 0;
            while extended {
                let &vife = buf.get(offset).ok_or(MbusError::MalformedRecord {
                    offset: start,
                    detail: "missing VIFE",
                })?;
                offset += 1;
                // An error-flag VIFE reclassifies the record
                if vife & 0x7F == 0x17 {
                    info = classify_fd(0x17);
                }
                extended = vife & 0x80 != 0;
            }
        },
    }

    // Value bytes
    let dfc = dif.data_field_code();
    let value = match dfc {
        DataFieldCode::Variable => {
            let &lvar = buf.get(offset).ok_or(MbusError::MalformedRecord {
                offset: start,
                detail: "missing LVAR",
            })?;
            offset += 1;
            if lvar < 0xC0 {
                let end = offset + usize::from(lvar);
                if buf.len() < end {
                    return Err(MbusError::MalformedRecord { offset: start, detail: "truncated string" });
                }
                // Variable-length text arrives reversed
                let text: String = buf[offset..end]
                    .iter()
                    .rev()
                    .map(|&b| char::from(b))
                    .collect();
                offset = end;
                MbusValue::Text(text)
            } else {
                info.valid = false;
                MbusValue::None
            }
        },
        dfc => {
            let size = dfc.size().unwrap_or(0);
            let end = offset + size;
            if buf.len() < end {
                return Err(MbusError::MalformedRecord { offset: start, detail: "truncated value" });
            }
            let data = &buf[offset..end];
            offset = end;
            decode_fixed(dfc, data, info.measurand, &mut info)
        },
    };

    let record = Record {
        code: obis_for(info.measurand, channel, tariff),
        value,
        scaler: info.scaler,
        unit: info.unit,
        function: dif.function_field(),
        storage,
        valid: info.valid,
    };
    Ok((offset, Some(record)))
}

/// Decode a fixed-size data field.
fn decode_fixed(dfc: DataFieldCode, data: &[u8], measurand: Measurand, info: &mut VifInfo) -> MbusValue {
    match dfc {
        DataFieldCode::None | DataFieldCode::Selection | DataFieldCode::Special => MbusValue::None,
        DataFieldCode::Bcd2
        | DataFieldCode::Bcd4
        | DataFieldCode::Bcd6
        | DataFieldCode::Bcd8
        | DataFieldCode::Bcd12 => MbusValue::Unsigned(bcd_to_n(data)),
        DataFieldCode::Real32 => {
            let bytes: [u8; 4] = data.try_into().unwrap_or_default();
            MbusValue::Real(f32::from_le_bytes(bytes))
        },
        DataFieldCode::Int16 if measurand == Measurand::Date => {
            match type_g_date(data[0], data[1]) {
                Some(date) => MbusValue::Date(date),
                None => {
                    info.valid = false;
                    MbusValue::None
                },
            }
        },
        DataFieldCode::Int32 if measurand == Measurand::DateTime => {
            match type_f_datetime(data[0], data[1], data[2], data[3]) {
                Some(ts) => MbusValue::DateTime(ts),
                None => {
                    info.valid = false;
                    MbusValue::None
                },
            }
        },
        _ => {
            // Little-endian, sign-extended
            let mut value: i64 = match data.last() {
                Some(&msb) if msb & 0x80 != 0 => -1,
                _ => 0,
            };
            for &byte in data.iter().rev() {
                value = (value << 8) | i64::from(byte);
            }
            MbusValue::Signed(value)
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dif_classification() {
        let d = Dif::new(0x0C);
        assert_eq!(d.data_field_code(), DataFieldCode::Bcd8);
        assert_eq!(d.function_field(), FunctionField::Instant);
        assert!(!d.is_storage());
        assert!(!d.is_extended());

        assert_eq!(Dif::new(0x04).data_field_code(), DataFieldCode::Int32);
        assert_eq!(Dif::new(0x02).data_field_code(), DataFieldCode::Int16);

        let stored = Dif::new(0x4C);
        assert_eq!(stored.data_field_code(), DataFieldCode::Bcd8);
        assert!(stored.is_storage());

        let extended = Dif::new(0x82);
        assert_eq!(extended.data_field_code(), DataFieldCode::Int16);
        assert!(extended.is_extended());

        assert_eq!(Dif::new(0x8D).data_field_code(), DataFieldCode::Variable);
    }

    /// Annex P heat meter record walk (SND-NR example).
    #[test]
    fn annex_p_heat_meter() {
        let inp = [
            0x0C, 0x06, 0x27, 0x04, 0x85, 0x02, // energy kWh, BCD8
            0x0C, 0x13, 0x76, 0x34, 0x70, 0x00, // volume l, BCD8
            0x4C, 0x06, 0x19, 0x54, 0x44, 0x01, // energy kWh, storage 1
            0x42, 0x6C, 0xFF, 0x0C, // date type G, storage 1
            0x0B, 0x3B, 0x27, 0x01, 0x00, // volume flow l/h, BCD6
            0x0B, 0x2A, 0x97, 0x32, 0x00, // power 100 mW, BCD6
            0x0A, 0x5A, 0x43, 0x04, // flow temp, BCD4
            0x0A, 0x5E, 0x51, 0x02, // return temp 100 m°C, BCD4
            0x02, 0xFD, 0x17, 0x00, 0x00, // error flags
            0x2F, // fill
        ];

        let mut offset = 0;
        let mut records = Vec::new();
        while let (next, Some(record)) = read_record(&inp, offset, 1).unwrap() {
            offset = next;
            records.push(record);
        }
        assert_eq!(records.len(), 9);

        assert_eq!(records[0].value, MbusValue::Unsigned(2_850_427));
        assert_eq!(records[0].unit, Unit::WattHour);
        assert_eq!(records[0].scaler, 3);
        assert!(records[0].valid);

        assert_eq!(records[1].value, MbusValue::Unsigned(703_476));
        assert_eq!(records[1].unit, Unit::CubicMetre);
        assert_eq!(records[1].scaler, -3);

        assert_eq!(records[2].value, MbusValue::Unsigned(1_445_419));
        assert_eq!(records[2].storage, 1);

        assert_eq!(
            records[3].value,
            MbusValue::Date(NaiveDate::from_ymd_opt(2007, 12, 31).unwrap())
        );

        assert_eq!(records[4].value, MbusValue::Unsigned(127));
        assert_eq!(records[4].unit, Unit::CubicMetrePerHour);
        assert_eq!(records[4].scaler, -3);

        assert_eq!(records[5].value, MbusValue::Unsigned(3_297));
        assert_eq!(records[5].unit, Unit::Watt);
        assert_eq!(records[5].scaler, -1);

        assert_eq!(records[6].value, MbusValue::Unsigned(443));
        assert_eq!(records[6].scaler, -1);
        assert_eq!(records[6].unit, Unit::DegreeCelsius);

        assert_eq!(records[7].value, MbusValue::Unsigned(251));
        assert_eq!(records[7].scaler, -1);

        assert_eq!(records[8].value, MbusValue::Signed(0));
        assert_eq!(records[8].code, Obis::new(0, 1, 97, 97, 0, 0xFF));
    }

    /// AMBUS-AS service records with floats and a type F timestamp.
    #[test]
    fn float_and_type_f_records() {
        let inp = [
            0x03, 0x22, 0x9A, 0x00, 0x00, // 154 hours of service
            0x05, 0x2E, 0xA0, 0xC8, 0x51, 0x46, // power kW float
            0x05, 0x3E, 0xB4, 0xE3, 0xD7, 0x42, // flow m³/h float
            0x05, 0x5B, 0x90, 0xD3, 0x07, 0x43, // warm side float
            0x05, 0x5F, 0x0E, 0xAA, 0xE7, 0x41, // cold side float
            0x05, 0x63, 0x9C, 0xBC, 0xD5, 0x42, // temp diff float
            0x04, 0x6D, 0x10, 0x09, 0x05, 0xC5, // 1996-05-05 09:16, type F
        ];

        let mut offset = 0;
        let mut records = Vec::new();
        while offset < inp.len() {
            let (next, record) = read_record(&inp, offset, 1).unwrap();
            offset = next;
            records.extend(record);
        }
        assert_eq!(records.len(), 7);

        assert_eq!(records[0].value, MbusValue::Signed(154));
        assert_eq!(records[0].unit, Unit::Hour);

        let MbusValue::Real(power) = records[1].value else {
            panic!("expected float power");
        };
        assert!((power - 13426.2).abs() < 0.1);

        let MbusValue::Real(flow) = records[2].value else {
            panic!("expected float flow");
        };
        assert!((flow - 107.945).abs() < 0.001);

        let MbusValue::Real(warm) = records[3].value else {
            panic!("expected float temperature");
        };
        assert!((warm - 135.82).abs() < 0.01);

        assert_eq!(
            records[6].value,
            MbusValue::DateTime(
                NaiveDate::from_ymd_opt(1996, 5, 5).unwrap().and_hms_opt(9, 16, 0).unwrap()
            )
        );
    }

    /// Reversed variable-length text record.
    #[test]
    fn reversed_text_record() {
        let inp = [
            0x0D, 0xFD, 0x11, 0x0C, 0x47, 0x41, 0x20, 0x6F, 0x72, 0x74, 0x65, 0x6D, 0x61, 0x75,
            0x71, 0x41,
        ];
        let (offset, record) = read_record(&inp, 0, 0).unwrap();
        let record = record.unwrap();
        assert_eq!(offset, inp.len());
        assert_eq!(record.value, MbusValue::Text("Aquametro AG".into()));
    }

    #[test]
    fn fill_only_yields_no_record() {
        let (offset, record) = read_record(&[0x2F, 0x2F, 0x2F], 0, 0).unwrap();
        assert_eq!(offset, 3);
        assert!(record.is_none());
    }

    #[test]
    fn truncated_record_is_an_error() {
        let inp = [0x0C, 0x06, 0x27];
        assert!(matches!(
            read_record(&inp, 0, 0),
            Err(MbusError::MalformedRecord { .. })
        ));
    }
}
