//! Physical units, coded as in DLMS/COSEM so SML list entries can carry
//! them without translation.

/// Unit of a decoded record value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum Unit {
    /// Year.
    Year = 1,
    /// Month.
    Month = 2,
    /// Week.
    Week = 3,
    /// Day.
    Day = 4,
    /// Hour.
    Hour = 5,
    /// Minute.
    Min = 6,
    /// Second.
    Second = 7,
    /// Degree Celsius.
    DegreeCelsius = 9,
    /// Cubic metre.
    CubicMetre = 13,
    /// Corrected cubic metre.
    CubicMetreCorrected = 14,
    /// Cubic metre per hour.
    CubicMetrePerHour = 15,
    /// Kilogram.
    Kilogram = 20,
    /// Pascal.
    Pascal = 23,
    /// Bar.
    Bar = 24,
    /// Joule.
    Joule = 25,
    /// Joule per hour.
    JoulePerHour = 26,
    /// Watt.
    Watt = 27,
    /// Watt hour.
    WattHour = 30,
    /// Ampere.
    Ampere = 33,
    /// Volt.
    Volt = 35,
    /// Kelvin.
    Kelvin = 44,
    /// Kilogram per hour.
    KilogramPerHour = 46,
    /// Dimensionless count.
    Count = 255,
    /// Unit not assigned or not decodable.
    #[default]
    Undefined = 0,
}

impl Unit {
    /// DLMS unit code.
    #[must_use]
    pub fn as_dlms(self) -> u8 {
        self as u8
    }

    /// Map a DLMS unit code.
    #[must_use]
    pub fn from_dlms(code: u8) -> Self {
        match code {
            1 => Self::Year,
            2 => Self::Month,
            3 => Self::Week,
            4 => Self::Day,
            5 => Self::Hour,
            6 => Self::Min,
            7 => Self::Second,
            9 => Self::DegreeCelsius,
            13 => Self::CubicMetre,
            14 => Self::CubicMetreCorrected,
            15 => Self::CubicMetrePerHour,
            20 => Self::Kilogram,
            23 => Self::Pascal,
            24 => Self::Bar,
            25 => Self::Joule,
            26 => Self::JoulePerHour,
            27 => Self::Watt,
            30 => Self::WattHour,
            33 => Self::Ampere,
            35 => Self::Volt,
            44 => Self::Kelvin,
            46 => Self::KilogramPerHour,
            255 => Self::Count,
            _ => Self::Undefined,
        }
    }

    /// Human-readable unit name.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::Year => "year",
            Self::Month => "month",
            Self::Week => "week",
            Self::Day => "day",
            Self::Hour => "hour",
            Self::Min => "minute",
            Self::Second => "second",
            Self::DegreeCelsius => "°C",
            Self::CubicMetre => "m³",
            Self::CubicMetreCorrected => "m³ (corrected)",
            Self::CubicMetrePerHour => "m³/h",
            Self::Kilogram => "kg",
            Self::Pascal => "Pa",
            Self::Bar => "bar",
            Self::Joule => "J",
            Self::JoulePerHour => "J/h",
            Self::Watt => "W",
            Self::WattHour => "Wh",
            Self::Ampere => "A",
            Self::Volt => "V",
            Self::Kelvin => "K",
            Self::KilogramPerHour => "kg/h",
            Self::Count => "counter",
            Self::Undefined => "undefined",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dlms_round_trip() {
        for unit in [Unit::WattHour, Unit::Watt, Unit::CubicMetre, Unit::Second] {
            assert_eq!(Unit::from_dlms(unit.as_dlms()), unit);
        }
    }

    #[test]
    fn unknown_code_is_undefined() {
        assert_eq!(Unit::from_dlms(200), Unit::Undefined);
    }
}
