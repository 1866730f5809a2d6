//! M-Bus compound date types.
//!
//! Type G packs a calendar date into two bytes, type F adds minute and
//! hour for a full timestamp. Both spread the year over two fields:
//! three bits beside the day, four bits beside the month.

use chrono::{NaiveDate, NaiveDateTime};

/// Decode a type G date: `day(5) + year-low(3) | month(4) + year-high(4)`.
#[must_use]
pub fn type_g_date(b0: u8, b1: u8) -> Option<NaiveDate> {
    let day = u32::from(b0 & 0x1F);
    let month = u32::from(b1 & 0x0F);
    let year = u32::from((b0 >> 5) & 0x07) | (u32::from((b1 >> 4) & 0x0F) << 3);
    // The 7-bit year window spans 1981..=2080
    let year = if year >= 81 { 1900 + year as i32 } else { 2000 + year as i32 };
    NaiveDate::from_ymd_opt(year, month, day)
}

/// Decode a type F timestamp: minute, hour, then a type G date.
#[must_use]
pub fn type_f_datetime(b0: u8, b1: u8, b2: u8, b3: u8) -> Option<NaiveDateTime> {
    let minute = u32::from(b0 & 0x3F);
    let hour = u32::from(b1 & 0x1F);
    type_g_date(b2, b3)?.and_hms_opt(hour, minute, 0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn type_f_example() {
        // 2008-05-31 23:50
        let ts = type_f_datetime(0x32, 0x37, 0x1F, 0x15).unwrap();
        assert_eq!(ts.to_string(), "2008-05-31 23:50:00");
    }

    #[test]
    fn type_g_example() {
        // 2013-08-18
        let date = type_g_date(0xB2, 0x18).unwrap();
        assert_eq!(date.to_string(), "2013-08-18");
    }

    #[test]
    fn invalid_date_is_rejected() {
        assert_eq!(type_g_date(0x00, 0x00), None);
    }
}
