//! Week arithmetic and Spanish calendar tables.
//!
//! The source sites publish their schedules keyed by the Monday of the
//! current week, written out in Spanish (`lunes 01 de septiembre`), and the
//! schedule rows carry dates in the same style. Rather than mutating the
//! process-wide locale to parse and format those, this module carries the
//! weekday and month tables explicitly — concurrent provider runs share
//! nothing mutable.
//!
//! All functions take the reference date as a parameter so tests never depend
//! on the wall clock.

use chrono::{Datelike, Duration, NaiveDate};

/// Spanish weekday names, Monday first (matching `Weekday::num_days_from_monday`).
pub const WEEKDAYS: [&str; 7] = [
    "lunes",
    "martes",
    "miércoles",
    "jueves",
    "viernes",
    "sábado",
    "domingo",
];

/// Spanish month names, January first.
pub const MONTHS: [&str; 12] = [
    "enero",
    "febrero",
    "marzo",
    "abril",
    "mayo",
    "junio",
    "julio",
    "agosto",
    "septiembre",
    "octubre",
    "noviembre",
    "diciembre",
];

/// Spreadsheet serial dates count days from this epoch.
const SERIAL_EPOCH: (i32, u32, u32) = (1899, 12, 30);

/// The most recent Monday on or before `today`.
pub fn monday_of_week(today: NaiveDate) -> NaiveDate {
    today - Duration::days(today.weekday().num_days_from_monday() as i64)
}

/// ISO week number of the week containing `today`.
pub fn week_number(today: NaiveDate) -> i32 {
    today.iso_week().week() as i32
}

/// Spanish weekday name for a date.
pub fn weekday_name(date: NaiveDate) -> &'static str {
    WEEKDAYS[date.weekday().num_days_from_monday() as usize]
}

/// Spanish month name for a date.
pub fn month_name(date: NaiveDate) -> &'static str {
    MONTHS[date.month0() as usize]
}

/// Format a date the way the source sites label their weekly posts:
/// `lunes 01 de septiembre` (weekday, zero-padded day, month, all lowercase).
pub fn spanish_label(date: NaiveDate) -> String {
    format!(
        "{} {:02} de {}",
        weekday_name(date),
        date.day(),
        month_name(date)
    )
}

/// Parse a Spanish long-form date: `lunes 15 de septiembre, 2025`.
///
/// Case-insensitive. The weekday must agree with the date the numbers
/// resolve to; a mismatch means the text is not the date it claims to be and
/// yields `None` (the caller substitutes the date sentinel).
pub fn parse_spanish_date(text: &str) -> Option<NaiveDate> {
    let lowered = text.trim().to_lowercase();
    let mut parts = lowered.split_whitespace();

    let weekday = parts.next()?;
    let day: u32 = parts.next()?.parse().ok()?;
    if parts.next()? != "de" {
        return None;
    }
    let month_token = parts.next()?.trim_end_matches(',');
    let year: i32 = parts.next()?.trim_end_matches(',').parse().ok()?;
    if parts.next().is_some() {
        return None;
    }

    let month = MONTHS.iter().position(|m| *m == month_token)? as u32 + 1;
    let date = NaiveDate::from_ymd_opt(year, month, day)?;
    (weekday_name(date) == weekday).then_some(date)
}

/// Convert a spreadsheet serial number (days since 1899-12-30) to a date.
///
/// Serial `1` is 1899-12-31. Returns `None` for values that land outside
/// chrono's representable range.
pub fn from_serial(serial: i64) -> Option<NaiveDate> {
    let (y, m, d) = SERIAL_EPOCH;
    let epoch = NaiveDate::from_ymd_opt(y, m, d)?;
    epoch.checked_add_signed(Duration::days(serial))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_monday_of_week() {
        // 2025-09-18 is a Thursday
        assert_eq!(monday_of_week(date(2025, 9, 18)), date(2025, 9, 15));
        // a Monday maps to itself
        assert_eq!(monday_of_week(date(2025, 9, 15)), date(2025, 9, 15));
        // Sunday still belongs to the week that started six days earlier
        assert_eq!(monday_of_week(date(2025, 9, 21)), date(2025, 9, 15));
    }

    #[test]
    fn test_spanish_label_zero_pads_day() {
        assert_eq!(spanish_label(date(2025, 9, 1)), "lunes 01 de septiembre");
        assert_eq!(spanish_label(date(2025, 12, 25)), "jueves 25 de diciembre");
    }

    #[test]
    fn test_parse_spanish_date() {
        assert_eq!(
            parse_spanish_date("lunes 15 de septiembre, 2025"),
            Some(date(2025, 9, 15))
        );
        // mixed case and stray whitespace
        assert_eq!(
            parse_spanish_date("  Lunes 15 de Septiembre, 2025 "),
            Some(date(2025, 9, 15))
        );
    }

    #[test]
    fn test_parse_rejects_weekday_mismatch() {
        // 2025-09-15 is a Monday, not a Tuesday
        assert_eq!(parse_spanish_date("martes 15 de septiembre, 2025"), None);
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert_eq!(parse_spanish_date("not a date"), None);
        assert_eq!(parse_spanish_date("lunes 15 of septiembre, 2025"), None);
        assert_eq!(parse_spanish_date("lunes 99 de septiembre, 2025"), None);
        assert_eq!(parse_spanish_date("lunes 15 de brumario, 2025"), None);
        assert_eq!(parse_spanish_date(""), None);
    }

    #[test]
    fn test_serial_epoch_offset() {
        assert_eq!(from_serial(1), Some(date(1899, 12, 31)));
        assert_eq!(from_serial(45000), Some(date(2023, 3, 15)));
    }

    #[test]
    fn test_week_number_matches_iso() {
        assert_eq!(week_number(date(2025, 1, 1)), 1);
        assert_eq!(week_number(date(2025, 9, 15)), 38);
    }
}
