//! Integer date keys
//!
//! The time dimension is keyed by the calendar date written as a `YYYYMMDD`
//! integer, so a key is both sortable and decodable back to its date.

use chrono::{Datelike, NaiveDate};

/// Key used for facts whose source date is missing.
pub const UNKNOWN_DATE_KEY: i32 = 19000101;

/// Encode a date as its `YYYYMMDD` integer key.
pub fn encode(date: NaiveDate) -> i32 {
    date.year() * 10_000 + date.month() as i32 * 100 + date.day() as i32
}

/// Decode a `YYYYMMDD` key. Returns `None` for values that are not a real date.
pub fn decode(key: i32) -> Option<NaiveDate> {
    if key <= 0 {
        return None;
    }
    let year = key / 10_000;
    let month = (key / 100 % 100) as u32;
    let day = (key % 100) as u32;
    NaiveDate::from_ymd_opt(year, month, day)
}

/// Encode an optional date, substituting [`UNKNOWN_DATE_KEY`] when absent.
pub fn encode_or_unknown(date: Option<NaiveDate>) -> i32 {
    date.map(encode).unwrap_or(UNKNOWN_DATE_KEY)
}

/// The date the unknown key stands for (1900-01-01).
pub fn unknown_date() -> NaiveDate {
    NaiveDate::from_ymd_opt(1900, 1, 1).unwrap_or_default()
}
