//! Conversions for the naive UTC timestamps stored by garasu.

use chrono::{DateTime, Local, NaiveDateTime, TimeZone, Utc};

/// Interpret a stored timestamp as UTC and convert it to the local zone.
pub fn utc_tz(stored: NaiveDateTime) -> DateTime<Local> {
    Utc.from_utc_datetime(&stored).with_timezone(&Local)
}

/// Interpret a stored timestamp as UTC.
pub fn as_utc(stored: NaiveDateTime) -> DateTime<Utc> {
    Utc.from_utc_datetime(&stored)
}
