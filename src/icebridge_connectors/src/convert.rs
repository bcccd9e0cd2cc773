//! Conversions between engine cell values and driver-level date/time types.

use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime, Utc};

/// Days between 0001-01-01 (CE day 1) and 1970-01-01.
const UNIX_EPOCH_FROM_CE: i32 = 719_163;

pub(crate) fn date32_to_naive(days: i32) -> Option<NaiveDate> {
    NaiveDate::from_num_days_from_ce_opt(days + UNIX_EPOCH_FROM_CE)
}

pub(crate) fn naive_to_date32(date: NaiveDate) -> i32 {
    date.num_days_from_ce() - UNIX_EPOCH_FROM_CE
}

pub(crate) fn micros_to_naive_datetime(micros: i64) -> Option<NaiveDateTime> {
    DateTime::<Utc>::from_timestamp_micros(micros).map(|dt| dt.naive_utc())
}

pub(crate) fn naive_datetime_to_micros(value: NaiveDateTime) -> i64 {
    value.and_utc().timestamp_micros()
}

pub(crate) fn utc_to_micros(value: DateTime<Utc>) -> i64 {
    value.timestamp_micros()
}
