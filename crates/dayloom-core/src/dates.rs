//! Calendar arithmetic and the date normalization boundary.
//!
//! Stored task documents carry dates in several shapes: plain `YYYY-MM-DD`
//! strings, ISO date-time strings, epoch milliseconds from serialized date
//! objects, and store timestamps (`{seconds, nanoseconds}` or
//! `{_seconds, _nanoseconds}`). Everything passes through
//! [`normalize_date_time`] before the engine sees it, so the engine only ever
//! deals with [`NaiveDate`] / [`NaiveDateTime`] values and canonical
//! `YYYY-MM-DD` keys.

use std::collections::BTreeSet;

use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Deserializer};
use serde_json::Value;
use tracing::{trace, warn};

const DATE_KEY_FORMAT: &str = "%Y-%m-%d";

const DATE_TIME_FORMATS: [&str; 5] = [
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M",
];

const DATE_FORMATS: [&str; 2] = [DATE_KEY_FORMAT, "%Y/%m/%d"];

/// Canonical `YYYY-MM-DD` key for a date.
#[must_use]
pub fn date_key(date: NaiveDate) -> String {
    date.format(DATE_KEY_FORMAT).to_string()
}

/// Parses a canonical `YYYY-MM-DD` key.
pub fn parse_date_key(raw: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(raw.trim(), DATE_KEY_FORMAT).ok()
}

/// Normalizes any stored date shape into a naive wall-clock date-time.
///
/// Returns `None` for shapes or values that do not describe a date.
pub fn normalize_date_time(value: &Value) -> Option<NaiveDateTime> {
    match value {
        Value::String(raw) => parse_date_text(raw),
        Value::Number(num) => {
            let millis = num.as_f64()?;
            from_epoch_millis(millis)
        }
        Value::Object(map) => {
            if let Some(inner) = map.get("$date") {
                return normalize_date_time(inner);
            }
            let seconds = map
                .get("seconds")
                .or_else(|| map.get("_seconds"))
                .and_then(Value::as_i64)?;
            let nanos = map
                .get("nanoseconds")
                .or_else(|| map.get("_nanoseconds"))
                .and_then(Value::as_u64)
                .unwrap_or(0);
            let nanos = u32::try_from(nanos).ok()?;
            DateTime::from_timestamp(seconds, nanos).map(|dt| dt.naive_utc())
        }
        _ => None,
    }
}

/// Normalizes any stored date shape into a calendar date.
pub fn normalize_date(value: &Value) -> Option<NaiveDate> {
    normalize_date_time(value).map(|dt| dt.date())
}

/// Normalizes any stored date shape into its canonical `YYYY-MM-DD` key.
pub fn normalize_date_key(value: &Value) -> Option<String> {
    normalize_date(value).map(date_key)
}

fn parse_date_text(raw: &str) -> Option<NaiveDateTime> {
    let token = raw.trim();
    if token.is_empty() {
        return None;
    }

    for fmt in DATE_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(token, fmt) {
            return date.and_hms_opt(0, 0, 0);
        }
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(token) {
        return Some(dt.naive_local());
    }

    DATE_TIME_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(token, fmt).ok())
}

fn from_epoch_millis(millis: f64) -> Option<NaiveDateTime> {
    if !millis.is_finite() {
        return None;
    }
    let millis = millis.round() as i64;
    DateTime::from_timestamp_millis(millis).map(|dt| dt.naive_utc())
}

/// Serde adapters used by the stored task model.
pub mod lenient {
    use super::*;

    pub fn date<'de, D>(deserializer: D) -> Result<Option<NaiveDate>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = Option::<Value>::deserialize(deserializer)?;
        Ok(raw.as_ref().and_then(|value| {
            let parsed = normalize_date(value);
            if parsed.is_none() && !value.is_null() {
                warn!(value = %value, "ignoring unrecognized date value");
            }
            parsed
        }))
    }

    pub fn date_time<'de, D>(deserializer: D) -> Result<Option<NaiveDateTime>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = Option::<Value>::deserialize(deserializer)?;
        Ok(raw.as_ref().and_then(|value| {
            let parsed = normalize_date_time(value);
            if parsed.is_none() && !value.is_null() {
                warn!(value = %value, "ignoring unrecognized timestamp value");
            }
            parsed
        }))
    }

    /// Treats an explicit `null` like a missing field.
    pub fn or_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
    where
        D: Deserializer<'de>,
        T: Default + Deserialize<'de>,
    {
        Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
    }

    /// Exception date lists: malformed entries are dropped, not fatal.
    pub fn date_set<'de, D>(deserializer: D) -> Result<BTreeSet<NaiveDate>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = Option::<Vec<Value>>::deserialize(deserializer)?.unwrap_or_default();
        let mut out = BTreeSet::new();
        for value in &raw {
            match normalize_date(value) {
                Some(date) => {
                    trace!(date = %date, "normalized exception date");
                    out.insert(date);
                }
                None => warn!(value = %value, "dropping malformed exception date"),
            }
        }
        Ok(out)
    }
}

#[must_use]
pub fn add_days(date: NaiveDate, days: i64) -> NaiveDate {
    date.checked_add_signed(Duration::days(days))
        .unwrap_or(date)
}

#[must_use]
pub fn first_day_of_month(year: i32, month: u32) -> Option<NaiveDate> {
    NaiveDate::from_ymd_opt(year, month, 1)
}

#[must_use]
pub fn last_day_of_month(year: i32, month: u32) -> Option<NaiveDate> {
    let (next_year, next_month) = if month >= 12 {
        (year.saturating_add(1), 1_u32)
    } else {
        (year, month + 1)
    };
    first_day_of_month(next_year, next_month).map(|first| add_days(first, -1))
}

/// First and last day of a month (`month` is 1-based).
#[must_use]
pub fn month_bounds(year: i32, month: u32) -> Option<(NaiveDate, NaiveDate)> {
    Some((
        first_day_of_month(year, month)?,
        last_day_of_month(year, month)?,
    ))
}

/// Moves `date` by whole months, clamping the day to the target month length.
#[must_use]
pub fn shift_months(date: NaiveDate, months: i32) -> NaiveDate {
    let mut year = date.year();
    let mut month = date.month() as i32 + months;

    while month < 1 {
        month += 12;
        year = year.saturating_sub(1);
    }
    while month > 12 {
        month -= 12;
        year = year.saturating_add(1);
    }

    let month = month as u32;
    let day = last_day_of_month(year, month)
        .map(|last| date.day().min(last.day()))
        .unwrap_or(1);
    NaiveDate::from_ymd_opt(year, month, day).unwrap_or(date)
}

/// The Sunday on or before `day`; grid rows start on Sunday.
#[must_use]
pub fn start_of_week(day: NaiveDate) -> NaiveDate {
    let diff = i64::from(day.weekday().num_days_from_sunday());
    add_days(day, -diff)
}

/// The Saturday on or after `day`.
#[must_use]
pub fn end_of_week(day: NaiveDate) -> NaiveDate {
    let diff = 6 - i64::from(day.weekday().num_days_from_sunday());
    add_days(day, diff)
}

/// Weekday index with Sunday as `0`, the convention stored rules use.
#[must_use]
pub fn weekday_index(date: NaiveDate) -> u32 {
    date.weekday().num_days_from_sunday()
}
