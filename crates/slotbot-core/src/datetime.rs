//! Date/time resolution for reminder fire times.
//!
//! Dates are `YYYY-MM-DD`, times are `HH` or `HH:MM` (24-hour). Everything is UTC.

use chrono::{DateTime, NaiveDate, Utc};

use crate::{Error, Result};

/// Combine a `YYYY-MM-DD` date and an `HH[:MM]` time into a UTC timestamp.
///
/// Seconds and sub-seconds are always zero. Minute defaults to 0 when omitted.
pub fn resolve(date: &str, time: &str) -> Result<DateTime<Utc>> {
    let day = parse_date(date)?;
    let (hour, minute) = parse_time_of_day(time)?;
    let naive = day
        .and_hms_opt(hour, minute, 0)
        .ok_or_else(|| Error::InvalidFormat(format!("{date} {time}")))?;
    Ok(naive.and_utc())
}

/// Parse a `YYYY-MM-DD` calendar date.
pub fn parse_date(date: &str) -> Result<NaiveDate> {
    let parts: Vec<&str> = date.trim().split('-').collect();
    let [year, month, day] = parts.as_slice() else {
        return Err(Error::InvalidFormat(format!("date {date:?}")));
    };

    let year: i32 = parse_component(year, date)?;
    let month: u32 = parse_component(month, date)?;
    if !(1..=12).contains(&month) {
        return Err(Error::InvalidMonth(month));
    }
    let day: u32 = parse_component(day, date)?;

    NaiveDate::from_ymd_opt(year, month, day)
        .ok_or_else(|| Error::InvalidFormat(format!("date {date:?}")))
}

/// Parse an `HH` or `HH:MM` time of day into `(hour, minute)`.
pub fn parse_time_of_day(time: &str) -> Result<(u32, u32)> {
    let trimmed = time.trim();
    let (hour, minute) = match trimmed.split_once(':') {
        Some((h, m)) => (h, Some(m)),
        None => (trimmed, None),
    };

    let hour: u32 = parse_component(hour, time)?;
    let minute: u32 = match minute {
        Some(m) => parse_component(m, time)?,
        None => 0,
    };

    if hour > 23 || minute > 59 {
        return Err(Error::InvalidFormat(format!("time {time:?}")));
    }
    Ok((hour, minute))
}

/// Format the date half of a timestamp as `YYYY-MM-DD`.
pub fn format_date(ts: DateTime<Utc>) -> String {
    ts.format("%Y-%m-%d").to_string()
}

/// Format the time half of a timestamp as `HH:MM`.
pub fn format_time(ts: DateTime<Utc>) -> String {
    ts.format("%H:%M").to_string()
}

fn parse_component<T: std::str::FromStr>(s: &str, whole: &str) -> Result<T> {
    let s = s.trim();
    if s.is_empty() || !s.chars().all(|c| c.is_ascii_digit()) {
        return Err(Error::InvalidFormat(whole.to_string()));
    }
    s.parse::<T>()
        .map_err(|_| Error::InvalidFormat(whole.to_string()))
}
