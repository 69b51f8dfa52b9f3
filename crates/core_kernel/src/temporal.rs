//! Transit datetime handling
//!
//! Downstream consumers recognise timestamps by a `~t` prefix followed by an
//! ISO-8601 UTC rendering with second precision. The year is always rendered
//! with at least four digits and never truncated, which differs from both
//! chrono's `%Y` (sign prefixed above 9999) and RFC 3339 (four digits only).
//!
//! Parsing is lenient: it accepts the tagged form, RFC 3339, Salesforce's
//! `+0000` offsets and naive timestamps (taken as UTC).

use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime, Timelike, Utc};
use thiserror::Error;

/// Prefix marking a transit datetime string
pub const TRANSIT_TAG: &str = "~t";

/// Errors related to timestamp conversion
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TemporalError {
    #[error("Unparseable timestamp: {0}")]
    Unparseable(String),

    #[error("Epoch milliseconds out of range: {0}")]
    EpochOutOfRange(i64),
}

/// Renders a timestamp as `YYYY-MM-DDTHH:MM:SSZ` with a zero padded year
pub fn format_utc(dt: &DateTime<Utc>) -> String {
    format!(
        "{:04}-{:02}-{:02}T{:02}:{:02}:{:02}Z",
        dt.year(),
        dt.month(),
        dt.day(),
        dt.hour(),
        dt.minute(),
        dt.second()
    )
}

/// Renders a timestamp in transit form (`~t` + [`format_utc`])
pub fn to_transit(dt: &DateTime<Utc>) -> String {
    format!("{}{}", TRANSIT_TAG, format_utc(dt))
}

/// Removes a leading transit tag if present
pub fn strip_transit_tag(value: &str) -> &str {
    value.strip_prefix(TRANSIT_TAG).unwrap_or(value)
}

/// Converts epoch milliseconds to a UTC timestamp
pub fn from_epoch_millis(millis: i64) -> Result<DateTime<Utc>, TemporalError> {
    DateTime::<Utc>::from_timestamp_millis(millis).ok_or(TemporalError::EpochOutOfRange(millis))
}

/// Parses a timestamp string in any of the accepted shapes
pub fn parse_timestamp(value: &str) -> Result<DateTime<Utc>, TemporalError> {
    let text = strip_transit_tag(value.trim());

    if let Some(dt) = parse_canonical(text) {
        return Ok(dt);
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Ok(dt.with_timezone(&Utc));
    }

    // Salesforce renders offsets without a colon: 2023-01-01T10:00:00.000+0000
    for format in ["%Y-%m-%dT%H:%M:%S%.f%z", "%Y-%m-%d %H:%M:%S%.f%z"] {
        if let Ok(dt) = DateTime::parse_from_str(text, format) {
            return Ok(dt.with_timezone(&Utc));
        }
    }

    let naive = text.strip_suffix('Z').unwrap_or(text);
    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(naive, format) {
            return Ok(dt.and_utc());
        }
    }
    if let Some(dt) = NaiveDate::parse_from_str(naive, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
    {
        return Ok(dt.and_utc());
    }

    Err(TemporalError::Unparseable(value.to_string()))
}

/// Renders a timestamp as a SOQL datetime literal
///
/// SOQL literals carry whole seconds, so any sub-second part is truncated.
pub fn to_soql_literal(dt: &DateTime<Utc>) -> String {
    format_utc(dt)
}

// Exact inverse of format_utc, including years wider than four digits.
fn parse_canonical(text: &str) -> Option<DateTime<Utc>> {
    let body = text.strip_suffix('Z')?;
    let (date_part, time_part) = body.split_once('T')?;

    let mut date_fields = date_part.rsplitn(3, '-');
    let day: u32 = date_fields.next()?.parse().ok()?;
    let month: u32 = date_fields.next()?.parse().ok()?;
    let year_text = date_fields.next()?;
    if year_text.len() < 4 || !year_text.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let year: i32 = year_text.parse().ok()?;

    let mut time_fields = time_part.splitn(3, ':');
    let hour: u32 = time_fields.next()?.parse().ok()?;
    let minute: u32 = time_fields.next()?.parse().ok()?;
    let second: u32 = time_fields.next()?.parse().ok()?;

    NaiveDate::from_ymd_opt(year, month, day)?
        .and_hms_opt(hour, minute, second)
        .map(|dt| dt.and_utc())
}
