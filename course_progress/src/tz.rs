//! Timestamp helpers for the TEXT columns.
//!
//! All database timestamps are RFC-3339 UTC strings with millisecond precision.
//! Writers go through [`to_rfc3339_millis`]; readers go through
//! [`parse_ts_to_utc`], which also accepts values carrying an explicit offset.
//!
//! Examples
//! - "2024-03-10T09:30:00-05:00" -> 2024-03-10T14:30:00Z
//! - 2024-03-10T14:30:00Z -> "2024-03-10T14:30:00.000Z"

use anyhow::Context;
use chrono::{DateTime, Utc};

/// RFC-3339 with offset -> UTC.
pub fn parse_ts_to_utc(s: &str) -> anyhow::Result<DateTime<Utc>> {
    let dt = DateTime::parse_from_rfc3339(s).with_context(|| format!("bad rfc3339: {s}"))?;
    Ok(dt.with_timezone(&Utc))
}

/// Same as [`parse_ts_to_utc`] for nullable columns.
pub fn parse_opt_ts_to_utc(s: Option<&str>) -> anyhow::Result<Option<DateTime<Utc>>> {
    s.map(parse_ts_to_utc).transpose()
}

/// Format a UTC datetime as an RFC-3339 string with millisecond precision.
pub fn to_rfc3339_millis(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
}
