pub mod actions;
pub mod events;
pub mod fuzzy;
pub mod keywords;
pub mod lists;
pub mod sounds;
pub mod stats;
pub mod types;
pub mod voice;

use anyhow::{anyhow, Result};
use chrono::{DateTime, NaiveDateTime, Timelike, Utc};

/// Storage format for every timestamp column. Lexical order equals time order.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Current UTC time truncated to whole seconds.
pub fn now() -> NaiveDateTime {
    let now = Utc::now().naive_utc();
    now.with_nanosecond(0).unwrap_or(now)
}

/// Render a timestamp in the stored column format.
pub fn format_timestamp(ts: &NaiveDateTime) -> String {
    ts.format(TIMESTAMP_FORMAT).to_string()
}

/// Parse a timestamp written by this crate or by an older writer.
///
/// Accepts `YYYY-MM-DD HH:MM:SS`, `YYYY-MM-DDTHH:MM:SS` (both with optional
/// fractional seconds) and RFC 3339 with any offset, normalized to UTC.
pub fn parse_timestamp(raw: &str) -> Result<NaiveDateTime> {
    let raw = raw.trim();
    for fmt in ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"] {
        if let Ok(ts) = NaiveDateTime::parse_from_str(raw, fmt) {
            return Ok(ts);
        }
    }
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc).naive_utc())
        .map_err(|_| anyhow!("unrecognized timestamp: {raw}"))
}

/// Read a required timestamp column.
pub(crate) fn ts_column(row: &rusqlite::Row<'_>, idx: usize) -> rusqlite::Result<NaiveDateTime> {
    let raw: String = row.get(idx)?;
    parse_timestamp(&raw).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, e.into())
    })
}

/// Read a nullable timestamp column.
pub(crate) fn opt_ts_column(
    row: &rusqlite::Row<'_>,
    idx: usize,
) -> rusqlite::Result<Option<NaiveDateTime>> {
    let raw: Option<String> = row.get(idx)?;
    raw.map(|r| {
        parse_timestamp(&r).map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, e.into())
        })
    })
    .transpose()
}

/// Lower bound for a trailing `days` window; `0` means unbounded history.
///
/// A window reaching past the earliest representable date is unbounded too.
pub(crate) fn window_start(now: NaiveDateTime, days: u32) -> Option<NaiveDateTime> {
    if days == 0 {
        return None;
    }
    let start = chrono::Duration::try_days(i64::from(days)).and_then(|d| now.checked_sub_signed(d));
    if start.is_none() {
        tracing::debug!(days, "window exceeds calendar range, treating as unbounded");
    }
    start
}

/// Repository boundary: log a store failure and fall back to the empty value.
pub(crate) fn degrade<T: Default>(op: &str, result: Result<T>) -> T {
    match result {
        Ok(value) => value,
        Err(e) => {
            tracing::error!(op, error = %format!("{e:#}"), "store operation failed");
            T::default()
        }
    }
}
