//! Timestamp utilities

use chrono::{DateTime, SecondsFormat, SubsecRound, Utc};

use crate::{Error, Result};

/// Get current UTC timestamp, truncated to the stored precision
pub fn now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(6)
}

/// Format a timestamp for storage in a TEXT column
///
/// Fixed microsecond precision with a `Z` suffix keeps the text lexically
/// ordered the same way as the instants it encodes.
pub fn to_db_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Parse a timestamp written by [`to_db_timestamp`]
pub fn parse_db_timestamp(value: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| Error::corrupt("timestamp", format!("'{}': {}", value, e)))
}
