//! Date/time formatting helpers shared by the wire layer.

use chrono::{DateTime, NaiveDate, SecondsFormat, TimeZone, Utc};
use chrono_tz::Tz;

/// Format a zoned datetime as ISO-8601 with the IANA zone in brackets, e.g.
/// `2025-01-15T10:30:00-05:00[America/New_York]`. The bracket extension
/// round-trips through the zoned-datetime literal parser.
pub fn format_zoned_datetime(dt: &DateTime<Tz>) -> String {
    format!(
        "{}[{}]",
        dt.format("%Y-%m-%dT%H:%M:%S%:z"),
        dt.timezone().name()
    )
}

/// Format an instant as ISO-8601 UTC, e.g. `2025-01-15T15:30:00Z`.
pub fn format_instant<T: TimeZone>(dt: &DateTime<T>) -> String {
    dt.with_timezone(&Utc)
        .to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Parse an ISO-8601 instant into a UTC-zoned datetime.
pub fn parse_instant(s: &str) -> Option<DateTime<Tz>> {
    DateTime::parse_from_rfc3339(s)
        .ok()
        .map(|dt| dt.with_timezone(&chrono_tz::UTC))
}

/// Format a date as `YYYY-MM-DD`.
pub fn format_date(date: &NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

/// Parse a `YYYY-MM-DD` date.
pub fn parse_date(s: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").ok()
}
