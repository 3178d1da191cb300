//! Literal parsers for the Forthic interpreter.
//!
//! Each parser maps a lexeme to a [`Value`], returning `None` when the
//! lexeme is not that kind of literal. The interpreter tries the standard
//! parsers in a fixed order (bool, float, zoned datetime, date, time, int)
//! and then any custom handlers in registration order; the first hit wins
//! and becomes a push-value word.

use std::sync::OnceLock;

use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;
use regex::Regex;

use crate::values::Value;

/// A custom literal parser registered with the interpreter.
pub type LiteralHandler = Box<dyn Fn(&str) -> Option<Value> + Send + Sync>;

fn time_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^(\d{1,2}):(\d{2})(?:\s*(AM|PM))?$").expect("valid regex"))
}

fn date_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^(\d{4}|YYYY)-(\d{2}|MM)-(\d{2}|DD)$").expect("valid regex"))
}

fn offset_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[+-]\d{2}:\d{2}$").expect("valid regex"))
}

/// Parse `TRUE` / `FALSE`. Case-sensitive.
pub fn to_bool(s: &str) -> Option<Value> {
    match s {
        "TRUE" => Some(Value::Bool(true)),
        "FALSE" => Some(Value::Bool(false)),
        _ => None,
    }
}

/// Parse a float literal. Must contain a decimal point, so bare integers
/// fall through to the int parser.
pub fn to_float(s: &str) -> Option<Value> {
    if !s.contains('.') {
        return None;
    }
    s.parse::<f64>().ok().map(Value::Float)
}

/// Parse a decimal integer. Round-trips the result against the input so
/// partial parses like `42abc` are rejected.
pub fn to_int(s: &str) -> Option<Value> {
    if s.contains('.') {
        return None;
    }
    let result = s.parse::<i64>().ok()?;
    if result.to_string() != s {
        return None;
    }
    Some(Value::Int(result))
}

/// Parse a time literal: `9:00`, `22:15`, `11:30 PM`.
///
/// `PM` with an hour below 12 adds 12; `AM` with hour 12 wraps to 0; `AM`
/// with an hour above 12 subtracts 12 (so `22:15 AM` reads as `10:15`).
pub fn to_time(s: &str) -> Option<Value> {
    let caps = time_re().captures(s)?;
    let mut hours: u32 = caps.get(1)?.as_str().parse().ok()?;
    let minutes: u32 = caps.get(2)?.as_str().parse().ok()?;

    match caps.get(3).map(|m| m.as_str()) {
        Some("PM") if hours < 12 => hours += 12,
        Some("AM") if hours == 12 => hours = 0,
        Some("AM") if hours > 12 => hours -= 12,
        _ => {}
    }

    if hours > 23 || minutes >= 60 {
        return None;
    }
    NaiveTime::from_hms_opt(hours, minutes, 0).map(Value::Time)
}

/// Parse a date literal: `2020-06-05`, with `YYYY`/`MM`/`DD` wildcards
/// substituted from today in the given timezone.
pub fn to_date(s: &str, timezone: &Tz) -> Option<Value> {
    let caps = date_re().captures(s)?;
    let today = Utc::now().with_timezone(timezone);

    let year = match caps.get(1)?.as_str() {
        "YYYY" => today.year(),
        y => y.parse().ok()?,
    };
    let month = match caps.get(2)?.as_str() {
        "MM" => today.month(),
        m => m.parse().ok()?,
    };
    let day = match caps.get(3)?.as_str() {
        "DD" => today.day(),
        d => d.parse().ok()?,
    };

    NaiveDate::from_ymd_opt(year, month, day).map(Value::Date)
}

/// Parse a zoned datetime literal. Must contain `T`.
///
/// Accepted forms:
/// - `2025-05-24T10:15:00Z` — result zone is UTC
/// - `2025-05-24T10:15:00-05:00` — converted to the given timezone
/// - `2025-05-24T10:15:00` — wall clock in the given timezone
/// - any of the above followed by `[<IANA>]` — the bracketed zone wins:
///   instants with an offset/Z are converted to it; bare wall clocks are
///   interpreted in it. An invalid IANA name rejects the literal.
pub fn to_zoned_datetime(s: &str, timezone: &Tz) -> Option<Value> {
    if !s.contains('T') {
        return None;
    }

    let (base, forced) = split_bracketed_zone(s)?;

    if base.ends_with('Z') || offset_re().is_match(base) {
        let instant = DateTime::parse_from_rfc3339(base).ok()?;
        let tz = forced.unwrap_or(if base.ends_with('Z') {
            chrono_tz::UTC
        } else {
            *timezone
        });
        return Some(Value::DateTime(instant.with_timezone(&tz)));
    }

    let naive = parse_naive_datetime(base)?;
    let tz = forced.unwrap_or(*timezone);
    tz.from_local_datetime(&naive).earliest().map(Value::DateTime)
}

/// Split a trailing `[IANA]` suffix. Returns `None` when a bracket suffix
/// exists but does not name a known timezone.
fn split_bracketed_zone(s: &str) -> Option<(&str, Option<Tz>)> {
    let stripped = match s.strip_suffix(']') {
        Some(stripped) => stripped,
        None => return Some((s, None)),
    };
    let open = stripped.rfind('[')?;
    let tz: Tz = stripped[open + 1..].parse().ok()?;
    Some((&s[..open], Some(tz)))
}

fn parse_naive_datetime(s: &str) -> Option<NaiveDateTime> {
    NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S")
        .or_else(|_| NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M"))
        .ok()
}

/// Build a registerable handler from the date parser bound to a timezone.
pub fn date_handler(timezone: Tz) -> LiteralHandler {
    Box::new(move |s| to_date(s, &timezone))
}

/// Build a registerable handler from the zoned-datetime parser bound to a
/// timezone.
pub fn zoned_datetime_handler(timezone: Tz) -> LiteralHandler {
    Box::new(move |s| to_zoned_datetime(s, &timezone))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Timelike;

    #[test]
    fn test_to_bool() {
        assert_eq!(to_bool("TRUE"), Some(Value::Bool(true)));
        assert_eq!(to_bool("FALSE"), Some(Value::Bool(false)));
        assert_eq!(to_bool("true"), None);
        assert_eq!(to_bool("True"), None);
    }

    #[test]
    fn test_to_int() {
        assert_eq!(to_int("42"), Some(Value::Int(42)));
        assert_eq!(to_int("-10"), Some(Value::Int(-10)));
        assert_eq!(to_int("0"), Some(Value::Int(0)));
        assert_eq!(to_int("3.14"), None);
        assert_eq!(to_int("42abc"), None);
        assert_eq!(to_int("+5"), None);
    }

    #[test]
    fn test_to_float() {
        assert_eq!(to_float("3.14"), Some(Value::Float(3.14)));
        assert_eq!(to_float("-2.5"), Some(Value::Float(-2.5)));
        assert_eq!(to_float("42"), None);
        assert_eq!(to_float("abc.def"), None);
    }

    #[test]
    fn test_to_time_24_hour() {
        let Some(Value::Time(t)) = to_time("14:30") else {
            panic!("expected time");
        };
        assert_eq!((t.hour(), t.minute()), (14, 30));
    }

    #[test]
    fn test_to_time_meridiem() {
        let Some(Value::Time(t)) = to_time("2:30 PM") else {
            panic!("expected time");
        };
        assert_eq!(t.hour(), 14);

        let Some(Value::Time(t)) = to_time("12:00 AM") else {
            panic!("expected time");
        };
        assert_eq!(t.hour(), 0);

        let Some(Value::Time(t)) = to_time("12:00 PM") else {
            panic!("expected time");
        };
        assert_eq!(t.hour(), 12);

        // Anomaly: AM with hour > 12 subtracts 12.
        let Some(Value::Time(t)) = to_time("22:15 AM") else {
            panic!("expected time");
        };
        assert_eq!(t.hour(), 10);
    }

    #[test]
    fn test_to_time_rejects_out_of_range() {
        assert_eq!(to_time("25:00"), None);
        assert_eq!(to_time("12:60"), None);
        assert_eq!(to_time("12:30:45"), None);
        assert_eq!(to_time("abc"), None);
    }

    #[test]
    fn test_to_date() {
        let Some(Value::Date(d)) = to_date("2023-12-25", &chrono_tz::UTC) else {
            panic!("expected date");
        };
        assert_eq!((d.year(), d.month(), d.day()), (2023, 12, 25));
    }

    #[test]
    fn test_to_date_wildcards() {
        let today = Utc::now().with_timezone(&chrono_tz::UTC);
        let Some(Value::Date(d)) = to_date("YYYY-12-25", &chrono_tz::UTC) else {
            panic!("expected date");
        };
        assert_eq!(d.year(), today.year());
        assert_eq!((d.month(), d.day()), (12, 25));

        assert!(to_date("2023-MM-25", &chrono_tz::UTC).is_some());
        assert!(to_date("2023-12-DD", &chrono_tz::UTC).is_some());
    }

    #[test]
    fn test_to_date_rejects_invalid() {
        assert_eq!(to_date("2023-13-01", &chrono_tz::UTC), None);
        assert_eq!(to_date("2023-12-32", &chrono_tz::UTC), None);
        assert_eq!(to_date("23-12-25", &chrono_tz::UTC), None);
        assert_eq!(to_date("not-a-date", &chrono_tz::UTC), None);
    }

    #[test]
    fn test_zoned_datetime_z_suffix_is_utc() {
        let tz: Tz = "America/New_York".parse().unwrap();
        let Some(Value::DateTime(dt)) = to_zoned_datetime("2025-05-24T10:15:00Z", &tz) else {
            panic!("expected datetime");
        };
        assert_eq!(dt.timezone().name(), "UTC");
        assert_eq!(dt.hour(), 10);
    }

    #[test]
    fn test_zoned_datetime_offset_converts_to_default() {
        let tz: Tz = "UTC".parse().unwrap();
        let Some(Value::DateTime(dt)) = to_zoned_datetime("2025-05-24T10:15:00-05:00", &tz) else {
            panic!("expected datetime");
        };
        assert_eq!(dt.timezone().name(), "UTC");
        assert_eq!(dt.hour(), 15);
    }

    #[test]
    fn test_zoned_datetime_naive_uses_default() {
        let tz: Tz = "America/Los_Angeles".parse().unwrap();
        let Some(Value::DateTime(dt)) = to_zoned_datetime("2025-05-24T10:15:00", &tz) else {
            panic!("expected datetime");
        };
        assert_eq!(dt.timezone().name(), "America/Los_Angeles");
        assert_eq!(dt.hour(), 10);
    }

    #[test]
    fn test_zoned_datetime_bracket_forces_zone() {
        let tz: Tz = "UTC".parse().unwrap();
        let Some(Value::DateTime(dt)) =
            to_zoned_datetime("2025-05-20T08:00:00[America/Los_Angeles]", &tz)
        else {
            panic!("expected datetime");
        };
        assert_eq!(dt.timezone().name(), "America/Los_Angeles");
        assert_eq!(dt.hour(), 8);
        // Same instant in UTC: 8 AM PDT is 3 PM UTC.
        assert_eq!(dt.with_timezone(&chrono_tz::UTC).hour(), 15);
    }

    #[test]
    fn test_zoned_datetime_offset_with_bracket_converts() {
        let tz: Tz = "America/New_York".parse().unwrap();
        let Some(Value::DateTime(dt)) =
            to_zoned_datetime("2025-05-20T08:00:00-07:00[America/Los_Angeles]", &tz)
        else {
            panic!("expected datetime");
        };
        assert_eq!(dt.timezone().name(), "America/Los_Angeles");
        assert_eq!(dt.hour(), 8);
    }

    #[test]
    fn test_zoned_datetime_rejects_bad_input() {
        let tz: Tz = "UTC".parse().unwrap();
        assert_eq!(to_zoned_datetime("2025-05-20", &tz), None);
        assert_eq!(to_zoned_datetime("2025-13-45T10:15:00", &tz), None);
        assert_eq!(
            to_zoned_datetime("2025-05-20T08:00:00[Invalid/Zone]", &tz),
            None
        );
        assert_eq!(to_zoned_datetime("[America/Los_Angeles]", &tz), None);
    }

    #[test]
    fn test_handler_factories() {
        let handler = zoned_datetime_handler("UTC".parse().unwrap());
        assert!(handler("2025-05-24T10:15:00Z").is_some());
        assert!(handler("not-a-datetime").is_none());

        let handler = date_handler("UTC".parse().unwrap());
        assert!(handler("2025-05-24").is_some());
    }
}
