//! Boundary serialization of stack values.
//!
//! When the core is embedded behind an RPC, each stack value maps to a
//! [`WireValue`]: null, bool, integer, float, string, array, record, zoned
//! datetime (ISO-8601 with an `[IANA]` bracket), plain date, or instant
//! (ISO UTC). Zoned datetimes round-trip through the zoned-datetime literal
//! parser, so the bracket extension is part of the wire contract.
//!
//! Times, variable handles, word handles, and the array sentinel have no
//! wire form and are rejected.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use chrono_tz::Tz;
use thiserror::Error;

use crate::literals;
use crate::utils;
use crate::values::Value;

/// Errors raised while crossing the wire boundary.
#[derive(Error, Debug)]
pub enum WireError {
    #[error("Unsupported value on the wire: {0}")]
    Unsupported(String),

    #[error("Malformed wire value: {0}")]
    Malformed(String),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

/// Wire representation of a stack value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum WireValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    Array(Vec<WireValue>),
    Record(IndexMap<String, WireValue>),
    /// ISO-8601 with `[IANA]` bracket, e.g.
    /// `2025-01-15T10:30:00-05:00[America/New_York]`.
    ZonedDatetime(String),
    /// ISO date, e.g. `2025-01-15`.
    PlainDate(String),
    /// ISO-8601 UTC instant, e.g. `2025-01-15T15:30:00Z`.
    Instant(String),
}

/// Map a stack value to its wire form. Positioned strings decay to plain
/// strings.
pub fn to_wire(value: &Value) -> Result<WireValue, WireError> {
    match value {
        Value::Null => Ok(WireValue::Null),
        Value::Bool(b) => Ok(WireValue::Bool(*b)),
        Value::Int(i) => Ok(WireValue::Int(*i)),
        Value::Float(f) => Ok(WireValue::Float(*f)),
        Value::String(s) => Ok(WireValue::String(s.clone())),
        Value::PositionedString(ps) => Ok(WireValue::String(ps.value().to_string())),
        Value::Date(d) => Ok(WireValue::PlainDate(utils::format_date(d))),
        Value::DateTime(dt) => Ok(WireValue::ZonedDatetime(utils::format_zoned_datetime(dt))),
        Value::Array(items) => {
            let wire_items: Result<Vec<WireValue>, WireError> = items.iter().map(to_wire).collect();
            Ok(WireValue::Array(wire_items?))
        }
        Value::Record(fields) => {
            let mut wire_fields = IndexMap::new();
            for (key, field) in fields {
                wire_fields.insert(key.clone(), to_wire(field)?);
            }
            Ok(WireValue::Record(wire_fields))
        }
        Value::Time(_) => Err(WireError::Unsupported("time".to_string())),
        Value::Variable(_) => Err(WireError::Unsupported("variable handle".to_string())),
        Value::Word(word) => Err(WireError::Unsupported(format!("word {}", word.name()))),
        Value::ArrayMarker => Err(WireError::Unsupported("array marker".to_string())),
    }
}

/// Map a wire value back to a stack value. Zoned datetimes are parsed by
/// the zoned-datetime literal parser against `timezone`.
pub fn from_wire(wire: &WireValue, timezone: &Tz) -> Result<Value, WireError> {
    match wire {
        WireValue::Null => Ok(Value::Null),
        WireValue::Bool(b) => Ok(Value::Bool(*b)),
        WireValue::Int(i) => Ok(Value::Int(*i)),
        WireValue::Float(f) => Ok(Value::Float(*f)),
        WireValue::String(s) => Ok(Value::String(s.clone())),
        WireValue::Array(items) => {
            let values: Result<Vec<Value>, WireError> =
                items.iter().map(|item| from_wire(item, timezone)).collect();
            Ok(Value::Array(values?))
        }
        WireValue::Record(fields) => {
            let mut values = IndexMap::new();
            for (key, field) in fields {
                values.insert(key.clone(), from_wire(field, timezone)?);
            }
            Ok(Value::Record(values))
        }
        WireValue::ZonedDatetime(s) => literals::to_zoned_datetime(s, timezone)
            .ok_or_else(|| WireError::Malformed(format!("zoned datetime: {s}"))),
        WireValue::PlainDate(s) => utils::parse_date(s)
            .map(Value::Date)
            .ok_or_else(|| WireError::Malformed(format!("date: {s}"))),
        WireValue::Instant(s) => utils::parse_instant(s)
            .map(Value::DateTime)
            .ok_or_else(|| WireError::Malformed(format!("instant: {s}"))),
    }
}

/// Serialize a stack value to wire JSON.
pub fn to_json(value: &Value) -> Result<String, WireError> {
    Ok(serde_json::to_string(&to_wire(value)?)?)
}

/// Deserialize wire JSON into a stack value.
pub fn from_json(json: &str, timezone: &Tz) -> Result<Value, WireError> {
    let wire: WireValue = serde_json::from_str(json)?;
    from_wire(&wire, timezone)
}
