//! Runtime values for the Forthic stack.
//!
//! The stack holds a tagged union of everything the language can produce:
//! scalars, temporal values, strings (plain and positioned), arrays,
//! insertion-ordered records, and handles to variables and words.
//!
//! Positioned strings decay to plain strings exactly at interpreter
//! pop/peek (and in [`crate::interpreter::Stack::items`]); most word
//! implementations never see them.

use std::fmt;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, NaiveDate, NaiveTime};
use chrono_tz::Tz;
use indexmap::IndexMap;

use crate::module::{Variable, Word};
use crate::tokenizer::PositionedString;

/// A value on the Forthic data stack.
#[derive(Clone)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    /// A string that remembers its source location; decays to `String` on
    /// pop/peek.
    PositionedString(PositionedString),
    Date(NaiveDate),
    Time(NaiveTime),
    DateTime(DateTime<Tz>),
    Array(Vec<Value>),
    /// Record with insertion-ordered iteration.
    Record(IndexMap<String, Value>),
    /// Handle to a module variable. Pushed by variable lookup; reads go
    /// through an explicit fetch word, so definitions capture storage
    /// locations by identity.
    Variable(Arc<Mutex<Variable>>),
    /// Handle to a word.
    Word(Arc<dyn Word>),
    /// Sentinel pushed by START_ARRAY and consumed by END_ARRAY.
    ArrayMarker,
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Decay a positioned string into a plain string; all other values pass
    /// through unchanged.
    pub fn decay(self) -> Value {
        match self {
            Value::PositionedString(ps) => Value::String(ps.into_parts().0),
            other => other,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            Value::PositionedString(ps) => Some(ps.value()),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f64> {
        match self {
            Value::Float(f) => Some(*f),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[Value]> {
        match self {
            Value::Array(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_record(&self) -> Option<&IndexMap<String, Value>> {
        match self {
            Value::Record(fields) => Some(fields),
            _ => None,
        }
    }

    pub fn as_variable(&self) -> Option<&Arc<Mutex<Variable>>> {
        match self {
            Value::Variable(var) => Some(var),
            _ => None,
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::PositionedString(a), Value::PositionedString(b)) => a == b,
            // A positioned string compares equal to its decayed form.
            (Value::String(a), Value::PositionedString(b)) => a == b.value(),
            (Value::PositionedString(a), Value::String(b)) => a.value() == b,
            (Value::Date(a), Value::Date(b)) => a == b,
            (Value::Time(a), Value::Time(b)) => a == b,
            (Value::DateTime(a), Value::DateTime(b)) => a == b,
            (Value::Array(a), Value::Array(b)) => a == b,
            (Value::Record(a), Value::Record(b)) => a == b,
            // Handles compare by identity.
            (Value::Variable(a), Value::Variable(b)) => Arc::ptr_eq(a, b),
            (Value::Word(a), Value::Word(b)) => Arc::ptr_eq(a, b),
            (Value::ArrayMarker, Value::ArrayMarker) => true,
            _ => false,
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "Null"),
            Value::Bool(b) => write!(f, "Bool({})", b),
            Value::Int(i) => write!(f, "Int({})", i),
            Value::Float(x) => write!(f, "Float({})", x),
            Value::String(s) => write!(f, "String({:?})", s),
            Value::PositionedString(ps) => write!(f, "PositionedString({:?})", ps.value()),
            Value::Date(d) => write!(f, "Date({})", d),
            Value::Time(t) => write!(f, "Time({})", t),
            Value::DateTime(dt) => write!(f, "DateTime({})", dt),
            Value::Array(items) => f.debug_tuple("Array").field(items).finish(),
            Value::Record(fields) => f.debug_tuple("Record").field(fields).finish(),
            Value::Variable(var) => {
                let name = var.lock().unwrap().name().to_string();
                write!(f, "Variable({})", name)
            }
            Value::Word(word) => write!(f, "Word({})", word.name()),
            Value::ArrayMarker => write!(f, "ArrayMarker"),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::CodeLocation;

    #[test]
    fn test_decay_positioned_string() {
        let positioned = Value::PositionedString(PositionedString::new(
            "hello",
            CodeLocation::new(1, 1, 0).with_end_pos(5),
        ));
        assert_eq!(positioned.decay(), Value::String("hello".to_string()));
    }

    #[test]
    fn test_decay_passes_other_values_through() {
        assert_eq!(Value::Int(42).decay(), Value::Int(42));
        assert_eq!(Value::Null.decay(), Value::Null);
    }

    #[test]
    fn test_positioned_string_equals_plain_string() {
        let positioned =
            Value::PositionedString(PositionedString::new("abc", CodeLocation::default()));
        assert_eq!(positioned, Value::String("abc".to_string()));
    }

    #[test]
    fn test_variable_handles_compare_by_identity() {
        let a = Arc::new(Mutex::new(Variable::new("x", Value::Null)));
        let b = Arc::new(Mutex::new(Variable::new("x", Value::Null)));
        assert_eq!(Value::Variable(a.clone()), Value::Variable(a.clone()));
        assert_ne!(Value::Variable(a), Value::Variable(b));
    }

    #[test]
    fn test_record_preserves_insertion_order() {
        let mut fields = IndexMap::new();
        fields.insert("zebra".to_string(), Value::Int(1));
        fields.insert("apple".to_string(), Value::Int(2));
        let record = Value::Record(fields);

        let keys: Vec<&String> = record.as_record().unwrap().keys().collect();
        assert_eq!(keys, vec!["zebra", "apple"]);
    }

    #[test]
    fn test_accessors() {
        assert_eq!(Value::Int(7).as_int(), Some(7));
        assert_eq!(Value::Int(7).as_float(), None);
        assert_eq!(Value::Bool(true).as_bool(), Some(true));
        assert_eq!(Value::from("hi").as_str(), Some("hi"));
        assert!(Value::Null.is_null());
    }
}
