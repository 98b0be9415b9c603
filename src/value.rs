// 🧱 Field Values - what the store hands us and what we hand back
//
// The store is loosely typed: booleans come back as integers, money may come
// back as a float, a decimal string or an exact decimal depending on the file.
// FieldValue is the one shape every layer agrees on.

use chrono::NaiveDateTime;
use rusqlite::types::{ToSqlOutput, Value, ValueRef};
use rusqlite::ToSql;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Text format used when a datetime is written to the store
pub const DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

// ============================================================================
// FIELD VALUE
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FieldValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Decimal(Decimal),
    Text(String),
    DateTime(NaiveDateTime),
    Blob(Vec<u8>),
}

impl FieldValue {
    pub fn is_null(&self) -> bool {
        matches!(self, FieldValue::Null)
    }

    /// Integer view of a key cell. Only true integers qualify; keys are
    /// matched by exact equality, never by parsing text.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            FieldValue::Int(v) => Some(*v),
            _ => None,
        }
    }

    /// Compare a stored value against a value we required.
    ///
    /// SQLite-style stores lose the declared type on the way back, so
    /// `Bool(true)` matches `Int(1)` and decimals match any numeric or text
    /// representation of the same number.
    pub fn loosely_equals(&self, other: &FieldValue) -> bool {
        use FieldValue::*;

        match (self, other) {
            (Null, Null) => true,
            (Null, _) | (_, Null) => false,
            (Bool(a), Bool(b)) => a == b,
            (Bool(a), Int(b)) | (Int(b), Bool(a)) => i64::from(*a) == *b,
            (DateTime(a), DateTime(b)) => a == b,
            (DateTime(a), Text(b)) | (Text(b), DateTime(a)) => parse_datetime(b) == Some(*a),
            (Text(a), Text(b)) => a == b,
            (Blob(a), Blob(b)) => a == b,
            _ => match (self.to_decimal(), other.to_decimal()) {
                (Some(a), Some(b)) => a == b,
                _ => false,
            },
        }
    }

    /// Exact decimal view of a numeric cell, if it has one.
    ///
    /// Floats go through their shortest round-trip decimal text, so a stored
    /// `0.1` becomes exactly `0.1` rather than the binary expansion.
    pub fn to_decimal(&self) -> Option<Decimal> {
        match self {
            FieldValue::Decimal(d) => Some(*d),
            FieldValue::Int(i) => Some(Decimal::from(*i)),
            FieldValue::Float(f) if f.is_finite() => Decimal::from_str(&f.to_string())
                .or_else(|_| Decimal::from_scientific(&format!("{:e}", f)))
                .ok(),
            FieldValue::Text(s) => {
                let trimmed = s.trim();
                Decimal::from_str(trimmed)
                    .or_else(|_| Decimal::from_scientific(trimmed))
                    .ok()
            }
            _ => None,
        }
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Null => write!(f, "null"),
            FieldValue::Bool(b) => write!(f, "{}", b),
            FieldValue::Int(i) => write!(f, "{}", i),
            FieldValue::Float(v) => write!(f, "{}", v),
            FieldValue::Decimal(d) => write!(f, "{}", d),
            FieldValue::Text(s) => write!(f, "{}", s),
            FieldValue::DateTime(dt) => write!(f, "{}", dt.format(DATETIME_FORMAT)),
            FieldValue::Blob(b) => write!(f, "<{} bytes>", b.len()),
        }
    }
}

impl From<bool> for FieldValue {
    fn from(v: bool) -> Self {
        FieldValue::Bool(v)
    }
}

impl From<i64> for FieldValue {
    fn from(v: i64) -> Self {
        FieldValue::Int(v)
    }
}

impl From<Decimal> for FieldValue {
    fn from(v: Decimal) -> Self {
        FieldValue::Decimal(v)
    }
}

impl From<&str> for FieldValue {
    fn from(v: &str) -> Self {
        FieldValue::Text(v.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(v: String) -> Self {
        FieldValue::Text(v)
    }
}

impl From<NaiveDateTime> for FieldValue {
    fn from(v: NaiveDateTime) -> Self {
        FieldValue::DateTime(v)
    }
}

impl<T: Into<FieldValue>> From<Option<T>> for FieldValue {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(FieldValue::Null)
    }
}

fn parse_datetime(s: &str) -> Option<NaiveDateTime> {
    NaiveDateTime::parse_from_str(s, DATETIME_FORMAT)
        .or_else(|_| NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f"))
        .ok()
}

// ============================================================================
// SQLITE BINDING
// ============================================================================

impl ToSql for FieldValue {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        let value = match self {
            FieldValue::Null => Value::Null,
            FieldValue::Bool(b) => Value::Integer(i64::from(*b)),
            FieldValue::Int(i) => Value::Integer(*i),
            FieldValue::Float(f) => Value::Real(*f),
            // Decimal text keeps the exact digits; column affinity decides the rest
            FieldValue::Decimal(d) => Value::Text(d.to_string()),
            FieldValue::Text(s) => return Ok(ToSqlOutput::Borrowed(ValueRef::Text(s.as_bytes()))),
            FieldValue::DateTime(dt) => Value::Text(dt.format(DATETIME_FORMAT).to_string()),
            FieldValue::Blob(b) => return Ok(ToSqlOutput::Borrowed(ValueRef::Blob(b.as_slice()))),
        };
        Ok(ToSqlOutput::Owned(value))
    }
}

impl From<ValueRef<'_>> for FieldValue {
    fn from(value: ValueRef<'_>) -> Self {
        match value {
            ValueRef::Null => FieldValue::Null,
            ValueRef::Integer(i) => FieldValue::Int(i),
            ValueRef::Real(f) => FieldValue::Float(f),
            ValueRef::Text(t) => FieldValue::Text(String::from_utf8_lossy(t).into_owned()),
            ValueRef::Blob(b) => FieldValue::Blob(b.to_vec()),
        }
    }
}

// ============================================================================
// RECORD
// ============================================================================

/// One scanned row: column names in store order, each with its value
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Record {
    fields: Vec<(String, FieldValue)>,
}

impl Record {
    pub fn new(fields: Vec<(String, FieldValue)>) -> Self {
        Record { fields }
    }

    pub fn get(&self, column: &str) -> Option<&FieldValue> {
        self.fields
            .iter()
            .find(|(name, _)| name == column)
            .map(|(_, value)| value)
    }

    pub fn contains(&self, column: &str) -> bool {
        self.fields.iter().any(|(name, _)| name == column)
    }

    pub fn fields(&self) -> &[(String, FieldValue)] {
        &self.fields
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}
