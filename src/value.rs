//! Typed bind values and the generic row record
//!
//! `SqlValue` is the single value type that flows through bind maps,
//! result rows and model attributes. Adapters translate it to and from
//! their driver's native types.

use std::collections::BTreeMap;
use std::fmt;

use serde_json::Value as JsonValue;

/// A result row or attribute set: column name to value, ordered by name.
pub type Record = BTreeMap<String, SqlValue>;

/// Value enumeration for type-safe parameter binding
#[derive(Debug, Clone, Default, PartialEq)]
pub enum SqlValue {
    #[default]
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    Uuid(uuid::Uuid),
    DateTime(chrono::DateTime<chrono::Utc>),
    Date(chrono::NaiveDate),
}

impl SqlValue {
    pub fn is_null(&self) -> bool {
        matches!(self, SqlValue::Null)
    }

    /// True for NULL and for the empty string, which the engine treats
    /// as "no value" when deciding whether an identity column is set.
    pub fn is_unset(&self) -> bool {
        matches!(self, SqlValue::Null) || matches!(self, SqlValue::String(s) if s.is_empty())
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            SqlValue::Int(i) => Some(*i),
            SqlValue::Float(f) if f.fract() == 0.0 => Some(*f as i64),
            SqlValue::String(s) => s.parse().ok(),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            SqlValue::String(s) => Some(s),
            _ => None,
        }
    }

    /// Render as a SQL literal; only used to reconstruct diagnostic SQL
    /// for error messages, never for execution.
    pub fn literal(&self) -> String {
        match self {
            SqlValue::Null => "NULL".to_string(),
            SqlValue::Bool(b) => b.to_string(),
            SqlValue::Int(i) => i.to_string(),
            SqlValue::Float(f) => f.to_string(),
            SqlValue::String(s) => format!("'{}'", s.replace('\'', "''")),
            SqlValue::Uuid(u) => format!("'{}'", u),
            SqlValue::DateTime(dt) => format!("'{}'", dt.to_rfc3339()),
            SqlValue::Date(d) => format!("'{}'", d),
        }
    }

    pub fn to_json(&self) -> JsonValue {
        match self {
            SqlValue::Null => JsonValue::Null,
            SqlValue::Bool(b) => JsonValue::Bool(*b),
            SqlValue::Int(i) => JsonValue::Number(serde_json::Number::from(*i)),
            SqlValue::Float(f) => serde_json::Number::from_f64(*f)
                .map(JsonValue::Number)
                .unwrap_or(JsonValue::Null),
            SqlValue::String(s) => JsonValue::String(s.clone()),
            SqlValue::Uuid(u) => JsonValue::String(u.to_string()),
            SqlValue::DateTime(dt) => JsonValue::String(dt.to_rfc3339()),
            SqlValue::Date(d) => JsonValue::String(d.to_string()),
        }
    }

    pub fn from_json(json: &JsonValue) -> SqlValue {
        match json {
            JsonValue::Null => SqlValue::Null,
            JsonValue::Bool(b) => SqlValue::Bool(*b),
            JsonValue::Number(n) => {
                if let Some(i) = n.as_i64() {
                    SqlValue::Int(i)
                } else {
                    SqlValue::Float(n.as_f64().unwrap_or(0.0))
                }
            }
            JsonValue::String(s) => SqlValue::String(s.clone()),
            other => SqlValue::String(other.to_string()),
        }
    }
}

impl serde::Serialize for SqlValue {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_json().serialize(serializer)
    }
}

impl fmt::Display for SqlValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SqlValue::Null => write!(f, "NULL"),
            SqlValue::Bool(b) => write!(f, "{}", b),
            SqlValue::Int(i) => write!(f, "{}", i),
            SqlValue::Float(v) => write!(f, "{}", v),
            SqlValue::String(s) => write!(f, "{}", s),
            SqlValue::Uuid(u) => write!(f, "{}", u),
            SqlValue::DateTime(dt) => write!(f, "{}", dt.to_rfc3339()),
            SqlValue::Date(d) => write!(f, "{}", d),
        }
    }
}

impl From<bool> for SqlValue {
    fn from(value: bool) -> Self {
        SqlValue::Bool(value)
    }
}

impl From<i32> for SqlValue {
    fn from(value: i32) -> Self {
        SqlValue::Int(value as i64)
    }
}

impl From<i64> for SqlValue {
    fn from(value: i64) -> Self {
        SqlValue::Int(value)
    }
}

impl From<u32> for SqlValue {
    fn from(value: u32) -> Self {
        SqlValue::Int(value as i64)
    }
}

impl From<f64> for SqlValue {
    fn from(value: f64) -> Self {
        SqlValue::Float(value)
    }
}

impl From<String> for SqlValue {
    fn from(value: String) -> Self {
        SqlValue::String(value)
    }
}

impl From<&str> for SqlValue {
    fn from(value: &str) -> Self {
        SqlValue::String(value.to_string())
    }
}

impl From<uuid::Uuid> for SqlValue {
    fn from(value: uuid::Uuid) -> Self {
        SqlValue::Uuid(value)
    }
}

impl From<chrono::DateTime<chrono::Utc>> for SqlValue {
    fn from(value: chrono::DateTime<chrono::Utc>) -> Self {
        SqlValue::DateTime(value)
    }
}

impl From<chrono::NaiveDate> for SqlValue {
    fn from(value: chrono::NaiveDate) -> Self {
        SqlValue::Date(value)
    }
}

impl<T> From<Option<T>> for SqlValue
where
    T: Into<SqlValue>,
{
    fn from(value: Option<T>) -> Self {
        match value {
            Some(v) => v.into(),
            None => SqlValue::Null,
        }
    }
}

/// Convert a result row into a generic untyped object.
pub fn record_to_object(record: &Record) -> JsonValue {
    let mut map = serde_json::Map::new();
    for (column, value) in record {
        map.insert(column.clone(), value.to_json());
    }
    JsonValue::Object(map)
}
