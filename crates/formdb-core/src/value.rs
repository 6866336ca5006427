//! The closed set of value types and the tagged `Value` carried in records.
//!
//! Every slot of a record and every bound SQL parameter is one of these
//! variants. Drivers map them to their native representation; nothing else is
//! ever bound.

use std::fmt;

use serde::{Deserialize, Serialize, Serializer};
use time::format_description::well_known::Rfc3339;
use time::macros::format_description;
use time::{Date, OffsetDateTime};

/// The value type of a field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueType {
    /// Free text.
    Text,
    /// 64-bit signed integer.
    Integer,
    /// 64-bit float.
    Decimal,
    /// True/false.
    Boolean,
    /// Calendar date without time.
    Date,
    /// UTC instant.
    Timestamp,
}

impl ValueType {
    /// Lowercase name, as used in messages and metadata files.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            ValueType::Text => "text",
            ValueType::Integer => "integer",
            ValueType::Decimal => "decimal",
            ValueType::Boolean => "boolean",
            ValueType::Date => "date",
            ValueType::Timestamp => "timestamp",
        }
    }

    /// Parse a value type name (case-insensitive).
    ///
    /// Returns `None` if the string is not a recognized type.
    #[must_use]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "text" | "string" => Some(ValueType::Text),
            "integer" | "int" | "long" => Some(ValueType::Integer),
            "decimal" | "double" | "float" => Some(ValueType::Decimal),
            "boolean" | "bool" => Some(ValueType::Boolean),
            "date" => Some(ValueType::Date),
            "timestamp" | "datetime" | "instant" => Some(ValueType::Timestamp),
            _ => None,
        }
    }

    /// Parse client-supplied text into a value of this type.
    ///
    /// Text is taken as is. Other types ignore surrounding whitespace. An
    /// integer accepts fractional input and truncates it toward zero, since
    /// clients routinely send `"12.0"` for whole numbers.
    #[must_use]
    pub fn parse(self, text: &str) -> Option<Value> {
        match self {
            ValueType::Text => Some(Value::Text(text.to_string())),
            ValueType::Integer => parse_integer(text.trim()).map(Value::Integer),
            ValueType::Decimal => text
                .trim()
                .parse::<f64>()
                .ok()
                .filter(|f| f.is_finite())
                .map(Value::Decimal),
            ValueType::Boolean => parse_boolean(text.trim()).map(Value::Boolean),
            ValueType::Date => parse_date(text.trim()).map(Value::Date),
            ValueType::Timestamp => OffsetDateTime::parse(text.trim(), &Rfc3339)
                .ok()
                .map(Value::Timestamp),
        }
    }

    /// Convert a JSON scalar into a value of this type.
    ///
    /// JSON `null` maps to `Value::Null`. Strings go through [`ValueType::parse`];
    /// numbers and booleans are converted directly where that is lossless
    /// enough to be unsurprising. Arrays and objects are rejected.
    #[must_use]
    pub fn parse_json(self, json: &serde_json::Value) -> Option<Value> {
        match json {
            serde_json::Value::Null => Some(Value::Null),
            serde_json::Value::String(s) => self.parse(s),
            serde_json::Value::Number(n) => match self {
                ValueType::Text => Some(Value::Text(n.to_string())),
                ValueType::Integer => n
                    .as_i64()
                    .or_else(|| n.as_f64().and_then(truncate))
                    .map(Value::Integer),
                ValueType::Decimal => n.as_f64().map(Value::Decimal),
                ValueType::Boolean => match n.as_i64() {
                    Some(0) => Some(Value::Boolean(false)),
                    Some(1) => Some(Value::Boolean(true)),
                    _ => None,
                },
                ValueType::Date | ValueType::Timestamp => None,
            },
            serde_json::Value::Bool(b) => match self {
                ValueType::Boolean => Some(Value::Boolean(*b)),
                ValueType::Text => Some(Value::Text(b.to_string())),
                _ => None,
            },
            serde_json::Value::Array(_) | serde_json::Value::Object(_) => None,
        }
    }

    /// Whether `value` may be stored in a slot of this type (null always may).
    #[must_use]
    pub fn accepts(self, value: &Value) -> bool {
        value.value_type().is_none_or(|t| t == self)
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn parse_integer(text: &str) -> Option<i64> {
    text.parse::<i64>()
        .ok()
        .or_else(|| text.parse::<f64>().ok().and_then(truncate))
}

#[allow(clippy::cast_possible_truncation)]
fn truncate(f: f64) -> Option<i64> {
    if f.is_finite() && f.abs() < 9.2e18 {
        Some(f.trunc() as i64)
    } else {
        None
    }
}

fn parse_boolean(text: &str) -> Option<bool> {
    if text == "1" || text.eq_ignore_ascii_case("true") {
        Some(true)
    } else if text == "0" || text.eq_ignore_ascii_case("false") {
        Some(false)
    } else {
        None
    }
}

/// Parse a `YYYY-MM-DD` date.
#[must_use]
pub fn parse_date(text: &str) -> Option<Date> {
    Date::parse(text, format_description!("[year]-[month]-[day]")).ok()
}

/// Format a date as `YYYY-MM-DD`.
#[must_use]
pub fn format_date(date: Date) -> String {
    date.format(format_description!("[year]-[month]-[day]"))
        .unwrap_or_else(|_| date.to_string())
}

/// Format a timestamp as RFC 3339 text.
#[must_use]
pub fn format_timestamp(ts: OffsetDateTime) -> String {
    ts.format(&Rfc3339).unwrap_or_else(|_| ts.to_string())
}

/// A single field value.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Value {
    /// Absent value.
    #[default]
    Null,
    Text(String),
    Integer(i64),
    Decimal(f64),
    Boolean(bool),
    Date(Date),
    Timestamp(OffsetDateTime),
}

impl Value {
    /// Check if this value is NULL.
    pub const fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Type of the value, `None` for NULL.
    pub const fn value_type(&self) -> Option<ValueType> {
        match self {
            Value::Null => None,
            Value::Text(_) => Some(ValueType::Text),
            Value::Integer(_) => Some(ValueType::Integer),
            Value::Decimal(_) => Some(ValueType::Decimal),
            Value::Boolean(_) => Some(ValueType::Boolean),
            Value::Date(_) => Some(ValueType::Date),
            Value::Timestamp(_) => Some(ValueType::Timestamp),
        }
    }

    /// True for NULL and for integer zero.
    ///
    /// A generated-key slot holding either means "not yet persisted".
    pub const fn is_unset_key(&self) -> bool {
        matches!(self, Value::Null | Value::Integer(0))
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    pub const fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Integer(v) => Some(*v),
            _ => None,
        }
    }

    pub const fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Decimal(v) => Some(*v),
            _ => None,
        }
    }

    pub const fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Boolean(v) => Some(*v),
            _ => None,
        }
    }

    pub const fn as_date(&self) -> Option<Date> {
        match self {
            Value::Date(v) => Some(*v),
            _ => None,
        }
    }

    pub const fn as_timestamp(&self) -> Option<OffsetDateTime> {
        match self {
            Value::Timestamp(v) => Some(*v),
            _ => None,
        }
    }

    /// Render as a JSON scalar. Dates and timestamps become text.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::Null => serde_json::Value::Null,
            Value::Text(s) => serde_json::Value::String(s.clone()),
            Value::Integer(v) => serde_json::Value::from(*v),
            Value::Decimal(v) => serde_json::Number::from_f64(*v)
                .map_or(serde_json::Value::Null, serde_json::Value::Number),
            Value::Boolean(v) => serde_json::Value::Bool(*v),
            Value::Date(d) => serde_json::Value::String(format_date(*d)),
            Value::Timestamp(ts) => serde_json::Value::String(format_timestamp(*ts)),
        }
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_json().serialize(serializer)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("NULL"),
            Value::Text(s) => write!(f, "'{s}'"),
            Value::Integer(v) => write!(f, "{v}"),
            Value::Decimal(v) => write!(f, "{v}"),
            Value::Boolean(v) => write!(f, "{v}"),
            Value::Date(d) => write!(f, "'{}'", format_date(*d)),
            Value::Timestamp(ts) => write!(f, "'{}'", format_timestamp(*ts)),
        }
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Integer(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Integer(i64::from(v))
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Decimal(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Boolean(v)
    }
}

impl From<Date> for Value {
    fn from(v: Date) -> Self {
        Value::Date(v)
    }
}

impl From<OffsetDateTime> for Value {
    fn from(v: OffsetDateTime) -> Self {
        Value::Timestamp(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Value::Null, Into::into)
    }
}
