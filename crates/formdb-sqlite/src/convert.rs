//! Mapping between formdb values and SQLite storage classes.
//!
//! | formdb      | SQLite                                   |
//! |-------------|------------------------------------------|
//! | `Text`      | TEXT                                     |
//! | `Integer`   | INTEGER                                  |
//! | `Decimal`   | REAL                                     |
//! | `Boolean`   | INTEGER 0/1                              |
//! | `Date`      | TEXT `YYYY-MM-DD`                        |
//! | `Timestamp` | TEXT `YYYY-MM-DD HH:MM:SS.fff`, UTC      |
//!
//! Timestamps keep millisecond precision so that a concurrency stamp read
//! back from the store binds to exactly the stored text.

use rusqlite::types::{ToSql, ToSqlOutput, ValueRef};
use time::macros::format_description;
use time::{OffsetDateTime, PrimitiveDateTime, UtcOffset};

use formdb_core::value::format_date;
use formdb_core::{DatabaseError, Value, ValueType};

/// Format a timestamp the way it is stored: UTC, millisecond precision.
pub fn format_timestamp(ts: OffsetDateTime) -> String {
    let utc = ts.to_offset(UtcOffset::UTC);
    utc.format(format_description!(
        "[year]-[month]-[day] [hour]:[minute]:[second].[subsecond digits:3]"
    ))
    .unwrap_or_else(|_| utc.to_string())
}

/// Parse stored timestamp text.
///
/// Accepts the stored form with or without a fraction (`CURRENT_TIMESTAMP`
/// has none) and falls back to RFC 3339 for rows written by other tools.
pub fn parse_timestamp(text: &str) -> Option<OffsetDateTime> {
    PrimitiveDateTime::parse(
        text,
        format_description!("[year]-[month]-[day] [hour]:[minute]:[second].[subsecond]"),
    )
    .or_else(|_| {
        PrimitiveDateTime::parse(
            text,
            format_description!("[year]-[month]-[day] [hour]:[minute]:[second]"),
        )
    })
    .ok()
    .map(PrimitiveDateTime::assume_utc)
    .or_else(|| ValueType::Timestamp.parse(text).and_then(|v| v.as_timestamp()))
}

/// A bound parameter.
pub struct Param<'a>(pub &'a Value);

impl ToSql for Param<'_> {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        use rusqlite::types::Value as Sql;

        Ok(match self.0 {
            Value::Null => ToSqlOutput::Owned(Sql::Null),
            Value::Text(s) => ToSqlOutput::Borrowed(ValueRef::Text(s.as_bytes())),
            Value::Integer(v) => ToSqlOutput::Owned(Sql::Integer(*v)),
            Value::Decimal(v) => ToSqlOutput::Owned(Sql::Real(*v)),
            Value::Boolean(v) => ToSqlOutput::Owned(Sql::Integer(i64::from(*v))),
            Value::Date(d) => ToSqlOutput::Owned(Sql::Text(format_date(*d))),
            Value::Timestamp(ts) => ToSqlOutput::Owned(Sql::Text(format_timestamp(*ts))),
        })
    }
}

/// Convert column `index` of a fetched row to `value_type`.
pub fn read_column(
    raw: ValueRef<'_>,
    value_type: ValueType,
    index: usize,
) -> Result<Value, DatabaseError> {
    let mismatch = |found: &str| {
        DatabaseError::new(format!(
            "column {index} holds {found}, which is not a valid {value_type}"
        ))
    };

    match raw {
        ValueRef::Null => Ok(Value::Null),
        ValueRef::Integer(v) => match value_type {
            ValueType::Integer => Ok(Value::Integer(v)),
            ValueType::Decimal => Ok(Value::Decimal(v as f64)),
            ValueType::Boolean => Ok(Value::Boolean(v != 0)),
            ValueType::Text => Ok(Value::Text(v.to_string())),
            ValueType::Timestamp => OffsetDateTime::from_unix_timestamp(v)
                .map(Value::Timestamp)
                .map_err(|_| mismatch(&format!("integer {v}"))),
            ValueType::Date => Err(mismatch(&format!("integer {v}"))),
        },
        ValueRef::Real(v) => match value_type {
            ValueType::Decimal => Ok(Value::Decimal(v)),
            ValueType::Text => Ok(Value::Text(v.to_string())),
            ValueType::Integer => ValueType::Integer
                .parse(&v.to_string())
                .ok_or_else(|| mismatch(&format!("real {v}"))),
            _ => Err(mismatch(&format!("real {v}"))),
        },
        ValueRef::Text(bytes) => {
            let text = std::str::from_utf8(bytes)
                .map_err(|e| DatabaseError::new(format!("column {index}: {e}")).with_source(e))?;
            let parsed = if value_type == ValueType::Timestamp {
                parse_timestamp(text).map(Value::Timestamp)
            } else {
                value_type.parse(text)
            };
            parsed.ok_or_else(|| mismatch(&format!("`{text}`")))
        }
        ValueRef::Blob(_) => Err(mismatch("a blob")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::{date, datetime};

    #[test]
    fn test_timestamp_text_keeps_millis() {
        let ts = datetime!(2024-03-01 10:00:00.123456 UTC);
        assert_eq!(format_timestamp(ts), "2024-03-01 10:00:00.123");
        assert_eq!(
            parse_timestamp("2024-03-01 10:00:00.123"),
            Some(datetime!(2024-03-01 10:00:00.123 UTC))
        );
    }

    #[test]
    fn test_timestamp_converted_to_utc() {
        let ts = datetime!(2024-03-01 12:30:00 +02:00);
        assert_eq!(format_timestamp(ts), "2024-03-01 10:30:00.000");
    }

    #[test]
    fn test_parse_timestamp_variants() {
        assert_eq!(
            parse_timestamp("2024-03-01 10:00:00"),
            Some(datetime!(2024-03-01 10:00:00 UTC))
        );
        assert_eq!(
            parse_timestamp("2024-03-01T10:00:00Z"),
            Some(datetime!(2024-03-01 10:00:00 UTC))
        );
        assert_eq!(parse_timestamp("yesterday"), None);
    }

    #[test]
    fn test_read_column_conversions() {
        assert_eq!(
            read_column(ValueRef::Integer(1), ValueType::Boolean, 0).unwrap(),
            Value::Boolean(true)
        );
        assert_eq!(
            read_column(ValueRef::Integer(2), ValueType::Decimal, 0).unwrap(),
            Value::Decimal(2.0)
        );
        assert_eq!(
            read_column(ValueRef::Text(b"2024-02-29"), ValueType::Date, 0).unwrap(),
            Value::Date(date!(2024 - 02 - 29))
        );
        assert_eq!(
            read_column(ValueRef::Null, ValueType::Text, 0).unwrap(),
            Value::Null
        );
    }

    #[test]
    fn test_read_column_mismatch() {
        let err = read_column(ValueRef::Text(b"abc"), ValueType::Integer, 2).unwrap_err();
        assert_eq!(err.message, "column 2 holds `abc`, which is not a valid integer");
        assert!(read_column(ValueRef::Blob(&[1, 2]), ValueType::Text, 0).is_err());
    }

    #[test]
    fn test_param_binds_booleans_as_integers() {
        let value = Value::Boolean(true);
        let param = Param(&value);
        let out = param.to_sql().unwrap();
        assert_eq!(out, ToSqlOutput::Owned(rusqlite::types::Value::Integer(1)));
    }
}
