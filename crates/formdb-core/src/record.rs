//! The value container for one record instance.
//!
//! A `Record` owns a fixed-length array of values, one per schema field,
//! addressed by field index. It is created with defaults applied (or from a
//! fetched row), mutated in place, and never resized. Collaborators only ever
//! borrow the array as `&[Value]` / `&mut [Value]`.

use std::fmt;
use std::ops::Index;
use std::sync::Arc;

use crate::error::{Error, Result};
use crate::field::ColumnRole;
use crate::schema::Schema;
use crate::value::Value;

/// Typed, read-only access to a row of values described by a schema.
///
/// Implemented by owned records and by borrowed views into a record set.
pub trait RowAccess {
    /// Schema of the row.
    fn schema(&self) -> &Schema;

    /// All values, in field order.
    fn values(&self) -> &[Value];

    /// Value at `index`.
    fn get(&self, index: usize) -> Option<&Value> {
        self.values().get(index)
    }

    /// Value of the field named `name`.
    fn get_by_name(&self, name: &str) -> Option<&Value> {
        self.schema().index_of(name).and_then(|i| self.get(i))
    }

    fn get_text(&self, index: usize) -> Option<&str> {
        self.get(index).and_then(Value::as_str)
    }

    fn get_integer(&self, index: usize) -> Option<i64> {
        self.get(index).and_then(Value::as_i64)
    }

    fn get_decimal(&self, index: usize) -> Option<f64> {
        self.get(index).and_then(Value::as_f64)
    }

    fn get_boolean(&self, index: usize) -> Option<bool> {
        self.get(index).and_then(Value::as_bool)
    }

    fn get_date(&self, index: usize) -> Option<time::Date> {
        self.get(index).and_then(Value::as_date)
    }

    fn get_timestamp(&self, index: usize) -> Option<time::OffsetDateTime> {
        self.get(index).and_then(Value::as_timestamp)
    }

    /// True if the slot at `index` is null (or out of range).
    fn is_null(&self, index: usize) -> bool {
        self.get(index).is_none_or(Value::is_null)
    }

    /// Render as a JSON object keyed by field name.
    ///
    /// Tenant fields are never sent to clients and are left out.
    fn to_json(&self) -> serde_json::Value {
        let mut map = serde_json::Map::new();
        for (field, value) in self.schema().fields().iter().zip(self.values()) {
            if field.has_role(ColumnRole::TenantKey) {
                continue;
            }
            map.insert(field.name.clone(), value.to_json());
        }
        serde_json::Value::Object(map)
    }
}

/// One record instance.
#[derive(Clone)]
pub struct Record {
    schema: Arc<Schema>,
    values: Box<[Value]>,
}

impl Record {
    /// Create a record with every field set to its default.
    pub fn new(schema: &Arc<Schema>) -> Self {
        Self {
            schema: Arc::clone(schema),
            values: schema.default_row(),
        }
    }

    /// Wrap an existing row, checking its length and value types.
    pub fn from_values(schema: &Arc<Schema>, values: impl Into<Box<[Value]>>) -> Result<Self> {
        let values = values.into();
        schema.check_length(&values)?;
        for (i, v) in values.iter().enumerate() {
            schema.check_value(i, v)?;
        }
        Ok(Self {
            schema: Arc::clone(schema),
            values,
        })
    }

    /// Wrap a row whose length is already known to match.
    pub(crate) fn from_trusted(schema: &Arc<Schema>, values: Box<[Value]>) -> Self {
        debug_assert_eq!(values.len(), schema.len());
        Self {
            schema: Arc::clone(schema),
            values,
        }
    }

    /// Shared handle to the schema.
    pub fn schema_arc(&self) -> &Arc<Schema> {
        &self.schema
    }

    /// Set the value at `index`, rejecting a value of the wrong type.
    pub fn set(&mut self, index: usize, value: impl Into<Value>) -> Result<()> {
        let value = value.into();
        self.schema.check_value(index, &value)?;
        self.values[index] = value;
        Ok(())
    }

    /// Set the value of the field named `name`.
    pub fn set_by_name(&mut self, name: &str, value: impl Into<Value>) -> Result<()> {
        let index = self
            .schema
            .index_of(name)
            .ok_or_else(|| Error::UnknownField {
                schema: self.schema.name().to_string(),
                field: name.to_string(),
            })?;
        self.set(index, value)
    }

    /// Values of the primary key fields, in schema order.
    pub fn key_values(&self) -> Vec<Value> {
        self.schema
            .key_indexes()
            .iter()
            .map(|&i| self.values[i].clone())
            .collect()
    }

    pub fn as_slice(&self) -> &[Value] {
        &self.values
    }

    /// Mutable access to the backing array.
    ///
    /// Values written this way are type-checked when the row is next bound.
    pub fn as_mut_slice(&mut self) -> &mut [Value] {
        &mut self.values
    }

    /// Give up the record, keeping the raw row.
    pub fn into_values(self) -> Box<[Value]> {
        self.values
    }
}

impl RowAccess for Record {
    fn schema(&self) -> &Schema {
        &self.schema
    }

    fn values(&self) -> &[Value] {
        &self.values
    }
}

impl AsRef<[Value]> for Record {
    fn as_ref(&self) -> &[Value] {
        &self.values
    }
}

impl AsMut<[Value]> for Record {
    fn as_mut(&mut self) -> &mut [Value] {
        &mut self.values
    }
}

impl Index<usize> for Record {
    type Output = Value;

    fn index(&self, index: usize) -> &Value {
        &self.values[index]
    }
}

impl PartialEq for Record {
    fn eq(&self, other: &Self) -> bool {
        (Arc::ptr_eq(&self.schema, &other.schema) || self.schema.name() == other.schema.name())
            && self.values == other.values
    }
}

impl fmt::Debug for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut map = f.debug_map();
        for (field, value) in self.schema.fields().iter().zip(self.values.iter()) {
            map.entry(&field.name, value);
        }
        map.finish()
    }
}
