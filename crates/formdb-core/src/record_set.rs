//! An ordered collection of rows sharing one schema.
//!
//! Filter results and batch inputs live here as raw rows. Each row is checked
//! for length on the way in; [`RecordRef`] gives typed access to one row
//! without copying it.

use std::sync::Arc;

use crate::error::Result;
use crate::record::{Record, RowAccess};
use crate::schema::Schema;
use crate::value::Value;

/// Rows of one schema.
#[derive(Debug, Clone)]
pub struct RecordSet {
    schema: Arc<Schema>,
    rows: Vec<Box<[Value]>>,
}

impl RecordSet {
    /// Create an empty set.
    pub fn new(schema: &Arc<Schema>) -> Self {
        Self {
            schema: Arc::clone(schema),
            rows: Vec::new(),
        }
    }

    /// Create a set from rows, checking each one's length.
    pub fn from_rows(
        schema: &Arc<Schema>,
        rows: impl IntoIterator<Item = Box<[Value]>>,
    ) -> Result<Self> {
        let mut set = Self::new(schema);
        for row in rows {
            set.push(row)?;
        }
        Ok(set)
    }

    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    /// Append a row.
    pub fn push(&mut self, row: impl Into<Box<[Value]>>) -> Result<()> {
        let row = row.into();
        self.schema.check_length(&row)?;
        self.rows.push(row);
        Ok(())
    }

    /// Append a record's values.
    pub fn push_record(&mut self, record: Record) -> Result<()> {
        self.push(record.into_values())
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Borrowed view of row `index`.
    pub fn get(&self, index: usize) -> Option<RecordRef<'_>> {
        self.rows.get(index).map(|values| RecordRef {
            schema: &self.schema,
            values,
        })
    }

    /// Borrowed views of every row, in order.
    pub fn iter(&self) -> impl Iterator<Item = RecordRef<'_>> {
        self.rows.iter().map(|values| RecordRef {
            schema: &self.schema,
            values,
        })
    }

    /// Raw rows.
    pub fn rows(&self) -> &[Box<[Value]>] {
        &self.rows
    }

    /// Raw rows, mutable. Lengths stay fixed; only slot contents can change.
    pub fn rows_mut(&mut self) -> &mut [Box<[Value]>] {
        &mut self.rows
    }

    /// Take the rows as owned records.
    pub fn into_records(self) -> Vec<Record> {
        let schema = self.schema;
        self.rows
            .into_iter()
            .map(|values| Record::from_trusted(&schema, values))
            .collect()
    }

    /// Render every row as a JSON array of objects.
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::Value::Array(self.iter().map(|r| r.to_json()).collect())
    }
}

/// A borrowed row of a [`RecordSet`].
#[derive(Debug, Clone, Copy)]
pub struct RecordRef<'a> {
    schema: &'a Arc<Schema>,
    values: &'a [Value],
}

impl RecordRef<'_> {
    /// Copy the row into an owned record.
    pub fn to_record(&self) -> Record {
        Record::from_trusted(self.schema, self.values.into())
    }
}

impl RowAccess for RecordRef<'_> {
    fn schema(&self) -> &Schema {
        self.schema
    }

    fn values(&self) -> &[Value] {
        self.values
    }
}

impl AsRef<[Value]> for RecordRef<'_> {
    fn as_ref(&self) -> &[Value] {
        self.values
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::field::{ColumnRole, Field};
    use crate::value::ValueType;

    fn item() -> Arc<Schema> {
        Schema::builder("item")
            .table("items")
            .field(Field::column("code", ValueType::Text, ColumnRole::PrimaryKey))
            .field(Field::column("qty", ValueType::Integer, ColumnRole::RequiredData))
            .build()
            .unwrap()
    }

    fn row(code: &str, qty: i64) -> Box<[Value]> {
        vec![Value::from(code), Value::Integer(qty)].into_boxed_slice()
    }

    #[test]
    fn test_push_checks_length() {
        let mut set = RecordSet::new(&item());
        set.push(row("a", 1)).unwrap();
        let err = set.push(vec![Value::Null]).unwrap_err();
        assert!(matches!(err, Error::RowLength { .. }));
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn test_view_borrows_backing_row() {
        let set = RecordSet::from_rows(&item(), [row("a", 1), row("b", 2)]).unwrap();
        let view = set.get(1).unwrap();
        assert_eq!(view.get_text(0), Some("b"));
        assert_eq!(view.get_integer(1), Some(2));
        assert!(std::ptr::eq(view.values(), &*set.rows()[1]));
        assert!(set.get(2).is_none());
    }

    #[test]
    fn test_to_json_array() {
        let set = RecordSet::from_rows(&item(), [row("a", 1)]).unwrap();
        assert_eq!(
            set.to_json(),
            serde_json::json!([{"code": "a", "qty": 1}])
        );
    }

    #[test]
    fn test_into_records() {
        let schema = item();
        let set = RecordSet::from_rows(&schema, [row("a", 1), row("b", 2)]).unwrap();
        let records = set.into_records();
        assert_eq!(records.len(), 2);
        assert_eq!(records[1].get_text(0), Some("b"));
    }
}
