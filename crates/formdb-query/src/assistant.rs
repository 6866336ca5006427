//! The database assistant: CRUD, batches and filters for one schema.
//!
//! An assistant is built once per schema and is immutable afterwards. Every
//! operation borrows the caller's row and the caller's transaction handle;
//! the assistant never begins, commits or rolls back.
//!
//! Outcomes the caller is expected to handle (row not found, stale
//! concurrency stamp, nothing deleted) come back as `Ok(false)`, `Ok(None)` or
//! an empty set. Missing keys, wrong row lengths and mistyped values are
//! rejected before any statement runs. Store failures are logged with the
//! statement and its parameters and returned as [`Error::Database`].

use std::sync::Arc;

use formdb_core::{
    Config, DatabaseError, Error, Record, RecordSet, Result, Schema, TransactionHandle, Value,
};

use crate::statements::{BoundStatement, StatementSet};

/// Frozen statements plus the operations that run them.
#[derive(Debug, Clone)]
pub struct DbAssistant {
    schema: Arc<Schema>,
    statements: StatementSet,
    log_statements: bool,
}

impl DbAssistant {
    /// Build the assistant for `schema`. The schema must have a table.
    pub fn new(schema: &Arc<Schema>, config: &Config) -> Result<Self> {
        let statements = StatementSet::build(schema, config)?;
        tracing::debug!(
            schema = schema.name(),
            select = statements.select(),
            insert = statements.insert().map(BoundStatement::sql),
            update = statements.update().map(BoundStatement::sql),
            "Statements frozen"
        );
        Ok(Self {
            schema: Arc::clone(schema),
            statements,
            log_statements: config.log_statements,
        })
    }

    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    pub fn statements(&self) -> &StatementSet {
        &self.statements
    }

    // ========================================================================
    // Single-row operations
    // ========================================================================

    /// Insert one row.
    ///
    /// With a generated key, the key the store assigned is written into the
    /// row's generated-key slot, and the concurrency stamp the store set is
    /// read back into its slot. Returns true iff exactly one row was inserted.
    #[tracing::instrument(level = "debug", skip(self, handle, row), fields(schema = self.schema.name()))]
    pub fn insert(&self, handle: &dyn TransactionHandle, row: &mut [Value]) -> Result<bool> {
        self.schema.check_length(row)?;
        let stmt = self.require(self.statements.insert(), "insert", "it has no insertable column")?;
        let params = stmt.bind(&self.schema, row)?;
        self.trace(stmt.sql(), &params);

        let (Some(key_index), Some(key_column)) = (
            self.schema.generated_key(),
            self.statements.generated_key_column(),
        ) else {
            let count = handle
                .execute(stmt.sql(), &params)
                .map_err(|e| e.into_fault(stmt.sql(), &params))?;
            if count == 1 {
                self.refresh_stamp(handle, row)?;
            }
            return Ok(count == 1);
        };

        let (count, key) = handle
            .insert_returning_key(stmt.sql(), &params, key_column)
            .map_err(|e| e.into_fault(stmt.sql(), &params))?;
        if count != 1 {
            return Ok(false);
        }
        let Some(key) = key else {
            return Err(DatabaseError::new(format!(
                "store returned no value for generated key `{key_column}`"
            ))
            .into_fault(stmt.sql(), &params));
        };
        row[key_index] = Value::Integer(key);
        tracing::info!(schema = self.schema.name(), key = key, "Inserted row");
        self.refresh_stamp(handle, row)?;
        Ok(true)
    }

    /// Update one row by key.
    ///
    /// Returns false when no row matched: the key does not exist, or the
    /// concurrency stamp no longer matches what the caller read. On success
    /// the new stamp is read back into the row, so it can be updated again.
    #[tracing::instrument(level = "debug", skip(self, handle, row), fields(schema = self.schema.name()))]
    pub fn update(&self, handle: &dyn TransactionHandle, row: &mut [Value]) -> Result<bool> {
        let stmt = self.require(
            self.statements.update(),
            "update",
            "it has no primary key or no updatable column",
        )?;
        self.check_addressable(row)?;
        if let Some(stamp) = self.schema.concurrency_index() {
            self.schema.require_set(row, stamp)?;
        }
        let params = stmt.bind(&self.schema, row)?;
        self.trace(stmt.sql(), &params);

        let count = handle
            .execute(stmt.sql(), &params)
            .map_err(|e| e.into_fault(stmt.sql(), &params))?;
        if count != 1 {
            tracing::debug!(
                schema = self.schema.name(),
                affected = count,
                "Update matched no current row"
            );
            return Ok(false);
        }
        self.refresh_stamp(handle, row)?;
        Ok(true)
    }

    /// Delete one row by key. Returns true if anything was deleted.
    #[tracing::instrument(level = "debug", skip(self, handle, row), fields(schema = self.schema.name()))]
    pub fn delete(&self, handle: &dyn TransactionHandle, row: &[Value]) -> Result<bool> {
        let stmt = self.require(self.statements.delete(), "delete", "it has no primary key")?;
        self.check_addressable(row)?;
        let params = stmt.bind(&self.schema, row)?;
        self.trace(stmt.sql(), &params);

        let count = handle
            .execute(stmt.sql(), &params)
            .map_err(|e| e.into_fault(stmt.sql(), &params))?;
        Ok(count > 0)
    }

    /// Read one row by key, overwriting the persisted slots of `row`.
    ///
    /// Key and tenant slots must be set. Returns whether a row was found; on
    /// false the row is left untouched.
    #[tracing::instrument(level = "debug", skip(self, handle, row), fields(schema = self.schema.name()))]
    pub fn read(&self, handle: &dyn TransactionHandle, row: &mut [Value]) -> Result<bool> {
        let Some(found) = self.fetch_by_key(handle, row)? else {
            return Ok(false);
        };
        for (&slot, value) in self.statements.select_indexes().iter().zip(found) {
            row[slot] = value;
        }
        Ok(true)
    }

    /// Whether a row with this key exists.
    pub fn exists(&self, handle: &dyn TransactionHandle, row: &[Value]) -> Result<bool> {
        Ok(self.fetch_by_key(handle, row)?.is_some())
    }

    /// Insert when the generated key is unset (null or zero), else update.
    pub fn save(&self, handle: &dyn TransactionHandle, row: &mut [Value]) -> Result<bool> {
        let key = self.generated_key()?;
        self.schema.check_length(row)?;
        if row[key].is_unset_key() {
            self.insert(handle, row)
        } else {
            self.update(handle, row)
        }
    }

    /// Save a row whether or not the schema has a generated key.
    ///
    /// Without a generated key the row is updated, and inserted if no row
    /// matched. A row whose concurrency stamp is still null has never been
    /// read, so it goes straight to insert.
    pub fn upsert(&self, handle: &dyn TransactionHandle, row: &mut [Value]) -> Result<bool> {
        if self.schema.generated_key().is_some() {
            return self.save(handle, row);
        }
        self.schema.check_length(row)?;
        if self.is_new(row) {
            return self.insert(handle, row);
        }
        if self.statements.update().is_none() {
            // Every column is part of the key: nothing to change if it exists.
            if self.exists(handle, row)? {
                return Ok(true);
            }
            return self.insert(handle, row);
        }
        if self.update(handle, row)? {
            return Ok(true);
        }
        self.insert(handle, row)
    }

    // ========================================================================
    // Batches
    // ========================================================================

    /// Insert every row in one batch.
    ///
    /// Generated keys are not written back. Returns true only if every row
    /// reported exactly one inserted row; failed row indexes are logged.
    #[tracing::instrument(level = "debug", skip(self, handle, rows), fields(schema = self.schema.name(), rows = rows.len()))]
    pub fn insert_all<R: AsRef<[Value]>>(
        &self,
        handle: &dyn TransactionHandle,
        rows: &[R],
    ) -> Result<bool> {
        let stmt = self.require(self.statements.insert(), "insert", "it has no insertable column")?;
        let params = self.bind_all(stmt, rows, false)?;
        self.run_batch(handle, stmt, &params, "insert")
    }

    /// Update every row in one batch. Returns true only if every row matched.
    #[tracing::instrument(level = "debug", skip(self, handle, rows), fields(schema = self.schema.name(), rows = rows.len()))]
    pub fn update_all<R: AsRef<[Value]>>(
        &self,
        handle: &dyn TransactionHandle,
        rows: &[R],
    ) -> Result<bool> {
        let stmt = self.require(
            self.statements.update(),
            "update",
            "it has no primary key or no updatable column",
        )?;
        let params = self.bind_all(stmt, rows, true)?;
        self.run_batch(handle, stmt, &params, "update")
    }

    /// Save a mixed batch.
    ///
    /// With a generated key, rows are partitioned into one insert batch (key
    /// unset) and one update batch; the result is true only if both succeed.
    /// Without one, falls back to [`upsert_all`](Self::upsert_all).
    #[tracing::instrument(level = "debug", skip(self, handle, rows), fields(schema = self.schema.name(), rows = rows.len()))]
    pub fn save_all<R: AsRef<[Value]>>(
        &self,
        handle: &dyn TransactionHandle,
        rows: &[R],
    ) -> Result<bool> {
        let Some(key) = self.schema.generated_key() else {
            return self.upsert_all(handle, rows);
        };
        for row in rows {
            self.schema.check_length(row.as_ref())?;
        }
        let (inserts, updates): (Vec<&[Value]>, Vec<&[Value]>) = rows
            .iter()
            .map(AsRef::as_ref)
            .partition(|row| row[key].is_unset_key());

        let mut ok = true;
        if !inserts.is_empty() {
            ok &= self.insert_all(handle, &inserts)?;
        }
        if !updates.is_empty() {
            ok &= self.update_all(handle, &updates)?;
        }
        Ok(ok)
    }

    /// Save rows one at a time: update, then insert when nothing matched.
    ///
    /// Costs two round trips per new row. Used for schemas without a
    /// generated key, where a row alone cannot say whether it is new.
    #[tracing::instrument(level = "debug", skip(self, handle, rows), fields(schema = self.schema.name(), rows = rows.len()))]
    pub fn upsert_all<R: AsRef<[Value]>>(
        &self,
        handle: &dyn TransactionHandle,
        rows: &[R],
    ) -> Result<bool> {
        tracing::info!(
            schema = self.schema.name(),
            rows = rows.len(),
            "No generated key, saving row by row with update-then-insert"
        );
        let mut failed = Vec::new();
        for (i, row) in rows.iter().enumerate() {
            let mut row = row.as_ref().to_vec();
            if !self.upsert(handle, &mut row)? {
                failed.push(i);
            }
        }
        if !failed.is_empty() {
            tracing::warn!(
                schema = self.schema.name(),
                failed = ?failed,
                "Rows were not saved"
            );
        }
        Ok(failed.is_empty())
    }

    // ========================================================================
    // Filters
    // ========================================================================

    /// Select rows matching a clause built by the filter builder.
    ///
    /// `clause` is appended to the select statement as is (empty means every
    /// row). At most `max_rows` rows are returned, 0 meaning no limit.
    /// Fields that are not persisted get their defaults.
    #[tracing::instrument(level = "debug", skip(self, handle, params), fields(schema = self.schema.name()))]
    pub fn filter(
        &self,
        handle: &dyn TransactionHandle,
        clause: &str,
        params: &[Value],
        max_rows: usize,
    ) -> Result<RecordSet> {
        let sql = if clause.is_empty() {
            self.statements.select().to_string()
        } else {
            format!("{} {clause}", self.statements.select())
        };
        self.trace(&sql, params);

        let fetched = handle
            .query(&sql, params, self.statements.select_types(), max_rows)
            .map_err(|e| e.into_fault(&sql, params))?;

        let mut set = RecordSet::new(&self.schema);
        for values in fetched {
            let row = self.widen(values).map_err(|e| e.into_fault(&sql, params))?;
            set.push(row)?;
        }
        tracing::debug!(schema = self.schema.name(), rows = set.len(), "Filter returned");
        Ok(set)
    }

    /// First row matching a clause, if any.
    pub fn filter_first(
        &self,
        handle: &dyn TransactionHandle,
        clause: &str,
        params: &[Value],
    ) -> Result<Option<Record>> {
        let set = self.filter(handle, clause, params, 1)?;
        Ok(set.into_records().into_iter().next())
    }

    // ========================================================================
    // Helpers
    // ========================================================================

    fn require<'a>(
        &self,
        stmt: Option<&'a BoundStatement>,
        action: &'static str,
        reason: &'static str,
    ) -> Result<&'a BoundStatement> {
        stmt.ok_or_else(|| Error::NotSupported {
            schema: self.schema.name().to_string(),
            action,
            reason,
        })
    }

    fn generated_key(&self) -> Result<usize> {
        self.schema
            .generated_key()
            .ok_or_else(|| Error::SaveNotSupported {
                schema: self.schema.name().to_string(),
            })
    }

    /// Length check plus every key (and tenant) slot set.
    fn check_addressable(&self, row: &[Value]) -> Result<()> {
        self.schema.check_length(row)?;
        if let Some(w) = self.statements.key_where() {
            for &i in w.params() {
                self.schema.require_set(row, i)?;
            }
        }
        Ok(())
    }

    /// Copy the concurrency stamp the store just wrote into `row`.
    ///
    /// Batches skip this; their rows must be read again before another update.
    fn refresh_stamp(&self, handle: &dyn TransactionHandle, row: &mut [Value]) -> Result<()> {
        let Some(stamp) = self.schema.concurrency_index() else {
            return Ok(());
        };
        let Some(column) = self
            .statements
            .select_indexes()
            .iter()
            .position(|&slot| slot == stamp)
        else {
            return Ok(());
        };
        if self.statements.read().is_none() || self.check_addressable(row).is_err() {
            return Ok(());
        }
        match self.fetch_by_key(handle, row)? {
            Some(found) => {
                if let Some(value) = found.into_iter().nth(column) {
                    row[stamp] = value;
                }
            }
            None => tracing::warn!(
                schema = self.schema.name(),
                "Written row not found when reading back its stamp"
            ),
        }
        Ok(())
    }

    fn is_new(&self, row: &[Value]) -> bool {
        self.schema
            .concurrency_index()
            .is_some_and(|stamp| row[stamp].is_null())
    }

    fn fetch_by_key(
        &self,
        handle: &dyn TransactionHandle,
        row: &[Value],
    ) -> Result<Option<Vec<Value>>> {
        let stmt = self.require(self.statements.read(), "read", "it has no primary key")?;
        self.check_addressable(row)?;
        let params = stmt.bind(&self.schema, row)?;
        self.trace(stmt.sql(), &params);

        let mut rows = handle
            .query(stmt.sql(), &params, self.statements.select_types(), 1)
            .map_err(|e| e.into_fault(stmt.sql(), &params))?;
        if rows.is_empty() {
            return Ok(None);
        }
        let found = rows.swap_remove(0);
        if found.len() != self.statements.select_types().len() {
            return Err(DatabaseError::new(format!(
                "store returned {} columns, expected {}",
                found.len(),
                self.statements.select_types().len()
            ))
            .into_fault(stmt.sql(), &params));
        }
        Ok(Some(found))
    }

    /// Spread selected columns into a full-width row of defaults.
    fn widen(&self, values: Vec<Value>) -> std::result::Result<Box<[Value]>, DatabaseError> {
        let indexes = self.statements.select_indexes();
        if values.len() != indexes.len() {
            return Err(DatabaseError::new(format!(
                "store returned {} columns, expected {}",
                values.len(),
                indexes.len()
            )));
        }
        let mut row = self.schema.default_row();
        for (&slot, value) in indexes.iter().zip(values) {
            row[slot] = value;
        }
        Ok(row)
    }

    fn bind_all<R: AsRef<[Value]>>(
        &self,
        stmt: &BoundStatement,
        rows: &[R],
        addressed: bool,
    ) -> Result<Vec<Vec<Value>>> {
        rows.iter()
            .map(|row| {
                let row = row.as_ref();
                if addressed {
                    self.check_addressable(row)?;
                    if let Some(stamp) = self.schema.concurrency_index() {
                        self.schema.require_set(row, stamp)?;
                    }
                } else {
                    self.schema.check_length(row)?;
                }
                stmt.bind(&self.schema, row)
            })
            .collect()
    }

    fn run_batch(
        &self,
        handle: &dyn TransactionHandle,
        stmt: &BoundStatement,
        params: &[Vec<Value>],
        action: &'static str,
    ) -> Result<bool> {
        if params.is_empty() {
            return Ok(true);
        }
        if self.log_statements {
            tracing::debug!(sql = stmt.sql(), rows = params.len(), "Executing batch");
        }
        let counts = handle.execute_many(stmt.sql(), params).map_err(|e| {
            let first = params.first().map(Vec::as_slice).unwrap_or_default();
            e.into_fault(stmt.sql(), first)
        })?;

        let failed: Vec<usize> = counts
            .iter()
            .enumerate()
            .filter(|&(_, &count)| count != 1)
            .map(|(i, _)| i)
            .collect();
        if counts.len() != params.len() || !failed.is_empty() {
            tracing::warn!(
                schema = self.schema.name(),
                action = action,
                failed = ?failed,
                reported = counts.len(),
                expected = params.len(),
                "Batch rows did not affect exactly one row"
            );
            return Ok(false);
        }
        Ok(true)
    }

    fn trace(&self, sql: &str, params: &[Value]) {
        if self.log_statements {
            tracing::debug!(
                sql = sql,
                params = %formdb_core::error::dump_params(params),
                "Executing statement"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use formdb_core::{ColumnRole, Field, RowAccess, ValueType};
    use std::cell::RefCell;
    use std::collections::VecDeque;

    /// Records every statement and answers from a queue of canned replies.
    #[derive(Default)]
    struct MockHandle {
        log: RefCell<Vec<(String, Vec<Value>)>>,
        rows: RefCell<VecDeque<Vec<Vec<Value>>>>,
        counts: RefCell<VecDeque<u64>>,
        next_key: RefCell<Option<i64>>,
        fail: bool,
    }

    impl MockHandle {
        fn failing() -> Self {
            Self {
                fail: true,
                ..Self::default()
            }
        }

        fn with_rows(self, rows: Vec<Vec<Value>>) -> Self {
            self.rows.borrow_mut().push_back(rows);
            self
        }

        fn with_counts(self, counts: &[u64]) -> Self {
            self.counts.borrow_mut().extend(counts);
            self
        }

        fn with_key(self, key: i64) -> Self {
            *self.next_key.borrow_mut() = Some(key);
            self
        }

        fn statements(&self) -> Vec<String> {
            self.log.borrow().iter().map(|(sql, _)| sql.clone()).collect()
        }

        fn params(&self, i: usize) -> Vec<Value> {
            self.log.borrow()[i].1.clone()
        }

        fn record(&self, sql: &str, params: &[Value]) -> std::result::Result<(), DatabaseError> {
            self.log.borrow_mut().push((sql.to_string(), params.to_vec()));
            if self.fail {
                Err(DatabaseError::new("disk I/O error"))
            } else {
                Ok(())
            }
        }

        fn next_count(&self) -> u64 {
            self.counts.borrow_mut().pop_front().unwrap_or(1)
        }
    }

    impl TransactionHandle for MockHandle {
        fn query(
            &self,
            sql: &str,
            params: &[Value],
            _types: &[ValueType],
            max_rows: usize,
        ) -> std::result::Result<Vec<Vec<Value>>, DatabaseError> {
            self.record(sql, params)?;
            let mut rows = self.rows.borrow_mut().pop_front().unwrap_or_default();
            if max_rows > 0 {
                rows.truncate(max_rows);
            }
            Ok(rows)
        }

        fn execute(&self, sql: &str, params: &[Value]) -> std::result::Result<u64, DatabaseError> {
            self.record(sql, params)?;
            Ok(self.next_count())
        }

        fn execute_many(
            &self,
            sql: &str,
            rows: &[Vec<Value>],
        ) -> std::result::Result<Vec<u64>, DatabaseError> {
            let mut counts = Vec::new();
            for row in rows {
                self.record(sql, row)?;
                counts.push(self.next_count());
            }
            Ok(counts)
        }

        fn insert_returning_key(
            &self,
            sql: &str,
            params: &[Value],
            _key_column: &str,
        ) -> std::result::Result<(u64, Option<i64>), DatabaseError> {
            self.record(sql, params)?;
            Ok((self.next_count(), self.next_key.borrow_mut().take()))
        }
    }

    fn customer() -> Arc<Schema> {
        Schema::builder("customer")
            .table("customers")
            .field(Field::column("id", ValueType::Integer, ColumnRole::GeneratedPrimaryKey))
            .field(Field::column("tenant", ValueType::Integer, ColumnRole::TenantKey))
            .field(Field::column("name", ValueType::Text, ColumnRole::RequiredData))
            .field(Field::column("modifiedAt", ValueType::Timestamp, ColumnRole::ModifiedAt))
            .field(Field::new("note", ValueType::Text).with_default("-"))
            .concurrency_check(true)
            .build()
            .unwrap()
    }

    fn price() -> Arc<Schema> {
        Schema::builder("price")
            .table("prices")
            .field(Field::column("sku", ValueType::Text, ColumnRole::PrimaryKey))
            .field(Field::column("amount", ValueType::Decimal, ColumnRole::RequiredData))
            .build()
            .unwrap()
    }

    fn assistant(schema: &Arc<Schema>) -> DbAssistant {
        DbAssistant::new(schema, &Config::default()).unwrap()
    }

    fn new_customer(name: &str) -> Vec<Value> {
        vec![
            Value::Null,
            Value::Integer(7),
            Value::from(name),
            Value::Null,
            Value::from("-"),
        ]
    }

    fn stamp() -> Value {
        Value::Timestamp(time::macros::datetime!(2024-03-01 10:00 UTC))
    }

    #[test]
    fn test_insert_writes_generated_key_back() {
        let db = assistant(&customer());
        let handle = MockHandle::default().with_key(41).with_rows(vec![vec![
            Value::Integer(41),
            Value::Integer(7),
            Value::from("Acme"),
            stamp(),
        ]]);
        let mut row = new_customer("Acme");

        assert!(db.insert(&handle, &mut row).unwrap());
        assert_eq!(row[0], Value::Integer(41));
        assert_eq!(row[3], stamp());
        assert_eq!(
            handle.statements(),
            vec![
                "INSERT INTO customers (tenant, name, modifiedAt) VALUES (?, ?, CURRENT_TIMESTAMP)",
                "SELECT id, tenant, name, modifiedAt FROM customers WHERE id=? AND tenant=?"
            ]
        );
        assert_eq!(handle.params(0), vec![Value::Integer(7), Value::from("Acme")]);
        assert_eq!(handle.params(1), vec![Value::Integer(41), Value::Integer(7)]);
    }

    #[test]
    fn test_insert_without_returned_key_is_a_fault() {
        let db = assistant(&customer());
        let handle = MockHandle::default();
        let err = db.insert(&handle, &mut new_customer("Acme")).unwrap_err();
        assert!(err.is_storage_fault());
    }

    #[test]
    fn test_update_requires_stamp_and_reports_stale() {
        let db = assistant(&customer());
        let mut row = new_customer("Acme");
        row[0] = Value::Integer(3);

        let handle = MockHandle::default();
        let err = db.update(&handle, &mut row).unwrap_err();
        assert!(matches!(err, Error::MissingKey { ref field, .. } if field == "modifiedAt"));
        assert!(handle.statements().is_empty());

        row[3] = stamp();
        let handle = MockHandle::default().with_counts(&[0]);
        assert!(!db.update(&handle, &mut row).unwrap());
        assert_eq!(
            handle.params(0),
            vec![Value::from("Acme"), Value::Integer(3), Value::Integer(7), stamp()]
        );
        assert_eq!(handle.statements().len(), 1);
    }

    #[test]
    fn test_read_fails_fast_without_key() {
        let db = assistant(&customer());
        let handle = MockHandle::default();
        let mut row = new_customer("Acme");
        let err = db.read(&handle, &mut row).unwrap_err();
        assert!(matches!(err, Error::MissingKey { ref field, .. } if field == "id"));
        assert!(handle.statements().is_empty());

        row[0] = Value::Integer(0);
        assert!(db.read(&handle, &mut row).is_err());
    }

    #[test]
    fn test_read_overwrites_persisted_slots() {
        let db = assistant(&customer());
        let handle = MockHandle::default().with_rows(vec![vec![
            Value::Integer(3),
            Value::Integer(7),
            Value::from("Stored"),
            stamp(),
        ]]);
        let mut row = new_customer("Typed");
        row[0] = Value::Integer(3);
        row[4] = Value::from("kept");

        assert!(db.read(&handle, &mut row).unwrap());
        assert_eq!(row[2], Value::from("Stored"));
        assert_eq!(row[3], stamp());
        assert_eq!(row[4], Value::from("kept"));
        assert_eq!(
            handle.statements(),
            vec!["SELECT id, tenant, name, modifiedAt FROM customers WHERE id=? AND tenant=?"]
        );

        let handle = MockHandle::default();
        assert!(!db.read(&handle, &mut row).unwrap());
    }

    #[test]
    fn test_delete_and_row_checks() {
        let db = assistant(&customer());
        let mut row = new_customer("Acme");
        row[0] = Value::Integer(3);

        let handle = MockHandle::default().with_counts(&[0]);
        assert!(!db.delete(&handle, &row).unwrap());

        let err = db.delete(&handle, &row[..2]).unwrap_err();
        assert!(matches!(err, Error::RowLength { .. }));

        row[2] = Value::Integer(5);
        let err = db.insert(&handle, &mut row).unwrap_err();
        assert!(matches!(err, Error::TypeMismatch { .. }));
    }

    #[test]
    fn test_save_chooses_by_generated_key() {
        let db = assistant(&customer());
        let stored = |at: Value| {
            vec![vec![Value::Integer(9), Value::Integer(7), Value::from("Acme"), at]]
        };
        let later = Value::Timestamp(time::macros::datetime!(2024-03-01 10:05 UTC));
        let handle = MockHandle::default()
            .with_key(9)
            .with_rows(stored(stamp()))
            .with_rows(stored(later.clone()));
        let mut row = new_customer("Acme");
        row[0] = Value::Integer(0);
        assert!(db.save(&handle, &mut row).unwrap());
        assert_eq!(row[0], Value::Integer(9));
        assert_eq!(row[3], stamp());

        // the stamp read back after insert is what the update checks
        assert!(db.save(&handle, &mut row).unwrap());
        assert_eq!(row[3], later);
        let statements = handle.statements();
        assert!(statements[0].starts_with("INSERT"));
        assert!(statements[1].starts_with("SELECT"));
        assert!(statements[2].starts_with("UPDATE"));
        assert_eq!(handle.params(2).last(), Some(&stamp()));
        assert!(statements[3].starts_with("SELECT"));
    }

    #[test]
    fn test_save_without_generated_key() {
        let db = assistant(&price());
        let mut row = vec![Value::from("A-1"), Value::Decimal(2.5)];
        let err = db.save(&MockHandle::default(), &mut row).unwrap_err();
        assert!(matches!(err, Error::SaveNotSupported { .. }));
    }

    #[test]
    fn test_upsert_inserts_when_update_misses() {
        let db = assistant(&price());
        let handle = MockHandle::default().with_counts(&[0, 1]);
        let mut row = vec![Value::from("A-1"), Value::Decimal(2.5)];
        assert!(db.upsert(&handle, &mut row).unwrap());
        assert_eq!(
            handle.statements(),
            vec![
                "UPDATE prices SET amount=? WHERE sku=?",
                "INSERT INTO prices (sku, amount) VALUES (?, ?)"
            ]
        );
    }

    #[test]
    fn test_save_all_partitions_batch() {
        let db = assistant(&customer());
        let mut existing = new_customer("Old");
        existing[0] = Value::Integer(4);
        existing[3] = stamp();
        let rows = vec![new_customer("A"), existing, new_customer("B")];

        let handle = MockHandle::default();
        assert!(db.save_all(&handle, &rows).unwrap());
        let statements = handle.statements();
        assert_eq!(statements.len(), 3);
        assert!(statements[0].starts_with("INSERT"));
        assert!(statements[1].starts_with("INSERT"));
        assert!(statements[2].starts_with("UPDATE"));
        assert_eq!(handle.params(1)[1], Value::from("B"));
    }

    #[test]
    fn test_batch_reports_failed_rows() {
        let db = assistant(&customer());
        let rows = vec![new_customer("A"), new_customer("B")];
        let handle = MockHandle::default().with_counts(&[1, 0]);
        assert!(!db.insert_all(&handle, &rows).unwrap());

        let empty: Vec<Vec<Value>> = Vec::new();
        let handle = MockHandle::default();
        assert!(db.insert_all(&handle, &empty).unwrap());
        assert!(handle.statements().is_empty());
    }

    #[test]
    fn test_save_all_without_generated_key_upserts_each_row() {
        let db = assistant(&price());
        let rows = vec![
            vec![Value::from("A-1"), Value::Decimal(1.0)],
            vec![Value::from("A-2"), Value::Decimal(2.0)],
        ];
        let handle = MockHandle::default().with_counts(&[1, 0, 1]);
        assert!(db.save_all(&handle, &rows).unwrap());
        let statements = handle.statements();
        assert_eq!(statements.len(), 3);
        assert!(statements[2].starts_with("INSERT"));
    }

    #[test]
    fn test_filter_widens_rows() {
        let db = assistant(&customer());
        let handle = MockHandle::default().with_rows(vec![
            vec![Value::Integer(1), Value::Integer(7), Value::from("A"), stamp()],
            vec![Value::Integer(2), Value::Integer(7), Value::from("B"), stamp()],
        ]);
        let set = db
            .filter(&handle, "WHERE tenant=?", &[Value::Integer(7)], 0)
            .unwrap();
        assert_eq!(set.len(), 2);
        assert_eq!(set.get(1).unwrap().get_text(2), Some("B"));
        assert_eq!(set.get(1).unwrap().get_text(4), Some("-"));
        assert_eq!(
            handle.statements(),
            vec!["SELECT id, tenant, name, modifiedAt FROM customers WHERE tenant=?"]
        );
    }

    #[test]
    fn test_filter_first() {
        let db = assistant(&customer());
        let handle = MockHandle::default();
        assert!(db.filter_first(&handle, "", &[]).unwrap().is_none());

        let handle = MockHandle::default().with_rows(vec![vec![
            Value::Integer(1),
            Value::Integer(7),
            Value::from("A"),
            stamp(),
        ]]);
        let first = db.filter_first(&handle, "", &[]).unwrap().unwrap();
        assert_eq!(first.get_integer(0), Some(1));
    }

    #[test]
    fn test_storage_fault_carries_statement() {
        let db = assistant(&customer());
        let handle = MockHandle::failing();
        let mut row = new_customer("Acme");
        row[0] = Value::Integer(3);
        let err = db.delete(&handle, &row).unwrap_err();
        let Error::Database(fault) = err else {
            panic!("expected a storage fault, got {err:?}");
        };
        assert_eq!(
            fault.sql.as_deref(),
            Some("DELETE FROM customers WHERE id=? AND tenant=?")
        );
        assert_eq!(fault.params.as_deref(), Some("1=3, 2=7"));
    }
}
