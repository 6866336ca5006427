//! The storage collaborator.
//!
//! A `TransactionHandle` is one open unit of work supplied by the caller. The
//! engine only issues statements through it; it never begins, commits or
//! rolls back. Every method takes `&self` so that a cascade can thread the same
//! handle through nested calls.

use crate::error::DatabaseError;
use crate::value::{Value, ValueType};

/// Statement execution inside the caller's transaction.
pub trait TransactionHandle {
    /// Run a SELECT and return at most `max_rows` rows (0 = no limit).
    ///
    /// Column `i` of each row is converted to `types[i]`; the returned rows have
    /// exactly `types.len()` values.
    fn query(
        &self,
        sql: &str,
        params: &[Value],
        types: &[ValueType],
        max_rows: usize,
    ) -> Result<Vec<Vec<Value>>, DatabaseError>;

    /// Run a write statement and return the affected-row count.
    fn execute(&self, sql: &str, params: &[Value]) -> Result<u64, DatabaseError>;

    /// Run one statement once per parameter row, in order, returning each
    /// row's affected count.
    fn execute_many(&self, sql: &str, rows: &[Vec<Value>]) -> Result<Vec<u64>, DatabaseError>;

    /// Run an INSERT and return the affected count and the key the store
    /// generated for `key_column`.
    fn insert_returning_key(
        &self,
        sql: &str,
        params: &[Value],
        key_column: &str,
    ) -> Result<(u64, Option<i64>), DatabaseError>;
}
