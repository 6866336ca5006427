//! `TransactionHandle` over a rusqlite connection.

use rusqlite::{Connection, params_from_iter};

use formdb_core::error::dump_params;
use formdb_core::{DatabaseError, TransactionHandle, Value, ValueType};

use crate::convert::{Param, read_column};

/// Statement execution on a borrowed connection.
///
/// Pass a `rusqlite::Transaction` (it derefs to a connection) to keep a whole
/// cascade in one unit of work; commit or roll it back afterwards. Statements
/// go through the connection's prepared statement cache.
#[derive(Clone, Copy)]
pub struct SqliteHandle<'c> {
    conn: &'c Connection,
}

impl<'c> SqliteHandle<'c> {
    pub fn new(conn: &'c Connection) -> Self {
        Self { conn }
    }

    /// The wrapped connection.
    pub fn connection(&self) -> &'c Connection {
        self.conn
    }
}

impl std::fmt::Debug for SqliteHandle<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteHandle")
            .field("path", &self.conn.path())
            .finish()
    }
}

fn fault(err: rusqlite::Error) -> DatabaseError {
    DatabaseError::new(err.to_string()).with_source(err)
}

impl TransactionHandle for SqliteHandle<'_> {
    fn query(
        &self,
        sql: &str,
        params: &[Value],
        types: &[ValueType],
        max_rows: usize,
    ) -> Result<Vec<Vec<Value>>, DatabaseError> {
        tracing::trace!(sql = sql, params = %dump_params(params), "sqlite query");
        let mut stmt = self.conn.prepare_cached(sql).map_err(fault)?;
        if stmt.column_count() < types.len() {
            return Err(DatabaseError::new(format!(
                "query returns {} columns, expected {}",
                stmt.column_count(),
                types.len()
            )));
        }

        let mut rows = stmt
            .query(params_from_iter(params.iter().map(Param)))
            .map_err(fault)?;
        let mut fetched = Vec::new();
        while let Some(row) = rows.next().map_err(fault)? {
            let mut values = Vec::with_capacity(types.len());
            for (i, &value_type) in types.iter().enumerate() {
                let raw = row.get_ref(i).map_err(fault)?;
                values.push(read_column(raw, value_type, i)?);
            }
            fetched.push(values);
            if max_rows != 0 && fetched.len() >= max_rows {
                break;
            }
        }
        Ok(fetched)
    }

    fn execute(&self, sql: &str, params: &[Value]) -> Result<u64, DatabaseError> {
        tracing::trace!(sql = sql, params = %dump_params(params), "sqlite execute");
        let mut stmt = self.conn.prepare_cached(sql).map_err(fault)?;
        let count = stmt
            .execute(params_from_iter(params.iter().map(Param)))
            .map_err(fault)?;
        Ok(count as u64)
    }

    fn execute_many(&self, sql: &str, rows: &[Vec<Value>]) -> Result<Vec<u64>, DatabaseError> {
        tracing::trace!(sql = sql, rows = rows.len(), "sqlite batch");
        let mut stmt = self.conn.prepare_cached(sql).map_err(fault)?;
        let mut counts = Vec::with_capacity(rows.len());
        for (i, params) in rows.iter().enumerate() {
            let count = stmt
                .execute(params_from_iter(params.iter().map(Param)))
                .map_err(|e| {
                    let err = fault(e);
                    DatabaseError {
                        message: format!("batch row {i}: {}", err.message),
                        ..err
                    }
                })?;
            counts.push(count as u64);
        }
        Ok(counts)
    }

    fn insert_returning_key(
        &self,
        sql: &str,
        params: &[Value],
        key_column: &str,
    ) -> Result<(u64, Option<i64>), DatabaseError> {
        let count = self.execute(sql, params)?;
        if count == 0 {
            return Ok((0, None));
        }
        // An INTEGER PRIMARY KEY column is the rowid.
        let key = self.conn.last_insert_rowid();
        tracing::trace!(key_column = key_column, key = key, "sqlite generated key");
        Ok((count, Some(key)))
    }
}
