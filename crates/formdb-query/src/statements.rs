//! Statement text frozen per schema.
//!
//! All SQL an assistant runs is assembled here, once, when the assistant is
//! built. Each statement carries a bind plan: the field indexes whose values
//! are bound to its placeholders, in placeholder order.

use formdb_core::{Config, Error, Result, Schema, Value, ValueType};

/// Statement text plus the field indexes bound to its placeholders.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BoundStatement {
    sql: String,
    params: Box<[usize]>,
}

impl BoundStatement {
    fn new(sql: String, params: Vec<usize>) -> Self {
        Self {
            sql,
            params: params.into_boxed_slice(),
        }
    }

    pub fn sql(&self) -> &str {
        &self.sql
    }

    /// Field indexes bound to the placeholders, in order.
    pub fn params(&self) -> &[usize] {
        &self.params
    }

    /// Collect the parameters for one row, checking each value's type.
    ///
    /// The row length must already have been checked against the schema.
    pub fn bind(&self, schema: &Schema, row: &[Value]) -> Result<Vec<Value>> {
        self.params
            .iter()
            .map(|&i| {
                let value = &row[i];
                schema.check_value(i, value)?;
                Ok(value.clone())
            })
            .collect()
    }
}

/// Every statement one schema needs.
///
/// A statement is `None` when the schema cannot support it: read, update and
/// delete need a primary key, update needs at least one SET target.
#[derive(Debug, Clone)]
pub struct StatementSet {
    select: String,
    select_indexes: Box<[usize]>,
    select_types: Box<[ValueType]>,
    key_where: Option<BoundStatement>,
    read: Option<BoundStatement>,
    insert: Option<BoundStatement>,
    update: Option<BoundStatement>,
    delete: Option<BoundStatement>,
    generated_key_column: Option<String>,
}

impl StatementSet {
    /// Assemble the statements for `schema`.
    ///
    /// Fails with `NotSupported` when the schema has no table.
    pub fn build(schema: &Schema, config: &Config) -> Result<Self> {
        let Some(table) = schema.table() else {
            return Err(Error::NotSupported {
                schema: schema.name().to_string(),
                action: "be persisted",
                reason: "it has no table",
            });
        };
        let now = config.now_expression.as_str();

        let persisted: Vec<_> = schema.persisted_fields().collect();
        let select = format!(
            "SELECT {} FROM {table}",
            persisted
                .iter()
                .map(|f| f.column_str())
                .collect::<Vec<_>>()
                .join(", ")
        );
        let select_indexes: Box<[usize]> = persisted.iter().map(|f| f.index).collect();
        let select_types: Box<[ValueType]> = persisted.iter().map(|f| f.value_type).collect();

        // Key columns in schema order, then the tenant.
        let mut where_indexes: Vec<usize> = schema.key_indexes().to_vec();
        let key_where = if where_indexes.is_empty() {
            None
        } else {
            if let Some(tenant) = schema.tenant_index() {
                where_indexes.push(tenant);
            }
            let sql = format!(
                " WHERE {}",
                where_indexes
                    .iter()
                    .filter_map(|&i| schema.field(i))
                    .map(|f| format!("{}=?", f.column_str()))
                    .collect::<Vec<_>>()
                    .join(" AND ")
            );
            Some(BoundStatement::new(sql, where_indexes))
        };

        let read = key_where.as_ref().map(|w| {
            BoundStatement::new(format!("{select}{}", w.sql), w.params.to_vec())
        });

        let insert = {
            let mut columns = Vec::new();
            let mut values = Vec::new();
            let mut params = Vec::new();
            for field in &persisted {
                let Some(role) = field.role.filter(|r| r.is_inserted()) else {
                    continue;
                };
                columns.push(field.column_str());
                if role.is_insert_param() {
                    values.push("?");
                    params.push(field.index);
                } else {
                    values.push(now);
                }
            }
            (!columns.is_empty()).then(|| {
                BoundStatement::new(
                    format!(
                        "INSERT INTO {table} ({}) VALUES ({})",
                        columns.join(", "),
                        values.join(", ")
                    ),
                    params,
                )
            })
        };

        let update = key_where.as_ref().and_then(|w| {
            let mut targets = Vec::new();
            let mut params = Vec::new();
            for field in &persisted {
                let Some(role) = field.role.filter(|r| r.is_updated()) else {
                    continue;
                };
                if role.is_update_param() {
                    targets.push(format!("{}=?", field.column_str()));
                    params.push(field.index);
                } else {
                    targets.push(format!("{}={now}", field.column_str()));
                }
            }
            if targets.is_empty() {
                return None;
            }
            let mut sql = format!("UPDATE {table} SET {}{}", targets.join(", "), w.sql);
            params.extend_from_slice(&w.params);
            if let Some(stamp) = schema.concurrency_index().and_then(|i| schema.field(i)) {
                sql.push_str(&format!(" AND {}=?", stamp.column_str()));
                params.push(stamp.index);
            }
            Some(BoundStatement::new(sql, params))
        });

        let delete = key_where
            .as_ref()
            .map(|w| BoundStatement::new(format!("DELETE FROM {table}{}", w.sql), w.params.to_vec()));

        let generated_key_column = schema
            .generated_key()
            .and_then(|i| schema.field(i))
            .map(|f| f.column_str().to_string());

        Ok(Self {
            select,
            select_indexes,
            select_types,
            key_where,
            read,
            insert,
            update,
            delete,
            generated_key_column,
        })
    }

    /// `SELECT c1, c2 FROM table`, no clause.
    pub fn select(&self) -> &str {
        &self.select
    }

    /// Field index of each selected column, in column order.
    pub fn select_indexes(&self) -> &[usize] {
        &self.select_indexes
    }

    /// Value type of each selected column, in column order.
    pub fn select_types(&self) -> &[ValueType] {
        &self.select_types
    }

    /// ` WHERE k1=? AND tenant=?` over the key and tenant fields.
    pub fn key_where(&self) -> Option<&BoundStatement> {
        self.key_where.as_ref()
    }

    pub fn read(&self) -> Option<&BoundStatement> {
        self.read.as_ref()
    }

    pub fn insert(&self) -> Option<&BoundStatement> {
        self.insert.as_ref()
    }

    pub fn update(&self) -> Option<&BoundStatement> {
        self.update.as_ref()
    }

    pub fn delete(&self) -> Option<&BoundStatement> {
        self.delete.as_ref()
    }

    /// Column of the generated key, if the schema has one.
    pub fn generated_key_column(&self) -> Option<&str> {
        self.generated_key_column.as_deref()
    }
}
