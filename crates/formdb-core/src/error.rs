//! Error types for formdb.
//!
//! Business outcomes (not found, zero rows affected, stale timestamp) are never
//! errors; they come back as `Ok(false)`, `Ok(None)` or an empty set. What is
//! left falls in three groups:
//!
//! - contract and configuration violations, raised before any SQL runs;
//! - bad filter input ([`FilterError`]);
//! - storage faults ([`DatabaseError`]) annotated with the statement and its
//!   parameters.

use std::fmt;

use serde::Serialize;

use crate::operation::Operation;
use crate::value::{Value, ValueType};

/// Result alias used throughout the workspace.
pub type Result<T> = std::result::Result<T, Error>;

/// The primary error type.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Schema or form metadata is inconsistent.
    #[error("invalid schema `{schema}`: {message}")]
    InvalidSchema { schema: String, message: String },

    /// `save` was called on a schema without a generated key.
    #[error(
        "`{schema}` has no generated primary key; save cannot tell an insert from an update"
    )]
    SaveNotSupported { schema: String },

    /// The schema does not allow this operation.
    #[error("operation `{operation}` is not allowed on `{schema}`")]
    OperationNotAllowed {
        schema: String,
        operation: Operation,
    },

    /// The schema has no statement for this operation (no table, no key, or nothing to set).
    #[error("`{schema}` cannot {action}: {reason}")]
    NotSupported {
        schema: String,
        action: &'static str,
        reason: &'static str,
    },

    /// A key (or the concurrency stamp) needed to address the row is null.
    #[error("`{schema}.{field}` must be set before this operation")]
    MissingKey { schema: String, field: String },

    /// A row does not have one value per schema field.
    #[error("row for `{schema}` has {actual} values, expected {expected}")]
    RowLength {
        schema: String,
        expected: usize,
        actual: usize,
    },

    /// A value does not match its field's type.
    #[error("`{schema}.{field}` expects {expected}, got {actual}")]
    TypeMismatch {
        schema: String,
        field: String,
        expected: ValueType,
        actual: ValueType,
    },

    /// A field name or index does not exist in the schema.
    #[error("`{schema}` has no field `{field}`")]
    UnknownField { schema: String, field: String },

    /// Bad client filter input.
    #[error(transparent)]
    Filter(#[from] FilterError),

    /// A tabular link received a row count outside its bounds.
    #[error("link `{link}` expects {} rows, got {actual}", bounds(.min, .max))]
    RowCount {
        link: String,
        min: usize,
        max: usize,
        actual: usize,
    },

    /// A mandatory singular child is absent.
    #[error("link `{link}` requires a child record")]
    MissingChild { link: String },

    /// Client input failed field-level validation.
    #[error("input has {} invalid field(s)", .0.len())]
    Validation(Vec<FieldError>),

    /// The store rejected a statement.
    #[error(transparent)]
    Database(#[from] DatabaseError),

    /// Invalid configuration.
    #[error("invalid configuration: {0}")]
    Config(String),
}

#[allow(clippy::trivially_copy_pass_by_ref)]
fn bounds(min: &usize, max: &usize) -> String {
    if *max == 0 {
        format!("at least {min}")
    } else if min == max {
        format!("exactly {min}")
    } else {
        format!("between {min} and {max}")
    }
}

impl Error {
    /// True for errors raised by the store.
    pub fn is_storage_fault(&self) -> bool {
        matches!(self, Error::Database(_))
    }

    /// True for bad filter input.
    pub fn is_filter_error(&self) -> bool {
        matches!(self, Error::Filter(_))
    }

    /// True for errors the caller (or the metadata author) caused, detected
    /// before any statement ran.
    pub fn is_contract_violation(&self) -> bool {
        !self.is_storage_fault() && !self.is_filter_error()
    }

    /// Field errors carried by a validation failure.
    pub fn field_errors(&self) -> &[FieldError] {
        match self {
            Error::Validation(errors) => errors,
            _ => &[],
        }
    }
}

/// Client filter input that cannot be turned into SQL.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum FilterError {
    #[error("unknown filter operator `{operator}` for `{field}`")]
    UnknownOperator { field: String, operator: String },

    #[error("filter on `{field}` needs a value")]
    MissingValue { field: String },

    #[error("`between` on `{field}` needs a second value")]
    MissingUpperBound { field: String },

    #[error("`{value}` is not a valid {expected} for `{field}`")]
    InvalidValue {
        field: String,
        value: String,
        expected: ValueType,
    },

    #[error("`{operator}` works on text only, `{field}` is {actual}")]
    NotText {
        field: String,
        operator: &'static str,
        actual: ValueType,
    },

    #[error("malformed filter: {0}")]
    Malformed(String),
}

/// A storage fault, annotated with the statement that caused it.
#[derive(Debug)]
pub struct DatabaseError {
    /// Message from the driver.
    pub message: String,
    /// Statement text, once known.
    pub sql: Option<String>,
    /// Numbered dump of the bound parameters.
    pub params: Option<String>,
    /// Underlying driver error.
    pub source: Option<Box<dyn std::error::Error + Send + Sync + 'static>>,
}

impl DatabaseError {
    /// Create an error with a message only.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            sql: None,
            params: None,
            source: None,
        }
    }

    /// Attach the underlying driver error.
    pub fn with_source(
        mut self,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        self.source = Some(Box::new(source));
        self
    }

    /// Attach the statement and its parameters.
    pub fn with_statement(mut self, sql: &str, params: &[Value]) -> Self {
        self.sql = Some(sql.to_string());
        self.params = Some(dump_params(params));
        self
    }

    /// Annotate with the statement, log it, and convert into [`Error`].
    pub fn into_fault(self, sql: &str, params: &[Value]) -> Error {
        let err = self.with_statement(sql, params);
        tracing::error!(
            sql = sql,
            params = err.params.as_deref().unwrap_or(""),
            error = %err.message,
            "Statement failed"
        );
        Error::Database(err)
    }
}

impl fmt::Display for DatabaseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "database error: {}", self.message)?;
        if let Some(sql) = &self.sql {
            write!(f, "; sql: {sql}")?;
        }
        if let Some(params) = &self.params {
            write!(f, "; params: [{params}]")?;
        }
        Ok(())
    }
}

impl std::error::Error for DatabaseError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_deref()
            .map(|e| e as &(dyn std::error::Error + 'static))
    }
}

/// Render parameters as `1=18, 2='Jo'`.
pub fn dump_params(params: &[Value]) -> String {
    params
        .iter()
        .enumerate()
        .map(|(i, v)| format!("{}={v}", i + 1))
        .collect::<Vec<_>>()
        .join(", ")
}

/// One invalid input field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldError {
    /// Field name.
    pub field: String,
    /// What is wrong.
    pub message: String,
    /// Link (child table) the field belongs to, for nested input.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub table: Option<String>,
    /// Row within a tabular link, for nested input.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub row: Option<usize>,
}

impl FieldError {
    /// Create an error for a top-level field.
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
            table: None,
            row: None,
        }
    }

    /// Locate the error inside a child link (and row, for tabular links).
    pub fn within(mut self, table: &str, row: Option<usize>) -> Self {
        if self.table.is_none() {
            self.table = Some(table.to_string());
            self.row = row;
        }
        self
    }
}

impl fmt::Display for FieldError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.table, self.row) {
            (Some(table), Some(row)) => {
                write!(f, "{table}[{row}].{}: {}", self.field, self.message)
            }
            (Some(table), None) => write!(f, "{table}.{}: {}", self.field, self.message),
            _ => write!(f, "{}: {}", self.field, self.message),
        }
    }
}
