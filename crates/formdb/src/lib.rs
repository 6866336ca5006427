//! formdb: metadata-driven record persistence.
//!
//! Describe a record once (fields, value types, column roles) and formdb
//! derives the SQL to insert, read, update, delete, batch-save and filter it,
//! runs that SQL through a caller-supplied transaction handle, and cascades
//! every write and read down parent/child links.
//!
//! # Crates
//!
//! - `formdb-core`: values, fields, schemas, records, errors, JSON input.
//! - `formdb-query`: frozen statements, the database assistant, filters.
//! - `formdb-session`: forms, links, cascades and operation dispatch.
//! - `formdb-sqlite` (feature `sqlite`): a `TransactionHandle` over rusqlite.
//!
//! # Example
//!
//! ```ignore
//! use formdb::prelude::*;
//!
//! let schema = Schema::builder("task")
//!     .table("tasks")
//!     .field(Field::column("id", ValueType::Integer, ColumnRole::GeneratedPrimaryKey))
//!     .field(Field::column("title", ValueType::Text, ColumnRole::RequiredData))
//!     .build()?;
//! let form = Form::builder(&schema).config(formdb::formdb_sqlite::config()).build()?;
//!
//! let tx = conn.transaction()?;
//! let outcome = form.serve(
//!     Operation::Create,
//!     &SqliteHandle::new(&tx),
//!     &Caller::user("ann"),
//!     &json!({"title": "Write docs"}),
//! )?;
//! if outcome.is_done() {
//!     tx.commit()?;
//! }
//! ```

pub use formdb_core;
pub use formdb_query;
pub use formdb_session;
#[cfg(feature = "sqlite")]
pub use formdb_sqlite;

pub use serde_json;

pub use formdb_core::{
    Caller, ColumnRole, Config, Constraints, DatabaseError, Error, Field, FieldError, FilterError,
    InputMode, Operation, OperationSet, Record, RecordSet, RecordValidator, Result, RowAccess,
    Schema, SchemaBuilder, TransactionHandle, UserContext, Value, ValueType, parse_keys,
    parse_record,
};
pub use formdb_query::{DbAssistant, FilterBuilder, FilterSpec, Operator, ParsedFilter};
pub use formdb_session::{
    ChildData, Form, FormBuilder, FormData, LinkDescriptor, LinkKind, Outcome, serve,
};
#[cfg(feature = "sqlite")]
pub use formdb_sqlite::SqliteHandle;

/// Everything an application needs to describe forms and serve operations.
pub mod prelude {
    pub use crate::{
        Caller, ColumnRole, Config, Error, Field, FieldError, FilterSpec, Form, FormData,
        InputMode, LinkDescriptor, Operation, OperationSet, Outcome, Record, RecordSet, Result,
        RowAccess, Schema, TransactionHandle, UserContext, Value, ValueType,
    };
    #[cfg(feature = "sqlite")]
    pub use crate::SqliteHandle;
    pub use serde_json::json;
}
