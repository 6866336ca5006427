//! Core types and traits for formdb.
//!
//! `formdb-core` is the **foundation layer** of the workspace. It defines the
//! metadata model that every other crate derives SQL and behavior from, and the
//! collaborator traits the engine talks to.
//!
//! # Role In The Architecture
//!
//! - **Metadata**: `Field`, `ColumnRole` and `Schema` describe one record type
//!   declaratively. Names are resolved to dense indexes once, when the schema is
//!   built, and never again.
//! - **Data model**: `Value`, `Record` and `RecordSet` hold record instances as
//!   index-addressed value arrays with a typed accessor layer on top.
//! - **Collaborators**: `TransactionHandle` (storage, supplied by a driver) and
//!   `UserContext` (tenant and user identity, supplied by the caller).
//! - **Input**: `parse_record` fills a record from a JSON payload, stamping
//!   tenant/user fields from the context and collecting field errors.
//!
//! # Who Uses This Crate
//!
//! - `formdb-query` freezes SQL per schema and builds filter clauses.
//! - `formdb-session` drives parent/child cascades and operation dispatch.
//! - `formdb-sqlite` implements `TransactionHandle` over rusqlite.
//!
//! Most applications should use the `formdb` facade.

pub mod config;
pub mod context;
pub mod error;
pub mod field;
pub mod handle;
pub mod input;
pub mod operation;
pub mod record;
pub mod record_set;
pub mod schema;
pub mod validate;
pub mod value;

pub use config::Config;
pub use context::{Caller, UserContext};
pub use error::{DatabaseError, Error, FieldError, FilterError, Result};
pub use field::{ColumnRole, Constraints, Field};
pub use handle::TransactionHandle;
pub use input::{InputMode, parse_keys, parse_record};
pub use operation::{Operation, OperationSet};
pub use record::{Record, RowAccess};
pub use record_set::{RecordRef, RecordSet};
pub use schema::{Schema, SchemaBuilder};
pub use validate::{RecordValidator, check_constraints, matches_pattern, validate_pattern};
pub use value::{Value, ValueType};
