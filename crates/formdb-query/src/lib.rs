//! Statement synthesis and filters for formdb.
//!
//! `formdb-query` turns schema metadata into SQL. It sits between the metadata
//! model in `formdb-core` and the cascade logic in `formdb-session`.
//!
//! - [`StatementSet`] freezes the select, insert, update and delete text for
//!   one schema, each with the field indexes it binds.
//! - [`DbAssistant`] runs those statements against a caller's
//!   `TransactionHandle`: single-row CRUD, batches, save and upsert, and
//!   filtered selects.
//! - [`FilterBuilder`] lowers a client [`FilterSpec`] to a parameterized
//!   `WHERE ... ORDER BY ...` clause.
//!
//! # Example
//!
//! ```ignore
//! let assistant = DbAssistant::new(&schema, &config)?;
//! let mut row = Record::new(&schema);
//! row.set_by_name("name", "Acme")?;
//! assistant.insert(&handle, row.as_mut_slice())?;
//!
//! let spec = FilterSpec::new().condition("age", ">=", "18");
//! let filter = FilterBuilder::new(&schema, &caller, &config).build(&spec)?;
//! let adults = assistant.filter(&handle, &filter.clause, &filter.params, filter.max_rows)?;
//! ```

pub mod assistant;
pub mod filter;
pub mod operator;
pub mod statements;

pub use assistant::DbAssistant;
pub use filter::{FilterBuilder, FilterCondition, FilterSpec, ParsedFilter, SortOrder, escape_like};
pub use operator::Operator;
pub use statements::{BoundStatement, StatementSet};
