//! Schemas: a named, ordered field list and everything derived from it.
//!
//! A schema is built once, checked for consistency, and shared immutably as
//! `Arc<Schema>` by every record, assistant and form of that type.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

use crate::error::{Error, Result};
use crate::field::{ColumnRole, Field};
use crate::operation::{Operation, OperationSet};
use crate::validate::{RecordValidator, validate_pattern};
use crate::value::{Value, ValueType};

/// Metadata for one record type.
pub struct Schema {
    name: String,
    table: Option<String>,
    fields: Box<[Field]>,
    by_name: HashMap<String, usize>,
    key_indexes: Box<[usize]>,
    generated_key: Option<usize>,
    tenant: Option<usize>,
    concurrency: Option<usize>,
    operations: OperationSet,
    validators: Vec<Arc<dyn RecordValidator>>,
}

impl Schema {
    /// Start building a schema.
    pub fn builder(name: impl Into<String>) -> SchemaBuilder {
        SchemaBuilder::new(name)
    }

    /// Schema name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Table name, `None` if records of this schema are not persisted.
    pub fn table(&self) -> Option<&str> {
        self.table.as_deref()
    }

    /// All fields, in index order.
    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    /// Number of fields, which is the length of every record of this schema.
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// True if the schema has no fields (never true for a built schema).
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Field at `index`.
    pub fn field(&self, index: usize) -> Option<&Field> {
        self.fields.get(index)
    }

    /// Field named `name`.
    pub fn field_by_name(&self, name: &str) -> Option<&Field> {
        self.index_of(name).and_then(|i| self.fields.get(i))
    }

    /// Index of the field named `name`.
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.by_name.get(name).copied()
    }

    /// Fields that map to storage columns, in index order.
    pub fn persisted_fields(&self) -> impl Iterator<Item = &Field> {
        self.fields.iter().filter(|f| f.is_persisted())
    }

    /// Primary key field indexes, in schema order.
    pub fn key_indexes(&self) -> &[usize] {
        &self.key_indexes
    }

    /// Index of the generated primary key, if any.
    pub fn generated_key(&self) -> Option<usize> {
        self.generated_key
    }

    /// Index of the tenant field, if any.
    pub fn tenant_index(&self) -> Option<usize> {
        self.tenant
    }

    /// Index of the concurrency-timestamp field, if the check is enabled.
    pub fn concurrency_index(&self) -> Option<usize> {
        self.concurrency
    }

    /// Allowed operations.
    pub fn operations(&self) -> OperationSet {
        self.operations
    }

    /// Whether `op` is allowed.
    pub fn allows(&self, op: Operation) -> bool {
        self.operations.contains(op)
    }

    /// Fail with `OperationNotAllowed` unless `op` is allowed.
    pub fn ensure_allowed(&self, op: Operation) -> Result<()> {
        if self.allows(op) {
            Ok(())
        } else {
            Err(Error::OperationNotAllowed {
                schema: self.name.clone(),
                operation: op,
            })
        }
    }

    /// Record-level validators run after input parsing.
    pub fn validators(&self) -> &[Arc<dyn RecordValidator>] {
        &self.validators
    }

    /// Default values of every field, as a fresh row.
    pub fn default_row(&self) -> Box<[Value]> {
        self.fields.iter().map(|f| f.default_value.clone()).collect()
    }

    /// Check a row has exactly one value per field.
    pub fn check_length(&self, row: &[Value]) -> Result<()> {
        if row.len() == self.fields.len() {
            Ok(())
        } else {
            Err(Error::RowLength {
                schema: self.name.clone(),
                expected: self.fields.len(),
                actual: row.len(),
            })
        }
    }

    /// Check `value` fits the field at `index`.
    pub fn check_value(&self, index: usize, value: &Value) -> Result<()> {
        let field = self.fields.get(index).ok_or_else(|| Error::UnknownField {
            schema: self.name.clone(),
            field: index.to_string(),
        })?;
        match value.value_type() {
            Some(actual) if actual != field.value_type => Err(Error::TypeMismatch {
                schema: self.name.clone(),
                field: field.name.clone(),
                expected: field.value_type,
                actual,
            }),
            _ => Ok(()),
        }
    }

    /// Fail with `MissingKey` if the slot at `index` is unset.
    ///
    /// For the generated key, zero counts as unset.
    pub fn require_set(&self, row: &[Value], index: usize) -> Result<()> {
        let unset = match row.get(index) {
            None => true,
            Some(v) if Some(index) == self.generated_key => v.is_unset_key(),
            Some(v) => v.is_null(),
        };
        if unset {
            Err(Error::MissingKey {
                schema: self.name.clone(),
                field: self
                    .fields
                    .get(index)
                    .map_or_else(|| index.to_string(), |f| f.name.clone()),
            })
        } else {
            Ok(())
        }
    }
}

impl fmt::Debug for Schema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Schema")
            .field("name", &self.name)
            .field("table", &self.table)
            .field("fields", &self.fields.len())
            .field("key_indexes", &self.key_indexes)
            .field("generated_key", &self.generated_key)
            .field("tenant", &self.tenant)
            .field("concurrency", &self.concurrency)
            .field("operations", &self.operations)
            .field("validators", &self.validators.len())
            .finish()
    }
}

/// Builder for [`Schema`].
///
/// # Example
///
/// ```
/// use formdb_core::{ColumnRole, Field, Schema, ValueType};
///
/// let schema = Schema::builder("customer")
///     .table("customers")
///     .field(Field::column("id", ValueType::Integer, ColumnRole::GeneratedPrimaryKey))
///     .field(Field::column("name", ValueType::Text, ColumnRole::RequiredData))
///     .build()
///     .unwrap();
///
/// assert_eq!(schema.index_of("name"), Some(1));
/// assert_eq!(schema.generated_key(), Some(0));
/// ```
pub struct SchemaBuilder {
    name: String,
    table: Option<String>,
    fields: Vec<Field>,
    concurrency_check: bool,
    operations: OperationSet,
    validators: Vec<Arc<dyn RecordValidator>>,
}

impl SchemaBuilder {
    /// Create a builder for a schema named `name`.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            table: None,
            fields: Vec::new(),
            concurrency_check: false,
            operations: OperationSet::all(),
            validators: Vec::new(),
        }
    }

    /// Persist records in `table`.
    pub fn table(mut self, table: impl Into<String>) -> Self {
        self.table = Some(table.into());
        self
    }

    /// Append a field. Its index is its position.
    pub fn field(mut self, field: Field) -> Self {
        self.fields.push(field);
        self
    }

    /// Append several fields.
    pub fn fields(mut self, fields: impl IntoIterator<Item = Field>) -> Self {
        self.fields.extend(fields);
        self
    }

    /// Use the ModifiedAt field for optimistic concurrency checks on update.
    pub fn concurrency_check(mut self, enabled: bool) -> Self {
        self.concurrency_check = enabled;
        self
    }

    /// Restrict the allowed operations.
    pub fn operations(mut self, operations: OperationSet) -> Self {
        self.operations = operations;
        self
    }

    /// Register a record-level validator.
    pub fn validator(mut self, validator: impl RecordValidator + 'static) -> Self {
        self.validators.push(Arc::new(validator));
        self
    }

    /// Check consistency, assign indexes and freeze the schema.
    pub fn build(self) -> Result<Arc<Schema>> {
        let invalid = |message: String| Error::InvalidSchema {
            schema: self.name.clone(),
            message,
        };

        if self.name.trim().is_empty() {
            return Err(invalid("schema name is empty".to_string()));
        }
        if self.fields.is_empty() {
            return Err(invalid("schema has no fields".to_string()));
        }

        let mut fields = self.fields.clone();
        let mut by_name = HashMap::with_capacity(fields.len());
        let mut columns = HashSet::new();
        let mut key_indexes = Vec::new();
        let mut generated_key = None;
        let mut tenant = None;
        let mut modified_at = Vec::new();
        let mut has_client_key = false;

        for (index, field) in fields.iter_mut().enumerate() {
            field.index = index;
            if by_name.insert(field.name.clone(), index).is_some() {
                return Err(invalid(format!("duplicate field `{}`", field.name)));
            }
            if !field.value_type.accepts(&field.default_value) {
                return Err(invalid(format!(
                    "default of `{}` is not a {}",
                    field.name, field.value_type
                )));
            }
            if let Some(pattern) = &field.constraints.pattern {
                if let Some(message) = validate_pattern(pattern) {
                    return Err(invalid(format!("`{}`: {message}", field.name)));
                }
            }

            let role = match (&field.column_name, field.role) {
                (None, None) => continue,
                (Some(column), Some(role)) => {
                    if !columns.insert(column.clone()) {
                        return Err(invalid(format!("duplicate column `{column}`")));
                    }
                    role
                }
                _ => {
                    return Err(invalid(format!(
                        "`{}` must have both a column name and a role, or neither",
                        field.name
                    )));
                }
            };

            match role {
                ColumnRole::PrimaryKey => {
                    has_client_key = true;
                    key_indexes.push(index);
                }
                ColumnRole::GeneratedPrimaryKey => {
                    if generated_key.replace(index).is_some() {
                        return Err(invalid("more than one generated key".to_string()));
                    }
                    if field.value_type != ValueType::Integer {
                        return Err(invalid(format!(
                            "generated key `{}` must be an integer",
                            field.name
                        )));
                    }
                    key_indexes.push(index);
                }
                ColumnRole::TenantKey => {
                    if tenant.replace(index).is_some() {
                        return Err(invalid("more than one tenant field".to_string()));
                    }
                }
                ColumnRole::CreatedAt | ColumnRole::ModifiedAt => {
                    if field.value_type != ValueType::Timestamp {
                        return Err(invalid(format!(
                            "`{}` must be a timestamp",
                            field.name
                        )));
                    }
                    if role == ColumnRole::ModifiedAt {
                        modified_at.push(index);
                    }
                }
                _ => {}
            }
        }

        if generated_key.is_some() && has_client_key {
            return Err(invalid(
                "a generated key cannot be combined with other key fields".to_string(),
            ));
        }

        let concurrency = if self.concurrency_check {
            match modified_at.as_slice() {
                [index] => Some(*index),
                [] => {
                    return Err(invalid(
                        "concurrency check needs a ModifiedAt field".to_string(),
                    ));
                }
                _ => {
                    return Err(invalid(
                        "more than one concurrency-timestamp field".to_string(),
                    ));
                }
            }
        } else {
            None
        };

        match (&self.table, columns.is_empty()) {
            (Some(_), true) => {
                return Err(invalid("table has no persisted fields".to_string()));
            }
            (None, false) => {
                return Err(invalid("persisted fields need a table".to_string()));
            }
            _ => {}
        }

        tracing::debug!(
            schema = %self.name,
            table = self.table.as_deref().unwrap_or(""),
            fields = fields.len(),
            keys = key_indexes.len(),
            "Schema built"
        );

        Ok(Arc::new(Schema {
            name: self.name,
            table: self.table,
            fields: fields.into_boxed_slice(),
            by_name,
            key_indexes: key_indexes.into_boxed_slice(),
            generated_key,
            tenant,
            concurrency,
            operations: self.operations,
            validators: self.validators,
        }))
    }
}
