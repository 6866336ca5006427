//! Field and column definitions.

use crate::value::{Value, ValueType};

/// The role a persisted column plays in statement generation.
///
/// Each role carries fixed policy flags: whether the column is written by
/// INSERT, whether it is a SET target of UPDATE, and whether a value is
/// required when a new record is created.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ColumnRole {
    /// Primary key supplied by the client.
    PrimaryKey,
    /// Primary key assigned by the store on insert.
    GeneratedPrimaryKey,
    /// Tenant partition column, injected from the caller's identity.
    TenantKey,
    /// User who created the row, stamped from the caller's identity.
    CreatedBy,
    /// Creation time, set by the store's current-time expression.
    CreatedAt,
    /// User who last modified the row, stamped from the caller's identity.
    ModifiedBy,
    /// Last modification time, set by the store's current-time expression.
    ModifiedAt,
    /// Data that must be present.
    RequiredData,
    /// Data that may be absent.
    OptionalData,
}

impl ColumnRole {
    /// Whether INSERT writes this column (as a parameter or a server expression).
    #[must_use]
    pub const fn is_inserted(self) -> bool {
        !matches!(self, ColumnRole::GeneratedPrimaryKey)
    }

    /// Whether the INSERT value is bound from the record.
    ///
    /// CreatedAt/ModifiedAt are filled by the store-side current-time
    /// expression instead.
    #[must_use]
    pub const fn is_insert_param(self) -> bool {
        self.is_inserted() && !self.is_server_time()
    }

    /// Whether UPDATE writes this column (as a parameter or a server expression).
    #[must_use]
    pub const fn is_updated(self) -> bool {
        matches!(
            self,
            ColumnRole::ModifiedBy
                | ColumnRole::ModifiedAt
                | ColumnRole::RequiredData
                | ColumnRole::OptionalData
        )
    }

    /// Whether the UPDATE value is bound from the record.
    #[must_use]
    pub const fn is_update_param(self) -> bool {
        self.is_updated() && !self.is_server_time()
    }

    /// Whether a value is required when a new record is created.
    #[must_use]
    pub const fn is_required(self) -> bool {
        matches!(self, ColumnRole::PrimaryKey | ColumnRole::RequiredData)
    }

    /// Primary key roles, generated or not.
    #[must_use]
    pub const fn is_key(self) -> bool {
        matches!(
            self,
            ColumnRole::PrimaryKey | ColumnRole::GeneratedPrimaryKey
        )
    }

    /// Columns whose value comes from the store's clock.
    #[must_use]
    pub const fn is_server_time(self) -> bool {
        matches!(self, ColumnRole::CreatedAt | ColumnRole::ModifiedAt)
    }

    /// Columns stamped from the caller's user identity.
    #[must_use]
    pub const fn is_user_stamp(self) -> bool {
        matches!(self, ColumnRole::CreatedBy | ColumnRole::ModifiedBy)
    }

    /// Parse a role name (case-insensitive, `_` and `-` ignored).
    ///
    /// Returns `None` if the string is not a recognized role.
    #[must_use]
    pub fn from_str(s: &str) -> Option<Self> {
        let normalized: String = s
            .chars()
            .filter(|c| *c != '_' && *c != '-')
            .map(|c| c.to_ascii_lowercase())
            .collect();
        match normalized.as_str() {
            "primarykey" => Some(ColumnRole::PrimaryKey),
            "generatedprimarykey" => Some(ColumnRole::GeneratedPrimaryKey),
            "tenantkey" => Some(ColumnRole::TenantKey),
            "createdby" => Some(ColumnRole::CreatedBy),
            "createdat" => Some(ColumnRole::CreatedAt),
            "modifiedby" => Some(ColumnRole::ModifiedBy),
            "modifiedat" => Some(ColumnRole::ModifiedAt),
            "requireddata" => Some(ColumnRole::RequiredData),
            "optionaldata" => Some(ColumnRole::OptionalData),
            _ => None,
        }
    }
}

/// Input constraints checked when a record is parsed from client input.
///
/// The engine itself never evaluates these; only the input parser does.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Constraints {
    /// Minimum text length, in characters.
    pub min_length: Option<usize>,
    /// Maximum text length, in characters.
    pub max_length: Option<usize>,
    /// Regular expression the text must match.
    pub pattern: Option<String>,
    /// Inclusive lower bound for numeric values.
    pub min_value: Option<f64>,
    /// Inclusive upper bound for numeric values.
    pub max_value: Option<f64>,
}

impl Constraints {
    /// Create an empty constraint set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the allowed text length range.
    pub fn length(mut self, min: usize, max: usize) -> Self {
        self.min_length = Some(min);
        self.max_length = Some(max);
        self
    }

    /// Set the regex the text must match.
    pub fn pattern(mut self, pattern: impl Into<String>) -> Self {
        self.pattern = Some(pattern.into());
        self
    }

    /// Set the allowed numeric range.
    pub fn range(mut self, min: f64, max: f64) -> Self {
        self.min_value = Some(min);
        self.max_value = Some(max);
        self
    }

    /// True when no constraint is set.
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// Metadata about one field of a schema.
///
/// A field without a column is carried in the record but never persisted.
/// The index is assigned by [`SchemaBuilder`](crate::SchemaBuilder) and is the
/// only way records and statements address the field.
#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    /// Field name, unique within the schema.
    pub name: String,
    /// Position in the record's value array.
    pub index: usize,
    /// Value type of every non-null value in this slot.
    pub value_type: ValueType,
    /// Storage column name; `None` if the field is not persisted.
    pub column_name: Option<String>,
    /// Column role; always set when `column_name` is.
    pub role: Option<ColumnRole>,
    /// Requiredness of a non-persisted field. Persisted fields take it from the role.
    pub required: bool,
    /// Value placed in a new record and used when input omits the field.
    pub default_value: Value,
    /// Input constraints.
    pub constraints: Constraints,
}

impl Field {
    /// Create a non-persisted field.
    pub fn new(name: impl Into<String>, value_type: ValueType) -> Self {
        Self {
            name: name.into(),
            index: 0,
            value_type,
            column_name: None,
            role: None,
            required: false,
            default_value: Value::Null,
            constraints: Constraints::default(),
        }
    }

    /// Create a persisted field whose column has the same name as the field.
    pub fn column(name: impl Into<String>, value_type: ValueType, role: ColumnRole) -> Self {
        let name = name.into();
        let column = name.clone();
        Self::new(name, value_type).persisted_as(column, role)
    }

    /// Persist this field in the given column with the given role.
    pub fn persisted_as(mut self, column: impl Into<String>, role: ColumnRole) -> Self {
        self.column_name = Some(column.into());
        self.role = Some(role);
        self
    }

    /// Mark a non-persisted field as required.
    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    /// Set the default value.
    pub fn with_default(mut self, value: impl Into<Value>) -> Self {
        self.default_value = value.into();
        self
    }

    /// Set input constraints.
    pub fn with_constraints(mut self, constraints: Constraints) -> Self {
        self.constraints = constraints;
        self
    }

    /// Whether this field maps to a storage column.
    pub fn is_persisted(&self) -> bool {
        self.column_name.is_some()
    }

    /// Whether a value must be present when a new record is created.
    pub fn is_required(&self) -> bool {
        self.role.map_or(self.required, ColumnRole::is_required)
    }

    /// Whether this field is part of the primary key.
    pub fn is_key(&self) -> bool {
        self.role.is_some_and(ColumnRole::is_key)
    }

    /// Whether this field has the given role.
    pub fn has_role(&self, role: ColumnRole) -> bool {
        self.role == Some(role)
    }

    /// Column name, or the empty string for non-persisted fields.
    pub fn column_str(&self) -> &str {
        self.column_name.as_deref().unwrap_or("")
    }
}
