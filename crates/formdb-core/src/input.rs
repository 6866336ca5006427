//! Filling records from client JSON.
//!
//! The parser never trusts the client with server-owned columns: the tenant
//! comes from the caller's context, CreatedBy/ModifiedBy from the caller's user
//! id, and CreatedAt is never read. ModifiedAt is read only when it is the
//! concurrency stamp of a record being updated.
//!
//! Problems are appended to an error list rather than returned one at a time,
//! so a client sees every invalid field in one response.

use std::sync::Arc;

use crate::context::UserContext;
use crate::error::FieldError;
use crate::field::{ColumnRole, Field};
use crate::record::Record;
use crate::schema::Schema;
use crate::validate::check_constraints;
use crate::value::Value;

/// What the parsed record is for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputMode {
    /// A new record: the generated key is ignored.
    Insert,
    /// An existing record: the generated key and concurrency stamp are required.
    Update,
    /// Either: the generated key decides, so it is optional. A record that
    /// carries its key must also carry its concurrency stamp.
    Save,
}

/// Parse a full record.
///
/// `exempt` lists field indexes whose requiredness is not checked because the
/// caller fills them afterwards (child link fields copied from the parent).
pub fn parse_record(
    schema: &Arc<Schema>,
    json: &serde_json::Value,
    mode: InputMode,
    ctx: &dyn UserContext,
    exempt: &[usize],
    errors: &mut Vec<FieldError>,
) -> Record {
    let mut record = Record::new(schema);
    let Some(input) = as_object(json, errors) else {
        return record;
    };
    let errors_before = errors.len();

    for field in schema.fields() {
        let slot = field.index;
        match field.role {
            Some(ColumnRole::TenantKey) => {
                stamp(&mut record, field, ctx.tenant_id(), errors);
            }
            Some(ColumnRole::CreatedBy | ColumnRole::ModifiedBy) => {
                stamp(&mut record, field, ctx.user_id(), errors);
            }
            Some(ColumnRole::CreatedAt) => {}
            Some(ColumnRole::ModifiedAt) => {
                if schema.concurrency_index() == Some(slot) && mode != InputMode::Insert {
                    let required = mode == InputMode::Update;
                    read_field(&mut record, field, input, required, errors);
                }
            }
            Some(ColumnRole::GeneratedPrimaryKey) => {
                if mode != InputMode::Insert {
                    let required = mode == InputMode::Update;
                    read_field(&mut record, field, input, required, errors);
                }
            }
            _ => {
                let required = field.is_required() && !exempt.contains(&slot);
                read_field(&mut record, field, input, required, errors);
            }
        }
    }

    if mode == InputMode::Save {
        if let Some(field) = missing_stamp(schema, &record) {
            if !errors[errors_before..].iter().any(|e| e.field == field.name) {
                errors.push(FieldError::new(&field.name, "is required"));
            }
        }
    }

    if errors.len() == errors_before {
        for validator in schema.validators() {
            validator.validate(&record, errors);
        }
    }
    record
}

/// Parse only the primary key (and tenant) of a record, for get and delete.
pub fn parse_keys(
    schema: &Arc<Schema>,
    json: &serde_json::Value,
    ctx: &dyn UserContext,
    errors: &mut Vec<FieldError>,
) -> Record {
    let mut record = Record::new(schema);
    let Some(input) = as_object(json, errors) else {
        return record;
    };
    for &slot in schema.key_indexes() {
        if let Some(field) = schema.field(slot) {
            read_field(&mut record, field, input, true, errors);
        }
    }
    if let Some(field) = schema.tenant_index().and_then(|i| schema.field(i)) {
        stamp(&mut record, field, ctx.tenant_id(), errors);
    }
    record
}

/// The concurrency stamp field, when `record` names an existing row without one.
fn missing_stamp<'s>(schema: &'s Schema, record: &Record) -> Option<&'s Field> {
    let key = schema.generated_key()?;
    let stamp = schema.concurrency_index()?;
    let values = record.as_slice();
    if values[key].is_unset_key() || !values[stamp].is_null() {
        return None;
    }
    schema.field(stamp)
}

fn as_object<'a>(
    json: &'a serde_json::Value,
    errors: &mut Vec<FieldError>,
) -> Option<&'a serde_json::Map<String, serde_json::Value>> {
    let object = json.as_object();
    if object.is_none() {
        errors.push(FieldError::new("", "expected a JSON object"));
    }
    object
}

fn stamp(record: &mut Record, field: &Field, value: Option<Value>, errors: &mut Vec<FieldError>) {
    let Some(value) = value else {
        return;
    };
    if field.value_type.accepts(&value) {
        record.as_mut_slice()[field.index] = value;
    } else {
        errors.push(FieldError::new(
            &field.name,
            format!("caller identity is not a {}", field.value_type),
        ));
    }
}

fn read_field(
    record: &mut Record,
    field: &Field,
    input: &serde_json::Map<String, serde_json::Value>,
    required: bool,
    errors: &mut Vec<FieldError>,
) {
    let raw = input
        .get(&field.name)
        .filter(|v| !v.is_null() && v.as_str() != Some(""));

    let value = match raw {
        None => field.default_value.clone(),
        Some(raw) => match field.value_type.parse_json(raw) {
            Some(value) => value,
            None => {
                errors.push(FieldError::new(
                    &field.name,
                    format!("is not a valid {}", field.value_type),
                ));
                return;
            }
        },
    };

    let unset = value.is_null()
        || (field.has_role(ColumnRole::GeneratedPrimaryKey) && value.is_unset_key());
    if unset {
        if required {
            errors.push(FieldError::new(&field.name, "is required"));
        }
        return;
    }
    if let Some(message) = check_constraints(field, &value) {
        errors.push(FieldError::new(&field.name, message));
        return;
    }
    record.as_mut_slice()[field.index] = value;
}
