//! One entry point for every client operation on a form.
//!
//! [`serve`] checks the operation is allowed, parses the payload the way the
//! operation needs it, runs the cascade and reports an [`Outcome`]. It works
//! inside the caller's transaction and never commits or rolls back; on
//! anything but [`Outcome::Done`] the caller should roll back.

use serde::Serialize;

use formdb_core::{
    Error, FieldError, InputMode, Operation, Record, Result, TransactionHandle, UserContext,
    parse_keys, parse_record,
};
use formdb_query::{FilterBuilder, FilterSpec};

use crate::form::Form;

/// What happened to a client request.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", content = "data", rename_all = "camelCase")]
pub enum Outcome {
    /// The operation succeeded; the response payload.
    Done(serde_json::Value),
    /// No row matched the key.
    NotFound,
    /// The row changed since it was read, or a write did not take.
    Conflict,
    /// The payload was invalid; nothing was written.
    Rejected(Vec<FieldError>),
}

impl Outcome {
    pub fn is_done(&self) -> bool {
        matches!(self, Outcome::Done(_))
    }

    fn rejected_or(errors: Vec<FieldError>, run: impl FnOnce() -> Result<Outcome>) -> Result<Outcome> {
        if errors.is_empty() {
            run()
        } else {
            tracing::debug!(errors = errors.len(), "Payload rejected");
            Ok(Outcome::Rejected(errors))
        }
    }
}

impl Form {
    /// Run `operation` with the client's `payload`. See [`serve`].
    pub fn serve(
        &self,
        operation: Operation,
        handle: &dyn TransactionHandle,
        ctx: &dyn UserContext,
        payload: &serde_json::Value,
    ) -> Result<Outcome> {
        serve(self, operation, handle, ctx, payload)
    }
}

/// Run `operation` on `form` with the client's `payload`.
///
/// - `Get` and `Delete` read the key fields from the payload.
/// - `Create` and `Update` read the full record and its children.
/// - `Filter` reads a filter spec and returns the matching parent rows.
/// - `Bulk` reads an array of records and saves them in one batch; forms
///   with links do not support it.
#[tracing::instrument(level = "debug", skip(form, handle, ctx, payload), fields(form = form.name()))]
pub fn serve(
    form: &Form,
    operation: Operation,
    handle: &dyn TransactionHandle,
    ctx: &dyn UserContext,
    payload: &serde_json::Value,
) -> Result<Outcome> {
    form.schema().ensure_allowed(operation)?;
    tracing::info!(form = form.name(), operation = %operation, "Serving request");

    match operation {
        Operation::Get => {
            let mut errors = Vec::new();
            let record = parse_keys(form.schema(), payload, ctx, &mut errors);
            Outcome::rejected_or(errors, || {
                let mut data = form.data(record);
                if form.read(handle, &mut data)? {
                    Ok(Outcome::Done(form.to_json(&data)))
                } else {
                    Ok(Outcome::NotFound)
                }
            })
        }
        Operation::Create | Operation::Update => {
            let mode = if operation == Operation::Create {
                InputMode::Insert
            } else {
                InputMode::Update
            };
            let mut errors = Vec::new();
            let mut data = form.parse(payload, mode, ctx, &mut errors);
            Outcome::rejected_or(errors, || {
                let written = if mode == InputMode::Insert {
                    form.insert(handle, &mut data)?
                } else {
                    form.update(handle, &mut data)?
                };
                if written {
                    Ok(Outcome::Done(form.to_json(&data)))
                } else {
                    Ok(Outcome::Conflict)
                }
            })
        }
        Operation::Delete => {
            let mut errors = Vec::new();
            let record = parse_keys(form.schema(), payload, ctx, &mut errors);
            Outcome::rejected_or(errors, || {
                if form.delete(handle, &record)? {
                    Ok(Outcome::Done(serde_json::Value::Null))
                } else {
                    Ok(Outcome::NotFound)
                }
            })
        }
        Operation::Filter => {
            let spec = FilterSpec::from_json(payload)?;
            let filter = FilterBuilder::new(form.schema(), ctx, form.config()).build(&spec)?;
            let set = form.assistant().filter(
                handle,
                &filter.clause,
                &filter.params,
                filter.max_rows,
            )?;
            Ok(Outcome::Done(set.to_json()))
        }
        Operation::Bulk => {
            if !form.links().is_empty() {
                return Err(Error::NotSupported {
                    schema: form.name().to_string(),
                    action: "bulk save",
                    reason: "it has linked forms",
                });
            }
            let Some(items) = payload.as_array() else {
                return Ok(Outcome::Rejected(vec![FieldError::new(
                    "",
                    "expected an array of records",
                )]));
            };
            let mut errors = Vec::new();
            let records: Vec<Record> = items
                .iter()
                .enumerate()
                .map(|(i, item)| {
                    let mut row_errors = Vec::new();
                    let record =
                        parse_record(form.schema(), item, InputMode::Save, ctx, &[], &mut row_errors);
                    errors.extend(row_errors.into_iter().map(|e| e.within(form.name(), Some(i))));
                    record
                })
                .collect();
            Outcome::rejected_or(errors, || {
                if form.assistant().save_all(handle, &records)? {
                    Ok(Outcome::Done(serde_json::json!({ "saved": records.len() })))
                } else {
                    Ok(Outcome::Conflict)
                }
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::link::LinkDescriptor;
    use formdb_core::{
        Caller, ColumnRole, DatabaseError, Field, OperationSet, Schema, Value, ValueType,
    };
    use serde_json::json;
    use std::cell::RefCell;
    use std::sync::Arc;

    #[derive(Default)]
    struct MockHandle {
        log: RefCell<Vec<(String, Vec<Value>)>>,
        rows: Vec<Vec<Value>>,
        affected: u64,
    }

    impl TransactionHandle for MockHandle {
        fn query(
            &self,
            sql: &str,
            params: &[Value],
            _types: &[ValueType],
            _max_rows: usize,
        ) -> std::result::Result<Vec<Vec<Value>>, DatabaseError> {
            self.log.borrow_mut().push((sql.to_string(), params.to_vec()));
            Ok(self.rows.clone())
        }

        fn execute(&self, sql: &str, params: &[Value]) -> std::result::Result<u64, DatabaseError> {
            self.log.borrow_mut().push((sql.to_string(), params.to_vec()));
            Ok(self.affected)
        }

        fn execute_many(
            &self,
            sql: &str,
            rows: &[Vec<Value>],
        ) -> std::result::Result<Vec<u64>, DatabaseError> {
            for row in rows {
                self.log.borrow_mut().push((sql.to_string(), row.clone()));
            }
            Ok(vec![self.affected; rows.len()])
        }

        fn insert_returning_key(
            &self,
            sql: &str,
            params: &[Value],
            _key_column: &str,
        ) -> std::result::Result<(u64, Option<i64>), DatabaseError> {
            self.log.borrow_mut().push((sql.to_string(), params.to_vec()));
            Ok((self.affected, Some(77)))
        }
    }

    fn handle(affected: u64, rows: Vec<Vec<Value>>) -> MockHandle {
        MockHandle {
            affected,
            rows,
            ..MockHandle::default()
        }
    }

    fn task_schema(operations: OperationSet) -> Arc<Schema> {
        Schema::builder("task")
            .table("tasks")
            .field(Field::column("id", ValueType::Integer, ColumnRole::GeneratedPrimaryKey))
            .field(Field::column("tenant", ValueType::Integer, ColumnRole::TenantKey))
            .field(Field::column("title", ValueType::Text, ColumnRole::RequiredData))
            .operations(operations)
            .build()
            .unwrap()
    }

    fn task_form() -> Arc<Form> {
        Form::builder(&task_schema(OperationSet::all())).build().unwrap()
    }

    fn caller() -> Caller {
        Caller::user("ann").with_tenant(4_i64)
    }

    #[test]
    fn test_disallowed_operation() {
        let form = Form::builder(&task_schema(OperationSet::of(&[Operation::Get])))
            .build()
            .unwrap();
        let err = serve(&form, Operation::Delete, &handle(1, vec![]), &caller(), &json!({"id": 1}))
            .unwrap_err();
        assert!(matches!(err, Error::OperationNotAllowed { operation: Operation::Delete, .. }));
    }

    #[test]
    fn test_create_returns_generated_key() {
        let h = handle(1, vec![]);
        let outcome = task_form()
            .serve(Operation::Create, &h, &caller(), &json!({"title": "Write"}))
            .unwrap();
        assert_eq!(outcome, Outcome::Done(json!({"id": 77, "title": "Write"})));
        assert_eq!(
            h.log.borrow()[0].1,
            vec![Value::Integer(4), Value::from("Write")]
        );
    }

    #[test]
    fn test_rejected_payload_writes_nothing() {
        let h = handle(1, vec![]);
        let outcome = serve(&task_form(), Operation::Create, &h, &caller(), &json!({})).unwrap();
        let Outcome::Rejected(errors) = outcome else {
            panic!("expected a rejection");
        };
        assert_eq!(errors[0].field, "title");
        assert!(h.log.borrow().is_empty());
    }

    #[test]
    fn test_get_and_not_found() {
        let h = handle(1, vec![vec![Value::Integer(3), Value::Integer(4), Value::from("Read")]]);
        let outcome = serve(&task_form(), Operation::Get, &h, &caller(), &json!({"id": 3})).unwrap();
        assert_eq!(outcome, Outcome::Done(json!({"id": 3, "title": "Read"})));

        let h = handle(1, vec![]);
        let outcome = serve(&task_form(), Operation::Get, &h, &caller(), &json!({"id": 3})).unwrap();
        assert_eq!(outcome, Outcome::NotFound);
    }

    #[test]
    fn test_update_conflict_and_delete_not_found() {
        let h = handle(0, vec![]);
        let outcome = serve(
            &task_form(),
            Operation::Update,
            &h,
            &caller(),
            &json!({"id": 3, "title": "New"}),
        )
        .unwrap();
        assert_eq!(outcome, Outcome::Conflict);

        let outcome = serve(&task_form(), Operation::Delete, &h, &caller(), &json!({"id": 3})).unwrap();
        assert_eq!(outcome, Outcome::NotFound);
    }

    #[test]
    fn test_filter_scopes_to_tenant() {
        let h = handle(1, vec![vec![Value::Integer(1), Value::Integer(4), Value::from("A")]]);
        let outcome = serve(
            &task_form(),
            Operation::Filter,
            &h,
            &caller(),
            &json!({"conditions": {"title": {"comp": "^", "value": "A"}}}),
        )
        .unwrap();
        assert_eq!(outcome, Outcome::Done(json!([{"id": 1, "title": "A"}])));
        let log = h.log.borrow();
        assert_eq!(
            log[0].0,
            "SELECT id, tenant, title FROM tasks WHERE tenant=? AND title LIKE ? ESCAPE '\\'"
        );
        assert_eq!(log[0].1, vec![Value::Integer(4), Value::from("A%")]);
    }

    #[test]
    fn test_filter_input_error() {
        let err = serve(
            &task_form(),
            Operation::Filter,
            &handle(1, vec![]),
            &caller(),
            &json!({"conditions": {"id": {"comp": ">", "value": "abc"}}}),
        )
        .unwrap_err();
        assert!(err.is_filter_error());
    }

    #[test]
    fn test_bulk_saves_batch() {
        let h = handle(1, vec![]);
        let outcome = serve(
            &task_form(),
            Operation::Bulk,
            &h,
            &caller(),
            &json!([{"title": "a"}, {"id": 9, "title": "b"}]),
        )
        .unwrap();
        assert_eq!(outcome, Outcome::Done(json!({"saved": 2})));
        let log = h.log.borrow();
        assert!(log[0].0.starts_with("INSERT"));
        assert!(log[1].0.starts_with("UPDATE"));

        let outcome = serve(&task_form(), Operation::Bulk, &h, &caller(), &json!([{"title": ""}]))
            .unwrap();
        let Outcome::Rejected(errors) = outcome else {
            panic!("expected a rejection");
        };
        assert_eq!(errors[0].to_string(), "task[0].title: is required");
    }

    #[test]
    fn test_bulk_rejects_keyed_row_without_stamp() {
        let schema = Schema::builder("note")
            .table("notes")
            .field(Field::column("id", ValueType::Integer, ColumnRole::GeneratedPrimaryKey))
            .field(Field::column("body", ValueType::Text, ColumnRole::RequiredData))
            .field(Field::column("modifiedAt", ValueType::Timestamp, ColumnRole::ModifiedAt))
            .concurrency_check(true)
            .build()
            .unwrap();
        let form = Form::builder(&schema).build().unwrap();
        let h = handle(1, vec![]);

        let outcome = serve(
            &form,
            Operation::Bulk,
            &h,
            &caller(),
            &json!([{"body": "new"}, {"id": 5, "body": "edited"}]),
        )
        .unwrap();
        let Outcome::Rejected(errors) = outcome else {
            panic!("expected a rejection");
        };
        let messages: Vec<_> = errors.iter().map(ToString::to_string).collect();
        assert_eq!(messages, vec!["note[1].modifiedAt: is required"]);
        assert!(h.log.borrow().is_empty());
    }

    #[test]
    fn test_bulk_not_supported_with_links() {
        let child = Schema::builder("step")
            .table("steps")
            .field(Field::column("taskId", ValueType::Integer, ColumnRole::PrimaryKey))
            .field(Field::column("n", ValueType::Integer, ColumnRole::PrimaryKey))
            .build()
            .unwrap();
        let child = Form::builder(&child).build().unwrap();
        let form = Form::builder(&task_schema(OperationSet::all()))
            .link(LinkDescriptor::tabular("steps").on("id", "taskId"), &child)
            .build()
            .unwrap();
        let err = serve(&form, Operation::Bulk, &handle(1, vec![]), &caller(), &json!([])).unwrap_err();
        assert!(matches!(err, Error::NotSupported { .. }));
    }

    #[test]
    fn test_outcome_serializes_with_status() {
        assert_eq!(
            serde_json::to_value(Outcome::NotFound).unwrap(),
            json!({"status": "notFound"})
        );
        let rejected = Outcome::Rejected(vec![FieldError::new("title", "is required")]);
        assert_eq!(
            serde_json::to_value(rejected).unwrap(),
            json!({"status": "rejected", "data": [{"field": "title", "message": "is required"}]})
        );
    }
}
