//! Client filters lowered to a parameterized clause.
//!
//! A [`FilterSpec`] is what a client asks for: conditions on field names,
//! a sort order and a row limit. [`FilterBuilder`] resolves it against a
//! schema and produces a [`ParsedFilter`], the `WHERE ... ORDER BY ...` text
//! plus its positional parameters, ready for [`DbAssistant::filter`].
//!
//! Unknown field names are skipped with a warning. Anything else that cannot
//! be turned into SQL (unknown operator, missing or unparseable value, text
//! operator on a non-text field) aborts the build with a [`FilterError`].
//!
//! When the schema has a tenant field, `tenant=?` bound to the caller's
//! tenant is always the first predicate.
//!
//! [`DbAssistant::filter`]: crate::assistant::DbAssistant::filter

use serde::Serialize;

use formdb_core::{
    Config, Error, Field, FilterError, Result, Schema, UserContext, Value, ValueType,
};

use crate::operator::Operator;

const LIKE_ESCAPE: char = '\\';

/// One client condition, unresolved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FilterCondition {
    pub field: String,
    /// Operator token as the client sent it.
    pub operator: String,
    pub value: Option<String>,
    /// Upper bound for `between`.
    pub to_value: Option<String>,
}

/// Ordering on one field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SortOrder {
    pub field: String,
    pub descending: bool,
}

/// What a client asked to filter on.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FilterSpec {
    pub conditions: Vec<FilterCondition>,
    pub sort: Vec<SortOrder>,
    /// Requested row limit, 0 for the configured default.
    pub max_rows: usize,
}

impl FilterSpec {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a condition with one value.
    pub fn condition(
        mut self,
        field: impl Into<String>,
        operator: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        self.conditions.push(FilterCondition {
            field: field.into(),
            operator: operator.into(),
            value: Some(value.into()),
            to_value: None,
        });
        self
    }

    /// Add a `between` condition.
    pub fn between(
        mut self,
        field: impl Into<String>,
        from: impl Into<String>,
        to: impl Into<String>,
    ) -> Self {
        self.conditions.push(FilterCondition {
            field: field.into(),
            operator: "between".to_string(),
            value: Some(from.into()),
            to_value: Some(to.into()),
        });
        self
    }

    /// Add a sort key. Keys apply in the order they are added.
    pub fn sort(mut self, field: impl Into<String>, descending: bool) -> Self {
        self.sort.push(SortOrder {
            field: field.into(),
            descending,
        });
        self
    }

    pub fn max_rows(mut self, rows: usize) -> Self {
        self.max_rows = rows;
        self
    }

    /// Parse a client filter payload.
    ///
    /// ```text
    /// {
    ///   "conditions": {"age": {"comp": ">=", "value": "18"}},
    ///   "sort": {"name": "asc", "age": "desc"},
    ///   "maxRows": 50
    /// }
    /// ```
    ///
    /// Every key is optional. Condition values may be JSON strings, numbers
    /// or booleans; an array value is joined with commas for `in`. Field order
    /// is kept as sent.
    pub fn from_json(json: &serde_json::Value) -> std::result::Result<Self, FilterError> {
        let Some(root) = json.as_object() else {
            return Err(FilterError::Malformed("filter must be a JSON object".to_string()));
        };
        let mut spec = Self::new();

        if let Some(conditions) = non_null(root.get("conditions")) {
            let conditions = conditions.as_object().ok_or_else(|| {
                FilterError::Malformed("`conditions` must be an object".to_string())
            })?;
            for (field, node) in conditions {
                let condition = match node {
                    serde_json::Value::Object(node) => FilterCondition {
                        field: field.clone(),
                        operator: non_null(node.get("comp"))
                            .map(|v| scalar_text(field, v))
                            .transpose()?
                            .unwrap_or_default(),
                        value: non_null(node.get("value"))
                            .map(|v| scalar_text(field, v))
                            .transpose()?,
                        to_value: non_null(node.get("toValue"))
                            .map(|v| scalar_text(field, v))
                            .transpose()?,
                    },
                    // Shorthand: {"field": value} means equality.
                    other => FilterCondition {
                        field: field.clone(),
                        operator: String::new(),
                        value: Some(scalar_text(field, other)?),
                        to_value: None,
                    },
                };
                spec.conditions.push(condition);
            }
        }

        if let Some(sort) = non_null(root.get("sort")) {
            let sort = sort
                .as_object()
                .ok_or_else(|| FilterError::Malformed("`sort` must be an object".to_string()))?;
            for (field, direction) in sort {
                let descending = direction
                    .as_str()
                    .is_some_and(|d| d.starts_with(['d', 'D']));
                spec.sort.push(SortOrder {
                    field: field.clone(),
                    descending,
                });
            }
        }

        if let Some(rows) = non_null(root.get("maxRows")) {
            let rows = rows
                .as_u64()
                .and_then(|n| usize::try_from(n).ok())
                .ok_or_else(|| {
                    FilterError::Malformed("`maxRows` must be a non-negative integer".to_string())
                })?;
            spec.max_rows = rows;
        }
        Ok(spec)
    }
}

fn non_null(value: Option<&serde_json::Value>) -> Option<&serde_json::Value> {
    value.filter(|v| !v.is_null())
}

fn scalar_text(field: &str, value: &serde_json::Value) -> std::result::Result<String, FilterError> {
    match value {
        serde_json::Value::String(s) => Ok(s.clone()),
        serde_json::Value::Number(n) => Ok(n.to_string()),
        serde_json::Value::Bool(b) => Ok(b.to_string()),
        serde_json::Value::Array(items) => items
            .iter()
            .map(|item| scalar_text(field, item))
            .collect::<std::result::Result<Vec<_>, _>>()
            .map(|parts| parts.join(",")),
        _ => Err(FilterError::Malformed(format!(
            "condition on `{field}` has a value that is not a scalar"
        ))),
    }
}

/// A resolved filter: clause text, parameters and the row limit to apply.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedFilter {
    /// `WHERE ...`, `ORDER BY ...`, both, or empty for every row.
    pub clause: String,
    pub params: Vec<Value>,
    pub max_rows: usize,
}

/// Resolves filter specs against one schema for one caller.
pub struct FilterBuilder<'a> {
    schema: &'a Schema,
    ctx: &'a dyn UserContext,
    config: &'a Config,
}

impl<'a> FilterBuilder<'a> {
    pub fn new(schema: &'a Schema, ctx: &'a dyn UserContext, config: &'a Config) -> Self {
        Self {
            schema,
            ctx,
            config,
        }
    }

    /// Lower `spec` to a clause.
    pub fn build(&self, spec: &FilterSpec) -> Result<ParsedFilter> {
        let mut predicates = Vec::new();
        let mut params = Vec::new();

        if let Some(tenant) = self.schema.tenant_index().and_then(|i| self.schema.field(i)) {
            let value = self.tenant_value(tenant)?;
            predicates.push(format!("{}=?", tenant.column_str()));
            params.push(value);
        }

        for condition in &spec.conditions {
            let Some(field) = self.persisted_field(&condition.field, "condition") else {
                continue;
            };
            predicates.push(lower_condition(field, condition, &mut params)?);
        }

        let mut order = Vec::new();
        for sort in &spec.sort {
            let Some(field) = self.persisted_field(&sort.field, "sort") else {
                continue;
            };
            if sort.descending {
                order.push(format!("{} DESC", field.column_str()));
            } else {
                order.push(field.column_str().to_string());
            }
        }

        let mut clause = String::new();
        if !predicates.is_empty() {
            clause.push_str("WHERE ");
            clause.push_str(&predicates.join(" AND "));
        }
        if !order.is_empty() {
            if !clause.is_empty() {
                clause.push(' ');
            }
            clause.push_str("ORDER BY ");
            clause.push_str(&order.join(", "));
        }

        let max_rows = self.config.effective_max_rows(spec.max_rows);
        tracing::debug!(
            schema = self.schema.name(),
            clause = clause.as_str(),
            params = %formdb_core::error::dump_params(&params),
            max_rows = max_rows,
            "Filter clause built"
        );
        Ok(ParsedFilter {
            clause,
            params,
            max_rows,
        })
    }

    fn tenant_value(&self, tenant: &Field) -> Result<Value> {
        let value = self.ctx.tenant_id().filter(|v| !v.is_null()).ok_or_else(|| {
            Error::MissingKey {
                schema: self.schema.name().to_string(),
                field: tenant.name.clone(),
            }
        })?;
        self.schema.check_value(tenant.index, &value)?;
        Ok(value)
    }

    fn persisted_field(&self, name: &str, usage: &str) -> Option<&'a Field> {
        let field = self
            .schema
            .field_by_name(name)
            .filter(|f| f.is_persisted());
        if field.is_none() {
            tracing::warn!(
                schema = self.schema.name(),
                field = name,
                usage = usage,
                "Not a persisted field, ignored in filter"
            );
        }
        field
    }
}

fn lower_condition(
    field: &Field,
    condition: &FilterCondition,
    params: &mut Vec<Value>,
) -> std::result::Result<String, FilterError> {
    let operator =
        Operator::parse(&condition.operator).ok_or_else(|| FilterError::UnknownOperator {
            field: field.name.clone(),
            operator: condition.operator.clone(),
        })?;
    let value = condition
        .value
        .as_deref()
        .filter(|v| !v.is_empty())
        .ok_or_else(|| FilterError::MissingValue {
            field: field.name.clone(),
        })?;
    let column = field.column_str();

    if operator.is_text_only() {
        if field.value_type != ValueType::Text {
            return Err(FilterError::NotText {
                field: field.name.clone(),
                operator: operator.as_str(),
                actual: field.value_type,
            });
        }
        let escaped = escape_like(value);
        let pattern = if operator == Operator::Contains {
            format!("%{escaped}%")
        } else {
            format!("{escaped}%")
        };
        params.push(Value::Text(pattern));
        return Ok(format!("{column} LIKE ? ESCAPE '{LIKE_ESCAPE}'"));
    }

    match operator {
        Operator::In => {
            let mut placeholders = Vec::new();
            for part in value.split(',') {
                params.push(parse_value(field, part.trim())?);
                placeholders.push("?");
            }
            Ok(format!("{column} IN ({})", placeholders.join(",")))
        }
        Operator::Between => {
            let from = parse_value(field, value)?;
            let to = condition
                .to_value
                .as_deref()
                .filter(|v| !v.is_empty())
                .ok_or_else(|| FilterError::MissingUpperBound {
                    field: field.name.clone(),
                })?;
            let to = parse_value(field, to)?;
            params.push(from);
            params.push(to);
            Ok(format!("{column} BETWEEN ? AND ?"))
        }
        _ => {
            let symbol = operator.comparison().unwrap_or("=");
            params.push(parse_value(field, value)?);
            Ok(format!("{column}{symbol}?"))
        }
    }
}

fn parse_value(field: &Field, text: &str) -> std::result::Result<Value, FilterError> {
    field
        .value_type
        .parse(text)
        .ok_or_else(|| FilterError::InvalidValue {
            field: field.name.clone(),
            value: text.to_string(),
            expected: field.value_type,
        })
}

/// Escape LIKE wildcards (and the escape character) in client text.
pub fn escape_like(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        if matches!(c, '%' | '_' | LIKE_ESCAPE) {
            escaped.push(LIKE_ESCAPE);
        }
        escaped.push(c);
    }
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;
    use formdb_core::{Caller, ColumnRole};
    use serde_json::json;
    use std::sync::Arc;

    fn person() -> Arc<Schema> {
        Schema::builder("person")
            .table("people")
            .field(Field::column("id", ValueType::Integer, ColumnRole::GeneratedPrimaryKey))
            .field(Field::column("name", ValueType::Text, ColumnRole::RequiredData))
            .field(Field::column("age", ValueType::Integer, ColumnRole::OptionalData))
            .field(
                Field::new("joined", ValueType::Date)
                    .persisted_as("joined_on", ColumnRole::OptionalData),
            )
            .field(Field::new("nickname", ValueType::Text))
            .build()
            .unwrap()
    }

    fn tenant_person() -> Arc<Schema> {
        Schema::builder("person")
            .table("people")
            .field(Field::column("id", ValueType::Integer, ColumnRole::GeneratedPrimaryKey))
            .field(
                Field::new("tenant", ValueType::Integer)
                    .persisted_as("tenant_id", ColumnRole::TenantKey),
            )
            .field(Field::column("name", ValueType::Text, ColumnRole::RequiredData))
            .build()
            .unwrap()
    }

    fn build(schema: &Schema, spec: &FilterSpec) -> Result<ParsedFilter> {
        let ctx = Caller::user("u").with_tenant(3_i64);
        FilterBuilder::new(schema, &ctx, &Config::default()).build(spec)
    }

    #[test]
    fn test_comparison_binds_typed_value() {
        let parsed = build(&person(), &FilterSpec::new().condition("age", ">=", "18")).unwrap();
        assert_eq!(parsed.clause, "WHERE age>=?");
        assert_eq!(parsed.params, vec![Value::Integer(18)]);
        assert_eq!(parsed.max_rows, 500);
    }

    #[test]
    fn test_contains_escapes_and_wraps() {
        let parsed = build(&person(), &FilterSpec::new().condition("name", "contains", "Jo")).unwrap();
        assert_eq!(parsed.clause, r"WHERE name LIKE ? ESCAPE '\'");
        assert_eq!(parsed.params, vec![Value::from("%Jo%")]);

        let parsed = build(&person(), &FilterSpec::new().condition("name", "^", "10%_a")).unwrap();
        assert_eq!(parsed.params, vec![Value::from(r"10\%\_a%")]);
    }

    #[test]
    fn test_text_operator_on_number() {
        let err = build(&person(), &FilterSpec::new().condition("age", "~", "1")).unwrap_err();
        assert!(matches!(err, Error::Filter(FilterError::NotText { .. })));
        assert!(err.is_filter_error());
    }

    #[test]
    fn test_between_and_in() {
        let spec = FilterSpec::new()
            .between("joined", "2020-01-01", "2020-12-31")
            .condition("age", "in", "18, 21,30");
        let parsed = build(&person(), &spec).unwrap();
        assert_eq!(
            parsed.clause,
            "WHERE joined_on BETWEEN ? AND ? AND age IN (?,?,?)"
        );
        assert_eq!(parsed.params.len(), 5);
        assert_eq!(parsed.params[4], Value::Integer(30));
    }

    #[test]
    fn test_parse_errors() {
        let err = build(
            &person(),
            &FilterSpec::new().condition("age", "between", "1"),
        )
        .unwrap_err();
        assert!(matches!(err, Error::Filter(FilterError::MissingUpperBound { .. })));

        let err = build(&person(), &FilterSpec::new().condition("age", "in", "1,x")).unwrap_err();
        assert!(matches!(
            err,
            Error::Filter(FilterError::InvalidValue { ref value, .. }) if value == "x"
        ));

        let err = build(&person(), &FilterSpec::new().condition("age", "like", "1")).unwrap_err();
        assert!(matches!(err, Error::Filter(FilterError::UnknownOperator { .. })));

        let err = build(&person(), &FilterSpec::new().condition("age", "=", "")).unwrap_err();
        assert!(matches!(err, Error::Filter(FilterError::MissingValue { .. })));
    }

    #[test]
    fn test_unknown_fields_are_ignored() {
        let spec = FilterSpec::new()
            .condition("shoeSize", "=", "9")
            .condition("nickname", "=", "Bo")
            .sort("shoeSize", false);
        let parsed = build(&person(), &spec).unwrap();
        assert_eq!(parsed.clause, "");
        assert!(parsed.params.is_empty());
    }

    #[test]
    fn test_sort_order() {
        let spec = FilterSpec::new().sort("name", false).sort("age", true);
        let parsed = build(&person(), &spec).unwrap();
        assert_eq!(parsed.clause, "ORDER BY name, age DESC");

        let spec = FilterSpec::new().condition("age", "<", "65").sort("name", false);
        let parsed = build(&person(), &spec).unwrap();
        assert_eq!(parsed.clause, "WHERE age<? ORDER BY name");
    }

    #[test]
    fn test_tenant_predicate_comes_first() {
        let parsed = build(&tenant_person(), &FilterSpec::new()).unwrap();
        assert_eq!(parsed.clause, "WHERE tenant_id=?");
        assert_eq!(parsed.params, vec![Value::Integer(3)]);

        let parsed = build(&tenant_person(), &FilterSpec::new().condition("name", "!=", "x")).unwrap();
        assert_eq!(parsed.clause, "WHERE tenant_id=? AND name<>?");

        let anonymous = Caller::anonymous();
        let err = FilterBuilder::new(&tenant_person(), &anonymous, &Config::default())
            .build(&FilterSpec::new())
            .unwrap_err();
        assert!(matches!(err, Error::MissingKey { .. }));
    }

    #[test]
    fn test_max_rows_is_capped() {
        let ctx = Caller::anonymous();
        let config = Config::default().max_rows_limit(1000);
        let schema = person();
        let builder = FilterBuilder::new(&schema, &ctx, &config);
        assert_eq!(builder.build(&FilterSpec::new().max_rows(20)).unwrap().max_rows, 20);
        assert_eq!(
            builder.build(&FilterSpec::new().max_rows(50_000)).unwrap().max_rows,
            1000
        );
    }

    #[test]
    fn test_from_json() {
        let spec = FilterSpec::from_json(&json!({
            "conditions": {
                "age": {"comp": ">=", "value": 18},
                "name": {"comp": "~", "value": "Jo"},
                "id": {"comp": "@", "value": [1, 2]},
                "joined": {"comp": "><", "value": "2020-01-01", "toValue": "2021-01-01"},
                "nickname": "Bo"
            },
            "sort": {"age": "desc", "name": "asc"},
            "maxRows": 25
        }))
        .unwrap();
        assert_eq!(spec.conditions.len(), 5);
        assert_eq!(spec.conditions[0].field, "age");
        assert_eq!(spec.conditions[0].value.as_deref(), Some("18"));
        assert_eq!(spec.conditions[2].value.as_deref(), Some("1,2"));
        assert_eq!(spec.conditions[3].to_value.as_deref(), Some("2021-01-01"));
        assert_eq!(spec.conditions[4].operator, "");
        assert!(spec.sort[0].descending);
        assert!(!spec.sort[1].descending);
        assert_eq!(spec.max_rows, 25);

        let parsed = build(&person(), &spec).unwrap();
        assert!(parsed.clause.starts_with("WHERE age>=? AND name LIKE ?"));
        assert!(parsed.clause.ends_with("ORDER BY age DESC, name"));
    }

    #[test]
    fn test_from_json_rejects_bad_shapes() {
        assert!(FilterSpec::from_json(&json!([])).is_err());
        assert!(FilterSpec::from_json(&json!({"conditions": []})).is_err());
        assert!(FilterSpec::from_json(&json!({"maxRows": -1})).is_err());
        assert!(FilterSpec::from_json(&json!({"conditions": {"a": {"value": {"x": 1}}}})).is_err());
        assert_eq!(FilterSpec::from_json(&json!({})).unwrap(), FilterSpec::new());
    }
}
