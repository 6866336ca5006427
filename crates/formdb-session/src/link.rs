//! Parent/child link metadata.
//!
//! A [`LinkDescriptor`] says which parent fields identify a child's rows and
//! how many child rows are allowed. It is written by the metadata author with
//! field names; the form builder resolves it once into a [`ResolvedLink`]
//! holding field indexes and frozen SQL.

use std::sync::Arc;

use formdb_core::{Error, Result, Schema, Value};

use crate::form::Form;

/// Whether a link owns one child record or a table of them.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LinkKind {
    /// Zero or more child rows, sent as a JSON array.
    #[default]
    Tabular,
    /// At most one child row, sent as a JSON object.
    Singular,
}

/// How a child form hangs off its parent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkDescriptor {
    /// Name of the link; also the payload key of the child data.
    pub name: String,
    /// Parent fields whose values identify the children.
    pub parent_fields: Vec<String>,
    /// Child fields matched against `parent_fields`, pairwise.
    pub child_fields: Vec<String>,
    /// Fewest child rows allowed.
    pub min_rows: usize,
    /// Most child rows allowed, 0 for no limit.
    pub max_rows: usize,
    pub kind: LinkKind,
}

impl LinkDescriptor {
    /// A link to any number of child rows.
    #[must_use]
    pub fn tabular(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            parent_fields: Vec::new(),
            child_fields: Vec::new(),
            min_rows: 0,
            max_rows: 0,
            kind: LinkKind::Tabular,
        }
    }

    /// A link to an optional single child row.
    #[must_use]
    pub fn singular(name: impl Into<String>) -> Self {
        Self {
            max_rows: 1,
            kind: LinkKind::Singular,
            ..Self::tabular(name)
        }
    }

    /// Match `parent_field` to `child_field`. Call once per key column.
    #[must_use]
    pub fn on(mut self, parent_field: impl Into<String>, child_field: impl Into<String>) -> Self {
        self.parent_fields.push(parent_field.into());
        self.child_fields.push(child_field.into());
        self
    }

    /// Set the allowed row count. `max` 0 means no upper bound.
    #[must_use]
    pub fn rows(mut self, min: usize, max: usize) -> Self {
        self.min_rows = min;
        self.max_rows = max;
        self
    }

    /// Make a singular child mandatory.
    #[must_use]
    pub fn required(mut self) -> Self {
        self.min_rows = self.min_rows.max(1);
        self
    }

    pub fn is_tabular(&self) -> bool {
        self.kind == LinkKind::Tabular
    }

    /// Whether `count` child rows satisfy the bounds.
    pub fn accepts_count(&self, count: usize) -> bool {
        count >= self.min_rows && (self.max_rows == 0 || count <= self.max_rows)
    }
}

/// A link bound to its parent schema and child form.
#[derive(Debug, Clone)]
pub struct ResolvedLink {
    descriptor: LinkDescriptor,
    child: Arc<Form>,
    parent_indexes: Box<[usize]>,
    child_indexes: Box<[usize]>,
    child_where: String,
    delete_sql: String,
}

impl ResolvedLink {
    /// Resolve names to indexes and freeze the child statements.
    pub fn resolve(parent: &Schema, descriptor: LinkDescriptor, child: Arc<Form>) -> Result<Self> {
        let invalid = |message: String| Error::InvalidSchema {
            schema: parent.name().to_string(),
            message: format!("link `{}`: {message}", descriptor.name),
        };

        if descriptor.parent_fields.is_empty() {
            return Err(invalid("no linking fields".to_string()));
        }
        if descriptor.parent_fields.len() != descriptor.child_fields.len() {
            return Err(invalid(format!(
                "{} parent fields but {} child fields",
                descriptor.parent_fields.len(),
                descriptor.child_fields.len()
            )));
        }
        if descriptor.max_rows != 0 && descriptor.min_rows > descriptor.max_rows {
            return Err(invalid(format!(
                "min rows {} exceeds max rows {}",
                descriptor.min_rows, descriptor.max_rows
            )));
        }
        if descriptor.kind == LinkKind::Singular && descriptor.max_rows != 1 {
            return Err(invalid("a singular link holds exactly one row at most".to_string()));
        }

        let child_schema = child.schema();
        let Some(child_table) = child_schema.table() else {
            return Err(invalid(format!("child `{}` has no table", child_schema.name())));
        };

        let mut parent_indexes = Vec::new();
        for name in &descriptor.parent_fields {
            let index = parent
                .index_of(name)
                .ok_or_else(|| invalid(format!("parent has no field `{name}`")))?;
            parent_indexes.push(index);
        }

        let mut child_indexes = Vec::new();
        let mut predicates = Vec::new();
        for (i, name) in descriptor.child_fields.iter().enumerate() {
            let field = child_schema
                .field_by_name(name)
                .filter(|f| f.is_persisted())
                .ok_or_else(|| invalid(format!("child has no persisted field `{name}`")))?;
            let parent_type = parent.fields()[parent_indexes[i]].value_type;
            if field.value_type != parent_type {
                return Err(invalid(format!(
                    "`{}` is {parent_type} but `{name}` is {}",
                    descriptor.parent_fields[i], field.value_type
                )));
            }
            child_indexes.push(field.index);
            predicates.push(format!("{}=?", field.column_str()));
        }

        let child_where = format!("WHERE {}", predicates.join(" AND "));
        let delete_sql = format!("DELETE FROM {child_table} {child_where}");

        Ok(Self {
            descriptor,
            child,
            parent_indexes: parent_indexes.into_boxed_slice(),
            child_indexes: child_indexes.into_boxed_slice(),
            child_where,
            delete_sql,
        })
    }

    pub fn descriptor(&self) -> &LinkDescriptor {
        &self.descriptor
    }

    pub fn name(&self) -> &str {
        &self.descriptor.name
    }

    /// The child form.
    pub fn child(&self) -> &Arc<Form> {
        &self.child
    }

    /// Child field indexes filled from the parent.
    pub fn child_indexes(&self) -> &[usize] {
        &self.child_indexes
    }

    /// `WHERE c1=? AND c2=?` selecting this parent's children.
    pub fn child_where(&self) -> &str {
        &self.child_where
    }

    /// `DELETE FROM child WHERE c1=? AND c2=?`.
    pub fn delete_sql(&self) -> &str {
        &self.delete_sql
    }

    /// Parent values bound to the child where clause.
    pub fn bind_parent(&self, parent: &[Value]) -> Vec<Value> {
        self.parent_indexes
            .iter()
            .map(|&i| parent[i].clone())
            .collect()
    }

    /// Copy the parent's linking values into a child row.
    pub fn copy_keys(&self, parent: &[Value], child: &mut [Value]) {
        for (&from, &to) in self.parent_indexes.iter().zip(self.child_indexes.iter()) {
            child[to] = parent[from].clone();
        }
    }

    /// Fail if `count` child rows are outside the bounds.
    pub fn check_count(&self, count: usize) -> Result<()> {
        if self.descriptor.accepts_count(count) {
            return Ok(());
        }
        if count == 0 && !self.descriptor.is_tabular() {
            return Err(Error::MissingChild {
                link: self.descriptor.name.clone(),
            });
        }
        Err(Error::RowCount {
            link: self.descriptor.name.clone(),
            min: self.descriptor.min_rows,
            max: self.descriptor.max_rows,
            actual: count,
        })
    }
}
