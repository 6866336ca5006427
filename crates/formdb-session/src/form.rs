//! Forms: a schema plus its linked child forms.
//!
//! A [`Form`] is the unit the cascade works on. Reading a form reads the
//! parent row and then every linked child, recursively. Writing a form writes
//! the parent and then upserts each child with the parent's linking values
//! copied in. Deleting a form checks the parent exists, deletes every linked
//! child (grandchildren first) and then the parent, so child tables may hold
//! foreign keys to their parents.
//!
//! Everything runs on the one transaction handle the caller passes in. A
//! `false` or an error anywhere means the caller should roll back.

use std::sync::Arc;

use formdb_core::{
    Config, Error, FieldError, InputMode, Record, Result, RowAccess, Schema, TransactionHandle,
    UserContext, Value, parse_record,
};
use formdb_query::DbAssistant;

use crate::link::{LinkDescriptor, ResolvedLink};

/// Child data held for one link.
#[derive(Debug, Clone, PartialEq)]
pub enum ChildData {
    /// Nothing sent (or nothing found).
    Absent,
    /// The child of a singular link.
    Single(Box<FormData>),
    /// The rows of a tabular link.
    Table(Vec<FormData>),
}

impl ChildData {
    /// Number of child rows held.
    pub fn len(&self) -> usize {
        match self {
            ChildData::Absent => 0,
            ChildData::Single(_) => 1,
            ChildData::Table(rows) => rows.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The child rows, in order.
    pub fn iter(&self) -> impl Iterator<Item = &FormData> {
        let (single, table): (Option<&FormData>, &[FormData]) = match self {
            ChildData::Absent => (None, &[]),
            ChildData::Single(data) => (Some(data.as_ref()), &[]),
            ChildData::Table(rows) => (None, rows),
        };
        single.into_iter().chain(table)
    }

    fn iter_mut(&mut self) -> impl Iterator<Item = &mut FormData> {
        let (single, table): (Option<&mut FormData>, &mut [FormData]) = match self {
            ChildData::Absent => (None, &mut []),
            ChildData::Single(data) => (Some(data.as_mut()), &mut []),
            ChildData::Table(rows) => (None, rows),
        };
        single.into_iter().chain(table)
    }
}

/// One parent record and the data of each of its links, in link order.
#[derive(Debug, Clone, PartialEq)]
pub struct FormData {
    pub record: Record,
    pub children: Vec<ChildData>,
}

impl FormData {
    /// Child data for link `index`.
    pub fn child(&self, index: usize) -> Option<&ChildData> {
        self.children.get(index)
    }
}

/// A schema, its assistant and its links, frozen at build time.
#[derive(Debug)]
pub struct Form {
    schema: Arc<Schema>,
    assistant: DbAssistant,
    links: Vec<ResolvedLink>,
    config: Config,
}

impl Form {
    /// Start building a form over `schema`.
    pub fn builder(schema: &Arc<Schema>) -> FormBuilder {
        FormBuilder::new(schema)
    }

    pub fn name(&self) -> &str {
        self.schema.name()
    }

    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    pub fn assistant(&self) -> &DbAssistant {
        &self.assistant
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn links(&self) -> &[ResolvedLink] {
        &self.links
    }

    /// Position of the link named `name`.
    pub fn link_index(&self, name: &str) -> Option<usize> {
        self.links.iter().position(|l| l.name() == name)
    }

    /// Data holding `record` and no children.
    pub fn data(&self, record: Record) -> FormData {
        FormData {
            record,
            children: vec![ChildData::Absent; self.links.len()],
        }
    }

    /// Empty data: a record of defaults and no children.
    pub fn new_data(&self) -> FormData {
        self.data(Record::new(&self.schema))
    }

    // ========================================================================
    // Input
    // ========================================================================

    /// Parse a client payload into form data, collecting every field error.
    ///
    /// Each link's payload is read from the key named after the link: an
    /// object for a singular link, an array for a tabular one. Child fields
    /// filled from the parent are not required in the payload. Children of a
    /// record being inserted are parsed for insert; otherwise they may be new
    /// or existing.
    pub fn parse(
        &self,
        json: &serde_json::Value,
        mode: InputMode,
        ctx: &dyn UserContext,
        errors: &mut Vec<FieldError>,
    ) -> FormData {
        self.parse_with_exempt(json, mode, ctx, &[], errors)
    }

    fn parse_with_exempt(
        &self,
        json: &serde_json::Value,
        mode: InputMode,
        ctx: &dyn UserContext,
        exempt: &[usize],
        errors: &mut Vec<FieldError>,
    ) -> FormData {
        let record = parse_record(&self.schema, json, mode, ctx, exempt, errors);
        let mut data = self.data(record);
        let child_mode = if mode == InputMode::Insert {
            InputMode::Insert
        } else {
            InputMode::Save
        };

        for (link, slot) in self.links.iter().zip(data.children.iter_mut()) {
            let Some(payload) = json.get(link.name()).filter(|v| !v.is_null()) else {
                continue;
            };
            let child = link.child();
            let mut child_errors = Vec::new();

            if link.descriptor().is_tabular() {
                let Some(items) = payload.as_array() else {
                    errors.push(FieldError::new(link.name(), "expected an array"));
                    continue;
                };
                let mut rows = Vec::with_capacity(items.len());
                for (i, item) in items.iter().enumerate() {
                    let mut row_errors = Vec::new();
                    rows.push(child.parse_with_exempt(
                        item,
                        child_mode,
                        ctx,
                        link.child_indexes(),
                        &mut row_errors,
                    ));
                    child_errors.extend(row_errors.into_iter().map(|e| e.within(link.name(), Some(i))));
                }
                *slot = ChildData::Table(rows);
            } else {
                if !payload.is_object() {
                    errors.push(FieldError::new(link.name(), "expected an object"));
                    continue;
                }
                let one = child.parse_with_exempt(
                    payload,
                    child_mode,
                    ctx,
                    link.child_indexes(),
                    &mut child_errors,
                );
                child_errors = child_errors
                    .into_iter()
                    .map(|e| e.within(link.name(), None))
                    .collect();
                *slot = ChildData::Single(Box::new(one));
            }
            errors.extend(child_errors);
        }
        data
    }

    /// Render form data as JSON, children under their link names.
    pub fn to_json(&self, data: &FormData) -> serde_json::Value {
        let mut json = data.record.to_json();
        if let serde_json::Value::Object(map) = &mut json {
            for (link, child) in self.links.iter().zip(&data.children) {
                let form = link.child();
                let value = match child {
                    ChildData::Absent if link.descriptor().is_tabular() => {
                        serde_json::Value::Array(Vec::new())
                    }
                    ChildData::Absent => serde_json::Value::Null,
                    ChildData::Single(one) => form.to_json(one),
                    ChildData::Table(rows) => {
                        serde_json::Value::Array(rows.iter().map(|r| form.to_json(r)).collect())
                    }
                };
                map.insert(link.name().to_string(), value);
            }
        }
        json
    }

    // ========================================================================
    // Cascading operations
    // ========================================================================

    /// Read the parent by key, then every linked child.
    ///
    /// Returns false (leaving the data untouched) when the parent is not found.
    #[tracing::instrument(level = "debug", skip(self, handle, data), fields(form = self.name()))]
    pub fn read(&self, handle: &dyn TransactionHandle, data: &mut FormData) -> Result<bool> {
        self.check_shape(data)?;
        if !self.assistant.read(handle, data.record.as_mut_slice())? {
            tracing::debug!(form = self.name(), "Parent not found");
            return Ok(false);
        }
        self.read_links(handle, data)?;
        Ok(true)
    }

    /// Insert the parent, then upsert every child.
    #[tracing::instrument(level = "debug", skip(self, handle, data), fields(form = self.name()))]
    pub fn insert(&self, handle: &dyn TransactionHandle, data: &mut FormData) -> Result<bool> {
        self.check_counts(data)?;
        if !self.assistant.insert(handle, data.record.as_mut_slice())? {
            return Ok(false);
        }
        self.save_links(handle, data)
    }

    /// Update the parent, then upsert every child.
    ///
    /// False when the parent row is missing or its concurrency stamp is stale.
    #[tracing::instrument(level = "debug", skip(self, handle, data), fields(form = self.name()))]
    pub fn update(&self, handle: &dyn TransactionHandle, data: &mut FormData) -> Result<bool> {
        self.check_counts(data)?;
        if !self.assistant.update(handle, data.record.as_mut_slice())? {
            return Ok(false);
        }
        self.save_links(handle, data)
    }

    /// Insert or update the parent by its generated key, then upsert every child.
    #[tracing::instrument(level = "debug", skip(self, handle, data), fields(form = self.name()))]
    pub fn save(&self, handle: &dyn TransactionHandle, data: &mut FormData) -> Result<bool> {
        self.check_counts(data)?;
        if !self.assistant.save(handle, data.record.as_mut_slice())? {
            return Ok(false);
        }
        self.save_links(handle, data)
    }

    /// Delete the children of every link, then the parent.
    ///
    /// A link with no child rows is not an error. Returns false, touching
    /// nothing, when the parent does not exist.
    #[tracing::instrument(level = "debug", skip(self, handle, record), fields(form = self.name()))]
    pub fn delete(&self, handle: &dyn TransactionHandle, record: &Record) -> Result<bool> {
        if !self.assistant.exists(handle, record.as_slice())? {
            tracing::debug!(form = self.name(), "Parent not found, nothing deleted");
            return Ok(false);
        }
        self.delete_links(handle, record.as_slice())?;
        self.assistant.delete(handle, record.as_slice())
    }

    // ========================================================================
    // Link traversal
    // ========================================================================

    fn check_shape(&self, data: &FormData) -> Result<()> {
        if data.children.len() == self.links.len() {
            return Ok(());
        }
        Err(Error::InvalidSchema {
            schema: self.name().to_string(),
            message: format!(
                "form data has {} link slots, the form has {} links",
                data.children.len(),
                self.links.len()
            ),
        })
    }

    /// Check every link's row count, recursively, before anything is written.
    fn check_counts(&self, data: &FormData) -> Result<()> {
        self.check_shape(data)?;
        for (link, child) in self.links.iter().zip(&data.children) {
            link.check_count(child.len())?;
            for row in child.iter() {
                link.child().check_counts(row)?;
            }
        }
        Ok(())
    }

    fn read_links(&self, handle: &dyn TransactionHandle, data: &mut FormData) -> Result<()> {
        let parent = data.record.as_slice();
        for (link, slot) in self.links.iter().zip(data.children.iter_mut()) {
            let child = link.child();
            let params = link.bind_parent(parent);

            *slot = if link.descriptor().is_tabular() {
                let set = child
                    .assistant
                    .filter(handle, link.child_where(), &params, 0)?;
                let mut rows = Vec::with_capacity(set.len());
                for record in set.into_records() {
                    let mut row = child.data(record);
                    child.read_links(handle, &mut row)?;
                    rows.push(row);
                }
                ChildData::Table(rows)
            } else {
                match child
                    .assistant
                    .filter_first(handle, link.child_where(), &params)?
                {
                    Some(record) => {
                        let mut one = child.data(record);
                        child.read_links(handle, &mut one)?;
                        ChildData::Single(Box::new(one))
                    }
                    None => ChildData::Absent,
                }
            };
            tracing::debug!(
                form = self.name(),
                link = link.name(),
                rows = slot.len(),
                "Children read"
            );
        }
        Ok(())
    }

    fn save_links(&self, handle: &dyn TransactionHandle, data: &mut FormData) -> Result<bool> {
        let parent = data.record.as_slice();
        for (link, slot) in self.links.iter().zip(data.children.iter_mut()) {
            let child = link.child();
            for row in slot.iter_mut() {
                link.copy_keys(parent, row.record.as_mut_slice());
                if !child.assistant.upsert(handle, row.record.as_mut_slice())? {
                    tracing::warn!(
                        form = self.name(),
                        link = link.name(),
                        "Child row was not saved"
                    );
                    return Ok(false);
                }
                if !child.save_links(handle, row)? {
                    return Ok(false);
                }
            }
        }
        Ok(true)
    }

    fn delete_links(&self, handle: &dyn TransactionHandle, parent: &[Value]) -> Result<()> {
        for link in &self.links {
            let child = link.child();
            let params = link.bind_parent(parent);

            if !child.links.is_empty() {
                let rows = child
                    .assistant
                    .filter(handle, link.child_where(), &params, 0)?;
                for row in rows.rows() {
                    child.delete_links(handle, row)?;
                }
            }

            let sql = link.delete_sql();
            let count = handle
                .execute(sql, &params)
                .map_err(|e| e.into_fault(sql, &params))?;
            tracing::debug!(
                form = self.name(),
                link = link.name(),
                deleted = count,
                "Children deleted"
            );
        }
        Ok(())
    }
}

/// Builder for [`Form`].
#[derive(Debug)]
pub struct FormBuilder {
    schema: Arc<Schema>,
    links: Vec<(LinkDescriptor, Arc<Form>)>,
    config: Config,
}

impl FormBuilder {
    pub fn new(schema: &Arc<Schema>) -> Self {
        Self {
            schema: Arc::clone(schema),
            links: Vec::new(),
            config: Config::default(),
        }
    }

    /// Use `config` for this form's statements and filters.
    #[must_use]
    pub fn config(mut self, config: Config) -> Self {
        self.config = config;
        self
    }

    /// Link a child form.
    #[must_use]
    pub fn link(mut self, descriptor: LinkDescriptor, child: &Arc<Form>) -> Self {
        self.links.push((descriptor, Arc::clone(child)));
        self
    }

    /// Freeze the form, resolving every link.
    pub fn build(self) -> Result<Arc<Form>> {
        let assistant = DbAssistant::new(&self.schema, &self.config)?;
        let mut links = Vec::with_capacity(self.links.len());
        for (descriptor, child) in self.links {
            if links
                .iter()
                .any(|l: &ResolvedLink| l.name() == descriptor.name)
                || self.schema.index_of(&descriptor.name).is_some()
            {
                return Err(Error::InvalidSchema {
                    schema: self.schema.name().to_string(),
                    message: format!("link name `{}` is already used", descriptor.name),
                });
            }
            links.push(ResolvedLink::resolve(&self.schema, descriptor, child)?);
        }
        tracing::debug!(
            form = self.schema.name(),
            links = links.len(),
            "Form built"
        );
        Ok(Arc::new(Form {
            schema: self.schema,
            assistant,
            links,
            config: self.config,
        }))
    }
}
