//! Table aggregate
//!
//! Tables are built from a creation specification and changed only by
//! applying further specifications. Applying is all-or-nothing: the
//! mutation runs on a copy that replaces the table only on success.

use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{Result, TableError};
use crate::field::{CreateFieldInput, FieldId};
use crate::form::{FormId, FormInput, Forms, WithTableForms};
use crate::record::RecordSpec;
use crate::schema::TableSchema;
use crate::spec::{
    TableSpec, TableSpecVisitor, WithNewField, WithTableEmoji, WithTableId, WithTableName,
    WithTableSchema, WithUpdatedField, WithViewFilter, WithoutField,
};
use crate::sql::sanitize::{generate_id, validate_identifier};
use crate::view::{ViewId, ViewInput, Views, WithTableViews};

const TABLE_ID_PREFIX: &str = "tbl";
const MAX_TABLE_NAME_LENGTH: usize = 100;
const MAX_EMOJI_LENGTH: usize = 8;
const DEFAULT_EMOJI: &str = "📋";

// ============================================================================
// Attributes
// ============================================================================

/// Table identity, also the name of the underlying table
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TableId(String);

impl TableId {
    pub fn create() -> Self {
        Self(generate_id(TABLE_ID_PREFIX))
    }

    pub fn from_string(value: impl Into<String>) -> Result<Self> {
        let value = value.into();
        validate_identifier(&value, &[]).map_err(TableError::InvalidTableId)?;
        Ok(Self(value))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TableId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableName(String);

impl TableName {
    pub fn create(value: &str) -> Result<Self> {
        let value = value.trim();
        if value.is_empty() {
            return Err(TableError::InvalidTableName(
                "table name cannot be empty".to_string(),
            ));
        }
        if value.chars().count() > MAX_TABLE_NAME_LENGTH {
            return Err(TableError::InvalidTableName(format!(
                "table name cannot be longer than {} characters",
                MAX_TABLE_NAME_LENGTH
            )));
        }
        Ok(Self(value.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableEmoji(String);

impl TableEmoji {
    pub fn create(value: &str) -> Result<Self> {
        let value = value.trim();
        if value.is_empty() || value.chars().count() > MAX_EMOJI_LENGTH {
            return Err(TableError::InvalidEmoji(format!(
                "'{}' must be between 1 and {} characters",
                value, MAX_EMOJI_LENGTH
            )));
        }
        if value.chars().any(|c| c.is_ascii_alphanumeric()) {
            return Err(TableError::InvalidEmoji(format!("'{}' is not an emoji", value)));
        }
        Ok(Self(value.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for TableEmoji {
    fn default() -> Self {
        Self(DEFAULT_EMOJI.to_string())
    }
}

// ============================================================================
// Input
// ============================================================================

/// Persisted / incoming shape of a table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateTableInput {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub emoji: Option<String>,
    pub schema: Vec<CreateFieldInput>,
    #[serde(default)]
    pub views: Vec<ViewInput>,
    #[serde(default)]
    pub forms: Vec<FormInput>,
}

impl CreateTableInput {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: None,
            name: name.into(),
            emoji: None,
            schema: Vec::new(),
            views: Vec::new(),
            forms: Vec::new(),
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_emoji(mut self, emoji: impl Into<String>) -> Self {
        self.emoji = Some(emoji.into());
        self
    }

    pub fn with_field(mut self, field: CreateFieldInput) -> Self {
        self.schema.push(field);
        self
    }

    pub fn with_view(mut self, view: ViewInput) -> Self {
        self.views.push(view);
        self
    }

    pub fn with_form(mut self, form: FormInput) -> Self {
        self.forms.push(form);
        self
    }
}

// ============================================================================
// Events
// ============================================================================

/// Change recorded by `Table::apply`
#[derive(Debug, Clone, PartialEq)]
pub enum TableEvent {
    FieldCreated {
        table_id: TableId,
        field_id: FieldId,
    },
    FieldUpdated {
        table_id: TableId,
        field_id: FieldId,
    },
    /// Views and forms whose references to the field were dropped
    FieldDeleted {
        table_id: TableId,
        field_id: FieldId,
        changed_views: Vec<ViewId>,
        changed_forms: Vec<FormId>,
    },
    ViewFilterSet {
        table_id: TableId,
        view_id: ViewId,
    },
}

// ============================================================================
// Table
// ============================================================================

#[derive(Debug, Clone)]
pub struct Table {
    id: TableId,
    name: TableName,
    emoji: TableEmoji,
    schema: TableSchema,
    views: Views,
    forms: Forms,
}

impl Table {
    /// Build a table from a creation specification
    pub fn from_spec(spec: &TableSpec) -> Result<Table> {
        let mut draft = TableDraft::default();
        spec.accept(&mut draft)?;
        draft.build()
    }

    /// Apply a specification, returning the events it produced.
    ///
    /// On error the table is left unchanged.
    pub fn apply(&mut self, spec: &TableSpec) -> Result<Vec<TableEvent>> {
        let mut mutation = TableMutation {
            table: self.clone(),
            events: Vec::new(),
        };
        spec.accept(&mut mutation)?;

        *self = mutation.table;
        for event in &mutation.events {
            info!(table_id = %self.id, event = ?event, "Table changed");
        }
        Ok(mutation.events)
    }

    pub fn id(&self) -> &TableId {
        &self.id
    }

    pub fn name(&self) -> &TableName {
        &self.name
    }

    pub fn emoji(&self) -> &TableEmoji {
        &self.emoji
    }

    pub fn schema(&self) -> &TableSchema {
        &self.schema
    }

    pub fn views(&self) -> &Views {
        &self.views
    }

    pub fn forms(&self) -> &Forms {
        &self.forms
    }

    /// Record specification of a view's filter.
    ///
    /// Without a view id the default view is used. `Ok(None)` means the
    /// view selects every record.
    pub fn get_spec(&self, view_id: Option<&str>) -> Result<Option<RecordSpec>> {
        let view = match view_id {
            Some(id) => self
                .views
                .get_by_id(id)
                .ok_or_else(|| TableError::ViewNotFound(id.to_string()))?,
            None => match self.views.default_view() {
                Some(view) => view,
                None => return Ok(None),
            },
        };
        Ok(view.filter().and_then(|filter| filter.spec(&self.schema)))
    }

    /// Persisted shape of the table; feeding it back through
    /// `new_table_spec` recreates the same table
    pub fn to_input(&self) -> CreateTableInput {
        CreateTableInput {
            id: Some(self.id.to_string()),
            name: self.name.as_str().to_string(),
            emoji: Some(self.emoji.as_str().to_string()),
            schema: self.schema.to_inputs(),
            views: self.views.to_inputs(),
            forms: self.forms.to_inputs(),
        }
    }
}

/// Collects attribute specifications into a new table
#[derive(Default)]
struct TableDraft {
    id: Option<TableId>,
    name: Option<TableName>,
    emoji: Option<TableEmoji>,
    schema: Option<TableSchema>,
    views: Option<Views>,
    forms: Option<Forms>,
}

impl TableDraft {
    fn build(self) -> Result<Table> {
        let id = self
            .id
            .ok_or_else(|| TableError::validation("table id is missing"))?;
        let name = self
            .name
            .ok_or_else(|| TableError::validation("table name is missing"))?;
        let schema = self
            .schema
            .ok_or_else(|| TableError::validation("table schema is missing"))?;
        let views = match self.views {
            Some(views) => views,
            None => Views::new(Vec::new())?,
        };

        Ok(Table {
            id,
            name,
            emoji: self.emoji.unwrap_or_default(),
            schema,
            views,
            forms: self.forms.unwrap_or_default(),
        })
    }

    fn not_created(&self, what: &str) -> TableError {
        TableError::validation(format!("cannot {} before the table exists", what))
    }
}

impl TableSpecVisitor for TableDraft {
    fn with_table_name(&mut self, spec: &WithTableName) -> Result<()> {
        self.name = Some(spec.name().clone());
        Ok(())
    }

    fn with_table_id(&mut self, spec: &WithTableId) -> Result<()> {
        self.id = Some(spec.id().clone());
        Ok(())
    }

    fn with_table_schema(&mut self, spec: &WithTableSchema) -> Result<()> {
        self.schema = Some(spec.schema().clone());
        Ok(())
    }

    fn with_table_views(&mut self, spec: &WithTableViews) -> Result<()> {
        self.views = Some(spec.views().clone());
        Ok(())
    }

    fn with_table_forms(&mut self, spec: &WithTableForms) -> Result<()> {
        self.forms = Some(spec.forms().clone());
        Ok(())
    }

    fn with_table_emoji(&mut self, spec: &WithTableEmoji) -> Result<()> {
        self.emoji = Some(spec.emoji().clone());
        Ok(())
    }

    fn with_new_field(&mut self, _spec: &WithNewField) -> Result<()> {
        Err(self.not_created("add a field"))
    }

    fn without_field(&mut self, _spec: &WithoutField) -> Result<()> {
        Err(self.not_created("remove a field"))
    }

    fn with_updated_field(&mut self, _spec: &WithUpdatedField) -> Result<()> {
        Err(self.not_created("update a field"))
    }

    fn with_view_filter(&mut self, _spec: &WithViewFilter) -> Result<()> {
        Err(self.not_created("set a view filter"))
    }
}

/// Applies specifications to a copy of an existing table
struct TableMutation {
    table: Table,
    events: Vec<TableEvent>,
}

impl TableMutation {
    fn creation_only(what: &str) -> TableError {
        TableError::validation(format!("{} can only be set when creating a table", what))
    }
}

impl TableSpecVisitor for TableMutation {
    fn with_table_name(&mut self, spec: &WithTableName) -> Result<()> {
        self.table.name = spec.name().clone();
        Ok(())
    }

    fn with_table_id(&mut self, spec: &WithTableId) -> Result<()> {
        if spec.id() != &self.table.id {
            return Err(Self::creation_only("table id"));
        }
        Ok(())
    }

    fn with_table_schema(&mut self, _spec: &WithTableSchema) -> Result<()> {
        Err(Self::creation_only("the whole schema"))
    }

    fn with_table_views(&mut self, _spec: &WithTableViews) -> Result<()> {
        Err(Self::creation_only("the view list"))
    }

    fn with_table_forms(&mut self, _spec: &WithTableForms) -> Result<()> {
        Err(Self::creation_only("the form list"))
    }

    fn with_table_emoji(&mut self, spec: &WithTableEmoji) -> Result<()> {
        self.table.emoji = spec.emoji().clone();
        Ok(())
    }

    fn with_new_field(&mut self, spec: &WithNewField) -> Result<()> {
        self.table.schema = self.table.schema.with_new_field(spec.field().clone())?;
        self.events.push(TableEvent::FieldCreated {
            table_id: self.table.id.clone(),
            field_id: spec.field().id().clone(),
        });
        Ok(())
    }

    fn without_field(&mut self, spec: &WithoutField) -> Result<()> {
        let (schema, removed) = self.table.schema.without_field(spec.field_id())?;
        self.table.schema = schema;

        let changed_views = self.table.views.remove_field(&removed);
        let changed_forms = self.table.forms.remove_field(&removed);

        self.events.push(TableEvent::FieldDeleted {
            table_id: self.table.id.clone(),
            field_id: removed.id().clone(),
            changed_views,
            changed_forms,
        });
        Ok(())
    }

    fn with_updated_field(&mut self, spec: &WithUpdatedField) -> Result<()> {
        let current = self
            .table
            .schema
            .get_by_id(spec.previous().id())
            .ok_or_else(|| TableError::FieldNotFound(spec.previous().id().to_string()))?;
        if current.kind() != spec.previous().kind() {
            return Err(TableError::conflict(format!(
                "field '{}' changed since the update was prepared",
                current.id()
            )));
        }

        let next = spec.next();
        let (schema, _) = self.table.schema.with_updated_field(next.clone())?;
        self.table.schema = schema;

        // a new type can invalidate a kanban grouping on the field
        if !next.is_groupable() {
            let ungrouped: Vec<_> = self
                .table
                .views
                .iter()
                .filter_map(|view| view.without_grouping(next))
                .collect();
            for view in ungrouped {
                self.table.views.replace(view)?;
            }
        }

        self.events.push(TableEvent::FieldUpdated {
            table_id: self.table.id.clone(),
            field_id: next.id().clone(),
        });
        Ok(())
    }

    fn with_view_filter(&mut self, spec: &WithViewFilter) -> Result<()> {
        let view = self
            .table
            .views
            .get_by_id(spec.view_id().as_str())
            .ok_or_else(|| TableError::ViewNotFound(spec.view_id().to_string()))?;
        let updated = view.set_filter(spec.filter().cloned());
        self.table.views.replace(updated)?;

        self.events.push(TableEvent::ViewFilterSet {
            table_id: self.table.id.clone(),
            view_id: spec.view_id().clone(),
        });
        Ok(())
    }
}
