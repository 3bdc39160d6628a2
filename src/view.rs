//! Views
//!
//! A view is a saved presentation of a table's records: a display type
//! (grid or kanban), field order, hidden fields and an optional filter.

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{Result, TableError};
use crate::field::{Field, FieldId};
use crate::filter::RootFilter;
use crate::schema::TableSchema;
use crate::sql::sanitize::generate_id;

const VIEW_ID_PREFIX: &str = "viw";
const MAX_VIEW_NAME_LENGTH: usize = 100;
const DEFAULT_VIEW_NAME: &str = "Grid";

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ViewId(String);

impl ViewId {
    pub fn create() -> Self {
        Self(generate_id(VIEW_ID_PREFIX))
    }

    pub fn from_string(value: impl Into<String>) -> Result<Self> {
        let value = value.into();
        if value.trim().is_empty() {
            return Err(TableError::invalid_view("view id cannot be empty"));
        }
        Ok(Self(value))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ViewId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ============================================================================
// Inputs
// ============================================================================

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DisplayType {
    #[default]
    Grid,
    Kanban,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct KanbanInput {
    #[serde(rename = "fieldId", default, skip_serializing_if = "Option::is_none")]
    pub field_id: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GridInput {
    /// Column widths in pixels keyed by field id
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub widths: BTreeMap<String, u32>,
}

/// Persisted / incoming shape of a view
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ViewInput {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub name: String,
    #[serde(rename = "displayType", default)]
    pub display_type: DisplayType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kanban: Option<KanbanInput>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub grid: Option<GridInput>,
    #[serde(rename = "fieldOrder", default, skip_serializing_if = "Vec::is_empty")]
    pub field_order: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub hidden: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filter: Option<RootFilter>,
}

impl ViewInput {
    pub fn grid(name: impl Into<String>) -> Self {
        Self {
            id: None,
            name: name.into(),
            display_type: DisplayType::Grid,
            kanban: None,
            grid: None,
            field_order: Vec::new(),
            hidden: Vec::new(),
            filter: None,
        }
    }

    pub fn kanban(name: impl Into<String>, field_id: Option<&str>) -> Self {
        Self {
            display_type: DisplayType::Kanban,
            kanban: Some(KanbanInput {
                field_id: field_id.map(str::to_string),
            }),
            ..Self::grid(name)
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_filter(mut self, filter: RootFilter) -> Self {
        self.filter = Some(filter);
        self
    }

    pub fn with_hidden(mut self, field_id: impl Into<String>) -> Self {
        self.hidden.push(field_id.into());
        self
    }
}

// ============================================================================
// Display settings
// ============================================================================

/// Kanban settings: the field records are grouped by
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Kanban {
    field_id: Option<FieldId>,
}

impl Kanban {
    pub fn from(input: &KanbanInput) -> Result<Self> {
        let field_id = input
            .field_id
            .as_ref()
            .map(|id| {
                FieldId::from_string(id.clone())
                    .map_err(|e| TableError::invalid_view(format!("kanban field: {}", e)))
            })
            .transpose()?;
        Ok(Self { field_id })
    }

    pub fn field_id(&self) -> Option<&FieldId> {
        self.field_id.as_ref()
    }

    /// Kanban without its grouping field, or `None` when it groups by another field
    pub fn remove_field(&self, field: &Field) -> Option<Kanban> {
        if self.field_id.as_ref() == Some(field.id()) {
            Some(Kanban { field_id: None })
        } else {
            None
        }
    }

    fn to_input(&self) -> KanbanInput {
        KanbanInput {
            field_id: self.field_id.as_ref().map(FieldId::to_string),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Grid {
    widths: BTreeMap<FieldId, u32>,
}

impl Grid {
    fn from(input: &GridInput, schema: &TableSchema) -> Result<Self> {
        let mut widths = BTreeMap::new();
        for (field_id, width) in &input.widths {
            let field = require_field(schema, field_id, "grid width")?;
            widths.insert(field.id().clone(), *width);
        }
        Ok(Self { widths })
    }

    pub fn width(&self, field_id: &FieldId) -> Option<u32> {
        self.widths.get(field_id).copied()
    }

    pub fn remove_field(&self, field: &Field) -> Option<Grid> {
        if !self.widths.contains_key(field.id()) {
            return None;
        }
        let mut widths = self.widths.clone();
        widths.remove(field.id());
        Some(Grid { widths })
    }

    fn to_input(&self) -> GridInput {
        GridInput {
            widths: self
                .widths
                .iter()
                .map(|(id, w)| (id.to_string(), *w))
                .collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ViewDisplay {
    Grid(Grid),
    Kanban(Kanban),
}

fn require_field<'a>(schema: &'a TableSchema, field_id: &str, usage: &str) -> Result<&'a Field> {
    schema.get_by_id_str(field_id).ok_or_else(|| {
        TableError::invalid_view(format!("{} references unknown field '{}'", usage, field_id))
    })
}

// ============================================================================
// View
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct View {
    id: ViewId,
    name: String,
    display: ViewDisplay,
    field_order: Vec<FieldId>,
    hidden: BTreeSet<FieldId>,
    filter: Option<RootFilter>,
}

impl View {
    /// Build a view against the schema it presents.
    ///
    /// Field references in display settings, ordering and hidden fields must
    /// exist. The filter is kept as given; stale conditions are ignored when
    /// the filter is turned into a record specification.
    pub fn from(input: &ViewInput, schema: &TableSchema) -> Result<Self> {
        let id = match &input.id {
            Some(id) => ViewId::from_string(id.clone())?,
            None => ViewId::create(),
        };

        let name = input.name.trim();
        if name.is_empty() {
            return Err(TableError::invalid_view("view name cannot be empty"));
        }
        if name.chars().count() > MAX_VIEW_NAME_LENGTH {
            return Err(TableError::invalid_view(format!(
                "view name cannot be longer than {} characters",
                MAX_VIEW_NAME_LENGTH
            )));
        }

        let display = match input.display_type {
            DisplayType::Grid => {
                ViewDisplay::Grid(Grid::from(&input.grid.clone().unwrap_or_default(), schema)?)
            }
            DisplayType::Kanban => {
                let kanban = Kanban::from(&input.kanban.clone().unwrap_or_default())?;
                if let Some(field_id) = kanban.field_id() {
                    let field = require_field(schema, field_id.as_str(), "kanban")?;
                    if !field.is_groupable() {
                        return Err(TableError::invalid_view(format!(
                            "kanban cannot group by {} field '{}'",
                            field.field_type(),
                            field.name().as_str()
                        )));
                    }
                }
                ViewDisplay::Kanban(kanban)
            }
        };

        let mut field_order = Vec::with_capacity(input.field_order.len());
        let mut seen = HashSet::new();
        for field_id in &input.field_order {
            let field = require_field(schema, field_id, "field order")?;
            if seen.insert(field.id().clone()) {
                field_order.push(field.id().clone());
            }
        }

        let hidden = input
            .hidden
            .iter()
            .map(|field_id| {
                require_field(schema, field_id, "hidden fields").map(|f| f.id().clone())
            })
            .collect::<Result<BTreeSet<_>>>()?;

        Ok(Self {
            id,
            name: name.to_string(),
            display,
            field_order,
            hidden,
            filter: input.filter.clone(),
        })
    }

    /// View created for tables that are given none
    pub fn default_grid() -> Self {
        Self {
            id: ViewId::create(),
            name: DEFAULT_VIEW_NAME.to_string(),
            display: ViewDisplay::Grid(Grid::default()),
            field_order: Vec::new(),
            hidden: BTreeSet::new(),
            filter: None,
        }
    }

    pub fn id(&self) -> &ViewId {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn display(&self) -> &ViewDisplay {
        &self.display
    }

    pub fn field_order(&self) -> &[FieldId] {
        &self.field_order
    }

    pub fn is_hidden(&self, field_id: &FieldId) -> bool {
        self.hidden.contains(field_id)
    }

    pub fn filter(&self) -> Option<&RootFilter> {
        self.filter.as_ref()
    }

    /// New version of the view with the filter replaced (or cleared)
    pub fn set_filter(&self, filter: Option<RootFilter>) -> View {
        View {
            filter,
            ..self.clone()
        }
    }

    /// New version of a kanban view that no longer groups by the field, or
    /// `None` when it does not group by it
    pub fn without_grouping(&self, field: &Field) -> Option<View> {
        match &self.display {
            ViewDisplay::Kanban(kanban) => kanban.remove_field(field).map(|kanban| View {
                display: ViewDisplay::Kanban(kanban),
                ..self.clone()
            }),
            ViewDisplay::Grid(_) => None,
        }
    }

    /// New version of the view with every reference to the field dropped,
    /// or `None` when the view does not reference it
    pub fn remove_field(&self, field: &Field) -> Option<View> {
        let id = field.id();
        let display = match &self.display {
            ViewDisplay::Grid(grid) => grid.remove_field(field).map(ViewDisplay::Grid),
            ViewDisplay::Kanban(kanban) => kanban.remove_field(field).map(ViewDisplay::Kanban),
        };
        let in_order = self.field_order.contains(id);
        let in_hidden = self.hidden.contains(id);
        let in_filter = self.filter.as_ref().is_some_and(|f| f.references(id));

        if display.is_none() && !in_order && !in_hidden && !in_filter {
            return None;
        }

        Some(View {
            id: self.id.clone(),
            name: self.name.clone(),
            display: display.unwrap_or_else(|| self.display.clone()),
            field_order: self.field_order.iter().filter(|f| *f != id).cloned().collect(),
            hidden: self.hidden.iter().filter(|f| *f != id).cloned().collect(),
            filter: self.filter.as_ref().and_then(|f| f.without_field(id)),
        })
    }

    pub fn to_input(&self) -> ViewInput {
        let (display_type, kanban, grid) = match &self.display {
            ViewDisplay::Grid(grid) => {
                let grid = grid.to_input();
                let grid = (!grid.widths.is_empty()).then_some(grid);
                (DisplayType::Grid, None, grid)
            }
            ViewDisplay::Kanban(kanban) => (DisplayType::Kanban, Some(kanban.to_input()), None),
        };

        ViewInput {
            id: Some(self.id.to_string()),
            name: self.name.clone(),
            display_type,
            kanban,
            grid,
            field_order: self.field_order.iter().map(FieldId::to_string).collect(),
            hidden: self.hidden.iter().map(FieldId::to_string).collect(),
            filter: self.filter.clone(),
        }
    }
}

/// Views of a table; never empty
#[derive(Debug, Clone, PartialEq)]
pub struct Views {
    views: Vec<View>,
}

impl Views {
    pub fn new(views: Vec<View>) -> Result<Self> {
        if views.is_empty() {
            return Ok(Self {
                views: vec![View::default_grid()],
            });
        }
        let mut ids = HashSet::new();
        for view in &views {
            if !ids.insert(view.id().as_str()) {
                return Err(TableError::invalid_view(format!(
                    "duplicate view id '{}'",
                    view.id()
                )));
            }
        }
        Ok(Self { views })
    }

    pub fn iter(&self) -> impl Iterator<Item = &View> {
        self.views.iter()
    }

    pub fn len(&self) -> usize {
        self.views.len()
    }

    pub fn is_empty(&self) -> bool {
        self.views.is_empty()
    }

    /// The view used when none is requested
    pub fn default_view(&self) -> Option<&View> {
        self.views.first()
    }

    pub fn get_by_id(&self, id: &str) -> Option<&View> {
        self.views.iter().find(|v| v.id().as_str() == id)
    }

    /// Replace a view with a new version of the same id
    pub fn replace(&mut self, view: View) -> Result<()> {
        let slot = self
            .views
            .iter_mut()
            .find(|v| v.id() == view.id())
            .ok_or_else(|| TableError::ViewNotFound(view.id().to_string()))?;
        *slot = view;
        Ok(())
    }

    /// Drop the field from every view referencing it; returns the changed view ids
    pub fn remove_field(&mut self, field: &Field) -> Vec<ViewId> {
        let mut changed = Vec::new();
        for view in &mut self.views {
            if let Some(updated) = view.remove_field(field) {
                changed.push(updated.id().clone());
                *view = updated;
            }
        }
        changed
    }

    pub fn to_inputs(&self) -> Vec<ViewInput> {
        self.views.iter().map(View::to_input).collect()
    }
}

/// Views attribute of a table; an empty input yields one default grid view
#[derive(Debug, Clone, PartialEq)]
pub struct WithTableViews(Views);

impl WithTableViews {
    pub fn from(inputs: &[ViewInput], schema: &TableSchema) -> Result<Self> {
        let views = inputs
            .iter()
            .map(|input| View::from(input, schema))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self(Views::new(views)?))
    }

    pub fn views(&self) -> &Views {
        &self.0
    }
}
