//! Field model
//!
//! Typed field definitions with per-type value constraints. A field owns
//! exactly one column of the underlying table, named after its id.

use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{Result, TableError};
use crate::sql::sanitize::{RESERVED_COLUMNS, generate_id, validate_identifier};
use crate::table::TableId;
use crate::types::{ColumnDefinition, ColumnType};

const FIELD_ID_PREFIX: &str = "fld";
const OPTION_ID_PREFIX: &str = "opt";
const MAX_FIELD_NAME_LENGTH: usize = 100;

static FIELD_KEY_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("field key pattern compiles")
});

static EMAIL_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").expect("email pattern compiles")
});

// ============================================================================
// Identity
// ============================================================================

/// Immutable field identity, also the name of the field's physical column
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct FieldId(String);

impl FieldId {
    /// Generate a fresh id
    pub fn create() -> Self {
        Self(generate_id(FIELD_ID_PREFIX))
    }

    /// Parse a supplied id; it must be usable as a column name
    pub fn from_string(value: impl Into<String>) -> Result<Self> {
        let value = value.into();
        validate_identifier(&value, RESERVED_COLUMNS).map_err(TableError::InvalidFieldId)?;
        Ok(Self(value))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for FieldId {
    type Error = TableError;

    fn try_from(value: String) -> Result<Self> {
        Self::from_string(value)
    }
}

impl From<FieldId> for String {
    fn from(id: FieldId) -> Self {
        id.0
    }
}

impl fmt::Display for FieldId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Stable machine name of a field; survives renames
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FieldKey(String);

impl FieldKey {
    pub fn from_string(value: impl Into<String>) -> Result<Self> {
        let value = value.into();
        if !FIELD_KEY_PATTERN.is_match(&value) {
            return Err(TableError::InvalidFieldKey(format!(
                "'{}' must start with a letter or underscore and contain only letters, digits and underscores",
                value
            )));
        }
        Ok(Self(value))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Display name of a field
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldName(String);

impl FieldName {
    pub fn create(value: impl AsRef<str>) -> Result<Self> {
        let value = value.as_ref().trim();
        if value.is_empty() {
            return Err(TableError::InvalidFieldName(
                "field name cannot be empty".to_string(),
            ));
        }
        if value.chars().count() > MAX_FIELD_NAME_LENGTH {
            return Err(TableError::InvalidFieldName(format!(
                "field name cannot be longer than {} characters",
                MAX_FIELD_NAME_LENGTH
            )));
        }
        Ok(Self(value.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

// ============================================================================
// Field Types
// ============================================================================

/// Closed set of field type tags
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldType {
    String,
    Email,
    Number,
    Date,
    Bool,
    Select,
    Reference,
}

impl FieldType {
    pub fn as_str(&self) -> &'static str {
        match self {
            FieldType::String => "string",
            FieldType::Email => "email",
            FieldType::Number => "number",
            FieldType::Date => "date",
            FieldType::Bool => "bool",
            FieldType::Select => "select",
            FieldType::Reference => "reference",
        }
    }
}

impl FromStr for FieldType {
    type Err = TableError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "string" => Ok(FieldType::String),
            "email" => Ok(FieldType::Email),
            "number" => Ok(FieldType::Number),
            "date" => Ok(FieldType::Date),
            "bool" => Ok(FieldType::Bool),
            "select" => Ok(FieldType::Select),
            "reference" => Ok(FieldType::Reference),
            other => Err(TableError::UnsupportedFieldType(other.to_string())),
        }
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Option of a select field
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectOption {
    pub id: String,
    pub name: String,
}

/// Type-specific part of a field
#[derive(Debug, Clone, PartialEq)]
pub enum FieldKind {
    String,
    Email,
    Number,
    Date,
    Bool,
    Select { options: Vec<SelectOption> },
    /// Link to a record of another table (or of the same table when unset)
    Reference { foreign_table_id: Option<TableId> },
}

impl FieldKind {
    pub fn field_type(&self) -> FieldType {
        match self {
            FieldKind::String => FieldType::String,
            FieldKind::Email => FieldType::Email,
            FieldKind::Number => FieldType::Number,
            FieldKind::Date => FieldType::Date,
            FieldKind::Bool => FieldType::Bool,
            FieldKind::Select { .. } => FieldType::Select,
            FieldKind::Reference { .. } => FieldType::Reference,
        }
    }

    fn is_text(&self) -> bool {
        matches!(self, FieldKind::String | FieldKind::Email)
    }
}

// ============================================================================
// Value Constraints
// ============================================================================

/// Value constraints of a field.
///
/// `min`/`max` bound the character length of text fields and the value of
/// number fields; other types reject them.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FieldValueConstraints {
    pub required: bool,
    pub min: Option<f64>,
    pub max: Option<f64>,
}

impl FieldValueConstraints {
    pub fn create(
        kind: &FieldKind,
        required: bool,
        min: Option<f64>,
        max: Option<f64>,
    ) -> Result<Self> {
        let bounded = min.is_some() || max.is_some();
        if bounded && !(kind.is_text() || *kind == FieldKind::Number) {
            return Err(TableError::invalid_constraint(format!(
                "{} fields do not support min/max constraints",
                kind.field_type()
            )));
        }

        for bound in [min, max].into_iter().flatten() {
            if !bound.is_finite() {
                return Err(TableError::invalid_constraint("bounds must be finite numbers"));
            }
            if kind.is_text() && (bound < 0.0 || bound.fract() != 0.0) {
                return Err(TableError::invalid_constraint(
                    "length bounds must be non-negative integers",
                ));
            }
        }

        if let (Some(min), Some(max)) = (min, max) {
            if min > max {
                return Err(TableError::invalid_constraint(format!(
                    "min ({}) cannot exceed max ({})",
                    min, max
                )));
            }
        }

        Ok(Self { required, min, max })
    }
}

// ============================================================================
// Inputs
// ============================================================================

/// Persisted / incoming shape of a select option
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectOptionInput {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub name: String,
}

/// Persisted / incoming shape of a field
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateFieldInput {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    pub name: String,
    #[serde(rename = "type")]
    pub field_type: String,
    #[serde(default)]
    pub required: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max: Option<f64>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub options: Vec<SelectOptionInput>,
    #[serde(
        rename = "foreignTableId",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub foreign_table_id: Option<String>,
}

impl CreateFieldInput {
    pub fn new(name: impl Into<String>, field_type: impl Into<String>) -> Self {
        Self {
            id: None,
            key: None,
            name: name.into(),
            field_type: field_type.into(),
            required: false,
            min: None,
            max: None,
            options: Vec::new(),
            foreign_table_id: None,
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key = Some(key.into());
        self
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn with_bounds(mut self, min: Option<f64>, max: Option<f64>) -> Self {
        self.min = min;
        self.max = max;
        self
    }

    pub fn with_option(mut self, id: impl Into<String>, name: impl Into<String>) -> Self {
        self.options.push(SelectOptionInput {
            id: Some(id.into()),
            name: name.into(),
        });
        self
    }

    pub fn with_foreign_table(mut self, table_id: impl Into<String>) -> Self {
        self.foreign_table_id = Some(table_id.into());
        self
    }
}

// ============================================================================
// Field
// ============================================================================

/// Immutable field value object; equality is identity equality
#[derive(Debug, Clone)]
pub struct Field {
    id: FieldId,
    key: FieldKey,
    name: FieldName,
    kind: FieldKind,
    constraints: FieldValueConstraints,
}

impl PartialEq for Field {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Field {}

impl Field {
    /// Build a field from input, validating every attribute.
    ///
    /// A missing id is generated; a missing key defaults to the id.
    pub fn create(input: &CreateFieldInput) -> Result<Self> {
        let field_type: FieldType = input.field_type.parse()?;
        let id = match &input.id {
            Some(id) => FieldId::from_string(id.clone())?,
            None => FieldId::create(),
        };
        let key = FieldKey::from_string(input.key.clone().unwrap_or_else(|| id.to_string()))?;
        let name = FieldName::create(&input.name)?;
        let kind = Self::build_kind(field_type, input)?;
        let constraints =
            FieldValueConstraints::create(&kind, input.required, input.min, input.max)?;

        Ok(Self {
            id,
            key,
            name,
            kind,
            constraints,
        })
    }

    fn build_kind(field_type: FieldType, input: &CreateFieldInput) -> Result<FieldKind> {
        if field_type != FieldType::Select && !input.options.is_empty() {
            return Err(TableError::invalid_constraint(format!(
                "{} fields do not take options",
                field_type
            )));
        }
        if field_type != FieldType::Reference && input.foreign_table_id.is_some() {
            return Err(TableError::invalid_constraint(format!(
                "{} fields do not take a foreign table",
                field_type
            )));
        }

        Ok(match field_type {
            FieldType::String => FieldKind::String,
            FieldType::Email => FieldKind::Email,
            FieldType::Number => FieldKind::Number,
            FieldType::Date => FieldKind::Date,
            FieldType::Bool => FieldKind::Bool,
            FieldType::Select => FieldKind::Select {
                options: Self::build_options(&input.options)?,
            },
            FieldType::Reference => {
                let foreign_table_id = input
                    .foreign_table_id
                    .as_ref()
                    .map(|id| {
                        TableId::from_string(id.clone()).map_err(|e| {
                            TableError::invalid_constraint(format!("foreign table: {}", e))
                        })
                    })
                    .transpose()?;
                FieldKind::Reference { foreign_table_id }
            }
        })
    }

    fn build_options(inputs: &[SelectOptionInput]) -> Result<Vec<SelectOption>> {
        if inputs.is_empty() {
            return Err(TableError::invalid_constraint(
                "select fields need at least one option",
            ));
        }

        let mut options: Vec<SelectOption> = Vec::with_capacity(inputs.len());
        for input in inputs {
            let name = input.name.trim();
            if name.is_empty() {
                return Err(TableError::invalid_constraint("option name cannot be empty"));
            }
            let id = input
                .id
                .clone()
                .unwrap_or_else(|| generate_id(OPTION_ID_PREFIX));
            if options.iter().any(|o| o.id == id) {
                return Err(TableError::invalid_constraint(format!(
                    "duplicate option id '{}'",
                    id
                )));
            }
            options.push(SelectOption {
                id,
                name: name.to_string(),
            });
        }
        Ok(options)
    }

    pub fn id(&self) -> &FieldId {
        &self.id
    }

    pub fn key(&self) -> &FieldKey {
        &self.key
    }

    pub fn name(&self) -> &FieldName {
        &self.name
    }

    pub fn kind(&self) -> &FieldKind {
        &self.kind
    }

    pub fn field_type(&self) -> FieldType {
        self.kind.field_type()
    }

    pub fn constraints(&self) -> &FieldValueConstraints {
        &self.constraints
    }

    /// Whether a kanban view can group records by this field
    pub fn is_groupable(&self) -> bool {
        matches!(self.kind, FieldKind::Select { .. } | FieldKind::Date)
    }

    /// Column backing this field in the underlying table.
    ///
    /// Columns stay nullable so they can be added to populated tables;
    /// `required` is enforced when record values are validated.
    pub fn column_definition(&self) -> ColumnDefinition {
        let name = self.id.as_str();
        match &self.kind {
            FieldKind::String | FieldKind::Email => {
                ColumnDefinition::new(name, ColumnType::VarChar)
            }
            FieldKind::Number => ColumnDefinition::new(name, ColumnType::Numeric),
            FieldKind::Date => ColumnDefinition::new(name, ColumnType::Timestamp),
            FieldKind::Bool => ColumnDefinition::new(name, ColumnType::Boolean)
                .not_null()
                .default("FALSE"),
            FieldKind::Select { .. } => ColumnDefinition::new(name, ColumnType::Text),
            FieldKind::Reference { .. } => ColumnDefinition::new(name, ColumnType::Text),
        }
    }

    /// Check one record value against this field.
    ///
    /// `required` overrides the field's own constraint (forms can tighten it).
    pub fn validate_value(&self, value: &serde_json::Value, required: bool) -> Result<()> {
        let invalid = |msg: String| {
            TableError::invalid_record(format!("field '{}': {}", self.name.as_str(), msg))
        };

        let is_blank = value.is_null() || value.as_str().is_some_and(|s| s.is_empty());
        if is_blank {
            if required && !matches!(self.kind, FieldKind::Bool) {
                return Err(invalid("value is required".to_string()));
            }
            return Ok(());
        }

        match &self.kind {
            FieldKind::String | FieldKind::Email => {
                let s = value
                    .as_str()
                    .ok_or_else(|| invalid(format!("expected text, got {}", value)))?;
                let length = s.chars().count() as f64;
                if let Some(min) = self.constraints.min {
                    if length < min {
                        return Err(invalid(format!("must be at least {} characters", min)));
                    }
                }
                if let Some(max) = self.constraints.max {
                    if length > max {
                        return Err(invalid(format!("must be at most {} characters", max)));
                    }
                }
                if self.kind == FieldKind::Email && !EMAIL_PATTERN.is_match(s) {
                    return Err(invalid(format!("'{}' is not an email address", s)));
                }
                Ok(())
            }
            FieldKind::Number => {
                let n = value
                    .as_f64()
                    .or_else(|| value.as_str().and_then(|s| s.parse::<f64>().ok()))
                    .ok_or_else(|| invalid(format!("expected a number, got {}", value)))?;
                if let Some(min) = self.constraints.min {
                    if n < min {
                        return Err(invalid(format!("must be at least {}", min)));
                    }
                }
                if let Some(max) = self.constraints.max {
                    if n > max {
                        return Err(invalid(format!("must be at most {}", max)));
                    }
                }
                Ok(())
            }
            FieldKind::Date => {
                let s = value
                    .as_str()
                    .ok_or_else(|| invalid(format!("expected a timestamp, got {}", value)))?;
                chrono::DateTime::parse_from_rfc3339(s)
                    .map(|_| ())
                    .map_err(|e| invalid(format!("invalid timestamp: {}", e)))
            }
            FieldKind::Bool => match value {
                serde_json::Value::Bool(_) => Ok(()),
                serde_json::Value::String(s)
                    if matches!(s.to_lowercase().as_str(), "true" | "false") =>
                {
                    Ok(())
                }
                other => Err(invalid(format!("expected a boolean, got {}", other))),
            },
            FieldKind::Select { options } => {
                let s = value
                    .as_str()
                    .ok_or_else(|| invalid(format!("expected an option id, got {}", value)))?;
                if options.iter().any(|o| o.id == s) {
                    Ok(())
                } else {
                    Err(invalid(format!("'{}' is not one of the options", s)))
                }
            }
            FieldKind::Reference { .. } => value
                .as_str()
                .map(|_| ())
                .ok_or_else(|| invalid(format!("expected a record id, got {}", value))),
        }
    }

    /// Persisted shape of this field
    pub fn to_input(&self) -> CreateFieldInput {
        let (options, foreign_table_id) = match &self.kind {
            FieldKind::Select { options } => (
                options
                    .iter()
                    .map(|o| SelectOptionInput {
                        id: Some(o.id.clone()),
                        name: o.name.clone(),
                    })
                    .collect(),
                None,
            ),
            FieldKind::Reference { foreign_table_id } => {
                (Vec::new(), foreign_table_id.as_ref().map(|id| id.to_string()))
            }
            _ => (Vec::new(), None),
        };

        CreateFieldInput {
            id: Some(self.id.to_string()),
            key: Some(self.key.as_str().to_string()),
            name: self.name.as_str().to_string(),
            field_type: self.field_type().as_str().to_string(),
            required: self.constraints.required,
            min: self.constraints.min,
            max: self.constraints.max,
            options,
            foreign_table_id,
        }
    }
}
