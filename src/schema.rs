//! Table schema
//!
//! An ordered collection of fields, unique by id and by key. Schemas are
//! never edited in place: every change produces a new schema value, and the
//! table only swaps it in through a schema-modification specification.

use std::collections::HashSet;

use crate::error::{Result, TableError};
use crate::field::{CreateFieldInput, Field, FieldId};
use crate::form::Form;
use crate::record::RecordValues;
use crate::types::ColumnDefinition;

/// Ordered, unique-by-id collection of fields owned by a table
#[derive(Debug, Clone, PartialEq)]
pub struct TableSchema {
    fields: Vec<Field>,
}

impl TableSchema {
    /// Create a schema, checking id and key uniqueness
    pub fn new(fields: Vec<Field>) -> Result<Self> {
        if fields.is_empty() {
            return Err(TableError::invalid_schema(
                "table schema must contain at least one field",
            ));
        }

        let mut ids = HashSet::new();
        let mut keys = HashSet::new();
        for field in &fields {
            if !ids.insert(field.id().as_str()) {
                return Err(TableError::invalid_schema(format!(
                    "duplicate field id '{}'",
                    field.id()
                )));
            }
            if !keys.insert(field.key().as_str()) {
                return Err(TableError::invalid_schema(format!(
                    "duplicate field key '{}'",
                    field.key().as_str()
                )));
            }
        }

        Ok(Self { fields })
    }

    /// Build every field from its input, then the schema
    pub fn from_inputs(inputs: &[CreateFieldInput]) -> Result<Self> {
        let fields = inputs
            .iter()
            .map(Field::create)
            .collect::<Result<Vec<_>>>()?;
        Self::new(fields)
    }

    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn get_by_id(&self, id: &FieldId) -> Option<&Field> {
        self.fields.iter().find(|f| f.id() == id)
    }

    /// Look a field up by its id as a plain string
    pub fn get_by_id_str(&self, id: &str) -> Option<&Field> {
        self.fields.iter().find(|f| f.id().as_str() == id)
    }

    pub fn contains(&self, id: &FieldId) -> bool {
        self.get_by_id(id).is_some()
    }

    pub fn field_ids(&self) -> impl Iterator<Item = &FieldId> {
        self.fields.iter().map(Field::id)
    }

    /// Column definitions of all fields, in schema order
    pub fn column_definitions(&self) -> Vec<ColumnDefinition> {
        self.fields.iter().map(Field::column_definition).collect()
    }

    /// New schema with `field` appended
    pub fn with_new_field(&self, field: Field) -> Result<Self> {
        let mut fields = self.fields.clone();
        fields.push(field);
        Self::new(fields)
    }

    /// New schema without the field, plus the removed field
    pub fn without_field(&self, id: &FieldId) -> Result<(Self, Field)> {
        let position = self
            .fields
            .iter()
            .position(|f| f.id() == id)
            .ok_or_else(|| TableError::FieldNotFound(id.to_string()))?;

        let mut fields = self.fields.clone();
        let removed = fields.remove(position);
        let schema = Self::new(fields).map_err(|_| {
            TableError::invalid_schema("cannot remove the last field of a table")
        })?;
        Ok((schema, removed))
    }

    /// New schema with the field of the same id replaced, plus the previous version
    pub fn with_updated_field(&self, field: Field) -> Result<(Self, Field)> {
        let position = self
            .fields
            .iter()
            .position(|f| f == &field)
            .ok_or_else(|| TableError::FieldNotFound(field.id().to_string()))?;

        let mut fields = self.fields.clone();
        let previous = std::mem::replace(&mut fields[position], field);
        Ok((Self::new(fields)?, previous))
    }

    /// Validate record values keyed by field id.
    ///
    /// With a form, only the form's visible fields may be written, and the
    /// form's `required` flags apply on top of the fields' own constraints.
    pub fn validate_values(&self, values: &RecordValues, form: Option<&Form>) -> Result<()> {
        for key in values.keys() {
            let field = self.get_by_id_str(key).ok_or_else(|| {
                TableError::invalid_record(format!("unknown field '{}'", key))
            })?;
            if let Some(form) = form {
                if !form.accepts(field.id()) {
                    return Err(TableError::invalid_record(format!(
                        "field '{}' is not part of form '{}'",
                        field.name().as_str(),
                        form.name()
                    )));
                }
            }
        }

        let null = serde_json::Value::Null;
        for field in &self.fields {
            let required = match form {
                Some(form) => match form.get_field(field.id()) {
                    Some(form_field) if !form_field.hidden => {
                        form_field.required || field.constraints().required
                    }
                    _ => continue,
                },
                None => field.constraints().required,
            };
            let value = values.get(field.id().as_str()).unwrap_or(&null);
            field.validate_value(value, required)?;
        }

        Ok(())
    }

    /// Persisted shape of the schema
    pub fn to_inputs(&self) -> Vec<CreateFieldInput> {
        self.fields.iter().map(Field::to_input).collect()
    }
}
