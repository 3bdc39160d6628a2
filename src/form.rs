//! Forms
//!
//! A form is a named subset of a table's fields used for record entry. Forms
//! may tighten a field's `required` flag or hide it; they never loosen it.

use std::collections::HashSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{Result, TableError};
use crate::field::{Field, FieldId};
use crate::schema::TableSchema;
use crate::sql::sanitize::generate_id;

const FORM_ID_PREFIX: &str = "frm";
const MAX_FORM_NAME_LENGTH: usize = 100;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FormId(String);

impl FormId {
    pub fn create() -> Self {
        Self(generate_id(FORM_ID_PREFIX))
    }

    pub fn from_string(value: impl Into<String>) -> Result<Self> {
        let value = value.into();
        if value.trim().is_empty() {
            return Err(TableError::invalid_form("form id cannot be empty"));
        }
        Ok(Self(value))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for FormId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Persisted / incoming shape of a form field
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FormFieldInput {
    #[serde(rename = "fieldId")]
    pub field_id: String,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub hidden: bool,
}

/// Persisted / incoming shape of a form.
///
/// `fields: None` puts every schema field on the form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FormInput {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fields: Option<Vec<FormFieldInput>>,
}

impl FormInput {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: None,
            name: name.into(),
            fields: None,
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_field(mut self, field_id: impl Into<String>, required: bool) -> Self {
        self.fields.get_or_insert_with(Vec::new).push(FormFieldInput {
            field_id: field_id.into(),
            required,
            hidden: false,
        });
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FormField {
    pub field_id: FieldId,
    pub required: bool,
    pub hidden: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Form {
    id: FormId,
    name: String,
    fields: Vec<FormField>,
}

impl Form {
    /// Build a form against the schema it will collect values for
    pub fn from(input: &FormInput, schema: &TableSchema) -> Result<Self> {
        let id = match &input.id {
            Some(id) => FormId::from_string(id.clone())?,
            None => FormId::create(),
        };

        let name = input.name.trim();
        if name.is_empty() {
            return Err(TableError::invalid_form("form name cannot be empty"));
        }
        if name.chars().count() > MAX_FORM_NAME_LENGTH {
            return Err(TableError::invalid_form(format!(
                "form name cannot be longer than {} characters",
                MAX_FORM_NAME_LENGTH
            )));
        }

        let fields = match &input.fields {
            None => schema
                .fields()
                .iter()
                .map(|field| FormField {
                    field_id: field.id().clone(),
                    required: field.constraints().required,
                    hidden: false,
                })
                .collect(),
            Some(inputs) => {
                let mut seen = HashSet::new();
                let mut fields = Vec::with_capacity(inputs.len());
                for input in inputs {
                    let field = schema.get_by_id_str(&input.field_id).ok_or_else(|| {
                        TableError::invalid_form(format!(
                            "form '{}' references unknown field '{}'",
                            name, input.field_id
                        ))
                    })?;
                    if !seen.insert(field.id().clone()) {
                        return Err(TableError::invalid_form(format!(
                            "field '{}' appears twice on form '{}'",
                            input.field_id, name
                        )));
                    }
                    if input.hidden && (input.required || field.constraints().required) {
                        return Err(TableError::invalid_form(format!(
                            "required field '{}' cannot be hidden",
                            input.field_id
                        )));
                    }
                    fields.push(FormField {
                        field_id: field.id().clone(),
                        required: input.required,
                        hidden: input.hidden,
                    });
                }
                fields
            }
        };

        Ok(Self {
            id,
            name: name.to_string(),
            fields,
        })
    }

    pub fn id(&self) -> &FormId {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn fields(&self) -> &[FormField] {
        &self.fields
    }

    pub fn get_field(&self, id: &FieldId) -> Option<&FormField> {
        self.fields.iter().find(|f| &f.field_id == id)
    }

    /// Whether values for the field may be submitted through this form
    pub fn accepts(&self, id: &FieldId) -> bool {
        self.get_field(id).is_some_and(|f| !f.hidden)
    }

    /// New version of the form without the field, or `None` when the form
    /// does not reference it
    pub fn remove_field(&self, field: &Field) -> Option<Form> {
        self.get_field(field.id())?;
        Some(Form {
            id: self.id.clone(),
            name: self.name.clone(),
            fields: self
                .fields
                .iter()
                .filter(|f| &f.field_id != field.id())
                .cloned()
                .collect(),
        })
    }

    pub fn to_input(&self) -> FormInput {
        FormInput {
            id: Some(self.id.to_string()),
            name: self.name.clone(),
            fields: Some(
                self.fields
                    .iter()
                    .map(|f| FormFieldInput {
                        field_id: f.field_id.to_string(),
                        required: f.required,
                        hidden: f.hidden,
                    })
                    .collect(),
            ),
        }
    }
}

/// Forms of a table, in creation order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Forms {
    forms: Vec<Form>,
}

impl Forms {
    pub fn new(forms: Vec<Form>) -> Result<Self> {
        let mut ids = HashSet::new();
        for form in &forms {
            if !ids.insert(form.id().as_str()) {
                return Err(TableError::invalid_form(format!(
                    "duplicate form id '{}'",
                    form.id()
                )));
            }
        }
        Ok(Self { forms })
    }

    pub fn iter(&self) -> impl Iterator<Item = &Form> {
        self.forms.iter()
    }

    pub fn len(&self) -> usize {
        self.forms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.forms.is_empty()
    }

    pub fn get_by_id(&self, id: &str) -> Option<&Form> {
        self.forms.iter().find(|f| f.id().as_str() == id)
    }

    /// Drop the field from every form referencing it; returns the changed form ids
    pub fn remove_field(&mut self, field: &Field) -> Vec<FormId> {
        let mut changed = Vec::new();
        for form in &mut self.forms {
            if let Some(updated) = form.remove_field(field) {
                changed.push(updated.id().clone());
                *form = updated;
            }
        }
        changed
    }

    pub fn to_inputs(&self) -> Vec<FormInput> {
        self.forms.iter().map(Form::to_input).collect()
    }
}

/// Forms attribute of a table
#[derive(Debug, Clone, PartialEq)]
pub struct WithTableForms(Forms);

impl WithTableForms {
    pub fn from(inputs: &[FormInput], schema: &TableSchema) -> Result<Self> {
        let forms = inputs
            .iter()
            .map(|input| Form::from(input, schema))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self(Forms::new(forms)?))
    }

    pub fn forms(&self) -> &Forms {
        &self.0
    }
}
