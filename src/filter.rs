//! View filters
//!
//! The JSON filter tree stored on a view. A filter is a group (conjunction
//! plus children) or a single condition on a field path:
//!
//! ```json
//! {
//!   "conjunction": "and",
//!   "children": [
//!     { "path": "fldage", "operator": "$gte", "value": 18 },
//!     { "path": "fldname", "operator": "$starts_with", "value": "A" }
//!   ]
//! }
//! ```
//!
//! Conversion to a `RecordSpec` is tolerant: conditions on fields that no
//! longer exist, or whose value does not fit the field, are left out.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::field::{Field, FieldId, FieldKind};
use crate::record::{CompareOp, RecordSpec, TextOp};
use crate::schema::TableSchema;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Conjunction {
    And,
    Or,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FilterOperator {
    #[serde(rename = "$eq")]
    Eq,
    #[serde(rename = "$neq")]
    Neq,
    #[serde(rename = "$gt")]
    Gt,
    #[serde(rename = "$gte")]
    Gte,
    #[serde(rename = "$lt")]
    Lt,
    #[serde(rename = "$lte")]
    Lte,
    #[serde(rename = "$contains")]
    Contains,
    #[serde(rename = "$starts_with")]
    StartsWith,
    #[serde(rename = "$ends_with")]
    EndsWith,
    #[serde(rename = "$in")]
    In,
    #[serde(rename = "$nin")]
    NotIn,
    #[serde(rename = "$is_empty")]
    IsEmpty,
    #[serde(rename = "$is_not_empty")]
    IsNotEmpty,
}

/// Single condition: `path` is a field id
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterCondition {
    pub path: String,
    pub operator: FilterOperator,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub value: Value,
}

impl FilterCondition {
    pub fn new(path: impl Into<String>, operator: FilterOperator, value: Value) -> Self {
        Self {
            path: path.into(),
            operator,
            value,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterGroup {
    pub conjunction: Conjunction,
    #[serde(default)]
    pub children: Vec<Filter>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Filter {
    Group(FilterGroup),
    Condition(FilterCondition),
}

impl Filter {
    fn references(&self, field_id: &FieldId) -> bool {
        match self {
            Filter::Condition(condition) => condition.path == field_id.as_str(),
            Filter::Group(group) => group.children.iter().any(|c| c.references(field_id)),
        }
    }

    fn without_field(&self, field_id: &FieldId) -> Option<Filter> {
        match self {
            Filter::Condition(condition) if condition.path == field_id.as_str() => None,
            Filter::Condition(_) => Some(self.clone()),
            Filter::Group(group) => {
                let children: Vec<Filter> = group
                    .children
                    .iter()
                    .filter_map(|c| c.without_field(field_id))
                    .collect();
                if children.is_empty() {
                    None
                } else {
                    Some(Filter::Group(FilterGroup {
                        conjunction: group.conjunction,
                        children,
                    }))
                }
            }
        }
    }

    fn to_spec(&self, schema: &TableSchema) -> Option<RecordSpec> {
        match self {
            Filter::Condition(condition) => condition_spec(condition, schema),
            Filter::Group(group) => {
                let mut specs = group.children.iter().filter_map(|c| c.to_spec(schema));
                let first = specs.next()?;
                Some(specs.fold(first, |acc, spec| match group.conjunction {
                    Conjunction::And => acc.and(spec),
                    Conjunction::Or => acc.or(spec),
                }))
            }
        }
    }
}

/// Filter attached to a view
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RootFilter(Filter);

impl RootFilter {
    pub fn new(filter: Filter) -> Self {
        Self(filter)
    }

    /// Shorthand for a single condition
    pub fn condition(path: impl Into<String>, operator: FilterOperator, value: Value) -> Self {
        Self(Filter::Condition(FilterCondition::new(path, operator, value)))
    }

    /// Group of conditions joined by `conjunction`
    pub fn group(conjunction: Conjunction, children: Vec<Filter>) -> Self {
        Self(Filter::Group(FilterGroup {
            conjunction,
            children,
        }))
    }

    pub fn filter(&self) -> &Filter {
        &self.0
    }

    /// Record specification for this filter against the current schema.
    ///
    /// Returns `None` when no condition survives conversion.
    pub fn spec(&self, schema: &TableSchema) -> Option<RecordSpec> {
        self.0.to_spec(schema)
    }

    pub fn references(&self, field_id: &FieldId) -> bool {
        self.0.references(field_id)
    }

    /// Filter with every condition on the field removed; `None` when nothing is left
    pub fn without_field(&self, field_id: &FieldId) -> Option<RootFilter> {
        self.0.without_field(field_id).map(RootFilter)
    }
}

fn condition_spec(condition: &FilterCondition, schema: &TableSchema) -> Option<RecordSpec> {
    let Some(field) = schema.get_by_id_str(&condition.path) else {
        debug!(path = %condition.path, "Skipping filter condition on unknown field");
        return None;
    };

    let spec = build_condition(field, condition);
    if spec.is_none() {
        debug!(
            field_id = %field.id(),
            field_type = %field.field_type(),
            operator = ?condition.operator,
            "Skipping filter condition that does not fit the field"
        );
    }
    spec
}

/// Whether the value has the field's value type.
///
/// Bounds, options and formats are not checked: a value outside them still
/// compares (and usually matches nothing).
fn fits(field: &Field, value: &Value) -> bool {
    match field.kind() {
        FieldKind::String
        | FieldKind::Email
        | FieldKind::Select { .. }
        | FieldKind::Reference { .. } => value.is_string(),
        FieldKind::Number => {
            value.is_number() || value.as_str().is_some_and(|s| s.trim().parse::<f64>().is_ok())
        }
        // the value is bound as timestamptz, so it has to parse as one
        FieldKind::Date => value
            .as_str()
            .is_some_and(|s| chrono::DateTime::parse_from_rfc3339(s).is_ok()),
        FieldKind::Bool => {
            value.is_boolean()
                || value
                    .as_str()
                    .is_some_and(|s| matches!(s.to_lowercase().as_str(), "true" | "false"))
        }
    }
}

fn build_condition(field: &Field, condition: &FilterCondition) -> Option<RecordSpec> {
    let id = field.id().clone();
    let value = &condition.value;

    match condition.operator {
        FilterOperator::Eq | FilterOperator::Neq if value.is_null() => Some(RecordSpec::Empty {
            field: id,
            negated: condition.operator == FilterOperator::Neq,
        }),
        FilterOperator::Eq | FilterOperator::Neq => {
            let op = if condition.operator == FilterOperator::Eq {
                CompareOp::Eq
            } else {
                CompareOp::Ne
            };
            fits(field, value).then(|| RecordSpec::compare(id, op, value.clone()))
        }
        FilterOperator::Gt | FilterOperator::Gte | FilterOperator::Lt | FilterOperator::Lte => {
            if !matches!(field.kind(), FieldKind::Number | FieldKind::Date) || !fits(field, value) {
                return None;
            }
            let op = match condition.operator {
                FilterOperator::Gt => CompareOp::Gt,
                FilterOperator::Gte => CompareOp::Gte,
                FilterOperator::Lt => CompareOp::Lt,
                _ => CompareOp::Lte,
            };
            Some(RecordSpec::compare(id, op, value.clone()))
        }
        FilterOperator::Contains | FilterOperator::StartsWith | FilterOperator::EndsWith => {
            if !matches!(field.kind(), FieldKind::String | FieldKind::Email) {
                return None;
            }
            let text = value.as_str().filter(|s| !s.is_empty())?;
            let op = match condition.operator {
                FilterOperator::Contains => TextOp::Contains,
                FilterOperator::StartsWith => TextOp::StartsWith,
                _ => TextOp::EndsWith,
            };
            Some(RecordSpec::Text {
                field: id,
                op,
                value: text.to_string(),
            })
        }
        FilterOperator::In | FilterOperator::NotIn => {
            let values = value.as_array().filter(|v| !v.is_empty())?;
            if !values.iter().all(|v| fits(field, v)) {
                return None;
            }
            Some(RecordSpec::In {
                field: id,
                values: values.clone(),
                negated: condition.operator == FilterOperator::NotIn,
            })
        }
        FilterOperator::IsEmpty | FilterOperator::IsNotEmpty => Some(RecordSpec::Empty {
            field: id,
            negated: condition.operator == FilterOperator::IsNotEmpty,
        }),
    }
}
