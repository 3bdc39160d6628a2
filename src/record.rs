//! Records and record specifications
//!
//! Record values are keyed by field id. A `RecordSpec` is the typed query
//! produced from a view filter; it can be evaluated in memory or turned
//! into a WHERE clause by `sql::condition`.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::field::FieldId;
use crate::spec::Specification;

/// Record values keyed by field id
pub type RecordValues = serde_json::Map<String, Value>;

/// A row of an underlying table
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Record {
    /// Unique identifier (UUID)
    pub id: String,
    #[serde(rename = "createdAt")]
    pub created_at: String,
    #[serde(rename = "updatedAt")]
    pub updated_at: String,
    #[serde(rename = "tableId")]
    pub table_id: String,
    /// Field values keyed by field id
    pub values: RecordValues,
}

impl Record {
    /// Create a record with a fresh id and timestamps
    pub fn new(table_id: impl Into<String>, values: RecordValues) -> Self {
        let now = chrono::Utc::now().to_rfc3339();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            created_at: now.clone(),
            updated_at: now,
            table_id: table_id.into(),
            values,
        }
    }

    pub fn get(&self, field_id: &FieldId) -> Option<&Value> {
        self.values.get(field_id.as_str())
    }
}

// ============================================================================
// Record Specifications
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    Ne,
    Gt,
    Gte,
    Lt,
    Lte,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextOp {
    Contains,
    StartsWith,
    EndsWith,
}

/// Typed record query over field values
#[derive(Debug, Clone, PartialEq)]
pub enum RecordSpec {
    Compare {
        field: FieldId,
        op: CompareOp,
        value: Value,
    },
    /// Case-insensitive text match
    Text {
        field: FieldId,
        op: TextOp,
        value: String,
    },
    In {
        field: FieldId,
        values: Vec<Value>,
        negated: bool,
    },
    /// NULL or empty string; `negated` matches everything else
    Empty { field: FieldId, negated: bool },
    And(Box<RecordSpec>, Box<RecordSpec>),
    Or(Box<RecordSpec>, Box<RecordSpec>),
    Not(Box<RecordSpec>),
}

impl RecordSpec {
    pub fn compare(field: FieldId, op: CompareOp, value: Value) -> Self {
        RecordSpec::Compare { field, op, value }
    }

    pub fn and(self, other: RecordSpec) -> Self {
        RecordSpec::And(Box::new(self), Box::new(other))
    }

    pub fn or(self, other: RecordSpec) -> Self {
        RecordSpec::Or(Box::new(self), Box::new(other))
    }

    #[allow(clippy::should_implement_trait)]
    pub fn not(self) -> Self {
        RecordSpec::Not(Box::new(self))
    }

    /// Field ids the specification reads, in traversal order
    pub fn fields(&self) -> Vec<&FieldId> {
        let mut out = Vec::new();
        self.collect_fields(&mut out);
        out
    }

    fn collect_fields<'a>(&'a self, out: &mut Vec<&'a FieldId>) {
        match self {
            RecordSpec::Compare { field, .. }
            | RecordSpec::Text { field, .. }
            | RecordSpec::In { field, .. }
            | RecordSpec::Empty { field, .. } => out.push(field),
            RecordSpec::And(left, right) | RecordSpec::Or(left, right) => {
                left.collect_fields(out);
                right.collect_fields(out);
            }
            RecordSpec::Not(inner) => inner.collect_fields(out),
        }
    }
}

fn is_blank(value: &Value) -> bool {
    value.is_null() || value.as_str().is_some_and(str::is_empty)
}

fn as_number(value: &Value) -> Option<f64> {
    value
        .as_f64()
        .or_else(|| value.as_str().and_then(|s| s.parse::<f64>().ok()))
}

fn as_bool(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(b) => Some(*b),
        Value::String(s) => match s.to_lowercase().as_str() {
            "true" => Some(true),
            "false" => Some(false),
            _ => None,
        },
        _ => None,
    }
}

/// Order two values the way the underlying column would
fn compare_values(left: &Value, right: &Value) -> Option<Ordering> {
    if left.is_null() || right.is_null() {
        return None;
    }
    if left.is_number() || right.is_number() {
        return as_number(left)?.partial_cmp(&as_number(right)?);
    }
    if left.is_boolean() || right.is_boolean() {
        return Some(as_bool(left)?.cmp(&as_bool(right)?));
    }
    let (l, r) = (left.as_str()?, right.as_str()?);
    match (
        chrono::DateTime::parse_from_rfc3339(l),
        chrono::DateTime::parse_from_rfc3339(r),
    ) {
        (Ok(l), Ok(r)) => Some(l.cmp(&r)),
        _ => Some(l.cmp(r)),
    }
}

impl Specification<RecordValues> for RecordSpec {
    fn is_satisfied_by(&self, values: &RecordValues) -> bool {
        let null = Value::Null;
        let get = |field: &FieldId| values.get(field.as_str()).unwrap_or(&null);

        match self {
            RecordSpec::Compare { field, op, value } => {
                let actual = get(field);
                let ordering = compare_values(actual, value);
                match op {
                    CompareOp::Eq if value.is_null() => is_blank(actual),
                    CompareOp::Ne if value.is_null() => !is_blank(actual),
                    CompareOp::Eq => ordering == Some(Ordering::Equal),
                    // NULL counts as different from any value
                    CompareOp::Ne => ordering != Some(Ordering::Equal),
                    CompareOp::Gt => ordering == Some(Ordering::Greater),
                    CompareOp::Gte => matches!(ordering, Some(Ordering::Greater | Ordering::Equal)),
                    CompareOp::Lt => ordering == Some(Ordering::Less),
                    CompareOp::Lte => matches!(ordering, Some(Ordering::Less | Ordering::Equal)),
                }
            }
            RecordSpec::Text { field, op, value } => {
                let Some(actual) = get(field).as_str() else {
                    return false;
                };
                let actual = actual.to_lowercase();
                let needle = value.to_lowercase();
                match op {
                    TextOp::Contains => actual.contains(&needle),
                    TextOp::StartsWith => actual.starts_with(&needle),
                    TextOp::EndsWith => actual.ends_with(&needle),
                }
            }
            RecordSpec::In {
                field,
                values: candidates,
                negated,
            } => {
                let actual = get(field);
                let found = candidates
                    .iter()
                    .any(|c| compare_values(actual, c) == Some(Ordering::Equal));
                found != *negated
            }
            RecordSpec::Empty { field, negated } => is_blank(get(field)) != *negated,
            RecordSpec::And(left, right) => {
                left.is_satisfied_by(values) && right.is_satisfied_by(values)
            }
            RecordSpec::Or(left, right) => {
                left.is_satisfied_by(values) || right.is_satisfied_by(values)
            }
            RecordSpec::Not(inner) => !inner.is_satisfied_by(values),
        }
    }
}
