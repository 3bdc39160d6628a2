//! Condition building for SQL WHERE clauses
//!
//! Converts a `RecordSpec` into a parameterized WHERE clause over the
//! underlying table. Parameters are bound as text and cast to the column's
//! storage type in SQL.

use serde_json::Value;

use crate::record::{CompareOp, RecordSpec, TextOp};
use crate::schema::TableSchema;
use crate::sql::sanitize::{escape_like, quote_identifier};
use crate::types::ColumnType;

/// Build a SQL WHERE clause from a record specification
///
/// Returns `(clause, params)` where `clause` uses `$n` placeholders starting
/// at `param_offset` (advanced past the last one used) and `params` holds
/// the values to bind, in order.
///
/// Semantics match `RecordSpec::is_satisfied_by`: text matching is
/// case-insensitive, and `!=` / NOT IN also match NULL values.
pub fn build_record_clause(
    spec: &RecordSpec,
    schema: &TableSchema,
    param_offset: &mut i32,
) -> Result<(String, Vec<Value>), String> {
    let mut params = Vec::new();

    match spec {
        RecordSpec::And(left, right) | RecordSpec::Or(left, right) => {
            let (left_clause, left_params) = build_record_clause(left, schema, param_offset)?;
            let (right_clause, right_params) = build_record_clause(right, schema, param_offset)?;
            params.extend(left_params);
            params.extend(right_params);

            let joiner = if matches!(spec, RecordSpec::And(..)) {
                "AND"
            } else {
                "OR"
            };
            Ok((
                format!("({}) {} ({})", left_clause, joiner, right_clause),
                params,
            ))
        }
        RecordSpec::Not(inner) => {
            let (clause, inner_params) = build_record_clause(inner, schema, param_offset)?;
            params.extend(inner_params);
            // a comparison against NULL is unknown; NOT of it has to match
            Ok((format!("NOT COALESCE(({}), FALSE)", clause), params))
        }
        RecordSpec::Compare { field, op, value } => {
            let (column, column_type) = resolve_column(schema, field.as_str())?;

            if value.is_null() {
                let clause = match op {
                    CompareOp::Eq => format!("{} IS NULL", column),
                    CompareOp::Ne => format!("{} IS NOT NULL", column),
                    other => {
                        return Err(format!("{:?} comparison with NULL is not supported", other));
                    }
                };
                return Ok((clause, params));
            }

            let operator = match op {
                CompareOp::Eq => "=",
                CompareOp::Ne => "!=",
                CompareOp::Gt => ">",
                CompareOp::Gte => ">=",
                CompareOp::Lt => "<",
                CompareOp::Lte => "<=",
            };

            params.push(Value::String(json_value_to_string(value)));
            let placeholder = format!("${}::{}", param_offset, column_type.sql_cast());
            *param_offset += 1;

            let clause = if *op == CompareOp::Ne {
                format!("({} IS NULL OR {} != {})", column, column, placeholder)
            } else {
                format!("{} {} {}", column, operator, placeholder)
            };
            Ok((clause, params))
        }
        RecordSpec::Text { field, op, value } => {
            let (column, _) = resolve_column(schema, field.as_str())?;

            let escaped = escape_like(value);
            let pattern = match op {
                TextOp::Contains => format!("%{}%", escaped),
                TextOp::StartsWith => format!("{}%", escaped),
                TextOp::EndsWith => format!("%{}", escaped),
            };
            params.push(Value::String(pattern));

            let clause = format!("{}::text ILIKE ${}::text", column, param_offset);
            *param_offset += 1;
            Ok((clause, params))
        }
        RecordSpec::In {
            field,
            values,
            negated,
        } => {
            let (column, column_type) = resolve_column(schema, field.as_str())?;
            if values.is_empty() {
                return Err("IN requires at least one value".to_string());
            }

            let as_text: Vec<Value> = values
                .iter()
                .map(|v| Value::String(json_value_to_string(v)))
                .collect();
            params.push(Value::Array(as_text));

            let membership = format!(
                "{} = ANY(SELECT jsonb_array_elements_text(${}::jsonb)::{})",
                column,
                param_offset,
                column_type.sql_cast()
            );
            *param_offset += 1;

            let clause = if *negated {
                format!("({} IS NULL OR NOT ({}))", column, membership)
            } else {
                membership
            };
            Ok((clause, params))
        }
        RecordSpec::Empty { field, negated } => {
            let (column, _) = resolve_column(schema, field.as_str())?;
            let clause = if *negated {
                format!("({} IS NOT NULL AND {}::text != '')", column, column)
            } else {
                format!("({} IS NULL OR {}::text = '')", column, column)
            };
            Ok((clause, params))
        }
    }
}

/// Quoted column and storage type of a field
fn resolve_column(schema: &TableSchema, field_id: &str) -> Result<(String, ColumnType), String> {
    let field = schema
        .get_by_id_str(field_id)
        .ok_or_else(|| format!("Unknown field '{}' in condition", field_id))?;
    let column = field.column_definition();
    Ok((quote_identifier(&column.name), column.column_type))
}

/// Text form of a value for binding
fn json_value_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => "null".to_string(),
        other => other.to_string(),
    }
}
