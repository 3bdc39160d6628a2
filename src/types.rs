//! Physical column types for underlying tables
//!
//! Fields map onto these types through `Field::column_definition`; the DDL
//! generator and the condition builder only ever see a `ColumnDefinition`.

use serde::{Deserialize, Serialize};

// ============================================================================
// Column Types
// ============================================================================

/// Storage type of an underlying-table column
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ColumnType {
    /// Bounded text (maps to VARCHAR(255))
    VarChar,

    /// Unbounded text used for coded values such as option or record ids (maps to TEXT)
    Text,

    /// Arbitrary precision number (maps to NUMERIC)
    Numeric,

    /// Timestamp, always stored in UTC (maps to TIMESTAMPTZ)
    Timestamp,

    /// Boolean (maps to BOOLEAN)
    Boolean,
}

/// Length of `VARCHAR` columns
pub const VARCHAR_LENGTH: u16 = 255;

impl ColumnType {
    /// Convert column type to PostgreSQL type string
    pub fn to_sql_type(&self) -> String {
        match self {
            ColumnType::VarChar => format!("VARCHAR({})", VARCHAR_LENGTH),
            ColumnType::Text => "TEXT".to_string(),
            ColumnType::Numeric => "NUMERIC".to_string(),
            ColumnType::Timestamp => "TIMESTAMPTZ".to_string(),
            ColumnType::Boolean => "BOOLEAN".to_string(),
        }
    }

    /// Cast suffix used when binding text parameters against this column
    pub fn sql_cast(&self) -> &'static str {
        match self {
            ColumnType::VarChar | ColumnType::Text => "text",
            ColumnType::Numeric => "numeric",
            ColumnType::Timestamp => "timestamptz",
            ColumnType::Boolean => "boolean",
        }
    }
}

fn default_nullable() -> bool {
    true
}

/// Column definition of an underlying table
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ColumnDefinition {
    /// Column name (the owning field's id)
    pub name: String,

    /// Storage type
    #[serde(rename = "type")]
    pub column_type: ColumnType,

    /// Whether the column allows NULL values (default: true)
    #[serde(default = "default_nullable")]
    pub nullable: bool,

    /// Default value (SQL expression, e.g. "FALSE")
    #[serde(skip_serializing_if = "Option::is_none")]
    #[serde(rename = "default")]
    pub default_value: Option<String>,
}

impl ColumnDefinition {
    /// Create a new nullable column definition with a name and type
    pub fn new(name: impl Into<String>, column_type: ColumnType) -> Self {
        Self {
            name: name.into(),
            column_type,
            nullable: true,
            default_value: None,
        }
    }

    /// Set the column as non-nullable
    pub fn not_null(mut self) -> Self {
        self.nullable = false;
        self
    }

    /// Set a default value
    pub fn default(mut self, value: impl Into<String>) -> Self {
        self.default_value = Some(value.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_column_type_sql() {
        assert_eq!(ColumnType::VarChar.to_sql_type(), "VARCHAR(255)");
        assert_eq!(ColumnType::Text.to_sql_type(), "TEXT");
        assert_eq!(ColumnType::Numeric.to_sql_type(), "NUMERIC");
        assert_eq!(ColumnType::Timestamp.to_sql_type(), "TIMESTAMPTZ");
        assert_eq!(ColumnType::Boolean.to_sql_type(), "BOOLEAN");
    }

    #[test]
    fn test_column_type_casts() {
        assert_eq!(ColumnType::VarChar.sql_cast(), "text");
        assert_eq!(ColumnType::Numeric.sql_cast(), "numeric");
        assert_eq!(ColumnType::Timestamp.sql_cast(), "timestamptz");
    }

    #[test]
    fn test_column_definition_builders() {
        let col = ColumnDefinition::new("fldactive", ColumnType::Boolean)
            .not_null()
            .default("FALSE");

        assert_eq!(col.name, "fldactive");
        assert!(!col.nullable);
        assert_eq!(col.default_value, Some("FALSE".to_string()));
    }

    #[test]
    fn test_column_definition_deserialization_defaults() {
        let col: ColumnDefinition =
            serde_json::from_str(r#"{"name":"fldname","type":"varchar"}"#).unwrap();

        assert_eq!(col.column_type, ColumnType::VarChar);
        assert!(col.nullable);
        assert!(col.default_value.is_none());
    }
}
