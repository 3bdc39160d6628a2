//! DDL generation for underlying tables
//!
//! Generates PostgreSQL DDL for the physical table backing each table
//! aggregate. Every statement quotes its identifiers.

use crate::config::EngineConfig;
use crate::sql::sanitize::quote_identifier;
use crate::types::{ColumnDefinition, ColumnType};

/// DDL generator for underlying tables
pub struct DdlGenerator<'a> {
    config: &'a EngineConfig,
}

impl<'a> DdlGenerator<'a> {
    pub fn new(config: &'a EngineConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &EngineConfig {
        self.config
    }

    /// Generate CREATE TABLE with the enabled auto-managed columns followed
    /// by the field columns
    pub fn generate_create_table(&self, table_name: &str, columns: &[ColumnDefinition]) -> String {
        let quoted_table = quote_identifier(table_name);
        let auto = &self.config.auto_columns;

        let mut column_defs = Vec::new();
        if auto.id {
            column_defs
                .push("id VARCHAR(255) PRIMARY KEY DEFAULT gen_random_uuid()::text".to_string());
        }
        if auto.created_at {
            column_defs.push("created_at TIMESTAMPTZ DEFAULT NOW()".to_string());
        }
        if auto.updated_at {
            column_defs.push("updated_at TIMESTAMPTZ DEFAULT NOW()".to_string());
        }
        for col in columns {
            column_defs.push(Self::format_column_definition(col));
        }

        format!("CREATE TABLE {} ({})", quoted_table, column_defs.join(", "))
    }

    pub fn generate_add_column(&self, table_name: &str, column: &ColumnDefinition) -> String {
        format!(
            "ALTER TABLE {} ADD COLUMN {}",
            quote_identifier(table_name),
            Self::format_column_definition(column)
        )
    }

    pub fn generate_drop_column(&self, table_name: &str, column_name: &str) -> String {
        format!(
            "ALTER TABLE {} DROP COLUMN IF EXISTS {}",
            quote_identifier(table_name),
            quote_identifier(column_name)
        )
    }

    /// Generate the ALTER COLUMN statements turning `old` into `new`.
    ///
    /// Type changes convert existing values with a `USING` cast; an empty
    /// result means the column already matches.
    pub fn generate_alter_column(
        &self,
        table_name: &str,
        old: &ColumnDefinition,
        new: &ColumnDefinition,
    ) -> Vec<String> {
        let quoted_table = quote_identifier(table_name);
        let quoted_column = quote_identifier(&new.name);
        let mut statements = Vec::new();

        let type_changed = old.column_type != new.column_type;

        // the old default may not cast to the new type
        if type_changed && old.default_value.is_some() {
            statements.push(format!(
                "ALTER TABLE {} ALTER COLUMN {} DROP DEFAULT",
                quoted_table, quoted_column
            ));
        }

        if type_changed {
            statements.push(format!(
                "ALTER TABLE {} ALTER COLUMN {} TYPE {} USING {}",
                quoted_table,
                quoted_column,
                new.column_type.to_sql_type(),
                Self::conversion_expression(&quoted_column, old.column_type, new.column_type)
            ));
        }

        let default_dropped = type_changed && old.default_value.is_some();
        if old.default_value != new.default_value || default_dropped {
            match &new.default_value {
                Some(default) => statements.push(format!(
                    "ALTER TABLE {} ALTER COLUMN {} SET DEFAULT {}",
                    quoted_table, quoted_column, default
                )),
                None if !default_dropped => statements.push(format!(
                    "ALTER TABLE {} ALTER COLUMN {} DROP DEFAULT",
                    quoted_table, quoted_column
                )),
                None => {}
            }
        }

        if old.nullable != new.nullable {
            if new.nullable {
                statements.push(format!(
                    "ALTER TABLE {} ALTER COLUMN {} DROP NOT NULL",
                    quoted_table, quoted_column
                ));
            } else {
                // existing NULLs would reject SET NOT NULL
                if let Some(default) = &new.default_value {
                    statements.push(format!(
                        "UPDATE {} SET {} = {} WHERE {} IS NULL",
                        quoted_table, quoted_column, default, quoted_column
                    ));
                }
                statements.push(format!(
                    "ALTER TABLE {} ALTER COLUMN {} SET NOT NULL",
                    quoted_table, quoted_column
                ));
            }
        }

        statements
    }

    /// `USING` expression converting a column's values between storage types.
    ///
    /// PostgreSQL has no direct cast between numeric, timestamptz and
    /// boolean, so those pairs are mapped explicitly: timestamps and numbers
    /// convert through epoch seconds, booleans become 1/0 and numbers are
    /// true when non-zero. Pairs with no meaningful mapping yield NULL.
    /// Empty strings in text columns convert to NULL.
    pub fn conversion_expression(column: &str, from: ColumnType, to: ColumnType) -> String {
        use ColumnType::*;

        match (from, to) {
            (_, VarChar | Text) => format!("{}::text", column),
            (VarChar | Text, _) => format!("NULLIF({}, '')::{}", column, to.sql_cast()),
            (Boolean, Numeric) => format!("CASE WHEN {} THEN 1 ELSE 0 END", column),
            (Numeric, Boolean) => format!("{} <> 0", column),
            (Timestamp, Numeric) => format!("EXTRACT(EPOCH FROM {})::numeric", column),
            (Numeric, Timestamp) => format!("to_timestamp({}::double precision)", column),
            (Boolean, Timestamp) | (Timestamp, Boolean) => format!("NULL::{}", to.sql_cast()),
            (Numeric, Numeric) | (Timestamp, Timestamp) | (Boolean, Boolean) => column.to_string(),
        }
    }

    pub fn generate_drop_table(&self, table_name: &str) -> String {
        format!("DROP TABLE IF EXISTS {} CASCADE", quote_identifier(table_name))
    }

    /// Format a single column definition for CREATE TABLE or ADD COLUMN
    pub fn format_column_definition(col: &ColumnDefinition) -> String {
        let mut parts = vec![quote_identifier(&col.name), col.column_type.to_sql_type()];

        if !col.nullable {
            parts.push("NOT NULL".to_string());
        }

        if let Some(default) = &col.default_value {
            parts.push(format!("DEFAULT {}", default));
        }

        parts.join(" ")
    }
}
