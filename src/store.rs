//! TableStore - PostgreSQL persistence for tables and their records
//!
//! Table definitions live in a metadata table (default: `__table`); each
//! table's records live in its underlying table, named after the table id.
//! Every schema change runs the DDL and the metadata write in one
//! transaction.

use sqlx::{PgPool, Postgres, Row, Transaction};
use tracing::{info, instrument};

use crate::config::EngineConfig;
use crate::error::{Result, TableError};
use crate::field::{CreateFieldInput, Field, FieldId, FieldKind};
use crate::filter::RootFilter;
use crate::record::{Record, RecordValues};
use crate::spec::{
    TableSpec, WithNewField, WithUpdatedField, WithViewFilter, WithoutField, new_table_spec,
};
use crate::sql::condition::build_record_clause;
use crate::sql::ddl::DdlGenerator;
use crate::sql::sanitize::quote_identifier;
use crate::sql::visitor::{UnderlyingTable, UnderlyingTableVisitor};
use crate::table::{CreateTableInput, Table, TableEvent};
use crate::types::{ColumnDefinition, ColumnType};
use crate::view::ViewId;

/// Table definitions and records in a single PostgreSQL database
pub struct TableStore {
    pool: PgPool,
    config: EngineConfig,
}

impl TableStore {
    /// Connect and make sure the metadata table exists
    pub async fn new(config: EngineConfig) -> Result<Self> {
        let pool = PgPool::connect(&config.database_url)
            .await
            .map_err(|e| TableError::Connection(format!("Database connection failed: {}", e)))?;

        let store = Self { pool, config };
        store.ensure_metadata_table().await?;

        Ok(store)
    }

    /// Use an existing pool
    pub async fn from_pool(pool: PgPool, config: EngineConfig) -> Result<Self> {
        let store = Self { pool, config };
        store.ensure_metadata_table().await?;
        Ok(store)
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    async fn ensure_metadata_table(&self) -> Result<()> {
        let create_sql = format!(
            r#"
            CREATE TABLE IF NOT EXISTS {} (
                id VARCHAR(255) PRIMARY KEY,
                name VARCHAR(255) NOT NULL,
                emoji VARCHAR(32) NOT NULL,
                schema JSONB NOT NULL,
                views JSONB NOT NULL,
                forms JSONB NOT NULL,
                created_at TIMESTAMPTZ DEFAULT NOW(),
                updated_at TIMESTAMPTZ DEFAULT NOW()
            )
            "#,
            quote_identifier(&self.config.metadata_table)
        );

        sqlx::query(&create_sql).execute(&self.pool).await?;

        Ok(())
    }

    // =========================================================================
    // Table Operations
    // =========================================================================

    /// Create a table and its underlying table.
    ///
    /// The input is validated as a whole before anything is written.
    #[instrument(skip(self, input), fields(table_name = %input.name))]
    pub async fn create_table(&self, input: CreateTableInput) -> Result<Table> {
        let spec = new_table_spec(&input)?;
        let table = Table::from_spec(&spec)?;
        let table_id = table.id().as_str();

        if self.table_exists(table_id).await? {
            return Err(TableError::conflict(format!(
                "Table '{}' already exists",
                table_id
            )));
        }
        // never take over a table the store does not own
        if self.underlying_columns(table_id).await?.is_some() {
            return Err(TableError::conflict(format!(
                "A database table named '{}' already exists",
                table_id
            )));
        }
        for field in table.schema().fields() {
            if let FieldKind::Reference {
                foreign_table_id: Some(foreign),
            } = field.kind()
            {
                self.check_foreign_table(table_id, foreign.as_str()).await?;
            }
        }

        let mut visitor = UnderlyingTableVisitor::new(
            DdlGenerator::new(&self.config),
            UnderlyingTable::missing(table_id),
        );
        visitor.visit(&spec)?;

        let definition = table.to_input();
        let insert_sql = format!(
            "INSERT INTO {} (id, name, emoji, schema, views, forms) VALUES ($1, $2, $3, $4, $5, $6)",
            quote_identifier(&self.config.metadata_table)
        );

        let mut tx = self.pool.begin().await?;
        visitor.commit(&mut tx).await?;
        sqlx::query(&insert_sql)
            .bind(table_id)
            .bind(table.name().as_str())
            .bind(table.emoji().as_str())
            .bind(serde_json::to_value(&definition.schema)?)
            .bind(serde_json::to_value(&definition.views)?)
            .bind(serde_json::to_value(&definition.forms)?)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        info!(table_id = %table_id, fields = table.schema().len(), "Created table");
        Ok(table)
    }

    /// Load a table, re-validating its stored definition
    pub async fn get_table(&self, table_id: &str) -> Result<Option<Table>> {
        let select_sql = format!(
            "SELECT id, name, emoji, schema, views, forms FROM {} WHERE id = $1",
            quote_identifier(&self.config.metadata_table)
        );

        let row = sqlx::query(&select_sql)
            .bind(table_id)
            .fetch_optional(&self.pool)
            .await?;

        row.map(|r| Self::row_to_table(&r)).transpose()
    }

    pub async fn list_tables(&self) -> Result<Vec<Table>> {
        let select_sql = format!(
            "SELECT id, name, emoji, schema, views, forms FROM {} ORDER BY created_at",
            quote_identifier(&self.config.metadata_table)
        );

        let rows = sqlx::query(&select_sql).fetch_all(&self.pool).await?;
        rows.iter().map(Self::row_to_table).collect()
    }

    /// Drop a table together with its records
    #[instrument(skip(self))]
    pub async fn delete_table(&self, table_id: &str) -> Result<()> {
        self.require_table(table_id).await?;

        let delete_sql = format!(
            "DELETE FROM {} WHERE id = $1",
            quote_identifier(&self.config.metadata_table)
        );
        let drop_sql = DdlGenerator::new(&self.config).generate_drop_table(table_id);

        let mut tx = self.pool.begin().await?;
        sqlx::query(&delete_sql)
            .bind(table_id)
            .execute(&mut *tx)
            .await?;
        sqlx::query(&drop_sql)
            .execute(&mut *tx)
            .await
            .map_err(|e| TableError::storage(table_id, drop_sql.as_str(), e))?;
        tx.commit().await?;

        info!(table_id = %table_id, "Deleted table");
        Ok(())
    }

    // =========================================================================
    // Schema Operations
    // =========================================================================

    #[instrument(skip(self, input), fields(field_name = %input.name))]
    pub async fn add_field(
        &self,
        table_id: &str,
        input: CreateFieldInput,
    ) -> Result<(Table, Vec<TableEvent>)> {
        if let Some(foreign) = &input.foreign_table_id {
            self.check_foreign_table(table_id, foreign).await?;
        }
        self.apply_spec(table_id, |_| Ok(WithNewField::from(&input)?.into()))
            .await
    }

    /// Replace a field's definition, keeping its id (and key unless given)
    #[instrument(skip(self, input), fields(field_name = %input.name))]
    pub async fn update_field(
        &self,
        table_id: &str,
        field_id: &str,
        input: CreateFieldInput,
    ) -> Result<(Table, Vec<TableEvent>)> {
        if let Some(foreign) = &input.foreign_table_id {
            self.check_foreign_table(table_id, foreign).await?;
        }
        self.apply_spec(table_id, |table| {
            let previous = table
                .schema()
                .get_by_id_str(field_id)
                .ok_or_else(|| TableError::FieldNotFound(field_id.to_string()))?;

            let mut input = input;
            input.id = Some(previous.id().to_string());
            if input.key.is_none() {
                input.key = Some(previous.key().as_str().to_string());
            }

            let next = Field::create(&input)?;
            Ok(WithUpdatedField::new(previous.clone(), next)?.into())
        })
        .await
    }

    /// Remove a field; views and forms referencing it are updated too
    #[instrument(skip(self))]
    pub async fn remove_field(
        &self,
        table_id: &str,
        field_id: &str,
    ) -> Result<(Table, Vec<TableEvent>)> {
        self.apply_spec(table_id, |_| {
            Ok(WithoutField::new(FieldId::from_string(field_id)?).into())
        })
        .await
    }

    /// Set or clear the filter of a view
    #[instrument(skip(self, filter))]
    pub async fn set_view_filter(
        &self,
        table_id: &str,
        view_id: &str,
        filter: Option<RootFilter>,
    ) -> Result<(Table, Vec<TableEvent>)> {
        self.apply_spec(table_id, |_| {
            Ok(WithViewFilter::new(ViewId::from_string(view_id)?, filter).into())
        })
        .await
    }

    /// Apply a specification to a stored table, migrate its underlying table
    /// and persist the changed parts of the definition, all in one transaction
    async fn apply_spec<F>(&self, table_id: &str, build: F) -> Result<(Table, Vec<TableEvent>)>
    where
        F: FnOnce(&Table) -> Result<TableSpec>,
    {
        let mut table = self.require_table(table_id).await?;
        let spec = build(&table)?;
        let events = table.apply(&spec)?;

        let mut visitor = UnderlyingTableVisitor::new(
            DdlGenerator::new(&self.config),
            self.underlying_table(table_id).await?,
        );
        visitor.visit(&spec)?;

        let mut tx = self.pool.begin().await?;
        visitor.commit(&mut tx).await?;
        self.persist_changes(&mut tx, &table, &events).await?;
        tx.commit().await?;

        Ok((table, events))
    }

    /// Write back only the parts of the definition the events touched
    async fn persist_changes(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        table: &Table,
        events: &[TableEvent],
    ) -> Result<()> {
        let mut schema_changed = false;
        let mut views_changed = false;
        let mut forms_changed = false;
        for event in events {
            match event {
                TableEvent::FieldCreated { .. } => schema_changed = true,
                TableEvent::FieldUpdated { .. } => {
                    schema_changed = true;
                    // a type change can clear a kanban grouping
                    views_changed = true;
                }
                TableEvent::FieldDeleted {
                    changed_views,
                    changed_forms,
                    ..
                } => {
                    schema_changed = true;
                    views_changed |= !changed_views.is_empty();
                    forms_changed |= !changed_forms.is_empty();
                }
                TableEvent::ViewFilterSet { .. } => views_changed = true,
            }
        }

        let mut updates = vec!["name = $2".to_string(), "emoji = $3".to_string()];
        let mut documents = Vec::new();
        let definition = table.to_input();
        if schema_changed {
            documents.push(serde_json::to_value(&definition.schema)?);
            updates.push(format!("schema = ${}", documents.len() + 3));
        }
        if views_changed {
            documents.push(serde_json::to_value(&definition.views)?);
            updates.push(format!("views = ${}", documents.len() + 3));
        }
        if forms_changed {
            documents.push(serde_json::to_value(&definition.forms)?);
            updates.push(format!("forms = ${}", documents.len() + 3));
        }
        updates.push("updated_at = NOW()".to_string());

        let update_sql = format!(
            "UPDATE {} SET {} WHERE id = $1",
            quote_identifier(&self.config.metadata_table),
            updates.join(", ")
        );

        let mut query = sqlx::query(&update_sql)
            .bind(table.id().as_str())
            .bind(table.name().as_str())
            .bind(table.emoji().as_str());
        for document in documents {
            query = query.bind(document);
        }
        query.execute(&mut **tx).await?;

        Ok(())
    }

    // =========================================================================
    // Underlying Tables
    // =========================================================================

    /// Column names of an underlying table, or `None` when it does not exist
    pub async fn underlying_columns(&self, table_name: &str) -> Result<Option<Vec<String>>> {
        let exists: Option<(i32,)> = sqlx::query_as(
            "SELECT 1 FROM information_schema.tables \
             WHERE table_schema = current_schema() AND table_name = $1",
        )
        .bind(table_name)
        .fetch_optional(&self.pool)
        .await?;

        if exists.is_none() {
            return Ok(None);
        }

        let columns: Vec<(String,)> = sqlx::query_as(
            "SELECT column_name::text FROM information_schema.columns \
             WHERE table_schema = current_schema() AND table_name = $1 \
             ORDER BY ordinal_position",
        )
        .bind(table_name)
        .fetch_all(&self.pool)
        .await?;

        Ok(Some(columns.into_iter().map(|(name,)| name).collect()))
    }

    async fn underlying_table(&self, table_name: &str) -> Result<UnderlyingTable> {
        Ok(match self.underlying_columns(table_name).await? {
            Some(columns) => UnderlyingTable::existing(table_name, columns),
            None => UnderlyingTable::missing(table_name),
        })
    }

    // =========================================================================
    // Record Operations
    // =========================================================================

    /// Insert a record; values are keyed by field id.
    ///
    /// With `form_id`, only that form's fields may be set and the form's
    /// required flags apply.
    #[instrument(skip(self, values))]
    pub async fn insert_record(
        &self,
        table_id: &str,
        values: RecordValues,
        form_id: Option<&str>,
    ) -> Result<Record> {
        let table = self.require_table(table_id).await?;
        let form = form_id
            .map(|id| {
                table
                    .forms()
                    .get_by_id(id)
                    .ok_or_else(|| TableError::FormNotFound(id.to_string()))
            })
            .transpose()?;

        table.schema().validate_values(&values, form)?;

        let record = Record::new(table_id, values);
        let auto = &self.config.auto_columns;

        let mut column_names = Vec::new();
        if auto.id {
            column_names.push("id".to_string());
        }
        if auto.created_at {
            column_names.push("created_at".to_string());
        }
        if auto.updated_at {
            column_names.push("updated_at".to_string());
        }

        // blanks are left to the column defaults
        let columns: Vec<(ColumnDefinition, &serde_json::Value)> = table
            .schema()
            .fields()
            .iter()
            .filter_map(|field| {
                let col = field.column_definition();
                record
                    .get(field.id())
                    .filter(|v| !Self::is_blank(&col, v))
                    .map(|v| (col, v))
            })
            .collect();
        column_names.extend(columns.iter().map(|(col, _)| quote_identifier(&col.name)));

        if column_names.is_empty() {
            let insert_sql = format!("INSERT INTO {} DEFAULT VALUES", quote_identifier(table_id));
            sqlx::query(&insert_sql).execute(&self.pool).await?;
            return Ok(record);
        }

        let placeholders: Vec<String> = (1..=column_names.len())
            .map(|i| format!("${}", i))
            .collect();
        let insert_sql = format!(
            "INSERT INTO {} ({}) VALUES ({})",
            quote_identifier(table_id),
            column_names.join(", "),
            placeholders.join(", ")
        );

        let created_at = chrono::DateTime::parse_from_rfc3339(&record.created_at)
            .map(|dt| dt.with_timezone(&chrono::Utc))
            .map_err(|e| TableError::validation(format!("Invalid record timestamp: {}", e)))?;

        let mut query = sqlx::query(&insert_sql);
        if auto.id {
            query = query.bind(record.id.as_str());
        }
        if auto.created_at {
            query = query.bind(created_at);
        }
        if auto.updated_at {
            query = query.bind(created_at);
        }
        for (col, value) in &columns {
            query = Self::bind_value(query, col, *value)?;
        }

        query.execute(&self.pool).await?;

        info!(table_id = %table_id, record_id = %record.id, "Inserted record");
        Ok(record)
    }

    /// Records matching a view's filter (the default view when `view_id` is
    /// `None`), oldest first
    #[instrument(skip(self))]
    pub async fn find_records(&self, table_id: &str, view_id: Option<&str>) -> Result<Vec<Record>> {
        let table = self.require_table(table_id).await?;
        let auto = &self.config.auto_columns;

        let (where_clause, params) = match table.get_spec(view_id)? {
            Some(spec) => {
                let mut param_offset = 1;
                build_record_clause(&spec, table.schema(), &mut param_offset)
                    .map_err(TableError::InvalidCondition)?
            }
            None => ("TRUE".to_string(), Vec::new()),
        };

        let mut select_columns: Vec<String> =
            auto.names().into_iter().map(str::to_string).collect();
        let columns = table.schema().column_definitions();
        select_columns.extend(columns.iter().map(|c| quote_identifier(&c.name)));

        let order_by = if auto.created_at {
            " ORDER BY created_at ASC"
        } else {
            ""
        };
        let select_sql = format!(
            "SELECT {} FROM {} WHERE {}{}",
            select_columns.join(", "),
            quote_identifier(table_id),
            where_clause,
            order_by
        );

        let mut query = sqlx::query(&select_sql);
        for param in &params {
            let param_str = match param {
                serde_json::Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            query = query.bind(param_str);
        }
        let rows = query.fetch_all(&self.pool).await?;

        Ok(rows
            .iter()
            .map(|row| self.row_to_record(row, table_id, &columns))
            .collect())
    }

    /// Candidate records for a reference field: the records of its foreign
    /// table, or of the table itself when the field names none
    #[instrument(skip(self))]
    pub async fn find_foreign_records(
        &self,
        table_id: &str,
        field_id: &str,
    ) -> Result<Vec<Record>> {
        let table = self.require_table(table_id).await?;
        let field = table
            .schema()
            .get_by_id_str(field_id)
            .ok_or_else(|| TableError::FieldNotFound(field_id.to_string()))?;

        let FieldKind::Reference { foreign_table_id } = field.kind() else {
            return Err(TableError::validation(format!(
                "Field '{}' is not a reference field",
                field_id
            )));
        };
        let foreign_table_id = foreign_table_id
            .as_ref()
            .map_or(table_id, |id| id.as_str());

        self.find_records(foreign_table_id, None).await
    }

    // =========================================================================
    // Helper Methods
    // =========================================================================

    /// A reference field may point at its own table or at a stored one
    async fn check_foreign_table(&self, table_id: &str, foreign_table_id: &str) -> Result<()> {
        if foreign_table_id == table_id || self.table_exists(foreign_table_id).await? {
            return Ok(());
        }
        Err(TableError::invalid_constraint(format!(
            "foreign table '{}' does not exist",
            foreign_table_id
        )))
    }

    async fn require_table(&self, table_id: &str) -> Result<Table> {
        self.get_table(table_id)
            .await?
            .ok_or_else(|| TableError::table_not_found(table_id))
    }

    async fn table_exists(&self, table_id: &str) -> Result<bool> {
        let select_sql = format!(
            "SELECT 1 FROM {} WHERE id = $1",
            quote_identifier(&self.config.metadata_table)
        );
        let row: Option<(i32,)> = sqlx::query_as(&select_sql)
            .bind(table_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.is_some())
    }

    fn row_to_table(row: &sqlx::postgres::PgRow) -> Result<Table> {
        let input = CreateTableInput {
            id: Some(row.try_get("id")?),
            name: row.try_get("name")?,
            emoji: Some(row.try_get("emoji")?),
            schema: serde_json::from_value(row.try_get("schema")?)?,
            views: serde_json::from_value(row.try_get("views")?)?,
            forms: serde_json::from_value(row.try_get("forms")?)?,
        };

        Table::from_spec(&new_table_spec(&input)?)
    }

    fn row_to_record(
        &self,
        row: &sqlx::postgres::PgRow,
        table_id: &str,
        columns: &[ColumnDefinition],
    ) -> Record {
        let auto = &self.config.auto_columns;

        let id: String = if auto.id {
            row.try_get("id").unwrap_or_default()
        } else {
            String::new()
        };

        let timestamp = |name: &str| -> String {
            row.try_get::<chrono::DateTime<chrono::Utc>, _>(name)
                .map(|dt| dt.to_rfc3339())
                .unwrap_or_default()
        };
        let created_at = if auto.created_at {
            timestamp("created_at")
        } else {
            String::new()
        };
        let updated_at = if auto.updated_at {
            timestamp("updated_at")
        } else {
            String::new()
        };

        let mut values = RecordValues::new();
        for col in columns {
            if let Some(value) = Self::extract_column_value(row, col) {
                values.insert(col.name.clone(), value);
            }
        }

        Record {
            id,
            created_at,
            updated_at,
            table_id: table_id.to_string(),
            values,
        }
    }

    fn extract_column_value(
        row: &sqlx::postgres::PgRow,
        col: &ColumnDefinition,
    ) -> Option<serde_json::Value> {
        match col.column_type {
            ColumnType::VarChar | ColumnType::Text => row
                .try_get::<Option<String>, _>(col.name.as_str())
                .ok()
                .flatten()
                .map(serde_json::Value::String),
            ColumnType::Numeric => {
                use rust_decimal::prelude::ToPrimitive;
                row.try_get::<Option<rust_decimal::Decimal>, _>(col.name.as_str())
                    .ok()
                    .flatten()
                    .and_then(|d| d.to_f64())
                    .and_then(serde_json::Number::from_f64)
                    .map(serde_json::Value::Number)
            }
            ColumnType::Boolean => row
                .try_get::<Option<bool>, _>(col.name.as_str())
                .ok()
                .flatten()
                .map(serde_json::Value::Bool),
            ColumnType::Timestamp => row
                .try_get::<Option<chrono::DateTime<chrono::Utc>>, _>(col.name.as_str())
                .ok()
                .flatten()
                .map(|v| serde_json::Value::String(v.to_rfc3339())),
        }
    }

    /// NULL, or an empty string for a column that cannot store one
    fn is_blank(col: &ColumnDefinition, value: &serde_json::Value) -> bool {
        match value {
            serde_json::Value::Null => true,
            serde_json::Value::String(s) if s.is_empty() => {
                !matches!(col.column_type, ColumnType::VarChar | ColumnType::Text)
            }
            _ => false,
        }
    }

    fn bind_value<'q>(
        query: sqlx::query::Query<'q, Postgres, sqlx::postgres::PgArguments>,
        col: &ColumnDefinition,
        value: &'q serde_json::Value,
    ) -> Result<sqlx::query::Query<'q, Postgres, sqlx::postgres::PgArguments>> {
        let invalid = |expected: &str| {
            TableError::invalid_record(format!("Column '{}' expected {}", col.name, expected))
        };

        Ok(match col.column_type {
            ColumnType::VarChar | ColumnType::Text => {
                query.bind(value.as_str().ok_or_else(|| invalid("text"))?)
            }
            ColumnType::Numeric => {
                let text = match value {
                    serde_json::Value::String(s) => s.clone(),
                    other => other.to_string(),
                };
                let decimal = text
                    .parse::<rust_decimal::Decimal>()
                    .or_else(|_| rust_decimal::Decimal::from_scientific(&text))
                    .map_err(|_| invalid("a number"))?;
                query.bind(decimal)
            }
            ColumnType::Boolean => {
                let bool_val = value
                    .as_bool()
                    .or_else(|| {
                        value.as_str().and_then(|s| match s.to_lowercase().as_str() {
                            "true" => Some(true),
                            "false" => Some(false),
                            _ => None,
                        })
                    })
                    .ok_or_else(|| invalid("a boolean"))?;
                query.bind(bool_val)
            }
            ColumnType::Timestamp => {
                let timestamp = value
                    .as_str()
                    .and_then(|s| chrono::DateTime::parse_from_rfc3339(s).ok())
                    .ok_or_else(|| invalid("an RFC 3339 timestamp"))?
                    .with_timezone(&chrono::Utc);
                query.bind(timestamp)
            }
        })
    }
}
