//! Underlying table migrations
//!
//! `UnderlyingTableVisitor` walks a `TableSpec` and accumulates the DDL that
//! brings the physical table in line with it. Visiting is pure; nothing
//! touches the database until `commit` hands the statements to a
//! `SchemaExecutor`.

use async_trait::async_trait;
use sqlx::{PgPool, Postgres, Transaction};
use tracing::{debug, error, info, instrument};

use crate::error::{Result, TableError};
use crate::field::Field;
use crate::spec::{
    TableSpec, TableSpecVisitor, WithNewField, WithTableSchema, WithUpdatedField, WithoutField,
};
use crate::sql::ddl::DdlGenerator;

/// Runs schema statements against the store backing underlying tables.
///
/// Implementations apply the statements in order and stop at the first
/// failure, reporting it as `TableError::Storage`. The PostgreSQL
/// implementations run inside a transaction, so a failure leaves the table
/// as it was. Executors over stores without transactional DDL may leave
/// earlier statements applied.
#[async_trait]
pub trait SchemaExecutor: Send {
    async fn apply_statements(&mut self, table: &str, statements: &[String]) -> Result<()>;
}

#[async_trait]
impl SchemaExecutor for PgPool {
    async fn apply_statements(&mut self, table: &str, statements: &[String]) -> Result<()> {
        let mut tx = self.begin().await?;
        tx.apply_statements(table, statements).await?;
        tx.commit().await?;
        Ok(())
    }
}

/// Runs the statements on the transaction; the caller decides when to commit
#[async_trait]
impl<'c> SchemaExecutor for Transaction<'c, Postgres> {
    async fn apply_statements(&mut self, table: &str, statements: &[String]) -> Result<()> {
        for statement in statements {
            debug!(table = %table, statement = %statement, "Executing schema statement");
            if let Err(e) = sqlx::query(statement.as_str()).execute(&mut **self).await {
                error!(
                    error = %e,
                    table = %table,
                    statement = %statement,
                    "Schema statement failed"
                );
                return Err(TableError::storage(table, statement.as_str(), e));
            }
        }
        Ok(())
    }
}

/// Physical state of an underlying table as introspected before visiting
#[derive(Debug, Clone, PartialEq)]
pub struct UnderlyingTable {
    name: String,
    columns: Vec<String>,
    exists: bool,
}

impl UnderlyingTable {
    /// Table that exists with the given column names
    pub fn existing(name: impl Into<String>, columns: Vec<String>) -> Self {
        Self {
            name: name.into(),
            columns,
            exists: true,
        }
    }

    /// Table that has not been created yet
    pub fn missing(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            columns: Vec::new(),
            exists: false,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn exists(&self) -> bool {
        self.exists
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.columns.iter().any(|c| c == name)
    }
}

#[derive(Debug, Clone, PartialEq)]
enum VisitorState {
    Idle,
    Accumulating(Vec<String>),
    Committed(Vec<String>),
}

/// Accumulates DDL for one underlying table; single use
pub struct UnderlyingTableVisitor<'a> {
    ddl: DdlGenerator<'a>,
    table: UnderlyingTable,
    state: VisitorState,
}

impl<'a> UnderlyingTableVisitor<'a> {
    pub fn new(ddl: DdlGenerator<'a>, table: UnderlyingTable) -> Self {
        Self {
            ddl,
            table,
            state: VisitorState::Idle,
        }
    }

    /// Accumulate the statements required by `spec`
    pub fn visit(&mut self, spec: &TableSpec) -> Result<()> {
        if self.is_committed() {
            return Err(self.already_committed());
        }
        spec.accept(self)
    }

    /// Statements accumulated so far, in execution order
    pub fn statements(&self) -> &[String] {
        match &self.state {
            VisitorState::Idle => &[],
            VisitorState::Accumulating(statements) | VisitorState::Committed(statements) => {
                statements
            }
        }
    }

    /// Physical table as it will be once the statements are applied
    pub fn table(&self) -> &UnderlyingTable {
        &self.table
    }

    pub fn is_committed(&self) -> bool {
        matches!(self.state, VisitorState::Committed(_))
    }

    /// Apply the accumulated statements.
    ///
    /// Succeeds once; afterwards every call fails with `AlreadyCommitted`
    /// without executing anything. If the executor fails the visitor stays
    /// uncommitted with its statements intact.
    #[instrument(
        skip(self, executor),
        fields(table = %self.table.name, statements = self.statements().len())
    )]
    pub async fn commit<E: SchemaExecutor + ?Sized>(&mut self, executor: &mut E) -> Result<()> {
        let statements = match &self.state {
            VisitorState::Committed(_) => return Err(self.already_committed()),
            VisitorState::Idle => Vec::new(),
            VisitorState::Accumulating(statements) => statements.clone(),
        };

        if !statements.is_empty() {
            executor
                .apply_statements(&self.table.name, &statements)
                .await?;
            info!(
                table = %self.table.name,
                count = statements.len(),
                "Committed underlying table changes"
            );
        }

        self.state = VisitorState::Committed(statements);
        Ok(())
    }

    fn already_committed(&self) -> TableError {
        TableError::AlreadyCommitted {
            table: self.table.name.clone(),
        }
    }

    fn push(&mut self, statement: String) {
        debug!(table = %self.table.name, statement = %statement, "Accumulated schema statement");
        if let VisitorState::Accumulating(statements) = &mut self.state {
            statements.push(statement);
            return;
        }
        self.state = VisitorState::Accumulating(vec![statement]);
    }

    fn add_column(&mut self, field: &Field) {
        let column = field.column_definition();
        let statement = self.ddl.generate_add_column(&self.table.name, &column);
        self.table.columns.push(column.name);
        self.push(statement);
    }

    fn create_table(&mut self, fields: &[Field]) {
        let columns: Vec<_> = fields.iter().map(Field::column_definition).collect();
        let statement = self.ddl.generate_create_table(&self.table.name, &columns);

        self.table.exists = true;
        self.table.columns = self
            .ddl
            .config()
            .auto_columns
            .names()
            .into_iter()
            .map(str::to_string)
            .chain(columns.into_iter().map(|c| c.name))
            .collect();
        self.push(statement);
    }
}

impl TableSpecVisitor for UnderlyingTableVisitor<'_> {
    fn with_table_schema(&mut self, spec: &WithTableSchema) -> Result<()> {
        let fields = spec.schema().fields();
        if !self.table.exists {
            self.create_table(fields);
            return Ok(());
        }

        for field in fields {
            if !self.table.has_column(field.id().as_str()) {
                self.add_column(field);
            }
        }
        Ok(())
    }

    fn with_new_field(&mut self, spec: &WithNewField) -> Result<()> {
        let field = spec.field();
        if !self.table.exists {
            self.create_table(std::slice::from_ref(field));
        } else if self.table.has_column(field.id().as_str()) {
            debug!(table = %self.table.name, column = %field.id(), "Column already present");
        } else {
            self.add_column(field);
        }
        Ok(())
    }

    fn without_field(&mut self, spec: &WithoutField) -> Result<()> {
        let column = spec.field_id().as_str();
        if !self.table.has_column(column) {
            return Ok(());
        }
        let statement = self.ddl.generate_drop_column(&self.table.name, column);
        self.table.columns.retain(|c| c != column);
        self.push(statement);
        Ok(())
    }

    fn with_updated_field(&mut self, spec: &WithUpdatedField) -> Result<()> {
        let next = spec.next();
        if !self.table.exists || !self.table.has_column(next.id().as_str()) {
            return self.with_new_field(&WithNewField::new(next.clone()));
        }

        let statements = self.ddl.generate_alter_column(
            &self.table.name,
            &spec.previous().column_definition(),
            &next.column_definition(),
        );
        for statement in statements {
            self.push(statement);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::field::{CreateFieldInput, FieldId};
    use crate::spec::{WithTableName, WithViewFilter};
    use crate::view::ViewId;

    /// Records statements instead of running them; fails at `fail_at` if set
    #[derive(Default)]
    struct RecordingExecutor {
        executed: Vec<String>,
        calls: usize,
        fail_at: Option<usize>,
    }

    #[async_trait]
    impl SchemaExecutor for RecordingExecutor {
        async fn apply_statements(&mut self, table: &str, statements: &[String]) -> Result<()> {
            self.calls += 1;
            for (i, statement) in statements.iter().enumerate() {
                if self.fail_at == Some(i) {
                    return Err(TableError::storage(
                        table,
                        statement.as_str(),
                        sqlx::Error::Protocol("column already exists".into()),
                    ));
                }
                self.executed.push(statement.clone());
            }
            Ok(())
        }
    }

    fn config() -> EngineConfig {
        EngineConfig::builder("postgres://localhost/test").build()
    }

    fn field(input: CreateFieldInput) -> Field {
        Field::create(&input).unwrap()
    }

    fn schema_spec(inputs: &[CreateFieldInput]) -> TableSpec {
        WithTableSchema::from(inputs).unwrap().into()
    }

    fn string_input(id: &str) -> CreateFieldInput {
        CreateFieldInput::new(id, "string").with_id(id)
    }

    // ==================== Schema Convergence ====================

    #[test]
    fn test_schema_adds_missing_columns_in_schema_order() {
        let config = config();
        let mut visitor = UnderlyingTableVisitor::new(
            DdlGenerator::new(&config),
            UnderlyingTable::existing("tbltest", vec!["id".into(), "fldb".into()]),
        );

        visitor
            .visit(&schema_spec(&[
                string_input("flda"),
                string_input("fldb"),
                CreateFieldInput::new("c", "number").with_id("fldc"),
            ]))
            .unwrap();

        assert_eq!(
            visitor.statements(),
            &[
                "ALTER TABLE \"tbltest\" ADD COLUMN \"flda\" VARCHAR(255)".to_string(),
                "ALTER TABLE \"tbltest\" ADD COLUMN \"fldc\" NUMERIC".to_string(),
            ]
        );
    }

    #[test]
    fn test_schema_convergence_is_idempotent() {
        let config = config();
        let spec = schema_spec(&[string_input("flda"), string_input("fldb")]);

        let mut first = UnderlyingTableVisitor::new(
            DdlGenerator::new(&config),
            UnderlyingTable::existing("tbltest", vec![]),
        );
        first.visit(&spec).unwrap();
        assert_eq!(first.statements().len(), 2);

        let mut second = UnderlyingTableVisitor::new(
            DdlGenerator::new(&config),
            UnderlyingTable::existing("tbltest", first.table().columns().to_vec()),
        );
        second.visit(&spec).unwrap();
        assert!(second.statements().is_empty());
    }

    #[test]
    fn test_schema_on_missing_table_creates_it() {
        let config = config();
        let mut visitor = UnderlyingTableVisitor::new(
            DdlGenerator::new(&config),
            UnderlyingTable::missing("tbltest"),
        );

        visitor
            .visit(&schema_spec(&[string_input("flda"), string_input("fldb")]))
            .unwrap();

        assert_eq!(visitor.statements().len(), 1);
        assert!(visitor.statements()[0].starts_with("CREATE TABLE \"tbltest\""));
        assert_eq!(
            visitor.table().columns(),
            &["id", "created_at", "updated_at", "flda", "fldb"]
        );
    }

    #[test]
    fn test_attribute_specs_have_no_physical_effect() {
        let config = config();
        let mut visitor = UnderlyingTableVisitor::new(
            DdlGenerator::new(&config),
            UnderlyingTable::existing("tbltest", vec![]),
        );

        let spec = WithTableName::from_string("Renamed")
            .unwrap()
            .and(WithViewFilter::new(ViewId::from_string("viwall").unwrap(), None));
        visitor.visit(&spec).unwrap();

        assert!(visitor.statements().is_empty());
    }

    // ==================== Field Changes ====================

    #[test]
    fn test_without_field_drops_known_column_only() {
        let config = config();
        let mut visitor = UnderlyingTableVisitor::new(
            DdlGenerator::new(&config),
            UnderlyingTable::existing("tbltest", vec!["flda".into()]),
        );

        visitor
            .visit(&WithoutField::new(FieldId::from_string("flda").unwrap()).into())
            .unwrap();
        visitor
            .visit(&WithoutField::new(FieldId::from_string("fldghost").unwrap()).into())
            .unwrap();

        assert_eq!(
            visitor.statements(),
            &["ALTER TABLE \"tbltest\" DROP COLUMN IF EXISTS \"flda\"".to_string()]
        );
        assert!(!visitor.table().has_column("flda"));
    }

    #[test]
    fn test_updated_field_alters_column() {
        let config = config();
        let mut visitor = UnderlyingTableVisitor::new(
            DdlGenerator::new(&config),
            UnderlyingTable::existing("tbltest", vec!["fldscore".into()]),
        );
        let previous = field(string_input("fldscore"));
        let next = field(CreateFieldInput::new("score", "number").with_id("fldscore"));

        visitor
            .visit(&WithUpdatedField::new(previous, next).unwrap().into())
            .unwrap();

        assert_eq!(
            visitor.statements(),
            &["ALTER TABLE \"tbltest\" ALTER COLUMN \"fldscore\" TYPE NUMERIC USING NULLIF(\"fldscore\", '')::numeric"
                .to_string()]
        );
    }

    #[test]
    fn test_rename_only_update_emits_nothing() {
        let config = config();
        let mut visitor = UnderlyingTableVisitor::new(
            DdlGenerator::new(&config),
            UnderlyingTable::existing("tbltest", vec!["fldname".into()]),
        );
        let previous = field(CreateFieldInput::new("Name", "string").with_id("fldname"));
        let next = field(CreateFieldInput::new("Full name", "string").with_id("fldname"));

        visitor
            .visit(&WithUpdatedField::new(previous, next).unwrap().into())
            .unwrap();

        assert!(visitor.statements().is_empty());
    }

    // ==================== Commit ====================

    #[tokio::test]
    async fn test_new_field_end_to_end() {
        let config = config();
        let new_field = field(
            CreateFieldInput::new("field1", "string")
                .with_id("fldid")
                .with_key("field1"),
        );

        let mut visitor = UnderlyingTableVisitor::new(
            DdlGenerator::new(&config),
            UnderlyingTable::existing("tbltest", vec![]),
        );
        visitor
            .visit(&WithNewField::new(new_field.clone()).into())
            .unwrap();
        assert_eq!(
            visitor.statements(),
            &["ALTER TABLE \"tbltest\" ADD COLUMN \"fldid\" VARCHAR(255)".to_string()]
        );

        let mut executor = RecordingExecutor::default();
        visitor.commit(&mut executor).await.unwrap();
        assert_eq!(executor.executed, visitor.statements());

        // a second pass against the updated columns converges to nothing
        let mut second = UnderlyingTableVisitor::new(
            DdlGenerator::new(&config),
            UnderlyingTable::existing("tbltest", vec!["fldid".into()]),
        );
        second
            .visit(&WithTableSchema::new(
                crate::schema::TableSchema::new(vec![new_field]).unwrap(),
            )
            .into())
            .unwrap();
        assert!(second.statements().is_empty());
    }

    #[tokio::test]
    async fn test_second_commit_is_rejected() {
        let config = config();
        let mut visitor = UnderlyingTableVisitor::new(
            DdlGenerator::new(&config),
            UnderlyingTable::existing("tbltest", vec![]),
        );
        visitor
            .visit(&WithNewField::new(field(string_input("fldid"))).into())
            .unwrap();

        let mut executor = RecordingExecutor::default();
        visitor.commit(&mut executor).await.unwrap();
        let err = visitor.commit(&mut executor).await.unwrap_err();

        assert!(matches!(err, TableError::AlreadyCommitted { table } if table == "tbltest"));
        assert_eq!(executor.calls, 1);
        assert_eq!(executor.executed.len(), 1);
    }

    #[tokio::test]
    async fn test_visit_after_commit_is_rejected() {
        let config = config();
        let mut visitor = UnderlyingTableVisitor::new(
            DdlGenerator::new(&config),
            UnderlyingTable::existing("tbltest", vec![]),
        );
        visitor.commit(&mut RecordingExecutor::default()).await.unwrap();

        let result = visitor.visit(&WithNewField::new(field(string_input("fldid"))).into());
        assert!(matches!(result, Err(TableError::AlreadyCommitted { .. })));
    }

    #[tokio::test]
    async fn test_failed_commit_stops_and_stays_uncommitted() {
        let config = config();
        let mut visitor = UnderlyingTableVisitor::new(
            DdlGenerator::new(&config),
            UnderlyingTable::existing("tbltest", vec![]),
        );
        visitor
            .visit(&schema_spec(&[
                string_input("flda"),
                string_input("fldb"),
                string_input("fldc"),
            ]))
            .unwrap();

        let mut failing = RecordingExecutor {
            fail_at: Some(1),
            ..Default::default()
        };
        let err = visitor.commit(&mut failing).await.unwrap_err();

        match err {
            TableError::Storage { table, statement, .. } => {
                assert_eq!(table, "tbltest");
                assert!(statement.contains("\"fldb\""));
            }
            other => panic!("Expected storage error, got {:?}", other),
        }
        assert_eq!(failing.executed.len(), 1);
        assert!(!visitor.is_committed());
        assert_eq!(visitor.statements().len(), 3);

        // retry succeeds once the store accepts the statements
        let mut executor = RecordingExecutor::default();
        visitor.commit(&mut executor).await.unwrap();
        assert_eq!(executor.executed.len(), 3);
    }
}
