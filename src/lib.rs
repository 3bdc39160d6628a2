//! # runtara-table-store
//!
//! User-defined tables on PostgreSQL.
//!
//! A table has a schema of typed fields, a set of views (grid or kanban,
//! each with an optional filter) and a set of forms. Every table is backed
//! by an underlying PostgreSQL table whose columns follow the schema.
//!
//! ## Features
//!
//! - **Specification-driven changes**: creation and schema edits are composed
//!   as a `TableSpec`, validated as a whole, then applied to the table and
//!   translated into DDL by the same visitor walk
//! - **Field types**: string, email, number, date, bool, select and reference
//! - **View filters**: JSON filter trees that compile to parameterized SQL
//! - **Forms**: restrict and require fields on record entry
//! - **Cascading removal**: dropping a field updates every view and form
//!   that referenced it
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use runtara_table_store::{CreateFieldInput, CreateTableInput, EngineConfig, TableStore};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = EngineConfig::builder("postgres://localhost/mydb").build();
//!     let store = TableStore::new(config).await?;
//!
//!     let table = store
//!         .create_table(
//!             CreateTableInput::new("Contacts")
//!                 .with_field(CreateFieldInput::new("Name", "string").with_id("fldname").required())
//!                 .with_field(CreateFieldInput::new("Age", "number").with_id("fldage")),
//!         )
//!         .await?;
//!
//!     let mut values = runtara_table_store::RecordValues::new();
//!     values.insert("fldname".into(), serde_json::json!("Ada"));
//!     values.insert("fldage".into(), serde_json::json!(36));
//!     store.insert_record(table.id().as_str(), values, None).await?;
//!
//!     let records = store.find_records(table.id().as_str(), None).await?;
//!     assert_eq!(records.len(), 1);
//!
//!     Ok(())
//! }
//! ```
//!
//! ## Configuration
//!
//! ```rust
//! use runtara_table_store::EngineConfig;
//!
//! let config = EngineConfig::builder("postgres://localhost/mydb")
//!     .metadata_table("__table")  // Default metadata table name
//!     .auto_id(true)              // Auto-generate UUID id column
//!     .auto_created_at(true)      // Auto-manage created_at column
//!     .auto_updated_at(true)      // Auto-manage updated_at column
//!     .build();
//! ```
//!
//! ## Multi-Tenancy
//!
//! One database per tenant. Tenant isolation comes from connecting to
//! different databases; the caller manages those connections.

pub mod config;
pub mod error;
pub mod field;
pub mod filter;
pub mod form;
pub mod record;
pub mod schema;
pub mod spec;
pub mod sql;
pub mod store;
pub mod table;
pub mod types;
pub mod view;

// Re-export main types for convenience
pub use config::{AutoColumns, EngineConfig, EngineConfigBuilder};
pub use error::{Result, TableError};
pub use field::{CreateFieldInput, Field, FieldId, FieldKind, FieldType, SelectOptionInput};
pub use filter::{Conjunction, Filter, FilterCondition, FilterGroup, FilterOperator, RootFilter};
pub use form::{Form, FormFieldInput, FormId, FormInput, Forms};
pub use record::{CompareOp, Record, RecordSpec, RecordValues, TextOp};
pub use schema::TableSchema;
pub use spec::{Specification, TableSpec, TableSpecVisitor, new_table_spec};
pub use store::TableStore;
pub use table::{CreateTableInput, Table, TableEvent, TableId};
pub use types::{ColumnDefinition, ColumnType};
pub use view::{DisplayType, View, ViewId, ViewInput, Views};

// Re-export SQL utilities for advanced users
pub use sql::condition::build_record_clause;
pub use sql::ddl::DdlGenerator;
pub use sql::sanitize::{quote_identifier, validate_identifier};
pub use sql::visitor::{SchemaExecutor, UnderlyingTable, UnderlyingTableVisitor};
