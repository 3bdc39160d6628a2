//! Error types for table store operations

use thiserror::Error;

/// Errors that can occur while composing, migrating or querying tables
#[derive(Debug, Error)]
pub enum TableError {
    #[error("Invalid table name: {0}")]
    InvalidTableName(String),

    #[error("Invalid table id: {0}")]
    InvalidTableId(String),

    #[error("Invalid field id: {0}")]
    InvalidFieldId(String),

    #[error("Invalid field key: {0}")]
    InvalidFieldKey(String),

    #[error("Invalid field name: {0}")]
    InvalidFieldName(String),

    #[error("Invalid table schema: {0}")]
    InvalidSchema(String),

    #[error("Unsupported field type: {0}")]
    UnsupportedFieldType(String),

    #[error("Invalid field constraint: {0}")]
    InvalidConstraint(String),

    #[error("Invalid view: {0}")]
    InvalidView(String),

    #[error("Invalid form: {0}")]
    InvalidForm(String),

    #[error("Invalid table emoji: {0}")]
    InvalidEmoji(String),

    #[error("Invalid record: {0}")]
    InvalidRecord(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Table not found: {0}")]
    TableNotFound(String),

    #[error("View not found: {0}")]
    ViewNotFound(String),

    #[error("Form not found: {0}")]
    FormNotFound(String),

    #[error("Field not found: {0}")]
    FieldNotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Statement failed on underlying table '{table}': {statement}: {source}")]
    Storage {
        table: String,
        statement: String,
        #[source]
        source: sqlx::Error,
    },

    #[error("Schema changes for underlying table '{table}' were already committed")]
    AlreadyCommitted { table: String },

    #[error("SQL error: {0}")]
    Sql(#[from] sqlx::Error),

    #[error("Invalid condition: {0}")]
    InvalidCondition(String),

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

impl TableError {
    pub fn invalid_schema(msg: impl Into<String>) -> Self {
        Self::InvalidSchema(msg.into())
    }

    pub fn invalid_constraint(msg: impl Into<String>) -> Self {
        Self::InvalidConstraint(msg.into())
    }

    pub fn invalid_view(msg: impl Into<String>) -> Self {
        Self::InvalidView(msg.into())
    }

    pub fn invalid_form(msg: impl Into<String>) -> Self {
        Self::InvalidForm(msg.into())
    }

    pub fn invalid_record(msg: impl Into<String>) -> Self {
        Self::InvalidRecord(msg.into())
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn table_not_found(msg: impl Into<String>) -> Self {
        Self::TableNotFound(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    pub fn storage(
        table: impl Into<String>,
        statement: impl Into<String>,
        source: sqlx::Error,
    ) -> Self {
        Self::Storage {
            table: table.into(),
            statement: statement.into(),
            source,
        }
    }

    /// Whether the caller can recover by correcting its input
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            Self::InvalidTableName(_)
                | Self::InvalidTableId(_)
                | Self::InvalidFieldId(_)
                | Self::InvalidFieldKey(_)
                | Self::InvalidFieldName(_)
                | Self::InvalidSchema(_)
                | Self::UnsupportedFieldType(_)
                | Self::InvalidConstraint(_)
                | Self::InvalidView(_)
                | Self::InvalidForm(_)
                | Self::InvalidEmoji(_)
                | Self::InvalidRecord(_)
                | Self::Validation(_)
        )
    }

    /// Message safe to show to end users.
    ///
    /// Validation and lookup failures are returned verbatim. Storage failures
    /// collapse to a generic message; the statement text only goes to the logs.
    pub fn user_message(&self) -> String {
        match self {
            Self::Storage { .. } | Self::Sql(_) | Self::Connection(_) | Self::Json(_) => {
                "The operation failed, please try again later".to_string()
            }
            Self::AlreadyCommitted { .. } | Self::InvalidCondition(_) => {
                "The operation could not be completed".to_string()
            }
            other => other.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, TableError>;
