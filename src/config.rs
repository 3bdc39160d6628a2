//! Configuration for the table store
//!
//! Provides a builder pattern for configuring the engine.

/// Auto-managed columns of every underlying table
#[derive(Debug, Clone)]
pub struct AutoColumns {
    /// Whether to include the `id` column (record primary key)
    pub id: bool,
    /// Whether to include the `created_at` column (timestamp)
    pub created_at: bool,
    /// Whether to include the `updated_at` column (timestamp)
    pub updated_at: bool,
}

impl AutoColumns {
    /// Names of the enabled auto-managed columns, in table order
    pub fn names(&self) -> Vec<&'static str> {
        let mut names = Vec::new();
        if self.id {
            names.push("id");
        }
        if self.created_at {
            names.push("created_at");
        }
        if self.updated_at {
            names.push("updated_at");
        }
        names
    }
}

impl Default for AutoColumns {
    fn default() -> Self {
        Self {
            id: true,
            created_at: true,
            updated_at: true,
        }
    }
}

/// Configuration for the table store
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// PostgreSQL database URL
    pub database_url: String,
    /// Name of the table metadata table (default: "__table")
    pub metadata_table: String,
    /// Auto-managed columns configuration
    pub auto_columns: AutoColumns,
}

impl EngineConfig {
    /// Create a new configuration builder
    pub fn builder(database_url: impl Into<String>) -> EngineConfigBuilder {
        EngineConfigBuilder::new(database_url)
    }
}

/// Builder for EngineConfig
#[derive(Debug)]
pub struct EngineConfigBuilder {
    database_url: String,
    metadata_table: String,
    auto_columns: AutoColumns,
}

impl EngineConfigBuilder {
    /// Create a new builder with the database URL
    pub fn new(database_url: impl Into<String>) -> Self {
        Self {
            database_url: database_url.into(),
            metadata_table: "__table".to_string(),
            auto_columns: AutoColumns::default(),
        }
    }

    /// Set the metadata table name (default: "__table")
    pub fn metadata_table(mut self, name: impl Into<String>) -> Self {
        self.metadata_table = name.into();
        self
    }

    /// Enable or disable the auto-generated `id` column (default: true)
    pub fn auto_id(mut self, enabled: bool) -> Self {
        self.auto_columns.id = enabled;
        self
    }

    /// Enable or disable the auto-managed `created_at` column (default: true)
    pub fn auto_created_at(mut self, enabled: bool) -> Self {
        self.auto_columns.created_at = enabled;
        self
    }

    /// Enable or disable the auto-managed `updated_at` column (default: true)
    pub fn auto_updated_at(mut self, enabled: bool) -> Self {
        self.auto_columns.updated_at = enabled;
        self
    }

    /// Disable all auto-managed timestamp columns
    pub fn without_timestamps(mut self) -> Self {
        self.auto_columns.created_at = false;
        self.auto_columns.updated_at = false;
        self
    }

    /// Disable all auto-managed columns
    pub fn without_auto_columns(mut self) -> Self {
        self.auto_columns = AutoColumns {
            id: false,
            created_at: false,
            updated_at: false,
        };
        self
    }

    /// Build the configuration
    pub fn build(self) -> EngineConfig {
        EngineConfig {
            database_url: self.database_url,
            metadata_table: self.metadata_table,
            auto_columns: self.auto_columns,
        }
    }
}
