//! Versioned schema bootstrap for PostgreSQL.
//!
//! Migrations are embedded in the binary and applied in order when a store is
//! constructed. Each table gets its own tracking table named
//! `{table}_schema_migrations`, so several price tables can share a database.
//!
//! # Usage
//!
//! ```rust,ignore
//! use priceanalyzer::storage::migrations::{Migration, MigrationRunner};
//!
//! const MIGRATIONS: &[Migration] = &[Migration {
//!     version: 1,
//!     description: "Create table",
//!     sql: "CREATE TABLE IF NOT EXISTS {table} (id BIGINT PRIMARY KEY);",
//! }];
//!
//! MigrationRunner::new(pool, "prices").run(MIGRATIONS).await?;
//! ```

use crate::{Error, Result};
use deadpool_postgres::{Object, Pool};

/// A single schema step.
#[derive(Debug, Clone, Copy)]
pub struct Migration {
    /// Sequential version, starting at 1.
    pub version: i32,
    /// Human-readable description, recorded in the tracking table.
    pub description: &'static str,
    /// Statements separated by semicolons. `{table}` is replaced by the table name.
    pub sql: &'static str,
}

impl Migration {
    /// Renders the statements for `table`, skipping empty fragments.
    #[must_use]
    pub fn statements(&self, table: &str) -> Vec<String> {
        self.sql
            .replace("{table}", table)
            .split(';')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(String::from)
            .collect()
    }
}

/// Applies pending migrations for one table.
pub struct MigrationRunner {
    pool: Pool,
    table_name: String,
}

fn migration_error(operation: impl Into<String>, e: impl std::fmt::Display) -> Error {
    Error::OperationFailed {
        operation: operation.into(),
        cause: e.to_string(),
    }
}

impl MigrationRunner {
    /// Creates a runner for `table_name`.
    #[must_use]
    pub fn new(pool: Pool, table_name: impl Into<String>) -> Self {
        Self {
            pool,
            table_name: table_name.into(),
        }
    }

    /// Name of the tracking table.
    #[must_use]
    pub fn tracking_table(&self) -> String {
        format!("{}_schema_migrations", self.table_name)
    }

    /// Applies every migration newer than the recorded version.
    ///
    /// Returns the schema version after the run.
    ///
    /// # Errors
    ///
    /// Returns an error if a connection cannot be obtained or a migration
    /// fails. A failed migration leaves no partial changes behind.
    pub async fn run(&self, migrations: &[Migration]) -> Result<i32> {
        let mut client = self
            .pool
            .get()
            .await
            .map_err(|e| migration_error("migration_get_connection", e))?;

        self.ensure_tracking_table(&client).await?;
        let mut current = self.recorded_version(&client).await?;

        for migration in migrations {
            if migration.version <= current {
                continue;
            }
            self.apply(&mut client, migration).await?;
            current = migration.version;
        }

        Ok(current)
    }

    async fn ensure_tracking_table(&self, client: &Object) -> Result<()> {
        let sql = format!(
            r"CREATE TABLE IF NOT EXISTS {} (
                version INTEGER PRIMARY KEY,
                description TEXT NOT NULL,
                applied_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
            )",
            self.tracking_table()
        );
        client
            .execute(&sql, &[])
            .await
            .map_err(|e| migration_error("create_migrations_table", e))?;
        Ok(())
    }

    async fn recorded_version(&self, client: &Object) -> Result<i32> {
        let sql = format!(
            "SELECT COALESCE(MAX(version), 0) FROM {}",
            self.tracking_table()
        );
        let row = client
            .query_one(&sql, &[])
            .await
            .map_err(|e| migration_error("migration_current_version", e))?;
        Ok(row.get(0))
    }

    /// Runs one migration and records it in the same transaction.
    async fn apply(&self, client: &mut Object, migration: &Migration) -> Result<()> {
        let version = migration.version;
        let tx = client
            .transaction()
            .await
            .map_err(|e| migration_error(format!("migration_v{version}_begin"), e))?;

        for statement in migration.statements(&self.table_name) {
            tx.execute(statement.as_str(), &[])
                .await
                .map_err(|e| {
                    migration_error(format!("migration_v{version}: {}", migration.description), e)
                })?;
        }

        let record = format!(
            "INSERT INTO {} (version, description) VALUES ($1, $2)",
            self.tracking_table()
        );
        tx.execute(record.as_str(), &[&version, &migration.description])
            .await
            .map_err(|e| migration_error("record_migration", e))?;

        tx.commit()
            .await
            .map_err(|e| migration_error(format!("migration_v{version}_commit"), e))?;

        tracing::info!(
            version,
            description = migration.description,
            table = %self.table_name,
            "Applied migration"
        );
        Ok(())
    }
}

/// Highest version in a migration set.
#[must_use]
pub fn latest_version(migrations: &[Migration]) -> i32 {
    migrations.iter().map(|m| m.version).max().unwrap_or(0)
}
