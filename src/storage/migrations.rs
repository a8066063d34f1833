//! Database migrations and compatibility

use crate::error::{PercolatorError, Result};
use crate::storage::schema::*;
use rusqlite::{Connection, OptionalExtension};

/// One schema step, applied at most once per database
struct Migration {
    version: &'static str,
    description: &'static str,
    sql: &'static str,
}

/// Database migration manager
pub struct MigrationManager {
    migrations: Vec<Migration>,
}

impl Default for MigrationManager {
    fn default() -> Self {
        Self::new()
    }
}

impl MigrationManager {
    pub fn new() -> Self {
        Self {
            migrations: vec![
                Migration {
                    version: "initial_schema",
                    description: "Query records and their indexed terms",
                    sql: CREATE_RECORD_TABLES,
                },
                Migration {
                    version: "add_lookup_indices",
                    description: "Indices for deletion tags, ids and term lookups",
                    sql: CREATE_LOOKUP_INDEXES,
                },
            ],
        }
    }

    /// Run all pending migrations, returning how many were applied
    pub fn run_migrations(&self, connection: &mut Connection) -> Result<usize> {
        connection
            .execute_batch(CREATE_MIGRATIONS_TABLE)
            .map_err(|e| PercolatorError::Storage(format!("Failed to create migrations table: {}", e)))?;

        let applied = self.applied_versions(connection)?;
        let mut count = 0;

        for migration in &self.migrations {
            if applied.iter().any(|v| v == migration.version) {
                continue;
            }
            log::info!("Applying migration: {} - {}", migration.version, migration.description);

            let tx = connection.transaction()?;
            tx.execute_batch(migration.sql).map_err(|e| {
                PercolatorError::Storage(format!("Failed to apply migration {}: {}", migration.version, e))
            })?;
            tx.execute("INSERT INTO migrations (version) VALUES (?1)", [migration.version])
                .map_err(|e| {
                    PercolatorError::Storage(format!("Failed to record migration {}: {}", migration.version, e))
                })?;
            tx.commit()?;
            count += 1;
        }

        Ok(count)
    }

    /// Versions already applied, oldest first
    pub fn applied_versions(&self, connection: &Connection) -> Result<Vec<String>> {
        let mut stmt = connection
            .prepare("SELECT version FROM migrations ORDER BY id")
            .map_err(|e| PercolatorError::Storage(format!("Failed to prepare migration query: {}", e)))?;

        let rows = stmt
            .query_map([], |row| row.get::<_, String>(0))
            .map_err(|e| PercolatorError::Storage(format!("Failed to execute migration query: {}", e)))?;

        let mut versions = Vec::new();
        for version in rows {
            versions.push(version.map_err(|e| {
                PercolatorError::Storage(format!("Failed to read migration version: {}", e))
            })?);
        }
        Ok(versions)
    }

    /// Get current database version
    pub fn current_version(&self, connection: &Connection) -> Result<Option<String>> {
        let version = connection
            .query_row(
                "SELECT version FROM migrations ORDER BY id DESC LIMIT 1",
                [],
                |row| row.get::<_, String>(0),
            )
            .optional()
            .map_err(|e| PercolatorError::Storage(format!("Failed to query current version: {}", e)))?;
        Ok(version)
    }

    /// Check if database is up to date
    pub fn is_up_to_date(&self, connection: &Connection) -> Result<bool> {
        let latest = self.migrations.last().map(|m| m.version);
        Ok(self.current_version(connection)?.as_deref() == latest)
    }

    /// Number of schema steps this build knows about
    pub fn schema_version(&self) -> u32 {
        SCHEMA_VERSION
    }
}
