//! Embedded, versioned schema migrations.
//!
//! The SQL under `migrations/` is compiled into the binary. Applied versions are
//! recorded in `__diesel_schema_migrations`, so running [`run_pending`] twice
//! is a no-op. Each migration runs inside its own transaction; SQLite DDL is
//! transactional, so a failure (for example tables that already exist without
//! being tracked) leaves no partial schema behind.

use diesel::SqliteConnection;
use diesel_migrations::{EmbeddedMigrations, MigrationHarness, embed_migrations};
use tracing::info;

use crate::error::StoreError;

pub const MIGRATIONS: EmbeddedMigrations = embed_migrations!("migrations");

/// Applied and pending migration versions, oldest first.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct MigrationStatus {
    pub applied: Vec<String>,
    pub pending: Vec<String>,
}

impl MigrationStatus {
    pub fn is_up_to_date(&self) -> bool {
        self.pending.is_empty()
    }
}

/// Apply every pending migration and return the versions that ran.
pub fn run_pending(conn: &mut SqliteConnection) -> Result<Vec<String>, StoreError> {
    let versions: Vec<String> = conn
        .run_pending_migrations(MIGRATIONS)
        .map_err(StoreError::Migration)?
        .into_iter()
        .map(|version| version.to_string())
        .collect();

    if versions.is_empty() {
        info!("Schema is up to date");
    } else {
        info!("Applied migrations: {}", versions.join(", "));
    }
    Ok(versions)
}

/// Tear down the most recent migration and return its version.
pub fn revert_last(conn: &mut SqliteConnection) -> Result<String, StoreError> {
    let version = conn
        .revert_last_migration(MIGRATIONS)
        .map_err(StoreError::Migration)?
        .to_string();
    info!("Reverted migration {}", version);
    Ok(version)
}

pub fn status(conn: &mut SqliteConnection) -> Result<MigrationStatus, StoreError> {
    let mut applied: Vec<String> = conn
        .applied_migrations()
        .map_err(StoreError::Migration)?
        .into_iter()
        .map(|version| version.to_string())
        .collect();
    applied.sort();

    let pending = conn
        .pending_migrations(MIGRATIONS)
        .map_err(StoreError::Migration)?
        .iter()
        .map(|migration| migration.name().version().to_string())
        .collect();

    Ok(MigrationStatus { applied, pending })
}
