// crates/securetrack-store-sqlite/src/migration.rs
// ============================================================================
// Module: Migration Gate
// Description: Open-time schema creation, migration, and destructive fallback.
// Purpose: Bring any on-disk file to the registry shape or fail the open.
// Dependencies: rusqlite, tracing
// ============================================================================

//! ## Overview
//! The gate runs once per open, inside a single immediate transaction, so a
//! file is never left half-migrated:
//! - No managed tables and no marker: create every table.
//! - Managed tables but no marker: validate the existing shape and stamp it.
//! - Same version and fingerprint: open as-is.
//! - Anything else: follow registered migrations from the stored version to
//!   the registry version, or drop and recreate every table when no path
//!   exists and destructive fallback is enabled.
//!
//! The schema version lives in `PRAGMA user_version`; the fingerprint lives
//! in the single-row marker table.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;

use rusqlite::Connection;
use rusqlite::OptionalExtension;
use rusqlite::Transaction;
use rusqlite::TransactionBehavior;
use rusqlite::params;
use tracing::debug;
use tracing::info;
use tracing::warn;

use crate::error::SqliteStoreError;
use crate::schema::MASTER_ROW_ID;
use crate::schema::MASTER_TABLE;
use crate::schema::SchemaRegistry;
use crate::schema::TableInfo;

// ============================================================================
// SECTION: Migrations
// ============================================================================

/// Boxed migration body.
type MigrationFn = dyn Fn(&Transaction<'_>) -> rusqlite::Result<()> + Send + Sync;

/// A single version step applied inside the open transaction.
pub struct Migration {
    /// Version the step starts from.
    from: i64,
    /// Version the step arrives at.
    to: i64,
    /// Step body.
    apply: Box<MigrationFn>,
}

impl Migration {
    /// Creates a migration from a closure.
    pub fn new<F>(from: i64, to: i64, apply: F) -> Self
    where
        F: Fn(&Transaction<'_>) -> rusqlite::Result<()> + Send + Sync + 'static,
    {
        Self {
            from,
            to,
            apply: Box::new(apply),
        }
    }

    /// Creates a migration that runs a fixed SQL batch.
    pub fn sql(from: i64, to: i64, sql: impl Into<String>) -> Self {
        let sql = sql.into();
        Self::new(from, to, move |tx| tx.execute_batch(&sql))
    }

    /// Returns the starting version.
    #[must_use]
    pub const fn from_version(&self) -> i64 {
        self.from
    }

    /// Returns the target version.
    #[must_use]
    pub const fn to_version(&self) -> i64 {
        self.to
    }
}

impl fmt::Debug for Migration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Migration").field("from", &self.from).field("to", &self.to).finish()
    }
}

/// Registered migrations, searched for a path at open time.
#[derive(Debug, Default)]
pub struct MigrationSet {
    /// Registered steps.
    migrations: Vec<Migration>,
}

impl MigrationSet {
    /// Creates an empty set.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            migrations: Vec::new(),
        }
    }

    /// Registers a step. A later step with the same endpoints replaces the
    /// earlier one.
    pub fn add(&mut self, migration: Migration) {
        self.migrations
            .retain(|existing| existing.from != migration.from || existing.to != migration.to);
        self.migrations.push(migration);
    }

    /// Finds an ordered path from `start` to `end`.
    ///
    /// Each step takes the longest jump that does not pass `end`, in either
    /// direction. Returns `None` when no path exists.
    #[must_use]
    pub fn find_path(&self, start: i64, end: i64) -> Option<Vec<&Migration>> {
        let upgrade = end > start;
        let mut current = start;
        let mut path = Vec::new();
        while current != end {
            let candidates = self.migrations.iter().filter(|step| step.from == current);
            let next = if upgrade {
                candidates
                    .filter(|step| step.to > current && step.to <= end)
                    .max_by_key(|step| step.to)
            } else {
                candidates
                    .filter(|step| step.to < current && step.to >= end)
                    .min_by_key(|step| step.to)
            }?;
            path.push(next);
            current = next.to;
        }
        Some(path)
    }
}

// ============================================================================
// SECTION: Callbacks
// ============================================================================

/// Lifecycle hooks invoked by the gate.
///
/// `on_create` and `on_destructive_migration` run inside the open
/// transaction; `on_open` runs after it commits.
pub trait StoreCallback: Send + Sync {
    /// Tables were created on a fresh file.
    fn on_create(&self, _connection: &Connection) {}

    /// The store finished opening.
    fn on_open(&self, _connection: &Connection) {}

    /// Every table was dropped and recreated.
    fn on_destructive_migration(&self, _connection: &Connection) {}
}

// ============================================================================
// SECTION: Outcome
// ============================================================================

/// How the gate brought the file to the registry shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenOutcome {
    /// Fresh file; tables were created.
    Created,
    /// Version and fingerprint matched.
    Opened,
    /// Registered migrations ran.
    Migrated {
        /// Version found on disk.
        from: i64,
        /// Registry version.
        to: i64,
    },
    /// Tables were dropped and recreated.
    Destructive {
        /// Version found on disk.
        from: i64,
        /// Registry version.
        to: i64,
    },
    /// Pre-existing tables without a marker were validated and stamped.
    Adopted,
}

// ============================================================================
// SECTION: Gate
// ============================================================================

/// Inputs to a single gate run.
pub(crate) struct MigrationGate<'a> {
    /// Expected schema.
    pub registry: &'a SchemaRegistry,
    /// Registered migrations.
    pub migrations: &'a MigrationSet,
    /// Lifecycle listeners.
    pub callbacks: &'a [Arc<dyn StoreCallback>],
    /// Drop and recreate when no path exists.
    pub destructive_fallback: bool,
    /// Validate table shapes on an ordinary open.
    pub validate_schema: bool,
}

impl MigrationGate<'_> {
    /// Runs the gate against the writer connection.
    pub(crate) fn run(&self, connection: &mut Connection) -> Result<OpenOutcome, SqliteStoreError> {
        let tx = connection.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let stored_version: i64 = tx.query_row("PRAGMA user_version", [], |row| row.get(0))?;
        let stored_hash = read_identity_hash(&tx)?;
        let expected_version = self.registry.version();
        let expected_hash = self.registry.fingerprint();
        debug!(
            stored_version,
            expected_version,
            stored_hash = stored_hash.as_deref().unwrap_or(""),
            "schema gate inspecting store"
        );

        let outcome = if stored_version == 0 && stored_hash.is_none() {
            if self.has_managed_tables(&tx)? {
                validate_tables(&tx, self.registry)?;
                info!("adopting existing tables without a schema marker");
                OpenOutcome::Adopted
            } else {
                self.create_tables(&tx)?;
                for callback in self.callbacks {
                    callback.on_create(&tx);
                }
                info!(version = expected_version, "created store schema");
                OpenOutcome::Created
            }
        } else if stored_version == expected_version {
            match stored_hash {
                Some(hash) if hash == expected_hash => {
                    if self.validate_schema {
                        validate_tables(&tx, self.registry)?;
                    }
                    OpenOutcome::Opened
                }
                None => {
                    validate_tables(&tx, self.registry)?;
                    info!("stamping schema marker on versioned store");
                    OpenOutcome::Adopted
                }
                Some(_) => self.fall_back(&tx, stored_version)?,
            }
        } else {
            match self.migrations.find_path(stored_version, expected_version) {
                Some(path) => {
                    for step in path {
                        debug!(from = step.from, to = step.to, "applying migration");
                        (step.apply)(&tx)?;
                    }
                    validate_tables(&tx, self.registry)?;
                    info!(from = stored_version, to = expected_version, "migrated store schema");
                    OpenOutcome::Migrated {
                        from: stored_version,
                        to: expected_version,
                    }
                }
                None => self.fall_back(&tx, stored_version)?,
            }
        };

        write_identity_hash(&tx, &expected_hash)?;
        tx.execute_batch(&format!("PRAGMA user_version = {expected_version};"))?;
        tx.commit()?;
        for callback in self.callbacks {
            callback.on_open(connection);
        }
        Ok(outcome)
    }

    /// Drops and recreates every table, or refuses when fallback is off.
    fn fall_back(
        &self,
        tx: &Transaction<'_>,
        stored_version: i64,
    ) -> Result<OpenOutcome, SqliteStoreError> {
        let expected_version = self.registry.version();
        if !self.destructive_fallback {
            return Err(SqliteStoreError::MigrationMissing {
                from: stored_version,
                to: expected_version,
            });
        }
        warn!(
            from = stored_version,
            to = expected_version,
            "no migration path; dropping all tables"
        );
        for spec in self.registry.tables() {
            tx.execute_batch(&spec.drop_sql())?;
        }
        self.create_tables(tx)?;
        for callback in self.callbacks {
            callback.on_destructive_migration(tx);
        }
        Ok(OpenOutcome::Destructive {
            from: stored_version,
            to: expected_version,
        })
    }

    /// Creates every registry table.
    fn create_tables(&self, tx: &Transaction<'_>) -> Result<(), SqliteStoreError> {
        for spec in self.registry.tables() {
            tx.execute_batch(&spec.create_sql())?;
        }
        Ok(())
    }

    /// Returns true when any registry table already exists.
    fn has_managed_tables(&self, tx: &Transaction<'_>) -> Result<bool, SqliteStoreError> {
        for spec in self.registry.tables() {
            if table_exists(tx, spec.table.name())? {
                return Ok(true);
            }
        }
        Ok(false)
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Compares every registry table against its on-disk shape.
pub(crate) fn validate_tables(
    connection: &Connection,
    registry: &SchemaRegistry,
) -> Result<(), SqliteStoreError> {
    for spec in registry.tables() {
        let expected = spec.expected_info();
        let found = TableInfo::read(connection, spec.table.name())?;
        if expected != found {
            return Err(SqliteStoreError::SchemaValidation {
                table: spec.table.name().to_string(),
                diff: expected.diff(&found),
            });
        }
    }
    Ok(())
}

/// Returns true when a table with the given name exists.
fn table_exists(connection: &Connection, name: &str) -> Result<bool, SqliteStoreError> {
    let count: i64 = connection.query_row(
        "SELECT count(*) FROM sqlite_master WHERE type = 'table' AND name = ?1",
        params![name],
        |row| row.get(0),
    )?;
    Ok(count > 0)
}

/// Reads the stored fingerprint, if the marker table and row exist.
fn read_identity_hash(connection: &Connection) -> Result<Option<String>, SqliteStoreError> {
    if !table_exists(connection, MASTER_TABLE)? {
        return Ok(None);
    }
    let hash: Option<Option<String>> = connection
        .query_row(
            &format!("SELECT identity_hash FROM {MASTER_TABLE} WHERE id = ?1 LIMIT 1"),
            params![MASTER_ROW_ID],
            |row| row.get(0),
        )
        .optional()?;
    Ok(hash.flatten())
}

/// Writes the fingerprint into the marker table.
fn write_identity_hash(connection: &Connection, hash: &str) -> Result<(), SqliteStoreError> {
    connection.execute_batch(&format!(
        "CREATE TABLE IF NOT EXISTS {MASTER_TABLE} (id INTEGER PRIMARY KEY,identity_hash TEXT)"
    ))?;
    connection.execute(
        &format!("INSERT OR REPLACE INTO {MASTER_TABLE} (id,identity_hash) VALUES(?1, ?2)"),
        params![MASTER_ROW_ID, hash],
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::Migration;
    use super::MigrationSet;

    fn set(steps: &[(i64, i64)]) -> MigrationSet {
        let mut set = MigrationSet::new();
        for (from, to) in steps {
            set.add(Migration::sql(*from, *to, ""));
        }
        set
    }

    fn endpoints(path: Option<Vec<&Migration>>) -> Option<Vec<(i64, i64)>> {
        path.map(|steps| {
            steps.iter().map(|step| (step.from_version(), step.to_version())).collect()
        })
    }

    #[test]
    fn upgrade_prefers_longest_jump() {
        let set = set(&[(1, 2), (2, 3), (1, 3), (3, 4)]);
        assert_eq!(endpoints(set.find_path(1, 4)), Some(vec![(1, 3), (3, 4)]));
    }

    #[test]
    fn upgrade_never_overshoots() {
        let set = set(&[(1, 5), (1, 2)]);
        assert_eq!(endpoints(set.find_path(1, 2)), Some(vec![(1, 2)]));
    }

    #[test]
    fn gap_without_step_has_no_path() {
        let set = set(&[(1, 2)]);
        assert_eq!(endpoints(set.find_path(1, 3)), None);
        assert_eq!(endpoints(set.find_path(2, 1)), None);
    }

    #[test]
    fn downgrade_walks_registered_steps() {
        let set = set(&[(3, 2), (2, 1), (3, 1)]);
        assert_eq!(endpoints(set.find_path(3, 1)), Some(vec![(3, 1)]));
    }
}
