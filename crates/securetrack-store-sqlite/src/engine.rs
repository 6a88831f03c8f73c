// crates/securetrack-store-sqlite/src/engine.rs
// ============================================================================
// Module: Store Engine
// Description: Synchronous SQLite engine with a single writer and read pool.
// Purpose: Execute atomic writes, signal invalidations, and serve reads.
// Dependencies: rusqlite, tracing
// ============================================================================

//! ## Overview
//! [`Database`] owns one writer connection and a small pool of query-only
//! reader connections. Writes are serialized on the writer; readers see the
//! last committed state through WAL snapshots. Every successful write that
//! touches a table bumps that table in the [`InvalidationTracker`] after the
//! writer lock is released.
//!
//! All methods block. Async callers go through
//! [`crate::store::SqliteStore`], which offloads them to the blocking pool;
//! direct calls from an async worker are rejected unless the configuration
//! allows them. Code already running on a blocking thread wraps its calls in
//! [`Database::run_blocking`].

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::path::Path;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::MutexGuard;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;
use std::time::Duration;

use rusqlite::Connection;
use rusqlite::OpenFlags;
use rusqlite::Row;
use rusqlite::Transaction;
use rusqlite::TransactionBehavior;
use rusqlite::params_from_iter;
use rusqlite::types::Value;
use securetrack_core::RecordId;
use tracing::debug;
use tracing::info;

use crate::codec::Entity;
use crate::codec::OnConflict;
use crate::codec::delete_sql;
use crate::codec::insert_sql;
use crate::codec::select_by_id_sql;
use crate::codec::update_sql;
use crate::codec::update_values;
use crate::config::SqliteStoreConfig;
use crate::error::SqliteStoreError;
use crate::executor::blocking_section;
use crate::executor::ensure_blocking_allowed;
use crate::migration::Migration;
use crate::migration::MigrationGate;
use crate::migration::MigrationSet;
use crate::migration::OpenOutcome;
use crate::migration::StoreCallback;
use crate::schema::SchemaRegistry;
use crate::schema::Table;
use crate::tracker::InvalidationObserver;
use crate::tracker::InvalidationTracker;

// ============================================================================
// SECTION: Builder
// ============================================================================

/// Collects open-time inputs for a [`Database`].
pub struct DatabaseBuilder {
    /// Store configuration.
    config: SqliteStoreConfig,
    /// Expected schema.
    registry: SchemaRegistry,
    /// Registered migrations.
    migrations: MigrationSet,
    /// Lifecycle listeners.
    callbacks: Vec<Arc<dyn StoreCallback>>,
}

impl DatabaseBuilder {
    /// Starts a builder for the device schema.
    #[must_use]
    pub fn new(config: SqliteStoreConfig) -> Self {
        Self {
            config,
            registry: SchemaRegistry::securetrack(),
            migrations: MigrationSet::new(),
            callbacks: Vec::new(),
        }
    }

    /// Replaces the expected schema.
    #[must_use]
    pub fn registry(mut self, registry: SchemaRegistry) -> Self {
        self.registry = registry;
        self
    }

    /// Registers a migration step.
    #[must_use]
    pub fn migration(mut self, migration: Migration) -> Self {
        self.migrations.add(migration);
        self
    }

    /// Registers a lifecycle listener.
    #[must_use]
    pub fn callback(mut self, callback: Arc<dyn StoreCallback>) -> Self {
        self.callbacks.push(callback);
        self
    }

    /// Opens the store, running the migration gate.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError`] when the file cannot be opened, the
    /// schema fails validation, or no migration path exists and destructive
    /// fallback is disabled.
    pub fn open(self) -> Result<Database, SqliteStoreError> {
        let config = self.config;
        ensure_blocking_allowed(config.allow_blocking_in_async, "open")?;
        config.validate()?;
        ensure_parent_dir(&config.path)?;
        let mut writer = open_connection(&config)?;
        let gate = MigrationGate {
            registry: &self.registry,
            migrations: &self.migrations,
            callbacks: &self.callbacks,
            destructive_fallback: config.destructive_fallback,
            validate_schema: config.validate_schema,
        };
        let outcome = gate.run(&mut writer)?;
        let mut readers = Vec::with_capacity(config.read_pool_size);
        for _ in 0 .. config.read_pool_size {
            readers.push(Mutex::new(open_reader(&config)?));
        }
        debug!(
            path = %config.path.display(),
            version = self.registry.version(),
            outcome = ?outcome,
            "opened device store"
        );
        Ok(Database {
            config,
            registry: self.registry,
            writer: Mutex::new(writer),
            readers,
            next_reader: AtomicUsize::new(0),
            tracker: InvalidationTracker::new(),
            outcome,
        })
    }
}

// ============================================================================
// SECTION: Database
// ============================================================================

/// Opened device store engine.
pub struct Database {
    /// Store configuration.
    config: SqliteStoreConfig,
    /// Schema the store was opened against.
    registry: SchemaRegistry,
    /// Serialized writer connection.
    writer: Mutex<Connection>,
    /// Query-only reader connections.
    readers: Vec<Mutex<Connection>>,
    /// Round-robin cursor into `readers`.
    next_reader: AtomicUsize,
    /// Table change broadcaster.
    tracker: InvalidationTracker,
    /// How the gate opened the file.
    outcome: OpenOutcome,
}

impl Database {
    /// Starts a builder.
    #[must_use]
    pub fn builder(config: SqliteStoreConfig) -> DatabaseBuilder {
        DatabaseBuilder::new(config)
    }

    /// Opens the store with the device schema and no migrations.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError`] when the open fails.
    pub fn open(config: SqliteStoreConfig) -> Result<Self, SqliteStoreError> {
        DatabaseBuilder::new(config).open()
    }

    /// Returns the store configuration.
    #[must_use]
    pub const fn config(&self) -> &SqliteStoreConfig {
        &self.config
    }

    /// Returns how the gate opened the file.
    #[must_use]
    pub const fn open_outcome(&self) -> OpenOutcome {
        self.outcome
    }

    /// Runs synchronous engine calls from a thread that is already off the
    /// async workers, such as a `spawn_blocking` closure.
    pub fn run_blocking<R>(&self, work: impl FnOnce(&Self) -> R) -> R {
        blocking_section(|| work(self))
    }

    /// Registers an invalidation observer for `tables`.
    #[must_use]
    pub fn observe(&self, tables: Vec<Table>) -> InvalidationObserver {
        self.tracker.observe(tables)
    }

    // ------------------------------------------------------------------------
    // Writes
    // ------------------------------------------------------------------------

    /// Inserts a record and returns its id. An id of 0 is assigned.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError::ConstraintViolation`] on a duplicate id.
    pub fn insert<E: Entity>(&self, record: &E) -> Result<RecordId, SqliteStoreError> {
        self.insert_with(record, OnConflict::Abort, "insert")
    }

    /// Inserts a record, replacing any row with the same id.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError`] when the write fails.
    pub fn upsert<E: Entity>(&self, record: &E) -> Result<RecordId, SqliteStoreError> {
        self.insert_with(record, OnConflict::Replace, "upsert")
    }

    /// Inserts every record in one transaction; any failure inserts none.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError`] from the first failing insert.
    pub fn insert_all<E: Entity>(&self, records: &[E]) -> Result<Vec<RecordId>, SqliteStoreError> {
        let sql = insert_sql::<E>(OnConflict::Abort);
        self.run_in_transaction(&[E::TABLE], |tx| {
            let mut statement = tx.prepare_cached(&sql)?;
            let mut ids = Vec::with_capacity(records.len());
            for record in records {
                statement.execute(params_from_iter(record.to_values()))?;
                ids.push(tx.last_insert_rowid());
            }
            Ok(ids)
        })
    }

    /// Replaces the full row matching the record id.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError`] when the write fails.
    pub fn update<E: Entity>(&self, record: &E) -> Result<usize, SqliteStoreError> {
        self.execute(E::TABLE, &update_sql::<E>(), &update_values(record))
    }

    /// Deletes the row matching the record id.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError`] when the write fails.
    pub fn delete<E: Entity>(&self, record: &E) -> Result<usize, SqliteStoreError> {
        self.delete_by_id::<E>(record.id())
    }

    /// Deletes the row with the given id.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError`] when the write fails.
    pub fn delete_by_id<E: Entity>(&self, id: RecordId) -> Result<usize, SqliteStoreError> {
        self.execute(E::TABLE, &delete_sql::<E>(), &[Value::Integer(id)])
    }

    /// Runs a single narrow write statement against `table`.
    ///
    /// Returns the affected row count; the table is invalidated only when it
    /// is nonzero.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError`] when the statement fails.
    pub fn execute(
        &self,
        table: Table,
        sql: &str,
        params: &[Value],
    ) -> Result<usize, SqliteStoreError> {
        ensure_blocking_allowed(self.config.allow_blocking_in_async, "execute")?;
        let affected = {
            let writer = self.lock_writer()?;
            writer.prepare_cached(sql)?.execute(params_from_iter(params.iter()))?
        };
        if affected > 0 {
            self.tracker.invalidate(&[table]);
        }
        Ok(affected)
    }

    /// Deletes every row of one table.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError`] when the write fails.
    pub fn clear_table(&self, table: Table) -> Result<usize, SqliteStoreError> {
        self.execute(table, &format!("DELETE FROM `{}`", table.name()), &[])
    }

    /// Empties every managed table atomically, then checkpoints the WAL and
    /// compacts the file.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError`] when the delete, checkpoint, or vacuum
    /// fails. Rows are already gone if only maintenance failed.
    pub fn clear_all(&self) -> Result<(), SqliteStoreError> {
        ensure_blocking_allowed(self.config.allow_blocking_in_async, "clear_all")?;
        let tables = self.registry.table_ids();
        let maintenance = {
            let mut writer = self.lock_writer()?;
            let tx = writer.transaction_with_behavior(TransactionBehavior::Immediate)?;
            for table in &tables {
                tx.execute(&format!("DELETE FROM `{}`", table.name()), [])?;
            }
            tx.commit()?;
            compact(&writer)
        };
        self.tracker.invalidate(&tables);
        info!("cleared all device store tables");
        maintenance
    }

    /// Runs `work` in one immediate transaction.
    ///
    /// Commits when `work` returns `Ok`; otherwise the transaction rolls back
    /// and the error is returned unchanged. `tables` are invalidated after a
    /// successful commit.
    ///
    /// # Errors
    ///
    /// Returns the error from `work`, or a store error converted into `E`.
    pub fn run_in_transaction<R, E, F>(&self, tables: &[Table], work: F) -> Result<R, E>
    where
        E: From<SqliteStoreError>,
        F: FnOnce(&Transaction<'_>) -> Result<R, E>,
    {
        ensure_blocking_allowed(self.config.allow_blocking_in_async, "transaction")?;
        let result = {
            let mut writer = self.lock_writer()?;
            let tx = writer
                .transaction_with_behavior(TransactionBehavior::Immediate)
                .map_err(SqliteStoreError::from)?;
            let result = work(&tx)?;
            tx.commit().map_err(SqliteStoreError::from)?;
            result
        };
        self.tracker.invalidate(tables);
        Ok(result)
    }

    // ------------------------------------------------------------------------
    // Reads
    // ------------------------------------------------------------------------

    /// Loads a record by id.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError`] when the read or decode fails.
    pub fn get<E: Entity>(&self, id: RecordId) -> Result<Option<E>, SqliteStoreError> {
        self.query_one(&select_by_id_sql::<E>(), &[Value::Integer(id)], E::from_row)
    }

    /// Runs a read query and decodes every row.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError`] when the read or any decode fails.
    pub fn query_list<T, F>(
        &self,
        sql: &str,
        params: &[Value],
        decode: F,
    ) -> Result<Vec<T>, SqliteStoreError>
    where
        F: Fn(&Row<'_>) -> Result<T, SqliteStoreError>,
    {
        ensure_blocking_allowed(self.config.allow_blocking_in_async, "query")?;
        let reader = self.lock_reader()?;
        let mut statement = reader.prepare_cached(sql)?;
        let mut rows = statement.query(params_from_iter(params.iter()))?;
        let mut out = Vec::new();
        while let Some(row) = rows.next()? {
            out.push(decode(row)?);
        }
        Ok(out)
    }

    /// Runs a read query and decodes the first row, if any.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError`] when the read or decode fails.
    pub fn query_one<T, F>(
        &self,
        sql: &str,
        params: &[Value],
        decode: F,
    ) -> Result<Option<T>, SqliteStoreError>
    where
        F: Fn(&Row<'_>) -> Result<T, SqliteStoreError>,
    {
        ensure_blocking_allowed(self.config.allow_blocking_in_async, "query")?;
        let reader = self.lock_reader()?;
        let mut statement = reader.prepare_cached(sql)?;
        let mut rows = statement.query(params_from_iter(params.iter()))?;
        match rows.next()? {
            Some(row) => decode(row).map(Some),
            None => Ok(None),
        }
    }

    /// Runs a read query returning a single integer (counts and the like).
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError`] when the read fails or returns no row.
    pub fn query_scalar(&self, sql: &str, params: &[Value]) -> Result<i64, SqliteStoreError> {
        ensure_blocking_allowed(self.config.allow_blocking_in_async, "query")?;
        let reader = self.lock_reader()?;
        let value = reader.prepare_cached(sql)?.query_row(params_from_iter(params.iter()), |row| {
            row.get(0)
        })?;
        Ok(value)
    }

    // ------------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------------

    /// Shared body of insert and upsert.
    fn insert_with<E: Entity>(
        &self,
        record: &E,
        conflict: OnConflict,
        operation: &'static str,
    ) -> Result<RecordId, SqliteStoreError> {
        ensure_blocking_allowed(self.config.allow_blocking_in_async, operation)?;
        let id = {
            let writer = self.lock_writer()?;
            writer.prepare_cached(&insert_sql::<E>(conflict))?.execute(params_from_iter(
                record.to_values(),
            ))?;
            writer.last_insert_rowid()
        };
        self.tracker.invalidate(&[E::TABLE]);
        Ok(id)
    }

    /// Locks the writer connection.
    fn lock_writer(&self) -> Result<MutexGuard<'_, Connection>, SqliteStoreError> {
        self.writer.lock().map_err(|_| SqliteStoreError::Db("mutex poisoned".to_string()))
    }

    /// Locks the next reader connection in round-robin order.
    fn lock_reader(&self) -> Result<MutexGuard<'_, Connection>, SqliteStoreError> {
        let index = self.next_reader.fetch_add(1, Ordering::Relaxed) % self.readers.len();
        self.readers[index].lock().map_err(|_| SqliteStoreError::Db("mutex poisoned".to_string()))
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Ensures the parent directory for the store exists.
fn ensure_parent_dir(path: &Path) -> Result<(), SqliteStoreError> {
    let Some(parent) = path.parent() else {
        return Err(SqliteStoreError::Io("store path missing parent directory".to_string()));
    };
    if parent.as_os_str().is_empty() {
        return Ok(());
    }
    std::fs::create_dir_all(parent).map_err(|err| SqliteStoreError::Io(err.to_string()))
}

/// Opens the writer connection with durability pragmas.
fn open_connection(config: &SqliteStoreConfig) -> Result<Connection, SqliteStoreError> {
    let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
        | OpenFlags::SQLITE_OPEN_CREATE
        | OpenFlags::SQLITE_OPEN_FULL_MUTEX;
    let connection = Connection::open_with_flags(&config.path, flags)
        .map_err(|err| SqliteStoreError::Io(err.to_string()))?;
    apply_pragmas(&connection, config)?;
    Ok(connection)
}

/// Opens a query-only reader connection.
fn open_reader(config: &SqliteStoreConfig) -> Result<Connection, SqliteStoreError> {
    let flags = OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_FULL_MUTEX;
    let connection = Connection::open_with_flags(&config.path, flags)
        .map_err(|err| SqliteStoreError::Io(err.to_string()))?;
    connection.busy_timeout(Duration::from_millis(config.busy_timeout_ms))?;
    connection.execute_batch("PRAGMA query_only = ON;")?;
    Ok(connection)
}

/// Applies `SQLite` pragmas required for durability.
fn apply_pragmas(
    connection: &Connection,
    config: &SqliteStoreConfig,
) -> Result<(), SqliteStoreError> {
    connection.execute_batch("PRAGMA foreign_keys = ON;")?;
    connection
        .execute_batch(&format!("PRAGMA journal_mode = {};", config.journal_mode.pragma_value()))?;
    connection
        .execute_batch(&format!("PRAGMA synchronous = {};", config.sync_mode.pragma_value()))?;
    connection.busy_timeout(Duration::from_millis(config.busy_timeout_ms))?;
    Ok(())
}

/// Checkpoints the WAL and vacuums when no transaction is open.
fn compact(connection: &Connection) -> Result<(), SqliteStoreError> {
    connection.query_row("PRAGMA wal_checkpoint(FULL)", [], |_| Ok(()))?;
    if connection.is_autocommit() {
        connection.execute_batch("VACUUM")?;
    }
    Ok(())
}
