// crates/securetrack-store-sqlite/src/store.rs
// ============================================================================
// Module: SQLite Device Store
// Description: Async facade over the SQLite engine.
// Purpose: Expose every store operation as a future and hand out repositories.
// Dependencies: rusqlite, securetrack-core, tokio
// ============================================================================

//! ## Overview
//! [`SqliteStore`] pairs a shared [`Database`] with the runtime it was opened
//! on. Every operation runs on that runtime's blocking pool, so awaiting a
//! store call never stalls an async worker. Clones share the engine and the
//! invalidation tracker, which is what lets a write made through one
//! repository re-trigger live queries held by another.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;

use rusqlite::Row;
use rusqlite::Transaction;
use rusqlite::types::Value;
use securetrack_core::RecordId;
use tokio::runtime::Handle;

use crate::codec::Entity;
use crate::config::SqliteStoreConfig;
use crate::engine::Database;
use crate::engine::DatabaseBuilder;
use crate::error::SqliteStoreError;
use crate::executor::offload;
use crate::live::LiveQuery;
use crate::live::QuerySpec;
use crate::live::spawn_live_query;
use crate::migration::OpenOutcome;
use crate::repository::SqliteCommandLogRepository;
use crate::repository::SqliteEmergencyContactRepository;
use crate::repository::SqliteIntruderLogRepository;
use crate::schema::Table;
use crate::tracker::InvalidationObserver;

// ============================================================================
// SECTION: Store
// ============================================================================

/// Async device store backed by `SQLite`.
#[derive(Clone)]
pub struct SqliteStore {
    /// Shared engine.
    database: Arc<Database>,
    /// Runtime whose blocking pool runs store work.
    runtime: Handle,
}

impl SqliteStore {
    /// Opens the store with the device schema.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError`] when called outside a tokio runtime or
    /// when the open fails.
    pub async fn open(config: SqliteStoreConfig) -> Result<Self, SqliteStoreError> {
        Self::open_with(Database::builder(config)).await
    }

    /// Opens the store from a prepared builder (migrations, callbacks).
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError`] when called outside a tokio runtime or
    /// when the open fails.
    pub async fn open_with(builder: DatabaseBuilder) -> Result<Self, SqliteStoreError> {
        let runtime = Handle::try_current().map_err(|_| {
            SqliteStoreError::Invalid("store must be opened inside a tokio runtime".to_string())
        })?;
        let database = offload(&runtime, "open", move || builder.open()).await?;
        Ok(Self::from_database(Arc::new(database), runtime))
    }

    /// Wraps an engine opened elsewhere.
    #[must_use]
    pub const fn from_database(database: Arc<Database>, runtime: Handle) -> Self {
        Self {
            database,
            runtime,
        }
    }

    /// Returns the shared engine.
    #[must_use]
    pub const fn database(&self) -> &Arc<Database> {
        &self.database
    }

    /// Returns how the gate opened the file.
    #[must_use]
    pub fn open_outcome(&self) -> OpenOutcome {
        self.database.open_outcome()
    }

    /// Runs `work` against the engine on the blocking pool.
    async fn run<R, F>(&self, operation: &'static str, work: F) -> Result<R, SqliteStoreError>
    where
        F: FnOnce(&Database) -> Result<R, SqliteStoreError> + Send + 'static,
        R: Send + 'static,
    {
        let database = Arc::clone(&self.database);
        offload(&self.runtime, operation, move || work(&database)).await
    }

    // ------------------------------------------------------------------------
    // Writes
    // ------------------------------------------------------------------------

    /// Inserts a record and returns its id.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError::ConstraintViolation`] on a duplicate id.
    pub async fn insert<E: Entity>(&self, record: E) -> Result<RecordId, SqliteStoreError> {
        self.run("insert", move |database| database.insert(&record)).await
    }

    /// Inserts a record, replacing any row with the same id.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError`] when the write fails.
    pub async fn upsert<E: Entity>(&self, record: E) -> Result<RecordId, SqliteStoreError> {
        self.run("upsert", move |database| database.upsert(&record)).await
    }

    /// Inserts every record atomically.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError`] from the first failing insert; nothing is
    /// written in that case.
    pub async fn insert_all<E: Entity>(
        &self,
        records: Vec<E>,
    ) -> Result<Vec<RecordId>, SqliteStoreError> {
        self.run("insert_all", move |database| database.insert_all(&records)).await
    }

    /// Replaces the full row matching the record id.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError`] when the write fails.
    pub async fn update<E: Entity>(&self, record: E) -> Result<usize, SqliteStoreError> {
        self.run("update", move |database| database.update(&record)).await
    }

    /// Deletes the row matching the record id.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError`] when the write fails.
    pub async fn delete<E: Entity>(&self, record: E) -> Result<usize, SqliteStoreError> {
        self.run("delete", move |database| database.delete(&record)).await
    }

    /// Deletes the row with the given id.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError`] when the write fails.
    pub async fn delete_by_id<E: Entity>(&self, id: RecordId) -> Result<usize, SqliteStoreError> {
        self.run("delete_by_id", move |database| database.delete_by_id::<E>(id)).await
    }

    /// Runs a narrow write statement against `table`.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError`] when the statement fails.
    pub async fn execute(
        &self,
        table: Table,
        sql: impl Into<String>,
        params: Vec<Value>,
    ) -> Result<usize, SqliteStoreError> {
        let sql = sql.into();
        self.run("execute", move |database| database.execute(table, &sql, &params)).await
    }

    /// Deletes every row of one table.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError`] when the write fails.
    pub async fn clear_table(&self, table: Table) -> Result<usize, SqliteStoreError> {
        self.run("clear_table", move |database| database.clear_table(table)).await
    }

    /// Empties every managed table, then checkpoints and compacts.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError`] when the delete or maintenance fails.
    pub async fn clear_all(&self) -> Result<(), SqliteStoreError> {
        self.run("clear_all", Database::clear_all).await
    }

    /// Runs `work` in one transaction, invalidating `tables` on commit.
    ///
    /// # Errors
    ///
    /// Returns the error from `work` unchanged after rolling back.
    pub async fn run_in_transaction<R, F>(
        &self,
        tables: Vec<Table>,
        work: F,
    ) -> Result<R, SqliteStoreError>
    where
        F: FnOnce(&Transaction<'_>) -> Result<R, SqliteStoreError> + Send + 'static,
        R: Send + 'static,
    {
        self.run("transaction", move |database| database.run_in_transaction(&tables, work)).await
    }

    // ------------------------------------------------------------------------
    // Reads
    // ------------------------------------------------------------------------

    /// Loads a record by id.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError`] when the read or decode fails.
    pub async fn get<E: Entity>(&self, id: RecordId) -> Result<Option<E>, SqliteStoreError> {
        self.run("get", move |database| database.get::<E>(id)).await
    }

    /// Runs a one-shot query decoding every row as `E`.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError`] when the read or a decode fails.
    pub async fn query_entities<E: Entity>(
        &self,
        spec: QuerySpec,
    ) -> Result<Vec<E>, SqliteStoreError> {
        self.run("query", move |database| database.query_list(&spec.sql, &spec.params, E::from_row))
            .await
    }

    /// Runs a one-shot query decoding the first row as `E`.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError`] when the read or decode fails.
    pub async fn query_entity<E: Entity>(
        &self,
        spec: QuerySpec,
    ) -> Result<Option<E>, SqliteStoreError> {
        self.run("query", move |database| database.query_one(&spec.sql, &spec.params, E::from_row))
            .await
    }

    /// Runs a one-shot query returning a single integer.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError`] when the read fails.
    pub async fn query_scalar(&self, spec: QuerySpec) -> Result<i64, SqliteStoreError> {
        self.run("query", move |database| database.query_scalar(&spec.sql, &spec.params)).await
    }

    // ------------------------------------------------------------------------
    // Live
    // ------------------------------------------------------------------------

    /// Starts a live query with a custom row decoder.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError::Invalid`] when the query declares no tables.
    pub fn live_query<T, F>(
        &self,
        spec: QuerySpec,
        decode: F,
    ) -> Result<LiveQuery<T>, SqliteStoreError>
    where
        T: Send + 'static,
        F: Fn(&Row<'_>) -> Result<T, SqliteStoreError> + Send + Sync + 'static,
    {
        spawn_live_query(&self.database, &self.runtime, spec, decode)
    }

    /// Starts a live query decoding every row as `E`.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError::Invalid`] when the query declares no tables.
    pub fn live_entities<E: Entity>(
        &self,
        spec: QuerySpec,
    ) -> Result<LiveQuery<E>, SqliteStoreError> {
        self.live_query(spec, E::from_row)
    }

    /// Registers a raw invalidation observer for `tables`.
    #[must_use]
    pub fn observe_tables(&self, tables: Vec<Table>) -> InvalidationObserver {
        self.database.observe(tables)
    }

    // ------------------------------------------------------------------------
    // Repositories
    // ------------------------------------------------------------------------

    /// Returns the command log repository.
    #[must_use]
    pub fn command_logs(&self) -> SqliteCommandLogRepository {
        SqliteCommandLogRepository::new(self.clone())
    }

    /// Returns the emergency contact repository.
    #[must_use]
    pub fn emergency_contacts(&self) -> SqliteEmergencyContactRepository {
        SqliteEmergencyContactRepository::new(self.clone())
    }

    /// Returns the intruder log repository.
    #[must_use]
    pub fn intruder_logs(&self) -> SqliteIntruderLogRepository {
        SqliteIntruderLogRepository::new(self.clone())
    }
}
