// crates/securetrack-store-sqlite/src/repository.rs
// ============================================================================
// Module: SQLite Repositories
// Description: Per-record repositories over the shared async store.
// Purpose: Implement the core repository traits with fixed statements.
// Dependencies: async-trait, rusqlite, securetrack-core
// ============================================================================

//! ## Overview
//! Each repository is a thin handle around a [`SqliteStore`] clone. Narrow
//! updates and predicate deletes are fixed statements that touch only the
//! named columns; whole-row writes go through the record codec.

// ============================================================================
// SECTION: Imports
// ============================================================================

use async_trait::async_trait;
use rusqlite::OptionalExtension;
use rusqlite::params;
use rusqlite::types::Value;
use securetrack_core::CommandLog;
use securetrack_core::CommandLogRepository;
use securetrack_core::CommandStatus;
use securetrack_core::EmergencyContact;
use securetrack_core::EmergencyContactRepository;
use securetrack_core::IntruderLog;
use securetrack_core::IntruderLogRepository;
use securetrack_core::LiveResults;
use securetrack_core::RecordId;
use securetrack_core::StoreError;

use crate::codec::Entity;
use crate::codec::encode_status;
use crate::live::QuerySpec;
use crate::schema::Table;
use crate::store::SqliteStore;

// ============================================================================
// SECTION: Statements
// ============================================================================

/// Every command log, newest first.
const SELECT_ALL_COMMAND_LOGS: &str = "SELECT * FROM command_logs ORDER BY timestamp DESC";
/// The newest command logs, bounded.
const SELECT_RECENT_COMMAND_LOGS: &str =
    "SELECT * FROM command_logs ORDER BY timestamp DESC LIMIT ?1";
/// Narrow status update.
const UPDATE_COMMAND_STATUS: &str =
    "UPDATE command_logs SET status = ?1, resultMessage = ?2 WHERE id = ?3";
/// Narrow location update.
const UPDATE_COMMAND_LOCATION: &str =
    "UPDATE command_logs SET locationLat = ?1, locationLng = ?2 WHERE id = ?3";
/// Retention sweep.
const DELETE_COMMAND_LOGS_OLDER_THAN: &str = "DELETE FROM command_logs WHERE timestamp < ?1";
/// Status histogram bucket.
const COUNT_COMMAND_LOGS_BY_STATUS: &str = "SELECT COUNT(*) FROM command_logs WHERE status = ?1";

/// Contacts, primary first then by name.
const SELECT_CONTACTS: &str = "SELECT * FROM emergency_contacts ORDER BY isPrimary DESC, name ASC";
/// First primary contact.
const SELECT_PRIMARY_CONTACT: &str = "SELECT * FROM emergency_contacts WHERE isPrimary = 1 LIMIT 1";
/// Clears every primary flag.
const CLEAR_PRIMARY_STATUS: &str = "UPDATE emergency_contacts SET isPrimary = 0";
/// Marks one contact primary.
const MARK_PRIMARY_CONTACT: &str =
    "UPDATE emergency_contacts SET isPrimary = 1, updatedAt = ?1 WHERE id = ?2";
/// Contact count.
const COUNT_CONTACTS: &str = "SELECT COUNT(*) FROM emergency_contacts";

/// Every intruder log, newest first.
const SELECT_ALL_INTRUDER_LOGS: &str = "SELECT * FROM intruder_logs ORDER BY timestamp DESC";

/// Converts a `COUNT(*)` result.
fn count(value: i64) -> u64 {
    u64::try_from(value).unwrap_or(0)
}

/// Boxes a live query as the core stream type.
fn live<E: Entity>(store: &SqliteStore, spec: QuerySpec) -> Result<LiveResults<E>, StoreError> {
    let query = store.live_entities::<E>(spec)?;
    Ok(Box::pin(query))
}

// ============================================================================
// SECTION: Command Logs
// ============================================================================

/// Command log repository.
#[derive(Clone)]
pub struct SqliteCommandLogRepository {
    /// Shared store.
    store: SqliteStore,
}

impl SqliteCommandLogRepository {
    /// Creates a repository over `store`.
    #[must_use]
    pub const fn new(store: SqliteStore) -> Self {
        Self {
            store,
        }
    }
}

#[async_trait]
impl CommandLogRepository for SqliteCommandLogRepository {
    fn observe_all_logs(&self) -> Result<LiveResults<CommandLog>, StoreError> {
        live(&self.store, QuerySpec::new([Table::CommandLogs], SELECT_ALL_COMMAND_LOGS))
    }

    fn observe_recent_logs(&self, limit: u32) -> Result<LiveResults<CommandLog>, StoreError> {
        let spec = QuerySpec::new([Table::CommandLogs], SELECT_RECENT_COMMAND_LOGS)
            .param(i64::from(limit));
        live(&self.store, spec)
    }

    async fn get_log_by_id(&self, id: RecordId) -> Result<Option<CommandLog>, StoreError> {
        Ok(self.store.get::<CommandLog>(id).await?)
    }

    async fn insert_log(&self, log: CommandLog) -> Result<RecordId, StoreError> {
        Ok(self.store.insert(log).await?)
    }

    async fn upsert_log(&self, log: CommandLog) -> Result<RecordId, StoreError> {
        Ok(self.store.upsert(log).await?)
    }

    async fn update_log(&self, log: CommandLog) -> Result<usize, StoreError> {
        Ok(self.store.update(log).await?)
    }

    async fn update_log_status(
        &self,
        id: RecordId,
        status: CommandStatus,
        message: Option<String>,
    ) -> Result<usize, StoreError> {
        let params = vec![
            encode_status(status),
            message.map_or(Value::Null, Value::Text),
            Value::Integer(id),
        ];
        Ok(self.store.execute(Table::CommandLogs, UPDATE_COMMAND_STATUS, params).await?)
    }

    async fn update_log_location(
        &self,
        id: RecordId,
        lat: f64,
        lng: f64,
    ) -> Result<usize, StoreError> {
        let params = vec![Value::Real(lat), Value::Real(lng), Value::Integer(id)];
        Ok(self.store.execute(Table::CommandLogs, UPDATE_COMMAND_LOCATION, params).await?)
    }

    async fn delete_log(&self, log: CommandLog) -> Result<usize, StoreError> {
        Ok(self.store.delete(log).await?)
    }

    async fn clear_all_logs(&self) -> Result<usize, StoreError> {
        Ok(self.store.clear_table(Table::CommandLogs).await?)
    }

    async fn delete_logs_older_than(&self, cutoff: i64) -> Result<usize, StoreError> {
        let params = vec![Value::Integer(cutoff)];
        Ok(self.store.execute(Table::CommandLogs, DELETE_COMMAND_LOGS_OLDER_THAN, params).await?)
    }

    async fn count_by_status(&self, status: CommandStatus) -> Result<u64, StoreError> {
        let spec = QuerySpec::new([Table::CommandLogs], COUNT_COMMAND_LOGS_BY_STATUS)
            .param(encode_status(status));
        Ok(count(self.store.query_scalar(spec).await?))
    }
}

// ============================================================================
// SECTION: Emergency Contacts
// ============================================================================

/// Emergency contact repository.
#[derive(Clone)]
pub struct SqliteEmergencyContactRepository {
    /// Shared store.
    store: SqliteStore,
}

impl SqliteEmergencyContactRepository {
    /// Creates a repository over `store`.
    #[must_use]
    pub const fn new(store: SqliteStore) -> Self {
        Self {
            store,
        }
    }
}

#[async_trait]
impl EmergencyContactRepository for SqliteEmergencyContactRepository {
    fn observe_contacts(&self) -> Result<LiveResults<EmergencyContact>, StoreError> {
        live(&self.store, QuerySpec::new([Table::EmergencyContacts], SELECT_CONTACTS))
    }

    async fn list_contacts(&self) -> Result<Vec<EmergencyContact>, StoreError> {
        let spec = QuerySpec::new([Table::EmergencyContacts], SELECT_CONTACTS);
        Ok(self.store.query_entities(spec).await?)
    }

    async fn get_primary_contact(&self) -> Result<Option<EmergencyContact>, StoreError> {
        let spec = QuerySpec::new([Table::EmergencyContacts], SELECT_PRIMARY_CONTACT);
        Ok(self.store.query_entity(spec).await?)
    }

    async fn get_contact_by_id(
        &self,
        id: RecordId,
    ) -> Result<Option<EmergencyContact>, StoreError> {
        Ok(self.store.get::<EmergencyContact>(id).await?)
    }

    async fn insert_contact(&self, contact: EmergencyContact) -> Result<RecordId, StoreError> {
        Ok(self.store.insert(contact).await?)
    }

    async fn upsert_contact(&self, contact: EmergencyContact) -> Result<RecordId, StoreError> {
        Ok(self.store.upsert(contact).await?)
    }

    async fn update_contact(&self, contact: EmergencyContact) -> Result<usize, StoreError> {
        Ok(self.store.update(contact).await?)
    }

    async fn delete_contact(&self, contact: EmergencyContact) -> Result<usize, StoreError> {
        Ok(self.store.delete(contact).await?)
    }

    async fn delete_contact_by_id(&self, id: RecordId) -> Result<usize, StoreError> {
        Ok(self.store.delete_by_id::<EmergencyContact>(id).await?)
    }

    async fn clear_primary_status(&self) -> Result<usize, StoreError> {
        Ok(self.store.execute(Table::EmergencyContacts, CLEAR_PRIMARY_STATUS, Vec::new()).await?)
    }

    async fn set_primary_contact(&self, id: RecordId, now: i64) -> Result<bool, StoreError> {
        let marked = self
            .store
            .run_in_transaction(vec![Table::EmergencyContacts], move |tx| {
                tx.execute(CLEAR_PRIMARY_STATUS, [])?;
                let exists = tx
                    .query_row("SELECT 1 FROM emergency_contacts WHERE id = ?1", params![id], |_| {
                        Ok(())
                    })
                    .optional()?
                    .is_some();
                if exists {
                    tx.execute(MARK_PRIMARY_CONTACT, params![now, id])?;
                }
                Ok(exists)
            })
            .await?;
        Ok(marked)
    }

    async fn contact_count(&self) -> Result<u64, StoreError> {
        let spec = QuerySpec::new([Table::EmergencyContacts], COUNT_CONTACTS);
        Ok(count(self.store.query_scalar(spec).await?))
    }
}

// ============================================================================
// SECTION: Intruder Logs
// ============================================================================

/// Intruder log repository.
#[derive(Clone)]
pub struct SqliteIntruderLogRepository {
    /// Shared store.
    store: SqliteStore,
}

impl SqliteIntruderLogRepository {
    /// Creates a repository over `store`.
    #[must_use]
    pub const fn new(store: SqliteStore) -> Self {
        Self {
            store,
        }
    }
}

#[async_trait]
impl IntruderLogRepository for SqliteIntruderLogRepository {
    fn observe_all_logs(&self) -> Result<LiveResults<IntruderLog>, StoreError> {
        live(&self.store, QuerySpec::new([Table::IntruderLogs], SELECT_ALL_INTRUDER_LOGS))
    }

    async fn insert_log(&self, log: IntruderLog) -> Result<RecordId, StoreError> {
        Ok(self.store.insert(log).await?)
    }

    async fn clear_logs(&self) -> Result<usize, StoreError> {
        Ok(self.store.clear_table(Table::IntruderLogs).await?)
    }
}
