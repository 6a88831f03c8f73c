// crates/securetrack-core/src/interfaces.rs
// ============================================================================
// Module: SecureTrack Interfaces
// Description: Repository traits consumed by device collaborators.
// Purpose: Decouple command execution, contact UI, and intruder detection
//          from the storage backend.
// Dependencies: async-trait, thiserror, tokio-stream
// ============================================================================

//! ## Overview
//! One repository per record type, all backed by a single shared engine in
//! the storage crate. Every operation returns a future so callers never block
//! a latency-sensitive thread on disk I/O. Live reads return a
//! [`LiveResults`] stream that re-emits the latest result set whenever a
//! dependent table is written.
//!
//! Updates and deletes report the number of affected rows. Zero is a normal
//! outcome, not an error; callers that need existence confirmation check the
//! count or issue a point query.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::pin::Pin;

use async_trait::async_trait;
use thiserror::Error;
use tokio_stream::Stream;

use crate::records::CommandLog;
use crate::records::CommandStatus;
use crate::records::EmergencyContact;
use crate::records::IntruderLog;
use crate::records::RecordId;
use crate::retention::RetentionPolicy;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Device store errors.
///
/// # Invariants
/// - Messages never embed full record payloads.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// Backing file could not be read or written.
    #[error("device store io error: {0}")]
    Io(String),
    /// Storage engine reported an error.
    #[error("device store db error: {0}")]
    Db(String),
    /// On-disk table shape disagrees with the expected schema.
    #[error("device store schema validation failed for {table}: {diff}")]
    SchemaValidation {
        /// Table whose shape disagrees.
        table: String,
        /// Human-readable expected/found description.
        diff: String,
    },
    /// A uniqueness or not-null constraint rejected the write.
    #[error("device store constraint violation: {0}")]
    ConstraintViolation(String),
    /// A stored value could not be decoded into its typed form.
    #[error("device store decode error in {table}.{column}: {value:?}")]
    Decode {
        /// Table the value was read from.
        table: String,
        /// Column the value was read from.
        column: String,
        /// Offending stored value.
        value: String,
    },
    /// No migration path exists and destructive fallback is disabled.
    #[error("device store has no migration from version {from} to {to}")]
    MigrationMissing {
        /// Version found on disk.
        from: i64,
        /// Version expected by the code.
        to: i64,
    },
    /// Caller supplied invalid input or configuration.
    #[error("device store invalid input: {0}")]
    Invalid(String),
    /// A blocking store call was made from an async context.
    #[error("device store blocking call from async context: {0}")]
    BlockingContext(String),
    /// The store or a live query has shut down.
    #[error("device store closed: {0}")]
    Closed(String),
}

// ============================================================================
// SECTION: Live Results
// ============================================================================

/// Push-updated result sequence for a live query.
///
/// Delivery is level-triggered: a burst of writes may collapse into a single
/// emission carrying the latest state. The stream ends after yielding an
/// error or once every handle to the store has been dropped.
pub type LiveResults<T> = Pin<Box<dyn Stream<Item = Result<Vec<T>, StoreError>> + Send>>;

// ============================================================================
// SECTION: Command Log Repository
// ============================================================================

/// Command log persistence used by the command execution subsystem.
#[async_trait]
pub trait CommandLogRepository: Send + Sync {
    /// Streams every log, newest first.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the live query cannot be registered.
    fn observe_all_logs(&self) -> Result<LiveResults<CommandLog>, StoreError>;

    /// Streams the newest `limit` logs, newest first.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the live query cannot be registered.
    fn observe_recent_logs(&self, limit: u32) -> Result<LiveResults<CommandLog>, StoreError>;

    /// Loads a single log by id.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the read fails.
    async fn get_log_by_id(&self, id: RecordId) -> Result<Option<CommandLog>, StoreError>;

    /// Inserts a log and returns its id. Fails on a duplicate explicit id.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::ConstraintViolation`] on a duplicate id.
    async fn insert_log(&self, log: CommandLog) -> Result<RecordId, StoreError>;

    /// Inserts a log, replacing any existing row with the same id.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the write fails.
    async fn upsert_log(&self, log: CommandLog) -> Result<RecordId, StoreError>;

    /// Replaces the full row matching `log.id`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the write fails.
    async fn update_log(&self, log: CommandLog) -> Result<usize, StoreError>;

    /// Sets status and result message only.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the write fails.
    async fn update_log_status(
        &self,
        id: RecordId,
        status: CommandStatus,
        message: Option<String>,
    ) -> Result<usize, StoreError>;

    /// Sets the location pair only.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the write fails.
    async fn update_log_location(
        &self,
        id: RecordId,
        lat: f64,
        lng: f64,
    ) -> Result<usize, StoreError>;

    /// Deletes the row matching `log.id`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the write fails.
    async fn delete_log(&self, log: CommandLog) -> Result<usize, StoreError>;

    /// Deletes every command log.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the write fails.
    async fn clear_all_logs(&self) -> Result<usize, StoreError>;

    /// Deletes logs with a timestamp strictly before `cutoff`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the write fails.
    async fn delete_logs_older_than(&self, cutoff: i64) -> Result<usize, StoreError>;

    /// Counts logs with the given status.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the read fails.
    async fn count_by_status(&self, status: CommandStatus) -> Result<u64, StoreError>;

    /// Applies a retention policy relative to `now` (unix milliseconds).
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the sweep fails.
    async fn apply_retention(&self, policy: RetentionPolicy, now: i64) -> Result<usize, StoreError> {
        match policy.cutoff(now) {
            Some(cutoff) => self.delete_logs_older_than(cutoff).await,
            None => Ok(0),
        }
    }
}

// ============================================================================
// SECTION: Emergency Contact Repository
// ============================================================================

/// Emergency contact persistence used by the contact management UI.
#[async_trait]
pub trait EmergencyContactRepository: Send + Sync {
    /// Streams contacts, primary first, then by name.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the live query cannot be registered.
    fn observe_contacts(&self) -> Result<LiveResults<EmergencyContact>, StoreError>;

    /// Lists contacts, primary first, then by name.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the read fails.
    async fn list_contacts(&self) -> Result<Vec<EmergencyContact>, StoreError>;

    /// Returns the first contact flagged primary.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the read fails.
    async fn get_primary_contact(&self) -> Result<Option<EmergencyContact>, StoreError>;

    /// Loads a contact by id.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the read fails.
    async fn get_contact_by_id(
        &self,
        id: RecordId,
    ) -> Result<Option<EmergencyContact>, StoreError>;

    /// Inserts a contact and returns its id.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::ConstraintViolation`] on a duplicate id.
    async fn insert_contact(&self, contact: EmergencyContact) -> Result<RecordId, StoreError>;

    /// Inserts a contact, replacing any existing row with the same id.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the write fails.
    async fn upsert_contact(&self, contact: EmergencyContact) -> Result<RecordId, StoreError>;

    /// Replaces the full row matching `contact.id`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the write fails.
    async fn update_contact(&self, contact: EmergencyContact) -> Result<usize, StoreError>;

    /// Deletes the row matching `contact.id`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the write fails.
    async fn delete_contact(&self, contact: EmergencyContact) -> Result<usize, StoreError>;

    /// Deletes the contact with the given id.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the write fails.
    async fn delete_contact_by_id(&self, id: RecordId) -> Result<usize, StoreError>;

    /// Clears the primary flag on every contact.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the write fails.
    async fn clear_primary_status(&self) -> Result<usize, StoreError>;

    /// Makes `id` the only primary contact, atomically.
    ///
    /// Returns false when no contact has that id; the previous primary flags
    /// are still cleared in that case.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the transaction fails.
    async fn set_primary_contact(&self, id: RecordId, now: i64) -> Result<bool, StoreError>;

    /// Counts contacts.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the read fails.
    async fn contact_count(&self) -> Result<u64, StoreError>;
}

// ============================================================================
// SECTION: Intruder Log Repository
// ============================================================================

/// Append-only intruder snapshot log used by intruder detection.
#[async_trait]
pub trait IntruderLogRepository: Send + Sync {
    /// Streams every intruder log, newest first.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the live query cannot be registered.
    fn observe_all_logs(&self) -> Result<LiveResults<IntruderLog>, StoreError>;

    /// Appends an intruder log and returns its id.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the write fails.
    async fn insert_log(&self, log: IntruderLog) -> Result<RecordId, StoreError>;

    /// Deletes every intruder log.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the write fails.
    async fn clear_logs(&self) -> Result<usize, StoreError>;
}
