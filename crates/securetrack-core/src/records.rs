// crates/securetrack-core/src/records.rs
// ============================================================================
// Module: SecureTrack Records
// Description: Value types persisted by the device store.
// Purpose: Define command logs, emergency contacts, and intruder logs.
// Dependencies: serde, thiserror
// ============================================================================

//! ## Overview
//! Records are plain value copies. A record read from the store is never a
//! live view into storage; mutations go back through a repository.
//!
//! Identifiers are auto-assigned integers. A record whose id equals
//! [`UNASSIGNED_ID`] receives a fresh id on insert.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;
use std::str::FromStr;

use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

// ============================================================================
// SECTION: Identifiers
// ============================================================================

/// Row identifier assigned by the store.
pub type RecordId = i64;

/// Sentinel id asking the store to assign a fresh identifier.
pub const UNASSIGNED_ID: RecordId = 0;

// ============================================================================
// SECTION: Command Status
// ============================================================================

/// Execution status of a remote command.
///
/// # Invariants
/// - Storage labels are the uppercase variant names and never change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CommandStatus {
    /// Queued but not yet picked up.
    Pending,
    /// Received over the command channel.
    #[default]
    Received,
    /// Execution in progress.
    Processing,
    /// Execution finished successfully.
    Success,
    /// Execution failed.
    Failed,
    /// Sender failed authorization.
    Unauthorized,
}

impl CommandStatus {
    /// Every status, in declaration order.
    pub const ALL: [Self; 6] = [
        Self::Pending,
        Self::Received,
        Self::Processing,
        Self::Success,
        Self::Failed,
        Self::Unauthorized,
    ];

    /// Returns the storage label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Received => "RECEIVED",
            Self::Processing => "PROCESSING",
            Self::Success => "SUCCESS",
            Self::Failed => "FAILED",
            Self::Unauthorized => "UNAUTHORIZED",
        }
    }

    /// Returns true once no further status transitions are expected.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Success | Self::Failed | Self::Unauthorized)
    }
}

impl fmt::Display for CommandStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Raised when a status label is not one of the known variants.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown command status: {0:?}")]
pub struct UnknownStatus(pub String);

impl FromStr for CommandStatus {
    type Err = UnknownStatus;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|status| status.as_str() == value)
            .ok_or_else(|| UnknownStatus(value.to_string()))
    }
}

// ============================================================================
// SECTION: Emergency Contact
// ============================================================================

/// Trusted phone number used for alerts and recovery.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmergencyContact {
    /// Store-assigned identifier.
    pub id: RecordId,
    /// Display name.
    pub name: String,
    /// Phone number in the form entered by the user.
    pub phone_number: String,
    /// Whether this contact is flagged primary.
    pub is_primary: bool,
    /// Creation time in unix milliseconds.
    pub created_at: i64,
    /// Last update time in unix milliseconds.
    pub updated_at: i64,
}

impl EmergencyContact {
    /// Creates an unsaved contact stamped with `now`.
    #[must_use]
    pub fn new(name: impl Into<String>, phone_number: impl Into<String>, now: i64) -> Self {
        Self {
            id: UNASSIGNED_ID,
            name: name.into(),
            phone_number: phone_number.into(),
            is_primary: false,
            created_at: now,
            updated_at: now,
        }
    }

    /// Returns a copy with the primary flag set.
    #[must_use]
    pub fn primary(mut self) -> Self {
        self.is_primary = true;
        self
    }
}

// ============================================================================
// SECTION: Command Log
// ============================================================================

/// A remote command received by the device and its execution outcome.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandLog {
    /// Store-assigned identifier.
    pub id: RecordId,
    /// Command text as received.
    pub command: String,
    /// Phone number of the sender.
    pub sender_number: String,
    /// Receipt time in unix milliseconds.
    pub timestamp: i64,
    /// Execution status.
    pub status: CommandStatus,
    /// Optional human-readable outcome.
    pub result_message: Option<String>,
    /// Latitude of the last location fix, when one was taken.
    pub location_lat: Option<f64>,
    /// Longitude of the last location fix, when one was taken.
    pub location_lng: Option<f64>,
}

impl CommandLog {
    /// Creates an unsaved log entry with status [`CommandStatus::Received`].
    #[must_use]
    pub fn received(
        command: impl Into<String>,
        sender_number: impl Into<String>,
        timestamp: i64,
    ) -> Self {
        Self {
            id: UNASSIGNED_ID,
            command: command.into(),
            sender_number: sender_number.into(),
            timestamp,
            status: CommandStatus::Received,
            result_message: None,
            location_lat: None,
            location_lng: None,
        }
    }

    /// Returns a copy with the given status.
    #[must_use]
    pub fn with_status(mut self, status: CommandStatus) -> Self {
        self.status = status;
        self
    }
}

// ============================================================================
// SECTION: Intruder Log
// ============================================================================

/// Snapshot captured on an unauthorized unlock attempt. Append-only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntruderLog {
    /// Store-assigned identifier.
    pub id: RecordId,
    /// Path of the captured image on device storage.
    pub image_path: String,
    /// Capture time in unix milliseconds.
    pub timestamp: i64,
    /// Free-form location description ("lat, lng" or a placeholder).
    pub location: String,
}

impl IntruderLog {
    /// Creates an unsaved intruder log entry.
    #[must_use]
    pub fn new(image_path: impl Into<String>, timestamp: i64, location: impl Into<String>) -> Self {
        Self {
            id: UNASSIGNED_ID,
            image_path: image_path.into(),
            timestamp,
            location: location.into(),
        }
    }
}
