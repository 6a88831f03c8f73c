// crates/securetrack-core/src/lib.rs
// ============================================================================
// Module: SecureTrack Core Library
// Description: Public API surface for the SecureTrack device store.
// Purpose: Expose record types, repository interfaces, and retention helpers.
// Dependencies: crate::{records, interfaces, retention}
// ============================================================================

//! ## Overview
//! SecureTrack core defines the durable records kept on a protected device
//! (remote command log, emergency contacts, intruder snapshots) and the
//! repository interfaces collaborators use to read and mutate them. It is
//! backend-agnostic; the `SQLite` implementation lives in
//! `securetrack-store-sqlite`.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod interfaces;
pub mod records;
pub mod retention;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use interfaces::CommandLogRepository;
pub use interfaces::EmergencyContactRepository;
pub use interfaces::IntruderLogRepository;
pub use interfaces::LiveResults;
pub use interfaces::StoreError;
pub use records::CommandLog;
pub use records::CommandStatus;
pub use records::EmergencyContact;
pub use records::IntruderLog;
pub use records::RecordId;
pub use records::UNASSIGNED_ID;
pub use records::UnknownStatus;
pub use retention::RetentionPolicy;
