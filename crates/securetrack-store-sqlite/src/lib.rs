// crates/securetrack-store-sqlite/src/lib.rs
// ============================================================================
// Module: SecureTrack SQLite Store
// Description: Schema-versioned device store backed by SQLite WAL.
// Purpose: Provide atomic writes, live queries, and migrations for the device.
// Dependencies: securetrack-core, rusqlite, tokio
// ============================================================================

//! ## Overview
//! This crate implements the SecureTrack repository interfaces on a single
//! `SQLite` file. Opening the store runs a migration gate that creates,
//! validates, migrates, or (when allowed) destroys and recreates the schema.
//! Writes are serialized through one connection and broadcast per-table
//! invalidations; live queries re-run on the blocking pool whenever one of
//! their declared tables changes.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod codec;
pub mod config;
pub mod engine;
pub mod error;
pub mod executor;
pub mod live;
pub mod migration;
pub mod repository;
pub mod schema;
pub mod store;
pub mod tracker;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use codec::Entity;
pub use codec::OnConflict;
pub use config::SqliteJournalMode;
pub use config::SqliteStoreConfig;
pub use config::SqliteSyncMode;
pub use engine::Database;
pub use engine::DatabaseBuilder;
pub use error::SqliteStoreError;
pub use executor::blocking_section;
pub use live::LiveQuery;
pub use live::QuerySpec;
pub use migration::Migration;
pub use migration::MigrationSet;
pub use migration::OpenOutcome;
pub use migration::StoreCallback;
pub use repository::SqliteCommandLogRepository;
pub use repository::SqliteEmergencyContactRepository;
pub use repository::SqliteIntruderLogRepository;
pub use schema::ColumnSpec;
pub use schema::ColumnType;
pub use schema::SchemaRegistry;
pub use schema::Table;
pub use schema::TableSpec;
pub use store::SqliteStore;
pub use tracker::InvalidationObserver;
pub use tracker::InvalidationTracker;
