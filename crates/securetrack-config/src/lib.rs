// crates/securetrack-config/src/lib.rs
// ============================================================================
// Module: SecureTrack Config Library
// Description: Configuration model and validation for the device store.
// Purpose: Single source of truth for securetrack.toml semantics.
// Dependencies: securetrack-core, securetrack-store-sqlite, serde, toml
// ============================================================================

//! ## Overview
//! `securetrack-config` loads the store and retention settings from a TOML
//! file and validates them fail-closed before the store is opened.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod config;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use config::*;
