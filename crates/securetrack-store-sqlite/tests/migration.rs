// crates/securetrack-store-sqlite/tests/migration.rs
// ============================================================================
// Module: Migration Gate Tests
// Description: Validate version upgrades, destructive fallback, and rollback.
// Purpose: Ensure a schema change never leaves a half-migrated file.
// Dependencies: securetrack-store-sqlite, rusqlite, tempfile
// ============================================================================

//! ## Overview
//! Moves a populated version-1 file to a version-2 registry that adds a
//! nullable column to `command_logs`, with and without a registered
//! migration, and checks lifecycle callbacks along the way.

#![allow(
    clippy::panic,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::use_debug,
    reason = "Test-only assertions and helpers are permitted."
)]

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;

use rusqlite::Connection;
use securetrack_core::CommandLog;
use securetrack_core::IntruderLog;
use securetrack_store_sqlite::ColumnSpec;
use securetrack_store_sqlite::ColumnType;
use securetrack_store_sqlite::Database;
use securetrack_store_sqlite::Migration;
use securetrack_store_sqlite::OpenOutcome;
use securetrack_store_sqlite::SchemaRegistry;
use securetrack_store_sqlite::SqliteStoreConfig;
use securetrack_store_sqlite::SqliteStoreError;
use securetrack_store_sqlite::StoreCallback;
use securetrack_store_sqlite::Table;
use securetrack_store_sqlite::TableSpec;
use securetrack_store_sqlite::schema::COMMAND_LOG_COLUMNS;
use securetrack_store_sqlite::schema::EMERGENCY_CONTACT_COLUMNS;
use securetrack_store_sqlite::schema::INTRUDER_LOG_COLUMNS;
use tempfile::TempDir;

// ============================================================================
// SECTION: Helpers
// ============================================================================

const ADD_SOURCE_COLUMN: &str = "ALTER TABLE `command_logs` ADD COLUMN `source` TEXT";

fn config(dir: &TempDir) -> SqliteStoreConfig {
    let mut config = SqliteStoreConfig::new(dir.path().join("securetrack_db"));
    config.validate_schema = true;
    config
}

fn registry_v2() -> SchemaRegistry {
    let mut command_logs = COMMAND_LOG_COLUMNS.to_vec();
    command_logs.push(ColumnSpec::nullable("source", ColumnType::Text));
    SchemaRegistry::new(
        2,
        vec![
            TableSpec::new(Table::EmergencyContacts, EMERGENCY_CONTACT_COLUMNS),
            TableSpec::new(Table::CommandLogs, &command_logs),
            TableSpec::new(Table::IntruderLogs, INTRUDER_LOG_COLUMNS),
        ],
    )
}

/// Seeds a version-1 file with one command log and one intruder log.
fn seed_v1(config: &SqliteStoreConfig) -> i64 {
    let database = Database::open(config.clone()).unwrap();
    let id = database.insert(&CommandLog::received("LOCATE", "+15551234567", 1_000)).unwrap();
    database.insert(&IntruderLog::new("/img/1.jpg", 2_000, "Unknown")).unwrap();
    id
}

fn column_names(config: &SqliteStoreConfig, table: &str) -> Vec<String> {
    let connection = Connection::open(&config.path).unwrap();
    let mut statement =
        connection.prepare("SELECT name FROM pragma_table_info(?1) ORDER BY cid").unwrap();
    statement
        .query_map([table], |row| row.get::<_, String>(0))
        .unwrap()
        .collect::<Result<Vec<_>, _>>()
        .unwrap()
}

#[derive(Default)]
struct Recorder {
    created: AtomicUsize,
    opened: AtomicUsize,
    destroyed: AtomicUsize,
}

impl StoreCallback for Recorder {
    fn on_create(&self, _connection: &Connection) {
        self.created.fetch_add(1, Ordering::SeqCst);
    }

    fn on_open(&self, _connection: &Connection) {
        self.opened.fetch_add(1, Ordering::SeqCst);
    }

    fn on_destructive_migration(&self, _connection: &Connection) {
        self.destroyed.fetch_add(1, Ordering::SeqCst);
    }
}

// ============================================================================
// SECTION: Registered Migrations
// ============================================================================

#[test]
fn registered_migration_preserves_rows() {
    let dir = TempDir::new().unwrap();
    let config = config(&dir);
    let id = seed_v1(&config);

    let database = Database::builder(config.clone())
        .registry(registry_v2())
        .migration(Migration::sql(1, 2, ADD_SOURCE_COLUMN))
        .open()
        .unwrap();
    assert_eq!(
        database.open_outcome(),
        OpenOutcome::Migrated {
            from: 1,
            to: 2
        }
    );
    let log = database.get::<CommandLog>(id).unwrap().expect("row migrated");
    assert_eq!(log.command, "LOCATE");
    assert_eq!(log.timestamp, 1_000);
    drop(database);

    assert!(column_names(&config, "command_logs").contains(&"source".to_string()));
    let reopened = Database::builder(config).registry(registry_v2()).open().unwrap();
    assert_eq!(reopened.open_outcome(), OpenOutcome::Opened);
}

#[test]
fn migration_closure_can_transform_rows() {
    let dir = TempDir::new().unwrap();
    let config = config(&dir);
    let id = seed_v1(&config);

    let database = Database::builder(config)
        .registry(registry_v2())
        .migration(Migration::new(1, 2, |tx| {
            tx.execute_batch(ADD_SOURCE_COLUMN)?;
            tx.execute("UPDATE command_logs SET source = 'sms'", [])?;
            Ok(())
        }))
        .open()
        .unwrap();
    let count = database
        .query_scalar("SELECT COUNT(*) FROM command_logs WHERE source = 'sms' AND id = ?1", &[
            id.into(),
        ])
        .unwrap();
    assert_eq!(count, 1);
}

#[test]
fn failing_migration_rolls_back_everything() {
    let dir = TempDir::new().unwrap();
    let config = config(&dir);
    let id = seed_v1(&config);

    let result = Database::builder(config.clone())
        .registry(registry_v2())
        .migration(Migration::sql(
            1,
            2,
            format!("{ADD_SOURCE_COLUMN}; INSERT INTO no_such_table VALUES (1);"),
        ))
        .open();
    assert!(matches!(result, Err(SqliteStoreError::Db(_))));
    assert!(!column_names(&config, "command_logs").contains(&"source".to_string()));

    let database = Database::open(config).unwrap();
    assert_eq!(database.open_outcome(), OpenOutcome::Opened);
    assert!(database.get::<CommandLog>(id).unwrap().is_some());
}

#[test]
fn migration_that_misses_the_target_shape_fails_validation() {
    let dir = TempDir::new().unwrap();
    let config = config(&dir);
    seed_v1(&config);

    let result = Database::builder(config.clone())
        .registry(registry_v2())
        .migration(Migration::sql(1, 2, "CREATE TABLE IF NOT EXISTS scratch (x INTEGER)"))
        .open();
    assert!(matches!(
        result,
        Err(SqliteStoreError::SchemaValidation { ref table, .. }) if table == "command_logs"
    ));
    assert_eq!(Database::open(config).unwrap().open_outcome(), OpenOutcome::Opened);
}

// ============================================================================
// SECTION: Destructive Fallback
// ============================================================================

#[test]
fn missing_path_drops_data_and_leaves_store_usable() {
    let dir = TempDir::new().unwrap();
    let config = config(&dir);
    let id = seed_v1(&config);
    let recorder = Arc::new(Recorder::default());

    let database = Database::builder(config)
        .registry(registry_v2())
        .callback(recorder.clone())
        .open()
        .unwrap();
    assert_eq!(
        database.open_outcome(),
        OpenOutcome::Destructive {
            from: 1,
            to: 2
        }
    );
    assert_eq!(recorder.destroyed.load(Ordering::SeqCst), 1);
    assert_eq!(recorder.created.load(Ordering::SeqCst), 0);
    assert_eq!(recorder.opened.load(Ordering::SeqCst), 1);
    assert!(database.get::<CommandLog>(id).unwrap().is_none());
    for table in Table::ALL {
        let count = database
            .query_scalar(&format!("SELECT COUNT(*) FROM {}", table.name()), &[])
            .unwrap();
        assert_eq!(count, 0, "{table} not emptied");
    }
    let fresh = database.insert(&CommandLog::received("LOCK", "+15550000003", 3_000)).unwrap();
    assert!(fresh > 0);
}

#[test]
fn missing_path_without_fallback_is_refused_and_file_untouched() {
    let dir = TempDir::new().unwrap();
    let mut config = config(&dir);
    let id = seed_v1(&config);
    config.destructive_fallback = false;

    let result = Database::builder(config.clone()).registry(registry_v2()).open();
    assert!(matches!(
        result,
        Err(SqliteStoreError::MigrationMissing {
            from: 1,
            to: 2
        })
    ));

    let database = Database::open(config).unwrap();
    assert_eq!(database.open_outcome(), OpenOutcome::Opened);
    assert!(database.get::<CommandLog>(id).unwrap().is_some());
}

#[test]
fn same_version_with_changed_shape_falls_back() {
    let dir = TempDir::new().unwrap();
    let config = config(&dir);
    seed_v1(&config);
    let drifted = SchemaRegistry::new(1, registry_v2().tables().to_vec());

    let database = Database::builder(config).registry(drifted).open().unwrap();
    assert_eq!(
        database.open_outcome(),
        OpenOutcome::Destructive {
            from: 1,
            to: 1
        }
    );
}

#[test]
fn downgrade_without_path_falls_back() {
    let dir = TempDir::new().unwrap();
    let config = config(&dir);
    drop(Database::builder(config.clone()).registry(registry_v2()).open().unwrap());

    let database = Database::open(config).unwrap();
    assert_eq!(
        database.open_outcome(),
        OpenOutcome::Destructive {
            from: 2,
            to: 1
        }
    );
}

// ============================================================================
// SECTION: Callbacks
// ============================================================================

#[test]
fn create_and_open_callbacks_fire() {
    let dir = TempDir::new().unwrap();
    let config = config(&dir);
    let recorder = Arc::new(Recorder::default());

    drop(Database::builder(config.clone()).callback(recorder.clone()).open().unwrap());
    drop(Database::builder(config).callback(recorder.clone()).open().unwrap());
    assert_eq!(recorder.created.load(Ordering::SeqCst), 1);
    assert_eq!(recorder.opened.load(Ordering::SeqCst), 2);
    assert_eq!(recorder.destroyed.load(Ordering::SeqCst), 0);
}
