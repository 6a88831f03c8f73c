// crates/securetrack-store-sqlite/tests/live_query.rs
// ============================================================================
// Module: Live Query Tests
// Description: Validate push-updated results, cancellation, and offloading.
// Purpose: Ensure subscribers see every committed write without polling.
// Dependencies: securetrack-store-sqlite, securetrack-core, tokio, tokio-stream, tempfile
// ============================================================================

//! ## Overview
//! Subscribes through the async store and the repository traits, then writes
//! from other handles and checks what the subscription yields. Waits are
//! bounded with `tokio::time::timeout` so a missed emission fails instead of
//! hanging.

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
use std::time::Duration;

use rusqlite::Connection;
use securetrack_core::CommandLog;
use securetrack_core::CommandLogRepository;
use securetrack_core::EmergencyContact;
use securetrack_core::EmergencyContactRepository;
use securetrack_core::IntruderLog;
use securetrack_core::IntruderLogRepository;
use securetrack_core::StoreError;
use securetrack_store_sqlite::QuerySpec;
use securetrack_store_sqlite::SqliteStore;
use securetrack_store_sqlite::SqliteStoreConfig;
use securetrack_store_sqlite::SqliteStoreError;
use securetrack_store_sqlite::Table;
use tempfile::TempDir;
use tokio::time::timeout;
use tokio_stream::Stream;
use tokio_stream::StreamExt;

// ============================================================================
// SECTION: Helpers
// ============================================================================

const WAIT: Duration = Duration::from_secs(5);
const QUIET: Duration = Duration::from_millis(150);

async fn open() -> (TempDir, SqliteStore) {
    let dir = TempDir::new().unwrap();
    let mut config = SqliteStoreConfig::new(dir.path().join("securetrack_db"));
    config.validate_schema = true;
    let store = SqliteStore::open(config).await.unwrap();
    (dir, store)
}

async fn next<S, T>(stream: &mut S) -> Vec<T>
where
    S: Stream<Item = Result<Vec<T>, StoreError>> + Unpin,
{
    timeout(WAIT, stream.next()).await.expect("emission in time").expect("stream open").unwrap()
}

/// Reads until `done` accepts a result set, returning it and the number of
/// items consumed.
async fn until<S, T>(stream: &mut S, done: impl Fn(&[T]) -> bool) -> (Vec<T>, usize)
where
    S: Stream<Item = Result<Vec<T>, StoreError>> + Unpin,
{
    let mut seen = 0;
    loop {
        let items = next(stream).await;
        seen += 1;
        if done(&items) {
            return (items, seen);
        }
    }
}

fn timestamps(logs: &[CommandLog]) -> Vec<i64> {
    logs.iter().map(|log| log.timestamp).collect()
}

// ============================================================================
// SECTION: Emission
// ============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn subscription_emits_current_state_immediately() {
    let (_dir, store) = open().await;
    let repo = store.command_logs();
    repo.insert_log(CommandLog::received("LOCATE", "+15551234567", 1_000)).await.unwrap();

    let mut live = repo.observe_all_logs().unwrap();
    assert_eq!(timestamps(&next(&mut live).await), vec![1_000]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn three_inserts_arrive_newest_first() {
    let (_dir, store) = open().await;
    let mut live = store.command_logs().observe_all_logs().unwrap();
    assert!(next(&mut live).await.is_empty());

    let writer = store.clone().command_logs();
    for timestamp in [1_000, 3_000, 2_000] {
        writer.insert_log(CommandLog::received("PING", "+15551234567", timestamp)).await.unwrap();
    }
    let (logs, _) = until(&mut live, |logs: &[CommandLog]| logs.len() == 3).await;
    assert_eq!(timestamps(&logs), vec![3_000, 2_000, 1_000]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn recent_logs_respect_the_limit() {
    let (_dir, store) = open().await;
    let repo = store.command_logs();
    let mut live = repo.observe_recent_logs(2).unwrap();
    assert!(next(&mut live).await.is_empty());

    for timestamp in [1_000, 2_000, 3_000] {
        repo.insert_log(CommandLog::received("PING", "+1", timestamp)).await.unwrap();
    }
    let (logs, _) =
        until(&mut live, |logs: &[CommandLog]| logs.first().map(|l| l.timestamp) == Some(3_000))
            .await;
    assert_eq!(timestamps(&logs), vec![3_000, 2_000]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn narrow_updates_re_emit() {
    let (_dir, store) = open().await;
    let repo = store.command_logs();
    let id = repo.insert_log(CommandLog::received("LOCATE", "+1", 1)).await.unwrap();
    let mut live = repo.observe_all_logs().unwrap();
    assert_eq!(next(&mut live).await.len(), 1);

    repo.update_log_location(id, 1.0, 2.0).await.unwrap();
    let (logs, _) =
        until(&mut live, |logs: &[CommandLog]| logs[0].location_lat.is_some()).await;
    assert_eq!(logs[0].location_lng, Some(2.0));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn bursts_collapse_to_latest_state() {
    let (_dir, store) = open().await;
    let repo = store.intruder_logs();
    let mut live = repo.observe_all_logs().unwrap();

    for timestamp in 0 .. 50 {
        repo.insert_log(IntruderLog::new("/img/x.jpg", timestamp, "Unknown")).await.unwrap();
    }
    let (logs, seen) = until(&mut live, |logs: &[IntruderLog]| logs.len() == 50).await;
    assert_eq!(logs[0].timestamp, 49);
    assert!(seen <= 3, "expected collapsed delivery, saw {seen} emissions");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn unrelated_writes_do_not_emit() {
    let (_dir, store) = open().await;
    let mut contacts = store.emergency_contacts().observe_contacts().unwrap();
    assert!(next(&mut contacts).await.is_empty());

    store.intruder_logs().insert_log(IntruderLog::new("/img/1.jpg", 1, "x")).await.unwrap();
    store.command_logs().insert_log(CommandLog::received("LOCK", "+1", 1)).await.unwrap();
    assert!(timeout(QUIET, contacts.next()).await.is_err());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn zero_row_writes_do_not_emit() {
    let (_dir, store) = open().await;
    let repo = store.command_logs();
    let mut live = repo.observe_all_logs().unwrap();
    assert!(next(&mut live).await.is_empty());

    assert_eq!(repo.delete_logs_older_than(10).await.unwrap(), 0);
    assert!(timeout(QUIET, live.next()).await.is_err());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn clear_all_re_emits_empty_results() {
    let (_dir, store) = open().await;
    let repo = store.intruder_logs();
    repo.insert_log(IntruderLog::new("/img/1.jpg", 1, "x")).await.unwrap();
    let mut live = repo.observe_all_logs().unwrap();
    assert_eq!(next(&mut live).await.len(), 1);

    store.clear_all().await.unwrap();
    let (logs, _) = until(&mut live, <[IntruderLog]>::is_empty).await;
    assert!(logs.is_empty());
}

// ============================================================================
// SECTION: Cancellation And Errors
// ============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn cancelled_query_stops_recomputing() {
    let (_dir, store) = open().await;
    let runs = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&runs);
    let spec = QuerySpec::new([Table::CommandLogs], "SELECT COUNT(*) FROM command_logs");
    let mut live = store
        .live_query(spec, move |row| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(row.get::<_, i64>(0)?)
        })
        .unwrap();
    assert_eq!(next(&mut live).await, vec![0]);
    assert_eq!(runs.load(Ordering::SeqCst), 1);

    live.cancel();
    store.command_logs().insert_log(CommandLog::received("LOCK", "+1", 1)).await.unwrap();
    tokio::time::sleep(QUIET).await;
    assert_eq!(runs.load(Ordering::SeqCst), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn decode_failure_ends_the_stream() {
    let (_dir, store) = open().await;
    let path = store.database().config().path.clone();
    Connection::open(path)
        .unwrap()
        .execute(
            "INSERT INTO command_logs (command, senderNumber, timestamp, status) VALUES ('X', \
             '+1', 1, 'MISPLACED')",
            [],
        )
        .unwrap();

    let mut live = store.command_logs().observe_all_logs().unwrap();
    let first = timeout(WAIT, live.next()).await.unwrap().expect("error item");
    assert!(matches!(first, Err(StoreError::Decode { ref value, .. }) if value == "MISPLACED"));
    assert!(timeout(WAIT, live.next()).await.unwrap().is_none());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn dropping_every_store_handle_ends_the_stream() {
    let (_dir, store) = open().await;
    let mut live = store.command_logs().observe_all_logs().unwrap();
    assert!(next(&mut live).await.is_empty());

    let weak = Arc::downgrade(store.database());
    drop(store);
    assert!(timeout(WAIT, live.next()).await.unwrap().is_none());
    assert!(weak.upgrade().is_none());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn live_query_without_tables_is_rejected() {
    let (_dir, store) = open().await;
    let result = store.live_entities::<CommandLog>(QuerySpec::new(Vec::new(), "SELECT 1"));
    assert!(matches!(result, Err(SqliteStoreError::Invalid(_))));
}

// ============================================================================
// SECTION: Observers And Blocking
// ============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn table_observers_wake_on_commit() {
    let (_dir, store) = open().await;
    let mut observer = store.observe_tables(vec![Table::EmergencyContacts]);
    store
        .emergency_contacts()
        .insert_contact(EmergencyContact::new("Ada", "+1", 1))
        .await
        .unwrap();
    let moved = timeout(WAIT, observer.changed()).await.unwrap().unwrap();
    assert_eq!(moved, vec![Table::EmergencyContacts]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn direct_blocking_call_from_async_context_is_rejected() {
    let (_dir, store) = open().await;
    let err = store.database().insert(&CommandLog::received("LOCK", "+1", 1)).unwrap_err();
    assert!(matches!(err, SqliteStoreError::BlockingContext(_)));
    let err = store.database().query_scalar("SELECT 1", &[]).unwrap_err();
    assert!(matches!(err, SqliteStoreError::BlockingContext(_)));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn engine_calls_from_spawn_blocking_are_accepted() {
    let (_dir, store) = open().await;
    let database = Arc::clone(store.database());
    let id = tokio::task::spawn_blocking(move || {
        database.run_blocking(|db| db.insert(&CommandLog::received("LOCK", "+1", 1)))
    })
    .await
    .unwrap()
    .unwrap();

    let database = Arc::clone(store.database());
    let found = tokio::task::spawn_blocking(move || {
        database.run_blocking(|db| -> Result<Option<CommandLog>, SqliteStoreError> {
            db.clear_all()?;
            db.get::<CommandLog>(id)
        })
    })
    .await
    .unwrap()
    .unwrap();
    assert!(found.is_none());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn blocking_calls_can_be_allowed_explicitly() {
    let dir = TempDir::new().unwrap();
    let mut config = SqliteStoreConfig::new(dir.path().join("securetrack_db"));
    config.allow_blocking_in_async = true;
    let store = SqliteStore::open(config).await.unwrap();
    assert!(store.database().insert(&CommandLog::received("LOCK", "+1", 1)).is_ok());
}
