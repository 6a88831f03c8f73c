// crates/securetrack-store-sqlite/src/live.rs
// ============================================================================
// Module: Live Queries
// Description: Push-updated query results driven by table invalidations.
// Purpose: Re-serve a read query every time one of its tables changes.
// Dependencies: rusqlite, securetrack-core, tokio, tokio-stream, tracing
// ============================================================================

//! ## Overview
//! A live query is a background task that loops over three steps:
//! acknowledge the current invalidation state, recompute on the blocking
//! pool, and wait for a declared table to change. The acknowledgement comes
//! before the recompute, so a write that lands during recomputation always
//! triggers another round.
//!
//! Results flow through a bounded channel. While the consumer is behind,
//! the task parks on the send and further writes coalesce into one
//! recomputation. Dropping the [`LiveQuery`] aborts the task and discards
//! anything still buffered. The task holds the engine weakly, so once every
//! store handle is gone the engine closes and the stream ends.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::pin::Pin;
use std::sync::Arc;
use std::sync::Weak;
use std::task::Context;
use std::task::Poll;

use rusqlite::Row;
use rusqlite::types::Value;
use securetrack_core::StoreError;
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_stream::Stream;
use tokio_stream::wrappers::ReceiverStream;
use tracing::debug;

use crate::engine::Database;
use crate::error::SqliteStoreError;
use crate::executor::offload;
use crate::schema::Table;
use crate::tracker::InvalidationObserver;

// ============================================================================
// SECTION: Query Spec
// ============================================================================

/// A read query together with the tables it depends on.
#[derive(Debug, Clone, PartialEq)]
pub struct QuerySpec {
    /// Tables whose writes re-trigger the query.
    pub tables: Vec<Table>,
    /// Statement text.
    pub sql: String,
    /// Positional parameters.
    pub params: Vec<Value>,
}

impl QuerySpec {
    /// Creates a spec with no parameters.
    #[must_use]
    pub fn new(tables: impl Into<Vec<Table>>, sql: impl Into<String>) -> Self {
        Self {
            tables: tables.into(),
            sql: sql.into(),
            params: Vec::new(),
        }
    }

    /// Appends a positional parameter.
    #[must_use]
    pub fn param(mut self, value: impl Into<Value>) -> Self {
        self.params.push(value.into());
        self
    }
}

// ============================================================================
// SECTION: Live Query
// ============================================================================

/// Item yielded by a live query.
type LiveItem<T> = Result<Vec<T>, StoreError>;

/// Stream of result sets for one live query.
///
/// The first item is the current result. Later items follow writes to the
/// declared tables. The stream ends after an error or once every store
/// handle has been dropped.
pub struct LiveQuery<T> {
    /// Result feed.
    stream: ReceiverStream<LiveItem<T>>,
    /// Recompute task.
    task: JoinHandle<()>,
}

impl<T> LiveQuery<T> {
    /// Stops recomputation. No further items are delivered.
    pub fn cancel(self) {
        drop(self);
    }
}

impl<T> Unpin for LiveQuery<T> {}

impl<T> Stream for LiveQuery<T> {
    type Item = LiveItem<T>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.get_mut().stream).poll_next(cx)
    }
}

impl<T> Drop for LiveQuery<T> {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Starts a live query on `runtime`.
///
/// # Errors
///
/// Returns [`SqliteStoreError::Invalid`] when the query declares no tables.
pub(crate) fn spawn_live_query<T, F>(
    database: &Arc<Database>,
    runtime: &Handle,
    spec: QuerySpec,
    decode: F,
) -> Result<LiveQuery<T>, SqliteStoreError>
where
    T: Send + 'static,
    F: Fn(&Row<'_>) -> Result<T, SqliteStoreError> + Send + Sync + 'static,
{
    if spec.tables.is_empty() {
        return Err(SqliteStoreError::Invalid(
            "live query must declare at least one table".to_string(),
        ));
    }
    let (sender, receiver) = mpsc::channel(database.config().live_query_buffer);
    let observer = database.observe(spec.tables.clone());
    let worker = LiveWorker {
        database: Arc::downgrade(database),
        runtime: runtime.clone(),
        spec: Arc::new(spec),
        decode: Arc::new(decode),
        observer,
        sender,
    };
    let task = runtime.spawn(worker.run());
    Ok(LiveQuery {
        stream: ReceiverStream::new(receiver),
        task,
    })
}

// ============================================================================
// SECTION: Worker
// ============================================================================

/// State owned by the recompute task.
struct LiveWorker<T, F> {
    /// Engine to query; dead once every store handle is dropped.
    database: Weak<Database>,
    /// Runtime owning the blocking pool.
    runtime: Handle,
    /// Query to re-run.
    spec: Arc<QuerySpec>,
    /// Row decoder.
    decode: Arc<F>,
    /// Invalidation feed for the declared tables.
    observer: InvalidationObserver,
    /// Consumer side.
    sender: mpsc::Sender<LiveItem<T>>,
}

impl<T, F> LiveWorker<T, F>
where
    T: Send + 'static,
    F: Fn(&Row<'_>) -> Result<T, SqliteStoreError> + Send + Sync + 'static,
{
    /// Recompute loop.
    async fn run(mut self) {
        debug!(sql = %self.spec.sql, "live query started");
        loop {
            self.observer.mark_seen();
            let result = tokio::select! {
                result = self.recompute() => result,
                () = self.sender.closed() => break,
            };
            let Some(result) = result else {
                break;
            };
            let failed = result.is_err();
            if self.sender.send(result.map_err(StoreError::from)).await.is_err() || failed {
                break;
            }
            tokio::select! {
                changed = self.observer.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
                () = self.sender.closed() => break,
            }
        }
        debug!(sql = %self.spec.sql, "live query stopped");
    }

    /// Runs the query once on the blocking pool. Returns `None` when the
    /// engine has closed.
    async fn recompute(&self) -> Option<Result<Vec<T>, SqliteStoreError>> {
        let database = self.database.upgrade()?;
        let spec = Arc::clone(&self.spec);
        let decode = Arc::clone(&self.decode);
        let result = offload(&self.runtime, "live query", move || {
            database.query_list(&spec.sql, &spec.params, &*decode)
        })
        .await;
        Some(result)
    }
}
