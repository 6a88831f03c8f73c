// crates/securetrack-store-sqlite/src/executor.rs
// ============================================================================
// Module: Blocking Executor
// Description: Moves store I/O onto the runtime's blocking pool.
// Purpose: Keep disk work off async workers and reject stray blocking calls.
// Dependencies: tokio, tracing
// ============================================================================

//! ## Overview
//! Async store operations run their synchronous body through [`offload`],
//! which executes it on a blocking-pool thread and marks that thread as
//! offloaded. A synchronous call made from a runtime worker that is not
//! marked is rejected with [`SqliteStoreError::BlockingContext`] unless the
//! configuration allows it.
//!
//! Tokio does not expose whether the current thread is an async worker or a
//! blocking-pool thread. Callers that already moved off the workers with
//! `spawn_blocking` or `block_in_place` mark that with [`blocking_section`]
//! (or [`crate::engine::Database::run_blocking`]) before calling the engine.

use std::cell::Cell;

use tokio::runtime::Handle;
use tracing::warn;

use crate::error::SqliteStoreError;

thread_local! {
    /// Set while a blocking-pool thread runs store work.
    static OFFLOADED: Cell<bool> = const { Cell::new(false) };
}

/// Marks the current thread as offloaded for its lifetime.
struct OffloadGuard {
    /// Flag value to restore on drop, so sections nest.
    previous: bool,
}

impl OffloadGuard {
    /// Sets the offload flag.
    fn enter() -> Self {
        let previous = OFFLOADED.with(|flag| flag.replace(true));
        Self {
            previous,
        }
    }
}

impl Drop for OffloadGuard {
    fn drop(&mut self) {
        OFFLOADED.with(|flag| flag.set(self.previous));
    }
}

/// Runs `work` with the current thread marked as a blocking section.
///
/// Use this on a thread that is already off the async workers (inside
/// `spawn_blocking` or `block_in_place`) to call the synchronous engine.
/// Wrapping a call made directly on an async worker defeats the check and
/// stalls that worker.
pub fn blocking_section<R>(work: impl FnOnce() -> R) -> R {
    let _guard = OffloadGuard::enter();
    work()
}

/// Runs `work` on the blocking pool of `runtime`.
///
/// # Errors
///
/// Returns the error produced by `work`, or [`SqliteStoreError::Closed`] /
/// [`SqliteStoreError::Io`] when the blocking task is cancelled or panics.
pub async fn offload<R, F>(
    runtime: &Handle,
    operation: &'static str,
    work: F,
) -> Result<R, SqliteStoreError>
where
    F: FnOnce() -> Result<R, SqliteStoreError> + Send + 'static,
    R: Send + 'static,
{
    runtime
        .spawn_blocking(move || {
            let _guard = OffloadGuard::enter();
            work()
        })
        .await
        .map_err(|err| {
            if err.is_cancelled() {
                SqliteStoreError::Closed(format!("{operation} cancelled"))
            } else {
                SqliteStoreError::Io(format!("{operation} failed: {err}"))
            }
        })?
}

/// Rejects a synchronous store call made directly from an async worker.
///
/// # Errors
///
/// Returns [`SqliteStoreError::BlockingContext`] when called on a runtime
/// thread that is not running offloaded store work and `allow` is false.
pub fn ensure_blocking_allowed(allow: bool, operation: &str) -> Result<(), SqliteStoreError> {
    if allow || OFFLOADED.with(Cell::get) {
        return Ok(());
    }
    if Handle::try_current().is_ok() {
        warn!(operation, "rejected blocking store call from async context");
        return Err(SqliteStoreError::BlockingContext(format!(
            "{operation} must be awaited through the async store API"
        )));
    }
    Ok(())
}
