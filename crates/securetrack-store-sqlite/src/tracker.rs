// crates/securetrack-store-sqlite/src/tracker.rs
// ============================================================================
// Module: Invalidation Tracker
// Description: Per-table change counters broadcast on every committed write.
// Purpose: Let live queries learn that a dependency changed without polling.
// Dependencies: tokio, tracing
// ============================================================================

//! ## Overview
//! Every committed write bumps a counter for each table it touched and
//! publishes the new counters on a `watch` channel. Observers remember the
//! counters they last acted on and wake only when one of their declared
//! tables moved. The channel keeps only the latest value, so a burst of
//! writes collapses into a single wake-up.

use tokio::sync::watch;
use tracing::debug;

use crate::error::SqliteStoreError;
use crate::schema::Table;

// ============================================================================
// SECTION: Versions
// ============================================================================

/// Monotonic change counter per table.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TableVersions([u64; Table::COUNT]);

impl TableVersions {
    /// Returns the counter for `table`.
    #[must_use]
    pub const fn get(&self, table: Table) -> u64 {
        self.0[table.index()]
    }

    /// Advances the counter for `table`.
    fn bump(&mut self, table: Table) {
        let slot = &mut self.0[table.index()];
        *slot = slot.wrapping_add(1);
    }
}

// ============================================================================
// SECTION: Tracker
// ============================================================================

/// Broadcasts table invalidations to observers.
#[derive(Debug)]
pub struct InvalidationTracker {
    /// Latest counters.
    sender: watch::Sender<TableVersions>,
}

impl Default for InvalidationTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl InvalidationTracker {
    /// Creates a tracker with all counters at zero.
    #[must_use]
    pub fn new() -> Self {
        let (sender, _receiver) = watch::channel(TableVersions::default());
        Self {
            sender,
        }
    }

    /// Marks `tables` as changed and wakes dependent observers.
    pub fn invalidate(&self, tables: &[Table]) {
        if tables.is_empty() {
            return;
        }
        self.sender.send_modify(|versions| {
            for table in tables {
                versions.bump(*table);
            }
        });
        debug!(tables = %join_names(tables), "invalidated tables");
    }

    /// Registers an observer for `tables`, starting from the current state.
    #[must_use]
    pub fn observe(&self, tables: Vec<Table>) -> InvalidationObserver {
        let receiver = self.sender.subscribe();
        let seen = *receiver.borrow();
        InvalidationObserver {
            tables,
            receiver,
            seen,
        }
    }
}

// ============================================================================
// SECTION: Observer
// ============================================================================

/// Waits for changes to a fixed set of tables.
#[derive(Debug)]
pub struct InvalidationObserver {
    /// Declared dependencies.
    tables: Vec<Table>,
    /// Counter feed.
    receiver: watch::Receiver<TableVersions>,
    /// Counters as of the last acknowledged state.
    seen: TableVersions,
}

impl InvalidationObserver {
    /// Returns the declared tables.
    #[must_use]
    pub fn tables(&self) -> &[Table] {
        &self.tables
    }

    /// Acknowledges every change published so far.
    pub fn mark_seen(&mut self) {
        self.seen = *self.receiver.borrow_and_update();
    }

    /// Waits until a declared table changes past the acknowledged state and
    /// returns the tables that moved.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError::Closed`] once the store has been dropped.
    pub async fn changed(&mut self) -> Result<Vec<Table>, SqliteStoreError> {
        loop {
            let current = *self.receiver.borrow_and_update();
            let moved: Vec<Table> = self
                .tables
                .iter()
                .copied()
                .filter(|table| current.get(*table) != self.seen.get(*table))
                .collect();
            if !moved.is_empty() {
                self.seen = current;
                return Ok(moved);
            }
            self.receiver
                .changed()
                .await
                .map_err(|_| SqliteStoreError::Closed("invalidation tracker dropped".to_string()))?;
        }
    }
}

/// Joins table names for log fields.
fn join_names(tables: &[Table]) -> String {
    tables.iter().map(|table| table.name()).collect::<Vec<_>>().join(",")
}
