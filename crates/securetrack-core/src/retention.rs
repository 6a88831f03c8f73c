// crates/securetrack-core/src/retention.rs
// ============================================================================
// Module: SecureTrack Retention
// Description: Age-based retention policy for command logs.
// Purpose: Turn a configured maximum age into a delete-older-than cutoff.
// Dependencies: serde
// ============================================================================

//! ## Overview
//! Retention is a plain cutoff computation; the sweep itself is a
//! delete-older-than on the command log repository.

use serde::Deserialize;
use serde::Serialize;

/// Milliseconds per day.
const MILLIS_PER_DAY: i64 = 24 * 60 * 60 * 1_000;

/// Maximum age for retained command logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RetentionPolicy {
    /// Logs older than this many days are swept. `None` keeps everything.
    #[serde(default)]
    pub max_age_days: Option<u32>,
}

impl RetentionPolicy {
    /// Keeps logs for `days` days.
    #[must_use]
    pub const fn days(days: u32) -> Self {
        Self {
            max_age_days: Some(days),
        }
    }

    /// Returns the cutoff timestamp for `now`, or `None` when nothing expires.
    ///
    /// Rows with a timestamp strictly before the cutoff are expired.
    #[must_use]
    pub fn cutoff(&self, now: i64) -> Option<i64> {
        let days = self.max_age_days?;
        let window = i64::from(days).saturating_mul(MILLIS_PER_DAY);
        Some(now.saturating_sub(window))
    }
}
