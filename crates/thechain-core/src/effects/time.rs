//! Wall-clock time effect.
//!
//! Expiry deadlines, claim timestamps and sweeper predicates all read `now`
//! through this trait so tests and simulations can drive time explicitly.

use chrono::{DateTime, Utc};

/// Physical time source
pub trait TimeEffects: Send + Sync {
    /// Current wall-clock time
    fn now(&self) -> DateTime<Utc>;

    /// Current Unix timestamp in milliseconds
    fn now_ms(&self) -> i64 {
        self.now().timestamp_millis()
    }
}
