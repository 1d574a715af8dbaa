//! Wall-clock handler for production use

use chrono::{DateTime, Utc};
use thechain_core::effects::TimeEffects;

/// System wall clock
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl SystemClock {
    /// Create a new system clock handle
    pub fn new() -> Self {
        Self
    }
}

impl TimeEffects for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}
