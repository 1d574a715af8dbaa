//! Simulated clock for tests and simulations

use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use std::sync::Arc;
use thechain_core::effects::TimeEffects;

/// Manually advanced clock. Clones share the same time.
#[derive(Debug, Clone)]
pub struct SimulatedClock {
    current: Arc<Mutex<DateTime<Utc>>>,
}

impl SimulatedClock {
    /// Create a clock starting at `start`
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            current: Arc::new(Mutex::new(start)),
        }
    }

    /// Advance simulated time
    pub fn advance(&self, by: Duration) {
        let mut current = self.current.lock();
        *current += by;
    }

    /// Set the absolute simulated time
    pub fn set(&self, to: DateTime<Utc>) {
        *self.current.lock() = to;
    }
}

impl Default for SimulatedClock {
    fn default() -> Self {
        Self::new(DateTime::<Utc>::UNIX_EPOCH)
    }
}

impl TimeEffects for SimulatedClock {
    fn now(&self) -> DateTime<Utc> {
        *self.current.lock()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clones_share_time() {
        let clock = SimulatedClock::new(DateTime::<Utc>::UNIX_EPOCH + Duration::seconds(1));
        let view = clock.clone();
        clock.advance(Duration::seconds(2));
        assert_eq!(view.now_ms(), 3_000);

        view.set(DateTime::<Utc>::UNIX_EPOCH);
        assert_eq!(clock.now_ms(), 0);
    }
}
