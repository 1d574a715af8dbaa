//! Notification handlers
//!
//! `TracingNotifier` is the production default and simply logs each event.
//! `RecordingNotifier` captures events for assertions and can be told to fail
//! every delivery.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use thechain_core::effects::{Notification, NotificationEffects, NotifyError};

/// Logs every notification at info level
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingNotifier;

#[async_trait]
impl NotificationEffects for TracingNotifier {
    async fn notify(&self, notification: &Notification) -> Result<(), NotifyError> {
        tracing::info!(
            kind = notification.kind(),
            recipient = %notification.recipient(),
            "Notification dispatched"
        );
        Ok(())
    }
}

/// Captures notifications in memory
#[derive(Debug, Clone, Default)]
pub struct RecordingNotifier {
    sent: Arc<Mutex<Vec<Notification>>>,
    failing: Arc<AtomicBool>,
}

impl RecordingNotifier {
    /// Create an empty recorder
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every following delivery fail (or succeed again)
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Everything delivered so far
    pub fn notifications(&self) -> Vec<Notification> {
        self.sent.lock().clone()
    }

    /// Drain everything delivered so far
    pub fn take(&self) -> Vec<Notification> {
        std::mem::take(&mut *self.sent.lock())
    }

    /// Number of delivered notifications of `kind`
    pub fn count_of(&self, kind: &str) -> usize {
        self.sent.lock().iter().filter(|n| n.kind() == kind).count()
    }
}

#[async_trait]
impl NotificationEffects for RecordingNotifier {
    async fn notify(&self, notification: &Notification) -> Result<(), NotifyError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(NotifyError::new("recording notifier set to fail"));
        }
        self.sent.lock().push(notification.clone());
        Ok(())
    }
}
