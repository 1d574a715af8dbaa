//! Per-operation context and the post-commit notification outbox

use chrono::{DateTime, Utc};
use std::sync::Arc;
use thechain_core::effects::{Notification, NotificationEffects};
use thechain_core::ChainRule;

/// Values fixed for the duration of one operation.
///
/// `now` and `rule` are sampled once when the transaction opens so every step
/// of a cascade sees the same clock reading and the same thresholds.
#[derive(Debug, Clone, Copy)]
pub struct OperationContext {
    /// Clock reading for this operation
    pub now: DateTime<Utc>,
    /// Rule in force at `now`
    pub rule: ChainRule,
    /// Ancestors a single cascade may walk
    pub max_cascade_depth: usize,
}

/// Notifications produced inside a transaction, delivered after commit
#[derive(Debug, Default)]
pub struct Outbox {
    pending: Vec<Notification>,
}

impl Outbox {
    /// Empty outbox
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a notification
    pub fn push(&mut self, notification: Notification) {
        self.pending.push(notification);
    }

    /// Queued notifications
    pub fn pending(&self) -> &[Notification] {
        &self.pending
    }

    /// Deliver everything queued. Failures are logged and dropped.
    pub async fn dispatch(self, notifier: &Arc<dyn NotificationEffects>) {
        for notification in self.pending {
            if let Err(err) = notifier.notify(&notification).await {
                tracing::warn!(
                    kind = notification.kind(),
                    recipient = %notification.recipient(),
                    error = %err,
                    "Notification delivery failed"
                );
            }
        }
    }
}
