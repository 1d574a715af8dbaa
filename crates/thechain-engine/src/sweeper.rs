//! Expiration sweeper
//!
//! Each run expires at most `batch_limit` overdue tickets, one transaction per
//! ticket, then warns owners whose tickets are about to lapse. A failure on
//! one ticket is logged and the batch carries on; the next run picks the
//! ticket up again because `expire` is idempotent and the query still
//! matches.

use crate::engine::ChainEngine;
use crate::lifecycle::ExpireOutcome;
use crate::runtime::TaskRegistry;
use chrono::Duration;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use thechain_core::effects::Notification;
use thechain_core::{ChainResult, ErrorCategory, SweeperConfig, TicketId};

/// Counters for one sweep
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SweepReport {
    /// Overdue tickets returned by the query
    pub examined: usize,
    /// Tickets this run moved to EXPIRED
    pub expired: usize,
    /// Tickets that were already terminal when processed
    pub skipped: usize,
    /// Tickets whose expiry failed and will be retried next run
    pub failed: usize,
    /// Members removed as a consequence of this run
    pub removed: usize,
    /// Expiring-soon warnings sent
    pub warned: usize,
}

/// Periodic driver of ticket expiry
#[derive(Debug)]
pub struct ExpirationSweeper {
    engine: Arc<ChainEngine>,
    config: SweeperConfig,
    // (ticket, window hours) pairs already warned about
    warned: Mutex<HashSet<(TicketId, u32)>>,
}

impl ExpirationSweeper {
    /// Sweeper using the engine's sweeper configuration
    pub fn new(engine: Arc<ChainEngine>) -> Self {
        let config = engine.config().sweeper.clone();
        Self::with_config(engine, config)
    }

    /// Sweeper with explicit settings
    pub fn with_config(engine: Arc<ChainEngine>, mut config: SweeperConfig) -> Self {
        config.warning_windows_hours.sort_unstable();
        config.warning_windows_hours.dedup();
        Self {
            engine,
            config,
            warned: Mutex::new(HashSet::new()),
        }
    }

    /// Run one sweep.
    ///
    /// Only a failure to list overdue tickets is returned; per-ticket
    /// failures are counted in the report.
    pub async fn run_once(&self) -> ChainResult<SweepReport> {
        let overdue = self
            .engine
            .expired_tickets(self.config.batch_limit)
            .await?;
        let mut report = SweepReport {
            examined: overdue.len(),
            ..SweepReport::default()
        };

        for ticket in overdue {
            match self.engine.expire(ticket.id).await {
                Ok(ExpireOutcome::Expired { removed, .. }) => {
                    report.expired += 1;
                    report.removed += removed.len();
                }
                Ok(ExpireOutcome::AlreadyTerminal(_)) => report.skipped += 1,
                Err(err) if err.category() == ErrorCategory::Fatal => {
                    report.failed += 1;
                    tracing::error!(
                        target: "thechain::integrity",
                        ticket_id = %ticket.id,
                        code = err.code(),
                        error = %err,
                        "Ticket expiry aborted by integrity failure"
                    );
                }
                Err(err) => {
                    report.failed += 1;
                    tracing::warn!(
                        ticket_id = %ticket.id,
                        code = err.code(),
                        error = %err,
                        "Ticket expiry failed, will retry next sweep"
                    );
                }
            }
        }

        report.warned = match self.warn_expiring().await {
            Ok(warned) => warned,
            Err(err) => {
                tracing::warn!(error = %err, "Expiring-soon scan failed");
                0
            }
        };

        if report.examined > 0 || report.warned > 0 {
            tracing::info!(
                examined = report.examined,
                expired = report.expired,
                skipped = report.skipped,
                failed = report.failed,
                removed = report.removed,
                warned = report.warned,
                "Expiration sweep finished"
            );
        }
        Ok(report)
    }

    /// Warn once per ticket per window, using the narrowest window that
    /// contains the deadline. Returns the number of warnings sent.
    async fn warn_expiring(&self) -> ChainResult<usize> {
        let Some(&widest) = self.config.warning_windows_hours.last() else {
            return Ok(0);
        };
        let now = self.engine.effects().clock.now();
        let upcoming = self
            .engine
            .expiring_tickets(Duration::hours(i64::from(widest)), self.config.batch_limit)
            .await?;

        let mut notifications = Vec::new();
        {
            let mut warned = self.warned.lock();
            let current: HashSet<TicketId> = upcoming.iter().map(|t| t.id).collect();
            warned.retain(|(id, _)| current.contains(id));

            for ticket in &upcoming {
                let remaining = ticket.expires_at - now;
                let Some(&window) = self
                    .config
                    .warning_windows_hours
                    .iter()
                    .find(|&&hours| remaining <= Duration::hours(i64::from(hours)))
                else {
                    continue;
                };
                if warned.contains(&(ticket.id, window)) {
                    continue;
                }
                for &wider in self
                    .config
                    .warning_windows_hours
                    .iter()
                    .filter(|&&hours| hours >= window)
                {
                    warned.insert((ticket.id, wider));
                }
                notifications.push(Notification::TicketExpiringSoon {
                    owner: ticket.owner_position,
                    ticket_id: ticket.id,
                    expires_at: ticket.expires_at,
                    window_hours: window,
                });
            }
        }

        let sent = notifications.len();
        self.engine.notify(notifications).await;
        Ok(sent)
    }

    /// Run `run_once` every `interval_secs` until the registry shuts down
    pub fn spawn(self: Arc<Self>, registry: &TaskRegistry) {
        let interval = self.config.interval();
        registry.spawn_interval_until(interval, move || {
            let sweeper = Arc::clone(&self);
            async move {
                if let Err(err) = sweeper.run_once().await {
                    tracing::warn!(code = err.code(), error = %err, "Expiration sweep skipped");
                }
                true
            }
        });
    }
}
