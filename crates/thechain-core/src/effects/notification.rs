//! Notification effect.
//!
//! The engine emits notifications only after the transaction that produced
//! them has committed. Delivery is fire-and-forget: a failed delivery is
//! logged and never rolls back chain state.

use crate::badge::BadgeKind;
use crate::identifiers::{Position, TicketId};
use crate::member::RemovalReason;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Events delivered to members
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Notification {
    /// Owner's ticket expires within `window_hours`
    TicketExpiringSoon {
        /// Ticket owner
        owner: Position,
        /// Ticket
        ticket_id: TicketId,
        /// Deadline
        expires_at: DateTime<Utc>,
        /// Warning window that matched
        window_hours: u32,
    },
    /// Owner's ticket expired unused
    TicketExpired {
        /// Ticket owner
        owner: Position,
        /// Ticket
        ticket_id: TicketId,
        /// Owner's strikes after this expiry
        strike_count: u32,
        /// Strikes that trigger removal
        max_attempts: u32,
    },
    /// Inviter's ticket was redeemed
    TicketUsed {
        /// Ticket owner
        inviter: Position,
        /// New member
        invitee: Position,
        /// Ticket
        ticket_id: TicketId,
    },
    /// Member earned a badge
    BadgeEarned {
        /// Holder
        member: Position,
        /// Badge
        badge: BadgeKind,
    },
    /// Member was removed from the chain
    MemberRemoved {
        /// Removed member
        member: Position,
        /// Why
        reason: RemovalReason,
    },
    /// Member is the tip again after their invitee was removed
    BecameTip {
        /// New tip
        member: Position,
    },
}

impl Notification {
    /// Member the notification is addressed to
    pub fn recipient(&self) -> Position {
        match self {
            Notification::TicketExpiringSoon { owner, .. }
            | Notification::TicketExpired { owner, .. } => *owner,
            Notification::TicketUsed { inviter, .. } => *inviter,
            Notification::BadgeEarned { member, .. }
            | Notification::MemberRemoved { member, .. }
            | Notification::BecameTip { member } => *member,
        }
    }

    /// Short event name for logs
    pub fn kind(&self) -> &'static str {
        match self {
            Notification::TicketExpiringSoon { .. } => "ticket_expiring_soon",
            Notification::TicketExpired { .. } => "ticket_expired",
            Notification::TicketUsed { .. } => "ticket_used",
            Notification::BadgeEarned { .. } => "badge_earned",
            Notification::MemberRemoved { .. } => "member_removed",
            Notification::BecameTip { .. } => "became_tip",
        }
    }
}

/// Delivery failure
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Notification delivery failed: {reason}")]
pub struct NotifyError {
    /// Failure detail
    pub reason: String,
}

impl NotifyError {
    /// Create a delivery error
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

/// Notification delivery
#[async_trait]
pub trait NotificationEffects: Send + Sync {
    /// Deliver one notification
    async fn notify(&self, notification: &Notification) -> Result<(), NotifyError>;
}
