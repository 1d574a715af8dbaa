//! Parent/child audit edges
//!
//! One record per child, created together with the claim and never deleted.
//! The record's status is the source of truth for whether a child is still
//! live from the parent's point of view.

use crate::identifiers::{Position, TicketId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Invitation record status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InvitationStatus {
    /// Child is live in the chain
    Active,
    /// Child was removed
    Removed,
    /// Chain was reverted past this edge.
    ///
    /// Part of the stored record format; the engine never writes it. Such a
    /// record is not live and does not count as a removed invitee.
    Reverted,
}

/// Append-only edge `(parent, child, ticket, status)`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvitationRecord {
    /// Inviting member
    pub parent_position: Position,
    /// Invited member, unique across records
    pub child_position: Position,
    /// Ticket that was redeemed
    pub ticket_id: TicketId,
    /// Current status
    pub status: InvitationStatus,
    /// When the ticket was claimed
    pub invited_at: DateTime<Utc>,
    /// Last status change
    pub status_changed_at: Option<DateTime<Utc>>,
}

impl InvitationRecord {
    /// New active edge
    pub fn active(
        parent_position: Position,
        child_position: Position,
        ticket_id: TicketId,
        invited_at: DateTime<Utc>,
    ) -> Self {
        Self {
            parent_position,
            child_position,
            ticket_id,
            status: InvitationStatus::Active,
            invited_at,
            status_changed_at: None,
        }
    }

    /// Whether the child is still live
    pub fn is_active(&self) -> bool {
        self.status == InvitationStatus::Active
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn record(status: InvitationStatus) -> InvitationRecord {
        InvitationRecord {
            status,
            ..InvitationRecord::active(
                Position::SEED,
                Position::new(2),
                TicketId::new_random(),
                Utc.with_ymd_and_hms(2025, 3, 1, 0, 0, 0).unwrap(),
            )
        }
    }

    #[test]
    fn test_only_active_records_are_live() {
        assert!(record(InvitationStatus::Active).is_active());
        assert!(!record(InvitationStatus::Removed).is_active());
        assert!(!record(InvitationStatus::Reverted).is_active());
    }

    #[test]
    fn test_stored_status_names() {
        let names: Vec<String> = [
            InvitationStatus::Active,
            InvitationStatus::Removed,
            InvitationStatus::Reverted,
        ]
        .iter()
        .map(|s| serde_json::to_string(s).unwrap())
        .collect();
        assert_eq!(names, ["\"ACTIVE\"", "\"REMOVED\"", "\"REVERTED\""]);
        let parsed: InvitationStatus = serde_json::from_str("\"REVERTED\"").unwrap();
        assert_eq!(parsed, InvitationStatus::Reverted);
    }
}
