//! Persistence contract.
//!
//! The engine performs each operation inside one `StoreTxn`. A transaction
//! that is dropped without `commit` must leave no trace, and transactions must
//! be serializable with respect to each other: two concurrent claims never
//! observe the same `next_position`, and a ticket status change is always a
//! compare-and-set (`transition_ticket`), never a blind overwrite.
//!
//! Query shapes are deliberately bounded: `tip` is a single descending scan
//! that stops at the first live member without a live invitee, and the ticket
//! queries take an explicit `limit`.

use crate::badge::{BadgeAward, BadgeKind};
use crate::identifiers::{Position, TicketId};
use crate::invitation::{InvitationRecord, InvitationStatus};
use crate::member::Member;
use crate::ticket::{Ticket, TicketStatus};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Error type for store operations
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
pub enum StoreError {
    /// Backend cannot be reached or refused the operation
    #[error("Store unavailable: {reason}")]
    Unavailable {
        /// Failure detail
        reason: String,
    },
    /// Write would break a uniqueness or status constraint
    #[error("Constraint violated: {reason}")]
    Constraint {
        /// Which constraint
        reason: String,
    },
    /// Update targeted a row that does not exist
    #[error("Missing {entity}")]
    Missing {
        /// Entity description
        entity: String,
    },
}

impl StoreError {
    /// Create an unavailable error
    pub fn unavailable(reason: impl Into<String>) -> Self {
        Self::Unavailable {
            reason: reason.into(),
        }
    }

    /// Create a constraint error
    pub fn constraint(reason: impl Into<String>) -> Self {
        Self::Constraint {
            reason: reason.into(),
        }
    }

    /// Create a missing-row error
    pub fn missing(entity: impl Into<String>) -> Self {
        Self::Missing {
            entity: entity.into(),
        }
    }
}

/// Factory for units of work
#[async_trait]
pub trait ChainStore: Send + Sync {
    /// Open a serializable transaction
    async fn begin(&self) -> Result<Box<dyn StoreTxn>, StoreError>;
}

/// A serializable unit of work. Dropping it without `commit` rolls back.
#[async_trait]
pub trait StoreTxn: Send {
    // ====== Members ======

    /// Member at `position`
    async fn member(&mut self, position: Position) -> Result<Option<Member>, StoreError>;

    /// Insert a new member; fails if the position is taken
    async fn insert_member(&mut self, member: Member) -> Result<(), StoreError>;

    /// Overwrite the mutable fields of an existing member
    async fn update_member(&mut self, member: &Member) -> Result<(), StoreError>;

    /// Next unassigned position (highest position + 1, or the seed position)
    async fn next_position(&mut self) -> Result<Position, StoreError>;

    /// The seed member, if bootstrapped
    async fn seed(&mut self) -> Result<Option<Member>, StoreError>;

    /// Highest-position live member whose invitee is absent or no longer
    /// ACTIVE according to its invitation record
    async fn tip(&mut self) -> Result<Option<Member>, StoreError>;

    /// Members in ascending position order, starting after `after`
    async fn members(
        &mut self,
        after: Option<Position>,
        limit: usize,
    ) -> Result<Vec<Member>, StoreError>;

    // ====== Tickets ======

    /// Ticket by id
    async fn ticket(&mut self, id: TicketId) -> Result<Option<Ticket>, StoreError>;

    /// Insert a new ticket; fails if the owner already holds an ACTIVE one
    async fn insert_ticket(&mut self, ticket: Ticket) -> Result<(), StoreError>;

    /// Compare-and-set: store `ticket` only if the stored status is still
    /// `expected`. Returns `false` when another writer got there first.
    async fn transition_ticket(
        &mut self,
        expected: TicketStatus,
        ticket: &Ticket,
    ) -> Result<bool, StoreError>;

    /// The owner's ACTIVE ticket, if any
    async fn active_ticket_for(&mut self, owner: Position) -> Result<Option<Ticket>, StoreError>;

    /// ACTIVE tickets with `expires_at < now`, oldest deadline first
    async fn expired_active_tickets(
        &mut self,
        now: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<Ticket>, StoreError>;

    /// ACTIVE tickets with `after <= expires_at <= until`, oldest deadline first
    async fn expiring_tickets(
        &mut self,
        after: DateTime<Utc>,
        until: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<Ticket>, StoreError>;

    // ====== Invitation records ======

    /// Record whose child is `child`
    async fn invitation_for_child(
        &mut self,
        child: Position,
    ) -> Result<Option<InvitationRecord>, StoreError>;

    /// Insert a record; fails if the child already has one
    async fn insert_invitation(&mut self, record: InvitationRecord) -> Result<(), StoreError>;

    /// Set the status of the child's record. Returns `false` if unchanged.
    async fn set_invitation_status(
        &mut self,
        child: Position,
        status: InvitationStatus,
        at: DateTime<Utc>,
    ) -> Result<bool, StoreError>;

    /// Number of the parent's records in `status`
    async fn count_invitations(
        &mut self,
        parent: Position,
        status: InvitationStatus,
    ) -> Result<u32, StoreError>;

    /// All records whose parent is `parent`
    async fn children_of(&mut self, parent: Position) -> Result<Vec<InvitationRecord>, StoreError>;

    // ====== Badges ======

    /// Whether `position` holds `badge`
    async fn has_badge(&mut self, position: Position, badge: BadgeKind) -> Result<bool, StoreError>;

    /// Record an award; fails if already held
    async fn insert_badge(&mut self, award: BadgeAward) -> Result<(), StoreError>;

    // ====== Lifecycle ======

    /// Make every write in this transaction durable
    async fn commit(self: Box<Self>) -> Result<(), StoreError>;
}
