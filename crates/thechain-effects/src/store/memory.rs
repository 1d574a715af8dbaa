//! In-memory transactional store
//!
//! A transaction owns the state lock for its whole lifetime, which makes
//! transactions trivially serializable. Every write pushes the previous value
//! of the touched row onto an undo log; dropping the transaction without
//! `commit` replays that log in reverse.
//!
//! Secondary indexes (active ticket per owner, active tickets by deadline,
//! invitation records by parent) are maintained by the `put_*` helpers so the
//! undo path restores them too.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex as SyncMutex;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::ops::Bound;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use thechain_core::effects::{ChainStore, StoreError, StoreTxn};
use thechain_core::{
    BadgeAward, BadgeKind, InvitationRecord, InvitationStatus, Member, Position, Ticket, TicketId,
    TicketStatus,
};
use tokio::sync::{Mutex, OwnedMutexGuard};

#[derive(Debug, Default)]
struct MemoryState {
    members: BTreeMap<Position, Member>,
    tickets: HashMap<TicketId, Ticket>,
    active_by_owner: HashMap<Position, TicketId>,
    active_by_expiry: BTreeSet<(DateTime<Utc>, TicketId)>,
    // keyed by child position
    invitations: HashMap<Position, InvitationRecord>,
    children: BTreeMap<Position, BTreeSet<Position>>,
    badges: BTreeMap<(Position, BadgeKind), BadgeAward>,
}

impl MemoryState {
    fn put_member(&mut self, position: Position, member: Option<Member>) -> Option<Member> {
        match member {
            Some(member) => self.members.insert(position, member),
            None => self.members.remove(&position),
        }
    }

    fn put_ticket(&mut self, id: TicketId, ticket: Option<Ticket>) -> Option<Ticket> {
        let previous = self.tickets.remove(&id);
        if let Some(prev) = &previous {
            self.unindex_ticket(prev);
        }
        if let Some(ticket) = ticket {
            self.index_ticket(&ticket);
            self.tickets.insert(id, ticket);
        }
        previous
    }

    fn index_ticket(&mut self, ticket: &Ticket) {
        if ticket.is_active() {
            self.active_by_owner.insert(ticket.owner_position, ticket.id);
            self.active_by_expiry.insert((ticket.expires_at, ticket.id));
        }
    }

    fn unindex_ticket(&mut self, ticket: &Ticket) {
        if ticket.is_active() {
            if self.active_by_owner.get(&ticket.owner_position) == Some(&ticket.id) {
                self.active_by_owner.remove(&ticket.owner_position);
            }
            self.active_by_expiry.remove(&(ticket.expires_at, ticket.id));
        }
    }

    fn put_invitation(
        &mut self,
        child: Position,
        record: Option<InvitationRecord>,
    ) -> Option<InvitationRecord> {
        let previous = self.invitations.remove(&child);
        if let Some(prev) = &previous {
            if let Some(siblings) = self.children.get_mut(&prev.parent_position) {
                siblings.remove(&child);
                if siblings.is_empty() {
                    self.children.remove(&prev.parent_position);
                }
            }
        }
        if let Some(record) = record {
            self.children
                .entry(record.parent_position)
                .or_default()
                .insert(child);
            self.invitations.insert(child, record);
        }
        previous
    }

    fn put_badge(
        &mut self,
        key: (Position, BadgeKind),
        award: Option<BadgeAward>,
    ) -> Option<BadgeAward> {
        match award {
            Some(award) => self.badges.insert(key, award),
            None => self.badges.remove(&key),
        }
    }

    fn has_live_invitee(&self, member: &Member) -> bool {
        member
            .active_child_position
            .and_then(|child| self.invitations.get(&child))
            .is_some_and(InvitationRecord::is_active)
    }
}

/// Previous value of one touched row
#[derive(Debug)]
enum Undo {
    Member(Position, Option<Member>),
    Ticket(TicketId, Option<Ticket>),
    Invitation(Position, Option<InvitationRecord>),
    Badge((Position, BadgeKind), Option<BadgeAward>),
}

impl Undo {
    fn revert(self, state: &mut MemoryState) {
        match self {
            Undo::Member(position, previous) => {
                state.put_member(position, previous);
            }
            Undo::Ticket(id, previous) => {
                state.put_ticket(id, previous);
            }
            Undo::Invitation(child, previous) => {
                state.put_invitation(child, previous);
            }
            Undo::Badge(key, previous) => {
                state.put_badge(key, previous);
            }
        }
    }
}

#[derive(Debug, Default)]
struct StoreFaults {
    unavailable: AtomicBool,
    failing_tickets: SyncMutex<HashSet<TicketId>>,
}

impl StoreFaults {
    fn check_ticket(&self, id: TicketId) -> Result<(), StoreError> {
        if self.failing_tickets.lock().contains(&id) {
            return Err(StoreError::unavailable(format!("injected read failure for {id}")));
        }
        Ok(())
    }
}

/// In-memory `ChainStore`. Clones share the same state.
#[derive(Debug, Clone, Default)]
pub struct MemoryChainStore {
    state: Arc<Mutex<MemoryState>>,
    faults: Arc<StoreFaults>,
}

impl MemoryChainStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `begin` fail until cleared
    pub fn set_unavailable(&self, unavailable: bool) {
        self.faults.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Make every read or write of `ticket_id` fail
    pub fn fail_reads_of(&self, ticket_id: TicketId) {
        self.faults.failing_tickets.lock().insert(ticket_id);
    }

    /// Clear all injected ticket failures
    pub fn clear_faults(&self) {
        self.faults.failing_tickets.lock().clear();
        self.set_unavailable(false);
    }
}

#[async_trait]
impl ChainStore for MemoryChainStore {
    async fn begin(&self) -> Result<Box<dyn StoreTxn>, StoreError> {
        if self.faults.unavailable.load(Ordering::SeqCst) {
            return Err(StoreError::unavailable("memory store marked unavailable"));
        }
        let state = self.state.clone().lock_owned().await;
        Ok(Box::new(MemoryTxn {
            state,
            undo: Vec::new(),
            faults: self.faults.clone(),
        }))
    }
}

/// Unit of work over `MemoryChainStore`
struct MemoryTxn {
    state: OwnedMutexGuard<MemoryState>,
    undo: Vec<Undo>,
    faults: Arc<StoreFaults>,
}

impl Drop for MemoryTxn {
    fn drop(&mut self) {
        if self.undo.is_empty() {
            return;
        }
        tracing::debug!(writes = self.undo.len(), "Rolling back uncommitted transaction");
        while let Some(entry) = self.undo.pop() {
            entry.revert(&mut self.state);
        }
    }
}

impl MemoryTxn {
    fn live_ticket(&self, id: TicketId) -> Result<Option<&Ticket>, StoreError> {
        self.faults.check_ticket(id)?;
        Ok(self.state.tickets.get(&id))
    }

    fn collect_tickets<'a>(
        &self,
        keys: impl Iterator<Item = &'a (DateTime<Utc>, TicketId)>,
        limit: usize,
    ) -> Vec<Ticket> {
        keys.take(limit)
            .filter_map(|(_, id)| self.state.tickets.get(id).cloned())
            .collect()
    }
}

#[async_trait]
impl StoreTxn for MemoryTxn {
    async fn member(&mut self, position: Position) -> Result<Option<Member>, StoreError> {
        Ok(self.state.members.get(&position).cloned())
    }

    async fn insert_member(&mut self, member: Member) -> Result<(), StoreError> {
        if self.state.members.contains_key(&member.position) {
            return Err(StoreError::constraint(format!(
                "position {} already taken",
                member.position
            )));
        }
        let position = member.position;
        let previous = self.state.put_member(position, Some(member));
        self.undo.push(Undo::Member(position, previous));
        Ok(())
    }

    async fn update_member(&mut self, member: &Member) -> Result<(), StoreError> {
        if !self.state.members.contains_key(&member.position) {
            return Err(StoreError::missing(format!("member {}", member.position)));
        }
        let previous = self.state.put_member(member.position, Some(member.clone()));
        self.undo.push(Undo::Member(member.position, previous));
        Ok(())
    }

    async fn next_position(&mut self) -> Result<Position, StoreError> {
        Ok(self
            .state
            .members
            .keys()
            .next_back()
            .map_or(Position::SEED, |highest| highest.next()))
    }

    async fn seed(&mut self) -> Result<Option<Member>, StoreError> {
        Ok(self
            .state
            .members
            .get(&Position::SEED)
            .filter(|m| m.is_seed())
            .cloned())
    }

    async fn tip(&mut self) -> Result<Option<Member>, StoreError> {
        let state = &*self.state;
        Ok(state
            .members
            .values()
            .rev()
            .find(|m| m.is_live() && !state.has_live_invitee(m))
            .cloned())
    }

    async fn members(
        &mut self,
        after: Option<Position>,
        limit: usize,
    ) -> Result<Vec<Member>, StoreError> {
        let lower = after.map_or(Bound::Unbounded, Bound::Excluded);
        Ok(self
            .state
            .members
            .range((lower, Bound::Unbounded))
            .take(limit)
            .map(|(_, m)| m.clone())
            .collect())
    }

    async fn ticket(&mut self, id: TicketId) -> Result<Option<Ticket>, StoreError> {
        Ok(self.live_ticket(id)?.cloned())
    }

    async fn insert_ticket(&mut self, ticket: Ticket) -> Result<(), StoreError> {
        self.faults.check_ticket(ticket.id)?;
        if self.state.tickets.contains_key(&ticket.id) {
            return Err(StoreError::constraint(format!(
                "ticket {} already exists",
                ticket.id
            )));
        }
        if ticket.is_active() {
            if let Some(existing) = self.state.active_by_owner.get(&ticket.owner_position) {
                return Err(StoreError::constraint(format!(
                    "member {} already holds active ticket {}",
                    ticket.owner_position, existing
                )));
            }
        }
        let id = ticket.id;
        let previous = self.state.put_ticket(id, Some(ticket));
        self.undo.push(Undo::Ticket(id, previous));
        Ok(())
    }

    async fn transition_ticket(
        &mut self,
        expected: TicketStatus,
        ticket: &Ticket,
    ) -> Result<bool, StoreError> {
        let Some(current) = self.live_ticket(ticket.id)? else {
            return Err(StoreError::missing(format!("ticket {}", ticket.id)));
        };
        if current.status != expected {
            return Ok(false);
        }
        let previous = self.state.put_ticket(ticket.id, Some(ticket.clone()));
        self.undo.push(Undo::Ticket(ticket.id, previous));
        Ok(true)
    }

    async fn active_ticket_for(&mut self, owner: Position) -> Result<Option<Ticket>, StoreError> {
        let Some(id) = self.state.active_by_owner.get(&owner).copied() else {
            return Ok(None);
        };
        Ok(self.live_ticket(id)?.cloned())
    }

    async fn expired_active_tickets(
        &mut self,
        now: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<Ticket>, StoreError> {
        let keys = self
            .state
            .active_by_expiry
            .iter()
            .take_while(|(expires_at, _)| *expires_at < now);
        Ok(self.collect_tickets(keys, limit))
    }

    async fn expiring_tickets(
        &mut self,
        after: DateTime<Utc>,
        until: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<Ticket>, StoreError> {
        let keys = self
            .state
            .active_by_expiry
            .iter()
            .skip_while(|(expires_at, _)| *expires_at < after)
            .take_while(|(expires_at, _)| *expires_at <= until);
        Ok(self.collect_tickets(keys, limit))
    }

    async fn invitation_for_child(
        &mut self,
        child: Position,
    ) -> Result<Option<InvitationRecord>, StoreError> {
        Ok(self.state.invitations.get(&child).cloned())
    }

    async fn insert_invitation(&mut self, record: InvitationRecord) -> Result<(), StoreError> {
        let child = record.child_position;
        if self.state.invitations.contains_key(&child) {
            return Err(StoreError::constraint(format!(
                "member {child} already has an invitation record"
            )));
        }
        let previous = self.state.put_invitation(child, Some(record));
        self.undo.push(Undo::Invitation(child, previous));
        Ok(())
    }

    async fn set_invitation_status(
        &mut self,
        child: Position,
        status: InvitationStatus,
        at: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let Some(current) = self.state.invitations.get(&child) else {
            return Err(StoreError::missing(format!("invitation for {child}")));
        };
        if current.status == status {
            return Ok(false);
        }
        let mut updated = current.clone();
        updated.status = status;
        updated.status_changed_at = Some(at);
        let previous = self.state.put_invitation(child, Some(updated));
        self.undo.push(Undo::Invitation(child, previous));
        Ok(true)
    }

    async fn count_invitations(
        &mut self,
        parent: Position,
        status: InvitationStatus,
    ) -> Result<u32, StoreError> {
        let state = &*self.state;
        let count = state
            .children
            .get(&parent)
            .into_iter()
            .flatten()
            .filter_map(|child| state.invitations.get(child))
            .filter(|record| record.status == status)
            .count();
        Ok(u32::try_from(count).unwrap_or(u32::MAX))
    }

    async fn children_of(&mut self, parent: Position) -> Result<Vec<InvitationRecord>, StoreError> {
        let state = &*self.state;
        Ok(state
            .children
            .get(&parent)
            .into_iter()
            .flatten()
            .filter_map(|child| state.invitations.get(child).cloned())
            .collect())
    }

    async fn has_badge(&mut self, position: Position, badge: BadgeKind) -> Result<bool, StoreError> {
        Ok(self.state.badges.contains_key(&(position, badge)))
    }

    async fn insert_badge(&mut self, award: BadgeAward) -> Result<(), StoreError> {
        let key = (award.position, award.badge);
        if self.state.badges.contains_key(&key) {
            return Err(StoreError::constraint(format!(
                "member {} already holds {}",
                award.position,
                award.badge.as_str()
            )));
        }
        let previous = self.state.put_badge(key, Some(award));
        self.undo.push(Undo::Badge(key, previous));
        Ok(())
    }

    async fn commit(mut self: Box<Self>) -> Result<(), StoreError> {
        self.undo.clear();
        Ok(())
    }
}
