//! Chain graph: tip detection, attach and detach/revert
//!
//! All functions run inside the caller's transaction. The child's invitation
//! record is the source of truth for liveness; `active_child_position` is only
//! a pointer that may lag behind it.

use crate::context::Outbox;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thechain_core::effects::{Notification, StoreTxn};
use thechain_core::{
    ChainError, ChainResult, InvitationRecord, InvitationStatus, Member, MemberStatus, Position,
    RemovalReason, TicketId, TicketStatus,
};

/// Result of `detach_and_revert`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DetachOutcome {
    /// Member was removed
    Removed {
        /// Parent whose child pointer was cleared
        parent: Option<Position>,
    },
    /// Member had already been removed; nothing changed
    AlreadyRemoved,
    /// Member is the seed; nothing changed
    SeedImmune,
}

/// A member with its inviter and current live invitee
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Neighbours {
    /// The member itself
    pub member: Member,
    /// Whose ticket the member claimed
    pub inviter: Option<Member>,
    /// Current live invitee
    pub invitee: Option<Member>,
}

/// Current tip of the chain
pub async fn tip(txn: &mut dyn StoreTxn) -> ChainResult<Member> {
    txn.tip().await?.ok_or(ChainError::TipNotFound)
}

/// The member's invitee, if the invitee is still live
pub async fn effective_active_child(
    txn: &mut dyn StoreTxn,
    member: &Member,
) -> ChainResult<Option<Position>> {
    let Some(child) = member.active_child_position else {
        return Ok(None);
    };
    let live = txn
        .invitation_for_child(child)
        .await?
        .is_some_and(|record| record.is_active());
    Ok(live.then_some(child))
}

/// Link `child` under `parent` and record the edge
pub async fn attach(
    txn: &mut dyn StoreTxn,
    parent: &mut Member,
    child: &Member,
    ticket_id: TicketId,
    at: DateTime<Utc>,
) -> ChainResult<()> {
    if child.parent_position != Some(parent.position) {
        return Err(ChainError::invalid(format!(
            "member {} was not created under {}",
            child.position, parent.position
        )));
    }
    txn.insert_invitation(InvitationRecord::active(
        parent.position,
        child.position,
        ticket_id,
        at,
    ))
    .await?;
    parent.active_child_position = Some(child.position);
    txn.update_member(parent).await?;
    Ok(())
}

/// Soft-remove a member and unlink it from its parent.
///
/// Idempotent on removed members and a no-op on the seed. Any ACTIVE ticket
/// the member still holds is cancelled. The member's own children keep their
/// `parent_position`.
pub async fn detach_and_revert(
    txn: &mut dyn StoreTxn,
    position: Position,
    reason: RemovalReason,
    at: DateTime<Utc>,
    outbox: &mut Outbox,
) -> ChainResult<DetachOutcome> {
    let mut member = txn
        .member(position)
        .await?
        .ok_or(ChainError::MemberNotFound { position })?;

    if member.is_removed() {
        tracing::debug!(member = %position, "Member already removed");
        return Ok(DetachOutcome::AlreadyRemoved);
    }
    if member.is_seed() {
        tracing::warn!(member = %position, %reason, "Refusing to remove the seed");
        return Ok(DetachOutcome::SeedImmune);
    }

    member.status = MemberStatus::Removed;
    member.removal_reason = Some(reason);
    member.removed_at = Some(at);
    txn.update_member(&member).await?;

    if let Some(mut ticket) = txn.active_ticket_for(position).await? {
        ticket.close(TicketStatus::Cancelled)?;
        txn.transition_ticket(TicketStatus::Active, &ticket).await?;
        tracing::debug!(member = %position, ticket_id = %ticket.id, "Cancelled ticket of removed member");
    }

    if txn.invitation_for_child(position).await?.is_some() {
        txn.set_invitation_status(position, InvitationStatus::Removed, at)
            .await?;
    }

    if let Some(parent_position) = member.parent_position {
        if let Some(mut parent) = txn.member(parent_position).await? {
            if parent.active_child_position == Some(position) {
                parent.active_child_position = None;
                txn.update_member(&parent).await?;
            }
        }
    }

    tracing::info!(
        member = %position,
        parent = ?member.parent_position.map(|p| p.value()),
        %reason,
        "Member removed from chain"
    );
    outbox.push(Notification::MemberRemoved {
        member: position,
        reason,
    });

    Ok(DetachOutcome::Removed {
        parent: member.parent_position,
    })
}

/// The member plus its inviter and live invitee
pub async fn neighbours(txn: &mut dyn StoreTxn, position: Position) -> ChainResult<Neighbours> {
    let member = txn
        .member(position)
        .await?
        .ok_or(ChainError::MemberNotFound { position })?;

    let inviter = match member.parent_position {
        Some(parent) => txn.member(parent).await?,
        None => None,
    };
    let invitee = match effective_active_child(txn, &member).await? {
        Some(child) => txn.member(child).await?,
        None => None,
    };

    Ok(Neighbours {
        member,
        inviter,
        invitee,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use chrono::TimeZone;
    use thechain_core::effects::ChainStore;
    use thechain_effects::MemoryChainStore;

    fn at() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 5, 1, 0, 0, 0).unwrap()
    }

    /// seed(1) -> 2 -> 3, committed
    async fn line_of_three() -> MemoryChainStore {
        let store = MemoryChainStore::new();
        let mut txn = store.begin().await.unwrap();
        let mut seed = Member::seed("origin", at());
        txn.insert_member(seed.clone()).await.unwrap();
        let mut two = Member::joined(Position::new(2), Position::SEED, "two", at());
        txn.insert_member(two.clone()).await.unwrap();
        attach(txn.as_mut(), &mut seed, &two, TicketId::new_random(), at())
            .await
            .unwrap();
        let three = Member::joined(Position::new(3), Position::new(2), "three", at());
        txn.insert_member(three.clone()).await.unwrap();
        attach(txn.as_mut(), &mut two, &three, TicketId::new_random(), at())
            .await
            .unwrap();
        txn.commit().await.unwrap();
        store
    }

    #[tokio::test]
    async fn test_attach_requires_matching_parent() {
        let store = MemoryChainStore::new();
        let mut txn = store.begin().await.unwrap();
        let mut seed = Member::seed("origin", at());
        txn.insert_member(seed.clone()).await.unwrap();
        let stranger = Member::joined(Position::new(2), Position::new(9), "x", at());
        assert_matches!(
            attach(txn.as_mut(), &mut seed, &stranger, TicketId::new_random(), at()).await,
            Err(ChainError::Invalid { .. })
        );
    }

    #[tokio::test]
    async fn test_detach_clears_parent_and_keeps_history() {
        let store = line_of_three().await;
        let mut txn = store.begin().await.unwrap();
        let mut outbox = Outbox::new();

        let outcome = detach_and_revert(
            txn.as_mut(),
            Position::new(2),
            RemovalReason::Administrative,
            at(),
            &mut outbox,
        )
        .await
        .unwrap();
        assert_eq!(
            outcome,
            DetachOutcome::Removed {
                parent: Some(Position::SEED)
            }
        );

        let seed = txn.member(Position::SEED).await.unwrap().unwrap();
        assert!(seed.active_child_position.is_none());
        let two = txn.member(Position::new(2)).await.unwrap().unwrap();
        assert_eq!(two.status, MemberStatus::Removed);
        assert_eq!(two.removal_reason, Some(RemovalReason::Administrative));
        let three = txn.member(Position::new(3)).await.unwrap().unwrap();
        assert_eq!(three.parent_position, Some(Position::new(2)));
        let record = txn
            .invitation_for_child(Position::new(2))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(record.status, InvitationStatus::Removed);
        assert_eq!(outbox.pending().len(), 1);

        // Member 3 is still live and outranks the seed
        assert_eq!(tip(txn.as_mut()).await.unwrap().position, Position::new(3));
    }

    #[tokio::test]
    async fn test_detach_is_idempotent() {
        let store = line_of_three().await;
        let mut txn = store.begin().await.unwrap();
        let mut outbox = Outbox::new();
        for _ in 0..2 {
            detach_and_revert(
                txn.as_mut(),
                Position::new(3),
                RemovalReason::WastedTickets,
                at(),
                &mut outbox,
            )
            .await
            .unwrap();
        }
        assert_eq!(
            detach_and_revert(
                txn.as_mut(),
                Position::new(3),
                RemovalReason::Administrative,
                at(),
                &mut outbox,
            )
            .await
            .unwrap(),
            DetachOutcome::AlreadyRemoved
        );
        let three = txn.member(Position::new(3)).await.unwrap().unwrap();
        assert_eq!(three.removal_reason, Some(RemovalReason::WastedTickets));
        assert_eq!(outbox.pending().len(), 1);
    }

    #[tokio::test]
    async fn test_seed_is_immune() {
        let store = line_of_three().await;
        let mut txn = store.begin().await.unwrap();
        let mut outbox = Outbox::new();
        let outcome = detach_and_revert(
            txn.as_mut(),
            Position::SEED,
            RemovalReason::Administrative,
            at(),
            &mut outbox,
        )
        .await
        .unwrap();
        assert_eq!(outcome, DetachOutcome::SeedImmune);
        let seed = txn.seed().await.unwrap().unwrap();
        assert_eq!(seed.status, MemberStatus::Seed);
        assert_eq!(seed.active_child_position, Some(Position::new(2)));
        assert!(outbox.pending().is_empty());
    }

    #[tokio::test]
    async fn test_neighbours_hide_removed_invitee() {
        let store = line_of_three().await;
        let mut txn = store.begin().await.unwrap();
        let view = neighbours(txn.as_mut(), Position::new(2)).await.unwrap();
        assert_eq!(view.inviter.map(|m| m.position), Some(Position::SEED));
        assert_eq!(view.invitee.map(|m| m.position), Some(Position::new(3)));

        // Stale pointer on 2 after its child's record flips
        txn.set_invitation_status(Position::new(3), InvitationStatus::Removed, at())
            .await
            .unwrap();
        let view = neighbours(txn.as_mut(), Position::new(2)).await.unwrap();
        assert!(view.invitee.is_none());
        assert_matches!(
            neighbours(txn.as_mut(), Position::new(42)).await,
            Err(ChainError::MemberNotFound { .. })
        );
    }
}
