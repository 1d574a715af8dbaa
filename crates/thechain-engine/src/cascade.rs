//! Removal cascade
//!
//! Removing a member is a failed invitee from its parent's point of view. Once
//! a parent has `max_attempts` REMOVED invitation records it is removed too,
//! and the walk continues with the grandparent. The walk is an explicit loop
//! bounded by `max_cascade_depth` and a visited set; tripping either bound is
//! a data-integrity failure that aborts the whole transaction.

use crate::context::{OperationContext, Outbox};
use crate::graph::{self, DetachOutcome};
use std::collections::HashSet;
use thechain_core::effects::StoreTxn;
use thechain_core::{ChainError, ChainResult, InvitationStatus, Position, RemovalReason};

/// Remove `position` for `reason` and cascade up its ancestry.
///
/// Returns every member removed, `position` first. Empty when the member was
/// the seed or already removed.
pub async fn remove_member(
    txn: &mut dyn StoreTxn,
    position: Position,
    reason: RemovalReason,
    ctx: &OperationContext,
    outbox: &mut Outbox,
) -> ChainResult<Vec<Position>> {
    match graph::detach_and_revert(txn, position, reason, ctx.now, outbox).await? {
        DetachOutcome::Removed { .. } => {
            let mut removed = vec![position];
            removed.extend(check_and_cascade(txn, position, ctx, outbox).await?);
            Ok(removed)
        }
        DetachOutcome::AlreadyRemoved | DetachOutcome::SeedImmune => Ok(Vec::new()),
    }
}

/// Re-evaluate the ancestors of a just-removed member.
///
/// Returns the ancestors removed, nearest first.
pub async fn check_and_cascade(
    txn: &mut dyn StoreTxn,
    removed_child: Position,
    ctx: &OperationContext,
    outbox: &mut Outbox,
) -> ChainResult<Vec<Position>> {
    let mut removed = Vec::new();
    let mut visited = HashSet::from([removed_child]);
    let mut current = removed_child;
    let mut depth = 0usize;

    loop {
        let Some(record) = txn.invitation_for_child(current).await? else {
            tracing::debug!(member = %current, "No invitation record, cascade stops");
            break;
        };
        let parent_position = record.parent_position;

        if !visited.insert(parent_position) {
            return Err(exceeded(parent_position, depth, ctx));
        }

        let Some(parent) = txn.member(parent_position).await? else {
            tracing::error!(
                target: "thechain::integrity",
                member = %current,
                parent = %parent_position,
                "Invitation record points at a missing parent"
            );
            break;
        };
        if parent.is_seed() || parent.is_removed() {
            break;
        }

        let wasted = txn
            .count_invitations(parent_position, InvitationStatus::Removed)
            .await?;
        if wasted < ctx.rule.max_attempts {
            tracing::debug!(
                member = %parent_position,
                wasted,
                max_attempts = ctx.rule.max_attempts,
                "Parent below strike threshold"
            );
            break;
        }

        // Only a removal counts against the bound
        if depth >= ctx.max_cascade_depth {
            return Err(exceeded(parent_position, depth, ctx));
        }
        depth += 1;

        tracing::info!(
            member = %parent_position,
            wasted,
            "Parent reached the invitee strike threshold"
        );
        match graph::detach_and_revert(
            txn,
            parent_position,
            RemovalReason::WastedChildren,
            ctx.now,
            outbox,
        )
        .await?
        {
            DetachOutcome::Removed { .. } => removed.push(parent_position),
            DetachOutcome::AlreadyRemoved | DetachOutcome::SeedImmune => break,
        }
        current = parent_position;
    }

    Ok(removed)
}

fn exceeded(position: Position, depth: usize, ctx: &OperationContext) -> ChainError {
    tracing::error!(
        target: "thechain::integrity",
        member = %position,
        depth,
        max_depth = ctx.max_cascade_depth,
        "Removal cascade exceeded its bound"
    );
    ChainError::CascadeDepthExceeded {
        position,
        max_depth: ctx.max_cascade_depth,
    }
}
