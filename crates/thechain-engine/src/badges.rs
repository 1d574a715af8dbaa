//! Recovery badge
//!
//! A member who lost at least one invitee and then invited again successfully
//! earns `chain_savior`, once.

use crate::graph;
use chrono::{DateTime, Utc};
use thechain_core::effects::StoreTxn;
use thechain_core::{BadgeAward, BadgeKind, ChainResult, InvitationStatus, Position};

/// Award `chain_savior` to `position` if eligible and not yet held
pub async fn award_recovery_badge(
    txn: &mut dyn StoreTxn,
    position: Position,
    now: DateTime<Utc>,
) -> ChainResult<Option<BadgeAward>> {
    let Some(member) = txn.member(position).await? else {
        return Ok(None);
    };
    if !member.is_live() || graph::effective_active_child(txn, &member).await?.is_none() {
        return Ok(None);
    }
    let removed_invitees = txn
        .count_invitations(position, InvitationStatus::Removed)
        .await?;
    if removed_invitees == 0 || txn.has_badge(position, BadgeKind::ChainSavior).await? {
        return Ok(None);
    }

    let award = BadgeAward {
        position,
        badge: BadgeKind::ChainSavior,
        awarded_at: now,
        removed_invitees,
    };
    txn.insert_badge(award.clone()).await?;
    tracing::info!(member = %position, removed_invitees, "Recovery badge awarded");
    Ok(Some(award))
}
