//! Ticket lifecycle: issue, claim, expire, cancel
//!
//! Every status change goes through `StoreTxn::transition_ticket`, so a claim
//! and an expiry racing on the same ticket can never both win.

use crate::cascade;
use crate::context::{OperationContext, Outbox};
use crate::graph;
use chrono::{DateTime, TimeZone, Utc};
use thechain_core::effects::{Notification, StoreTxn};
use thechain_core::{
    ChainError, ChainResult, Member, NewcomerInfo, Position, RemovalReason, Ticket, TicketId,
    TicketPayload, TicketSigner, TicketStatus,
};
use uuid::Uuid;

/// Result of a claim that did not fail outright
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClaimResult {
    /// Newcomer joined the chain
    Joined {
        /// The new member
        member: Member,
        /// Ticket owner
        inviter: Position,
    },
    /// The deadline had passed; the ticket was expired instead. The caller
    /// commits that expiry and reports `TicketExpired`.
    ExpiredOnClaim {
        /// Ticket
        ticket_id: TicketId,
        /// Deadline that passed
        expires_at: DateTime<Utc>,
    },
}

/// Result of `expire`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExpireOutcome {
    /// Ticket moved to EXPIRED and the owner took a strike
    Expired {
        /// Ticket owner
        owner: Position,
        /// Owner's strikes after this expiry
        strike_count: u32,
        /// Members removed as a consequence, owner first
        removed: Vec<Position>,
    },
    /// Ticket was already terminal; nothing changed
    AlreadyTerminal(TicketStatus),
}

/// Issue a new ticket for `owner_position`
pub async fn issue(
    txn: &mut dyn StoreTxn,
    signer: &TicketSigner,
    owner_position: Position,
    ctx: &OperationContext,
) -> ChainResult<Ticket> {
    let owner = txn
        .member(owner_position)
        .await?
        .ok_or(ChainError::MemberNotFound {
            position: owner_position,
        })?;
    if owner.is_removed() {
        return Err(ChainError::MemberRemoved {
            position: owner_position,
        });
    }
    if let Some(child) = graph::effective_active_child(txn, &owner).await? {
        return Err(ChainError::OwnerHasActiveChild {
            owner: owner_position,
            child,
        });
    }
    if let Some(existing) = txn.active_ticket_for(owner_position).await? {
        return Err(ChainError::ActiveTicketExists {
            owner: owner_position,
            ticket_id: existing.id,
        });
    }

    let issued_at = millis_precision(ctx.now);
    let expires_at = issued_at + ctx.rule.ticket_duration();
    let payload = TicketPayload::new(
        owner_position,
        issued_at,
        expires_at,
        Uuid::new_v4().to_string(),
    )
    .encode();
    let signature = signer.sign(&payload);

    let ticket = Ticket {
        id: TicketId::new_random(),
        owner_position,
        payload,
        signature,
        status: TicketStatus::Active,
        issued_at,
        expires_at,
        claimed_by_position: None,
        claimed_at: None,
        attempt_number: ctx.rule.attempt_number(owner.strike_count),
    };
    txn.insert_ticket(ticket.clone()).await?;

    tracing::info!(
        owner = %owner_position,
        ticket_id = %ticket.id,
        %expires_at,
        attempt = ticket.attempt_number,
        "Ticket issued"
    );
    Ok(ticket)
}

/// Redeem a ticket for the next chain position
pub async fn claim(
    txn: &mut dyn StoreTxn,
    signer: &TicketSigner,
    ticket_id: TicketId,
    signature: &str,
    newcomer: &NewcomerInfo,
    ctx: &OperationContext,
    outbox: &mut Outbox,
) -> ChainResult<ClaimResult> {
    let mut ticket = txn
        .ticket(ticket_id)
        .await?
        .ok_or(ChainError::TicketNotFound { ticket_id })?;

    match ticket.status {
        TicketStatus::Active => {}
        TicketStatus::Expired => {
            return Err(ChainError::TicketExpired {
                ticket_id,
                expires_at: ticket.expires_at,
            })
        }
        status => return Err(ChainError::TicketNotActive { ticket_id, status }),
    }

    if ticket.has_expired(ctx.now) {
        expire(txn, ticket_id, ctx, outbox).await?;
        return Ok(ClaimResult::ExpiredOnClaim {
            ticket_id,
            expires_at: ticket.expires_at,
        });
    }

    if !signer.verify(&ticket.payload, signature) {
        tracing::warn!(
            %ticket_id,
            owner = %ticket.owner_position,
            "Ticket claim with invalid signature"
        );
        return Err(ChainError::InvalidSignature { ticket_id });
    }
    let signed_owner = TicketPayload::decode(&ticket.payload).map(|p| p.owner);
    if signed_owner.as_ref().ok() != Some(&ticket.owner_position) {
        tracing::warn!(%ticket_id, "Signed payload does not name the ticket owner");
        return Err(ChainError::InvalidSignature { ticket_id });
    }

    let parent_position = ticket.owner_position;
    let mut parent = txn
        .member(parent_position)
        .await?
        .ok_or(ChainError::ParentNotFound {
            position: parent_position,
        })?;
    if parent.is_removed() {
        return Err(ChainError::MemberRemoved {
            position: parent_position,
        });
    }
    if let Some(child) = graph::effective_active_child(txn, &parent).await? {
        return Err(ChainError::ParentHasChild {
            parent: parent_position,
            child,
        });
    }

    let position = txn.next_position().await?;
    let member = Member::joined(
        position,
        parent_position,
        newcomer.display_name_for(position),
        ctx.now,
    );
    txn.insert_member(member.clone()).await?;
    graph::attach(txn, &mut parent, &member, ticket_id, ctx.now).await?;

    ticket.claim_by(position, ctx.now)?;
    if !txn
        .transition_ticket(TicketStatus::Active, &ticket)
        .await?
    {
        let status = txn
            .ticket(ticket_id)
            .await?
            .map_or(TicketStatus::Used, |t| t.status);
        return Err(ChainError::TicketNotActive { ticket_id, status });
    }

    tracing::info!(
        %ticket_id,
        inviter = %parent_position,
        member = %position,
        "Ticket claimed"
    );
    outbox.push(Notification::TicketUsed {
        inviter: parent_position,
        invitee: position,
        ticket_id,
    });

    Ok(ClaimResult::Joined {
        member,
        inviter: parent_position,
    })
}

/// Expire a ticket, strike its owner and enforce the strike threshold.
///
/// A no-op on tickets that are already terminal.
pub async fn expire(
    txn: &mut dyn StoreTxn,
    ticket_id: TicketId,
    ctx: &OperationContext,
    outbox: &mut Outbox,
) -> ChainResult<ExpireOutcome> {
    let mut ticket = txn
        .ticket(ticket_id)
        .await?
        .ok_or(ChainError::TicketNotFound { ticket_id })?;
    if ticket.status.is_terminal() {
        return Ok(ExpireOutcome::AlreadyTerminal(ticket.status));
    }

    ticket.close(TicketStatus::Expired)?;
    if !txn
        .transition_ticket(TicketStatus::Active, &ticket)
        .await?
    {
        let status = txn
            .ticket(ticket_id)
            .await?
            .map_or(TicketStatus::Expired, |t| t.status);
        return Ok(ExpireOutcome::AlreadyTerminal(status));
    }

    let owner_position = ticket.owner_position;
    let Some(mut owner) = txn.member(owner_position).await? else {
        tracing::error!(
            target: "thechain::integrity",
            %ticket_id,
            owner = %owner_position,
            "Expired ticket has no owner"
        );
        return Ok(ExpireOutcome::Expired {
            owner: owner_position,
            strike_count: 0,
            removed: Vec::new(),
        });
    };

    owner.strike_count = owner.strike_count.saturating_add(1);
    txn.update_member(&owner).await?;
    tracing::info!(
        %ticket_id,
        owner = %owner_position,
        strikes = owner.strike_count,
        max_attempts = ctx.rule.max_attempts,
        "Ticket expired"
    );
    outbox.push(Notification::TicketExpired {
        owner: owner_position,
        ticket_id,
        strike_count: owner.strike_count,
        max_attempts: ctx.rule.max_attempts,
    });

    let removed = enforce_self_strikes(txn, &owner, ctx, outbox).await?;
    Ok(ExpireOutcome::Expired {
        owner: owner_position,
        strike_count: owner.strike_count,
        removed,
    })
}

async fn enforce_self_strikes(
    txn: &mut dyn StoreTxn,
    owner: &Member,
    ctx: &OperationContext,
    outbox: &mut Outbox,
) -> ChainResult<Vec<Position>> {
    if owner.strike_count < ctx.rule.max_attempts || !owner.is_live() {
        return Ok(Vec::new());
    }
    if owner.is_seed() {
        tracing::info!(
            strikes = owner.strike_count,
            "Seed reached the strike threshold and stays in the chain"
        );
        return Ok(Vec::new());
    }
    cascade::remove_member(
        txn,
        owner.position,
        RemovalReason::WastedTickets,
        ctx,
        outbox,
    )
    .await
}

/// Withdraw an ACTIVE ticket without striking its owner
pub async fn cancel(txn: &mut dyn StoreTxn, ticket_id: TicketId) -> ChainResult<Ticket> {
    let mut ticket = txn
        .ticket(ticket_id)
        .await?
        .ok_or(ChainError::TicketNotFound { ticket_id })?;
    ticket.close(TicketStatus::Cancelled)?;
    if !txn
        .transition_ticket(TicketStatus::Active, &ticket)
        .await?
    {
        let status = txn
            .ticket(ticket_id)
            .await?
            .map_or(TicketStatus::Cancelled, |t| t.status);
        return Err(ChainError::TicketNotActive { ticket_id, status });
    }
    tracing::info!(%ticket_id, owner = %ticket.owner_position, "Ticket cancelled");
    Ok(ticket)
}

fn millis_precision(at: DateTime<Utc>) -> DateTime<Utc> {
    Utc.timestamp_millis_opt(at.timestamp_millis())
        .single()
        .unwrap_or(at)
}
