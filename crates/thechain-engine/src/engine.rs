//! `ChainEngine`: transactional entry points
//!
//! Each public method opens one store transaction, runs the lifecycle, graph
//! and cascade steps inside it, commits, and only then delivers the
//! notifications those steps queued. An error anywhere before commit drops the
//! transaction and leaves the store untouched.

use crate::badges;
use crate::cascade;
use crate::context::{OperationContext, Outbox};
use crate::graph::{self, Neighbours};
use crate::lifecycle::{self, ClaimResult, ExpireOutcome};
use std::sync::Arc;
use thechain_core::effects::{
    ChainStore, Notification, NotificationEffects, StoreTxn, TimeEffects,
};
use thechain_core::{
    ChainConfig, ChainError, ChainResult, Member, NewcomerInfo, Position, RemovalReason,
    RuleProvider, Ticket, TicketId, TicketSigner,
};

/// Injected effect handlers
#[derive(Clone)]
pub struct ChainEffects {
    /// Persistence
    pub store: Arc<dyn ChainStore>,
    /// Clock
    pub clock: Arc<dyn TimeEffects>,
    /// Notification delivery
    pub notifier: Arc<dyn NotificationEffects>,
    /// Rule in force
    pub rules: Arc<dyn RuleProvider>,
}

/// The chain-integrity engine
pub struct ChainEngine {
    effects: ChainEffects,
    signer: TicketSigner,
    config: ChainConfig,
}

impl std::fmt::Debug for ChainEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChainEngine")
            .field("signer", &self.signer)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl ChainEngine {
    /// Build an engine from a validated configuration
    pub fn new(config: ChainConfig, effects: ChainEffects) -> ChainResult<Self> {
        config.validate()?;
        let signer = TicketSigner::from_config(&config)?;
        Ok(Self {
            effects,
            signer,
            config,
        })
    }

    /// Ticket signer
    pub fn signer(&self) -> &TicketSigner {
        &self.signer
    }

    /// Engine configuration
    pub fn config(&self) -> &ChainConfig {
        &self.config
    }

    /// Injected effect handlers
    pub fn effects(&self) -> &ChainEffects {
        &self.effects
    }

    /// Sampled after the transaction opens so `now` is read under the store lock
    fn context(&self) -> OperationContext {
        let now = self.effects.clock.now();
        OperationContext {
            now,
            rule: self.effects.rules.effective_rule(now, self.config.rules),
            max_cascade_depth: self.config.cascade.max_depth,
        }
    }

    async fn begin(&self) -> ChainResult<Box<dyn StoreTxn>> {
        Ok(self.effects.store.begin().await?)
    }

    async fn finish(&self, txn: Box<dyn StoreTxn>, outbox: Outbox) -> ChainResult<()> {
        txn.commit().await?;
        outbox.dispatch(&self.effects.notifier).await;
        Ok(())
    }

    /// Queue `BecameTip` when a removal handed the tip back to an older member
    async fn note_tip_change(
        txn: &mut dyn StoreTxn,
        before: Option<Position>,
        outbox: &mut Outbox,
    ) -> ChainResult<()> {
        let after = txn.tip().await?.map(|m| m.position);
        if let (Some(before), Some(after)) = (before, after) {
            if after < before {
                tracing::info!(member = %after, previous = %before, "Chain tip moved back");
                outbox.push(Notification::BecameTip { member: after });
            }
        }
        Ok(())
    }

    // ====== Chain ======

    /// Create the seed member at the first position
    pub async fn bootstrap_seed(&self, display_name: &str) -> ChainResult<Member> {
        let mut txn = self.begin().await?;
        let ctx = self.context();
        if let Some(seed) = txn.seed().await? {
            return Err(ChainError::SeedAlreadyExists {
                position: seed.position,
            });
        }
        if txn.next_position().await? != Position::SEED {
            return Err(ChainError::invalid("chain already has members but no seed"));
        }
        let seed = Member::seed(display_name, ctx.now);
        txn.insert_member(seed.clone()).await?;
        txn.commit().await?;
        tracing::info!(member = %seed.position, "Seed bootstrapped");
        Ok(seed)
    }

    /// Current tip
    pub async fn tip(&self) -> ChainResult<Member> {
        let mut txn = self.begin().await?;
        graph::tip(txn.as_mut()).await
    }

    /// Member at `position`
    pub async fn member(&self, position: Position) -> ChainResult<Member> {
        let mut txn = self.begin().await?;
        txn.member(position)
            .await?
            .ok_or(ChainError::MemberNotFound { position })
    }

    /// Members in position order, starting after `after`
    pub async fn members(&self, after: Option<Position>, limit: usize) -> ChainResult<Vec<Member>> {
        let mut txn = self.begin().await?;
        Ok(txn.members(after, limit).await?)
    }

    /// Member with inviter and live invitee
    pub async fn neighbours(&self, position: Position) -> ChainResult<Neighbours> {
        let mut txn = self.begin().await?;
        graph::neighbours(txn.as_mut(), position).await
    }

    /// Remove a member administratively and cascade up its ancestry
    pub async fn remove_member(&self, position: Position) -> ChainResult<Vec<Position>> {
        let mut txn = self.begin().await?;
        let ctx = self.context();
        let mut outbox = Outbox::new();
        let tip_before = txn.tip().await?.map(|m| m.position);

        let removed = cascade::remove_member(
            txn.as_mut(),
            position,
            RemovalReason::Administrative,
            &ctx,
            &mut outbox,
        )
        .await?;
        Self::note_tip_change(txn.as_mut(), tip_before, &mut outbox).await?;

        self.finish(txn, outbox).await?;
        Ok(removed)
    }

    // ====== Tickets ======

    /// Issue a ticket for `owner`
    pub async fn issue(&self, owner: Position) -> ChainResult<Ticket> {
        let mut txn = self.begin().await?;
        let ctx = self.context();
        let ticket = lifecycle::issue(txn.as_mut(), &self.signer, owner, &ctx).await?;
        txn.commit().await?;
        Ok(ticket)
    }

    /// Redeem a ticket. The new member takes the next position.
    pub async fn claim(
        &self,
        ticket_id: TicketId,
        signature: &str,
        newcomer: &NewcomerInfo,
    ) -> ChainResult<Member> {
        let mut txn = self.begin().await?;
        let ctx = self.context();
        let mut outbox = Outbox::new();
        let tip_before = txn.tip().await?.map(|m| m.position);

        let result = lifecycle::claim(
            txn.as_mut(),
            &self.signer,
            ticket_id,
            signature,
            newcomer,
            &ctx,
            &mut outbox,
        )
        .await?;

        match result {
            ClaimResult::Joined { member, inviter } => {
                self.finish(txn, outbox).await?;
                self.award_badge_best_effort(inviter).await;
                Ok(member)
            }
            ClaimResult::ExpiredOnClaim {
                ticket_id,
                expires_at,
            } => {
                Self::note_tip_change(txn.as_mut(), tip_before, &mut outbox).await?;
                self.finish(txn, outbox).await?;
                Err(ChainError::TicketExpired {
                    ticket_id,
                    expires_at,
                })
            }
        }
    }

    /// Expire a ticket. Idempotent.
    pub async fn expire(&self, ticket_id: TicketId) -> ChainResult<ExpireOutcome> {
        let mut txn = self.begin().await?;
        let ctx = self.context();
        let mut outbox = Outbox::new();
        let tip_before = txn.tip().await?.map(|m| m.position);

        let outcome = lifecycle::expire(txn.as_mut(), ticket_id, &ctx, &mut outbox).await?;
        if matches!(outcome, ExpireOutcome::AlreadyTerminal(_)) {
            return Ok(outcome);
        }
        Self::note_tip_change(txn.as_mut(), tip_before, &mut outbox).await?;

        self.finish(txn, outbox).await?;
        Ok(outcome)
    }

    /// Cancel an ACTIVE ticket without striking its owner
    pub async fn cancel(&self, ticket_id: TicketId) -> ChainResult<Ticket> {
        let mut txn = self.begin().await?;
        let ticket = lifecycle::cancel(txn.as_mut(), ticket_id).await?;
        txn.commit().await?;
        Ok(ticket)
    }

    /// Read a ticket, expiring it first if its deadline has passed
    pub async fn ticket(&self, ticket_id: TicketId) -> ChainResult<Ticket> {
        let mut txn = self.begin().await?;
        let ctx = self.context();
        let ticket = txn
            .ticket(ticket_id)
            .await?
            .ok_or(ChainError::TicketNotFound { ticket_id })?;
        if !(ticket.is_active() && ticket.has_expired(ctx.now)) {
            return Ok(ticket);
        }

        let mut outbox = Outbox::new();
        let tip_before = txn.tip().await?.map(|m| m.position);
        lifecycle::expire(txn.as_mut(), ticket_id, &ctx, &mut outbox).await?;
        Self::note_tip_change(txn.as_mut(), tip_before, &mut outbox).await?;
        let expired = txn
            .ticket(ticket_id)
            .await?
            .ok_or(ChainError::TicketNotFound { ticket_id })?;
        self.finish(txn, outbox).await?;
        Ok(expired)
    }

    /// ACTIVE tickets whose deadline passed, oldest first
    pub async fn expired_tickets(&self, limit: usize) -> ChainResult<Vec<Ticket>> {
        let now = self.effects.clock.now();
        let mut txn = self.begin().await?;
        Ok(txn.expired_active_tickets(now, limit).await?)
    }

    /// ACTIVE tickets whose deadline falls within `window` from now
    pub async fn expiring_tickets(
        &self,
        window: chrono::Duration,
        limit: usize,
    ) -> ChainResult<Vec<Ticket>> {
        let now = self.effects.clock.now();
        let mut txn = self.begin().await?;
        Ok(txn.expiring_tickets(now, now + window, limit).await?)
    }

    /// Deliver notifications produced outside a chain transaction
    pub async fn notify(&self, notifications: Vec<Notification>) {
        let mut outbox = Outbox::new();
        for notification in notifications {
            outbox.push(notification);
        }
        outbox.dispatch(&self.effects.notifier).await;
    }

    async fn award_badge_best_effort(&self, position: Position) {
        let now = self.effects.clock.now();
        let result = async {
            let mut txn = self.begin().await?;
            let award = badges::award_recovery_badge(txn.as_mut(), position, now).await?;
            if award.is_some() {
                txn.commit().await?;
            }
            Ok::<_, ChainError>(award)
        }
        .await;

        match result {
            Ok(Some(award)) => {
                self.notify(vec![Notification::BadgeEarned {
                    member: award.position,
                    badge: award.badge,
                }])
                .await;
            }
            Ok(None) => {}
            Err(err) => {
                tracing::warn!(member = %position, error = %err, "Badge award failed");
            }
        }
    }
}
