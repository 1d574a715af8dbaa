//! Strike thresholds, the removal cascade and the recovery badge

mod common;

use assert_matches::assert_matches;
use common::TestChain;
use proptest::prelude::*;
use std::sync::Arc;
use thechain_core::effects::{ChainStore, Notification};
use thechain_core::{
    BadgeKind, ChainConfig, ChainError, ChainRule, FixedRule, InvitationStatus, Member,
    MemberStatus, Position, RemovalReason, TicketStatus,
};

fn rule(max_attempts: u32) -> Arc<FixedRule> {
    Arc::new(FixedRule(ChainRule {
        ticket_duration_hours: 24,
        max_attempts,
    }))
}

/// `parent` invites and loses `count` invitees
async fn lose_invitees(chain: &TestChain, parent: Position, count: u32) -> Vec<Position> {
    let mut lost = Vec::new();
    for _ in 0..count {
        let child = chain.invite(parent).await;
        chain.engine.remove_member(child.position).await.unwrap();
        lost.push(child.position);
    }
    lost
}

async fn status_of(chain: &TestChain, position: Position) -> Member {
    chain.engine.member(position).await.unwrap()
}

#[tokio::test]
async fn test_third_lost_invitee_removes_parent() {
    let chain = TestChain::new().await;
    let line = chain.grow(2).await;
    let (grandparent, parent) = (line[0].position, line[1].position);

    lose_invitees(&chain, parent, 2).await;
    assert_eq!(status_of(&chain, parent).await.status, MemberStatus::Active);

    let third = chain.invite(parent).await;
    chain.notifier.take();
    let removed = chain.engine.remove_member(third.position).await.unwrap();
    assert_eq!(removed, vec![third.position, parent]);

    let parent_row = status_of(&chain, parent).await;
    assert_eq!(parent_row.status, MemberStatus::Removed);
    assert_eq!(parent_row.removal_reason, Some(RemovalReason::WastedChildren));

    // Grandparent lost one invitee, stays, and is the tip again
    let gp = status_of(&chain, grandparent).await;
    assert_eq!(gp.status, MemberStatus::Active);
    assert!(gp.active_child_position.is_none());
    assert_eq!(chain.engine.tip().await.unwrap().position, grandparent);

    let sent = chain.notifier.notifications();
    assert!(sent.contains(&Notification::BecameTip {
        member: grandparent
    }));
    assert!(sent.contains(&Notification::MemberRemoved {
        member: parent,
        reason: RemovalReason::WastedChildren
    }));
}

#[tokio::test]
async fn test_cascade_climbs_until_member_below_threshold() {
    let chain = TestChain::new().await;
    let line = chain.grow(2).await;
    let (top, grandparent) = (line[0].position, line[1].position);

    lose_invitees(&chain, grandparent, 2).await;
    let parent = chain.invite(grandparent).await.position;
    lose_invitees(&chain, parent, 2).await;
    let last = chain.invite(parent).await.position;

    let removed = chain.engine.remove_member(last).await.unwrap();
    assert_eq!(removed, vec![last, parent, grandparent]);
    assert_eq!(status_of(&chain, top).await.status, MemberStatus::Active);
    assert_eq!(chain.engine.tip().await.unwrap().position, top);
}

#[tokio::test]
async fn test_cascade_stops_at_seed() {
    let chain = TestChain::with(common::config(), rule(1)).await;
    let line = chain.grow(3).await;
    let removed = chain.engine.remove_member(line[2].position).await.unwrap();
    assert_eq!(
        removed,
        vec![line[2].position, line[1].position, line[0].position]
    );
    let seed = status_of(&chain, Position::SEED).await;
    assert_eq!(seed.status, MemberStatus::Seed);
    assert_eq!(chain.engine.tip().await.unwrap().position, Position::SEED);
}

#[tokio::test]
async fn test_cascade_depth_bound_rolls_back_everything() {
    let config = ChainConfig {
        cascade: thechain_core::CascadeConfig { max_depth: 2 },
        ..common::config()
    };
    let chain = TestChain::with(config, rule(1)).await;
    let line = chain.grow(4).await;
    let last = line[3].position;

    let err = chain.engine.remove_member(last).await.unwrap_err();
    assert_matches!(err, ChainError::CascadeDepthExceeded { max_depth: 2, .. });
    assert_eq!(err.code(), "CASCADE_DEPTH_EXCEEDED");

    for member in &line {
        assert_eq!(
            status_of(&chain, member.position).await.status,
            MemberStatus::Active
        );
    }
    assert_eq!(chain.engine.tip().await.unwrap().position, last);
}

#[tokio::test]
async fn test_cascade_may_remove_exactly_max_depth_ancestors() {
    for depth in 1..=3usize {
        let config = ChainConfig {
            cascade: thechain_core::CascadeConfig { max_depth: depth },
            ..common::config()
        };
        let chain = TestChain::with(config, rule(1)).await;
        let line = chain.grow(depth + 1).await;
        let last = line[depth].position;

        let removed = chain.engine.remove_member(last).await.unwrap();
        let expected: Vec<Position> = line.iter().rev().map(|m| m.position).collect();
        assert_eq!(removed, expected);
        for member in &line {
            assert_eq!(
                status_of(&chain, member.position).await.status,
                MemberStatus::Removed
            );
        }
        assert_eq!(chain.engine.tip().await.unwrap().position, Position::SEED);
    }
}

#[tokio::test]
async fn test_wasted_tickets_remove_member() {
    let chain = TestChain::new().await;
    let member = chain.grow(1).await.remove(0).position;

    chain.waste_ticket(member).await;
    chain.waste_ticket(member).await;
    assert_eq!(status_of(&chain, member).await.status, MemberStatus::Active);
    chain.waste_ticket(member).await;

    let row = status_of(&chain, member).await;
    assert_eq!(row.status, MemberStatus::Removed);
    assert_eq!(row.strike_count, 3);
    assert_eq!(row.removal_reason, Some(RemovalReason::WastedTickets));
    assert_eq!(chain.engine.tip().await.unwrap().position, Position::SEED);
    assert_eq!(chain.notifier.count_of("became_tip"), 1);

    // Counts as a lost invitee for the seed
    let mut txn = chain.store.begin().await.unwrap();
    assert_eq!(
        txn.count_invitations(Position::SEED, InvitationStatus::Removed)
            .await
            .unwrap(),
        1
    );
}

#[tokio::test]
async fn test_seed_strikes_are_counted_but_harmless() {
    let chain = TestChain::new().await;
    for _ in 0..4 {
        chain.waste_ticket(Position::SEED).await;
    }
    let seed = status_of(&chain, Position::SEED).await;
    assert_eq!(seed.status, MemberStatus::Seed);
    assert_eq!(seed.strike_count, 4);
    chain.engine.issue(Position::SEED).await.unwrap();
}

#[tokio::test]
async fn test_seed_cannot_be_removed() {
    let chain = TestChain::new().await;
    assert!(chain
        .engine
        .remove_member(Position::SEED)
        .await
        .unwrap()
        .is_empty());
    assert_eq!(
        status_of(&chain, Position::SEED).await.status,
        MemberStatus::Seed
    );
}

#[tokio::test]
async fn test_removal_cancels_outstanding_ticket() {
    let chain = TestChain::new().await;
    let member = chain.grow(1).await.remove(0).position;
    let ticket = chain.engine.issue(member).await.unwrap();

    chain.engine.remove_member(member).await.unwrap();
    let stored = chain.engine.ticket(ticket.id).await.unwrap();
    assert_eq!(stored.status, TicketStatus::Cancelled);
    assert_matches!(
        chain
            .engine
            .claim(
                ticket.id,
                &ticket.signature,
                &thechain_core::NewcomerInfo::default()
            )
            .await,
        Err(ChainError::TicketNotActive { .. })
    );
}

#[tokio::test]
async fn test_removed_members_children_keep_parent() {
    let chain = TestChain::new().await;
    let line = chain.grow(3).await;
    chain.engine.remove_member(line[1].position).await.unwrap();

    let orphan = status_of(&chain, line[2].position).await;
    assert_eq!(orphan.status, MemberStatus::Active);
    assert_eq!(orphan.parent_position, Some(line[1].position));
    assert_eq!(chain.engine.tip().await.unwrap().position, line[2].position);

    let view = chain.engine.neighbours(line[0].position).await.unwrap();
    assert!(view.invitee.is_none());
}

#[tokio::test]
async fn test_recovery_badge_awarded_once() {
    let chain = TestChain::new().await;
    let member = chain.grow(1).await.remove(0).position;

    lose_invitees(&chain, member, 1).await;
    assert_eq!(chain.notifier.count_of("badge_earned"), 0);
    let second = chain.invite(member).await;
    assert_eq!(chain.notifier.count_of("badge_earned"), 1);

    chain.engine.remove_member(second.position).await.unwrap();
    chain.invite(member).await;
    assert_eq!(chain.notifier.count_of("badge_earned"), 1);

    let mut txn = chain.store.begin().await.unwrap();
    assert!(txn.has_badge(member, BadgeKind::ChainSavior).await.unwrap());
}

async fn removed_at_threshold(max_attempts: u32, lost: u32) -> MemberStatus {
    let chain = TestChain::with(common::config(), rule(max_attempts)).await;
    let member = chain.grow(1).await.remove(0).position;
    lose_invitees(&chain, member, lost).await;
    status_of(&chain, member).await.status
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn prop_threshold_is_exact(max_attempts in 1u32..=4, short_by in 0u32..=1) {
        let lost = max_attempts - short_by;
        let runtime = tokio::runtime::Builder::new_current_thread()
            .build()
            .unwrap();
        let status = runtime.block_on(removed_at_threshold(max_attempts, lost));
        if short_by == 0 {
            prop_assert_eq!(status, MemberStatus::Removed);
        } else {
            prop_assert_eq!(status, MemberStatus::Active);
        }
    }
}
