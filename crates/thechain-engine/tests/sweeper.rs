//! Expiration sweeper runs

mod common;

use chrono::Duration;
use common::TestChain;
use std::sync::Arc;
use thechain_core::effects::Notification;
use thechain_core::{FixedRule, MemberStatus, Position, SweeperConfig, Ticket, TicketStatus};
use thechain_engine::{ExpirationSweeper, SweepReport, TaskRegistry};

/// Two members without a live invitee, each holding a ticket
async fn two_open_tickets(chain: &TestChain) -> (Ticket, Ticket) {
    let line = chain.grow(3).await;
    chain.engine.remove_member(line[1].position).await.unwrap();
    let a = chain.engine.issue(line[0].position).await.unwrap();
    let b = chain.engine.issue(line[2].position).await.unwrap();
    (a, b)
}

#[tokio::test]
async fn test_sweep_expires_overdue_ticket() {
    let chain = TestChain::new().await;
    let member = chain.grow(1).await.remove(0).position;
    let ticket = chain.engine.issue(member).await.unwrap();
    chain.advance(Duration::hours(24) + Duration::seconds(1));

    let sweeper = ExpirationSweeper::new(chain.engine.clone());
    let report = sweeper.run_once().await.unwrap();
    assert_eq!(report.examined, 1);
    assert_eq!(report.expired, 1);
    assert_eq!(report.removed, 0);

    let stored = chain.engine.ticket(ticket.id).await.unwrap();
    assert_eq!(stored.status, TicketStatus::Expired);
    let owner = chain.engine.member(member).await.unwrap();
    assert_eq!(owner.strike_count, 1);
    assert_eq!(owner.status, MemberStatus::Active);

    assert_eq!(sweeper.run_once().await.unwrap(), SweepReport::default());
}

#[tokio::test]
async fn test_sweep_leaves_live_tickets_alone() {
    let chain = TestChain::new().await;
    chain.engine.issue(Position::SEED).await.unwrap();
    chain.advance(Duration::hours(24));

    let sweeper = ExpirationSweeper::new(chain.engine.clone());
    let report = sweeper.run_once().await.unwrap();
    assert_eq!(report.examined, 0);
    assert_eq!(
        chain.engine.member(Position::SEED).await.unwrap().strike_count,
        0
    );
}

#[tokio::test]
async fn test_one_failing_ticket_does_not_stop_the_batch() {
    let chain = TestChain::new().await;
    let (a, b) = two_open_tickets(&chain).await;
    chain.advance(Duration::hours(25));
    chain.store.fail_reads_of(a.id);

    let sweeper = ExpirationSweeper::new(chain.engine.clone());
    let report = sweeper.run_once().await.unwrap();
    assert_eq!(report.examined, 2);
    assert_eq!(report.expired, 1);
    assert_eq!(report.failed, 1);
    assert_eq!(
        chain.engine.ticket(b.id).await.unwrap().status,
        TicketStatus::Expired
    );

    chain.store.clear_faults();
    let retry = sweeper.run_once().await.unwrap();
    assert_eq!(retry.expired, 1);
    assert_eq!(
        chain.engine.ticket(a.id).await.unwrap().status,
        TicketStatus::Expired
    );
}

#[tokio::test]
async fn test_store_outage_is_reported_not_panicked() {
    let chain = TestChain::new().await;
    chain.store.set_unavailable(true);
    let sweeper = ExpirationSweeper::new(chain.engine.clone());
    let err = sweeper.run_once().await.unwrap_err();
    assert!(err.is_transient());
}

#[tokio::test]
async fn test_batch_limit_caps_each_run() {
    let chain = TestChain::new().await;
    two_open_tickets(&chain).await;
    chain.advance(Duration::hours(25));

    let sweeper = ExpirationSweeper::with_config(
        chain.engine.clone(),
        SweeperConfig {
            batch_limit: 1,
            ..SweeperConfig::default()
        },
    );
    assert_eq!(sweeper.run_once().await.unwrap().expired, 1);
    assert_eq!(sweeper.run_once().await.unwrap().expired, 1);
    assert_eq!(sweeper.run_once().await.unwrap().examined, 0);
}

#[tokio::test]
async fn test_expiring_soon_warns_once_per_window() {
    let chain = TestChain::new().await;
    let ticket = chain.engine.issue(Position::SEED).await.unwrap();
    let sweeper = ExpirationSweeper::new(chain.engine.clone());

    assert_eq!(sweeper.run_once().await.unwrap().warned, 0);

    chain.advance(Duration::hours(12) + Duration::minutes(1));
    assert_eq!(sweeper.run_once().await.unwrap().warned, 1);
    assert_eq!(sweeper.run_once().await.unwrap().warned, 0);

    chain.advance(Duration::hours(11));
    assert_eq!(sweeper.run_once().await.unwrap().warned, 1);
    assert_eq!(sweeper.run_once().await.unwrap().warned, 0);

    let windows: Vec<u32> = chain
        .notifier
        .notifications()
        .into_iter()
        .filter_map(|n| match n {
            Notification::TicketExpiringSoon {
                ticket_id,
                window_hours,
                ..
            } if ticket_id == ticket.id => Some(window_hours),
            _ => None,
        })
        .collect();
    assert_eq!(windows, vec![12, 1]);
}

#[tokio::test]
async fn test_late_first_sight_sends_only_narrowest_warning() {
    let chain = TestChain::new().await;
    chain.engine.issue(Position::SEED).await.unwrap();
    let sweeper = ExpirationSweeper::new(chain.engine.clone());

    chain.advance(Duration::hours(23) + Duration::minutes(30));
    assert_eq!(sweeper.run_once().await.unwrap().warned, 1);
    assert_eq!(sweeper.run_once().await.unwrap().warned, 0);
    assert_eq!(chain.notifier.count_of("ticket_expiring_soon"), 1);
}

#[tokio::test]
async fn test_sweep_enforces_strike_threshold() {
    let chain = TestChain::with(
        common::config(),
        Arc::new(FixedRule(thechain_core::ChainRule {
            ticket_duration_hours: 1,
            max_attempts: 2,
        })),
    )
    .await;
    let member = chain.grow(1).await.remove(0).position;
    let sweeper = ExpirationSweeper::new(chain.engine.clone());

    for _ in 0..2 {
        chain.engine.issue(member).await.unwrap();
        chain.advance(Duration::hours(2));
        sweeper.run_once().await.unwrap();
    }
    let row = chain.engine.member(member).await.unwrap();
    assert_eq!(row.status, MemberStatus::Removed);
    assert_eq!(chain.engine.tip().await.unwrap().position, Position::SEED);
}

#[tokio::test(start_paused = true)]
async fn test_spawned_sweeper_runs_on_interval() {
    let chain = TestChain::new().await;
    let ticket = chain.engine.issue(Position::SEED).await.unwrap();
    chain.advance(Duration::hours(25));

    let registry = TaskRegistry::new();
    Arc::new(ExpirationSweeper::new(chain.engine.clone())).spawn(&registry);
    tokio::time::sleep(std::time::Duration::from_secs(1)).await;

    assert_eq!(
        chain.engine.ticket(ticket.id).await.unwrap().status,
        TicketStatus::Expired
    );
    registry.shutdown().await;
}
