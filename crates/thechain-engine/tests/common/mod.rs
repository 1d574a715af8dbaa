//! Shared harness: an engine over the in-memory store with a simulated clock

#![allow(dead_code)]

use chrono::{Duration, TimeZone, Utc};
use std::sync::Arc;
use thechain_core::{
    ChainConfig, ChainRule, FixedRule, Member, NewcomerInfo, Position, RuleProvider, Ticket,
};
use thechain_effects::{MemoryChainStore, RecordingNotifier, SimulatedClock};
use thechain_engine::{ChainEffects, ChainEngine};

pub const SECRET: &str = "test-secret-test-secret-test-secret!";

pub struct TestChain {
    pub engine: Arc<ChainEngine>,
    pub store: MemoryChainStore,
    pub clock: SimulatedClock,
    pub notifier: RecordingNotifier,
}

pub fn config() -> ChainConfig {
    ChainConfig {
        signing_secret: SECRET.to_string(),
        ..ChainConfig::default()
    }
}

impl TestChain {
    /// Seeded chain with default rules
    pub async fn new() -> Self {
        Self::with(config(), Arc::new(FixedRule(ChainRule::default()))).await
    }

    /// Seeded chain with custom settings
    pub async fn with(config: ChainConfig, rules: Arc<dyn RuleProvider>) -> Self {
        let store = MemoryChainStore::new();
        let clock = SimulatedClock::new(Utc.with_ymd_and_hms(2025, 6, 1, 9, 0, 0).unwrap());
        let notifier = RecordingNotifier::new();
        let engine = ChainEngine::new(
            config,
            ChainEffects {
                store: Arc::new(store.clone()),
                clock: Arc::new(clock.clone()),
                notifier: Arc::new(notifier.clone()),
                rules,
            },
        )
        .unwrap();
        engine.bootstrap_seed("origin").await.unwrap();
        Self {
            engine: Arc::new(engine),
            store,
            clock,
            notifier,
        }
    }

    pub fn advance(&self, by: Duration) {
        self.clock.advance(by);
    }

    /// `owner` issues a ticket and a newcomer redeems it immediately
    pub async fn invite(&self, owner: Position) -> Member {
        let ticket = self.engine.issue(owner).await.unwrap();
        self.redeem(&ticket).await
    }

    pub async fn redeem(&self, ticket: &Ticket) -> Member {
        self.engine
            .claim(ticket.id, &ticket.signature, &NewcomerInfo::default())
            .await
            .unwrap()
    }

    /// Grow a straight line of `n` members under the current tip
    pub async fn grow(&self, n: usize) -> Vec<Member> {
        let mut members = Vec::with_capacity(n);
        for _ in 0..n {
            let tip = self.engine.tip().await.unwrap();
            members.push(self.invite(tip.position).await);
        }
        members
    }

    /// Let one ticket of `owner` lapse through the sweeper path
    pub async fn waste_ticket(&self, owner: Position) {
        let ticket = self.engine.issue(owner).await.unwrap();
        self.advance(Duration::hours(25));
        self.engine.expire(ticket.id).await.unwrap();
    }
}
