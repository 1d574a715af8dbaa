//! `simulate`: a throwaway chain on the in-memory store
//!
//! Grows a line of members under the tip, then lets the tip waste tickets,
//! expiring each through the sweeper so strikes and removals play out the
//! same way they would in production.

use super::config;
use anyhow::Result;
use chrono::{DateTime, Duration, Utc};
use clap::Args;
use std::path::Path;
use std::sync::Arc;
use thechain_core::{FixedRule, Member, NewcomerInfo};
use thechain_effects::{MemoryChainStore, RecordingNotifier, SimulatedClock};
use thechain_engine::{ChainEffects, ChainEngine, ExpirationSweeper, SweepReport};

#[derive(Args, Debug, Clone)]
pub struct SimulateArgs {
    /// Members to add after the seed
    #[arg(short, long, default_value = "5")]
    pub members: usize,

    /// Tickets the tip lets expire afterwards
    #[arg(short, long, default_value = "0")]
    pub wasted: usize,

    /// Print members as JSON
    #[arg(long)]
    pub json: bool,
}

/// What a simulation left behind
#[derive(Debug)]
pub struct SimulationOutcome {
    pub members: Vec<Member>,
    pub tip: Member,
    pub sweeps: Vec<SweepReport>,
    pub notifications: usize,
}

pub async fn run(config_path: Option<&Path>, args: SimulateArgs) -> Result<()> {
    let outcome = simulate(config_path, &args).await?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&outcome.members)?);
        return Ok(());
    }

    println!("=== Chain ===");
    for member in &outcome.members {
        let parent = member
            .parent_position
            .map_or_else(|| "-".to_string(), |p| p.to_string());
        println!(
            "{:>6}  {:<20} parent {:>6}  {:<8} strikes {}",
            member.position.to_string(),
            member.display_name,
            parent,
            member.status.as_str(),
            member.strike_count
        );
    }
    println!("Tip: {}", outcome.tip.position);
    let removed: usize = outcome.sweeps.iter().map(|s| s.removed).sum();
    println!(
        "Sweeps: {}  removed by sweeps: {}  notifications: {}",
        outcome.sweeps.len(),
        removed,
        outcome.notifications
    );
    Ok(())
}

pub async fn simulate(config_path: Option<&Path>, args: &SimulateArgs) -> Result<SimulationOutcome> {
    let config = config::load_or_ephemeral(config_path)?;
    let rule = config.rules;
    let clock = SimulatedClock::new(DateTime::<Utc>::UNIX_EPOCH);
    let notifier = RecordingNotifier::new();
    let engine = Arc::new(ChainEngine::new(
        config,
        ChainEffects {
            store: Arc::new(MemoryChainStore::new()),
            clock: Arc::new(clock.clone()),
            notifier: Arc::new(notifier.clone()),
            rules: Arc::new(FixedRule(rule)),
        },
    )?);

    engine.bootstrap_seed("seed").await?;
    for _ in 0..args.members {
        let tip = engine.tip().await?;
        let ticket = engine.issue(tip.position).await?;
        clock.advance(Duration::minutes(5));
        engine
            .claim(ticket.id, &ticket.signature, &NewcomerInfo::default())
            .await?;
    }

    let sweeper = ExpirationSweeper::new(Arc::clone(&engine));
    let mut sweeps = Vec::with_capacity(args.wasted);
    for _ in 0..args.wasted {
        let tip = engine.tip().await?;
        engine.issue(tip.position).await?;
        clock.advance(rule.ticket_duration() + Duration::seconds(1));
        sweeps.push(sweeper.run_once().await?);
    }

    Ok(SimulationOutcome {
        members: engine.members(None, usize::MAX).await?,
        tip: engine.tip().await?,
        sweeps,
        notifications: notifier.notifications().len(),
    })
}
