//! `run`: a long-lived engine on the wall clock
//!
//! Seeds an in-memory chain, starts the expiration sweeper on its configured
//! interval and keeps going until Ctrl+C or SIGTERM. Chain state lives only
//! as long as the process.

use super::config;
use anyhow::Result;
use clap::Args;
use std::path::Path;
use std::sync::Arc;
use thechain_core::{ChainConfig, FixedRule};
use thechain_effects::{MemoryChainStore, SystemClock, TracingNotifier};
use thechain_engine::{ChainEffects, ChainEngine, ExpirationSweeper, TaskRegistry};
use tracing::{info, warn};

#[derive(Args, Debug, Clone)]
pub struct RunArgs {
    /// Display name of the seed member
    #[arg(long, default_value = "seed")]
    pub seed_name: String,
}

/// A seeded engine plus its background tasks
pub struct ChainService {
    engine: Arc<ChainEngine>,
    registry: TaskRegistry,
}

impl ChainService {
    /// Build the engine on production handlers and start the sweeper
    pub async fn start(config: ChainConfig, seed_name: &str) -> Result<Self> {
        let rule = config.rules;
        let engine = Arc::new(ChainEngine::new(
            config,
            ChainEffects {
                store: Arc::new(MemoryChainStore::new()),
                clock: Arc::new(SystemClock::new()),
                notifier: Arc::new(TracingNotifier),
                rules: Arc::new(FixedRule(rule)),
            },
        )?);
        let seed = engine.bootstrap_seed(seed_name).await?;

        let registry = TaskRegistry::new();
        let sweeper = Arc::new(ExpirationSweeper::new(Arc::clone(&engine)));
        sweeper.spawn(&registry);
        info!(
            seed = %seed.position,
            interval_secs = engine.config().sweeper.interval_secs,
            "Chain service started"
        );

        Ok(Self { engine, registry })
    }

    pub fn engine(&self) -> &Arc<ChainEngine> {
        &self.engine
    }

    pub fn registry(&self) -> &TaskRegistry {
        &self.registry
    }

    /// Stop background tasks and wait for them
    pub async fn stop(&self) {
        self.registry.shutdown().await;
        info!("Chain service stopped");
    }
}

pub async fn run(config_path: Option<&Path>, args: RunArgs) -> Result<()> {
    let config = config::load(config_path)?;
    let service = ChainService::start(config, &args.seed_name).await?;

    info!(
        tasks = service.registry().task_count(),
        "Running. Press Ctrl+C to stop."
    );
    shutdown_signal().await;
    info!("Shutdown signal received");

    service.stop().await;
    let tip = service.engine().tip().await?;
    info!(tip = %tip.position, "Final chain tip");
    Ok(())
}

async fn shutdown_signal() {
    use tokio::signal;

    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            warn!(error = %err, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(err) => {
                warn!(error = %err, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
