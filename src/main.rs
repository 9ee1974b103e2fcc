//! WatchPost - Uptime and Price Monitoring Daemon
//!
//! Periodically probes HTTP endpoints and tracked price sources, folds the
//! outcomes into per-target health state, and notifies operators on
//! meaningful state changes.

mod alert;
mod assertion;
mod config;
mod db;
mod engine;
mod incident;
mod maintenance;
mod model;
mod probe;
mod scheduler;
mod state;
mod state_store;

use config::ServerConfig;
use db::Store;
use engine::Engine;
use scheduler::Scheduler;

use alert::AlertRouter;
use probe::ProbeExecutor;
use state_store::StateStore;

use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("watchpost=info".parse()?),
        )
        .init();

    // Load configuration
    let cfg = ServerConfig::load();
    tracing::info!("Starting WatchPost, evaluating every {}s", cfg.interval_secs);
    tracing::info!("Using database at {}", cfg.db_path);
    tracing::info!("Using hot state at {}", cfg.state_path);

    // Initialize stores
    let store = Arc::new(Store::new(&cfg.db_path)?);
    let state_store = StateStore::new(cfg.state_path.clone());

    // Wire up the engine
    let executor = ProbeExecutor::new();
    let router = AlertRouter::new(cfg.channel_secrets());
    let engine = Engine::new(store, state_store, executor, router);

    // Run the evaluation loop
    let scheduler = Scheduler::new(engine, Duration::from_secs(cfg.interval_secs.max(1)));
    scheduler.run().await;

    Ok(())
}
