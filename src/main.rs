//! WasteChain Service
//!
//! Smart-bin monitoring with simulated IoT sensors, citizen reports and contractor pickups

use anyhow::{Context, Result};
use clap::Parser;
use std::{sync::Arc, time::Duration};
use tracing::{error, info, warn};

mod analytics;
mod api;
mod classifier;
mod config;
mod error;
mod models;
mod pickups;
mod reports;
mod scheduler;
mod seed;
mod simulation;
mod store;

use config::{Config, StorageKind};
use pickups::PickupEngine;
use reports::ReportEngine;
use scheduler::Scheduler;
use simulation::SimulationEngine;
use store::Store;

#[derive(Parser)]
#[command(name = "wastechain")]
#[command(about = "WasteChain smart-bin service", long_about = None)]
struct Args {
    /// Configuration file path
    #[arg(short, long, default_value = "wastechain.toml")]
    config: String,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

/// Application state
pub struct AppState {
    pub config: Config,
    pub store: Arc<Store>,
    pub scheduler: Scheduler,
    pub reports: ReportEngine,
    pub pickups: PickupEngine,
}

impl AppState {
    pub fn new(config: Config, store: Arc<Store>) -> Self {
        let engine = Arc::new(SimulationEngine::new(store.clone(), config.simulation_seed));
        Self {
            scheduler: Scheduler::new(engine),
            reports: ReportEngine::new(store.clone()),
            pickups: PickupEngine::new(store.clone()),
            store,
            config,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let filter = if args.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("Starting WasteChain service");

    let config = match Config::load(&args.config) {
        Ok(config) => {
            info!("Configuration loaded from: {}", args.config);
            config
        }
        Err(e) => {
            warn!("Could not read {}: {}. Using environment only", args.config, e);
            Config::from_env().context("Failed to load configuration")?
        }
    };

    let store = match config.storage {
        StorageKind::File => {
            info!("Persisting collections under {}", config.data_dir.display());
            Store::open_dir(&config.data_dir)
        }
        StorageKind::Memory => {
            info!("Using in-memory storage");
            Store::in_memory()
        }
    };

    let state = Arc::new(AppState::new(config.clone(), Arc::new(store)));

    if config.seed_defaults {
        seed::seed_defaults(&state.store)
            .await
            .context("Failed to seed default data")?;
    }

    if config.simulation_autostart {
        state
            .scheduler
            .start(Duration::from_millis(config.simulation_interval_ms))
            .await;
    }

    let api_handle = tokio::spawn(api::run_server(state.clone()));

    info!("API server running on port {}", config.api_port);

    match api_handle.await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => error!("API server failed: {}", e),
        Err(e) => error!("API server task panicked: {:?}", e),
    }

    state.scheduler.stop().await;
    Ok(())
}
