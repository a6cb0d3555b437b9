//! Cloud scheduler - predictive resource scheduling daemon
//!
//! Ingests utilization samples over HTTP, forecasts demand per resource and
//! resizes or migrates resources through the configured cloud provider.

use anyhow::{Context, Result};
use cloud_scheduler::{api, config::ServiceConfig};
use scheduler_lib::{
    health::HealthRegistry, observability::StructuredLogger, SchedulerLoop, TimeSeriesStore,
};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const SCHEDULER_VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing with JSON output and env filter
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().json())
        .init();

    info!("Starting cloud-scheduler");

    let config = ServiceConfig::load()?;
    info!(
        instance = %config.instance,
        api_port = config.api_port,
        resources = config.resources.len(),
        "Scheduler configured"
    );

    let health_registry = HealthRegistry::new();
    health_registry.register_all().await;

    let store = Arc::new(TimeSeriesStore::with_persistence(config.store_config()));
    let pricing = Arc::new(config.pricing_table().context("Failed to load pricing table")?);
    let provider = config.build_provider()?;
    let registry = Arc::new(scheduler_lib::ResourceRegistry::new());

    let scheduler = Arc::new(SchedulerLoop::new(
        store,
        registry,
        pricing,
        provider,
        health_registry.clone(),
        config.settings(),
    )?);
    for resource in config.resources.iter().cloned() {
        scheduler.register(resource);
    }

    let logger = StructuredLogger::new(&config.instance);
    logger.log_startup(
        SCHEDULER_VERSION,
        config.scheduler_loop.tick_interval_secs,
        scheduler.orchestrator().provider_name(),
    );

    let (shutdown_tx, _) = broadcast::channel(1);

    let app_state = Arc::new(api::AppState::new(scheduler.clone()));
    let api_handle = tokio::spawn(api::serve(
        config.api_port,
        app_state,
        shutdown_tx.subscribe(),
    ));
    let loop_handle = tokio::spawn(scheduler.clone().run(shutdown_tx.subscribe()));

    // Wait for shutdown signal
    tokio::signal::ctrl_c().await?;
    logger.log_shutdown("SIGINT received");
    let _ = shutdown_tx.send(());

    if let Err(e) = loop_handle.await {
        error!(error = %e, "Scheduler loop task failed");
    }
    match api_handle.await {
        Ok(Err(e)) => error!(error = %e, "API server failed"),
        Err(e) => error!(error = %e, "API server task failed"),
        Ok(Ok(())) => {}
    }

    info!("Shutdown complete");
    Ok(())
}
