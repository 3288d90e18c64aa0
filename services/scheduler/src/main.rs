//! rulepool scheduler
//!
//! Places one-shot scheduled rules onto a pool of event buses, serves the
//! compute-target fire endpoint, and periodically collects drained buses.

use std::sync::Arc;

use anyhow::Result;
use rulepool_scheduler::{
    api, config,
    handler::LoggingHandler,
    placer::Placer,
    state::AppState,
    sweeper::{SweepWorker, SweepWorkerConfig},
};
use tokio::sync::watch;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration
    let config = config::Config::from_env()?;

    // Initialize tracing (prefer RUST_LOG, fallback to RULEPOOL_LOG_LEVEL)
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| config.log_level.clone().into()))
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    info!("Starting rulepool scheduler");
    info!(
        listen_addr = %config.listen_addr,
        bus_prefix = %config.pool.bus_prefix,
        rule_limit = config.pool.rule_limit,
        max_buses = config.pool.max_buses,
        backend = ?config.backend,
        "Configuration loaded"
    );

    let backend = config.backend.build()?;
    let placer = Placer::new(
        config.pool.clone(),
        Arc::clone(&backend),
        config.placement_attempts,
    )?;
    let state = AppState::new(placer, backend, Arc::new(LoggingHandler));

    // Create shutdown channel for graceful shutdown
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    // Start sweep worker in background
    let sweep_handle = config.sweep_interval.map(|interval| {
        let worker = SweepWorker::new(state.clone(), SweepWorkerConfig { interval });
        let shutdown_rx = shutdown_rx.clone();
        tokio::spawn(async move {
            worker.run(shutdown_rx).await;
        })
    });
    if sweep_handle.is_none() {
        info!("Sweep worker disabled");
    }

    // Build and run the server
    let app = api::create_router(state);

    let listener = tokio::net::TcpListener::bind(&config.listen_addr).await?;
    info!(addr = %config.listen_addr, "Listening for connections");

    // Spawn the server with graceful shutdown
    let server_handle = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let mut shutdown_rx = shutdown_rx;
                loop {
                    if *shutdown_rx.borrow() {
                        break;
                    }
                    if shutdown_rx.changed().await.is_err() {
                        break;
                    }
                }
                info!("HTTP server shutting down");
            })
            .await
    });

    // Wait for shutdown signal (Ctrl+C)
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("Received shutdown signal");
        }
        result = server_handle => {
            match result {
                Ok(Ok(())) => info!("Server exited normally"),
                Ok(Err(e)) => error!(error = %e, "Server error"),
                Err(e) => error!(error = %e, "Server task panicked"),
            }
        }
    }

    // Signal shutdown to all workers
    let _ = shutdown_tx.send(true);

    if let Some(handle) = sweep_handle {
        info!("Waiting for sweep worker to shut down...");
        let shutdown_timeout = std::time::Duration::from_secs(10);
        if let Err(e) = tokio::time::timeout(shutdown_timeout, handle).await {
            warn!(error = %e, "Sweep worker did not shut down in time");
        }
    }

    info!("Scheduler shutdown complete");
    Ok(())
}
