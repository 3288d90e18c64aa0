use std::time::Duration;

use rulepool_reconcile::DEFAULT_SWEEP_INTERVAL;
use tokio::sync::watch;
use tracing::{debug, error, info, instrument};

use crate::state::AppState;

#[derive(Debug, Clone)]
pub struct SweepWorkerConfig {
    pub interval: Duration,
}

impl Default for SweepWorkerConfig {
    fn default() -> Self {
        Self {
            interval: DEFAULT_SWEEP_INTERVAL,
        }
    }
}

pub struct SweepWorker {
    state: AppState,
    config: SweepWorkerConfig,
}

impl SweepWorker {
    pub fn new(state: AppState, config: SweepWorkerConfig) -> Self {
        Self { state, config }
    }

    #[instrument(skip(self, shutdown))]
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        info!(
            interval_secs = self.config.interval.as_secs(),
            "Starting sweep worker"
        );

        let mut interval = tokio::time::interval(self.config.interval);
        interval.tick().await;

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    self.run_sweep().await;
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!("Sweep worker shutting down");
                        break;
                    }
                }
            }
        }
    }

    /// Run one sweep, logging rather than propagating failures.
    pub async fn run_sweep(&self) -> usize {
        match self.state.placer().sweep().await {
            Ok(collected) if collected.is_empty() => {
                debug!("Sweep found no empty buses");
                0
            }
            Ok(collected) => {
                let names: Vec<String> = collected.iter().map(ToString::to_string).collect();
                info!(count = names.len(), buses = ?names, "Sweep collected empty buses");
                names.len()
            }
            Err(e) => {
                error!(error = %e, "Sweep failed");
                0
            }
        }
    }
}
