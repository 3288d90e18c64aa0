//! Serialised access to the pool.
//!
//! Every request runs a full reconcile-then-act cycle while holding the
//! pool lock, so placements and sweeps in this process never interleave.
//! Writers in other processes are caught by the pool's optimistic check and
//! surface as conflicts, which are retried here with a fresh cycle.

use std::sync::Arc;

use rulepool_core::{
    Allocator, Container, Placement, Pool, PoolConfig, PoolResult, Rule, SchedulerBackend,
};
use rulepool_id::{BusIndex, BusName, RuleName};
use rulepool_reconcile::BackoffPolicy;
use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{instrument, warn};

/// Observed state of one bus.
#[derive(Debug, Clone, Serialize)]
pub struct BusSnapshot {
    pub name: BusName,
    pub index: BusIndex,
    pub rule_count: usize,
    pub rules: Vec<RuleName>,
}

/// Observed state of the whole pool.
#[derive(Debug, Clone, Serialize)]
pub struct InventorySnapshot {
    pub rule_limit: usize,
    pub max_buses: usize,
    pub stamp: String,
    pub items: Vec<BusSnapshot>,
}

pub struct Placer {
    pool: Mutex<Pool<dyn SchedulerBackend>>,
    backoff: BackoffPolicy,
}

impl Placer {
    /// `attempts` bounds how many cycles a conflicting placement gets.
    pub fn new(
        config: PoolConfig,
        backend: Arc<dyn SchedulerBackend>,
        attempts: u32,
    ) -> PoolResult<Self> {
        let pool = Pool::new(config, backend)?;
        Ok(Self {
            pool: Mutex::new(pool),
            backoff: BackoffPolicy {
                max_attempts: attempts.max(1),
                ..BackoffPolicy::default()
            },
        })
    }

    /// Override the delay schedule between conflicting cycles.
    pub fn with_backoff(mut self, backoff: BackoffPolicy) -> Self {
        self.backoff = backoff;
        self
    }

    /// Reconcile and place one rule, retrying on conflict.
    #[instrument(skip(self, rule))]
    pub async fn schedule(&self, rule: Rule) -> PoolResult<Placement> {
        let mut pool = self.pool.lock().await;
        let mut attempt = 1;

        loop {
            match place_cycle(&mut pool, rule.clone()).await {
                Err(e) if e.is_retryable() && attempt < self.backoff.max_attempts => {
                    let delay = self.backoff.delay_for(attempt);
                    warn!(
                        attempt,
                        max_attempts = self.backoff.max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Placement conflict, retrying with a fresh inventory"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                result => return result,
            }
        }
    }

    /// Reconcile and delete every empty pooled bus.
    #[instrument(skip(self))]
    pub async fn sweep(&self) -> PoolResult<Vec<BusName>> {
        self.pool.lock().await.collect_empty().await
    }

    /// Reconcile and report what the backend holds.
    pub async fn inventory(&self) -> PoolResult<InventorySnapshot> {
        let mut pool = self.pool.lock().await;
        pool.load_inventory().await?;

        let items = pool
            .inventory()
            .iter()
            .map(|bus| BusSnapshot {
                name: bus.name().clone(),
                index: bus.index(),
                rule_count: bus.rule_count(),
                rules: bus.rule_names().cloned().collect(),
            })
            .collect();

        Ok(InventorySnapshot {
            rule_limit: pool.rule_limit(),
            max_buses: pool.max_buses(),
            stamp: pool.stamp().to_string(),
            items,
        })
    }
}

async fn place_cycle(pool: &mut Pool<dyn SchedulerBackend>, rule: Rule) -> PoolResult<Placement> {
    pool.load_inventory().await?;
    pool.add_rule(rule).await
}

impl std::fmt::Debug for Placer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Placer")
            .field("backoff", &self.backoff)
            .finish_non_exhaustive()
    }
}
