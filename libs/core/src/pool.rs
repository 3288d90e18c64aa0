//! The backend-facing allocator.

use std::sync::Arc;

use async_trait::async_trait;
use rulepool_id::{BusIndex, BusName};
use rulepool_reconcile::InventoryStamp;
use tracing::{debug, info, instrument, warn};

use crate::backend::{list_all_buses, BackendError, SchedulerBackend};
use crate::bus::Bus;
use crate::config::PoolConfig;
use crate::error::{PoolError, PoolResult};
use crate::inventory::Inventory;
use crate::placement::{self, Placement};
use crate::roles::{Allocator, Container};
use crate::rule::Rule;

/// A pool of buses on one scheduling backend.
///
/// The inventory is only a snapshot of the last reconciliation. Callers
/// reconcile with [`Allocator::load_inventory`] before placing, or use
/// [`Pool::reconcile_and_place`] which does both.
pub struct Pool<B: SchedulerBackend + ?Sized> {
    config: PoolConfig,
    backend: Arc<B>,
    inventory: Inventory<Bus<B>>,
}

impl<B: SchedulerBackend + ?Sized> Pool<B> {
    /// Create a pool with an empty inventory.
    pub fn new(config: PoolConfig, backend: Arc<B>) -> PoolResult<Self> {
        config.validate()?;
        Ok(Self {
            config,
            backend,
            inventory: Inventory::new(),
        })
    }

    pub fn config(&self) -> &PoolConfig {
        &self.config
    }

    pub fn backend(&self) -> &Arc<B> {
        &self.backend
    }

    /// Place one rule on the current inventory.
    #[instrument(skip(self, rule), fields(prefix = %self.config.bus_prefix))]
    pub async fn add_rule(&mut self, rule: Rule) -> PoolResult<Placement> {
        placement::add_rule(self, rule).await
    }

    /// Reconcile, then place each rule in order.
    pub async fn reconcile_and_place(&mut self, rules: Vec<Rule>) -> PoolResult<Vec<Placement>> {
        self.load_inventory().await?;

        let mut placements = Vec::with_capacity(rules.len());
        for rule in rules {
            placements.push(self.add_rule(rule).await?);
        }
        Ok(placements)
    }

    /// Reconcile, then delete every empty pooled bus.
    #[instrument(skip(self), fields(prefix = %self.config.bus_prefix))]
    pub async fn collect_empty(&mut self) -> PoolResult<Vec<BusName>> {
        self.load_inventory().await?;
        let collected = placement::collect_empty(self).await?;
        if !collected.is_empty() {
            info!(count = collected.len(), "Collected empty buses");
        }
        Ok(collected)
    }

    /// Fingerprint of the last reconciliation.
    pub fn stamp(&self) -> InventoryStamp {
        self.inventory.stamp()
    }

    async fn reconcile(&self) -> PoolResult<Inventory<Bus<B>>> {
        let mut inventory = Inventory::new();

        if let Some(name) = &self.config.default_bus {
            let bus_name = BusName::default_bus(name.clone())?;
            match Bus::load(bus_name, Arc::clone(&self.backend)).await {
                Ok(bus) => inventory.insert(bus),
                Err(PoolError::Backend(BackendError::NotFound(_))) => {
                    warn!(bus = %name, "Default bus not found, skipping");
                }
                Err(e) => return Err(e),
            }
        }

        let prefix = format!("{}{}", self.config.bus_prefix, BusName::SEPARATOR);
        for summary in list_all_buses(&*self.backend, &prefix).await? {
            let name = match BusName::parse_pooled(&self.config.bus_prefix, &summary.name) {
                Ok(name) => name,
                Err(e) => {
                    debug!(bus = %summary.name, error = %e, "Ignoring bus outside the pool");
                    continue;
                }
            };

            match Bus::load(name, Arc::clone(&self.backend)).await {
                Ok(bus) => inventory.insert(bus),
                Err(PoolError::Backend(BackendError::NotFound(_))) => {
                    debug!(bus = %summary.name, "Bus disappeared during reconciliation");
                }
                Err(e) => return Err(e),
            }
        }

        Ok(inventory)
    }
}

#[async_trait]
impl<B: SchedulerBackend + ?Sized> Allocator for Pool<B> {
    type Bus = Bus<B>;

    fn rule_limit(&self) -> usize {
        self.config.rule_limit
    }

    fn max_buses(&self) -> usize {
        self.config.max_buses
    }

    fn inventory(&self) -> &Inventory<Bus<B>> {
        &self.inventory
    }

    fn inventory_mut(&mut self) -> &mut Inventory<Bus<B>> {
        &mut self.inventory
    }

    fn new_bus(&self, index: BusIndex) -> PoolResult<Bus<B>> {
        let name = BusName::pooled(&self.config.bus_prefix, index)?;
        Ok(Bus::new(name, Arc::clone(&self.backend)))
    }

    /// Replaces the inventory only if every listing succeeded.
    #[instrument(skip(self), fields(prefix = %self.config.bus_prefix))]
    async fn load_inventory(&mut self) -> PoolResult<()> {
        let inventory = self.reconcile().await?;
        debug!(
            buses = inventory.len(),
            rules = inventory.iter().map(Container::rule_count).sum::<usize>(),
            "Reconciled inventory"
        );
        self.inventory = inventory;
        Ok(())
    }
}
