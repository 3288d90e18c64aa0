//! Role traits the placement pass is written against.
//!
//! - [`Allocator`]: owns the inventory and knows the pool's limits
//! - [`Container`]: a capacity-bounded holder of rules (a bus)
//! - [`SchedulableUnit`]: one scheduled task that can materialize itself
//!   onto a container
//!
//! [`crate::placement::add_rule`] only ever sees these traits, never a
//! concrete backend type.

use async_trait::async_trait;
use rulepool_id::{BusIndex, BusName, RuleName, TargetId};

use crate::backend::{RuleHandle, TargetAttachment};
use crate::error::PoolResult;
use crate::inventory::Inventory;

/// A named, capacity-bounded holder of rules.
#[async_trait]
pub trait Container: Send + Sync {
    type Unit: SchedulableUnit;

    fn name(&self) -> &BusName;

    fn index(&self) -> BusIndex {
        self.name().index()
    }

    /// Number of rules believed to occupy the container.
    fn rule_count(&self) -> usize;

    /// Upsert a rule into the local rule map, keyed by its name.
    fn set_rule(&mut self, unit: Self::Unit);

    /// Provision the container. An already existing container is not an
    /// error.
    async fn create(&self) -> PoolResult<()>;

    /// Remove the container.
    ///
    /// Returns `false` if the backend refused because rules are still
    /// attached; the container is then left in place.
    async fn delete(&self) -> PoolResult<bool>;

    /// Count the rules the backend holds for this container right now.
    async fn live_rule_count(&self) -> PoolResult<usize>;

    async fn put_rule(&self, rule: &RuleName, schedule_expression: &str)
        -> PoolResult<RuleHandle>;

    async fn put_target(&self, rule: &RuleName, target: &TargetAttachment) -> PoolResult<()>;

    async fn grant_invoke_permission(
        &self,
        target_ref: &str,
        handle: &RuleHandle,
    ) -> PoolResult<()>;

    /// Undo a partially materialized rule.
    async fn remove_rule(&self, rule: &RuleName, target_ids: &[TargetId]) -> PoolResult<()>;
}

/// One scheduled task.
#[async_trait]
pub trait SchedulableUnit: Send + Sync + Sized {
    /// The pre-assigned or previously generated name, if any.
    fn name(&self) -> Option<&RuleName>;

    /// Return the unit's name, generating one scoped to `parent` on first
    /// use.
    fn name_for(&mut self, parent: &BusName) -> RuleName;

    /// Create the unit on `container` and register it there.
    async fn create_on<C>(self, container: &mut C) -> PoolResult<RuleName>
    where
        C: Container<Unit = Self>;
}

/// Owner of an inventory of containers.
#[async_trait]
pub trait Allocator: Send + Sync {
    type Bus: Container;

    /// Per-container rule capacity.
    fn rule_limit(&self) -> usize;

    /// Maximum number of containers, the default one included.
    fn max_buses(&self) -> usize;

    fn inventory(&self) -> &Inventory<Self::Bus>;

    fn inventory_mut(&mut self) -> &mut Inventory<Self::Bus>;

    /// Build (but do not provision) the container for `index`.
    fn new_bus(&self, index: BusIndex) -> PoolResult<Self::Bus>;

    /// Rebuild the inventory from the backend.
    async fn load_inventory(&mut self) -> PoolResult<()>;
}
