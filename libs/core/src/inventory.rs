//! Ordered inventory of containers.

use rulepool_id::BusIndex;
use rulepool_reconcile::InventoryStamp;

use crate::roles::Container;

/// Containers of one pool, kept in ascending index order.
///
/// Placement's "first eligible" tie-break follows this order, so the
/// default bus (index 0) always comes first.
#[derive(Debug)]
pub struct Inventory<C> {
    buses: Vec<C>,
}

impl<C> Default for Inventory<C> {
    fn default() -> Self {
        Self { buses: Vec::new() }
    }
}

impl<C: Container> Inventory<C> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.buses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buses.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &C> {
        self.buses.iter()
    }

    fn position(&self, index: BusIndex) -> Result<usize, usize> {
        self.buses.binary_search_by_key(&index, |bus| bus.index())
    }

    pub fn get(&self, index: BusIndex) -> Option<&C> {
        let pos = self.position(index).ok()?;
        self.buses.get(pos)
    }

    pub fn get_mut(&mut self, index: BusIndex) -> Option<&mut C> {
        let pos = self.position(index).ok()?;
        self.buses.get_mut(pos)
    }

    /// Insert a container, replacing any container with the same index.
    pub fn insert(&mut self, bus: C) {
        match self.position(bus.index()) {
            Ok(pos) => self.buses[pos] = bus,
            Err(pos) => self.buses.insert(pos, bus),
        }
    }

    pub fn remove(&mut self, index: BusIndex) -> Option<C> {
        let pos = self.position(index).ok()?;
        Some(self.buses.remove(pos))
    }

    pub fn indices(&self) -> impl Iterator<Item = BusIndex> + '_ {
        self.buses.iter().map(|bus| bus.index())
    }

    /// `(index, rule count)` pairs in inventory order.
    pub fn occupancy(&self) -> impl Iterator<Item = (BusIndex, usize)> + '_ {
        self.buses.iter().map(|bus| (bus.index(), bus.rule_count()))
    }

    /// `(bus name, rule count)` pairs in inventory order.
    pub fn rule_counts(&self) -> Vec<(String, usize)> {
        self.buses
            .iter()
            .map(|bus| (bus.name().to_string(), bus.rule_count()))
            .collect()
    }

    /// Fingerprint of the observed rule counts.
    pub fn stamp(&self) -> InventoryStamp {
        InventoryStamp::from_counts(
            self.buses
                .iter()
                .map(|bus| (bus.name().as_str(), bus.rule_count())),
        )
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::backend::MemoryBackend;
    use crate::bus::Bus;
    use rulepool_id::BusName;

    fn bus(backend: &Arc<MemoryBackend>, index: u32) -> Bus<MemoryBackend> {
        let name = if index == 0 {
            BusName::default_bus("default").unwrap()
        } else {
            BusName::pooled("pool", BusIndex::new(index)).unwrap()
        };
        Bus::new(name, Arc::clone(backend))
    }

    #[test]
    fn test_insert_keeps_index_order() {
        let backend = Arc::new(MemoryBackend::without_default_bus());
        let mut inventory = Inventory::new();
        for index in [10, 2, 0, 1] {
            inventory.insert(bus(&backend, index));
        }

        let order: Vec<u32> = inventory.indices().map(|i| i.value()).collect();
        assert_eq!(order, vec![0, 1, 2, 10]);
    }

    #[test]
    fn test_insert_replaces_same_index() {
        let backend = Arc::new(MemoryBackend::without_default_bus());
        let mut inventory = Inventory::new();
        inventory.insert(bus(&backend, 1));
        inventory.insert(bus(&backend, 1));
        assert_eq!(inventory.len(), 1);
    }

    #[test]
    fn test_remove() {
        let backend = Arc::new(MemoryBackend::without_default_bus());
        let mut inventory = Inventory::new();
        inventory.insert(bus(&backend, 1));
        inventory.insert(bus(&backend, 2));

        assert!(inventory.remove(BusIndex::new(1)).is_some());
        assert!(inventory.remove(BusIndex::new(1)).is_none());
        assert!(inventory.get(BusIndex::new(2)).is_some());
    }

    #[test]
    fn test_lookup_after_out_of_order_inserts() {
        let backend = Arc::new(MemoryBackend::without_default_bus());
        let mut inventory = Inventory::new();
        for index in [5, 0, 3, 1] {
            inventory.insert(bus(&backend, index));
        }

        let order: Vec<u32> = inventory.indices().map(|i| i.value()).collect();
        assert_eq!(order, vec![0, 1, 3, 5]);
        assert!(inventory.get(BusIndex::new(2)).is_none());
        assert!(inventory.get(BusIndex::new(6)).is_none());
        assert_eq!(inventory.get(BusIndex::new(3)).map(|b| b.index()), Some(BusIndex::new(3)));
        assert!(inventory.get_mut(BusIndex::new(5)).is_some());
        assert!(inventory.remove(BusIndex::new(4)).is_none());
        assert_eq!(inventory.remove(BusIndex::new(0)).map(|b| b.index()), Some(BusIndex::new(0)));
        assert_eq!(inventory.len(), 3);
    }

    #[test]
    fn test_stamp_ignores_insertion_order() {
        let backend = Arc::new(MemoryBackend::without_default_bus());
        let mut a = Inventory::new();
        a.insert(bus(&backend, 1));
        a.insert(bus(&backend, 2));
        let mut b = Inventory::new();
        b.insert(bus(&backend, 2));
        b.insert(bus(&backend, 1));

        assert_eq!(a.stamp(), b.stamp());
        assert_ne!(a.stamp(), Inventory::<Bus<MemoryBackend>>::new().stamp());
    }
}
