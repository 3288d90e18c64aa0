//! Placement: choosing a bus for a rule and reclaiming empty buses.
//!
//! Planning is pure ([`plan_placement`], [`next_free_index`]). The pass that
//! acts on a plan ([`add_rule`]) is written once against the role traits.
//!
//! ```text
//! SCANNING → {TARGET_FOUND | CREATING_CONTAINER} → PLACING_RULE
//!          → COLLECTING_EMPTY_CONTAINERS → DONE
//! ```
//!
//! Any failing step aborts the pass.

use std::collections::BTreeSet;

use rulepool_id::{BusIndex, BusName, RuleName};
use serde::Serialize;
use tracing::{debug, info};

use crate::backend::BackendError;
use crate::error::{PoolError, PoolResult};
use crate::roles::{Allocator, Container, SchedulableUnit};

// =============================================================================
// Planning
// =============================================================================

/// Outcome of scanning an inventory for one placement.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PlacementPlan {
    /// Bus to place on, or `None` if a new bus is needed.
    pub target: Option<BusIndex>,

    /// Non-default buses that were empty at scan time, target excluded.
    pub collect: Vec<BusIndex>,
}

/// Scan `(index, rule count)` pairs in inventory order.
///
/// Buses at or above `rule_limit` are skipped. The first eligible bus is the
/// initial target and is only replaced by a later bus with a strictly
/// greater count, so the fullest eligible bus wins and ties keep the earlier
/// one.
pub fn plan_placement<I>(occupancy: I, rule_limit: usize) -> PlacementPlan
where
    I: IntoIterator<Item = (BusIndex, usize)>,
{
    let mut target: Option<(BusIndex, usize)> = None;
    let mut empty = Vec::new();

    for (index, count) in occupancy {
        if count == 0 && !index.is_default() {
            empty.push(index);
        }
        if count >= rule_limit {
            continue;
        }
        match target {
            Some((_, best)) if count <= best => {}
            _ => target = Some((index, count)),
        }
    }

    let target = target.map(|(index, _)| index);
    empty.retain(|index| Some(*index) != target);

    PlacementPlan {
        target,
        collect: empty,
    }
}

/// Smallest pooled index (1 or more) not in `existing`.
pub fn next_free_index<I>(existing: I) -> BusIndex
where
    I: IntoIterator<Item = BusIndex>,
{
    let used: BTreeSet<u32> = existing.into_iter().map(|i| i.value()).collect();
    let mut candidate = BusIndex::FIRST_POOLED.value();
    while used.contains(&candidate) {
        candidate += 1;
    }
    BusIndex::new(candidate)
}

// =============================================================================
// Placement pass
// =============================================================================

/// Result of one successful placement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Placement {
    pub rule_name: RuleName,
    pub bus: BusName,
    pub created_bus: bool,
    pub collected: Vec<BusName>,
}

/// Place `unit` on the allocator's current inventory.
///
/// The inventory must already be reconciled; see
/// [`Allocator::load_inventory`].
pub async fn add_rule<A>(
    allocator: &mut A,
    unit: <A::Bus as Container>::Unit,
) -> PoolResult<Placement>
where
    A: Allocator + ?Sized,
{
    let limit = allocator.rule_limit();
    let plan = plan_placement(allocator.inventory().occupancy(), limit);

    let (target, created_bus) = match plan.target {
        Some(index) => {
            verify_unchanged(allocator, index, limit).await?;
            (index, false)
        }
        None => (create_bus(allocator).await?, true),
    };

    let bus = allocator
        .inventory_mut()
        .get_mut(target)
        .ok_or_else(|| PoolError::Conflict {
            bus: target.to_string(),
            reason: "target bus left the inventory".to_string(),
        })?;
    let bus_name = bus.name().clone();
    let rule_name = unit.create_on(bus).await?;

    info!(
        bus = %bus_name,
        rule = %rule_name,
        created_bus,
        "Placed rule"
    );

    let collected = collect(allocator, &plan.collect).await?;

    Ok(Placement {
        rule_name,
        bus: bus_name,
        created_bus,
        collected,
    })
}

/// Delete every non-default bus the current inventory reports as empty.
pub async fn collect_empty<A>(allocator: &mut A) -> PoolResult<Vec<BusName>>
where
    A: Allocator + ?Sized,
{
    let empty: Vec<BusIndex> = allocator
        .inventory()
        .occupancy()
        .filter(|(index, count)| *count == 0 && !index.is_default())
        .map(|(index, _)| index)
        .collect();
    collect(allocator, &empty).await
}

async fn collect<A>(allocator: &mut A, candidates: &[BusIndex]) -> PoolResult<Vec<BusName>>
where
    A: Allocator + ?Sized,
{
    let mut collected = Vec::new();
    for &index in candidates {
        let Some(bus) = allocator.inventory().get(index) else {
            continue;
        };
        let name = bus.name().clone();
        if bus.delete().await? {
            allocator.inventory_mut().remove(index);
            collected.push(name);
        }
    }
    Ok(collected)
}

/// Fail with a conflict if another writer filled `index` since the
/// inventory was reconciled.
async fn verify_unchanged<A>(allocator: &A, index: BusIndex, limit: usize) -> PoolResult<()>
where
    A: Allocator + ?Sized,
{
    let Some(bus) = allocator.inventory().get(index) else {
        return Ok(());
    };

    let observed = bus.rule_count();
    let live = match bus.live_rule_count().await {
        Ok(live) => live,
        Err(PoolError::Backend(BackendError::NotFound(_))) => {
            return Err(PoolError::Conflict {
                bus: bus.name().to_string(),
                reason: "bus was deleted since reconciliation".to_string(),
            });
        }
        Err(e) => return Err(e),
    };
    if live > observed && live >= limit {
        return Err(PoolError::Conflict {
            bus: bus.name().to_string(),
            reason: format!("observed {observed} rules, backend now holds {live}"),
        });
    }
    if live != observed {
        debug!(bus = %bus.name(), observed, live, "Rule count drifted since reconciliation");
    }
    Ok(())
}

async fn create_bus<A>(allocator: &mut A) -> PoolResult<BusIndex>
where
    A: Allocator + ?Sized,
{
    let max_buses = allocator.max_buses();
    if allocator.inventory().len() >= max_buses {
        return Err(PoolError::CapacityExhausted { max_buses });
    }

    let index = next_free_index(allocator.inventory().indices());
    let bus = allocator.new_bus(index)?;
    bus.create().await?;
    allocator.inventory_mut().insert(bus);
    Ok(index)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rstest::rstest;

    fn occupancy(counts: &[usize]) -> Vec<(BusIndex, usize)> {
        counts
            .iter()
            .enumerate()
            .map(|(i, &count)| (BusIndex::new(i as u32 + 1), count))
            .collect()
    }

    #[rstest]
    #[case::empty_inventory(&[], None)]
    #[case::all_full(&[3, 3], None)]
    #[case::single_partial(&[2], Some(1))]
    #[case::fullest_wins(&[2, 1], Some(1))]
    #[case::later_fuller_wins(&[1, 1, 3, 2], Some(4))]
    #[case::tie_keeps_first(&[1, 1, 3, 3], Some(1))]
    #[case::near_full_beats_half(&[1, 2], Some(2))]
    fn test_target_selection(#[case] counts: &[usize], #[case] expected: Option<u32>) {
        let plan = plan_placement(occupancy(counts), 3);
        assert_eq!(plan.target, expected.map(BusIndex::new));
    }

    #[test]
    fn test_empty_buses_collected_except_target() {
        let plan = plan_placement(occupancy(&[0, 0, 3]), 3);
        assert_eq!(plan.target, Some(BusIndex::new(1)));
        assert_eq!(plan.collect, vec![BusIndex::new(2)]);
    }

    #[test]
    fn test_default_bus_never_collected() {
        let plan = plan_placement(vec![(BusIndex::DEFAULT, 0), (BusIndex::new(1), 2)], 3);
        assert_eq!(plan.target, Some(BusIndex::new(1)));
        assert!(plan.collect.is_empty());
    }

    #[rstest]
    #[case(&[], 1)]
    #[case(&[0], 1)]
    #[case(&[1, 2, 3], 4)]
    #[case(&[2, 3], 1)]
    #[case(&[0, 1, 3, 4], 2)]
    #[case(&[5, 1, 3, 2], 4)]
    fn test_next_free_index(#[case] existing: &[u32], #[case] expected: u32) {
        let existing = existing.iter().copied().map(BusIndex::new);
        assert_eq!(next_free_index(existing), BusIndex::new(expected));
    }

    proptest! {
        #[test]
        fn prop_next_free_index_is_smallest_gap(existing in prop::collection::btree_set(0u32..64, 0..32)) {
            let next = next_free_index(existing.iter().copied().map(BusIndex::new)).value();
            prop_assert!(next >= 1);
            prop_assert!(!existing.contains(&next));
            prop_assert!((1..next).all(|i| existing.contains(&i)));
        }

        #[test]
        fn prop_plan_respects_limit(counts in prop::collection::vec(0usize..6, 0..12), limit in 1usize..6) {
            let plan = plan_placement(occupancy(&counts), limit);

            match plan.target {
                Some(target) => {
                    let count = counts[target.value() as usize - 1];
                    prop_assert!(count < limit);
                    prop_assert!(counts.iter().all(|&c| c >= limit || c <= count));
                    prop_assert!(!plan.collect.contains(&target));
                }
                None => prop_assert!(counts.iter().all(|&c| c >= limit)),
            }

            for index in &plan.collect {
                prop_assert_eq!(counts[index.value() as usize - 1], 0);
            }
        }
    }
}
