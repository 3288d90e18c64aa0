//! Placement integration tests.
//!
//! Drives a `Pool` against the in-memory backend with a rule limit of 3,
//! reconciling before every placement the way the scheduler service does.

use std::collections::BTreeMap;
use std::sync::Arc;

use rulepool_core::backend::{BackendError, MemoryBackend, Mutation, Operation};
use rulepool_core::{
    Allocator, Container, Pool, PoolConfig, PoolError, Rule, RuleTarget, SchedulerBackend,
};
use rulepool_id::BusName;

const PREFIX: &str = "pool";
const LIMIT: usize = 3;

/// Test harness: a pool with no default bus over a fresh memory backend.
struct PoolHarness {
    backend: Arc<MemoryBackend>,
    pool: Pool<MemoryBackend>,
}

impl PoolHarness {
    fn new() -> Self {
        Self::with_config(PoolConfig::new(PREFIX, LIMIT).with_default_bus(None))
    }

    fn with_config(config: PoolConfig) -> Self {
        Self::with_backend(config, MemoryBackend::without_default_bus())
    }

    fn with_backend(config: PoolConfig, backend: MemoryBackend) -> Self {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| "info,rulepool_core=debug".into()),
            )
            .with_test_writer()
            .try_init();

        let backend = Arc::new(backend);
        let pool = Pool::new(config, Arc::clone(&backend)).unwrap();
        Self { backend, pool }
    }

    async fn seed(&self, counts: &[usize]) {
        for (i, &count) in counts.iter().enumerate() {
            self.backend
                .seed_bus(&format!("{PREFIX}-{}", i + 1), count)
                .await;
        }
    }

    async fn place(&mut self) -> rulepool_core::Placement {
        self.pool.load_inventory().await.unwrap();
        self.pool.add_rule(rule()).await.unwrap()
    }

    async fn counts(&self) -> BTreeMap<String, usize> {
        self.backend.rule_counts().await
    }
}

fn rule() -> Rule {
    Rule::new(
        "at(2030-01-01T00:00:00)",
        RuleTarget {
            target_ref: "fn:document-reminders".to_string(),
            payload: serde_json::json!({"document": "consent-form"}),
            grants_invoke: true,
        },
    )
    .unwrap()
}

fn counts(pairs: &[(&str, usize)]) -> BTreeMap<String, usize> {
    pairs.iter().map(|(n, c)| (n.to_string(), *c)).collect()
}

fn creates(journal: &[Mutation]) -> usize {
    journal
        .iter()
        .filter(|m| matches!(m, Mutation::CreateBus(_)))
        .count()
}

// =============================================================================
// Scenarios
// =============================================================================

#[tokio::test]
async fn test_first_rule_creates_first_bus() {
    let mut h = PoolHarness::new();

    let placement = h.place().await;

    assert!(placement.created_bus);
    assert_eq!(placement.bus.as_str(), "pool-1");
    assert_eq!(h.counts().await, counts(&[("pool-1", 1)]));
}

#[tokio::test]
async fn test_spill_over_progression() {
    let mut h = PoolHarness::new();

    let mut progression = Vec::new();
    for _ in 0..7 {
        h.place().await;
        progression.push(h.counts().await.len());
    }

    assert_eq!(progression, vec![1, 1, 1, 2, 2, 2, 3]);
    assert_eq!(
        h.counts().await,
        counts(&[("pool-1", 3), ("pool-2", 3), ("pool-3", 1)])
    );
}

#[tokio::test]
async fn test_partial_bus_is_filled() {
    let mut h = PoolHarness::new();
    h.seed(&[2]).await;

    let placement = h.place().await;

    assert!(!placement.created_bus);
    assert_eq!(h.counts().await, counts(&[("pool-1", 3)]));
}

#[tokio::test]
async fn test_full_bus_spills_to_second() {
    let mut h = PoolHarness::new();
    h.seed(&[2]).await;

    h.place().await;
    let placement = h.place().await;

    assert!(placement.created_bus);
    assert_eq!(placement.bus.as_str(), "pool-2");
    assert_eq!(h.counts().await, counts(&[("pool-1", 3), ("pool-2", 1)]));
}

#[tokio::test]
async fn test_fullest_eligible_bus_wins() {
    let mut h = PoolHarness::new();
    h.seed(&[2, 1]).await;

    let placement = h.place().await;

    assert_eq!(placement.bus.as_str(), "pool-1");
    assert_eq!(h.counts().await, counts(&[("pool-1", 3), ("pool-2", 1)]));
}

#[tokio::test]
async fn test_packing_over_four_buses() {
    let mut h = PoolHarness::new();
    h.seed(&[1, 1, 3, 2]).await;

    let first = h.place().await;
    assert_eq!(first.bus.as_str(), "pool-4");
    assert_eq!(h.counts().await.get("pool-4"), Some(&3));

    let second = h.place().await;
    assert!(["pool-1", "pool-2"].contains(&second.bus.as_str()));

    let after = h.counts().await;
    assert_eq!(after["pool-1"] + after["pool-2"], 3);
    assert_eq!(creates(&h.backend.journal().await), 0);
}

// =============================================================================
// Invariants
// =============================================================================

#[tokio::test]
async fn test_no_bus_exceeds_limit() {
    let mut h = PoolHarness::new();
    h.seed(&[0, 2, 1]).await;

    for _ in 0..10 {
        h.place().await;
        assert!(h.counts().await.values().all(|&c| c <= LIMIT));
    }
}

#[tokio::test]
async fn test_empty_buses_collected_after_placement() {
    let mut h = PoolHarness::new();
    h.seed(&[2, 0, 0]).await;

    let placement = h.place().await;

    assert_eq!(placement.bus.as_str(), "pool-1");
    let collected: Vec<&str> = placement.collected.iter().map(BusName::as_str).collect();
    assert_eq!(collected, vec!["pool-2", "pool-3"]);
    assert_eq!(h.counts().await, counts(&[("pool-1", 3)]));
    assert_eq!(h.pool.inventory().len(), 1);
}

#[tokio::test]
async fn test_empty_target_is_not_collected() {
    let mut h = PoolHarness::new();
    h.seed(&[0, 3]).await;

    let placement = h.place().await;

    assert_eq!(placement.bus.as_str(), "pool-1");
    assert!(placement.collected.is_empty());
    assert_eq!(h.counts().await, counts(&[("pool-1", 1), ("pool-2", 3)]));
}

#[tokio::test]
async fn test_stale_empty_bus_is_left_in_place() {
    let mut h = PoolHarness::new();
    h.seed(&[2, 0]).await;
    h.backend
        .fail_next(
            Operation::DeleteBus,
            BackendError::StillInUse("rule created concurrently".into()),
        )
        .await;

    let placement = h.place().await;

    assert!(placement.collected.is_empty());
    assert!(h.counts().await.contains_key("pool-2"));
    assert_eq!(h.pool.inventory().len(), 2);
}

#[tokio::test]
async fn test_reconciliation_round_trip() {
    let mut h = PoolHarness::new();
    h.seed(&[3, 1, 2]).await;

    h.pool.load_inventory().await.unwrap();
    let first = (h.pool.inventory().rule_counts(), h.pool.stamp());
    h.pool.load_inventory().await.unwrap();
    let second = (h.pool.inventory().rule_counts(), h.pool.stamp());

    assert_eq!(first, second);
}

#[tokio::test]
async fn test_fired_rules_observed_on_next_reconciliation() {
    let mut h = PoolHarness::new();
    h.seed(&[3]).await;

    h.pool.load_inventory().await.unwrap();
    assert_eq!(h.pool.inventory().rule_counts(), vec![("pool-1".to_string(), 3)]);

    assert!(h.backend.expire_rule("pool-1", "pool-1-seed-0000").await);
    let placement = h.place().await;

    assert!(!placement.created_bus);
    assert_eq!(h.counts().await, counts(&[("pool-1", 3)]));
}

#[tokio::test]
async fn test_reconcile_and_place_batches() {
    let mut h = PoolHarness::new();

    let placements = h
        .pool
        .reconcile_and_place(vec![rule(), rule(), rule(), rule()])
        .await
        .unwrap();

    let created: Vec<bool> = placements.iter().map(|p| p.created_bus).collect();
    assert_eq!(created, vec![true, false, false, true]);
    assert_eq!(h.counts().await, counts(&[("pool-1", 3), ("pool-2", 1)]));
}

#[tokio::test]
async fn test_gap_in_indices_is_reused() {
    let mut h = PoolHarness::new();
    h.backend.seed_bus("pool-1", 3).await;
    h.backend.seed_bus("pool-3", 3).await;

    let placement = h.place().await;

    assert_eq!(placement.bus.as_str(), "pool-2");
}

#[tokio::test]
async fn test_foreign_buses_are_ignored() {
    let mut h = PoolHarness::new();
    h.backend.seed_bus("pool-archive", 0).await;
    h.backend.seed_bus("poolside-1", 0).await;
    h.seed(&[1]).await;

    let placement = h.place().await;

    assert!(placement.collected.is_empty());
    assert!(h.counts().await.contains_key("pool-archive"));
    assert!(h.counts().await.contains_key("poolside-1"));
}

// =============================================================================
// Default bus
// =============================================================================

#[tokio::test]
async fn test_default_bus_takes_part_but_is_never_created_or_deleted() {
    let mut h = PoolHarness::with_backend(PoolConfig::new(PREFIX, LIMIT), MemoryBackend::new());

    // Empty default bus is the first eligible target.
    let placement = h.place().await;
    assert_eq!(placement.bus.as_str(), "default");
    assert!(!placement.created_bus);

    h.place().await;
    h.place().await;
    let spilled = h.place().await;
    assert_eq!(spilled.bus.as_str(), "pool-1");

    // Drain the default bus; it must survive collection.
    let defaults: Vec<String> = h
        .backend
        .list_rules("default", None, None)
        .await
        .unwrap()
        .items
        .into_iter()
        .map(|r| r.name)
        .collect();
    for name in &defaults {
        assert!(h.backend.expire_rule("default", name).await);
    }
    h.place().await;

    let journal = h.backend.journal().await;
    assert!(!journal
        .iter()
        .any(|m| matches!(m, Mutation::CreateBus(b) | Mutation::DeleteBus(b) if b == "default")));
    assert!(h.counts().await.contains_key("default"));
}

#[tokio::test]
async fn test_missing_default_bus_is_skipped() {
    let mut h = PoolHarness::with_config(PoolConfig::new(PREFIX, LIMIT));

    let placement = h.place().await;

    assert_eq!(placement.bus.as_str(), "pool-1");
}

// =============================================================================
// Failure handling
// =============================================================================

#[tokio::test]
async fn test_bus_ceiling_enforced() {
    let mut h = PoolHarness::with_config(
        PoolConfig::new(PREFIX, LIMIT)
            .with_default_bus(None)
            .with_max_buses(2),
    );
    h.seed(&[3, 3]).await;

    h.pool.load_inventory().await.unwrap();
    let err = h.pool.add_rule(rule()).await.unwrap_err();

    assert!(matches!(err, PoolError::CapacityExhausted { max_buses: 2 }));
    assert_eq!(creates(&h.backend.journal().await), 0);
}

#[tokio::test]
async fn test_concurrent_fill_is_a_conflict() {
    let mut h = PoolHarness::new();
    h.seed(&[2]).await;

    h.pool.load_inventory().await.unwrap();
    // Another writer fills the bus after reconciliation.
    h.backend.seed_bus("pool-1", 1).await;

    let err = h.pool.add_rule(rule()).await.unwrap_err();
    assert!(err.is_retryable());
    assert_eq!(h.counts().await, counts(&[("pool-1", 3)]));

    // A fresh cycle sees the full bus and spills over.
    let placement = h.place().await;
    assert_eq!(placement.bus.as_str(), "pool-2");
}

#[tokio::test]
async fn test_target_collected_by_another_writer_is_a_conflict() {
    let mut h = PoolHarness::new();
    h.seed(&[3, 0]).await;

    h.pool.load_inventory().await.unwrap();
    // Another writer's sweep removes the empty target after reconciliation.
    h.backend.delete_bus("pool-2").await.unwrap();

    let err = h.pool.add_rule(rule()).await.unwrap_err();
    assert!(matches!(err, PoolError::Conflict { ref bus, .. } if bus == "pool-2"));
    assert!(err.is_retryable());

    let placement = h.place().await;
    assert_eq!(placement.bus.as_str(), "pool-2");
    assert!(placement.created_bus);
    assert_eq!(h.counts().await, counts(&[("pool-1", 3), ("pool-2", 1)]));
}

#[tokio::test]
async fn test_backend_limit_rejection_is_a_conflict() {
    let mut h = PoolHarness::new();
    h.seed(&[1]).await;
    h.backend
        .fail_next(
            Operation::PutRule,
            BackendError::LimitExceeded("quota".into()),
        )
        .await;

    h.pool.load_inventory().await.unwrap();
    let err = h.pool.add_rule(rule()).await.unwrap_err();

    assert!(matches!(err, PoolError::Conflict { ref bus, .. } if bus == "pool-1"));
}

#[tokio::test]
async fn test_partial_listing_failure_keeps_previous_inventory() {
    let mut h = PoolHarness::new();
    h.seed(&[1, 2]).await;
    h.pool.load_inventory().await.unwrap();

    h.backend.seed_bus("pool-3", 1).await;
    h.backend
        .fail_next(Operation::ListRules, BackendError::Transport("reset".into()))
        .await;

    let err = h.pool.load_inventory().await.unwrap_err();
    assert!(err.is_transient());
    assert_eq!(h.pool.inventory().len(), 2);
}

#[tokio::test]
async fn test_invalid_config_rejected() {
    let backend = Arc::new(MemoryBackend::without_default_bus());
    let result = Pool::new(PoolConfig::new(PREFIX, 0), backend);
    assert!(matches!(result, Err(PoolError::InvalidConfig(_))));
}

#[tokio::test]
async fn test_sweep_collects_drained_buses() {
    let mut h = PoolHarness::new();
    h.seed(&[1, 0, 2]).await;
    h.backend.expire_rule("pool-1", "pool-1-seed-0000").await;

    let collected = h.pool.collect_empty().await.unwrap();

    let names: Vec<&str> = collected.iter().map(BusName::as_str).collect();
    assert_eq!(names, vec!["pool-1", "pool-2"]);
    assert_eq!(h.counts().await, counts(&[("pool-3", 2)]));
    assert!(h.pool.inventory().iter().all(|b| b.rule_count() > 0));
}
