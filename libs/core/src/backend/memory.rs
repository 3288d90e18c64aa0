//! In-process scheduling backend.
//!
//! Behaves like the real service where the pool can observe it: paginated
//! listings, idempotency conflicts on create/delete, a per-bus rule quota,
//! and rules that refuse deletion while targets are attached. Used by the
//! scheduler in development mode and by the test suites.

use std::collections::BTreeMap;

use async_trait::async_trait;
use rulepool_id::TargetId;
use tokio::sync::Mutex;
use tracing::debug;

use super::{
    BackendError, BackendResult, BusSummary, Page, RuleHandle, RuleSummary, SchedulerBackend,
    TargetAttachment,
};
use crate::config::DEFAULT_BUS_NAME;

const DEFAULT_PAGE_SIZE: usize = 100;

/// Backend operations, used to target injected failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    ListBuses,
    ListRules,
    CreateBus,
    DeleteBus,
    PutRule,
    PutTarget,
    GrantPermission,
    RemoveTargets,
    DeleteRule,
}

/// A successful mutation, recorded in call order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mutation {
    CreateBus(String),
    DeleteBus(String),
    PutRule { bus: String, rule: String },
    PutTarget { bus: String, rule: String },
    GrantPermission { target_ref: String, rule: String },
    RemoveTargets { bus: String, rule: String },
    DeleteRule { bus: String, rule: String },
}

/// A rule stored by the memory backend.
#[derive(Debug, Clone, PartialEq)]
pub struct MemoryRule {
    pub schedule_expression: String,
    pub targets: Vec<TargetAttachment>,
}

#[derive(Debug, Default)]
struct MemoryState {
    buses: BTreeMap<String, BTreeMap<String, MemoryRule>>,
    failures: Vec<(Operation, BackendError)>,
    journal: Vec<Mutation>,
}

impl MemoryState {
    fn check(&mut self, op: Operation) -> BackendResult<()> {
        if let Some(pos) = self.failures.iter().position(|(o, _)| *o == op) {
            let (_, err) = self.failures.remove(pos);
            debug!(operation = ?op, error = %err, "Injected backend failure");
            return Err(err);
        }
        Ok(())
    }

    fn bus_mut(&mut self, bus: &str) -> BackendResult<&mut BTreeMap<String, MemoryRule>> {
        self.buses
            .get_mut(bus)
            .ok_or_else(|| BackendError::NotFound(format!("bus {bus}")))
    }
}

/// In-memory [`SchedulerBackend`].
#[derive(Debug)]
pub struct MemoryBackend {
    state: Mutex<MemoryState>,
    page_size: usize,
    rule_limit: Option<usize>,
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryBackend {
    /// Create a backend that, like a real account, already has a default bus.
    pub fn new() -> Self {
        let mut state = MemoryState::default();
        state
            .buses
            .insert(DEFAULT_BUS_NAME.to_string(), BTreeMap::new());

        Self {
            state: Mutex::new(state),
            ..Self::without_default_bus()
        }
    }

    /// Create an empty backend with no buses at all.
    pub fn without_default_bus() -> Self {
        Self {
            state: Mutex::new(MemoryState::default()),
            page_size: DEFAULT_PAGE_SIZE,
            rule_limit: None,
        }
    }

    /// Set the listing page size.
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    /// Enforce a per-bus rule quota on `put_rule`.
    pub fn with_rule_limit(mut self, rule_limit: usize) -> Self {
        self.rule_limit = Some(rule_limit);
        self
    }

    /// Create `bus` (if needed) and fill it with `rule_count` rules.
    pub async fn seed_bus(&self, bus: &str, rule_count: usize) {
        let mut state = self.state.lock().await;
        let rules = state.buses.entry(bus.to_string()).or_default();
        let start = rules.len();
        for i in start..start + rule_count {
            rules.insert(
                format!("{bus}-seed-{i:04}"),
                MemoryRule {
                    schedule_expression: "rate(1 day)".to_string(),
                    targets: Vec::new(),
                },
            );
        }
    }

    /// Remove a rule and its targets out of band, as a fired rule would.
    pub async fn expire_rule(&self, bus: &str, rule: &str) -> bool {
        let mut state = self.state.lock().await;
        state
            .buses
            .get_mut(bus)
            .and_then(|rules| rules.remove(rule))
            .is_some()
    }

    /// Make the next call to `op` fail with `err`.
    pub async fn fail_next(&self, op: Operation, err: BackendError) {
        self.state.lock().await.failures.push((op, err));
    }

    /// Current rule count per bus, by name.
    pub async fn rule_counts(&self) -> BTreeMap<String, usize> {
        let state = self.state.lock().await;
        state
            .buses
            .iter()
            .map(|(name, rules)| (name.clone(), rules.len()))
            .collect()
    }

    /// Look up a stored rule.
    pub async fn rule(&self, bus: &str, rule: &str) -> Option<MemoryRule> {
        let state = self.state.lock().await;
        state.buses.get(bus).and_then(|rules| rules.get(rule)).cloned()
    }

    /// Every successful mutation so far.
    pub async fn journal(&self) -> Vec<Mutation> {
        self.state.lock().await.journal.clone()
    }

    fn page<T>(&self, items: Vec<(String, T)>, next_token: Option<&str>) -> Page<T> {
        let remaining: Vec<_> = items
            .into_iter()
            .filter(|(key, _)| next_token.is_none_or(|token| key.as_str() > token))
            .collect();

        let has_more = remaining.len() > self.page_size;
        let page: Vec<_> = remaining.into_iter().take(self.page_size).collect();
        let next_token = if has_more {
            page.last().map(|(key, _)| key.clone())
        } else {
            None
        };

        Page {
            items: page.into_iter().map(|(_, item)| item).collect(),
            next_token,
        }
    }
}

#[async_trait]
impl SchedulerBackend for MemoryBackend {
    async fn list_buses(
        &self,
        name_prefix: &str,
        next_token: Option<&str>,
    ) -> BackendResult<Page<BusSummary>> {
        let mut state = self.state.lock().await;
        state.check(Operation::ListBuses)?;

        let items = state
            .buses
            .keys()
            .filter(|name| name.starts_with(name_prefix))
            .map(|name| (name.clone(), BusSummary { name: name.clone() }))
            .collect();

        Ok(self.page(items, next_token))
    }

    async fn list_rules(
        &self,
        bus: &str,
        name_prefix: Option<&str>,
        next_token: Option<&str>,
    ) -> BackendResult<Page<RuleSummary>> {
        let mut state = self.state.lock().await;
        state.check(Operation::ListRules)?;

        let rules = state.bus_mut(bus)?;
        let items = rules
            .iter()
            .filter(|(name, _)| name_prefix.is_none_or(|prefix| name.starts_with(prefix)))
            .map(|(name, rule)| {
                (
                    name.clone(),
                    RuleSummary {
                        name: name.clone(),
                        schedule_expression: Some(rule.schedule_expression.clone()),
                        target_ref: rule.targets.first().map(|t| t.target_ref.clone()),
                    },
                )
            })
            .collect();

        Ok(self.page(items, next_token))
    }

    async fn create_bus(&self, bus: &str) -> BackendResult<()> {
        let mut state = self.state.lock().await;
        state.check(Operation::CreateBus)?;

        if state.buses.contains_key(bus) {
            return Err(BackendError::AlreadyExists(format!("bus {bus}")));
        }
        state.buses.insert(bus.to_string(), BTreeMap::new());
        state.journal.push(Mutation::CreateBus(bus.to_string()));
        Ok(())
    }

    async fn delete_bus(&self, bus: &str) -> BackendResult<()> {
        let mut state = self.state.lock().await;
        state.check(Operation::DeleteBus)?;

        if !state.bus_mut(bus)?.is_empty() {
            return Err(BackendError::StillInUse(format!("bus {bus}")));
        }
        state.buses.remove(bus);
        state.journal.push(Mutation::DeleteBus(bus.to_string()));
        Ok(())
    }

    async fn put_rule(
        &self,
        bus: &str,
        rule: &str,
        schedule_expression: &str,
    ) -> BackendResult<RuleHandle> {
        let mut state = self.state.lock().await;
        state.check(Operation::PutRule)?;

        let limit = self.rule_limit;
        let rules = state.bus_mut(bus)?;
        match rules.get_mut(rule) {
            Some(existing) => existing.schedule_expression = schedule_expression.to_string(),
            None => {
                if limit.is_some_and(|limit| rules.len() >= limit) {
                    return Err(BackendError::LimitExceeded(format!(
                        "bus {bus} already holds {} rules",
                        rules.len()
                    )));
                }
                rules.insert(
                    rule.to_string(),
                    MemoryRule {
                        schedule_expression: schedule_expression.to_string(),
                        targets: Vec::new(),
                    },
                );
            }
        }

        state.journal.push(Mutation::PutRule {
            bus: bus.to_string(),
            rule: rule.to_string(),
        });
        Ok(RuleHandle(format!("memory:rule/{bus}/{rule}")))
    }

    async fn put_target(
        &self,
        bus: &str,
        rule: &str,
        target: &TargetAttachment,
    ) -> BackendResult<()> {
        let mut state = self.state.lock().await;
        state.check(Operation::PutTarget)?;

        let stored = state
            .bus_mut(bus)?
            .get_mut(rule)
            .ok_or_else(|| BackendError::NotFound(format!("rule {rule} on {bus}")))?;
        stored.targets.retain(|t| t.id != target.id);
        stored.targets.push(target.clone());

        state.journal.push(Mutation::PutTarget {
            bus: bus.to_string(),
            rule: rule.to_string(),
        });
        Ok(())
    }

    async fn grant_invoke_permission(
        &self,
        target_ref: &str,
        rule: &RuleHandle,
    ) -> BackendResult<()> {
        let mut state = self.state.lock().await;
        state.check(Operation::GrantPermission)?;

        state.journal.push(Mutation::GrantPermission {
            target_ref: target_ref.to_string(),
            rule: rule.to_string(),
        });
        Ok(())
    }

    async fn remove_targets(
        &self,
        bus: &str,
        rule: &str,
        target_ids: &[TargetId],
    ) -> BackendResult<()> {
        let mut state = self.state.lock().await;
        state.check(Operation::RemoveTargets)?;

        let stored = state
            .bus_mut(bus)?
            .get_mut(rule)
            .ok_or_else(|| BackendError::NotFound(format!("rule {rule} on {bus}")))?;
        stored.targets.retain(|t| !target_ids.contains(&t.id));

        state.journal.push(Mutation::RemoveTargets {
            bus: bus.to_string(),
            rule: rule.to_string(),
        });
        Ok(())
    }

    async fn delete_rule(&self, bus: &str, rule: &str) -> BackendResult<()> {
        let mut state = self.state.lock().await;
        state.check(Operation::DeleteRule)?;

        let rules = state.bus_mut(bus)?;
        let target_count = rules
            .get(rule)
            .map(|stored| stored.targets.len())
            .ok_or_else(|| BackendError::NotFound(format!("rule {rule} on {bus}")))?;
        if target_count > 0 {
            return Err(BackendError::Protocol(format!(
                "rule {rule} still has {target_count} targets"
            )));
        }
        rules.remove(rule);

        state.journal.push(Mutation::DeleteRule {
            bus: bus.to_string(),
            rule: rule.to_string(),
        });
        Ok(())
    }
}
