//! Event buses backed by a [`SchedulerBackend`].

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use rulepool_id::{BusName, RuleName, TargetId};
use tracing::{debug, info, warn};

use crate::backend::{
    list_all_rules, BackendError, RuleHandle, SchedulerBackend, TargetAttachment,
};
use crate::error::{PoolError, PoolResult};
use crate::roles::{Container, SchedulableUnit};
use crate::rule::Rule;

/// A bus and the rules believed to occupy it.
#[derive(Debug)]
pub struct Bus<B: SchedulerBackend + ?Sized> {
    name: BusName,
    rules: BTreeMap<RuleName, Rule>,
    backend: Arc<B>,
}

impl<B: SchedulerBackend + ?Sized> Bus<B> {
    /// An empty, not yet reconciled bus.
    pub fn new(name: BusName, backend: Arc<B>) -> Self {
        Self {
            name,
            rules: BTreeMap::new(),
            backend,
        }
    }

    /// Load the bus and every rule on it.
    pub async fn load(name: BusName, backend: Arc<B>) -> PoolResult<Self> {
        let summaries = list_all_rules(&*backend, name.as_str(), None).await?;

        let mut bus = Self::new(name, backend);
        for summary in summaries {
            let rule = Rule::observed(summary, &bus.name)?;
            bus.set_rule(rule);
        }
        Ok(bus)
    }

    /// Names of the rules on this bus, in name order.
    pub fn rule_names(&self) -> impl Iterator<Item = &RuleName> {
        self.rules.keys()
    }

    pub fn rules(&self) -> impl Iterator<Item = &Rule> {
        self.rules.values()
    }
}

#[async_trait]
impl<B: SchedulerBackend + ?Sized> Container for Bus<B> {
    type Unit = Rule;

    fn name(&self) -> &BusName {
        &self.name
    }

    fn rule_count(&self) -> usize {
        self.rules.len()
    }

    fn set_rule(&mut self, mut unit: Rule) {
        let name = unit.name_for(&self.name);
        self.rules.insert(name, unit);
    }

    async fn create(&self) -> PoolResult<()> {
        if self.name.is_default() {
            debug!(bus = %self.name, "Default bus is never created");
            return Ok(());
        }

        match self.backend.create_bus(self.name.as_str()).await {
            Ok(()) => {
                info!(bus = %self.name, index = %self.name.index(), "Created bus");
                Ok(())
            }
            Err(BackendError::AlreadyExists(message)) => {
                warn!(bus = %self.name, %message, "Bus already exists");
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn delete(&self) -> PoolResult<bool> {
        if self.name.is_default() {
            debug!(bus = %self.name, "Default bus is never deleted");
            return Ok(false);
        }

        match self.backend.delete_bus(self.name.as_str()).await {
            Ok(()) => {
                info!(bus = %self.name, "Deleted empty bus");
                Ok(true)
            }
            Err(BackendError::StillInUse(message)) => {
                warn!(bus = %self.name, %message, "Bus still has rules, leaving it in place");
                Ok(false)
            }
            Err(BackendError::NotFound(_)) => {
                debug!(bus = %self.name, "Bus already gone");
                Ok(true)
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn live_rule_count(&self) -> PoolResult<usize> {
        let rules = list_all_rules(&*self.backend, self.name.as_str(), None).await?;
        Ok(rules.len())
    }

    async fn put_rule(&self, rule: &RuleName, schedule_expression: &str) -> PoolResult<RuleHandle> {
        match self
            .backend
            .put_rule(self.name.as_str(), rule.as_str(), schedule_expression)
            .await
        {
            Ok(handle) => Ok(handle),
            Err(BackendError::LimitExceeded(reason)) => Err(PoolError::Conflict {
                bus: self.name.to_string(),
                reason,
            }),
            // Collected by another writer after this pass reconciled it.
            Err(BackendError::NotFound(reason)) => Err(PoolError::Conflict {
                bus: self.name.to_string(),
                reason,
            }),
            Err(e) => Err(e.into()),
        }
    }

    async fn put_target(&self, rule: &RuleName, target: &TargetAttachment) -> PoolResult<()> {
        self.backend
            .put_target(self.name.as_str(), rule.as_str(), target)
            .await?;
        Ok(())
    }

    async fn grant_invoke_permission(
        &self,
        target_ref: &str,
        handle: &RuleHandle,
    ) -> PoolResult<()> {
        self.backend
            .grant_invoke_permission(target_ref, handle)
            .await?;
        Ok(())
    }

    async fn remove_rule(&self, rule: &RuleName, target_ids: &[TargetId]) -> PoolResult<()> {
        if !target_ids.is_empty() {
            self.backend
                .remove_targets(self.name.as_str(), rule.as_str(), target_ids)
                .await?;
        }
        match self
            .backend
            .delete_rule(self.name.as_str(), rule.as_str())
            .await
        {
            Ok(()) | Err(BackendError::NotFound(_)) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
