//! Scheduled rules.

use async_trait::async_trait;
use rulepool_id::{BusName, RuleName, TargetId};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::backend::{RuleSummary, TargetAttachment};
use crate::error::{PoolError, PoolResult};
use crate::fire::FireInvocation;
use crate::roles::{Container, SchedulableUnit};

/// Compute target a rule invokes when it fires.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleTarget {
    /// Backend reference of the compute target (function ARN or similar).
    pub target_ref: String,

    /// Opaque payload passed through to the target.
    #[serde(default)]
    pub payload: serde_json::Value,

    /// True if the target already lets the scheduler invoke it through a
    /// broader policy, so no per-rule grant is needed.
    #[serde(default)]
    pub grants_invoke: bool,
}

/// One scheduled, typically one-shot, task.
#[derive(Debug, Clone, PartialEq)]
pub struct Rule {
    name: Option<RuleName>,
    schedule_expression: String,
    target: RuleTarget,
    parent_bus: Option<BusName>,
}

impl Rule {
    /// Create an unplaced rule.
    pub fn new(schedule_expression: impl Into<String>, target: RuleTarget) -> PoolResult<Self> {
        let schedule_expression = schedule_expression.into();
        if schedule_expression.trim().is_empty() {
            return Err(PoolError::InvalidRule(
                "schedule expression cannot be empty".into(),
            ));
        }
        if target.target_ref.trim().is_empty() {
            return Err(PoolError::InvalidRule("target reference cannot be empty".into()));
        }

        Ok(Self {
            name: None,
            schedule_expression,
            target,
            parent_bus: None,
        })
    }

    /// Use a caller-chosen name instead of a generated one.
    pub fn with_name(mut self, name: RuleName) -> Self {
        self.name = Some(name);
        self
    }

    /// Rehydrate a rule reported by a listing of `bus`.
    pub fn observed(summary: RuleSummary, bus: &BusName) -> PoolResult<Self> {
        Ok(Self {
            name: Some(RuleName::existing(summary.name)?),
            schedule_expression: summary.schedule_expression.unwrap_or_default(),
            target: RuleTarget {
                target_ref: summary.target_ref.unwrap_or_default(),
                payload: serde_json::Value::Null,
                grants_invoke: true,
            },
            parent_bus: Some(bus.clone()),
        })
    }

    pub fn schedule_expression(&self) -> &str {
        &self.schedule_expression
    }

    pub fn target(&self) -> &RuleTarget {
        &self.target
    }

    /// The bus the rule was created on, once placed.
    pub fn parent_bus(&self) -> Option<&BusName> {
        self.parent_bus.as_ref()
    }
}

#[async_trait]
impl SchedulableUnit for Rule {
    fn name(&self) -> Option<&RuleName> {
        self.name.as_ref()
    }

    fn name_for(&mut self, parent: &BusName) -> RuleName {
        self.name
            .get_or_insert_with(|| RuleName::generate(parent))
            .clone()
    }

    async fn create_on<C>(mut self, container: &mut C) -> PoolResult<RuleName>
    where
        C: Container<Unit = Self>,
    {
        let bus = container.name().clone();
        let name = self.name_for(&bus);

        let handle = container
            .put_rule(&name, &self.schedule_expression)
            .await?;

        // The target gets its own identifiers so it can delete itself after firing.
        let target_id = TargetId::new();
        let attachment = TargetAttachment {
            id: target_id,
            target_ref: self.target.target_ref.clone(),
            input: FireInvocation {
                payload: self.target.payload.clone(),
                bus_name: bus.to_string(),
                rule_name: name.clone(),
                target_id,
            },
        };

        if let Err(e) = container.put_target(&name, &attachment).await {
            rollback(&*container, &name, &[]).await;
            return Err(e);
        }

        if !self.target.grants_invoke {
            if let Err(e) = container
                .grant_invoke_permission(&self.target.target_ref, &handle)
                .await
            {
                rollback(&*container, &name, &[target_id]).await;
                return Err(e);
            }
        }

        debug!(bus = %bus, rule = %name, %target_id, "Rule materialized");
        self.parent_bus = Some(bus);
        container.set_rule(self);
        Ok(name)
    }
}

/// Best-effort removal of a half-created rule; the original error wins.
async fn rollback<C: Container>(container: &C, rule: &RuleName, target_ids: &[TargetId]) {
    if let Err(e) = container.remove_rule(rule, target_ids).await {
        warn!(
            bus = %container.name(),
            rule = %rule,
            error = %e,
            "Failed to roll back partially created rule"
        );
    }
}
