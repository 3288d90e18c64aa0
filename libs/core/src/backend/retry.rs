//! Retrying backend decorator.

use async_trait::async_trait;
use rulepool_id::TargetId;
use rulepool_reconcile::{retry, BackoffPolicy};

use super::{
    BackendError, BackendResult, BusSummary, Page, RuleHandle, RuleSummary, SchedulerBackend,
    TargetAttachment,
};

/// Wraps a backend and retries transient failures with backoff.
///
/// Only [`BackendError::is_transient`] errors are retried. Idempotency
/// conflicts (`AlreadyExists`, `StillInUse`) surface on the first attempt
/// so the caller can treat them as benign.
#[derive(Debug)]
pub struct RetryingBackend<B> {
    inner: B,
    policy: BackoffPolicy,
}

impl<B> RetryingBackend<B> {
    pub fn new(inner: B, policy: BackoffPolicy) -> Self {
        Self { inner, policy }
    }

    pub fn inner(&self) -> &B {
        &self.inner
    }
}

#[async_trait]
impl<B: SchedulerBackend> SchedulerBackend for RetryingBackend<B> {
    async fn list_buses(
        &self,
        name_prefix: &str,
        next_token: Option<&str>,
    ) -> BackendResult<Page<BusSummary>> {
        retry(
            &self.policy,
            move || self.inner.list_buses(name_prefix, next_token),
            BackendError::is_transient,
        )
        .await
    }

    async fn list_rules(
        &self,
        bus: &str,
        name_prefix: Option<&str>,
        next_token: Option<&str>,
    ) -> BackendResult<Page<RuleSummary>> {
        retry(
            &self.policy,
            move || self.inner.list_rules(bus, name_prefix, next_token),
            BackendError::is_transient,
        )
        .await
    }

    async fn create_bus(&self, bus: &str) -> BackendResult<()> {
        retry(
            &self.policy,
            move || self.inner.create_bus(bus),
            BackendError::is_transient,
        )
        .await
    }

    async fn delete_bus(&self, bus: &str) -> BackendResult<()> {
        retry(
            &self.policy,
            move || self.inner.delete_bus(bus),
            BackendError::is_transient,
        )
        .await
    }

    async fn put_rule(
        &self,
        bus: &str,
        rule: &str,
        schedule_expression: &str,
    ) -> BackendResult<RuleHandle> {
        retry(
            &self.policy,
            move || self.inner.put_rule(bus, rule, schedule_expression),
            BackendError::is_transient,
        )
        .await
    }

    async fn put_target(
        &self,
        bus: &str,
        rule: &str,
        target: &TargetAttachment,
    ) -> BackendResult<()> {
        retry(
            &self.policy,
            move || self.inner.put_target(bus, rule, target),
            BackendError::is_transient,
        )
        .await
    }

    async fn grant_invoke_permission(
        &self,
        target_ref: &str,
        rule: &RuleHandle,
    ) -> BackendResult<()> {
        retry(
            &self.policy,
            move || self.inner.grant_invoke_permission(target_ref, rule),
            BackendError::is_transient,
        )
        .await
    }

    async fn remove_targets(
        &self,
        bus: &str,
        rule: &str,
        target_ids: &[TargetId],
    ) -> BackendResult<()> {
        retry(
            &self.policy,
            move || self.inner.remove_targets(bus, rule, target_ids),
            BackendError::is_transient,
        )
        .await
    }

    async fn delete_rule(&self, bus: &str, rule: &str) -> BackendResult<()> {
        retry(
            &self.policy,
            move || self.inner.delete_rule(bus, rule),
            BackendError::is_transient,
        )
        .await
    }
}
