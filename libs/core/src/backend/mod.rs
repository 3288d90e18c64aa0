//! Scheduling backend interface.
//!
//! The backend is the only source of truth about buses and rules. The pool
//! talks to it exclusively through [`SchedulerBackend`]:
//!
//! - `memory`: in-process backend for development and tests
//! - `http`: JSON gateway in front of the real scheduling service
//! - `retry`: decorator adding bounded backoff for transient failures

mod http;
mod memory;
mod retry;

pub use http::HttpBackend;
pub use memory::{MemoryBackend, MemoryRule, Mutation, Operation};
pub use retry::RetryingBackend;

use async_trait::async_trait;
use rulepool_id::TargetId;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::fire::FireInvocation;

/// Result type for backend calls.
pub type BackendResult<T> = Result<T, BackendError>;

/// Errors reported by a scheduling backend.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BackendError {
    /// Create of a resource that already exists.
    #[error("resource already exists: {0}")]
    AlreadyExists(String),

    /// Delete of a bus that still has rules attached.
    #[error("bus still has rules attached: {0}")]
    StillInUse(String),

    #[error("resource not found: {0}")]
    NotFound(String),

    /// The backend refused to exceed one of its quotas.
    #[error("limit exceeded: {0}")]
    LimitExceeded(String),

    #[error("request throttled: {0}")]
    Throttled(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("permission denied: {0}")]
    Permission(String),

    /// The backend answered with something the client does not understand.
    #[error("unexpected backend response: {0}")]
    Protocol(String),
}

impl BackendError {
    /// Returns true for failures worth retrying with backoff.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Throttled(_) | Self::Transport(_))
    }
}

/// One page of a paginated listing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_token: Option<String>,
}

impl<T> Page<T> {
    /// A final page.
    pub fn last(items: Vec<T>) -> Self {
        Self {
            items,
            next_token: None,
        }
    }
}

/// A bus as reported by a listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BusSummary {
    pub name: String,
}

/// A rule as reported by a listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleSummary {
    pub name: String,
    #[serde(default)]
    pub schedule_expression: Option<String>,
    #[serde(default)]
    pub target_ref: Option<String>,
}

/// Backend handle of a created rule (an ARN or equivalent).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RuleHandle(pub String);

impl std::fmt::Display for RuleHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Compute target attached to a rule, with the input it is invoked with.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TargetAttachment {
    pub id: TargetId,
    pub target_ref: String,
    pub input: FireInvocation,
}

/// Operations the pool needs from the scheduling service.
#[async_trait]
pub trait SchedulerBackend: Send + Sync {
    /// List buses whose name starts with `name_prefix`.
    async fn list_buses(
        &self,
        name_prefix: &str,
        next_token: Option<&str>,
    ) -> BackendResult<Page<BusSummary>>;

    /// List the rules on `bus`, optionally filtered by name prefix.
    async fn list_rules(
        &self,
        bus: &str,
        name_prefix: Option<&str>,
        next_token: Option<&str>,
    ) -> BackendResult<Page<RuleSummary>>;

    /// Create a bus. Fails with [`BackendError::AlreadyExists`] if present.
    async fn create_bus(&self, bus: &str) -> BackendResult<()>;

    /// Delete a bus. Fails with [`BackendError::StillInUse`] if it has rules.
    async fn delete_bus(&self, bus: &str) -> BackendResult<()>;

    /// Create or update a scheduled rule on `bus`.
    async fn put_rule(
        &self,
        bus: &str,
        rule: &str,
        schedule_expression: &str,
    ) -> BackendResult<RuleHandle>;

    /// Attach a compute target to a rule.
    async fn put_target(
        &self,
        bus: &str,
        rule: &str,
        target: &TargetAttachment,
    ) -> BackendResult<()>;

    /// Allow the scheduling service to invoke `target_ref` for `rule`.
    async fn grant_invoke_permission(
        &self,
        target_ref: &str,
        rule: &RuleHandle,
    ) -> BackendResult<()>;

    /// Detach targets from a rule.
    async fn remove_targets(
        &self,
        bus: &str,
        rule: &str,
        target_ids: &[TargetId],
    ) -> BackendResult<()>;

    /// Delete a rule. Its targets must have been removed first.
    async fn delete_rule(&self, bus: &str, rule: &str) -> BackendResult<()>;
}

/// List every bus matching `name_prefix`, following pagination to the end.
pub async fn list_all_buses<B>(backend: &B, name_prefix: &str) -> BackendResult<Vec<BusSummary>>
where
    B: SchedulerBackend + ?Sized,
{
    let mut buses = Vec::new();
    let mut next_token: Option<String> = None;

    loop {
        let page = backend
            .list_buses(name_prefix, next_token.as_deref())
            .await?;
        buses.extend(page.items);

        match page.next_token {
            Some(token) if Some(&token) != next_token.as_ref() => next_token = Some(token),
            Some(token) => {
                return Err(BackendError::Protocol(format!(
                    "bus listing repeated pagination token '{token}'"
                )))
            }
            None => return Ok(buses),
        }
    }
}

/// List every rule on `bus`, following pagination to the end.
pub async fn list_all_rules<B>(
    backend: &B,
    bus: &str,
    name_prefix: Option<&str>,
) -> BackendResult<Vec<RuleSummary>>
where
    B: SchedulerBackend + ?Sized,
{
    let mut rules = Vec::new();
    let mut next_token: Option<String> = None;

    loop {
        let page = backend
            .list_rules(bus, name_prefix, next_token.as_deref())
            .await?;
        rules.extend(page.items);

        match page.next_token {
            Some(token) if Some(&token) != next_token.as_ref() => next_token = Some(token),
            Some(token) => {
                return Err(BackendError::Protocol(format!(
                    "rule listing for {bus} repeated pagination token '{token}'"
                )))
            }
            None => return Ok(rules),
        }
    }
}
