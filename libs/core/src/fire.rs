//! Fire-and-self-delete.
//!
//! When a rule fires, the scheduling service invokes its compute target
//! with a [`FireInvocation`]. The target runs the caller's task and then
//! removes its own target attachment and rule, which is the only thing that
//! returns the rule's slot to the bus quota.

use async_trait::async_trait;
use rulepool_id::{RuleName, TargetId};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use crate::backend::{BackendError, BackendResult, SchedulerBackend};
use crate::error::{PoolError, PoolResult};

/// Input delivered to the compute target when a rule fires.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FireInvocation {
    /// Caller-supplied payload, passed through untouched.
    pub payload: serde_json::Value,

    /// Bus the rule lives on.
    pub bus_name: String,

    /// The rule that fired.
    pub rule_name: RuleName,

    /// The attachment through which the target was invoked.
    pub target_id: TargetId,
}

/// The caller's task, run before the rule removes itself.
#[async_trait]
pub trait TaskHandler: Send + Sync {
    async fn handle(&self, invocation: &FireInvocation) -> anyhow::Result<()>;
}

/// Run the task for `invocation`, then delete its target and rule.
///
/// If the task fails the rule is left untouched so the scheduler can
/// deliver it again. Cleanup treats `NotFound` as already done.
#[instrument(skip_all, fields(bus = %invocation.bus_name, rule = %invocation.rule_name))]
pub async fn fire<B, H>(backend: &B, handler: &H, invocation: &FireInvocation) -> PoolResult<()>
where
    B: SchedulerBackend + ?Sized,
    H: TaskHandler + ?Sized,
{
    if let Err(e) = handler.handle(invocation).await {
        warn!(error = %e, "Task failed, leaving rule in place");
        return Err(PoolError::Task(format!("{e:#}")));
    }

    let bus = invocation.bus_name.as_str();
    let rule = invocation.rule_name.as_str();

    already_gone_ok(
        backend
            .remove_targets(bus, rule, &[invocation.target_id])
            .await,
    )?;
    already_gone_ok(backend.delete_rule(bus, rule).await)?;

    info!(target_id = %invocation.target_id, "Rule fired and removed itself");
    Ok(())
}

fn already_gone_ok(result: BackendResult<()>) -> PoolResult<()> {
    match result {
        Ok(()) => Ok(()),
        Err(BackendError::NotFound(what)) => {
            debug!(what = %what, "Already removed");
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::backend::{MemoryBackend, TargetAttachment};

    struct CountingHandler {
        calls: AtomicUsize,
        fail: bool,
    }

    #[async_trait]
    impl TaskHandler for CountingHandler {
        async fn handle(&self, _invocation: &FireInvocation) -> anyhow::Result<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                anyhow::bail!("downstream unavailable");
            }
            Ok(())
        }
    }

    async fn placed_rule(backend: &MemoryBackend) -> FireInvocation {
        backend.create_bus("pool-1").await.unwrap();
        let invocation = FireInvocation {
            payload: serde_json::json!({"document": "doc-42"}),
            bus_name: "pool-1".to_string(),
            rule_name: RuleName::existing("pool-1-reminder").unwrap(),
            target_id: TargetId::new(),
        };
        backend
            .put_rule("pool-1", "pool-1-reminder", "at(2030-01-01T00:00:00)")
            .await
            .unwrap();
        backend
            .put_target(
                "pool-1",
                "pool-1-reminder",
                &TargetAttachment {
                    id: invocation.target_id,
                    target_ref: "fn:reminders".to_string(),
                    input: invocation.clone(),
                },
            )
            .await
            .unwrap();
        invocation
    }

    #[tokio::test]
    async fn test_fire_removes_rule() {
        let backend = MemoryBackend::without_default_bus();
        let invocation = placed_rule(&backend).await;
        let handler = CountingHandler {
            calls: AtomicUsize::new(0),
            fail: false,
        };

        fire(&backend, &handler, &invocation).await.unwrap();

        assert_eq!(handler.calls.load(Ordering::SeqCst), 1);
        assert!(backend.rule("pool-1", "pool-1-reminder").await.is_none());
        assert_eq!(backend.rule_counts().await.get("pool-1"), Some(&0));
    }

    #[tokio::test]
    async fn test_failed_task_keeps_rule() {
        let backend = MemoryBackend::without_default_bus();
        let invocation = placed_rule(&backend).await;
        let handler = CountingHandler {
            calls: AtomicUsize::new(0),
            fail: true,
        };

        let err = fire(&backend, &handler, &invocation).await.unwrap_err();
        assert!(matches!(err, PoolError::Task(_)));
        assert!(backend.rule("pool-1", "pool-1-reminder").await.is_some());
    }

    #[tokio::test]
    async fn test_second_delivery_is_harmless() {
        let backend = MemoryBackend::without_default_bus();
        let invocation = placed_rule(&backend).await;
        let handler = CountingHandler {
            calls: AtomicUsize::new(0),
            fail: false,
        };

        fire(&backend, &handler, &invocation).await.unwrap();
        fire(&backend, &handler, &invocation).await.unwrap();
        assert_eq!(handler.calls.load(Ordering::SeqCst), 2);
    }
}
