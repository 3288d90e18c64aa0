//! Task handlers run by the fire endpoint.

use async_trait::async_trait;
use rulepool_core::fire::{FireInvocation, TaskHandler};
use tracing::info;

/// Handler that records the fired task and does nothing else.
///
/// Deployments embed the pool as a library and supply their own handler;
/// the service binary ships this one so the fire path can be exercised
/// end to end.
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingHandler;

#[async_trait]
impl TaskHandler for LoggingHandler {
    async fn handle(&self, invocation: &FireInvocation) -> anyhow::Result<()> {
        info!(
            bus = %invocation.bus_name,
            rule = %invocation.rule_name,
            target_id = %invocation.target_id,
            payload = %invocation.payload,
            "Scheduled task fired"
        );
        Ok(())
    }
}
