//! Rule placement API.

use axum::{
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::post,
    Json, Router,
};
use rulepool_core::{Placement, Rule, RuleTarget};
use rulepool_id::{BusIndex, BusName, RuleName};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::api::error::ApiError;
use crate::api::request_context::RequestContext;
use crate::state::AppState;

/// Create rule routes.
pub fn routes() -> Router<AppState> {
    Router::new().route("/", post(schedule_rule))
}

// =============================================================================
// Request/Response Types
// =============================================================================

/// Request to schedule a rule.
#[derive(Debug, Deserialize)]
pub struct ScheduleRuleRequest {
    /// Trigger expression, passed to the backend untouched.
    pub schedule_expression: String,

    pub target: RuleTarget,

    /// Caller-chosen rule name; generated from the bus name if omitted.
    #[serde(default)]
    pub name: Option<String>,
}

/// Where a rule was placed.
#[derive(Debug, Serialize)]
pub struct ScheduleRuleResponse {
    pub rule_name: RuleName,
    pub bus_name: BusName,
    pub bus_index: BusIndex,

    /// True if the pool had to create a bus for this rule.
    pub created_bus: bool,

    /// Empty buses deleted after placement.
    pub collected_buses: Vec<BusName>,
}

impl From<Placement> for ScheduleRuleResponse {
    fn from(placement: Placement) -> Self {
        Self {
            rule_name: placement.rule_name,
            bus_index: placement.bus.index(),
            bus_name: placement.bus,
            created_bus: placement.created_bus,
            collected_buses: placement.collected,
        }
    }
}

// =============================================================================
// Handlers
// =============================================================================

/// Place a rule on the pool.
///
/// POST /v1/rules
async fn schedule_rule(
    State(state): State<AppState>,
    ctx: RequestContext,
    Json(req): Json<ScheduleRuleRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let request_id = ctx.request_id;

    let mut rule = Rule::new(req.schedule_expression, req.target)
        .map_err(|e| ApiError::from(e).with_request_id(request_id.clone()))?;

    if let Some(name) = req.name {
        let name = RuleName::existing(name).map_err(|e| {
            ApiError::bad_request("invalid_name", e.to_string()).with_request_id(request_id.clone())
        })?;
        rule = rule.with_name(name);
    }

    let placement = state
        .placer()
        .schedule(rule)
        .await
        .map_err(|e| ApiError::from(e).with_request_id(request_id.clone()))?;

    info!(
        request_id = %request_id,
        rule = %placement.rule_name,
        bus = %placement.bus,
        created_bus = placement.created_bus,
        "Rule scheduled"
    );

    Ok((
        StatusCode::CREATED,
        Json(ScheduleRuleResponse::from(placement)),
    ))
}
