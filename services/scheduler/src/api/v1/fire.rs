//! Compute-target endpoint for fired rules.
//!
//! The scheduling backend posts the rule's [`FireInvocation`] here. The
//! task runs first; the rule and its target are removed only afterwards.

use axum::{extract::State, http::StatusCode, routing::post, Json, Router};
use rulepool_core::fire::{self, FireInvocation};

use crate::api::error::ApiError;
use crate::api::request_context::RequestContext;
use crate::state::AppState;

/// Create fire routes.
pub fn routes() -> Router<AppState> {
    Router::new().route("/", post(fire_rule))
}

/// POST /v1/fire
async fn fire_rule(
    State(state): State<AppState>,
    ctx: RequestContext,
    Json(invocation): Json<FireInvocation>,
) -> Result<StatusCode, ApiError> {
    fire::fire(state.backend(), state.handler(), &invocation)
        .await
        .map_err(|e| ApiError::from(e).with_request_id(ctx.request_id))?;
    Ok(StatusCode::NO_CONTENT)
}
