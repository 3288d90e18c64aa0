//! On-demand collection of empty buses.

use axum::{extract::State, routing::post, Json, Router};
use rulepool_id::BusName;
use serde::Serialize;

use crate::api::error::ApiError;
use crate::api::request_context::RequestContext;
use crate::state::AppState;

/// Create sweep routes.
pub fn routes() -> Router<AppState> {
    Router::new().route("/", post(sweep))
}

#[derive(Debug, Serialize)]
pub struct SweepResponse {
    pub collected_buses: Vec<BusName>,
}

/// POST /v1/sweep
async fn sweep(
    State(state): State<AppState>,
    ctx: RequestContext,
) -> Result<Json<SweepResponse>, ApiError> {
    let collected_buses = state
        .placer()
        .sweep()
        .await
        .map_err(|e| ApiError::from(e).with_request_id(ctx.request_id))?;
    Ok(Json(SweepResponse { collected_buses }))
}
