//! Bus inventory API.

use axum::{extract::State, routing::get, Json, Router};

use crate::api::error::ApiError;
use crate::api::request_context::RequestContext;
use crate::placer::InventorySnapshot;
use crate::state::AppState;

/// Create bus routes.
pub fn routes() -> Router<AppState> {
    Router::new().route("/", get(list_buses))
}

/// Reconcile and list every bus of the pool with its rules.
///
/// GET /v1/buses
async fn list_buses(
    State(state): State<AppState>,
    ctx: RequestContext,
) -> Result<Json<InventorySnapshot>, ApiError> {
    let snapshot = state
        .placer()
        .inventory()
        .await
        .map_err(|e| ApiError::from(e).with_request_id(ctx.request_id))?;
    Ok(Json(snapshot))
}
