//! API v1 routes.

mod buses;
mod fire;
mod rules;
mod sweep;

use axum::Router;

use crate::state::AppState;

/// Create API v1 routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .nest("/rules", rules::routes())
        .nest("/buses", buses::routes())
        .nest("/sweep", sweep::routes())
        .nest("/fire", fire::routes())
}
