//! Plan handlers.

use std::sync::Arc;

use axum::extract::State;
use axum::Json;

use vent_core::Plan;

use crate::deadline::bounded;
use crate::error::ApiError;
use crate::state::AppState;

/// List plans, cheapest first.
pub async fn list_plans(State(state): State<Arc<AppState>>) -> Result<Json<Vec<Plan>>, ApiError> {
    let plans = bounded(state.config.store_timeout(), state.store.list_plans()).await?;
    Ok(Json(plans))
}
