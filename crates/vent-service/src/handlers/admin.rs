//! Operator handlers.

use std::sync::Arc;

use axum::extract::State;
use axum::Json;
use serde::Deserialize;

use vent_core::{Plan, PlanId};
use vent_store::schema::constraint;

use crate::auth::AdminAuth;
use crate::deadline::within;
use crate::error::ApiError;
use crate::scheduler::{run_sweeps, SweepReport};
use crate::state::AppState;

/// Plan upsert request.
#[derive(Debug, Deserialize)]
pub struct UpsertPlanRequest {
    /// Existing plan to replace; a new ID is generated when absent.
    #[serde(default)]
    pub id: Option<PlanId>,
    /// Display name.
    pub name: String,
    /// Monthly price in the smallest currency unit.
    pub price_cents: i64,
    /// Sessions allowed per cycle.
    pub session_limit: i64,
    /// Gateway plan reference.
    pub gateway_plan_id: String,
}

/// Create or replace a plan.
pub async fn upsert_plan(
    State(state): State<Arc<AppState>>,
    _admin: AdminAuth,
    Json(body): Json<UpsertPlanRequest>,
) -> Result<Json<Plan>, ApiError> {
    if body.name.trim().is_empty() || body.gateway_plan_id.trim().is_empty() {
        return Err(ApiError::BadRequest(
            "name and gateway_plan_id are required".into(),
        ));
    }
    if body.price_cents < 0 || body.session_limit < 0 {
        return Err(ApiError::BadRequest(
            "price_cents and session_limit must not be negative".into(),
        ));
    }

    let plan = Plan {
        id: body.id.unwrap_or_else(PlanId::generate),
        name: body.name.trim().to_string(),
        price_cents: body.price_cents,
        session_limit: body.session_limit,
        gateway_plan_id: body.gateway_plan_id.trim().to_string(),
    };

    match within(state.config.store_timeout(), state.store.upsert_plan(&plan)).await? {
        Ok(()) => {}
        Err(e) if e.violates(constraint::GATEWAY_PLAN) => {
            return Err(ApiError::Conflict(format!(
                "gateway plan {} belongs to another plan",
                plan.gateway_plan_id
            )));
        }
        Err(e) => return Err(e.into()),
    }

    tracing::info!(plan_id = %plan.id, name = %plan.name, "Plan upserted");
    Ok(Json(plan))
}

/// Run every background sweep now. Failed sweeps are listed in the report.
pub async fn run_sweeps_now(
    State(state): State<Arc<AppState>>,
    _admin: AdminAuth,
) -> Json<SweepReport> {
    let report = run_sweeps(&state).await;
    tracing::info!(?report, "Manual sweep complete");
    Json(report)
}
