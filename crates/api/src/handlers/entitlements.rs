//! Handlers for the `/entitlements` resource.

use axum::extract::State;
use axum::response::IntoResponse;
use axum::Json;
use chrono::Utc;
use lumen_core::gate::{can_start_run, DenyReason, GateInput};
use lumen_db::models::Entitlement;
use lumen_db::repositories::{EntitlementRepo, RunRepo};
use serde::Serialize;

use crate::error::{AppError, AppResult};
use crate::middleware::auth::AuthUser;
use crate::response::DataResponse;
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct EntitlementMe {
    pub entitlement: Entitlement,
    pub completed_runs_count: i64,
    pub can_start_run: bool,
    pub deny_reason: Option<DenyReason>,
}

/// GET /api/v1/entitlements/me
///
/// The caller's entitlement row (bootstrapped at `free_email` on first
/// touch) plus a gate preview, so clients can disable the start button
/// without a throwaway draft request.
pub async fn get_me(auth: AuthUser, State(state): State<AppState>) -> AppResult<impl IntoResponse> {
    let entitlement = EntitlementRepo::ensure_exists(&state.pool, auth.user_id).await?;
    let user_state = entitlement.state().ok_or_else(|| {
        AppError::InternalError(format!(
            "entitlement row for {} has unknown state '{}'",
            auth.user_id, entitlement.user_state
        ))
    })?;
    let completed = RunRepo::count_completed(&state.pool, auth.user_id).await?;

    let decision = can_start_run(
        &GateInput {
            user_state,
            completed_runs_count: completed,
            sub_current_period_end: entitlement.sub_current_period_end,
        },
        Utc::now(),
    );

    Ok(Json(DataResponse {
        data: EntitlementMe {
            entitlement,
            completed_runs_count: completed,
            can_start_run: decision.allowed,
            deny_reason: decision.reason,
        },
    }))
}
