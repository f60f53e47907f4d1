//! Handlers for the `/runs` resource.
//!
//! All endpoints require authentication via [`AuthUser`]. Runs are
//! owned exclusively by their creator; other users get 404, never a
//! hint the run exists.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::Utc;
use lumen_core::entitlement::UserState;
use lumen_core::error::CoreError;
use lumen_core::gate::{can_start_run, DenyReason, GateDecision, GateInput};
use lumen_core::run::{
    normalize_source_route, validate_context_scope, validate_focus_area, AssessmentMode,
    RunStatus,
};
use lumen_db::models::{AssessmentResponse, AssessmentRun};
use lumen_db::repositories::{EntitlementRepo, RunRepo};
use serde::{Deserialize, Serialize};
use serde_json::json;
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::middleware::auth::AuthUser;
use crate::response::DataResponse;
use crate::state::AppState;

// ---------------------------------------------------------------------------
// Request / response shapes
// ---------------------------------------------------------------------------

#[derive(Debug, Default, Deserialize)]
pub struct DraftRequest {
    pub context_scope: Option<String>,
    pub focus_area: Option<String>,
    pub source_route: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ResponseRequest {
    pub question_id: String,
    pub value: i16,
}

/// The run snapshot returned by lifecycle endpoints.
#[derive(Debug, Serialize)]
pub struct RunSnapshot {
    pub run_id: Uuid,
    pub run_number: i32,
    pub assessment_mode: &'static str,
    pub question_count: usize,
    pub status: String,
    pub item_ids: Option<Vec<String>>,
}

impl From<AssessmentRun> for RunSnapshot {
    fn from(run: AssessmentRun) -> Self {
        let mode = run.assessment_mode();
        Self {
            run_id: run.id,
            run_number: run.run_number,
            assessment_mode: mode.as_str(),
            question_count: mode.question_count(),
            status: run.status,
            item_ids: run.item_ids,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct RunDetail {
    pub run: AssessmentRun,
    pub responses: Vec<AssessmentResponse>,
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn run_not_found(run_id: Uuid) -> AppError {
    AppError::Core(CoreError::NotFound {
        entity: "Run",
        id: run_id.to_string(),
    })
}

/// Gate denials are expected outcomes: 403 with a machine-readable
/// reason, logged at info, never as an error.
fn gate_denied(user_id: Uuid, reason: DenyReason) -> Response {
    tracing::info!(user_id = %user_id, reason = reason.as_str(), "Run creation blocked");
    (
        StatusCode::FORBIDDEN,
        Json(json!({
            "error": "run_creation_blocked",
            "reason": reason,
        })),
    )
        .into_response()
}

/// Evaluate the run gate against the caller's current entitlement and
/// run history. Bootstraps the entitlement row on first touch.
async fn evaluate_gate(
    state: &AppState,
    user_id: Uuid,
) -> AppResult<(GateDecision, i64, UserState)> {
    let entitlement = EntitlementRepo::ensure_exists(&state.pool, user_id).await?;
    let user_state = entitlement.state().ok_or_else(|| {
        AppError::InternalError(format!(
            "entitlement row for {user_id} has unknown state '{}'",
            entitlement.user_state
        ))
    })?;
    let completed = RunRepo::count_completed(&state.pool, user_id).await?;

    let decision = can_start_run(
        &GateInput {
            user_state,
            completed_runs_count: completed,
            sub_current_period_end: entitlement.sub_current_period_end,
        },
        Utc::now(),
    );
    Ok((decision, completed, user_state))
}

// ---------------------------------------------------------------------------
// Draft
// ---------------------------------------------------------------------------

/// POST /api/v1/runs/draft
///
/// Create or refresh the caller's single open draft. Gate-checked;
/// concurrent calls converge on one draft row.
pub async fn create_draft(
    auth: AuthUser,
    State(state): State<AppState>,
    input: Option<Json<DraftRequest>>,
) -> AppResult<Response> {
    let Json(input) = input.unwrap_or_default();

    if let Some(scope) = &input.context_scope {
        validate_context_scope(scope).map_err(CoreError::Validation)?;
    }
    if let Some(area) = &input.focus_area {
        validate_focus_area(area).map_err(CoreError::Validation)?;
    }
    let source_route = normalize_source_route(input.source_route.as_deref());

    let (decision, completed, user_state) = evaluate_gate(&state, auth.user_id).await?;
    if !decision.allowed {
        let reason = decision.reason.unwrap_or(DenyReason::TierLimit);
        return Ok(gate_denied(auth.user_id, reason));
    }

    let run_number = i32::try_from(completed + 1)
        .map_err(|_| AppError::InternalError("completed run count overflow".into()))?;
    let mode = AssessmentMode::for_run_number(run_number);

    // Audit record of what the gate saw when it let this draft through.
    let snapshot = json!({
        "user_state": user_state,
        "completed_runs_count": completed,
        "allowed_to_start": true,
        "source": source_route,
    });

    let run = RunRepo::upsert_draft(
        &state.pool,
        auth.user_id,
        run_number,
        mode.as_str(),
        input.context_scope.as_deref(),
        input.focus_area.as_deref(),
        &source_route,
        &snapshot,
    )
    .await?;

    tracing::info!(run_id = %run.id, user_id = %auth.user_id, run_number, "Draft run ready");

    Ok(Json(DataResponse {
        data: RunSnapshot::from(run),
    })
    .into_response())
}

// ---------------------------------------------------------------------------
// List / get
// ---------------------------------------------------------------------------

/// GET /api/v1/runs
pub async fn list_runs(
    auth: AuthUser,
    State(state): State<AppState>,
) -> AppResult<impl IntoResponse> {
    let runs = RunRepo::list_for_user(&state.pool, auth.user_id).await?;
    Ok(Json(DataResponse { data: runs }))
}

/// GET /api/v1/runs/{id}
///
/// The run row plus its recorded responses.
pub async fn get_run(
    auth: AuthUser,
    State(state): State<AppState>,
    Path(run_id): Path<Uuid>,
) -> AppResult<impl IntoResponse> {
    let run = RunRepo::find_for_user(&state.pool, run_id, auth.user_id)
        .await?
        .ok_or_else(|| run_not_found(run_id))?;
    let responses = RunRepo::list_responses(&state.pool, run_id).await?;
    Ok(Json(DataResponse {
        data: RunDetail { run, responses },
    }))
}

// ---------------------------------------------------------------------------
// Start
// ---------------------------------------------------------------------------

/// POST /api/v1/runs/{id}/start
///
/// Transition draft -> in_progress and assign the item set: the full
/// 143-id list for run 1, the 43-item retake set otherwise. Assignment
/// happens exactly once; a retry after the transition returns the
/// existing snapshot without re-selection. The gate is re-checked here
/// because entitlement can change between draft creation and start.
pub async fn start_run(
    auth: AuthUser,
    State(state): State<AppState>,
    Path(run_id): Path<Uuid>,
) -> AppResult<Response> {
    let run = RunRepo::find_for_user(&state.pool, run_id, auth.user_id)
        .await?
        .ok_or_else(|| run_not_found(run_id))?;

    match run.run_status() {
        // Idempotent replay: the snapshot is already frozen.
        Some(RunStatus::InProgress) => {
            return Ok(Json(DataResponse {
                data: RunSnapshot::from(run),
            })
            .into_response())
        }
        Some(RunStatus::Draft) => {}
        _ => {
            return Err(AppError::Core(CoreError::Conflict(format!(
                "Run cannot start from status '{}'",
                run.status
            ))))
        }
    }

    let (decision, _, _) = evaluate_gate(&state, auth.user_id).await?;
    if !decision.allowed {
        let reason = decision.reason.unwrap_or(DenyReason::TierLimit);
        return Ok(gate_denied(auth.user_id, reason));
    }

    let item_ids = state
        .catalog
        .item_ids_for_mode(run.assessment_mode())
        .to_vec();

    match RunRepo::start(&state.pool, run_id, auth.user_id, &item_ids).await? {
        Some(started) => {
            tracing::info!(
                run_id = %started.id,
                user_id = %auth.user_id,
                mode = started.mode,
                items = item_ids.len(),
                "Run started",
            );
            Ok(Json(DataResponse {
                data: RunSnapshot::from(started),
            })
            .into_response())
        }
        // Lost a race: another request transitioned the run first.
        None => {
            let current = RunRepo::find_for_user(&state.pool, run_id, auth.user_id)
                .await?
                .ok_or_else(|| run_not_found(run_id))?;
            if current.run_status() == Some(RunStatus::InProgress) {
                Ok(Json(DataResponse {
                    data: RunSnapshot::from(current),
                })
                .into_response())
            } else {
                Err(AppError::Core(CoreError::Conflict(format!(
                    "Run cannot start from status '{}'",
                    current.status
                ))))
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Responses
// ---------------------------------------------------------------------------

/// POST /api/v1/runs/{id}/responses
///
/// Record one answer. Writes are allowed only while the run is draft
/// or in_progress; terminal runs are an audit trail and never mutate.
pub async fn submit_response(
    auth: AuthUser,
    State(state): State<AppState>,
    Path(run_id): Path<Uuid>,
    Json(input): Json<ResponseRequest>,
) -> AppResult<impl IntoResponse> {
    let run = RunRepo::find_for_user(&state.pool, run_id, auth.user_id)
        .await?
        .ok_or_else(|| run_not_found(run_id))?;

    let writable = run.run_status().is_some_and(RunStatus::is_writable);
    if !writable {
        return Err(AppError::Core(CoreError::Conflict(format!(
            "Run is not writable in status '{}'",
            run.status
        ))));
    }

    let question = state
        .catalog
        .bank()
        .get(&input.question_id)
        .ok_or_else(|| {
            CoreError::Validation(format!("Unknown question id '{}'", input.question_id))
        })?;

    // After start, answers are restricted to the frozen item set.
    if let Some(items) = &run.item_ids {
        if !items.contains(&input.question_id) {
            return Err(AppError::Core(CoreError::Validation(format!(
                "Question '{}' is not part of this run's item set",
                input.question_id
            ))));
        }
    }

    if !question.scale.contains(input.value) {
        return Err(AppError::Core(CoreError::Validation(format!(
            "Value {} is outside the scale {}..={} for question '{}'",
            input.value, question.scale.min, question.scale.max, input.question_id
        ))));
    }

    // The statement re-checks writability under a row lock; a run
    // completed or canceled since the read above yields no row.
    let response = RunRepo::upsert_response(&state.pool, run_id, &input.question_id, input.value)
        .await?
        .ok_or_else(|| {
            AppError::Core(CoreError::Conflict("Run is no longer writable".into()))
        })?;
    Ok(Json(DataResponse { data: response }))
}

// ---------------------------------------------------------------------------
// Complete / cancel
// ---------------------------------------------------------------------------

/// POST /api/v1/runs/{id}/complete
///
/// Transition in_progress -> completed. Requires every assigned item
/// to be answered. Replaying against a completed run returns the
/// existing snapshot.
pub async fn complete_run(
    auth: AuthUser,
    State(state): State<AppState>,
    Path(run_id): Path<Uuid>,
) -> AppResult<impl IntoResponse> {
    let run = RunRepo::find_for_user(&state.pool, run_id, auth.user_id)
        .await?
        .ok_or_else(|| run_not_found(run_id))?;

    match run.run_status() {
        Some(RunStatus::Completed) => {
            return Ok(Json(DataResponse {
                data: RunSnapshot::from(run),
            }))
        }
        Some(RunStatus::InProgress) => {}
        _ => {
            return Err(AppError::Core(CoreError::Conflict(format!(
                "Run cannot complete from status '{}'",
                run.status
            ))))
        }
    }

    if let Some(items) = &run.item_ids {
        let answered = RunRepo::count_answered_items(&state.pool, run_id, items).await?;
        if (answered as usize) < items.len() {
            return Err(AppError::Core(CoreError::Validation(format!(
                "Run has {answered} of {} required responses",
                items.len()
            ))));
        }
    }

    match RunRepo::complete(&state.pool, run_id, auth.user_id).await? {
        Some(completed) => {
            tracing::info!(run_id = %completed.id, user_id = %auth.user_id, "Run completed");
            Ok(Json(DataResponse {
                data: RunSnapshot::from(completed),
            }))
        }
        None => {
            let current = RunRepo::find_for_user(&state.pool, run_id, auth.user_id)
                .await?
                .ok_or_else(|| run_not_found(run_id))?;
            if current.run_status() == Some(RunStatus::Completed) {
                Ok(Json(DataResponse {
                    data: RunSnapshot::from(current),
                }))
            } else {
                Err(AppError::Core(CoreError::Conflict(format!(
                    "Run cannot complete from status '{}'",
                    current.status
                ))))
            }
        }
    }
}

/// POST /api/v1/runs/{id}/cancel
///
/// Transition draft or in_progress -> canceled. Replaying against a
/// canceled run returns the existing snapshot; a completed run cannot
/// be canceled.
pub async fn cancel_run(
    auth: AuthUser,
    State(state): State<AppState>,
    Path(run_id): Path<Uuid>,
) -> AppResult<impl IntoResponse> {
    let run = RunRepo::find_for_user(&state.pool, run_id, auth.user_id)
        .await?
        .ok_or_else(|| run_not_found(run_id))?;

    if run.run_status() == Some(RunStatus::Canceled) {
        return Ok(Json(DataResponse {
            data: RunSnapshot::from(run),
        }));
    }

    match RunRepo::cancel(&state.pool, run_id, auth.user_id).await? {
        Some(canceled) => {
            tracing::info!(run_id = %canceled.id, user_id = %auth.user_id, "Run canceled");
            Ok(Json(DataResponse {
                data: RunSnapshot::from(canceled),
            }))
        }
        None => {
            let current = RunRepo::find_for_user(&state.pool, run_id, auth.user_id)
                .await?
                .ok_or_else(|| run_not_found(run_id))?;
            if current.run_status() == Some(RunStatus::Canceled) {
                Ok(Json(DataResponse {
                    data: RunSnapshot::from(current),
                }))
            } else {
                Err(AppError::Core(CoreError::Conflict(format!(
                    "Run cannot cancel from status '{}'",
                    current.status
                ))))
            }
        }
    }
}
