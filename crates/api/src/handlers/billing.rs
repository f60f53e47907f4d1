//! Handlers for the billing webhook and its operator endpoints.
//!
//! The webhook path is the only unauthenticated write surface in the
//! service, so the order of operations is strict: verify the provider
//! signature first (a rejected request must leave no ledger trace),
//! then claim the event id in the ledger, then apply the entitlement
//! update, then settle the ledger row.

use axum::body::Bytes;
use axum::extract::{Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::Utc;
use lumen_core::billing::{payload_hash, plan_update, user_reference, ProviderEvent};
use lumen_core::error::CoreError;
use lumen_core::signature;
use lumen_db::repositories::{ClaimOutcome, EntitlementRepo, WebhookLedgerRepo};
use serde::Deserialize;
use serde_json::json;

use crate::error::{AppError, AppResult};
use crate::middleware::auth::AuthUser;
use crate::response::DataResponse;
use crate::state::AppState;

/// Header carrying the provider's `t=...,v1=...` signature.
pub const SIGNATURE_HEADER: &str = "stripe-signature";

fn ack(status: &'static str) -> Response {
    (
        StatusCode::OK,
        Json(json!({ "received": true, "status": status })),
    )
        .into_response()
}

/// POST /api/v1/billing/webhook
///
/// Ingest one provider event with exactly-once effect. Replays of a
/// processed event are acknowledged without side effects; an event id
/// reused with a different payload is rejected with 409.
pub async fn receive_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> AppResult<Response> {
    let header = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| AppError::BadRequest(format!("Missing {SIGNATURE_HEADER} header")))?;

    signature::verify(
        &state.config.billing.webhook_secret,
        header,
        &body,
        Utc::now(),
        state.config.billing.signature_tolerance_secs,
    )
    .map_err(|e| AppError::BadRequest(format!("Signature verification failed: {e}")))?;

    let event = ProviderEvent::from_json(&body).map_err(|e| AppError::BadRequest(e.to_string()))?;
    let hash = payload_hash(&body);

    match WebhookLedgerRepo::claim(&state.pool, &event.id, &event.event_type, &hash).await? {
        ClaimOutcome::AlreadyProcessed(_) => {
            tracing::debug!(event_id = %event.id, "Webhook replay, already processed");
            Ok(ack("already_processed"))
        }
        ClaimOutcome::InFlight(_) => {
            tracing::debug!(event_id = %event.id, "Webhook replay, claim in flight");
            Ok(ack("in_flight"))
        }
        ClaimOutcome::PayloadMismatch(existing) => {
            tracing::warn!(
                event_id = %event.id,
                stored_hash = %existing.payload_hash,
                "Webhook event id reused with a different payload",
            );
            Err(AppError::Core(CoreError::Conflict(
                "Event id was already recorded with a different payload".into(),
            )))
        }
        ClaimOutcome::Claimed(_) => match apply_claimed_event(&state, &event).await {
            Ok(status) => {
                WebhookLedgerRepo::mark_processed(&state.pool, &event.id).await?;
                tracing::info!(
                    event_id = %event.id,
                    event_type = %event.event_type,
                    status,
                    "Webhook event processed",
                );
                Ok(ack(status))
            }
            // Domain failure: settle the row as failed so a
            // redelivery can claim it again after the cause clears.
            Err(ApplyError::Domain(reason)) => {
                WebhookLedgerRepo::mark_failed(&state.pool, &event.id, &reason).await?;
                tracing::warn!(event_id = %event.id, reason = %reason, "Webhook event failed");
                Err(AppError::InternalError(reason))
            }
            // Storage failure: the row stays `processing` and ages
            // into the stale query for operator attention.
            Err(ApplyError::Db(err)) => Err(AppError::Database(err)),
        },
    }
}

enum ApplyError {
    Domain(String),
    Db(sqlx::Error),
}

/// Resolve the user, compute the target update, and merge it into the
/// entitlement store as a single write.
async fn apply_claimed_event(
    state: &AppState,
    event: &ProviderEvent,
) -> Result<&'static str, ApplyError> {
    let reference = user_reference(event);

    let existing = match (reference.user_id, reference.customer_id.as_deref()) {
        (Some(user_id), _) => EntitlementRepo::find_by_user(&state.pool, user_id)
            .await
            .map_err(ApplyError::Db)?,
        (None, Some(customer_id)) => EntitlementRepo::find_by_customer(&state.pool, customer_id)
            .await
            .map_err(ApplyError::Db)?,
        (None, None) => None,
    };

    let prior = existing.as_ref().and_then(|row| row.prior());
    let update = match plan_update(event, prior.as_ref(), Utc::now()) {
        Ok(Some(update)) => update,
        Ok(None) => return Ok("ignored"),
        Err(err) => return Err(ApplyError::Domain(err.to_string())),
    };

    let user_id = reference
        .user_id
        .or(existing.map(|row| row.user_id))
        .ok_or_else(|| {
            ApplyError::Domain(format!("cannot resolve a user for event {}", event.id))
        })?;

    EntitlementRepo::apply_update(&state.pool, user_id, &update)
        .await
        .map_err(ApplyError::Db)?;

    Ok("applied")
}

// ---------------------------------------------------------------------------
// Operator endpoints
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct StaleQuery {
    pub older_than_mins: Option<i64>,
}

/// GET /api/v1/admin/billing/webhook-events/stale
///
/// Ledger rows stuck in `processing`: a crash between claim and settle.
/// Admin only.
pub async fn list_stale_webhook_events(
    auth: AuthUser,
    State(state): State<AppState>,
    Query(query): Query<StaleQuery>,
) -> AppResult<impl IntoResponse> {
    if !auth.is_admin() {
        return Err(AppError::Core(CoreError::Forbidden(
            "Admin role required".into(),
        )));
    }

    let older_than_mins = query
        .older_than_mins
        .unwrap_or(state.config.billing.stale_after_mins);
    let events = WebhookLedgerRepo::list_stale_processing(&state.pool, older_than_mins).await?;
    Ok(Json(DataResponse { data: events }))
}
