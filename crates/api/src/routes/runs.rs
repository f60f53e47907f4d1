//! Route definitions for the `/runs` resource.
//!
//! All endpoints require authentication and operate on the caller's
//! own runs only.

use axum::routing::{get, post};
use axum::Router;

use crate::handlers::runs;
use crate::state::AppState;

/// Routes mounted at `/runs`.
///
/// ```text
/// GET    /                   -> list_runs
/// POST   /draft              -> create_draft
/// GET    /{id}               -> get_run
/// POST   /{id}/start         -> start_run
/// POST   /{id}/responses     -> submit_response
/// POST   /{id}/complete      -> complete_run
/// POST   /{id}/cancel        -> cancel_run
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(runs::list_runs))
        .route("/draft", post(runs::create_draft))
        .route("/{id}", get(runs::get_run))
        .route("/{id}/start", post(runs::start_run))
        .route("/{id}/responses", post(runs::submit_response))
        .route("/{id}/complete", post(runs::complete_run))
        .route("/{id}/cancel", post(runs::cancel_run))
}
