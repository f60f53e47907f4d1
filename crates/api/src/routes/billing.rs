//! Route definitions for the billing webhook and its operator
//! endpoints.
//!
//! The webhook endpoint is public; requests are authenticated by the
//! provider signature, not by a bearer token. The operator endpoints
//! require an admin token.

use axum::routing::{get, post};
use axum::Router;

use crate::handlers::billing;
use crate::state::AppState;

/// Routes mounted at `/billing`.
///
/// ```text
/// POST   /webhook    -> receive_webhook (signature auth)
/// ```
pub fn router() -> Router<AppState> {
    Router::new().route("/webhook", post(billing::receive_webhook))
}

/// Routes mounted at `/admin/billing`.
///
/// ```text
/// GET    /webhook-events/stale    -> list_stale_webhook_events (admin only)
/// ```
pub fn admin_router() -> Router<AppState> {
    Router::new().route(
        "/webhook-events/stale",
        get(billing::list_stale_webhook_events),
    )
}
