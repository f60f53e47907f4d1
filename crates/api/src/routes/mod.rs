pub mod billing;
pub mod entitlements;
pub mod health;
pub mod runs;

use axum::Router;

use crate::state::AppState;

/// Build the `/api/v1` route tree.
///
/// Route hierarchy:
///
/// ```text
/// /entitlements/me                       caller entitlement + gate preview
///
/// /runs                                  list runs
/// /runs/draft                            create or refresh the open draft
/// /runs/{id}                             run detail with responses
/// /runs/{id}/start                       draft -> in_progress, assigns items
/// /runs/{id}/responses                   record one answer
/// /runs/{id}/complete                    in_progress -> completed
/// /runs/{id}/cancel                      draft/in_progress -> canceled
///
/// /billing/webhook                       provider event ingestion (signature auth)
///
/// /admin/billing/webhook-events/stale    stuck ledger rows (admin only)
/// ```
pub fn api_routes() -> Router<AppState> {
    Router::new()
        // Caller entitlement state and run gate preview.
        .nest("/entitlements", entitlements::router())
        // Assessment run lifecycle and responses.
        .nest("/runs", runs::router())
        // Billing provider webhook.
        .nest("/billing", billing::router())
        // Webhook ledger operator endpoints.
        .nest("/admin/billing", billing::admin_router())
}
