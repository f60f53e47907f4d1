//! Route definitions for the `/entitlements` resource.

use axum::routing::get;
use axum::Router;

use crate::handlers::entitlements;
use crate::state::AppState;

/// Routes mounted at `/entitlements`.
///
/// ```text
/// GET    /me    -> get_me
/// ```
pub fn router() -> Router<AppState> {
    Router::new().route("/me", get(entitlements::get_me))
}
