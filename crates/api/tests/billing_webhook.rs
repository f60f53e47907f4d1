//! Integration tests for the billing webhook: signature enforcement,
//! idempotent replay, payload-mismatch rejection, and the stale-ledger
//! operator endpoint.

mod common;

use axum::http::StatusCode;
use chrono::Utc;
use common::{expect_json, get_auth, issue_token, post_raw};
use lumen_core::signature;
use lumen_db::repositories::WebhookLedgerRepo;
use serde_json::json;
use sqlx::PgPool;
use uuid::Uuid;

const WEBHOOK_PATH: &str = "/api/v1/billing/webhook";

fn checkout_body(event_id: &str, user_id: Uuid) -> Vec<u8> {
    json!({
        "id": event_id,
        "type": "checkout.session.completed",
        "data": { "object": {
            "mode": "payment",
            "customer": "cus_wh_test",
            "metadata": { "user_id": user_id.to_string() }
        }}
    })
    .to_string()
    .into_bytes()
}

fn signed_headers(body: &[u8]) -> String {
    signature::sign(common::TEST_WEBHOOK_SECRET, body, Utc::now())
}

// ---------------------------------------------------------------------------
// Test: replaying a processed event applies the update exactly once
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../../db/migrations")]
async fn replayed_event_applies_exactly_once(pool: PgPool) {
    let app = common::build_test_app(pool.clone());
    let user_id = Uuid::new_v4();
    let body = checkout_body("evt_replay_1", user_id);
    let header = signed_headers(&body);

    let first = expect_json(
        post_raw(
            app.clone(),
            WEBHOOK_PATH,
            &[("stripe-signature", header.as_str())],
            body.clone(),
        )
        .await,
        StatusCode::OK,
    )
    .await;
    assert_eq!(first["status"], "applied");

    let recorded: (chrono::DateTime<Utc>,) =
        sqlx::query_as("SELECT paid_43_at FROM entitlements WHERE user_id = $1")
            .bind(user_id)
            .fetch_one(&pool)
            .await
            .unwrap();

    // The identical delivery is acknowledged without a second write.
    let second = expect_json(
        post_raw(
            app,
            WEBHOOK_PATH,
            &[("stripe-signature", header.as_str())],
            body,
        )
        .await,
        StatusCode::OK,
    )
    .await;
    assert_eq!(second["status"], "already_processed");

    let after: (chrono::DateTime<Utc>,) =
        sqlx::query_as("SELECT paid_43_at FROM entitlements WHERE user_id = $1")
            .bind(user_id)
            .fetch_one(&pool)
            .await
            .unwrap();
    assert_eq!(recorded.0, after.0);

    let ledger = WebhookLedgerRepo::find(&pool, "evt_replay_1")
        .await
        .unwrap()
        .expect("ledger row should exist");
    assert_eq!(ledger.status, "processed");
}

// ---------------------------------------------------------------------------
// Test: an event id reused with a different payload is rejected
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../../db/migrations")]
async fn reused_event_id_with_different_payload_conflicts(pool: PgPool) {
    let app = common::build_test_app(pool);
    let body = checkout_body("evt_mismatch_1", Uuid::new_v4());
    let header = signed_headers(&body);
    let first = post_raw(
        app.clone(),
        WEBHOOK_PATH,
        &[("stripe-signature", header.as_str())],
        body,
    )
    .await;
    assert_eq!(first.status(), StatusCode::OK);

    // Same id, different user in the payload.
    let forged = checkout_body("evt_mismatch_1", Uuid::new_v4());
    let forged_header = signed_headers(&forged);
    let second = post_raw(
        app,
        WEBHOOK_PATH,
        &[("stripe-signature", forged_header.as_str())],
        forged,
    )
    .await;
    assert_eq!(second.status(), StatusCode::CONFLICT);
}

// ---------------------------------------------------------------------------
// Test: signature failures leave no ledger trace
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../../db/migrations")]
async fn bad_signature_is_rejected_without_ledger_write(pool: PgPool) {
    let app = common::build_test_app(pool.clone());
    let body = checkout_body("evt_forged_1", Uuid::new_v4());

    let wrong_secret = signature::sign("whsec_wrong", &body, Utc::now());
    let response = post_raw(
        app.clone(),
        WEBHOOK_PATH,
        &[("stripe-signature", wrong_secret.as_str())],
        body.clone(),
    )
    .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let missing = post_raw(app, WEBHOOK_PATH, &[], body).await;
    assert_eq!(missing.status(), StatusCode::BAD_REQUEST);

    let ledger = WebhookLedgerRepo::find(&pool, "evt_forged_1").await.unwrap();
    assert!(ledger.is_none(), "rejected deliveries must not be ledgered");
}

// ---------------------------------------------------------------------------
// Test: event types outside the policy are ledgered and ignored
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../../db/migrations")]
async fn unknown_event_type_is_acknowledged_and_ignored(pool: PgPool) {
    let app = common::build_test_app(pool.clone());
    let body = json!({
        "id": "evt_refund_1",
        "type": "charge.refunded",
        "data": { "object": { "customer": "cus_refund" } }
    })
    .to_string()
    .into_bytes();
    let header = signed_headers(&body);

    let response = expect_json(
        post_raw(
            app,
            WEBHOOK_PATH,
            &[("stripe-signature", header.as_str())],
            body,
        )
        .await,
        StatusCode::OK,
    )
    .await;
    assert_eq!(response["status"], "ignored");

    let ledger = WebhookLedgerRepo::find(&pool, "evt_refund_1")
        .await
        .unwrap()
        .expect("ignored events are still ledgered");
    assert_eq!(ledger.status, "processed");
}

// ---------------------------------------------------------------------------
// Test: an unresolvable user marks the row failed and surfaces a 500
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../../db/migrations")]
async fn unresolvable_user_fails_the_row_for_redelivery(pool: PgPool) {
    let app = common::build_test_app(pool.clone());
    // A subscription update for a customer the store has never seen.
    let body = json!({
        "id": "evt_orphan_1",
        "type": "customer.subscription.updated",
        "data": { "object": { "status": "active", "customer": "cus_never_seen" } }
    })
    .to_string()
    .into_bytes();
    let header = signed_headers(&body);

    let response = post_raw(
        app.clone(),
        WEBHOOK_PATH,
        &[("stripe-signature", header.as_str())],
        body.clone(),
    )
    .await;
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

    let ledger = WebhookLedgerRepo::find(&pool, "evt_orphan_1")
        .await
        .unwrap()
        .expect("failed events stay ledgered");
    assert_eq!(ledger.status, "failed");
    assert!(ledger.failure_reason.is_some());

    // The provider redelivers: the failed row is reclaimable.
    let retry = post_raw(
        app,
        WEBHOOK_PATH,
        &[("stripe-signature", header.as_str())],
        body,
    )
    .await;
    assert_eq!(retry.status(), StatusCode::INTERNAL_SERVER_ERROR);
}

// ---------------------------------------------------------------------------
// Test: the stale-ledger endpoint is admin only and finds stuck rows
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../../db/migrations")]
async fn stale_ledger_endpoint_requires_admin_and_lists_stuck_rows(pool: PgPool) {
    let app = common::build_test_app(pool.clone());
    let user_token = issue_token(Uuid::new_v4(), "user");
    let admin_token = issue_token(Uuid::new_v4(), "admin");

    let path = "/api/v1/admin/billing/webhook-events/stale";

    let forbidden = get_auth(app.clone(), path, &user_token).await;
    assert_eq!(forbidden.status(), StatusCode::FORBIDDEN);

    // Simulate a crash between claim and settle by backdating a
    // processing row.
    WebhookLedgerRepo::claim(&pool, "evt_stuck_1", "invoice.paid", "hash_stuck")
        .await
        .unwrap();
    sqlx::query(
        "UPDATE webhook_events SET updated_at = NOW() - INTERVAL '2 hours' \
         WHERE event_id = $1",
    )
    .bind("evt_stuck_1")
    .execute(&pool)
    .await
    .unwrap();

    let listed = expect_json(
        get_auth(app.clone(), path, &admin_token).await,
        StatusCode::OK,
    )
    .await;
    let events = listed["data"].as_array().unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0]["event_id"], "evt_stuck_1");
    assert_eq!(events[0]["status"], "processing");

    // A wider threshold excludes it again.
    let empty = expect_json(
        get_auth(
            app,
            &format!("{path}?older_than_mins=180"),
            &admin_token,
        )
        .await,
        StatusCode::OK,
    )
    .await;
    assert_eq!(empty["data"].as_array().unwrap().len(), 0);
}
