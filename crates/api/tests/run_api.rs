//! Integration tests for the assessment run lifecycle, driven through
//! the HTTP surface end to end: first free run, tier gate, paid
//! upgrade via webhook, and the 43-item retake.

mod common;

use axum::http::StatusCode;
use chrono::Utc;
use common::{expect_json, get_auth, issue_token, post_json, post_raw};
use lumen_core::signature;
use lumen_db::repositories::RunRepo;
use serde_json::json;
use sqlx::PgPool;
use uuid::Uuid;

/// Answer every assigned item directly through the repository so the
/// HTTP tests stay focused on the lifecycle endpoints.
async fn answer_all(pool: &PgPool, run_id: Uuid, item_ids: &[serde_json::Value]) {
    for id in item_ids {
        let question_id = id.as_str().expect("item id should be a string");
        RunRepo::upsert_response(pool, run_id, question_id, 2)
            .await
            .expect("response insert should succeed")
            .expect("run should be writable");
    }
}

fn deliver_checkout_webhook_body(user_id: Uuid) -> Vec<u8> {
    json!({
        "id": "evt_checkout_run_test",
        "type": "checkout.session.completed",
        "data": { "object": {
            "mode": "payment",
            "customer": "cus_run_test",
            "metadata": { "user_id": user_id.to_string() }
        }}
    })
    .to_string()
    .into_bytes()
}

// ---------------------------------------------------------------------------
// Test: the full first-run-then-paid-retake journey
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../../db/migrations")]
async fn free_run_paid_upgrade_and_retake_journey(pool: PgPool) {
    let app = common::build_test_app(pool.clone());
    let user_id = Uuid::new_v4();
    let token = issue_token(user_id, "user");

    // A fresh user starts at free_email with the gate open.
    let me = expect_json(
        get_auth(app.clone(), "/api/v1/entitlements/me", &token).await,
        StatusCode::OK,
    )
    .await;
    assert_eq!(me["data"]["entitlement"]["user_state"], "free_email");
    assert_eq!(me["data"]["completed_runs_count"], 0);
    assert_eq!(me["data"]["can_start_run"], true);

    // Draft run 1: full 143-item assessment, no items assigned yet.
    let draft = expect_json(
        post_json(
            app.clone(),
            "/api/v1/runs/draft",
            &token,
            Some(json!({ "context_scope": "work", "focus_area": "clarity" })),
        )
        .await,
        StatusCode::OK,
    )
    .await;
    assert_eq!(draft["data"]["run_number"], 1);
    assert_eq!(draft["data"]["assessment_mode"], "full_143");
    assert_eq!(draft["data"]["question_count"], 143);
    assert!(draft["data"]["item_ids"].is_null());
    let run_id = draft["data"]["run_id"].as_str().unwrap().to_string();

    // Start freezes the 143-item set.
    let started = expect_json(
        post_json(app.clone(), &format!("/api/v1/runs/{run_id}/start"), &token, None).await,
        StatusCode::OK,
    )
    .await;
    let item_ids = started["data"]["item_ids"].as_array().unwrap().clone();
    assert_eq!(item_ids.len(), 143);

    // A valid answer is accepted; out-of-scale and unknown ids are not.
    let first_item = item_ids[0].as_str().unwrap();
    let accepted = post_json(
        app.clone(),
        &format!("/api/v1/runs/{run_id}/responses"),
        &token,
        Some(json!({ "question_id": first_item, "value": 3 })),
    )
    .await;
    assert_eq!(accepted.status(), StatusCode::OK);

    let out_of_scale = post_json(
        app.clone(),
        &format!("/api/v1/runs/{run_id}/responses"),
        &token,
        Some(json!({ "question_id": first_item, "value": 9 })),
    )
    .await;
    assert_eq!(out_of_scale.status(), StatusCode::BAD_REQUEST);

    let unknown = post_json(
        app.clone(),
        &format!("/api/v1/runs/{run_id}/responses"),
        &token,
        Some(json!({ "question_id": "R0-99", "value": 2 })),
    )
    .await;
    assert_eq!(unknown.status(), StatusCode::BAD_REQUEST);

    // Completing early is rejected while answers are missing.
    let early = post_json(
        app.clone(),
        &format!("/api/v1/runs/{run_id}/complete"),
        &token,
        None,
    )
    .await;
    assert_eq!(early.status(), StatusCode::BAD_REQUEST);

    let run_uuid = Uuid::parse_str(&run_id).unwrap();
    answer_all(&pool, run_uuid, &item_ids).await;

    let completed = expect_json(
        post_json(
            app.clone(),
            &format!("/api/v1/runs/{run_id}/complete"),
            &token,
            None,
        )
        .await,
        StatusCode::OK,
    )
    .await;
    assert_eq!(completed["data"]["status"], "completed");

    // The free tier is now exhausted.
    let blocked = post_json(app.clone(), "/api/v1/runs/draft", &token, None).await;
    assert_eq!(blocked.status(), StatusCode::FORBIDDEN);
    let blocked = common::body_json(blocked).await;
    assert_eq!(blocked["error"], "run_creation_blocked");
    assert_eq!(blocked["reason"], "tier_limit");

    // A paid checkout unlocks the retake.
    let body = deliver_checkout_webhook_body(user_id);
    let header = signature::sign(common::TEST_WEBHOOK_SECRET, &body, Utc::now());
    let delivered = post_raw(
        app.clone(),
        "/api/v1/billing/webhook",
        &[("stripe-signature", header.as_str())],
        body,
    )
    .await;
    assert_eq!(delivered.status(), StatusCode::OK);

    let me = expect_json(
        get_auth(app.clone(), "/api/v1/entitlements/me", &token).await,
        StatusCode::OK,
    )
    .await;
    assert_eq!(me["data"]["entitlement"]["user_state"], "paid_43");
    assert_eq!(me["data"]["can_start_run"], true);

    // Draft run 2: the 43-item retake.
    let retake = expect_json(
        post_json(app.clone(), "/api/v1/runs/draft", &token, None).await,
        StatusCode::OK,
    )
    .await;
    assert_eq!(retake["data"]["run_number"], 2);
    assert_eq!(retake["data"]["assessment_mode"], "monthly_43");
    let retake_id = retake["data"]["run_id"].as_str().unwrap().to_string();

    let started = expect_json(
        post_json(
            app.clone(),
            &format!("/api/v1/runs/{retake_id}/start"),
            &token,
            None,
        )
        .await,
        StatusCode::OK,
    )
    .await;
    let retake_items = started["data"]["item_ids"].as_array().unwrap().clone();
    assert_eq!(retake_items.len(), 43);

    // Replaying start returns the identical frozen set.
    let replayed = expect_json(
        post_json(
            app.clone(),
            &format!("/api/v1/runs/{retake_id}/start"),
            &token,
            None,
        )
        .await,
        StatusCode::OK,
    )
    .await;
    assert_eq!(replayed["data"]["item_ids"].as_array().unwrap(), &retake_items);
}

// ---------------------------------------------------------------------------
// Test: runs are invisible to other users
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../../db/migrations")]
async fn runs_are_scoped_to_their_owner(pool: PgPool) {
    let app = common::build_test_app(pool);
    let owner = issue_token(Uuid::new_v4(), "user");
    let other = issue_token(Uuid::new_v4(), "user");

    let draft = expect_json(
        post_json(app.clone(), "/api/v1/runs/draft", &owner, None).await,
        StatusCode::OK,
    )
    .await;
    let run_id = draft["data"]["run_id"].as_str().unwrap().to_string();

    let stranger = get_auth(app.clone(), &format!("/api/v1/runs/{run_id}"), &other).await;
    assert_eq!(stranger.status(), StatusCode::NOT_FOUND);

    let hijack = post_json(
        app.clone(),
        &format!("/api/v1/runs/{run_id}/start"),
        &other,
        None,
    )
    .await;
    assert_eq!(hijack.status(), StatusCode::NOT_FOUND);

    let listed = expect_json(
        get_auth(app, "/api/v1/runs", &other).await,
        StatusCode::OK,
    )
    .await;
    assert_eq!(listed["data"].as_array().unwrap().len(), 0);
}

// ---------------------------------------------------------------------------
// Test: draft requests converge on a single open draft
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../../db/migrations")]
async fn repeated_draft_requests_reuse_one_row(pool: PgPool) {
    let app = common::build_test_app(pool);
    let token = issue_token(Uuid::new_v4(), "user");

    let first = expect_json(
        post_json(
            app.clone(),
            "/api/v1/runs/draft",
            &token,
            Some(json!({ "context_scope": "work" })),
        )
        .await,
        StatusCode::OK,
    )
    .await;
    let second = expect_json(
        post_json(
            app.clone(),
            "/api/v1/runs/draft",
            &token,
            Some(json!({ "context_scope": "home" })),
        )
        .await,
        StatusCode::OK,
    )
    .await;

    assert_eq!(first["data"]["run_id"], second["data"]["run_id"]);

    let listed = expect_json(
        get_auth(app, "/api/v1/runs", &token).await,
        StatusCode::OK,
    )
    .await;
    assert_eq!(listed["data"].as_array().unwrap().len(), 1);
}

// ---------------------------------------------------------------------------
// Test: rejected draft metadata
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../../db/migrations")]
async fn draft_rejects_unknown_context_scope(pool: PgPool) {
    let app = common::build_test_app(pool);
    let token = issue_token(Uuid::new_v4(), "user");

    let response = post_json(
        app,
        "/api/v1/runs/draft",
        &token,
        Some(json!({ "context_scope": "galaxy" })),
    )
    .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

// ---------------------------------------------------------------------------
// Test: cancel frees the draft slot, completed runs are immutable
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../../db/migrations")]
async fn cancel_frees_the_draft_slot(pool: PgPool) {
    let app = common::build_test_app(pool);
    let token = issue_token(Uuid::new_v4(), "user");

    let draft = expect_json(
        post_json(app.clone(), "/api/v1/runs/draft", &token, None).await,
        StatusCode::OK,
    )
    .await;
    let run_id = draft["data"]["run_id"].as_str().unwrap().to_string();

    let canceled = expect_json(
        post_json(
            app.clone(),
            &format!("/api/v1/runs/{run_id}/cancel"),
            &token,
            None,
        )
        .await,
        StatusCode::OK,
    )
    .await;
    assert_eq!(canceled["data"]["status"], "canceled");

    // Cancel replay is idempotent.
    let replay = post_json(
        app.clone(),
        &format!("/api/v1/runs/{run_id}/cancel"),
        &token,
        None,
    )
    .await;
    assert_eq!(replay.status(), StatusCode::OK);

    // A canceled run cannot start.
    let start = post_json(
        app.clone(),
        &format!("/api/v1/runs/{run_id}/start"),
        &token,
        None,
    )
    .await;
    assert_eq!(start.status(), StatusCode::CONFLICT);

    // The slot is free for a new draft with a fresh id.
    let next = expect_json(
        post_json(app, "/api/v1/runs/draft", &token, None).await,
        StatusCode::OK,
    )
    .await;
    assert_ne!(next["data"]["run_id"].as_str(), Some(run_id.as_str()));
}

// ---------------------------------------------------------------------------
// Test: terminal runs never record answers
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../../db/migrations")]
async fn terminal_runs_reject_response_writes(pool: PgPool) {
    let app = common::build_test_app(pool.clone());
    let token = issue_token(Uuid::new_v4(), "user");

    // A canceled draft takes no answers.
    let draft = expect_json(
        post_json(app.clone(), "/api/v1/runs/draft", &token, None).await,
        StatusCode::OK,
    )
    .await;
    let canceled_id = draft["data"]["run_id"].as_str().unwrap().to_string();
    let canceled = post_json(
        app.clone(),
        &format!("/api/v1/runs/{canceled_id}/cancel"),
        &token,
        None,
    )
    .await;
    assert_eq!(canceled.status(), StatusCode::OK);

    let rejected = post_json(
        app.clone(),
        &format!("/api/v1/runs/{canceled_id}/responses"),
        &token,
        Some(json!({ "question_id": "R1-01", "value": 2 })),
    )
    .await;
    assert_eq!(rejected.status(), StatusCode::CONFLICT);

    // Neither does a completed run, and the stored answers stay intact.
    let draft = expect_json(
        post_json(app.clone(), "/api/v1/runs/draft", &token, None).await,
        StatusCode::OK,
    )
    .await;
    let run_id = draft["data"]["run_id"].as_str().unwrap().to_string();
    let started = expect_json(
        post_json(app.clone(), &format!("/api/v1/runs/{run_id}/start"), &token, None).await,
        StatusCode::OK,
    )
    .await;
    let item_ids = started["data"]["item_ids"].as_array().unwrap().clone();

    let run_uuid = Uuid::parse_str(&run_id).unwrap();
    answer_all(&pool, run_uuid, &item_ids).await;
    let completed = post_json(
        app.clone(),
        &format!("/api/v1/runs/{run_id}/complete"),
        &token,
        None,
    )
    .await;
    assert_eq!(completed.status(), StatusCode::OK);

    let first_item = item_ids[0].as_str().unwrap();
    let overwrite = post_json(
        app.clone(),
        &format!("/api/v1/runs/{run_id}/responses"),
        &token,
        Some(json!({ "question_id": first_item, "value": 5 })),
    )
    .await;
    assert_eq!(overwrite.status(), StatusCode::CONFLICT);

    let detail = expect_json(
        get_auth(app, &format!("/api/v1/runs/{run_id}"), &token).await,
        StatusCode::OK,
    )
    .await;
    let responses = detail["data"]["responses"].as_array().unwrap();
    assert_eq!(responses.len(), item_ids.len());
    assert!(responses.iter().all(|r| r["value"] == 2));
}
