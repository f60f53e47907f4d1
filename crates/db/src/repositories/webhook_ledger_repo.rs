//! Repository for the `webhook_events` idempotency ledger.
//!
//! The claim is a single atomic statement: a fresh event id inserts a
//! `processing` row, a `failed` row with the same payload hash is
//! reclaimed, and anything else returns no row. The follow-up SELECT
//! then classifies why the claim was refused.

use sqlx::PgPool;

use crate::models::{LedgerStatus, WebhookEvent};

const COLUMNS: &str = "\
    event_id, event_type, payload_hash, status, failure_reason, \
    processed_at, created_at, updated_at";

/// Outcome of attempting to claim an event id for processing.
#[derive(Debug)]
pub enum ClaimOutcome {
    /// This caller owns the event and must process it.
    Claimed(WebhookEvent),
    /// Another delivery holds the claim; acknowledge without work.
    InFlight(WebhookEvent),
    /// Already processed; acknowledge without work.
    AlreadyProcessed(WebhookEvent),
    /// The event id exists with a different payload hash.
    PayloadMismatch(WebhookEvent),
}

/// Provides the claim/settle protocol for webhook events.
pub struct WebhookLedgerRepo;

impl WebhookLedgerRepo {
    /// Claim an event id, or report why it cannot be claimed.
    pub async fn claim(
        pool: &PgPool,
        event_id: &str,
        event_type: &str,
        payload_hash: &str,
    ) -> Result<ClaimOutcome, sqlx::Error> {
        let query = format!(
            "INSERT INTO webhook_events (event_id, event_type, payload_hash) \
             VALUES ($1, $2, $3) \
             ON CONFLICT (event_id) DO UPDATE SET \
                 status = 'processing', \
                 failure_reason = NULL, \
                 updated_at = NOW() \
             WHERE webhook_events.status = 'failed' \
               AND webhook_events.payload_hash = EXCLUDED.payload_hash \
             RETURNING {COLUMNS}"
        );
        let claimed = sqlx::query_as::<_, WebhookEvent>(&query)
            .bind(event_id)
            .bind(event_type)
            .bind(payload_hash)
            .fetch_optional(pool)
            .await?;

        if let Some(event) = claimed {
            return Ok(ClaimOutcome::Claimed(event));
        }

        // The conflict arm declined: the row exists and is not a
        // reclaimable failure. It cannot vanish (rows are never
        // deleted), so the fetch is expected to find it.
        let existing = Self::find(pool, event_id)
            .await?
            .ok_or(sqlx::Error::RowNotFound)?;

        if existing.payload_hash != payload_hash {
            return Ok(ClaimOutcome::PayloadMismatch(existing));
        }

        match existing.ledger_status() {
            Some(LedgerStatus::Processed) => Ok(ClaimOutcome::AlreadyProcessed(existing)),
            _ => Ok(ClaimOutcome::InFlight(existing)),
        }
    }

    /// Settle a claimed event as processed. Returns false when the row
    /// was not in `processing` (lost claim).
    pub async fn mark_processed(pool: &PgPool, event_id: &str) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE webhook_events SET \
                 status = 'processed', \
                 processed_at = NOW(), \
                 updated_at = NOW() \
             WHERE event_id = $1 AND status = 'processing'",
        )
        .bind(event_id)
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Settle a claimed event as failed, keeping it reclaimable.
    pub async fn mark_failed(
        pool: &PgPool,
        event_id: &str,
        reason: &str,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE webhook_events SET \
                 status = 'failed', \
                 failure_reason = $2, \
                 updated_at = NOW() \
             WHERE event_id = $1 AND status = 'processing'",
        )
        .bind(event_id)
        .bind(reason)
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Find an event by id.
    pub async fn find(pool: &PgPool, event_id: &str) -> Result<Option<WebhookEvent>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM webhook_events WHERE event_id = $1");
        sqlx::query_as::<_, WebhookEvent>(&query)
            .bind(event_id)
            .fetch_optional(pool)
            .await
    }

    /// Events stuck in `processing` longer than the given age. These
    /// indicate a crash between claim and settle and need an operator.
    pub async fn list_stale_processing(
        pool: &PgPool,
        older_than_mins: i64,
    ) -> Result<Vec<WebhookEvent>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM webhook_events \
             WHERE status = 'processing' \
               AND updated_at < NOW() - ($1 || ' minutes')::INTERVAL \
             ORDER BY updated_at ASC"
        );
        sqlx::query_as::<_, WebhookEvent>(&query)
            .bind(older_than_mins.to_string())
            .fetch_all(pool)
            .await
    }
}
