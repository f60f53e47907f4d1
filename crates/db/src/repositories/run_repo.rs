//! Repository for the `assessment_runs` and `assessment_responses`
//! tables.
//!
//! Lifecycle transitions are conditional updates guarded on the
//! current status; zero affected rows means the run was not in the
//! required state and the caller decides between idempotent success
//! and a conflict.

use sqlx::PgPool;
use uuid::Uuid;

use crate::models::{AssessmentResponse, AssessmentRun};

const RUN_COLUMNS: &str = "\
    id, user_id, run_number, mode, status, context_scope, focus_area, \
    source_route, entitlement_snapshot, item_ids, started_at, \
    completed_at, canceled_at, created_at, updated_at";

const RESPONSE_COLUMNS: &str =
    "run_id, question_id, value, answered_at, created_at, updated_at";

/// Provides lifecycle and response operations for assessment runs.
pub struct RunRepo;

impl RunRepo {
    /// Number of completed runs for a user. Drives run numbering and
    /// the tier gate.
    pub async fn count_completed(pool: &PgPool, user_id: Uuid) -> Result<i64, sqlx::Error> {
        let row: (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM assessment_runs \
             WHERE user_id = $1 AND status = 'completed'",
        )
        .bind(user_id)
        .fetch_one(pool)
        .await?;
        Ok(row.0)
    }

    /// Create or refresh the user's single open draft.
    ///
    /// The partial unique index on `(user_id) WHERE status = 'draft'`
    /// makes concurrent draft requests converge on one row; the
    /// conflict arm refreshes the setup metadata and the recomputed
    /// run number.
    pub async fn upsert_draft(
        pool: &PgPool,
        user_id: Uuid,
        run_number: i32,
        mode: &str,
        context_scope: Option<&str>,
        focus_area: Option<&str>,
        source_route: &str,
        entitlement_snapshot: &serde_json::Value,
    ) -> Result<AssessmentRun, sqlx::Error> {
        let query = format!(
            "INSERT INTO assessment_runs \
                 (user_id, run_number, mode, context_scope, focus_area, \
                  source_route, entitlement_snapshot) \
             VALUES ($1, $2, $3, $4, $5, $6, $7) \
             ON CONFLICT (user_id) WHERE status = 'draft' DO UPDATE SET \
                 run_number = EXCLUDED.run_number, \
                 mode = EXCLUDED.mode, \
                 context_scope = EXCLUDED.context_scope, \
                 focus_area = EXCLUDED.focus_area, \
                 source_route = EXCLUDED.source_route, \
                 entitlement_snapshot = EXCLUDED.entitlement_snapshot, \
                 updated_at = NOW() \
             RETURNING {RUN_COLUMNS}"
        );
        sqlx::query_as::<_, AssessmentRun>(&query)
            .bind(user_id)
            .bind(run_number)
            .bind(mode)
            .bind(context_scope)
            .bind(focus_area)
            .bind(source_route)
            .bind(entitlement_snapshot)
            .fetch_one(pool)
            .await
    }

    /// Find a run scoped to its owner.
    pub async fn find_for_user(
        pool: &PgPool,
        id: Uuid,
        user_id: Uuid,
    ) -> Result<Option<AssessmentRun>, sqlx::Error> {
        let query = format!(
            "SELECT {RUN_COLUMNS} FROM assessment_runs WHERE id = $1 AND user_id = $2"
        );
        sqlx::query_as::<_, AssessmentRun>(&query)
            .bind(id)
            .bind(user_id)
            .fetch_optional(pool)
            .await
    }

    /// List a user's runs, newest first.
    pub async fn list_for_user(
        pool: &PgPool,
        user_id: Uuid,
    ) -> Result<Vec<AssessmentRun>, sqlx::Error> {
        let query = format!(
            "SELECT {RUN_COLUMNS} FROM assessment_runs \
             WHERE user_id = $1 ORDER BY created_at DESC"
        );
        sqlx::query_as::<_, AssessmentRun>(&query)
            .bind(user_id)
            .fetch_all(pool)
            .await
    }

    /// Transition draft -> in_progress, assigning the item set.
    ///
    /// Returns `None` when the run is not currently a draft; the
    /// caller refetches to distinguish an idempotent replay from a
    /// genuine conflict.
    pub async fn start(
        pool: &PgPool,
        id: Uuid,
        user_id: Uuid,
        item_ids: &[String],
    ) -> Result<Option<AssessmentRun>, sqlx::Error> {
        let query = format!(
            "UPDATE assessment_runs SET \
                 status = 'in_progress', \
                 item_ids = $3, \
                 started_at = NOW(), \
                 updated_at = NOW() \
             WHERE id = $1 AND user_id = $2 AND status = 'draft' \
             RETURNING {RUN_COLUMNS}"
        );
        sqlx::query_as::<_, AssessmentRun>(&query)
            .bind(id)
            .bind(user_id)
            .bind(item_ids)
            .fetch_optional(pool)
            .await
    }

    /// Transition in_progress -> completed.
    pub async fn complete(
        pool: &PgPool,
        id: Uuid,
        user_id: Uuid,
    ) -> Result<Option<AssessmentRun>, sqlx::Error> {
        let query = format!(
            "UPDATE assessment_runs SET \
                 status = 'completed', \
                 completed_at = NOW(), \
                 updated_at = NOW() \
             WHERE id = $1 AND user_id = $2 AND status = 'in_progress' \
             RETURNING {RUN_COLUMNS}"
        );
        sqlx::query_as::<_, AssessmentRun>(&query)
            .bind(id)
            .bind(user_id)
            .fetch_optional(pool)
            .await
    }

    /// Transition draft or in_progress -> canceled.
    pub async fn cancel(
        pool: &PgPool,
        id: Uuid,
        user_id: Uuid,
    ) -> Result<Option<AssessmentRun>, sqlx::Error> {
        let query = format!(
            "UPDATE assessment_runs SET \
                 status = 'canceled', \
                 canceled_at = NOW(), \
                 updated_at = NOW() \
             WHERE id = $1 AND user_id = $2 AND status IN ('draft', 'in_progress') \
             RETURNING {RUN_COLUMNS}"
        );
        sqlx::query_as::<_, AssessmentRun>(&query)
            .bind(id)
            .bind(user_id)
            .fetch_optional(pool)
            .await
    }

    /// Record or overwrite one answer. Last write wins.
    ///
    /// The writability check is part of the statement: the CTE locks
    /// the run row and yields it only while the status still admits
    /// writes, so a concurrent complete/cancel cannot slip in between
    /// a handler-side status read and the insert. Returns `None` when
    /// the run is terminal.
    pub async fn upsert_response(
        pool: &PgPool,
        run_id: Uuid,
        question_id: &str,
        value: i16,
    ) -> Result<Option<AssessmentResponse>, sqlx::Error> {
        let query = format!(
            "WITH writable_run AS ( \
                 SELECT id FROM assessment_runs \
                 WHERE id = $1 AND status IN ('draft', 'in_progress') \
                 FOR UPDATE \
             ) \
             INSERT INTO assessment_responses (run_id, question_id, value) \
             SELECT id, $2, $3 FROM writable_run \
             ON CONFLICT (run_id, question_id) DO UPDATE SET \
                 value = EXCLUDED.value, \
                 answered_at = NOW(), \
                 updated_at = NOW() \
             RETURNING {RESPONSE_COLUMNS}"
        );
        sqlx::query_as::<_, AssessmentResponse>(&query)
            .bind(run_id)
            .bind(question_id)
            .bind(value)
            .fetch_optional(pool)
            .await
    }

    /// List a run's responses in question-id order.
    pub async fn list_responses(
        pool: &PgPool,
        run_id: Uuid,
    ) -> Result<Vec<AssessmentResponse>, sqlx::Error> {
        let query = format!(
            "SELECT {RESPONSE_COLUMNS} FROM assessment_responses \
             WHERE run_id = $1 ORDER BY question_id"
        );
        sqlx::query_as::<_, AssessmentResponse>(&query)
            .bind(run_id)
            .fetch_all(pool)
            .await
    }

    /// Number of answers recorded against the run's assigned item set.
    /// Draft-phase answers to items outside the set do not count.
    pub async fn count_answered_items(
        pool: &PgPool,
        run_id: Uuid,
        item_ids: &[String],
    ) -> Result<i64, sqlx::Error> {
        let row: (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM assessment_responses \
             WHERE run_id = $1 AND question_id = ANY($2)",
        )
        .bind(run_id)
        .bind(item_ids)
        .fetch_one(pool)
        .await?;
        Ok(row.0)
    }

    /// Number of answers recorded for a run.
    pub async fn count_responses(pool: &PgPool, run_id: Uuid) -> Result<i64, sqlx::Error> {
        let row: (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM assessment_responses WHERE run_id = $1")
                .bind(run_id)
                .fetch_one(pool)
                .await?;
        Ok(row.0)
    }
}
