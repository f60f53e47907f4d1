//! Assessment run and response row models.

use lumen_core::run::{AssessmentMode, RunStatus};
use lumen_core::types::Timestamp;
use serde::Serialize;
use sqlx::FromRow;
use uuid::Uuid;

/// A row from the `assessment_runs` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct AssessmentRun {
    pub id: Uuid,
    pub user_id: Uuid,
    pub run_number: i32,
    pub mode: String,
    pub status: String,
    pub context_scope: Option<String>,
    pub focus_area: Option<String>,
    pub source_route: String,
    /// Entitlement state captured when the draft was created or
    /// refreshed; an audit record of what the gate saw.
    pub entitlement_snapshot: Option<serde_json::Value>,
    /// Assigned once, at the draft -> in_progress transition.
    pub item_ids: Option<Vec<String>>,
    pub started_at: Option<Timestamp>,
    pub completed_at: Option<Timestamp>,
    pub canceled_at: Option<Timestamp>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl AssessmentRun {
    pub fn run_status(&self) -> Option<RunStatus> {
        RunStatus::parse(&self.status)
    }

    pub fn assessment_mode(&self) -> AssessmentMode {
        AssessmentMode::for_run_number(self.run_number)
    }
}

/// A row from the `assessment_responses` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct AssessmentResponse {
    pub run_id: Uuid,
    pub question_id: String,
    pub value: i16,
    pub answered_at: Timestamp,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}
