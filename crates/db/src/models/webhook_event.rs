//! Webhook ledger row model.

use lumen_core::types::Timestamp;
use serde::Serialize;
use sqlx::FromRow;

/// Ledger status for a webhook event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LedgerStatus {
    /// Claimed; side effects may be in flight.
    Processing,
    /// Terminal. Redeliveries are acknowledged without reprocessing.
    Processed,
    /// Application failure; a redelivery may claim the row again.
    Failed,
}

impl LedgerStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            LedgerStatus::Processing => "processing",
            LedgerStatus::Processed => "processed",
            LedgerStatus::Failed => "failed",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "processing" => Some(LedgerStatus::Processing),
            "processed" => Some(LedgerStatus::Processed),
            "failed" => Some(LedgerStatus::Failed),
            _ => None,
        }
    }
}

/// A row from the `webhook_events` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct WebhookEvent {
    pub event_id: String,
    pub event_type: String,
    pub payload_hash: String,
    pub status: String,
    pub failure_reason: Option<String>,
    pub processed_at: Option<Timestamp>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl WebhookEvent {
    pub fn ledger_status(&self) -> Option<LedgerStatus> {
        LedgerStatus::parse(&self.status)
    }
}
