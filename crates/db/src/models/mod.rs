pub mod entitlement;
pub mod run;
pub mod webhook_event;

pub use entitlement::Entitlement;
pub use run::{AssessmentResponse, AssessmentRun};
pub use webhook_event::{LedgerStatus, WebhookEvent};
