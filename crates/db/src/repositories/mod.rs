pub mod entitlement_repo;
pub mod run_repo;
pub mod webhook_ledger_repo;

pub use entitlement_repo::EntitlementRepo;
pub use run_repo::RunRepo;
pub use webhook_ledger_repo::{ClaimOutcome, WebhookLedgerRepo};
