//! Pure domain logic for the Lumen assessment platform.
//!
//! Everything in this crate is synchronous and side-effect free: the
//! question bank and retake selection, the run and entitlement state
//! machines, the billing event policy, the run gate, and webhook
//! signature verification. Persistence lives in `lumen-db`, HTTP in
//! `lumen-api`.

pub mod billing;
pub mod entitlement;
pub mod error;
pub mod gate;
pub mod question_bank;
pub mod retake;
pub mod run;
pub mod signature;
pub mod types;
