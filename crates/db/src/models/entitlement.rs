//! Entitlement row model.

use lumen_core::billing::PriorEntitlement;
use lumen_core::entitlement::UserState;
use lumen_core::types::Timestamp;
use serde::Serialize;
use sqlx::FromRow;
use uuid::Uuid;

/// A row from the `entitlements` table.
///
/// `user_state` is stored as text; [`Entitlement::state`] parses it
/// into the typed lattice at the boundary.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Entitlement {
    pub user_id: Uuid,
    pub user_state: String,
    pub stripe_customer_id: Option<String>,
    pub paid_43_at: Option<Timestamp>,
    pub sub_status: Option<String>,
    pub sub_current_period_end: Option<Timestamp>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl Entitlement {
    /// Typed view of `user_state`. `None` means the stored value is
    /// outside the known vocabulary, which callers treat as data
    /// corruption.
    pub fn state(&self) -> Option<UserState> {
        UserState::parse(&self.user_state)
    }

    /// True when the one-time purchase floor applies.
    pub fn has_paid(&self) -> bool {
        self.paid_43_at.is_some()
    }

    /// Snapshot consumed by the billing policy.
    pub fn prior(&self) -> Option<PriorEntitlement> {
        Some(PriorEntitlement {
            user_state: self.state()?,
            has_paid: self.has_paid(),
        })
    }
}
