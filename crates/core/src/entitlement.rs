//! Entitlement state machine.
//!
//! A user's access tier moves through a small lattice driven by
//! billing events and the first-login bootstrap. The lattice is
//! enforced here; the event→target mapping for provider payloads
//! lives in [`crate::billing`] so policy changes never touch the
//! mechanics.

use serde::{Deserialize, Serialize};

/// A user's access tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UserState {
    /// Anonymous visitor; never stored (rows start at `free_email`).
    Public,
    /// Authenticated, no purchase. One lifetime run.
    FreeEmail,
    /// One-time purchase. A permanent floor: no billing event may
    /// downgrade below this.
    Paid43,
    /// Active subscription.
    SubActive,
    /// Subscription canceled; access persists until the period end.
    SubCanceled,
    /// Renewal charge failed; grace access until the period end.
    PastDue,
}

impl UserState {
    pub fn as_str(self) -> &'static str {
        match self {
            UserState::Public => "public",
            UserState::FreeEmail => "free_email",
            UserState::Paid43 => "paid_43",
            UserState::SubActive => "sub_active",
            UserState::SubCanceled => "sub_canceled",
            UserState::PastDue => "past_due",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "public" => Some(UserState::Public),
            "free_email" => Some(UserState::FreeEmail),
            "paid_43" => Some(UserState::Paid43),
            "sub_active" => Some(UserState::SubActive),
            "sub_canceled" => Some(UserState::SubCanceled),
            "past_due" => Some(UserState::PastDue),
            _ => None,
        }
    }
}

impl std::fmt::Display for UserState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Abstract entitlement transitions requested by billing events or the
/// session bootstrap.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntitlementEvent {
    /// First authenticated touch: `public → free_email`. One-way,
    /// never reversed by billing events.
    FirstLogin,
    /// One-time purchase succeeded.
    OneTimePurchase,
    /// Subscription became active (start, renewal, or recovery).
    SubscriptionActivated,
    /// Subscription canceled; grace until the period end.
    SubscriptionCanceled,
    /// Renewal charge failed.
    PaymentFailed,
}

#[derive(Debug, thiserror::Error)]
#[error("illegal entitlement transition: {from} on {event:?}")]
pub struct TransitionError {
    pub from: UserState,
    pub event: EntitlementEvent,
}

/// Apply an event to the lattice.
///
/// Replayed events converge (an activation against `sub_active` is a
/// no-op); events that would regress a state the lattice forbids
/// regressing are rejected.
pub fn apply_event(
    current: UserState,
    event: EntitlementEvent,
) -> Result<UserState, TransitionError> {
    use EntitlementEvent as E;
    use UserState as S;

    let next = match (current, event) {
        (S::Public, E::FirstLogin) => S::FreeEmail,
        // FirstLogin replayed against any established state: no-op.
        (state, E::FirstLogin) => state,

        // One-time purchase. Subscribers keep their higher tier.
        (S::SubActive, E::OneTimePurchase) => S::SubActive,
        (_, E::OneTimePurchase) => S::Paid43,

        (_, E::SubscriptionActivated) => S::SubActive,

        (S::SubActive | S::PastDue | S::SubCanceled, E::SubscriptionCanceled) => S::SubCanceled,
        // A one-time purchase is permanent; canceling a subscription
        // the store never saw leaves the purchase tier intact.
        (S::Paid43, E::SubscriptionCanceled) => S::Paid43,
        (from, E::SubscriptionCanceled) => {
            return Err(TransitionError { from, event })
        }

        (S::SubActive | S::PastDue, E::PaymentFailed) => S::PastDue,
        (from, E::PaymentFailed) => return Err(TransitionError { from, event }),
    };

    Ok(next)
}

/// Clamp a computed target state to the `paid_43` floor.
///
/// `has_paid` is true when the user holds a one-time purchase
/// (`paid_43_at` set). A purchase is permanent: targets below it are
/// lifted back to `Paid43`.
pub fn with_paid_floor(target: UserState, has_paid: bool) -> UserState {
    if has_paid && matches!(target, UserState::Public | UserState::FreeEmail) {
        UserState::Paid43
    } else {
        target
    }
}
