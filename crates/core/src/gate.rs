//! The run gate: may this user start a new assessment run?
//!
//! Pure policy over entitlement state and run history. Called at draft
//! creation AND re-checked at the draft→in_progress transition, since
//! entitlement can change between the two (a subscription can lapse
//! mid-flow). Denials are expected outcomes, reported with a
//! machine-readable reason, never logged as errors.

use serde::Serialize;

use crate::entitlement::UserState;
use crate::types::Timestamp;

/// Why a run start was denied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DenyReason {
    /// Free tier grants exactly one lifetime run.
    TierLimit,
    /// One-time purchase covers a single retake; recurring retakes
    /// need a subscription.
    RequiresSubscription,
    /// Canceled/past-due grace window has ended (or was never set).
    SubscriptionExpired,
}

impl DenyReason {
    pub fn as_str(self) -> &'static str {
        match self {
            DenyReason::TierLimit => "tier_limit",
            DenyReason::RequiresSubscription => "requires_subscription",
            DenyReason::SubscriptionExpired => "subscription_expired",
        }
    }
}

/// Everything the gate looks at.
#[derive(Debug, Clone)]
pub struct GateInput {
    pub user_state: UserState,
    pub completed_runs_count: i64,
    pub sub_current_period_end: Option<Timestamp>,
}

/// The gate's verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GateDecision {
    pub allowed: bool,
    pub reason: Option<DenyReason>,
}

impl GateDecision {
    fn allow() -> Self {
        Self {
            allowed: true,
            reason: None,
        }
    }

    fn deny(reason: DenyReason) -> Self {
        Self {
            allowed: false,
            reason: Some(reason),
        }
    }
}

/// Decide whether a new run may start. `now` is passed in so the
/// function stays pure and testable.
pub fn can_start_run(input: &GateInput, now: Timestamp) -> GateDecision {
    match input.user_state {
        UserState::Public | UserState::FreeEmail => {
            if input.completed_runs_count == 0 {
                GateDecision::allow()
            } else {
                GateDecision::deny(DenyReason::TierLimit)
            }
        }
        // The purchase buys the 43-item retake on top of the free
        // full run; anything beyond that needs a subscription.
        UserState::Paid43 => {
            if input.completed_runs_count <= 1 {
                GateDecision::allow()
            } else {
                GateDecision::deny(DenyReason::RequiresSubscription)
            }
        }
        UserState::SubActive => GateDecision::allow(),
        UserState::SubCanceled | UserState::PastDue => match input.sub_current_period_end {
            Some(period_end) if now < period_end => GateDecision::allow(),
            // Missing period end counts as expired, not open-ended.
            _ => GateDecision::deny(DenyReason::SubscriptionExpired),
        },
    }
}
