//! Billing event policy: provider webhook payloads → entitlement
//! updates.
//!
//! This module owns the entire `event_type → transition` mapping so
//! policy changes never touch the ledger or state-machine mechanics.
//! Payloads are provider-defined JSON; only the handful of fields the
//! policy needs are extracted, everything else is carried opaquely.

use serde::Deserialize;
use serde_json::Value;
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::entitlement::{apply_event, with_paid_floor, EntitlementEvent, UserState};
use crate::types::Timestamp;

/// Provider event types this policy acts on. Anything else is
/// acknowledged without side effects.
pub const EVENT_CHECKOUT_COMPLETED: &str = "checkout.session.completed";
pub const EVENT_SUBSCRIPTION_CREATED: &str = "customer.subscription.created";
pub const EVENT_SUBSCRIPTION_UPDATED: &str = "customer.subscription.updated";
pub const EVENT_SUBSCRIPTION_DELETED: &str = "customer.subscription.deleted";
pub const EVENT_INVOICE_PAID: &str = "invoice.paid";
pub const EVENT_INVOICE_PAYMENT_FAILED: &str = "invoice.payment_failed";

/// A provider-signed webhook event envelope.
#[derive(Debug, Clone, Deserialize)]
pub struct ProviderEvent {
    /// The provider's own idempotency key.
    pub id: String,
    #[serde(rename = "type")]
    pub event_type: String,
    pub data: EventData,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EventData {
    /// The provider-defined object (checkout session, subscription,
    /// invoice, ...). Treated as opaque apart from narrow extraction.
    pub object: Value,
}

impl ProviderEvent {
    pub fn from_json(body: &[u8]) -> Result<Self, BillingError> {
        serde_json::from_slice(body)
            .map_err(|e| BillingError::MalformedEvent(e.to_string()))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum BillingError {
    #[error("malformed provider event: {0}")]
    MalformedEvent(String),

    #[error("cannot resolve a user for event: {0}")]
    UserUnresolved(String),

    #[error("event requests an illegal transition: {0}")]
    IllegalTransition(#[from] crate::entitlement::TransitionError),
}

/// How an event identifies the affected user. `user_id` wins when
/// present; otherwise the caller resolves `customer_id` against the
/// entitlement store.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UserReference {
    pub user_id: Option<Uuid>,
    pub customer_id: Option<String>,
}

/// The target entitlement write for one event.
///
/// `None` fields are fields this event does not touch; the store
/// merge-upsert preserves their existing values, which is what makes
/// concurrent events for the same user converge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntitlementUpdate {
    pub user_state: UserState,
    pub stripe_customer_id: Option<String>,
    pub paid_43_at: Option<Timestamp>,
    pub sub_status: Option<String>,
    pub sub_current_period_end: Option<Timestamp>,
}

/// Prior entitlement state, as read before applying an event. Stale
/// reads are fine: the computed target is clamped by the lattice and
/// the paid floor, and the merge-upsert only overwrites touched
/// fields.
#[derive(Debug, Clone, Copy)]
pub struct PriorEntitlement {
    pub user_state: UserState,
    /// True when `paid_43_at` is set (permanent purchase floor).
    pub has_paid: bool,
}

const DEFAULT_PRIOR: PriorEntitlement = PriorEntitlement {
    user_state: UserState::FreeEmail,
    has_paid: false,
};

fn as_nonempty_str(value: &Value) -> Option<&str> {
    value.as_str().filter(|s| !s.is_empty())
}

fn str_field<'a>(object: &'a Value, key: &str) -> Option<&'a str> {
    object.get(key).and_then(as_nonempty_str)
}

fn metadata_user_id(object: &Value) -> Option<Uuid> {
    object
        .get("metadata")
        .and_then(|m| m.get("user_id"))
        .and_then(as_nonempty_str)
        .and_then(|s| Uuid::parse_str(s).ok())
}

/// Invoices carry the subscription metadata one level down.
fn invoice_user_id(object: &Value) -> Option<Uuid> {
    object
        .pointer("/parent/subscription_details/metadata/user_id")
        .and_then(as_nonempty_str)
        .and_then(|s| Uuid::parse_str(s).ok())
}

fn timestamp_from_unix(value: &Value) -> Option<Timestamp> {
    value
        .as_i64()
        .and_then(|secs| chrono::DateTime::from_timestamp(secs, 0))
}

/// The latest `current_period_end` across subscription items, falling
/// back to the top-level field on older payload shapes.
fn subscription_period_end(object: &Value) -> Option<Timestamp> {
    let from_items = object
        .pointer("/items/data")
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(|item| item.get("current_period_end"))
                .filter_map(timestamp_from_unix)
                .max()
        })
        .unwrap_or(None);

    from_items.or_else(|| {
        object
            .get("current_period_end")
            .and_then(timestamp_from_unix)
    })
}

/// Extract how this event identifies its user.
pub fn user_reference(event: &ProviderEvent) -> UserReference {
    let object = &event.data.object;
    let customer_id = str_field(object, "customer").map(str::to_string);

    let user_id = match event.event_type.as_str() {
        EVENT_CHECKOUT_COMPLETED => metadata_user_id(object).or_else(|| {
            str_field(object, "client_reference_id")
                .and_then(|s| Uuid::parse_str(s).ok())
        }),
        EVENT_INVOICE_PAID | EVENT_INVOICE_PAYMENT_FAILED => invoice_user_id(object),
        _ => metadata_user_id(object),
    };

    UserReference {
        user_id,
        customer_id,
    }
}

/// Map a provider subscription status onto an abstract entitlement
/// event.
pub fn subscription_status_event(status: &str) -> EntitlementEvent {
    match status {
        "active" | "trialing" => EntitlementEvent::SubscriptionActivated,
        "past_due" | "unpaid" | "incomplete" => EntitlementEvent::PaymentFailed,
        // `canceled` and anything unrecognized degrade to canceled.
        _ => EntitlementEvent::SubscriptionCanceled,
    }
}

/// Compute the entitlement write for an event.
///
/// Returns `Ok(None)` for event types the policy ignores (the caller
/// still ledgers them as processed so provider retries stop). An
/// [`BillingError::IllegalTransition`] marks the ledger row failed,
/// which keeps it retryable; out-of-order deliveries heal when the
/// provider redelivers after the prerequisite event lands.
pub fn plan_update(
    event: &ProviderEvent,
    prior: Option<&PriorEntitlement>,
    now: Timestamp,
) -> Result<Option<EntitlementUpdate>, BillingError> {
    let prior = prior.copied().unwrap_or(DEFAULT_PRIOR);
    let object = &event.data.object;
    let customer_id = str_field(object, "customer").map(str::to_string);

    let update = match event.event_type.as_str() {
        EVENT_CHECKOUT_COMPLETED => {
            let mode = str_field(object, "mode")
                .or_else(|| object.pointer("/metadata/checkout_mode").and_then(as_nonempty_str))
                .unwrap_or("payment");

            if mode == "subscription" {
                // Subscription checkouts only attach the customer id;
                // the subscription events carry the state change.
                EntitlementUpdate {
                    user_state: prior.user_state,
                    stripe_customer_id: customer_id,
                    paid_43_at: None,
                    sub_status: None,
                    sub_current_period_end: None,
                }
            } else {
                let next = apply_event(prior.user_state, EntitlementEvent::OneTimePurchase)?;
                EntitlementUpdate {
                    user_state: next,
                    stripe_customer_id: customer_id,
                    paid_43_at: Some(now),
                    sub_status: None,
                    sub_current_period_end: None,
                }
            }
        }

        EVENT_SUBSCRIPTION_CREATED | EVENT_SUBSCRIPTION_UPDATED => {
            let status = str_field(object, "status").unwrap_or("canceled");
            let next = apply_event(prior.user_state, subscription_status_event(status))?;
            EntitlementUpdate {
                user_state: with_paid_floor(next, prior.has_paid),
                stripe_customer_id: customer_id,
                paid_43_at: None,
                sub_status: Some(status.to_string()),
                sub_current_period_end: subscription_period_end(object),
            }
        }

        EVENT_SUBSCRIPTION_DELETED => {
            let next = apply_event(prior.user_state, EntitlementEvent::SubscriptionCanceled)?;
            EntitlementUpdate {
                user_state: with_paid_floor(next, prior.has_paid),
                stripe_customer_id: customer_id,
                paid_43_at: None,
                sub_status: Some("canceled".to_string()),
                sub_current_period_end: subscription_period_end(object),
            }
        }

        EVENT_INVOICE_PAID => {
            let next = apply_event(prior.user_state, EntitlementEvent::SubscriptionActivated)?;
            EntitlementUpdate {
                user_state: next,
                stripe_customer_id: customer_id,
                paid_43_at: None,
                sub_status: Some("active".to_string()),
                sub_current_period_end: None,
            }
        }

        EVENT_INVOICE_PAYMENT_FAILED => {
            let next = apply_event(prior.user_state, EntitlementEvent::PaymentFailed)?;
            EntitlementUpdate {
                user_state: with_paid_floor(next, prior.has_paid),
                stripe_customer_id: customer_id,
                paid_43_at: None,
                sub_status: Some("past_due".to_string()),
                sub_current_period_end: None,
            }
        }

        _ => return Ok(None),
    };

    Ok(Some(update))
}

/// SHA-256 hex digest of a raw webhook body. Stored on the ledger row
/// to detect an event id being reused with different contents.
pub fn payload_hash(body: &[u8]) -> String {
    hex::encode(Sha256::digest(body))
}
