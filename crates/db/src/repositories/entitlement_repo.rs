//! Repository for the `entitlements` table.

use lumen_core::billing::EntitlementUpdate;
use lumen_core::entitlement::UserState;
use sqlx::PgPool;
use uuid::Uuid;

use crate::models::Entitlement;

const COLUMNS: &str = "\
    user_id, user_state, stripe_customer_id, paid_43_at, sub_status, \
    sub_current_period_end, created_at, updated_at";

/// Provides read and merge-upsert operations for entitlements.
pub struct EntitlementRepo;

impl EntitlementRepo {
    /// Find a user's entitlement row.
    pub async fn find_by_user(
        pool: &PgPool,
        user_id: Uuid,
    ) -> Result<Option<Entitlement>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM entitlements WHERE user_id = $1");
        sqlx::query_as::<_, Entitlement>(&query)
            .bind(user_id)
            .fetch_optional(pool)
            .await
    }

    /// Resolve a billing customer id to its entitlement row.
    pub async fn find_by_customer(
        pool: &PgPool,
        customer_id: &str,
    ) -> Result<Option<Entitlement>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM entitlements WHERE stripe_customer_id = $1");
        sqlx::query_as::<_, Entitlement>(&query)
            .bind(customer_id)
            .fetch_optional(pool)
            .await
    }

    /// Ensure a row exists for a user, bootstrapping at `free_email`.
    ///
    /// A lost race against a concurrent bootstrap or webhook write is
    /// fine: the conflict arm leaves the existing row untouched and
    /// returns it.
    pub async fn ensure_exists(pool: &PgPool, user_id: Uuid) -> Result<Entitlement, sqlx::Error> {
        let query = format!(
            "INSERT INTO entitlements (user_id, user_state) \
             VALUES ($1, $2) \
             ON CONFLICT (user_id) DO UPDATE SET user_id = EXCLUDED.user_id \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Entitlement>(&query)
            .bind(user_id)
            .bind(UserState::FreeEmail.as_str())
            .fetch_one(pool)
            .await
    }

    /// Merge a billing update into a user's row.
    ///
    /// `user_state` is always overwritten with the computed target;
    /// every other field is only overwritten when the update carries a
    /// value, so concurrent events touching different fields converge.
    /// `updated_at` is monotonic under clock skew.
    pub async fn apply_update(
        pool: &PgPool,
        user_id: Uuid,
        update: &EntitlementUpdate,
    ) -> Result<Entitlement, sqlx::Error> {
        let query = format!(
            "INSERT INTO entitlements \
                 (user_id, user_state, stripe_customer_id, paid_43_at, \
                  sub_status, sub_current_period_end) \
             VALUES ($1, $2, $3, $4, $5, $6) \
             ON CONFLICT (user_id) DO UPDATE SET \
                 user_state = EXCLUDED.user_state, \
                 stripe_customer_id = \
                     COALESCE(EXCLUDED.stripe_customer_id, entitlements.stripe_customer_id), \
                 paid_43_at = COALESCE(EXCLUDED.paid_43_at, entitlements.paid_43_at), \
                 sub_status = COALESCE(EXCLUDED.sub_status, entitlements.sub_status), \
                 sub_current_period_end = \
                     COALESCE(EXCLUDED.sub_current_period_end, entitlements.sub_current_period_end), \
                 updated_at = GREATEST(NOW(), entitlements.updated_at) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Entitlement>(&query)
            .bind(user_id)
            .bind(update.user_state.as_str())
            .bind(update.stripe_customer_id.as_deref())
            .bind(update.paid_43_at)
            .bind(update.sub_status.as_deref())
            .bind(update.sub_current_period_end)
            .fetch_one(pool)
            .await
    }
}
