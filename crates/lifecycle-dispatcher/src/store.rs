//! Persistence collaborators and their SQLite implementation.

use crate::StoreResult;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use entitlement_core::{SubscriptionStatus, TriggerId};
use onboarding_database::{queries, AsyncDatabase, NewUser, NotificationFlag, User};
use std::collections::BTreeSet;

/// User record store with the one atomic primitive the gate needs.
#[async_trait]
pub trait LifecycleStore: Send + Sync {
    async fn get_user(&self, user_id: &str) -> StoreResult<Option<User>>;

    /// Users whose status is trialing or trial-ended.
    async fn list_sweep_candidates(&self) -> StoreResult<Vec<User>>;

    /// Compare-and-set the (user, trigger) flag from false to true.
    /// Returns true only for the caller whose update changed the row.
    async fn claim_flag(&self, user_id: &str, trigger: TriggerId, now: DateTime<Utc>) -> StoreResult<bool>;

    /// Reset an unconfirmed claim so a later claim can retry.
    async fn release_flag(&self, user_id: &str, trigger: TriggerId, now: DateTime<Utc>) -> StoreResult<bool>;

    /// Record that the provider accepted the message.
    async fn confirm_flag(&self, user_id: &str, trigger: TriggerId, now: DateTime<Utc>) -> StoreResult<bool>;

    /// Append to the user's unlocked module set.
    async fn add_unlocked_modules(
        &self,
        user_id: &str,
        modules: &BTreeSet<u32>,
        now: DateTime<Utc>,
    ) -> StoreResult<usize>;

    /// Set the trial-ended marker; true if this call set it.
    async fn mark_trial_ended(&self, user_id: &str, now: DateTime<Utc>) -> StoreResult<bool>;
}

/// Source of the last time a user interacted with the product.
#[async_trait]
pub trait ActivityLog: Send + Sync {
    async fn last_interaction(&self, user_id: &str) -> StoreResult<Option<DateTime<Utc>>>;

    async fn record_interaction(&self, user_id: &str, at: DateTime<Utc>) -> StoreResult<()>;
}

/// Both collaborators backed by the SQLite executor.
#[derive(Clone)]
pub struct SqliteStore {
    db: AsyncDatabase,
}

impl SqliteStore {
    pub fn new(db: AsyncDatabase) -> Self {
        Self { db }
    }

    /// Create the user row at intake.
    pub async fn insert_user(&self, user: NewUser, now: DateTime<Utc>) -> StoreResult<User> {
        Ok(self.db.call(move |conn| queries::insert_user(conn, &user, now)).await?)
    }

    /// Apply a subscription change from the payment integration.
    pub async fn set_subscription(
        &self,
        user_id: &str,
        status: SubscriptionStatus,
        subscription_start_date: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> StoreResult<bool> {
        let user_id = user_id.to_string();
        Ok(self
            .db
            .call(move |conn| {
                queries::set_subscription(conn, &user_id, status, subscription_start_date, now)
            })
            .await?)
    }

    pub async fn notification_flag(
        &self,
        user_id: &str,
        trigger: TriggerId,
    ) -> StoreResult<Option<NotificationFlag>> {
        let user_id = user_id.to_string();
        Ok(self
            .db
            .call(move |conn| queries::get_notification_flag(conn, &user_id, trigger))
            .await?)
    }
}

#[async_trait]
impl LifecycleStore for SqliteStore {
    async fn get_user(&self, user_id: &str) -> StoreResult<Option<User>> {
        let user_id = user_id.to_string();
        Ok(self.db.call(move |conn| queries::get_user(conn, &user_id)).await?)
    }

    async fn list_sweep_candidates(&self) -> StoreResult<Vec<User>> {
        Ok(self.db.call(queries::list_sweep_candidates).await?)
    }

    async fn claim_flag(&self, user_id: &str, trigger: TriggerId, now: DateTime<Utc>) -> StoreResult<bool> {
        let user_id = user_id.to_string();
        Ok(self
            .db
            .call(move |conn| queries::claim_notification_flag(conn, &user_id, trigger, now))
            .await?)
    }

    async fn release_flag(&self, user_id: &str, trigger: TriggerId, now: DateTime<Utc>) -> StoreResult<bool> {
        let user_id = user_id.to_string();
        Ok(self
            .db
            .call(move |conn| queries::release_notification_flag(conn, &user_id, trigger, now))
            .await?)
    }

    async fn confirm_flag(&self, user_id: &str, trigger: TriggerId, now: DateTime<Utc>) -> StoreResult<bool> {
        let user_id = user_id.to_string();
        Ok(self
            .db
            .call(move |conn| queries::confirm_notification_flag(conn, &user_id, trigger, now))
            .await?)
    }

    async fn add_unlocked_modules(
        &self,
        user_id: &str,
        modules: &BTreeSet<u32>,
        now: DateTime<Utc>,
    ) -> StoreResult<usize> {
        let user_id = user_id.to_string();
        let modules = modules.clone();
        Ok(self
            .db
            .call(move |conn| queries::add_unlocked_modules(conn, &user_id, &modules, now))
            .await?)
    }

    async fn mark_trial_ended(&self, user_id: &str, now: DateTime<Utc>) -> StoreResult<bool> {
        let user_id = user_id.to_string();
        Ok(self
            .db
            .call(move |conn| queries::mark_trial_ended(conn, &user_id, now))
            .await?)
    }
}

#[async_trait]
impl ActivityLog for SqliteStore {
    async fn last_interaction(&self, user_id: &str) -> StoreResult<Option<DateTime<Utc>>> {
        let user_id = user_id.to_string();
        Ok(self
            .db
            .call(move |conn| queries::last_activity_at(conn, &user_id))
            .await?)
    }

    async fn record_interaction(&self, user_id: &str, at: DateTime<Utc>) -> StoreResult<()> {
        let user_id = user_id.to_string();
        Ok(self
            .db
            .call(move |conn| queries::record_activity(conn, &user_id, at))
            .await?)
    }
}
