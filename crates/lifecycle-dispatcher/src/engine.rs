//! Interactive per-user operations.

use crate::{
    ActivityLog, DeliveryOutcome, DispatchError, DispatchResult, Dispatcher, LifecycleStore,
    PendingDelivery,
};
use chrono::{DateTime, Utc};
use entitlement_core::{
    compute_entitlement, find_rule, needs_activity_reminder, resolve_modules, EntitlementState,
    TriggerContext, TriggerId,
};
use onboarding_database::User;
use serde::Serialize;
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Result of an entitlement query.
#[derive(Debug)]
pub struct EntitlementReport {
    pub state: EntitlementState,
    /// Sends this caller won. Awaiting them is optional.
    pub dispatched: Vec<PendingDelivery>,
}

impl EntitlementReport {
    /// Triggers this caller claimed.
    pub fn fired(&self) -> Vec<TriggerId> {
        self.dispatched.iter().map(|p| p.trigger).collect()
    }

    /// Wait for every dispatched send.
    pub async fn settle(self) -> (EntitlementState, Vec<(TriggerId, DeliveryOutcome)>) {
        let mut outcomes = Vec::with_capacity(self.dispatched.len());
        for pending in self.dispatched {
            let trigger = pending.trigger;
            outcomes.push((trigger, pending.wait().await));
        }
        (self.state, outcomes)
    }
}

/// Result of a module check.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ModuleCheck {
    pub unlocked_modules: BTreeSet<u32>,
    pub newly_unlocked: BTreeSet<u32>,
    #[serde(skip)]
    pub dispatched: Vec<PendingDelivery>,
}

/// Entitlement, module and reminder checks for one user at a time.
#[derive(Clone)]
pub struct LifecycleEngine {
    store: Arc<dyn LifecycleStore>,
    activity: Arc<dyn ActivityLog>,
    dispatcher: Dispatcher,
}

impl LifecycleEngine {
    pub fn new(
        store: Arc<dyn LifecycleStore>,
        activity: Arc<dyn ActivityLog>,
        dispatcher: Dispatcher,
    ) -> Self {
        Self {
            store,
            activity,
            dispatcher,
        }
    }

    async fn load_user(&self, user_id: &str) -> DispatchResult<User> {
        self.store
            .get_user(user_id)
            .await?
            .ok_or_else(|| DispatchError::UserNotFound(user_id.to_string()))
    }

    /// Compute the user's entitlement and fire any lifecycle messages that
    /// are due. Notification failures never fail the query.
    pub async fn query_entitlement(
        &self,
        user_id: &str,
        now: DateTime<Utc>,
    ) -> DispatchResult<EntitlementReport> {
        let user = self.load_user(user_id).await?;
        let state = compute_entitlement(&user.entitlement_input(), now);

        let dispatched = self.dispatcher.fire_due(&user, &state, now).await;

        debug!(
            user_id = %user_id,
            days_since_start = state.days_since_start,
            has_access = state.has_access,
            dispatched = dispatched.len(),
            "Entitlement queried"
        );

        Ok(EntitlementReport { state, dispatched })
    }

    /// Persist any newly due module unlocks and fire the unlock message.
    pub async fn check_modules(&self, user_id: &str, now: DateTime<Utc>) -> DispatchResult<ModuleCheck> {
        let mut user = self.load_user(user_id).await?;
        let resolution = resolve_modules(user.subscription_start_date, now, &user.unlocked_modules);

        if !resolution.newly_unlocked.is_empty() {
            self.store
                .add_unlocked_modules(user_id, &resolution.newly_unlocked, now)
                .await?;
            info!(
                user_id = %user_id,
                modules = ?resolution.newly_unlocked,
                "Unlocked content modules"
            );
        }
        user.unlocked_modules = resolution.unlocked_modules.clone();

        let state = compute_entitlement(&user.entitlement_input(), now);
        let ctx = TriggerContext {
            entitlement: &state,
            unlocked_modules: &user.unlocked_modules,
        };

        let mut dispatched = Vec::new();
        if let Some(rule) = find_rule(TriggerId::ModuleUnlock) {
            if rule.is_due(&ctx) {
                if let Some(pending) = self.dispatcher.dispatch(&user, rule, &state, now).await {
                    dispatched.push(pending);
                }
            }
        }

        Ok(ModuleCheck {
            unlocked_modules: resolution.unlocked_modules,
            newly_unlocked: resolution.newly_unlocked,
            dispatched,
        })
    }

    /// Whether the user should be nudged to come back. Advisory only.
    pub async fn activity_reminder(&self, user_id: &str, now: DateTime<Utc>) -> DispatchResult<bool> {
        let user = self.load_user(user_id).await?;
        let state = compute_entitlement(&user.entitlement_input(), now);

        let last = match self.activity.last_interaction(user_id).await {
            Ok(last) => last,
            Err(e) => {
                warn!(user_id = %user_id, error = %e, "Activity lookup failed, no reminder");
                return Ok(false);
            }
        };

        Ok(needs_activity_reminder(&state, last, now))
    }

    pub async fn record_interaction(&self, user_id: &str, at: DateTime<Utc>) -> DispatchResult<()> {
        self.load_user(user_id).await?;
        self.activity.record_interaction(user_id, at).await?;
        Ok(())
    }
}
