//! Database model types.

use chrono::{DateTime, Utc};
use entitlement_core::{EntitlementInput, SubscriptionStatus, TriggerId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// User record as seen by the lifecycle engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub email: String,
    pub display_name: Option<String>,
    pub trial_start_date: Option<DateTime<Utc>>,
    pub subscription_start_date: Option<DateTime<Utc>>,
    pub subscription_status: SubscriptionStatus,
    pub trial_ended: bool,
    pub unlocked_modules: BTreeSet<u32>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    /// Facts the entitlement calculator reads.
    pub fn entitlement_input(&self) -> EntitlementInput {
        EntitlementInput {
            trial_start_date: self.trial_start_date,
            subscription_start_date: self.subscription_start_date,
            account_created_at: Some(self.created_at),
            subscription_status: self.subscription_status,
        }
    }
}

/// Input for creating a user at intake.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub id: String,
    pub email: String,
    pub display_name: Option<String>,
    pub trial_start_date: Option<DateTime<Utc>>,
    pub subscription_status: SubscriptionStatus,
}

/// Persisted state of one (user, trigger) sent flag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationFlag {
    pub user_id: String,
    pub trigger_id: TriggerId,
    pub sent: bool,
    pub claimed_at: Option<DateTime<Utc>>,
    /// Set once the provider accepted the message; the flag is final afterwards.
    pub delivered_at: Option<DateTime<Utc>>,
}
