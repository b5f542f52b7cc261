//! Entitlement derivation.
//!
//! Access is never stored. It is recomputed from `now` and the persisted
//! start dates on every request so it cannot drift.

use crate::SubscriptionStatus;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Length of the free trial.
pub const TRIAL_LENGTH_DAYS: i64 = 7;

/// Persisted facts the calculator needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntitlementInput {
    pub trial_start_date: Option<DateTime<Utc>>,
    pub subscription_start_date: Option<DateTime<Utc>>,
    pub account_created_at: Option<DateTime<Utc>>,
    pub subscription_status: SubscriptionStatus,
}

/// Derived access state for a user at a point in time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntitlementState {
    pub days_since_start: i64,
    pub days_remaining: i64,
    pub has_access: bool,
    pub is_trialing: bool,
    pub is_active: bool,
    pub is_canceled: bool,
    pub trial_expired: bool,
}

impl EntitlementState {
    /// Sentinel for a user with no usable start date.
    pub fn no_access() -> Self {
        Self {
            days_since_start: 0,
            days_remaining: 0,
            has_access: false,
            is_trialing: false,
            is_active: false,
            is_canceled: false,
            trial_expired: true,
        }
    }
}

/// Compute the entitlement state for `input` at `now`.
///
/// A start date in the future (clock skew) clamps to day zero.
pub fn compute_entitlement(input: &EntitlementInput, now: DateTime<Utc>) -> EntitlementState {
    let effective_start = match input
        .trial_start_date
        .or(input.subscription_start_date)
        .or(input.account_created_at)
    {
        Some(start) => start,
        None => return EntitlementState::no_access(),
    };

    let days_since_start = (now - effective_start).num_days().max(0);
    let days_remaining = (TRIAL_LENGTH_DAYS - days_since_start).max(0);

    let is_active = input.subscription_status == SubscriptionStatus::Active;
    let is_canceled = input.subscription_status == SubscriptionStatus::Canceled;
    let trial_expired = days_since_start >= TRIAL_LENGTH_DAYS && !is_active;
    let has_access = is_active || days_remaining > 0;
    let is_trialing = !is_active && !is_canceled && days_remaining > 0;

    EntitlementState {
        days_since_start,
        days_remaining,
        has_access,
        is_trialing,
        is_active,
        is_canceled,
        trial_expired,
    }
}
