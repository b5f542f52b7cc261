//! Content module unlock resolution.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Module every user gets from intake.
pub const BASE_MODULE: u32 = 1;
/// Module unlocked after a month of paid subscription.
pub const SECOND_MODULE: u32 = 2;
/// Days of subscription before [`SECOND_MODULE`] unlocks.
pub const MODULE_TWO_UNLOCK_DAYS: i64 = 30;

/// Outcome of comparing the modules a user should have with what is stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModuleResolution {
    /// Stored set merged with the new grants.
    pub unlocked_modules: BTreeSet<u32>,
    /// Grants not yet persisted. Empty means nothing to write.
    pub newly_unlocked: BTreeSet<u32>,
}

/// Modules that should be unlocked at `now`.
pub fn should_be_unlocked(
    subscription_start_date: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
) -> BTreeSet<u32> {
    let mut modules = BTreeSet::from([BASE_MODULE]);
    if let Some(start) = subscription_start_date {
        if now - start >= Duration::days(MODULE_TWO_UNLOCK_DAYS) {
            modules.insert(SECOND_MODULE);
        }
    }
    modules
}

/// Merge the modules that should be unlocked into the stored set.
///
/// The result always contains every module in `current`: a missing
/// subscription start never revokes anything.
pub fn resolve_modules(
    subscription_start_date: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
    current: &BTreeSet<u32>,
) -> ModuleResolution {
    let newly_unlocked: BTreeSet<u32> = should_be_unlocked(subscription_start_date, now)
        .difference(current)
        .copied()
        .collect();

    let unlocked_modules = current.union(&newly_unlocked).copied().collect();

    ModuleResolution {
        unlocked_modules,
        newly_unlocked,
    }
}
