//! Advisory inactivity reminder.
//!
//! Drives a UI nudge only. There is no sent flag: the value is recomputed
//! on every poll.

use crate::EntitlementState;
use chrono::{DateTime, Duration, Utc};

/// Hours without interaction before a trialing user is nudged.
pub const REMINDER_IDLE_HOURS: i64 = 24;

/// Whether a trialing user should see a "pick up where you left off" prompt.
pub fn needs_activity_reminder(
    entitlement: &EntitlementState,
    last_interaction: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
) -> bool {
    if !entitlement.is_trialing {
        return false;
    }
    match last_interaction {
        None => true,
        Some(at) => now - at >= Duration::hours(REMINDER_IDLE_HOURS),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 4, 4, 18, 0, 0).unwrap()
    }

    fn trialing() -> EntitlementState {
        EntitlementState {
            days_since_start: 3,
            days_remaining: 4,
            has_access: true,
            is_trialing: true,
            is_active: false,
            is_canceled: false,
            trial_expired: false,
        }
    }

    #[test]
    fn never_interacted_needs_reminder() {
        assert!(needs_activity_reminder(&trialing(), None, now()));
    }

    #[test]
    fn idle_threshold_is_inclusive() {
        let state = trialing();
        assert!(!needs_activity_reminder(&state, Some(now() - Duration::hours(23)), now()));
        assert!(needs_activity_reminder(&state, Some(now() - Duration::hours(24)), now()));
    }

    #[test]
    fn outside_trial_window_never_reminds() {
        let state = EntitlementState {
            is_trialing: false,
            is_active: true,
            ..trialing()
        };
        assert!(!needs_activity_reminder(&state, None, now()));
        assert!(!needs_activity_reminder(&EntitlementState::no_access(), None, now()));
    }
}
