//! Exactly-once claim over persisted (user, trigger) flags.

use crate::LifecycleStore;
use chrono::{DateTime, Utc};
use entitlement_core::TriggerId;
use std::sync::Arc;
use tracing::{debug, error, warn};

/// Result of a claim attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClaimOutcome {
    /// This caller is the single sender.
    Won,
    /// Someone else already holds or delivered the flag.
    Taken,
    /// The store could not answer; treated as not won.
    Failed,
}

impl ClaimOutcome {
    pub fn is_won(self) -> bool {
        self == ClaimOutcome::Won
    }
}

/// Wraps the store's atomic compare-and-set.
///
/// Store errors on claim are reported as [`ClaimOutcome::Failed`] and never
/// as a win. Skipping a message is preferable to sending it twice.
#[derive(Clone)]
pub struct IdempotencyGate {
    store: Arc<dyn LifecycleStore>,
}

impl IdempotencyGate {
    pub fn new(store: Arc<dyn LifecycleStore>) -> Self {
        Self { store }
    }

    /// Try to become the single sender for `(user_id, trigger)`.
    pub async fn claim(&self, user_id: &str, trigger: TriggerId, now: DateTime<Utc>) -> ClaimOutcome {
        match self.store.claim_flag(user_id, trigger, now).await {
            Ok(true) => {
                debug!(user_id = %user_id, trigger = %trigger, "Claimed notification flag");
                ClaimOutcome::Won
            }
            Ok(false) => {
                debug!(user_id = %user_id, trigger = %trigger, "Notification flag already claimed");
                ClaimOutcome::Taken
            }
            Err(e) => {
                error!(
                    user_id = %user_id,
                    trigger = %trigger,
                    error = %e,
                    "Claim failed, skipping send"
                );
                ClaimOutcome::Failed
            }
        }
    }

    /// Undo a claim after a failed send. Confirmed flags are left alone.
    pub async fn release(&self, user_id: &str, trigger: TriggerId, now: DateTime<Utc>) -> bool {
        match self.store.release_flag(user_id, trigger, now).await {
            Ok(released) => {
                if !released {
                    debug!(user_id = %user_id, trigger = %trigger, "Nothing to release");
                }
                released
            }
            Err(e) => {
                warn!(
                    user_id = %user_id,
                    trigger = %trigger,
                    error = %e,
                    "Release failed, flag stays set"
                );
                false
            }
        }
    }

    /// Mark a claimed flag as delivered.
    pub async fn confirm(&self, user_id: &str, trigger: TriggerId, now: DateTime<Utc>) -> bool {
        match self.store.confirm_flag(user_id, trigger, now).await {
            Ok(confirmed) => confirmed,
            Err(e) => {
                warn!(
                    user_id = %user_id,
                    trigger = %trigger,
                    error = %e,
                    "Confirm failed"
                );
                false
            }
        }
    }
}
