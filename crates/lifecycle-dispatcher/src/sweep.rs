//! Paced batch sweep over every trialing and trial-ended user.

use crate::{DeliveryOutcome, DispatchAttempt, DispatchResult, Dispatcher, LifecycleStore};
use chrono::{DateTime, Utc};
use entitlement_core::{compute_entitlement, evaluate_triggers, TriggerContext, TriggerId};
use onboarding_database::User;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// One failed (user, trigger) within a sweep.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SweepFailure {
    pub user_id: String,
    /// None when the failure was not tied to a trigger.
    pub trigger: Option<TriggerId>,
    pub error: String,
}

/// Summary of one sweep.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SweepReport {
    /// Users examined.
    pub scanned: usize,
    /// Messages the provider accepted.
    pub sent_count: usize,
    /// Due triggers whose flag was already claimed.
    pub skipped: usize,
    /// Due triggers whose claim hit a store error. Nothing was sent.
    pub claim_errors: usize,
    pub errors: Vec<SweepFailure>,
}

/// Re-evaluates the registry for every candidate and sends what is due,
/// one message at a time with a fixed pause between sends.
pub struct BatchDispatcher {
    store: Arc<dyn LifecycleStore>,
    dispatcher: Dispatcher,
    send_interval: Duration,
}

impl BatchDispatcher {
    pub fn new(store: Arc<dyn LifecycleStore>, dispatcher: Dispatcher, send_interval: Duration) -> Self {
        Self {
            store,
            dispatcher,
            send_interval,
        }
    }

    /// Run one sweep. Only failing to list candidates aborts it; every
    /// per-user failure is recorded in the report.
    pub async fn run_sweep(&self, now: DateTime<Utc>) -> DispatchResult<SweepReport> {
        let users: Vec<User> = self
            .store
            .list_sweep_candidates()
            .await?
            .into_iter()
            .filter(|user| user.subscription_status.is_sweep_candidate())
            .collect();
        info!(candidates = users.len(), "Starting lifecycle sweep");

        let mut report = SweepReport::default();
        let mut sends_started = 0usize;
        for user in &users {
            report.scanned += 1;
            self.sweep_user(user, now, &mut report, &mut sends_started).await;
        }

        if report.claim_errors > 0 {
            warn!(
                claim_errors = report.claim_errors,
                "Claims failed on store errors during sweep"
            );
        }
        info!(
            scanned = report.scanned,
            sent = report.sent_count,
            skipped = report.skipped,
            claim_errors = report.claim_errors,
            errors = report.errors.len(),
            "Lifecycle sweep finished"
        );
        Ok(report)
    }

    async fn sweep_user(
        &self,
        user: &User,
        now: DateTime<Utc>,
        report: &mut SweepReport,
        sends_started: &mut usize,
    ) {
        let state = compute_entitlement(&user.entitlement_input(), now);

        if state.trial_expired && !user.trial_ended {
            if let Err(e) = self.store.mark_trial_ended(&user.id, now).await {
                warn!(user_id = %user.id, error = %e, "Failed to mark trial ended");
                report.errors.push(SweepFailure {
                    user_id: user.id.clone(),
                    trigger: None,
                    error: e.to_string(),
                });
            }
        }

        let ctx = TriggerContext {
            entitlement: &state,
            unlocked_modules: &user.unlocked_modules,
        };

        for rule in evaluate_triggers(&ctx) {
            // Pause before every send except the sweep's first. The pause runs
            // after the claim, inside the delivery task.
            let pause = if *sends_started > 0 {
                self.send_interval
            } else {
                Duration::ZERO
            };

            let pending = match self.dispatcher.dispatch_paced(user, rule, &state, now, pause).await {
                DispatchAttempt::Started(pending) => pending,
                DispatchAttempt::Taken => {
                    report.skipped += 1;
                    continue;
                }
                DispatchAttempt::ClaimFailed => {
                    report.claim_errors += 1;
                    continue;
                }
            };
            *sends_started += 1;

            match pending.wait().await {
                DeliveryOutcome::Delivered => {
                    debug!(user_id = %user.id, trigger = %rule.id, "Sweep send delivered");
                    report.sent_count += 1;
                }
                DeliveryOutcome::Failed { error } => {
                    report.errors.push(SweepFailure {
                        user_id: user.id.clone(),
                        trigger: Some(rule.id),
                        error,
                    });
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{IdempotencyGate, RecordingNotifier, SqliteStore};
    use chrono::{Duration as ChronoDuration, TimeZone};
    use entitlement_core::SubscriptionStatus;
    use onboarding_database::{AsyncDatabase, NewUser};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 10, 12, 0, 0).unwrap()
    }

    async fn setup(interval: Duration) -> (SqliteStore, Arc<RecordingNotifier>, BatchDispatcher) {
        let db = AsyncDatabase::open_in_memory().await.unwrap();
        let store = SqliteStore::new(db);
        let notifier = Arc::new(RecordingNotifier::new());
        let shared = Arc::new(store.clone());
        let dispatcher = Dispatcher::new(IdempotencyGate::new(shared.clone()), notifier.clone());
        (store, notifier, BatchDispatcher::new(shared, dispatcher, interval))
    }

    async fn add_user(store: &SqliteStore, id: &str, days_ago: i64, status: SubscriptionStatus) {
        store
            .insert_user(
                NewUser {
                    id: id.to_string(),
                    email: format!("{id}@example.com"),
                    display_name: None,
                    trial_start_date: Some(now() - ChronoDuration::days(days_ago)),
                    subscription_status: status,
                },
                now() - ChronoDuration::days(days_ago),
            )
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn sweep_sends_due_triggers_once() {
        let (store, notifier, sweeper) = setup(Duration::ZERO).await;
        add_user(&store, "u1", 3, SubscriptionStatus::Trialing).await;
        add_user(&store, "u2", 0, SubscriptionStatus::Active).await;

        let report = sweeper.run_sweep(now()).await.unwrap();
        assert_eq!(report.scanned, 1);
        assert_eq!(report.sent_count, 2);
        assert!(report.errors.is_empty());
        assert_eq!(notifier.sent_count("u1", TriggerId::Welcome), 1);
        assert_eq!(notifier.sent_count("u1", TriggerId::Day3), 1);

        let rerun = sweeper.run_sweep(now()).await.unwrap();
        assert_eq!(rerun.sent_count, 0);
        assert_eq!(rerun.skipped, 2);
        assert_eq!(notifier.sent().len(), 2);
    }

    #[tokio::test]
    async fn sweep_marks_expired_trials() {
        let (store, notifier, sweeper) = setup(Duration::ZERO).await;
        add_user(&store, "u1", 8, SubscriptionStatus::Trialing).await;

        let report = sweeper.run_sweep(now()).await.unwrap();
        assert_eq!(report.sent_count, 3);
        assert_eq!(notifier.sent_count("u1", TriggerId::Day7), 1);
        assert_eq!(notifier.sent_count("u1", TriggerId::Day8), 1);

        let user = store.get_user("u1").await.unwrap().unwrap();
        assert!(user.trial_ended);
        assert_eq!(user.subscription_status, SubscriptionStatus::TrialEnded);

        // Still a candidate after the status change.
        let rerun = sweeper.run_sweep(now() + ChronoDuration::days(1)).await.unwrap();
        assert_eq!(rerun.scanned, 1);
        assert_eq!(notifier.sent_count("u1", TriggerId::Day9), 1);
    }

    #[tokio::test]
    async fn sweep_isolates_failing_user() {
        let (store, notifier, sweeper) = setup(Duration::ZERO).await;
        for id in ["u1", "u2", "u3"] {
            add_user(&store, id, 0, SubscriptionStatus::Trialing).await;
        }
        notifier.fail_for_user("u2");

        let report = sweeper.run_sweep(now()).await.unwrap();
        assert_eq!(report.scanned, 3);
        assert_eq!(report.sent_count, 2);
        assert_eq!(
            report.errors,
            vec![SweepFailure {
                user_id: "u2".to_string(),
                trigger: Some(TriggerId::Welcome),
                error: "Provider error: 503 - injected failure".to_string(),
            }]
        );

        notifier.recover_user("u2");
        let retry = sweeper.run_sweep(now()).await.unwrap();
        assert_eq!(retry.sent_count, 1);
        assert_eq!(notifier.sent_count("u2", TriggerId::Welcome), 1);
    }

    #[tokio::test]
    async fn cancelled_sweep_still_delivers_claimed_send() {
        let (store, notifier, sweeper) = setup(Duration::from_millis(600)).await;
        add_user(&store, "u1", 2, SubscriptionStatus::Trialing).await;

        // Welcome goes out at once; day2 is claimed and waiting out the pause
        // when the sweep is cancelled.
        let cancelled =
            tokio::time::timeout(Duration::from_millis(200), sweeper.run_sweep(now())).await;
        assert!(cancelled.is_err());

        let mut delivered = false;
        for _ in 0..100 {
            let flag = store.notification_flag("u1", TriggerId::Day2).await.unwrap();
            if flag.and_then(|f| f.delivered_at).is_some() {
                delivered = true;
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        assert!(delivered);
        assert_eq!(notifier.sent_count("u1", TriggerId::Welcome), 1);
        assert_eq!(notifier.sent_count("u1", TriggerId::Day2), 1);

        let rerun = sweeper.run_sweep(now()).await.unwrap();
        assert_eq!(rerun.sent_count, 0);
        assert_eq!(rerun.skipped, 2);
    }

    #[tokio::test]
    async fn sweep_paces_consecutive_sends() {
        let interval = Duration::from_millis(40);
        let (store, notifier, sweeper) = setup(interval).await;
        for id in ["u1", "u2", "u3", "u4"] {
            add_user(&store, id, 0, SubscriptionStatus::Trialing).await;
        }

        let started = std::time::Instant::now();
        let report = sweeper.run_sweep(now()).await.unwrap();
        let elapsed = started.elapsed();

        assert_eq!(report.sent_count, 4);
        assert_eq!(notifier.sent().len(), 4);
        assert!(elapsed >= interval * 3, "elapsed {elapsed:?}");
    }
}
