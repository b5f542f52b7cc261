//! Release-and-retry after failed sends, and store outages.

use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};
use entitlement_core::{SubscriptionStatus, TriggerId};
use lifecycle_dispatcher::{
    BatchDispatcher, DeliveryOutcome, DispatchError, Dispatcher, IdempotencyGate, LifecycleEngine,
    LifecycleStore, RecordingNotifier, SqliteStore, StoreError, StoreResult,
};
use onboarding_database::{AsyncDatabase, NewUser, User};
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 4, 1, 8, 0, 0).unwrap()
}

/// Delegates to SQLite until switched off, then every call fails.
struct FlakyStore {
    inner: SqliteStore,
    down: AtomicBool,
    claims_down: AtomicBool,
}

impl FlakyStore {
    fn new(inner: SqliteStore) -> Self {
        Self {
            inner,
            down: AtomicBool::new(false),
            claims_down: AtomicBool::new(false),
        }
    }

    fn check(&self) -> StoreResult<()> {
        if self.down.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("store offline".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl LifecycleStore for FlakyStore {
    async fn get_user(&self, user_id: &str) -> StoreResult<Option<User>> {
        self.check()?;
        self.inner.get_user(user_id).await
    }

    async fn list_sweep_candidates(&self) -> StoreResult<Vec<User>> {
        self.check()?;
        self.inner.list_sweep_candidates().await
    }

    async fn claim_flag(&self, user_id: &str, trigger: TriggerId, now: DateTime<Utc>) -> StoreResult<bool> {
        self.check()?;
        if self.claims_down.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("flag table locked".to_string()));
        }
        self.inner.claim_flag(user_id, trigger, now).await
    }

    async fn release_flag(&self, user_id: &str, trigger: TriggerId, now: DateTime<Utc>) -> StoreResult<bool> {
        self.check()?;
        self.inner.release_flag(user_id, trigger, now).await
    }

    async fn confirm_flag(&self, user_id: &str, trigger: TriggerId, now: DateTime<Utc>) -> StoreResult<bool> {
        self.check()?;
        self.inner.confirm_flag(user_id, trigger, now).await
    }

    async fn add_unlocked_modules(
        &self,
        user_id: &str,
        modules: &BTreeSet<u32>,
        now: DateTime<Utc>,
    ) -> StoreResult<usize> {
        self.check()?;
        self.inner.add_unlocked_modules(user_id, modules, now).await
    }

    async fn mark_trial_ended(&self, user_id: &str, now: DateTime<Utc>) -> StoreResult<bool> {
        self.check()?;
        self.inner.mark_trial_ended(user_id, now).await
    }
}

struct Harness {
    sqlite: SqliteStore,
    store: Arc<FlakyStore>,
    notifier: Arc<RecordingNotifier>,
    engine: LifecycleEngine,
    sweeper: BatchDispatcher,
}

async fn harness() -> Harness {
    let sqlite = SqliteStore::new(AsyncDatabase::open_in_memory().await.unwrap());
    let store = Arc::new(FlakyStore::new(sqlite.clone()));
    let notifier = Arc::new(RecordingNotifier::new());
    let dispatcher = Dispatcher::new(IdempotencyGate::new(store.clone()), notifier.clone());
    let engine = LifecycleEngine::new(store.clone(), Arc::new(sqlite.clone()), dispatcher.clone());
    let sweeper = BatchDispatcher::new(store.clone(), dispatcher, std::time::Duration::ZERO);
    Harness {
        sqlite,
        store,
        notifier,
        engine,
        sweeper,
    }
}

async fn add_trialing(store: &SqliteStore, id: &str, days_ago: i64) {
    let start = now() - Duration::days(days_ago);
    store
        .insert_user(
            NewUser {
                id: id.to_string(),
                email: format!("{id}@example.com"),
                display_name: None,
                trial_start_date: Some(start),
                subscription_status: SubscriptionStatus::Trialing,
            },
            start,
        )
        .await
        .unwrap();
}

#[tokio::test]
async fn failed_send_is_released_and_retried() {
    let h = harness().await;
    add_trialing(&h.sqlite, "u1", 0).await;
    h.notifier.fail_next(1);

    let report = h.engine.query_entitlement("u1", now()).await.unwrap();
    let (_, outcomes) = report.settle().await;
    assert!(matches!(outcomes[0], (TriggerId::Welcome, DeliveryOutcome::Failed { .. })));

    let flag = h
        .sqlite
        .notification_flag("u1", TriggerId::Welcome)
        .await
        .unwrap()
        .unwrap();
    assert!(!flag.sent);

    let retry = h.engine.query_entitlement("u1", now()).await.unwrap();
    let (_, outcomes) = retry.settle().await;
    assert_eq!(outcomes, vec![(TriggerId::Welcome, DeliveryOutcome::Delivered)]);
    assert_eq!(h.notifier.attempts(), 2);
    assert_eq!(h.notifier.sent_count("u1", TriggerId::Welcome), 1);
}

#[tokio::test]
async fn claim_outage_sends_nothing_and_query_succeeds() {
    let h = harness().await;
    add_trialing(&h.sqlite, "u1", 2).await;
    h.store.claims_down.store(true, Ordering::SeqCst);

    let report = h.engine.query_entitlement("u1", now()).await.unwrap();
    assert!(report.state.has_access);
    assert!(report.fired().is_empty());
    assert_eq!(h.notifier.attempts(), 0);

    h.store.claims_down.store(false, Ordering::SeqCst);
    let report = h.engine.query_entitlement("u1", now()).await.unwrap();
    assert_eq!(report.fired(), vec![TriggerId::Welcome, TriggerId::Day2]);
}

#[tokio::test]
async fn sweep_counts_claim_outage_apart_from_contention() {
    let h = harness().await;
    add_trialing(&h.sqlite, "a", 2).await;
    add_trialing(&h.sqlite, "b", 0).await;
    h.store.claims_down.store(true, Ordering::SeqCst);

    let outage = h.sweeper.run_sweep(now()).await.unwrap();
    assert_eq!(outage.scanned, 2);
    assert_eq!(outage.sent_count, 0);
    assert_eq!(outage.claim_errors, 3);
    assert_eq!(outage.skipped, 0);
    assert_eq!(h.notifier.attempts(), 0);

    h.store.claims_down.store(false, Ordering::SeqCst);
    let recovered = h.sweeper.run_sweep(now()).await.unwrap();
    assert_eq!(recovered.sent_count, 3);
    assert_eq!(recovered.claim_errors, 0);

    let contended = h.sweeper.run_sweep(now()).await.unwrap();
    assert_eq!(contended.skipped, 3);
    assert_eq!(contended.claim_errors, 0);
}

#[tokio::test]
async fn user_lookup_outage_is_an_error() {
    let h = harness().await;
    add_trialing(&h.sqlite, "u1", 0).await;
    h.store.down.store(true, Ordering::SeqCst);

    let err = h.engine.query_entitlement("u1", now()).await.unwrap_err();
    assert!(matches!(err, DispatchError::Store(StoreError::Unavailable(_))));

    let err = h.sweeper.run_sweep(now()).await.unwrap_err();
    assert!(matches!(err, DispatchError::Store(_)));
}

#[tokio::test]
async fn sweep_reports_one_failing_user_of_many() {
    let h = harness().await;
    for id in ["a", "b", "c", "d", "e"] {
        add_trialing(&h.sqlite, id, 0).await;
    }
    h.notifier.fail_for_user("c");

    let report = h.sweeper.run_sweep(now()).await.unwrap();
    assert_eq!(report.scanned, 5);
    assert_eq!(report.sent_count, 4);
    assert_eq!(report.errors.len(), 1);
    assert_eq!(report.errors[0].user_id, "c");
    assert_eq!(report.errors[0].trigger, Some(TriggerId::Welcome));

    for id in ["a", "b", "d", "e"] {
        assert_eq!(h.notifier.sent_count(id, TriggerId::Welcome), 1);
    }
    let flag = h
        .sqlite
        .notification_flag("c", TriggerId::Welcome)
        .await
        .unwrap()
        .unwrap();
    assert!(!flag.sent);
}

#[tokio::test]
async fn confirmed_flag_survives_late_release() {
    let h = harness().await;
    add_trialing(&h.sqlite, "u1", 0).await;

    let report = h.engine.query_entitlement("u1", now()).await.unwrap();
    report.settle().await;

    assert!(!h.sqlite.release_flag("u1", TriggerId::Welcome, now()).await.unwrap());
    let again = h.engine.query_entitlement("u1", now()).await.unwrap();
    assert!(again.fired().is_empty());
}
