//! Wiring between configuration, storage and the lifecycle engine.

use chrono::{DateTime, Utc};
use entitlement_core::SubscriptionStatus;
use lifecycle_dispatcher::{
    BatchDispatcher, DispatchError, Dispatcher, HttpNotifier, HttpNotifierConfig, IdempotencyGate,
    LifecycleEngine, Notifier, SqliteStore,
};
use onboarding_config_and_utils::{Config, Paths};
use onboarding_database::{AsyncDatabase, NewUser};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{info, warn, Instrument};
use uuid::Uuid;

type AppResult<T> = Result<T, Box<dyn std::error::Error>>;

pub struct App {
    store: SqliteStore,
    engine: LifecycleEngine,
    sweeper: BatchDispatcher,
}

impl App {
    /// Open the database and build the engine around the configured provider.
    pub async fn open(config: &Config, paths: &Paths) -> AppResult<Self> {
        paths.ensure_dirs()?;
        let db = AsyncDatabase::open(&paths.database_file()).await?;

        // Validates the URL before any send is attempted.
        let provider_url = config.provider_url()?;
        if config.notifier.api_key.is_none() {
            warn!("ONBOARDING_NOTIFIER_API_KEY is not set; sends will fail and be retried later");
        }
        let notifier = HttpNotifier::new(HttpNotifierConfig {
            provider_url: provider_url.as_str().trim_end_matches('/').to_string(),
            api_key: config.notifier.api_key.clone(),
            from_address: config.notifier.from_address.clone(),
            timeout_secs: config.notifier.timeout_secs,
        })?;

        Ok(Self::with_notifier(db, Arc::new(notifier), config.send_interval()))
    }

    pub fn with_notifier(
        db: AsyncDatabase,
        notifier: Arc<dyn Notifier>,
        send_interval: std::time::Duration,
    ) -> Self {
        let store = SqliteStore::new(db);
        let shared = Arc::new(store.clone());
        let dispatcher = Dispatcher::new(IdempotencyGate::new(shared.clone()), notifier);
        let engine = LifecycleEngine::new(shared.clone(), shared.clone(), dispatcher.clone());
        let sweeper = BatchDispatcher::new(shared, dispatcher, send_interval);

        Self {
            store,
            engine,
            sweeper,
        }
    }

    pub async fn sweep(&self, now: DateTime<Utc>) -> AppResult<Value> {
        let span = tracing::info_span!("sweep", run_id = %Uuid::new_v4());
        let report = self.sweeper.run_sweep(now).instrument(span).await?;
        Ok(serde_json::to_value(report)?)
    }

    /// Deliveries are awaited so the process does not exit mid-send.
    pub async fn query(&self, user_id: &str, now: DateTime<Utc>) -> AppResult<Value> {
        let report = self.engine.query_entitlement(user_id, now).await?;
        let (state, outcomes) = report.settle().await;

        let dispatched: Vec<Value> = outcomes
            .into_iter()
            .map(|(trigger, outcome)| json!({ "trigger": trigger, "outcome": outcome }))
            .collect();

        Ok(json!({ "userId": user_id, "entitlement": state, "dispatched": dispatched }))
    }

    pub async fn modules(&self, user_id: &str, now: DateTime<Utc>) -> AppResult<Value> {
        let mut check = self.engine.check_modules(user_id, now).await?;

        let mut dispatched = Vec::new();
        for pending in std::mem::take(&mut check.dispatched) {
            let trigger = pending.trigger;
            dispatched.push(json!({ "trigger": trigger, "outcome": pending.wait().await }));
        }

        let mut output = serde_json::to_value(&check)?;
        output["dispatched"] = Value::Array(dispatched);
        Ok(output)
    }

    pub async fn reminder(&self, user_id: &str, now: DateTime<Utc>) -> AppResult<Value> {
        let needs_reminder = self.engine.activity_reminder(user_id, now).await?;
        Ok(json!({ "userId": user_id, "needsReminder": needs_reminder }))
    }

    pub async fn add_user(
        &self,
        user_id: String,
        email: String,
        name: Option<String>,
        trial_start: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> AppResult<Value> {
        let user = self
            .store
            .insert_user(
                NewUser {
                    id: user_id,
                    email,
                    display_name: name,
                    trial_start_date: Some(trial_start),
                    subscription_status: SubscriptionStatus::Trialing,
                },
                now,
            )
            .await?;
        info!(user_id = %user.id, "User registered");
        Ok(serde_json::to_value(user)?)
    }

    pub async fn subscribe(
        &self,
        user_id: &str,
        status: SubscriptionStatus,
        start: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> AppResult<Value> {
        if !self.store.set_subscription(user_id, status, start, now).await? {
            return Err(DispatchError::UserNotFound(user_id.to_string()).into());
        }
        Ok(json!({ "userId": user_id, "subscriptionStatus": status, "subscriptionStartDate": start }))
    }

    pub async fn touch(&self, user_id: &str, now: DateTime<Utc>) -> AppResult<Value> {
        self.engine.record_interaction(user_id, now).await?;
        Ok(json!({ "userId": user_id, "lastInteraction": now }))
    }
}
