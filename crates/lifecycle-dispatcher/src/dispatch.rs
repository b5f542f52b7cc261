//! Claim, send, then confirm or release.

use crate::{ClaimOutcome, IdempotencyGate, NotificationMessage, Notifier, Recipient};
use chrono::{DateTime, Utc};
use entitlement_core::{evaluate_triggers, EntitlementState, TriggerContext, TriggerId, TriggerRule};
use onboarding_database::User;
use serde::Serialize;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// How a detached delivery ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum DeliveryOutcome {
    /// Provider accepted; flag confirmed.
    Delivered,
    /// Provider refused or was unreachable; flag released.
    Failed { error: String },
}

/// A send running on its own task.
///
/// Dropping this does not cancel the send; the task finishes and settles
/// the flag either way.
#[derive(Debug)]
pub struct PendingDelivery {
    pub trigger: TriggerId,
    handle: JoinHandle<Option<DeliveryOutcome>>,
}

impl PendingDelivery {
    /// Wait for the provider's answer.
    pub async fn wait(self) -> DeliveryOutcome {
        match self.handle.await {
            Ok(Some(outcome)) => outcome,
            Ok(None) => DeliveryOutcome::Failed {
                error: "flag was not claimed".to_string(),
            },
            Err(e) => DeliveryOutcome::Failed {
                error: format!("delivery task aborted: {e}"),
            },
        }
    }
}

/// What happened to one dispatch attempt.
#[derive(Debug)]
pub enum DispatchAttempt {
    /// Claim won; the send is running.
    Started(PendingDelivery),
    /// Another caller already owns the flag.
    Taken,
    /// The store could not answer the claim; nothing was sent.
    ClaimFailed,
}

impl DispatchAttempt {
    pub fn started(self) -> Option<PendingDelivery> {
        match self {
            DispatchAttempt::Started(pending) => Some(pending),
            DispatchAttempt::Taken | DispatchAttempt::ClaimFailed => None,
        }
    }
}

/// Shared by the interactive engine and the sweep.
#[derive(Clone)]
pub struct Dispatcher {
    gate: IdempotencyGate,
    notifier: Arc<dyn Notifier>,
}

impl Dispatcher {
    pub fn new(gate: IdempotencyGate, notifier: Arc<dyn Notifier>) -> Self {
        Self { gate, notifier }
    }

    /// Claim and, if won, start delivery of one rule.
    pub async fn dispatch(
        &self,
        user: &User,
        rule: &TriggerRule,
        state: &EntitlementState,
        now: DateTime<Utc>,
    ) -> Option<PendingDelivery> {
        self.dispatch_paced(user, rule, state, now, Duration::ZERO)
            .await
            .started()
    }

    /// Claim `rule` and, if won, wait `pause` before sending.
    ///
    /// Claim, pause, send and settle run on one detached task. This future
    /// resolves as soon as the claim is decided; dropping it, or the
    /// returned [`PendingDelivery`], never strands a claimed flag.
    pub async fn dispatch_paced(
        &self,
        user: &User,
        rule: &TriggerRule,
        state: &EntitlementState,
        now: DateTime<Utc>,
        pause: Duration,
    ) -> DispatchAttempt {
        let trigger = rule.id;
        let message = build_message(user, rule, state);
        let gate = self.gate.clone();
        let notifier = Arc::clone(&self.notifier);
        let (claimed_tx, claimed_rx) = oneshot::channel();

        let handle = tokio::spawn(async move {
            let claim = gate.claim(&message.recipient.user_id, trigger, now).await;
            // The caller may have gone away; the task carries on.
            let _ = claimed_tx.send(claim);
            if !claim.is_won() {
                return None;
            }
            if !pause.is_zero() {
                tokio::time::sleep(pause).await;
            }
            Some(send_and_settle(&gate, notifier.as_ref(), &message).await)
        });

        match claimed_rx.await {
            Ok(ClaimOutcome::Won) => DispatchAttempt::Started(PendingDelivery { trigger, handle }),
            Ok(ClaimOutcome::Taken) => DispatchAttempt::Taken,
            Ok(ClaimOutcome::Failed) | Err(_) => DispatchAttempt::ClaimFailed,
        }
    }

    /// Dispatch every due rule for `user` without pacing.
    pub async fn fire_due(
        &self,
        user: &User,
        state: &EntitlementState,
        now: DateTime<Utc>,
    ) -> Vec<PendingDelivery> {
        let ctx = TriggerContext {
            entitlement: state,
            unlocked_modules: &user.unlocked_modules,
        };

        let mut pending = Vec::new();
        for rule in evaluate_triggers(&ctx) {
            if let Some(delivery) = self.dispatch(user, rule, state, now).await {
                pending.push(delivery);
            }
        }
        pending
    }
}

async fn send_and_settle(
    gate: &IdempotencyGate,
    notifier: &dyn Notifier,
    message: &NotificationMessage,
) -> DeliveryOutcome {
    let user_id = &message.recipient.user_id;
    let trigger = message.trigger;
    match notifier.send(message).await {
        Ok(()) => {
            gate.confirm(user_id, trigger, Utc::now()).await;
            info!(user_id = %user_id, trigger = %trigger, "Lifecycle notification delivered");
            DeliveryOutcome::Delivered
        }
        Err(e) => {
            warn!(
                user_id = %user_id,
                trigger = %trigger,
                error = %e,
                "Lifecycle notification failed, releasing flag"
            );
            gate.release(user_id, trigger, Utc::now()).await;
            DeliveryOutcome::Failed { error: e.to_string() }
        }
    }
}

/// Build the provider message for `rule`.
fn build_message(
    user: &User,
    rule: &TriggerRule,
    state: &EntitlementState,
) -> NotificationMessage {
    NotificationMessage {
        trigger: rule.id,
        template: rule.template,
        recipient: Recipient {
            user_id: user.id.clone(),
            email: user.email.clone(),
            name: user.display_name.clone(),
        },
        data: json!({
            "name": user.display_name,
            "daysSinceStart": state.days_since_start,
            "daysRemaining": state.days_remaining,
            "unlockedModules": user.unlocked_modules,
        }),
    }
}
