//! Transactional-messaging provider client.

use crate::{NotifierError, NotifierResult};
use async_trait::async_trait;
use entitlement_core::TriggerId;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Mutex;
use std::time::Duration;
use tracing::{debug, info};

/// Who a message goes to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Recipient {
    pub user_id: String,
    pub email: String,
    pub name: Option<String>,
}

/// One rendered-by-provider lifecycle message.
#[derive(Debug, Clone, Serialize)]
pub struct NotificationMessage {
    pub trigger: TriggerId,
    pub template: &'static str,
    pub recipient: Recipient,
    /// Template variables.
    pub data: serde_json::Value,
}

impl NotificationMessage {
    /// Stable per (user, trigger); providers use it to drop duplicate
    /// requests on their side too.
    pub fn idempotency_key(&self) -> String {
        format!("{}:{}", self.recipient.user_id, self.trigger)
    }
}

/// Sends a message. A returned error means the message was not accepted.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, message: &NotificationMessage) -> NotifierResult<()>;
}

/// HTTP notifier configuration.
#[derive(Debug, Clone)]
pub struct HttpNotifierConfig {
    /// Base URL of the provider API.
    pub provider_url: String,
    pub api_key: Option<String>,
    pub from_address: String,
    /// Request timeout in seconds.
    pub timeout_secs: u64,
}

impl Default for HttpNotifierConfig {
    fn default() -> Self {
        Self {
            provider_url: "https://api.resend.com".to_string(),
            api_key: None,
            from_address: "Onboarding <hello@onboarding.dev>".to_string(),
            timeout_secs: 30,
        }
    }
}

#[derive(Debug, Serialize)]
struct SendEmailRequest<'a> {
    from: &'a str,
    to: Vec<&'a str>,
    template: &'a str,
    data: &'a serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct SendEmailResponse {
    #[serde(default)]
    id: Option<String>,
}

/// Posts one email per call to `{provider_url}/emails`. No retries here;
/// a failed send releases the flag and a later evaluation tries again.
pub struct HttpNotifier {
    config: HttpNotifierConfig,
    client: Client,
}

impl HttpNotifier {
    pub fn new(config: HttpNotifierConfig) -> NotifierResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self { config, client })
    }

    fn endpoint(&self) -> String {
        format!("{}/emails", self.config.provider_url.trim_end_matches('/'))
    }
}

#[async_trait]
impl Notifier for HttpNotifier {
    async fn send(&self, message: &NotificationMessage) -> NotifierResult<()> {
        let api_key = self
            .config
            .api_key
            .as_deref()
            .ok_or_else(|| NotifierError::Config("provider API key is not set".to_string()))?;

        let url = self.endpoint();
        let request = SendEmailRequest {
            from: &self.config.from_address,
            to: vec![message.recipient.email.as_str()],
            template: message.template,
            data: &message.data,
        };

        debug!(
            url = %url,
            user_id = %message.recipient.user_id,
            trigger = %message.trigger,
            "Sending notification"
        );

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", api_key))
            .header("Idempotency-Key", message.idempotency_key())
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(NotifierError::Provider {
                status: status.as_u16(),
                message: body,
            });
        }

        let accepted: SendEmailResponse = response.json().await.unwrap_or(SendEmailResponse { id: None });
        info!(
            user_id = %message.recipient.user_id,
            trigger = %message.trigger,
            provider_id = accepted.id.as_deref().unwrap_or("-"),
            "Notification accepted"
        );
        Ok(())
    }
}

#[derive(Default)]
struct RecordingState {
    sent: Vec<NotificationMessage>,
    attempts: usize,
    failing_users: HashSet<String>,
    fail_next: usize,
}

/// In-memory notifier that records what it was asked to send.
///
/// Failures can be injected per user or for the next N calls.
#[derive(Default)]
pub struct RecordingNotifier {
    state: Mutex<RecordingState>,
    delay: Option<Duration>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Hold every send for `delay` before answering.
    pub fn with_delay(delay: Duration) -> Self {
        Self {
            state: Mutex::default(),
            delay: Some(delay),
        }
    }

    pub fn fail_for_user(&self, user_id: &str) {
        if let Ok(mut state) = self.state.lock() {
            state.failing_users.insert(user_id.to_string());
        }
    }

    pub fn recover_user(&self, user_id: &str) {
        if let Ok(mut state) = self.state.lock() {
            state.failing_users.remove(user_id);
        }
    }

    pub fn fail_next(&self, count: usize) {
        if let Ok(mut state) = self.state.lock() {
            state.fail_next = count;
        }
    }

    /// Messages that were accepted.
    pub fn sent(&self) -> Vec<NotificationMessage> {
        self.state.lock().map(|s| s.sent.clone()).unwrap_or_default()
    }

    /// Accepted messages for one user and trigger.
    pub fn sent_count(&self, user_id: &str, trigger: TriggerId) -> usize {
        self.sent()
            .iter()
            .filter(|m| m.recipient.user_id == user_id && m.trigger == trigger)
            .count()
    }

    /// Every call, accepted or not.
    pub fn attempts(&self) -> usize {
        self.state.lock().map(|s| s.attempts).unwrap_or_default()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn send(&self, message: &NotificationMessage) -> NotifierResult<()> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let mut state = self
            .state
            .lock()
            .map_err(|_| NotifierError::Send("recording notifier poisoned".to_string()))?;
        state.attempts += 1;

        if state.fail_next > 0 {
            state.fail_next -= 1;
            return Err(NotifierError::Send("injected failure".to_string()));
        }
        if state.failing_users.contains(&message.recipient.user_id) {
            return Err(NotifierError::Provider {
                status: 503,
                message: "injected failure".to_string(),
            });
        }

        state.sent.push(message.clone());
        Ok(())
    }
}
