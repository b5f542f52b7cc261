//! Configuration management for the engine.

use crate::{ConfigResult, Paths};
use serde::{Deserialize, Serialize};
use std::path::Path;
use url::Url;

/// Default log level.
pub const DEFAULT_LOG_LEVEL: &str = "info";

/// Default pause between provider sends within one sweep.
const DEFAULT_SEND_INTERVAL_MS: u64 = 600;

/// Default transactional-messaging provider.
const DEFAULT_PROVIDER_URL: &str = "https://api.resend.com";

const DEFAULT_FROM_ADDRESS: &str = "Onboarding <hello@onboarding.dev>";

/// Main engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,
    /// Batch sweep pacing.
    #[serde(default)]
    pub sweep: SweepConfig,
    /// Messaging provider settings.
    #[serde(default)]
    pub notifier: NotifierConfig,
}

/// Batch sweep settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SweepConfig {
    /// Fixed delay between consecutive sends, sized under the provider's
    /// rate ceiling.
    #[serde(default = "default_send_interval_ms")]
    pub send_interval_ms: u64,
}

/// Transactional-messaging provider settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotifierConfig {
    #[serde(default = "default_provider_url")]
    pub provider_url: String,
    #[serde(default = "default_from_address")]
    pub from_address: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Environment only (`ONBOARDING_NOTIFIER_API_KEY`); never written to disk.
    #[serde(skip)]
    pub api_key: Option<String>,
}

fn default_send_interval_ms() -> u64 {
    DEFAULT_SEND_INTERVAL_MS
}

fn default_provider_url() -> String {
    DEFAULT_PROVIDER_URL.to_string()
}

fn default_from_address() -> String {
    DEFAULT_FROM_ADDRESS.to_string()
}

fn default_timeout_secs() -> u64 {
    30
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            send_interval_ms: DEFAULT_SEND_INTERVAL_MS,
        }
    }
}

impl Default for NotifierConfig {
    fn default() -> Self {
        Self {
            provider_url: default_provider_url(),
            from_address: default_from_address(),
            timeout_secs: default_timeout_secs(),
            api_key: None,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: DEFAULT_LOG_LEVEL.to_string(),
            sweep: SweepConfig::default(),
            notifier: NotifierConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from the config file, falling back to defaults,
    /// then apply environment overrides.
    pub fn load(paths: &Paths) -> ConfigResult<Self> {
        let config_path = paths.config_file();

        let mut config = if config_path.exists() {
            Self::load_from_file(&config_path)?
        } else {
            Self::default()
        };

        config.load_from_env();

        Ok(config)
    }

    /// Load configuration from a specific file.
    pub fn load_from_file(path: &Path) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to the config file.
    pub fn save(&self, paths: &Paths) -> ConfigResult<()> {
        paths.ensure_dirs()?;
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(paths.config_file(), content)?;
        Ok(())
    }

    fn load_from_env(&mut self) {
        if let Ok(log_level) = std::env::var("ONBOARDING_LOG_LEVEL") {
            self.log_level = log_level;
        }
        if let Ok(url) = std::env::var("ONBOARDING_NOTIFIER_URL") {
            self.notifier.provider_url = url;
        }
        self.notifier.api_key = std::env::var("ONBOARDING_NOTIFIER_API_KEY")
            .ok()
            .map(|key| key.trim().to_string())
            .filter(|key| !key.is_empty());
    }

    /// Get the provider URL as a parsed URL.
    pub fn provider_url(&self) -> ConfigResult<Url> {
        Ok(Url::parse(&self.notifier.provider_url)?)
    }

    /// Sweep send interval as a Duration.
    pub fn send_interval(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.sweep.send_interval_ms)
    }
}
