//! File system paths for the engine.

use crate::{ConfigError, ConfigResult};
use std::path::PathBuf;

/// Manages file system paths for the engine.
#[derive(Debug, Clone)]
pub struct Paths {
    /// Base directory for runtime files (~/.onboarding)
    base_dir: PathBuf,
}

impl Paths {
    /// Create a new Paths instance rooted at `~/.onboarding`.
    pub fn new() -> ConfigResult<Self> {
        let home = dirs::home_dir()
            .ok_or_else(|| ConfigError::Path("Could not determine home directory".to_string()))?;

        Ok(Self {
            base_dir: home.join(".onboarding"),
        })
    }

    /// Create a new Paths instance with a custom base directory.
    pub fn with_base_dir(base_dir: PathBuf) -> Self {
        Self { base_dir }
    }

    /// Get the base directory (~/.onboarding).
    pub fn base_dir(&self) -> &PathBuf {
        &self.base_dir
    }

    /// Get the config file path (~/.onboarding/config.json).
    pub fn config_file(&self) -> PathBuf {
        self.base_dir.join("config.json")
    }

    /// Get the database file path (~/.onboarding/onboarding.sqlite).
    pub fn database_file(&self) -> PathBuf {
        self.base_dir.join("onboarding.sqlite")
    }

    /// Get the logs directory (~/.onboarding/logs).
    pub fn logs_dir(&self) -> PathBuf {
        self.base_dir.join("logs")
    }

    /// Ensure all required directories exist.
    pub fn ensure_dirs(&self) -> ConfigResult<()> {
        std::fs::create_dir_all(&self.base_dir)?;
        std::fs::create_dir_all(self.logs_dir())?;
        Ok(())
    }
}
