//! Errors from loading configuration and preparing the base directory.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// `notifier.provider_url` did not parse.
    #[error("Invalid provider URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// `config.json` is malformed or could not be written.
    #[error("Config file error: {0}")]
    Json(#[from] serde_json::Error),

    /// No home directory to put `~/.onboarding` in.
    #[error("Path error: {0}")]
    Path(String),
}

pub type ConfigResult<T> = Result<T, ConfigError>;
