//! Configuration, paths and logging for the onboarding lifecycle engine.

mod config;
mod error;
mod logging;
mod paths;

pub use config::{Config, NotifierConfig, SweepConfig, DEFAULT_LOG_LEVEL};
pub use error::{ConfigError, ConfigResult};
pub use logging::{init_logging, parse_level, LogFormat};
pub use paths::Paths;
