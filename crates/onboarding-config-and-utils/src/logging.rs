//! Logging initialization.
//!
//! Services call [`init_logging`] once at startup and use standard
//! `tracing` macros everywhere else. `RUST_LOG` overrides the configured
//! level; `ONBOARDING_LOG_FORMAT=json` switches to one JSON object per line.

use tracing_subscriber::EnvFilter;

/// Output format for log lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Compact,
    Json,
}

impl LogFormat {
    pub fn from_str(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "json" | "jsonl" => Self::Json,
            _ => Self::Compact,
        }
    }

    fn from_env() -> Self {
        std::env::var("ONBOARDING_LOG_FORMAT")
            .map(|raw| Self::from_str(&raw))
            .unwrap_or(Self::Compact)
    }
}

/// Initialize the global tracing subscriber.
///
/// Logs go to stderr so stdout stays clean for command output. Calling this
/// twice is harmless; the second subscriber is dropped.
pub fn init_logging(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let result = match LogFormat::from_env() {
        LogFormat::Json => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .json()
            .with_current_span(true)
            .try_init(),
        LogFormat::Compact => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .with_target(true)
            .compact()
            .try_init(),
    };

    if result.is_err() {
        tracing::debug!("Tracing subscriber already initialized");
    }
}

/// Parse a log level string into a tracing Level.
pub fn parse_level(level: &str) -> tracing::Level {
    match level.to_lowercase().as_str() {
        "trace" => tracing::Level::TRACE,
        "debug" => tracing::Level::DEBUG,
        "info" => tracing::Level::INFO,
        "warn" | "warning" => tracing::Level::WARN,
        "error" => tracing::Level::ERROR,
        _ => tracing::Level::INFO,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_level_all_variants() {
        assert_eq!(parse_level("trace"), tracing::Level::TRACE);
        assert_eq!(parse_level("debug"), tracing::Level::DEBUG);
        assert_eq!(parse_level("info"), tracing::Level::INFO);
        assert_eq!(parse_level("warn"), tracing::Level::WARN);
        assert_eq!(parse_level("warning"), tracing::Level::WARN);
        assert_eq!(parse_level("error"), tracing::Level::ERROR);
    }

    #[test]
    fn parse_level_case_insensitive() {
        assert_eq!(parse_level("DEBUG"), tracing::Level::DEBUG);
        assert_eq!(parse_level("Warning"), tracing::Level::WARN);
    }

    #[test]
    fn parse_level_unknown_defaults_to_info() {
        assert_eq!(parse_level(""), tracing::Level::INFO);
        assert_eq!(parse_level("verbose"), tracing::Level::INFO);
    }

    #[test]
    fn log_format_parse() {
        assert_eq!(LogFormat::from_str("json"), LogFormat::Json);
        assert_eq!(LogFormat::from_str(" JSONL "), LogFormat::Json);
        assert_eq!(LogFormat::from_str("pretty"), LogFormat::Compact);
    }

    #[test]
    fn init_logging_twice_does_not_panic() {
        init_logging("debug");
        init_logging("info");
    }
}
