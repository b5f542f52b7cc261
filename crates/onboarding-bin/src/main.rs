//! Onboarding engine - entitlement queries and lifecycle notification sweeps.

mod app;

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand, ValueEnum};
use entitlement_core::{Clock, FixedClock, SubscriptionStatus, SystemClock};
use onboarding_config_and_utils::{init_logging, Config, Paths};

/// Onboarding engine command-line interface.
#[derive(Parser)]
#[command(name = "onboarding-engine")]
#[command(about = "Trial entitlement and lifecycle notification engine")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Log level (trace, debug, info, warn, error). Overrides the config file
    #[arg(short, long, global = true)]
    log_level: Option<String>,

    /// Base directory for runtime files (database, logs, config). Defaults to ~/.onboarding
    #[arg(long, global = true)]
    base_dir: Option<PathBuf>,

    /// Evaluate as of this instant (RFC 3339) instead of the current time
    #[arg(long, global = true, value_parser = parse_instant)]
    at: Option<DateTime<Utc>>,
}

#[derive(Subcommand)]
enum Commands {
    /// Re-evaluate every trialing user and send what is due
    Sweep,
    /// Compute a user's entitlement and fire due notifications
    Query { user_id: String },
    /// Unlock any content modules the user has earned
    Modules { user_id: String },
    /// Whether the user should see an inactivity reminder
    Reminder { user_id: String },
    /// Register a user at intake
    AddUser {
        user_id: String,
        email: String,
        #[arg(long)]
        name: Option<String>,
        /// Trial start (RFC 3339). Defaults to now
        #[arg(long, value_parser = parse_instant)]
        trial_start: Option<DateTime<Utc>>,
    },
    /// Record a subscription change
    Subscribe {
        user_id: String,
        #[arg(value_enum)]
        status: StatusArg,
        /// Subscription start (RFC 3339)
        #[arg(long, value_parser = parse_instant)]
        start: Option<DateTime<Utc>>,
    },
    /// Record a user interaction
    Touch { user_id: String },
}

/// Subscription status as accepted on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum StatusArg {
    None,
    #[value(alias = "trial")]
    Trialing,
    Active,
    #[value(alias = "cancelled")]
    Canceled,
    #[value(name = "trial_ended")]
    TrialEnded,
}

impl From<StatusArg> for SubscriptionStatus {
    fn from(status: StatusArg) -> Self {
        match status {
            StatusArg::None => SubscriptionStatus::None,
            StatusArg::Trialing => SubscriptionStatus::Trialing,
            StatusArg::Active => SubscriptionStatus::Active,
            StatusArg::Canceled => SubscriptionStatus::Canceled,
            StatusArg::TrialEnded => SubscriptionStatus::TrialEnded,
        }
    }
}

fn parse_instant(raw: &str) -> Result<DateTime<Utc>, String> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| format!("invalid RFC 3339 timestamp '{raw}': {e}"))
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let paths = match cli.base_dir {
        Some(base) => Paths::with_base_dir(base),
        None => Paths::new()?,
    };
    let config = Config::load(&paths)?;

    init_logging(cli.log_level.as_deref().unwrap_or(&config.log_level));

    let clock: Box<dyn Clock> = match cli.at {
        Some(at) => Box::new(FixedClock(at)),
        None => Box::new(SystemClock),
    };

    let app = app::App::open(&config, &paths).await?;
    let now = clock.now();

    let output = match cli.command {
        Commands::Sweep => app.sweep(now).await?,
        Commands::Query { user_id } => app.query(&user_id, now).await?,
        Commands::Modules { user_id } => app.modules(&user_id, now).await?,
        Commands::Reminder { user_id } => app.reminder(&user_id, now).await?,
        Commands::AddUser {
            user_id,
            email,
            name,
            trial_start,
        } => {
            app.add_user(user_id, email, name, trial_start.unwrap_or(now), now)
                .await?
        }
        Commands::Subscribe {
            user_id,
            status,
            start,
        } => {
            app.subscribe(&user_id, status.into(), start, now)
                .await?
        }
        Commands::Touch { user_id } => app.touch(&user_id, now).await?,
    };

    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}
