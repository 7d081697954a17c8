//! `freetime` CLI: find the windows when every given calendar is free.
//!
//! ## Usage
//!
//! ```sh
//! # Common free time over the next 7 days, 09:00-17:00 UTC
//! freetime https://example.com/alice.ics webcal://example.com/bob.ics
//!
//! # Local files, next calendar week, Amsterdam working hours
//! freetime --next-week --tz Europe/Amsterdam --from 08:30 --to 18:00 alice.ics bob.ics
//!
//! # Explicit range with settings from a TOML file
//! freetime --config freetime.toml --start 2026-03-16 --days 14 team.ics
//! ```
//!
//! Results go to stdout as JSON; logs go to stderr (`-v` or `RUST_LOG` for more).

mod source;

use std::process;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{NaiveDate, Utc, Weekday};
use clap::Parser;
use freetime_engine::{
    find_common_availability, AvailabilityError, CachedFetcher, EngineConfig, ErrorPayload,
    FeedFetcher, FreeWindow, HttpFeedFetcher, SearchRange,
};
use serde::Serialize;
use tracing_subscriber::EnvFilter;

use crate::source::CliFetcher;

#[derive(Parser)]
#[command(
    name = "freetime",
    version,
    about = "Find common free time across iCalendar feeds"
)]
struct Cli {
    /// Calendar sources: http(s)/webcal feed URLs or local .ics files
    #[arg(required = true, value_name = "SOURCE")]
    sources: Vec<String>,

    /// TOML file with engine settings (flags override it)
    #[arg(long, value_name = "FILE")]
    config: Option<String>,

    /// First day of the search range (defaults to today)
    #[arg(long, value_name = "YYYY-MM-DD", conflicts_with = "next_week")]
    start: Option<NaiveDate>,

    /// Number of days to search
    #[arg(long, value_name = "N", conflicts_with = "next_week")]
    days: Option<u32>,

    /// Search Monday to Sunday of next calendar week
    #[arg(long)]
    next_week: bool,

    /// Working window start, HH:MM
    #[arg(long, value_name = "HH:MM")]
    from: Option<String>,

    /// Working window end, HH:MM
    #[arg(long, value_name = "HH:MM")]
    to: Option<String>,

    /// Minimum free slot length in minutes
    #[arg(long, value_name = "MINUTES")]
    min_slot: Option<i64>,

    /// IANA time zone for days and working hours
    #[arg(long, value_name = "ZONE")]
    tz: Option<String>,

    /// Per-source fetch timeout in seconds
    #[arg(long, value_name = "SECS")]
    timeout: Option<u64>,

    /// Log debug output to stderr
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct Output {
    free_slots: Vec<FreeWindow>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Usage errors exit 1; exit 2 is reserved for "no calendar could be read".
    let cli = Cli::try_parse().unwrap_or_else(|err| {
        if err.use_stderr() {
            let _ = err.print();
            process::exit(1);
        }
        err.exit()
    });
    init_tracing(cli.verbose);

    let config = load_config(&cli)?;
    let zone = config.zone()?;
    let today = Utc::now().with_timezone(&zone).date_naive();

    let query = if cli.next_week {
        config.query_for(SearchRange::next_week(today, Weekday::Mon, zone)?)?
    } else {
        let first_day = cli.start.unwrap_or(today);
        config.query_for(SearchRange::starting_on(first_day, config.horizon_days, zone)?)?
    };

    let http = HttpFeedFetcher::with_timeout(Duration::from_secs(config.fetch_timeout_seconds))
        .context("Failed to build HTTP client")?;
    let fetcher: Box<dyn FeedFetcher> = if config.cache_ttl_seconds > 0 {
        Box::new(CachedFetcher::new(
            CliFetcher::new(http),
            Duration::from_secs(config.cache_ttl_seconds),
        ))
    } else {
        Box::new(CliFetcher::new(http))
    };

    match find_common_availability(fetcher.as_ref(), &cli.sources, &query).await {
        Ok(common) => {
            let output = Output {
                free_slots: common.windows(&query),
            };
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
        Err(err @ AvailabilityError::AllSourcesUnusable { .. }) => {
            println!("{}", serde_json::to_string_pretty(&ErrorPayload::from(&err))?);
            process::exit(2);
        }
        Err(err) => return Err(err.into()),
    }

    Ok(())
}

/// Logs go to stderr so stdout stays pure JSON.
fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default)))
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

/// Read `--config` (if any) and apply flag overrides on top.
fn load_config(cli: &Cli) -> Result<EngineConfig> {
    let mut config = match cli.config.as_deref() {
        Some(path) => {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file: {}", path))?;
            EngineConfig::from_toml_str(&text)
                .with_context(|| format!("Failed to load config file: {}", path))?
        }
        None => EngineConfig::default(),
    };

    if let Some(from) = &cli.from {
        config.working_hours.start = from.clone();
    }
    if let Some(to) = &cli.to {
        config.working_hours.end = to.clone();
    }
    if let Some(minutes) = cli.min_slot {
        anyhow::ensure!(minutes >= 0, "--min-slot must not be negative");
        config.min_slot_minutes = minutes;
    }
    if let Some(tz) = &cli.tz {
        config.time_zone = tz.clone();
    }
    if let Some(seconds) = cli.timeout {
        config.fetch_timeout_seconds = seconds;
    }
    if let Some(days) = cli.days {
        anyhow::ensure!(days > 0, "--days must be at least 1");
        config.horizon_days = days;
    }

    // Validate the window now so a bad --from/--to fails before any fetch.
    config.working_window()?;
    Ok(config)
}
