use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, NaiveDate, Utc};
use clap::{Args, Parser, Subcommand};

use chronicle_core::span::end_of_day;
use chronicle_core::{parse_timestamp, TimeSpan};

/// Incrementally collect activity history into a local database.
///
/// Each source remembers which time spans it has already scanned, so
/// repeated fetches only ask for what is missing.
#[derive(Parser, Debug)]
#[command(name = "chronicle", version, about)]
pub struct CliArgs {
    /// Path to config file (default: ~/.config/chronicle/config.toml)
    #[arg(long, global = true)]
    pub config: Option<String>,

    /// Database path (overrides CHRONICLE_DB_PATH)
    #[arg(long, global = true)]
    pub db: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Fetch events for every enabled source, or one source
    Fetch(FetchArgs),
    /// Print stored events, newest first
    Query(QueryArgs),
    /// Show scanned spans and the newest event per source
    Status,
    /// Delete events older than the retention period
    Prune {
        /// Days of events to keep (default: CHRONICLE_RETENTION_DAYS)
        #[arg(long)]
        days: Option<u32>,
    },
    /// Forget what has been scanned for a source so it is fetched again
    Reset {
        /// Source name
        source: String,
    },
}

#[derive(Args, Debug)]
pub struct FetchArgs {
    /// Only fetch this source
    pub source: Option<String>,

    /// Window start: date or RFC 3339 (default: now minus the lookback period)
    #[arg(long)]
    pub start: Option<String>,

    /// Window end: a date means the end of that day (default: now)
    #[arg(long)]
    pub stop: Option<String>,
}

#[derive(Args, Debug)]
pub struct QueryArgs {
    #[arg(long)]
    pub start: Option<String>,

    #[arg(long)]
    pub stop: Option<String>,

    /// Only events from this source
    #[arg(long)]
    pub source: Option<String>,

    /// Maximum number of events to print
    #[arg(long, default_value = "50")]
    pub limit: u32,

    /// Print one JSON object per line
    #[arg(long)]
    pub json: bool,
}

/// Parse a window start. A bare date is the start of that day.
pub fn parse_start(raw: &str) -> Result<DateTime<Utc>> {
    parse_timestamp(raw).with_context(|| format!("invalid --start '{}'", raw))
}

/// Parse a window end. A bare date is the end of that day, so
/// `--stop 2024-01-31` includes all of January 31st.
pub fn parse_stop(raw: &str) -> Result<DateTime<Utc>> {
    if let Ok(date) = NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d") {
        return Ok(end_of_day(date));
    }
    parse_timestamp(raw).with_context(|| format!("invalid --stop '{}'", raw))
}

/// The window a fetch covers, filling in defaults relative to `now`.
pub fn fetch_window(
    start: Option<&str>,
    stop: Option<&str>,
    lookback_days: u32,
    now: DateTime<Utc>,
) -> Result<TimeSpan> {
    let start = match start {
        Some(raw) => parse_start(raw)?,
        None => now
            .checked_sub_signed(Duration::days(i64::from(lookback_days)))
            .with_context(|| format!("lookback of {} day(s) is out of range", lookback_days))?,
    };
    let stop = match stop {
        Some(raw) => parse_stop(raw)?,
        None => now,
    };
    TimeSpan::new(start, stop).context("--start must not be after --stop")
}
