use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use chrono::{Duration, Utc};
use tracing::{info, warn};

use chronicle_core::{format_timestamp, Config, CoverageSet};
use chronicle_ingest::{Coordinator, RunSummary};
use chronicle_sources::SourceRegistry;
use chronicle_storage::{CoverageStore, EventFilter, EventStore, Store};

use crate::cli::{fetch_window, parse_start, parse_stop, FetchArgs, QueryArgs};
use crate::config::CliConfig;

pub async fn fetch(
    store: &Store,
    config: &Config,
    cli_config: &CliConfig,
    args: &FetchArgs,
) -> Result<RunSummary> {
    let window = fetch_window(
        args.start.as_deref(),
        args.stop.as_deref(),
        config.fetch.default_lookback_days,
        Utc::now(),
    )?;
    let registry = SourceRegistry::from_config(&cli_config.sources);
    if registry.is_empty() && registry.failures().is_empty() {
        warn!("no sources enabled; add some under [sources] in the config file");
    }

    let interrupt = Arc::new(AtomicBool::new(false));
    spawn_interrupt_handler(Arc::clone(&interrupt));

    let selection: Vec<String> = args.source.iter().cloned().collect();
    let coordinator = Coordinator::new(store, &registry).with_interrupt(interrupt);
    let summary = coordinator
        .reconcile_all(&window, &selection)
        .await
        .context("fetch aborted")?;

    println!("{}", summary);
    Ok(summary)
}

/// What a Ctrl-C press should do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum InterruptAction {
    /// Let the current span commit, then stop.
    Finish,
    /// Already asked once; leave immediately.
    Exit,
}

fn on_interrupt(flag: &AtomicBool) -> InterruptAction {
    if flag.swap(true, Ordering::Relaxed) {
        InterruptAction::Exit
    } else {
        InterruptAction::Finish
    }
}

/// First Ctrl-C stops the run after the current span; a second one exits
/// with the conventional SIGINT status.
fn spawn_interrupt_handler(flag: Arc<AtomicBool>) {
    tokio::spawn(async move {
        while tokio::signal::ctrl_c().await.is_ok() {
            match on_interrupt(&flag) {
                InterruptAction::Finish => {
                    eprintln!("interrupted, finishing the current span (Ctrl-C again to quit now)...");
                }
                InterruptAction::Exit => {
                    eprintln!("interrupted again, exiting");
                    std::process::exit(130);
                }
            }
        }
    });
}

pub async fn query(store: &Store, args: &QueryArgs) -> Result<()> {
    let filter = EventFilter {
        start: args.start.as_deref().map(parse_start).transpose()?,
        end: args.stop.as_deref().map(parse_stop).transpose()?,
        source: args.source.clone(),
        limit: Some(args.limit),
    };
    let events = EventStore::query(store.pool(), &filter).await?;

    for event in &events {
        if args.json {
            println!("{}", serde_json::to_string(event)?);
        } else {
            println!(
                "{}  {:<8} {:<16} {}",
                format_timestamp(event.timestamp),
                event.source,
                event.event_type,
                event.metadata
            );
        }
    }
    if !args.json {
        eprintln!("{} event(s)", events.len());
    }
    Ok(())
}

pub async fn status(store: &Store, cli_config: &CliConfig) -> Result<()> {
    let mut names: BTreeSet<String> = cli_config.sources.enabled.iter().cloned().collect();
    names.extend(CoverageStore::sources(store.pool()).await?);

    if names.is_empty() {
        println!("no sources enabled and nothing scanned yet");
        return Ok(());
    }

    for name in &names {
        let enabled = cli_config.sources.enabled.contains(name);
        let coverage = store.load_coverage(name).await?;
        let count = EventStore::count(store.pool(), Some(name)).await?;
        let latest = EventStore::latest_timestamp(store.pool(), Some(name)).await?;

        println!(
            "{}{}: {} event(s), latest {}",
            name,
            if enabled { "" } else { " (not enabled)" },
            count,
            latest
                .map(format_timestamp)
                .unwrap_or_else(|| "never".to_string())
        );
        println!("  {}", scanned_summary(&coverage));
        for span in coverage.spans() {
            println!("  scanned {}", span);
        }
    }
    Ok(())
}

/// One-line digest of a coverage set, e.g. `scanned 3d 4h in 2 span(s)`.
fn scanned_summary(coverage: &CoverageSet) -> String {
    if coverage.is_empty() {
        return "nothing scanned".to_string();
    }
    format!(
        "scanned {} in {} span(s)",
        format_duration(coverage.total_duration()),
        coverage.len()
    )
}

fn format_duration(duration: Duration) -> String {
    let total = duration.num_seconds();
    let (days, hours, minutes, seconds) = (
        total / 86_400,
        total % 86_400 / 3_600,
        total % 3_600 / 60,
        total % 60,
    );
    let parts: Vec<String> = [(days, "d"), (hours, "h"), (minutes, "m"), (seconds, "s")]
        .iter()
        .filter(|(n, _)| *n > 0)
        .map(|(n, unit)| format!("{}{}", n, unit))
        .collect();
    if parts.is_empty() {
        "0s".to_string()
    } else {
        parts.join(" ")
    }
}

pub async fn prune(store: &Store, config: &Config, days: Option<u32>) -> Result<()> {
    let Some(days) = days.or(config.fetch.retention_days) else {
        bail!("no retention period: pass --days or set CHRONICLE_RETENTION_DAYS");
    };
    let removed = EventStore::apply_retention(store.pool(), days, Utc::now()).await?;
    info!(days, removed, "retention applied");
    println!("removed {} event(s) older than {} day(s)", removed, days);
    Ok(())
}

pub async fn reset(store: &Store, source: &str) -> Result<()> {
    let removed = CoverageStore::clear(store.pool(), source).await?;
    if removed == 0 {
        println!("{}: nothing scanned, nothing to reset", source);
    } else {
        info!(source, removed, "coverage reset");
        println!("{}: scanned spans cleared; the next fetch scans again", source);
    }
    Ok(())
}
