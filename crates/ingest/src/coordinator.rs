//! Per-source reconciliation of coverage against a requested window.
//!
//! For each source: load its coverage, compute the uncovered sub-spans, fetch
//! them one at a time in ascending order, and commit each successful
//! sub-span's events and its coverage together. A failed sub-span leaves
//! coverage untouched so the next run asks for it again.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::{debug, info, warn};

use chronicle_core::{uncovered_spans, Event, TimeSpan};
use chronicle_sources::{SourceAdapter, SourceRegistry};
use chronicle_storage::Store;

use crate::error::IngestError;
use crate::report::{RunSummary, SkippedSource, SourceReport, SpanFailure};

pub struct Coordinator<'a> {
    store: &'a Store,
    registry: &'a SourceRegistry,
    interrupt: Arc<AtomicBool>,
}

impl<'a> Coordinator<'a> {
    pub fn new(store: &'a Store, registry: &'a SourceRegistry) -> Self {
        Self {
            store,
            registry,
            interrupt: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Use an externally owned interrupt flag (e.g. set from a Ctrl-C handler).
    pub fn with_interrupt(mut self, interrupt: Arc<AtomicBool>) -> Self {
        self.interrupt = interrupt;
        self
    }

    fn is_interrupted(&self) -> bool {
        self.interrupt.load(Ordering::Relaxed)
    }

    /// Bring one source's coverage up to `window`.
    ///
    /// Fetch failures are recorded in the report; only storage failures and
    /// an unusable source are returned as errors.
    pub async fn reconcile(
        &self,
        source_name: &str,
        window: &TimeSpan,
    ) -> Result<SourceReport, IngestError> {
        let adapter = match self.registry.get(source_name) {
            Some(adapter) => adapter,
            None => {
                return Err(match self.registry.failure(source_name) {
                    Some(failure) => IngestError::Disabled {
                        source_name: source_name.to_string(),
                        reason: failure.error.to_string(),
                    },
                    None => IngestError::UnknownSource(source_name.to_string()),
                })
            }
        };
        self.reconcile_with(adapter, window).await
    }

    async fn reconcile_with(
        &self,
        adapter: &dyn SourceAdapter,
        window: &TimeSpan,
    ) -> Result<SourceReport, IngestError> {
        let source = adapter.identifier();
        let mut report = SourceReport::new(source);
        let mut coverage = self.store.load_coverage(source).await?;

        let gaps = uncovered_spans(&coverage, window);
        if gaps.is_empty() {
            info!(source = %source, window = %window, "already covered, nothing to fetch");
            return Ok(report);
        }
        debug!(source = %source, gaps = gaps.len(), "uncovered spans computed");

        for gap in gaps {
            if self.is_interrupted() {
                warn!(source = %source, next = %gap, "interrupted before span");
                report.interrupted = true;
                break;
            }

            let events = match adapter.fetch(&gap).await {
                Ok(events) => events,
                Err(e) => {
                    warn!(source = %source, span = %gap, error = %e, "fetch failed, coverage not advanced");
                    report.failed.push(SpanFailure {
                        span: gap,
                        reason: e.to_string(),
                    });
                    continue;
                }
            };
            let (accepted, rejected) = match validate(source, &gap, events) {
                Ok(split) => split,
                Err(reason) => {
                    warn!(source = %source, span = %gap, reason = %reason, "fetch result rejected");
                    report.failed.push(SpanFailure { span: gap, reason });
                    continue;
                }
            };
            report.fetched += accepted.len() + rejected;
            if rejected > 0 {
                warn!(source = %source, span = %gap, rejected, "dropped events outside span");
            }
            report.rejected += rejected;

            // Coverage grows by the requested span, not by the extent of the
            // events, so a quiet span is still recorded.
            let next = coverage.merge(gap);
            let write = self.store.commit_span(source, &accepted, &next).await?;
            coverage = next;

            info!(
                source = %source,
                span = %gap,
                inserted = write.inserted,
                duplicates = write.duplicates,
                "span committed"
            );
            report.stored += write.inserted;
            report.duplicates += write.duplicates;
            report.covered.push(gap);
        }

        Ok(report)
    }

    /// Reconcile every usable source, or only those in `selection`, in
    /// enabled order.
    ///
    /// A storage error aborts the whole run; everything else is reported.
    pub async fn reconcile_all(
        &self,
        window: &TimeSpan,
        selection: &[String],
    ) -> Result<RunSummary, IngestError> {
        let mut summary = RunSummary::new(*window);
        let selected = |name: &str| selection.is_empty() || selection.iter().any(|s| s == name);

        info!(run_id = %summary.run_id, window = %window, "reconcile run started");

        for failure in self.registry.failures() {
            if selected(&failure.source_name) {
                summary.skipped.push(SkippedSource {
                    source: failure.source_name.clone(),
                    reason: failure.error.to_string(),
                });
            }
        }
        for name in selection {
            let known = self.registry.get(name).is_some() || self.registry.failure(name).is_some();
            if !known && !summary.unknown.contains(name) {
                warn!(source = %name, "selected source is not configured");
                summary.unknown.push(name.clone());
            }
        }

        for name in self.registry.names().filter(|n| selected(*n)) {
            if self.is_interrupted() {
                summary.interrupted = true;
                break;
            }
            let report = self.reconcile(name, window).await?;
            summary.interrupted |= report.interrupted;
            summary.reports.push(report);
        }

        info!(
            run_id = %summary.run_id,
            stored = summary.total_stored(),
            covered = summary.spans_covered(),
            failed = summary.spans_failed(),
            "reconcile run finished"
        );
        Ok(summary)
    }
}

/// Split fetched events into those inside `span` and a count of the rest.
///
/// An event attributed to another source means the adapter is broken, so the
/// whole span fails instead.
fn validate(
    source: &str,
    span: &TimeSpan,
    events: Vec<Event>,
) -> Result<(Vec<Event>, usize), String> {
    if let Some(stray) = events.iter().find(|e| e.source != source) {
        return Err(format!(
            "adapter returned an event for source '{}'",
            stray.source
        ));
    }
    let total = events.len();
    let accepted: Vec<Event> = events
        .into_iter()
        .filter(|e| span.contains(e.timestamp))
        .collect();
    let rejected = total - accepted.len();
    Ok((accepted, rejected))
}
