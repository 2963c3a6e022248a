//! Outcome records for reconciliation runs.

use std::fmt;

use uuid::Uuid;

use chronicle_core::TimeSpan;

/// A sub-span whose fetch failed; its coverage was not advanced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpanFailure {
    pub span: TimeSpan,
    pub reason: String,
}

/// What one source's reconciliation did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceReport {
    pub source: String,
    /// Events returned by the adapter for sub-spans that passed validation.
    pub fetched: usize,
    /// Events that were new to the store.
    pub stored: usize,
    /// Events already present, absorbed by the idempotent insert.
    pub duplicates: usize,
    /// Events outside the requested sub-span, dropped.
    pub rejected: usize,
    /// Sub-spans fetched and recorded as covered, ascending.
    pub covered: Vec<TimeSpan>,
    pub failed: Vec<SpanFailure>,
    /// Stopped early on request; later sub-spans were not attempted.
    pub interrupted: bool,
}

impl SourceReport {
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            fetched: 0,
            stored: 0,
            duplicates: 0,
            rejected: 0,
            covered: Vec::new(),
            failed: Vec::new(),
            interrupted: false,
        }
    }

    /// Nothing was missing from coverage, so nothing was fetched.
    pub fn was_up_to_date(&self) -> bool {
        self.covered.is_empty() && self.failed.is_empty() && !self.interrupted
    }
}

impl fmt::Display for SourceReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.was_up_to_date() {
            return write!(f, "{}: already up to date", self.source);
        }
        write!(
            f,
            "{}: {} stored, {} duplicate, {} rejected, {} span(s) covered, {} failed",
            self.source,
            self.stored,
            self.duplicates,
            self.rejected,
            self.covered.len(),
            self.failed.len()
        )?;
        if self.interrupted {
            write!(f, " (interrupted)")?;
        }
        for failure in &self.failed {
            write!(f, "\n  failed {}: {}", failure.span, failure.reason)?;
        }
        Ok(())
    }
}

/// An enabled source left out of the run because it could not be configured.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedSource {
    pub source: String,
    pub reason: String,
}

/// Aggregate of one `reconcile_all` run.
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub run_id: Uuid,
    pub window: TimeSpan,
    pub reports: Vec<SourceReport>,
    pub skipped: Vec<SkippedSource>,
    /// Selected names that are not configured at all.
    pub unknown: Vec<String>,
    pub interrupted: bool,
}

impl RunSummary {
    pub fn new(window: TimeSpan) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            window,
            reports: Vec::new(),
            skipped: Vec::new(),
            unknown: Vec::new(),
            interrupted: false,
        }
    }

    pub fn total_stored(&self) -> usize {
        self.reports.iter().map(|r| r.stored).sum()
    }

    pub fn total_duplicates(&self) -> usize {
        self.reports.iter().map(|r| r.duplicates).sum()
    }

    pub fn spans_covered(&self) -> usize {
        self.reports.iter().map(|r| r.covered.len()).sum()
    }

    pub fn spans_failed(&self) -> usize {
        self.reports.iter().map(|r| r.failed.len()).sum()
    }

    pub fn report(&self, source: &str) -> Option<&SourceReport> {
        self.reports.iter().find(|r| r.source == source)
    }

    /// True when every requested source ran and every sub-span succeeded.
    pub fn is_success(&self) -> bool {
        self.spans_failed() == 0
            && self.skipped.is_empty()
            && self.unknown.is_empty()
            && !self.interrupted
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "run {} over {}", self.run_id, self.window)?;
        for report in &self.reports {
            writeln!(f, "  {}", report.to_string().replace('\n', "\n  "))?;
        }
        for skipped in &self.skipped {
            writeln!(f, "  {}: skipped ({})", skipped.source, skipped.reason)?;
        }
        for name in &self.unknown {
            writeln!(f, "  {}: unknown source", name)?;
        }
        write!(
            f,
            "total: {} stored, {} duplicate, {} span(s) covered, {} failed",
            self.total_stored(),
            self.total_duplicates(),
            self.spans_covered(),
            self.spans_failed()
        )?;
        if self.interrupted {
            write!(f, ", interrupted")?;
        }
        Ok(())
    }
}
