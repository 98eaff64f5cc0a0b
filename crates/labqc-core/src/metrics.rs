//! Process-wide QC counters.
//!
//! Call sites bump counters silently; [`Metrics::flush`] emits them as one
//! `info!` event at the end of a batch.

use std::sync::atomic::{AtomicU64, Ordering};

/// Global metrics singleton.
pub static METRICS: Metrics = Metrics::new();

pub struct Metrics {
    records_ingested: AtomicU64,
    sources_skipped: AtomicU64,
    partitions_analyzed: AtomicU64,
    quality_issues: AtomicU64,
    problem_grades: AtomicU64,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub const fn new() -> Self {
        Self {
            records_ingested: AtomicU64::new(0),
            sources_skipped: AtomicU64::new(0),
            partitions_analyzed: AtomicU64::new(0),
            quality_issues: AtomicU64::new(0),
            problem_grades: AtomicU64::new(0),
        }
    }

    pub fn add_records_ingested(&self, n: u64) {
        self.records_ingested.fetch_add(n, Ordering::Relaxed);
        tracing::trace!(metric = "records_ingested", n, "counter incremented");
    }

    pub fn inc_sources_skipped(&self) {
        self.sources_skipped.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "sources_skipped", "counter incremented");
    }

    pub fn inc_partitions_analyzed(&self) {
        self.partitions_analyzed.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "partitions_analyzed", "counter incremented");
    }

    pub fn add_quality_issues(&self, n: u64) {
        self.quality_issues.fetch_add(n, Ordering::Relaxed);
        tracing::trace!(metric = "quality_issues", n, "counter incremented");
    }

    /// Count of Unsatisfactory and Serious-problem grades.
    pub fn add_problem_grades(&self, n: u64) {
        self.problem_grades.fetch_add(n, Ordering::Relaxed);
        tracing::trace!(metric = "problem_grades", n, "counter incremented");
    }

    /// Emit all current counter values as a single `info!` event.
    pub fn flush(&self) {
        tracing::info!(
            metric = "flush",
            records_ingested = self.records_ingested(),
            sources_skipped = self.sources_skipped(),
            partitions_analyzed = self.partitions_analyzed(),
            quality_issues = self.quality_issues(),
            problem_grades = self.problem_grades(),
        );
    }

    pub fn records_ingested(&self) -> u64 {
        self.records_ingested.load(Ordering::Relaxed)
    }

    pub fn sources_skipped(&self) -> u64 {
        self.sources_skipped.load(Ordering::Relaxed)
    }

    pub fn partitions_analyzed(&self) -> u64 {
        self.partitions_analyzed.load(Ordering::Relaxed)
    }

    pub fn quality_issues(&self) -> u64 {
        self.quality_issues.load(Ordering::Relaxed)
    }

    pub fn problem_grades(&self) -> u64 {
        self.problem_grades.load(Ordering::Relaxed)
    }

    /// Reset all counters to zero.
    pub fn reset(&self) {
        self.records_ingested.store(0, Ordering::Relaxed);
        self.sources_skipped.store(0, Ordering::Relaxed);
        self.partitions_analyzed.store(0, Ordering::Relaxed);
        self.quality_issues.store(0, Ordering::Relaxed);
        self.problem_grades.store(0, Ordering::Relaxed);
    }
}
