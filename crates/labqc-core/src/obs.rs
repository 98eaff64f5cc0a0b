//! Structured lifecycle events for a QC batch.
//!
//! Every event carries an `event` field so log pipelines can filter on it.
//! [`AnalysisSpan`] tags everything logged during a batch with its run id.

use tracing::{info, warn};

/// RAII guard holding a batch-scoped span.
pub struct AnalysisSpan {
    _span: tracing::span::EnteredSpan,
}

impl AnalysisSpan {
    pub fn enter(run_id: &str) -> Self {
        let span = tracing::info_span!("labqc.batch", run_id = %run_id);
        Self {
            _span: span.entered(),
        }
    }
}

/// A source was rejected and left out of the merge.
pub fn emit_source_skipped(source: &str, reason: &str) {
    warn!(event = "source.skipped", source = %source, reason = %reason);
}

/// A source passed validation and joined the merge.
pub fn emit_source_merged(source: &str, records: usize, test_columns: usize) {
    info!(
        event = "source.merged",
        source = %source,
        records = records,
        test_columns = test_columns,
    );
}

/// A test had too few values for a standard deviation.
pub fn emit_insufficient_data(model_code: &str, test: &str, count: usize) {
    warn!(
        event = "test.insufficient_data",
        model_code = %model_code,
        test = %test,
        count = count,
    );
}

/// One partition finished analysis.
pub fn emit_partition_analyzed(
    model_code: &str,
    records: usize,
    quality_issues: usize,
    problem_grades: usize,
) {
    info!(
        event = "partition.analyzed",
        model_code = %model_code,
        records = records,
        quality_issues = quality_issues,
        problem_grades = problem_grades,
    );
}

/// The whole batch finished.
pub fn emit_batch_finished(run_id: &str, partitions: usize, records: usize, duration_ms: u64) {
    info!(
        event = "batch.finished",
        run_id = %run_id,
        partitions = partitions,
        records = records,
        duration_ms = duration_ms,
    );
}
