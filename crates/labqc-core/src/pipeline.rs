//! End-to-end batch analysis.
//!
//! One partition is the unit of work: statistics first, then the outlier
//! detector and the grading engine side by side, then aggregation.
//! Partitions share nothing, so [`Analyzer::run`] fans them out over the
//! rayon pool.

use std::time::Instant;

use chrono::{DateTime, Utc};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::config::AnalysisConfig;
use crate::error::{Diagnostic, QcError, Result};
use crate::grading::{grade_partition, GradeThresholds, GradedRecord};
use crate::ingest::LoadedSources;
use crate::merge::{ingest_sources, MergeOutcome};
use crate::metrics::METRICS;
use crate::obs::{
    emit_batch_finished, emit_insufficient_data, emit_partition_analyzed, AnalysisSpan,
};
use crate::outliers::{detect_quality_issues, QualityIssue};
use crate::partition::{partition_by_model, Partition, PartitionSet};
use crate::performance::{lab_performance, LabPerformance};
use crate::problems::{summarize_problems, ProblemSummary};
use crate::stats::{compute_statistics, missing_data_profile, MissingData, PartitionStatistics};

/// Everything derived from one partition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PartitionAnalysis {
    pub model_code: String,
    pub record_count: usize,
    pub test_columns: Vec<String>,
    pub statistics: PartitionStatistics,
    pub missing_data: Vec<MissingData>,
    pub quality_issues: Vec<QualityIssue>,
    pub graded: Vec<GradedRecord>,
    pub problems: ProblemSummary,
    pub lab_performance: Vec<LabPerformance>,
    pub diagnostics: Vec<Diagnostic>,
}

/// Analyse one partition against `thresholds`.
pub fn analyze_partition(partition: &Partition, thresholds: &GradeThresholds) -> PartitionAnalysis {
    let statistics = compute_statistics(partition);

    let diagnostics: Vec<Diagnostic> = statistics
        .tests
        .iter()
        .filter(|s| !s.is_sufficient())
        .map(|s| {
            emit_insufficient_data(&partition.model_code, &s.test, s.count);
            Diagnostic::InsufficientData {
                model_code: partition.model_code.clone(),
                test: s.test.clone(),
                count: s.count,
            }
        })
        .collect();

    let (quality_issues, graded) = rayon::join(
        || detect_quality_issues(partition, &statistics),
        || grade_partition(partition, &statistics, thresholds),
    );

    let problems = summarize_problems(&graded);
    let lab_performance = lab_performance(&graded);
    let missing_data = missing_data_profile(partition);

    let problem_grades = problems.problem_grade_count();
    METRICS.inc_partitions_analyzed();
    METRICS.add_quality_issues(quality_issues.len() as u64);
    METRICS.add_problem_grades(problem_grades as u64);
    emit_partition_analyzed(
        &partition.model_code,
        partition.len(),
        quality_issues.len(),
        problem_grades,
    );

    PartitionAnalysis {
        model_code: partition.model_code.clone(),
        record_count: partition.len(),
        test_columns: partition.test_columns.clone(),
        statistics,
        missing_data,
        quality_issues,
        graded,
        problems,
        lab_performance,
        diagnostics,
    }
}

/// Dataset-level overview.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetSummary {
    pub total_records: usize,
    /// Accepted sources, in input order.
    pub sources: Vec<String>,
    pub model_codes: Vec<String>,
    pub test_columns: Vec<String>,
    /// Percent of test cells without a value.
    pub missing_pct: f64,
}

/// Result of one batch run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchReport {
    pub run_id: Uuid,
    pub generated_at: DateTime<Utc>,
    pub thresholds: GradeThresholds,
    pub summary: DatasetSummary,
    /// Ingestion diagnostics followed by per-partition diagnostics.
    pub diagnostics: Vec<Diagnostic>,
    /// In partition order.
    pub partitions: Vec<PartitionAnalysis>,
}

impl BatchReport {
    pub fn partition(&self, model_code: &str) -> Option<&PartitionAnalysis> {
        self.partitions.iter().find(|p| p.model_code == model_code)
    }

    pub fn quality_issue_count(&self) -> usize {
        self.partitions.iter().map(|p| p.quality_issues.len()).sum()
    }

    pub fn has_critical(&self) -> bool {
        self.partitions.iter().any(|p| !p.problems.critical.is_empty())
    }
}

/// Merged, partitioned input ready for analysis.
#[derive(Debug, Clone)]
pub struct PreparedBatch {
    /// Accepted sources, in input order.
    pub sources: Vec<String>,
    /// Unreadable and rejected sources plus schema differences.
    pub diagnostics: Vec<Diagnostic>,
    pub partitions: PartitionSet,
    pub summary: DatasetSummary,
}

/// Batch driver holding the resolved configuration.
#[derive(Debug, Clone, Default)]
pub struct Analyzer {
    config: AnalysisConfig,
}

impl Analyzer {
    pub fn new(config: AnalysisConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &AnalysisConfig {
        &self.config
    }

    /// Validate, normalise, merge, and partition `sources`.
    ///
    /// Files that could not be read arrive as rejected entries of
    /// [`LoadedSources`] and are reported like sources that failed validation.
    ///
    /// # Errors
    ///
    /// [`QcError::NoUsableSource`] if every source was rejected.
    pub fn prepare(&self, sources: impl Into<LoadedSources>) -> Result<PreparedBatch> {
        let LoadedSources {
            tables,
            mut rejected,
        } = sources.into();
        let submitted = tables.len() + rejected.len();
        let mut merge = ingest_sources(tables, &self.config.column_aliases);
        rejected.append(&mut merge.diagnostics);
        merge.diagnostics = rejected;
        if merge.sources.is_empty() {
            let reasons: Vec<String> = merge
                .skipped()
                .iter()
                .map(|(s, r)| format!("{s}: {r}"))
                .collect();
            return Err(QcError::NoUsableSource(if reasons.is_empty() {
                format!("{submitted} source(s) given")
            } else {
                reasons.join("; ")
            }));
        }

        let MergeOutcome {
            table,
            sources,
            diagnostics,
        } = merge;
        let missing_pct = table.missing_percentage();
        let total_records = table.len();
        let test_columns = table.test_columns.clone();
        let partitions = partition_by_model(table);
        let summary = DatasetSummary {
            total_records,
            sources: sources.clone(),
            model_codes: partitions
                .model_codes()
                .into_iter()
                .map(str::to_string)
                .collect(),
            test_columns,
            missing_pct,
        };
        Ok(PreparedBatch {
            sources,
            diagnostics,
            partitions,
            summary,
        })
    }

    /// Analyse every partition.
    pub fn run(&self, sources: impl Into<LoadedSources>) -> Result<BatchReport> {
        let prepared = self.prepare(sources)?;
        Ok(self.analyze_prepared(prepared))
    }

    /// Analyse only the partition of `model_code`.
    ///
    /// # Errors
    ///
    /// [`QcError::UnknownModel`] if no record carries that model code.
    pub fn analyze_model(
        &self,
        sources: impl Into<LoadedSources>,
        model_code: &str,
    ) -> Result<BatchReport> {
        let mut prepared = self.prepare(sources)?;
        prepared.partitions.retain_model(model_code);
        if prepared.partitions.is_empty() {
            return Err(QcError::UnknownModel(model_code.to_string()));
        }
        Ok(self.analyze_prepared(prepared))
    }

    fn analyze_prepared(&self, prepared: PreparedBatch) -> BatchReport {
        let run_id = Uuid::new_v4();
        let _span = AnalysisSpan::enter(&run_id.to_string());
        let started = Instant::now();
        let thresholds = self.config.thresholds;

        info!(
            partitions = prepared.partitions.len(),
            records = prepared.summary.total_records,
            parallel = self.config.parallel,
            "analysing batch"
        );

        let partitions: Vec<PartitionAnalysis> = if self.config.parallel {
            // Rayon workers start outside the batch span and may not share
            // the caller's thread-local subscriber.
            let span = tracing::Span::current();
            let dispatch = tracing::dispatcher::get_default(|d| d.clone());
            prepared
                .partitions
                .as_slice()
                .par_iter()
                .map(|p| {
                    tracing::dispatcher::with_default(&dispatch, || {
                        span.in_scope(|| analyze_partition(p, &thresholds))
                    })
                })
                .collect()
        } else {
            prepared
                .partitions
                .iter()
                .map(|p| analyze_partition(p, &thresholds))
                .collect()
        };

        let mut diagnostics = prepared.diagnostics;
        for analysis in &partitions {
            diagnostics.extend(analysis.diagnostics.iter().cloned());
        }

        let analysed_records: usize = partitions.iter().map(|p| p.record_count).sum();
        emit_batch_finished(
            &run_id.to_string(),
            partitions.len(),
            analysed_records,
            started.elapsed().as_millis() as u64,
        );
        METRICS.flush();

        BatchReport {
            run_id,
            generated_at: Utc::now(),
            thresholds,
            summary: prepared.summary,
            diagnostics,
            partitions,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grading::Grade;
    use crate::table::{Cell, RawTable};

    fn source(name: &str, rows: &[[&str; 4]]) -> RawTable {
        let mut t = RawTable::new(
            name,
            ["Lab Code", "Brand code", "Model code", "RBC"]
                .iter()
                .map(|c| c.to_string())
                .collect(),
        );
        for r in rows {
            t.push_row(r.iter().map(|c| Cell::parse(c)).collect());
        }
        t
    }

    #[test]
    fn test_run_partitions_and_grades() {
        let raw = source(
            "a.csv",
            &[
                ["1", "5", "602", "10"],
                ["2", "5", "602", "10"],
                ["3", "5", "602", "10"],
                ["4", "5", "602", "10"],
                ["5", "5", "602", "16"],
                ["6", "9", "700", "5"],
            ],
        );
        let report = Analyzer::default().run(vec![raw]).unwrap();
        assert_eq!(report.summary.total_records, 6);
        assert_eq!(report.summary.model_codes, vec!["602".to_string(), "700".to_string()]);
        assert_eq!(report.partitions.len(), 2);

        let p = report.partition("602").unwrap();
        let z: Vec<Option<f64>> = p.graded.iter().map(|g| g.results[0].z_score).collect();
        assert_eq!(z[4], Some(1.79));
        assert_eq!(z[0], Some(-0.45));

        // Single-record partition has no std for RBC.
        let single = report.partition("700").unwrap();
        assert_eq!(single.graded[0].results[0].grade, Grade::NoData);
        assert!(report.diagnostics.iter().any(|d| matches!(
            d,
            Diagnostic::InsufficientData { model_code, count: 1, .. } if model_code == "700"
        )));
    }

    #[test]
    fn test_sequential_and_parallel_agree() {
        let raw = source(
            "a.csv",
            &[
                ["1", "5", "602", "4.1"],
                ["2", "5", "602", "4.6"],
                ["3", "5", "700", "5.0"],
                ["4", "5", "700", "5.5"],
            ],
        );
        let parallel = Analyzer::default().run(vec![raw.clone()]).unwrap();
        let sequential = Analyzer::new(AnalysisConfig {
            parallel: false,
            ..AnalysisConfig::default()
        })
        .run(vec![raw])
        .unwrap();
        assert_eq!(parallel.partitions, sequential.partitions);
    }

    #[test]
    fn test_unreadable_file_is_reported_not_fatal() {
        let raw = source(
            "good.csv",
            &[["1", "5", "602", "4.1"], ["2", "5", "602", "4.6"]],
        );
        let loaded = LoadedSources {
            tables: vec![raw],
            rejected: vec![Diagnostic::SkippedSource {
                source_name: "latin1.csv".to_string(),
                reason: "csv error: truncated".to_string(),
            }],
        };
        let report = Analyzer::default().run(loaded).unwrap();
        assert_eq!(report.summary.sources, vec!["good.csv".to_string()]);
        assert_eq!(report.partitions.len(), 1);
        assert!(matches!(
            report.diagnostics.first(),
            Some(Diagnostic::SkippedSource { source_name, .. }) if source_name == "latin1.csv"
        ));
    }

    #[test]
    fn test_only_unreadable_files_is_error_naming_them() {
        let loaded = LoadedSources {
            tables: Vec::new(),
            rejected: vec![Diagnostic::SkippedSource {
                source_name: "gone.csv".to_string(),
                reason: "io error: not found".to_string(),
            }],
        };
        let err = Analyzer::default().run(loaded).unwrap_err();
        assert!(matches!(err, QcError::NoUsableSource(ref m) if m.contains("gone.csv")));
    }

    #[derive(Clone, Default)]
    struct Captured(std::sync::Arc<std::sync::Mutex<Vec<u8>>>);

    impl std::io::Write for Captured {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    impl<'a> tracing_subscriber::fmt::MakeWriter<'a> for Captured {
        type Writer = Captured;

        fn make_writer(&'a self) -> Self::Writer {
            self.clone()
        }
    }

    #[test]
    fn test_parallel_partition_events_carry_run_id() {
        let captured = Captured::default();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(captured.clone())
            .with_ansi(false)
            .with_max_level(tracing::Level::INFO)
            .finish();
        let _guard = tracing::subscriber::set_default(subscriber);

        let raw = source(
            "a.csv",
            &[
                ["1", "5", "602", "4.1"],
                ["2", "5", "602", "4.6"],
                ["3", "5", "700", "5.0"],
                ["4", "5", "700", "5.5"],
                ["5", "5", "800", "6.0"],
                ["6", "5", "800", "6.2"],
            ],
        );
        let report = Analyzer::default().run(vec![raw]).unwrap();

        let out = String::from_utf8(captured.0.lock().unwrap().clone()).unwrap();
        let analysed: Vec<&str> = out
            .lines()
            .filter(|l| l.contains("partition.analyzed"))
            .collect();
        assert_eq!(analysed.len(), 3);
        let run_id = format!("run_id={}", report.run_id);
        assert!(analysed.iter().all(|l| l.contains(&run_id)), "{out}");
    }

    #[test]
    fn test_all_sources_rejected_is_error() {
        let mut bad = RawTable::new("bad.csv", vec!["RBC".to_string()]);
        bad.push_row(vec![Cell::Number(4.0)]);
        let err = Analyzer::default().run(vec![bad]).unwrap_err();
        assert!(matches!(err, QcError::NoUsableSource(ref m) if m.contains("bad.csv")));
    }

    #[test]
    fn test_analyze_model_filters_and_rejects_unknown() {
        let raw = source(
            "a.csv",
            &[["1", "5", "602", "4.1"], ["2", "5", "700", "4.6"]],
        );
        let report = Analyzer::default()
            .analyze_model(vec![raw.clone()], "700")
            .unwrap();
        assert_eq!(report.partitions.len(), 1);
        assert_eq!(report.partitions[0].model_code, "700");

        let err = Analyzer::default().analyze_model(vec![raw], "999").unwrap_err();
        assert!(matches!(err, QcError::UnknownModel(_)));
    }
}
