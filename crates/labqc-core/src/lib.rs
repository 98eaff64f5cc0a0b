//! LabQC Core Library
//!
//! Inter-laboratory quality control for blood-test batches: validation,
//! missing-value normalisation, multi-source merge, per-model statistics,
//! outlier screening, z-score grading, and problem aggregation.

pub mod config;
pub mod error;
pub mod grading;
pub mod ingest;
pub mod merge;
pub mod metrics;
pub mod normalize;
pub mod obs;
pub mod outliers;
pub mod partition;
pub mod performance;
pub mod pipeline;
pub mod problems;
pub mod report;
pub mod schema;
pub mod stats;
pub mod table;
pub mod telemetry;

pub use config::{AnalysisConfig, CliOverrides};
pub use error::{Diagnostic, QcError, Result};
pub use grading::{
    calculation_detail, grade_explanation, grade_partition, z_score, Grade, GradeThresholds,
    GradedRecord, ZScoreResult,
};
pub use ingest::{parse_csv_table, read_csv_sources, read_csv_table, LoadedSources};
pub use merge::{ingest_sources, merge_tables, MergeOutcome};
pub use normalize::{normalize_cell, normalize_table};
pub use outliers::{detect_quality_issues, IssueKind, IssueSeverity, QualityIssue};
pub use partition::{partition_by_model, Partition, PartitionSet};
pub use performance::{lab_performance, lab_summary, rank_labs, LabPerformance, TestRanking};
pub use pipeline::{analyze_partition, Analyzer, BatchReport, DatasetSummary, PartitionAnalysis};
pub use problems::{summarize_problems, AlertLevel, ProblemAlert, ProblemSummary};
pub use report::{
    read_report_artifact, render_markdown, write_report_artifact, write_result_csv,
    write_result_tables,
};
pub use schema::{reconcile_columns, validate_table, ValidatedTable};
pub use stats::{compute_statistics, missing_data_profile, PartitionStatistics, PopulationStatistics};
pub use table::{Cell, Measurement, RawTable, Record, Table};
pub use telemetry::init_tracing;

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
