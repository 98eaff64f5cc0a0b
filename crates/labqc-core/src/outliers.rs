//! Structural data-quality screening.
//!
//! Independent of grading: issues are derived from the raw distribution
//! (interquartile range, zero and negative counts), never from z-scores.

use serde::{Deserialize, Serialize};

use crate::partition::Partition;
use crate::stats::{PartitionStatistics, PopulationStatistics};
use crate::table::Measurement;

/// IQR multiplier for the extreme-value fences.
pub const EXTREME_IQR_MULTIPLIER: f64 = 3.0;

/// Fraction above which extreme or zero counts are considered widespread.
pub const RATE_THRESHOLD: f64 = 0.10;

/// Kind of quality issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueKind {
    /// Value outside `[q1 − 3·IQR, q3 + 3·IQR]`.
    ExtremeValue,
    /// More than 10% of submitted entries were literal zeros.
    HighZeroRate,
    /// At least one negative value.
    NegativeValue,
}

impl IssueKind {
    pub fn label(self) -> &'static str {
        match self {
            IssueKind::ExtremeValue => "Extreme Values",
            IssueKind::HighZeroRate => "High Zero Values",
            IssueKind::NegativeValue => "Negative Values",
        }
    }
}

/// Issue severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueSeverity {
    Medium,
    High,
}

/// A quality issue for one test of one partition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityIssue {
    pub test: String,
    pub kind: IssueKind,
    pub severity: IssueSeverity,
    /// Number of affected entries.
    pub count: usize,
    /// Lab codes of affected records, in record order.
    pub affected_labs: Vec<String>,
}

/// Screen every test of `partition`.
///
/// `stats` must have been computed from the same partition. Issues are
/// ordered by test, then extreme / zero-rate / negative.
pub fn detect_quality_issues(
    partition: &Partition,
    stats: &PartitionStatistics,
) -> Vec<QualityIssue> {
    let mut issues = Vec::new();
    for test in &partition.test_columns {
        if let Some(s) = stats.get(test) {
            issues.extend(screen_test(partition, s));
        }
    }
    issues
}

fn screen_test(partition: &Partition, stats: &PopulationStatistics) -> Vec<QualityIssue> {
    let test = stats.test.as_str();
    let mut issues = Vec::new();

    if let (Some(q1), Some(q3)) = (stats.q1, stats.q3) {
        let iqr = q3 - q1;
        let lower = q1 - EXTREME_IQR_MULTIPLIER * iqr;
        let upper = q3 + EXTREME_IQR_MULTIPLIER * iqr;
        let labs = labs_where(partition, test, |m| {
            m.value().is_some_and(|v| v < lower || v > upper)
        });
        if !labs.is_empty() {
            let severity = if labs.len() as f64 > stats.count as f64 * RATE_THRESHOLD {
                IssueSeverity::High
            } else {
                IssueSeverity::Medium
            };
            issues.push(issue(test, IssueKind::ExtremeValue, severity, labs));
        }
    }

    let submitted = partition
        .records
        .iter()
        .filter(|r| r.measurement(test).was_submitted())
        .count();
    let zero_labs = labs_where(partition, test, |m| matches!(m, Measurement::NotMeasured));
    if submitted > 0 && zero_labs.len() as f64 > submitted as f64 * RATE_THRESHOLD {
        issues.push(issue(
            test,
            IssueKind::HighZeroRate,
            IssueSeverity::Medium,
            zero_labs,
        ));
    }

    let negative_labs = labs_where(partition, test, |m| m.value().is_some_and(|v| v < 0.0));
    if !negative_labs.is_empty() {
        issues.push(issue(
            test,
            IssueKind::NegativeValue,
            IssueSeverity::High,
            negative_labs,
        ));
    }

    issues
}

fn labs_where(
    partition: &Partition,
    test: &str,
    pred: impl Fn(&Measurement) -> bool,
) -> Vec<String> {
    partition
        .records
        .iter()
        .filter(|r| pred(&r.measurement(test)))
        .map(|r| r.lab_code.clone())
        .collect()
}

fn issue(test: &str, kind: IssueKind, severity: IssueSeverity, labs: Vec<String>) -> QualityIssue {
    QualityIssue {
        test: test.to_string(),
        kind,
        severity,
        count: labs.len(),
        affected_labs: labs,
    }
}
