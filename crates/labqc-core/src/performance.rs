//! Per-lab performance summaries and per-test rankings.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::grading::{Grade, GradedRecord};

/// Performance of one lab within one partition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabPerformance {
    pub lab_code: String,
    /// Cells with a grade other than "No data".
    pub graded_tests: usize,
    /// Graded cells that are not problem grades.
    pub passed_tests: usize,
    /// Percent; 0 with no graded tests.
    pub pass_rate: f64,
    pub mean_abs_z: Option<f64>,
    /// Worst graded result; "No data" when nothing was graded.
    pub overall_grade: Grade,
    /// Mean grade points; 0 with no graded tests.
    pub score: f64,
}

impl LabPerformance {
    fn from_grades(lab_code: &str, cells: &[(Grade, Option<f64>)]) -> Self {
        let graded: Vec<&(Grade, Option<f64>)> =
            cells.iter().filter(|(g, _)| *g != Grade::NoData).collect();
        let graded_tests = graded.len();
        let passed_tests = graded.iter().filter(|(g, _)| !g.is_problem()).count();

        let (pass_rate, score) = if graded_tests == 0 {
            (0.0, 0.0)
        } else {
            let points: u32 = graded.iter().filter_map(|(g, _)| g.points()).sum();
            (
                passed_tests as f64 / graded_tests as f64 * 100.0,
                points as f64 / graded_tests as f64,
            )
        };

        let abs: Vec<f64> = graded.iter().filter_map(|(_, z)| z.map(f64::abs)).collect();
        let mean_abs_z = if abs.is_empty() {
            None
        } else {
            Some(abs.iter().sum::<f64>() / abs.len() as f64)
        };

        let overall_grade = graded
            .iter()
            .map(|(g, _)| *g)
            .max()
            .unwrap_or(Grade::NoData);

        Self {
            lab_code: lab_code.to_string(),
            graded_tests,
            passed_tests,
            pass_rate,
            mean_abs_z,
            overall_grade,
            score,
        }
    }
}

/// Summaries for every lab in `graded`, in first-appearance order.
///
/// A lab submitting several records is summarised over all of them.
pub fn lab_performance(graded: &[GradedRecord]) -> Vec<LabPerformance> {
    let mut order: Vec<&str> = Vec::new();
    let mut cells: HashMap<&str, Vec<(Grade, Option<f64>)>> = HashMap::new();
    for record in graded {
        let entry = cells.entry(record.lab_code.as_str()).or_insert_with(|| {
            order.push(record.lab_code.as_str());
            Vec::new()
        });
        entry.extend(record.results.iter().map(|r| (r.grade, r.z_score)));
    }
    order
        .into_iter()
        .map(|lab| LabPerformance::from_grades(lab, cells.get(lab).map_or(&[][..], Vec::as_slice)))
        .collect()
}

/// Summary for one lab, if present.
pub fn lab_summary(graded: &[GradedRecord], lab_code: &str) -> Option<LabPerformance> {
    let cells: Vec<(Grade, Option<f64>)> = graded
        .iter()
        .filter(|r| r.lab_code == lab_code)
        .flat_map(|r| r.results.iter().map(|c| (c.grade, c.z_score)))
        .collect();
    if graded.iter().any(|r| r.lab_code == lab_code) {
        Some(LabPerformance::from_grades(lab_code, &cells))
    } else {
        None
    }
}

/// One ranked lab for one test.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedLab {
    pub lab_code: String,
    pub value: Option<f64>,
    pub z_score: f64,
    pub grade: Grade,
}

/// Best and worst labs for one test.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestRanking {
    pub test: String,
    /// Smallest `|z|` first.
    pub best: Vec<RankedLab>,
    /// Largest `|z|` first.
    pub attention: Vec<RankedLab>,
}

/// Rank labs on `test` by `|z|`, keeping up to `limit` at each end.
///
/// "No data" cells are excluded. Ties keep input order.
pub fn rank_labs(graded: &[GradedRecord], test: &str, limit: usize) -> TestRanking {
    let candidates: Vec<RankedLab> = graded
        .iter()
        .filter_map(|record| {
            let r = record.result(test)?;
            let z = r.z_score?;
            Some(RankedLab {
                lab_code: record.lab_code.clone(),
                value: r.value,
                z_score: z,
                grade: r.grade,
            })
        })
        .collect();

    let mut best = candidates.clone();
    best.sort_by(|a, b| a.z_score.abs().total_cmp(&b.z_score.abs()));
    best.truncate(limit);

    let mut attention = candidates;
    attention.sort_by(|a, b| b.z_score.abs().total_cmp(&a.z_score.abs()));
    attention.truncate(limit);

    TestRanking {
        test: test.to_string(),
        best,
        attention,
    }
}
