//! Z-score computation and ordinal grading.
//!
//! Grading is a pure function of `|z|` and an explicit [`GradeThresholds`]
//! value. Thresholds are validated on construction, so an invalid tuple can
//! never reach the engine.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{QcError, Result};
use crate::partition::Partition;
use crate::stats::{PartitionStatistics, PopulationStatistics};

/// Ordinal grade, best first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Grade {
    Excellent,
    Good,
    Satisfactory,
    Unsatisfactory,
    #[serde(rename = "Serious problem")]
    SeriousProblem,
    #[serde(rename = "No data")]
    NoData,
}

impl Grade {
    pub const ALL: [Grade; 6] = [
        Grade::Excellent,
        Grade::Good,
        Grade::Satisfactory,
        Grade::Unsatisfactory,
        Grade::SeriousProblem,
        Grade::NoData,
    ];

    pub fn label(self) -> &'static str {
        match self {
            Grade::Excellent => "Excellent",
            Grade::Good => "Good",
            Grade::Satisfactory => "Satisfactory",
            Grade::Unsatisfactory => "Unsatisfactory",
            Grade::SeriousProblem => "Serious problem",
            Grade::NoData => "No data",
        }
    }

    /// Severity tier 0 (Excellent) to 4 (Serious problem); `None` for
    /// "No data".
    pub fn tier(self) -> Option<u8> {
        match self {
            Grade::Excellent => Some(0),
            Grade::Good => Some(1),
            Grade::Satisfactory => Some(2),
            Grade::Unsatisfactory => Some(3),
            Grade::SeriousProblem => Some(4),
            Grade::NoData => None,
        }
    }

    /// Unsatisfactory or Serious problem.
    pub fn is_problem(self) -> bool {
        matches!(self, Grade::Unsatisfactory | Grade::SeriousProblem)
    }

    /// Score contribution of a grade; `None` for "No data".
    pub fn points(self) -> Option<u32> {
        match self {
            Grade::Excellent => Some(100),
            Grade::Good => Some(85),
            Grade::Satisfactory => Some(70),
            Grade::Unsatisfactory => Some(50),
            Grade::SeriousProblem => Some(25),
            Grade::NoData => None,
        }
    }
}

impl fmt::Display for Grade {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Upper `|z|` bounds of the first four grades.
///
/// Invariant: all positive and finite, and
/// `excellent_max ≤ good_max ≤ satisfactory_max ≤ unsatisfactory_max`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "ThresholdTuple")]
pub struct GradeThresholds {
    excellent_max: f64,
    good_max: f64,
    satisfactory_max: f64,
    unsatisfactory_max: f64,
}

/// Unchecked wire form of [`GradeThresholds`].
#[derive(Debug, Clone, Copy, Deserialize)]
struct ThresholdTuple {
    excellent_max: f64,
    good_max: f64,
    satisfactory_max: f64,
    unsatisfactory_max: f64,
}

impl TryFrom<ThresholdTuple> for GradeThresholds {
    type Error = QcError;

    fn try_from(t: ThresholdTuple) -> Result<Self> {
        GradeThresholds::new(
            t.excellent_max,
            t.good_max,
            t.satisfactory_max,
            t.unsatisfactory_max,
        )
    }
}

impl Default for GradeThresholds {
    fn default() -> Self {
        Self {
            excellent_max: 0.5,
            good_max: 1.0,
            satisfactory_max: 2.0,
            unsatisfactory_max: 3.0,
        }
    }
}

impl GradeThresholds {
    /// Build a validated threshold tuple.
    ///
    /// # Errors
    ///
    /// [`QcError::InvalidThresholdConfiguration`] if any bound is not a
    /// positive finite number or the bounds decrease.
    pub fn new(
        excellent_max: f64,
        good_max: f64,
        satisfactory_max: f64,
        unsatisfactory_max: f64,
    ) -> Result<Self> {
        let bounds = [
            ("excellent_max", excellent_max),
            ("good_max", good_max),
            ("satisfactory_max", satisfactory_max),
            ("unsatisfactory_max", unsatisfactory_max),
        ];
        for (name, value) in bounds {
            if !value.is_finite() || value <= 0.0 {
                return Err(QcError::InvalidThresholdConfiguration(format!(
                    "{name} must be a positive number, got {value}"
                )));
            }
        }
        for pair in bounds.windows(2) {
            let (lo_name, lo) = pair[0];
            let (hi_name, hi) = pair[1];
            if hi < lo {
                return Err(QcError::InvalidThresholdConfiguration(format!(
                    "{hi_name} ({hi}) is below {lo_name} ({lo}); thresholds must be non-decreasing"
                )));
            }
        }
        Ok(Self {
            excellent_max,
            good_max,
            satisfactory_max,
            unsatisfactory_max,
        })
    }

    /// Parse `"e,g,s,u"`.
    pub fn parse_list(s: &str) -> Result<Self> {
        let parts: Vec<&str> = s.split(',').map(str::trim).collect();
        if parts.len() != 4 {
            return Err(QcError::InvalidThresholdConfiguration(format!(
                "expected 4 comma-separated values, got {}",
                parts.len()
            )));
        }
        let mut v = [0.0f64; 4];
        for (slot, part) in v.iter_mut().zip(&parts) {
            *slot = part.parse::<f64>().map_err(|_| {
                QcError::InvalidThresholdConfiguration(format!("'{part}' is not a number"))
            })?;
        }
        Self::new(v[0], v[1], v[2], v[3])
    }

    pub fn excellent_max(&self) -> f64 {
        self.excellent_max
    }

    pub fn good_max(&self) -> f64 {
        self.good_max
    }

    pub fn satisfactory_max(&self) -> f64 {
        self.satisfactory_max
    }

    pub fn unsatisfactory_max(&self) -> f64 {
        self.unsatisfactory_max
    }

    /// Classify a z-score. Bounds are inclusive and checked in ascending
    /// order; an absent z-score is "No data".
    pub fn grade(&self, z: Option<f64>) -> Grade {
        let Some(z) = z else {
            return Grade::NoData;
        };
        let a = z.abs();
        if a <= self.excellent_max {
            Grade::Excellent
        } else if a <= self.good_max {
            Grade::Good
        } else if a <= self.satisfactory_max {
            Grade::Satisfactory
        } else if a <= self.unsatisfactory_max {
            Grade::Unsatisfactory
        } else {
            Grade::SeriousProblem
        }
    }

    /// Human-readable band of `grade`, e.g. `"1 < |z| ≤ 2"`.
    pub fn band(&self, grade: Grade) -> String {
        match grade {
            Grade::Excellent => format!("|z| ≤ {}", self.excellent_max),
            Grade::Good => format!("{} < |z| ≤ {}", self.excellent_max, self.good_max),
            Grade::Satisfactory => {
                format!("{} < |z| ≤ {}", self.good_max, self.satisfactory_max)
            }
            Grade::Unsatisfactory => {
                format!("{} < |z| ≤ {}", self.satisfactory_max, self.unsatisfactory_max)
            }
            Grade::SeriousProblem => format!("|z| > {}", self.unsatisfactory_max),
            Grade::NoData => "no z-score".to_string(),
        }
    }
}

fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}

/// Standardised deviation of `value` against `stats`, rounded to two
/// decimals.
///
/// `None` when the value is missing or the test has fewer than two values.
/// A zero standard deviation yields exactly `0.0`.
pub fn z_score(value: Option<f64>, stats: &PopulationStatistics) -> Option<f64> {
    let value = value?;
    let mean = stats.mean?;
    let std = stats.std?;
    if std == 0.0 {
        return Some(0.0);
    }
    Some(round2((value - mean) / std))
}

/// Grade of one (record, test) cell.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ZScoreResult {
    pub test: String,
    pub value: Option<f64>,
    pub z_score: Option<f64>,
    pub grade: Grade,
}

/// All grades of one record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GradedRecord {
    pub lab_code: String,
    pub brand_code: String,
    pub model_code: String,
    pub source: Option<String>,
    /// One result per test column, in test-column order.
    pub results: Vec<ZScoreResult>,
}

impl GradedRecord {
    pub fn result(&self, test: &str) -> Option<&ZScoreResult> {
        self.results.iter().find(|r| r.test == test)
    }
}

/// Grade every record of `partition` against its own population.
///
/// The scored value is part of the population it is compared with.
pub fn grade_partition(
    partition: &Partition,
    stats: &PartitionStatistics,
    thresholds: &GradeThresholds,
) -> Vec<GradedRecord> {
    partition
        .records
        .iter()
        .map(|record| {
            let results = partition
                .test_columns
                .iter()
                .map(|test| {
                    let value = record.value(test);
                    let z = stats.get(test).and_then(|s| z_score(value, s));
                    ZScoreResult {
                        test: test.clone(),
                        value,
                        z_score: z,
                        grade: thresholds.grade(z),
                    }
                })
                .collect();
            GradedRecord {
                lab_code: record.lab_code.clone(),
                brand_code: record.brand_code.clone(),
                model_code: record.model_code.clone(),
                source: record.source.clone(),
                results,
            }
        })
        .collect()
}

/// Step-by-step calculation text for one cell.
pub fn calculation_detail(value: Option<f64>, stats: &PopulationStatistics) -> String {
    let (Some(mean), Some(std)) = (stats.mean, stats.std) else {
        return "Insufficient data".to_string();
    };
    if std == 0.0 {
        return "Standard deviation is 0".to_string();
    }
    match value {
        Some(v) => format!(
            "Z = ({v:.2} - {mean:.2}) / {std:.2} = {:.2}",
            round2((v - mean) / std)
        ),
        None => "No data available".to_string(),
    }
}

/// Explanation of why `result` received its grade.
pub fn grade_explanation(result: &ZScoreResult, thresholds: &GradeThresholds) -> String {
    match result.z_score {
        Some(z) => format!(
            "Grade '{}' because |Z-Score| = {:.2} and {}",
            result.grade,
            z.abs(),
            thresholds.band(result.grade)
        ),
        None => "No data available for grading".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_thresholds() {
        let t = GradeThresholds::default();
        assert_eq!(t.excellent_max(), 0.5);
        assert_eq!(t.good_max(), 1.0);
        assert_eq!(t.satisfactory_max(), 2.0);
        assert_eq!(t.unsatisfactory_max(), 3.0);
    }

    #[test]
    fn test_grade_bands_are_inclusive() {
        let t = GradeThresholds::default();
        assert_eq!(t.grade(Some(0.5)), Grade::Excellent);
        assert_eq!(t.grade(Some(-0.51)), Grade::Good);
        assert_eq!(t.grade(Some(1.0)), Grade::Good);
        assert_eq!(t.grade(Some(2.0)), Grade::Satisfactory);
        assert_eq!(t.grade(Some(-3.0)), Grade::Unsatisfactory);
        assert_eq!(t.grade(Some(3.01)), Grade::SeriousProblem);
        assert_eq!(t.grade(None), Grade::NoData);
    }

    #[test]
    fn test_decreasing_thresholds_rejected() {
        let err = GradeThresholds::new(1.0, 0.5, 2.0, 3.0).unwrap_err();
        assert!(matches!(err, QcError::InvalidThresholdConfiguration(_)));
        assert!(err.to_string().contains("good_max"));
    }

    #[test]
    fn test_non_positive_thresholds_rejected() {
        assert!(GradeThresholds::new(0.0, 1.0, 2.0, 3.0).is_err());
        assert!(GradeThresholds::new(0.5, 1.0, f64::NAN, 3.0).is_err());
    }

    #[test]
    fn test_equal_thresholds_allowed() {
        let t = GradeThresholds::new(1.0, 1.0, 1.0, 1.0).unwrap();
        assert_eq!(t.grade(Some(1.0)), Grade::Excellent);
        assert_eq!(t.grade(Some(1.01)), Grade::SeriousProblem);
    }

    #[test]
    fn test_parse_list() {
        let t = GradeThresholds::parse_list("0.4, 0.9, 1.8, 2.7").unwrap();
        assert_eq!(t.good_max(), 0.9);
        assert!(GradeThresholds::parse_list("1,2,3").is_err());
        assert!(GradeThresholds::parse_list("1,x,3,4").is_err());
        assert!(GradeThresholds::parse_list("3,2,1,4").is_err());
    }

    #[test]
    fn test_deserialize_validates() {
        let ok: GradeThresholds = serde_json::from_str(
            r#"{"excellent_max":0.5,"good_max":1.0,"satisfactory_max":2.0,"unsatisfactory_max":3.0}"#,
        )
        .unwrap();
        assert_eq!(ok, GradeThresholds::default());

        let bad = serde_json::from_str::<GradeThresholds>(
            r#"{"excellent_max":1.0,"good_max":0.5,"satisfactory_max":2.0,"unsatisfactory_max":3.0}"#,
        );
        assert!(bad.is_err());
    }

    #[test]
    fn test_grade_serializes_as_label() {
        assert_eq!(
            serde_json::to_string(&Grade::SeriousProblem).unwrap(),
            "\"Serious problem\""
        );
        assert_eq!(serde_json::to_string(&Grade::NoData).unwrap(), "\"No data\"");
    }

    #[test]
    fn test_points_fall_with_tier() {
        let points: Vec<Option<u32>> = Grade::ALL.iter().map(|g| g.points()).collect();
        assert_eq!(
            points,
            vec![Some(100), Some(85), Some(70), Some(50), Some(25), None]
        );
    }

    #[test]
    fn test_z_score_fallbacks() {
        let constant = PopulationStatistics::from_values("x", &[1.0, 1.0, 1.0]);
        assert_eq!(z_score(Some(1.0), &constant), Some(0.0));
        assert_eq!(z_score(None, &constant), None);

        let single = PopulationStatistics::from_values("x", &[1.0]);
        assert_eq!(z_score(Some(1.0), &single), None);

        let empty = PopulationStatistics::from_values("x", &[]);
        assert_eq!(z_score(Some(1.0), &empty), None);
    }

    #[test]
    fn test_calculation_detail_text() {
        let s = PopulationStatistics::from_values("x", &[1.0, 3.0]);
        let detail = calculation_detail(Some(3.0), &s);
        assert!(detail.starts_with("Z = (3.00 - 2.00) / 1.41"));
        assert_eq!(calculation_detail(None, &s), "No data available");
        let constant = PopulationStatistics::from_values("x", &[2.0, 2.0]);
        assert_eq!(calculation_detail(Some(2.0), &constant), "Standard deviation is 0");
        let single = PopulationStatistics::from_values("x", &[2.0]);
        assert_eq!(calculation_detail(Some(2.0), &single), "Insufficient data");
    }

    #[test]
    fn test_grade_explanation_names_band() {
        let t = GradeThresholds::default();
        let r = ZScoreResult {
            test: "RBC".to_string(),
            value: Some(16.0),
            z_score: Some(2.85),
            grade: Grade::Unsatisfactory,
        };
        let text = grade_explanation(&r, &t);
        assert!(text.contains("Unsatisfactory"));
        assert!(text.contains("2 < |z| ≤ 3"));
    }
}
