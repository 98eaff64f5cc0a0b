//! Population statistics per partition and test.
//!
//! [`PopulationStatistics`] is the single source of truth for mean, standard
//! deviation, and quartiles; the outlier detector and the grading engine both
//! read it and never recompute their own.

use serde::{Deserialize, Serialize};

use crate::partition::Partition;

/// CV above which a test is flagged as highly variable (percent).
pub const HIGH_CV_PERCENT: f64 = 30.0;

/// Sample counts below this are flagged as thin.
pub const LOW_SAMPLE_COUNT: usize = 10;

/// Descriptive statistics of one test's non-missing values.
///
/// With no values every statistic is `None`. With one value `std` and `cv`
/// are `None`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PopulationStatistics {
    pub test: String,
    pub count: usize,
    pub mean: Option<f64>,
    /// Sample standard deviation (n − 1).
    pub std: Option<f64>,
    pub median: Option<f64>,
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub q1: Option<f64>,
    pub q3: Option<f64>,
    /// `std / mean × 100`; `None` when `mean` is zero or `std` is absent.
    pub cv: Option<f64>,
}

impl PopulationStatistics {
    /// Compute statistics over `values`, which must contain no missing
    /// entries.
    pub fn from_values(test: impl Into<String>, values: &[f64]) -> Self {
        let test = test.into();
        let n = values.len();
        if n == 0 {
            return Self {
                test,
                count: 0,
                mean: None,
                std: None,
                median: None,
                min: None,
                max: None,
                q1: None,
                q3: None,
                cv: None,
            };
        }

        let mut sorted = values.to_vec();
        sorted.sort_by(f64::total_cmp);

        // Constant data is exact: summation error must not leak into std.
        let constant = sorted[0] == sorted[n - 1];
        let mean = if constant {
            sorted[0]
        } else {
            values.iter().sum::<f64>() / n as f64
        };
        let std = if n >= 2 && constant {
            Some(0.0)
        } else if n >= 2 {
            let ss: f64 = values.iter().map(|v| (v - mean).powi(2)).sum();
            Some((ss / (n - 1) as f64).sqrt())
        } else {
            None
        };
        let cv = match std {
            Some(s) if mean != 0.0 => Some(s / mean * 100.0),
            _ => None,
        };

        Self {
            test,
            count: n,
            mean: Some(mean),
            std,
            median: Some(quantile_sorted(&sorted, 0.5)),
            min: sorted.first().copied(),
            max: sorted.last().copied(),
            q1: Some(quantile_sorted(&sorted, 0.25)),
            q3: Some(quantile_sorted(&sorted, 0.75)),
            cv,
        }
    }

    /// Interquartile range `q3 − q1`.
    pub fn iqr(&self) -> Option<f64> {
        Some(self.q3? - self.q1?)
    }

    /// `true` when a standard deviation exists (at least two values).
    pub fn is_sufficient(&self) -> bool {
        self.std.is_some()
    }

    pub fn high_variability(&self) -> bool {
        self.cv.is_some_and(|cv| cv > HIGH_CV_PERCENT)
    }

    pub fn low_sample_count(&self) -> bool {
        self.count < LOW_SAMPLE_COUNT
    }
}

/// Linear-interpolation quantile (R-7) on sorted, non-empty data.
fn quantile_sorted(sorted: &[f64], p: f64) -> f64 {
    let n = sorted.len();
    if n == 1 {
        return sorted[0];
    }
    let h = (n - 1) as f64 * p;
    let j = h.floor() as usize;
    let g = h - h.floor();
    if j + 1 >= n {
        sorted[n - 1]
    } else {
        (1.0 - g) * sorted[j] + g * sorted[j + 1]
    }
}

/// Statistics for every test of one partition, in test-column order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PartitionStatistics {
    pub model_code: String,
    pub tests: Vec<PopulationStatistics>,
}

impl PartitionStatistics {
    pub fn get(&self, test: &str) -> Option<&PopulationStatistics> {
        self.tests.iter().find(|s| s.test == test)
    }
}

/// Compute statistics for every test column of `partition`.
pub fn compute_statistics(partition: &Partition) -> PartitionStatistics {
    let tests = partition
        .test_columns
        .iter()
        .map(|test| PopulationStatistics::from_values(test.as_str(), &partition.values(test)))
        .collect();
    PartitionStatistics {
        model_code: partition.model_code.clone(),
        tests,
    }
}

/// Missing-data profile of one test.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MissingData {
    pub test: String,
    pub total: usize,
    pub missing: usize,
    /// Rounded to two decimals.
    pub missing_pct: f64,
}

/// Per-test missing counts over all records of `partition`.
pub fn missing_data_profile(partition: &Partition) -> Vec<MissingData> {
    let total = partition.len();
    partition
        .test_columns
        .iter()
        .map(|test| {
            let missing = partition
                .records
                .iter()
                .filter(|r| r.value(test).is_none())
                .count();
            let missing_pct = if total == 0 {
                0.0
            } else {
                (missing as f64 / total as f64 * 100.0 * 100.0).round() / 100.0
            };
            MissingData {
                test: test.clone(),
                total,
                missing,
                missing_pct,
            }
        })
        .collect()
}
