//! Roll-up of graded results into problem counts and alerts.
//!
//! Everything here is derived from a slice of [`GradedRecord`]s alone.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::grading::{Grade, GradedRecord};

/// Per-grade tally.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GradeCounts {
    pub excellent: usize,
    pub good: usize,
    pub satisfactory: usize,
    pub unsatisfactory: usize,
    pub serious_problem: usize,
    pub no_data: usize,
}

impl GradeCounts {
    pub fn record(&mut self, grade: Grade) {
        match grade {
            Grade::Excellent => self.excellent += 1,
            Grade::Good => self.good += 1,
            Grade::Satisfactory => self.satisfactory += 1,
            Grade::Unsatisfactory => self.unsatisfactory += 1,
            Grade::SeriousProblem => self.serious_problem += 1,
            Grade::NoData => self.no_data += 1,
        }
    }

    pub fn get(&self, grade: Grade) -> usize {
        match grade {
            Grade::Excellent => self.excellent,
            Grade::Good => self.good,
            Grade::Satisfactory => self.satisfactory,
            Grade::Unsatisfactory => self.unsatisfactory,
            Grade::SeriousProblem => self.serious_problem,
            Grade::NoData => self.no_data,
        }
    }

    /// Unsatisfactory plus Serious problem.
    pub fn problems(&self) -> usize {
        self.unsatisfactory + self.serious_problem
    }

    pub fn total(&self) -> usize {
        Grade::ALL.iter().map(|g| self.get(*g)).sum()
    }
}

/// Grade tally for one test.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestGradeCounts {
    pub test: String,
    pub counts: GradeCounts,
}

/// Problem grades of one lab across all tests.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabProblemCounts {
    pub lab_code: String,
    pub unsatisfactory: usize,
    pub serious_problem: usize,
}

impl LabProblemCounts {
    pub fn total(&self) -> usize {
        self.unsatisfactory + self.serious_problem
    }
}

/// Alert tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AlertLevel {
    Critical,
    Warning,
}

impl AlertLevel {
    pub fn label(self) -> &'static str {
        match self {
            AlertLevel::Critical => "CRITICAL",
            AlertLevel::Warning => "WARNING",
        }
    }

    pub fn action(self) -> &'static str {
        match self {
            AlertLevel::Critical => "IMMEDIATE REVIEW",
            AlertLevel::Warning => "SCHEDULE REVIEW",
        }
    }
}

/// Labs graded at one alert tier for one test.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProblemAlert {
    pub test: String,
    pub level: AlertLevel,
    pub count: usize,
    /// In record order.
    pub labs: Vec<String>,
}

impl ProblemAlert {
    pub fn action(&self) -> &'static str {
        self.level.action()
    }
}

/// Aggregated problem view of one partition.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProblemSummary {
    /// In test-column order.
    pub per_test: Vec<TestGradeCounts>,
    /// Labs with at least one problem grade, in first-appearance order.
    pub per_lab: Vec<LabProblemCounts>,
    /// One entry per test with any Serious problem.
    pub critical: Vec<ProblemAlert>,
    /// One entry per test with any Unsatisfactory.
    pub warning: Vec<ProblemAlert>,
}

impl ProblemSummary {
    pub fn has_problems(&self) -> bool {
        !self.critical.is_empty() || !self.warning.is_empty()
    }

    pub fn problem_grade_count(&self) -> usize {
        self.per_test.iter().map(|t| t.counts.problems()).sum()
    }

    pub fn counts_for(&self, test: &str) -> Option<&GradeCounts> {
        self.per_test
            .iter()
            .find(|t| t.test == test)
            .map(|t| &t.counts)
    }

    /// Tests with problems, most problem grades first. Ties keep test order.
    pub fn tests_by_problem_count(&self) -> Vec<(&str, usize)> {
        let mut tests: Vec<(&str, usize)> = self
            .per_test
            .iter()
            .filter(|t| t.counts.problems() > 0)
            .map(|t| (t.test.as_str(), t.counts.problems()))
            .collect();
        tests.sort_by(|a, b| b.1.cmp(&a.1));
        tests
    }

    /// Labs with problems, most problem grades first. Ties keep lab order.
    pub fn labs_by_problem_count(&self) -> Vec<&LabProblemCounts> {
        let mut labs: Vec<&LabProblemCounts> = self.per_lab.iter().collect();
        labs.sort_by(|a, b| b.total().cmp(&a.total()));
        labs
    }

    /// All alerts, critical first.
    pub fn alerts(&self) -> impl Iterator<Item = &ProblemAlert> {
        self.critical.iter().chain(self.warning.iter())
    }
}

/// Aggregate the graded records of one partition.
pub fn summarize_problems(graded: &[GradedRecord]) -> ProblemSummary {
    let mut tests: Vec<String> = Vec::new();
    let mut test_index: HashMap<String, usize> = HashMap::new();
    for record in graded {
        for r in &record.results {
            if !test_index.contains_key(&r.test) {
                test_index.insert(r.test.clone(), tests.len());
                tests.push(r.test.clone());
            }
        }
    }

    let mut per_test: Vec<TestGradeCounts> = tests
        .iter()
        .map(|t| TestGradeCounts {
            test: t.clone(),
            counts: GradeCounts::default(),
        })
        .collect();
    let mut serious_labs: Vec<Vec<String>> = vec![Vec::new(); tests.len()];
    let mut unsat_labs: Vec<Vec<String>> = vec![Vec::new(); tests.len()];

    let mut per_lab: Vec<LabProblemCounts> = Vec::new();
    let mut lab_index: HashMap<String, usize> = HashMap::new();

    for record in graded {
        for r in &record.results {
            let Some(&i) = test_index.get(&r.test) else {
                continue;
            };
            per_test[i].counts.record(r.grade);
            match r.grade {
                Grade::SeriousProblem => serious_labs[i].push(record.lab_code.clone()),
                Grade::Unsatisfactory => unsat_labs[i].push(record.lab_code.clone()),
                _ => continue,
            }

            let slot = *lab_index.entry(record.lab_code.clone()).or_insert_with(|| {
                per_lab.push(LabProblemCounts {
                    lab_code: record.lab_code.clone(),
                    unsatisfactory: 0,
                    serious_problem: 0,
                });
                per_lab.len() - 1
            });
            if r.grade == Grade::SeriousProblem {
                per_lab[slot].serious_problem += 1;
            } else {
                per_lab[slot].unsatisfactory += 1;
            }
        }
    }

    let alerts = |level: AlertLevel, labs: Vec<Vec<String>>| -> Vec<ProblemAlert> {
        tests
            .iter()
            .zip(labs)
            .filter(|(_, labs)| !labs.is_empty())
            .map(|(test, labs)| ProblemAlert {
                test: test.clone(),
                level,
                count: labs.len(),
                labs,
            })
            .collect()
    };
    let critical = alerts(AlertLevel::Critical, serious_labs);
    let warning = alerts(AlertLevel::Warning, unsat_labs);

    ProblemSummary {
        per_test,
        per_lab,
        critical,
        warning,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grading::ZScoreResult;

    fn graded(lab: &str, grades: &[(&str, Grade)]) -> GradedRecord {
        GradedRecord {
            lab_code: lab.to_string(),
            brand_code: "5".to_string(),
            model_code: "602".to_string(),
            source: None,
            results: grades
                .iter()
                .map(|(test, grade)| ZScoreResult {
                    test: test.to_string(),
                    value: None,
                    z_score: None,
                    grade: *grade,
                })
                .collect(),
        }
    }

    #[test]
    fn test_counts_per_test_and_lab() {
        let records = vec![
            graded("1", &[("RBC", Grade::Excellent), ("WBC", Grade::SeriousProblem)]),
            graded("2", &[("RBC", Grade::Unsatisfactory), ("WBC", Grade::SeriousProblem)]),
            graded("3", &[("RBC", Grade::NoData), ("WBC", Grade::Good)]),
        ];
        let s = summarize_problems(&records);

        let rbc = s.counts_for("RBC").unwrap();
        assert_eq!(rbc.excellent, 1);
        assert_eq!(rbc.unsatisfactory, 1);
        assert_eq!(rbc.no_data, 1);
        assert_eq!(rbc.total(), 3);

        assert_eq!(s.per_lab.len(), 2);
        assert_eq!(s.per_lab[0].lab_code, "1");
        assert_eq!(s.per_lab[0].serious_problem, 1);
        assert_eq!(s.per_lab[1].total(), 2);
        assert_eq!(s.problem_grade_count(), 3);
    }

    #[test]
    fn test_alert_tiers() {
        let records = vec![
            graded("1", &[("Hb", Grade::SeriousProblem)]),
            graded("2", &[("Hb", Grade::Unsatisfactory)]),
            graded("3", &[("Hb", Grade::SeriousProblem)]),
        ];
        let s = summarize_problems(&records);
        assert_eq!(s.critical.len(), 1);
        assert_eq!(s.critical[0].labs, vec!["1".to_string(), "3".to_string()]);
        assert_eq!(s.critical[0].action(), "IMMEDIATE REVIEW");
        assert_eq!(s.warning.len(), 1);
        assert_eq!(s.warning[0].count, 1);
        assert_eq!(s.warning[0].action(), "SCHEDULE REVIEW");
        assert_eq!(s.alerts().count(), 2);
    }

    #[test]
    fn test_clean_partition_has_no_alerts() {
        let records = vec![
            graded("1", &[("PLT", Grade::Excellent)]),
            graded("2", &[("PLT", Grade::Satisfactory)]),
        ];
        let s = summarize_problems(&records);
        assert!(!s.has_problems());
        assert!(s.per_lab.is_empty());
        assert!(s.tests_by_problem_count().is_empty());
    }

    #[test]
    fn test_rankings_sort_by_problem_count() {
        let records = vec![
            graded("1", &[("A", Grade::Unsatisfactory), ("B", Grade::Excellent)]),
            graded("2", &[("A", Grade::Unsatisfactory), ("B", Grade::SeriousProblem)]),
        ];
        let s = summarize_problems(&records);
        assert_eq!(s.tests_by_problem_count(), vec![("A", 2), ("B", 1)]);
        let labs = s.labs_by_problem_count();
        assert_eq!(labs[0].lab_code, "2");
        assert_eq!(labs[1].lab_code, "1");
    }

    #[test]
    fn test_alert_level_serializes_upper_case() {
        assert_eq!(
            serde_json::to_string(&AlertLevel::Critical).unwrap(),
            "\"CRITICAL\""
        );
    }
}
