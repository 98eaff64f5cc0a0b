//! Reference QC scenarios run through the public API end to end.

use labqc_core::{
    analyze_partition, partition_by_model, Analyzer, Cell, Diagnostic, Grade, GradeThresholds,
    IssueKind, IssueSeverity, QcError, RawTable,
};

fn raw(source: &str, test: &str, rows: &[(&str, &str, &str)]) -> RawTable {
    let mut t = RawTable::new(
        source,
        vec![
            "Lab Code".to_string(),
            "Brand code".to_string(),
            "Model code".to_string(),
            test.to_string(),
        ],
    );
    for (lab, model, value) in rows {
        t.push_row(vec![
            Cell::parse(lab),
            Cell::parse("5"),
            Cell::parse(model),
            Cell::parse(value),
        ]);
    }
    t
}

fn single_model(test: &str, values: &[&str]) -> RawTable {
    let labs: Vec<String> = (1..=values.len()).map(|i| i.to_string()).collect();
    let rows: Vec<(&str, &str, &str)> = labs
        .iter()
        .zip(values)
        .map(|(lab, v)| (lab.as_str(), "602", *v))
        .collect();
    raw("batch.csv", test, &rows)
}

#[test]
fn one_outlying_lab_is_unsatisfactory() {
    let mut rows: Vec<(String, &str)> = (1..=9).map(|i| (i.to_string(), "10.0")).collect();
    rows.push(("77".to_string(), "16.0"));
    let rows: Vec<(&str, &str, &str)> = rows
        .iter()
        .map(|(lab, v)| (lab.as_str(), "602", *v))
        .collect();

    let report = Analyzer::default()
        .run(vec![raw("a.csv", "RBC", &rows)])
        .unwrap();
    let p = &report.partitions[0];

    let stats = p.statistics.get("RBC").unwrap();
    assert!((stats.mean.unwrap() - 10.6).abs() < 1e-9);
    assert!((stats.std.unwrap() - 1.897).abs() < 1e-3);

    for g in &p.graded {
        let r = g.result("RBC").unwrap();
        if g.lab_code == "77" {
            assert_eq!(r.z_score, Some(2.85));
            assert_eq!(r.grade, Grade::Unsatisfactory);
        } else {
            assert_eq!(r.z_score, Some(-0.32));
            assert_eq!(r.grade, Grade::Excellent);
        }
    }

    assert_eq!(p.problems.warning.len(), 1);
    assert_eq!(p.problems.warning[0].labs, vec!["77".to_string()]);
    assert!(p.problems.critical.is_empty());
}

#[test]
fn rows_split_by_model_code() {
    let t = raw(
        "a.csv",
        "WBC",
        &[("1", "5", "6.1"), ("2", "5", "6.4"), ("3", "7", "5.9")],
    );
    let report = Analyzer::default().run(vec![t]).unwrap();
    let sizes: Vec<(String, usize)> = report
        .partitions
        .iter()
        .map(|p| (p.model_code.clone(), p.record_count))
        .collect();
    assert_eq!(sizes, vec![("5".to_string(), 2), ("7".to_string(), 1)]);
}

#[test]
fn constant_values_grade_excellent() {
    let report = Analyzer::default()
        .run(vec![single_model("PLT", &["1", "1", "1", "1", "1"])])
        .unwrap();
    let p = &report.partitions[0];
    assert_eq!(p.statistics.get("PLT").unwrap().std, Some(0.0));
    for g in &p.graded {
        let r = g.result("PLT").unwrap();
        assert_eq!(r.z_score, Some(0.0));
        assert_eq!(r.grade, Grade::Excellent);
    }
}

#[test]
fn decreasing_thresholds_rejected_before_grading() {
    let err = GradeThresholds::new(1.0, 0.5, 2.0, 3.0).unwrap_err();
    assert!(matches!(err, QcError::InvalidThresholdConfiguration(_)));
}

#[test]
fn far_value_is_high_severity_extreme() {
    let report = Analyzer::default()
        .run(vec![single_model("Hb", &["1", "2", "3", "4", "100"])])
        .unwrap();
    let issues = &report.partitions[0].quality_issues;
    let extreme = issues
        .iter()
        .find(|i| i.kind == IssueKind::ExtremeValue)
        .expect("extreme value issue");
    assert_eq!(extreme.severity, IssueSeverity::High);
    assert_eq!(extreme.count, 1);
    assert_eq!(extreme.affected_labs, vec!["5".to_string()]);
}

#[test]
fn zero_is_not_measured_and_excluded() {
    let report = Analyzer::default()
        .run(vec![single_model("MCV", &["88", "90", "0", "92"])])
        .unwrap();
    let p = &report.partitions[0];

    let stats = p.statistics.get("MCV").unwrap();
    assert_eq!(stats.count, 3);
    assert!((stats.mean.unwrap() - 90.0).abs() < 1e-9);

    let zero = p.graded[2].result("MCV").unwrap();
    assert_eq!(zero.value, None);
    assert_eq!(zero.z_score, None);
    assert_eq!(zero.grade, Grade::NoData);
}

#[test]
fn single_value_test_reports_insufficient_data() {
    let report = Analyzer::default()
        .run(vec![single_model("RDW", &["13.1", "", ""])])
        .unwrap();
    let p = &report.partitions[0];
    assert!(p
        .graded
        .iter()
        .all(|g| g.result("RDW").unwrap().grade == Grade::NoData));
    assert!(report.diagnostics.iter().any(|d| matches!(
        d,
        Diagnostic::InsufficientData { test, count: 1, .. } if test == "RDW"
    )));
}

#[test]
fn thresholds_only_change_grades_not_scores() {
    let t = single_model("RBC", &["4.0", "4.2", "4.4", "4.6", "6.0"]);
    let table = labqc_core::ingest_sources(vec![t], &Default::default()).table;
    let set = partition_by_model(table);
    let partition = &set.as_slice()[0];

    let loose = analyze_partition(partition, &GradeThresholds::new(1.0, 2.0, 3.0, 4.0).unwrap());
    let strict = analyze_partition(partition, &GradeThresholds::default());

    let z = |a: &labqc_core::PartitionAnalysis| -> Vec<Option<f64>> {
        a.graded.iter().map(|g| g.results[0].z_score).collect()
    };
    assert_eq!(z(&loose), z(&strict));

    let outlier_loose = loose.graded[4].results[0].grade;
    let outlier_strict = strict.graded[4].results[0].grade;
    assert!(outlier_loose < outlier_strict);
}
