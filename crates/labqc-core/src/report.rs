//! Output artifacts: CSV result tables, the digest-checked JSON report, and
//! a Markdown summary.

use std::collections::HashSet;
use std::io::Write;
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};
use tracing::info;

use crate::error::{QcError, Result};
use crate::grading::{calculation_detail, grade_explanation, GradeThresholds};
use crate::pipeline::{BatchReport, PartitionAnalysis};
use crate::table::{BRAND_CODE, LAB_CODE, MODEL_CODE, SOURCE_FILE};

const REPORT_FILE: &str = "report.json";
const DIGEST_FILE: &str = "report.digest";

/// SHA-256 hex digest of `data`.
pub fn content_digest(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

// ---------------------------------------------------------------------------
// Result table
// ---------------------------------------------------------------------------

fn fmt_opt(v: Option<f64>) -> String {
    v.map(|v| v.to_string()).unwrap_or_default()
}

fn fmt_z(v: Option<f64>) -> String {
    v.map(|v| format!("{v:.2}")).unwrap_or_default()
}

/// Write one partition's graded records as CSV.
///
/// With `details`, every test also gets `_calculation` and
/// `_grade_explanation` columns.
pub fn write_result_csv<W: Write>(
    analysis: &PartitionAnalysis,
    thresholds: &GradeThresholds,
    details: bool,
    writer: W,
) -> Result<()> {
    let with_source = analysis.graded.iter().any(|g| g.source.is_some());
    let mut wtr = csv::Writer::from_writer(writer);

    let mut header: Vec<String> = vec![LAB_CODE.into(), BRAND_CODE.into(), MODEL_CODE.into()];
    if with_source {
        header.push(SOURCE_FILE.into());
    }
    for test in &analysis.test_columns {
        header.push(test.clone());
        header.push(format!("{test}_zscore"));
        header.push(format!("{test}_grade"));
        if details {
            header.push(format!("{test}_calculation"));
            header.push(format!("{test}_grade_explanation"));
        }
    }
    wtr.write_record(&header)?;

    for record in &analysis.graded {
        let mut row = vec![
            record.lab_code.clone(),
            record.brand_code.clone(),
            record.model_code.clone(),
        ];
        if with_source {
            row.push(record.source.clone().unwrap_or_default());
        }
        for result in &record.results {
            row.push(fmt_opt(result.value));
            row.push(fmt_z(result.z_score));
            row.push(result.grade.label().to_string());
            if details {
                let calc = analysis
                    .statistics
                    .get(&result.test)
                    .map(|s| calculation_detail(result.value, s))
                    .unwrap_or_default();
                row.push(calc);
                row.push(grade_explanation(result, thresholds));
            }
        }
        wtr.write_record(&row)?;
    }
    wtr.flush()?;
    Ok(())
}

/// File-system-safe name for a model code.
fn partition_file_name(model_code: &str) -> String {
    let cleaned: String = model_code
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '.' { c } else { '_' })
        .collect();
    if cleaned.is_empty() {
        "results-unassigned.csv".to_string()
    } else {
        format!("results-{cleaned}.csv")
    }
}

/// Reserve `name` in `used`, appending `-2`, `-3`, ... to its stem until it
/// is unique. Names compare case-insensitively.
fn unique_file_name(name: String, used: &mut HashSet<String>) -> String {
    if used.insert(name.to_ascii_lowercase()) {
        return name;
    }
    let stem = name.strip_suffix(".csv").unwrap_or(&name);
    let mut n = 2usize;
    loop {
        let candidate = format!("{stem}-{n}.csv");
        if used.insert(candidate.to_ascii_lowercase()) {
            return candidate;
        }
        n += 1;
    }
}

/// Write every partition's result table under `<dir>/<run_id>/`.
///
/// Model codes that sanitise to the same file name get numbered suffixes,
/// so every partition gets its own file.
pub fn write_result_tables(report: &BatchReport, dir: &Path, details: bool) -> Result<Vec<PathBuf>> {
    let run_dir = dir.join(report.run_id.to_string());
    std::fs::create_dir_all(&run_dir)?;

    let mut used = HashSet::with_capacity(report.partitions.len());
    let mut paths = Vec::with_capacity(report.partitions.len());
    for analysis in &report.partitions {
        let name = unique_file_name(partition_file_name(&analysis.model_code), &mut used);
        let path = run_dir.join(name);
        let file = std::fs::File::create(&path)?;
        write_result_csv(analysis, &report.thresholds, details, file)?;
        paths.push(path);
    }
    info!(dir = %run_dir.display(), tables = paths.len(), "wrote result tables");
    Ok(paths)
}

// ---------------------------------------------------------------------------
// Report artifact
// ---------------------------------------------------------------------------

/// Write `<dir>/<run_id>/report.json` and its digest.
pub fn write_report_artifact(report: &BatchReport, dir: &Path) -> Result<PathBuf> {
    let run_dir = dir.join(report.run_id.to_string());
    std::fs::create_dir_all(&run_dir)?;

    let path = run_dir.join(REPORT_FILE);
    let digest_path = run_dir.join(DIGEST_FILE);
    let json = serde_json::to_vec_pretty(report)?;
    let digest = content_digest(&json);

    std::fs::write(&path, &json)?;
    std::fs::write(&digest_path, digest.as_bytes())?;

    info!(path = %path.display(), digest = %&digest[..12], "wrote report artifact");
    Ok(path)
}

/// Read `<dir>/<run_id>/report.json`, verifying its digest.
pub fn read_report_artifact(run_id: &str, dir: &Path) -> Result<BatchReport> {
    let run_dir = dir.join(run_id);
    let json = std::fs::read(run_dir.join(REPORT_FILE))?;
    let expected = std::fs::read_to_string(run_dir.join(DIGEST_FILE))?;
    let actual = content_digest(&json);
    if expected.trim() != actual {
        return Err(QcError::DigestMismatch {
            expected: expected.trim().to_string(),
            actual,
        });
    }
    Ok(serde_json::from_slice(&json)?)
}

// ---------------------------------------------------------------------------
// Markdown
// ---------------------------------------------------------------------------

fn md_opt(v: Option<f64>) -> String {
    v.map(|v| format!("{v:.2}")).unwrap_or_else(|| "-".to_string())
}

/// Render a Markdown summary of `report`.
pub fn render_markdown(report: &BatchReport) -> String {
    let mut md = String::new();
    let s = &report.summary;

    md.push_str("# Lab QC Report\n\n");
    md.push_str(&format!("- Run: `{}`\n", report.run_id));
    md.push_str(&format!("- Generated: {}\n", report.generated_at.to_rfc3339()));
    md.push_str(&format!("- Records: {}\n", s.total_records));
    md.push_str(&format!("- Sources: {}\n", s.sources.join(", ")));
    md.push_str(&format!("- Models: {}\n", s.model_codes.len()));
    md.push_str(&format!("- Missing data: {:.2}%\n", s.missing_pct));
    let t = &report.thresholds;
    md.push_str(&format!(
        "- Thresholds: {} / {} / {} / {}\n\n",
        t.excellent_max(),
        t.good_max(),
        t.satisfactory_max(),
        t.unsatisfactory_max()
    ));

    if !report.diagnostics.is_empty() {
        md.push_str("## Diagnostics\n\n");
        for d in &report.diagnostics {
            md.push_str(&format!("- {d}\n"));
        }
        md.push('\n');
    }

    for p in &report.partitions {
        md.push_str(&format!("## Model {} ({} records)\n\n", p.model_code, p.record_count));

        md.push_str("| Test | Count | Mean | Std | Median | Min | Max | CV% |\n");
        md.push_str("|---|---|---|---|---|---|---|---|\n");
        for st in &p.statistics.tests {
            md.push_str(&format!(
                "| {} | {} | {} | {} | {} | {} | {} | {} |\n",
                st.test,
                st.count,
                md_opt(st.mean),
                md_opt(st.std),
                md_opt(st.median),
                md_opt(st.min),
                md_opt(st.max),
                md_opt(st.cv)
            ));
        }
        md.push('\n');

        if p.problems.has_problems() {
            md.push_str("| Level | Test | Labs | Action |\n");
            md.push_str("|---|---|---|---|\n");
            for alert in p.problems.alerts() {
                md.push_str(&format!(
                    "| {} | {} | {} | {} |\n",
                    alert.level.label(),
                    alert.test,
                    alert.labs.join(", "),
                    alert.action()
                ));
            }
            md.push('\n');
        } else {
            md.push_str("No problem grades.\n\n");
        }

        if !p.quality_issues.is_empty() {
            md.push_str("Quality issues:\n\n");
            for issue in &p.quality_issues {
                md.push_str(&format!(
                    "- {} `{}` ({:?}, {} entries)\n",
                    issue.kind.label(),
                    issue.test,
                    issue.severity,
                    issue.count
                ));
            }
            md.push('\n');
        }
    }
    md
}
