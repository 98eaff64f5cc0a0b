//! LabQC - inter-laboratory QC for blood-test batches
//!
//! ## Commands
//!
//! - `analyze`: Grade every lab against its model peer group
//! - `partitions`: List model codes and record counts
//! - `stats`: Population statistics per test
//! - `issues`: Structural data-quality issues
//! - `lab`: Calculation report for one lab
//! - `rank`: Best and worst labs for one test

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use labqc_core::{
    calculation_detail, grade_explanation, lab_summary, rank_labs, read_csv_sources,
    render_markdown, write_report_artifact, write_result_tables, AnalysisConfig, Analyzer,
    BatchReport, CliOverrides, GradeThresholds, PartitionAnalysis,
};
use serde::Serialize;
use tracing::{info, Level};

#[derive(Parser)]
#[command(name = "labqc")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Inter-laboratory quality control for blood-test batches", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json: bool,

    /// Config file (default: ./labqc.toml if present)
    #[arg(long, global = true, env = "LABQC_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
    Markdown,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the full analysis over one or more CSV sources
    Analyze {
        /// CSV files to merge and analyse
        #[arg(required = true)]
        inputs: Vec<PathBuf>,

        /// Restrict to one model code
        #[arg(short, long)]
        model: Option<String>,

        /// Grade thresholds as "excellent,good,satisfactory,unsatisfactory"
        #[arg(short, long)]
        thresholds: Option<String>,

        /// Write report.json, its digest, and result tables here
        #[arg(short, long)]
        out_dir: Option<PathBuf>,

        /// Include calculation and explanation columns in result tables
        #[arg(long)]
        details: bool,

        /// Analyse partitions one at a time
        #[arg(long)]
        sequential: bool,

        #[arg(short, long, value_enum, default_value = "text")]
        format: OutputFormat,
    },

    /// List model codes with record counts
    Partitions {
        #[arg(required = true)]
        inputs: Vec<PathBuf>,
    },

    /// Print population statistics
    Stats {
        #[arg(required = true)]
        inputs: Vec<PathBuf>,

        #[arg(short, long)]
        model: Option<String>,
    },

    /// Print data-quality issues
    Issues {
        #[arg(required = true)]
        inputs: Vec<PathBuf>,

        #[arg(short, long)]
        model: Option<String>,
    },

    /// Show per-test calculations for one lab
    Lab {
        #[arg(required = true)]
        inputs: Vec<PathBuf>,

        /// Lab code
        #[arg(short, long)]
        lab: String,

        #[arg(short, long)]
        model: Option<String>,
    },

    /// Rank labs on one test by |z|
    Rank {
        #[arg(required = true)]
        inputs: Vec<PathBuf>,

        /// Test column
        #[arg(short, long)]
        test: String,

        #[arg(short, long)]
        model: Option<String>,

        /// Labs shown at each end (default from config)
        #[arg(short = 'n', long)]
        limit: Option<usize>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::WARN
    };
    labqc_core::init_tracing(cli.json, level);

    let config_path = cli.config.as_deref();
    match cli.command {
        Commands::Analyze {
            inputs,
            model,
            thresholds,
            out_dir,
            details,
            sequential,
            format,
        } => {
            let thresholds = thresholds
                .as_deref()
                .map(GradeThresholds::parse_list)
                .transpose()
                .context("invalid --thresholds")?;
            let overrides = CliOverrides {
                thresholds,
                parallel: sequential.then_some(false),
                ranking_limit: None,
            };
            let config = load_config(config_path, &overrides)?;
            cmd_analyze(
                config,
                &inputs,
                model.as_deref(),
                out_dir.as_deref(),
                details,
                format,
            )
        }
        Commands::Partitions { inputs } => {
            cmd_partitions(load_config(config_path, &CliOverrides::default())?, &inputs)
        }
        Commands::Stats { inputs, model } => cmd_stats(
            load_config(config_path, &CliOverrides::default())?,
            &inputs,
            model.as_deref(),
        ),
        Commands::Issues { inputs, model } => cmd_issues(
            load_config(config_path, &CliOverrides::default())?,
            &inputs,
            model.as_deref(),
        ),
        Commands::Lab { inputs, lab, model } => cmd_lab(
            load_config(config_path, &CliOverrides::default())?,
            &inputs,
            &lab,
            model.as_deref(),
        ),
        Commands::Rank {
            inputs,
            test,
            model,
            limit,
        } => {
            let overrides = CliOverrides {
                ranking_limit: limit,
                ..CliOverrides::default()
            };
            cmd_rank(
                load_config(config_path, &overrides)?,
                &inputs,
                &test,
                model.as_deref(),
            )
        }
    }
}

fn load_config(path: Option<&Path>, overrides: &CliOverrides) -> Result<AnalysisConfig> {
    AnalysisConfig::load(path, Some(overrides)).context("failed to load configuration")
}

fn run(config: AnalysisConfig, inputs: &[PathBuf], model: Option<&str>) -> Result<BatchReport> {
    let sources = read_csv_sources(inputs);
    let analyzer = Analyzer::new(config);
    let report = match model {
        Some(code) => analyzer.analyze_model(sources, code)?,
        None => analyzer.run(sources)?,
    };
    for d in &report.diagnostics {
        eprintln!("warning: {d}");
    }
    Ok(report)
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn fmt_opt(v: Option<f64>) -> String {
    v.map(|v| format!("{v:.2}")).unwrap_or_else(|| "-".to_string())
}

fn cmd_analyze(
    config: AnalysisConfig,
    inputs: &[PathBuf],
    model: Option<&str>,
    out_dir: Option<&Path>,
    details: bool,
    format: OutputFormat,
) -> Result<()> {
    let report = run(config, inputs, model)?;

    if let Some(dir) = out_dir {
        let path = write_report_artifact(&report, dir)
            .with_context(|| format!("failed to write report under {}", dir.display()))?;
        let tables = write_result_tables(&report, dir, details)
            .with_context(|| format!("failed to write result tables under {}", dir.display()))?;
        info!(report = %path.display(), tables = tables.len(), "artifacts written");
    }

    match format {
        OutputFormat::Json => print_json(&report)?,
        OutputFormat::Markdown => print!("{}", render_markdown(&report)),
        OutputFormat::Text => print_analysis_text(&report),
    }
    Ok(())
}

fn print_analysis_text(report: &BatchReport) {
    let s = &report.summary;
    println!("Run:       {}", report.run_id);
    println!("Records:   {}", s.total_records);
    println!("Sources:   {}", s.sources.join(", "));
    println!("Models:    {}", s.model_codes.len());
    println!("Missing:   {:.2}%", s.missing_pct);

    for p in &report.partitions {
        println!();
        println!("Model {} ({} records)", p.model_code, p.record_count);
        let problems = &p.problems;
        if !problems.has_problems() {
            println!("  no problem grades");
        }
        for alert in problems.alerts() {
            println!(
                "  {:<8} {:<12} {} lab(s): {}  [{}]",
                alert.level.label(),
                alert.test,
                alert.count,
                alert.labs.join(", "),
                alert.action()
            );
        }
        if !p.quality_issues.is_empty() {
            println!("  {} quality issue(s)", p.quality_issues.len());
        }
    }
}

fn cmd_partitions(config: AnalysisConfig, inputs: &[PathBuf]) -> Result<()> {
    let prepared = Analyzer::new(config).prepare(read_csv_sources(inputs))?;
    for d in &prepared.diagnostics {
        eprintln!("warning: {d}");
    }
    println!("{:<16} {:>8}", "MODEL", "RECORDS");
    for p in prepared.partitions.iter() {
        let code = if p.model_code.is_empty() {
            "(none)"
        } else {
            p.model_code.as_str()
        };
        println!("{:<16} {:>8}", code, p.len());
    }
    Ok(())
}

fn cmd_stats(config: AnalysisConfig, inputs: &[PathBuf], model: Option<&str>) -> Result<()> {
    let report = run(config, inputs, model)?;
    for p in &report.partitions {
        println!("Model {}", p.model_code);
        println!(
            "  {:<12} {:>6} {:>10} {:>10} {:>10} {:>10} {:>10} {:>8}",
            "TEST", "COUNT", "MEAN", "STD", "MEDIAN", "MIN", "MAX", "CV%"
        );
        for s in &p.statistics.tests {
            let mut flags = Vec::new();
            if s.high_variability() {
                flags.push("high-cv");
            }
            if s.low_sample_count() {
                flags.push("low-n");
            }
            println!(
                "  {:<12} {:>6} {:>10} {:>10} {:>10} {:>10} {:>10} {:>8} {}",
                s.test,
                s.count,
                fmt_opt(s.mean),
                fmt_opt(s.std),
                fmt_opt(s.median),
                fmt_opt(s.min),
                fmt_opt(s.max),
                fmt_opt(s.cv),
                flags.join(",")
            );
        }
    }
    Ok(())
}

fn cmd_issues(config: AnalysisConfig, inputs: &[PathBuf], model: Option<&str>) -> Result<()> {
    let report = run(config, inputs, model)?;
    let mut any = false;
    for p in &report.partitions {
        for issue in &p.quality_issues {
            any = true;
            println!(
                "{:<10} {:<12} {:<18} {:<6?} {:>4}  {}",
                p.model_code,
                issue.test,
                issue.kind.label(),
                issue.severity,
                issue.count,
                issue.affected_labs.join(", ")
            );
        }
    }
    if !any {
        println!("No quality issues found.");
    }
    Ok(())
}

fn find_lab<'a>(report: &'a BatchReport, lab: &str) -> Vec<&'a PartitionAnalysis> {
    report
        .partitions
        .iter()
        .filter(|p| p.graded.iter().any(|g| g.lab_code == lab))
        .collect()
}

fn cmd_lab(
    config: AnalysisConfig,
    inputs: &[PathBuf],
    lab: &str,
    model: Option<&str>,
) -> Result<()> {
    let report = run(config, inputs, model)?;
    let partitions = find_lab(&report, lab);
    if partitions.is_empty() {
        bail!("lab '{lab}' not found");
    }

    for p in partitions {
        println!("Lab {} / model {}", lab, p.model_code);
        if let Some(perf) = lab_summary(&p.graded, lab) {
            println!(
                "  overall: {}  score: {:.1}  pass rate: {:.1}%  mean |z|: {}",
                perf.overall_grade,
                perf.score,
                perf.pass_rate,
                fmt_opt(perf.mean_abs_z)
            );
        }
        for record in p.graded.iter().filter(|g| g.lab_code == lab) {
            for r in &record.results {
                let calc = p
                    .statistics
                    .get(&r.test)
                    .map(|s| calculation_detail(r.value, s))
                    .unwrap_or_default();
                println!("  {:<12} {:<16} {}", r.test, r.grade.label(), calc);
                println!("  {:<12} {}", "", grade_explanation(r, &report.thresholds));
            }
        }
    }
    Ok(())
}

fn cmd_rank(
    config: AnalysisConfig,
    inputs: &[PathBuf],
    test: &str,
    model: Option<&str>,
) -> Result<()> {
    let limit = config.ranking_limit;
    let report = run(config, inputs, model)?;
    for p in &report.partitions {
        if !p.test_columns.iter().any(|t| t == test) {
            continue;
        }
        let ranking = rank_labs(&p.graded, test, limit);
        println!("Model {} / {}", p.model_code, test);
        println!("  best:");
        for r in &ranking.best {
            println!("    {:<10} z={:>6.2}  {}", r.lab_code, r.z_score, r.grade);
        }
        println!("  needs attention:");
        for r in &ranking.attention {
            println!("    {:<10} z={:>6.2}  {}", r.lab_code, r.z_score, r.grade);
        }
    }
    Ok(())
}
