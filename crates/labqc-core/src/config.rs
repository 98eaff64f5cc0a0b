//! Layered analysis configuration.
//!
//! Resolution order (highest priority first):
//! 1. CLI flags (applied via [`AnalysisConfig::apply_cli_overrides`])
//! 2. Environment variables (`LABQC_*`)
//! 3. Config file (`labqc.toml` by default)
//! 4. Compiled defaults

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{QcError, Result};
use crate::grading::GradeThresholds;
use crate::table::{BRAND_CODE, LAB_CODE, MODEL_CODE};

/// Default config file name.
pub const CONFIG_FILE: &str = "labqc.toml";

/// `"e,g,s,u"` threshold override.
pub const ENV_THRESHOLDS: &str = "LABQC_THRESHOLDS";

/// `0`/`1` parallelism override.
pub const ENV_PARALLEL: &str = "LABQC_PARALLEL";

/// Default ranking size.
pub const DEFAULT_RANKING_LIMIT: usize = 5;

/// Resolved configuration for one analysis run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisConfig {
    pub thresholds: GradeThresholds,
    /// Source header → canonical header.
    pub column_aliases: BTreeMap<String, String>,
    /// Analyse partitions on the rayon pool.
    pub parallel: bool,
    pub ranking_limit: usize,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            thresholds: GradeThresholds::default(),
            column_aliases: default_aliases(),
            parallel: true,
            ranking_limit: DEFAULT_RANKING_LIMIT,
        }
    }
}

/// Header spellings seen across submission formats.
pub fn default_aliases() -> BTreeMap<String, String> {
    [
        ("B_M_No", MODEL_CODE),
        ("Model_Code", MODEL_CODE),
        ("Brand_Code", BRAND_CODE),
        ("Lab_Code", LAB_CODE),
    ]
    .into_iter()
    .map(|(from, to)| (from.to_string(), to.to_string()))
    .collect()
}

/// File layer: every field optional so a file may set any subset.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
struct ConfigFile {
    thresholds: Option<GradeThresholds>,
    column_aliases: BTreeMap<String, String>,
    parallel: Option<bool>,
    ranking_limit: Option<usize>,
}

/// Values given on the command line.
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub thresholds: Option<GradeThresholds>,
    pub parallel: Option<bool>,
    pub ranking_limit: Option<usize>,
}

impl AnalysisConfig {
    /// Load with full layering.
    ///
    /// With `path` unset, `labqc.toml` in the working directory is used if it
    /// exists. An explicit `path` that does not exist is an error.
    pub fn load(path: Option<&Path>, cli: Option<&CliOverrides>) -> Result<Self> {
        let mut config = Self::default();

        match path {
            Some(p) => config.merge_file(p)?,
            None => {
                let p = Path::new(CONFIG_FILE);
                if p.exists() {
                    config.merge_file(p)?;
                }
            }
        }

        config.apply_env_overrides(|key| std::env::var(key).ok())?;

        if let Some(cli) = cli {
            config.apply_cli_overrides(cli);
        }

        config.validate()?;
        Ok(config)
    }

    /// Parse a TOML document over the defaults.
    pub fn from_toml(toml_str: &str) -> Result<Self> {
        let file = parse_file(toml_str, "<string>")?;
        let mut config = Self::default();
        config.merge(file);
        config.validate()?;
        Ok(config)
    }

    fn merge_file(&mut self, path: &Path) -> Result<()> {
        let content = std::fs::read_to_string(path).map_err(|e| QcError::Config {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        let file = parse_file(&content, &path.display().to_string())?;
        debug!(path = %path.display(), "loaded config file");
        self.merge(file);
        Ok(())
    }

    fn merge(&mut self, file: ConfigFile) {
        if let Some(t) = file.thresholds {
            self.thresholds = t;
        }
        // File aliases extend the defaults.
        self.column_aliases.extend(file.column_aliases);
        if let Some(p) = file.parallel {
            self.parallel = p;
        }
        if let Some(n) = file.ranking_limit {
            self.ranking_limit = n;
        }
    }

    /// Apply `LABQC_*` overrides read through `lookup`.
    pub fn apply_env_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(raw) = lookup(ENV_THRESHOLDS) {
            self.thresholds = GradeThresholds::parse_list(&raw)?;
        }
        if let Some(raw) = lookup(ENV_PARALLEL) {
            self.parallel = match raw.trim().to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" => true,
                "0" | "false" | "no" => false,
                other => {
                    return Err(QcError::Config {
                        path: ENV_PARALLEL.to_string(),
                        message: format!("expected 0 or 1, got '{other}'"),
                    })
                }
            };
        }
        Ok(())
    }

    pub fn apply_cli_overrides(&mut self, cli: &CliOverrides) {
        if let Some(t) = cli.thresholds {
            self.thresholds = t;
        }
        if let Some(p) = cli.parallel {
            self.parallel = p;
        }
        if let Some(n) = cli.ranking_limit {
            self.ranking_limit = n;
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.ranking_limit == 0 {
            return Err(QcError::Config {
                path: "ranking_limit".to_string(),
                message: "must be greater than 0".to_string(),
            });
        }
        for (from, to) in &self.column_aliases {
            if from.trim().is_empty() || to.trim().is_empty() {
                return Err(QcError::Config {
                    path: "column_aliases".to_string(),
                    message: format!("empty alias '{from}' -> '{to}'"),
                });
            }
        }
        Ok(())
    }
}

const THRESHOLD_ERROR_PREFIX: &str = "invalid threshold configuration: ";

fn parse_file(content: &str, path: &str) -> Result<ConfigFile> {
    toml::from_str(content).map_err(|e| {
        // A rejected threshold tuple keeps its own error kind.
        let message = e.to_string();
        if let Some(at) = e.message().find(THRESHOLD_ERROR_PREFIX) {
            let detail = &e.message()[at + THRESHOLD_ERROR_PREFIX.len()..];
            QcError::InvalidThresholdConfiguration(detail.trim().to_string())
        } else {
            QcError::Config {
                path: path.to_string(),
                message,
            }
        }
    })
}
