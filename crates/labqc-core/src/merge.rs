//! Multi-source merge reconciliation.
//!
//! [`ingest_sources`] validates and normalises each raw source independently,
//! skips the ones that fail, and unions the survivors with [`merge_tables`].
//! Every skipped source and every schema difference is returned as a
//! [`Diagnostic`] next to the merged table.

use std::collections::{BTreeMap, HashSet};

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::Diagnostic;
use crate::metrics::METRICS;
use crate::normalize::normalize_table;
use crate::obs::{emit_source_merged, emit_source_skipped};
use crate::schema::{reconcile_columns, validate_table};
use crate::table::{Measurement, RawTable, Table};

/// Source name given to a merged table.
pub const MERGED_SOURCE: &str = "merged";

/// Outcome of a multi-source merge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MergeOutcome {
    /// Union of all accepted sources.
    pub table: Table,
    /// Accepted sources, in input order.
    pub sources: Vec<String>,
    /// Skipped sources and schema differences.
    pub diagnostics: Vec<Diagnostic>,
}

impl MergeOutcome {
    /// Sources that were rejected, with their reasons.
    pub fn skipped(&self) -> Vec<(&str, &str)> {
        self.diagnostics
            .iter()
            .filter_map(|d| match d {
                Diagnostic::SkippedSource {
                    source_name,
                    reason,
                } => Some((source_name.as_str(), reason.as_str())),
                _ => None,
            })
            .collect()
    }
}

/// Validate, normalise, and merge raw sources.
///
/// A source failing validation is recorded as
/// [`Diagnostic::SkippedSource`] and does not abort the merge. Columns a
/// source drops during validation are carried as
/// [`Diagnostic::IgnoredColumn`].
pub fn ingest_sources(raws: Vec<RawTable>, aliases: &BTreeMap<String, String>) -> MergeOutcome {
    let mut tables = Vec::with_capacity(raws.len());
    let mut diagnostics = Vec::new();

    for raw in raws {
        let source = raw.source.clone();
        match validate_table(reconcile_columns(raw, aliases)) {
            Ok(mut validated) => {
                diagnostics.append(&mut validated.ignored);
                let table = normalize_table(validated);
                METRICS.add_records_ingested(table.len() as u64);
                emit_source_merged(&source, table.len(), table.test_columns.len());
                tables.push(table);
            }
            Err(e) => {
                let reason = e.to_string();
                METRICS.inc_sources_skipped();
                emit_source_skipped(&source, &reason);
                diagnostics.push(Diagnostic::SkippedSource {
                    source_name: source,
                    reason,
                });
            }
        }
    }

    let mut outcome = merge_tables(tables);
    diagnostics.append(&mut outcome.diagnostics);
    outcome.diagnostics = diagnostics;
    outcome
}

/// Union already-normalised tables.
///
/// The unified schema is the union of all test columns in order of first
/// appearance. Cells for columns a source lacks are [`Measurement::Missing`],
/// never zero. Records without a provenance tag are tagged with their
/// table's source.
pub fn merge_tables(tables: Vec<Table>) -> MergeOutcome {
    let mut union: Vec<String> = Vec::new();
    let mut seen: HashSet<String> = HashSet::new();
    for table in &tables {
        for column in &table.test_columns {
            if seen.insert(column.clone()) {
                union.push(column.clone());
            }
        }
    }

    let mut diagnostics = Vec::new();
    let mut sources = Vec::with_capacity(tables.len());
    let mut records = Vec::new();

    for table in tables {
        let present: HashSet<&String> = table.test_columns.iter().collect();
        let missing_columns: Vec<String> = union
            .iter()
            .filter(|c| !present.contains(c))
            .cloned()
            .collect();

        if !missing_columns.is_empty() {
            warn!(
                source = %table.source,
                missing = missing_columns.len(),
                "source schema differs from union; filling as missing"
            );
            diagnostics.push(Diagnostic::MergeConflict {
                source_name: table.source.clone(),
                missing_columns: missing_columns.clone(),
            });
        }

        for mut record in table.records {
            for column in &missing_columns {
                record
                    .values
                    .insert(column.clone(), Measurement::Missing);
            }
            if record.source.is_none() {
                record.source = Some(table.source.clone());
            }
            records.push(record);
        }
        sources.push(table.source);
    }

    info!(
        sources = sources.len(),
        records = records.len(),
        test_columns = union.len(),
        "merged sources"
    );

    MergeOutcome {
        table: Table {
            source: MERGED_SOURCE.to_string(),
            test_columns: union,
            records,
        },
        sources,
        diagnostics,
    }
}
