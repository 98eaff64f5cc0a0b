//! Schema reconciliation and validation for raw source tables.
//!
//! Sources arrive from several instrument vendors and export tools, so
//! headers are first rewritten through a column-alias map, then checked for
//! the identifier columns in [`REQUIRED_COLUMNS`] and at least one numeric
//! test column.

use std::collections::BTreeMap;

use tracing::{debug, warn};

use crate::error::{Diagnostic, QcError, Result};
use crate::table::{is_identifier_column, Cell, RawTable, REQUIRED_COLUMNS};

/// A raw table that passed validation, with its test columns resolved.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedTable {
    pub raw: RawTable,
    /// Numeric, non-identifier columns in source order.
    pub test_columns: Vec<String>,
    /// One [`Diagnostic::IgnoredColumn`] per non-identifier column that is
    /// not numeric.
    pub ignored: Vec<Diagnostic>,
}

/// Trim headers and rename aliased columns to their canonical names.
///
/// When the canonical column is already present, the alias column is
/// dropped along with its cells; the canonical column wins. Of several
/// aliases for one canonical name only the first present (in map order) is
/// renamed.
pub fn reconcile_columns(mut raw: RawTable, aliases: &BTreeMap<String, String>) -> RawTable {
    for column in raw.columns.iter_mut() {
        let trimmed = column.trim();
        if trimmed.len() != column.len() {
            *column = trimmed.to_string();
        }
    }

    let mut shadowed = Vec::new();
    for (alias, canonical) in aliases {
        let Some(idx) = raw.column_index(alias) else {
            continue;
        };
        if raw.column_index(canonical).is_some() {
            debug!(source = %raw.source, %alias, %canonical, "dropping shadowed alias column");
            shadowed.push(idx);
        } else {
            debug!(source = %raw.source, %alias, %canonical, "renaming aliased column");
            raw.columns[idx] = canonical.clone();
        }
    }

    if !shadowed.is_empty() {
        shadowed.sort_unstable();
        shadowed.dedup();
        for &idx in shadowed.iter().rev() {
            raw.columns.remove(idx);
            for row in raw.rows.iter_mut() {
                if idx < row.len() {
                    row.remove(idx);
                }
            }
        }
    }
    raw
}

/// Validate a raw table.
///
/// # Errors
///
/// - [`QcError::SchemaValidation`]: one or more required identifier columns
///   are absent.
/// - [`QcError::NoTestColumns`]: no column outside the identifier set holds
///   numeric data.
pub fn validate_table(raw: RawTable) -> Result<ValidatedTable> {
    let missing_columns: Vec<String> = REQUIRED_COLUMNS
        .iter()
        .filter(|c| raw.column_index(c).is_none())
        .map(|c| c.to_string())
        .collect();

    if !missing_columns.is_empty() {
        return Err(QcError::SchemaValidation {
            source_name: raw.source.clone(),
            missing_columns,
        });
    }

    let mut test_columns = Vec::new();
    let mut ignored = Vec::new();
    for (idx, name) in raw.columns.iter().enumerate() {
        if is_identifier_column(name) {
            continue;
        }
        match non_numeric_reason(&raw, idx) {
            None => test_columns.push(name.clone()),
            Some(reason) => {
                warn!(source = %raw.source, column = %name, %reason, "ignoring column");
                ignored.push(Diagnostic::IgnoredColumn {
                    source_name: raw.source.clone(),
                    column: name.clone(),
                    reason,
                });
            }
        }
    }

    if test_columns.is_empty() {
        return Err(QcError::NoTestColumns {
            source_name: raw.source.clone(),
        });
    }

    Ok(ValidatedTable {
        raw,
        test_columns,
        ignored,
    })
}

/// A column is numeric when it holds at least one number and no text.
/// Otherwise returns why it is not, naming the first offending cell.
fn non_numeric_reason(raw: &RawTable, col: usize) -> Option<String> {
    let mut saw_number = false;
    for row in 0..raw.row_count() {
        match raw.cell(row, col) {
            Cell::Number(_) => saw_number = true,
            // Data rows are numbered from 1, after the header.
            Cell::Text(text) => {
                return Some(format!("non-numeric value '{text}' in row {}", row + 1))
            }
            Cell::Empty => {}
        }
    }
    (!saw_number).then(|| "no numeric values".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(columns: &[&str], rows: &[&[&str]]) -> RawTable {
        let mut t = RawTable::new("src.csv", columns.iter().map(|c| c.to_string()).collect());
        for r in rows {
            t.push_row(r.iter().map(|c| Cell::parse(c)).collect());
        }
        t
    }

    #[test]
    fn test_valid_table_resolves_test_columns() {
        let t = raw(
            &["Lab Code", "Brand code", "Model code", "RBC", "Lab Name", "WBC"],
            &[&["1", "5", "602", "4.5", "North", ""], &["2", "5", "602", "0", "South", "7.1"]],
        );
        let v = validate_table(t).unwrap();
        assert_eq!(v.test_columns, vec!["RBC".to_string(), "WBC".to_string()]);
    }

    #[test]
    fn test_missing_identifier_columns_rejected() {
        let t = raw(&["Lab Code", "RBC"], &[&["1", "4.5"]]);
        match validate_table(t) {
            Err(QcError::SchemaValidation {
                missing_columns, ..
            }) => {
                assert_eq!(
                    missing_columns,
                    vec!["Brand code".to_string(), "Model code".to_string()]
                );
            }
            other => panic!("expected SchemaValidation, got {other:?}"),
        }
    }

    #[test]
    fn test_no_numeric_columns_rejected() {
        let t = raw(
            &["Lab Code", "Brand code", "Model code", "Remarks"],
            &[&["1", "5", "602", "late"]],
        );
        assert!(matches!(
            validate_table(t),
            Err(QcError::NoTestColumns { .. })
        ));
    }

    #[test]
    fn test_all_blank_column_is_not_a_test_column() {
        let t = raw(
            &["Lab Code", "Brand code", "Model code", "RBC", "HCT"],
            &[&["1", "5", "602", "4.4", ""]],
        );
        let v = validate_table(t).unwrap();
        assert_eq!(v.test_columns, vec!["RBC".to_string()]);
        assert!(matches!(
            v.ignored.as_slice(),
            [Diagnostic::IgnoredColumn { column, reason, .. }]
                if column == "HCT" && reason == "no numeric values"
        ));
    }

    #[test]
    fn test_reconcile_renames_alias_and_trims() {
        let mut aliases = BTreeMap::new();
        aliases.insert("B_M_No".to_string(), "Model code".to_string());
        let t = raw(&[" Lab Code ", "Brand code", "B_M_No", "RBC"], &[&["1", "5", "602", "4.4"]]);
        let t = reconcile_columns(t, &aliases);
        assert_eq!(t.columns[0], "Lab Code");
        assert_eq!(t.columns[2], "Model code");
        assert!(validate_table(t).is_ok());
    }

    #[test]
    fn test_reconcile_drops_alias_shadowed_by_canonical() {
        let mut aliases = BTreeMap::new();
        aliases.insert("B_M_No".to_string(), "Model code".to_string());
        let t = raw(
            &["Lab Code", "Brand code", "Model code", "B_M_No", "RBC"],
            &[&["1", "5", "602", "603", "4.4"], &["2", "5", "602"]],
        );
        let t = reconcile_columns(t, &aliases);
        assert_eq!(t.columns, vec!["Lab Code", "Brand code", "Model code", "RBC"]);
        assert_eq!(t.cell(0, 2), &Cell::Number(602.0));
        assert_eq!(t.cell(0, 3), &Cell::Number(4.4));

        let v = validate_table(t).unwrap();
        assert_eq!(v.test_columns, vec!["RBC".to_string()]);
    }

    #[test]
    fn test_two_aliases_for_one_canonical_keep_one() {
        let mut aliases = BTreeMap::new();
        aliases.insert("B_M_No".to_string(), "Model code".to_string());
        aliases.insert("Model_Code".to_string(), "Model code".to_string());
        let t = raw(
            &["Lab Code", "Brand code", "Model_Code", "B_M_No", "RBC"],
            &[&["1", "5", "700", "602", "4.4"]],
        );
        let v = validate_table(reconcile_columns(t, &aliases)).unwrap();
        assert_eq!(v.test_columns, vec!["RBC".to_string()]);
        let model = v.raw.column_index("Model code").unwrap();
        assert_eq!(v.raw.cell(0, model), &Cell::Number(602.0));
    }

    #[test]
    fn test_text_cell_in_test_column_is_reported() {
        let t = raw(
            &["Lab Code", "Brand code", "Model code", "RBC", "WBC"],
            &[
                &["1", "5", "602", "4.5", "7.0"],
                &["2", "5", "602", "<0.5", "7.2"],
                &["3", "5", "602", "4.6", "7.1"],
            ],
        );
        let v = validate_table(t).unwrap();
        assert_eq!(v.test_columns, vec!["WBC".to_string()]);
        match v.ignored.as_slice() {
            [Diagnostic::IgnoredColumn { column, reason, .. }] => {
                assert_eq!(column, "RBC");
                assert_eq!(reason, "non-numeric value '<0.5' in row 2");
            }
            other => panic!("expected one ignored column, got {other:?}"),
        }
    }
}
