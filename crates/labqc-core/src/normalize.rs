//! Missing-value normalisation.
//!
//! A literal zero in a test column means "not measured". Identifier columns
//! are excluded by name and keep their values verbatim.

use std::collections::BTreeMap;

use crate::schema::ValidatedTable;
use crate::table::{Cell, Measurement, Record, Table, BRAND_CODE, LAB_CODE, MODEL_CODE, SOURCE_FILE};

/// Map one test cell to its normalised state.
pub fn normalize_cell(cell: &Cell) -> Measurement {
    match cell {
        Cell::Number(v) if *v == 0.0 => Measurement::NotMeasured,
        Cell::Number(v) => Measurement::Measured(*v),
        Cell::Empty | Cell::Text(_) => Measurement::Missing,
    }
}

/// Convert a validated table into typed records.
pub fn normalize_table(validated: ValidatedTable) -> Table {
    let ValidatedTable {
        raw, test_columns, ..
    } = validated;

    let lab_idx = raw.column_index(LAB_CODE);
    let brand_idx = raw.column_index(BRAND_CODE);
    let model_idx = raw.column_index(MODEL_CODE);
    let source_idx = raw.column_index(SOURCE_FILE);
    let test_idx: Vec<(String, Option<usize>)> = test_columns
        .iter()
        .map(|t| (t.clone(), raw.column_index(t)))
        .collect();

    let ident = |row: usize, idx: Option<usize>| -> String {
        idx.map(|i| raw.cell(row, i).as_identifier())
            .unwrap_or_default()
    };

    let records = (0..raw.row_count())
        .map(|row| {
            let values: BTreeMap<String, Measurement> = test_idx
                .iter()
                .map(|(name, idx)| {
                    let m = idx
                        .map(|i| normalize_cell(raw.cell(row, i)))
                        .unwrap_or(Measurement::Missing);
                    (name.clone(), m)
                })
                .collect();
            let source = Some(ident(row, source_idx)).filter(|s| !s.is_empty());
            Record {
                lab_code: ident(row, lab_idx),
                brand_code: ident(row, brand_idx),
                model_code: ident(row, model_idx),
                source,
                values,
            }
        })
        .collect();

    Table {
        source: raw.source,
        test_columns,
        records,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::validate_table;
    use crate::table::RawTable;

    #[test]
    fn test_zero_becomes_not_measured() {
        assert_eq!(normalize_cell(&Cell::Number(0.0)), Measurement::NotMeasured);
        assert_eq!(normalize_cell(&Cell::Number(-0.0)), Measurement::NotMeasured);
        assert_eq!(normalize_cell(&Cell::Number(0.01)), Measurement::Measured(0.01));
        assert_eq!(normalize_cell(&Cell::Empty), Measurement::Missing);
    }

    #[test]
    fn test_identifier_zero_is_not_normalised() {
        let mut raw = RawTable::new(
            "a.csv",
            vec![
                "Lab Code".to_string(),
                "Brand code".to_string(),
                "Model code".to_string(),
                "RBC".to_string(),
            ],
        );
        raw.push_row(vec![
            Cell::Number(0.0),
            Cell::Number(5.0),
            Cell::Number(602.0),
            Cell::Number(0.0),
        ]);
        let table = normalize_table(validate_table(raw).unwrap_or_else(|e| panic!("{e}")));
        let r = &table.records[0];
        assert_eq!(r.lab_code, "0");
        assert_eq!(r.model_code, "602");
        assert_eq!(r.measurement("RBC"), Measurement::NotMeasured);
        assert_eq!(r.source, None);
    }

    #[test]
    fn test_source_file_column_tags_record() {
        let mut raw = RawTable::new(
            "combined.csv",
            vec![
                "Lab Code".to_string(),
                "Brand code".to_string(),
                "Model code".to_string(),
                "Source_File".to_string(),
                "WBC".to_string(),
            ],
        );
        raw.push_row(vec![
            Cell::Number(11.0),
            Cell::Number(5.0),
            Cell::Number(503.0),
            Cell::Text("503-AV.csv".to_string()),
            Cell::Number(7.2),
        ]);
        let table = normalize_table(validate_table(raw).unwrap_or_else(|e| panic!("{e}")));
        assert_eq!(table.records[0].source.as_deref(), Some("503-AV.csv"));
        assert_eq!(table.records[0].value("WBC"), Some(7.2));
    }
}
