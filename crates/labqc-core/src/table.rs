//! Tabular data model.
//!
//! - [`RawTable`]: untyped cells as handed over by an ingestion collaborator
//! - [`Record`]: one lab's submission for one instrument model
//! - [`Table`]: validated, normalised records sharing one test-column schema

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

pub const LAB_CODE: &str = "Lab Code";
pub const BRAND_CODE: &str = "Brand code";
pub const MODEL_CODE: &str = "Model code";
pub const SOURCE_FILE: &str = "Source_File";

/// Columns every source must carry.
pub const REQUIRED_COLUMNS: [&str; 3] = [LAB_CODE, BRAND_CODE, MODEL_CODE];

/// Columns that are never treated as test values.
pub const IDENTIFIER_COLUMNS: [&str; 4] = [LAB_CODE, BRAND_CODE, MODEL_CODE, SOURCE_FILE];

/// Returns `true` if `column` is an identifier column.
pub fn is_identifier_column(column: &str) -> bool {
    IDENTIFIER_COLUMNS.contains(&column)
}

/// A single untyped cell.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Cell {
    Empty,
    Number(f64),
    Text(String),
}

impl Cell {
    /// Parse a raw text cell. Blank and `nan` are empty; anything `f64`
    /// accepts is a number; the rest is text.
    pub fn parse(raw: &str) -> Self {
        let trimmed = raw.trim();
        if trimmed.is_empty() || trimmed.eq_ignore_ascii_case("nan") {
            return Cell::Empty;
        }
        match trimmed.parse::<f64>() {
            Ok(v) if v.is_finite() => Cell::Number(v),
            _ => Cell::Text(trimmed.to_string()),
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            Cell::Number(v) => Some(*v),
            _ => None,
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, Cell::Empty)
    }

    /// Render as an identifier. Integral numbers drop their fractional part
    /// so `602` and `602.0` name the same model.
    pub fn as_identifier(&self) -> String {
        match self {
            Cell::Empty => String::new(),
            Cell::Text(s) => s.clone(),
            Cell::Number(v) => {
                if v.fract() == 0.0 && v.abs() < 1e15 {
                    format!("{}", *v as i64)
                } else {
                    v.to_string()
                }
            }
        }
    }
}

/// Untyped table from one source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawTable {
    /// Source identifier (usually the file name).
    pub source: String,
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Cell>>,
}

impl RawTable {
    pub fn new(source: impl Into<String>, columns: Vec<String>) -> Self {
        Self {
            source: source.into(),
            columns,
            rows: Vec::new(),
        }
    }

    /// Append a row; short rows are padded with [`Cell::Empty`].
    pub fn push_row(&mut self, mut row: Vec<Cell>) {
        if row.len() < self.columns.len() {
            row.resize(self.columns.len(), Cell::Empty);
        }
        self.rows.push(row);
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    pub fn cell(&self, row: usize, col: usize) -> &Cell {
        const EMPTY: &Cell = &Cell::Empty;
        self.rows
            .get(row)
            .and_then(|r| r.get(col))
            .unwrap_or(EMPTY)
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }
}

/// State of one test cell after normalisation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state", content = "value", rename_all = "snake_case")]
pub enum Measurement {
    /// A usable value.
    Measured(f64),
    /// The source submitted a literal zero.
    NotMeasured,
    /// Blank cell, or the column is absent from the source.
    Missing,
}

impl Measurement {
    pub fn value(&self) -> Option<f64> {
        match self {
            Measurement::Measured(v) => Some(*v),
            _ => None,
        }
    }

    /// `true` if the source supplied something for this cell (including zero).
    pub fn was_submitted(&self) -> bool {
        !matches!(self, Measurement::Missing)
    }
}

/// One lab's submission for one instrument model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub lab_code: String,
    pub brand_code: String,
    pub model_code: String,
    /// Originating source, when known.
    pub source: Option<String>,
    pub values: BTreeMap<String, Measurement>,
}

impl Record {
    pub fn measurement(&self, test: &str) -> Measurement {
        self.values
            .get(test)
            .copied()
            .unwrap_or(Measurement::Missing)
    }

    pub fn value(&self, test: &str) -> Option<f64> {
        self.measurement(test).value()
    }
}

/// Normalised records with a shared test-column schema.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Table {
    pub source: String,
    /// Test columns in schema order.
    pub test_columns: Vec<String>,
    pub records: Vec<Record>,
}

impl Table {
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Percentage of test cells (records × test columns) that hold no value.
    pub fn missing_percentage(&self) -> f64 {
        let total = self.records.len() * self.test_columns.len();
        if total == 0 {
            return 0.0;
        }
        let missing = self
            .records
            .iter()
            .flat_map(|r| self.test_columns.iter().map(move |t| r.value(t)))
            .filter(Option::is_none)
            .count();
        missing as f64 / total as f64 * 100.0
    }
}
