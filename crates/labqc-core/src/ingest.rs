//! CSV ingestion into [`RawTable`]s.

use std::borrow::Cow;
use std::io::Read;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::error::{Diagnostic, Result};
use crate::metrics::METRICS;
use crate::obs::emit_source_skipped;
use crate::table::{Cell, RawTable};

/// Raw tables read from disk, plus the files that could not be read.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LoadedSources {
    pub tables: Vec<RawTable>,
    /// One [`Diagnostic::SkippedSource`] per unreadable file.
    pub rejected: Vec<Diagnostic>,
}

impl From<Vec<RawTable>> for LoadedSources {
    fn from(tables: Vec<RawTable>) -> Self {
        Self {
            tables,
            rejected: Vec::new(),
        }
    }
}

fn source_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

/// Read a headered CSV file. The source name is the file name.
pub fn read_csv_table(path: &Path) -> Result<RawTable> {
    let source = source_name(path);
    let file = std::fs::File::open(path)?;
    parse_csv_table(&source, file)
}

/// Read every file in `paths`.
///
/// A file that cannot be opened or parsed becomes a
/// [`Diagnostic::SkippedSource`] and the remaining files are still read.
pub fn read_csv_sources(paths: &[PathBuf]) -> LoadedSources {
    let mut loaded = LoadedSources::default();
    for path in paths {
        match read_csv_table(path) {
            Ok(table) => loaded.tables.push(table),
            Err(e) => {
                let source = source_name(path);
                let reason = e.to_string();
                METRICS.inc_sources_skipped();
                emit_source_skipped(&source, &reason);
                loaded.rejected.push(Diagnostic::SkippedSource {
                    source_name: source,
                    reason,
                });
            }
        }
    }
    loaded
}

/// Parse headered CSV from any reader.
///
/// Rows shorter than the header are padded with empty cells; ragged rows
/// are accepted. Bytes that are not valid UTF-8 (Latin-1 spreadsheet
/// exports) are decoded lossily.
pub fn parse_csv_table<R: Read>(source: &str, reader: R) -> Result<RawTable> {
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(reader);

    let mut lossy = 0usize;
    let mut decode = |field: &[u8]| -> String {
        let text = String::from_utf8_lossy(field);
        if let Cow::Owned(_) = text {
            lossy += 1;
        }
        text.into_owned()
    };

    let columns: Vec<String> = rdr
        .byte_headers()?
        .iter()
        .map(|h| decode(h).trim_start_matches('\u{feff}').to_string())
        .collect();
    let width = columns.len();
    let mut table = RawTable::new(source, columns);

    for row in rdr.byte_records() {
        let row = row?;
        let cells: Vec<Cell> = row
            .iter()
            .take(width)
            .map(|field| Cell::parse(&decode(field)))
            .collect();
        table.push_row(cells);
    }

    if lossy > 0 {
        warn!(source = %source, fields = lossy, "replaced invalid utf-8 in csv source");
    }
    debug!(
        source = %source,
        columns = table.columns.len(),
        rows = table.row_count(),
        "parsed csv source"
    );
    Ok(table)
}
