//! In-memory workbook model and the readers that fill it.
//!
//! A [`Workbook`] is an ordered list of named [`Sheet`]s. Spreadsheet files
//! are read with `calamine`; a directory of `.csv`/`.tsv` files (one file per
//! sheet) or a single delimited file is read with `csv`.

use std::{
    fs,
    path::{Path, PathBuf},
};

use calamine::{Data, Reader, open_workbook_auto};
use encoding_rs::Encoding;
use log::{debug, warn};
use sha2::{Digest, Sha256};

use crate::{
    error::{EtlError, Result},
    io_utils,
};

const SPREADSHEET_EXTENSIONS: &[&str] = &["xlsx", "xlsm", "xlsb", "xls", "ods"];

/// One sheet: a header row plus data rows of optional text cells.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sheet {
    pub name: String,
    pub headers: Vec<String>,
    pub rows: Vec<Vec<Option<String>>>,
}

impl Sheet {
    pub fn new(name: impl Into<String>, headers: Vec<String>) -> Self {
        Self {
            name: name.into(),
            headers,
            rows: Vec::new(),
        }
    }

    /// Appends a row, padding or truncating it to the header width. Rows with
    /// no non-blank cell are ignored. Returns how many non-blank cells fell
    /// beyond the last header and were dropped.
    pub fn push_row(&mut self, cells: Vec<Option<String>>) -> usize {
        let mut row: Vec<Option<String>> = cells.into_iter().map(blank_to_none).collect();
        let dropped = row
            .get(self.headers.len()..)
            .map_or(0, |overflow| overflow.iter().filter(|cell| cell.is_some()).count());
        row.resize(self.headers.len(), None);
        if row.iter().any(Option::is_some) {
            self.rows.push(row);
        }
        dropped
    }

    /// Test-friendly builder: `""` cells become NULL.
    pub fn from_strs(name: &str, headers: &[&str], rows: &[&[&str]]) -> Self {
        let mut sheet = Sheet::new(name, headers.iter().map(|h| h.to_string()).collect());
        for row in rows {
            sheet.push_row(row.iter().map(|cell| Some(cell.to_string())).collect());
        }
        sheet
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

#[derive(Debug, Clone)]
pub struct Workbook {
    pub source: PathBuf,
    pub sheets: Vec<Sheet>,
}

impl Workbook {
    pub fn new(source: impl Into<PathBuf>, sheets: Vec<Sheet>) -> Self {
        Self {
            source: source.into(),
            sheets,
        }
    }

    pub fn sheet(&self, name: &str) -> Option<&Sheet> {
        self.sheets.iter().find(|sheet| sheet.name == name)
    }
}

/// Reads a workbook from a spreadsheet file, a delimited file, or a
/// directory of delimited files.
pub fn read_workbook(path: &Path, encoding: &'static Encoding) -> Result<Workbook> {
    if path.is_dir() {
        return read_csv_directory(path, encoding);
    }
    if io_utils::is_delimited_file(path) {
        let sheet = read_csv_sheet(path, encoding)?;
        return Ok(Workbook::new(path, vec![sheet]));
    }
    let is_spreadsheet = path
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| {
            SPREADSHEET_EXTENSIONS
                .iter()
                .any(|known| ext.eq_ignore_ascii_case(known))
        });
    if is_spreadsheet {
        read_spreadsheet(path)
    } else {
        Err(EtlError::UnsupportedWorkbook(path.to_path_buf()))
    }
}

fn read_spreadsheet(path: &Path) -> Result<Workbook> {
    let mut workbook = open_workbook_auto(path).map_err(|err| EtlError::Spreadsheet {
        path: path.to_path_buf(),
        message: err.to_string(),
    })?;
    let mut sheets = Vec::new();
    for name in workbook.sheet_names() {
        let range = workbook
            .worksheet_range(&name)
            .map_err(|err| EtlError::Sheet {
                path: path.to_path_buf(),
                sheet: name.clone(),
                message: err.to_string(),
            })?;
        let mut rows = range.rows();
        let headers = match rows.next() {
            Some(header_row) => header_row
                .iter()
                .enumerate()
                .map(|(idx, cell)| header_name(cell_text(cell), idx))
                .collect(),
            None => Vec::new(),
        };
        let mut sheet = Sheet::new(name, headers);
        let mut dropped = 0;
        for row in rows {
            dropped += sheet.push_row(row.iter().map(cell_text).collect());
        }
        warn_dropped_cells(&sheet, path, dropped);
        debug!(
            "Read sheet '{}' from {:?}: {} column(s), {} row(s)",
            sheet.name,
            path,
            sheet.headers.len(),
            sheet.rows.len()
        );
        sheets.push(sheet);
    }
    Ok(Workbook::new(path, sheets))
}

fn read_csv_directory(dir: &Path, encoding: &'static Encoding) -> Result<Workbook> {
    let mut files = fs::read_dir(dir)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| path.is_file() && io_utils::is_delimited_file(path))
        .collect::<Vec<_>>();
    files.sort();
    let sheets = files
        .iter()
        .map(|path| read_csv_sheet(path, encoding))
        .collect::<Result<Vec<_>>>()?;
    Ok(Workbook::new(dir, sheets))
}

fn read_csv_sheet(path: &Path, encoding: &'static Encoding) -> Result<Sheet> {
    let name = path
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_default();
    let mut reader = io_utils::open_csv_reader_from_path(path)?;
    let headers = io_utils::reader_headers(&mut reader, path, encoding)?
        .into_iter()
        .enumerate()
        .map(|(idx, header)| header_name(Some(header), idx))
        .collect();
    let mut sheet = Sheet::new(name, headers);
    let mut dropped = 0;
    for record in reader.byte_records() {
        let record = record.map_err(|source| EtlError::Csv {
            path: path.to_path_buf(),
            source,
        })?;
        let decoded = io_utils::decode_record(&record, encoding)?;
        dropped += sheet.push_row(decoded.into_iter().map(Some).collect());
    }
    warn_dropped_cells(&sheet, path, dropped);
    Ok(sheet)
}

/// SHA-256 of a workbook's bytes; directories hash their sheet files in name order.
pub fn fingerprint(path: &Path) -> Result<String> {
    let mut hasher = Sha256::new();
    if path.is_dir() {
        let mut files = fs::read_dir(path)?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|p| p.is_file() && io_utils::is_delimited_file(p))
            .collect::<Vec<_>>();
        files.sort();
        for file in files {
            hasher.update(fs::read(&file)?);
        }
    } else {
        hasher.update(fs::read(path)?);
    }
    Ok(hasher
        .finalize()
        .iter()
        .map(|byte| format!("{byte:02x}"))
        .collect())
}

fn warn_dropped_cells(sheet: &Sheet, path: &Path, dropped: usize) {
    if dropped > 0 {
        warn!(
            "Sheet '{}' in {:?}: dropped {dropped} non-blank cell(s) beyond its {} header(s)",
            sheet.name,
            path,
            sheet.headers.len()
        );
    }
}

fn header_name(raw: Option<String>, idx: usize) -> String {
    match raw {
        Some(name) if !name.trim().is_empty() => name,
        _ => format!("Unnamed: {idx}"),
    }
}

fn blank_to_none(cell: Option<String>) -> Option<String> {
    cell.filter(|value| !value.trim().is_empty())
}

fn cell_text(cell: &Data) -> Option<String> {
    match cell {
        Data::Empty => None,
        Data::String(s) => Some(s.clone()),
        Data::Int(i) => Some(i.to_string()),
        Data::Float(f) => Some(format_float(*f)),
        Data::Bool(b) => Some(b.to_string()),
        Data::DateTime(dt) => Some(match dt.as_datetime() {
            Some(value) if value.time() == chrono::NaiveTime::MIN => {
                value.format("%Y-%m-%d").to_string()
            }
            Some(value) => value.format("%Y-%m-%d %H:%M:%S").to_string(),
            None => format_float(dt.as_f64()),
        }),
        Data::DateTimeIso(s) | Data::DurationIso(s) => Some(s.clone()),
        Data::Error(err) => {
            debug!("Treating cell error {err:?} as empty");
            None
        }
    }
}

/// Integral floats render without a fractional part so numeric codes and
/// years stay comparable with their text form.
fn format_float(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{value:.0}")
    } else {
        value.to_string()
    }
}
