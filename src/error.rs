//! Error taxonomy for the ingestion pipeline.
//!
//! Only conditions that stop a run (or a single file in the direct-insert
//! path) are errors. Skipped sheets, orphans and unmapped responses are
//! diagnostics carried in the reports instead.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum EtlError {
    /// Direct-insert workbook lacks one or more canonical sheets.
    #[error("workbook is missing required sheet(s): {}", .sheets.join(", "))]
    MissingSheets { sheets: Vec<String> },

    /// Direct-insert sheet lacks one or more required columns.
    #[error("sheet `{sheet}` is missing required column(s): {}", .columns.join(", "))]
    MissingColumns { sheet: String, columns: Vec<String> },

    #[error("staging area `{area}` could not be extended with column `{column}`: {source}")]
    SchemaEvolution {
        area: String,
        column: String,
        #[source]
        source: rusqlite::Error,
    },

    #[error("staging area `{area}` rejected rows from sheet `{sheet}`: {source}")]
    StagingWrite {
        area: String,
        sheet: String,
        #[source]
        source: rusqlite::Error,
    },

    #[error("insert into `{table}` failed: {source}")]
    Insert {
        table: String,
        #[source]
        source: rusqlite::Error,
    },

    #[error("table `{0}` does not exist in the store")]
    MissingTable(String),

    #[error("column `{column}` does not exist in table `{table}`")]
    MissingColumn { table: String, column: String },

    #[error("{orphans} orphan row(s) remain after curation; rebuild was not published")]
    OrphanGate { orphans: u64 },

    #[error("could not open workbook {path:?}: {message}")]
    Spreadsheet { path: PathBuf, message: String },

    #[error("could not read sheet `{sheet}` of {path:?}: {message}")]
    Sheet {
        path: PathBuf,
        sheet: String,
        message: String,
    },

    #[error("could not read CSV sheet {path:?}: {source}")]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error("unsupported workbook format: {0:?}")]
    UnsupportedWorkbook(PathBuf),

    #[error("failed to decode text with encoding {0}")]
    Decode(&'static str),

    #[error("unknown encoding '{0}'")]
    UnknownEncoding(String),

    #[error(transparent)]
    Database(#[from] rusqlite::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T, E = EtlError> = std::result::Result<T, E>;
