//! Direct-insert path: one workbook validated against the fixed sheet and
//! column contract, then appended straight into the published tables.
//!
//! Nothing is written until every sheet validates, and all inserts of one
//! workbook share a savepoint, so a rejected file leaves the store unchanged.

use std::path::Path;

use itertools::Itertools;
use log::{debug, info};
use rusqlite::{Connection, params_from_iter};
use serde::Serialize;

use crate::{
    entity::Entity,
    error::{EtlError, Result},
    store::{self, quote_ident},
    workbook::{Sheet, Workbook},
};

#[derive(Debug, Clone, Copy)]
pub struct UploadOptions {
    pub drop_duplicates: bool,
}

impl Default for UploadOptions {
    fn default() -> Self {
        Self {
            drop_duplicates: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TableInsert {
    pub entity: Entity,
    pub table: &'static str,
    pub rows: usize,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct UploadReport {
    pub tables: Vec<TableInsert>,
    pub total: usize,
}

/// A sheet reduced to the required columns of its entity.
#[derive(Debug, Clone)]
pub struct ValidatedSheet {
    pub entity: Entity,
    pub rows: Vec<Vec<Option<String>>>,
}

/// Checks the contract and projects every sheet. Missing sheets are all
/// reported at once; missing columns stop at the first offending sheet.
pub fn validate(workbook: &Workbook, options: UploadOptions) -> Result<Vec<ValidatedSheet>> {
    let missing_sheets = Entity::ALL
        .into_iter()
        .filter(|entity| workbook.sheet(entity.table()).is_none())
        .map(|entity| entity.table().to_string())
        .collect::<Vec<_>>();
    if !missing_sheets.is_empty() {
        return Err(EtlError::MissingSheets {
            sheets: missing_sheets,
        });
    }

    let mut validated = Vec::with_capacity(Entity::ALL.len());
    for entity in Entity::ALL {
        let Some(sheet) = workbook.sheet(entity.table()) else {
            continue;
        };
        validated.push(project(entity, sheet, options)?);
    }
    Ok(validated)
}

fn project(entity: Entity, sheet: &Sheet, options: UploadOptions) -> Result<ValidatedSheet> {
    let headers = sheet.headers.iter().map(|h| h.trim()).collect::<Vec<_>>();
    let required = entity.required_columns();
    let missing = required
        .iter()
        .filter(|column| !headers.contains(*column))
        .map(|column| column.to_string())
        .collect::<Vec<_>>();
    if !missing.is_empty() {
        return Err(EtlError::MissingColumns {
            sheet: sheet.name.clone(),
            columns: missing,
        });
    }
    let indices = required
        .iter()
        .filter_map(|column| headers.iter().position(|header| header == column))
        .collect::<Vec<_>>();

    let projected = sheet
        .rows
        .iter()
        .map(|row| {
            indices
                .iter()
                .map(|&idx| row.get(idx).cloned().flatten())
                .collect::<Vec<_>>()
        })
        .filter(|row| row.iter().any(Option::is_some));
    let rows = if options.drop_duplicates {
        projected.unique().collect::<Vec<_>>()
    } else {
        projected.collect()
    };
    debug!(
        "Validated sheet '{}': {} of {} row(s) kept",
        sheet.name,
        rows.len(),
        sheet.rows.len()
    );
    Ok(ValidatedSheet { entity, rows })
}

/// Validates `workbook` and appends it to the existing final tables.
pub fn upload(conn: &Connection, workbook: &Workbook, options: UploadOptions) -> Result<UploadReport> {
    let validated = validate(workbook, options)?;
    insert_validated(conn, &workbook.source, &validated)
}

/// Appends already validated sheets in one savepoint.
pub fn insert_validated(
    conn: &Connection,
    source: &Path,
    validated: &[ValidatedSheet],
) -> Result<UploadReport> {
    let tables = store::atomically(conn, "direct_insert", |conn| {
        validated
            .iter()
            .map(|sheet| insert_sheet(conn, sheet))
            .collect::<Result<Vec<_>>>()
    })?;
    let total = tables.iter().map(|t| t.rows).sum();
    info!(
        "Inserted {total} row(s) from {source:?} across {} table(s)",
        tables.len()
    );
    Ok(UploadReport { tables, total })
}

fn insert_sheet(conn: &Connection, sheet: &ValidatedSheet) -> Result<TableInsert> {
    let table = sheet.entity.table();
    let insert_error = |source| EtlError::Insert {
        table: table.to_string(),
        source,
    };
    let columns = sheet.entity.required_columns();
    let sql = format!(
        "INSERT INTO {} ({}) VALUES ({})",
        quote_ident(table),
        columns.iter().map(|c| quote_ident(c)).join(", "),
        (1..=columns.len()).map(|idx| format!("?{idx}")).join(", ")
    );
    let mut stmt = conn.prepare(&sql).map_err(insert_error)?;
    for row in &sheet.rows {
        stmt.execute(params_from_iter(row.iter()))
            .map_err(insert_error)?;
    }
    Ok(TableInsert {
        entity: sheet.entity,
        table,
        rows: sheet.rows.len(),
    })
}
