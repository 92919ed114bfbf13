//! Schema-evolving staging areas.
//!
//! Every entity accumulates rows in `stg_<table>` during one ingestion run.
//! An append reconciles explicitly instead of retrying on failure:
//!
//! 1. area absent: create it from the batch's columns;
//! 2. area present: diff the column sets and `ALTER TABLE ... ADD COLUMN`
//!    every column only the batch carries;
//! 3. insert the batch by column name.
//!
//! Evolution is strictly additive. Every staging column is nullable `TEXT`,
//! so earlier rows read NULL for columns introduced later.

use std::collections::HashSet;

use log::{debug, info};
use rusqlite::{Connection, params_from_iter};
use serde::Serialize;

use crate::{
    entity::{Entity, STAGING_PREFIX},
    error::{EtlError, Result},
    store::{self, quote_ident},
    workbook::Sheet,
};

/// Columns an incoming batch carries that the staging area lacks.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SchemaDiff {
    pub missing: Vec<String>,
}

impl SchemaDiff {
    /// Compares names ASCII case-insensitively, as SQLite does.
    pub fn between(existing: &[String], incoming: &[String]) -> Self {
        let mut known: HashSet<String> = existing.iter().map(|c| c.to_ascii_lowercase()).collect();
        let missing = incoming
            .iter()
            .filter(|column| known.insert(column.to_ascii_lowercase()))
            .cloned()
            .collect();
        Self { missing }
    }

    pub fn is_empty(&self) -> bool {
        self.missing.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AppendOutcome {
    Created { columns: usize },
    Appended,
    Extended { added: Vec<String> },
}

/// Drops every staging area left from a previous run.
pub fn reset(conn: &Connection) -> Result<Vec<String>> {
    let areas = staging_areas(conn)?;
    for area in &areas {
        conn.execute_batch(&format!("DROP TABLE IF EXISTS {}", quote_ident(area)))?;
    }
    if !areas.is_empty() {
        debug!("Dropped {} staging area(s): {:?}", areas.len(), areas);
    }
    Ok(areas)
}

pub fn staging_areas(conn: &Connection) -> Result<Vec<String>> {
    let mut stmt = conn.prepare(
        "SELECT name FROM sqlite_master WHERE type = 'table' AND substr(name, 1, ?1) = ?2 ORDER BY name",
    )?;
    let areas = stmt
        .query_map(
            rusqlite::params![STAGING_PREFIX.len() as i64, STAGING_PREFIX],
            |row| row.get::<_, String>(0),
        )?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(areas)
}

/// Appends the sheet's rows to the staging area of `entity`.
pub fn append(conn: &Connection, entity: Entity, sheet: &Sheet) -> Result<AppendOutcome> {
    append_to_area(conn, &entity.staging_table(), sheet)
}

pub fn append_to_area(conn: &Connection, area: &str, sheet: &Sheet) -> Result<AppendOutcome> {
    store::atomically(conn, "staging_append", |conn| {
        let outcome = match store::table_columns(conn, area)? {
            None => {
                create_area(conn, area, sheet)?;
                AppendOutcome::Created {
                    columns: sheet.headers.len(),
                }
            }
            Some(existing) => {
                let diff = SchemaDiff::between(&existing, &sheet.headers);
                if diff.is_empty() {
                    AppendOutcome::Appended
                } else {
                    extend_area(conn, area, &diff)?;
                    AppendOutcome::Extended {
                        added: diff.missing,
                    }
                }
            }
        };
        insert_rows(conn, area, sheet)?;
        Ok(outcome)
    })
    .inspect(|outcome| log_outcome(area, sheet, outcome))
}

fn create_area(conn: &Connection, area: &str, sheet: &Sheet) -> Result<()> {
    let columns = sheet
        .headers
        .iter()
        .map(|column| format!("{} TEXT", quote_ident(column)))
        .collect::<Vec<_>>()
        .join(", ");
    conn.execute_batch(&format!("CREATE TABLE {} ({columns})", quote_ident(area)))
        .map_err(|source| EtlError::StagingWrite {
            area: area.to_string(),
            sheet: sheet.name.clone(),
            source,
        })
}

fn extend_area(conn: &Connection, area: &str, diff: &SchemaDiff) -> Result<()> {
    for column in &diff.missing {
        conn.execute_batch(&format!(
            "ALTER TABLE {} ADD COLUMN {} TEXT",
            quote_ident(area),
            quote_ident(column)
        ))
        .map_err(|source| EtlError::SchemaEvolution {
            area: area.to_string(),
            column: column.clone(),
            source,
        })?;
    }
    Ok(())
}

fn insert_rows(conn: &Connection, area: &str, sheet: &Sheet) -> Result<()> {
    if sheet.rows.is_empty() || sheet.headers.is_empty() {
        return Ok(());
    }
    let write_error = |source| EtlError::StagingWrite {
        area: area.to_string(),
        sheet: sheet.name.clone(),
        source,
    };
    let columns = sheet
        .headers
        .iter()
        .map(|column| quote_ident(column))
        .collect::<Vec<_>>()
        .join(", ");
    let placeholders = (1..=sheet.headers.len())
        .map(|idx| format!("?{idx}"))
        .collect::<Vec<_>>()
        .join(", ");
    let mut stmt = conn
        .prepare(&format!(
            "INSERT INTO {} ({columns}) VALUES ({placeholders})",
            quote_ident(area)
        ))
        .map_err(write_error)?;
    for row in &sheet.rows {
        stmt.execute(params_from_iter(row.iter()))
            .map_err(write_error)?;
    }
    Ok(())
}

fn log_outcome(area: &str, sheet: &Sheet, outcome: &AppendOutcome) {
    match outcome {
        AppendOutcome::Created { columns } => info!(
            "Created staging area {area} with {columns} column(s) from sheet '{}' ({} row(s))",
            sheet.name,
            sheet.rows.len()
        ),
        AppendOutcome::Appended => info!(
            "Appended {} row(s) from sheet '{}' to {area}",
            sheet.rows.len(),
            sheet.name
        ),
        AppendOutcome::Extended { added } => info!(
            "Extended {area} with {:?}; appended {} row(s) from sheet '{}'",
            added,
            sheet.rows.len(),
            sheet.name
        ),
    }
}

/// Row counts of every entity's staging area that exists.
pub fn staged_counts(conn: &Connection) -> Result<Vec<(Entity, u64)>> {
    let mut counts = Vec::new();
    for entity in Entity::ALL {
        let area = entity.staging_table();
        if store::table_exists(conn, &area)? {
            counts.push((entity, store::row_count(conn, &area)?));
        }
    }
    Ok(counts)
}
