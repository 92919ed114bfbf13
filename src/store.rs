//! SQLite-backed analytical store.
//!
//! The store owns no fixed schema: staging areas and final tables are created
//! by the pipeline. Helpers here cover identifier quoting, catalog lookups and
//! savepoint-scoped atomic steps that nest inside an outer transaction.

use std::path::Path;

use log::debug;
use rusqlite::{Connection, OptionalExtension as _};

use crate::{
    entity::Entity,
    error::{EtlError, Result},
};

const PRAGMAS: &str = "
PRAGMA journal_mode = WAL;
PRAGMA synchronous = NORMAL;
";

pub struct Store {
    conn: Connection,
}

impl Store {
    /// Open (or create) a store file.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        conn.execute_batch(PRAGMAS)?;
        debug!("Opened store {path:?}");
        Ok(Self { conn })
    }

    /// In-memory store, used by tests.
    pub fn open_in_memory() -> Result<Self> {
        Ok(Self {
            conn: Connection::open_in_memory()?,
        })
    }

    pub fn conn(&self) -> &Connection {
        &self.conn
    }

    /// Row counts of the six final tables; `None` when a table was never built.
    pub fn table_counts(&self) -> Result<Vec<(Entity, Option<u64>)>> {
        Entity::ALL
            .into_iter()
            .map(|entity| {
                let count = if table_exists(&self.conn, entity.table())? {
                    Some(row_count(&self.conn, entity.table())?)
                } else {
                    None
                };
                Ok((entity, count))
            })
            .collect()
    }
}

/// Double-quoted SQL identifier.
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

pub fn table_exists(conn: &Connection, table: &str) -> Result<bool> {
    let found = conn
        .query_row(
            "SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?1",
            [table],
            |_| Ok(()),
        )
        .optional()?;
    Ok(found.is_some())
}

/// Column names in declaration order, or `None` if the table does not exist.
pub fn table_columns(conn: &Connection, table: &str) -> Result<Option<Vec<String>>> {
    if !table_exists(conn, table)? {
        return Ok(None);
    }
    let mut stmt = conn.prepare("SELECT name FROM pragma_table_info(?1) ORDER BY cid")?;
    let columns = stmt
        .query_map([table], |row| row.get::<_, String>(0))?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(Some(columns))
}

pub fn has_column(conn: &Connection, table: &str, column: &str) -> Result<bool> {
    Ok(table_columns(conn, table)?
        .is_some_and(|columns| columns.iter().any(|c| c.eq_ignore_ascii_case(column))))
}

pub fn row_count(conn: &Connection, table: &str) -> Result<u64> {
    let count: i64 = conn.query_row(
        &format!("SELECT COUNT(*) FROM {}", quote_ident(table)),
        [],
        |row| row.get(0),
    )?;
    Ok(count as u64)
}

pub fn require_table(conn: &Connection, table: &str) -> Result<Vec<String>> {
    table_columns(conn, table)?.ok_or_else(|| EtlError::MissingTable(table.to_string()))
}

/// Every row of `table` as text cells, in physical order. Intended for
/// reports and tests over small tables.
pub fn select_rows(
    conn: &Connection,
    table: &str,
    columns: &[&str],
) -> Result<Vec<Vec<Option<String>>>> {
    let projection = columns
        .iter()
        .map(|c| format!("CAST({} AS TEXT)", quote_ident(c)))
        .collect::<Vec<_>>()
        .join(", ");
    let mut stmt = conn.prepare(&format!(
        "SELECT {projection} FROM {} ORDER BY rowid",
        quote_ident(table)
    ))?;
    let rows = stmt
        .query_map([], |row| {
            (0..columns.len())
                .map(|idx| row.get::<_, Option<String>>(idx))
                .collect::<rusqlite::Result<Vec<_>>>()
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(rows)
}

/// Runs `step` inside a savepoint: released on success, rolled back on error.
pub fn atomically<T, F>(conn: &Connection, name: &str, step: F) -> Result<T>
where
    F: FnOnce(&Connection) -> Result<T>,
{
    let savepoint = quote_ident(name);
    conn.execute_batch(&format!("SAVEPOINT {savepoint}"))?;
    match step(conn) {
        Ok(value) => {
            conn.execute_batch(&format!("RELEASE {savepoint}"))?;
            Ok(value)
        }
        Err(err) => {
            if let Err(rollback) =
                conn.execute_batch(&format!("ROLLBACK TO {savepoint}; RELEASE {savepoint}"))
            {
                debug!("Rollback of savepoint {name} failed: {rollback}");
            }
            Err(err)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quote_ident_escapes_embedded_quotes() {
        assert_eq!(quote_ident("SiglaLotação"), "\"SiglaLotação\"");
        assert_eq!(quote_ident("a\"b"), "\"a\"\"b\"");
    }

    #[test]
    fn catalog_lookups_reflect_created_tables() {
        let store = Store::open_in_memory().expect("store");
        let conn = store.conn();
        assert_eq!(table_columns(conn, "dCurso").unwrap(), None);
        conn.execute_batch("CREATE TABLE dCurso (Cod_Curso TEXT, Curso TEXT)")
            .unwrap();
        assert_eq!(
            table_columns(conn, "dCurso").unwrap(),
            Some(vec!["Cod_Curso".to_string(), "Curso".to_string()])
        );
        assert!(has_column(conn, "dCurso", "cod_curso").unwrap());
        assert_eq!(row_count(conn, "dCurso").unwrap(), 0);
    }

    #[test]
    fn failed_step_rolls_back() {
        let store = Store::open_in_memory().expect("store");
        let conn = store.conn();
        conn.execute_batch("CREATE TABLE t (v TEXT)").unwrap();
        let result: Result<()> = atomically(conn, "step", |conn| {
            conn.execute("INSERT INTO t VALUES ('a')", [])?;
            Err(EtlError::MissingTable("boom".into()))
        });
        assert!(result.is_err());
        assert_eq!(row_count(conn, "t").unwrap(), 0);
    }

    #[test]
    fn nested_steps_commit_together() {
        let store = Store::open_in_memory().expect("store");
        let conn = store.conn();
        conn.execute_batch("CREATE TABLE t (v TEXT)").unwrap();
        atomically(conn, "outer", |conn| {
            atomically(conn, "inner", |conn| {
                conn.execute("INSERT INTO t VALUES ('a')", [])?;
                Ok(())
            })
        })
        .unwrap();
        assert_eq!(row_count(conn, "t").unwrap(), 1);
    }
}
