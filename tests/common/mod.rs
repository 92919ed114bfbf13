#![allow(dead_code)]

use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use avaliacao_etl::{entity::Entity, store::Store};
use tempfile::{TempDir, tempdir};

/// Scratch directory helper that cleans up files automatically on drop.
pub struct TestWorkspace {
    temp_dir: TempDir,
}

impl TestWorkspace {
    /// Creates a fresh scratch directory for the current test case.
    pub fn new() -> Self {
        Self {
            temp_dir: tempdir().expect("temp dir"),
        }
    }

    /// Returns the root path for all files owned by this workspace.
    pub fn path(&self) -> &Path {
        self.temp_dir.path()
    }

    /// Writes `contents` into a file under the workspace and returns the path.
    pub fn write(&self, name: &str, contents: &str) -> PathBuf {
        let path = self.temp_dir.path().join(name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("create parent dir");
        }
        let mut file = File::create(&path).expect("create temp file");
        file.write_all(contents.as_bytes())
            .expect("write temp file contents");
        path
    }

    /// Writes a workbook as a directory holding one CSV file per sheet.
    pub fn workbook(&self, name: &str, sheets: &[(&str, &str)]) -> PathBuf {
        let dir = self.temp_dir.path().join(name);
        fs::create_dir_all(&dir).expect("create workbook dir");
        for (sheet, contents) in sheets {
            self.write(&format!("{name}/{sheet}.csv"), contents);
        }
        dir
    }

    pub fn db_path(&self) -> PathBuf {
        self.temp_dir.path().join("store.sqlite")
    }

    pub fn open_store(&self) -> Store {
        Store::open(self.db_path()).expect("open store")
    }
}

/// Header line plus one row per contract column set, for the direct-insert path.
pub fn contract_csv(entity: Entity, rows: &[&[&str]]) -> String {
    let mut out = entity.required_columns().join(",");
    out.push('\n');
    for row in rows {
        out.push_str(&row.join(","));
        out.push('\n');
    }
    out
}

/// Creates the six published tables with exactly the contract columns.
pub fn create_contract_tables(store: &Store) {
    for entity in Entity::ALL {
        let columns = entity
            .required_columns()
            .iter()
            .map(|c| format!("\"{c}\" TEXT"))
            .collect::<Vec<_>>()
            .join(", ");
        store
            .conn()
            .execute_batch(&format!("CREATE TABLE \"{}\" ({columns})", entity.table()))
            .expect("create contract table");
    }
}

/// Rows of `table` projected onto `columns`, sorted for order-independent checks.
pub fn sorted_rows(store: &Store, table: &str, columns: &[&str]) -> Vec<Vec<Option<String>>> {
    let mut rows = avaliacao_etl::store::select_rows(store.conn(), table, columns).expect("select rows");
    rows.sort();
    rows
}

pub fn text(value: &str) -> Option<String> {
    Some(value.to_string())
}
