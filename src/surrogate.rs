//! Surrogate key assignment for the fact table.

use log::info;
use rusqlite::Connection;
use serde::Serialize;

use crate::{
    entity::column,
    error::Result,
    store::{self, quote_ident},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum KeyAssignment {
    /// Column was absent; added and filled.
    Created { rows: u64 },
    /// Column existed but held only NULLs; every row refilled.
    Reassigned { rows: u64 },
    /// At least one row already carries an id.
    Unchanged,
}

/// Gives every row of `table` a sequential `id_avaliacao` in physical row
/// order, unless some row already has one.
pub fn assign_surrogate_keys(conn: &Connection, table: &str) -> Result<KeyAssignment> {
    store::require_table(conn, table)?;
    let id = quote_ident(column::EVALUATION_ID);
    let quoted_table = quote_ident(table);

    store::atomically(conn, "surrogate_keys", |conn| {
        let created = if store::has_column(conn, table, column::EVALUATION_ID)? {
            let assigned: i64 = conn.query_row(
                &format!("SELECT COUNT({id}) FROM {quoted_table}"),
                [],
                |row| row.get(0),
            )?;
            if assigned > 0 {
                return Ok(KeyAssignment::Unchanged);
            }
            false
        } else {
            conn.execute_batch(&format!(
                "ALTER TABLE {quoted_table} ADD COLUMN {id} INTEGER"
            ))?;
            true
        };

        let rows = conn.execute(
            &format!(
                "UPDATE {quoted_table} SET {id} = numbered.n
                 FROM (SELECT rowid AS rid, row_number() OVER (ORDER BY rowid) AS n
                       FROM {quoted_table}) AS numbered
                 WHERE {quoted_table}.rowid = numbered.rid"
            ),
            [],
        )? as u64;
        Ok(if created {
            KeyAssignment::Created { rows }
        } else {
            KeyAssignment::Reassigned { rows }
        })
    })
    .inspect(|assignment| match assignment {
        KeyAssignment::Unchanged => info!("{table} already carries surrogate keys"),
        KeyAssignment::Created { rows } | KeyAssignment::Reassigned { rows } => {
            info!("Assigned surrogate keys to {rows} row(s) of {table}")
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::Store;

    fn ids(conn: &Connection) -> Vec<Option<String>> {
        store::select_rows(conn, "fAvaliacao", &[column::EVALUATION_ID])
            .unwrap()
            .into_iter()
            .map(|mut row| row.remove(0))
            .collect()
    }

    #[test]
    fn absent_column_is_created_and_filled_sequentially() {
        let store = Store::open_in_memory().unwrap();
        let conn = store.conn();
        conn.execute_batch(
            "CREATE TABLE fAvaliacao (Resposta TEXT);
             INSERT INTO fAvaliacao VALUES ('Sim'), ('Não'), ('Sim');",
        )
        .unwrap();
        assert_eq!(
            assign_surrogate_keys(conn, "fAvaliacao").unwrap(),
            KeyAssignment::Created { rows: 3 }
        );
        assert_eq!(
            ids(conn),
            vec![Some("1".into()), Some("2".into()), Some("3".into())]
        );
    }

    #[test]
    fn populated_column_is_left_alone() {
        let store = Store::open_in_memory().unwrap();
        let conn = store.conn();
        conn.execute_batch(
            "CREATE TABLE fAvaliacao (Resposta TEXT, id_avaliacao INTEGER);
             INSERT INTO fAvaliacao VALUES ('Sim', 40), ('Não', NULL);",
        )
        .unwrap();
        assert_eq!(
            assign_surrogate_keys(conn, "fAvaliacao").unwrap(),
            KeyAssignment::Unchanged
        );
        assert_eq!(ids(conn), vec![Some("40".into()), None]);
    }

    #[test]
    fn all_null_column_is_reassigned() {
        let store = Store::open_in_memory().unwrap();
        let conn = store.conn();
        conn.execute_batch(
            "CREATE TABLE fAvaliacao (Resposta TEXT, id_avaliacao INTEGER);
             INSERT INTO fAvaliacao VALUES ('Sim', NULL), ('Não', NULL);",
        )
        .unwrap();
        assert_eq!(
            assign_surrogate_keys(conn, "fAvaliacao").unwrap(),
            KeyAssignment::Reassigned { rows: 2 }
        );
        assert_eq!(ids(conn), vec![Some("1".into()), Some("2".into())]);
    }
}
