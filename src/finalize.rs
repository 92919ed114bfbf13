//! Deduplicating finalizer: staging areas become published tables.

use log::{info, warn};
use rusqlite::Connection;
use serde::Serialize;

use crate::{
    entity::Entity,
    error::Result,
    store::{self, quote_ident},
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum FinalizeOutcome {
    Published { staged: u64, distinct: u64 },
    Skipped { reason: String },
}

#[derive(Debug, Clone, Serialize)]
pub struct FinalizeReport {
    pub entity: Entity,
    pub table: &'static str,
    #[serde(flatten)]
    pub outcome: FinalizeOutcome,
}

/// Replaces the final table of `entity` with the distinct rows of its
/// staging area. An absent or empty staging area leaves the final table as is.
pub fn finalize(conn: &Connection, entity: Entity) -> Result<FinalizeOutcome> {
    let staging = entity.staging_table();
    let table = entity.table();
    if !store::table_exists(conn, &staging)? {
        return Ok(skipped(entity, "no sheet was routed to this entity"));
    }
    let staged = store::row_count(conn, &staging)?;
    if staged == 0 {
        return Ok(skipped(entity, "staging area received no rows"));
    }
    let distinct = store::atomically(conn, "finalize", |conn| {
        conn.execute_batch(&format!(
            "DROP TABLE IF EXISTS {final_table};
             CREATE TABLE {final_table} AS SELECT DISTINCT * FROM {staging_table};",
            final_table = quote_ident(table),
            staging_table = quote_ident(&staging),
        ))?;
        store::row_count(conn, table)
    })?;
    info!("Published {table}: {distinct} distinct row(s) from {staged} staged");
    Ok(FinalizeOutcome::Published { staged, distinct })
}

pub fn finalize_all(conn: &Connection) -> Result<Vec<FinalizeReport>> {
    Entity::ALL
        .into_iter()
        .map(|entity| {
            Ok(FinalizeReport {
                entity,
                table: entity.table(),
                outcome: finalize(conn, entity)?,
            })
        })
        .collect()
}

fn skipped(entity: Entity, reason: &str) -> FinalizeOutcome {
    warn!("Skipping {entity}: {reason}; existing table left untouched");
    FinalizeOutcome::Skipped {
        reason: reason.to_string(),
    }
}
