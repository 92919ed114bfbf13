//! Referential integrity auditing and orphan curation.
//!
//! An orphan is a row whose foreign key is non-null but matches no row of the
//! referenced dimension. Auditing is read-only. Curation inserts one
//! placeholder dimension row per distinct orphan value; it is idempotent
//! because curated values stop being orphans.

use log::{debug, info, warn};
use rusqlite::{Connection, params_from_iter};
use serde::{Deserialize, Serialize};

use crate::{
    entity::{Entity, column},
    error::{EtlError, Result},
    responses::EMPTY_MARKER,
    store::{self, quote_ident},
};

pub const DEFAULT_SAMPLE_SIZE: usize = 3;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ForeignKey {
    pub table: String,
    pub column: String,
    pub dimension_table: String,
    pub dimension_key: String,
}

impl ForeignKey {
    pub fn new(table: &str, column: &str, dimension_table: &str, dimension_key: &str) -> Self {
        Self {
            table: table.to_string(),
            column: column.to_string(),
            dimension_table: dimension_table.to_string(),
            dimension_key: dimension_key.to_string(),
        }
    }

    /// `table.column` referencing the key of `dimension`.
    pub fn to_dimension(source: Entity, column: &str, dimension: Entity) -> Self {
        Self::new(
            source.table(),
            column,
            dimension.table(),
            dimension.key_column().unwrap_or(column),
        )
    }

    fn label(&self) -> String {
        format!(
            "{}.{} -> {}.{}",
            self.table, self.column, self.dimension_table, self.dimension_key
        )
    }

    fn orphan_filter(&self) -> String {
        format!(
            "FROM {table} f LEFT JOIN {dimension} d ON f.{column} = d.{key} \
             WHERE d.{key} IS NULL AND f.{column} IS NOT NULL",
            table = quote_ident(&self.table),
            dimension = quote_ident(&self.dimension_table),
            column = quote_ident(&self.column),
            key = quote_ident(&self.dimension_key),
        )
    }
}

/// Fact references first, then the soft invariants between dimensions.
pub fn standard_foreign_keys() -> Vec<ForeignKey> {
    use column::*;
    vec![
        ForeignKey::to_dimension(Entity::Evaluation, COURSE_CODE, Entity::Course),
        ForeignKey::to_dimension(Entity::Evaluation, DISCIPLINE_CODE, Entity::Discipline),
        ForeignKey::to_dimension(Entity::Evaluation, QUESTION_ID, Entity::Question),
        ForeignKey::to_dimension(Entity::Evaluation, UNIT_CODE, Entity::Unit),
        ForeignKey::to_dimension(Entity::Evaluation, QUESTION_TYPE, Entity::QuestionType),
        ForeignKey::to_dimension(Entity::Discipline, COURSE_CODE, Entity::Course),
        ForeignKey::to_dimension(Entity::Question, QUESTION_TYPE, Entity::QuestionType),
    ]
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum CheckStatus {
    Checked { orphans: u64, sample: Vec<String> },
    Skipped { reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OrphanCheck {
    pub foreign_key: ForeignKey,
    #[serde(flatten)]
    pub status: CheckStatus,
}

impl OrphanCheck {
    pub fn orphans(&self) -> u64 {
        match &self.status {
            CheckStatus::Checked { orphans, .. } => *orphans,
            CheckStatus::Skipped { .. } => 0,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IntegrityReport {
    pub checks: Vec<OrphanCheck>,
}

impl IntegrityReport {
    pub fn total_orphans(&self) -> u64 {
        self.checks.iter().map(OrphanCheck::orphans).sum()
    }

    pub fn is_clean(&self) -> bool {
        self.total_orphans() == 0
    }

    pub fn find(&self, table: &str, column: &str) -> Option<&OrphanCheck> {
        self.checks
            .iter()
            .find(|check| check.foreign_key.table == table && check.foreign_key.column == column)
    }
}

/// Why a check cannot run, if any of its tables or columns is absent.
fn missing_prerequisite(conn: &Connection, fk: &ForeignKey) -> Result<Option<String>> {
    for (table, column) in [
        (&fk.table, &fk.column),
        (&fk.dimension_table, &fk.dimension_key),
    ] {
        if !store::table_exists(conn, table)? {
            return Ok(Some(format!("table {table} does not exist")));
        }
        if !store::has_column(conn, table, column)? {
            return Ok(Some(format!("column {column} does not exist in {table}")));
        }
    }
    Ok(None)
}

pub fn check_foreign_key(conn: &Connection, fk: &ForeignKey, sample_size: usize) -> Result<CheckStatus> {
    if let Some(reason) = missing_prerequisite(conn, fk)? {
        debug!("Skipping {}: {reason}", fk.label());
        return Ok(CheckStatus::Skipped { reason });
    }
    let filter = fk.orphan_filter();
    let orphans: i64 = conn.query_row(&format!("SELECT COUNT(*) {filter}"), [], |row| row.get(0))?;
    let sample = if orphans > 0 {
        let mut stmt = conn.prepare(&format!(
            "SELECT DISTINCT CAST(f.{} AS TEXT) {filter} ORDER BY 1 LIMIT ?1",
            quote_ident(&fk.column)
        ))?;
        stmt.query_map([sample_size as i64], |row| row.get::<_, String>(0))?
            .collect::<rusqlite::Result<Vec<_>>>()?
    } else {
        Vec::new()
    };
    if orphans > 0 {
        warn!("{}: {orphans} orphan row(s), e.g. {:?}", fk.label(), sample);
    } else {
        debug!("{}: no orphans", fk.label());
    }
    Ok(CheckStatus::Checked {
        orphans: orphans as u64,
        sample,
    })
}

pub fn audit(conn: &Connection, foreign_keys: &[ForeignKey], sample_size: usize) -> Result<IntegrityReport> {
    let checks = foreign_keys
        .iter()
        .map(|fk| {
            Ok(OrphanCheck {
                foreign_key: fk.clone(),
                status: check_foreign_key(conn, fk, sample_size)?,
            })
        })
        .collect::<Result<Vec<_>>>()?;
    let report = IntegrityReport { checks };
    info!(
        "Integrity audit: {} check(s), {} orphan row(s)",
        report.checks.len(),
        report.total_orphans()
    );
    Ok(report)
}

/// Fails when orphans remain; used as an optional publish gate.
pub fn enforce_clean(report: &IntegrityReport) -> Result<()> {
    match report.total_orphans() {
        0 => Ok(()),
        orphans => Err(EtlError::OrphanGate { orphans }),
    }
}

/// Dimensions that receive placeholder rows for orphan references.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CurationPolicy {
    pub entities: Vec<Entity>,
}

impl Default for CurationPolicy {
    fn default() -> Self {
        Self {
            entities: vec![
                Entity::Course,
                Entity::Question,
                Entity::Discipline,
                Entity::Unit,
            ],
        }
    }
}

impl CurationPolicy {
    pub fn covers(&self, table: &str) -> Option<Entity> {
        Entity::from_table(table)
            .filter(|entity| entity.is_dimension() && self.entities.contains(entity))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CurationOutcome {
    pub foreign_key: ForeignKey,
    pub inserted: Vec<String>,
}

/// Inserts one placeholder dimension row per distinct orphan value of every
/// foreign key whose dimension the policy covers.
pub fn curate(
    conn: &Connection,
    foreign_keys: &[ForeignKey],
    policy: &CurationPolicy,
) -> Result<Vec<CurationOutcome>> {
    store::atomically(conn, "curation", |conn| {
        let mut outcomes = Vec::new();
        for fk in foreign_keys {
            let Some(entity) = policy.covers(&fk.dimension_table) else {
                continue;
            };
            if missing_prerequisite(conn, fk)?.is_some() {
                continue;
            }
            let inserted = curate_foreign_key(conn, fk, entity)?;
            if !inserted.is_empty() {
                info!(
                    "Curated {} placeholder row(s) into {} for {}.{}",
                    inserted.len(),
                    fk.dimension_table,
                    fk.table,
                    fk.column
                );
            }
            outcomes.push(CurationOutcome {
                foreign_key: fk.clone(),
                inserted,
            });
        }
        Ok(outcomes)
    })
}

fn curate_foreign_key(conn: &Connection, fk: &ForeignKey, entity: Entity) -> Result<Vec<String>> {
    let orphans = {
        let mut stmt = conn.prepare(&format!(
            "SELECT DISTINCT f.{} {} ORDER BY 1",
            quote_ident(&fk.column),
            fk.orphan_filter()
        ))?;
        stmt.query_map([], |row| row.get::<_, rusqlite::types::Value>(0))?
            .collect::<rusqlite::Result<Vec<_>>>()?
    };
    if orphans.is_empty() {
        return Ok(Vec::new());
    }

    let label_column = entity
        .label_column()
        .filter(|label| !label.eq_ignore_ascii_case(&fk.dimension_key))
        .map(|label| store::has_column(conn, &fk.dimension_table, label).map(|has| has.then_some(label)))
        .transpose()?
        .flatten();
    let mut columns = vec![quote_ident(&fk.dimension_key)];
    if let Some(label) = label_column {
        columns.push(quote_ident(label));
    }
    let placeholders = (1..=columns.len())
        .map(|idx| format!("?{idx}"))
        .collect::<Vec<_>>()
        .join(", ");
    let mut insert = conn.prepare(&format!(
        "INSERT INTO {} ({}) VALUES ({placeholders})",
        quote_ident(&fk.dimension_table),
        columns.join(", ")
    ))?;

    let mut inserted = Vec::with_capacity(orphans.len());
    for key in orphans {
        let text = value_text(&key);
        let mut values = vec![key];
        if label_column.is_some() {
            values.push(rusqlite::types::Value::Text(entity.placeholder_label(&text)));
        }
        insert.execute(params_from_iter(values.iter()))?;
        inserted.push(text);
    }
    Ok(inserted)
}

fn value_text(value: &rusqlite::types::Value) -> String {
    use rusqlite::types::Value;
    match value {
        Value::Null => EMPTY_MARKER.to_string(),
        Value::Integer(i) => i.to_string(),
        Value::Real(f) => f.to_string(),
        Value::Text(s) => s.clone(),
        Value::Blob(b) => String::from_utf8_lossy(b).into_owned(),
    }
}

/// Question count per (question type, grouping label) pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GroupingRow {
    pub question_type: Option<String>,
    pub group: Option<String>,
    pub questions: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct GroupingReport {
    pub rows: Vec<GroupingRow>,
    /// Question types whose questions cannot be rolled up into any group.
    pub ungrouped_types: Vec<String>,
}

/// Joins questions to their type's grouping label. `None` when either table
/// has not been built.
pub fn grouping_consistency(conn: &Connection) -> Result<Option<GroupingReport>> {
    use column::{QUESTION_GROUP, QUESTION_TYPE};
    let question = Entity::Question.table();
    let question_type = Entity::QuestionType.table();
    for (table, needed) in [
        (question, QUESTION_TYPE),
        (question_type, QUESTION_TYPE),
        (question_type, QUESTION_GROUP),
    ] {
        if !store::has_column(conn, table, needed)? {
            return Ok(None);
        }
    }
    let kind = quote_ident(QUESTION_TYPE);
    let group = quote_ident(QUESTION_GROUP);
    let mut stmt = conn.prepare(&format!(
        "SELECT CAST(p.{kind} AS TEXT), CAST(t.{group} AS TEXT), COUNT(*)
         FROM {} p LEFT JOIN {} t ON p.{kind} = t.{kind}
         GROUP BY 1, 2 ORDER BY 1, 2",
        quote_ident(question),
        quote_ident(question_type)
    ))?;
    let rows = stmt
        .query_map([], |row| {
            Ok(GroupingRow {
                question_type: row.get(0)?,
                group: row.get(1)?,
                questions: row.get::<_, i64>(2)? as u64,
            })
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    let mut ungrouped_types = rows
        .iter()
        .filter(|row| row.group.is_none())
        .map(|row| {
            row.question_type
                .clone()
                .unwrap_or_else(|| EMPTY_MARKER.to_string())
        })
        .collect::<Vec<_>>();
    ungrouped_types.dedup();
    Ok(Some(GroupingReport {
        rows,
        ungrouped_types,
    }))
}
