//! Full-rebuild orchestration.
//!
//! A rebuild resets staging, reads every input workbook, normalizes and
//! routes each sheet, appends it to its staging area, then publishes inside
//! one savepoint: finalize, surrogate keys, derived response columns, audit,
//! curation and the optional orphan gate. A failure before or during publish
//! leaves previously published tables as they were.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use encoding_rs::Encoding;
use log::{debug, info, warn};
use rusqlite::Connection;
use serde::Serialize;
use uuid::Uuid;

use crate::{
    audit::{
        self, CurationOutcome, CurationPolicy, DEFAULT_SAMPLE_SIZE, GroupingReport,
        IntegrityReport,
    },
    columns::ColumnNormalizer,
    entity::{Entity, column},
    error::Result,
    finalize::{self, FinalizeOutcome, FinalizeReport},
    responses::{self, DomainReport, PopulationSummary, Vocabulary},
    router::{self, RULES, Route},
    staging::{self, AppendOutcome},
    store,
    surrogate::{self, KeyAssignment},
    workbook::{self, Sheet},
};

#[derive(Debug, Clone)]
pub struct RebuildOptions {
    pub inputs: Vec<PathBuf>,
    pub encoding: &'static Encoding,
    pub normalizer: ColumnNormalizer,
    pub vocabulary: Vocabulary,
    /// `None` disables curation.
    pub curation: Option<CurationPolicy>,
    pub sample_size: usize,
    pub fail_on_orphans: bool,
}

impl RebuildOptions {
    pub fn new(inputs: Vec<PathBuf>) -> Self {
        Self {
            inputs,
            encoding: encoding_rs::UTF_8,
            normalizer: ColumnNormalizer::builtin(),
            vocabulary: Vocabulary::builtin(),
            curation: Some(CurationPolicy::default()),
            sample_size: DEFAULT_SAMPLE_SIZE,
            fail_on_orphans: false,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct InputFingerprint {
    pub path: PathBuf,
    pub sha256: String,
    pub sheets: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct SheetOutcome {
    pub input: PathBuf,
    pub sheet: String,
    pub rows: usize,
    pub route: Route,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub append: Option<AppendOutcome>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StagedCount {
    pub entity: Entity,
    pub rows: u64,
}

/// Fact rows read from sheets against distinct fact rows published.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct VolumeCheck {
    pub fact_rows_read: u64,
    pub fact_rows_published: Option<u64>,
}

impl VolumeCheck {
    /// Rows collapsed as exact duplicates during finalization.
    pub fn collapsed(&self) -> Option<u64> {
        self.fact_rows_published
            .map(|published| self.fact_rows_read.saturating_sub(published))
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub inputs: Vec<InputFingerprint>,
    pub sheets: Vec<SheetOutcome>,
    pub staged: Vec<StagedCount>,
    pub volume: VolumeCheck,
    pub finalized: Vec<FinalizeReport>,
    pub surrogate_keys: Option<KeyAssignment>,
    pub responses: Option<PopulationSummary>,
    pub integrity_before: IntegrityReport,
    pub curation: Vec<CurationOutcome>,
    pub integrity_after: Option<IntegrityReport>,
    pub grouping: Option<GroupingReport>,
    pub domain: Option<DomainReport>,
}

impl RunReport {
    /// Integrity after curation when curation ran, otherwise the first audit.
    pub fn final_integrity(&self) -> &IntegrityReport {
        self.integrity_after.as_ref().unwrap_or(&self.integrity_before)
    }

    pub fn skipped_sheets(&self) -> impl Iterator<Item = &SheetOutcome> {
        self.sheets
            .iter()
            .filter(|sheet| !matches!(sheet.route, Route::Target(_)))
    }
}

struct Published {
    finalized: Vec<FinalizeReport>,
    surrogate_keys: Option<KeyAssignment>,
    responses: Option<PopulationSummary>,
    integrity_before: IntegrityReport,
    curation: Vec<CurationOutcome>,
    integrity_after: Option<IntegrityReport>,
    grouping: Option<GroupingReport>,
}

pub fn rebuild(conn: &Connection, options: &RebuildOptions) -> Result<RunReport> {
    let run_id = Uuid::new_v4();
    let started_at = Utc::now();
    info!(
        "Run {run_id}: rebuilding from {} input(s)",
        options.inputs.len()
    );

    staging::reset(conn)?;
    let mut inputs = Vec::with_capacity(options.inputs.len());
    let mut sheets = Vec::new();
    for path in &options.inputs {
        let workbook = workbook::read_workbook(path, options.encoding)?;
        inputs.push(InputFingerprint {
            path: path.clone(),
            sha256: workbook::fingerprint(path)?,
            sheets: workbook.sheets.len(),
        });
        for sheet in workbook.sheets {
            sheets.push(load_sheet(conn, path, sheet, &options.normalizer)?);
        }
    }

    let staged = staging::staged_counts(conn)?
        .into_iter()
        .map(|(entity, rows)| StagedCount { entity, rows })
        .collect::<Vec<_>>();
    let fact_rows_read: u64 = sheets
        .iter()
        .filter(|sheet| sheet.route == Route::Target(Entity::Evaluation))
        .map(|sheet| sheet.rows as u64)
        .sum();

    let published = store::atomically(conn, "publish", |conn| publish(conn, options))?;

    let fact_rows_published = published
        .finalized
        .iter()
        .find(|report| report.entity == Entity::Evaluation)
        .and_then(|report| match report.outcome {
            FinalizeOutcome::Published { distinct, .. } => Some(distinct),
            FinalizeOutcome::Skipped { .. } => None,
        });
    let fact_table = Entity::Evaluation.table();
    let domain = if store::has_column(conn, fact_table, column::RESPONSE)? {
        Some(responses::domain_report(
            conn,
            fact_table,
            &options.vocabulary,
        )?)
    } else {
        None
    };

    let report = RunReport {
        run_id,
        started_at,
        finished_at: Utc::now(),
        inputs,
        sheets,
        staged,
        volume: VolumeCheck {
            fact_rows_read,
            fact_rows_published,
        },
        finalized: published.finalized,
        surrogate_keys: published.surrogate_keys,
        responses: published.responses,
        integrity_before: published.integrity_before,
        curation: published.curation,
        integrity_after: published.integrity_after,
        grouping: published.grouping,
        domain,
    };
    info!(
        "Run {run_id} finished: {} sheet(s) read, {} skipped, {} orphan row(s) remaining",
        report.sheets.len(),
        report.skipped_sheets().count(),
        report.final_integrity().total_orphans()
    );
    Ok(report)
}

fn load_sheet(
    conn: &Connection,
    input: &Path,
    sheet: Sheet,
    normalizer: &ColumnNormalizer,
) -> Result<SheetOutcome> {
    let sheet = normalizer.normalize_sheet(sheet);
    let route = router::route_sheet(&sheet);
    let append = match route {
        Route::Target(entity) => Some(staging::append(conn, entity, &sheet)?),
        Route::Empty => {
            debug!("Discarding empty sheet '{}' of {input:?}", sheet.name);
            None
        }
        Route::Unclassified => {
            warn!(
                "Sheet '{}' of {input:?} matches no routing rule; skipped",
                sheet.name
            );
            None
        }
    };
    Ok(SheetOutcome {
        input: input.to_path_buf(),
        sheet: sheet.name,
        rows: sheet.rows.len(),
        route,
        append,
    })
}

fn publish(conn: &Connection, options: &RebuildOptions) -> Result<Published> {
    let finalized = finalize::finalize_all(conn)?;
    let (surrogate_keys, responses) = derive_fact_columns(conn, &options.vocabulary)?;

    let foreign_keys = audit::standard_foreign_keys();
    let integrity_before = audit::audit(conn, &foreign_keys, options.sample_size)?;
    let (curation, integrity_after) = match &options.curation {
        Some(policy) if !integrity_before.is_clean() => {
            let curation = audit::curate(conn, &foreign_keys, policy)?;
            let after = audit::audit(conn, &foreign_keys, options.sample_size)?;
            (curation, Some(after))
        }
        _ => (Vec::new(), None),
    };
    if options.fail_on_orphans {
        audit::enforce_clean(integrity_after.as_ref().unwrap_or(&integrity_before))?;
    }
    let grouping = audit::grouping_consistency(conn)?;
    if let Some(grouping) = &grouping
        && !grouping.ungrouped_types.is_empty()
    {
        warn!(
            "Question type(s) without a grouping label: {:?}",
            grouping.ungrouped_types
        );
    }

    Ok(Published {
        finalized,
        surrogate_keys,
        responses,
        integrity_before,
        curation,
        integrity_after,
        grouping,
    })
}

/// Surrogate keys then derived response columns, when the fact table exists.
fn derive_fact_columns(
    conn: &Connection,
    vocabulary: &Vocabulary,
) -> Result<(Option<KeyAssignment>, Option<PopulationSummary>)> {
    let fact_table = Entity::Evaluation.table();
    if !store::table_exists(conn, fact_table)? {
        debug!("{fact_table} not built yet; no derived columns");
        return Ok((None, None));
    }
    let keys = surrogate::assign_surrogate_keys(conn, fact_table)?;
    let responses = if store::has_column(conn, fact_table, column::RESPONSE)? {
        Some(responses::populate(conn, fact_table, vocabulary)?)
    } else {
        warn!("{fact_table} has no response column; derived response columns not populated");
        None
    };
    Ok((Some(keys), responses))
}

#[derive(Debug, Clone, Serialize)]
pub struct MaintenanceReport {
    pub surrogate_keys: Option<KeyAssignment>,
    pub responses: Option<PopulationSummary>,
}

/// Surrogate keys and derived response columns for an existing store, e.g.
/// after direct inserts.
pub fn maintain(conn: &Connection, vocabulary: &Vocabulary) -> Result<MaintenanceReport> {
    let (surrogate_keys, responses) = store::atomically(conn, "maintain", |conn| {
        derive_fact_columns(conn, vocabulary)
    })?;
    Ok(MaintenanceReport {
        surrogate_keys,
        responses,
    })
}

/// What a rebuild would do with one sheet.
#[derive(Debug, Clone, Serialize)]
pub struct SheetInspection {
    pub input: PathBuf,
    pub sheet: String,
    pub rows: usize,
    pub route: Route,
    pub rule: Option<&'static str>,
    pub headers: Vec<String>,
}

/// Reads, normalizes and routes every sheet without touching a store.
pub fn inspect(
    inputs: &[PathBuf],
    encoding: &'static Encoding,
    normalizer: &ColumnNormalizer,
) -> Result<Vec<SheetInspection>> {
    let mut inspections = Vec::new();
    for path in inputs {
        let workbook = workbook::read_workbook(path, encoding)?;
        for sheet in workbook.sheets {
            let sheet = normalizer.normalize_sheet(sheet);
            let route = router::route_sheet(&sheet);
            let rule = match route {
                Route::Target(_) => {
                    router::matching_rule(&sheet.name).map(|idx| RULES[idx].description)
                }
                Route::Empty | Route::Unclassified => None,
            };
            inspections.push(SheetInspection {
                input: path.clone(),
                rows: sheet.rows.len(),
                sheet: sheet.name,
                route,
                rule,
                headers: sheet.headers,
            });
        }
    }
    Ok(inspections)
}
