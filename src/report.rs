//! Human-readable rendering of pipeline reports.
//!
//! Every report type also derives `Serialize`; the command layer prints JSON
//! with `serde_json` when asked and these renderers otherwise.

use std::fmt::Write as _;

use crate::{
    audit::{CheckStatus, CurationOutcome, GroupingReport, IntegrityReport},
    finalize::{FinalizeOutcome, FinalizeReport},
    pipeline::{MaintenanceReport, RunReport, SheetInspection, SheetOutcome},
    responses::{DomainReport, PopulationSummary, ResponseCategory},
    router::Route,
    staging::AppendOutcome,
    surrogate::KeyAssignment,
    table::Table,
    upload::UploadReport,
};

pub fn render_run(report: &RunReport, unmapped_limit: usize) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "Run {} started {}",
        report.run_id,
        report.started_at.format("%Y-%m-%d %H:%M:%S UTC")
    );
    for input in &report.inputs {
        let _ = writeln!(
            out,
            "  input {} ({} sheet(s), sha256 {})",
            input.path.display(),
            input.sheets,
            &input.sha256[..input.sha256.len().min(12)]
        );
    }

    section(&mut out, "Sheets");
    out.push_str(&render_sheets(&report.sheets));

    section(&mut out, "Published tables");
    out.push_str(&render_finalized(&report.finalized));
    if let Some(collapsed) = report.volume.collapsed() {
        let _ = writeln!(
            out,
            "Fact rows read: {}, published: {} ({collapsed} exact duplicate(s) collapsed)",
            report.volume.fact_rows_read,
            report.volume.fact_rows_published.unwrap_or_default()
        );
    }

    section(&mut out, "Derived columns");
    out.push_str(&render_derived(
        report.surrogate_keys.as_ref(),
        report.responses.as_ref(),
    ));

    section(&mut out, "Referential integrity");
    out.push_str(&render_integrity(&report.integrity_before));
    if !report.curation.is_empty() {
        section(&mut out, "Curation");
        out.push_str(&render_curation(&report.curation));
    }
    if let Some(after) = &report.integrity_after {
        section(&mut out, "Referential integrity after curation");
        out.push_str(&render_integrity(after));
    }
    if let Some(grouping) = &report.grouping {
        section(&mut out, "Question grouping");
        out.push_str(&render_grouping(grouping));
    }
    if let Some(domain) = &report.domain {
        section(&mut out, "Response domain");
        out.push_str(&render_domain(domain, unmapped_limit));
    }
    out
}

fn section(out: &mut String, title: &str) {
    let _ = writeln!(out, "\n{title}");
}

fn route_label(route: &Route) -> String {
    match route {
        Route::Target(entity) => entity.table().to_string(),
        Route::Empty => "(empty)".to_string(),
        Route::Unclassified => "(unclassified)".to_string(),
    }
}

pub fn render_sheets(sheets: &[SheetOutcome]) -> String {
    let mut table = Table::new(["input", "sheet", "rows", "target", "staging"]);
    for sheet in sheets {
        let staging = match &sheet.append {
            Some(AppendOutcome::Created { columns }) => format!("created ({columns} columns)"),
            Some(AppendOutcome::Appended) => "appended".to_string(),
            Some(AppendOutcome::Extended { added }) => format!("extended +{}", added.join(", +")),
            None => "skipped".to_string(),
        };
        table.push([
            file_name(&sheet.input),
            sheet.sheet.clone(),
            sheet.rows.to_string(),
            route_label(&sheet.route),
            staging,
        ]);
    }
    table.render()
}

fn file_name(path: &std::path::Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

pub fn render_finalized(reports: &[FinalizeReport]) -> String {
    let mut table = Table::new(["table", "staged", "distinct", "note"]);
    for report in reports {
        match &report.outcome {
            FinalizeOutcome::Published { staged, distinct } => {
                table.push([
                    report.table.to_string(),
                    staged.to_string(),
                    distinct.to_string(),
                    String::new(),
                ]);
            }
            FinalizeOutcome::Skipped { reason } => {
                table.push([
                    report.table.to_string(),
                    String::new(),
                    String::new(),
                    format!("skipped: {reason}"),
                ]);
            }
        }
    }
    table.render()
}

pub fn render_derived(keys: Option<&KeyAssignment>, responses: Option<&PopulationSummary>) -> String {
    let mut out = String::new();
    match keys {
        Some(KeyAssignment::Created { rows }) => {
            let _ = writeln!(out, "Surrogate keys: column created, {rows} row(s) numbered");
        }
        Some(KeyAssignment::Reassigned { rows }) => {
            let _ = writeln!(out, "Surrogate keys: empty column refilled, {rows} row(s) numbered");
        }
        Some(KeyAssignment::Unchanged) => {
            let _ = writeln!(out, "Surrogate keys: already assigned, unchanged");
        }
        None => {
            let _ = writeln!(out, "Surrogate keys: no fact table");
        }
    }
    if let Some(summary) = responses {
        let _ = writeln!(
            out,
            "Response categories: {} row(s) classified from {} distinct value(s) \
             (positivo {}, neutro {}, negativo {}, nao_mapeado {})",
            summary.rows_updated,
            summary.distinct_values,
            summary.counts.positive,
            summary.counts.neutral,
            summary.counts.negative,
            summary.counts.unmapped
        );
    }
    out
}

pub fn render_maintenance(report: &MaintenanceReport) -> String {
    render_derived(report.surrogate_keys.as_ref(), report.responses.as_ref())
}

pub fn render_integrity(report: &IntegrityReport) -> String {
    let mut table = Table::new(["foreign key", "references", "orphans", "sample"]);
    for check in &report.checks {
        let fk = &check.foreign_key;
        let (orphans, sample) = match &check.status {
            CheckStatus::Checked { orphans, sample } => (orphans.to_string(), sample.join(", ")),
            CheckStatus::Skipped { reason } => (String::new(), format!("skipped: {reason}")),
        };
        table.push([
            format!("{}.{}", fk.table, fk.column),
            format!("{}.{}", fk.dimension_table, fk.dimension_key),
            orphans,
            sample,
        ]);
    }
    let mut out = table.render();
    let _ = writeln!(out, "Total orphan rows: {}", report.total_orphans());
    out
}

pub fn render_curation(outcomes: &[CurationOutcome]) -> String {
    let mut table = Table::new(["dimension", "from", "placeholders", "keys"]);
    for outcome in outcomes {
        let fk = &outcome.foreign_key;
        table.push([
            fk.dimension_table.clone(),
            format!("{}.{}", fk.table, fk.column),
            outcome.inserted.len().to_string(),
            outcome.inserted.join(", "),
        ]);
    }
    table.render()
}

pub fn render_grouping(report: &GroupingReport) -> String {
    let mut table = Table::new(["question type", "group", "questions"]);
    for row in &report.rows {
        table.push([
            row.question_type.clone().unwrap_or_default(),
            row.group.clone().unwrap_or_else(|| "(none)".to_string()),
            row.questions.to_string(),
        ]);
    }
    let mut out = table.render();
    if !report.ungrouped_types.is_empty() {
        let _ = writeln!(
            out,
            "Without grouping label: {}",
            report.ungrouped_types.join(", ")
        );
    }
    out
}

/// Category counts plus at most `limit` unmapped values (0 shows all).
pub fn render_domain(report: &DomainReport, limit: usize) -> String {
    let mut counts = Table::new(["category", "rows", "score"]);
    for category in [
        ResponseCategory::Positive,
        ResponseCategory::Neutral,
        ResponseCategory::Negative,
        ResponseCategory::Unmapped,
    ] {
        counts.push([
            category.as_str().to_string(),
            report.counts.get(category).to_string(),
            category
                .score()
                .map(|score| score.to_string())
                .unwrap_or_default(),
        ]);
    }
    let mut out = counts.render();
    let _ = writeln!(
        out,
        "Total responses: {} ({:.1}% unmapped)",
        report.total,
        report.unmapped_share() * 100.0
    );
    if report.unmapped.is_empty() {
        return out;
    }
    let shown = if limit == 0 {
        report.unmapped.len()
    } else {
        limit.min(report.unmapped.len())
    };
    let mut unmapped = Table::new(["unmapped value", "count"]);
    for entry in &report.unmapped[..shown] {
        unmapped.push([entry.value.clone(), entry.count.to_string()]);
    }
    out.push('\n');
    out.push_str(&unmapped.render());
    if shown < report.unmapped.len() {
        let _ = writeln!(
            out,
            "... {} more unmapped value(s)",
            report.unmapped.len() - shown
        );
    }
    out
}

pub fn render_upload(report: &UploadReport) -> String {
    let mut table = Table::new(["table", "rows inserted"]);
    for entry in &report.tables {
        table.push([entry.table.to_string(), entry.rows.to_string()]);
    }
    let mut out = table.render();
    let _ = writeln!(out, "Total rows inserted: {}", report.total);
    out
}

pub fn render_inspections(inspections: &[SheetInspection]) -> String {
    let mut table = Table::new(["input", "sheet", "rows", "target", "rule", "columns"]);
    for inspection in inspections {
        table.push([
            file_name(&inspection.input),
            inspection.sheet.clone(),
            inspection.rows.to_string(),
            route_label(&inspection.route),
            inspection.rule.unwrap_or_default().to_string(),
            inspection.headers.join(", "),
        ]);
    }
    table.render()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::responses::{UnmappedValue, Vocabulary};

    #[test]
    fn domain_listing_respects_limit() {
        let report = DomainReport::from_responses(
            [Some("a"), Some("b"), Some("b"), Some("Sim")],
            &Vocabulary::builtin(),
        );
        assert_eq!(report.unmapped[0], UnmappedValue { value: "b".into(), count: 2 });
        let rendered = render_domain(&report, 1);
        assert!(rendered.contains("... 1 more unmapped value(s)"));
        assert!(rendered.contains("positivo"));
        assert!(rendered.contains("75.0% unmapped"));
    }

    #[test]
    fn upload_report_lists_total() {
        let report = UploadReport {
            tables: Vec::new(),
            total: 0,
        };
        assert!(render_upload(&report).ends_with("Total rows inserted: 0\n"));
    }
}
