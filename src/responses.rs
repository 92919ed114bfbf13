//! Response domain classification.
//!
//! Free-text survey answers are mapped onto one [`ResponseCategory`]. The
//! vocabulary is checked in a fixed order: exact match on the trimmed,
//! lower-cased text, then a numeric guard, then ordered containment rules
//! where longer phrases precede the words they contain. Negated answers
//! (`não concordo`) never reach containment; they stay unmapped unless the
//! vocabulary lists them exactly.

use std::{
    collections::HashMap,
    fmt,
    path::Path,
    sync::LazyLock,
};

use log::{debug, info};
use regex::Regex;
use rusqlite::{Connection, params};
use serde::{Deserialize, Serialize};

use crate::{
    entity::column,
    error::{EtlError, Result},
    io_utils,
    store::{self, quote_ident},
};

pub const EMPTY_MARKER: &str = "<empty>";

static NUMERIC: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[+-]?\d+(?:[.,]\d+)?$").expect("numeric response pattern is valid")
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseCategory {
    Positive,
    Neutral,
    Negative,
    Unmapped,
}

impl ResponseCategory {
    /// Stored form in `Resposta_Padronizada`.
    pub fn as_str(self) -> &'static str {
        match self {
            ResponseCategory::Positive => "positivo",
            ResponseCategory::Neutral => "neutro",
            ResponseCategory::Negative => "negativo",
            ResponseCategory::Unmapped => "nao_mapeado",
        }
    }

    pub fn from_stored(value: &str) -> Option<Self> {
        [
            ResponseCategory::Positive,
            ResponseCategory::Neutral,
            ResponseCategory::Negative,
            ResponseCategory::Unmapped,
        ]
        .into_iter()
        .find(|category| category.as_str() == value)
    }

    /// Two-class projection persisted as `Valor_Resposta`.
    pub fn binary_value(self) -> Option<i64> {
        match self {
            ResponseCategory::Positive => Some(1),
            ResponseCategory::Negative => Some(0),
            ResponseCategory::Neutral | ResponseCategory::Unmapped => None,
        }
    }

    /// Three-class projection used for percentage scores.
    pub fn score(self) -> Option<u8> {
        match self {
            ResponseCategory::Positive => Some(100),
            ResponseCategory::Neutral => Some(50),
            ResponseCategory::Negative => Some(0),
            ResponseCategory::Unmapped => None,
        }
    }
}

impl fmt::Display for ResponseCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

const POSITIVE: &[&str] = &[
    "Concordo",
    "Concordo Totalmente",
    "Sim",
    "Satisfatório",
    "Ótimo",
    "Bom",
];
const NEUTRAL: &[&str] = &["Neutro", "Desconheço", "Indiferente"];
const NEGATIVE: &[&str] = &["Discordo", "Discordo Totalmente", "Não", "Ruim", "Péssimo"];

const CONTAINMENT: &[(&str, ResponseCategory)] = &[
    ("nem concordo nem discordo", ResponseCategory::Neutral),
    ("concordo totalmente", ResponseCategory::Positive),
    ("discordo totalmente", ResponseCategory::Negative),
    ("discordo", ResponseCategory::Negative),
    ("concordo", ResponseCategory::Positive),
    ("neutro", ResponseCategory::Neutral),
    ("indiferente", ResponseCategory::Neutral),
    ("desconheço", ResponseCategory::Neutral),
];

/// Leading words that invert the verb a containment rule would match.
const NEGATIONS: &[&str] = &["não ", "nao "];

#[derive(Debug, Clone)]
pub struct Vocabulary {
    exact: HashMap<String, ResponseCategory>,
}

impl Default for Vocabulary {
    fn default() -> Self {
        Self::builtin()
    }
}

impl Vocabulary {
    pub fn builtin() -> Self {
        let vocabulary = Self {
            exact: HashMap::new(),
        };
        vocabulary
            .with_terms(ResponseCategory::Positive, POSITIVE)
            .with_terms(ResponseCategory::Neutral, NEUTRAL)
            .with_terms(ResponseCategory::Negative, NEGATIVE)
    }

    /// Adds exact terms; a term already present is re-assigned.
    pub fn with_terms<I, S>(mut self, category: ResponseCategory, terms: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for term in terms {
            let key = normalize_response(term.as_ref());
            if !key.is_empty() {
                self.exact.insert(key, category);
            }
        }
        self
    }

    pub fn classify(&self, raw: Option<&str>) -> ResponseCategory {
        let Some(text) = raw.map(normalize_response).filter(|t| !t.is_empty()) else {
            return ResponseCategory::Unmapped;
        };
        if let Some(category) = self.exact.get(&text) {
            return *category;
        }
        if NUMERIC.is_match(&text) || NEGATIONS.iter().any(|prefix| text.starts_with(prefix)) {
            return ResponseCategory::Unmapped;
        }
        CONTAINMENT
            .iter()
            .find(|(needle, _)| text.contains(needle))
            .map(|(_, category)| *category)
            .unwrap_or(ResponseCategory::Unmapped)
    }
}

/// Trimmed, lower-cased, inner whitespace collapsed.
fn normalize_response(raw: &str) -> String {
    raw.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CategoryCounts {
    pub positive: u64,
    pub neutral: u64,
    pub negative: u64,
    pub unmapped: u64,
}

impl CategoryCounts {
    fn add(&mut self, category: ResponseCategory, count: u64) {
        match category {
            ResponseCategory::Positive => self.positive += count,
            ResponseCategory::Neutral => self.neutral += count,
            ResponseCategory::Negative => self.negative += count,
            ResponseCategory::Unmapped => self.unmapped += count,
        }
    }

    pub fn get(&self, category: ResponseCategory) -> u64 {
        match category {
            ResponseCategory::Positive => self.positive,
            ResponseCategory::Neutral => self.neutral,
            ResponseCategory::Negative => self.negative,
            ResponseCategory::Unmapped => self.unmapped,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UnmappedValue {
    pub value: String,
    pub count: u64,
}

/// Category counts of a response column plus every raw value the vocabulary
/// did not recognize.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DomainReport {
    pub total: u64,
    pub counts: CategoryCounts,
    pub unmapped: Vec<UnmappedValue>,
}

impl DomainReport {
    /// Builds the report from `(raw value, occurrences)` pairs. Repeated
    /// values are merged.
    pub fn from_counts<'a, I>(values: I, vocabulary: &Vocabulary) -> Self
    where
        I: IntoIterator<Item = (Option<&'a str>, u64)>,
    {
        let mut report = DomainReport::default();
        let mut unmapped: HashMap<String, u64> = HashMap::new();
        for (raw, count) in values {
            let category = vocabulary.classify(raw);
            report.total += count;
            report.counts.add(category, count);
            if category == ResponseCategory::Unmapped {
                let label = match raw.map(str::trim) {
                    Some(value) if !value.is_empty() => value.to_string(),
                    _ => EMPTY_MARKER.to_string(),
                };
                *unmapped.entry(label).or_default() += count;
            }
        }
        report.unmapped = unmapped
            .into_iter()
            .map(|(value, count)| UnmappedValue { value, count })
            .collect();
        report
            .unmapped
            .sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.value.cmp(&b.value)));
        report
    }

    /// Reporting mode over an in-memory response column.
    pub fn from_responses<'a, I>(responses: I, vocabulary: &Vocabulary) -> Self
    where
        I: IntoIterator<Item = Option<&'a str>>,
    {
        Self::from_counts(responses.into_iter().map(|raw| (raw, 1)), vocabulary)
    }

    pub fn unmapped_share(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.counts.unmapped as f64 / self.total as f64
        }
    }

    pub fn write_unmapped_csv(&self, path: &Path) -> Result<()> {
        let mut writer = io_utils::open_csv_writer(path)?;
        let csv_error = |source| EtlError::Csv {
            path: path.to_path_buf(),
            source,
        };
        writer.write_record(["value", "count"]).map_err(csv_error)?;
        for entry in &self.unmapped {
            writer
                .write_record([entry.value.as_str(), entry.count.to_string().as_str()])
                .map_err(csv_error)?;
        }
        writer.flush()?;
        Ok(())
    }
}

/// Distinct response values of `table` with their occurrence counts.
fn response_counts(conn: &Connection, table: &str) -> Result<Vec<(Option<String>, u64)>> {
    let response = quote_ident(column::RESPONSE);
    let mut stmt = conn.prepare(&format!(
        "SELECT CAST({response} AS TEXT), COUNT(*) FROM {} GROUP BY 1",
        quote_ident(table)
    ))?;
    let counts = stmt
        .query_map([], |row| {
            Ok((row.get::<_, Option<String>>(0)?, row.get::<_, i64>(1)? as u64))
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(counts)
}

fn require_response_column(conn: &Connection, table: &str) -> Result<()> {
    let columns = store::require_table(conn, table)?;
    if columns
        .iter()
        .any(|c| c.eq_ignore_ascii_case(column::RESPONSE))
    {
        Ok(())
    } else {
        Err(EtlError::MissingColumn {
            table: table.to_string(),
            column: column::RESPONSE.to_string(),
        })
    }
}

/// Classifies the stored response column of `table` using the current
/// vocabulary, regardless of what derived values were persisted.
pub fn domain_report(conn: &Connection, table: &str, vocabulary: &Vocabulary) -> Result<DomainReport> {
    require_response_column(conn, table)?;
    let counts = response_counts(conn, table)?;
    let report = DomainReport::from_counts(
        counts.iter().map(|(raw, count)| (raw.as_deref(), *count)),
        vocabulary,
    );
    info!(
        "Classified {} response(s) in {table}: {} unmapped across {} distinct value(s)",
        report.total,
        report.counts.unmapped,
        report.unmapped.len()
    );
    Ok(report)
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PopulationSummary {
    pub columns_added: Vec<String>,
    pub rows_updated: u64,
    pub distinct_values: usize,
    pub counts: CategoryCounts,
}

/// Fills `Resposta_Padronizada` and `Valor_Resposta` for rows that have no
/// category yet. Rows classified by an earlier pass are left alone. Each
/// distinct value is classified once and the table is updated in one join.
pub fn populate(conn: &Connection, table: &str, vocabulary: &Vocabulary) -> Result<PopulationSummary> {
    require_response_column(conn, table)?;
    store::atomically(conn, "populate_responses", |conn| {
        let mut summary = PopulationSummary::default();
        for (name, declared) in [
            (column::RESPONSE_CATEGORY, "TEXT"),
            (column::RESPONSE_VALUE, "INTEGER"),
        ] {
            if !store::has_column(conn, table, name)? {
                conn.execute_batch(&format!(
                    "ALTER TABLE {} ADD COLUMN {} {declared}",
                    quote_ident(table),
                    quote_ident(name)
                ))?;
                summary.columns_added.push(name.to_string());
            }
        }

        let response = quote_ident(column::RESPONSE);
        let category_column = quote_ident(column::RESPONSE_CATEGORY);
        let pending = {
            let mut stmt = conn.prepare(&format!(
                "SELECT CAST({response} AS TEXT), COUNT(*) FROM {} \
                 WHERE {category_column} IS NULL GROUP BY 1",
                quote_ident(table)
            ))?;
            stmt.query_map([], |row| {
                Ok((row.get::<_, Option<String>>(0)?, row.get::<_, i64>(1)? as u64))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?
        };

        conn.execute_batch(
            "DROP TABLE IF EXISTS temp.response_mapping;
             CREATE TEMP TABLE response_mapping (
                 raw TEXT UNIQUE,
                 category TEXT NOT NULL,
                 value INTEGER
             );",
        )?;
        {
            let mut insert =
                conn.prepare("INSERT INTO temp.response_mapping VALUES (?1, ?2, ?3)")?;
            for (raw, count) in &pending {
                let category = vocabulary.classify(raw.as_deref());
                insert.execute(params![raw, category.as_str(), category.binary_value()])?;
                summary.counts.add(category, *count);
            }
        }
        let quoted_table = quote_ident(table);
        summary.rows_updated = conn.execute(
            &format!(
                "UPDATE {quoted_table} SET {category_column} = mapping.category, {} = mapping.value
                 FROM temp.response_mapping AS mapping
                 WHERE {quoted_table}.{category_column} IS NULL
                   AND CAST({quoted_table}.{response} AS TEXT) IS mapping.raw",
                quote_ident(column::RESPONSE_VALUE)
            ),
            [],
        )? as u64;
        conn.execute_batch("DROP TABLE temp.response_mapping")?;
        summary.distinct_values = pending.len();
        debug!(
            "Derived response columns for {} row(s) of {table} ({} distinct value(s))",
            summary.rows_updated, summary.distinct_values
        );
        Ok(summary)
    })
}
