use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(
    author,
    version,
    about = "Consolidate course evaluation spreadsheets into a star-schema store",
    long_about = None
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Rebuild every table from a set of workbooks (staging, dedup, audit, curation)
    Rebuild(RebuildArgs),
    /// Append one workbook with the six canonical sheets straight into the published tables
    Upload(UploadArgs),
    /// Report orphan foreign keys of the published tables
    Audit(AuditArgs),
    /// Classify stored responses and list values the vocabulary does not recognize
    Responses(ResponsesArgs),
    /// Assign surrogate keys and derived response columns on the fact table
    Maintain(MaintainArgs),
    /// Show how each sheet would be routed and normalized, without writing anything
    Inspect(InspectArgs),
    /// Print the effective configuration as YAML
    Config(ConfigArgs),
}

#[derive(Debug, Args)]
pub struct StoreArgs {
    /// SQLite store file (defaults to the configured database or avaliacao.sqlite)
    #[arg(long = "db")]
    pub database: Option<PathBuf>,
    /// YAML configuration file
    #[arg(short, long)]
    pub config: Option<PathBuf>,
}

#[derive(Debug, Args)]
pub struct RebuildArgs {
    /// Workbooks to ingest: spreadsheet files, CSV files, or directories of CSV sheets
    #[arg(short, long = "input", action = clap::ArgAction::Append)]
    pub inputs: Vec<PathBuf>,
    #[command(flatten)]
    pub store: StoreArgs,
    /// Character encoding of CSV sheets (defaults to utf-8)
    #[arg(long = "input-encoding")]
    pub input_encoding: Option<String>,
    /// Report orphans without inserting placeholder dimension rows
    #[arg(long)]
    pub no_curate: bool,
    /// Abort and roll back publishing when orphans remain after curation
    #[arg(long)]
    pub strict: bool,
    /// Print the run report as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Debug, Args)]
pub struct UploadArgs {
    /// Workbook containing dCurso, dDisciplina, dPergunta, dTipoPergunta, dUnidade and fAvaliacao
    #[arg(short, long)]
    pub input: PathBuf,
    #[command(flatten)]
    pub store: StoreArgs,
    /// Insert exact duplicate rows instead of dropping them
    #[arg(long)]
    pub keep_duplicates: bool,
    /// Print the insert counts as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Debug, Args)]
pub struct AuditArgs {
    #[command(flatten)]
    pub store: StoreArgs,
    /// Insert placeholder rows for orphans, then audit again
    #[arg(long)]
    pub curate: bool,
    /// Number of orphan key values to show per foreign key
    #[arg(long)]
    pub sample: Option<usize>,
    /// Print the integrity report as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Debug, Args)]
pub struct ResponsesArgs {
    #[command(flatten)]
    pub store: StoreArgs,
    /// Number of unmapped values to list (0 lists all)
    #[arg(long, default_value_t = 20)]
    pub top: usize,
    /// Write the unmapped values with their counts to a CSV file
    #[arg(short, long)]
    pub output: Option<PathBuf>,
    /// Print the domain report as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Debug, Args)]
pub struct MaintainArgs {
    #[command(flatten)]
    pub store: StoreArgs,
    /// Print the maintenance summary as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Debug, Args)]
pub struct InspectArgs {
    /// Workbooks to inspect
    #[arg(short, long = "input", action = clap::ArgAction::Append)]
    pub inputs: Vec<PathBuf>,
    /// YAML configuration file
    #[arg(short, long)]
    pub config: Option<PathBuf>,
    /// Character encoding of CSV sheets (defaults to utf-8)
    #[arg(long = "input-encoding")]
    pub input_encoding: Option<String>,
    /// Print the inspection as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Debug, Args)]
pub struct ConfigArgs {
    /// YAML configuration file to load before printing
    #[arg(short, long)]
    pub config: Option<PathBuf>,
}
