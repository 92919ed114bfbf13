pub mod audit;
pub mod cli;
pub mod columns;
pub mod config;
pub mod entity;
pub mod error;
pub mod finalize;
pub mod io_utils;
pub mod pipeline;
pub mod report;
pub mod responses;
pub mod router;
pub mod staging;
pub mod store;
pub mod surrogate;
pub mod table;
pub mod upload;
pub mod workbook;

use std::{
    env,
    path::{Path, PathBuf},
    sync::OnceLock,
};

use anyhow::{Context, Result, anyhow};
use clap::Parser;
use log::{LevelFilter, debug, info};
use serde::Serialize;

use crate::{
    audit::CurationPolicy,
    cli::{Cli, Commands},
    config::PipelineConfig,
    entity::Entity,
    pipeline::RebuildOptions,
    store::Store,
    table::Table,
};

static LOGGER: OnceLock<()> = OnceLock::new();

fn init_logging() {
    LOGGER.get_or_init(|| {
        let mut builder = env_logger::Builder::from_env(env_logger::Env::default());
        if env::var("RUST_LOG").is_err() {
            builder.filter_module("avaliacao_etl", LevelFilter::Info);
        }
        let _ = builder.format_timestamp_millis().try_init();
    });
}

pub fn run() -> Result<()> {
    init_logging();
    let cli = Cli::parse();
    match cli.command {
        Commands::Rebuild(args) => handle_rebuild(&args),
        Commands::Upload(args) => handle_upload(&args),
        Commands::Audit(args) => handle_audit(&args),
        Commands::Responses(args) => handle_responses(&args),
        Commands::Maintain(args) => handle_maintain(&args),
        Commands::Inspect(args) => handle_inspect(&args),
        Commands::Config(args) => handle_config(&args),
    }
}

fn load_config(path: Option<&Path>) -> Result<PipelineConfig> {
    let config = PipelineConfig::load_optional(path)?;
    if let Some(path) = path {
        debug!("Loaded configuration from {path:?}");
    }
    Ok(config)
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let rendered = serde_json::to_string_pretty(value).context("Serializing report to JSON")?;
    println!("{rendered}");
    Ok(())
}

/// Opens a store that a previous rebuild or upload must have created.
fn open_existing_store(path: &Path) -> Result<Store> {
    if !path.exists() {
        return Err(anyhow!(
            "Store {path:?} does not exist; run `rebuild` first"
        ));
    }
    Store::open(path).with_context(|| format!("Opening store {path:?}"))
}

fn handle_rebuild(args: &cli::RebuildArgs) -> Result<()> {
    let config = load_config(args.store.config.as_deref())?;
    let inputs = config.input_paths(&args.inputs);
    if inputs.is_empty() {
        return Err(anyhow!(
            "At least one input workbook must be provided (-i or `inputs` in the configuration)"
        ));
    }
    let encoding = match &args.input_encoding {
        Some(label) => io_utils::resolve_encoding(Some(label.as_str()))?,
        None => config.encoding()?,
    };
    let options = RebuildOptions {
        inputs,
        encoding,
        normalizer: config.normalizer(),
        vocabulary: config.vocabulary(),
        curation: if args.no_curate {
            None
        } else {
            config.curation_policy()
        },
        sample_size: config.audit.sample_size,
        fail_on_orphans: args.strict || config.audit.fail_on_orphans,
    };
    let database = config.database_path(args.store.database.as_deref());
    info!(
        "Rebuilding {:?} from {} input(s)",
        database,
        options.inputs.len()
    );
    let store = Store::open(&database).with_context(|| format!("Opening store {database:?}"))?;
    let report = pipeline::rebuild(store.conn(), &options)
        .with_context(|| format!("Rebuilding store {database:?}"))?;
    if args.json {
        print_json(&report)
    } else {
        print!("{}", report::render_run(&report, 20));
        Ok(())
    }
}

fn handle_upload(args: &cli::UploadArgs) -> Result<()> {
    let config = load_config(args.store.config.as_deref())?;
    let mut options = config.upload_options();
    if args.keep_duplicates {
        options.drop_duplicates = false;
    }
    let workbook = workbook::read_workbook(&args.input, config.encoding()?)
        .with_context(|| format!("Reading workbook {:?}", args.input))?;
    let validated = upload::validate(&workbook, options)
        .with_context(|| format!("Validating workbook {:?}", args.input))?;
    let database = config.database_path(args.store.database.as_deref());
    if !database.exists() {
        return Err(anyhow!(
            "Store {database:?} does not exist; run `rebuild` before uploading"
        ));
    }
    let store = Store::open(&database).with_context(|| format!("Opening store {database:?}"))?;
    let report = upload::insert_validated(store.conn(), &workbook.source, &validated)
        .with_context(|| format!("Uploading {:?} into {database:?}", args.input))?;
    info!("✓ Uploaded {:?}", args.input);
    if args.json {
        print_json(&report)
    } else {
        print!("{}", report::render_upload(&report));
        Ok(())
    }
}

#[derive(Serialize)]
struct AuditOutput {
    tables: Vec<TableSize>,
    integrity: audit::IntegrityReport,
    curation: Vec<audit::CurationOutcome>,
    integrity_after_curation: Option<audit::IntegrityReport>,
    grouping: Option<audit::GroupingReport>,
}

#[derive(Serialize)]
struct TableSize {
    table: &'static str,
    rows: Option<u64>,
}

fn handle_audit(args: &cli::AuditArgs) -> Result<()> {
    let config = load_config(args.store.config.as_deref())?;
    let database = config.database_path(args.store.database.as_deref());
    let store = open_existing_store(&database)?;
    let conn = store.conn();
    let sample_size = args.sample.unwrap_or(config.audit.sample_size);
    let foreign_keys = audit::standard_foreign_keys();

    let tables = store
        .table_counts()?
        .into_iter()
        .map(|(entity, rows)| TableSize {
            table: entity.table(),
            rows,
        })
        .collect::<Vec<_>>();
    let integrity = audit::audit(conn, &foreign_keys, sample_size)
        .with_context(|| format!("Auditing {database:?}"))?;
    let (curation, integrity_after_curation) = if args.curate {
        let policy = CurationPolicy {
            entities: config.curation.entities.clone(),
        };
        let curation = audit::curate(conn, &foreign_keys, &policy)
            .with_context(|| format!("Curating orphans in {database:?}"))?;
        let after = audit::audit(conn, &foreign_keys, sample_size)?;
        (curation, Some(after))
    } else {
        (Vec::new(), None)
    };
    let output = AuditOutput {
        tables,
        integrity,
        curation,
        integrity_after_curation,
        grouping: audit::grouping_consistency(conn)?,
    };

    if args.json {
        return print_json(&output);
    }
    let mut sizes = Table::new(["table", "rows"]);
    for size in &output.tables {
        sizes.push([
            size.table.to_string(),
            size.rows
                .map(|rows| rows.to_string())
                .unwrap_or_else(|| "(missing)".to_string()),
        ]);
    }
    sizes.print();
    println!();
    print!("{}", report::render_integrity(&output.integrity));
    if args.curate {
        println!();
        print!("{}", report::render_curation(&output.curation));
    }
    if let Some(after) = &output.integrity_after_curation {
        println!();
        print!("{}", report::render_integrity(after));
    }
    if let Some(grouping) = &output.grouping {
        println!();
        print!("{}", report::render_grouping(grouping));
    }
    Ok(())
}

fn handle_responses(args: &cli::ResponsesArgs) -> Result<()> {
    let config = load_config(args.store.config.as_deref())?;
    let database = config.database_path(args.store.database.as_deref());
    let store = open_existing_store(&database)?;
    let report = responses::domain_report(
        store.conn(),
        Entity::Evaluation.table(),
        &config.vocabulary(),
    )
    .with_context(|| format!("Classifying responses in {database:?}"))?;
    if let Some(path) = &args.output {
        report
            .write_unmapped_csv(path)
            .with_context(|| format!("Writing unmapped values to {path:?}"))?;
        info!(
            "Wrote {} unmapped value(s) to {path:?}",
            report.unmapped.len()
        );
    }
    if args.json {
        print_json(&report)
    } else {
        print!("{}", report::render_domain(&report, args.top));
        Ok(())
    }
}

fn handle_maintain(args: &cli::MaintainArgs) -> Result<()> {
    let config = load_config(args.store.config.as_deref())?;
    let database = config.database_path(args.store.database.as_deref());
    let store = open_existing_store(&database)?;
    let report = pipeline::maintain(store.conn(), &config.vocabulary())
        .with_context(|| format!("Maintaining {database:?}"))?;
    if args.json {
        print_json(&report)
    } else {
        print!("{}", report::render_maintenance(&report));
        Ok(())
    }
}

fn handle_inspect(args: &cli::InspectArgs) -> Result<()> {
    let config = load_config(args.config.as_deref())?;
    let inputs: Vec<PathBuf> = config.input_paths(&args.inputs);
    if inputs.is_empty() {
        return Err(anyhow!("At least one input workbook must be provided"));
    }
    let encoding = match &args.input_encoding {
        Some(label) => io_utils::resolve_encoding(Some(label.as_str()))?,
        None => config.encoding()?,
    };
    let inspections = pipeline::inspect(&inputs, encoding, &config.normalizer())
        .context("Inspecting workbooks")?;
    if args.json {
        print_json(&inspections)
    } else {
        print!("{}", report::render_inspections(&inspections));
        Ok(())
    }
}

fn handle_config(args: &cli::ConfigArgs) -> Result<()> {
    let config = load_config(args.config.as_deref())?;
    print!("{}", config.to_yaml_string()?);
    Ok(())
}
