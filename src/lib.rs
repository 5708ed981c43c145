pub mod assemble;
pub mod classify;
pub mod cli;
pub mod config;
pub mod detect;
pub mod document;
pub mod engine;
pub mod error;
pub mod export;
pub mod fields;
pub mod flatten;
pub mod index;
pub mod io_utils;
pub mod table;
pub mod template;
pub mod verify;

use std::{env, path::Path, sync::OnceLock};

use anyhow::{Context, Result};
use clap::Parser;
use log::{LevelFilter, debug, info, warn};

use crate::cli::{Cli, Commands, FieldSetArgs};

pub use crate::{
    classify::FlatMap,
    config::FieldSets,
    document::NormalizedDocument,
    engine::{Organizer, deflatten, organize},
    error::{OrganizeError, OrganizeResult},
    index::{FieldLocation, FieldLocationIndex, IndexCache},
    table::TableDefinition,
    template::{FieldKind, SchemaKey, TemplateSchema},
    verify::{RoundTripReport, verify_round_trip},
};

static LOGGER: OnceLock<()> = OnceLock::new();

fn init_logging() {
    LOGGER.get_or_init(|| {
        let mut builder = env_logger::Builder::from_env(env_logger::Env::default());
        if env::var("RUST_LOG").is_err() {
            builder.filter_module("form_organizer", LevelFilter::Info);
        }
        let _ = builder.format_timestamp_millis().try_init();
    });
}

pub fn run() -> Result<()> {
    init_logging();
    let cli = Cli::parse();
    match cli.command {
        Commands::Index(args) => handle_index(&args),
        Commands::Organize(args) => handle_organize(&args),
        Commands::Flatten(args) => handle_flatten(&args),
        Commands::Verify(args) => verify::execute(&args),
        Commands::Tables(args) => export::execute(&args),
        Commands::Fields(args) => fields::execute(&args),
    }
}

fn handle_index(args: &cli::IndexArgs) -> Result<()> {
    let schema = load_template(&args.template)?;
    info!(
        "Building index for template {} v{}",
        schema.key(),
        schema.version
    );
    let index = FieldLocationIndex::build(&schema)?;
    index
        .save(&args.index)
        .with_context(|| format!("Writing index to {:?}", args.index))?;
    info!(
        "Index for {} field(s) written to {:?}",
        index.len(),
        args.index
    );
    Ok(())
}

fn handle_organize(args: &cli::OrganizeArgs) -> Result<()> {
    let schema = load_template(&args.template)?;
    let index = match &args.index {
        Some(path) => {
            let loaded = FieldLocationIndex::load(path)
                .with_context(|| format!("Loading index from {path:?}"))?;
            if loaded.matches(&schema) {
                debug!("Using prebuilt index {path:?}");
                loaded
            } else {
                warn!(
                    "Index {path:?} was built for {} v{}, not {} v{}; rebuilding",
                    loaded.schema_key(),
                    loaded.schema_version(),
                    schema.key(),
                    schema.version
                );
                FieldLocationIndex::build(&schema)?
            }
        }
        None => FieldLocationIndex::build(&schema)?,
    };
    let fields = resolve_field_sets(&args.field_sets)?;
    debug!(
        "Field sets: {} common id(s), {} metadata id(s)",
        fields.common.len(),
        fields.metadata.len()
    );

    let flat = io_utils::read_flat_map(&args.input)?;
    let doc = Organizer::new(fields)
        .organize_indexed(&flat, &index)
        .with_context(|| format!("Organizing {:?}", args.input))?;
    io_utils::write_json(args.output.as_deref(), &doc)?;
    info!(
        "Organized {:?}: {} tab(s), {} table(s), {} unmapped key(s)",
        args.input,
        doc.data.len(),
        doc.tables.len(),
        doc.unmapped.len()
    );
    Ok(())
}

fn handle_flatten(args: &cli::FlattenArgs) -> Result<()> {
    let schema = load_template(&args.template)?;
    let doc: NormalizedDocument = io_utils::read_json(&args.input)
        .with_context(|| format!("Reading document from {:?}", args.input))?;
    let flat = deflatten(&doc, &schema).with_context(|| format!("Flattening {:?}", args.input))?;
    io_utils::write_json(args.output.as_deref(), &flat)?;
    info!("Flattened {:?} into {} key(s)", args.input, flat.len());
    Ok(())
}

fn load_template(path: &Path) -> Result<TemplateSchema> {
    TemplateSchema::load(path).with_context(|| format!("Loading template from {path:?}"))
}

pub(crate) fn resolve_field_sets(args: &FieldSetArgs) -> Result<FieldSets> {
    FieldSets::resolve(args.fields.as_deref(), &args.common, &args.metadata)
}
