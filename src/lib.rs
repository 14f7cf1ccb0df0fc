pub mod aggregate;
pub mod catalog;
pub mod cli;
pub mod config;
pub mod decoder;
pub mod error;
pub mod ingest;
pub mod io_utils;
pub mod ranking;
pub mod record;
pub mod resolver;
pub mod store;
pub mod table;
pub mod years;

use std::{env, sync::OnceLock};

use anyhow::{Context, Result};
use clap::Parser;
use itertools::Itertools;
use log::{LevelFilter, debug, info};

use crate::{
    cli::{Cli, Commands, GlobalArgs, OutputFormat},
    config::{NORDESTE_STATE_CODES, PipelineConfig},
    ingest::Ingestor,
    ranking::RankingService,
    store::{AggregateStore, SnapshotStore},
};

static LOGGER: OnceLock<()> = OnceLock::new();

fn init_logging() {
    LOGGER.get_or_init(|| {
        let mut builder = env_logger::Builder::from_env(env_logger::Env::default());
        if env::var("RUST_LOG").is_err() {
            builder.filter_module("censo_rank", LevelFilter::Info);
        }
        let _ = builder.format_timestamp_millis().try_init();
    });
}

pub fn run() -> Result<()> {
    init_logging();
    let cli = Cli::parse();
    let config = load_config(&cli.global)?;
    debug!("Effective configuration: {:?}", config);
    match cli.command {
        Commands::Rank(args) => handle_rank(&config, &args),
        Commands::Ingest(args) => handle_ingest(&config, &args),
        Commands::Mapping(args) => handle_mapping(&config, &args),
        Commands::Catalog(args) => handle_catalog(&config, &args),
        Commands::Years => handle_years(&config),
        Commands::Purge(args) => handle_purge(&config, &args),
    }
}

/// Reads the optional config file and applies command-line overrides.
pub fn load_config(global: &GlobalArgs) -> Result<PipelineConfig> {
    let mut config = match &global.config {
        Some(path) => PipelineConfig::load(path)?,
        None => PipelineConfig::default(),
    };
    if let Some(dir) = &global.source_dir {
        config.source_dir = dir.clone();
    }
    if let Some(pattern) = &global.pattern {
        config.file_pattern = pattern.clone();
    }
    if let Some(delimiter) = global.delimiter {
        config.delimiter = delimiter as char;
    }
    if let Some(encoding) = &global.input_encoding {
        config.encoding = encoding.clone();
    }
    if let Some(store) = &global.store {
        config.store_path = store.clone();
    }
    if let Some(catalog) = &global.catalog {
        config.catalog_path = Some(catalog.clone());
    }
    if global.nordeste {
        config.state_codes = NORDESTE_STATE_CODES.to_vec();
    } else if !global.states.is_empty() {
        config.state_codes = global.states.clone();
    }
    config.validate()?;
    Ok(config)
}

fn open_service(config: &PipelineConfig) -> Result<RankingService<SnapshotStore>> {
    let ingestor = Ingestor::from_config(config)?;
    let store = SnapshotStore::open(&config.store_path)
        .with_context(|| format!("Opening aggregate store {:?}", config.store_path))?;
    Ok(RankingService::new(store, ingestor, config.ranking_size))
}

fn handle_rank(config: &PipelineConfig, args: &cli::RankArgs) -> Result<()> {
    config.years().check(args.year)?;
    let service = open_service(config)?;
    let entries = service.top_ranked(args.year)?;
    match args.format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&entries)?);
        }
        OutputFormat::Table => {
            table::print_table(table::RANKING_HEADERS, &table::ranking_rows(&entries));
        }
    }
    info!("Ranked {} entit(ies) for {}", entries.len(), args.year);
    Ok(())
}

fn handle_ingest(config: &PipelineConfig, args: &cli::IngestArgs) -> Result<()> {
    let years = if args.years.is_empty() {
        config.years().iter().collect::<Vec<_>>()
    } else {
        args.years.clone()
    };
    for year in &years {
        config.years().check(*year)?;
    }
    let reports = if args.dry_run {
        let ingestor = Ingestor::from_config(config)?;
        years
            .iter()
            .map(|year| ingestor.dry_run(*year))
            .collect::<Result<Vec<_>, _>>()?
    } else {
        open_service(config)?.ingest(&years)?
    };
    match args.format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&reports)?),
        OutputFormat::Table => {
            for report in &reports {
                println!("{report}");
            }
        }
    }
    Ok(())
}

fn handle_mapping(config: &PipelineConfig, args: &cli::MappingArgs) -> Result<()> {
    let ingestor = Ingestor::from_config(config)?;
    let mapping = ingestor
        .preview_mapping(&args.input)
        .with_context(|| format!("Resolving header of {:?}", args.input))?;
    table::print_table(table::MAPPING_HEADERS, &table::mapping_rows(&mapping));
    match ingestor.file_year(&args.input) {
        Some(year) => println!("Year from file name: {year}"),
        None => println!("Year from file name: none"),
    }
    let missing = mapping.missing_required();
    if missing.is_empty() {
        info!("{:?} resolves all required fields", args.input);
    } else {
        let names = missing.iter().join(", ");
        println!("File would be skipped: missing {names}");
    }
    Ok(())
}

fn handle_catalog(config: &PipelineConfig, args: &cli::CatalogArgs) -> Result<()> {
    let yaml = config.catalog()?.to_yaml_string()?;
    match &args.output {
        Some(path) => {
            std::fs::write(path, yaml).with_context(|| format!("Writing catalog to {path:?}"))?;
            info!("Catalog written to {:?}", path);
        }
        None => print!("{yaml}"),
    }
    Ok(())
}

fn handle_years(config: &PipelineConfig) -> Result<()> {
    let store = SnapshotStore::open(&config.store_path)
        .with_context(|| format!("Opening aggregate store {:?}", config.store_path))?;
    let summaries = store.summaries()?;
    if summaries.is_empty() {
        info!("Aggregate store {:?} holds no years", config.store_path);
        return Ok(());
    }
    table::print_table(table::SUMMARY_HEADERS, &table::summary_rows(&summaries));
    Ok(())
}

fn handle_purge(config: &PipelineConfig, args: &cli::PurgeArgs) -> Result<()> {
    config.years().check(args.year)?;
    let store = SnapshotStore::open(&config.store_path)
        .with_context(|| format!("Opening aggregate store {:?}", config.store_path))?;
    let removed = store.delete_year(args.year)?;
    info!(
        "Removed {} record(s) for {} from {:?}",
        removed, args.year, config.store_path
    );
    Ok(())
}
