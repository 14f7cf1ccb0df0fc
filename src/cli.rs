use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

#[derive(Debug, Parser)]
#[command(
    author,
    version,
    about = "Rank school-census entities by enrollment",
    long_about = None
)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalArgs,
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Show the top entities of a census year, ingesting sources on first use
    Rank(RankArgs),
    /// Ingest source files into the aggregate store ahead of queries
    Ingest(IngestArgs),
    /// Show how a source file's header resolves against the column catalog
    Mapping(MappingArgs),
    /// Print the effective candidate column catalog as YAML
    Catalog(CatalogArgs),
    /// Summarize the years held in the aggregate store
    Years,
    /// Delete every stored record of a census year
    Purge(PurgeArgs),
}

#[derive(Debug, Args)]
pub struct GlobalArgs {
    /// YAML configuration file
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,
    /// Directory holding the census extracts
    #[arg(long = "source-dir", global = true)]
    pub source_dir: Option<PathBuf>,
    /// Glob pattern matched against source file names
    #[arg(long, global = true)]
    pub pattern: Option<String>,
    /// Source delimiter character (supports ',', 'tab', ';', '|')
    #[arg(long, global = true, value_parser = parse_delimiter)]
    pub delimiter: Option<u8>,
    /// Character encoding of the source files (defaults to windows-1252)
    #[arg(long = "input-encoding", global = true)]
    pub input_encoding: Option<String>,
    /// Aggregate store file
    #[arg(long, global = true)]
    pub store: Option<PathBuf>,
    /// YAML file overriding candidate column names
    #[arg(long, global = true)]
    pub catalog: Option<PathBuf>,
    /// Only aggregate rows of this state code (repeatable)
    #[arg(long = "state", global = true, action = clap::ArgAction::Append)]
    pub states: Vec<u64>,
    /// Only aggregate rows of the Nordeste states (codes 21-29)
    #[arg(long, global = true, conflicts_with = "states")]
    pub nordeste: bool,
}

#[derive(Debug, Clone, Copy, ValueEnum, PartialEq, Eq, Default)]
#[value(rename_all = "kebab-case")]
pub enum OutputFormat {
    #[default]
    Table,
    Json,
}

#[derive(Debug, Args)]
pub struct RankArgs {
    /// Census year to rank
    pub year: i32,
    /// Output format
    #[arg(long, value_enum, default_value_t = OutputFormat::Table)]
    pub format: OutputFormat,
}

#[derive(Debug, Args)]
pub struct IngestArgs {
    /// Years to ingest (defaults to every supported year)
    #[arg(short, long = "year", action = clap::ArgAction::Append)]
    pub years: Vec<i32>,
    /// Aggregate and report without writing to the store
    #[arg(long = "dry-run")]
    pub dry_run: bool,
    /// Output format for the ingestion reports
    #[arg(long, value_enum, default_value_t = OutputFormat::Table)]
    pub format: OutputFormat,
}

#[derive(Debug, Args)]
pub struct MappingArgs {
    /// Source file whose header should be resolved
    #[arg(short = 'i', long = "input")]
    pub input: PathBuf,
}

#[derive(Debug, Args)]
pub struct CatalogArgs {
    /// Write the catalog to this file instead of stdout
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

#[derive(Debug, Args)]
pub struct PurgeArgs {
    /// Census year to delete
    pub year: i32,
}

pub fn parse_delimiter(value: &str) -> Result<u8, String> {
    match value {
        "tab" | "\t" => Ok(b'\t'),
        "comma" | "," => Ok(b','),
        "|" | "pipe" => Ok(b'|'),
        ";" | "semicolon" => Ok(b';'),
        other => {
            let mut chars = other.chars();
            let first = chars
                .next()
                .ok_or_else(|| "Delimiter cannot be empty".to_string())?;
            if chars.next().is_some() {
                return Err("Delimiter must be a single character".to_string());
            }
            if !first.is_ascii() {
                return Err("Delimiter must be ASCII".to_string());
            }
            Ok(first as u8)
        }
    }
}
