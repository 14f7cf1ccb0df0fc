//! Source discovery and per-year ingestion.
//!
//! One ingestion run targets one census year. Every matching source file is
//! streamed row by row into its own [`Aggregator`] on a scoped thread; the
//! per-file aggregators of files that were read to completion are then folded
//! together in file-name order and merged into the store in a single batch.
//! Row-level and file-level problems are counted and logged; only a store
//! failure aborts the run.

use std::{
    collections::BTreeSet,
    fmt,
    path::{Path, PathBuf},
    thread,
};

use anyhow::{Context, Result, anyhow};
use encoding_rs::Encoding;
use glob::Pattern;
use log::{debug, info, warn};
use serde::Serialize;

use crate::{
    aggregate::Aggregator,
    catalog::CandidateCatalog,
    config::PipelineConfig,
    decoder::{RowDecoder, RowSkip},
    error::PipelineError,
    io_utils::{self, SourceFingerprint},
    resolver::ResolvedMapping,
    store::AggregateStore,
    years::SupportedYears,
};

/// Counters for one ingestion run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IngestReport {
    pub year: i32,
    pub files_found: usize,
    pub files_aggregated: usize,
    pub files_skipped: usize,
    pub files_failed: usize,
    pub rows_read: u64,
    pub rows_skipped: u64,
    pub rows_other_year: u64,
    /// Rows dropped by the state filter.
    pub rows_filtered: u64,
    pub entities: usize,
    pub inserted: usize,
    pub already_present: usize,
    /// Set when the run aggregated without writing to the store.
    pub dry_run: bool,
}

impl fmt::Display for IngestReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "year {}: {} file(s) found, {} aggregated, {} skipped, {} failed; \
             {} row(s) read, {} skipped, {} for other years, {} filtered by state; \
             {} entit(ies), {} inserted, {} already stored",
            self.year,
            self.files_found,
            self.files_aggregated,
            self.files_skipped,
            self.files_failed,
            self.rows_read,
            self.rows_skipped,
            self.rows_other_year,
            self.rows_filtered,
            self.entities,
            self.inserted,
            self.already_present
        )?;
        if self.dry_run {
            f.write_str(" (dry run, store untouched)")?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FileStats {
    pub rows_read: u64,
    pub missing_entity_code: u64,
    pub missing_year: u64,
    pub state_excluded: u64,
}

impl FileStats {
    pub fn rows_skipped(&self) -> u64 {
        self.missing_entity_code + self.missing_year
    }

    fn record_skip(&mut self, skip: RowSkip) {
        match skip {
            RowSkip::MissingEntityCode => self.missing_entity_code += 1,
            RowSkip::MissingYear => self.missing_year += 1,
            RowSkip::StateExcluded => self.state_excluded += 1,
        }
    }
}

/// Result of streaming one source file.
pub enum FileOutcome {
    Aggregated {
        aggregator: Aggregator,
        stats: FileStats,
        fingerprint: SourceFingerprint,
    },
    /// The header lacks a required field; the file was not read further.
    Skipped(PipelineError),
    /// The file could not be opened or read to completion.
    Failed(anyhow::Error),
}

/// Everything needed to read source files, resolved from configuration.
#[derive(Debug, Clone)]
pub struct Ingestor {
    source_dir: PathBuf,
    pattern: Pattern,
    delimiter: u8,
    encoding: &'static Encoding,
    years: SupportedYears,
    catalog: CandidateCatalog,
    states: Option<BTreeSet<u64>>,
}

impl Ingestor {
    pub fn from_config(config: &PipelineConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            source_dir: config.source_dir.clone(),
            pattern: config.file_matcher()?,
            delimiter: config.delimiter_byte()?,
            encoding: config.encoding()?,
            years: config.years(),
            catalog: config.catalog()?,
            states: config.state_filter(),
        })
    }

    pub fn years(&self) -> SupportedYears {
        self.years
    }

    pub fn catalog(&self) -> &CandidateCatalog {
        &self.catalog
    }

    pub fn ensure_supported(&self, year: i32) -> Result<(), PipelineError> {
        self.years.check(year)
    }

    /// Source files matching the pattern, sorted by path.
    pub fn discover_sources(&self) -> Result<Vec<PathBuf>, PipelineError> {
        let unavailable = || PipelineError::SourceUnavailable {
            dir: self.source_dir.clone(),
            pattern: self.pattern.as_str().to_string(),
        };
        let entries = match std::fs::read_dir(&self.source_dir) {
            Ok(entries) => entries,
            Err(err) => {
                debug!("Cannot list {:?}: {err}", self.source_dir);
                return Err(unavailable());
            }
        };
        let mut files = entries
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_type().map(|t| t.is_file()).unwrap_or(false))
            .filter(|entry| self.pattern.matches(&entry.file_name().to_string_lossy()))
            .map(|entry| entry.path())
            .collect::<Vec<_>>();
        if files.is_empty() {
            return Err(unavailable());
        }
        files.sort();
        Ok(files)
    }

    /// Reads just the header of `path` and resolves it against the catalog.
    pub fn preview_mapping(&self, path: &Path) -> Result<ResolvedMapping> {
        let (mut reader, _) = io_utils::open_source_reader(path, self.delimiter, self.encoding)?;
        let header = reader
            .headers()
            .with_context(|| format!("Reading header of {path:?}"))?
            .clone();
        Ok(ResolvedMapping::build(
            &header.iter().collect::<Vec<_>>(),
            &self.catalog,
        ))
    }

    pub fn file_year(&self, path: &Path) -> Option<i32> {
        self.years.infer_from_path(path)
    }

    /// Streams one file into a fresh aggregator scoped to `year`.
    pub fn aggregate_file(&self, path: &Path, year: i32) -> FileOutcome {
        match self.read_file(path, year) {
            Ok(outcome) => outcome,
            Err(err) => FileOutcome::Failed(err),
        }
    }

    fn read_file(&self, path: &Path, year: i32) -> Result<FileOutcome> {
        let (mut reader, fingerprint) =
            io_utils::open_source_reader(path, self.delimiter, self.encoding)?;
        let header = reader
            .headers()
            .with_context(|| format!("Reading header of {path:?}"))?
            .iter()
            .map(str::to_string)
            .collect::<Vec<_>>();
        let mapping = match ResolvedMapping::resolve(&header, &self.catalog) {
            Ok(mapping) => mapping,
            Err(unresolved) => {
                return Ok(FileOutcome::Skipped(PipelineError::SchemaUnresolved {
                    path: path.to_path_buf(),
                    missing: unresolved.missing,
                }));
            }
        };
        for (field, column) in mapping.entries() {
            if let Some(column) = column {
                debug!(
                    "{:?}: {} <- {} (column {})",
                    path.file_name().unwrap_or_default(),
                    field,
                    column.source_name,
                    column.position
                );
            }
        }

        let file_year = self.file_year(path);
        let decoder = RowDecoder::new(&mapping, self.years, file_year)
            .with_state_filter(self.states.as_ref());
        let mut aggregator = Aggregator::new(year);
        let mut stats = FileStats::default();
        let mut record = csv::StringRecord::new();
        loop {
            let more = reader
                .read_record(&mut record)
                .with_context(|| format!("Reading row {} of {path:?}", stats.rows_read + 2))?;
            if !more {
                break;
            }
            stats.rows_read += 1;
            match decoder.decode(&record) {
                Ok(row) => {
                    aggregator.add(row);
                }
                Err(skip) => stats.record_skip(skip),
            }
        }
        drop(reader);
        Ok(FileOutcome::Aggregated {
            aggregator,
            stats,
            fingerprint: fingerprint.finish(path),
        })
    }

    /// Aggregates every file for `year` in parallel and folds the results.
    pub fn aggregate_files(
        &self,
        files: &[PathBuf],
        year: i32,
    ) -> (Aggregator, Vec<SourceFingerprint>, IngestReport) {
        let mut report = IngestReport {
            year,
            files_found: files.len(),
            ..IngestReport::default()
        };
        let outcomes = thread::scope(|scope| {
            let handles = files
                .iter()
                .map(|path| scope.spawn(move || self.aggregate_file(path, year)))
                .collect::<Vec<_>>();
            handles
                .into_iter()
                .map(|handle| {
                    handle
                        .join()
                        .unwrap_or_else(|_| FileOutcome::Failed(anyhow!("Worker thread panicked")))
                })
                .collect::<Vec<_>>()
        });

        let mut combined = Aggregator::new(year);
        let mut fingerprints = Vec::new();
        for (path, outcome) in files.iter().zip(outcomes) {
            match outcome {
                FileOutcome::Aggregated {
                    aggregator,
                    stats,
                    fingerprint,
                } => {
                    info!(
                        "Aggregated {:?}: {} row(s), {} skipped ({} without entity code, {} without year), {} for other years, {} filtered by state, {} entit(ies) for {}",
                        path,
                        stats.rows_read,
                        stats.rows_skipped(),
                        stats.missing_entity_code,
                        stats.missing_year,
                        aggregator.rows_other_year(),
                        stats.state_excluded,
                        aggregator.len(),
                        year
                    );
                    report.files_aggregated += 1;
                    report.rows_read += stats.rows_read;
                    report.rows_skipped += stats.rows_skipped();
                    report.rows_other_year += aggregator.rows_other_year();
                    report.rows_filtered += stats.state_excluded;
                    if aggregator.rows_accepted() > 0 {
                        fingerprints.push(fingerprint);
                    }
                    combined.absorb(aggregator);
                }
                FileOutcome::Skipped(err) => {
                    warn!("Skipping source file: {err}");
                    report.files_skipped += 1;
                }
                FileOutcome::Failed(err) => {
                    warn!("Failed to read {:?}: {err:#}", path);
                    report.files_failed += 1;
                }
            }
        }
        report.entities = combined.len();
        (combined, fingerprints, report)
    }

    /// Matching sources for `year`, or `None` when there is nothing to read.
    fn sources_for(&self, year: i32) -> Result<Option<Vec<PathBuf>>, PipelineError> {
        self.ensure_supported(year)?;
        match self.discover_sources() {
            Ok(files) => Ok(Some(files)),
            Err(err @ PipelineError::SourceUnavailable { .. }) => {
                warn!("{err}; nothing to ingest for {year}");
                Ok(None)
            }
            Err(err) => Err(err),
        }
    }

    /// Aggregates every available source for `year` and merges the result
    /// into `store`. Missing sources yield an empty report, not an error.
    pub fn ingest_year(
        &self,
        store: &dyn AggregateStore,
        year: i32,
    ) -> Result<IngestReport, PipelineError> {
        match self.sources_for(year)? {
            Some(files) => self.ingest_files(store, &files, year),
            None => Ok(IngestReport {
                year,
                ..IngestReport::default()
            }),
        }
    }

    /// Aggregates `files` for `year` and merges the result into `store` in
    /// one batch.
    pub fn ingest_files(
        &self,
        store: &dyn AggregateStore,
        files: &[PathBuf],
        year: i32,
    ) -> Result<IngestReport, PipelineError> {
        self.ensure_supported(year)?;
        info!("Ingesting {} source file(s) for {}", files.len(), year);

        let (aggregator, fingerprints, mut report) = self.aggregate_files(files, year);
        let records = aggregator.into_records();
        if !records.is_empty() {
            let outcome = store
                .merge_if_absent(&records, &fingerprints)
                .map_err(PipelineError::StoreWrite)?;
            report.inserted = outcome.inserted;
            report.already_present = outcome.already_present;
        }
        info!("Ingestion finished: {report}");
        Ok(report)
    }

    /// Aggregates `year` exactly as [`Ingestor::ingest_year`] would, without
    /// touching any store.
    pub fn dry_run(&self, year: i32) -> Result<IngestReport, PipelineError> {
        let mut report = match self.sources_for(year)? {
            Some(files) => self.aggregate_files(&files, year).2,
            None => IngestReport {
                year,
                ..IngestReport::default()
            },
        };
        report.dry_run = true;
        info!("Dry run finished: {report}");
        Ok(report)
    }
}
