//! Ranked retrieval with lazy, query-driven population.
//!
//! A ranking request for a year with no stored rows first ingests every
//! available source for that year. Concurrent requests serialize on the
//! ingestion lock and re-check the store once they hold it, so a year is
//! never ingested twice by racing callers.

use std::sync::Mutex;

use log::{debug, info};

use crate::{
    error::PipelineError,
    ingest::{IngestReport, Ingestor},
    record::{RankedEntry, assign_ranks},
    store::AggregateStore,
};

pub struct RankingService<S> {
    store: S,
    ingestor: Ingestor,
    ranking_size: usize,
    ingest_lock: Mutex<()>,
}

impl<S: AggregateStore> RankingService<S> {
    pub fn new(store: S, ingestor: Ingestor, ranking_size: usize) -> Self {
        Self {
            store,
            ingestor,
            ranking_size,
            ingest_lock: Mutex::new(()),
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn ingestor(&self) -> &Ingestor {
        &self.ingestor
    }

    /// Top entities of `year` by total enrollment, ranked from 1.
    ///
    /// Unsupported years fail before the store is touched. A year with no
    /// stored rows and no source files yields an empty ranking.
    pub fn top_ranked(&self, year: i32) -> Result<Vec<RankedEntry>, PipelineError> {
        self.ingestor.ensure_supported(year)?;
        if self.store.count_for_year(year)? == 0 {
            self.populate(year)?;
        }
        let records = self.store.top_n(year, self.ranking_size)?;
        debug!("Ranking for {} has {} entr(ies)", year, records.len());
        Ok(assign_ranks(records))
    }

    /// Ingests `year` unless rows for it are already stored. Returns `None`
    /// when another caller populated the year first.
    pub fn populate(&self, year: i32) -> Result<Option<IngestReport>, PipelineError> {
        self.ingestor.ensure_supported(year)?;
        let _guard = self
            .ingest_lock
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if self.store.count_for_year(year)? > 0 {
            return Ok(None);
        }
        info!("No stored rows for {year}; ingesting from source files");
        self.ingestor.ingest_year(&self.store, year).map(Some)
    }

    /// Explicit batch ingestion for pre-warming the store. Every year is
    /// ingested and merged; already stored keys are left untouched.
    pub fn ingest(&self, years: &[i32]) -> Result<Vec<IngestReport>, PipelineError> {
        for year in years {
            self.ingestor.ensure_supported(*year)?;
        }
        let _guard = self
            .ingest_lock
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        years
            .iter()
            .map(|year| self.ingestor.ingest_year(&self.store, *year))
            .collect()
    }
}
