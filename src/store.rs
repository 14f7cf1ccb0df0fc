//! Aggregate store: one record per `(entity_code, census_year)`.
//!
//! Writes are append-only: [`AggregateStore::merge_if_absent`] inserts only
//! keys that are not stored yet and never overwrites. Correcting a stored
//! year means deleting it first ([`AggregateStore::delete_year`]) and
//! ingesting again.
//!
//! Both backends keep the table behind an `RwLock`. A merge holds the write
//! lock for the whole batch, so readers observe either none or all of it.

use std::{
    collections::{BTreeMap, btree_map::Entry},
    ffi::OsString,
    fs::{self, File, OpenOptions},
    io::{BufWriter, Write},
    path::{Path, PathBuf},
    sync::{RwLock, RwLockReadGuard, RwLockWriteGuard},
};

use chrono::{DateTime, Utc};
use itertools::Itertools;
use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::{error::StoreError, io_utils::SourceFingerprint, record::EntityYearRecord};

const SNAPSHOT_VERSION: u32 = 1;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MergeOutcome {
    pub inserted: usize,
    pub already_present: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct YearSummary {
    pub year: i32,
    pub entities: usize,
    pub total_enrollment: u64,
    pub committed_at: Option<DateTime<Utc>>,
    pub sources: Vec<SourceFingerprint>,
}

pub trait AggregateStore: Send + Sync {
    /// Inserts every record whose key is not stored yet, atomically for the
    /// whole batch. `sources` are recorded as provenance for each year that
    /// received at least one new record.
    fn merge_if_absent(
        &self,
        records: &[EntityYearRecord],
        sources: &[SourceFingerprint],
    ) -> Result<MergeOutcome, StoreError>;

    /// Up to `n` records for `year`, total descending, entity code ascending.
    fn top_n(&self, year: i32, n: usize) -> Result<Vec<EntityYearRecord>, StoreError>;

    fn count_for_year(&self, year: i32) -> Result<usize, StoreError>;

    fn summaries(&self) -> Result<Vec<YearSummary>, StoreError>;

    /// Removes every record of `year`, returning how many were dropped.
    fn delete_year(&self, year: i32) -> Result<usize, StoreError>;
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct YearPartition {
    records: BTreeMap<String, EntityYearRecord>,
    sources: Vec<SourceFingerprint>,
    committed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct StoreTable {
    years: BTreeMap<i32, YearPartition>,
}

/// What a merge changed, so a failed commit can be reverted.
#[derive(Default)]
struct MergeUndo {
    inserted: Vec<(i32, String)>,
    touched: BTreeMap<i32, PartitionState>,
}

struct PartitionState {
    existed: bool,
    source_count: usize,
    committed_at: Option<DateTime<Utc>>,
}

impl StoreTable {
    fn merge_if_absent(
        &mut self,
        records: &[EntityYearRecord],
        sources: &[SourceFingerprint],
    ) -> (MergeOutcome, MergeUndo) {
        let mut outcome = MergeOutcome::default();
        let mut undo = MergeUndo::default();
        let now = Utc::now();

        for record in records {
            let year = record.census_year;
            let existed = self.years.contains_key(&year);
            let partition = self.years.entry(year).or_default();
            match partition.records.entry(record.entity_code.clone()) {
                Entry::Occupied(_) => outcome.already_present += 1,
                Entry::Vacant(slot) => {
                    slot.insert(record.clone());
                    outcome.inserted += 1;
                    undo.inserted.push((year, record.entity_code.clone()));
                    undo.touched.entry(year).or_insert_with(|| PartitionState {
                        existed,
                        source_count: partition.sources.len(),
                        committed_at: partition.committed_at,
                    });
                }
            }
        }

        for year in undo.touched.keys() {
            if let Some(partition) = self.years.get_mut(year) {
                for source in sources {
                    if !partition.sources.iter().any(|known| known.sha256 == source.sha256) {
                        partition.sources.push(source.clone());
                    }
                }
                partition.committed_at = Some(now);
            }
        }
        (outcome, undo)
    }

    fn rollback(&mut self, undo: MergeUndo) {
        for (year, code) in undo.inserted {
            if let Some(partition) = self.years.get_mut(&year) {
                partition.records.remove(&code);
            }
        }
        for (year, state) in undo.touched {
            if !state.existed {
                self.years.remove(&year);
            } else if let Some(partition) = self.years.get_mut(&year) {
                partition.sources.truncate(state.source_count);
                partition.committed_at = state.committed_at;
            }
        }
    }

    fn top_n(&self, year: i32, n: usize) -> Vec<EntityYearRecord> {
        let Some(partition) = self.years.get(&year) else {
            return Vec::new();
        };
        partition
            .records
            .values()
            .k_smallest_by(n, |a, b| {
                b.total_enrollment
                    .cmp(&a.total_enrollment)
                    .then_with(|| a.entity_code.cmp(&b.entity_code))
            })
            .cloned()
            .collect()
    }

    fn count_for_year(&self, year: i32) -> usize {
        self.years
            .get(&year)
            .map(|partition| partition.records.len())
            .unwrap_or(0)
    }

    fn summaries(&self) -> Vec<YearSummary> {
        self.years
            .iter()
            .map(|(year, partition)| YearSummary {
                year: *year,
                entities: partition.records.len(),
                total_enrollment: partition
                    .records
                    .values()
                    .fold(0u64, |acc, record| acc.saturating_add(record.total_enrollment)),
                committed_at: partition.committed_at,
                sources: partition.sources.clone(),
            })
            .collect()
    }

    fn delete_year(&mut self, year: i32) -> Option<YearPartition> {
        self.years.remove(&year)
    }
}

fn read_lock(table: &RwLock<StoreTable>) -> Result<RwLockReadGuard<'_, StoreTable>, StoreError> {
    table.read().map_err(|_| StoreError::Poisoned)
}

fn write_lock(table: &RwLock<StoreTable>) -> Result<RwLockWriteGuard<'_, StoreTable>, StoreError> {
    table.write().map_err(|_| StoreError::Poisoned)
}

/// Volatile store, for tests and embedding.
#[derive(Debug, Default)]
pub struct MemoryStore {
    table: RwLock<StoreTable>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl AggregateStore for MemoryStore {
    fn merge_if_absent(
        &self,
        records: &[EntityYearRecord],
        sources: &[SourceFingerprint],
    ) -> Result<MergeOutcome, StoreError> {
        let mut table = write_lock(&self.table)?;
        let (outcome, _) = table.merge_if_absent(records, sources);
        Ok(outcome)
    }

    fn top_n(&self, year: i32, n: usize) -> Result<Vec<EntityYearRecord>, StoreError> {
        Ok(read_lock(&self.table)?.top_n(year, n))
    }

    fn count_for_year(&self, year: i32) -> Result<usize, StoreError> {
        Ok(read_lock(&self.table)?.count_for_year(year))
    }

    fn summaries(&self) -> Result<Vec<YearSummary>, StoreError> {
        Ok(read_lock(&self.table)?.summaries())
    }

    fn delete_year(&self, year: i32) -> Result<usize, StoreError> {
        let mut table = write_lock(&self.table)?;
        Ok(table
            .delete_year(year)
            .map(|partition| partition.records.len())
            .unwrap_or(0))
    }
}

/// Store persisted as a versioned bincode snapshot.
///
/// Every committed change rewrites the snapshot into a sibling temp file and
/// renames it over the original. If persisting fails the in-memory change is
/// reverted and the error returned, so memory and disk never diverge.
///
/// Writers from any handle or process serialize on an exclusive lock of a
/// sibling `.lock` file and reload the snapshot while holding it, so a merge
/// always applies on top of everything committed before it.
#[derive(Debug)]
pub struct SnapshotStore {
    path: PathBuf,
    table: RwLock<StoreTable>,
}

impl SnapshotStore {
    /// Opens the snapshot at `path`, starting empty when it does not exist.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        let table = if path.exists() {
            let table = load_snapshot(&path)?;
            info!(
                "Opened aggregate store {:?} ({} year(s))",
                path,
                table.years.len()
            );
            table
        } else {
            debug!("Aggregate store {:?} does not exist yet; starting empty", path);
            StoreTable::default()
        };
        Ok(Self {
            path,
            table: RwLock::new(table),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Replaces the in-memory table with the snapshot on disk. Must be called
    /// with the writer lock held.
    fn reload(&self, table: &mut StoreTable) -> Result<(), StoreError> {
        if self.path.exists() {
            *table = load_snapshot(&self.path)?;
            debug!("Reloaded aggregate store {:?} before writing", self.path);
        }
        Ok(())
    }
}

impl AggregateStore for SnapshotStore {
    fn merge_if_absent(
        &self,
        records: &[EntityYearRecord],
        sources: &[SourceFingerprint],
    ) -> Result<MergeOutcome, StoreError> {
        let mut table = write_lock(&self.table)?;
        let _writer = lock_writer(&self.path)?;
        self.reload(&mut table)?;
        let (outcome, undo) = table.merge_if_absent(records, sources);
        if outcome.inserted == 0 {
            return Ok(outcome);
        }
        if let Err(err) = save_snapshot(&self.path, &table) {
            table.rollback(undo);
            return Err(err);
        }
        Ok(outcome)
    }

    fn top_n(&self, year: i32, n: usize) -> Result<Vec<EntityYearRecord>, StoreError> {
        Ok(read_lock(&self.table)?.top_n(year, n))
    }

    fn count_for_year(&self, year: i32) -> Result<usize, StoreError> {
        Ok(read_lock(&self.table)?.count_for_year(year))
    }

    fn summaries(&self) -> Result<Vec<YearSummary>, StoreError> {
        Ok(read_lock(&self.table)?.summaries())
    }

    fn delete_year(&self, year: i32) -> Result<usize, StoreError> {
        let mut table = write_lock(&self.table)?;
        let _writer = lock_writer(&self.path)?;
        self.reload(&mut table)?;
        let Some(removed) = table.delete_year(year) else {
            return Ok(0);
        };
        let count = removed.records.len();
        if let Err(err) = save_snapshot(&self.path, &table) {
            table.years.insert(year, removed);
            return Err(err);
        }
        Ok(count)
    }
}

fn sibling_path(path: &Path, suffix: &str) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push(suffix);
    PathBuf::from(name)
}

/// Takes the exclusive writer lock for the snapshot at `path`. The lock is
/// released when the returned file is dropped.
fn lock_writer(path: &Path) -> Result<File, StoreError> {
    let file = OpenOptions::new()
        .create(true)
        .truncate(false)
        .write(true)
        .open(sibling_path(path, ".lock"))?;
    file.lock()?;
    Ok(file)
}

fn save_snapshot(path: &Path, table: &StoreTable) -> Result<(), StoreError> {
    let config = bincode::config::standard();
    let tmp = sibling_path(path, ".tmp");
    {
        let file = File::create(&tmp)?;
        let mut writer = BufWriter::new(file);
        bincode::serde::encode_into_std_write(SNAPSHOT_VERSION, &mut writer, config)?;
        bincode::serde::encode_into_std_write(table, &mut writer, config)?;
        writer.flush()?;
        writer.get_ref().sync_all()?;
    }
    fs::rename(&tmp, path)?;
    debug!("Persisted aggregate snapshot {:?}", path);
    Ok(())
}

fn load_snapshot(path: &Path) -> Result<StoreTable, StoreError> {
    let config = bincode::config::standard();
    let bytes = fs::read(path)?;
    let (version, consumed): (u32, usize) = bincode::serde::decode_from_slice(&bytes, config)?;
    if version != SNAPSHOT_VERSION {
        return Err(StoreError::UnsupportedVersion {
            found: version,
            expected: SNAPSHOT_VERSION,
        });
    }
    let (table, _): (StoreTable, usize) =
        bincode::serde::decode_from_slice(&bytes[consumed..], config)?;
    Ok(table)
}
