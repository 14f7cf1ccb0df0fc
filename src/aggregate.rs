//! Per-run fan-in of decoded rows into one record per entity.
//!
//! An [`Aggregator`] is scoped to a single target year and owned by a single
//! ingestion run. Rows for other years are ignored. Memory grows with the
//! number of distinct entities, never with the number of rows.

use std::collections::{HashMap, hash_map::Entry};

use crate::{decoder::DecodedRow, record::EntityYearRecord};

#[derive(Debug, Clone)]
pub struct Aggregator {
    year: i32,
    entries: HashMap<String, EntityYearRecord>,
    /// Entity codes in first-seen order, so draining is deterministic.
    order: Vec<String>,
    rows_accepted: u64,
    rows_other_year: u64,
}

impl Aggregator {
    pub fn new(year: i32) -> Self {
        Self {
            year,
            entries: HashMap::new(),
            order: Vec::new(),
            rows_accepted: 0,
            rows_other_year: 0,
        }
    }

    pub fn year(&self) -> i32 {
        self.year
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn rows_accepted(&self) -> u64 {
        self.rows_accepted
    }

    pub fn rows_other_year(&self) -> u64 {
        self.rows_other_year
    }

    pub fn get(&self, entity_code: &str) -> Option<&EntityYearRecord> {
        self.entries.get(entity_code)
    }

    /// Folds one decoded row into its entity. Returns `false` when the row
    /// belongs to a different year and was ignored.
    ///
    /// Descriptive fields come from the first row seen for the entity. The
    /// total is always the running category sum, since a row-level source
    /// total cannot be combined consistently across rows.
    pub fn add(&mut self, row: DecodedRow) -> bool {
        if row.census_year != self.year {
            self.rows_other_year += 1;
            return false;
        }
        self.rows_accepted += 1;
        let record = match self.entries.entry(row.entity_code) {
            Entry::Occupied(slot) => slot.into_mut(),
            Entry::Vacant(slot) => {
                let code = slot.key().clone();
                self.order.push(code.clone());
                slot.insert(EntityYearRecord::new(
                    code,
                    row.census_year,
                    row.entity_name,
                    row.geography,
                ))
            }
        };
        record.enrollment.accumulate(&row.enrollment);
        record.total_enrollment = record.enrollment.category_sum();
        true
    }

    /// Merges an independently built aggregator for the same year, summing
    /// matching entities. Entities already present keep their descriptive
    /// fields.
    pub fn absorb(&mut self, other: Aggregator) {
        debug_assert_eq!(self.year, other.year, "absorbing aggregator for another year");
        self.rows_accepted += other.rows_accepted;
        self.rows_other_year += other.rows_other_year;
        let Aggregator {
            mut entries, order, ..
        } = other;
        for code in order {
            let Some(incoming) = entries.remove(&code) else {
                continue;
            };
            match self.entries.entry(code) {
                Entry::Occupied(slot) => {
                    let record = slot.into_mut();
                    record.enrollment.accumulate(&incoming.enrollment);
                    record.total_enrollment = record.enrollment.category_sum();
                }
                Entry::Vacant(slot) => {
                    self.order.push(slot.key().clone());
                    slot.insert(incoming);
                }
            }
        }
    }

    /// Consumes the aggregator, yielding finished records in first-seen order.
    pub fn into_records(self) -> Vec<EntityYearRecord> {
        let Aggregator {
            mut entries, order, ..
        } = self;
        order
            .into_iter()
            .filter_map(|code| entries.remove(&code))
            .collect()
    }
}
