//! Aggregate record types.

use serde::{Deserialize, Serialize};

/// Enrollment counts carried by one row or accumulated for one entity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Enrollment {
    pub basic: u64,
    pub professional: u64,
    pub adult_education: u64,
    pub special_needs: u64,
    pub elementary: u64,
    pub preschool: u64,
    pub secondary: u64,
    pub zone_not_applicable: u64,
    pub zone_rural: u64,
    pub zone_urban: u64,
}

impl Enrollment {
    /// Sum of the enrollment categories that make up the total. The zone
    /// splits partition the same students by location and are left out.
    pub fn category_sum(&self) -> u64 {
        [
            self.basic,
            self.professional,
            self.adult_education,
            self.special_needs,
            self.elementary,
            self.preschool,
            self.secondary,
        ]
        .iter()
        .fold(0u64, |acc, value| acc.saturating_add(*value))
    }

    pub fn accumulate(&mut self, other: &Enrollment) {
        self.basic = self.basic.saturating_add(other.basic);
        self.professional = self.professional.saturating_add(other.professional);
        self.adult_education = self.adult_education.saturating_add(other.adult_education);
        self.special_needs = self.special_needs.saturating_add(other.special_needs);
        self.elementary = self.elementary.saturating_add(other.elementary);
        self.preschool = self.preschool.saturating_add(other.preschool);
        self.secondary = self.secondary.saturating_add(other.secondary);
        self.zone_not_applicable = self
            .zone_not_applicable
            .saturating_add(other.zone_not_applicable);
        self.zone_rural = self.zone_rural.saturating_add(other.zone_rural);
        self.zone_urban = self.zone_urban.saturating_add(other.zone_urban);
    }
}

/// Geographic descriptors of an entity, as reported by the source.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Geography {
    pub state_code: u64,
    pub state_name: String,
    pub state_abbrev: String,
    pub municipality_code: u64,
    pub municipality_name: String,
    pub mesoregion_code: u64,
    pub mesoregion_name: String,
    pub microregion_code: u64,
    pub microregion_name: String,
    pub region_code: u64,
    pub region_name: String,
}

/// One row of the aggregate store, keyed by `(entity_code, census_year)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityYearRecord {
    pub entity_code: String,
    pub census_year: i32,
    pub entity_name: String,
    pub geography: Geography,
    pub enrollment: Enrollment,
    pub total_enrollment: u64,
}

impl EntityYearRecord {
    pub fn new(
        entity_code: impl Into<String>,
        census_year: i32,
        entity_name: impl Into<String>,
        geography: Geography,
    ) -> Self {
        Self {
            entity_code: entity_code.into(),
            census_year,
            entity_name: entity_name.into(),
            geography,
            enrollment: Enrollment::default(),
            total_enrollment: 0,
        }
    }

    pub fn key(&self) -> (&str, i32) {
        (self.entity_code.as_str(), self.census_year)
    }
}

/// A stored record with its 1-based position in the year's ordering.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RankedEntry {
    pub rank: usize,
    #[serde(flatten)]
    pub record: EntityYearRecord,
}

/// Assigns contiguous 1-based ranks in the order given.
pub fn assign_ranks(records: Vec<EntityYearRecord>) -> Vec<RankedEntry> {
    records
        .into_iter()
        .enumerate()
        .map(|(idx, record)| RankedEntry {
            rank: idx + 1,
            record,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn category_sum_excludes_zone_splits() {
        let enrollment = Enrollment {
            basic: 10,
            professional: 2,
            adult_education: 3,
            special_needs: 1,
            elementary: 4,
            preschool: 5,
            secondary: 6,
            zone_not_applicable: 100,
            zone_rural: 100,
            zone_urban: 100,
        };
        assert_eq!(enrollment.category_sum(), 31);
    }

    #[test]
    fn ranks_start_at_one_and_are_contiguous() {
        let records = (0..3)
            .map(|i| EntityYearRecord::new(format!("E{i}"), 2023, "x", Geography::default()))
            .collect();
        let ranked = assign_ranks(records);
        assert_eq!(
            ranked.iter().map(|entry| entry.rank).collect::<Vec<_>>(),
            vec![1, 2, 3]
        );
    }

    #[test]
    fn ranked_entry_serializes_flat() {
        let mut record = EntityYearRecord::new("123", 2024, "Escola", Geography::default());
        record.total_enrollment = 7;
        let entry = RankedEntry { rank: 1, record };
        let json = serde_json::to_value(&entry).unwrap();
        assert_eq!(json["rank"], 1);
        assert_eq!(json["entity_code"], "123");
        assert_eq!(json["total_enrollment"], 7);
    }
}
