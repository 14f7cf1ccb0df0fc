//! Row decoding with tolerant coercion.
//!
//! A raw row plus the file's [`ResolvedMapping`] becomes a [`DecodedRow`], or
//! a [`RowSkip`] when the row cannot be attributed to an entity and year.
//! Numeric cells that are absent, empty, or malformed count as zero; string
//! cells that are absent count as empty.

use std::{collections::BTreeSet, fmt, str::FromStr};

use rust_decimal::{Decimal, prelude::ToPrimitive};

use crate::{
    catalog::LogicalField,
    record::{Enrollment, Geography},
    resolver::ResolvedMapping,
    years::SupportedYears,
};

/// Cell access over one raw row.
pub trait RowCells {
    fn cell(&self, idx: usize) -> Option<&str>;
}

impl RowCells for csv::StringRecord {
    fn cell(&self, idx: usize) -> Option<&str> {
        self.get(idx)
    }
}

impl<S: AsRef<str>> RowCells for [S] {
    fn cell(&self, idx: usize) -> Option<&str> {
        self.get(idx).map(AsRef::as_ref)
    }
}

impl<S: AsRef<str>> RowCells for Vec<S> {
    fn cell(&self, idx: usize) -> Option<&str> {
        self.as_slice().cell(idx)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RowSkip {
    MissingEntityCode,
    MissingYear,
    /// The row's state is not in the configured state filter.
    StateExcluded,
}

impl fmt::Display for RowSkip {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RowSkip::MissingEntityCode => f.write_str("missing entity code"),
            RowSkip::MissingYear => f.write_str("no usable census year"),
            RowSkip::StateExcluded => f.write_str("state outside the filter"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedRow {
    pub entity_code: String,
    pub census_year: i32,
    pub entity_name: String,
    pub geography: Geography,
    pub enrollment: Enrollment,
    /// Source total when the file carries a parseable one, else the category sum.
    pub total_enrollment: u64,
    pub total_from_source: bool,
}

pub struct RowDecoder<'a> {
    mapping: &'a ResolvedMapping,
    years: SupportedYears,
    file_year: Option<i32>,
    states: Option<&'a BTreeSet<u64>>,
}

impl<'a> RowDecoder<'a> {
    /// `file_year` is the year inferred from the file name, used whenever the
    /// row's own year cell is missing, malformed, or unsupported.
    pub fn new(mapping: &'a ResolvedMapping, years: SupportedYears, file_year: Option<i32>) -> Self {
        Self {
            mapping,
            years,
            file_year: file_year.filter(|year| years.contains(*year)),
            states: None,
        }
    }

    /// Restricts decoding to rows whose state code is in `states`.
    pub fn with_state_filter(mut self, states: Option<&'a BTreeSet<u64>>) -> Self {
        self.states = states;
        self
    }

    pub fn decode<R: RowCells + ?Sized>(&self, row: &R) -> Result<DecodedRow, RowSkip> {
        let entity_code = self.text(row, LogicalField::EntityCode);
        if entity_code.is_empty() {
            return Err(RowSkip::MissingEntityCode);
        }
        let census_year = self.census_year(row).ok_or(RowSkip::MissingYear)?;
        let state_code = self.count(row, LogicalField::StateCode);
        if self.states.is_some_and(|states| !states.contains(&state_code)) {
            return Err(RowSkip::StateExcluded);
        }

        let enrollment = Enrollment {
            basic: self.count(row, LogicalField::BasicEnrollment),
            professional: self.count(row, LogicalField::ProfessionalEnrollment),
            adult_education: self.count(row, LogicalField::AdultEducationEnrollment),
            special_needs: self.count(row, LogicalField::SpecialNeedsEnrollment),
            elementary: self.count(row, LogicalField::ElementaryEnrollment),
            preschool: self.count(row, LogicalField::PreschoolEnrollment),
            secondary: self.count(row, LogicalField::SecondaryEnrollment),
            zone_not_applicable: self.count(row, LogicalField::ZoneNotApplicableEnrollment),
            zone_rural: self.count(row, LogicalField::ZoneRuralEnrollment),
            zone_urban: self.count(row, LogicalField::ZoneUrbanEnrollment),
        };
        let source_total = self
            .raw(row, LogicalField::TotalEnrollment)
            .and_then(parse_count);
        let (total_enrollment, total_from_source) = match source_total {
            Some(total) => (total, true),
            None => (enrollment.category_sum(), false),
        };

        Ok(DecodedRow {
            entity_name: self.text(row, LogicalField::EntityName).to_string(),
            geography: Geography {
                state_code,
                state_name: self.text(row, LogicalField::StateName).to_string(),
                state_abbrev: self.text(row, LogicalField::StateAbbrev).to_string(),
                municipality_code: self.count(row, LogicalField::MunicipalityCode),
                municipality_name: self.text(row, LogicalField::MunicipalityName).to_string(),
                mesoregion_code: self.count(row, LogicalField::MesoregionCode),
                mesoregion_name: self.text(row, LogicalField::MesoregionName).to_string(),
                microregion_code: self.count(row, LogicalField::MicroregionCode),
                microregion_name: self.text(row, LogicalField::MicroregionName).to_string(),
                region_code: self.count(row, LogicalField::RegionCode),
                region_name: self.text(row, LogicalField::RegionName).to_string(),
            },
            entity_code: entity_code.to_string(),
            census_year,
            enrollment,
            total_enrollment,
            total_from_source,
        })
    }

    fn census_year<R: RowCells + ?Sized>(&self, row: &R) -> Option<i32> {
        self.raw(row, LogicalField::CensusYear)
            .and_then(|value| i32::from_str(value).ok())
            .filter(|year| self.years.contains(*year))
            .or(self.file_year)
    }

    /// Trimmed cell for `field`; `None` when the field is unmapped or the row
    /// is too short.
    fn raw<'r, R: RowCells + ?Sized>(&self, row: &'r R, field: LogicalField) -> Option<&'r str> {
        let position = self.mapping.position(field)?;
        row.cell(position).map(str::trim)
    }

    fn text<'r, R: RowCells + ?Sized>(&self, row: &'r R, field: LogicalField) -> &'r str {
        self.raw(row, field).unwrap_or("")
    }

    fn count<R: RowCells + ?Sized>(&self, row: &R, field: LogicalField) -> u64 {
        self.raw(row, field).and_then(parse_count).unwrap_or(0)
    }
}

/// Parses a non-negative count. Integers parse directly; decimal renderings
/// such as `"12.0"` truncate. Negative values clamp to zero. Empty or
/// non-numeric input yields `None`.
pub fn parse_count(value: &str) -> Option<u64> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }
    if let Ok(parsed) = value.parse::<u64>() {
        return Some(parsed);
    }
    if let Ok(parsed) = value.parse::<i64>() {
        return Some(parsed.max(0) as u64);
    }
    let decimal = Decimal::from_str(value).ok()?;
    if decimal.is_sign_negative() {
        return Some(0);
    }
    decimal.trunc().to_u64()
}
