//! Header resolution against the candidate catalog.
//!
//! Resolution is a pure function of `(header, catalog)`: for each logical
//! field the first candidate name present in the trimmed header wins.

use std::collections::HashMap;

use crate::catalog::{CandidateCatalog, LogicalField};

/// Position of each logical field within one file's header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedMapping {
    columns: Vec<Option<ResolvedColumn>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedColumn {
    pub position: usize,
    pub source_name: String,
}

/// The header lacks one or more required fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaUnresolved {
    pub missing: Vec<LogicalField>,
    pub mapping: ResolvedMapping,
}

impl ResolvedMapping {
    /// Resolves every field, whether or not the required ones were found.
    pub fn build<S: AsRef<str>>(header: &[S], catalog: &CandidateCatalog) -> Self {
        let mut positions: HashMap<&str, usize> = HashMap::with_capacity(header.len());
        for (idx, name) in header.iter().enumerate() {
            // Duplicate header names resolve to their first occurrence.
            positions.entry(name.as_ref().trim()).or_insert(idx);
        }
        let columns = LogicalField::ALL
            .iter()
            .map(|field| {
                catalog.candidates(*field).iter().find_map(|candidate| {
                    positions
                        .get(candidate.as_str())
                        .map(|position| ResolvedColumn {
                            position: *position,
                            source_name: candidate.clone(),
                        })
                })
            })
            .collect();
        ResolvedMapping { columns }
    }

    /// Resolves the header and rejects it when a required field is absent.
    pub fn resolve<S: AsRef<str>>(
        header: &[S],
        catalog: &CandidateCatalog,
    ) -> Result<Self, SchemaUnresolved> {
        let mapping = Self::build(header, catalog);
        let missing = mapping.missing_required();
        if missing.is_empty() {
            Ok(mapping)
        } else {
            Err(SchemaUnresolved { missing, mapping })
        }
    }

    pub fn position(&self, field: LogicalField) -> Option<usize> {
        self.column(field).map(|column| column.position)
    }

    pub fn column(&self, field: LogicalField) -> Option<&ResolvedColumn> {
        self.columns.get(field.index()).and_then(Option::as_ref)
    }

    pub fn is_present(&self, field: LogicalField) -> bool {
        self.column(field).is_some()
    }

    pub fn missing_required(&self) -> Vec<LogicalField> {
        LogicalField::REQUIRED
            .iter()
            .copied()
            .filter(|field| !self.is_present(*field))
            .collect()
    }

    /// Iterates `(field, column)` pairs in logical field order.
    pub fn entries(&self) -> impl Iterator<Item = (LogicalField, Option<&ResolvedColumn>)> {
        LogicalField::ALL
            .iter()
            .map(move |field| (*field, self.column(*field)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn resolves_primary_candidates_by_position() {
        let catalog = CandidateCatalog::default();
        let mapping = ResolvedMapping::resolve(
            &header(&["NU_ANO_CENSO", "CO_UF", "NO_ENTIDADE", "CO_ENTIDADE", "QT_MAT_BAS"]),
            &catalog,
        )
        .unwrap();
        assert_eq!(mapping.position(LogicalField::EntityCode), Some(3));
        assert_eq!(mapping.position(LogicalField::EntityName), Some(2));
        assert_eq!(mapping.position(LogicalField::StateCode), Some(1));
        assert_eq!(mapping.position(LogicalField::CensusYear), Some(0));
        assert_eq!(mapping.position(LogicalField::BasicEnrollment), Some(4));
        assert_eq!(mapping.position(LogicalField::TotalEnrollment), None);
    }

    #[test]
    fn accepts_alternate_candidate_names() {
        let catalog = CandidateCatalog::default();
        let mapping = ResolvedMapping::resolve(
            &header(&["COD_ENTIDADE", "NO_ESCOLA", "CO_UF", "NU_MATRICULAS_BASICA"]),
            &catalog,
        )
        .unwrap();
        let code = mapping.column(LogicalField::EntityCode).unwrap();
        assert_eq!(code.position, 0);
        assert_eq!(code.source_name, "COD_ENTIDADE");
        assert_eq!(mapping.position(LogicalField::BasicEnrollment), Some(3));
    }

    #[test]
    fn earlier_candidate_wins_over_header_order() {
        let catalog = CandidateCatalog::default();
        let mapping = ResolvedMapping::build(
            &header(&["CO_ENTIDADE_MEC", "CO_ENTIDADE"]),
            &catalog,
        );
        assert_eq!(mapping.position(LogicalField::EntityCode), Some(1));
    }

    #[test]
    fn header_tokens_are_trimmed() {
        let catalog = CandidateCatalog::default();
        let mapping = ResolvedMapping::resolve(
            &header(&[" CO_ENTIDADE", "NO_ENTIDADE\t", "  CO_UF  "]),
            &catalog,
        )
        .unwrap();
        assert_eq!(mapping.position(LogicalField::StateCode), Some(2));
    }

    #[test]
    fn missing_required_fields_are_reported() {
        let catalog = CandidateCatalog::default();
        let err = ResolvedMapping::resolve(&header(&["CO_ENTIDADE", "QT_MAT_BAS"]), &catalog)
            .unwrap_err();
        assert_eq!(
            err.missing,
            vec![LogicalField::EntityName, LogicalField::StateCode]
        );
        assert!(err.mapping.is_present(LogicalField::BasicEnrollment));
    }
}
