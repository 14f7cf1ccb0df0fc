//! Candidate column catalog.
//!
//! Census releases rename and reorder their columns from year to year. The
//! catalog lists, for every logical field the pipeline understands, the source
//! header names that may carry it, in priority order. The built-in catalog
//! covers the known releases; a YAML file can override the list for any field
//! without touching code:
//!
//! ```yaml
//! fields:
//!   entity_code: [CO_ENTIDADE, CO_ESCOLA]
//!   total_enrollment: [QT_MAT_TOTAL]
//! ```

use std::{collections::BTreeMap, fmt, path::Path, str::FromStr};

use anyhow::{Context, Result, anyhow, bail};
use serde::{Deserialize, Serialize};

macro_rules! logical_fields {
    ($($variant:ident => $name:literal),+ $(,)?) => {
        /// Canonical attribute names, independent of any source file's headers.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(rename_all = "snake_case")]
        pub enum LogicalField {
            $($variant),+
        }

        impl LogicalField {
            pub const ALL: &'static [LogicalField] = &[$(LogicalField::$variant),+];

            pub fn as_str(self) -> &'static str {
                match self {
                    $(LogicalField::$variant => $name),+
                }
            }
        }

        impl FromStr for LogicalField {
            type Err = anyhow::Error;

            fn from_str(value: &str) -> Result<Self> {
                match value.trim() {
                    $($name => Ok(LogicalField::$variant),)+
                    other => Err(anyhow!("Unknown logical field '{other}'")),
                }
            }
        }
    };
}

logical_fields! {
    EntityCode => "entity_code",
    EntityName => "entity_name",
    StateCode => "state_code",
    StateName => "state_name",
    StateAbbrev => "state_abbrev",
    MunicipalityCode => "municipality_code",
    MunicipalityName => "municipality_name",
    MesoregionCode => "mesoregion_code",
    MesoregionName => "mesoregion_name",
    MicroregionCode => "microregion_code",
    MicroregionName => "microregion_name",
    RegionCode => "region_code",
    RegionName => "region_name",
    CensusYear => "census_year",
    BasicEnrollment => "basic_enrollment",
    ProfessionalEnrollment => "professional_enrollment",
    AdultEducationEnrollment => "adult_education_enrollment",
    SpecialNeedsEnrollment => "special_needs_enrollment",
    ElementaryEnrollment => "elementary_enrollment",
    PreschoolEnrollment => "preschool_enrollment",
    SecondaryEnrollment => "secondary_enrollment",
    ZoneNotApplicableEnrollment => "zone_not_applicable_enrollment",
    ZoneRuralEnrollment => "zone_rural_enrollment",
    ZoneUrbanEnrollment => "zone_urban_enrollment",
    TotalEnrollment => "total_enrollment",
}

impl LogicalField {
    /// Fields whose absence makes a file unusable.
    pub const REQUIRED: &'static [LogicalField] = &[
        LogicalField::EntityCode,
        LogicalField::EntityName,
        LogicalField::StateCode,
    ];

    pub fn is_required(self) -> bool {
        Self::REQUIRED.contains(&self)
    }

    pub(crate) fn index(self) -> usize {
        self as usize
    }
}

impl fmt::Display for LogicalField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidateCatalog {
    fields: BTreeMap<LogicalField, Vec<String>>,
}

#[derive(Debug, Default, Deserialize)]
struct CatalogOverrides {
    #[serde(default)]
    fields: BTreeMap<LogicalField, Vec<String>>,
}

impl Default for CandidateCatalog {
    fn default() -> Self {
        use LogicalField::*;
        let defaults: &[(LogicalField, &[&str])] = &[
            (
                EntityCode,
                &[
                    "CO_ENTIDADE",
                    "CO_ENTIDADE_ESCOLA",
                    "CO_ENTIDADE_MEC",
                    "COD_ENTIDADE",
                    "CO_ENTIDADE_ENSINO",
                    "CO_ENTIDADE_CURSO",
                ],
            ),
            (EntityName, &["NO_ENTIDADE", "NO_ESCOLA", "NOME_ENTIDADE"]),
            (StateCode, &["CO_UF"]),
            (StateName, &["NO_UF"]),
            (StateAbbrev, &["SG_UF"]),
            (MunicipalityCode, &["CO_MUNICIPIO"]),
            (MunicipalityName, &["NO_MUNICIPIO"]),
            (MesoregionCode, &["CO_MESORREGIAO"]),
            (MesoregionName, &["NO_MESORREGIAO"]),
            (MicroregionCode, &["CO_MICRORREGIAO"]),
            (MicroregionName, &["NO_MICRORREGIAO"]),
            (RegionCode, &["CO_REGIAO"]),
            (RegionName, &["NO_REGIAO"]),
            (CensusYear, &["NU_ANO_CENSO", "NU_ANO"]),
            (
                BasicEnrollment,
                &["QT_MAT_BAS", "NU_MATRICULAS_BASICA", "QT_MATRICULAS_BAS"],
            ),
            (ProfessionalEnrollment, &["QT_MAT_PROF", "NU_MATRICULAS_PROF"]),
            (AdultEducationEnrollment, &["QT_MAT_EJA", "NU_MATRICULAS_EJA"]),
            (SpecialNeedsEnrollment, &["QT_MAT_ESP", "NU_MATRICULAS_ESP"]),
            (ElementaryEnrollment, &["QT_MAT_FUND", "NU_MATRICULAS_FUND"]),
            (PreschoolEnrollment, &["QT_MAT_INF", "NU_MATRICULAS_INF"]),
            (SecondaryEnrollment, &["QT_MAT_MED", "NU_MATRICULAS_MED"]),
            (ZoneNotApplicableEnrollment, &["QT_MAT_ZR_NA"]),
            (ZoneRuralEnrollment, &["QT_MAT_ZR_RUR"]),
            (ZoneUrbanEnrollment, &["QT_MAT_ZR_URB"]),
            (TotalEnrollment, &["QT_MAT_TOTAL", "NU_MATRICULAS_TOTAL"]),
        ];
        let fields = defaults
            .iter()
            .map(|(field, names)| (*field, names.iter().map(|n| n.to_string()).collect()))
            .collect();
        CandidateCatalog { fields }
    }
}

impl CandidateCatalog {
    /// Candidate header names for `field`, highest priority first.
    pub fn candidates(&self, field: LogicalField) -> &[String] {
        self.fields.get(&field).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Replaces the candidate list of every field named in `overrides`.
    pub fn with_overrides(
        mut self,
        overrides: impl IntoIterator<Item = (LogicalField, Vec<String>)>,
    ) -> Result<Self> {
        for (field, names) in overrides {
            let cleaned = names
                .into_iter()
                .map(|name| name.trim().to_string())
                .filter(|name| !name.is_empty())
                .collect::<Vec<_>>();
            if cleaned.is_empty() && field.is_required() {
                bail!("Required field '{field}' must keep at least one candidate column");
            }
            self.fields.insert(field, cleaned);
        }
        Ok(self)
    }

    /// Loads a YAML override file on top of the built-in catalog.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Opening catalog file {path:?}"))?;
        Self::from_yaml_str(&raw).with_context(|| format!("Parsing catalog file {path:?}"))
    }

    pub fn from_yaml_str(raw: &str) -> Result<Self> {
        let overrides: CatalogOverrides = if raw.trim().is_empty() {
            CatalogOverrides::default()
        } else {
            serde_yaml::from_str(raw)?
        };
        CandidateCatalog::default().with_overrides(overrides.fields)
    }

    pub fn to_yaml_string(&self) -> Result<String> {
        serde_yaml::to_string(self).context("Serializing candidate catalog")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_catalog_covers_every_field() {
        let catalog = CandidateCatalog::default();
        for field in LogicalField::ALL {
            assert!(
                !catalog.candidates(*field).is_empty(),
                "{field} has no candidates"
            );
        }
        assert_eq!(catalog.candidates(LogicalField::EntityCode)[0], "CO_ENTIDADE");
    }

    #[test]
    fn field_names_round_trip_through_from_str() {
        for field in LogicalField::ALL {
            assert_eq!(field.as_str().parse::<LogicalField>().unwrap(), *field);
        }
        assert!("qt_mat_bas".parse::<LogicalField>().is_err());
    }

    #[test]
    fn yaml_overrides_replace_only_named_fields() {
        let catalog = CandidateCatalog::from_yaml_str(
            "fields:\n  entity_code: [CO_ESCOLA, ' CO_ENTIDADE ']\n",
        )
        .unwrap();
        assert_eq!(
            catalog.candidates(LogicalField::EntityCode),
            &["CO_ESCOLA".to_string(), "CO_ENTIDADE".to_string()]
        );
        assert_eq!(
            catalog.candidates(LogicalField::StateCode),
            &["CO_UF".to_string()]
        );
    }

    #[test]
    fn required_field_cannot_be_emptied() {
        let err = CandidateCatalog::from_yaml_str("fields:\n  state_code: []\n").unwrap_err();
        assert!(err.to_string().contains("state_code"));
    }

    #[test]
    fn optional_field_may_be_disabled() {
        let catalog =
            CandidateCatalog::from_yaml_str("fields:\n  total_enrollment: []\n").unwrap();
        assert!(catalog.candidates(LogicalField::TotalEnrollment).is_empty());
    }

    #[test]
    fn dumped_yaml_loads_back_unchanged() {
        let catalog = CandidateCatalog::default();
        let yaml = catalog.to_yaml_string().unwrap();
        assert_eq!(CandidateCatalog::from_yaml_str(&yaml).unwrap(), catalog);
    }
}
