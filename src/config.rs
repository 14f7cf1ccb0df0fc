//! Pipeline configuration.
//!
//! Values come from an optional YAML file; command-line flags override them.
//! Every field has a default, so an empty file (or none) is a valid config.

use std::{
    collections::BTreeSet,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result, anyhow, bail};
use encoding_rs::Encoding;
use glob::Pattern;
use serde::{Deserialize, Serialize};

use crate::{
    catalog::CandidateCatalog,
    io_utils::{self, DEFAULT_SOURCE_DELIMITER, DEFAULT_SOURCE_ENCODING},
    years::{DEFAULT_FIRST_YEAR, SupportedYears},
};

pub const DEFAULT_FILE_PATTERN: &str = "microdados_ed_basica_*.csv";
pub const DEFAULT_STORE_PATH: &str = "censo-rank.store";
pub const DEFAULT_RANKING_SIZE: usize = 10;

/// IBGE state codes of the Nordeste region (MA, PI, CE, RN, PB, PE, AL, SE, BA).
pub const NORDESTE_STATE_CODES: &[u64] = &[21, 22, 23, 24, 25, 26, 27, 28, 29];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PipelineConfig {
    pub source_dir: PathBuf,
    pub file_pattern: String,
    pub delimiter: char,
    pub encoding: String,
    pub store_path: PathBuf,
    pub catalog_path: Option<PathBuf>,
    pub first_year: i32,
    pub ranking_size: usize,
    /// Only rows whose state code is listed are aggregated; empty keeps all.
    pub state_codes: Vec<u64>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            source_dir: PathBuf::from("."),
            file_pattern: DEFAULT_FILE_PATTERN.to_string(),
            delimiter: DEFAULT_SOURCE_DELIMITER as char,
            encoding: DEFAULT_SOURCE_ENCODING.to_string(),
            store_path: PathBuf::from(DEFAULT_STORE_PATH),
            catalog_path: None,
            first_year: DEFAULT_FIRST_YEAR,
            ranking_size: DEFAULT_RANKING_SIZE,
            state_codes: Vec::new(),
        }
    }
}

impl PipelineConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Opening config file {path:?}"))?;
        if raw.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(&raw).with_context(|| format!("Parsing config file {path:?}"))
    }

    pub fn years(&self) -> SupportedYears {
        SupportedYears::starting_at(self.first_year)
    }

    pub fn delimiter_byte(&self) -> Result<u8> {
        if !self.delimiter.is_ascii() {
            bail!("Delimiter must be ASCII, got '{}'", self.delimiter);
        }
        Ok(self.delimiter as u8)
    }

    pub fn encoding(&self) -> Result<&'static Encoding> {
        io_utils::resolve_encoding(&self.encoding)
    }

    pub fn file_matcher(&self) -> Result<Pattern> {
        let trimmed = self.file_pattern.trim();
        if trimmed.is_empty() {
            bail!("File pattern cannot be empty");
        }
        Pattern::new(trimmed).map_err(|err| anyhow!("Invalid file pattern '{trimmed}': {err}"))
    }

    /// The state-code filter, or `None` when every state is kept.
    pub fn state_filter(&self) -> Option<BTreeSet<u64>> {
        if self.state_codes.is_empty() {
            None
        } else {
            Some(self.state_codes.iter().copied().collect())
        }
    }

    pub fn catalog(&self) -> Result<CandidateCatalog> {
        match &self.catalog_path {
            Some(path) => CandidateCatalog::load(path),
            None => Ok(CandidateCatalog::default()),
        }
    }

    /// Checks every derived setting up front so ingestion cannot fail halfway
    /// on a configuration problem.
    pub fn validate(&self) -> Result<()> {
        self.delimiter_byte()?;
        self.encoding()?;
        self.file_matcher()?;
        if self.ranking_size == 0 {
            bail!("ranking_size must be at least 1");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_census_extracts() {
        let config = PipelineConfig::default();
        assert_eq!(config.delimiter_byte().unwrap(), b';');
        assert_eq!(config.encoding().unwrap(), encoding_rs::WINDOWS_1252);
        assert_eq!(config.years().to_string(), "2022-2024");
        config.validate().unwrap();
    }

    #[test]
    fn partial_yaml_keeps_remaining_defaults() {
        let config: PipelineConfig =
            serde_yaml::from_str("source_dir: /data/censo\nfirst_year: 2021\n").unwrap();
        assert_eq!(config.source_dir, PathBuf::from("/data/censo"));
        assert_eq!(config.years().last(), 2023);
        assert_eq!(config.file_pattern, DEFAULT_FILE_PATTERN);
    }

    #[test]
    fn unknown_keys_are_rejected() {
        assert!(serde_yaml::from_str::<PipelineConfig>("sep: ','\n").is_err());
    }

    #[test]
    fn glob_pattern_matches_file_names() {
        let pattern = PipelineConfig::default().file_matcher().unwrap();
        assert!(pattern.matches("microdados_ed_basica_2023.csv"));
        assert!(!pattern.matches("microdados_ed_basica_2023.csv.bak"));
        assert!(!pattern.matches("microdados_ed_basicaX2023.txt"));

        let single = PipelineConfig {
            file_pattern: "extract_202?.csv".to_string(),
            ..PipelineConfig::default()
        }
        .file_matcher()
        .unwrap();
        assert!(single.matches("extract_2024.csv"));
        assert!(!single.matches("extract_20245.csv"));
    }

    #[test]
    fn state_codes_become_a_filter() {
        assert_eq!(PipelineConfig::default().state_filter(), None);
        let config: PipelineConfig = serde_yaml::from_str("state_codes: [29, 21, 29]\n").unwrap();
        let filter = config.state_filter().unwrap();
        assert_eq!(filter.into_iter().collect::<Vec<_>>(), vec![21, 29]);
    }

    #[test]
    fn invalid_settings_fail_validation() {
        let config = PipelineConfig {
            encoding: "nope".to_string(),
            ..PipelineConfig::default()
        };
        assert!(config.validate().is_err());

        let config = PipelineConfig {
            delimiter: 'ç',
            ..PipelineConfig::default()
        };
        assert!(config.validate().is_err());

        for pattern in ["  ", "microdados_[.csv"] {
            let config = PipelineConfig {
                file_pattern: pattern.to_string(),
                ..PipelineConfig::default()
            };
            assert!(config.validate().is_err(), "{pattern:?} should be rejected");
        }
    }
}
