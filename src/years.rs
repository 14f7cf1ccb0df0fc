//! Supported census years and year inference from source file names.

use std::{fmt, path::Path, sync::OnceLock};

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::PipelineError;

/// Number of consecutive census releases the pipeline accepts.
pub const SUPPORTED_SPAN: i32 = 3;

pub const DEFAULT_FIRST_YEAR: i32 = 2022;

/// A window of consecutive census years, `first..first + SUPPORTED_SPAN`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SupportedYears {
    first: i32,
}

impl Default for SupportedYears {
    fn default() -> Self {
        Self::starting_at(DEFAULT_FIRST_YEAR)
    }
}

impl SupportedYears {
    pub fn starting_at(first: i32) -> Self {
        Self { first }
    }

    pub fn first(&self) -> i32 {
        self.first
    }

    pub fn last(&self) -> i32 {
        self.first + SUPPORTED_SPAN - 1
    }

    pub fn contains(&self, year: i32) -> bool {
        (self.first..=self.last()).contains(&year)
    }

    pub fn iter(self) -> impl Iterator<Item = i32> {
        self.first..=self.last()
    }

    /// Rejects `year` unless it lies in the window.
    pub fn check(self, year: i32) -> Result<(), PipelineError> {
        if self.contains(year) {
            Ok(())
        } else {
            Err(PipelineError::UnsupportedYear {
                year,
                supported: self,
            })
        }
    }

    /// Finds the first standalone four-digit token in the file name that is a
    /// supported year. Digits embedded in longer numbers do not count.
    pub fn infer_from_path(&self, path: &Path) -> Option<i32> {
        let name = path.file_name()?.to_string_lossy();
        digit_run_pattern()
            .find_iter(&name)
            .filter(|run| run.len() == 4)
            .filter_map(|run| run.as_str().parse::<i32>().ok())
            .find(|year| self.contains(*year))
    }
}

impl fmt::Display for SupportedYears {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.first, self.last())
    }
}

fn digit_run_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"[0-9]+").expect("digit run pattern is valid"))
}
