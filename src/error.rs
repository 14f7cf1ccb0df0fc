use std::path::PathBuf;

use itertools::Itertools;
use thiserror::Error;

use crate::{catalog::LogicalField, years::SupportedYears};

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Census year {year} is not supported (expected {supported})")]
    UnsupportedYear { year: i32, supported: SupportedYears },
    #[error("Required column(s) {} not found in header of {path:?}", join_fields(.missing))]
    SchemaUnresolved {
        path: PathBuf,
        missing: Vec<LogicalField>,
    },
    #[error("No source files matching '{pattern}' in {dir:?}")]
    SourceUnavailable { dir: PathBuf, pattern: String },
    #[error("Aggregate store rejected the write")]
    StoreWrite(#[source] StoreError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Aggregate store I/O failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("Encoding aggregate snapshot failed: {0}")]
    Encode(#[from] bincode::error::EncodeError),
    #[error("Decoding aggregate snapshot failed: {0}")]
    Decode(#[from] bincode::error::DecodeError),
    #[error("Unsupported aggregate snapshot version {found} (expected {expected})")]
    UnsupportedVersion { found: u32, expected: u32 },
    #[error("Aggregate store lock poisoned")]
    Poisoned,
}

fn join_fields(fields: &[LogicalField]) -> String {
    fields.iter().join(", ")
}
