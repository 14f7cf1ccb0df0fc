//! I/O utilities for reading census extracts.
//!
//! All source file access flows through this module. It provides:
//!
//! - **Encoding**: label resolution via `encoding_rs`; source bytes are
//!   transcoded to UTF-8 while streaming, malformed sequences become U+FFFD
//!   instead of failing the file.
//! - **Reader construction**: flexible `csv` readers so short rows reach the
//!   decoder instead of aborting the file.
//! - **Fingerprinting**: a SHA-256 digest computed over the raw bytes as they
//!   are read, so provenance costs no second pass over large files.

use std::{
    cell::RefCell,
    fs::File,
    io::{self, BufReader, Read},
    path::Path,
    rc::Rc,
};

use anyhow::{Context, Result, anyhow};
use encoding_rs::Encoding;
use encoding_rs_io::{DecodeReaderBytes, DecodeReaderBytesBuilder};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

pub const DEFAULT_SOURCE_DELIMITER: u8 = b';';
pub const DEFAULT_SOURCE_ENCODING: &str = "windows-1252";

pub type SourceReader = csv::Reader<DecodeReaderBytes<FingerprintReader<BufReader<File>>, Vec<u8>>>;

pub fn resolve_encoding(label: &str) -> Result<&'static Encoding> {
    Encoding::for_label(label.trim().as_bytes()).ok_or_else(|| anyhow!("Unknown encoding '{label}'"))
}

pub fn open_csv_reader<R>(reader: R, delimiter: u8) -> csv::Reader<R>
where
    R: Read,
{
    let mut builder = csv::ReaderBuilder::new();
    builder
        .has_headers(true)
        .delimiter(delimiter)
        .double_quote(true)
        .flexible(true);
    builder.from_reader(reader)
}

/// Opens a source extract for streaming. The returned [`Fingerprint`] handle
/// yields the digest of everything the reader consumed.
pub fn open_source_reader(
    path: &Path,
    delimiter: u8,
    encoding: &'static Encoding,
) -> Result<(SourceReader, Fingerprint)> {
    let file = File::open(path).with_context(|| format!("Opening source file {path:?}"))?;
    let fingerprint = Fingerprint::default();
    let hashed = FingerprintReader {
        inner: BufReader::new(file),
        state: Rc::clone(&fingerprint.state),
    };
    let decoded = DecodeReaderBytesBuilder::new()
        .encoding(Some(encoding))
        .build(hashed);
    Ok((open_csv_reader(decoded, delimiter), fingerprint))
}

/// Identity of one source file that contributed to a stored year.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceFingerprint {
    pub file_name: String,
    pub sha256: String,
    pub bytes: u64,
}

#[derive(Default)]
struct DigestState {
    hasher: Sha256,
    bytes: u64,
}

#[derive(Clone, Default)]
pub struct Fingerprint {
    state: Rc<RefCell<DigestState>>,
}

impl Fingerprint {
    pub fn finish(self, path: &Path) -> SourceFingerprint {
        let state = self.state.replace(DigestState::default());
        SourceFingerprint {
            file_name: path
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_else(|| path.display().to_string()),
            sha256: format!("{:x}", state.hasher.finalize()),
            bytes: state.bytes,
        }
    }
}

pub struct FingerprintReader<R> {
    inner: R,
    state: Rc<RefCell<DigestState>>,
}

impl<R: Read> Read for FingerprintReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let read = self.inner.read(buf)?;
        let mut state = self.state.borrow_mut();
        state.hasher.update(&buf[..read]);
        state.bytes += read as u64;
        Ok(read)
    }
}
