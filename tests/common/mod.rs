#![allow(dead_code)]

use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

use censo_rank::config::PipelineConfig;
use encoding_rs::WINDOWS_1252;
use tempfile::{TempDir, tempdir};

/// Header of a recent release, in the order the extracts ship it.
pub const HEADER_2023: &str = "NU_ANO_CENSO;NO_REGIAO;CO_REGIAO;NO_UF;SG_UF;CO_UF;NO_MUNICIPIO;CO_MUNICIPIO;NO_ENTIDADE;CO_ENTIDADE;QT_MAT_BAS;QT_MAT_PROF;QT_MAT_EJA;QT_MAT_ESP;QT_MAT_FUND;QT_MAT_INF;QT_MAT_MED;QT_MAT_ZR_URB";

/// Scratch directory holding source extracts and the aggregate store.
pub struct TestWorkspace {
    temp_dir: TempDir,
}

impl TestWorkspace {
    pub fn new() -> Self {
        Self {
            temp_dir: tempdir().expect("temp dir"),
        }
    }

    pub fn path(&self) -> &Path {
        self.temp_dir.path()
    }

    pub fn store_path(&self) -> PathBuf {
        self.path().join("aggregate.store")
    }

    /// Writes `contents` encoded as windows-1252, like the census extracts.
    pub fn write_latin1(&self, name: &str, contents: &str) -> PathBuf {
        let (encoded, _, had_errors) = WINDOWS_1252.encode(contents);
        assert!(!had_errors, "fixture must be representable in windows-1252");
        self.write_bytes(name, &encoded)
    }

    pub fn write_bytes(&self, name: &str, contents: &[u8]) -> PathBuf {
        let path = self.path().join(name);
        let mut file = File::create(&path).expect("create temp file");
        file.write_all(contents).expect("write temp file contents");
        path
    }

    pub fn config(&self) -> PipelineConfig {
        PipelineConfig {
            source_dir: self.path().to_path_buf(),
            store_path: self.store_path(),
            ..PipelineConfig::default()
        }
    }
}

/// One data row matching [`HEADER_2023`].
pub fn row_2023(year: &str, code: &str, name: &str, uf: &str, basic: u64, fund: u64) -> String {
    format!(
        "{year};Sudeste;3;São Paulo;{uf};35;Campinas;3509502;{name};{code};{basic};0;0;0;{fund};0;0;{basic}"
    )
}

pub fn extract(header: &str, rows: &[String]) -> String {
    let mut contents = String::from(header);
    contents.push('\n');
    for row in rows {
        contents.push_str(row);
        contents.push('\n');
    }
    contents
}
