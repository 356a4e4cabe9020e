// src/process/reader.rs
use arrow::record_batch::RecordBatch;
use glob::{glob_with, MatchOptions, Pattern};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, instrument};

use super::spss::read_sav;
use super::stata::read_dta;
use super::utils::ReadError;
use super::version::{select_latest, version_from_filename, Version};
use super::xport::read_xpt;
use crate::catalog::Format;
use crate::error::{Error, ParseAttempt, Result};

pub type ReaderFn = fn(&[u8]) -> Result<RecordBatch, ReadError>;

pub fn reader_for(format: Format) -> ReaderFn {
    match format {
        Format::Stata => read_dta,
        Format::Spss => read_sav,
        Format::Sas => read_xpt,
    }
}

/// A data file turned into a table, with the reader that managed it.
#[derive(Debug)]
pub struct ParsedFile {
    pub path: PathBuf,
    pub version: Option<Version>,
    pub format: Format,
    pub batch: RecordBatch,
}

/// Every file below `dir` whose extension belongs to `format`, or to any known
/// format when none is given.
pub fn find_data_files(dir: &Path, format: Option<Format>) -> Result<Vec<PathBuf>> {
    let formats: &[Format] = match &format {
        Some(f) => std::slice::from_ref(f),
        None => &Format::PROBE_ORDER,
    };
    let options = MatchOptions {
        case_sensitive: false,
        ..MatchOptions::new()
    };
    let root = Pattern::escape(&dir.display().to_string());

    let mut files = Vec::new();
    for ext in formats.iter().flat_map(|f| f.extensions()) {
        let pattern = format!("{root}/**/*.{ext}");
        let entries = glob_with(&pattern, options).map_err(|e| {
            Error::io(dir, std::io::Error::new(std::io::ErrorKind::InvalidInput, e))
        })?;
        for entry in entries {
            let path = entry.map_err(|e| {
                let path = e.path().to_path_buf();
                Error::io(path, e.into_error())
            })?;
            if path.is_file() {
                files.push(path);
            }
        }
    }
    files.sort();
    files.dedup();
    Ok(files)
}

/// Parse one file. With an explicit format only that reader runs; otherwise the
/// readers are tried in probe order and the first success wins.
#[instrument(level = "debug", skip(path), fields(path = %path.display()))]
pub fn read_data_file(path: &Path, format: Option<Format>) -> Result<ParsedFile> {
    let bytes = fs::read(path).map_err(|e| Error::io(path, e))?;
    let candidates: Vec<Format> = match format {
        Some(f) => vec![f],
        None => Format::PROBE_ORDER.to_vec(),
    };

    let mut attempts = Vec::with_capacity(candidates.len());
    for candidate in candidates {
        match reader_for(candidate)(&bytes) {
            Ok(batch) => {
                let version = path
                    .file_name()
                    .and_then(|n| version_from_filename(&n.to_string_lossy()));
                return Ok(ParsedFile {
                    path: path.to_path_buf(),
                    version,
                    format: candidate,
                    batch,
                });
            }
            Err(e) => {
                debug!(format = %candidate, error = %e, "reader rejected file");
                attempts.push(ParseAttempt {
                    format: candidate,
                    reason: e.to_string(),
                });
            }
        }
    }
    Err(Error::Parse {
        path: path.to_path_buf(),
        attempts,
    })
}

/// Locate the most recent data file under `dir` and parse it.
#[instrument(level = "info", skip(dir), fields(dir = %dir.display()))]
pub fn read_latest(dir: &Path, format: Option<Format>) -> Result<ParsedFile> {
    let files = find_data_files(dir, format)?;
    let (path, version) = select_latest(files).ok_or_else(|| Error::NoDataFile {
        dir: dir.to_path_buf(),
        expected: format.map_or_else(|| "stata, spss or sas".to_string(), |f| f.to_string()),
    })?;
    let parsed = read_data_file(&path, format)?;
    info!(
        file = %path.display(),
        version = ?version,
        format = %parsed.format,
        rows = parsed.batch.num_rows(),
        columns = parsed.batch.num_columns(),
        "parsed data file"
    );
    Ok(parsed)
}
