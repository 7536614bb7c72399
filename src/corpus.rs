//! Line-delimited JSON corpus reading.
//!
//! Malformed lines (invalid JSON, or records that do not fit the expected
//! shape) are logged and skipped; they never abort a scan. Errors returned
//! by the per-record callback do abort it.

use crate::error::{MergeError, Result};
use crate::predicate::PredicateSet;
use crate::record::PrimaryEntry;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Line counters for one or more scanned files
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScanStats {
    /// Records handed to the callback
    pub records: u64,
    /// Lines skipped as unparseable
    pub malformed: u64,
    /// Well-formed records rejected by a predicate filter
    pub filtered: u64,
}

impl ScanStats {
    pub fn absorb(&mut self, other: ScanStats) {
        self.records += other.records;
        self.malformed += other.malformed;
        self.filtered += other.filtered;
    }
}

/// Resolve an input path to the files to read.
///
/// A file is returned as-is; a directory yields its regular, non-hidden
/// files sorted by name.
pub fn input_files(path: &Path) -> Result<Vec<PathBuf>> {
    if path.is_file() {
        return Ok(vec![path.to_path_buf()]);
    }
    if !path.is_dir() {
        return Err(MergeError::Config(format!(
            "Input path does not exist: {}",
            path.display()
        )));
    }

    let mut files = Vec::new();
    for entry in std::fs::read_dir(path)? {
        let entry = entry?;
        let hidden = entry.file_name().to_string_lossy().starts_with('.');
        if entry.file_type()?.is_file() && !hidden {
            files.push(entry.path());
        }
    }
    files.sort();
    Ok(files)
}

/// Scan one JSONL file, calling `f` for every line that parses as `T`.
pub fn scan_records<T, F>(path: &Path, mut f: F) -> Result<ScanStats>
where
    T: DeserializeOwned,
    F: FnMut(T) -> Result<()>,
{
    scan_values(path, |value, stats, line_no| {
        match serde_json::from_value::<T>(value) {
            Ok(record) => {
                stats.records += 1;
                f(record)
            }
            Err(e) => {
                warn!(file = %path.display(), line = line_no, error = %e, "Skipping malformed record");
                stats.malformed += 1;
                Ok(())
            }
        }
    })
}

fn scan_values<F>(path: &Path, mut f: F) -> Result<ScanStats>
where
    F: FnMut(Value, &mut ScanStats, u64) -> Result<()>,
{
    let mut reader = BufReader::new(File::open(path)?);
    let mut stats = ScanStats::default();
    let mut buf = Vec::new();
    let mut line_no = 0u64;

    loop {
        buf.clear();
        if reader.read_until(b'\n', &mut buf)? == 0 {
            break;
        }
        line_no += 1;
        if buf.iter().all(u8::is_ascii_whitespace) {
            continue;
        }
        // invalid UTF-8 surfaces here as a parse error, not an I/O error
        match serde_json::from_slice::<Value>(&buf) {
            Ok(value) => f(value, &mut stats, line_no)?,
            Err(e) => {
                warn!(file = %path.display(), line = line_no, error = %e, "Skipping malformed line");
                stats.malformed += 1;
            }
        }
    }

    debug!(file = %path.display(), records = stats.records, malformed = stats.malformed, "Scanned file");
    Ok(stats)
}

/// The primary corpus: an ordered list of JSONL files plus an entry filter.
///
/// The DOI pre-pass and the merge both scan through this type, so they see
/// the same entries in the same order.
#[derive(Debug, Clone)]
pub struct PrimaryCorpus {
    files: Vec<PathBuf>,
    filter: PredicateSet,
}

impl PrimaryCorpus {
    pub fn open(path: &Path, filter: PredicateSet) -> Result<Self> {
        let files = input_files(path)?;
        if files.is_empty() {
            return Err(MergeError::Config(format!(
                "No primary corpus files under {}",
                path.display()
            )));
        }
        info!(files = files.len(), filter = %filter, "Primary corpus opened");
        Ok(Self { files, filter })
    }

    pub fn files(&self) -> &[PathBuf] {
        &self.files
    }

    /// Stream every accepted entry, in file order then line order.
    pub fn scan<F>(&self, mut f: F) -> Result<ScanStats>
    where
        F: FnMut(PrimaryEntry) -> Result<()>,
    {
        let mut total = ScanStats::default();
        for path in &self.files {
            info!(file = %path.display(), "Reading primary batch");
            let stats = scan_values(path, |value, stats, line_no| {
                if !self.filter.accepts(&value) {
                    stats.filtered += 1;
                    return Ok(());
                }
                match serde_json::from_value::<PrimaryEntry>(value) {
                    Ok(entry) => {
                        stats.records += 1;
                        f(entry)
                    }
                    Err(e) => {
                        warn!(file = %path.display(), line = line_no, error = %e, "Skipping broken entry");
                        stats.malformed += 1;
                        Ok(())
                    }
                }
            })?;
            total.absorb(stats);
        }
        Ok(total)
    }
}
