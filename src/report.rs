//! Conflict statistics accumulated over a merge run.
//!
//! Disagreements between the graph corpus and the primary corpus are not
//! errors; they are counted here and, for DOIs, listed for manual review.

use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::fmt::Write as _;
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;
use tracing::info;

/// Plain-text summary file name
pub const SUMMARY_FILE: &str = "merge-output.txt";

/// DOI conflict table file name
pub const DOI_CHECKUP_FILE: &str = "doi_checkup.json";

/// One record whose graph DOI and primary DOI disagree
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DoiConflict {
    pub graph_doi: String,
    pub primary_doi: String,
    pub graph_title: Option<String>,
    pub primary_title: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConflictReport {
    pub doi_conflicts: u64,
    pub author_conflicts: u64,
    pub publisher_conflicts: u64,
    pub citation_conflicts: u64,
    pub doi_checkup: Vec<DoiConflict>,

    pub records: u64,
    pub filtered: u64,
    pub malformed: u64,
    pub external_texts: u64,
    pub ambiguous_texts: u64,
    pub window_loads: u64,
}

impl ConflictReport {
    pub fn record_doi_conflict(&mut self, conflict: DoiConflict) {
        self.doi_conflicts += 1;
        self.doi_checkup.push(conflict);
    }

    /// Fold another report (e.g. from a separate shard) into this one.
    pub fn absorb(&mut self, other: ConflictReport) {
        self.doi_conflicts += other.doi_conflicts;
        self.author_conflicts += other.author_conflicts;
        self.publisher_conflicts += other.publisher_conflicts;
        self.citation_conflicts += other.citation_conflicts;
        self.doi_checkup.extend(other.doi_checkup);
        self.records += other.records;
        self.filtered += other.filtered;
        self.malformed += other.malformed;
        self.external_texts += other.external_texts;
        self.ambiguous_texts += other.ambiguous_texts;
        self.window_loads += other.window_loads;
    }

    pub fn summary(&self) -> String {
        let mut out = String::from("Merging successful.\n");
        let lines = [
            ("Number of DOI conflicts", self.doi_conflicts),
            ("Number of clear author conflicts", self.author_conflicts),
            ("Number of publisher conflicts", self.publisher_conflicts),
            ("Number of citation count conflicts", self.citation_conflicts),
            ("Records merged", self.records),
            ("Entries filtered out", self.filtered),
            ("Malformed lines skipped", self.malformed),
            ("Full texts from extraction table", self.external_texts),
            ("Ambiguous extraction rows (primary text kept)", self.ambiguous_texts),
            ("Full-text windows loaded", self.window_loads),
        ];
        for (label, value) in lines {
            let _ = writeln!(out, "{}: {}", label, value);
        }
        out
    }

    /// Write `merge-output.txt` and `doi_checkup.json` into `dir`.
    pub fn write(&self, dir: &Path) -> Result<()> {
        std::fs::write(dir.join(SUMMARY_FILE), self.summary())?;

        let mut writer = BufWriter::new(File::create(dir.join(DOI_CHECKUP_FILE))?);
        serde_json::to_writer_pretty(&mut writer, &self.doi_checkup)?;
        writer.flush()?;

        info!(
            doi_conflicts = self.doi_conflicts,
            author_conflicts = self.author_conflicts,
            publisher_conflicts = self.publisher_conflicts,
            citation_conflicts = self.citation_conflicts,
            dir = %dir.display(),
            "Conflict report written"
        );
        Ok(())
    }
}

/// Read a `doi_checkup.json` written by a previous run.
pub fn load_doi_checkup(path: &Path) -> Result<Vec<DoiConflict>> {
    Ok(serde_json::from_reader(BufReader::new(File::open(path)?))?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn conflict(n: u32) -> DoiConflict {
        DoiConflict {
            graph_doi: format!("10.1/g{}", n),
            primary_doi: format!("10.1/p{}", n),
            graph_title: Some("Graph title".to_string()),
            primary_title: None,
        }
    }

    #[test]
    fn test_absorb_sums_counters() {
        let mut a = ConflictReport::default();
        a.record_doi_conflict(conflict(1));
        a.author_conflicts = 2;

        let mut b = ConflictReport::default();
        b.record_doi_conflict(conflict(2));
        b.citation_conflicts = 1;
        b.records = 5;

        a.absorb(b);
        assert_eq!(a.doi_conflicts, 2);
        assert_eq!(a.author_conflicts, 2);
        assert_eq!(a.citation_conflicts, 1);
        assert_eq!(a.records, 5);
        assert_eq!(a.doi_checkup.len(), 2);
    }

    #[test]
    fn test_write_and_reload() -> Result<()> {
        let dir = TempDir::new()?;
        let mut report = ConflictReport::default();
        report.record_doi_conflict(conflict(7));
        report.publisher_conflicts = 3;
        report.write(dir.path())?;

        let summary = std::fs::read_to_string(dir.path().join(SUMMARY_FILE))?;
        assert!(summary.starts_with("Merging successful.\n"));
        assert!(summary.contains("Number of DOI conflicts: 1\n"));
        assert!(summary.contains("Number of publisher conflicts: 3\n"));

        let checkup = load_doi_checkup(&dir.path().join(DOI_CHECKUP_FILE))?;
        assert_eq!(checkup, vec![conflict(7)]);
        Ok(())
    }
}
