//! DOI -> field-of-study labels.
//!
//! The table is a JSON export indexed by `doi` with a `board` column. Two
//! layouts are accepted:
//!
//! - column oriented: `{"doi": {"0": ...}, "board": {"0": [...]}}`
//! - record oriented: `[{"doi": ..., "board": [...]}, ...]`
//!
//! A `board` cell is a list of labels or a list of label lists. A DOI that
//! occurs on several rows gets the union of its rows, first occurrence first.

use crate::error::{MergeError, Result};
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use tracing::info;

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Board {
    Flat(Vec<String>),
    Nested(Vec<Vec<String>>),
}

#[derive(Debug, Deserialize)]
struct BoardRow {
    doi: Option<String>,
    #[serde(default)]
    board: Option<Board>,
}

#[derive(Debug, Deserialize)]
struct BoardColumns {
    doi: BTreeMap<String, Option<String>>,
    board: BTreeMap<String, Option<Board>>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum BoardTable {
    Records(Vec<BoardRow>),
    Columns(BoardColumns),
}

#[derive(Debug, Default)]
pub struct FieldsOfStudy {
    rows: HashMap<String, Vec<Vec<String>>>,
}

impl FieldsOfStudy {
    pub fn load(path: &Path) -> Result<Self> {
        let table: BoardTable = serde_json::from_reader(BufReader::new(File::open(path)?))
            .map_err(|e| MergeError::Parse(format!("{}: not a doi/board table: {}", path.display(), e)))?;

        let mut fields = Self::default();
        match table {
            BoardTable::Records(rows) => {
                for row in rows {
                    if let Some(doi) = row.doi {
                        fields.insert(doi, row.board);
                    }
                }
            }
            BoardTable::Columns(mut columns) => {
                let mut indexed: Vec<(String, String)> = columns
                    .doi
                    .into_iter()
                    .filter_map(|(idx, doi)| doi.map(|d| (idx, d)))
                    .collect();
                // row labels are strings; keep numeric row order.
                indexed.sort_by_key(|(idx, _)| (idx.parse::<u64>().unwrap_or(u64::MAX), idx.clone()));
                for (idx, doi) in indexed {
                    let board = columns.board.remove(&idx).flatten();
                    fields.insert(doi, board);
                }
            }
        }

        info!(dois = fields.len(), "Field-of-study table loaded");
        Ok(fields)
    }

    /// Build from `(doi, labels)` rows directly.
    pub fn from_rows<I>(rows: I) -> Self
    where
        I: IntoIterator<Item = (String, Vec<String>)>,
    {
        let mut fields = Self::default();
        for (doi, labels) in rows {
            fields.insert(doi, Some(Board::Flat(labels)));
        }
        fields
    }

    fn insert(&mut self, doi: String, board: Option<Board>) {
        let row = match board {
            Some(Board::Flat(labels)) => labels,
            Some(Board::Nested(lists)) => dedup(lists.into_iter().flatten()),
            None => Vec::new(),
        };
        self.rows.entry(doi).or_default().push(row);
    }

    /// Labels for `doi`; empty when the DOI is not in the table.
    pub fn lookup(&self, doi: Option<&str>) -> Vec<String> {
        match doi.and_then(|d| self.rows.get(d)) {
            None => Vec::new(),
            Some(rows) if rows.len() == 1 => rows[0].clone(),
            Some(rows) => dedup(rows.iter().flatten().cloned()),
        }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

fn dedup(labels: impl Iterator<Item = String>) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for label in labels {
        if !out.contains(&label) {
            out.push(label);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn load(json: &str) -> FieldsOfStudy {
        let mut temp = NamedTempFile::new().expect("temp");
        write!(temp, "{}", json).expect("write");
        FieldsOfStudy::load(temp.path()).expect("load")
    }

    #[test]
    fn test_column_oriented_table() {
        let fields = load(
            r#"{"doi": {"0": "10.1/a", "1": "10.1/b"},
                "board": {"0": ["Biology", "Ecology"], "1": [["Physics", "Optics"], ["Optics", "Lasers"]]}}"#,
        );
        assert_eq!(fields.lookup(Some("10.1/a")), ["Biology", "Ecology"]);
        assert_eq!(fields.lookup(Some("10.1/b")), ["Physics", "Optics", "Lasers"]);
        assert!(fields.lookup(Some("10.1/z")).is_empty());
        assert!(fields.lookup(None).is_empty());
    }

    #[test]
    fn test_repeated_doi_rows_are_flattened() {
        let fields = load(
            r#"[{"doi": "10.1/a", "board": ["Chemistry"]},
                {"doi": "10.1/a", "board": ["Chemistry", "Catalysis"]},
                {"doi": null, "board": ["Ignored"]}]"#,
        );
        assert_eq!(fields.len(), 1);
        assert_eq!(fields.lookup(Some("10.1/a")), ["Chemistry", "Catalysis"]);
    }
}
