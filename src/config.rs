//! Configuration for merge runs.

use crate::batch::DEFAULT_BATCH_SIZE;
use crate::doi_order::ORDER_CACHE_FILE;
use crate::error::{MergeError, Result};
use crate::fulltext::DEFAULT_WINDOW_COUNT;
use crate::match_index::MissingMatchPolicy;
use crate::predicate::PredicateSet;
use std::path::PathBuf;

/// Subdirectory of a run directory holding the merged batches
pub const BATCH_DIR: &str = "batches";

/// Input locations shared by the pre-pass and the merge
#[derive(Debug, Clone)]
pub struct SourcePaths {
    /// Primary corpus: a JSONL file or a directory of JSONL batches
    pub primary: PathBuf,
    /// Graph corpus JSONL file
    pub graph: PathBuf,
    /// `{"matches": [[graph_id, primary_id], ...]}`
    pub matches: PathBuf,
    /// Directory of Parquet shards with `doi` and `content` columns
    pub fulltext: PathBuf,
}

/// Full configuration of a merge run
#[derive(Debug, Clone)]
pub struct MergeConfig {
    pub sources: SourcePaths,
    /// DOI -> `board` field-of-study table
    pub fields: PathBuf,
    /// Parent directory; each run writes into a timestamped subdirectory
    pub output: PathBuf,
    /// Cached DOI order list; defaults to `<output>/ordered_dois.json`
    pub order_cache: Option<PathBuf>,
    pub windows: usize,
    pub batch_size: usize,
    pub policy: MissingMatchPolicy,
    pub filter: PredicateSet,
}

impl MergeConfig {
    pub fn new(sources: SourcePaths, fields: PathBuf, output: PathBuf) -> Self {
        Self {
            sources,
            fields,
            output,
            order_cache: None,
            windows: DEFAULT_WINDOW_COUNT,
            batch_size: DEFAULT_BATCH_SIZE,
            policy: MissingMatchPolicy::default(),
            filter: PredicateSet::default(),
        }
    }

    pub fn order_cache_path(&self) -> PathBuf {
        self.order_cache
            .clone()
            .unwrap_or_else(|| self.output.join(ORDER_CACHE_FILE))
    }

    /// Check that every input exists before any loading starts.
    pub fn validate(&self) -> Result<()> {
        let inputs = [
            ("primary corpus", &self.sources.primary),
            ("graph corpus", &self.sources.graph),
            ("match list", &self.sources.matches),
            ("full-text shards", &self.sources.fulltext),
            ("field-of-study table", &self.fields),
        ];
        for (what, path) in inputs {
            if !path.exists() {
                return Err(MergeError::Config(format!(
                    "{} not found: {}",
                    what,
                    path.display()
                )));
            }
        }
        if self.windows == 0 {
            return Err(MergeError::Config("window count must be at least 1".to_string()));
        }
        if self.batch_size == 0 {
            return Err(MergeError::Config("batch size must be at least 1".to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_validate_reports_missing_input() {
        let dir = TempDir::new().expect("temp dir");
        let existing = dir.path().to_path_buf();
        let config = MergeConfig::new(
            SourcePaths {
                primary: existing.clone(),
                graph: existing.join("mag.jsonl"),
                matches: existing.clone(),
                fulltext: existing.clone(),
            },
            existing.clone(),
            existing.join("out"),
        );

        let err = config.validate().expect_err("graph corpus missing");
        assert!(err.to_string().contains("graph corpus not found"));
        assert_eq!(config.order_cache_path(), existing.join("out").join(ORDER_CACHE_FILE));
    }
}
