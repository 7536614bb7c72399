//! Primary id -> matched graph ids.
//!
//! Built from the precomputed pair list `{"matches": [[graph_id, primary_id], ...]}`.

use crate::error::{MergeError, Result};
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use tracing::info;

#[derive(Debug, Deserialize)]
struct MatchFile {
    matches: Vec<(Value, Value)>,
}

/// What to do with a primary entry that has no match index entry
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum MissingMatchPolicy {
    /// Abort: the match list does not cover the primary corpus.
    #[default]
    Fail,
    /// Treat the entry as having zero matches.
    Empty,
}

#[derive(Debug, Clone, Default)]
pub struct MatchIndex {
    by_primary: HashMap<String, Vec<String>>,
}

impl MatchIndex {
    /// Accumulate pairs in input order; repeated primary ids collect all of
    /// their graph ids.
    pub fn build<I>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let mut by_primary: HashMap<String, Vec<String>> = HashMap::new();
        for (graph_id, primary_id) in pairs {
            by_primary.entry(primary_id).or_default().push(graph_id);
        }
        Self { by_primary }
    }

    pub fn load(path: &Path) -> Result<Self> {
        let file: MatchFile = serde_json::from_reader(BufReader::new(File::open(path)?))?;
        let pairs = file
            .matches
            .into_iter()
            .map(|(graph, primary)| Ok((id_string(graph)?, id_string(primary)?)))
            .collect::<Result<Vec<_>>>()?;

        let index = Self::build(pairs);
        info!(
            primary_ids = index.len(),
            pairs = index.pair_count(),
            "Match index loaded"
        );
        Ok(index)
    }

    /// Matches for `primary_id`, empty when the id is unknown.
    pub fn matches(&self, primary_id: &str) -> &[String] {
        self.by_primary
            .get(primary_id)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Matches for `primary_id` under the given policy.
    pub fn resolve(&self, primary_id: &str, policy: MissingMatchPolicy) -> Result<&[String]> {
        match (self.by_primary.get(primary_id), policy) {
            (Some(ids), _) => Ok(ids.as_slice()),
            (None, MissingMatchPolicy::Empty) => Ok(&[][..]),
            (None, MissingMatchPolicy::Fail) => Err(MergeError::MissingMatch {
                primary_id: primary_id.to_string(),
            }),
        }
    }

    pub fn len(&self) -> usize {
        self.by_primary.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_primary.is_empty()
    }

    pub fn pair_count(&self) -> usize {
        self.by_primary.values().map(Vec::len).sum()
    }
}

fn id_string(value: Value) -> Result<String> {
    match value {
        Value::String(s) => Ok(s),
        Value::Number(n) => Ok(n.to_string()),
        other => Err(MergeError::Parse(format!("match id must be a string or number, got {}", other))),
    }
}
