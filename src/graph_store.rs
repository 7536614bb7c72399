//! In-memory graph corpus, keyed by each record's own `id`.

use crate::corpus::scan_records;
use crate::error::{MergeError, Result};
use crate::record::GraphEntry;
use std::collections::HashMap;
use std::path::Path;
use tracing::info;

#[derive(Debug, Default)]
pub struct GraphStore {
    records: HashMap<String, GraphEntry>,
}

impl GraphStore {
    /// One pass over a JSONL file. A repeated id replaces the earlier record.
    pub fn load(path: &Path) -> Result<Self> {
        let mut store = Self::default();
        let stats = scan_records::<GraphEntry, _>(path, |entry| {
            store.insert(entry);
            Ok(())
        })?;
        info!(
            records = store.len(),
            malformed = stats.malformed,
            "Graph store created"
        );
        Ok(store)
    }

    pub fn insert(&mut self, entry: GraphEntry) {
        self.records.insert(entry.id.clone(), entry);
    }

    pub fn get(&self, graph_id: &str) -> Option<&GraphEntry> {
        self.records.get(graph_id)
    }

    /// Look up every matched id of one primary entry, in match order.
    pub fn resolve_all(&self, graph_ids: &[String], primary_id: &str) -> Result<Vec<&GraphEntry>> {
        graph_ids
            .iter()
            .map(|id| {
                self.get(id).ok_or_else(|| MergeError::MissingGraphRecord {
                    graph_id: id.clone(),
                    primary_id: primary_id.to_string(),
                })
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl FromIterator<GraphEntry> for GraphStore {
    fn from_iter<I: IntoIterator<Item = GraphEntry>>(iter: I) -> Self {
        let mut store = Self::default();
        for entry in iter {
            store.insert(entry);
        }
        store
    }
}
