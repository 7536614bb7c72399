//! Precomputed DOI visitation order for the full-text loader.
//!
//! A pre-pass walks the primary corpus exactly as the merge will and records,
//! for every entry, its own DOI and the DOI of every matched graph record,
//! keeping those present in the full-text table. The list is cached as
//! `{"dois": [...]}` so repeat runs skip the pre-pass.
//!
//! Every occurrence is recorded, duplicates included, so a DOI requested
//! again late in the scan still has a position ahead of the loader.

use crate::corpus::{PrimaryCorpus, ScanStats};
use crate::error::Result;
use crate::graph_store::GraphStore;
use crate::match_index::{MatchIndex, MissingMatchPolicy};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;
use tracing::info;

/// Cache file name
pub const ORDER_CACHE_FILE: &str = "ordered_dois.json";

#[derive(Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct OrderedDois {
    pub dois: Vec<String>,
}

impl OrderedDois {
    pub fn load(path: &Path) -> Result<Self> {
        Ok(serde_json::from_reader(BufReader::new(File::open(path)?))?)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let mut writer = BufWriter::new(File::create(path)?);
        serde_json::to_writer(&mut writer, self)?;
        writer.flush()?;
        info!(dois = self.dois.len(), path = %path.display(), "Ordered DOI list saved");
        Ok(())
    }
}

/// Inputs of the pre-pass
pub struct OrderInputs<'a> {
    pub corpus: &'a PrimaryCorpus,
    pub matches: &'a MatchIndex,
    pub graph: &'a GraphStore,
    pub universe: &'a HashSet<String>,
    pub policy: MissingMatchPolicy,
}

/// Walk the primary corpus and record DOI requests in scan order.
pub fn build(inputs: &OrderInputs<'_>) -> Result<(OrderedDois, ScanStats)> {
    info!("Creating ordered DOI list");
    let mut dois = Vec::new();
    let known = |doi: &str| !doi.is_empty() && inputs.universe.contains(doi);

    let stats = inputs.corpus.scan(|entry| {
        if let Some(doi) = entry.doi.as_deref().filter(|d| known(d)) {
            dois.push(doi.to_string());
        }
        let ids = inputs.matches.resolve(&entry.core_id, inputs.policy)?;
        for graph in inputs.graph.resolve_all(ids, &entry.core_id)? {
            if let Some(doi) = graph.doi.as_deref().filter(|d| known(d)) {
                dois.push(doi.to_string());
            }
        }
        Ok(())
    })?;

    info!(dois = dois.len(), entries = stats.records, "Ordered DOI list created");
    Ok((OrderedDois { dois }, stats))
}

/// Load the cached list, or run the pre-pass and cache its result.
pub fn load_or_build(cache: &Path, inputs: &OrderInputs<'_>, force: bool) -> Result<OrderedDois> {
    if cache.exists() && !force {
        let order = OrderedDois::load(cache)?;
        info!(dois = order.dois.len(), path = %cache.display(), "Existing DOI list loaded");
        return Ok(order);
    }
    let (order, _) = build(inputs)?;
    order.save(cache)?;
    Ok(order)
}
