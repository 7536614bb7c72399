//! Merge reconciliation: one [`MergedRecord`] per primary entry.
//!
//! Field precedence, applied over the graph matches in match order:
//!
//! - `doi`: first match that has one; otherwise the primary DOI
//! - `authors`: longest author list after de-duplicating each by author id
//! - `title` and the remaining scalars: first non-empty value wins
//! - `doc_type`, `n_citation`, `publisher`: graph value, filled from the
//!   primary enrichments when missing; citation counts take the maximum
//!
//! Full text comes from the extraction table when the resolved DOI has
//! exactly one row there, and from the primary entry otherwise.

use crate::error::Result;
use crate::fields::FieldsOfStudy;
use crate::fulltext::{FullTextLoader, TextHit, TextTable};
use crate::graph_store::GraphStore;
use crate::match_index::{MatchIndex, MissingMatchPolicy};
use crate::record::{Author, DoiSource, Filled, FullTextSource, GraphEntry, MergedRecord, PrimaryEntry};
use crate::report::{ConflictReport, DoiConflict};
use serde_json::Value;
use std::collections::HashSet;
use tracing::debug;

/// Graph-side fields gathered from all matches of one primary entry
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Accumulated {
    pub mag_ids: Vec<String>,
    pub doi: Option<String>,
    pub authors: Option<Vec<Author>>,
    pub title: Option<String>,
    pub venue: Option<Value>,
    pub year: Option<i64>,
    pub n_citation: Option<i64>,
    pub page_start: Option<String>,
    pub page_end: Option<String>,
    pub doc_type: Option<String>,
    pub publisher: Option<String>,
    pub volume: Option<String>,
    pub issue: Option<String>,
}

/// Keep the first occurrence of every author id. Authors without an id
/// cannot be compared and are always kept.
pub fn dedup_authors(authors: &[Author]) -> Vec<Author> {
    let mut seen: HashSet<&str> = HashSet::new();
    let mut unique = Vec::with_capacity(authors.len());
    for author in authors {
        let fresh = match author.id.as_deref() {
            Some(id) => seen.insert(id),
            None => true,
        };
        if fresh {
            unique.push(author.clone());
        }
    }
    unique
}

fn fill<T: Filled + Clone>(slot: &mut Option<T>, candidate: &Option<T>) {
    if !slot.is_filled() && candidate.is_filled() {
        slot.clone_from(candidate);
    }
}

/// Fold the matched graph records, in match order.
pub fn accumulate(matches: &[&GraphEntry]) -> Accumulated {
    let mut acc = Accumulated::default();

    for g in matches {
        acc.mag_ids.push(g.id.clone());

        fill(&mut acc.doi, &g.doi);

        if let Some(list) = &g.authors {
            let authors = dedup_authors(list);
            let longer = match &acc.authors {
                None => true,
                Some(current) => current.is_empty() || authors.len() > current.len(),
            };
            if longer {
                acc.authors = Some(authors);
            }
        }

        fill(&mut acc.title, &g.title);
        fill(&mut acc.venue, &g.venue);
        fill(&mut acc.year, &g.year);
        fill(&mut acc.n_citation, &g.n_citation);
        fill(&mut acc.page_start, &g.page_start);
        fill(&mut acc.page_end, &g.page_end);
        fill(&mut acc.doc_type, &g.doc_type);
        fill(&mut acc.publisher, &g.publisher);
        fill(&mut acc.volume, &g.volume);
        fill(&mut acc.issue, &g.issue);
    }

    acc
}

/// Read-only lookups shared by the pre-pass and the merge
#[derive(Clone, Copy)]
pub struct MergeSources<'a> {
    pub matches: &'a MatchIndex,
    pub graph: &'a GraphStore,
    pub fields: &'a FieldsOfStudy,
}

/// Sequential merge over the primary corpus. Entries must be fed in the
/// same order that produced the full-text DOI order list.
pub struct MergeEngine<'a, T: TextTable> {
    sources: MergeSources<'a>,
    texts: FullTextLoader<T>,
    policy: MissingMatchPolicy,
    report: ConflictReport,
}

impl<'a, T: TextTable> MergeEngine<'a, T> {
    pub fn new(sources: MergeSources<'a>, texts: FullTextLoader<T>, policy: MissingMatchPolicy) -> Self {
        Self {
            sources,
            texts,
            policy,
            report: ConflictReport::default(),
        }
    }

    pub fn report(&self) -> &ConflictReport {
        &self.report
    }

    /// Stop merging and hand back the accumulated report.
    pub fn finish(mut self) -> ConflictReport {
        self.report.window_loads = self.texts.loads() as u64;
        self.report
    }

    pub fn merge_entry(&mut self, mut entry: PrimaryEntry) -> Result<MergedRecord> {
        let sources = self.sources;
        let ids = sources.matches.resolve(&entry.core_id, self.policy)?;
        let graphs = sources.graph.resolve_all(ids, &entry.core_id)?;
        let mut acc = accumulate(&graphs);

        // DOI: graph first, primary as fallback
        let mut doi_source = acc.doi.is_filled().then_some(DoiSource::Graph);
        match (&acc.doi, &entry.doi) {
            (Some(graph_doi), Some(primary_doi))
                if graph_doi.is_filled() && primary_doi.is_filled() && graph_doi != primary_doi =>
            {
                self.report.record_doi_conflict(DoiConflict {
                    graph_doi: graph_doi.clone(),
                    primary_doi: primary_doi.clone(),
                    graph_title: acc.title.clone(),
                    primary_title: entry.title.clone(),
                });
            }
            _ => {}
        }
        if !acc.doi.is_filled() && entry.doi.is_filled() {
            acc.doi = entry.doi.take();
            doi_source = Some(DoiSource::Primary);
        }

        if let Some(authors) = &acc.authors {
            if authors.len() != entry.authors.len() {
                self.report.author_conflicts += 1;
            }
        }

        let (full_text, full_text_source) = self.resolve_text(acc.doi.as_deref(), &mut entry)?;
        let fields_of_study = sources.fields.lookup(acc.doi.as_deref());

        if !acc.doc_type.is_filled() {
            if let Some(kind) = entry.document_type() {
                acc.doc_type = Some(kind.to_string());
            }
        }

        match (acc.n_citation.filter(Filled::is_filled), entry.citation_count()) {
            (None, Some(primary)) => acc.n_citation = Some(primary),
            (Some(graph), Some(primary)) if primary.is_filled() && primary != graph => {
                self.report.citation_conflicts += 1;
                acc.n_citation = Some(graph.max(primary));
            }
            _ => {}
        }

        if !acc.publisher.is_filled() {
            if entry.publisher.is_filled() {
                acc.publisher = entry.publisher.take();
            }
        } else if entry.publisher.is_filled() && acc.publisher != entry.publisher {
            self.report.publisher_conflicts += 1;
        }

        self.report.records += 1;

        Ok(MergedRecord {
            mag_ids: acc.mag_ids,
            doi: acc.doi,
            doi_source,
            authors: acc.authors,
            title: acc.title,
            venue: acc.venue,
            year: acc.year,
            n_citation: acc.n_citation,
            page_start: acc.page_start,
            page_end: acc.page_end,
            doc_type: acc.doc_type,
            publisher: acc.publisher,
            volume: acc.volume,
            issue: acc.issue,
            core_id: entry.core_id,
            full_text,
            full_text_source,
            fields_of_study,
            abstract_text: entry.abstract_text,
            oai: entry.oai,
            identifiers: entry.identifiers,
            download_url: entry.download_url,
        })
    }

    fn resolve_text(
        &mut self,
        doi: Option<&str>,
        entry: &mut PrimaryEntry,
    ) -> Result<(Option<String>, FullTextSource)> {
        let Some(doi) = doi.filter(|d| self.texts.covers(d)) else {
            return Ok((entry.full_text.take(), FullTextSource::Primary));
        };

        match self.texts.lookup(doi)? {
            TextHit::Unique(Some(text)) => {
                self.report.external_texts += 1;
                Ok((Some(text.to_string()), FullTextSource::External))
            }
            TextHit::Unique(None) => Ok((entry.full_text.take(), FullTextSource::Primary)),
            TextHit::Ambiguous(rows) => {
                debug!(doi, rows, core_id = %entry.core_id, "Several extraction rows, keeping primary text");
                self.report.ambiguous_texts += 1;
                Ok((entry.full_text.take(), FullTextSource::Primary))
            }
        }
    }
}
