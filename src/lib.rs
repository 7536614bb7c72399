//! # corpusmerge
//!
//! Scholarly corpus merge pipeline: reconciles a primary full-text corpus
//! with a citation-graph corpus, an extracted full-text table and a
//! field-of-study table into one deduplicated JSONL corpus.
//!
//! ## Modules
//!
//! - [`corpus`] - Primary corpus reading and entry filtering
//! - [`match_index`] - Primary id -> graph ids
//! - [`graph_store`] - Graph records by id
//! - [`fields`] - DOI -> field-of-study labels
//! - [`fulltext`] - Windowed full-text lookup over Parquet shards
//! - [`doi_order`] - DOI order list driving the full-text windows
//! - [`merge`] - Per-entry merge rules and conflict counting
//! - [`report`] - Conflict counters and report files
//! - [`batch`] - Rolling JSONL batch output
//! - [`pipeline`] - End-to-end merge runs
//! - [`crossref`] - Crossref API client for DOI title lookup
//! - [`verify`] - DOI conflict verification against Crossref
//! - [`language`] - Slice-vote language detection
//! - [`error`] - Custom error types
//!
//! ## Usage
//!
//! ```rust,no_run
//! use corpusmerge::config::{MergeConfig, SourcePaths};
//! use corpusmerge::pipeline;
//!
//! fn main() -> corpusmerge::Result<()> {
//!     let sources = SourcePaths {
//!         primary: "core/".into(),
//!         graph: "mag.jsonl".into(),
//!         matches: "matches.json".into(),
//!         fulltext: "extracted/".into(),
//!     };
//!     let config = MergeConfig::new(sources, "fos.json".into(), "output".into());
//!     let summary = pipeline::run_merge(&config)?;
//!     print!("{}", summary.report.summary());
//!     Ok(())
//! }
//! ```

pub mod batch;
pub mod config;
pub mod corpus;
pub mod crossref;
pub mod doi_order;
pub mod error;
pub mod fields;
pub mod fulltext;
pub mod graph_store;
pub mod language;
pub mod match_index;
pub mod merge;
pub mod pipeline;
pub mod predicate;
pub mod record;
pub mod report;
pub mod verify;

pub use error::{MergeError, Result};
