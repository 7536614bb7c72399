//! End-to-end merge run.
//!
//! Loading order: match index, graph store and field-of-study table are
//! loaded fully; the DOI order list is read from cache or built by a
//! pre-pass; then the primary corpus is streamed once through the merge
//! engine into rolling batch files.

use crate::batch::BatchWriter;
use crate::config::{MergeConfig, SourcePaths, BATCH_DIR};
use crate::corpus::PrimaryCorpus;
use crate::doi_order::{self, OrderInputs, OrderedDois};
use crate::error::Result;
use crate::fields::FieldsOfStudy;
use crate::fulltext::{FullTextLoader, ParquetShards, TextTable};
use crate::graph_store::GraphStore;
use crate::match_index::{MatchIndex, MissingMatchPolicy};
use crate::merge::{MergeEngine, MergeSources};
use crate::predicate::PredicateSet;
use crate::report::ConflictReport;
use chrono::Local;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tracing::info;

/// Outcome of a finished merge run
#[derive(Debug)]
pub struct MergeSummary {
    pub run_dir: PathBuf,
    pub report: ConflictReport,
}

/// Timestamped run directory name, e.g. `2021_04_09_12_08_34`.
pub fn run_timestamp() -> String {
    Local::now().format("%Y_%m_%d_%H_%M_%S").to_string()
}

/// Sources loaded before any merging starts
struct LoadedSources {
    corpus: PrimaryCorpus,
    matches: MatchIndex,
    graph: GraphStore,
    shards: ParquetShards,
    universe: HashSet<String>,
}

fn load_sources(paths: &SourcePaths, filter: PredicateSet) -> Result<LoadedSources> {
    let corpus = PrimaryCorpus::open(&paths.primary, filter)?;
    let matches = MatchIndex::load(&paths.matches)?;
    let graph = GraphStore::load(&paths.graph)?;
    let shards = ParquetShards::open(&paths.fulltext)?;
    let universe = shards.doi_universe()?;
    Ok(LoadedSources {
        corpus,
        matches,
        graph,
        shards,
        universe,
    })
}

fn order_list(
    loaded: &LoadedSources,
    cache: &Path,
    policy: MissingMatchPolicy,
    force: bool,
) -> Result<OrderedDois> {
    let inputs = OrderInputs {
        corpus: &loaded.corpus,
        matches: &loaded.matches,
        graph: &loaded.graph,
        universe: &loaded.universe,
        policy,
    };
    doi_order::load_or_build(cache, &inputs, force)
}

/// Build (or rebuild with `force`) the DOI order cache without merging.
pub fn run_order(
    paths: &SourcePaths,
    cache: &Path,
    filter: PredicateSet,
    policy: MissingMatchPolicy,
    force: bool,
) -> Result<OrderedDois> {
    let loaded = load_sources(paths, filter)?;
    order_list(&loaded, cache, policy, force)
}

/// Run a merge into `<output>/<timestamp>/`.
pub fn run_merge(config: &MergeConfig) -> Result<MergeSummary> {
    let run_dir = config.output.join(run_timestamp());
    run_merge_into(config, &run_dir)
}

/// Run a merge into an explicit run directory.
pub fn run_merge_into(config: &MergeConfig, run_dir: &Path) -> Result<MergeSummary> {
    config.validate()?;
    std::fs::create_dir_all(run_dir.join(BATCH_DIR))?;
    info!(run_dir = %run_dir.display(), "Merging");

    let loaded = load_sources(&config.sources, config.filter.clone())?;
    let fields = FieldsOfStudy::load(&config.fields)?;
    let order = order_list(&loaded, &config.order_cache_path(), config.policy, false)?;

    let LoadedSources {
        corpus,
        matches,
        graph,
        shards,
        universe,
    } = loaded;

    let texts = FullTextLoader::new(shards, universe, order.dois, config.windows)?;
    let sources = MergeSources {
        matches: &matches,
        graph: &graph,
        fields: &fields,
    };
    let mut engine = MergeEngine::new(sources, texts, config.policy);
    let mut writer = BatchWriter::create(&run_dir.join(BATCH_DIR), config.batch_size)?;

    info!("Beginning merging");
    let stats = corpus.scan(|entry| {
        let record = engine.merge_entry(entry)?;
        writer.write(&record)
    })?;
    writer.finish()?;

    let mut report = engine.finish();
    report.filtered = stats.filtered;
    report.malformed = stats.malformed;
    report.write(run_dir)?;

    info!(records = report.records, run_dir = %run_dir.display(), "Merge complete");
    Ok(MergeSummary {
        run_dir: run_dir.to_path_buf(),
        report,
    })
}
