//! corpusmerge - Scholarly corpus merge pipeline
//!
//! Merges a primary full-text corpus with a citation-graph corpus, an
//! extracted full-text table and a field-of-study table.
//!
//! ## Usage
//!
//! ### Merge
//! ```bash
//! corpusmerge merge --primary core/ --graph mag.jsonl --matches matches.json \
//!     --fulltext extracted/ --fields fos.json --output output
//! ```
//!
//! ### Rebuild the DOI order cache
//! ```bash
//! corpusmerge order-dois --primary core/ --graph mag.jsonl --matches matches.json \
//!     --fulltext extracted/ --cache output/ordered_dois.json --force
//! ```
//!
//! ### Verify DOI conflicts
//! ```bash
//! corpusmerge verify-conflicts --checkup output/2021_04_09_12_08_34/doi_checkup.json
//! ```

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use corpusmerge::{
    config::{MergeConfig, SourcePaths},
    crossref::CrossrefClient,
    match_index::MissingMatchPolicy,
    pipeline,
    predicate::{Predicate, PredicateSet},
    report, verify,
};
use std::path::PathBuf;
use tracing::{info, Level};
use tracing_subscriber::{fmt, EnvFilter};

// ============================================================================
// CLI Definition
// ============================================================================

/// Scholarly corpus merge pipeline
#[derive(Parser)]
#[command(name = "corpusmerge")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    debug: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Inputs shared by `merge` and `order-dois`
#[derive(Args)]
struct SourceArgs {
    /// Primary corpus: JSONL file or directory of JSONL batches
    #[arg(long)]
    primary: PathBuf,

    /// Graph corpus JSONL file
    #[arg(long)]
    graph: PathBuf,

    /// Match list JSON (`{"matches": [[graph_id, primary_id], ...]}`)
    #[arg(long)]
    matches: PathBuf,

    /// Directory of Parquet full-text shards
    #[arg(long)]
    fulltext: PathBuf,

    /// Entry filter, repeatable: nonempty:FIELD, eq:FIELD=VALUE, in:FIELD=V1|V2
    #[arg(long = "require", value_name = "PREDICATE")]
    require: Vec<Predicate>,

    /// Keep entries without a match index entry (merged with no graph data)
    #[arg(long)]
    allow_unmatched: bool,
}

impl SourceArgs {
    fn paths(&self) -> SourcePaths {
        SourcePaths {
            primary: self.primary.clone(),
            graph: self.graph.clone(),
            matches: self.matches.clone(),
            fulltext: self.fulltext.clone(),
        }
    }

    fn filter(&self) -> PredicateSet {
        PredicateSet::new(self.require.clone())
    }

    fn policy(&self) -> MissingMatchPolicy {
        if self.allow_unmatched {
            MissingMatchPolicy::Empty
        } else {
            MissingMatchPolicy::Fail
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Merge all sources into timestamped JSONL batches
    Merge {
        #[command(flatten)]
        sources: SourceArgs,

        /// Field-of-study table (doi -> board)
        #[arg(long)]
        fields: PathBuf,

        /// Output directory
        #[arg(short, long, default_value = "./output")]
        output: PathBuf,

        /// DOI order cache (default: <output>/ordered_dois.json)
        #[arg(long)]
        order_cache: Option<PathBuf>,

        /// Number of full-text windows
        #[arg(long, default_value_t = corpusmerge::fulltext::DEFAULT_WINDOW_COUNT)]
        windows: usize,

        /// Records per output batch file
        #[arg(long, default_value_t = corpusmerge::batch::DEFAULT_BATCH_SIZE)]
        batch_size: usize,
    },

    /// Build the DOI order cache without merging
    OrderDois {
        #[command(flatten)]
        sources: SourceArgs,

        /// Cache file to write
        #[arg(long, default_value = "./output/ordered_dois.json")]
        cache: PathBuf,

        /// Rebuild even if the cache exists
        #[arg(long)]
        force: bool,
    },

    /// Check recorded DOI conflicts against Crossref titles
    VerifyConflicts {
        /// doi_checkup.json written by a merge run
        #[arg(long)]
        checkup: PathBuf,

        /// Output directory (default: next to the checkup file)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Concurrent Crossref requests
        #[arg(long, default_value = "3")]
        workers: usize,
    },
}

// ============================================================================
// Main Entry Point
// ============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.debug { Level::DEBUG } else { Level::INFO };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(log_level.to_string()));

    let subscriber = fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false);
    if cli.log_json {
        subscriber.json().init();
    } else {
        subscriber.init();
    }

    match cli.command {
        Commands::Merge {
            sources,
            fields,
            output,
            order_cache,
            windows,
            batch_size,
        } => {
            let mut config = MergeConfig::new(sources.paths(), fields, output);
            config.order_cache = order_cache;
            config.windows = windows;
            config.batch_size = batch_size;
            config.policy = sources.policy();
            config.filter = sources.filter();
            run_merge(config).await
        }
        Commands::OrderDois {
            sources,
            cache,
            force,
        } => run_order(sources, cache, force).await,
        Commands::VerifyConflicts {
            checkup,
            output,
            workers,
        } => run_verify(checkup, output, workers).await,
    }
}

// ============================================================================
// Commands
// ============================================================================

async fn run_merge(config: MergeConfig) -> Result<()> {
    println!("\n=== corpusmerge ===");
    println!("Primary: {}", config.sources.primary.display());
    println!("Graph: {}", config.sources.graph.display());
    println!("Windows: {}, batch size: {}", config.windows, config.batch_size);

    let summary = tokio::task::spawn_blocking(move || pipeline::run_merge(&config))
        .await
        .context("Merge task panicked")?
        .context("Merge failed")?;

    println!();
    print!("{}", summary.report.summary());
    println!("Output: {}", summary.run_dir.display());
    Ok(())
}

async fn run_order(sources: SourceArgs, cache: PathBuf, force: bool) -> Result<()> {
    let paths = sources.paths();
    let filter = sources.filter();
    let policy = sources.policy();
    let cache_path = cache.clone();

    let order = tokio::task::spawn_blocking(move || pipeline::run_order(&paths, &cache, filter, policy, force))
        .await
        .context("DOI order task panicked")?
        .context("Building DOI order failed")?;

    println!("Ordered DOIs: {} ({})", order.dois.len(), cache_path.display());
    Ok(())
}

async fn run_verify(checkup: PathBuf, output: Option<PathBuf>, workers: usize) -> Result<()> {
    let conflicts = report::load_doi_checkup(&checkup)
        .with_context(|| format!("Failed to read {}", checkup.display()))?;
    if conflicts.is_empty() {
        println!("No DOI conflicts in {}", checkup.display());
        return Ok(());
    }

    let dir = match output {
        Some(dir) => dir,
        None => checkup
            .parent()
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(".")),
    };
    std::fs::create_dir_all(&dir).context("Failed to create output directory")?;

    println!("Verifying {} DOI conflicts ({} workers)...", conflicts.len(), workers);
    let client = CrossrefClient::new(workers)?;
    let rows = verify::verify_conflicts(&client, &conflicts).await;

    let path = dir.join(verify::VERIFICATION_FILE);
    verify::save_verifications(&path, &rows)?;

    for (verdict, count) in verify::tally(&rows) {
        info!(verdict = %verdict, count = count, "Verification");
        println!("  {}: {}", verdict, count);
    }
    println!("Saved: {:?}", path);
    Ok(())
}
