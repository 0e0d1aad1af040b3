//! tidesync - rename-aware change reconciliation for a local/remote folder pair.
//!
//! Usage:
//!   tidesync crawl CONFIG --store FILE --remote FILE   Show the reconciled plan
//!   tidesync validate --store FILE                     Check the identity store
//!   tidesync map --local-root DIR --remote-root PATH P Translate a path
//!   tidesync --help                                    Show help

use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Parser, Subcommand, ValueEnum};
use color_eyre::eyre::{bail, Context, Result};
use itertools::Itertools;
use serde::Serialize;
use tracing_subscriber::EnvFilter;

use tidesync_analyze::{
    refine, CycleDetector, CyclePlan, ReconciledEvent, RefinedEventCollection,
};
use tidesync_core::{PathMapper, SyncEvent, SyncRootConfig};
use tidesync_crawl::{Crawler, FsLocalTree, JsonRemoteTree, RemoteTree, SessionHandle};
use tidesync_ops::{Applier, CommitHandle, RecordOnlyApplier};
use tidesync_store::{IdentityStore, JsonIdentityStore, StoreError};
use tokio_util::sync::CancellationToken;

#[derive(Parser)]
#[command(
    name = "tidesync",
    version,
    about = "Rename-aware change reconciliation for file synchronization",
    long_about = "tidesync compares a local folder and a remote repository tree against \
                  its identity store and shows the operations that bring them together, \
                  with renames and moves collapsed wherever that is safe."
)]
struct Cli {
    /// Log at debug level (RUST_LOG overrides)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Crawl a sync root and print the reconciled plan
    Crawl {
        /// Sync-root configuration (TOML)
        config: PathBuf,

        /// Identity store file (created if missing)
        #[arg(short, long)]
        store: PathBuf,

        /// Remote tree snapshot (JSON)
        #[arg(short, long)]
        remote: PathBuf,

        /// Record every identified event in the store as applied
        #[arg(long)]
        record: bool,

        /// Output format
        #[arg(short, long, default_value = "text")]
        format: OutputFormat,
    },

    /// Check the structural invariants of an identity store
    Validate {
        /// Identity store file
        #[arg(short, long)]
        store: PathBuf,

        /// Output format
        #[arg(short, long, default_value = "text")]
        format: OutputFormat,
    },

    /// Translate a path between the local and remote roots
    Map {
        /// Local root directory
        #[arg(long)]
        local_root: PathBuf,

        /// Remote root folder (absolute)
        #[arg(long)]
        remote_root: String,

        /// Path to translate (local by default)
        path: String,

        /// Translate a remote path to a local one
        #[arg(long)]
        reverse: bool,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum, Default)]
enum OutputFormat {
    #[default]
    Text,
    Json,
}

fn main() -> Result<()> {
    color_eyre::install()?;

    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Command::Crawl {
            config,
            store,
            remote,
            record,
            format,
        } => run_crawl(&config, &store, &remote, record, format),
        Command::Validate { store, format } => run_validate(&store, format),
        Command::Map {
            local_root,
            remote_root,
            path,
            reverse,
        } => run_map(local_root, &remote_root, &path, reverse),
    }
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[derive(Serialize)]
struct CrawlReport<'a> {
    root: &'a str,
    plan: &'a CyclePlan,
    items: &'a RefinedEventCollection,
    committed: Option<usize>,
    deferred: Option<usize>,
}

/// Crawl one sync root and print what the applier would receive.
fn run_crawl(
    config_path: &Path,
    store_path: &Path,
    remote_path: &Path,
    record: bool,
    format: OutputFormat,
) -> Result<()> {
    let text = std::fs::read_to_string(config_path)
        .with_context(|| format!("Cannot read {}", config_path.display()))?;
    let config = SyncRootConfig::from_toml_str(&text).context("Invalid configuration")?;
    let mapper = config.mapper()?;
    let local_root = mapper
        .local_root()
        .canonicalize()
        .context("Invalid local root")?;
    let mapper = PathMapper::new(local_root, mapper.remote_root())?;

    let remote = JsonRemoteTree::open(remote_path).context("Cannot load remote snapshot")?;
    let root_id = remote.root_id(&SessionHandle::anonymous())?;
    let store: Arc<dyn IdentityStore> = Arc::new(
        JsonIdentityStore::open_with_root(store_path, root_id).context("Cannot open store")?,
    );

    tracing::debug!(
        records = store.len(),
        store = %store_path.display(),
        "Opened identity store"
    );
    eprintln!("Crawling {}...", config.name);

    let crawler = Crawler::new(
        Arc::clone(&store),
        Arc::new(FsLocalTree::new(mapper).with_threads(config.walk_threads)),
        Arc::new(remote),
        config.ignore_list()?,
    );
    let events = crawler
        .crawl(&CancellationToken::new())
        .context("Crawl failed")?;
    let plan = CycleDetector::new().detect(&events);
    let refined = refine(&events, &plan);

    let commit = if record {
        let mut commit = CommitHandle::new(Arc::clone(&store));
        RecordOnlyApplier.apply(&refined, &mut commit)?;
        Some(commit)
    } else {
        None
    };

    match format {
        OutputFormat::Text => {
            println!();
            println!("{}", "─".repeat(70));
            println!(
                " {} ({} -> {})",
                config.name,
                config.local_root.display(),
                config.remote_root
            );
            println!("{}", "─".repeat(70));
            println!();

            if refined.is_empty() {
                println!(" Both trees match the identity store.");
            } else {
                let kinds = refined
                    .iter()
                    .map(|item| item.event().kind())
                    .counts()
                    .into_iter()
                    .sorted_by_key(|(kind, _)| kind.to_string())
                    .map(|(kind, n)| format!("{n} {kind}"))
                    .join(", ");
                println!(" {} operation(s): {}", refined.len(), kinds);
                println!(
                    " {} merged, {} degraded to delete + create, {} cycle(s)",
                    refined.merged_count(),
                    refined.fallback_count(),
                    plan.cycles().count()
                );
                println!();

                for item in refined.iter() {
                    println!("   {}", describe(item));
                }
            }

            if let Some(commit) = &commit {
                println!();
                println!(
                    " Recorded {} change(s), {} deferred",
                    commit.written(),
                    commit.deferred().len()
                );
                for deferred in commit.deferred() {
                    println!("   {} at {}: {}", deferred.id, deferred.path, deferred.reason);
                }
            }
            println!();
        }
        OutputFormat::Json => {
            let report = CrawlReport {
                root: &config.name,
                plan: &plan,
                items: &refined,
                committed: commit.as_ref().map(CommitHandle::written),
                deferred: commit.as_ref().map(|c| c.deferred().len()),
            };
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
    }

    Ok(())
}

/// One line per planned operation.
fn describe(item: &ReconciledEvent) -> String {
    let event: &SyncEvent = item.event();
    let paths = event.change.paths().iter().join(" -> ");
    let marker = if item.is_merged() { "*" } else { " " };
    format!(
        "{marker} {:<8} {:<16} {}",
        format!("{:?}", event.origin).to_lowercase(),
        event.kind().to_string(),
        paths
    )
}

/// Validate an identity store file.
fn run_validate(store_path: &Path, format: OutputFormat) -> Result<()> {
    if !store_path.exists() {
        bail!("No identity store at {}", store_path.display());
    }
    let store = JsonIdentityStore::open(store_path).context("Cannot open store")?;

    let report = match store.validate_structure() {
        Ok(report) => report,
        Err(StoreError::Structural(report)) => report,
        Err(e) => return Err(e).context("Validation failed"),
    };

    match format {
        OutputFormat::Text => {
            println!(
                " {} record(s) checked, {} issue(s)",
                report.records_checked,
                report.issues.len()
            );
            for issue in &report.issues {
                println!("   {issue}");
            }
        }
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
    }

    if !report.is_consistent() {
        bail!("Identity store is structurally inconsistent");
    }
    Ok(())
}

/// Translate one path between the roots.
fn run_map(local_root: PathBuf, remote_root: &str, path: &str, reverse: bool) -> Result<()> {
    let mapper = PathMapper::new(local_root, remote_root)?;
    if reverse {
        let local = mapper.remote_to_local(path)?;
        println!("{}", local.display());
    } else {
        println!("{}", mapper.local_to_remote(Path::new(path))?);
    }
    Ok(())
}
