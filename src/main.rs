//! Inspects an artifact cache from the command line.
//!
//! `cachectl stats` reports how many entries a cache holds and how much space
//! their content occupies. The cache root comes from `--cache`, or else from
//! the `ARTIFACT_CACHE_*` environment parsed by
//! [`OrthoConfig`](https://github.com/leynos/ortho-config). The binary exits
//! with status code `0` on success and `1` on error.

use artifact_cache::stats::CacheStats;
use artifact_cache::{ArtifactCache, ArtifactCacheConfig};
use camino::Utf8PathBuf;
use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, eyre};
use tracing::{Level, info};
use tracing_subscriber::fmt;

const LOG_TARGET: &str = "artifact_cache::cachectl";

#[derive(Debug, Parser)]
#[command(name = "cachectl", about = "Inspect an artifact cache")]
struct Cli {
    /// Cache root directory.
    #[arg(long, global = true)]
    cache: Option<Utf8PathBuf>,

    /// Increase log verbosity (repeat for more detail).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Report the number of cached artifacts and their total size.
    Stats,
}

fn main() -> Result<()> {
    color_eyre::install()?;
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let config = match cli.cache {
        Some(dir) => ArtifactCacheConfig::with_dir(dir),
        None => ArtifactCacheConfig::load().map_err(|err| eyre!(err))?,
    };
    let cache = ArtifactCache::from_config(&config);

    match cli.command {
        Command::Stats => report_stats(&cache),
    }
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => Level::INFO,
        1 => Level::DEBUG,
        _ => Level::TRACE,
    };
    fmt()
        .with_max_level(level)
        .without_time()
        .with_target(false)
        .init();
}

fn report_stats(cache: &ArtifactCache) -> Result<()> {
    let stats = CacheStats::collect(cache).map_err(|err| eyre!(err))?;
    info!(target: LOG_TARGET, "Cache root: {}", cache.root());
    info!(target: LOG_TARGET, "Cached artifacts: {}", stats.entries);
    if stats.errors > 0 {
        info!(target: LOG_TARGET, "Malformed entries: {}", stats.errors);
    }
    info!(target: LOG_TARGET, "Cache size: {:.2} MiB", stats.size_mib());
    Ok(())
}
