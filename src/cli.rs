//! CLI argument definitions using clap derive macros.

use std::path::PathBuf;

use clap::Parser;

/// Fetch song files into a local cache.
///
/// Songcache downloads each link once (file-hosting links included), expands
/// zip payloads in place, and keeps a ledger so later runs skip what is
/// already on disk.
#[derive(Parser, Debug)]
#[command(name = "songcache")]
#[command(author, version, about)]
pub struct Args {
    /// Links to fetch (falls back to config `download_urls`, then stdin)
    pub urls: Vec<String>,

    /// Destination directory for downloaded files
    #[arg(short = 'o', long)]
    pub output_dir: Option<PathBuf>,

    /// Ledger file recording fetched content identifiers
    #[arg(long)]
    pub ledger: Option<PathBuf>,

    /// Config file (default: $XDG_CONFIG_HOME/songcache/config.toml)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Maximum concurrent downloads (1-100)
    #[arg(short = 'c', long, value_parser = clap::value_parser!(u8).range(1..=100))]
    pub concurrency: Option<u8>,

    /// List playable tracks in the destination after the batch
    #[arg(long)]
    pub list: bool,

    /// Print the track list as JSON lines
    #[arg(long, requires = "list")]
    pub json: bool,

    /// Increase output verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose")]
    pub quiet: bool,
}
