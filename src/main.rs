//! CLI entry point for songcache.

use std::io::{self, IsTerminal, Read};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use songcache_core::config::{FileConfig, split_url_list};
use songcache_core::{
    AppConfig, DownloadLedger, DownloaderService, HttpClient, TrackLibrary, load_config,
};
use tracing::{debug, info, warn};

mod cli;
mod progress;

use cli::Args;
use progress::BarObserver;

#[tokio::main]
async fn main() -> Result<()> {
    // Parse CLI arguments first (before tracing, so --help works without logs)
    let args = Args::parse();

    // Config is read before tracing so its verbosity can set the default level
    let loaded = load_config(args.config.as_deref())?;
    let config = AppConfig::resolve(Some(&with_cli_overrides(
        loaded.config.clone().unwrap_or_default(),
        &args,
    )));

    // Priority: RUST_LOG env var > quiet flag > verbose flag > config verbosity
    let default_level = if args.quiet {
        "error"
    } else {
        match args.verbose {
            0 => config.verbosity.log_level(),
            1 => "debug",
            _ => "trace",
        }
    };

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();

    debug!(?args, "CLI arguments parsed");
    debug!(
        path = ?loaded.path,
        from_file = loaded.loaded_from_file,
        verbosity = config.verbosity.as_str(),
        "configuration resolved"
    );
    info!("songcache starting");

    let urls = collect_urls(&args, &config)?;

    let client =
        HttpClient::try_with_timeouts(config.probe_timeout_secs, config.download_timeout_secs)
            .context("Failed to build HTTP client")?;
    let ledger = DownloadLedger::new(&config.ledger_path);
    let observer = Arc::new(BarObserver::new(!args.quiet && io::stderr().is_terminal()));
    let service = DownloaderService::new(client, ledger, &config.output_dir)
        .with_concurrency(config.concurrency)?
        .with_progress_observer(observer);

    let link_count = urls.len();
    let handle = service.start_batch(
        urls,
        Some(Box::new(move || {
            info!(links = link_count, "download batch finished");
        })),
    )?;
    let report = handle.join().await;

    info!(
        downloaded = report.downloaded(),
        skipped = report.skipped(),
        failed = report.failed(),
        total = report.total(),
        "Download complete"
    );
    for (url, outcome) in &report.outcomes {
        if outcome.is_failure() {
            warn!(url = %url, ?outcome, "link not downloaded");
        }
    }

    if args.list {
        print_library(&config, args.json).await?;
    }

    Ok(())
}

/// CLI flags take precedence over file values; defaults are applied afterwards.
fn with_cli_overrides(mut file: FileConfig, args: &Args) -> FileConfig {
    if let Some(dir) = &args.output_dir {
        file.output_dir = Some(dir.clone());
    }
    if let Some(ledger) = &args.ledger {
        file.ledger_path = Some(ledger.clone());
    }
    if let Some(concurrency) = args.concurrency {
        file.concurrency = Some(usize::from(concurrency));
    }
    file
}

/// Links from arguments, then config, then piped stdin.
fn collect_urls(args: &Args, config: &AppConfig) -> Result<Vec<String>> {
    if !args.urls.is_empty() {
        return Ok(args.urls.iter().flat_map(|raw| split_url_list(raw)).collect());
    }
    if !config.download_urls.is_empty() {
        return Ok(config.download_urls.clone());
    }
    if io::stdin().is_terminal() {
        info!("No links provided. Pass them as arguments, set download_urls, or pipe via stdin.");
        return Ok(Vec::new());
    }

    let mut buffer = String::new();
    io::stdin()
        .read_to_string(&mut buffer)
        .context("Failed to read links from stdin")?;
    Ok(split_url_list(&buffer))
}

async fn print_library(config: &AppConfig, json: bool) -> Result<()> {
    let library = TrackLibrary::scan(&config.output_dir, config.stream_from_disk).await?;
    for track in &library.tracks {
        if json {
            println!("{}", serde_json::to_string(track)?);
        } else {
            println!("{}", track.path.display());
        }
    }
    Ok(())
}
