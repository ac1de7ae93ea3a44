//! The per-URL pipeline: classify, check the ledger, resolve, fetch, record, expand.
//!
//! Every step converts its failures into a logged [`TaskOutcome`]; nothing
//! escapes a task.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, error, info, instrument, warn};

use super::archive::expand_archive;
use super::client::{HttpClient, SharedProgressObserver};
use super::filename::is_archive;
use super::guard::resolve_within;
use crate::ledger::DownloadLedger;
use crate::resolver::{
    LinkClassifier, ResolveError, ResolvePath, ResolveRequest, ResolvedDownload,
    ResolverRegistry, identifier_from_url,
};

/// Terminal state of one download task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskOutcome {
    /// The link is malformed, or no identifier could be derived from it or
    /// from its resolution.
    Unresolvable,
    /// The ledger already lists the identifier; nothing was fetched.
    AlreadyDownloaded {
        /// Identifier found in the ledger.
        id: String,
    },
    /// Resolution failed (no resolver, metadata request, unexpected status,
    /// missing redirect target).
    ResolveFailed {
        /// Logged error text.
        reason: String,
    },
    /// The destination failed the path guard.
    Rejected {
        /// Logged error text.
        reason: String,
    },
    /// The byte transfer failed.
    FetchFailed {
        /// Logged error text.
        reason: String,
    },
    /// The file was written to disk.
    Downloaded {
        /// Final path of the fetched file (deleted again if it was an archive).
        path: PathBuf,
        /// Bytes written.
        bytes: u64,
        /// Files written by archive expansion; `None` when the file was not an
        /// archive or expansion failed.
        expanded: Option<usize>,
    },
}

impl TaskOutcome {
    /// True for outcomes that wrote a file.
    #[must_use]
    pub fn is_downloaded(&self) -> bool {
        matches!(self, Self::Downloaded { .. })
    }

    /// True for ledger hits.
    #[must_use]
    pub fn is_skipped(&self) -> bool {
        matches!(self, Self::AlreadyDownloaded { .. })
    }

    /// True for every failure outcome.
    #[must_use]
    pub fn is_failure(&self) -> bool {
        !self.is_downloaded() && !self.is_skipped()
    }
}

/// Everything a task needs, shared by all tasks of a batch.
pub(crate) struct TaskContext {
    pub(crate) client: HttpClient,
    pub(crate) ledger: Arc<DownloadLedger>,
    pub(crate) classifier: LinkClassifier,
    pub(crate) resolvers: Arc<ResolverRegistry>,
    pub(crate) output_dir: PathBuf,
    pub(crate) progress: Option<SharedProgressObserver>,
}

/// Runs one URL through the pipeline to a terminal outcome.
#[instrument(skip(ctx), fields(url = %url))]
pub(crate) async fn run_download_task(ctx: &TaskContext, url: &str) -> TaskOutcome {
    let class = ctx.classifier.classify(url);
    let identifier = if class.needs_indirection {
        class.identifier.clone()
    } else {
        identifier_from_url(url)
    };

    if identifier.is_none() && !class.needs_indirection {
        error!("failed to extract a content identifier from link");
        return TaskOutcome::Unresolvable;
    }

    if let Some(id) = &identifier
        && is_recorded(&ctx.ledger, id).await
    {
        info!(id = %id, "skipping download, file has been previously downloaded");
        return TaskOutcome::AlreadyDownloaded { id: id.clone() };
    }

    let Some(resolver) = ctx.resolvers.find(&class) else {
        let e = ResolveError::no_resolver(url);
        error!(error = %e, "cannot resolve link");
        return TaskOutcome::ResolveFailed {
            reason: e.to_string(),
        };
    };

    let request = ResolveRequest::new(url, class);
    let resolved = match resolver.resolve(&request).await {
        Ok(resolved) => resolved,
        Err(e) => {
            warn!(resolver = resolver.name(), error = %e, "failed to resolve link");
            return TaskOutcome::ResolveFailed {
                reason: e.to_string(),
            };
        }
    };

    let identifier = match identifier {
        Some(id) => id,
        None => {
            // Without an id the file could never be recognised as downloaded.
            let Some(id) = resolved.identifier.clone() else {
                error!(
                    resolved_url = %resolved.url,
                    "resolution produced no content identifier; not downloading"
                );
                return TaskOutcome::Unresolvable;
            };
            if is_recorded(&ctx.ledger, &id).await {
                info!(id = %id, "skipping download, resolved file has been previously downloaded");
                return TaskOutcome::AlreadyDownloaded { id };
            }
            id
        }
    };

    fetch_and_store(ctx, &resolved, &identifier).await
}

async fn is_recorded(ledger: &DownloadLedger, id: &str) -> bool {
    match ledger.has_entry(id).await {
        Ok(found) => found,
        Err(e) => {
            warn!(id = %id, error = %e, "cannot read ledger; treating file as not downloaded");
            false
        }
    }
}

async fn fetch_and_store(
    ctx: &TaskContext,
    resolved: &ResolvedDownload,
    identifier: &str,
) -> TaskOutcome {
    let destination = match resolve_within(&ctx.output_dir, Path::new(&resolved.file_name)) {
        Ok(destination) => destination,
        Err(e) => {
            error!(
                file_name = %resolved.file_name,
                error = %e,
                "refusing to write outside cache root"
            );
            return TaskOutcome::Rejected {
                reason: e.to_string(),
            };
        }
    };

    info!(url = %resolved.url, via = ?resolved.via, "downloading");
    let fetched = match ctx
        .client
        .fetch_to_file(&resolved.url, &destination, ctx.progress.as_deref())
        .await
    {
        Ok(fetched) => fetched,
        Err(e) => {
            if resolved.via == ResolvePath::Fallback {
                warn!(url = %resolved.url, error = %e, "fallback download failed");
            } else {
                warn!(url = %resolved.url, error = %e, "download failed");
            }
            return TaskOutcome::FetchFailed {
                reason: e.to_string(),
            };
        }
    };

    if let Err(e) = ctx
        .ledger
        .record_or_merge(identifier, resolved.alias.as_deref())
        .await
    {
        warn!(id = %identifier, error = %e, "failed to record download in ledger");
    }

    let expanded = if is_archive(&resolved.file_name) {
        expand_and_remove(&fetched.path, &ctx.output_dir).await
    } else {
        None
    };

    TaskOutcome::Downloaded {
        path: fetched.path,
        bytes: fetched.bytes,
        expanded,
    }
}

/// Expands an archive on the blocking pool, then deletes it whatever the result.
async fn expand_and_remove(archive: &Path, root: &Path) -> Option<usize> {
    let archive_path = archive.to_path_buf();
    let root = root.to_path_buf();
    let result = tokio::task::spawn_blocking(move || expand_archive(&archive_path, &root)).await;

    let expanded = match result {
        Ok(Ok(count)) => Some(count),
        Ok(Err(e)) if e.is_security_violation() => {
            error!(archive = %archive.display(), error = %e, "archive rejected");
            None
        }
        Ok(Err(e)) => {
            warn!(archive = %archive.display(), error = %e, "archive expansion failed");
            None
        }
        Err(e) => {
            warn!(archive = %archive.display(), error = %e, "archive expansion task failed");
            None
        }
    };

    match tokio::fs::remove_file(archive).await {
        Ok(()) => debug!(archive = %archive.display(), "archive deleted"),
        Err(e) => warn!(archive = %archive.display(), error = %e, "failed to delete archive"),
    }
    expanded
}
