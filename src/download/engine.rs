//! Batch coordination: one task per URL and a single completion callback.
//!
//! The [`DownloaderService`] fans a URL list out into independent Tokio tasks.
//! A shared [`BatchState`] counts pending tasks and owns the completion
//! callback; each task holds a [`PendingGuard`] whose drop decrements the
//! count, so ledger hits, failures, panics and successes all count exactly
//! once.
//!
//! # Example
//!
//! ```no_run
//! use songcache_core::download::{DownloaderService, HttpClient};
//! use songcache_core::ledger::DownloadLedger;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let service = DownloaderService::new(
//!     HttpClient::new(),
//!     DownloadLedger::new("./downloadedFiles.txt"),
//!     "./Boombox Music",
//! );
//! let batch = service.start_batch(
//!     vec!["https://drive.google.com/uc?id=ABC123".to_string()],
//!     Some(Box::new(|| println!("all downloads complete"))),
//! )?;
//! let report = batch.join().await;
//! println!("downloaded {}, skipped {}", report.downloaded(), report.skipped());
//! # Ok(())
//! # }
//! ```

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use tokio::runtime::Handle;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, instrument, warn};

use super::client::{HttpClient, SharedProgressObserver};
use super::task::{TaskContext, TaskOutcome, run_download_task};
use crate::ledger::DownloadLedger;
use crate::resolver::{
    DriveEndpoints, LinkClassifier, ResolverRegistry, build_default_resolver_registry,
};

/// Minimum allowed concurrency value.
const MIN_CONCURRENCY: usize = 1;

/// Maximum allowed concurrency value.
const MAX_CONCURRENCY: usize = 100;

/// Default number of transfers running at once.
pub const DEFAULT_CONCURRENCY: usize = 10;

/// Invoked once when every task of a batch has finished.
pub type CompletionCallback = Box<dyn FnOnce() + Send + 'static>;

/// Error type for download engine operations.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// Invalid concurrency value provided.
    #[error(
        "invalid concurrency value {value}: must be between {MIN_CONCURRENCY} and {MAX_CONCURRENCY}"
    )]
    InvalidConcurrency {
        /// The invalid value that was provided.
        value: usize,
    },

    /// A non-empty batch was started outside a Tokio runtime.
    #[error("batch started outside a Tokio runtime")]
    NoRuntime,
}

struct BatchInner {
    pending: usize,
    on_complete: Option<CompletionCallback>,
}

/// Pending-task counter paired with a one-shot completion callback.
///
/// Decrement and the zero check happen under one lock; the callback is taken
/// out of the state before it runs, so it can fire at most once.
pub struct BatchState {
    inner: Mutex<BatchInner>,
}

impl std::fmt::Debug for BatchState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        f.debug_struct("BatchState")
            .field("pending", &inner.pending)
            .field("has_callback", &inner.on_complete.is_some())
            .finish()
    }
}

impl BatchState {
    /// Creates a state expecting `pending` completions.
    ///
    /// With `pending == 0` the callback never fires; callers handle empty
    /// batches before creating a state.
    #[must_use]
    pub fn new(pending: usize, on_complete: Option<CompletionCallback>) -> Self {
        Self {
            inner: Mutex::new(BatchInner {
                pending,
                on_complete,
            }),
        }
    }

    /// Tasks still running.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pending
    }

    /// Records one finished task. Returns true if this was the last one.
    ///
    /// Extra calls after the count reached zero are logged and ignored.
    pub fn complete_one(&self) -> bool {
        let callback = {
            let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
            if inner.pending == 0 {
                warn!("task completion reported with no pending downloads");
                return false;
            }
            inner.pending -= 1;
            info!(pending = inner.pending, "pending downloads remaining");
            if inner.pending > 0 {
                return false;
            }
            inner.on_complete.take()
        };

        info!("all downloads complete");
        if let Some(callback) = callback {
            callback();
        }
        true
    }
}

/// Decrements the batch count when dropped.
#[derive(Debug)]
pub struct PendingGuard {
    state: Arc<BatchState>,
}

impl PendingGuard {
    /// Creates a guard for one task of the batch.
    #[must_use]
    pub fn new(state: Arc<BatchState>) -> Self {
        Self { state }
    }
}

impl Drop for PendingGuard {
    fn drop(&mut self) {
        self.state.complete_one();
    }
}

/// Outcomes of a finished batch, in request order.
#[derive(Debug, Default)]
pub struct BatchReport {
    /// `(url, outcome)` per requested URL.
    pub outcomes: Vec<(String, TaskOutcome)>,
}

impl BatchReport {
    /// Number of files written.
    #[must_use]
    pub fn downloaded(&self) -> usize {
        self.count(TaskOutcome::is_downloaded)
    }

    /// Number of ledger hits.
    #[must_use]
    pub fn skipped(&self) -> usize {
        self.count(TaskOutcome::is_skipped)
    }

    /// Number of failed tasks.
    #[must_use]
    pub fn failed(&self) -> usize {
        self.count(TaskOutcome::is_failure)
    }

    /// Total number of tasks.
    #[must_use]
    pub fn total(&self) -> usize {
        self.outcomes.len()
    }

    fn count(&self, predicate: impl Fn(&TaskOutcome) -> bool) -> usize {
        self.outcomes
            .iter()
            .filter(|(_, outcome)| predicate(outcome))
            .count()
    }
}

/// Handle on a running batch.
#[derive(Debug)]
pub struct BatchHandle {
    tasks: Vec<(String, JoinHandle<TaskOutcome>)>,
    state: Option<Arc<BatchState>>,
}

impl BatchHandle {
    fn empty() -> Self {
        Self {
            tasks: Vec::new(),
            state: None,
        }
    }

    /// Tasks still running.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.state.as_ref().map_or(0, |state| state.pending())
    }

    /// Waits for every task and collects the outcomes.
    ///
    /// The completion callback has fired by the time this returns.
    pub async fn join(self) -> BatchReport {
        let mut report = BatchReport::default();
        for (url, task) in self.tasks {
            let outcome = match task.await {
                Ok(outcome) => outcome,
                Err(e) => {
                    error!(url = %url, error = %e, "download task aborted");
                    TaskOutcome::FetchFailed {
                        reason: e.to_string(),
                    }
                }
            };
            report.outcomes.push((url, outcome));
        }
        report
    }
}

/// Owns the shared collaborators and starts batches.
pub struct DownloaderService {
    client: HttpClient,
    ledger: Arc<DownloadLedger>,
    classifier: LinkClassifier,
    resolvers: Arc<ResolverRegistry>,
    output_dir: PathBuf,
    progress: Option<SharedProgressObserver>,
    semaphore: Arc<Semaphore>,
    concurrency: usize,
}

impl std::fmt::Debug for DownloaderService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DownloaderService")
            .field("ledger", &self.ledger.path())
            .field("output_dir", &self.output_dir)
            .field("concurrency", &self.concurrency)
            .finish_non_exhaustive()
    }
}

impl DownloaderService {
    /// Creates a service writing under `output_dir` with the default hosts and endpoints.
    #[must_use]
    pub fn new(client: HttpClient, ledger: DownloadLedger, output_dir: impl Into<PathBuf>) -> Self {
        let resolvers = build_default_resolver_registry(client.clone(), DriveEndpoints::default());
        Self {
            client,
            ledger: Arc::new(ledger),
            classifier: LinkClassifier::new(),
            resolvers: Arc::new(resolvers),
            output_dir: output_dir.into(),
            progress: None,
            semaphore: Arc::new(Semaphore::new(DEFAULT_CONCURRENCY)),
            concurrency: DEFAULT_CONCURRENCY,
        }
    }

    /// Replaces the indirection host list and content endpoints.
    #[must_use]
    pub fn with_indirection(
        mut self,
        classifier: LinkClassifier,
        endpoints: DriveEndpoints,
    ) -> Self {
        self.classifier = classifier;
        self.resolvers = Arc::new(build_default_resolver_registry(
            self.client.clone(),
            endpoints,
        ));
        self
    }

    /// Reports coarse fetch progress to `observer`.
    #[must_use]
    pub fn with_progress_observer(mut self, observer: SharedProgressObserver) -> Self {
        self.progress = Some(observer);
        self
    }

    /// Limits how many tasks transfer at once.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::InvalidConcurrency`] outside 1-100.
    pub fn with_concurrency(mut self, concurrency: usize) -> Result<Self, EngineError> {
        if !(MIN_CONCURRENCY..=MAX_CONCURRENCY).contains(&concurrency) {
            return Err(EngineError::InvalidConcurrency { value: concurrency });
        }
        self.semaphore = Arc::new(Semaphore::new(concurrency));
        self.concurrency = concurrency;
        Ok(self)
    }

    /// Destination root.
    #[must_use]
    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// The ledger this service records into.
    #[must_use]
    pub fn ledger(&self) -> &DownloadLedger {
        &self.ledger
    }

    /// Starts one task per URL and returns immediately.
    ///
    /// An empty list invokes `on_complete` synchronously and starts nothing.
    /// Otherwise `on_complete` runs exactly once, on the task that finishes last.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::NoRuntime`] if a non-empty batch is started
    /// outside a Tokio runtime; the callback is dropped without running.
    #[instrument(skip(self, urls, on_complete), fields(count = urls.len()))]
    pub fn start_batch(
        &self,
        urls: Vec<String>,
        on_complete: Option<CompletionCallback>,
    ) -> Result<BatchHandle, EngineError> {
        if urls.is_empty() {
            warn!("no download links provided");
            if let Some(callback) = on_complete {
                callback();
            }
            return Ok(BatchHandle::empty());
        }

        let runtime = Handle::try_current().map_err(|_| EngineError::NoRuntime)?;
        self.ensure_output_dir();

        let state = Arc::new(BatchState::new(urls.len(), on_complete));
        let ctx = Arc::new(self.task_context());
        info!(pending = urls.len(), "starting download batch");

        let tasks = urls
            .into_iter()
            .map(|url| {
                let guard = PendingGuard::new(Arc::clone(&state));
                let ctx = Arc::clone(&ctx);
                let semaphore = Arc::clone(&self.semaphore);
                let task_url = url.clone();
                let handle = runtime.spawn(async move {
                    let _guard = guard;
                    // Permit is dropped when this block exits (RAII)
                    let _permit = semaphore.acquire_owned().await.ok();
                    run_download_task(&ctx, &task_url).await
                });
                (url, handle)
            })
            .collect();

        Ok(BatchHandle {
            tasks,
            state: Some(state),
        })
    }

    /// Runs a batch to completion without a callback.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::NoRuntime`] outside a Tokio runtime.
    pub async fn run_batch(&self, urls: Vec<String>) -> Result<BatchReport, EngineError> {
        Ok(self.start_batch(urls, None)?.join().await)
    }

    fn ensure_output_dir(&self) {
        if self.output_dir.is_dir() {
            return;
        }
        match std::fs::create_dir_all(&self.output_dir) {
            Ok(()) => debug!(dir = %self.output_dir.display(), "created output directory"),
            Err(e) => error!(
                dir = %self.output_dir.display(),
                error = %e,
                "cannot create output directory"
            ),
        }
    }

    fn task_context(&self) -> TaskContext {
        TaskContext {
            client: self.client.clone(),
            ledger: Arc::clone(&self.ledger),
            classifier: self.classifier.clone(),
            resolvers: Arc::clone(&self.resolvers),
            output_dir: self.output_dir.clone(),
            progress: self.progress.clone(),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    fn counting_callback() -> (Arc<AtomicUsize>, CompletionCallback) {
        let fired = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&fired);
        (
            fired,
            Box::new(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            }),
        )
    }

    fn service(temp_dir: &TempDir) -> DownloaderService {
        DownloaderService::new(
            HttpClient::new(),
            DownloadLedger::new(temp_dir.path().join("downloadedFiles.txt")),
            temp_dir.path().join("music"),
        )
    }

    #[test]
    fn test_batch_state_fires_once_on_last_completion() {
        let (fired, callback) = counting_callback();
        let state = BatchState::new(3, Some(callback));

        assert!(!state.complete_one());
        assert!(!state.complete_one());
        assert_eq!(fired.load(Ordering::SeqCst), 0);
        assert!(state.complete_one());
        assert_eq!(fired.load(Ordering::SeqCst), 1);

        assert!(!state.complete_one());
        assert_eq!(fired.load(Ordering::SeqCst), 1);
        assert_eq!(state.pending(), 0);
    }

    #[test]
    fn test_pending_guard_decrements_on_drop() {
        let (fired, callback) = counting_callback();
        let state = Arc::new(BatchState::new(2, Some(callback)));
        let first = PendingGuard::new(Arc::clone(&state));
        let second = PendingGuard::new(Arc::clone(&state));

        drop(first);
        assert_eq!(state.pending(), 1);
        drop(second);
        assert_eq!(state.pending(), 0);
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_concurrent_completions_fire_exactly_once() {
        let (fired, callback) = counting_callback();
        let state = Arc::new(BatchState::new(64, Some(callback)));

        let threads: Vec<_> = (0..64)
            .map(|_| {
                let state = Arc::clone(&state);
                std::thread::spawn(move || state.complete_one())
            })
            .collect();
        let last_count = threads
            .into_iter()
            .map(|t| t.join().unwrap())
            .filter(|last| *last)
            .count();

        assert_eq!(last_count, 1);
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_empty_batch_fires_synchronously_without_runtime() {
        let temp_dir = TempDir::new().unwrap();
        let (fired, callback) = counting_callback();

        let handle = service(&temp_dir).start_batch(Vec::new(), Some(callback)).unwrap();

        assert_eq!(fired.load(Ordering::SeqCst), 1);
        assert_eq!(handle.pending(), 0);
        assert!(!temp_dir.path().join("music").exists());
    }

    #[test]
    fn test_non_empty_batch_requires_runtime() {
        let temp_dir = TempDir::new().unwrap();
        let result = service(&temp_dir).start_batch(vec!["https://example.com/a.mp3".into()], None);
        assert!(matches!(result, Err(EngineError::NoRuntime)));
    }

    #[test]
    fn test_concurrency_bounds() {
        let temp_dir = TempDir::new().unwrap();
        assert!(matches!(
            service(&temp_dir).with_concurrency(0),
            Err(EngineError::InvalidConcurrency { value: 0 })
        ));
        assert!(service(&temp_dir).with_concurrency(101).is_err());
        assert!(service(&temp_dir).with_concurrency(1).is_ok());
    }

    #[tokio::test]
    async fn test_unresolvable_links_still_complete_batch() {
        let temp_dir = TempDir::new().unwrap();
        let (fired, callback) = counting_callback();

        let batch = service(&temp_dir)
            .start_batch(
                vec!["not a url".to_string(), "also::bad".to_string()],
                Some(callback),
            )
            .unwrap();
        let report = batch.join().await;

        assert_eq!(fired.load(Ordering::SeqCst), 1);
        assert_eq!(report.total(), 2);
        assert_eq!(report.failed(), 2);
        assert!(temp_dir.path().join("music").is_dir());
    }

    #[test]
    fn test_report_counts() {
        let report = BatchReport {
            outcomes: vec![
                ("a".into(), TaskOutcome::Unresolvable),
                ("b".into(), TaskOutcome::AlreadyDownloaded { id: "b".into() }),
                (
                    "c".into(),
                    TaskOutcome::Downloaded {
                        path: PathBuf::from("c.mp3"),
                        bytes: 3,
                        expanded: None,
                    },
                ),
            ],
        };
        assert_eq!(report.downloaded(), 1);
        assert_eq!(report.skipped(), 1);
        assert_eq!(report.failed(), 1);
    }
}
