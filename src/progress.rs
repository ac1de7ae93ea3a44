//! Progress bars for running downloads.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use indicatif::{MultiProgress, ProgressBar, ProgressDrawTarget, ProgressStyle};
use songcache_core::download::{FetchProgress, ProgressObserver};
use url::Url;

/// One indicatif bar per URL, driven by the fetcher's coarse progress events.
pub(crate) struct BarObserver {
    multi: MultiProgress,
    bars: Mutex<HashMap<String, ProgressBar>>,
}

impl BarObserver {
    /// Creates the observer. When `visible` is false nothing is drawn.
    pub(crate) fn new(visible: bool) -> Self {
        let target = if visible {
            ProgressDrawTarget::stderr()
        } else {
            ProgressDrawTarget::hidden()
        };
        Self {
            multi: MultiProgress::with_draw_target(target),
            bars: Mutex::new(HashMap::new()),
        }
    }

    fn bar_for(&self, url: &str, total: Option<u64>) -> ProgressBar {
        let mut bars = self.bars.lock().unwrap_or_else(PoisonError::into_inner);
        bars.entry(url.to_string())
            .or_insert_with(|| {
                let bar = self.multi.add(ProgressBar::new(total.unwrap_or(0)));
                bar.set_style(
                    ProgressStyle::with_template("{msg:30!} [{bar:30}] {percent:>3}% {bytes}")
                        .unwrap_or_else(|_| ProgressStyle::default_bar()),
                );
                bar.set_message(display_name(url));
                bar
            })
            .clone()
    }
}

impl ProgressObserver for BarObserver {
    fn on_progress(&self, url: &str, progress: FetchProgress) {
        let bar = self.bar_for(url, progress.total);
        if let Some(total) = progress.total {
            bar.set_length(total);
        }
        bar.set_position(progress.bytes);
        if progress.total.is_some_and(|total| progress.bytes >= total) {
            bar.finish();
        }
    }
}

/// Short label for a bar: the last path segment, or the host.
fn display_name(url: &str) -> String {
    let Ok(parsed) = Url::parse(url) else {
        return url.to_string();
    };
    parsed
        .path_segments()
        .and_then(|mut segments| segments.next_back().map(str::to_string))
        .filter(|segment| !segment.is_empty())
        .or_else(|| parsed.host_str().map(str::to_string))
        .unwrap_or_else(|| url.to_string())
}
