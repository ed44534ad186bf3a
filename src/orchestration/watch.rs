//! File watching with coalesced re-runs.
//!
//! A change event requests a re-run of the task mapped to the changed file's
//! extension. Each task owns a [`RerunSlot`]: at most one run is in flight
//! and at most one more is pending, no matter how many events arrive while
//! the current run is busy.

use notify::{Config, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Notify;
use tokio::task::JoinHandle;

use crate::orchestration::Runner;
use crate::util::in_node_modules;
use crate::{klog, klog_debug, klog_error, klog_trace, klog_warn};

/// Pending re-run request for one task.
#[derive(Clone, Debug)]
pub struct RerunSlot {
    task: String,
    notify: Arc<Notify>,
}

impl RerunSlot {
    pub fn new(task: &str) -> Self {
        Self {
            task: task.to_string(),
            notify: Arc::new(Notify::new()),
        }
    }

    pub fn task(&self) -> &str {
        &self.task
    }

    /// Ask for a re-run. Requests made while one is already pending merge
    /// into it.
    pub fn request(&self) {
        self.notify.notify_one();
    }

    /// Serve requests until the runner's session is cancelled. Returns the
    /// number of runs performed.
    pub fn spawn(self, runner: Runner) -> JoinHandle<usize> {
        tokio::spawn(async move {
            let cancel = runner.cancel_token().clone();
            let mut runs = 0;
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = self.notify.notified() => {
                        runs += 1;
                        match runner.run(&self.task).await {
                            Ok(report) if !report.outcome.is_success() => {
                                klog_warn!("'{}' failed, waiting for the next change", self.task);
                            }
                            Ok(_) => {}
                            Err(e) => klog_error!("{}", e),
                        }
                    }
                }
            }
            klog_debug!("Re-run loop for '{}' stopped after {} runs", self.task, runs);
            runs
        })
    }
}

/// Files with `extension` re-trigger `slot`.
#[derive(Clone, Debug)]
pub struct WatchRoute {
    pub extension: String,
    pub slot: RerunSlot,
}

impl WatchRoute {
    pub fn new(extension: &str, slot: RerunSlot) -> Self {
        Self {
            extension: extension.to_string(),
            slot,
        }
    }

    fn matches(&self, path: &Path) -> bool {
        path.extension()
            .map(|ext| ext == self.extension.as_str())
            .unwrap_or(false)
    }
}

/// True for events that describe content changes worth rebuilding for.
fn is_change(kind: &EventKind) -> bool {
    matches!(
        kind,
        EventKind::Create(_) | EventKind::Modify(_) | EventKind::Remove(_)
    )
}

/// Routes an event touches, each at most once, in route order.
pub fn routes_for<'a>(event: &Event, routes: &'a [WatchRoute]) -> Vec<&'a WatchRoute> {
    if !is_change(&event.kind) {
        return Vec::new();
    }
    let paths: Vec<&PathBuf> = event
        .paths
        .iter()
        .filter(|p| !in_node_modules(p))
        .filter(|p| {
            !p.file_name()
                .map(|n| n.to_string_lossy().ends_with(".kiln-tmp"))
                .unwrap_or(false)
        })
        .collect();
    routes
        .iter()
        .filter(|route| paths.iter().any(|p| route.matches(p)))
        .collect()
}

/// Watch `root` recursively and forward matching changes to the routes.
///
/// Returns the watcher handle, which must be kept alive.
pub fn start_watching(root: &Path, routes: Vec<WatchRoute>) -> notify::Result<RecommendedWatcher> {
    let mut watcher = RecommendedWatcher::new(
        move |res: notify::Result<Event>| match res {
            Ok(event) => {
                klog_trace!("watch event {:?} {:?}", event.kind, event.paths);
                for route in routes_for(&event, &routes) {
                    klog!(
                        "Change detected, scheduling '{}'",
                        route.slot.task()
                    );
                    route.slot.request();
                }
            }
            Err(e) => klog_error!("watch error: {}", e),
        },
        Config::default(),
    )?;
    watcher.watch(root, RecursiveMode::Recursive)?;
    klog_debug!("Watching {}", root.display());
    Ok(watcher)
}
