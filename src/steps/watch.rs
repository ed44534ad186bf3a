//! Persistent watch session.

use async_trait::async_trait;

use crate::core::Step;
use crate::orchestration::{start_watching, FailurePolicy, RerunSlot, Runner, WatchRoute};
use crate::{klog, Error, Result};

/// Extension to task routing for the source tree.
pub fn default_routes() -> Vec<WatchRoute> {
    vec![
        WatchRoute::new("js", RerunSlot::new("build-js")),
        WatchRoute::new("scss", RerunSlot::new("build-sass")),
    ]
}

/// Watch the source tree and rebuild the affected pipeline on change.
///
/// Runs until the session is cancelled. Failed rebuilds are logged and the
/// session keeps going.
pub struct WatchStep;

#[async_trait]
impl Step for WatchStep {
    fn description(&self) -> &str {
        "Watch the sources and rebuild on change"
    }

    async fn run(&self, runner: &Runner) -> Result<()> {
        let config = runner.config();
        let src = config.resolve(&config.paths.src);
        if !src.is_dir() {
            return Err(Error::MissingSource(src));
        }

        crate::log::banner(&["Start watching your source files", "", "Happy coding"]);

        let session = runner.with_policy(FailurePolicy::LogAndContinue);
        let routes = default_routes();
        let loops: Vec<_> = routes
            .iter()
            .map(|route| route.slot.clone().spawn(session.clone()))
            .collect();

        let watcher = start_watching(&src, routes)?;
        klog!("Watching {} (Ctrl-C to stop)", src.display());

        runner.cancel_token().cancelled().await;
        drop(watcher);

        let mut runs = 0;
        for handle in loops {
            runs += handle
                .await
                .map_err(|e| Error::TaskJoin(e.to_string()))?;
        }
        klog!("Watch session ended after {} rebuild(s)", runs);
        Ok(())
    }
}
