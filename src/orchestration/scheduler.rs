//! Runner for the task graph.
//!
//! The Runner executes a task by name: leaf steps are awaited directly,
//! composites run their stages in order. Tasks within one stage are started
//! together and joined; the next stage never starts before every task of the
//! previous one has finished. A failed task stops the rest of its sequence,
//! and the composite reports the first failure in declaration order.

use colored::Colorize;
use futures::future::{join_all, BoxFuture, FutureExt};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;

use crate::config::Config;
use crate::core::{Banner, BuildMode, Stage, TaskBody, TaskOutcome, TaskRegistry};
use crate::error::{Error, Result};
use crate::tools::Toolchain;
use crate::{klog, klog_error};

/// What a run does after a hard failure has been logged.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailurePolicy {
    /// `run` returns `Error::TaskFailed`; used for one-shot CLI runs.
    Abort,
    /// `run` returns the failed report; used by watch sessions so the next
    /// change can trigger a fresh run.
    LogAndContinue,
}

/// Events emitted by the runner for task lifecycle changes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunEvent {
    TaskStarted {
        task: String,
    },
    TaskFinished {
        task: String,
        outcome: TaskOutcome,
        elapsed: Duration,
    },
}

/// Summary of one top-level run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunReport {
    pub task: String,
    pub outcome: TaskOutcome,
    pub elapsed: Duration,
}

/// State shared by every clone of a runner.
struct Shared {
    registry: TaskRegistry,
    config: Arc<Config>,
    mode: BuildMode,
    tools: Toolchain,
    cancel: CancellationToken,
    page: Mutex<()>,
}

/// Executes tasks from a registry against one configuration.
///
/// Cloning is cheap; clones share the registry, configuration and
/// cancellation token. Steps receive the runner so long-running ones
/// (`watch`) can schedule further runs.
///
/// # Example
///
/// ```ignore
/// let runner = Runner::new(registry, config, BuildMode::Development, tools)?;
/// let report = runner.run("build").await?;
/// assert!(report.outcome.is_success());
/// ```
#[derive(Clone)]
pub struct Runner {
    shared: Arc<Shared>,
    policy: FailurePolicy,
    events: Option<mpsc::UnboundedSender<RunEvent>>,
}

impl Runner {
    /// Create a runner. The registry is validated up front.
    pub fn new(
        registry: TaskRegistry,
        config: Config,
        mode: BuildMode,
        tools: Toolchain,
    ) -> Result<Self> {
        registry.validate()?;
        Ok(Self {
            shared: Arc::new(Shared {
                registry,
                config: Arc::new(config),
                mode,
                tools,
                cancel: CancellationToken::new(),
                page: Mutex::new(()),
            }),
            policy: FailurePolicy::Abort,
            events: None,
        })
    }

    /// Same runner with a different failure policy.
    pub fn with_policy(&self, policy: FailurePolicy) -> Self {
        Self {
            policy,
            ..self.clone()
        }
    }

    /// Same runner, also emitting lifecycle events to `tx`.
    pub fn with_events(&self, tx: mpsc::UnboundedSender<RunEvent>) -> Self {
        Self {
            events: Some(tx),
            ..self.clone()
        }
    }

    pub fn config(&self) -> &Config {
        &self.shared.config
    }

    pub fn mode(&self) -> BuildMode {
        self.shared.mode
    }

    pub fn tools(&self) -> &Toolchain {
        &self.shared.tools
    }

    pub fn registry(&self) -> &TaskRegistry {
        &self.shared.registry
    }

    pub fn policy(&self) -> FailurePolicy {
        self.policy
    }

    /// Token cancelled when the session should end (Ctrl-C).
    pub fn cancel_token(&self) -> &CancellationToken {
        &self.shared.cancel
    }

    /// Held while a step rewrites the output page. Both pipelines inject
    /// into the same file and may run at the same time.
    pub fn page_lock(&self) -> &Mutex<()> {
        &self.shared.page
    }

    /// Run a task by name.
    ///
    /// The task and everything it runs must be registered; otherwise this
    /// fails with `UnknownTask` before any step executes.
    pub async fn run(&self, name: &str) -> Result<RunReport> {
        self.registry().check_closure(name)?;

        let started = Instant::now();
        let outcome = self.execute(name).await;
        let report = RunReport {
            task: name.to_string(),
            outcome,
            elapsed: started.elapsed(),
        };

        match (&report.outcome, self.policy) {
            (TaskOutcome::Failed { task, detail }, FailurePolicy::Abort) => {
                Err(Error::TaskFailed {
                    task: task.clone(),
                    detail: detail.clone(),
                })
            }
            _ => Ok(report),
        }
    }

    fn emit(&self, event: RunEvent) {
        if let Some(tx) = &self.events {
            let _ = tx.send(event);
        }
    }

    fn execute<'a>(&'a self, name: &'a str) -> BoxFuture<'a, TaskOutcome> {
        async move {
            let Some(def) = self.registry().get(name) else {
                // check_closure ran first, so this only trips on misuse.
                return TaskOutcome::Failed {
                    task: name.to_string(),
                    detail: Error::UnknownTask(name.to_string()).to_string(),
                };
            };

            self.emit(RunEvent::TaskStarted {
                task: name.to_string(),
            });
            klog!("Starting '{}'...", name.cyan());
            let started = Instant::now();

            let outcome = match &def.body {
                TaskBody::Step(step) => match step.run(self).await {
                    Ok(()) => TaskOutcome::Succeeded,
                    Err(e) => {
                        klog_error!("{}", e);
                        TaskOutcome::Failed {
                            task: name.to_string(),
                            detail: e.to_string(),
                        }
                    }
                },
                TaskBody::Sequence { stages, banner } => {
                    if let Some(banner) = banner {
                        show_banner(banner);
                    }
                    self.run_stages(stages).await
                }
            };

            let took = started.elapsed();
            let elapsed = format_elapsed(took);
            if outcome.is_success() {
                klog!("Finished '{}' after {}", name.cyan(), elapsed.magenta());
            } else {
                klog_error!("'{}' errored after {}", name, elapsed);
            }
            self.emit(RunEvent::TaskFinished {
                task: name.to_string(),
                outcome: outcome.clone(),
                elapsed: took,
            });
            outcome
        }
        .boxed()
    }

    async fn run_stages(&self, stages: &[Stage]) -> TaskOutcome {
        for stage in stages {
            let outcomes = join_all(stage.tasks().iter().map(|t| self.execute(t))).await;
            if let Some(failed) = outcomes.into_iter().find(|o| !o.is_success()) {
                return failed;
            }
        }
        TaskOutcome::Succeeded
    }
}

impl std::fmt::Debug for Runner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Runner")
            .field("registry", &self.shared.registry)
            .field("mode", &self.shared.mode)
            .field("policy", &self.policy)
            .finish()
    }
}

fn show_banner(banner: &Banner) {
    match banner {
        Banner::Line(text) => klog!("{}", format!("*** {} ***", text).green().bold()),
        Banner::Boxed(lines) => {
            let lines: Vec<&str> = lines.iter().map(String::as_str).collect();
            crate::log::banner(&lines);
        }
    }
}

/// `245 ms`, `1.23 s`, `2.5 min`.
pub fn format_elapsed(elapsed: Duration) -> String {
    let millis = elapsed.as_millis();
    if millis < 1000 {
        format!("{} ms", millis)
    } else if millis < 60_000 {
        format!("{:.2} s", elapsed.as_secs_f64())
    } else {
        format!("{:.1} min", elapsed.as_secs_f64() / 60.0)
    }
}
