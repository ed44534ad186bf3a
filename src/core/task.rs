//! Task data model for the build graph.
//!
//! A task is either a leaf step wrapping one unit of build work, or a
//! composite that runs other tasks in ordered stages.

use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;

use crate::error::Result;
use crate::orchestration::Runner;

/// Output mode selected by the `--production` flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BuildMode {
    /// Expanded, debuggable output with source maps.
    #[default]
    Development,
    /// Compact, minified output without debug annotations.
    Production,
}

impl BuildMode {
    pub fn from_flag(production: bool) -> Self {
        if production {
            BuildMode::Production
        } else {
            BuildMode::Development
        }
    }

    pub fn is_production(&self) -> bool {
        matches!(self, BuildMode::Production)
    }
}

impl fmt::Display for BuildMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BuildMode::Development => write!(f, "development"),
            BuildMode::Production => write!(f, "production"),
        }
    }
}

/// A leaf unit of build work.
///
/// Returning `Err` is a hard failure; the runner logs it and records a
/// failed outcome. Steps with informational findings (the linter) report
/// them themselves and return `Ok`.
#[async_trait]
pub trait Step: Send + Sync {
    /// One-line description shown by `kiln tasks`.
    fn description(&self) -> &str;

    async fn run(&self, runner: &Runner) -> Result<()>;
}

/// Ordered group of task names started together and joined.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Stage(pub Vec<String>);

impl Stage {
    /// A stage with exactly one task.
    pub fn single(name: &str) -> Self {
        Self(vec![name.to_string()])
    }

    /// A stage whose tasks run concurrently.
    pub fn parallel(names: &[&str]) -> Self {
        Self(names.iter().map(|n| n.to_string()).collect())
    }

    pub fn tasks(&self) -> &[String] {
        &self.0
    }
}

impl From<&str> for Stage {
    fn from(name: &str) -> Self {
        Stage::single(name)
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.len() == 1 {
            write!(f, "{}", self.0[0])
        } else {
            write!(f, "[{}]", self.0.join(", "))
        }
    }
}

/// Text logged when a composite starts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Banner {
    /// `*** text ***` on one line.
    Line(String),
    /// Lines framed in a box of `#`.
    Boxed(Vec<String>),
}

/// What a task does when run.
#[derive(Clone)]
pub enum TaskBody {
    Step(Arc<dyn Step>),
    Sequence {
        stages: Vec<Stage>,
        banner: Option<Banner>,
    },
}

/// A named entry of the task registry.
#[derive(Clone)]
pub struct TaskDef {
    pub name: String,
    pub description: String,
    pub body: TaskBody,
}

impl TaskDef {
    pub fn step(name: &str, step: Arc<dyn Step>) -> Self {
        Self {
            name: name.to_string(),
            description: step.description().to_string(),
            body: TaskBody::Step(step),
        }
    }

    pub fn sequence(name: &str, description: &str, stages: Vec<Stage>) -> Self {
        Self {
            name: name.to_string(),
            description: description.to_string(),
            body: TaskBody::Sequence {
                stages,
                banner: None,
            },
        }
    }

    /// Attach a start banner to a composite. No effect on leaf steps.
    pub fn with_banner(mut self, text: Banner) -> Self {
        if let TaskBody::Sequence { banner, .. } = &mut self.body {
            *banner = Some(text);
        }
        self
    }

    /// Names this task runs directly, in stage order.
    pub fn children(&self) -> Vec<&str> {
        match &self.body {
            TaskBody::Step(_) => Vec::new(),
            TaskBody::Sequence { stages, .. } => stages
                .iter()
                .flat_map(|s| s.tasks().iter().map(String::as_str))
                .collect(),
        }
    }

    pub fn is_composite(&self) -> bool {
        matches!(self.body, TaskBody::Sequence { .. })
    }
}

impl fmt::Debug for TaskDef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match &self.body {
            TaskBody::Step(_) => "step".to_string(),
            TaskBody::Sequence { stages, .. } => stages
                .iter()
                .map(|s| s.to_string())
                .collect::<Vec<_>>()
                .join(" -> "),
        };
        f.debug_struct("TaskDef")
            .field("name", &self.name)
            .field("body", &kind)
            .finish()
    }
}

/// Result of running one task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskOutcome {
    Succeeded,
    /// The first hard failure, naming the leaf step that produced it.
    Failed { task: String, detail: String },
}

impl TaskOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, TaskOutcome::Succeeded)
    }
}

impl fmt::Display for TaskOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskOutcome::Succeeded => write!(f, "succeeded"),
            TaskOutcome::Failed { task, detail } => write!(f, "failed in '{}': {}", task, detail),
        }
    }
}
