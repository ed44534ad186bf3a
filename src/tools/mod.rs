//! External build tools.
//!
//! Each compiler, bundler and checker the pipeline drives sits behind a
//! trait so steps stay independent of how the tool is invoked. The default
//! [`Toolchain`] runs the usual Node command-line tools; tests swap in
//! in-process fakes.

mod node;
mod process;

pub use node::{Browserify, JsHint, NgAnnotate, PostcssAutoprefixer, Sass, UglifyJs};
pub use process::{ToolOutput, ToolProcess};

use async_trait::async_trait;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::config::Config;
use crate::core::BuildMode;
use crate::Result;

/// Resolves a script entry point and its dependency closure into one bundle.
#[async_trait]
pub trait ScriptBundler: Send + Sync {
    async fn bundle(&self, entry: &Path) -> Result<String>;
}

/// Source-to-source pass over a bundle (DI annotation, minification).
#[async_trait]
pub trait ScriptTransform: Send + Sync {
    fn name(&self) -> &str;

    async fn transform(&self, source: String) -> Result<String>;
}

/// One style/correctness violation reported by the linter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LintFinding {
    pub file: PathBuf,
    pub line: u32,
    pub column: u32,
    pub message: String,
    /// Rule code such as `W033`, when the linter reports one.
    pub code: Option<String>,
}

impl fmt::Display for LintFinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}:{}: {}",
            self.file.display(),
            self.line,
            self.column,
            self.message
        )
    }
}

#[async_trait]
pub trait ScriptLinter: Send + Sync {
    async fn lint(&self, files: &[PathBuf]) -> Result<Vec<LintFinding>>;
}

/// Options for one stylesheet compilation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompileOptions {
    /// Directories searched for `@import`, in order.
    pub load_paths: Vec<PathBuf>,
    pub mode: BuildMode,
}

#[async_trait]
pub trait StyleCompiler: Send + Sync {
    async fn compile(&self, source: &str, options: &CompileOptions) -> Result<String>;
}

#[async_trait]
pub trait Prefixer: Send + Sync {
    async fn prefix(&self, css: String, browsers: &[String]) -> Result<String>;
}

/// The set of tools a run uses.
#[derive(Clone)]
pub struct Toolchain {
    pub bundler: Arc<dyn ScriptBundler>,
    pub annotator: Arc<dyn ScriptTransform>,
    pub minifier: Arc<dyn ScriptTransform>,
    pub linter: Arc<dyn ScriptLinter>,
    pub sass: Arc<dyn StyleCompiler>,
    pub prefixer: Arc<dyn Prefixer>,
}

impl Toolchain {
    /// Node command-line tools as configured in `[tools]`.
    pub fn from_config(config: &Config) -> Self {
        let tools = &config.tools;
        Self {
            bundler: Arc::new(Browserify::new(ToolProcess::new(
                "browserify",
                &tools.bundler,
                config,
            ))),
            annotator: Arc::new(NgAnnotate::new(ToolProcess::new(
                "ng-annotate",
                &tools.annotator,
                config,
            ))),
            minifier: Arc::new(UglifyJs::new(ToolProcess::new(
                "uglify",
                &tools.minifier,
                config,
            ))),
            linter: Arc::new(JsHint::new(ToolProcess::new(
                "jshint",
                &tools.linter,
                config,
            ))),
            sass: Arc::new(Sass::new(ToolProcess::new("sass", &tools.sass, config))),
            prefixer: Arc::new(PostcssAutoprefixer::new(ToolProcess::new(
                "postcss",
                &tools.prefixer,
                config,
            ))),
        }
    }
}

impl fmt::Debug for Toolchain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Toolchain")
            .field("annotator", &self.annotator.name())
            .field("minifier", &self.minifier.name())
            .finish_non_exhaustive()
    }
}
