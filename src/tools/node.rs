//! Node command-line tool adapters.

use async_trait::async_trait;
use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use super::{
    CompileOptions, LintFinding, Prefixer, ScriptBundler, ScriptLinter, ScriptTransform,
    StyleCompiler, ToolProcess,
};
use crate::{klog_warn, Error, Result};

/// jshint `unix` reporter line: `file:line:col: message (code)`.
static UNIX_REPORT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?P<file>.+?):(?P<line>\d+):(?P<col>\d+): (?P<msg>.*?)(?: \((?P<code>[EWI]\d{3})\))?$")
        .expect("static regex")
});

fn path_arg(path: &Path) -> String {
    path.display().to_string()
}

/// `browserify <entry>`; the bundle is written to stdout.
pub struct Browserify {
    process: ToolProcess,
}

impl Browserify {
    pub fn new(process: ToolProcess) -> Self {
        Self { process }
    }
}

#[async_trait]
impl ScriptBundler for Browserify {
    async fn bundle(&self, entry: &Path) -> Result<String> {
        self.process.run_ok(&[path_arg(entry)], None).await
    }
}

/// `ng-annotate -a -`: adds explicit dependency-injection annotations so
/// minified parameter names still resolve.
pub struct NgAnnotate {
    process: ToolProcess,
}

impl NgAnnotate {
    pub fn new(process: ToolProcess) -> Self {
        Self { process }
    }
}

#[async_trait]
impl ScriptTransform for NgAnnotate {
    fn name(&self) -> &str {
        self.process.name()
    }

    async fn transform(&self, source: String) -> Result<String> {
        self.process
            .run_ok(&["-a".to_string(), "-".to_string()], Some(source))
            .await
    }
}

/// `uglifyjs -c -m` over stdin.
pub struct UglifyJs {
    process: ToolProcess,
}

impl UglifyJs {
    pub fn new(process: ToolProcess) -> Self {
        Self { process }
    }
}

#[async_trait]
impl ScriptTransform for UglifyJs {
    fn name(&self) -> &str {
        self.process.name()
    }

    async fn transform(&self, source: String) -> Result<String> {
        self.process
            .run_ok(&["-c".to_string(), "-m".to_string()], Some(source))
            .await
    }
}

/// `jshint --reporter=unix --verbose <files>`.
///
/// Exit code 2 means "findings reported"; only other non-zero codes are
/// treated as a broken linter run.
pub struct JsHint {
    process: ToolProcess,
}

impl JsHint {
    pub fn new(process: ToolProcess) -> Self {
        Self { process }
    }
}

/// Parse jshint's `unix` reporter output. Summary lines are skipped.
pub fn parse_unix_report(output: &str) -> Vec<LintFinding> {
    output
        .lines()
        .filter_map(|line| {
            let caps = UNIX_REPORT_RE.captures(line.trim_end())?;
            Some(LintFinding {
                file: PathBuf::from(&caps["file"]),
                line: caps["line"].parse().ok()?,
                column: caps["col"].parse().ok()?,
                message: caps["msg"].to_string(),
                code: caps.name("code").map(|c| c.as_str().to_string()),
            })
        })
        .collect()
}

#[async_trait]
impl ScriptLinter for JsHint {
    async fn lint(&self, files: &[PathBuf]) -> Result<Vec<LintFinding>> {
        if files.is_empty() {
            return Ok(Vec::new());
        }
        let mut args = vec!["--reporter=unix".to_string(), "--verbose".to_string()];
        args.extend(files.iter().map(|f| path_arg(f)));

        let output = self.process.run(&args, None, &[]).await?;
        match output.code {
            Some(0) | Some(2) => Ok(parse_unix_report(&output.stdout)),
            _ => {
                klog_warn!("jshint exited with {:?}", output.code);
                Err(Error::tool(self.process.name(), output.error_text()))
            }
        }
    }
}

/// Dart Sass reading the stylesheet from stdin.
pub struct Sass {
    process: ToolProcess,
}

impl Sass {
    pub fn new(process: ToolProcess) -> Self {
        Self { process }
    }

    /// Arguments for one compilation, without the stdin source.
    pub fn args(options: &CompileOptions) -> Vec<String> {
        let mut args = vec!["--stdin".to_string()];
        for load_path in &options.load_paths {
            args.push(format!("--load-path={}", load_path.display()));
        }
        if options.mode.is_production() {
            args.push("--style=compressed".to_string());
            args.push("--no-source-map".to_string());
        } else {
            args.push("--style=expanded".to_string());
            args.push("--embed-source-map".to_string());
        }
        args
    }
}

#[async_trait]
impl StyleCompiler for Sass {
    async fn compile(&self, source: &str, options: &CompileOptions) -> Result<String> {
        self.process
            .run_ok(&Self::args(options), Some(source.to_string()))
            .await
    }
}

/// `postcss --use autoprefixer`, with browser targets passed through the
/// `BROWSERSLIST` environment variable.
pub struct PostcssAutoprefixer {
    process: ToolProcess,
}

impl PostcssAutoprefixer {
    pub fn new(process: ToolProcess) -> Self {
        Self { process }
    }
}

#[async_trait]
impl Prefixer for PostcssAutoprefixer {
    async fn prefix(&self, css: String, browsers: &[String]) -> Result<String> {
        let args = vec![
            "--use".to_string(),
            "autoprefixer".to_string(),
            "--no-map".to_string(),
        ];
        self.process
            .run_ok_with_env(&args, Some(css), &[("BROWSERSLIST", browsers.join(", "))])
            .await
    }
}
