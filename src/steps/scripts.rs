//! Script bundling and linting.

use async_trait::async_trait;
use colored::{ColoredString, Colorize};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::core::Step;
use crate::orchestration::Runner;
use crate::tools::LintFinding;
use crate::util::{blocking, write_atomic};
use crate::{klog, klog_debug, klog_warn, Error, Result};

/// File name of the bundle in the output scripts directory.
pub const BUNDLE_NAME: &str = "app.js";

/// Bundle the script entry point into `app.js`.
///
/// In production the bundle is DI-annotated and minified before it is
/// written. Nothing is written unless every stage succeeds, so a broken
/// module leaves the previous bundle in place.
pub struct BundleStep;

#[async_trait]
impl Step for BundleStep {
    fn description(&self) -> &str {
        "Bundle the script entry point (annotated and minified with --production)"
    }

    async fn run(&self, runner: &Runner) -> Result<()> {
        let config = runner.config();
        let entry = config.resolve(&config.paths.script_entry);
        if !entry.is_file() {
            return Err(Error::MissingSource(entry));
        }

        let tools = runner.tools();
        let mut bundle = tools.bundler.bundle(&entry).await?;
        klog_debug!("browserify: {} bytes", bundle.len());

        if runner.mode().is_production() {
            for pass in [&tools.annotator, &tools.minifier] {
                bundle = pass.transform(bundle).await?;
                klog_debug!("{}: {} bytes", pass.name(), bundle.len());
            }
        }

        let out = config.resolve(&config.paths.dist_js).join(BUNDLE_NAME);
        write_atomic(&out, &bundle).await?;
        klog!("browserify: wrote {} ({} bytes)", out.display(), bundle.len());
        Ok(())
    }
}

/// Every `.js` file under `root`, skipping `node_modules` at any depth.
pub fn discover_scripts(root: &Path) -> Result<Vec<PathBuf>> {
    if !root.is_dir() {
        return Ok(Vec::new());
    }
    let mut scripts = Vec::new();
    let walker = WalkDir::new(root)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| e.file_name() != "node_modules");
    for entry in walker {
        let entry = entry.map_err(|e| Error::Io(e.into()))?;
        let is_js = entry
            .path()
            .extension()
            .map(|ext| ext == "js")
            .unwrap_or(false);
        if entry.file_type().is_file() && is_js {
            scripts.push(entry.into_path());
        }
    }
    Ok(scripts)
}

/// Render findings grouped by file, followed by a problem count.
///
/// Files appear in the order of their first finding.
pub fn format_report(findings: &[LintFinding], color: bool) -> String {
    let paint = |text: String, style: fn(&str) -> ColoredString| -> String {
        if color {
            style(&text).to_string()
        } else {
            text
        }
    };

    let mut files: Vec<&Path> = Vec::new();
    for finding in findings {
        if !files.contains(&finding.file.as_path()) {
            files.push(&finding.file);
        }
    }

    let mut out = String::new();
    for file in files {
        out.push('\n');
        out.push_str(&paint(file.display().to_string(), |s| s.underline()));
        out.push('\n');
        for finding in findings.iter().filter(|f| f.file == file) {
            let position = format!("line {:<4} col {:<4}", finding.line, finding.column);
            let code = finding
                .code
                .as_deref()
                .map(|c| format!(" ({})", c))
                .unwrap_or_default();
            out.push_str(&format!(
                "  {} {}{}\n",
                paint(position, |s| s.dimmed()),
                paint(finding.message.clone(), |s| s.blue()),
                paint(code, |s| s.dimmed()),
            ));
        }
    }
    out.push('\n');
    let summary = format!(
        "\u{2716} {} problem{}",
        findings.len(),
        if findings.len() == 1 { "" } else { "s" }
    );
    out.push_str(&paint(summary, |s| s.yellow()));
    out
}

/// Lint every script under the source tree and print the report.
///
/// Findings never fail the build; a missing or broken linter is a warning.
pub struct LintStep;

#[async_trait]
impl Step for LintStep {
    fn description(&self) -> &str {
        "Lint the script sources (reports only, never fails)"
    }

    async fn run(&self, runner: &Runner) -> Result<()> {
        let config = runner.config();
        let src = config.resolve(&config.paths.src);
        let files = blocking(move || discover_scripts(&src)).await?;
        klog_debug!("jslint: {} file(s)", files.len());

        let findings = match runner.tools().linter.lint(&files).await {
            Ok(findings) => findings,
            Err(e) => {
                klog_warn!("jslint skipped: {}", e);
                return Ok(());
            }
        };

        if findings.is_empty() {
            klog!("jslint: {} file(s), no problems", files.len());
        } else {
            klog!("{}", format_report(&findings, true));
        }
        Ok(())
    }
}
