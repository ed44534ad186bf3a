//! Stylesheet compilation.
//!
//! The main stylesheet gets an `@import` for every component partial
//! injected between its `/* inject:components */` markers (in memory only),
//! is compiled, vendor-prefixed, and written to the output css directory.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use super::inject::inject;
use crate::core::Step;
use crate::orchestration::Runner;
use crate::tools::CompileOptions;
use crate::util::{blocking, relative_path, slash_path, write_atomic};
use crate::{klog, klog_debug, klog_warn, Error, Result};

pub const COMPONENTS_START: &str = "/* inject:components */";
pub const COMPONENTS_END: &str = "/* endinject */";

/// Partial names start with a letter or digit, so `_private.scss` files
/// stay out of the generated list.
fn is_component_partial(path: &Path) -> bool {
    let Some(name) = path.file_name().map(|n| n.to_string_lossy()) else {
        return false;
    };
    name.ends_with(".scss")
        && name
            .chars()
            .next()
            .map(|c| c.is_ascii_alphanumeric())
            .unwrap_or(false)
}

/// Component partials under `root`, in walk order (entries of each directory
/// sorted by name). A missing directory yields no partials.
pub fn discover_partials(root: &Path) -> Result<Vec<PathBuf>> {
    if !root.is_dir() {
        return Ok(Vec::new());
    }
    let mut partials = Vec::new();
    for entry in WalkDir::new(root).sort_by_file_name() {
        let entry = entry.map_err(|e| Error::Io(e.into()))?;
        if entry.file_type().is_file() && is_component_partial(entry.path()) {
            partials.push(entry.into_path());
        }
    }
    Ok(partials)
}

/// `@import` lines for `partials`, relative to `style_dir`.
pub fn import_lines(style_dir: &Path, partials: &[PathBuf]) -> Vec<String> {
    partials
        .iter()
        .map(|p| format!("@import \"{}\";", slash_path(&relative_path(style_dir, p))))
        .collect()
}

/// The main stylesheet with the component region rewritten. Sources without
/// the markers are returned unchanged.
pub fn with_component_imports(source: &str, imports: &[String]) -> String {
    match inject(source, COMPONENTS_START, COMPONENTS_END, imports) {
        Some(updated) => updated,
        None => {
            if !imports.is_empty() {
                klog_warn!(
                    "main stylesheet has no {} region; {} component(s) not imported",
                    COMPONENTS_START,
                    imports.len()
                );
            }
            source.to_string()
        }
    }
}

/// Compile the main stylesheet into the output css directory.
pub struct CompileStep;

#[async_trait]
impl Step for CompileStep {
    fn description(&self) -> &str {
        "Compile the main stylesheet with its component partials"
    }

    async fn run(&self, runner: &Runner) -> Result<()> {
        let config = runner.config();
        let entry = config.resolve(&config.paths.style_entry);
        if !entry.is_file() {
            return Err(Error::MissingSource(entry));
        }
        let style_dir = entry
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| config.root.clone());

        let components = config.resolve(&config.paths.components);
        let partials = blocking(move || discover_partials(&components)).await?;
        klog_debug!("compile: {} component partial(s)", partials.len());

        let source = tokio::fs::read_to_string(&entry).await?;
        let source = with_component_imports(&source, &import_lines(&style_dir, &partials));

        let mut load_paths = vec![style_dir];
        load_paths.extend(config.paths.include_roots.iter().map(|p| config.resolve(p)));
        let options = CompileOptions {
            load_paths,
            mode: runner.mode(),
        };

        let css = runner.tools().sass.compile(&source, &options).await?;
        let css = runner
            .tools()
            .prefixer
            .prefix(css, &config.styles.browsers)
            .await?;

        let stem = entry
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| "main".to_string());
        let out = config
            .resolve(&config.paths.dist_css)
            .join(format!("{}.css", stem));
        write_atomic(&out, &css).await?;
        klog!(
            "compile: wrote {} ({} mode, {} bytes)",
            out.display(),
            runner.mode(),
            css.len()
        );
        Ok(())
    }
}
