//! Icon font copy.

use async_trait::async_trait;
use std::path::{Path, PathBuf};

use crate::core::Step;
use crate::orchestration::Runner;
use crate::util::blocking;
use crate::{klog, klog_debug, klog_warn, Result};

/// Files matching `pattern`, where `pattern` is relative to `root`.
///
/// The root itself is escaped so directory names with glob metacharacters
/// are taken literally.
pub fn font_files(root: &Path, pattern: &str) -> Result<Vec<PathBuf>> {
    let full = if Path::new(pattern).is_absolute() {
        pattern.to_string()
    } else {
        format!(
            "{}/{}",
            glob::Pattern::escape(&root.display().to_string()),
            pattern
        )
    };
    let mut files: Vec<PathBuf> = glob::glob(&full)?
        .filter_map(|entry| entry.ok())
        .filter(|path| path.is_file())
        .collect();
    files.sort();
    Ok(files)
}

/// Copy the icon fonts into the output fonts directory.
pub struct FontsStep;

#[async_trait]
impl Step for FontsStep {
    fn description(&self) -> &str {
        "Copy the icon fonts into the output directory"
    }

    async fn run(&self, runner: &Runner) -> Result<()> {
        let config = runner.config();
        let root = config.root.clone();
        let pattern = config.paths.font_sources.clone();
        let files = blocking(move || font_files(&root, &pattern)).await?;

        if files.is_empty() {
            klog_warn!("fonts: nothing matches {}", config.paths.font_sources);
            return Ok(());
        }

        let dest = config.resolve(&config.paths.dist_fonts);
        tokio::fs::create_dir_all(&dest).await?;
        for file in &files {
            let Some(name) = file.file_name() else {
                continue;
            };
            tokio::fs::copy(file, dest.join(name)).await?;
            klog_debug!("fonts: copied {}", file.display());
        }
        klog!("fonts: copied {} file(s) to {}", files.len(), dest.display());
        Ok(())
    }
}
