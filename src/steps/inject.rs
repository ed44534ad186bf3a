//! Marker-delimited injection of generated references.
//!
//! A region is delimited by a start marker and an end marker. Injection
//! replaces whatever sits between them with one generated line per entry,
//! indented like the start marker. Running it again with the same entries
//! yields the same text.

use async_trait::async_trait;
use std::path::{Path, PathBuf};

use crate::core::Step;
use crate::orchestration::Runner;
use crate::util::{natural_cmp, relative_path, slash_path, write_atomic};
use crate::{klog, klog_debug, klog_warn, Error, Result};

/// Closing marker shared by every region.
pub const END_MARKER: &str = "<!-- endinject -->";

/// Rewrite every `start ... end` region of `content`.
///
/// Returns `None` when no complete marker pair is present.
pub fn inject(content: &str, start: &str, end: &str, lines: &[String]) -> Option<String> {
    let mut out = String::with_capacity(content.len());
    let mut rest = content;
    let mut found = false;

    while let Some(start_at) = rest.find(start) {
        let after_start = start_at + start.len();
        let Some(end_rel) = rest[after_start..].find(end) else {
            break;
        };
        let end_at = after_start + end_rel;
        found = true;

        let indent = indentation_before(rest, start_at);
        out.push_str(&rest[..after_start]);
        for line in lines {
            out.push('\n');
            out.push_str(indent);
            out.push_str(line);
        }
        out.push('\n');
        out.push_str(indent);
        out.push_str(end);

        rest = &rest[end_at + end.len()..];
    }

    if !found {
        return None;
    }
    out.push_str(rest);
    Some(out)
}

/// Whitespace between the previous newline and `at`, or "" if the marker is
/// preceded by other text on its line.
fn indentation_before(text: &str, at: usize) -> &str {
    let line_start = text[..at].rfind('\n').map(|i| i + 1).unwrap_or(0);
    let prefix = &text[line_start..at];
    if prefix.chars().all(|c| c == ' ' || c == '\t') {
        prefix
    } else {
        ""
    }
}

/// Which generated assets an injection step handles.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssetKind {
    Css,
    Js,
}

impl AssetKind {
    pub fn start_marker(&self) -> &'static str {
        match self {
            AssetKind::Css => "<!-- inject:css -->",
            AssetKind::Js => "<!-- inject:js -->",
        }
    }

    /// Reference tag for a path relative to the output root.
    pub fn tag(&self, href: &str) -> String {
        match self {
            AssetKind::Css => format!("<link rel=\"stylesheet\" href=\"{}\">", href),
            AssetKind::Js => format!("<script src=\"{}\"></script>", href),
        }
    }
}

/// Glob of the generated files for `kind`, rooted at the configured dirs.
fn asset_pattern(runner: &Runner, kind: AssetKind) -> String {
    let config = runner.config();
    let (dir, tail) = match kind {
        AssetKind::Css => (config.resolve(&config.paths.dist_blessed), "**/*.css"),
        AssetKind::Js => (config.resolve(&config.paths.dist_js), "*.js"),
    };
    format!(
        "{}/{}",
        glob::Pattern::escape(&dir.display().to_string()),
        tail
    )
}

/// Files matching `pattern`, without reading them, in natural path order.
pub fn discover(pattern: &str) -> Result<Vec<PathBuf>> {
    let mut files: Vec<PathBuf> = glob::glob(pattern)?
        .filter_map(|entry| entry.ok())
        .filter(|path| path.is_file())
        .collect();
    files.sort_by(|a, b| natural_cmp(&a.to_string_lossy(), &b.to_string_lossy()));
    Ok(files)
}

/// Reference lines for `files`, relative to `dist` without a leading slash.
pub fn tags_for(kind: AssetKind, dist: &Path, files: &[PathBuf]) -> Vec<String> {
    files
        .iter()
        .map(|file| kind.tag(&slash_path(&relative_path(dist, file))))
        .collect()
}

/// Make sure the output template exists, seeding it from the source
/// templates directory when needed.
async fn ensure_template(runner: &Runner) -> Result<PathBuf> {
    let config = runner.config();
    let template = config.resolve(&config.paths.dist_template);
    if template.exists() {
        return Ok(template);
    }

    let file_name = template
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_else(|| "index.html".into());
    let source = config.resolve(&config.paths.templates).join(file_name);
    if !source.exists() {
        return Err(Error::MissingSource(source));
    }
    klog!("Seeding {} from {}", template.display(), source.display());
    let contents = tokio::fs::read(&source).await?;
    write_atomic(&template, contents).await?;
    Ok(template)
}

/// Inject references to generated CSS or JS into the output template.
pub struct InjectStep {
    kind: AssetKind,
}

impl InjectStep {
    pub fn new(kind: AssetKind) -> Self {
        Self { kind }
    }
}

#[async_trait]
impl Step for InjectStep {
    fn description(&self) -> &str {
        match self.kind {
            AssetKind::Css => "Inject the blessed stylesheets into the template",
            AssetKind::Js => "Inject the script bundle into the template",
        }
    }

    async fn run(&self, runner: &Runner) -> Result<()> {
        let config = runner.config();
        let dist = config.resolve(&config.paths.dist);
        let pattern = asset_pattern(runner, self.kind);
        let files = crate::util::blocking(move || discover(&pattern)).await?;
        klog_debug!("inject: {} files for {:?}", files.len(), self.kind);

        let _page = runner.page_lock().lock().await;
        let template = ensure_template(runner).await?;
        let content = tokio::fs::read_to_string(&template).await?;
        let lines = tags_for(self.kind, &dist, &files);

        let Some(updated) = inject(&content, self.kind.start_marker(), END_MARKER, &lines) else {
            klog_warn!(
                "{} has no {} ... {} region, left untouched",
                template.display(),
                self.kind.start_marker(),
                END_MARKER
            );
            return Ok(());
        };

        if updated != content {
            write_atomic(&template, updated).await?;
        }
        klog!(
            "Injected {} file(s) into {}",
            files.len(),
            template.display()
        );
        Ok(())
    }
}
