//! Splitting stylesheets for the old-IE per-file selector ceiling.
//!
//! IE 9 and older ignore every selector past the 4095th in one stylesheet.
//! Blessing cuts a stylesheet at top-level rule boundaries into parts that
//! each stay under the ceiling. The parts are contiguous slices of the input:
//! concatenating them in order gives back the input byte for byte.

use async_trait::async_trait;
use regex::Regex;
use std::path::{Path, PathBuf};

use crate::core::Step;
use crate::orchestration::Runner;
use crate::util::{blocking, write_atomic};
use crate::{klog, klog_debug, Error, Result};

/// One top-level statement or block, with any comments and whitespace that
/// precede it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CssBlock<'a> {
    pub text: &'a str,
    pub selectors: usize,
}

/// Lexer position state for scanning CSS text.
struct Scanner<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Scanner<'a> {
    fn new(text: &'a str) -> Self {
        Self {
            bytes: text.as_bytes(),
            pos: 0,
        }
    }

    /// Skip a comment or string starting at `pos`, if any. Returns true when
    /// something was skipped.
    fn skip_opaque(&mut self) -> bool {
        let b = self.bytes;
        match b[self.pos] {
            b'/' if b.get(self.pos + 1) == Some(&b'*') => {
                let mut i = self.pos + 2;
                while i + 1 < b.len() && !(b[i] == b'*' && b[i + 1] == b'/') {
                    i += 1;
                }
                self.pos = (i + 2).min(b.len());
                true
            }
            quote @ (b'"' | b'\'') => {
                let mut i = self.pos + 1;
                while i < b.len() && b[i] != quote {
                    if b[i] == b'\\' {
                        i += 1;
                    }
                    i += 1;
                }
                self.pos = (i + 1).min(b.len());
                true
            }
            _ => false,
        }
    }
}

/// Split `css` into its top-level blocks.
///
/// Each block ends at the `;` of a top-level statement or at the `}` that
/// closes a top-level block. Trailing whitespace and comments after the last
/// block form a final block with zero selectors.
pub fn top_level_blocks(css: &str) -> Vec<CssBlock<'_>> {
    let mut blocks = Vec::new();
    let mut scanner = Scanner::new(css);
    let mut block_start = 0;
    let mut depth = 0usize;
    // Where the block's own content begins (after leading trivia), and where
    // its body opens.
    let mut content_start: Option<usize> = None;
    let mut body_open: Option<usize> = None;

    while scanner.pos < scanner.bytes.len() {
        let at = scanner.pos;
        if depth == 0 && content_start.is_none() && scanner.bytes[at] == b'/' {
            if scanner.skip_opaque() {
                continue;
            }
        }
        if scanner.skip_opaque() {
            if content_start.is_none() {
                content_start = Some(at);
            }
            continue;
        }

        let c = scanner.bytes[at];
        if content_start.is_none() && !c.is_ascii_whitespace() {
            content_start = Some(at);
        }
        if c == b'\\' {
            // An escaped delimiter is part of an identifier.
            scanner.pos = (at + 2).min(scanner.bytes.len());
            continue;
        }
        match c {
            b'{' => {
                if depth == 0 {
                    body_open = Some(at);
                }
                depth += 1;
            }
            b'}' => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    let end = at + 1;
                    let start = content_start.unwrap_or(block_start);
                    let selectors = match body_open {
                        Some(open) => count_block(&css[start..open], &css[open + 1..at]),
                        None => 0,
                    };
                    blocks.push(CssBlock {
                        text: &css[block_start..end],
                        selectors,
                    });
                    block_start = end;
                    content_start = None;
                    body_open = None;
                }
            }
            b';' if depth == 0 => {
                let end = at + 1;
                blocks.push(CssBlock {
                    text: &css[block_start..end],
                    selectors: 0,
                });
                block_start = end;
                content_start = None;
            }
            _ => {}
        }
        scanner.pos += 1;
    }

    if block_start < css.len() {
        let rest = &css[block_start..];
        // An unterminated rule still carries its selectors.
        let selectors = match (content_start, body_open) {
            (Some(start), Some(open)) => count_block(&css[start..open], &css[open + 1..]),
            _ => 0,
        };
        blocks.push(CssBlock {
            text: rest,
            selectors,
        });
    }
    blocks
}

/// Selectors contributed by one `prelude { body }` block: a style rule counts
/// its selector list, an at-rule counts the rules nested in its body.
fn count_block(prelude: &str, body: &str) -> usize {
    let prelude = strip_comments(prelude);
    let prelude = prelude.trim();
    if prelude.starts_with('@') {
        count_selectors(body)
    } else if prelude.is_empty() {
        0
    } else {
        split_selector_list(prelude)
    }
}

/// Total selectors in a stylesheet fragment.
pub fn count_selectors(css: &str) -> usize {
    top_level_blocks(css).iter().map(|b| b.selectors).sum()
}

/// Number of comma-separated selectors, ignoring commas inside parentheses,
/// brackets and strings (`:is(a, b)`, `[title="a,b"]`).
fn split_selector_list(prelude: &str) -> usize {
    let mut depth = 0i32;
    let mut count = 1;
    let mut quote: Option<char> = None;
    let mut escaped = false;
    for c in prelude.chars() {
        if let Some(q) = quote {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == q {
                quote = None;
            }
            continue;
        }
        if escaped {
            escaped = false;
            continue;
        }
        match c {
            '\\' => escaped = true,
            '"' | '\'' => quote = Some(c),
            '(' | '[' => depth += 1,
            ')' | ']' => depth -= 1,
            ',' if depth == 0 => count += 1,
            _ => {}
        }
    }
    count
}

fn strip_comments(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(start) = rest.find("/*") {
        out.push_str(&rest[..start]);
        match rest[start + 2..].find("*/") {
            Some(end) => rest = &rest[start + 2 + end + 2..],
            None => {
                rest = "";
                break;
            }
        }
    }
    out.push_str(rest);
    out
}

/// Cut `css` into parts of at most `limit` selectors each.
///
/// Parts break only between top-level blocks. A block that alone exceeds
/// the limit gets a part of its own. Always returns at least one part.
pub fn split(css: &str, limit: usize) -> Vec<String> {
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut count = 0usize;

    for block in top_level_blocks(css) {
        if count > 0 && count + block.selectors > limit {
            parts.push(std::mem::take(&mut current));
            count = 0;
        }
        current.push_str(block.text);
        count += block.selectors;
    }
    if !current.is_empty() || parts.is_empty() {
        parts.push(current);
    }
    parts
}

/// File names for the parts of `stem.css`: the original name when it fits
/// in one part, otherwise `stem-blessed1.css`, `stem-blessed2.css`, ...
pub fn part_names(stem: &str, parts: usize) -> Vec<String> {
    if parts <= 1 {
        vec![format!("{}.css", stem)]
    } else {
        (1..=parts)
            .map(|i| format!("{}-blessed{}.css", stem, i))
            .collect()
    }
}

/// Remove files a previous run produced for `stem` in `dir`.
fn remove_stale(dir: &Path, stem: &str) -> Result<()> {
    if !dir.is_dir() {
        return Ok(());
    }
    let pattern = Regex::new(&format!(r"^{}(-blessed\d+)?\.css$", regex::escape(stem)))
        .map_err(|e| Error::Validation(e.to_string()))?;
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let name = entry.file_name().to_string_lossy().to_string();
        if pattern.is_match(&name) && entry.path().is_file() {
            klog_debug!("bless: removing stale {}", name);
            std::fs::remove_file(entry.path())?;
        }
    }
    Ok(())
}

/// Compiled stylesheets directly inside `dir`, sorted by name.
fn compiled_stylesheets(dir: &Path) -> Result<Vec<PathBuf>> {
    let pattern = format!(
        "{}/*.css",
        glob::Pattern::escape(&dir.display().to_string())
    );
    let mut files: Vec<PathBuf> = glob::glob(&pattern)?
        .filter_map(|e| e.ok())
        .filter(|p| p.is_file())
        .collect();
    files.sort();
    Ok(files)
}

/// Split every compiled stylesheet into the blessed directory.
pub struct BlessStep;

#[async_trait]
impl Step for BlessStep {
    fn description(&self) -> &str {
        "Split compiled stylesheets for old IE selector limits"
    }

    async fn run(&self, runner: &Runner) -> Result<()> {
        let config = runner.config();
        let input = config.resolve(&config.paths.dist_css);
        let output = config.resolve(&config.paths.dist_blessed);
        if input == output {
            return Err(Error::Validation(format!(
                "blessed output {} must differ from the compiled css directory",
                output.display()
            )));
        }
        let limit = config.styles.selector_limit.max(1);

        let input_dir = input.clone();
        let sheets = blocking(move || compiled_stylesheets(&input_dir)).await?;
        if sheets.is_empty() {
            klog!("bless: no stylesheets in {}", input.display());
        }

        for sheet in sheets {
            let stem = sheet
                .file_stem()
                .map(|s| s.to_string_lossy().to_string())
                .unwrap_or_default();
            let css = tokio::fs::read_to_string(&sheet).await?;
            let selectors = count_selectors(&css);
            let parts = split(&css, limit);
            let names = part_names(&stem, parts.len());

            let out_dir = output.clone();
            let stale_stem = stem.clone();
            blocking(move || remove_stale(&out_dir, &stale_stem)).await?;
            for (name, part) in names.iter().zip(parts.iter()) {
                write_atomic(&output.join(name), part).await?;
            }
            klog!(
                "bless: {}.css has {} selectors, written as {} file(s)",
                stem,
                selectors,
                names.len()
            );
        }
        Ok(())
    }
}
