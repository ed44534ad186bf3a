use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

use crate::{klog_debug, Result};

/// File name of the optional project configuration.
pub const CONFIG_FILE: &str = "kiln.toml";

/// Fixed filesystem contract of a project. Relative entries are resolved
/// against the project root by [`Config::resolve`].
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct Paths {
    pub src: PathBuf,
    pub script_entry: PathBuf,
    pub style_entry: PathBuf,
    pub styles: PathBuf,
    pub templates: PathBuf,
    pub components: PathBuf,
    pub dist: PathBuf,
    pub dist_css: PathBuf,
    pub dist_js: PathBuf,
    pub dist_blessed: PathBuf,
    pub dist_template: PathBuf,
    pub dist_fonts: PathBuf,
    /// Glob of icon-font files copied by the `fonts` task.
    pub font_sources: String,
    /// Extra load paths handed to the stylesheet compiler.
    pub include_roots: Vec<PathBuf>,
}

impl Default for Paths {
    fn default() -> Self {
        Self {
            src: PathBuf::from("src"),
            script_entry: PathBuf::from("src/js/app.js"),
            style_entry: PathBuf::from("src/scss/main.scss"),
            styles: PathBuf::from("src/scss"),
            templates: PathBuf::from("src/html"),
            components: PathBuf::from("src/components"),
            dist: PathBuf::from("dist"),
            dist_css: PathBuf::from("dist/css"),
            dist_js: PathBuf::from("dist/js"),
            dist_blessed: PathBuf::from("dist/css/blessed"),
            dist_template: PathBuf::from("dist/index.html"),
            dist_fonts: PathBuf::from("dist/fonts"),
            font_sources: "node_modules/font-awesome/fonts/fontawesome-webfont.*".to_string(),
            include_roots: vec![
                PathBuf::from("node_modules/bootstrap-sass/assets/stylesheets"),
                PathBuf::from("node_modules/slick-carousel/slick"),
            ],
        }
    }
}

/// How one external tool is invoked.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct ToolCommand {
    /// Binary name or path.
    pub bin: String,
    /// Arguments placed before the ones kiln adds.
    #[serde(default)]
    pub args: Vec<String>,
}

impl ToolCommand {
    pub fn new(bin: &str) -> Self {
        Self {
            bin: bin.to_string(),
            args: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct Tools {
    pub bundler: ToolCommand,
    pub annotator: ToolCommand,
    pub minifier: ToolCommand,
    pub linter: ToolCommand,
    pub sass: ToolCommand,
    pub prefixer: ToolCommand,
    /// Upper bound for a single tool invocation, in seconds.
    pub timeout_secs: u64,
}

impl Default for Tools {
    fn default() -> Self {
        Self {
            bundler: ToolCommand::new("browserify"),
            annotator: ToolCommand::new("ng-annotate"),
            minifier: ToolCommand::new("uglifyjs"),
            linter: ToolCommand::new("jshint"),
            sass: ToolCommand::new("sass"),
            prefixer: ToolCommand::new("postcss"),
            timeout_secs: 120,
        }
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct Server {
    pub port: u16,
    pub livereload: bool,
}

impl Default for Server {
    fn default() -> Self {
        Self {
            port: 8000,
            livereload: true,
        }
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct Styles {
    /// Vendor-prefix browser targets.
    pub browsers: Vec<String>,
    /// Per-file selector ceiling of old IE.
    pub selector_limit: usize,
}

impl Default for Styles {
    fn default() -> Self {
        Self {
            browsers: vec!["last 2 versions".to_string(), "ie >= 9".to_string()],
            selector_limit: 4095,
        }
    }
}

/// Immutable project configuration, built once at startup.
#[derive(Debug, Clone, Deserialize, PartialEq, Default)]
pub struct Config {
    /// Project root all relative paths hang off.
    #[serde(skip)]
    pub root: PathBuf,
    #[serde(default)]
    pub paths: Paths,
    #[serde(default)]
    pub tools: Tools,
    #[serde(default)]
    pub server: Server,
    #[serde(default)]
    pub styles: Styles,
}

impl Config {
    pub fn config_path(root: &Path) -> PathBuf {
        root.join(CONFIG_FILE)
    }

    /// Load `kiln.toml` from the project root, falling back to defaults.
    pub fn load(root: &Path) -> Result<Self> {
        let path = Self::config_path(root);
        klog_debug!("Config::load path={}", path.display());
        let mut config = if path.exists() {
            let config: Self = toml::from_str(&fs::read_to_string(&path)?)?;
            klog_debug!("Config loaded from {}", path.display());
            config
        } else {
            klog_debug!("Config file not found, using defaults");
            Self::default()
        };
        config.root = root.to_path_buf();
        Ok(config)
    }

    /// Defaults rooted at `root`, without reading any file.
    pub fn with_root(root: &Path) -> Self {
        Self {
            root: root.to_path_buf(),
            ..Self::default()
        }
    }

    /// Resolve a configured path against the project root.
    pub fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.root.join(path)
        }
    }

    /// Locate a tool binary: the project's `node_modules/.bin` first, then PATH.
    pub fn tool_path(&self, tool: &ToolCommand) -> Option<PathBuf> {
        let local = self.root.join("node_modules").join(".bin").join(&tool.bin);
        if local.is_file() {
            return Some(local);
        }
        which::which(&tool.bin).ok()
    }
}
