use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("Watch error: {0}")]
    Watch(#[from] notify::Error),

    #[error("Invalid glob pattern: {0}")]
    Pattern(#[from] glob::PatternError),

    #[error("Task '{0}' is not in your task registry")]
    UnknownTask(String),

    #[error("Task '{0}' is already registered")]
    DuplicateTask(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Tool not found: {tool} (install it locally with npm or put it on PATH)")]
    ToolNotFound { tool: String },

    #[error("{tool}: {message}")]
    Tool { tool: String, message: String },

    #[error("Missing source file: {}", .0.display())]
    MissingSource(PathBuf),

    #[error("Task '{task}' failed: {detail}")]
    TaskFailed { task: String, detail: String },

    #[error("Operation timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("Task join error: {0}")]
    TaskJoin(String),

    #[error("Server error: {0}")]
    Server(String),
}

impl Error {
    /// Shorthand for a failure reported by an external tool.
    pub fn tool(tool: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Tool {
            tool: tool.into(),
            message: message.into(),
        }
    }

    /// Whether the runner already logged this failure when it happened.
    pub fn is_reported(&self) -> bool {
        matches!(self, Error::TaskFailed { .. })
    }
}

pub type Result<T> = std::result::Result<T, Error>;
