//! Console logging for kiln.
//!
//! Log levels:
//! - ERROR: Hard failures (compile/bundle errors, failed tasks)
//! - WARN: Recoverable conditions (missing markers, no fonts found)
//! - INFO: Task progress and banners
//! - DEBUG: Tool invocations and discovered files
//! - TRACE: Raw tool output and watcher events
//!
//! Debug mode can be enabled with `--debug` flag or `KILN_DEBUG=1` env var.
//! Every line is written to stderr as `[HH:MM:SS] message`, colored by
//! severity.

use std::io::Write;
use std::sync::atomic::{AtomicU8, Ordering};

use colored::Colorize;

static LOG_LEVEL: AtomicU8 = AtomicU8::new(LogLevel::Info as u8);

/// Log levels for filtering messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum LogLevel {
    Error = 0,
    Warn = 1,
    Info = 2,
    Debug = 3,
    Trace = 4,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Error => "ERROR",
            LogLevel::Warn => "WARN",
            LogLevel::Info => "INFO",
            LogLevel::Debug => "DEBUG",
            LogLevel::Trace => "TRACE",
        }
    }

    fn from_u8(v: u8) -> Self {
        match v {
            0 => LogLevel::Error,
            1 => LogLevel::Warn,
            2 => LogLevel::Info,
            3 => LogLevel::Debug,
            _ => LogLevel::Trace,
        }
    }
}

/// Initialize logging with explicit debug mode setting.
pub fn init_with_debug(debug: bool) {
    let env_debug = std::env::var("KILN_DEBUG")
        .map(|v| v == "1" || v.to_lowercase() == "true")
        .unwrap_or(false);

    let level = if debug || env_debug {
        LogLevel::Debug
    } else {
        LogLevel::Info
    };
    LOG_LEVEL.store(level as u8, Ordering::SeqCst);
}

/// Get the current log level.
pub fn get_level() -> LogLevel {
    LogLevel::from_u8(LOG_LEVEL.load(Ordering::Relaxed))
}

/// Render a message with its severity coloring. WARN and ERROR lines carry
/// their level name; INFO is uncolored.
fn paint(level: LogLevel, msg: &str) -> String {
    match level {
        LogLevel::Error | LogLevel::Warn => {
            let line = format!("{} {}", level.as_str(), msg);
            if level == LogLevel::Error {
                line.red().to_string()
            } else {
                line.yellow().to_string()
            }
        }
        LogLevel::Info => msg.to_string(),
        LogLevel::Debug | LogLevel::Trace => msg.dimmed().to_string(),
    }
}

/// Log a message at the specified level.
pub fn log_at(level: LogLevel, msg: &str) {
    if level > get_level() {
        return;
    }
    write_line(&paint(level, msg));
}

fn write_line(msg: &str) {
    let timestamp = chrono::Local::now().format("%H:%M:%S");
    let mut stderr = std::io::stderr().lock();
    let _ = writeln!(stderr, "[{}] {}", timestamp.to_string().dimmed(), msg);
}

/// Print a boxed green banner, always shown.
pub fn banner(lines: &[&str]) {
    let width = lines.iter().map(|l| l.len()).max().unwrap_or(0) + 4;
    let rule = "#".repeat(width + 4);
    let blank = format!("##{}##", " ".repeat(width));

    let mut text = String::from("\n");
    text.push_str(&format!("\t\t{}\n\t\t{}\n", rule, blank));
    for line in lines {
        text.push_str(&format!("\t\t##{:^width$}##\n", line, width = width));
    }
    text.push_str(&format!("\t\t{}\n\t\t{}", blank, rule));

    write_line(&text.green().to_string());
}

/// Log a message at INFO level (default, always logged).
pub fn log(msg: &str) {
    log_at(LogLevel::Info, msg);
}

/// Log a message at ERROR level.
pub fn error(msg: &str) {
    log_at(LogLevel::Error, msg);
}

/// Log a message at WARN level.
pub fn warn(msg: &str) {
    log_at(LogLevel::Warn, msg);
}

/// Log a message at DEBUG level (only in debug mode).
pub fn debug(msg: &str) {
    log_at(LogLevel::Debug, msg);
}

/// Log a message at TRACE level (very verbose).
pub fn trace(msg: &str) {
    log_at(LogLevel::Trace, msg);
}

/// Log macro for INFO level.
#[macro_export]
macro_rules! klog {
    ($($arg:tt)*) => {
        $crate::log::log(&format!($($arg)*))
    };
}

/// Log macro for ERROR level.
#[macro_export]
macro_rules! klog_error {
    ($($arg:tt)*) => {
        $crate::log::error(&format!($($arg)*))
    };
}

/// Log macro for WARN level.
#[macro_export]
macro_rules! klog_warn {
    ($($arg:tt)*) => {
        $crate::log::warn(&format!($($arg)*))
    };
}

/// Log macro for DEBUG level (only logs when debug mode is enabled).
#[macro_export]
macro_rules! klog_debug {
    ($($arg:tt)*) => {
        $crate::log::debug(&format!($($arg)*))
    };
}

/// Log macro for TRACE level.
#[macro_export]
macro_rules! klog_trace {
    ($($arg:tt)*) => {
        $crate::log::trace(&format!($($arg)*))
    };
}
