//! Subprocess invocation for external tools.

use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use tokio::io::AsyncWriteExt;
use tokio::process::Command;

use crate::config::{Config, ToolCommand};
use crate::{klog_debug, klog_trace, Error, Result};

/// Captured result of one tool run.
#[derive(Debug, Clone)]
pub struct ToolOutput {
    /// Exit code; `None` when the process was killed by a signal.
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl ToolOutput {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }

    /// Best error text: stderr if present, otherwise stdout.
    pub fn error_text(&self) -> String {
        let stderr = self.stderr.trim();
        if stderr.is_empty() {
            self.stdout.trim().to_string()
        } else {
            stderr.to_string()
        }
    }
}

/// A resolved external tool, run from the project root.
#[derive(Debug, Clone)]
pub struct ToolProcess {
    /// Name used in error messages.
    name: String,
    command: ToolCommand,
    /// Resolved binary; `None` when not installed.
    binary: Option<PathBuf>,
    cwd: PathBuf,
    timeout: Duration,
}

impl ToolProcess {
    pub fn new(name: &str, command: &ToolCommand, config: &Config) -> Self {
        let binary = config.tool_path(command);
        klog_debug!(
            "Tool {} resolved to {:?}",
            name,
            binary.as_ref().map(|b| b.display().to_string())
        );
        Self {
            name: name.to_string(),
            command: command.clone(),
            binary,
            cwd: config.root.clone(),
            timeout: Duration::from_secs(config.tools.timeout_secs),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_available(&self) -> bool {
        self.binary.is_some()
    }

    /// Run with the configured leading args plus `args`, optionally feeding
    /// `stdin`. Non-zero exit codes are returned, not turned into errors.
    pub async fn run(
        &self,
        args: &[String],
        stdin: Option<String>,
        envs: &[(&str, String)],
    ) -> Result<ToolOutput> {
        let binary = self.binary.as_ref().ok_or_else(|| Error::ToolNotFound {
            tool: self.command.bin.clone(),
        })?;

        let mut cmd = Command::new(binary);
        cmd.args(&self.command.args)
            .args(args)
            .current_dir(&self.cwd)
            .stdin(if stdin.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        for (key, value) in envs {
            cmd.env(key, value);
        }

        klog_debug!("{} {}", self.command.bin, args.join(" "));
        let mut child = cmd.spawn()?;

        let feeder = match (stdin, child.stdin.take()) {
            (Some(input), Some(mut pipe)) => Some(tokio::spawn(async move {
                // A tool that exits early closes the pipe; its exit status
                // carries the real error.
                let _ = pipe.write_all(input.as_bytes()).await;
                let _ = pipe.shutdown().await;
            })),
            _ => None,
        };

        let output = tokio::time::timeout(self.timeout, child.wait_with_output())
            .await
            .map_err(|_| Error::Timeout(self.timeout))??;

        if let Some(feeder) = feeder {
            let _ = feeder.await;
        }

        let result = ToolOutput {
            code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        };
        klog_trace!(
            "{} exited with {:?} ({} bytes out, {} bytes err)",
            self.name,
            result.code,
            result.stdout.len(),
            result.stderr.len()
        );
        Ok(result)
    }

    /// Run and require a zero exit code, returning stdout.
    pub async fn run_ok(&self, args: &[String], stdin: Option<String>) -> Result<String> {
        self.run_ok_with_env(args, stdin, &[]).await
    }

    pub async fn run_ok_with_env(
        &self,
        args: &[String],
        stdin: Option<String>,
        envs: &[(&str, String)],
    ) -> Result<String> {
        let output = self.run(args, stdin, envs).await?;
        if !output.success() {
            return Err(Error::tool(&self.name, output.error_text()));
        }
        Ok(output.stdout)
    }
}
