//! External program execution
//!
//! Every assembler, mapper and checker is an external program. This module
//! builds the command line, redirects its output to a log file, waits for it
//! to exit, and kills it if the run is interrupted first. There is no timeout:
//! a hung program blocks the pipeline.

use anyhow::{anyhow, Context, Result};
use std::ffi::{OsStr, OsString};
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::time::Instant;
use tokio::process::Command;
use tracing::{debug, error, info, warn};

use super::interrupt::InterruptSignal;
use crate::core::PipelineError;

/// Lines of a failed program's log echoed back to the user
const LOG_TAIL_LINES: usize = 10;

/// One invocation of an external program
#[derive(Debug, Clone)]
pub struct ExternalCommand {
    /// Human readable name used in logs and errors
    label: String,
    program: PathBuf,
    args: Vec<OsString>,
    current_dir: Option<PathBuf>,
    log_file: Option<PathBuf>,
}

impl ExternalCommand {
    pub fn new(label: impl Into<String>, program: impl Into<PathBuf>) -> Self {
        Self {
            label: label.into(),
            program: program.into(),
            args: Vec::new(),
            current_dir: None,
            log_file: None,
        }
    }

    /// Resolve `name` inside an optional install folder, or from PATH when absent
    pub fn locate(folder: Option<&Path>, name: &str) -> PathBuf {
        match folder {
            Some(dir) => dir.join(name),
            None => PathBuf::from(name),
        }
    }

    pub fn arg(mut self, arg: impl AsRef<OsStr>) -> Self {
        self.args.push(arg.as_ref().to_os_string());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        self.args
            .extend(args.into_iter().map(|a| a.as_ref().to_os_string()));
        self
    }

    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.current_dir = Some(dir.into());
        self
    }

    /// Send stdout and stderr to this file
    pub fn log_to(mut self, path: impl Into<PathBuf>) -> Self {
        self.log_file = Some(path.into());
        self
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    /// Rendered command line, for logs
    pub fn command_line(&self) -> String {
        std::iter::once(self.program.as_os_str())
            .chain(self.args.iter().map(OsString::as_os_str))
            .map(|part| part.to_string_lossy().into_owned())
            .collect::<Vec<_>>()
            .join(" ")
    }

    fn build(&self) -> Result<Command> {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args).stdin(Stdio::null()).kill_on_drop(true);

        if let Some(dir) = &self.current_dir {
            cmd.current_dir(dir);
        }

        match &self.log_file {
            Some(path) => {
                let stdout = File::create(path)
                    .with_context(|| format!("Failed to create log file: {}", path.display()))?;
                let stderr = stdout
                    .try_clone()
                    .with_context(|| format!("Failed to share log file: {}", path.display()))?;
                cmd.stdout(Stdio::from(stdout)).stderr(Stdio::from(stderr));
            }
            None => {
                cmd.stdout(Stdio::null()).stderr(Stdio::null());
            }
        }

        Ok(cmd)
    }

    /// Run to completion. A nonzero exit is an error.
    pub async fn run(&self, interrupt: &InterruptSignal) -> Result<()> {
        let status = self.wait_for_exit(self.build()?, interrupt).await?;

        if !status.success() {
            let code = status
                .code()
                .map_or_else(|| "signal".to_string(), |c| c.to_string());
            error!("❌ {} failed with exit code: {}", self.label, code);
            self.report_log_tail();
            return Err(anyhow!("{} failed with exit code: {}", self.label, code));
        }

        Ok(())
    }

    /// Run to completion and capture stdout
    pub async fn output(&self, interrupt: &InterruptSignal) -> Result<String> {
        let mut cmd = self.build()?;
        cmd.stdout(Stdio::piped());
        if self.log_file.is_none() {
            cmd.stderr(Stdio::piped());
        }

        if interrupt.is_raised() {
            return Err(PipelineError::Interrupted.into());
        }

        debug!("   Command: {}", self.command_line());
        let child = cmd
            .spawn()
            .with_context(|| format!("Failed to spawn {}", self.label))?;

        let output = tokio::select! {
            output = child.wait_with_output() => {
                output.with_context(|| format!("Failed to wait for {}", self.label))?
            }
            _ = interrupt.raised() => {
                // Dropping the future drops the child, which kill_on_drop terminates
                warn!("🛑 Interrupted while running {}", self.label);
                return Err(PipelineError::Interrupted.into());
            }
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(anyhow!(
                "{} failed with exit code {:?}: {}",
                self.label,
                output.status.code(),
                stderr.trim()
            ));
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    async fn wait_for_exit(
        &self,
        mut cmd: Command,
        interrupt: &InterruptSignal,
    ) -> Result<ExitStatus> {
        if interrupt.is_raised() {
            return Err(PipelineError::Interrupted.into());
        }

        info!("   Launching {}...", self.label);
        debug!("   Command: {}", self.command_line());
        let start = Instant::now();

        let mut child = cmd
            .spawn()
            .with_context(|| {
                format!("Failed to spawn {} ({})", self.label, self.program.display())
            })?;

        let status = tokio::select! {
            status = child.wait() => {
                status.with_context(|| format!("Failed to wait for {}", self.label))?
            }
            _ = interrupt.raised() => {
                warn!("🛑 Interrupted, killing {}", self.label);
                let _ = child.kill().await;
                return Err(PipelineError::Interrupted.into());
            }
        };

        info!(
            "   {} finished in {:.2}s",
            self.label,
            start.elapsed().as_secs_f64()
        );
        Ok(status)
    }

    fn report_log_tail(&self) {
        let Some(path) = &self.log_file else {
            return;
        };

        match fs::read_to_string(path) {
            Ok(content) => {
                error!("   Last lines of {}:", path.display());
                for line in tail(&content, LOG_TAIL_LINES) {
                    error!("   | {}", line);
                }
            }
            Err(e) => warn!("   Could not read log {}: {}", path.display(), e),
        }
    }
}

fn tail(content: &str, n: usize) -> impl Iterator<Item = &str> {
    let lines: Vec<&str> = content.lines().collect();
    let skip = lines.len().saturating_sub(n);
    lines.into_iter().skip(skip)
}
