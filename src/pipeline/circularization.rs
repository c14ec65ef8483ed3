//! Circularization detection and trimming

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::{debug, instrument};

use crate::core::CircularizationVerdict;
use crate::utils::external_process::ExternalCommand;
use crate::utils::interrupt::InterruptSignal;

#[async_trait]
pub trait CircularizationChecker: Send + Sync {
    async fn check(
        &self,
        sequence: &Path,
        window_size: usize,
        offset: usize,
    ) -> Result<CircularizationVerdict>;
}

#[derive(Debug, Deserialize)]
struct CheckerReport {
    is_circular: bool,
    #[serde(default)]
    start: usize,
    #[serde(default)]
    end: usize,
}

/// Runs an external checker printing `{"is_circular":..,"start":..,"end":..}`
pub struct CommandCircularizationChecker {
    program: PathBuf,
    interrupt: InterruptSignal,
}

impl CommandCircularizationChecker {
    pub fn new(program: impl Into<PathBuf>, interrupt: InterruptSignal) -> Self {
        Self {
            program: program.into(),
            interrupt,
        }
    }
}

#[async_trait]
impl CircularizationChecker for CommandCircularizationChecker {
    #[instrument(skip(self))]
    async fn check(
        &self,
        sequence: &Path,
        window_size: usize,
        offset: usize,
    ) -> Result<CircularizationVerdict> {
        let stdout = ExternalCommand::new("circularization check", &self.program)
            .arg("--sequence")
            .arg(sequence)
            .args(["--window-size", &window_size.to_string()])
            .args(["--offset", &offset.to_string()])
            .output(&self.interrupt)
            .await?;
        debug!("Circularization check reported: {}", stdout.trim());

        let report: CheckerReport = serde_json::from_str(stdout.trim())
            .with_context(|| format!("Unreadable circularization report: '{}'", stdout.trim()))?;

        Ok(CircularizationVerdict {
            is_circular: report.is_circular,
            start: report.start,
            end: report.end,
        })
    }
}

/// Drop the `[0, end)` overlap of a circular sequence.
///
/// Returns `None` when `end` falls outside the sequence. Non-circular
/// verdicts leave the sequence untouched.
pub fn trim_circular<'a>(sequence: &'a str, verdict: &CircularizationVerdict) -> Option<&'a str> {
    if verdict.is_circular {
        sequence.get(verdict.end..)
    } else {
        Some(sequence)
    }
}
