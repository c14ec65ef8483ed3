//! Candidate build validation
//!
//! The validator decides whether a backend's raw output already is the
//! target sequence, is unusable, or is a usable build that has to be
//! compared against the others.

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::{debug, instrument};

use crate::core::{BuildResult, SizeWindow};
use crate::utils::configuration::{CircularizationConfig, OrganelleKind, ValidationConfig};
use crate::utils::external_process::ExternalCommand;
use crate::utils::format_writers::read_first_sequence;
use crate::utils::interrupt::InterruptSignal;

#[derive(Debug, Clone, PartialEq)]
pub enum ValidatorVerdict {
    /// Every acceptance criterion met; `seed` holds the extracted sequence
    Accepted { seed: PathBuf },
    /// Nothing usable was produced
    Rejected,
    Scored(BuildResult),
}

/// Acceptance thresholds shared by every candidate of a run
#[derive(Debug, Clone)]
pub struct AcceptanceCriteria {
    pub size_window: SizeWindow,
    pub reference: Option<PathBuf>,
    pub blast_evalue: f64,
    pub blast_hit_percentage: f64,
    pub cutoff_equality: f64,
    pub cove_cutoff: u32,
    pub organism_type: u32,
    pub organelle: OrganelleKind,
    pub skip_trna_scan: bool,
    pub relaxed: bool,
    pub circular_window: usize,
    pub circular_offset: usize,
}

impl AcceptanceCriteria {
    pub fn from_config(
        validation: &ValidationConfig,
        circularization: &CircularizationConfig,
        size_window: SizeWindow,
    ) -> Self {
        Self {
            size_window,
            reference: validation.reference.clone(),
            blast_evalue: validation.blast_evalue,
            blast_hit_percentage: validation.blast_hit_percentage,
            cutoff_equality: validation.cutoff_equality,
            cove_cutoff: validation.cove_cutoff,
            organism_type: validation.effective_organism_type(),
            organelle: validation.organelle,
            skip_trna_scan: validation.skip_trna_scan,
            relaxed: validation.relaxed,
            circular_window: circularization.window_size,
            circular_offset: circularization.offset,
        }
    }
}

/// One candidate handed to the validator
#[derive(Debug, Clone)]
pub struct ValidationRequest<'a> {
    /// Backend that produced the candidate
    pub process_name: &'a str,
    pub job_name: &'a str,
    pub workdir: &'a Path,
    pub output: &'a Path,
    /// Number of read groups the backend assembled
    pub read_groups: usize,
    pub criteria: &'a AcceptanceCriteria,
}

#[async_trait]
pub trait BuildValidator: Send + Sync {
    async fn check(&self, request: &ValidationRequest<'_>) -> Result<ValidatorVerdict>;
}

#[derive(Debug, Deserialize)]
struct BuildMetrics {
    valid_contigs: u32,
    present_features: u32,
    important_features: u32,
    split_genes: u32,
    complete_genes: u32,
    #[serde(default)]
    trna_count: u32,
    #[serde(default)]
    is_circular: bool,
}

/// JSON printed on stdout by the validator program
#[derive(Debug, Deserialize)]
#[serde(tag = "verdict", rename_all = "snake_case")]
enum VerdictReport {
    Accepted { seed: PathBuf },
    Rejected,
    Scored { seed: PathBuf, metrics: BuildMetrics },
}

/// Runs an external validator program and parses its JSON verdict
pub struct CommandValidator {
    program: PathBuf,
    interrupt: InterruptSignal,
}

impl CommandValidator {
    pub fn new(program: impl Into<PathBuf>, interrupt: InterruptSignal) -> Self {
        Self {
            program: program.into(),
            interrupt,
        }
    }

    fn command(&self, request: &ValidationRequest<'_>) -> ExternalCommand {
        let criteria = request.criteria;
        let window = criteria.size_window;

        let mut command = ExternalCommand::new("validator", &self.program)
            .args(["--process", request.process_name])
            .args(["--job", request.job_name])
            .arg("--workdir")
            .arg(request.workdir)
            .arg("--output")
            .arg(request.output)
            .args(["--read-groups", &request.read_groups.to_string()])
            .args(["--min-size", &window.min.to_string()])
            .args(["--max-size", &window.max.to_string()])
            .args(["--optimum-size", &window.optimum.to_string()])
            .args(["--evalue", &criteria.blast_evalue.to_string()])
            .args(["--hit-percentage", &criteria.blast_hit_percentage.to_string()])
            .args(["--cutoff-equality", &criteria.cutoff_equality.to_string()])
            .args(["--cove-cutoff", &criteria.cove_cutoff.to_string()])
            .args(["--organism-type", &criteria.organism_type.to_string()])
            .args(["--organelle", criteria.organelle.as_str()])
            .args(["--circular-size", &criteria.circular_window.to_string()])
            .args(["--circular-offset", &criteria.circular_offset.to_string()]);

        if let Some(reference) = &criteria.reference {
            command = command.arg("--reference").arg(reference);
        }
        if criteria.skip_trna_scan {
            command = command.arg("--skip-trna-scan");
        }
        if criteria.relaxed {
            command = command.arg("--relaxed");
        }

        command.current_dir(request.workdir)
    }
}

/// Turn the validator's report into a verdict, loading scored sequences
fn into_verdict(report: VerdictReport, workdir: &Path) -> Result<ValidatorVerdict> {
    let resolve = |seed: PathBuf| {
        if seed.is_relative() {
            workdir.join(seed)
        } else {
            seed
        }
    };

    Ok(match report {
        VerdictReport::Accepted { seed } => ValidatorVerdict::Accepted {
            seed: resolve(seed),
        },
        VerdictReport::Rejected => ValidatorVerdict::Rejected,
        VerdictReport::Scored { seed, metrics } => {
            let sequence = read_first_sequence(resolve(seed))?.sequence;
            ValidatorVerdict::Scored(BuildResult {
                sequence,
                valid_contigs: metrics.valid_contigs,
                present_features: metrics.present_features,
                important_features: metrics.important_features,
                split_genes: metrics.split_genes,
                complete_genes: metrics.complete_genes,
                trna_count: metrics.trna_count,
                is_circular: metrics.is_circular,
            })
        }
    })
}

#[async_trait]
impl BuildValidator for CommandValidator {
    #[instrument(skip_all, fields(process = request.process_name))]
    async fn check(&self, request: &ValidationRequest<'_>) -> Result<ValidatorVerdict> {
        let stdout = self.command(request).output(&self.interrupt).await?;
        debug!("Validator reported: {}", stdout.trim());

        let report: VerdictReport = serde_json::from_str(stdout.trim())
            .with_context(|| format!("Unreadable validator verdict: '{}'", stdout.trim()))?;

        into_verdict(report, request.workdir)
    }
}
