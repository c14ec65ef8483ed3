//! Pipeline Data Types
//!
//! Shared data structures passed between pipeline stages. These represent
//! per-stage outcomes, warnings collected along the way, and the final report
//! of a run.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use super::data_structures::{CircularizationVerdict, KmerValue};

/// Pipeline stages, in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PipelineStage {
    DeNovo,
    Mapping,
    GapClosing,
    Circularization,
    Finalization,
}

impl PipelineStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::DeNovo => "de_novo",
            Self::Mapping => "mapping",
            Self::GapClosing => "gap_closing",
            Self::Circularization => "circularization",
            Self::Finalization => "finalization",
        }
    }
}

/// Artifacts a stage hands to the next one
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StagePayload {
    /// Result sequence (FASTA)
    pub sequence: PathBuf,
    /// Companion alignment artifact (MAF), in the untrimmed coordinate space
    pub alignment: Option<PathBuf>,
    /// Companion contig artifact (CAF)
    pub companion: Option<PathBuf>,
    /// K-mer that produced the sequence
    pub kmer: KmerValue,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum StageOutcome {
    Skipped,
    Succeeded(StagePayload),
    Failed(String),
}

impl StageOutcome {
    pub fn payload(&self) -> Option<&StagePayload> {
        match self {
            Self::Succeeded(payload) => Some(payload),
            _ => None,
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed(_))
    }
}

/// A fallback, degradation, or skipped check that did not stop the run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunWarning {
    pub stage: PipelineStage,
    pub message: String,
}

impl RunWarning {
    pub fn new(stage: PipelineStage, message: impl Into<String>) -> Self {
        Self {
            stage,
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunStatus {
    Completed,
    /// Fatal termination at a stage; later stages were not run
    Failed { stage: PipelineStage, reason: String },
}

/// Length and composition of the final sequence
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SequenceStats {
    pub length: usize,
    pub gc_content: f64,
    pub gap_bases: usize,
}

impl SequenceStats {
    pub fn length_without_gaps(&self) -> usize {
        self.length - self.gap_bases
    }
}

/// Files written to the final results directory
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FinalArtifacts {
    pub directory: PathBuf,
    pub sequence: PathBuf,
    pub stats_file: PathBuf,
    pub alignment: Option<PathBuf>,
    pub companion: Option<PathBuf>,
    pub stats: SequenceStats,
}

/// Everything a run produced, successful or not
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineReport {
    pub job_name: String,
    pub started_at: DateTime<Utc>,
    pub status: RunStatus,
    pub de_novo: StageOutcome,
    pub mapping: StageOutcome,
    pub gap_closing: StageOutcome,
    /// Payload circularization and finalization ran against
    pub resolved: Option<StagePayload>,
    /// Gap-closing iteration the resolved payload came from, if any
    pub resolved_iteration: Option<u32>,
    pub circularization: Option<CircularizationVerdict>,
    pub final_artifacts: Option<FinalArtifacts>,
    pub warnings: Vec<RunWarning>,
}

impl PipelineReport {
    pub fn new(job_name: impl Into<String>) -> Self {
        Self {
            job_name: job_name.into(),
            started_at: Utc::now(),
            status: RunStatus::Completed,
            de_novo: StageOutcome::Skipped,
            mapping: StageOutcome::Skipped,
            gap_closing: StageOutcome::Skipped,
            resolved: None,
            resolved_iteration: None,
            circularization: None,
            final_artifacts: None,
            warnings: Vec::new(),
        }
    }

    pub fn warn(&mut self, stage: PipelineStage, message: impl Into<String>) {
        self.warnings.push(RunWarning::new(stage, message));
    }

    pub fn fail(&mut self, stage: PipelineStage, reason: impl Into<String>) {
        self.status = RunStatus::Failed {
            stage,
            reason: reason.into(),
        };
    }

    pub fn is_success(&self) -> bool {
        matches!(self.status, RunStatus::Completed)
    }

    /// K-mer carried by the last stage that produced a payload
    pub fn kmer_used(&self) -> Option<KmerValue> {
        self.resolved
            .as_ref()
            .or_else(|| self.mapping.payload())
            .or_else(|| self.de_novo.payload())
            .map(|payload| payload.kmer)
    }
}
