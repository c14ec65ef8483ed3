//! Error taxonomy for the assembly pipeline.
//!
//! Decision code (the k-mer search loop and the stage sequencer) works with
//! [`PipelineError`] directly so it can branch on the variant; glue code uses
//! `anyhow` and carries these errors through `?`.

use config::ConfigError;
use thiserror::Error;

use super::data_structures::KmerValue;

#[derive(Error, Debug)]
pub enum PipelineError {
    /// The assembler process failed to start, exited nonzero, or left no output.
    #[error("Backend invocation error ({backend}, k-mer {kmer}): {message}")]
    BackendInvocation {
        backend: String,
        kmer: KmerValue,
        message: String,
    },

    /// The validator scored a build instead of accepting it outright.
    #[error(
        "Validation inconclusive for k-mer {kmer}: no candidate met every acceptance criterion"
    )]
    ValidationInconclusive { kmer: KmerValue },

    #[error("After {attempts} runs, target DNA wasn't built. Giving up.")]
    NoCandidateProduced { attempts: usize },

    #[error("No gap-closing iteration artifact found among iterations 1..={max_iteration}")]
    FallbackDiscoveryExhausted { max_iteration: u32 },

    /// Not a failure: topology simply could not be established.
    #[error("Circularization indeterminate: {message}")]
    CircularizationIndeterminate { message: String },

    #[error("Mapping stage failed: {message}")]
    MappingFailed { message: String },

    #[error("Pipeline interrupted")]
    Interrupted,

    #[error("Library manifest error at line {line}: {message}")]
    Manifest { line: usize, message: String },

    #[error("Configuration error: {message}")]
    Configuration { message: String },

    #[error("Validation error: {field} is invalid: {reason}")]
    Validation { field: String, reason: String },

    #[error("Input/Output error: {message}")]
    Io { message: String },
}

impl PipelineError {
    /// Recover a pipeline error carried inside an `anyhow::Error`, if any.
    pub fn find_in(err: &anyhow::Error) -> Option<&PipelineError> {
        err.chain().find_map(|cause| cause.downcast_ref::<PipelineError>())
    }

    /// True when an `anyhow::Error` originated from an interrupt.
    pub fn is_interrupt(err: &anyhow::Error) -> bool {
        matches!(Self::find_in(err), Some(PipelineError::Interrupted))
    }
}

impl From<ConfigError> for PipelineError {
    fn from(err: ConfigError) -> Self {
        PipelineError::Configuration {
            message: err.to_string(),
        }
    }
}

impl From<std::io::Error> for PipelineError {
    fn from(err: std::io::Error) -> Self {
        PipelineError::Io {
            message: err.to_string(),
        }
    }
}
