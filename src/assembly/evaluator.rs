use std::fs;
use std::path::PathBuf;
use tracing::{error, info, instrument};

use super::backend::AssemblyBackend;
use super::validator::{AcceptanceCriteria, BuildValidator, ValidationRequest, ValidatorVerdict};
use crate::core::{KmerValue, PipelineError};
use crate::library::LibraryManifest;
use crate::utils::intermediate_output::RunLayout;
use crate::utils::interrupt::InterruptSignal;

/// Name of the manifest copy placed in every k-mer directory
pub const MANIFEST_FILE_NAME: &str = "manifest.config";

/// Runs one backend for one k-mer in its own directory and classifies the result
pub struct CandidateBuildEvaluator {
    backend: Box<dyn AssemblyBackend>,
    validator: Box<dyn BuildValidator>,
    criteria: AcceptanceCriteria,
    manifest: LibraryManifest,
    layout: RunLayout,
    interrupt: InterruptSignal,
}

impl CandidateBuildEvaluator {
    pub fn new(
        backend: Box<dyn AssemblyBackend>,
        validator: Box<dyn BuildValidator>,
        criteria: AcceptanceCriteria,
        manifest: LibraryManifest,
        layout: RunLayout,
        interrupt: InterruptSignal,
    ) -> Self {
        Self {
            backend,
            validator,
            criteria,
            manifest,
            layout,
            interrupt,
        }
    }

    pub fn backend(&self) -> &dyn AssemblyBackend {
        self.backend.as_ref()
    }

    pub fn workdir(&self, kmer: &KmerValue) -> PathBuf {
        self.layout.kmer_dir(kmer)
    }

    fn invocation_error(&self, kmer: KmerValue, err: impl std::fmt::Display) -> PipelineError {
        PipelineError::BackendInvocation {
            backend: self.backend.name().to_string(),
            kmer,
            message: err.to_string(),
        }
    }

    /// Evaluate one k-mer. Backend failures become `BackendInvocation`,
    /// interrupts stay `Interrupted`.
    #[instrument(skip(self), fields(backend = self.backend.name()))]
    pub async fn evaluate(&self, kmer: KmerValue) -> Result<ValidatorVerdict, PipelineError> {
        let workdir = self.workdir(&kmer);
        info!("📁 Preparing {}", workdir.display());

        self.layout
            .recreate_dir(&workdir)
            .map_err(|e| self.invocation_error(kmer, format!("{e:#}")))?;
        fs::write(workdir.join(MANIFEST_FILE_NAME), self.manifest.render())
            .map_err(|e| self.invocation_error(kmer, e))?;

        if self.interrupt.is_raised() {
            return Err(PipelineError::Interrupted);
        }

        let output = match self.backend.run(&kmer, &workdir).await {
            Ok(output) => output,
            Err(e) if PipelineError::is_interrupt(&e) => return Err(PipelineError::Interrupted),
            Err(e) => {
                error!(
                    "❌ An error occurred while running {} for de novo assembly",
                    self.backend.name()
                );
                return Err(self.invocation_error(kmer, format!("{e:#}")));
            }
        };

        let request = ValidationRequest {
            process_name: self.backend.name(),
            job_name: self.layout.job_name(),
            workdir: &workdir,
            output: &output.primary,
            read_groups: self.manifest.libraries.len(),
            criteria: &self.criteria,
        };

        match self.validator.check(&request).await {
            Ok(verdict) => Ok(verdict),
            Err(e) if PipelineError::is_interrupt(&e) => Err(PipelineError::Interrupted),
            Err(e) => Err(self.invocation_error(kmer, format!("validation failed: {e:#}"))),
        }
    }
}
