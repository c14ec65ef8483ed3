//! Final results directory

use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, instrument, warn};

use crate::core::{
    count_gap_bases, gc_content, CircularizationVerdict, FinalArtifacts, KmerValue,
    SequenceStats, StagePayload,
};
use crate::utils::format_writers::{write_fasta, write_stats};
use crate::utils::intermediate_output::RunLayout;

/// What finalization wrote plus anything it had to skip
#[derive(Debug, Clone)]
pub struct Finalized {
    pub artifacts: FinalArtifacts,
    pub warnings: Vec<String>,
}

pub struct Finalizer {
    layout: RunLayout,
}

impl Finalizer {
    pub fn new(layout: RunLayout) -> Self {
        Self { layout }
    }

    /// Write the resolved (and possibly trimmed) sequence, copy the
    /// companion artifacts as they are, and write the stats file.
    #[instrument(skip_all, fields(length = sequence.len()))]
    pub fn finalize(
        &self,
        sequence: &str,
        source: &StagePayload,
        verdict: &CircularizationVerdict,
        kmer: KmerValue,
    ) -> Result<Finalized> {
        let job = self.layout.job_name();
        let directory = self.layout.final_results_dir();
        fs::create_dir_all(&directory)
            .with_context(|| format!("Failed to create {}", directory.display()))?;

        let sequence = sequence.to_ascii_uppercase();
        let fasta = directory.join(format!("{job}.unordered.fasta"));
        write_fasta(&fasta, job, &sequence)?;

        let mut warnings = Vec::new();
        let alignment =
            copy_companion(source.alignment.as_deref(), &directory, job, "maf", &mut warnings);
        let companion =
            copy_companion(source.companion.as_deref(), &directory, job, "caf", &mut warnings);

        let stats = SequenceStats {
            length: sequence.len(),
            gc_content: gc_content(&sequence),
            gap_bases: count_gap_bases(&sequence),
        };
        let stats_file = directory.join(format!("{job}.stats"));
        write_stats(&stats_file, &stats, verdict, &kmer)?;

        info!("📦 Final results written to {}", directory.display());
        Ok(Finalized {
            artifacts: FinalArtifacts {
                directory,
                sequence: fasta,
                stats_file,
                alignment,
                companion,
                stats,
            },
            warnings,
        })
    }
}

/// Copy a MAF/CAF file unchanged. Its coordinates stay those of the untrimmed sequence.
fn copy_companion(
    source: Option<&Path>,
    directory: &Path,
    job: &str,
    extension: &str,
    warnings: &mut Vec<String>,
) -> Option<PathBuf> {
    let source = source.filter(|path| path.is_file());
    let Some(source) = source else {
        let message = format!("No .{extension} file to copy into the final results");
        warn!("⚠️  {}", message);
        warnings.push(message);
        return None;
    };

    let target = directory.join(format!("{job}.unordered.{extension}"));
    match fs::copy(source, &target) {
        Ok(_) => Some(target),
        Err(e) => {
            let message = format!("Could not copy {}: {}", source.display(), e);
            warn!("⚠️  {}", message);
            warnings.push(message);
            None
        }
    }
}
