//! Stage sequencing: De Novo → Mapping → Gap-Closing → Circularization → Finalization
//!
//! De Novo and Mapping failures halt the run. Everything after them degrades:
//! the run continues with whatever payload is available and records a
//! [`RunWarning`](crate::core::RunWarning). The only error [`PipelineSequencer::run`]
//! returns is an interrupt.

use anyhow::Result;
use std::fs;
use std::path::PathBuf;
use tracing::{error, info, instrument, warn};

use super::circularization::{trim_circular, CircularizationChecker};
use super::finalization::Finalizer;
use super::gap_closing::GapClosingStage;
use super::locator::StageOutputLocator;
use super::mapping::MappingStage;
use crate::assembly::{KmerSearchLoop, Selection};
use crate::core::{
    CircularizationVerdict, KmerParameterList, KmerValue, PipelineError, PipelineReport,
    PipelineStage, StageOutcome, StagePayload,
};
use crate::utils::format_writers::{read_first_sequence, write_fasta};
use crate::utils::intermediate_output::RunLayout;
use crate::utils::interrupt::InterruptSignal;

const NOT_CIRCULAR_WARNING: &str =
    "Circularization wasn't found, so the end of the sequence might have to be extended.";

/// Where the seed sequence for mapping comes from
pub enum DeNovoSource {
    Search {
        search: KmerSearchLoop,
        kmers: KmerParameterList,
    },
    /// Pre-built seed; de novo assembly is skipped
    Seed { path: PathBuf, kmer: KmerValue },
}

/// Optional iterative gap closing with the locator used to find its output
pub struct GapClosing {
    pub stage: Box<dyn GapClosingStage>,
    pub locator: Box<dyn StageOutputLocator>,
}

pub struct PipelineSequencer {
    layout: RunLayout,
    de_novo: DeNovoSource,
    mapping: Box<dyn MappingStage>,
    gap_closing: Option<GapClosing>,
    checker: Box<dyn CircularizationChecker>,
    finalizer: Finalizer,
    circular_window: usize,
    circular_offset: usize,
    interrupt: InterruptSignal,
}

impl PipelineSequencer {
    pub fn new(
        layout: RunLayout,
        de_novo: DeNovoSource,
        mapping: Box<dyn MappingStage>,
        checker: Box<dyn CircularizationChecker>,
        interrupt: InterruptSignal,
    ) -> Self {
        Self {
            finalizer: Finalizer::new(layout.clone()),
            layout,
            de_novo,
            mapping,
            gap_closing: None,
            checker,
            circular_window: 45,
            circular_offset: 200,
            interrupt,
        }
    }

    pub fn with_gap_closing(mut self, gap_closing: GapClosing) -> Self {
        self.gap_closing = Some(gap_closing);
        self
    }

    pub fn with_circularization_window(mut self, window_size: usize, offset: usize) -> Self {
        self.circular_window = window_size;
        self.circular_offset = offset;
        self
    }

    fn ensure_not_interrupted(&self) -> Result<()> {
        if self.interrupt.is_raised() {
            return Err(PipelineError::Interrupted.into());
        }
        Ok(())
    }

    #[instrument(skip(self), fields(job = self.layout.job_name()))]
    pub async fn run(&self) -> Result<PipelineReport> {
        let mut report = PipelineReport::new(self.layout.job_name());

        let Some(seed) = self.run_de_novo(&mut report).await? else {
            return Ok(report);
        };

        self.ensure_not_interrupted()?;
        let Some(mapping) = self.run_mapping(&seed, &mut report).await? else {
            return Ok(report);
        };

        self.ensure_not_interrupted()?;
        let resolved = self.run_gap_closing(&mapping, &mut report).await?;

        self.ensure_not_interrupted()?;
        let verdict = self.run_circularization(&resolved, &mut report).await?;

        self.ensure_not_interrupted()?;
        self.run_finalization(&resolved, &verdict, &mut report);

        info!(
            "🎉 Pipeline finished with {} warning(s)",
            report.warnings.len()
        );
        Ok(report)
    }

    async fn run_de_novo(&self, report: &mut PipelineReport) -> Result<Option<StagePayload>> {
        let (search, kmers) = match &self.de_novo {
            DeNovoSource::Seed { path, kmer } => {
                info!("⏭️  Seed sequence supplied, skipping de novo assembly");
                report.de_novo = StageOutcome::Skipped;
                return Ok(Some(StagePayload {
                    sequence: path.clone(),
                    alignment: None,
                    companion: None,
                    kmer: *kmer,
                }));
            }
            DeNovoSource::Search { search, kmers } => (search, kmers),
        };

        info!("🧬 Stage 1: De novo assembly with {}", search.backend_name());
        let outcome = match search.run(kmers).await {
            Ok(outcome) => outcome,
            Err(PipelineError::Interrupted) => return Err(PipelineError::Interrupted.into()),
            Err(err) => {
                error!("❌ {}", err);
                report.de_novo = StageOutcome::Failed(err.to_string());
                report.fail(PipelineStage::DeNovo, err.to_string());
                return Ok(None);
            }
        };

        let seed_path = self.layout.seed_path();
        let written = match &outcome.selection {
            Selection::Accepted { seed } => fs::copy(seed, &seed_path)
                .map(|_| ())
                .map_err(anyhow::Error::from),
            Selection::BestEffort(build) => {
                let inconclusive = PipelineError::ValidationInconclusive { kmer: outcome.kmer };
                warn!("⚠️  {}", inconclusive);
                report.warn(PipelineStage::DeNovo, inconclusive.to_string());
                write_fasta(
                    &seed_path,
                    &format!("{}_best", self.layout.job_name()),
                    &build.sequence,
                )
            }
        };

        if let Err(e) = written {
            let reason = format!("Could not write seed sequence {}: {e:#}", seed_path.display());
            error!("❌ {}", reason);
            report.de_novo = StageOutcome::Failed(reason.clone());
            report.fail(PipelineStage::DeNovo, reason);
            return Ok(None);
        }

        if let Some(err) = &outcome.degraded_by {
            report.warn(
                PipelineStage::DeNovo,
                format!(
                    "{err}; proceeding with the best build so far (k-mer {})",
                    outcome.kmer
                ),
            );
        }

        let payload = StagePayload {
            sequence: seed_path,
            alignment: None,
            companion: None,
            kmer: outcome.kmer,
        };
        info!(
            "✅ De novo assembly selected k-mer {} after {} run(s)",
            outcome.kmer, outcome.attempted
        );
        report.de_novo = StageOutcome::Succeeded(payload.clone());
        Ok(Some(payload))
    }

    async fn run_mapping(
        &self,
        seed: &StagePayload,
        report: &mut PipelineReport,
    ) -> Result<Option<StagePayload>> {
        info!("🗺️  Stage 2: Mapping reads onto the seed sequence");
        match self.mapping.map(&seed.sequence, seed.kmer).await {
            Ok(payload) => {
                report.mapping = StageOutcome::Succeeded(payload.clone());
                Ok(Some(payload))
            }
            Err(e) if PipelineError::is_interrupt(&e) => Err(e),
            Err(e) => {
                let reason = format!("Mapping stage failed. Aborting. ({e:#})");
                error!("❌ {}", reason);
                report.mapping = StageOutcome::Failed(format!("{e:#}"));
                report.fail(PipelineStage::Mapping, reason);
                Ok(None)
            }
        }
    }

    async fn run_gap_closing(
        &self,
        mapping: &StagePayload,
        report: &mut PipelineReport,
    ) -> Result<StagePayload> {
        let Some(GapClosing { stage, locator }) = &self.gap_closing else {
            info!("⏭️  Gap closing skipped");
            report.gap_closing = StageOutcome::Skipped;
            report.warn(
                PipelineStage::GapClosing,
                "Gap closing skipped; using the mapping result",
            );
            report.resolved = Some(mapping.clone());
            return Ok(mapping.clone());
        };

        info!("🔁 Stage 3: Gap closing");
        if let Err(e) = stage.close_gaps(mapping).await {
            if PipelineError::is_interrupt(&e) {
                return Err(e);
            }
            warn!("⚠️  Gap closing failed: {:#}", e);
            report.warn(PipelineStage::GapClosing, format!("Gap closing failed: {e:#}"));
        }

        let max_iteration = stage.max_iterations();
        let resolved = match locator.latest_iteration(max_iteration) {
            Some(iteration) => {
                if iteration < max_iteration {
                    report.warn(
                        PipelineStage::GapClosing,
                        format!(
                            "Iterations {}..={} left no result; using iteration {}",
                            iteration + 1,
                            max_iteration,
                            iteration
                        ),
                    );
                }
                info!("✅ Using gap-closing iteration {}", iteration);
                let payload = stage.iteration_payload(iteration, mapping.kmer);
                report.gap_closing = StageOutcome::Succeeded(payload.clone());
                report.resolved_iteration = Some(iteration);
                payload
            }
            None => {
                let exhausted = PipelineError::FallbackDiscoveryExhausted { max_iteration };
                warn!("⚠️  {}; falling back to the mapping result", exhausted);
                report.warn(
                    PipelineStage::GapClosing,
                    format!("{exhausted}; falling back to the mapping result"),
                );
                report.gap_closing = StageOutcome::Failed(exhausted.to_string());
                mapping.clone()
            }
        };

        report.resolved = Some(resolved.clone());
        Ok(resolved)
    }

    async fn run_circularization(
        &self,
        resolved: &StagePayload,
        report: &mut PipelineReport,
    ) -> Result<CircularizationVerdict> {
        info!("⭕ Stage 4: Checking circularization");
        let verdict = match self
            .checker
            .check(&resolved.sequence, self.circular_window, self.circular_offset)
            .await
        {
            Ok(verdict) => verdict,
            Err(e) if PipelineError::is_interrupt(&e) => return Err(e),
            Err(e) => {
                let indeterminate = PipelineError::CircularizationIndeterminate {
                    message: format!("{e:#}"),
                };
                warn!("⚠️  {}", indeterminate);
                report.warn(PipelineStage::Circularization, indeterminate.to_string());
                CircularizationVerdict::not_circular()
            }
        };

        if verdict.is_circular {
            info!(
                "✅ Circularization found between {} and {}",
                verdict.start, verdict.end
            );
        }
        report.circularization = Some(verdict);
        Ok(verdict)
    }

    fn run_finalization(
        &self,
        resolved: &StagePayload,
        verdict: &CircularizationVerdict,
        report: &mut PipelineReport,
    ) {
        info!("📦 Stage 5: Finalization");
        if !verdict.is_circular {
            warn!("⚠️  {}", NOT_CIRCULAR_WARNING);
            report.warn(PipelineStage::Finalization, NOT_CIRCULAR_WARNING);
        }

        let sequence = match read_first_sequence(&resolved.sequence) {
            Ok(record) => record.sequence,
            Err(e) => {
                report.warn(
                    PipelineStage::Finalization,
                    format!("Finalization skipped, resolved sequence unreadable: {e:#}"),
                );
                return;
            }
        };

        let trimmed = match trim_circular(&sequence, verdict) {
            Some(trimmed) => trimmed,
            None => {
                report.warn(
                    PipelineStage::Circularization,
                    format!(
                        "Circularization end {} lies past the sequence end ({} bp); \
                         sequence left untrimmed",
                        verdict.end,
                        sequence.len()
                    ),
                );
                sequence.as_str()
            }
        };

        match self
            .finalizer
            .finalize(trimmed, resolved, verdict, resolved.kmer)
        {
            Ok(finalized) => {
                for message in finalized.warnings {
                    report.warn(PipelineStage::Finalization, message);
                }
                report.final_artifacts = Some(finalized.artifacts);
            }
            Err(e) => {
                warn!("⚠️  Finalization failed: {:#}", e);
                report.warn(
                    PipelineStage::Finalization,
                    format!("Finalization failed: {e:#}"),
                );
            }
        }
    }
}
