use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use colored::Colorize;
use std::path::{Path, PathBuf};
use tracing::{info, instrument, warn};

use super::circularization::CommandCircularizationChecker;
use super::gap_closing::{Mitobim, MitobimSettings};
use super::locator::FsIterationLocator;
use super::mapping::{MiraMapping, MiraMappingSettings};
use super::sequencer::{DeNovoSource, GapClosing, PipelineSequencer};
use crate::assembly::{
    create_backend, AcceptanceCriteria, BackendKind, BackendOptions, BackendSettings,
    BuildComparator, CandidateBuildEvaluator, CommandValidator, ComparisonMode, KmerSearchLoop,
};
use crate::core::{
    KmerParameterList, PipelineReport, PipelineStage, RunStatus, RunWarning, StageOutcome,
};
use crate::library::{LibraryManifest, MAX_LIBRARIES};
use crate::utils::configuration::{validate, OrganelleKind, PipelineConfiguration};
use crate::utils::format_writers::sequence_length;
use crate::utils::intermediate_output::RunLayout;
use crate::utils::interrupt::InterruptSignal;

/// Organellar genome assembly pipeline
#[derive(Parser)]
#[command(name = "mito-forge")]
#[command(
    about = "Build organellar genomes: k-mer search, mapping, gap closing and circularization"
)]
#[command(version)]
pub struct Cli {
    /// Configuration file path
    #[arg(short, long, value_name = "FILE", global = true)]
    pub config: Option<PathBuf>,

    /// Verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the complete pipeline
    Run(RunArgs),

    /// Generate configuration template
    Config {
        /// Output file
        #[arg(short, long, default_value = "mito-forge.toml")]
        output: PathBuf,

        /// Use chloroplast defaults
        #[arg(long)]
        chloroplast: bool,
    },

    /// Parse a library manifest and print its libraries
    Manifest {
        /// SOAPdenovo-style manifest with [LIB] sections
        path: PathBuf,
    },
}

/// Command line overrides for a run
#[derive(Args, Debug, Clone)]
pub struct RunArgs {
    /// Library manifest
    #[arg(short, long, value_name = "MANIFEST")]
    pub input: PathBuf,

    /// Job name used for every output file
    #[arg(short, long)]
    pub job: Option<String>,

    /// De novo assembler
    #[arg(short = 'a', long, value_enum)]
    pub backend: Option<BackendKind>,

    /// Comma separated k-mers, e.g. "23,31,43"
    #[arg(short, long)]
    pub kmers: Option<String>,

    /// Number of threads (overrides config)
    #[arg(short, long)]
    pub threads: Option<usize>,

    /// Working directory
    #[arg(short = 'o', long)]
    pub work_dir: Option<PathBuf>,

    /// Reference sequence of a related organism (FASTA)
    #[arg(short, long)]
    pub reference: Option<PathBuf>,

    /// Pre-built seed sequence; skips de novo assembly
    #[arg(long)]
    pub seed: Option<PathBuf>,

    #[arg(long)]
    pub min_size: Option<i64>,

    #[arg(long)]
    pub max_size: Option<i64>,

    #[arg(long)]
    pub optimum_size: Option<i64>,

    /// Kind of genome being built
    #[arg(long, value_enum)]
    pub organelle: Option<OrganelleKind>,

    /// Compare candidate builds by length only
    #[arg(long)]
    pub relaxed: bool,

    #[arg(long)]
    pub skip_gap_closing: bool,

    /// Gap-closing iterations
    #[arg(long)]
    pub iterations: Option<u32>,

    /// Read technology for libraries that do not set one
    #[arg(long)]
    pub technology: Option<String>,

    /// Let MIRA discover pairing information during mapping
    #[arg(long)]
    pub autopair: bool,

    /// Keep intermediate stage folders
    #[arg(long)]
    pub keep_folders: bool,
}

impl RunArgs {
    /// Apply command line overrides on top of the loaded configuration
    pub fn apply(&self, config: &mut PipelineConfiguration) {
        if let Some(job) = &self.job {
            config.general.job_name = job.clone();
        }
        if let Some(dir) = &self.work_dir {
            config.general.work_dir = dir.clone();
        }
        if let Some(backend) = self.backend {
            config.assembly.backend = backend;
        }
        if let Some(kmers) = &self.kmers {
            config.assembly.kmers = kmers.clone();
        }
        if let Some(threads) = self.threads {
            config.assembly.threads = threads;
        }
        if let Some(seed) = &self.seed {
            config.assembly.seed_sequence = Some(seed.clone());
        }
        if let Some(reference) = &self.reference {
            config.validation.reference = Some(reference.clone());
        }
        if let Some(min) = self.min_size {
            config.validation.min_size = min;
        }
        if let Some(max) = self.max_size {
            config.validation.max_size = max;
        }
        if let Some(optimum) = self.optimum_size {
            config.validation.optimum_size = optimum;
        }
        if let Some(organelle) = self.organelle {
            config.validation.organelle = organelle;
        }
        if let Some(iterations) = self.iterations {
            config.gap_closing.iterations = iterations;
        }
        if let Some(technology) = &self.technology {
            config.mapping.technology = technology.clone();
        }
        config.validation.relaxed |= self.relaxed;
        config.gap_closing.skip |= self.skip_gap_closing;
        config.mapping.autopair |= self.autopair;
        config.general.keep_folders |= self.keep_folders;
    }
}

/// Wires configuration, manifest and external programs into one run
pub struct MitoPipeline {
    config: PipelineConfiguration,
    manifest: LibraryManifest,
    layout: RunLayout,
    interrupt: InterruptSignal,
}

impl MitoPipeline {
    pub fn new(
        config: PipelineConfiguration,
        manifest_path: &Path,
        interrupt: InterruptSignal,
    ) -> Result<Self> {
        validate(&config)?;
        let manifest = LibraryManifest::from_file(manifest_path)?;
        let layout = RunLayout::new(&config.general.work_dir, &config.general.job_name)?;
        // Backends run with their own working directory, so the root must be absolute
        let root = std::fs::canonicalize(layout.root())
            .with_context(|| format!("Cannot resolve {}", layout.root().display()))?;
        let layout = RunLayout::new(root, &config.general.job_name)?;

        Ok(Self {
            config,
            manifest,
            layout,
            interrupt,
        })
    }

    pub fn config(&self) -> &PipelineConfiguration {
        &self.config
    }

    pub fn layout(&self) -> &RunLayout {
        &self.layout
    }

    fn kmer_list(&self) -> Result<KmerParameterList> {
        let supports_default = matches!(self.config.assembly.backend, BackendKind::Mira);
        KmerParameterList::for_backend(&self.config.assembly.requested_kmers()?, supports_default)
    }

    fn de_novo_source(&self, pre_run: &mut Vec<RunWarning>) -> Result<DeNovoSource> {
        let config = &self.config;

        if let Some(seed) = &config.assembly.seed_sequence {
            return Ok(DeNovoSource::Seed {
                path: seed.clone(),
                kmer: config.assembly.target_kmer()?,
            });
        }

        let reference_length = match &config.validation.reference {
            Some(reference) => Some(sequence_length(reference)?),
            None => None,
        };
        let (size_window, notes) = config.validation.resolve_size_window(reference_length);
        for note in notes {
            info!("📏 {}", note);
            pre_run.push(RunWarning::new(PipelineStage::DeNovo, note));
        }

        let backend_folder = match config.assembly.backend {
            BackendKind::Soap if config.assembly.soap_trans => {
                config.tools.soap_trans_folder.clone()
            }
            BackendKind::Soap => config.tools.soap_denovo_folder.clone(),
            BackendKind::Spades => config.tools.spades_folder.clone(),
            BackendKind::Mira => config.tools.mira_folder.clone(),
        };

        let backend = create_backend(
            config.assembly.backend,
            BackendSettings {
                job_name: config.general.job_name.clone(),
                threads: config.assembly.threads,
                manifest: self.manifest.clone(),
                folder: backend_folder,
                interrupt: self.interrupt.clone(),
            },
            BackendOptions {
                shortest_contig: config.assembly.shortest_contig,
                soap_trans: config.assembly.soap_trans,
                mira_genome_mode: config.assembly.mira_genome_mode,
                technology: config.mapping.technology.clone(),
            },
        );

        let evaluator = CandidateBuildEvaluator::new(
            backend,
            Box::new(CommandValidator::new(
                &config.tools.validator_command,
                self.interrupt.clone(),
            )),
            AcceptanceCriteria::from_config(
                &config.validation,
                &config.circularization,
                size_window,
            ),
            self.manifest.clone(),
            self.layout.clone(),
            self.interrupt.clone(),
        );

        let mode = if config.validation.relaxed {
            ComparisonMode::Relaxed
        } else {
            ComparisonMode::Strict
        };

        Ok(DeNovoSource::Search {
            search: KmerSearchLoop::new(
                evaluator,
                BuildComparator::new(mode),
                self.interrupt.clone(),
            ),
            kmers: self.kmer_list()?,
        })
    }

    /// Assemble the stage sequencer from configuration
    pub fn build_sequencer(&self) -> Result<(PipelineSequencer, Vec<RunWarning>)> {
        let config = &self.config;
        let mut pre_run = Vec::new();

        if self.manifest.dropped_libraries > 0 {
            pre_run.push(RunWarning::new(
                PipelineStage::DeNovo,
                format!(
                    "Manifest has {} libraries beyond the first {}; they were ignored",
                    self.manifest.dropped_libraries, MAX_LIBRARIES
                ),
            ));
        }

        let de_novo = self.de_novo_source(&mut pre_run)?;

        let mapping = MiraMapping::new(
            self.layout.clone(),
            self.manifest.clone(),
            MiraMappingSettings {
                threads: config.assembly.threads,
                technology: config.mapping.technology.clone(),
                copy_kmers: config.assembly.copy_kmers,
                autopair: config.mapping.autopair,
                mira_folder: config.tools.mira_folder.clone(),
            },
            self.interrupt.clone(),
        );

        let checker = CommandCircularizationChecker::new(
            &config.tools.circularization_command,
            self.interrupt.clone(),
        );

        let mut sequencer = PipelineSequencer::new(
            self.layout.clone(),
            de_novo,
            Box::new(mapping),
            Box::new(checker),
            self.interrupt.clone(),
        )
        .with_circularization_window(
            config.circularization.window_size,
            config.circularization.offset,
        );

        if !config.gap_closing.skip {
            let read_length = config
                .gap_closing
                .read_length
                .unwrap_or_else(|| self.manifest.read_length());

            let mitobim = Mitobim::new(
                self.layout.clone(),
                MitobimSettings {
                    iterations: config.gap_closing.iterations,
                    read_length,
                    technology: config.mapping.technology.clone(),
                    mitobim_folder: config.tools.mitobim_folder.clone(),
                    mira_folder: config.tools.mira_folder.clone(),
                },
                self.interrupt.clone(),
            );

            sequencer = sequencer.with_gap_closing(GapClosing {
                stage: Box::new(mitobim),
                locator: Box::new(FsIterationLocator::new(self.layout.clone())),
            });
        }

        Ok((sequencer, pre_run))
    }

    /// Run every stage, then clean up and save the run summary.
    ///
    /// Interrupts propagate as errors and skip cleanup.
    #[instrument(skip(self), fields(job = %self.config.general.job_name))]
    pub async fn run(&self) -> Result<PipelineReport> {
        let (sequencer, pre_run) = self.build_sequencer()?;
        let mut report = sequencer.run().await?;
        report.warnings.splice(0..0, pre_run);

        if !self.config.general.keep_folders {
            let kmers = match &self.config.assembly.seed_sequence {
                Some(_) => Vec::new(),
                None => self.kmer_list()?.as_slice().to_vec(),
            };
            for failure in self.layout.cleanup(&kmers, self.config.gap_closing.iterations) {
                report.warn(PipelineStage::Finalization, failure);
            }
        }

        if let Err(e) = self.layout.save_json("run_summary.json", &report) {
            warn!("⚠️  Could not save run summary: {:#}", e);
            report.warn(
                PipelineStage::Finalization,
                format!("Could not save run summary: {e:#}"),
            );
        }

        Ok(report)
    }
}

fn outcome_label(outcome: &StageOutcome) -> String {
    match outcome {
        StageOutcome::Skipped => "skipped".dimmed().to_string(),
        StageOutcome::Succeeded(payload) => {
            format!("{} (k-mer {})", "ok".bright_green(), payload.kmer)
        }
        StageOutcome::Failed(reason) => format!("{} ({})", "failed".bright_red(), reason),
    }
}

/// Human readable run summary; warnings and the fatal message are kept apart
pub fn render_summary(report: &PipelineReport) -> String {
    let mut lines = vec![
        "═".repeat(50).bright_cyan().to_string(),
        format!("    RUN SUMMARY: {}", report.job_name),
        "═".repeat(50).bright_cyan().to_string(),
        format!("  De novo:          {}", outcome_label(&report.de_novo)),
        format!("  Mapping:          {}", outcome_label(&report.mapping)),
        format!("  Gap closing:      {}", outcome_label(&report.gap_closing)),
    ];

    if let Some(iteration) = report.resolved_iteration {
        lines.push(format!("  Iteration used:   {iteration}"));
    }
    if let Some(verdict) = &report.circularization {
        lines.push(format!(
            "  Circular:         {}",
            if verdict.is_circular { "yes" } else { "no" }
        ));
    }
    if let Some(artifacts) = &report.final_artifacts {
        lines.push(format!(
            "  Final sequence:   {} ({} bp)",
            artifacts.sequence.display(),
            artifacts.stats.length
        ));
    }

    if !report.warnings.is_empty() {
        lines.push(String::new());
        lines.push("⚠️  Warnings:".bright_yellow().to_string());
        for warning in &report.warnings {
            lines.push(format!(
                "  [{}] {}",
                warning.stage.as_str(),
                warning.message.yellow()
            ));
        }
    }

    lines.push(String::new());
    match &report.status {
        RunStatus::Completed => lines.push("✅ Run completed".bright_green().to_string()),
        RunStatus::Failed { stage, reason } => {
            lines.push(
                format!("❌ Fatal error at {} stage:", stage.as_str())
                    .bright_red()
                    .to_string(),
            );
            lines.push(format!("  {}", reason.red()));
        }
    }

    lines.join("\n")
}

/// Short description of a parsed manifest
pub fn describe_manifest(path: &Path) -> Result<String> {
    let manifest = LibraryManifest::from_file(path)
        .with_context(|| format!("Could not load {}", path.display()))?;

    let mut lines = vec![format!(
        "📚 {} librar{} (read length {})",
        manifest.libraries.len(),
        if manifest.libraries.len() == 1 { "y" } else { "ies" },
        manifest.read_length()
    )];

    for library in &manifest.libraries {
        lines.push(format!(
            "  [{}] {} file(s), {}, technology {}",
            library.index,
            library.reads.len(),
            if library.is_paired() { "paired" } else { "single" },
            library.technology.as_deref().unwrap_or("default")
        ));
    }
    if manifest.dropped_libraries > 0 {
        lines.push(
            format!(
                "  {} additional librar{} ignored",
                manifest.dropped_libraries,
                if manifest.dropped_libraries == 1 { "y" } else { "ies" }
            )
            .yellow()
            .to_string(),
        );
    }

    Ok(lines.join("\n"))
}
