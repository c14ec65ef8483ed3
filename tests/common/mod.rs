//! Scripted stand-ins for the external programs

#![allow(dead_code)]

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use mito_forge::assembly::{
    AcceptanceCriteria, AssemblyBackend, BackendOutput, BuildComparator, BuildValidator,
    CandidateBuildEvaluator, ComparisonMode, KmerSearchLoop, ValidationRequest, ValidatorVerdict,
};
use mito_forge::core::{BuildResult, CircularizationVerdict, KmerValue, PipelineError, StagePayload};
use mito_forge::library::LibraryManifest;
use mito_forge::pipeline::{CircularizationChecker, GapClosingStage, MappingStage};
use mito_forge::utils::configuration::{CircularizationConfig, ValidationConfig};
use mito_forge::utils::interrupt::{InterruptSignal, InterruptTrigger};
use mito_forge::utils::RunLayout;
use mito_forge::SizeWindow;

pub const MANIFEST: &str = "max_rd_len=150\n[LIB]\navg_ins=300\nq1=reads_1.fq\nq2=reads_2.fq\n";

pub fn build(length: usize, present: u32, complete: u32) -> BuildResult {
    BuildResult {
        sequence: "A".repeat(length),
        valid_contigs: 1,
        present_features: present,
        important_features: 6,
        split_genes: 0,
        complete_genes: complete,
        trna_count: 0,
        is_circular: false,
    }
}

/// Records every k-mer it is asked to assemble
pub struct ScriptedBackend {
    pub calls: Arc<Mutex<Vec<KmerValue>>>,
    pub fail_on: Vec<KmerValue>,
    /// Raised right before running this k-mer
    pub interrupt_on: Option<(KmerValue, Arc<InterruptTrigger>)>,
}

impl ScriptedBackend {
    pub fn new() -> Self {
        Self {
            calls: Arc::new(Mutex::new(Vec::new())),
            fail_on: Vec::new(),
            interrupt_on: None,
        }
    }
}

#[async_trait]
impl AssemblyBackend for ScriptedBackend {
    fn name(&self) -> &str {
        "ScriptedAssembler"
    }

    fn supports_default_kmer(&self) -> bool {
        false
    }

    async fn run(&self, kmer: &KmerValue, workdir: &Path) -> Result<BackendOutput> {
        self.calls.lock().unwrap().push(*kmer);

        if let Some((target, trigger)) = &self.interrupt_on {
            if target == kmer {
                trigger.raise();
                return Err(PipelineError::Interrupted.into());
            }
        }
        if self.fail_on.contains(kmer) {
            return Err(anyhow!("assembler exited with status 1"));
        }

        let primary = workdir.join("contigs.fasta");
        fs::write(&primary, ">contig_1\nACGT\n")?;
        Ok(BackendOutput { primary, log: None })
    }
}

/// Returns a fixed verdict per k-mer; unknown k-mers are rejected
pub struct ScriptedValidator {
    pub verdicts: HashMap<KmerValue, ValidatorVerdict>,
}

#[async_trait]
impl BuildValidator for ScriptedValidator {
    async fn check(&self, request: &ValidationRequest<'_>) -> Result<ValidatorVerdict> {
        let kmer = request
            .workdir
            .file_name()
            .and_then(|name| name.to_str())
            .and_then(|name| name.strip_prefix("kmer_"))
            .ok_or_else(|| anyhow!("unexpected workdir {}", request.workdir.display()))?
            .parse::<KmerValue>()?;

        Ok(self
            .verdicts
            .get(&kmer)
            .cloned()
            .unwrap_or(ValidatorVerdict::Rejected))
    }
}

pub fn search_loop(
    layout: &RunLayout,
    backend: ScriptedBackend,
    verdicts: HashMap<KmerValue, ValidatorVerdict>,
    mode: ComparisonMode,
    interrupt: InterruptSignal,
) -> KmerSearchLoop {
    let criteria = AcceptanceCriteria::from_config(
        &ValidationConfig::default(),
        &CircularizationConfig::default(),
        SizeWindow {
            min: 250,
            max: 19000,
            optimum: 16150,
        },
    );

    let evaluator = CandidateBuildEvaluator::new(
        Box::new(backend),
        Box::new(ScriptedValidator { verdicts }),
        criteria,
        LibraryManifest::parse(MANIFEST).unwrap(),
        layout.clone(),
        interrupt.clone(),
    );

    KmerSearchLoop::new(evaluator, BuildComparator::new(mode), interrupt)
}

/// Writes the mapping artifacts with a fixed sequence
pub struct FakeMapping {
    pub layout: RunLayout,
    pub sequence: String,
    pub fail: bool,
    pub calls: Arc<AtomicUsize>,
}

#[async_trait]
impl MappingStage for FakeMapping {
    async fn map(&self, seed: &Path, kmer: KmerValue) -> Result<StagePayload> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !seed.is_file() {
            return Err(anyhow!("seed {} missing", seed.display()));
        }
        if self.fail {
            return Err(PipelineError::MappingFailed {
                message: "mira exited with status 1".to_string(),
            }
            .into());
        }

        let payload = self.layout.mapping_payload(kmer);
        write_payload(&payload, &self.sequence, "mapping")?;
        Ok(payload)
    }
}

/// Leaves artifacts behind for the listed iterations only
pub struct FakeGapClosing {
    pub layout: RunLayout,
    pub iterations: u32,
    pub completed: Vec<u32>,
    pub sequence: String,
}

#[async_trait]
impl GapClosingStage for FakeGapClosing {
    fn max_iterations(&self) -> u32 {
        self.iterations
    }

    async fn close_gaps(&self, mapping: &StagePayload) -> Result<()> {
        for &iteration in &self.completed {
            let payload = self.layout.iteration_payload(iteration, mapping.kmer);
            write_payload(&payload, &self.sequence, &format!("iteration {iteration}"))?;
        }
        Ok(())
    }

    fn iteration_payload(&self, iteration: u32, kmer: KmerValue) -> StagePayload {
        self.layout.iteration_payload(iteration, kmer)
    }
}

pub struct FixedChecker {
    pub verdict: CircularizationVerdict,
    pub checked: Arc<Mutex<Option<PathBuf>>>,
}

impl FixedChecker {
    pub fn new(verdict: CircularizationVerdict) -> Self {
        Self {
            verdict,
            checked: Arc::new(Mutex::new(None)),
        }
    }
}

#[async_trait]
impl CircularizationChecker for FixedChecker {
    async fn check(
        &self,
        sequence: &Path,
        _window_size: usize,
        _offset: usize,
    ) -> Result<CircularizationVerdict> {
        *self.checked.lock().unwrap() = Some(sequence.to_path_buf());
        Ok(self.verdict)
    }
}

fn write_payload(payload: &StagePayload, sequence: &str, label: &str) -> Result<()> {
    if let Some(parent) = payload.sequence.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(&payload.sequence, format!(">{label}\n{sequence}\n"))?;
    if let Some(maf) = &payload.alignment {
        fs::write(maf, format!("maf of {label}"))?;
    }
    Ok(())
}
