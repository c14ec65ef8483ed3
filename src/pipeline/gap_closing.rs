//! Iterative gap closing (MITObim)

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use std::fs;
use std::path::PathBuf;
use tracing::{debug, info, instrument};

use crate::core::{KmerValue, StagePayload};
use crate::utils::external_process::ExternalCommand;
use crate::utils::intermediate_output::RunLayout;
use crate::utils::interrupt::InterruptSignal;

#[async_trait]
pub trait GapClosingStage: Send + Sync {
    /// Iterations the stage attempts; fallback discovery scans this many
    fn max_iterations(&self) -> u32;

    /// Run every iteration against the mapping result. Success does not
    /// guarantee that the last iteration left an artifact.
    async fn close_gaps(&self, mapping: &StagePayload) -> Result<()>;

    /// Expected artifacts of one iteration
    fn iteration_payload(&self, iteration: u32, kmer: KmerValue) -> StagePayload;
}

#[derive(Debug, Clone)]
pub struct MitobimSettings {
    pub iterations: u32,
    pub read_length: u32,
    /// Technology the mapping read pool was named after
    pub technology: String,
    pub mitobim_folder: Option<PathBuf>,
    pub mira_folder: Option<PathBuf>,
}

pub struct Mitobim {
    layout: RunLayout,
    settings: MitobimSettings,
    interrupt: InterruptSignal,
}

impl Mitobim {
    pub fn new(layout: RunLayout, settings: MitobimSettings, interrupt: InterruptSignal) -> Self {
        Self {
            layout,
            settings,
            interrupt,
        }
    }

    fn command(&self, mapping: &StagePayload) -> Result<ExternalCommand> {
        let readpool = self
            .layout
            .mapping_readpool(&self.settings.technology);
        let readpool = fs::canonicalize(&readpool)
            .with_context(|| format!("Read pool for MITObim missing: {}", readpool.display()))?;

        let maf = mapping
            .alignment
            .as_ref()
            .ok_or_else(|| anyhow!("Mapping produced no MAF file for MITObim"))?;
        let maf = fs::canonicalize(maf)
            .with_context(|| format!("MAF for MITObim missing: {}", maf.display()))?;

        let script = ExternalCommand::locate(self.settings.mitobim_folder.as_deref(), "MITObim.pl");

        let mut command = ExternalCommand::new("MITObim", "perl")
            .arg(script)
            .args(["-start", "1"])
            .args(["-end", &self.settings.iterations.to_string()])
            .args(["-sample", &format!("{}_1", self.layout.job_name())])
            .args(["-ref", "backbone"])
            .arg("-readpool")
            .arg(readpool);

        if let Some(k) = mapping.kmer.as_explicit() {
            command = command.args(["-kmer", &k.to_string()]);
        }

        command = command
            .arg("-maf")
            .arg(maf)
            .arg("--clean")
            .args(["--readlength", &self.settings.read_length.to_string()]);

        if let Some(mira) = &self.settings.mira_folder {
            let mut mira_bin = mira.join("bin").into_os_string();
            mira_bin.push("/");
            command = command.arg("--mirapath").arg(mira_bin);
        }

        Ok(command
            .current_dir(self.layout.root())
            .log_to(self.layout.root().join("mitobim.log")))
    }
}

#[async_trait]
impl GapClosingStage for Mitobim {
    fn max_iterations(&self) -> u32 {
        self.settings.iterations
    }

    #[instrument(skip_all, fields(iterations = self.settings.iterations))]
    async fn close_gaps(&self, mapping: &StagePayload) -> Result<()> {
        info!("🧹 Deleting iteration folders left by previous MITObim runs...");
        for iteration in 1..=self.settings.iterations {
            let dir = self.layout.iteration_dir(iteration);
            if dir.exists() {
                debug!("Removing {}", dir.display());
                fs::remove_dir_all(&dir)
                    .with_context(|| format!("Failed to remove {}", dir.display()))?;
            }
        }

        info!("🔁 Running MITObim for up to {} iterations...", self.settings.iterations);
        self.command(mapping)?.run(&self.interrupt).await
    }

    fn iteration_payload(&self, iteration: u32, kmer: KmerValue) -> StagePayload {
        self.layout.iteration_payload(iteration, kmer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn settings() -> MitobimSettings {
        MitobimSettings {
            iterations: 5,
            read_length: 150,
            technology: "solexa".to_string(),
            mitobim_folder: Some(PathBuf::from("/opt/mitobim")),
            mira_folder: Some(PathBuf::from("/opt/mira")),
        }
    }

    fn prepared_layout(root: &std::path::Path) -> (RunLayout, StagePayload) {
        let layout = RunLayout::new(root, "frog").unwrap();
        fs::create_dir_all(layout.mapping_results_dir()).unwrap();
        fs::write(layout.mapping_readpool("solexa"), "@r\nA\n+\nI\n").unwrap();

        let payload = layout.mapping_payload(KmerValue::Value(31));
        fs::write(payload.alignment.as_ref().unwrap(), "maf").unwrap();
        (layout, payload)
    }

    #[test]
    fn test_command_line() {
        let dir = tempdir().unwrap();
        let (layout, payload) = prepared_layout(dir.path());
        let mitobim = Mitobim::new(layout, settings(), InterruptSignal::never());

        let line = mitobim.command(&payload).unwrap().command_line();
        assert!(line.starts_with(
            "perl /opt/mitobim/MITObim.pl -start 1 -end 5 -sample frog_1 -ref backbone -readpool /"
        ));
        assert!(line.contains("frog_in.solexa.fastq -kmer 31 -maf /"));
        assert!(line.ends_with("frog_out.maf --clean --readlength 150 --mirapath /opt/mira/bin/"));
    }

    #[test]
    fn test_default_kmer_omits_flag() {
        let dir = tempdir().unwrap();
        let (layout, mut payload) = prepared_layout(dir.path());
        payload.kmer = KmerValue::Default;
        let mitobim = Mitobim::new(layout, settings(), InterruptSignal::never());

        let line = mitobim.command(&payload).unwrap().command_line();
        assert!(!line.contains("-kmer"));
    }

    #[test]
    fn test_missing_readpool_is_error() {
        let dir = tempdir().unwrap();
        let layout = RunLayout::new(dir.path(), "frog").unwrap();
        let payload = layout.mapping_payload(KmerValue::Value(31));
        let mitobim = Mitobim::new(layout, settings(), InterruptSignal::never());

        assert!(mitobim.command(&payload).is_err());
    }
}
