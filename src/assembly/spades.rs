use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, instrument};

use super::backend::{require_output, AssemblyBackend, BackendOutput, BackendSettings};
use crate::core::KmerValue;
use crate::library::{Library, LibraryManifest, ReadOrientation};
use crate::utils::external_process::ExternalCommand;

/// One dataset entry. JSON is valid YAML, so serde_json writes the file.
#[derive(Debug, Serialize, PartialEq)]
struct DatasetEntry {
    #[serde(skip_serializing_if = "Option::is_none")]
    orientation: Option<&'static str>,
    #[serde(rename = "type")]
    kind: &'static str,
    #[serde(rename = "left reads", skip_serializing_if = "Vec::is_empty")]
    left_reads: Vec<PathBuf>,
    #[serde(rename = "right reads", skip_serializing_if = "Vec::is_empty")]
    right_reads: Vec<PathBuf>,
    #[serde(rename = "single reads", skip_serializing_if = "Vec::is_empty")]
    single_reads: Vec<PathBuf>,
}

impl DatasetEntry {
    fn from_library(library: &Library, default_technology: &str) -> Self {
        if library.is_paired() {
            let (left, right): (Vec<_>, Vec<_>) =
                library.reads.iter().partition(|read| read.key == "q1");
            Self {
                orientation: Some(
                    library
                        .orientation
                        .unwrap_or(ReadOrientation::Inward)
                        .spades_code(),
                ),
                kind: "paired-end",
                left_reads: left.into_iter().map(|r| r.path.clone()).collect(),
                right_reads: right.into_iter().map(|r| r.path.clone()).collect(),
                single_reads: Vec::new(),
            }
        } else {
            let kind = if library.technology_or(default_technology) == "pacbio" {
                "pacbio"
            } else {
                "single"
            };
            Self {
                orientation: None,
                kind,
                left_reads: Vec::new(),
                right_reads: Vec::new(),
                single_reads: library.reads.iter().map(|r| r.path.clone()).collect(),
            }
        }
    }
}

/// Render the `--dataset` file for a manifest
pub fn render_dataset(manifest: &LibraryManifest, default_technology: &str) -> Result<String> {
    let entries: Vec<DatasetEntry> = manifest
        .libraries
        .iter()
        .map(|library| DatasetEntry::from_library(library, default_technology))
        .collect();

    serde_json::to_string_pretty(&entries).context("Failed to render SPAdes dataset")
}

/// SPAdes in assembler-only mode
pub struct Spades {
    settings: BackendSettings,
    technology: String,
}

impl Spades {
    pub fn new(settings: BackendSettings, technology: String) -> Self {
        Self {
            settings,
            technology,
        }
    }

    fn dataset_name(&self) -> String {
        format!("{}-denovo.yaml", self.settings.job_name)
    }

    fn command(&self, k: u32, workdir: &Path) -> ExternalCommand {
        let program = match &self.settings.folder {
            Some(folder) => folder.join("bin").join("spades.py"),
            None => PathBuf::from("spades.py"),
        };

        ExternalCommand::new(self.name(), program)
            .args(["-k", &k.to_string()])
            .args(["--only-assembler", "--careful"])
            .arg("--dataset")
            .arg(self.dataset_name())
            .args(["-o", &self.settings.job_name])
            .args(["-t", &self.settings.threads.to_string()])
            .current_dir(workdir)
            .log_to(workdir.join(format!("spades_{k}mer.log")))
    }
}

#[async_trait]
impl AssemblyBackend for Spades {
    fn name(&self) -> &str {
        "SPAdes"
    }

    fn supports_default_kmer(&self) -> bool {
        false
    }

    #[instrument(skip(self, workdir), fields(backend = "spades"))]
    async fn run(&self, kmer: &KmerValue, workdir: &Path) -> Result<BackendOutput> {
        let k = kmer
            .as_explicit()
            .ok_or_else(|| anyhow::anyhow!("SPAdes needs an explicit k-mer value"))?;

        let dataset = workdir.join(self.dataset_name());
        fs::write(&dataset, render_dataset(&self.settings.manifest, &self.technology)?)
            .with_context(|| format!("Failed to write {}", dataset.display()))?;
        debug!("Wrote SPAdes dataset {}", dataset.display());

        info!("🧬 Running SPAdes with k = {}", k);
        self.command(k, workdir).run(&self.settings.interrupt).await?;

        let primary = require_output(
            self.name(),
            workdir
                .join(&self.settings.job_name)
                .join("scaffolds.fasta"),
        )?;

        Ok(BackendOutput {
            primary,
            log: Some(workdir.join(format!("spades_{k}mer.log"))),
        })
    }
}
