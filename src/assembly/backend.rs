//! Assembler backend abstraction
//!
//! Each backend runs one external de novo assembler for one k-mer inside a
//! working directory it is handed. The search loop only sees this trait.

use anyhow::Result;
use async_trait::async_trait;
use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::core::KmerValue;
use crate::library::LibraryManifest;
use crate::utils::interrupt::InterruptSignal;

use super::mira::MiraDenovo;
use super::soap_denovo::SoapDenovo;
use super::spades::Spades;

/// Raw output of one backend run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendOutput {
    /// Assembled sequences (FASTA)
    pub primary: PathBuf,
    /// Program log
    pub log: Option<PathBuf>,
}

#[async_trait]
pub trait AssemblyBackend: Send + Sync {
    /// Program name used in logs and in the validator's process name
    fn name(&self) -> &str;

    /// Whether the program can pick its own k-mer
    fn supports_default_kmer(&self) -> bool;

    /// Run the assembler in `workdir`. The manifest has already been written
    /// there as `manifest.config`.
    async fn run(&self, kmer: &KmerValue, workdir: &Path) -> Result<BackendOutput>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    #[default]
    Soap,
    Spades,
    Mira,
}

impl BackendKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Soap => "soap",
            Self::Spades => "spades",
            Self::Mira => "mira",
        }
    }
}

/// Everything a backend needs besides the k-mer and the directory
#[derive(Debug, Clone)]
pub struct BackendSettings {
    pub job_name: String,
    pub threads: usize,
    pub manifest: LibraryManifest,
    /// Install folder; PATH lookup when `None`
    pub folder: Option<PathBuf>,
    pub interrupt: InterruptSignal,
}

/// Options only some backends read
#[derive(Debug, Clone)]
pub struct BackendOptions {
    pub shortest_contig: u32,
    pub soap_trans: bool,
    pub mira_genome_mode: bool,
    /// Technology for libraries that do not name one
    pub technology: String,
}

pub fn create_backend(
    kind: BackendKind,
    settings: BackendSettings,
    options: BackendOptions,
) -> Box<dyn AssemblyBackend> {
    match kind {
        BackendKind::Soap => Box::new(SoapDenovo::new(
            settings,
            options.shortest_contig,
            options.soap_trans,
        )),
        BackendKind::Spades => Box::new(Spades::new(settings, options.technology)),
        BackendKind::Mira => Box::new(MiraDenovo::new(
            settings,
            options.mira_genome_mode,
            options.technology,
        )),
    }
}

/// Fails when the backend exited cleanly but left no output
pub(crate) fn require_output(backend: &str, path: PathBuf) -> Result<PathBuf> {
    if path.is_file() {
        Ok(path)
    } else {
        Err(anyhow::anyhow!(
            "{backend} finished but did not produce {}",
            path.display()
        ))
    }
}
