//! Mapping of the reads against the de novo seed (MIRA 4)

use anyhow::{Context, Result};
use async_trait::async_trait;
use std::fmt::Write as _;
use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::{info, instrument};

use crate::core::{KmerValue, PipelineError, StagePayload};
use crate::library::LibraryManifest;
use crate::utils::external_process::ExternalCommand;
use crate::utils::intermediate_output::RunLayout;
use crate::utils::interrupt::InterruptSignal;

const MAPPING_MANIFEST: &str = "mapping.manifest";

#[async_trait]
pub trait MappingStage: Send + Sync {
    /// Map the reads onto `seed`. A missing result sequence is an error.
    async fn map(&self, seed: &Path, kmer: KmerValue) -> Result<StagePayload>;
}

#[derive(Debug, Clone)]
pub struct MiraMappingSettings {
    pub threads: usize,
    /// Technology for libraries that do not name one
    pub technology: String,
    /// Reuse the de novo k-mer for mapping
    pub copy_kmers: bool,
    /// Let MIRA discover pairing information
    pub autopair: bool,
    pub mira_folder: Option<PathBuf>,
}

pub struct MiraMapping {
    layout: RunLayout,
    manifest: LibraryManifest,
    settings: MiraMappingSettings,
    interrupt: InterruptSignal,
}

impl MiraMapping {
    pub fn new(
        layout: RunLayout,
        manifest: LibraryManifest,
        settings: MiraMappingSettings,
        interrupt: InterruptSignal,
    ) -> Self {
        Self {
            layout,
            manifest,
            settings,
            interrupt,
        }
    }

    fn backbone_name(&self) -> String {
        format!("{}_backbone_in.fna", self.layout.job_name())
    }

    /// Render `mapping.manifest`
    pub fn render_manifest(&self, kmer: KmerValue) -> String {
        let job = self.layout.job_name();
        let mut out = String::new();

        let _ = writeln!(out, "project = {job}");
        let _ = writeln!(out, "job = genome, mapping, accurate");

        let mut parameters = format!(
            "-NW:cmrnl=warn:cac=warn:cnfs=warn -GE:not={} -SB:tor=no",
            self.settings.threads
        );
        if let (true, Some(k)) = (self.settings.copy_kmers, kmer.as_explicit()) {
            let _ = write!(parameters, " -SK:bph={k}");
        }
        let _ = writeln!(out, "parameters = {parameters}\n");

        let _ = writeln!(out, "readgroup\nis_reference");
        let _ = writeln!(out, "data = {}", self.backbone_name());
        let _ = writeln!(out, "default_qual = 20");
        let _ = writeln!(out, "technology = text\nstrain = backbone\n");

        for library in &self.manifest.libraries {
            let data: Vec<String> = library
                .reads
                .iter()
                .map(|read| read.path.display().to_string())
                .collect();

            let _ = writeln!(out, "readgroup");
            let _ = writeln!(out, "data = {}", data.join(" "));
            let _ = writeln!(
                out,
                "technology = {}",
                library.technology_or(&self.settings.technology)
            );
            if let Some(quality) = library.default_quality {
                let _ = writeln!(out, "default_qual = {quality}");
            }
            let _ = writeln!(out, "strain = {}_{}", job, library.index);

            if library.is_paired() {
                if self.settings.autopair {
                    let _ = writeln!(out, "autopairing");
                } else {
                    let _ = writeln!(
                        out,
                        "template_size = unknown infoonly\nsegment_placement = unknown infoonly"
                    );
                }
            }
            out.push('\n');
        }

        out
    }

    /// Concatenate every read file into the pool gap closing reads from
    fn write_readpool(&self) -> Result<PathBuf> {
        let pool = self.layout.mapping_readpool(&self.settings.technology);
        let file = File::create(&pool)
            .with_context(|| format!("Failed to create read pool: {}", pool.display()))?;
        let mut writer = BufWriter::new(file);

        for path in self.manifest.read_files() {
            let mut reader = File::open(path)
                .with_context(|| format!("Failed to open reads: {}", path.display()))?;
            io::copy(&mut reader, &mut writer)
                .with_context(|| format!("Failed to copy reads: {}", path.display()))?;
        }

        writer.flush()?;
        Ok(pool)
    }
}

#[async_trait]
impl MappingStage for MiraMapping {
    #[instrument(skip(self, seed))]
    async fn map(&self, seed: &Path, kmer: KmerValue) -> Result<StagePayload> {
        info!("🗺️  Creating folder for MIRA mapping on the best de novo sequence...");
        let workdir = self.layout.mapping_dir();
        self.layout.recreate_dir(&workdir)?;

        let pool = self.write_readpool()?;
        info!("   Read pool written to {}", pool.display());

        fs::copy(seed, workdir.join(self.backbone_name()))
            .with_context(|| format!("Failed to copy seed {}", seed.display()))?;
        fs::write(workdir.join(MAPPING_MANIFEST), self.render_manifest(kmer))
            .context("Failed to write mapping manifest")?;

        let program = ExternalCommand::locate(
            self.settings
                .mira_folder
                .as_ref()
                .map(|folder| folder.join("bin"))
                .as_deref(),
            "mira",
        );

        ExternalCommand::new("MIRA mapping", program)
            .arg(MAPPING_MANIFEST)
            .current_dir(&workdir)
            .log_to(workdir.join("mira.log"))
            .run(&self.interrupt)
            .await?;

        let payload = self.layout.mapping_payload(kmer);
        if !payload.sequence.is_file() {
            return Err(PipelineError::MappingFailed {
                message: format!("{} was not produced", payload.sequence.display()),
            }
            .into());
        }

        info!("✅ Mapping finished: {}", payload.sequence.display());
        Ok(payload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn mapping(root: &Path, copy_kmers: bool, autopair: bool) -> MiraMapping {
        let manifest = LibraryManifest::parse(
            "[LIB]\ndefault_qual=30\nq1=/reads/a_1.fq\nq2=/reads/a_2.fq\n\
             [LIB]\ntechnology=iontor\nq=/reads/b.fq\n",
        )
        .unwrap();

        MiraMapping::new(
            RunLayout::new(root, "frog").unwrap(),
            manifest,
            MiraMappingSettings {
                threads: 4,
                technology: "solexa".to_string(),
                copy_kmers,
                autopair,
                mira_folder: None,
            },
            InterruptSignal::never(),
        )
    }

    #[test]
    fn test_mapping_manifest() {
        let dir = tempdir().unwrap();
        let text = mapping(dir.path(), true, false).render_manifest(KmerValue::Value(31));

        assert!(text.starts_with("project = frog\njob = genome, mapping, accurate\n"));
        assert!(text.contains(
            "parameters = -NW:cmrnl=warn:cac=warn:cnfs=warn -GE:not=4 -SB:tor=no -SK:bph=31\n"
        ));
        assert!(text.contains(
            "readgroup\nis_reference\ndata = frog_backbone_in.fna\ndefault_qual = 20\n\
             technology = text\nstrain = backbone\n"
        ));
        assert!(text.contains(
            "data = /reads/a_1.fq /reads/a_2.fq\ntechnology = solexa\ndefault_qual = 30\n\
             strain = frog_1\ntemplate_size = unknown infoonly\n"
        ));
        assert!(text.contains("data = /reads/b.fq\ntechnology = iontor\nstrain = frog_2\n\n"));
    }

    #[test]
    fn test_default_kmer_and_autopair() {
        let dir = tempdir().unwrap();
        let text = mapping(dir.path(), true, true).render_manifest(KmerValue::Default);
        assert!(!text.contains("-SK:bph"));
        assert!(text.contains("strain = frog_1\nautopairing\n"));

        let text = mapping(dir.path(), false, false).render_manifest(KmerValue::Value(31));
        assert!(!text.contains("-SK:bph"));
    }

    #[test]
    fn test_readpool_concatenates_reads() {
        let dir = tempdir().unwrap();
        let a = dir.path().join("a.fq");
        let b = dir.path().join("b.fq");
        fs::write(&a, "@r1\nACGT\n+\nIIII\n").unwrap();
        fs::write(&b, "@r2\nTTTT\n+\nIIII\n").unwrap();

        let manifest =
            LibraryManifest::parse(&format!("[LIB]\nq1={}\nq2={}\n", a.display(), b.display()))
                .unwrap();
        let layout = RunLayout::new(dir.path(), "frog").unwrap();
        fs::create_dir_all(layout.mapping_dir()).unwrap();

        let stage = MiraMapping::new(
            layout,
            manifest,
            MiraMappingSettings {
                threads: 1,
                technology: "solexa".to_string(),
                copy_kmers: false,
                autopair: false,
                mira_folder: None,
            },
            InterruptSignal::never(),
        );

        let pool = stage.write_readpool().unwrap();
        assert_eq!(
            fs::read_to_string(pool).unwrap(),
            "@r1\nACGT\n+\nIIII\n@r2\nTTTT\n+\nIIII\n"
        );
    }
}
