use anyhow::{Context, Result};
use async_trait::async_trait;
use std::fmt::Write as _;
use std::fs;
use std::path::Path;
use tracing::{debug, info, instrument};

use super::backend::{require_output, AssemblyBackend, BackendOutput, BackendSettings};
use crate::core::KmerValue;
use crate::library::LibraryManifest;
use crate::utils::external_process::ExternalCommand;

/// MIRA run as a de novo assembler
pub struct MiraDenovo {
    settings: BackendSettings,
    genome_mode: bool,
    technology: String,
}

/// Render a MIRA de novo manifest for one k-mer
pub fn render_denovo_manifest(
    job_name: &str,
    genome_mode: bool,
    kmer: &KmerValue,
    threads: usize,
    manifest: &LibraryManifest,
    default_technology: &str,
) -> String {
    let mut out = String::new();
    let mode = if genome_mode { "genome" } else { "est" };

    let _ = writeln!(out, "project = {job_name}-denovo");
    let _ = writeln!(out, "job = {mode}, denovo, accurate");

    let mut parameters = format!("-NW:cmrnl=no:cac=no:cnfs=warn -GE:not={threads}");
    if let Some(k) = kmer.as_explicit() {
        let _ = write!(parameters, " -SK:bph={k}");
    }
    let _ = writeln!(out, "parameters = {parameters}\n");

    for library in &manifest.libraries {
        let data: Vec<String> = library
            .reads
            .iter()
            .map(|read| read.path.display().to_string())
            .collect();

        let _ = writeln!(out, "readgroup");
        let _ = writeln!(out, "data = {}", data.join(" "));

        if library.is_paired() {
            match (library.orientation, library.avg_insert) {
                (Some(orientation), Some(insert)) => {
                    let _ = writeln!(
                        out,
                        "template_size = {} {} autorefine",
                        insert / 2,
                        insert * 2
                    );
                    let _ = writeln!(out, "segment_placement = {}", orientation.arrows());
                }
                _ => {
                    let _ = writeln!(out, "autopairing");
                }
            }
        }

        let _ = writeln!(out, "technology = {}", library.technology_or(default_technology));
        if let Some(quality) = library.default_quality {
            let _ = writeln!(out, "default_qual = {quality}");
        }
        let _ = writeln!(out, "strain = {}_{}\n", job_name, library.index);
    }

    out
}

impl MiraDenovo {
    pub fn new(settings: BackendSettings, genome_mode: bool, technology: String) -> Self {
        Self {
            settings,
            genome_mode,
            technology,
        }
    }

    fn manifest_name(&self) -> String {
        format!("{}-denovo.manifest", self.settings.job_name)
    }

    fn project(&self) -> String {
        format!("{}-denovo", self.settings.job_name)
    }
}

#[async_trait]
impl AssemblyBackend for MiraDenovo {
    fn name(&self) -> &str {
        "MIRA"
    }

    fn supports_default_kmer(&self) -> bool {
        true
    }

    #[instrument(skip(self, workdir), fields(backend = "mira"))]
    async fn run(&self, kmer: &KmerValue, workdir: &Path) -> Result<BackendOutput> {
        let manifest_path = workdir.join(self.manifest_name());
        let rendered = render_denovo_manifest(
            &self.settings.job_name,
            self.genome_mode,
            kmer,
            self.settings.threads,
            &self.settings.manifest,
            &self.technology,
        );
        fs::write(&manifest_path, rendered)
            .with_context(|| format!("Failed to write {}", manifest_path.display()))?;
        debug!("Wrote MIRA manifest {}", manifest_path.display());

        if kmer.is_default() {
            info!("🧬 Running MIRA with its technology dependent defaults");
        } else {
            info!("🧬 Running MIRA with k = {}", kmer);
        }

        let log = workdir.join(format!("mira_{kmer}mer.log"));
        ExternalCommand::new(
            self.name(),
            ExternalCommand::locate(
                self.settings.folder.as_deref().map(|f| f.join("bin")).as_deref(),
                "mira",
            ),
        )
        .arg(self.manifest_name())
        .current_dir(workdir)
        .log_to(&log)
        .run(&self.settings.interrupt)
        .await?;

        let project = self.project();
        let primary = require_output(
            self.name(),
            workdir
                .join(format!("{project}_assembly"))
                .join(format!("{project}_d_results"))
                .join(format!("{project}_out.unpadded.fasta")),
        )?;

        Ok(BackendOutput {
            primary,
            log: Some(log),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MANIFEST: &str = "\
[LIB]
avg_ins=300
orientation=---> <---
default_qual=30
q1=/reads/a_1.fq
q2=/reads/a_2.fq
[LIB]
technology=iontor
q1=/reads/b_1.fq
q2=/reads/b_2.fq
";

    #[test]
    fn test_default_kmer_manifest() {
        let manifest = LibraryManifest::parse(MANIFEST).unwrap();
        let text =
            render_denovo_manifest("frog", true, &KmerValue::Default, 4, &manifest, "solexa");

        assert!(text.starts_with("project = frog-denovo\njob = genome, denovo, accurate\n"));
        assert!(text.contains("parameters = -NW:cmrnl=no:cac=no:cnfs=warn -GE:not=4\n"));
        assert!(!text.contains("-SK:bph"));
        assert!(text.contains(
            "readgroup\ndata = /reads/a_1.fq /reads/a_2.fq\n\
             template_size = 150 600 autorefine\nsegment_placement = ---> <---\n\
             technology = solexa\ndefault_qual = 30\nstrain = frog_1\n"
        ));
        // No insert size: MIRA works out the pairing itself
        assert!(text.contains("autopairing\ntechnology = iontor\nstrain = frog_2\n"));
    }

    #[test]
    fn test_explicit_kmer_and_est_mode() {
        let manifest = LibraryManifest::parse(MANIFEST).unwrap();
        let text = render_denovo_manifest(
            "frog",
            false,
            &KmerValue::Value(43),
            2,
            &manifest,
            "solexa",
        );

        assert!(text.contains("job = est, denovo, accurate"));
        assert!(text.contains("-GE:not=2 -SK:bph=43\n"));
    }
}
