use anyhow::{Context, Result};
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::core::{KmerValue, StagePayload};

/// Working directory layout for one pipeline run.
///
/// Each stage writes under its own subdirectory of `root`, following the
/// naming conventions the external programs expect:
///
/// ```text
/// root/
///   kmer_<k>/                      de novo candidate per k-mer
///   best_query.fasta               seed handed to mapping
///   mira_mapping/                  mapping stage
///   iteration<i>/                  gap-closing iterations
///   <job>_Final_Results/           finalization output
/// ```
#[derive(Debug, Clone)]
pub struct RunLayout {
    root: PathBuf,
    job_name: String,
}

impl RunLayout {
    pub fn new(root: impl Into<PathBuf>, job_name: impl Into<String>) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root)
            .with_context(|| format!("Failed to create run directory: {}", root.display()))?;

        Ok(Self {
            root,
            job_name: job_name.into(),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn job_name(&self) -> &str {
        &self.job_name
    }

    pub fn kmer_dir(&self, kmer: &KmerValue) -> PathBuf {
        self.root.join(format!("kmer_{kmer}"))
    }

    pub fn seed_path(&self) -> PathBuf {
        self.root.join("best_query.fasta")
    }

    pub fn mapping_dir(&self) -> PathBuf {
        self.root.join("mira_mapping")
    }

    /// Concatenated read pool shared by mapping and gap closing
    pub fn mapping_readpool(&self, technology: &str) -> PathBuf {
        self.mapping_dir()
            .join(format!("{}_in.{}.fastq", self.job_name, technology))
    }

    pub fn mapping_results_dir(&self) -> PathBuf {
        let job = &self.job_name;
        self.mapping_dir()
            .join(format!("{job}_assembly"))
            .join(format!("{job}_d_results"))
    }

    pub fn mapping_payload(&self, kmer: KmerValue) -> StagePayload {
        let job = &self.job_name;
        let results = self.mapping_results_dir();
        StagePayload {
            sequence: results.join(format!("{job}_out_AllStrains.unpadded.fasta")),
            alignment: Some(results.join(format!("{job}_out.maf"))),
            companion: Some(results.join(format!("{job}_out.caf"))),
            kmer,
        }
    }

    pub fn iteration_dir(&self, iteration: u32) -> PathBuf {
        self.root.join(format!("iteration{iteration}"))
    }

    /// Expected artifacts of one gap-closing iteration
    pub fn iteration_payload(&self, iteration: u32, kmer: KmerValue) -> StagePayload {
        let sample = format!("{}_1-backbone", self.job_name);
        let results = self
            .iteration_dir(iteration)
            .join(format!("{sample}_assembly"))
            .join(format!("{sample}_d_results"));

        StagePayload {
            sequence: results.join(format!("{sample}_out_AllStrains.unpadded.fasta")),
            alignment: Some(results.join(format!("{sample}_out.maf"))),
            companion: Some(results.join(format!("{sample}_out.caf"))),
            kmer,
        }
    }

    pub fn final_results_dir(&self) -> PathBuf {
        self.root.join(format!("{}_Final_Results", self.job_name))
    }

    /// Destroy and recreate a stage directory
    pub fn recreate_dir(&self, dir: &Path) -> Result<()> {
        if dir.exists() {
            debug!("Removing stale directory {}", dir.display());
            fs::remove_dir_all(dir)
                .with_context(|| format!("Failed to remove directory: {}", dir.display()))?;
        }
        fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create directory: {}", dir.display()))?;
        Ok(())
    }

    /// Remove per-stage working directories. Returns one message per failure.
    pub fn cleanup(&self, kmers: &[KmerValue], max_iteration: u32) -> Vec<String> {
        let mut targets = vec![self.mapping_dir()];
        targets.extend((1..=max_iteration).map(|i| self.iteration_dir(i)));
        targets.extend(kmers.iter().map(|k| self.kmer_dir(k)));

        let mut failures = Vec::new();
        for dir in targets.iter().filter(|dir| dir.exists()) {
            if let Err(e) = fs::remove_dir_all(dir) {
                warn!("⚠️  Could not remove {}: {}", dir.display(), e);
                failures.push(format!("Could not remove {}: {}", dir.display(), e));
            }
        }

        info!("🧹 Removed temporary stage directories");
        failures
    }

    /// Save a JSON document into the final results directory
    pub fn save_json<T: Serialize>(&self, filename: &str, data: &T) -> Result<PathBuf> {
        let dir = self.final_results_dir();
        fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create directory: {}", dir.display()))?;

        let path = dir.join(filename);
        let json = serde_json::to_string_pretty(data).context("Failed to serialize to JSON")?;
        fs::write(&path, json)
            .with_context(|| format!("Failed to write JSON file: {}", path.display()))?;

        info!("💾 Saved {}", path.display());
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::tempdir;

    #[test]
    fn test_stage_paths() {
        let temp_dir = tempdir().unwrap();
        let layout = RunLayout::new(temp_dir.path(), "sample").unwrap();

        assert!(layout.kmer_dir(&KmerValue::Value(31)).ends_with("kmer_31"));
        assert!(layout.kmer_dir(&KmerValue::Default).ends_with("kmer_default"));
        assert!(layout
            .mapping_readpool("solexa")
            .ends_with("mira_mapping/sample_in.solexa.fastq"));

        let mapping = layout.mapping_payload(KmerValue::Value(31));
        assert!(mapping.sequence.ends_with(
            "mira_mapping/sample_assembly/sample_d_results/sample_out_AllStrains.unpadded.fasta"
        ));
        assert!(mapping.alignment.unwrap().ends_with("sample_out.maf"));

        let iteration = layout.iteration_payload(3, KmerValue::Value(31));
        assert!(iteration.sequence.ends_with(
            "iteration3/sample_1-backbone_assembly/sample_1-backbone_d_results/\
             sample_1-backbone_out_AllStrains.unpadded.fasta"
        ));
        assert!(layout.final_results_dir().ends_with("sample_Final_Results"));
    }

    #[test]
    fn test_recreate_dir_clears_previous_run() {
        let temp_dir = tempdir().unwrap();
        let layout = RunLayout::new(temp_dir.path(), "sample").unwrap();
        let dir = layout.kmer_dir(&KmerValue::Value(23));

        layout.recreate_dir(&dir).unwrap();
        fs::write(dir.join("stale.log"), "old").unwrap();
        layout.recreate_dir(&dir).unwrap();

        assert!(dir.exists());
        assert!(!dir.join("stale.log").exists());
    }

    #[test]
    fn test_cleanup_removes_stage_dirs() {
        let temp_dir = tempdir().unwrap();
        let layout = RunLayout::new(temp_dir.path(), "sample").unwrap();
        let kmers = [KmerValue::Default, KmerValue::Value(23)];

        for kmer in &kmers {
            fs::create_dir_all(layout.kmer_dir(kmer)).unwrap();
        }
        fs::create_dir_all(layout.mapping_dir()).unwrap();
        fs::create_dir_all(layout.iteration_dir(2)).unwrap();
        fs::create_dir_all(layout.final_results_dir()).unwrap();

        let failures = layout.cleanup(&kmers, 5);

        assert!(failures.is_empty());
        assert!(!layout.mapping_dir().exists());
        assert!(!layout.iteration_dir(2).exists());
        assert!(!layout.kmer_dir(&KmerValue::Value(23)).exists());
        assert!(layout.final_results_dir().exists());
    }

    #[test]
    fn test_save_json() {
        let temp_dir = tempdir().unwrap();
        let layout = RunLayout::new(temp_dir.path(), "sample").unwrap();

        let path = layout.save_json("run_summary.json", &json!({"ok": true})).unwrap();
        let text = fs::read_to_string(path).unwrap();
        assert!(text.contains("\"ok\": true"));
    }
}
