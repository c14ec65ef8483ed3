use anyhow::Result;
use async_trait::async_trait;
use std::path::Path;
use tracing::{info, instrument};

use super::backend::{require_output, AssemblyBackend, BackendOutput, BackendSettings};
use super::evaluator::MANIFEST_FILE_NAME;
use crate::core::KmerValue;
use crate::utils::external_process::ExternalCommand;

/// Largest k the 63mer build accepts
const SMALL_KMER_LIMIT: u32 = 63;

/// SOAPdenovo2 (or SOAPdenovo-Trans) de novo assembler
pub struct SoapDenovo {
    settings: BackendSettings,
    shortest_contig: u32,
    trans_mode: bool,
}

impl SoapDenovo {
    pub fn new(settings: BackendSettings, shortest_contig: u32, trans_mode: bool) -> Self {
        Self {
            settings,
            shortest_contig,
            trans_mode,
        }
    }

    /// Executable for a given k: the 63mer build up to 63, the 127mer build above
    pub fn program_name(&self, k: u32) -> String {
        let version = if k <= SMALL_KMER_LIMIT { "63" } else { "127" };
        if self.trans_mode {
            format!("SOAPdenovo-Trans-{version}mer")
        } else {
            format!("SOAPdenovo-{version}mer")
        }
    }

    fn command(&self, k: u32, workdir: &Path) -> ExternalCommand {
        let program =
            ExternalCommand::locate(self.settings.folder.as_deref(), &self.program_name(k));

        ExternalCommand::new(self.name(), program)
            .arg("all")
            .args(["-s", MANIFEST_FILE_NAME])
            .args(["-K", &k.to_string()])
            .args(["-o", &self.settings.job_name])
            .args(["-p", &self.settings.threads.to_string()])
            .args(["-L", &self.shortest_contig.to_string()])
            .current_dir(workdir)
            .log_to(workdir.join(format!("soap_{k}mer.log")))
    }
}

#[async_trait]
impl AssemblyBackend for SoapDenovo {
    fn name(&self) -> &str {
        if self.trans_mode {
            "SOAPdenovo-Trans"
        } else {
            "SOAPdenovo"
        }
    }

    fn supports_default_kmer(&self) -> bool {
        false
    }

    #[instrument(skip(self, workdir), fields(backend = "soap"))]
    async fn run(&self, kmer: &KmerValue, workdir: &Path) -> Result<BackendOutput> {
        let k = kmer.as_explicit().ok_or_else(|| {
            anyhow::anyhow!("{} needs an explicit k-mer value", self.name())
        })?;

        info!("🧬 Running {} with {}", self.name(), self.program_name(k));
        let command = self.command(k, workdir);
        command.run(&self.settings.interrupt).await?;

        let primary = require_output(
            self.name(),
            workdir.join(format!("{}.scafSeq", self.settings.job_name)),
        )?;

        Ok(BackendOutput {
            primary,
            log: Some(workdir.join(format!("soap_{k}mer.log"))),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::library::LibraryManifest;
    use crate::utils::interrupt::InterruptSignal;
    use std::path::PathBuf;

    fn settings() -> BackendSettings {
        BackendSettings {
            job_name: "sample".to_string(),
            threads: 4,
            manifest: LibraryManifest::default(),
            folder: Some(PathBuf::from("/opt/soap")),
            interrupt: InterruptSignal::never(),
        }
    }

    #[test]
    fn test_program_selection() {
        let soap = SoapDenovo::new(settings(), 100, false);
        assert_eq!(soap.program_name(31), "SOAPdenovo-63mer");
        assert_eq!(soap.program_name(63), "SOAPdenovo-63mer");
        assert_eq!(soap.program_name(71), "SOAPdenovo-127mer");

        let trans = SoapDenovo::new(settings(), 100, true);
        assert_eq!(trans.program_name(23), "SOAPdenovo-Trans-63mer");
        assert!(!trans.supports_default_kmer());
    }

    #[test]
    fn test_command_line() {
        let soap = SoapDenovo::new(settings(), 100, false);
        let command = soap.command(31, Path::new("kmer_31"));
        assert_eq!(
            command.command_line(),
            "/opt/soap/SOAPdenovo-63mer all -s manifest.config -K 31 -o sample -p 4 -L 100"
        );
    }

    #[tokio::test]
    async fn test_default_kmer_is_rejected() {
        let soap = SoapDenovo::new(settings(), 100, false);
        let dir = tempfile::tempdir().unwrap();
        assert!(soap.run(&KmerValue::Default, dir.path()).await.is_err());
    }
}
