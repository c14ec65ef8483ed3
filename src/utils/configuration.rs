use anyhow::Result;
use clap::ValueEnum;
use config::{Config, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;

use crate::assembly::backend::BackendKind;
use crate::core::{KmerParameterList, KmerValue, PipelineError, SizeWindow};

const ENV_PREFIX: &str = "MITO";

/// Complete configuration for an organellar genome build
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct PipelineConfiguration {
    /// Job name and working directory
    pub general: GeneralConfig,
    /// De novo assembly (k-mer search) settings
    pub assembly: AssemblyConfig,
    /// Acceptance criteria handed to the build validator
    pub validation: ValidationConfig,
    /// Mapping stage settings
    pub mapping: MappingConfig,
    /// Iterative gap closing settings
    pub gap_closing: GapClosingConfig,
    pub circularization: CircularizationConfig,
    /// Install folders of external programs
    pub tools: ToolsConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Name used for every output file of the run
    pub job_name: String,
    /// Directory all stage folders are created in
    pub work_dir: PathBuf,
    /// Keep kmer_*/, mira_mapping/ and iteration*/ after the run
    pub keep_folders: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AssemblyConfig {
    pub backend: BackendKind,
    /// Comma separated k-mer list, `default` lets the backend pick
    pub kmers: String,
    pub threads: usize,
    /// Shortest contig used in scaffolding (SOAPdenovo `-L`)
    pub shortest_contig: u32,
    /// Run SOAPdenovo in transcriptome mode
    pub soap_trans: bool,
    /// MIRA genome mode; est mode when false
    pub mira_genome_mode: bool,
    /// Pass the de novo k-mer on to mapping
    pub copy_kmers: bool,
    /// Pre-built seed sequence; skips de novo when set
    pub seed_sequence: Option<PathBuf>,
}

/// What kind of genome is being built
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum OrganelleKind {
    #[default]
    Mitochondrion,
    Chloroplast,
    Bacteria,
    Archaea,
}

impl OrganelleKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Mitochondrion => "mitochondrion",
            Self::Chloroplast => "chloroplast",
            Self::Bacteria => "bacteria",
            Self::Archaea => "archaea",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidationConfig {
    /// Size bounds; values <= 0 are determined automatically
    pub min_size: i64,
    pub max_size: i64,
    pub optimum_size: i64,
    /// Reference sequence of a related organism (FASTA)
    pub reference: Option<PathBuf>,
    pub blast_evalue: f64,
    /// Fraction of the best hit span that must be covered
    pub blast_hit_percentage: f64,
    /// Identity needed to consider a gene present
    pub cutoff_equality: f64,
    /// tRNAscan-SE cove cutoff
    pub cove_cutoff: u32,
    /// NCBI genetic code table
    pub organism_type: u32,
    pub organelle: OrganelleKind,
    /// Compare candidates by length only
    pub relaxed: bool,
    pub skip_trna_scan: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MappingConfig {
    /// Read technology given to MIRA (solexa, iontor, pacbio, ...)
    pub technology: String,
    /// Let MIRA discover pairing information
    pub autopair: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GapClosingConfig {
    pub skip: bool,
    pub iterations: u32,
    /// Overrides the manifest's max_rd_len
    pub read_length: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CircularizationConfig {
    /// Size of the end window searched for at the start
    pub window_size: usize,
    /// Distance from both ends considered
    pub offset: usize,
}

/// Install folders; `None` means the program is on PATH
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolsConfig {
    pub soap_denovo_folder: Option<PathBuf>,
    pub soap_trans_folder: Option<PathBuf>,
    pub spades_folder: Option<PathBuf>,
    pub mira_folder: Option<PathBuf>,
    pub mitobim_folder: Option<PathBuf>,
    /// Program that scores a candidate build and prints a JSON verdict
    pub validator_command: PathBuf,
    /// Program that reports circularization as JSON
    pub circularization_command: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (error, warn, info, debug, trace)
    pub level: String,
    /// Log output format (json, pretty, compact)
    pub format: String,
    /// Log file path (optional)
    pub file_path: Option<PathBuf>,
}

impl AssemblyConfig {
    pub fn requested_kmers(&self) -> Result<Vec<KmerValue>> {
        KmerParameterList::parse_requested(&self.kmers)
    }

    /// K-mer carried forward when de novo is skipped: the first one requested
    pub fn target_kmer(&self) -> Result<KmerValue> {
        self.requested_kmers()?
            .into_iter()
            .next()
            .ok_or_else(|| anyhow::anyhow!("assembly.kmers is empty"))
    }
}

impl ValidationConfig {
    /// Genetic code actually used; plastid and prokaryote builds force table 11
    pub fn effective_organism_type(&self) -> u32 {
        match self.organelle {
            OrganelleKind::Mitochondrion => self.organism_type,
            _ => 11,
        }
    }

    /// Resolve unset size bounds. Returns the window and one message per
    /// automatically determined value.
    pub fn resolve_size_window(
        &self,
        reference_length: Option<usize>,
    ) -> (SizeWindow, Vec<String>) {
        let mut notes = Vec::new();
        let given = |v: i64| (v > 0).then_some(v as u64);

        let (auto_min, auto_max) = match (reference_length, self.organelle) {
            (Some(len), _) => {
                let len = len as f64;
                (((len * 0.01) as u64).max(1), (len * 1.175) as u64)
            }
            (None, OrganelleKind::Chloroplast) => (250, 190_000),
            (None, _) => (250, 19_000),
        };

        let min = given(self.min_size).unwrap_or_else(|| {
            notes.push(format!("Minimum target size auto-determined: {auto_min}"));
            auto_min
        });
        let max = given(self.max_size).unwrap_or_else(|| {
            notes.push(format!("Maximum target size auto-determined: {auto_max}"));
            auto_max
        });

        let optimum = given(self.optimum_size).unwrap_or_else(|| {
            let auto_optimum = match (reference_length, self.organelle) {
                (Some(len), _) => len as u64,
                (None, OrganelleKind::Chloroplast) => 160_000,
                (None, _) => (max as f64 * 0.85) as u64,
            };
            notes.push(format!("Optimum target size auto-determined: {auto_optimum}"));
            auto_optimum
        });

        (SizeWindow { min, max, optimum }, notes)
    }
}

/// Configuration manager with validation and environment integration
pub struct ConfigurationManager {
    config: PipelineConfiguration,
    config_path: Option<PathBuf>,
}

impl ConfigurationManager {
    /// Load configuration from default locations and the environment
    pub fn new() -> Result<Self, PipelineError> {
        Self::load_from_default_locations()
    }

    /// Load configuration from specific file, layered over the defaults
    pub fn from_file<P: AsRef<Path>>(config_path: P) -> Result<Self, PipelineError> {
        let config_path = config_path.as_ref().to_path_buf();
        let config = Self::load_config_from_file(&config_path)?;

        let manager = Self {
            config,
            config_path: Some(config_path),
        };

        manager.validate_configuration()?;
        Ok(manager)
    }

    fn defaults_source() -> Result<Config, PipelineError> {
        Ok(Config::try_from(&PipelineConfiguration::default())?)
    }

    fn load_from_default_locations() -> Result<Self, PipelineError> {
        Self::load_layered(Path::new("mito-forge"))
    }

    /// Layer the default locations, with `local_config` resolved like a
    /// file name without extension. Any layer that fails to parse is an error.
    fn load_layered(local_config: &Path) -> Result<Self, PipelineError> {
        let mut config_builder = Config::builder().add_source(Self::defaults_source()?);

        if let Ok(embedded_config) = std::fs::read_to_string("./config/default.toml") {
            config_builder = config_builder
                .add_source(config::File::from_str(&embedded_config, FileFormat::Toml));
        } else {
            info!("No config/default.toml found, using built-in defaults");
        }

        // System-wide config
        if let Ok(system_config) = env::var("MITO_SYSTEM_CONFIG") {
            config_builder =
                config_builder.add_source(File::with_name(&system_config).required(false));
        }

        // User config
        if let Some(config_dir) = dirs::config_dir() {
            let user_config = config_dir.join("mito-forge").join("config.toml");
            config_builder = config_builder.add_source(File::from(user_config).required(false));
        }

        // Local config
        config_builder = config_builder
            .add_source(File::with_name(&local_config.to_string_lossy()).required(false));

        config_builder = config_builder.add_source(
            Environment::with_prefix(ENV_PREFIX)
                .separator("__")
                .try_parsing(true),
        );

        let config: PipelineConfiguration = config_builder.build()?.try_deserialize()?;

        let manager = Self {
            config,
            config_path: None,
        };

        manager.validate_configuration()?;
        Ok(manager)
    }

    fn load_config_from_file(path: &Path) -> Result<PipelineConfiguration, PipelineError> {
        let config = Config::builder()
            .add_source(Self::defaults_source()?)
            .add_source(File::from(path))
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        Ok(config.try_deserialize()?)
    }

    /// Validate configuration parameters
    pub fn validate_configuration(&self) -> Result<(), PipelineError> {
        info!("🔍 Validating configuration...");
        validate(&self.config)?;
        self.ensure_directories_exist()?;
        info!("✅ Configuration validation passed");
        Ok(())
    }

    fn ensure_directories_exist(&self) -> Result<(), PipelineError> {
        let dir = &self.config.general.work_dir;
        if !dir.exists() {
            std::fs::create_dir_all(dir).map_err(|e| PipelineError::Io {
                message: format!("Failed to create directory {}: {}", dir.display(), e),
            })?;
            info!("📁 Created directory: {}", dir.display());
        }
        Ok(())
    }

    /// Install the global tracing subscriber.
    ///
    /// The returned guard must be kept alive for the file writer to flush.
    pub fn setup_logging(&self, verbose: bool) -> Option<WorkerGuard> {
        init_logging(&self.config.logging, verbose)
    }

    pub fn config(&self) -> &PipelineConfiguration {
        &self.config
    }

    pub fn config_mut(&mut self) -> &mut PipelineConfiguration {
        &mut self.config
    }

    pub fn config_path(&self) -> Option<&Path> {
        self.config_path.as_deref()
    }

    pub fn into_config(self) -> PipelineConfiguration {
        self.config
    }

    /// Defaults for a chloroplast build
    pub fn create_chloroplast_config() -> PipelineConfiguration {
        let mut config = PipelineConfiguration::default();
        config.validation.organelle = OrganelleKind::Chloroplast;
        config
    }
}

fn invalid(field: &str, reason: &str) -> PipelineError {
    PipelineError::Validation {
        field: field.to_string(),
        reason: reason.to_string(),
    }
}

/// Validate configuration values without touching the filesystem
pub fn validate(config: &PipelineConfiguration) -> Result<(), PipelineError> {
    let job = &config.general.job_name;
    if job.trim().is_empty() {
        return Err(invalid("general.job_name", "must not be empty"));
    }
    if job.contains(['/', '\\']) || job.chars().any(char::is_whitespace) {
        return Err(invalid(
            "general.job_name",
            "must not contain path separators or whitespace",
        ));
    }

    match config.assembly.requested_kmers() {
        Ok(kmers) if kmers.is_empty() => {
            return Err(invalid("assembly.kmers", "must contain at least one k-mer"))
        }
        Ok(_) => {}
        Err(e) => return Err(invalid("assembly.kmers", &e.to_string())),
    }

    if config.assembly.threads == 0 {
        return Err(invalid("assembly.threads", "must be greater than 0"));
    }

    let available_threads = num_cpus::get();
    if config.assembly.threads > available_threads * 2 {
        warn!(
            "Configured threads ({}) exceeds available cores ({})",
            config.assembly.threads, available_threads
        );
    }

    if config.assembly.shortest_contig == 0 {
        return Err(invalid("assembly.shortest_contig", "must be greater than 0"));
    }

    let v = &config.validation;
    if v.min_size > 0 && v.max_size > 0 && v.min_size >= v.max_size {
        return Err(invalid("validation.min_size", "must be less than max_size"));
    }
    if !(v.blast_hit_percentage > 0.0 && v.blast_hit_percentage <= 1.0) {
        return Err(invalid("validation.blast_hit_percentage", "must be in (0, 1]"));
    }
    if !(v.cutoff_equality > 0.0 && v.cutoff_equality <= 1.0) {
        return Err(invalid("validation.cutoff_equality", "must be in (0, 1]"));
    }
    if v.blast_evalue <= 0.0 {
        return Err(invalid("validation.blast_evalue", "must be greater than 0"));
    }
    if let Some(reference) = &v.reference {
        if !reference.exists() {
            return Err(invalid("validation.reference", "file does not exist"));
        }
    }

    if let Some(seed) = &config.assembly.seed_sequence {
        if !seed.exists() {
            return Err(invalid("assembly.seed_sequence", "file does not exist"));
        }
    }

    if !config.gap_closing.skip && config.gap_closing.iterations == 0 {
        return Err(invalid("gap_closing.iterations", "must be at least 1"));
    }

    if config.circularization.window_size == 0 {
        return Err(invalid("circularization.window_size", "must be greater than 0"));
    }

    if !matches!(
        config.logging.format.as_str(),
        "json" | "pretty" | "compact"
    ) {
        return Err(invalid(
            "logging.format",
            "must be one of json, pretty, compact",
        ));
    }

    Ok(())
}

/// Setup logging based on configuration
pub fn init_logging(logging: &LoggingConfig, verbose: bool) -> Option<WorkerGuard> {
    use tracing_appender::rolling;
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    if tracing::dispatcher::has_been_set() {
        return None;
    }

    let level = if verbose { "debug" } else { logging.level.as_str() };
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let (file_writer, guard) = match &logging.file_path {
        Some(file_path) => {
            let file_appender = rolling::daily(
                file_path.parent().unwrap_or(Path::new(".")),
                file_path
                    .file_name()
                    .unwrap_or(std::ffi::OsStr::new("mito-forge.log")),
            );
            let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
            (Some(non_blocking), Some(guard))
        }
        None => (None, None),
    };

    let registry = tracing_subscriber::registry().with(env_filter);

    let result = match (logging.format.as_str(), file_writer) {
        ("json", Some(writer)) => registry
            .with(fmt::layer().json().with_writer(writer))
            .try_init(),
        ("json", None) => registry.with(fmt::layer().json()).try_init(),
        ("compact", Some(writer)) => registry
            .with(fmt::layer().compact().with_writer(writer))
            .try_init(),
        ("compact", None) => registry.with(fmt::layer().compact()).try_init(),
        // "pretty" or default - without timestamps for cleaner console output
        (_, Some(writer)) => registry
            .with(fmt::layer().without_time().with_target(false))
            .with(fmt::layer().with_ansi(false).with_writer(writer))
            .try_init(),
        (_, None) => registry
            .with(fmt::layer().without_time().with_target(false))
            .try_init(),
    };

    if let Err(e) = result {
        eprintln!("Logging already initialized: {e}");
        return None;
    }

    info!(
        "📝 Logging initialized with level: {}, format: {}",
        level, logging.format
    );
    guard
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            job_name: "mito".to_string(),
            work_dir: PathBuf::from("."),
            keep_folders: false,
        }
    }
}

impl Default for AssemblyConfig {
    fn default() -> Self {
        Self {
            backend: BackendKind::default(),
            kmers: "23,31".to_string(),
            threads: num_cpus::get().min(4),
            shortest_contig: 100,
            soap_trans: false,
            mira_genome_mode: true,
            copy_kmers: true,
            seed_sequence: None,
        }
    }
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            min_size: -1,
            max_size: -1,
            optimum_size: -1,
            reference: None,
            blast_evalue: 5.0,
            blast_hit_percentage: 0.60,
            cutoff_equality: 0.55,
            cove_cutoff: 7,
            organism_type: 1,
            organelle: OrganelleKind::default(),
            relaxed: false,
            skip_trna_scan: false,
        }
    }
}

impl Default for MappingConfig {
    fn default() -> Self {
        Self {
            technology: "solexa".to_string(),
            autopair: false,
        }
    }
}

impl Default for GapClosingConfig {
    fn default() -> Self {
        Self {
            skip: false,
            iterations: 10,
            read_length: None,
        }
    }
}

impl Default for CircularizationConfig {
    fn default() -> Self {
        Self {
            window_size: 45,
            offset: 200,
        }
    }
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            soap_denovo_folder: None,
            soap_trans_folder: None,
            spades_folder: None,
            mira_folder: None,
            mitobim_folder: None,
            validator_command: PathBuf::from("mito-check"),
            circularization_command: PathBuf::from("mito-circular"),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
            file_path: None,
        }
    }
}

/// Utility functions for configuration management
pub mod config_utils {
    use super::*;

    /// Validate a configuration file without building anything from it
    pub fn validate_config_file<P: AsRef<Path>>(path: P) -> Result<(), PipelineError> {
        let config = ConfigurationManager::load_config_from_file(path.as_ref())?;
        validate(&config)
    }

    /// Generate a template configuration file
    pub fn generate_config_template<P: AsRef<Path>>(
        path: P,
        template: &PipelineConfiguration,
    ) -> Result<(), PipelineError> {
        let toml_string =
            toml::to_string_pretty(template).map_err(|e| PipelineError::Configuration {
                message: format!("Failed to serialize template: {e}"),
            })?;

        std::fs::write(path.as_ref(), toml_string).map_err(|e| PipelineError::Io {
            message: format!("Failed to write template: {e}"),
        })?;

        Ok(())
    }
}
