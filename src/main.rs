use anyhow::Result;
use clap::Parser;
use std::process::ExitCode;
use tracing::{error, info};

use mito_forge::core::PipelineError;
use mito_forge::pipeline::complete_integration::{
    describe_manifest, render_summary, Cli, Commands, MitoPipeline,
};
use mito_forge::utils::configuration::{config_utils, ConfigurationManager};
use mito_forge::utils::interrupt::listen_for_signals;

/// Conventional exit status for a run stopped by SIGINT
const INTERRUPTED_EXIT_CODE: u8 = 130;

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    let mut manager = match &cli.config {
        Some(path) => ConfigurationManager::from_file(path)?,
        None => ConfigurationManager::new()?,
    };

    // Keep the guard alive so the file writer flushes on exit
    let _log_guard = manager.setup_logging(cli.verbose);

    match cli.command {
        Commands::Run(args) => {
            args.apply(manager.config_mut());

            let interrupt = listen_for_signals();
            let pipeline = MitoPipeline::new(manager.into_config(), &args.input, interrupt)?;

            match pipeline.run().await {
                Ok(report) => {
                    println!("{}", render_summary(&report));
                    if report.is_success() {
                        Ok(ExitCode::SUCCESS)
                    } else {
                        Ok(ExitCode::FAILURE)
                    }
                }
                Err(e) if PipelineError::is_interrupt(&e) => {
                    error!("🛑 Run interrupted; partial results were left in place");
                    Ok(ExitCode::from(INTERRUPTED_EXIT_CODE))
                }
                Err(e) => Err(e),
            }
        }
        Commands::Config {
            output,
            chloroplast,
        } => {
            let template = if chloroplast {
                ConfigurationManager::create_chloroplast_config()
            } else {
                manager.into_config()
            };
            config_utils::generate_config_template(&output, &template)?;
            info!("📝 Configuration template written to {}", output.display());
            Ok(ExitCode::SUCCESS)
        }
        Commands::Manifest { path } => {
            println!("{}", describe_manifest(&path)?);
            Ok(ExitCode::SUCCESS)
        }
    }
}
