//! # Mito-Forge - Organellar Genome Assembly Pipeline
//!
//! Orchestrates external assemblers into a five stage run: a k-mer search over
//! de novo builds, read mapping onto the chosen seed, iterative gap closing,
//! circularization and finalization of the result files.

pub mod assembly;
pub mod core;
pub mod library;
pub mod pipeline;
pub mod utils;

// Re-export commonly used types at crate level
pub use crate::core::data_structures::*;
pub use crate::core::{PipelineError, PipelineReport};
pub use crate::pipeline::complete_integration::MitoPipeline;
pub use crate::utils::configuration::{OrganelleKind, PipelineConfiguration};

/// Result type used throughout the crate
pub type Result<T> = anyhow::Result<T>;

/// Error type used throughout the crate
pub type Error = anyhow::Error;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_crate_result_type() -> Result<()> {
        let success: Result<i32> = Ok(42);
        let error: Result<i32> = Err(anyhow::anyhow!("test error"));

        assert!(success.is_ok());
        assert_eq!(success?, 42);

        assert!(error.is_err());
        assert!(error.unwrap_err().to_string().contains("test error"));
        Ok(())
    }

    #[test]
    fn test_module_exports() {
        let kmers = KmerParameterList::for_backend(&[KmerValue::Value(31)], true).unwrap();
        assert_eq!(kmers.as_slice(), &[KmerValue::Default, KmerValue::Value(31)]);

        let error: Error = PipelineError::Interrupted.into();
        assert!(PipelineError::is_interrupt(&error));
    }
}
