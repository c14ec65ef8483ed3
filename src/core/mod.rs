pub mod data_structures;
pub mod errors;
pub mod pipeline_types;

// Re-export key types for pipeline integration
pub use data_structures::{
    count_gap_bases, gc_content, BuildResult, CircularizationVerdict, KmerParameterList,
    KmerValue, SizeWindow,
};
pub use errors::PipelineError;
pub use pipeline_types::{
    FinalArtifacts, PipelineReport, PipelineStage, RunStatus, RunWarning, SequenceStats,
    StageOutcome, StagePayload,
};
