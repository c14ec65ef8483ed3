//! Post-assembly stages and the sequencer that runs them in order
//!
//! **Stages**: mapping, gap closing, circularization and finalization.
//! **Wiring**: `complete_integration.rs` turns a configuration into a
//! [`PipelineSequencer`] and hosts the command line interface.

pub mod circularization;
pub mod complete_integration;
pub mod finalization;
pub mod gap_closing;
pub mod locator;
pub mod mapping;
pub mod sequencer;

pub use circularization::{trim_circular, CircularizationChecker, CommandCircularizationChecker};
pub use complete_integration::{Cli, Commands, MitoPipeline, RunArgs};
pub use finalization::{Finalized, Finalizer};
pub use gap_closing::{GapClosingStage, Mitobim, MitobimSettings};
pub use locator::{FsIterationLocator, InMemoryLocator, StageOutputLocator};
pub use mapping::{MappingStage, MiraMapping, MiraMappingSettings};
pub use sequencer::{DeNovoSource, GapClosing, PipelineSequencer};
