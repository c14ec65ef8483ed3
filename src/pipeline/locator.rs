//! Discovery of the last gap-closing iteration that left a result behind

use std::collections::BTreeSet;
use tracing::debug;

use crate::core::KmerValue;
use crate::utils::intermediate_output::RunLayout;

pub trait StageOutputLocator: Send + Sync {
    /// Highest iteration in `1..=max_iteration` whose result artifact exists
    fn latest_iteration(&self, max_iteration: u32) -> Option<u32>;
}

/// Probes iteration directories on disk, newest first
pub struct FsIterationLocator {
    layout: RunLayout,
}

impl FsIterationLocator {
    pub fn new(layout: RunLayout) -> Self {
        Self { layout }
    }
}

impl StageOutputLocator for FsIterationLocator {
    fn latest_iteration(&self, max_iteration: u32) -> Option<u32> {
        (1..=max_iteration).rev().find(|&iteration| {
            // The artifact name does not depend on the k-mer
            let expected = self
                .layout
                .iteration_payload(iteration, KmerValue::Default)
                .sequence;
            let found = expected.is_file();
            debug!("Iteration {}: {}", iteration, if found { "found" } else { "missing" });
            found
        })
    }
}

/// Fixed set of completed iterations, for tests and dry runs
#[derive(Debug, Clone, Default)]
pub struct InMemoryLocator {
    completed: BTreeSet<u32>,
}

impl InMemoryLocator {
    pub fn new(completed: impl IntoIterator<Item = u32>) -> Self {
        Self {
            completed: completed.into_iter().collect(),
        }
    }
}

impl StageOutputLocator for InMemoryLocator {
    fn latest_iteration(&self, max_iteration: u32) -> Option<u32> {
        self.completed.range(1..=max_iteration).next_back().copied()
    }
}
