//! K-mer candidate search
//!
//! Every k-mer is evaluated in list order. The best scored build so far is
//! carried from one iteration to the next in a [`SearchState`] accumulator.

use serde::Serialize;
use std::path::PathBuf;
use tracing::{info, instrument, warn};

use super::comparator::BuildComparator;
use super::evaluator::CandidateBuildEvaluator;
use super::validator::ValidatorVerdict;
use crate::core::{BuildResult, KmerParameterList, KmerValue, PipelineError};
use crate::utils::interrupt::InterruptSignal;

/// Best scored build so far
#[derive(Debug, Clone, PartialEq)]
pub struct Incumbent {
    pub kmer: KmerValue,
    pub build: BuildResult,
}

#[derive(Debug, Clone, Default)]
pub struct SearchState {
    pub incumbent: Option<Incumbent>,
    /// K-mers evaluated so far, including failed ones
    pub attempted: usize,
}

#[derive(Debug)]
pub enum Step {
    Continue(SearchState),
    Finished(SearchOutcome),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Selection {
    /// The validator accepted a build outright
    Accepted { seed: PathBuf },
    /// Best scored build after the list was exhausted or the search degraded
    BestEffort(BuildResult),
}

#[derive(Debug)]
pub struct SearchOutcome {
    pub kmer: KmerValue,
    pub selection: Selection,
    pub attempted: usize,
    /// Backend error that ended the search early in favour of the incumbent
    pub degraded_by: Option<PipelineError>,
}

pub struct KmerSearchLoop {
    evaluator: CandidateBuildEvaluator,
    comparator: BuildComparator,
    interrupt: InterruptSignal,
}

impl KmerSearchLoop {
    pub fn new(
        evaluator: CandidateBuildEvaluator,
        comparator: BuildComparator,
        interrupt: InterruptSignal,
    ) -> Self {
        Self {
            evaluator,
            comparator,
            interrupt,
        }
    }

    pub fn backend_name(&self) -> &str {
        self.evaluator.backend().name()
    }

    pub fn supports_default_kmer(&self) -> bool {
        self.evaluator.backend().supports_default_kmer()
    }

    #[instrument(skip_all, fields(backend = self.backend_name(), kmers = kmers.len()))]
    pub async fn run(&self, kmers: &KmerParameterList) -> Result<SearchOutcome, PipelineError> {
        info!("🔍 Starting recursive {} phase...", self.backend_name());
        let mut state = SearchState::default();

        for &kmer in kmers.iter() {
            if self.interrupt.is_raised() {
                return Err(PipelineError::Interrupted);
            }

            info!("========== STARTING K-MER {} ==========", kmer);
            let evaluated = self.evaluator.evaluate(kmer).await;

            state = match advance(&self.comparator, state, kmer, evaluated)? {
                Step::Continue(next) => next,
                Step::Finished(outcome) => return Ok(outcome),
            };
        }

        finish(state)
    }
}

/// Fold one evaluation into the accumulator
pub fn advance(
    comparator: &BuildComparator,
    mut state: SearchState,
    kmer: KmerValue,
    evaluated: Result<ValidatorVerdict, PipelineError>,
) -> Result<Step, PipelineError> {
    state.attempted += 1;

    match evaluated {
        Ok(ValidatorVerdict::Accepted { seed }) => {
            info!("✅ Target sequence built with k-mer {}", kmer);
            Ok(Step::Finished(SearchOutcome {
                kmer,
                selection: Selection::Accepted { seed },
                attempted: state.attempted,
                degraded_by: None,
            }))
        }
        Ok(ValidatorVerdict::Rejected) => {
            info!("   K-mer {} produced nothing usable", kmer);
            Ok(Step::Continue(state))
        }
        Ok(ValidatorVerdict::Scored(build)) => {
            let replace = match &state.incumbent {
                None => true,
                Some(incumbent) => match comparator.winning_rule(&build, &incumbent.build) {
                    Some(rule) => {
                        info!(
                            "   K-mer {} replaces k-mer {} ({:?})",
                            kmer, incumbent.kmer, rule
                        );
                        true
                    }
                    None => false,
                },
            };

            if replace {
                info!("   Best build so far: k-mer {} ({} bp)", kmer, build.len());
                state.incumbent = Some(Incumbent { kmer, build });
            }
            Ok(Step::Continue(state))
        }
        Err(PipelineError::Interrupted) => Err(PipelineError::Interrupted),
        Err(err) => match state.incumbent {
            Some(incumbent) => {
                warn!("⚠️  {}", err);
                warn!("⚠️  An error occurred, but proceeding with the best build so far anyway...");
                Ok(Step::Finished(SearchOutcome {
                    kmer: incumbent.kmer,
                    selection: Selection::BestEffort(incumbent.build),
                    attempted: state.attempted,
                    degraded_by: Some(err),
                }))
            }
            None => Err(err),
        },
    }
}

/// Close the search once the list is exhausted
pub fn finish(state: SearchState) -> Result<SearchOutcome, PipelineError> {
    match state.incumbent {
        Some(incumbent) => {
            info!(
                "🏁 No build met every criterion; using k-mer {} as best effort",
                incumbent.kmer
            );
            Ok(SearchOutcome {
                kmer: incumbent.kmer,
                selection: Selection::BestEffort(incumbent.build),
                attempted: state.attempted,
                degraded_by: None,
            })
        }
        None => Err(PipelineError::NoCandidateProduced {
            attempts: state.attempted,
        }),
    }
}
