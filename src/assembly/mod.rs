//! De novo assembly: backends, build validation and the k-mer search
//!
//! **Search**: `kmer_search.rs` drives `evaluator.rs` over a k-mer list and
//! keeps the best build according to `comparator.rs`.
//! **Backends**: SOAPdenovo, SPAdes and MIRA behind [`AssemblyBackend`].

pub mod backend;
pub mod comparator;
pub mod evaluator;
pub mod kmer_search;
pub mod mira;
pub mod soap_denovo;
pub mod spades;
pub mod validator;

pub use backend::{
    create_backend, AssemblyBackend, BackendKind, BackendOptions, BackendOutput, BackendSettings,
};
pub use comparator::{BuildComparator, ComparisonMode, ReplacementRule};
pub use evaluator::{CandidateBuildEvaluator, MANIFEST_FILE_NAME};
pub use kmer_search::{Incumbent, KmerSearchLoop, SearchOutcome, SearchState, Selection};
pub use validator::{
    AcceptanceCriteria, BuildValidator, CommandValidator, ValidationRequest, ValidatorVerdict,
};
