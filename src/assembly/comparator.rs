//! Candidate build comparison
//!
//! Rules are checked in a fixed priority order and the first one whose guard
//! holds decides. The order matters: some later guards overlap earlier ones,
//! and selection depends on exactly this sequence.

use serde::{Deserialize, Serialize};

use crate::core::BuildResult;

/// How candidate builds are compared
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ComparisonMode {
    /// Seven-rule biological comparison
    #[default]
    Strict,
    /// Raw sequence length only
    Relaxed,
}

/// The rule that made a candidate replace the incumbent
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReplacementRule {
    ImportantFeaturesCompleted,
    MoreCompleteGenes,
    Longer,
    MorePresentFeatures,
    FewerValidContigs,
    BecameCircular,
    MoreInformativeBases,
    /// Relaxed mode: strictly longer sequence
    LongerRelaxed,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct BuildComparator {
    mode: ComparisonMode,
}

impl BuildComparator {
    pub fn new(mode: ComparisonMode) -> Self {
        Self { mode }
    }

    pub fn strict() -> Self {
        Self::new(ComparisonMode::Strict)
    }

    pub fn relaxed() -> Self {
        Self::new(ComparisonMode::Relaxed)
    }

    pub fn mode(&self) -> ComparisonMode {
        self.mode
    }

    /// True if `candidate` should replace `incumbent`
    pub fn is_better(&self, candidate: &BuildResult, incumbent: &BuildResult) -> bool {
        self.winning_rule(candidate, incumbent).is_some()
    }

    /// First rule, in priority order, under which `candidate` wins
    pub fn winning_rule(
        &self,
        candidate: &BuildResult,
        incumbent: &BuildResult,
    ) -> Option<ReplacementRule> {
        match self.mode {
            ComparisonMode::Relaxed => {
                (candidate.len() > incumbent.len()).then_some(ReplacementRule::LongerRelaxed)
            }
            ComparisonMode::Strict => strict_rule(candidate, incumbent),
        }
    }
}

/// Rules 6 and 7 share only the four non-regression conditions with rule 5;
/// a candidate with more valid contigs can still win on circularity or gaps.
fn strict_rule(c: &BuildResult, i: &BuildResult) -> Option<ReplacementRule> {
    let not_shorter = c.len() >= i.len();

    if c.has_all_important_features()
        && !i.has_all_important_features()
        && not_shorter
        && c.split_genes <= i.split_genes
    {
        return Some(ReplacementRule::ImportantFeaturesCompleted);
    }

    if c.complete_genes > i.complete_genes && not_shorter {
        return Some(ReplacementRule::MoreCompleteGenes);
    }

    if c.len() > i.len() && c.complete_genes >= i.complete_genes {
        return Some(ReplacementRule::Longer);
    }

    if c.present_features > i.present_features && c.split_genes <= i.split_genes && not_shorter {
        return Some(ReplacementRule::MorePresentFeatures);
    }

    // Shared by the last three rules
    let no_regression = c.complete_genes >= i.complete_genes
        && not_shorter
        && c.present_features >= i.present_features
        && c.split_genes <= i.split_genes;

    if !no_regression {
        return None;
    }

    if c.valid_contigs < i.valid_contigs {
        Some(ReplacementRule::FewerValidContigs)
    } else if c.is_circular && !i.is_circular {
        Some(ReplacementRule::BecameCircular)
    } else if c.informative_bases() > i.informative_bases() {
        Some(ReplacementRule::MoreInformativeBases)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn build(len: usize, present: u32, complete: u32) -> BuildResult {
        BuildResult {
            sequence: "A".repeat(len),
            valid_contigs: 1,
            present_features: present,
            important_features: 6,
            split_genes: 0,
            complete_genes: complete,
            trna_count: 20,
            is_circular: false,
        }
    }

    #[test]
    fn test_important_features_rule_fires_first() {
        let incumbent = build(16_500, 5, 4);
        let candidate = build(16_550, 6, 4);

        let rule = BuildComparator::strict().winning_rule(&candidate, &incumbent);
        assert_eq!(rule, Some(ReplacementRule::ImportantFeaturesCompleted));
    }

    #[test]
    fn test_more_complete_genes_needs_length() {
        let comparator = BuildComparator::strict();
        let incumbent = build(16_000, 6, 10);

        let shorter = build(15_000, 6, 12);
        assert!(!comparator.is_better(&shorter, &incumbent));

        let same_length = build(16_000, 6, 12);
        assert_eq!(
            comparator.winning_rule(&same_length, &incumbent),
            Some(ReplacementRule::MoreCompleteGenes)
        );
    }

    #[test]
    fn test_longer_without_losing_genes() {
        let comparator = BuildComparator::strict();
        let incumbent = build(16_000, 6, 10);

        assert_eq!(
            comparator.winning_rule(&build(16_100, 6, 10), &incumbent),
            Some(ReplacementRule::Longer)
        );
        assert!(!comparator.is_better(&build(16_100, 6, 9), &incumbent));
    }

    #[test]
    fn test_tertiary_tie_breakers() {
        let comparator = BuildComparator::strict();
        let incumbent = build(16_000, 6, 10);

        let mut fewer_contigs = incumbent.clone();
        fewer_contigs.valid_contigs = 0;
        assert_eq!(
            comparator.winning_rule(&fewer_contigs, &incumbent),
            Some(ReplacementRule::FewerValidContigs)
        );

        let mut circular = incumbent.clone();
        circular.is_circular = true;
        assert_eq!(
            comparator.winning_rule(&circular, &incumbent),
            Some(ReplacementRule::BecameCircular)
        );

        // Same length, fewer gaps
        let mut gapped = incumbent.clone();
        gapped.sequence.replace_range(0..100, &"N".repeat(100));
        assert_eq!(
            comparator.winning_rule(&incumbent, &gapped),
            Some(ReplacementRule::MoreInformativeBases)
        );
    }

    #[test]
    fn test_split_gene_regression_blocks_tie_breakers() {
        let comparator = BuildComparator::strict();
        let incumbent = build(16_000, 6, 10);

        let mut candidate = incumbent.clone();
        candidate.is_circular = true;
        candidate.split_genes = 1;
        assert!(!comparator.is_better(&candidate, &incumbent));
    }

    #[test]
    fn test_tie_breakers_ignore_contig_regression() {
        let comparator = BuildComparator::strict();
        let incumbent = build(16_000, 6, 10);

        let mut circular = incumbent.clone();
        circular.is_circular = true;
        circular.valid_contigs = 3;
        assert_eq!(
            comparator.winning_rule(&circular, &incumbent),
            Some(ReplacementRule::BecameCircular)
        );

        let mut gapped = incumbent.clone();
        gapped.sequence.replace_range(0..50, &"N".repeat(50));
        let mut fragmented = incumbent.clone();
        fragmented.valid_contigs = 2;
        assert_eq!(
            comparator.winning_rule(&fragmented, &gapped),
            Some(ReplacementRule::MoreInformativeBases)
        );
    }

    #[test]
    fn test_relaxed_compares_length_only() {
        let comparator = BuildComparator::relaxed();
        let incumbent = build(16_000, 6, 10);

        assert!(comparator.is_better(&build(16_001, 0, 0), &incumbent));
        assert!(!comparator.is_better(&build(16_000, 6, 13), &incumbent));
    }

    fn arb_build() -> impl Strategy<Value = BuildResult> {
        (
            1usize..60,
            0usize..10,
            0u32..4,
            0u32..8,
            0u32..3,
            0u32..8,
            any::<bool>(),
        )
            .prop_map(|(len, gaps, contigs, present, splits, complete, circular)| {
                let gaps = gaps.min(len);
                BuildResult {
                    sequence: format!("{}{}", "N".repeat(gaps), "A".repeat(len - gaps)),
                    valid_contigs: contigs,
                    present_features: present,
                    important_features: 6,
                    split_genes: splits,
                    complete_genes: complete,
                    trna_count: 0,
                    is_circular: circular,
                }
            })
    }

    proptest! {
        #[test]
        fn identical_builds_never_replace(b in arb_build()) {
            prop_assert!(!BuildComparator::strict().is_better(&b, &b));
            prop_assert!(!BuildComparator::relaxed().is_better(&b, &b));
        }

        #[test]
        fn comparison_is_deterministic(a in arb_build(), b in arb_build()) {
            let comparator = BuildComparator::strict();
            prop_assert_eq!(
                comparator.winning_rule(&a, &b),
                comparator.winning_rule(&a, &b)
            );
        }

        #[test]
        fn dominating_incumbent_is_never_replaced(a in arb_build(), b in arb_build()) {
            // `a` is no worse than `b` on every criterion
            let dominates = a.len() >= b.len()
                && a.informative_bases() >= b.informative_bases()
                && a.present_features >= b.present_features
                && a.complete_genes >= b.complete_genes
                && a.split_genes <= b.split_genes
                && a.valid_contigs <= b.valid_contigs
                && (a.is_circular || !b.is_circular);

            if dominates {
                prop_assert!(!BuildComparator::strict().is_better(&b, &a));
            }
        }

        #[test]
        fn relaxed_mode_is_antisymmetric(a in arb_build(), b in arb_build()) {
            let comparator = BuildComparator::relaxed();
            prop_assert!(!(comparator.is_better(&a, &b) && comparator.is_better(&b, &a)));
        }
    }
}
