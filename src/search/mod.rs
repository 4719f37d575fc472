//! Merge search over a [`ClusterPartition`].
//!
//! Two strategies share one capability surface, [`MergeSearch`]:
//!
//! | Strategy | Training | Decoding | Stops when |
//! |----------|----------|----------|------------|
//! | [`BoundedTrainingSearch`] | perceptron updates on violations | fixed weight | no positive merge, or `search_step` rounds |
//! | [`GreedyThresholdSearch`] | not supported | fixed model, emits records | best score ≤ threshold |
//!
//! The strategy is picked when the run is configured
//! ([`ExperimentConfig::decoding_search`](crate::ExperimentConfig::decoding_search)),
//! not by name at run time.
//!
//! Neither strategy touches the [`Document`]; each builds its own partition
//! from it and hands the final partition back to the caller.

mod bounded;
mod greedy;

pub use bounded::BoundedTrainingSearch;
pub use greedy::GreedyThresholdSearch;

use serde::{Deserialize, Serialize};

use meld_core::{
    CandidatePair, Cluster, ClusterPartition, Document, FeatureExtractor, FeatureVector,
    WeightVector,
};

use crate::error::{Error, Result};
use crate::records::RecordSink;
use crate::scorer::Scorer;
use crate::train::TrainerState;

// =============================================================================
// Outcomes
// =============================================================================

/// Why a search stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Termination {
    /// No candidate pairs, or the best action was to stop merging.
    Converged,
    /// The round budget ran out.
    StepLimitReached,
    /// Greedy search: the best score did not clear the threshold.
    NoBeneficialMerge,
}

/// Final state of one document's search.
#[derive(Debug, Clone)]
pub struct SearchOutcome {
    /// The partition the search ended in.
    pub partition: ClusterPartition,
    /// Rounds executed.
    pub steps: usize,
    /// Merges committed on the returned partition's path.
    pub merges: usize,
    /// Why the search stopped.
    pub termination: Termination,
}

/// Result of a training search: the decoded partition plus the updated state.
#[derive(Debug, Clone)]
pub struct TrainingOutcome {
    /// Search result.
    pub search: SearchOutcome,
    /// Trainer state after this document.
    pub state: TrainerState,
    /// Violations recorded on this document.
    pub violations: usize,
}

// =============================================================================
// MergeSearch
// =============================================================================

/// A configured search strategy.
#[derive(Debug, Clone)]
pub enum MergeSearch {
    /// Beam search bounded by a round budget.
    Bounded(BoundedTrainingSearch),
    /// Unconstrained greedy best-first search.
    Greedy(GreedyThresholdSearch),
}

impl MergeSearch {
    /// Short strategy name for logs.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            MergeSearch::Bounded(_) => "bounded",
            MergeSearch::Greedy(_) => "greedy",
        }
    }

    /// Search `document`, updating a copy of `state` on every violation.
    ///
    /// The caller's `state` is untouched; on error it remains the state to
    /// continue from.
    pub fn run_training<E: FeatureExtractor + ?Sized>(
        &self,
        document: &Document,
        extractor: &E,
        state: &TrainerState,
        learning_rate: f64,
    ) -> Result<TrainingOutcome> {
        match self {
            MergeSearch::Bounded(search) => {
                search.run_training(document, extractor, state, learning_rate)
            }
            MergeSearch::Greedy(_) => Err(Error::unsupported(
                "greedy search decodes with a fixed model and cannot train",
            )),
        }
    }

    /// Search `document` with a fixed weight.
    ///
    /// Only the greedy strategy writes to `sink`.
    pub fn run_decoding<E: FeatureExtractor + ?Sized>(
        &self,
        document: &Document,
        extractor: &E,
        weight: &WeightVector,
        sink: &mut dyn RecordSink,
    ) -> Result<SearchOutcome> {
        match self {
            MergeSearch::Bounded(search) => search.run_decoding(document, extractor, weight),
            MergeSearch::Greedy(search) => search.run(document, extractor, weight, sink),
        }
    }
}

// =============================================================================
// Shared helpers
// =============================================================================

/// Fraction of cross-cluster mention pairs that are gold-coreferent.
///
/// Mentions missing from the gold mapping count as incorrect. Returns `0.0`
/// when either cluster is empty.
#[must_use]
pub fn merge_quality(document: &Document, a: &Cluster, b: &Cluster) -> f64 {
    let total = a.len() * b.len();
    if total == 0 {
        return 0.0;
    }
    let mut correct = 0usize;
    for &x in a.mentions() {
        let Some(mx) = document.mention(x) else { continue };
        for &y in b.mentions() {
            if document.mention(y).is_some_and(|my| mx.corefers_with(my)) {
                correct += 1;
            }
        }
    }
    correct as f64 / total as f64
}

/// A scored candidate merge from one partition.
#[derive(Debug, Clone)]
pub(crate) struct ScoredCandidate {
    pub pair: CandidatePair,
    pub features: FeatureVector,
    pub score: f64,
    pub quality: f64,
}

/// Score every candidate pair of `partition`.
///
/// Pairs touching a mention absent from the gold mapping are logged and
/// skipped. Any non-finite feature or score aborts with
/// [`Error::NumericAnomaly`].
pub(crate) fn score_candidates<E: FeatureExtractor + ?Sized>(
    partition: &mut ClusterPartition,
    document: &Document,
    extractor: &E,
    scorer: &Scorer<'_>,
    weight: &WeightVector,
) -> Result<Vec<ScoredCandidate>> {
    let pairs = partition.candidate_pairs();
    let mut scored = Vec::with_capacity(pairs.len());
    for pair in pairs {
        let (quality, covered) = match (partition.get(pair.target), partition.get(pair.source)) {
            (Some(a), Some(b)) => (
                merge_quality(document, a, b),
                a.is_covered_by(document) && b.is_covered_by(document),
            ),
            _ => return Err(meld_core::Error::UnknownCluster(pair.source).into()),
        };
        if !covered {
            log::warn!(
                "'{}': pair {} references a mention outside the gold mapping; skipped",
                document.id,
                pair
            );
            continue;
        }
        let features = partition.pair_features(document, extractor, pair)?.clone();
        let score = scorer.score(weight, &features).map_err(|e| match e {
            Error::NumericAnomaly { context, value } => Error::numeric_anomaly(
                format!("{} of pair {} in '{}'", context, pair, document.id),
                value,
            ),
            other => other,
        })?;
        scored.push(ScoredCandidate {
            pair,
            features,
            score,
            quality,
        });
    }
    Ok(scored)
}

/// Highest score first; equal scores fall back to the lowest pair.
pub(crate) fn by_score_then_pair(a: &ScoredCandidate, b: &ScoredCandidate) -> std::cmp::Ordering {
    b.score.total_cmp(&a.score).then_with(|| a.pair.cmp(&b.pair))
}
