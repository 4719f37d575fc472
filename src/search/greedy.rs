//! Greedy best-first decoding with a fixed model.
//!
//! Each round scores every candidate pair, stops if the best score does not
//! clear the threshold, and otherwise labels every candidate with its merge
//! quality before merging the best one. Rounds are bounded by the cluster
//! count: each merge removes one cluster.

use meld_core::{ClusterPartition, Document, FeatureExtractor, FeatureSchema, WeightVector};

use super::{by_score_then_pair, score_candidates, SearchOutcome, Termination};
use crate::error::Result;
use crate::records::{RecordSink, TrainingRecord};
use crate::scorer::Scorer;

/// Unbounded greedy merge search.
#[derive(Debug, Clone)]
pub struct GreedyThresholdSearch {
    schema: FeatureSchema,
    threshold: f64,
}

impl GreedyThresholdSearch {
    /// Threshold defaults to 0.5.
    #[must_use]
    pub fn new(schema: FeatureSchema) -> Self {
        Self {
            schema,
            threshold: 0.5,
        }
    }

    /// Stop once the best score is at or below `threshold`.
    #[must_use]
    pub fn with_threshold(mut self, threshold: f64) -> Self {
        self.threshold = threshold;
        self
    }

    /// The stopping threshold.
    #[must_use]
    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    /// Merge until nothing scores above the threshold.
    ///
    /// Records are kept only for rounds that end in a merge, and reach
    /// `sink` only once the whole document has been searched: a document
    /// that fails part-way contributes nothing.
    pub fn run<E: FeatureExtractor + ?Sized>(
        &self,
        document: &Document,
        extractor: &E,
        weight: &WeightVector,
        sink: &mut dyn RecordSink,
    ) -> Result<SearchOutcome> {
        let scorer = Scorer::new(&self.schema);
        let mut partition = ClusterPartition::initialize(document)?;
        let mut steps = 0;
        let mut pending = Vec::new();

        let termination = loop {
            let mut scored = score_candidates(&mut partition, document, extractor, &scorer, weight)?;
            if scored.is_empty() {
                break Termination::Converged;
            }
            scored.sort_by(by_score_then_pair);
            let best = scored[0].pair;
            let best_score = scored[0].score;
            if best_score <= self.threshold {
                log::debug!(
                    "'{}': best score {:.4} at or below {}; stopping",
                    document.id,
                    best_score,
                    self.threshold
                );
                break Termination::NoBeneficialMerge;
            }

            for candidate in scored {
                pending.push(TrainingRecord {
                    document: document.id.clone(),
                    pair: candidate.pair,
                    features: candidate.features,
                    quality: candidate.quality,
                });
            }
            partition.merge(best.target, best.source)?;
            steps += 1;
        };

        log::debug!(
            "'{}': greedy {:?} after {} merges, {} clusters",
            document.id,
            termination,
            steps,
            partition.len()
        );
        for record in pending {
            sink.record(record);
        }
        Ok(SearchOutcome {
            partition,
            steps,
            merges: steps,
            termination,
        })
    }
}
