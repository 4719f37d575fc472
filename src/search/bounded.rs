//! Bounded beam search, used both to train and to decode.
//!
//! Each round expands every partition on the beam by every candidate merge
//! and ranks the expansions by score (ties: beam rank, then lowest pair).
//! The top expansion is the chosen action if its score is positive;
//! otherwise the chosen action is to stop.
//!
//! When training, the oracle action is the best-ranked gold-consistent
//! expansion (merge quality above the threshold), or stop if there is none.
//! A disagreement between the two is a violation and triggers the update
//!
//! ```text
//! w += η · (φ(oracle) − φ(chosen))        φ(stop) = 0
//! ```
//!
//! after which the chosen merges are still committed. A violated stop commits
//! nothing and the round is re-scored under the new weight. The round budget
//! bounds both cases.

use std::collections::HashSet;

use meld_core::{ClusterPartition, Document, FeatureExtractor, FeatureSchema, WeightVector};

use super::{
    by_score_then_pair, score_candidates, ScoredCandidate, SearchOutcome, Termination,
    TrainingOutcome,
};
use crate::config::Accumulate;
use crate::error::{Error, Result};
use crate::scorer::Scorer;
use crate::train::TrainerState;

/// Beam search bounded by a round budget.
#[derive(Debug, Clone)]
pub struct BoundedTrainingSearch {
    schema: FeatureSchema,
    beam_width: usize,
    search_step: usize,
    quality_threshold: f64,
    accumulate: Accumulate,
}

enum Mode<'a> {
    Train {
        state: &'a mut TrainerState,
        learning_rate: f64,
    },
    Decode {
        weight: &'a WeightVector,
    },
}

impl Mode<'_> {
    fn weight(&self) -> &WeightVector {
        match self {
            Mode::Train { state, .. } => &state.weight,
            Mode::Decode { weight } => weight,
        }
    }
}

struct BeamEntry {
    partition: ClusterPartition,
    merges: usize,
}

struct Expansion {
    beam_index: usize,
    candidate: ScoredCandidate,
}

impl BoundedTrainingSearch {
    /// Width 1, 300 rounds, quality bar 0.5, snapshot after update.
    #[must_use]
    pub fn new(schema: FeatureSchema) -> Self {
        Self {
            schema,
            beam_width: 1,
            search_step: 300,
            quality_threshold: 0.5,
            accumulate: Accumulate::AfterUpdate,
        }
    }

    /// Number of partitions kept between rounds (at least 1).
    #[must_use]
    pub fn with_beam_width(mut self, width: usize) -> Self {
        self.beam_width = width.max(1);
        self
    }

    /// Maximum rounds per document (at least 1).
    #[must_use]
    pub fn with_search_step(mut self, steps: usize) -> Self {
        self.search_step = steps.max(1);
        self
    }

    /// Merge quality a merge must exceed to be gold-consistent.
    #[must_use]
    pub fn with_quality_threshold(mut self, threshold: f64) -> Self {
        self.quality_threshold = threshold;
        self
    }

    /// When `totalWeight` is snapshotted relative to an update.
    #[must_use]
    pub fn with_accumulate(mut self, accumulate: Accumulate) -> Self {
        self.accumulate = accumulate;
        self
    }

    /// Feature schema the weight is laid out over.
    #[must_use]
    pub fn schema(&self) -> &FeatureSchema {
        &self.schema
    }

    /// Search with perceptron updates applied to a copy of `state`.
    pub fn run_training<E: FeatureExtractor + ?Sized>(
        &self,
        document: &Document,
        extractor: &E,
        state: &TrainerState,
        learning_rate: f64,
    ) -> Result<TrainingOutcome> {
        let mut state = state.clone();
        let before = state.violations;
        let search = self.search(
            document,
            extractor,
            Mode::Train {
                state: &mut state,
                learning_rate,
            },
        )?;
        let violations = state.violations - before;
        Ok(TrainingOutcome {
            search,
            state,
            violations,
        })
    }

    /// Search with `weight` held fixed.
    pub fn run_decoding<E: FeatureExtractor + ?Sized>(
        &self,
        document: &Document,
        extractor: &E,
        weight: &WeightVector,
    ) -> Result<SearchOutcome> {
        self.search(document, extractor, Mode::Decode { weight })
    }

    fn search<E: FeatureExtractor + ?Sized>(
        &self,
        document: &Document,
        extractor: &E,
        mut mode: Mode<'_>,
    ) -> Result<SearchOutcome> {
        let scorer = Scorer::new(&self.schema);
        let mut beam = vec![BeamEntry {
            partition: ClusterPartition::initialize(document)?,
            merges: 0,
        }];
        let mut steps = 0;

        loop {
            let expansions = expand(&mut beam, document, extractor, &scorer, mode.weight())?;
            if expansions.is_empty() {
                return finish(document, beam, steps, Termination::Converged);
            }

            let chosen = (expansions[0].candidate.score > 0.0).then_some(0);
            let mut violated = false;
            if let Mode::Train {
                state,
                learning_rate,
            } = &mut mode
            {
                let oracle = expansions
                    .iter()
                    .position(|e| e.candidate.quality > self.quality_threshold);
                if oracle != chosen {
                    violated = true;
                    let target = self.phi(&scorer, oracle.map(|i| &expansions[i]))?;
                    let predicted = self.phi(&scorer, chosen.map(|i| &expansions[i]))?;
                    state.apply_violation(&target.sub(&predicted)?, *learning_rate, self.accumulate)?;
                    log::debug!(
                        "'{}' round {}: violation (chosen {}, oracle {}), weight [{}]",
                        document.id,
                        steps,
                        describe(chosen.map(|i| &expansions[i])),
                        describe(oracle.map(|i| &expansions[i])),
                        state.weight
                    );
                }
            }

            match chosen {
                None if !violated => {
                    return finish(document, beam, steps, Termination::Converged);
                }
                None => {}
                Some(_) => beam = self.next_beam(&beam, &expansions)?,
            }

            steps += 1;
            if steps >= self.search_step {
                return finish(document, beam, steps, Termination::StepLimitReached);
            }
        }
    }

    /// The `beam_width` best distinct partitions reachable by a positive merge.
    fn next_beam(&self, beam: &[BeamEntry], expansions: &[Expansion]) -> Result<Vec<BeamEntry>> {
        let mut next = Vec::with_capacity(self.beam_width);
        let mut seen = HashSet::new();
        for expansion in expansions.iter().take_while(|e| e.candidate.score > 0.0) {
            if next.len() == self.beam_width {
                break;
            }
            let parent = &beam[expansion.beam_index];
            let mut partition = parent.partition.clone();
            let pair = expansion.candidate.pair;
            partition.merge(pair.target, pair.source)?;
            if seen.insert(partition.signature()) {
                next.push(BeamEntry {
                    partition,
                    merges: parent.merges + 1,
                });
            }
        }
        Ok(next)
    }

    fn phi(&self, scorer: &Scorer<'_>, action: Option<&Expansion>) -> Result<WeightVector> {
        match action {
            Some(expansion) => scorer.phi(&expansion.candidate.features),
            None => Ok(self.schema.zero_weight()),
        }
    }
}

/// Every candidate merge of every beam entry, best first.
fn expand<E: FeatureExtractor + ?Sized>(
    beam: &mut [BeamEntry],
    document: &Document,
    extractor: &E,
    scorer: &Scorer<'_>,
    weight: &WeightVector,
) -> Result<Vec<Expansion>> {
    let mut expansions = Vec::new();
    for (beam_index, entry) in beam.iter_mut().enumerate() {
        let scored = score_candidates(&mut entry.partition, document, extractor, scorer, weight)?;
        expansions.extend(
            scored
                .into_iter()
                .map(|candidate| Expansion { beam_index, candidate }),
        );
    }
    expansions.sort_by(|a, b| {
        b.candidate
            .score
            .total_cmp(&a.candidate.score)
            .then_with(|| a.beam_index.cmp(&b.beam_index))
            .then_with(|| by_score_then_pair(&a.candidate, &b.candidate))
    });
    Ok(expansions)
}

fn describe(action: Option<&Expansion>) -> String {
    match action {
        Some(e) => format!("merge {} @ {:.4}", e.candidate.pair, e.candidate.score),
        None => "stop".to_string(),
    }
}

fn finish(
    document: &Document,
    beam: Vec<BeamEntry>,
    steps: usize,
    termination: Termination,
) -> Result<SearchOutcome> {
    let best = beam.into_iter().next().ok_or_else(|| {
        Error::from(meld_core::Error::invalid_input(format!(
            "beam for '{}' emptied during search",
            document.id
        )))
    })?;
    log::debug!(
        "'{}': {:?} after {} rounds, {} merges, {} clusters",
        document.id,
        termination,
        steps,
        best.merges,
        best.partition.len()
    );
    Ok(SearchOutcome {
        partition: best.partition,
        steps,
        merges: best.merges,
        termination,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use meld_core::{AverageLinkage, CandidatePair, FeatureVector, Mention};

    fn schema() -> FeatureSchema {
        FeatureSchema::new(["same"]).unwrap()
    }

    /// Three mentions of one entity and one of another; `same` fires on gold pairs.
    fn doc() -> Document {
        let mut d = Document::new("d")
            .with_mention(Mention::new(0, "Obama").with_gold(1))
            .with_mention(Mention::new(1, "Barack Obama").with_gold(1))
            .with_mention(Mention::new(2, "the president").with_gold(1))
            .with_mention(Mention::new(3, "Merkel").with_gold(2));
        for (a, b) in [(0, 1), (0, 2), (1, 2)] {
            d.set_pair_features(a, b, FeatureVector::new().with("same", 1.0));
        }
        d
    }

    #[test]
    fn zero_weight_decoding_converges_without_merging() {
        let search = BoundedTrainingSearch::new(schema());
        let out = search
            .run_decoding(&doc(), &AverageLinkage, &schema().zero_weight())
            .unwrap();
        assert_eq!(out.termination, Termination::Converged);
        assert_eq!(out.partition.len(), 4);
        assert_eq!(out.merges, 0);
    }

    #[test]
    fn decoding_never_mutates_the_weight() {
        let search = BoundedTrainingSearch::new(schema());
        let weight = WeightVector::from(vec![-0.5, 1.0]);
        let out = search.run_decoding(&doc(), &AverageLinkage, &weight).unwrap();
        assert_eq!(weight.as_slice(), &[-0.5, 1.0]);
        assert_eq!(out.partition.signature(), vec![vec![0, 1, 2], vec![3]]);
    }

    #[test]
    fn training_learns_to_merge_gold_pairs() {
        let search = BoundedTrainingSearch::new(schema());
        let state = TrainerState::new(2);
        let out = search.run_training(&doc(), &AverageLinkage, &state, 1.0).unwrap();
        assert!(out.violations > 0);
        assert_eq!(out.state.violations, out.violations);
        assert!(state.weight.is_zero(), "caller state is untouched");

        let decoded = search
            .run_decoding(&doc(), &AverageLinkage, &out.state.weight)
            .unwrap();
        assert_eq!(decoded.partition.signature(), vec![vec![0, 1, 2], vec![3]]);
    }

    #[test]
    fn step_limit_caps_rounds() {
        let search = BoundedTrainingSearch::new(schema()).with_search_step(1);
        let weight = WeightVector::from(vec![1.0, 0.0]);
        let out = search.run_decoding(&doc(), &AverageLinkage, &weight).unwrap();
        assert_eq!(out.termination, Termination::StepLimitReached);
        assert_eq!(out.steps, 1);
        assert_eq!(out.partition.len(), 3);
    }

    #[test]
    fn wider_beam_keeps_distinct_partitions() {
        let search = BoundedTrainingSearch::new(schema()).with_beam_width(3);
        let weight = WeightVector::from(vec![-0.5, 1.0]);
        let out = search.run_decoding(&doc(), &AverageLinkage, &weight).unwrap();
        assert_eq!(out.termination, Termination::Converged);
        assert_eq!(out.partition.signature(), vec![vec![0, 1, 2], vec![3]]);
    }

    #[test]
    fn equal_scores_merge_the_lowest_pair() {
        let mut d = Document::new("tie")
            .with_mention(Mention::new(0, "Obama").with_gold(1))
            .with_mention(Mention::new(1, "Barack Obama").with_gold(1))
            .with_mention(Mention::new(2, "Obama's").with_gold(1));
        d.set_pair_features(0, 1, FeatureVector::new().with("same", 1.0));
        d.set_pair_features(1, 2, FeatureVector::new().with("same", 1.0));
        let search = BoundedTrainingSearch::new(schema());
        let weight = WeightVector::from(vec![-0.6, 1.0]);
        let out = search.run_decoding(&d, &AverageLinkage, &weight).unwrap();
        // 0<-1 and 1<-2 both score 0.4; afterwards {0,1} vs {2} scores -0.1.
        assert_eq!(out.merges, 1);
        assert_eq!(out.termination, Termination::Converged);
        assert_eq!(out.partition.signature(), vec![vec![0, 1], vec![2]]);
    }

    /// `same`: 0-1 = 1.0, 1-2 = 0.9, 0-2 = 0.8; mention 3 unrelated.
    fn graded_doc() -> Document {
        let mut d = Document::new("graded")
            .with_mention(Mention::new(0, "Obama").with_gold(1))
            .with_mention(Mention::new(1, "Barack Obama").with_gold(1))
            .with_mention(Mention::new(2, "the president").with_gold(1))
            .with_mention(Mention::new(3, "Merkel").with_gold(2));
        d.set_pair_features(0, 1, FeatureVector::new().with("same", 1.0));
        d.set_pair_features(1, 2, FeatureVector::new().with("same", 0.9));
        d.set_pair_features(0, 2, FeatureVector::new().with("same", 0.8));
        d
    }

    #[test]
    fn beam_keeps_the_top_distinct_expansions() {
        let d = graded_doc();
        let schema = schema();
        let scorer = Scorer::new(&schema);
        let weight = WeightVector::from(vec![-0.1, 1.0]);
        let search = BoundedTrainingSearch::new(schema.clone()).with_beam_width(2);

        let mut beam = vec![BeamEntry {
            partition: ClusterPartition::initialize(&d).unwrap(),
            merges: 0,
        }];
        let expansions = expand(&mut beam, &d, &AverageLinkage, &scorer, &weight).unwrap();
        let ranked: Vec<_> = expansions.iter().map(|e| e.candidate.pair).collect();
        assert_eq!(ranked[..3], [
            CandidatePair::new(0, 1),
            CandidatePair::new(1, 2),
            CandidatePair::new(0, 2)
        ]);

        // Three positive merges, width two: the best two survive.
        let mut beam = search.next_beam(&beam, &expansions).unwrap();
        let sigs: Vec<_> = beam.iter().map(|e| e.partition.signature()).collect();
        assert_eq!(
            sigs,
            vec![
                vec![vec![0, 1], vec![2], vec![3]],
                vec![vec![0], vec![1, 2], vec![3]],
            ]
        );

        // Both entries reach {0,1,2} next round; only one copy is kept.
        let expansions = expand(&mut beam, &d, &AverageLinkage, &scorer, &weight).unwrap();
        let positive = expansions.iter().filter(|e| e.candidate.score > 0.0).count();
        assert_eq!(positive, 2);
        assert_eq!(expansions[0].beam_index, 1);
        let next = search.next_beam(&beam, &expansions).unwrap();
        assert_eq!(next.len(), 1);
        assert_eq!(next[0].partition.signature(), vec![vec![0, 1, 2], vec![3]]);
        assert_eq!(next[0].merges, 2);
    }

    #[test]
    fn nan_features_fail_the_document() {
        let mut d = doc();
        d.set_pair_features(0, 3, FeatureVector::new().with("same", f64::NAN));
        let search = BoundedTrainingSearch::new(schema());
        let state = TrainerState::new(2);
        let err = search.run_training(&d, &AverageLinkage, &state, 1.0).unwrap_err();
        assert!(matches!(err, Error::NumericAnomaly { .. }));
    }
}
