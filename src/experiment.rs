//! The train / validate / test loop.
//!
//! One [`Experiment::run`] call is one training run. Every iteration:
//!
//! 1. trains on every training document with the bounded search, threading
//!    one [`TrainerState`](crate::TrainerState) through them in order;
//! 2. closes the iteration in the [`WeightTrainer`], which yields the
//!    averaged weight;
//! 3. decodes the training documents (validation) and the test documents
//!    (testing) with that averaged weight and the configured decoder.
//!
//! A document whose search fails with a document-local error (a numeric
//! anomaly, inconsistent input) is logged and skipped; its updates are
//! discarded and the run continues. Any other error ends the run.

use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;

use meld_core::{Document, FeatureExtractor, FeatureSchema, MentionId, WeightVector};

use crate::config::ExperimentConfig;
use crate::error::{Error, Result};
use crate::records::RecordSink;
use crate::search::{BoundedTrainingSearch, MergeSearch, SearchOutcome, Termination};
use crate::train::WeightTrainer;

// =============================================================================
// Reports
// =============================================================================

/// Final partition of one decoded document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecodedDocument {
    /// Document id.
    pub document: String,
    /// Clusters as sorted mention-id lists, in cluster-id order.
    pub clusters: Vec<Vec<MentionId>>,
    /// Rounds the search ran.
    pub steps: usize,
    /// Merges committed.
    pub merges: usize,
    /// Why the search stopped.
    pub termination: Termination,
}

impl DecodedDocument {
    fn from_outcome(document: &Document, outcome: &SearchOutcome) -> Self {
        Self {
            document: document.id.clone(),
            clusters: outcome
                .partition
                .clusters()
                .map(|c| c.mentions().iter().copied().collect())
                .collect(),
            steps: outcome.steps,
            merges: outcome.merges,
            termination: outcome.termination,
        }
    }
}

/// Decoding results for one phase.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PhaseReport {
    /// Successfully decoded documents, in input order.
    pub decoded: Vec<DecodedDocument>,
    /// Ids of documents whose search failed.
    pub failed: Vec<String>,
}

/// Everything observed in one iteration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IterationReport {
    /// Zero-based iteration index.
    pub iteration: usize,
    /// Learning rate used.
    pub learning_rate: f64,
    /// Violations recorded in this iteration.
    pub violations: usize,
    /// Violations over the run so far.
    pub total_violations: usize,
    /// Instantaneous weight at the end of training.
    pub weight: WeightVector,
    /// Running sum of violation snapshots.
    pub total_weight: WeightVector,
    /// Averaged weight used for validation and testing.
    pub average: WeightVector,
    /// L2 distance from the previous iteration's averaged weight.
    pub drift: Option<f64>,
    /// Training documents whose search failed.
    pub training_failures: Vec<String>,
    /// Decoding of the training documents.
    pub validation: PhaseReport,
    /// Decoding of the test documents.
    pub testing: PhaseReport,
}

/// A complete run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunReport {
    /// One report per iteration.
    pub iterations: Vec<IterationReport>,
    /// The final averaged model.
    pub model: Model,
}

// =============================================================================
// Model
// =============================================================================

/// A weight vector together with the feature names it is laid out over.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Model {
    /// Feature order; slot `i + 1` of `weight` belongs to name `i`.
    pub feature_names: FeatureSchema,
    /// Bias first, then one weight per feature.
    pub weight: WeightVector,
}

impl Model {
    /// Pair a weight with its schema, checking the dimension.
    pub fn new(feature_names: FeatureSchema, weight: WeightVector) -> Result<Self> {
        if weight.dim() != feature_names.dim() {
            return Err(meld_core::Error::dimension_mismatch(feature_names.dim(), weight.dim()).into());
        }
        if let Some(value) = weight.first_non_finite() {
            return Err(Error::numeric_anomaly("model weight", value));
        }
        Ok(Self {
            feature_names,
            weight,
        })
    }

    /// Read a JSON model.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let reader = BufReader::new(File::open(path)?);
        let raw: Model = serde_json::from_reader(reader)?;
        Self::new(raw.feature_names, raw.weight)
    }

    /// Write as pretty JSON.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let writer = BufWriter::new(File::create(path)?);
        serde_json::to_writer_pretty(writer, self)?;
        Ok(())
    }
}

// =============================================================================
// Experiment
// =============================================================================

/// A validated run configuration, ready to train.
#[derive(Debug, Clone)]
pub struct Experiment {
    config: ExperimentConfig,
    schema: FeatureSchema,
    rates: Vec<f64>,
    training: BoundedTrainingSearch,
    decoding: MergeSearch,
}

impl Experiment {
    /// Validate `config` and build the searches it names.
    pub fn new(config: ExperimentConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            schema: config.schema()?,
            rates: config.learning_rates()?,
            training: config.training_search()?,
            decoding: config.decoding_search()?,
            config,
        })
    }

    /// The configuration this experiment was built from.
    #[must_use]
    pub fn config(&self) -> &ExperimentConfig {
        &self.config
    }

    /// Learning rate per iteration.
    #[must_use]
    pub fn learning_rates(&self) -> &[f64] {
        &self.rates
    }

    /// Train on `train`, validating on it and testing on `test` each iteration.
    ///
    /// Greedy decoding phases write their labelled candidates to `sink`.
    pub fn run<E: FeatureExtractor + ?Sized>(
        &self,
        train: &[Document],
        test: &[Document],
        extractor: &E,
        sink: &mut dyn RecordSink,
    ) -> Result<RunReport> {
        let mut trainer = WeightTrainer::new(self.schema.dim(), self.config.averaging);
        let mut reports = Vec::with_capacity(self.rates.len());
        let mut previous: Option<WeightVector> = None;

        log::info!(
            "training on {} documents for {} iterations ({:?} averaging, {} decoder)",
            train.len(),
            self.rates.len(),
            self.config.averaging,
            self.decoding.name()
        );

        for (iteration, &learning_rate) in self.rates.iter().enumerate() {
            let mut state = trainer.begin_iteration(learning_rate)?;
            let start_violations = state.violations;
            let mut training_failures = Vec::new();

            for document in train {
                match self.training.run_training(document, extractor, &state, learning_rate) {
                    Ok(outcome) => {
                        log::debug!(
                            "trained '{}': {} violations, {} merges",
                            document.id,
                            outcome.violations,
                            outcome.search.merges
                        );
                        state = outcome.state;
                    }
                    Err(e) if e.is_document_local() => {
                        log::warn!("training on '{}' failed, skipped: {}", document.id, e);
                        training_failures.push(document.id.clone());
                    }
                    Err(e) => return Err(e),
                }
            }

            let violations = state.violations - start_violations;
            let weight = state.weight.clone();
            let average = trainer.finish_iteration(state)?;
            let drift = match &previous {
                Some(prev) => Some(average.l2_distance(prev)?),
                None => None,
            };

            let validation = decode_documents(&self.decoding, train, extractor, &average, sink)?;
            let testing = decode_documents(&self.decoding, test, extractor, &average, sink)?;

            log::info!(
                "iteration {}: lr {}, {} violations ({} total), drift {}",
                iteration,
                learning_rate,
                violations,
                trainer.violations(),
                drift.map_or_else(|| "-".to_string(), |d| format!("{:.6}", d))
            );

            reports.push(IterationReport {
                iteration,
                learning_rate,
                violations,
                total_violations: trainer.violations(),
                weight,
                total_weight: trainer.total_weight().clone(),
                average: average.clone(),
                drift,
                training_failures,
                validation,
                testing,
            });
            previous = Some(average);
        }

        let final_weight = previous.unwrap_or_else(|| self.schema.zero_weight());
        Ok(RunReport {
            iterations: reports,
            model: Model::new(self.schema.clone(), final_weight)?,
        })
    }
}

/// Decode every document with a fixed weight.
///
/// Document-local failures are logged and listed in the report.
pub fn decode_documents<E: FeatureExtractor + ?Sized>(
    search: &MergeSearch,
    documents: &[Document],
    extractor: &E,
    weight: &WeightVector,
    sink: &mut dyn RecordSink,
) -> Result<PhaseReport> {
    let mut report = PhaseReport::default();
    for document in documents {
        match search.run_decoding(document, extractor, weight, sink) {
            Ok(outcome) => report
                .decoded
                .push(DecodedDocument::from_outcome(document, &outcome)),
            Err(e) if e.is_document_local() => {
                log::warn!("decoding '{}' failed, skipped: {}", document.id, e);
                report.failed.push(document.id.clone());
            }
            Err(e) => return Err(e),
        }
    }
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{AveragingScheme, LearningRateSchedule, SearchKind};
    use crate::search::GreedyThresholdSearch;
    use meld_core::{AverageLinkage, CandidatePair, Cluster, FeatureVector, Mention};

    fn doc(id: &str) -> Document {
        let mut d = Document::new(id)
            .with_mention(Mention::new(0, "Obama").with_gold(1))
            .with_mention(Mention::new(1, "Barack Obama").with_gold(1))
            .with_mention(Mention::new(2, "Merkel").with_gold(2));
        d.set_pair_features(0, 1, FeatureVector::new().with("same", 1.0));
        d.set_pair_features(0, 2, FeatureVector::new().with("same", -1.0));
        d.set_pair_features(1, 2, FeatureVector::new().with("same", -1.0));
        d
    }

    fn config() -> ExperimentConfig {
        let mut config = ExperimentConfig::default().with_features(["same"]);
        config.iterations = 3;
        config.learning_rate = LearningRateSchedule::Constant { rate: 1.0 };
        config
    }

    #[test]
    fn invalid_config_fails_at_construction() {
        assert!(matches!(
            Experiment::new(ExperimentConfig::default()),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn run_reports_every_iteration() {
        let experiment = Experiment::new(config()).unwrap();
        let train = [doc("a"), doc("b")];
        let test = [doc("t")];
        let report = experiment
            .run(&train, &test, &AverageLinkage, &mut crate::NullSink)
            .unwrap();
        assert_eq!(report.iterations.len(), 3);
        assert!(report.iterations[0].drift.is_none());
        assert!(report.iterations[1].drift.is_some());
        let last = report.iterations.last().unwrap();
        assert_eq!(last.validation.decoded.len(), 2);
        assert_eq!(last.testing.decoded.len(), 1);
        assert_eq!(report.model.weight, last.average);
        assert_eq!(last.testing.decoded[0].clusters, vec![vec![0, 1], vec![2]]);
    }

    #[test]
    fn failing_document_is_skipped() {
        let mut bad = doc("bad");
        bad.set_pair_features(0, 2, FeatureVector::new().with("same", f64::NAN));
        let experiment = Experiment::new(config()).unwrap();
        let report = experiment
            .run(&[bad, doc("good")], &[], &AverageLinkage, &mut crate::NullSink)
            .unwrap();
        let first = &report.iterations[0];
        assert_eq!(first.training_failures, vec!["bad".to_string()]);
        assert_eq!(first.validation.failed, vec!["bad".to_string()]);
        assert_eq!(first.validation.decoded.len(), 1);
    }

    #[test]
    fn greedy_decoder_emits_records() {
        let mut config = config();
        config.decoder = SearchKind::Greedy;
        config.averaging = AveragingScheme::Recursive;
        let experiment = Experiment::new(config).unwrap();
        let mut records = Vec::new();
        experiment
            .run(&[doc("a")], &[doc("t")], &AverageLinkage, &mut records)
            .unwrap();
        assert!(!records.is_empty());
        assert!(records.iter().all(|r| (0.0..=1.0).contains(&r.quality)));
        assert!(records
            .iter()
            .any(|r| r.document == "t" && r.pair == CandidatePair::new(0, 1) && r.quality == 1.0));
    }

    #[test]
    fn failed_document_contributes_no_records() {
        // NaN once a merged cluster is scored, but only in "bad".
        let extractor = |d: &Document, a: &Cluster, b: &Cluster| {
            let poisoned = d.id == "bad" && a.len() + b.len() > 2;
            if poisoned {
                FeatureVector::new().with("same", f64::NAN)
            } else {
                AverageLinkage.features(d, a, b)
            }
        };
        let search = MergeSearch::Greedy(GreedyThresholdSearch::new(FeatureSchema::new(["same"]).unwrap()));
        let weight = WeightVector::from(vec![0.0, 1.0]);
        let docs = [doc("bad"), doc("good")];
        let mut records = Vec::new();
        let report = decode_documents(&search, &docs, &extractor, &weight, &mut records).unwrap();
        assert_eq!(report.failed, vec!["bad".to_string()]);
        assert_eq!(report.decoded.len(), 1);
        assert!(!records.is_empty());
        assert!(records.iter().all(|r| r.document == "good"));
    }

    #[test]
    fn model_checks_dimension_and_roundtrips() {
        let schema = FeatureSchema::new(["same"]).unwrap();
        assert!(Model::new(schema.clone(), WeightVector::zeros(3)).is_err());
        assert!(matches!(
            Model::new(schema.clone(), WeightVector::from(vec![0.0, f64::INFINITY])),
            Err(Error::NumericAnomaly { value, .. }) if value == f64::INFINITY
        ));

        let model = Model::new(schema, WeightVector::from(vec![-0.5, 1.0])).unwrap();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("model.json");
        model.save(&path).unwrap();
        assert_eq!(Model::load(&path).unwrap(), model);
    }
}
