//! # meld
//!
//! Learned cluster merging for coreference resolution.
//!
//! - **Search**: bounded beam search (trains and decodes) and greedy
//!   threshold search (decodes with a fixed model, labels every candidate)
//! - **Learning**: structured-perceptron updates on search violations
//! - **Averaging**: simple running mean or the learning-rate-weighted
//!   recursive average
//!
//! Data types (documents, partitions, feature and weight vectors) live in
//! [`meld_core`] and are re-exported here.
//!
//! ## Quick Start
//!
//! ```rust
//! use meld::{AverageLinkage, Document, Experiment, ExperimentConfig, FeatureVector, Mention, NullSink};
//!
//! let mut doc = Document::new("d1")
//!     .with_mention(Mention::new(0, "Angela Merkel").with_gold(1))
//!     .with_mention(Mention::new(1, "Merkel").with_gold(1))
//!     .with_mention(Mention::new(2, "Paris").with_gold(2));
//! doc.set_pair_features(0, 1, FeatureVector::new().with("head_match", 1.0));
//!
//! let mut config = ExperimentConfig::default().with_features(["head_match"]);
//! config.iterations = 2;
//!
//! let report = Experiment::new(config)?.run(&[doc.clone()], &[doc], &AverageLinkage, &mut NullSink)?;
//! assert_eq!(report.iterations.len(), 2);
//! # Ok::<(), meld::Error>(())
//! ```
//!
//! ## Strategies
//!
//! | Strategy | Used for | Weight |
//! |----------|----------|--------|
//! | [`BoundedTrainingSearch`] | training, validation, testing | updated on violations when training |
//! | [`GreedyThresholdSearch`] | validation, testing | fixed |
//!
//! Pick the decoder with [`ExperimentConfig::decoder`]; training always uses
//! the bounded search.

#![warn(missing_docs)]

pub mod config;
mod error;
pub mod experiment;
pub mod records;
pub mod scorer;
pub mod search;
pub mod train;

pub use config::{
    descending_rates, Accumulate, AveragingScheme, ExperimentConfig, LearningRateSchedule,
    SearchKind,
};
pub use error::{Error, Result};
pub use experiment::{
    decode_documents, DecodedDocument, Experiment, IterationReport, Model, PhaseReport, RunReport,
};
pub use records::{JsonlSink, NullSink, RecordSink, TrainingRecord};
pub use scorer::Scorer;
pub use search::{
    merge_quality, BoundedTrainingSearch, GreedyThresholdSearch, MergeSearch, SearchOutcome,
    Termination, TrainingOutcome,
};
pub use train::{TrainerState, WeightTrainer};

pub use meld_core::{
    AverageLinkage, CandidatePair, Cluster, ClusterId, ClusterPartition, Document,
    FeatureExtractor, FeatureSchema, FeatureVector, Mention, MentionId, WeightVector,
};
